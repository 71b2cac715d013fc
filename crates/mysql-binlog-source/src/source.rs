//! Seams between the streamer and the replication transport.
//!
//! [`crate::mysql::MySqlConnector`] talks to a real server; tests drive the
//! streamer through [`crate::testing::ScriptedConnector`].

use async_trait::async_trait;

use crate::error::StreamError;
use crate::frame::{Frame, SourceError};
use crate::position::StreamPosition;

/// Opens replication connections and owns the control connections around them.
#[async_trait]
pub trait BinlogConnector: Send + Sync {
    /// Connect the control session, validate server settings and return the
    /// current end of the binlog.
    async fn init(&mut self) -> Result<StreamPosition, StreamError>;

    /// Open a replication connection that streams frames starting at `from`.
    async fn open(&self, from: &StreamPosition) -> Result<Box<dyn FrameSource>, SourceError>;

    /// Release control connections.
    async fn close(&mut self) -> Result<(), StreamError>;
}

/// A single replication connection.
#[async_trait]
pub trait FrameSource: Send {
    /// Next frame. `Ok(None)` when the server ended the stream.
    async fn next_frame(&mut self) -> Result<Option<Frame>, SourceError>;

    async fn close(self: Box<Self>) -> Result<(), SourceError>;
}
