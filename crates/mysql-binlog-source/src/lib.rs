//! MySQL binlog streaming for ghost-sync
//!
//! Tails a server's row-based binary log as a replica and dispatches decoded
//! row changes to listeners registered per (schema, table). Lost replication
//! connections are reopened transparently; delivery resumes after the last
//! fully-dispatched frame without gaps or duplicates.
//!
//! ```rust,ignore
//! let mut streamer = EventsStreamer::new(Arc::new(context), StreamerConfig::default());
//! streamer.init_db_connections().await?;
//! streamer.add_listener(DispatchMode::Sync, "app", "users", |event: DmlEvent| {
//!     println!("{:?} at {}", event.kind, event.position);
//!     Ok(())
//! })?;
//! let result = streamer.stream_events(token.clone()).await;
//! streamer.teardown().await;
//! result?;
//! ```

mod decoder;
pub mod error;
pub mod event;
pub mod frame;
mod lifecycle;
pub mod listener;
pub mod mysql;
pub mod position;
pub mod source;
pub mod stop;
mod streamer;
pub mod testing;

#[cfg(test)]
mod tests;

pub use error::StreamError;
pub use event::{DmlEvent, DmlKind, RowImage};
pub use frame::{Frame, RowChange, SourceError};
pub use lifecycle::RetryPolicy;
pub use listener::{DispatchMode, DmlEventHandler, ListenerRegistry};
pub use mysql::MySqlConnector;
pub use position::StreamPosition;
pub use source::{BinlogConnector, FrameSource};
pub use stop::StopCondition;
pub use streamer::{EventsStreamer, StreamerConfig, StreamerState};
