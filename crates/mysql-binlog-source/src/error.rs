//! Errors surfaced by the events streamer.

use thiserror::Error;

/// Failure reported by [`crate::EventsStreamer`] and the listener registry.
#[derive(Error, Debug)]
pub enum StreamError {
    /// Initial connect failed, the server rejected the session, or the
    /// reconnect budget was exhausted.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A frame could not be decoded, or row changes arrived for a table id
    /// with no table-map on the current connection.
    #[error("Protocol decode error: {0}")]
    ProtocolDecode(String),

    /// A synchronous listener returned an error; streaming stopped.
    #[error("Listener for {schema}.{table} failed: {source}")]
    Listener {
        schema: String,
        table: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}
