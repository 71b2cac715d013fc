//! Frames read off a replication connection.

use mysql_async::binlog::value::BinlogValue;
use thiserror::Error;

/// One row change inside a row-change frame.
#[derive(Debug, Clone)]
pub struct RowChange {
    pub before: Option<Vec<BinlogValue<'static>>>,
    pub after: Option<Vec<BinlogValue<'static>>>,
}

impl RowChange {
    pub fn insert(after: Vec<BinlogValue<'static>>) -> Self {
        Self {
            before: None,
            after: Some(after),
        }
    }

    pub fn update(before: Vec<BinlogValue<'static>>, after: Vec<BinlogValue<'static>>) -> Self {
        Self {
            before: Some(before),
            after: Some(after),
        }
    }

    pub fn delete(before: Vec<BinlogValue<'static>>) -> Self {
        Self {
            before: Some(before),
            after: None,
        }
    }
}

/// A binlog event reduced to what the streamer needs.
///
/// `log_pos` is the offset just past the event in the current file. The
/// server sends `0` for artificial events that do not exist in the log.
#[derive(Debug, Clone)]
pub enum Frame {
    /// Binds a connection-local table id to a schema and table.
    TableMap {
        table_id: u64,
        schema: String,
        table: String,
        log_pos: u64,
    },
    /// Insert, update or delete rows for a previously mapped table id.
    Rows {
        table_id: u64,
        rows: Vec<RowChange>,
        log_pos: u64,
    },
    /// Switch to another binlog file.
    Rotate { file: String, offset: u64 },
    /// Any other event: format description, query, transaction commit.
    Other { log_pos: u64 },
}

impl Frame {
    pub fn log_pos(&self) -> u64 {
        match self {
            Frame::TableMap { log_pos, .. }
            | Frame::Rows { log_pos, .. }
            | Frame::Other { log_pos } => *log_pos,
            Frame::Rotate { offset, .. } => *offset,
        }
    }
}

/// Failure while opening or reading a replication connection.
#[derive(Error, Debug)]
pub enum SourceError {
    /// Connection-level failure worth reconnecting for.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The server refused the session; reconnecting will not help.
    #[error("connection rejected: {0}")]
    Rejected(String),

    #[error("{0}")]
    Decode(String),
}
