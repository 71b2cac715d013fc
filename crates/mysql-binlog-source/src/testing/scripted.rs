//! Scripted replication connections.
//!
//! Each call to `open` consumes the next scripted connection. Like a real
//! server, every connection starts with an artificial rotate to the requested
//! position. A connection whose script is exhausted behaves like a quiet
//! server and never yields another frame.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mysql_async::binlog::value::BinlogValue;
use mysql_async::Value;

use crate::error::StreamError;
use crate::frame::{Frame, RowChange, SourceError};
use crate::position::StreamPosition;
use crate::source::{BinlogConnector, FrameSource};

#[derive(Debug, Clone)]
pub enum ScriptStep {
    Frame(Frame),
    /// The connection drops, as when it is killed on the server.
    Disconnect,
    /// The server ends the stream.
    EndOfStream,
    /// The frame cannot be decoded.
    Garbled(String),
}

impl ScriptStep {
    pub fn table_map(table_id: u64, schema: &str, table: &str, log_pos: u64) -> Self {
        ScriptStep::Frame(Frame::TableMap {
            table_id,
            schema: schema.to_string(),
            table: table.to_string(),
            log_pos,
        })
    }

    pub fn rows(table_id: u64, rows: Vec<RowChange>, log_pos: u64) -> Self {
        ScriptStep::Frame(Frame::Rows {
            table_id,
            rows,
            log_pos,
        })
    }

    /// A frame with no row data, such as a transaction begin or commit.
    pub fn marker(log_pos: u64) -> Self {
        ScriptStep::Frame(Frame::Other { log_pos })
    }

    pub fn rotate(file: &str, offset: u64) -> Self {
        ScriptStep::Frame(Frame::Rotate {
            file: file.to_string(),
            offset,
        })
    }
}

/// Integer row image.
pub fn int_row(values: &[i64]) -> Vec<BinlogValue<'static>> {
    values
        .iter()
        .map(|v| BinlogValue::Value(Value::Int(*v)))
        .collect()
}

struct ScriptState {
    server_position: StreamPosition,
    connections: VecDeque<Vec<ScriptStep>>,
    refused_opens: u32,
    refused_reopens: u32,
    opened_at: Vec<StreamPosition>,
    init_calls: u32,
    close_calls: u32,
}

/// Cloneable: tests keep a handle to inspect what the streamer did.
#[derive(Clone)]
pub struct ScriptedConnector {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedConnector {
    /// `server_position` is reported by `init` as the current binlog end.
    pub fn new(server_position: StreamPosition) -> Self {
        Self {
            state: Arc::new(Mutex::new(ScriptState {
                server_position,
                connections: VecDeque::new(),
                refused_opens: 0,
                refused_reopens: 0,
                opened_at: Vec::new(),
                init_calls: 0,
                close_calls: 0,
            })),
        }
    }

    /// Script the next replication connection.
    pub fn with_connection(self, steps: Vec<ScriptStep>) -> Self {
        self.lock().connections.push_back(steps);
        self
    }

    /// Refuse the next `count` opens with a transport error.
    pub fn with_refused_opens(self, count: u32) -> Self {
        self.lock().refused_opens = count;
        self
    }

    /// Refuse `count` opens once a first connection has succeeded.
    pub fn with_refused_reopens(self, count: u32) -> Self {
        self.lock().refused_reopens = count;
        self
    }

    /// Positions successful opens started at, in order.
    pub fn opened_at(&self) -> Vec<StreamPosition> {
        self.lock().opened_at.clone()
    }

    pub fn init_calls(&self) -> u32 {
        self.lock().init_calls
    }

    pub fn close_calls(&self) -> u32 {
        self.lock().close_calls
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl BinlogConnector for ScriptedConnector {
    async fn init(&mut self) -> Result<StreamPosition, StreamError> {
        let mut state = self.lock();
        state.init_calls += 1;
        Ok(state.server_position.clone())
    }

    async fn open(&self, from: &StreamPosition) -> Result<Box<dyn FrameSource>, SourceError> {
        let mut state = self.lock();
        if state.refused_opens > 0 {
            state.refused_opens -= 1;
            return Err(SourceError::Transport("connection refused".to_string()));
        }
        if !state.opened_at.is_empty() && state.refused_reopens > 0 {
            state.refused_reopens -= 1;
            return Err(SourceError::Transport("connection refused".to_string()));
        }
        let steps = state
            .connections
            .pop_front()
            .ok_or_else(|| SourceError::Rejected("no scripted connections left".to_string()))?;
        state.opened_at.push(from.clone());

        let mut steps: VecDeque<ScriptStep> = steps.into();
        steps.push_front(ScriptStep::Frame(Frame::Rotate {
            file: from.file.clone(),
            offset: from.offset,
        }));
        Ok(Box::new(ScriptedSource { steps }))
    }

    async fn close(&mut self) -> Result<(), StreamError> {
        self.lock().close_calls += 1;
        Ok(())
    }
}

struct ScriptedSource {
    steps: VecDeque<ScriptStep>,
}

#[async_trait]
impl FrameSource for ScriptedSource {
    async fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        match self.steps.pop_front() {
            Some(ScriptStep::Frame(frame)) => Ok(Some(frame)),
            Some(ScriptStep::Disconnect) => Err(SourceError::Transport(
                "Lost connection to MySQL server during query".to_string(),
            )),
            Some(ScriptStep::EndOfStream) => Ok(None),
            Some(ScriptStep::Garbled(reason)) => Err(SourceError::Decode(reason)),
            None => std::future::pending().await,
        }
    }

    async fn close(self: Box<Self>) -> Result<(), SourceError> {
        Ok(())
    }
}
