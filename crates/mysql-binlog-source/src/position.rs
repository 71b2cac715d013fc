//! Binlog coordinates and the bookkeeping that keeps delivery gap-free and
//! duplicate-free across reconnects.

use std::cmp::Ordering;
use std::fmt;

use checkpoint::Checkpoint;
use serde::{Deserialize, Serialize};

/// A binlog coordinate: file name plus byte offset.
///
/// Ordering is by the file's sequence number, then offset. The sequence is
/// the numeric extension (`binlog.000042` is 42); it is only zero-padded to
/// six digits, so `binlog.1000000` follows `binlog.999999` even though it
/// sorts before it as a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamPosition {
    pub file: String,
    pub offset: u64,
}

/// Sequence number of a binlog file name, if its extension is numeric.
fn file_sequence(file: &str) -> Option<u64> {
    file.rsplit_once('.')
        .and_then(|(_, extension)| extension.parse().ok())
}

impl Ord for StreamPosition {
    fn cmp(&self, other: &Self) -> Ordering {
        file_sequence(&self.file)
            .cmp(&file_sequence(&other.file))
            .then_with(|| self.file.cmp(&other.file))
            .then_with(|| self.offset.cmp(&other.offset))
    }
}

impl PartialOrd for StreamPosition {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl StreamPosition {
    pub fn new(file: impl Into<String>, offset: u64) -> Self {
        Self {
            file: file.into(),
            offset,
        }
    }
}

impl fmt::Display for StreamPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.offset)
    }
}

impl Checkpoint for StreamPosition {
    const DATABASE_TYPE: &'static str = "mysql-binlog";

    fn to_cli_string(&self) -> String {
        self.to_string()
    }

    fn from_cli_string(s: &str) -> anyhow::Result<Self> {
        let (file, offset) = s.rsplit_once(':').ok_or_else(|| {
            anyhow::anyhow!("Invalid binlog position '{s}': expected 'file:offset'")
        })?;
        if file.is_empty() {
            anyhow::bail!("Invalid binlog position '{s}': file name is empty");
        }
        let offset = offset.parse::<u64>().map_err(|e| {
            anyhow::anyhow!("Invalid binlog position '{s}': offset is not a number: {e}")
        })?;
        Ok(Self::new(file, offset))
    }
}

/// Tracks how far the stream has been read and dispatched.
///
/// `dispatched` is the end of the last frame whose effects are fully handled.
/// `resume_from` only moves on frames that end a transaction or carry no row
/// data, so a reconnect always restarts at a point where the table-map frames
/// needed by later row frames will be replayed. Row frames at or below
/// `dispatched` are skipped after such a restart.
#[derive(Debug, Clone)]
pub(crate) struct PositionTracker {
    current_file: String,
    dispatched: StreamPosition,
    resume_from: StreamPosition,
}

impl PositionTracker {
    pub(crate) fn new(start: StreamPosition) -> Self {
        Self {
            current_file: start.file.clone(),
            dispatched: start.clone(),
            resume_from: start,
        }
    }

    pub(crate) fn dispatched(&self) -> &StreamPosition {
        &self.dispatched
    }

    pub(crate) fn resume_from(&self) -> &StreamPosition {
        &self.resume_from
    }

    /// Position a new connection should start at. Resets the file cursor since
    /// the server restarts its stream with a rotate to that file.
    pub(crate) fn restart_point(&mut self) -> StreamPosition {
        self.current_file = self.resume_from.file.clone();
        self.resume_from.clone()
    }

    pub(crate) fn position_of(&self, log_pos: u64) -> StreamPosition {
        StreamPosition::new(self.current_file.clone(), log_pos)
    }

    /// Switch to `file`. Returns whether this moved the stream forward; the
    /// rotate a server sends at the start of every connection does not.
    pub(crate) fn on_rotate(&mut self, file: String, offset: u64) -> bool {
        let position = StreamPosition::new(file, offset);
        self.current_file = position.file.clone();
        if position > self.resume_from {
            self.resume_from = position.clone();
        }
        self.advance(position)
    }

    /// Whether a frame ending at `log_pos` was already handled before a reconnect.
    pub(crate) fn is_replayed(&self, log_pos: u64) -> bool {
        log_pos != 0 && self.position_of(log_pos) <= self.dispatched
    }

    /// Record a handled frame and return whether the dispatched position
    /// moved. Artificial frames (`log_pos == 0`) never move it.
    pub(crate) fn record(&mut self, log_pos: u64, restart_safe: bool) -> bool {
        if log_pos == 0 {
            return false;
        }
        let position = self.position_of(log_pos);
        if restart_safe && position > self.resume_from {
            self.resume_from = position.clone();
        }
        self.advance(position)
    }

    fn advance(&mut self, position: StreamPosition) -> bool {
        if position > self.dispatched {
            self.dispatched = position;
            true
        } else {
            false
        }
    }
}
