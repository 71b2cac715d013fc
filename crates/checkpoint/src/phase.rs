//! Stream phase enumeration for checkpoint tracking.

use serde::{Deserialize, Serialize};

/// Point in a streaming session at which a checkpoint was taken.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamPhase {
    /// Position streaming started from.
    StreamStart,

    /// Last fully-dispatched position when streaming stopped.
    ///
    /// A later session resumes from here.
    StreamStop,
}

impl StreamPhase {
    /// Used in checkpoint file names and log output.
    pub fn as_str(&self) -> &str {
        match self {
            StreamPhase::StreamStart => "stream_start",
            StreamPhase::StreamStop => "stream_stop",
        }
    }
}

impl std::fmt::Display for StreamPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
