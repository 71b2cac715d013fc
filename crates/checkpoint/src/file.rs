//! On-disk record of one stream checkpoint.

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Checkpoint, StreamPhase};

/// One saved stream position.
///
/// The position is kept in its CLI form so a record can be read by eye and
/// passed back to `--start-position` unchanged:
///
/// ```json
/// {
///     "source": "mysql-binlog",
///     "position": "binlog.000003:1542",
///     "phase": "StreamStop",
///     "created_at": "2024-01-01T00:00:00Z"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointFile {
    /// `Checkpoint::DATABASE_TYPE` of the position
    pub source: String,
    pub position: String,
    pub phase: StreamPhase,
    pub created_at: DateTime<Utc>,
}

impl CheckpointFile {
    pub fn record<C: Checkpoint>(checkpoint: &C, phase: StreamPhase) -> Self {
        Self {
            source: C::DATABASE_TYPE.to_string(),
            position: checkpoint.to_cli_string(),
            phase,
            created_at: Utc::now(),
        }
    }

    /// Parse the stored position, refusing records written by another source.
    pub fn parse_position<C: Checkpoint>(&self) -> anyhow::Result<C> {
        if self.source != C::DATABASE_TYPE {
            anyhow::bail!(
                "Checkpoint source mismatch: expected '{}', found '{}'",
                C::DATABASE_TYPE,
                self.source
            );
        }
        C::from_cli_string(&self.position).with_context(|| {
            format!(
                "Corrupt {} checkpoint from {}",
                self.phase,
                self.created_at.to_rfc3339()
            )
        })
    }
}
