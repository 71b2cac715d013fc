//! Checkpoint storage trait
//!
//! Abstracts where checkpoint files are kept so the same emit/read logic
//! works for every backend.

use anyhow::Result;
use async_trait::async_trait;

use crate::{CheckpointFile, StreamPhase};

/// Trait for checkpoint storage operations.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Store a checkpoint file.
    async fn store_checkpoint(&self, file: &CheckpointFile) -> Result<()>;

    /// Read the most recent checkpoint file for a source type and phase.
    ///
    /// Returns None if nothing was stored yet.
    async fn read_latest(
        &self,
        database_type: &str,
        phase: StreamPhase,
    ) -> Result<Option<CheckpointFile>>;
}
