//! Filesystem-based checkpoint storage implementation.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;

use crate::store::CheckpointStore;
use crate::{CheckpointFile, StreamPhase};

/// Filesystem implementation of CheckpointStore trait.
///
/// Stores checkpoints as JSON files in a directory, named
/// `checkpoint_{source}_{phase}_{timestamp}.json`. The timestamp is
/// fixed-width so the lexicographically greatest name is the latest file.
pub struct FilesystemStore {
    dir: PathBuf,
}

impl FilesystemStore {
    /// Create a new FilesystemStore with the given directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Get the directory path.
    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    fn prefix(database_type: &str, phase: &StreamPhase) -> String {
        format!("checkpoint_{}_{}_", database_type, phase.as_str())
    }
}

#[async_trait]
impl CheckpointStore for FilesystemStore {
    async fn store_checkpoint(&self, file: &CheckpointFile) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;

        let timestamp = file.created_at.format("%Y%m%dT%H%M%S%.6fZ");
        let filename = self.dir.join(format!(
            "{}{timestamp}.json",
            Self::prefix(&file.source, &file.phase)
        ));

        std::fs::write(&filename, serde_json::to_string_pretty(file)?)
            .with_context(|| format!("Failed to write {}", filename.display()))?;
        tracing::info!("Stored checkpoint to {}", filename.display());
        Ok(())
    }

    async fn read_latest(
        &self,
        database_type: &str,
        phase: StreamPhase,
    ) -> Result<Option<CheckpointFile>> {
        if !self.dir.exists() {
            return Ok(None);
        }

        let prefix = Self::prefix(database_type, &phase);
        let mut latest: Option<(String, PathBuf)> = None;

        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let filename = entry.file_name().to_string_lossy().to_string();
            if !filename.starts_with(&prefix) || !filename.ends_with(".json") {
                continue;
            }
            let newer = latest
                .as_ref()
                .map(|(name, _)| filename > *name)
                .unwrap_or(true);
            if newer {
                latest = Some((filename, entry.path()));
            }
        }

        match latest {
            Some((_, path)) => {
                let content = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                Ok(Some(serde_json::from_str(&content)?))
            }
            None => Ok(None),
        }
    }
}
