//! Checkpoint management for ghost-sync
//!
//! Provides storage-agnostic checkpoint file handling for replication
//! stream positions.
//!
//! # Architecture
//!
//! - The `Checkpoint` trait is implemented by source-specific position types
//!   (the MySQL binlog source implements it for its stream position)
//! - `CheckpointFile` records a checkpoint's CLI form with its source and phase
//! - `CheckpointStore` abstracts where checkpoint files live; `FilesystemStore`
//!   keeps them as JSON files in a directory
//!
//! Persisting positions is optional: the stream driver keeps its position in
//! memory and callers decide when to emit checkpoints.

mod file;
mod filesystem;
mod phase;
pub mod store;


pub use file::CheckpointFile;
pub use filesystem::FilesystemStore;
pub use phase::StreamPhase;
pub use store::CheckpointStore;

/// Trait that source-specific positions implement to be checkpointed.
///
/// # Example
///
/// ```rust
/// use checkpoint::Checkpoint;
///
/// #[derive(Debug, Clone)]
/// pub struct OffsetCheckpoint {
///     pub offset: u64,
/// }
///
/// impl Checkpoint for OffsetCheckpoint {
///     const DATABASE_TYPE: &'static str = "offset";
///
///     fn to_cli_string(&self) -> String {
///         self.offset.to_string()
///     }
///
///     fn from_cli_string(s: &str) -> anyhow::Result<Self> {
///         Ok(Self { offset: s.parse()? })
///     }
/// }
/// ```
pub trait Checkpoint: Clone {
    /// Source type identifier (e.g., "mysql-binlog").
    ///
    /// Stored in checkpoint files and validated when they are parsed back.
    const DATABASE_TYPE: &'static str;

    /// CLI form of the position. This is also what checkpoint files store, so
    /// it must round-trip through `from_cli_string()`.
    fn to_cli_string(&self) -> String;

    /// Parse from CLI string format.
    fn from_cli_string(s: &str) -> anyhow::Result<Self>
    where
        Self: Sized;
}

/// Store `checkpoint` for `phase` in `store`.
pub async fn emit_checkpoint<C: Checkpoint>(
    store: &dyn CheckpointStore,
    checkpoint: &C,
    phase: StreamPhase,
) -> anyhow::Result<()> {
    let file = CheckpointFile::record(checkpoint, phase.clone());
    store.store_checkpoint(&file).await?;
    tracing::info!(
        "Emitted {} checkpoint: {}",
        phase,
        checkpoint.to_cli_string()
    );
    Ok(())
}

/// Read the latest checkpoint of type `C` stored for `phase`, if any.
pub async fn read_checkpoint<C: Checkpoint>(
    store: &dyn CheckpointStore,
    phase: StreamPhase,
) -> anyhow::Result<Option<C>> {
    match store.read_latest(C::DATABASE_TYPE, phase).await? {
        Some(file) => Ok(Some(file.parse_position()?)),
        None => Ok(None),
    }
}
