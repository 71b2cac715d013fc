//! Migration context for ghost-sync
//!
//! Holds the immutable configuration snapshot shared by the components of a
//! live table migration:
//!
//! - the original table name and the naming flags used to derive the shadow
//!   (`_gho`), old (`_del`) and changelog (`_ghc`) table names
//! - trigger naming for the shadow table
//! - the inspector and applier connection settings
//!
//! Derived identifiers are always bounded by [`MAX_TABLE_NAME_LENGTH`].

mod connection;
mod context;
mod error;
mod naming;

pub use connection::{ConnectionConfig, TlsConfig};
pub use context::MigrationContext;
pub use error::ContextError;
pub use naming::{safe_table_name, truncate_to_boundary};

/// Maximum identifier length accepted by MySQL for tables and triggers.
pub const MAX_TABLE_NAME_LENGTH: usize = 64;
