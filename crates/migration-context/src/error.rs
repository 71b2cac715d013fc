use thiserror::Error;

/// Errors raised while building a migration context
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    #[error("Original table name must not be empty")]
    EmptyTableName,
    #[error("Invalid port for {host}: {port}")]
    InvalidPort { host: String, port: u16 },
}
