//! Binlog replication over `mysql_async`.

mod client;
mod connector;

pub use client::{current_binlog_position, mysql_opts, validate_binlog_settings};
pub use connector::{MySqlConnector, MySqlFrameSource};
