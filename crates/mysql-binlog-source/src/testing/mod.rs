//! Testing utilities for the binlog source
//!
//! - [`MySQLContainer`] runs a throwaway MySQL server in Docker
//! - [`ScriptedConnector`] replays scripted replication connections without a server

pub mod container;
pub mod scripted;

pub use container::MySQLContainer;
pub use scripted::{ScriptStep, ScriptedConnector};
