//! ghost-sync library
//!
//! Command-line plumbing around the ghost-sync crates:
//!
//! - `migration-context` derives the shadow, old and changelog table names and
//!   trigger names for a migration
//! - `ghost-sync-mysql-binlog-source` tails the server's binlog and dispatches
//!   row changes per table
//! - `checkpoint` persists stream positions between runs
//!
//! # CLI Usage
//!
//! ```bash
//! # Show the names a migration of `users` would use
//! ghost-sync names --database app --table users --trigger users_ins
//!
//! # Print row changes of the original table as they happen
//! ghost-sync tail --host db1 --user ghost --database app --table users \
//!   --checkpoint-dir .checkpoints
//! ```

use std::time::Duration;

use clap::{Parser, ValueEnum};
use migration_context::{ConnectionConfig, MigrationContext, TlsConfig};

pub mod names;
pub mod tail;

/// MySQL connection options
#[derive(Parser, Clone, Debug)]
pub struct ConnectionOpts {
    /// MySQL host
    #[arg(long, default_value = "localhost", env = "GHOST_SYNC_HOST")]
    pub host: String,

    /// MySQL port
    #[arg(long, default_value_t = 3306, env = "GHOST_SYNC_PORT")]
    pub port: u16,

    /// MySQL user; needs REPLICATION SLAVE and REPLICATION CLIENT
    #[arg(long, default_value = "root", env = "GHOST_SYNC_USER")]
    pub user: String,

    /// MySQL password
    #[arg(long, env = "GHOST_SYNC_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Connect over TLS
    #[arg(long)]
    pub ssl: bool,

    /// Accept any server certificate (requires --ssl)
    #[arg(long, requires = "ssl")]
    pub ssl_allow_insecure: bool,

    /// Connect timeout in seconds
    #[arg(long, default_value_t = 10)]
    pub connect_timeout_secs: u64,
}

impl ConnectionOpts {
    pub fn to_connection_config(&self, database: &str) -> ConnectionConfig {
        let mut config = ConnectionConfig::new(self.host.clone(), self.user.clone())
            .with_port(self.port)
            .with_database(database)
            .with_connect_timeout(Duration::from_secs(self.connect_timeout_secs));
        if let Some(password) = &self.password {
            config = config.with_password(password.clone());
        }
        if self.ssl {
            config = config.with_tls(TlsConfig {
                accept_invalid_certs: self.ssl_allow_insecure,
                skip_domain_validation: self.ssl_allow_insecure,
            });
        }
        config
    }
}

/// Table naming options
#[derive(Parser, Clone, Debug)]
pub struct NamingOpts {
    /// Schema holding the table
    #[arg(long, env = "GHOST_SYNC_DATABASE")]
    pub database: String,

    /// Table being migrated
    #[arg(long)]
    pub table: String,

    /// Base name for the shadow, old and changelog tables instead of the table name
    #[arg(long)]
    pub force_table_names: Option<String>,

    /// Embed the migration start time in the old table name
    #[arg(long)]
    pub timestamp_old_table: bool,

    /// Suffix appended to trigger names on the shadow table
    #[arg(long, default_value = "")]
    pub trigger_suffix: String,

    /// Strip an existing trigger suffix before appending it
    #[arg(long)]
    pub remove_trigger_suffix_if_exists: bool,
}

impl NamingOpts {
    pub fn to_context(&self) -> anyhow::Result<MigrationContext> {
        let mut context = MigrationContext::new(self.table.clone())?
            .with_database_name(self.database.clone())
            .with_timestamp_old_table(self.timestamp_old_table)
            .with_trigger_suffix(self.trigger_suffix.clone())
            .with_remove_trigger_suffix(self.remove_trigger_suffix_if_exists);
        if let Some(name) = &self.force_table_names {
            context = context.with_force_tmp_table_name(name.clone());
        }
        Ok(context)
    }
}

/// Which of the migration's tables to follow
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum WatchTable {
    Original,
    Ghost,
    Changelog,
}

impl WatchTable {
    pub fn table_name(&self, context: &MigrationContext) -> String {
        match self {
            WatchTable::Original => context.original_table_name().to_string(),
            WatchTable::Ghost => context.ghost_table_name(),
            WatchTable::Changelog => context.changelog_table_name(),
        }
    }
}
