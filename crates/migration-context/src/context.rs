//! The migration context snapshot and the names derived from it.

use chrono::{DateTime, FixedOffset, Local};

use crate::naming::safe_table_name;
use crate::{ConnectionConfig, ContextError, MAX_TABLE_NAME_LENGTH};

const GHOST_TABLE_SUFFIX: &str = "gho";
const OLD_TABLE_SUFFIX: &str = "del";
const CHANGELOG_TABLE_SUFFIX: &str = "ghc";

/// Format of the timestamp embedded in timestamped old table names.
const OLD_TABLE_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Immutable configuration shared by the components of one migration.
///
/// Built once during setup and handed to each component at construction.
/// Use the `with_*` methods to set optional fields before handing it out.
#[derive(Debug, Clone)]
pub struct MigrationContext {
    database_name: String,
    original_table_name: String,
    force_tmp_table_name: Option<String>,
    timestamp_old_table: bool,
    trigger_suffix: String,
    remove_trigger_suffix: bool,
    start_time: DateTime<FixedOffset>,
    inspector_connection_config: ConnectionConfig,
    applier_connection_config: ConnectionConfig,
}

impl MigrationContext {
    /// Create a context for migrating `original_table_name`.
    ///
    /// Fails with [`ContextError::EmptyTableName`] for an empty name.
    pub fn new(original_table_name: impl Into<String>) -> Result<Self, ContextError> {
        let original_table_name = original_table_name.into();
        if original_table_name.is_empty() {
            return Err(ContextError::EmptyTableName);
        }

        Ok(Self {
            database_name: String::new(),
            original_table_name,
            force_tmp_table_name: None,
            timestamp_old_table: false,
            trigger_suffix: String::new(),
            remove_trigger_suffix: false,
            start_time: Local::now().fixed_offset(),
            inspector_connection_config: ConnectionConfig::default(),
            applier_connection_config: ConnectionConfig::default(),
        })
    }

    pub fn with_database_name(mut self, database_name: impl Into<String>) -> Self {
        self.database_name = database_name.into();
        self
    }

    /// Use `name` instead of the original table name as the base of every
    /// derived table name. An empty string clears the override.
    pub fn with_force_tmp_table_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.force_tmp_table_name = (!name.is_empty()).then_some(name);
        self
    }

    pub fn with_timestamp_old_table(mut self, enabled: bool) -> Self {
        self.timestamp_old_table = enabled;
        self
    }

    pub fn with_trigger_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.trigger_suffix = suffix.into();
        self
    }

    pub fn with_remove_trigger_suffix(mut self, enabled: bool) -> Self {
        self.remove_trigger_suffix = enabled;
        self
    }

    pub fn with_start_time(mut self, start_time: DateTime<FixedOffset>) -> Self {
        self.start_time = start_time;
        self
    }

    pub fn with_inspector_connection_config(mut self, config: ConnectionConfig) -> Self {
        self.inspector_connection_config = config;
        self
    }

    pub fn with_applier_connection_config(mut self, config: ConnectionConfig) -> Self {
        self.applier_connection_config = config;
        self
    }

    pub fn database_name(&self) -> &str {
        &self.database_name
    }

    pub fn original_table_name(&self) -> &str {
        &self.original_table_name
    }

    pub fn trigger_suffix(&self) -> &str {
        &self.trigger_suffix
    }

    pub fn start_time(&self) -> DateTime<FixedOffset> {
        self.start_time
    }

    pub fn inspector_connection_config(&self) -> &ConnectionConfig {
        &self.inspector_connection_config
    }

    pub fn applier_connection_config(&self) -> &ConnectionConfig {
        &self.applier_connection_config
    }

    fn base_table_name(&self) -> &str {
        self.force_tmp_table_name
            .as_deref()
            .unwrap_or(&self.original_table_name)
    }

    /// Name of the shadow table: `_<base>_gho`
    pub fn ghost_table_name(&self) -> String {
        safe_table_name(self.base_table_name(), GHOST_TABLE_SUFFIX)
    }

    /// Name the original table is renamed to at cut-over: `_<base>_del`, or
    /// `_<base>_<YYYYMMDDHHMMSS>_del` when timestamped old tables are enabled.
    pub fn old_table_name(&self) -> String {
        if self.timestamp_old_table {
            let timestamp = self.start_time.format(OLD_TABLE_TIMESTAMP_FORMAT);
            return safe_table_name(
                self.base_table_name(),
                &format!("{timestamp}_{OLD_TABLE_SUFFIX}"),
            );
        }
        safe_table_name(self.base_table_name(), OLD_TABLE_SUFFIX)
    }

    /// Name of the changelog table: `_<base>_ghc`
    pub fn changelog_table_name(&self) -> String {
        safe_table_name(self.base_table_name(), CHANGELOG_TABLE_SUFFIX)
    }

    /// Name for the shadow-table copy of trigger `original`.
    ///
    /// Appends the trigger suffix. With `remove_trigger_suffix`, a suffix
    /// already present on `original` is stripped first so it occurs exactly
    /// once; otherwise suffixes accumulate.
    ///
    /// The result always ends with the suffix, even in remove mode:
    /// `my_trigger_gho` maps to itself, never to the bare `my_trigger`, and
    /// the length check measures that suffixed name.
    pub fn ghost_trigger_name(&self, original: &str) -> String {
        let base = if self.remove_trigger_suffix && !self.trigger_suffix.is_empty() {
            original
                .strip_suffix(self.trigger_suffix.as_str())
                .unwrap_or(original)
        } else {
            original
        };
        format!("{base}{}", self.trigger_suffix)
    }

    /// Whether [`ghost_trigger_name`](Self::ghost_trigger_name) of `name`
    /// fits in [`MAX_TABLE_NAME_LENGTH`].
    pub fn validate_ghost_trigger_length_below_max_length(&self, name: &str) -> bool {
        self.ghost_trigger_name(name).len() <= MAX_TABLE_NAME_LENGTH
    }
}
