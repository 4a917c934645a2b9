//! Replica configuration.

use crate::schema::Schema;

/// Configuration for opening a replica.
#[derive(Debug, Clone)]
pub struct ReplicaConfig {
    /// Whether to create the replica directory if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether to fsync every log append (safer but slower).
    ///
    /// When false, appends are flushed to the OS but not synced.
    pub sync_on_write: bool,

    /// Schema checked on local writes.
    pub schema: Schema,

    /// Open without taking the writer lock or modifying any file.
    ///
    /// Writes fail, and a torn tail is skipped instead of truncated.
    pub read_only: bool,
}

impl Default for ReplicaConfig {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            sync_on_write: true,
            schema: Schema::rentx(),
            read_only: false,
        }
    }
}

impl ReplicaConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the replica if missing.
    #[must_use]
    pub fn with_create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to fsync every append.
    #[must_use]
    pub fn with_sync_on_write(mut self, value: bool) -> Self {
        self.sync_on_write = value;
        self
    }

    /// Sets the schema.
    #[must_use]
    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = schema;
        self
    }

    /// Sets read-only mode.
    #[must_use]
    pub fn with_read_only(mut self, value: bool) -> Self {
        self.read_only = value;
        self
    }
}
