//! Data source descriptors and table handles.
//!
//! A descriptor is how the rest of the platform tells the core about a
//! connected source. The core never learns how the data arrived; file
//! sources carry their ingested schema, live sources carry an opaque
//! encrypted connection secret.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// How a source's rows are reached at query time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Rows were ingested once and live in the platform's row store.
    File,
    /// Rows are fetched at query time from a live PostgreSQL database.
    Postgres,
    /// Rows are fetched at query time from a live MySQL database.
    MySql,
}

impl SourceKind {
    /// Whether rows are fetched from an external RDBMS at query time.
    #[must_use]
    pub const fn is_live(self) -> bool {
        matches!(self, Self::Postgres | Self::MySql)
    }

    /// Wire form of the kind, used in pool keys and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Postgres => "postgres",
            Self::MySql => "mysql",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sync status of a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceStatus {
    /// Ready to query.
    Active,
    /// Ingestion or schema sync in progress.
    Syncing,
    /// Last sync failed.
    Error,
    /// Connected but holds no rows.
    Empty,
}

/// Schema entry for one column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    /// Declared or inferred data type (e.g. "text", "numeric", "date").
    #[serde(rename = "type")]
    pub data_type: String,

    /// Optional human description carried from ingestion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ColumnSchema {
    /// Shorthand for a column with no description.
    #[must_use]
    pub fn of_type(data_type: impl Into<String>) -> Self {
        Self {
            data_type:   data_type.into(),
            description: None,
        }
    }
}

/// Ordered column schema for a table or source.
pub type SchemaMap = IndexMap<String, ColumnSchema>;

/// A connected data source as the core sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSourceDescriptor {
    /// Source identifier, unique per user.
    pub id: i64,

    /// Display name chosen at connect/upload time.
    pub name: String,

    /// How rows are reached.
    pub kind: SourceKind,

    /// Ordered column schema. For live sources this may be refreshed by
    /// introspection; for file sources it is authoritative.
    pub schema: SchemaMap,

    /// Row count recorded at last sync.
    pub row_count: u64,

    /// Sync status.
    pub status: SourceStatus,

    /// Opaque encrypted connection secret; present only for live kinds.
    /// Never logged, never shown. Pools are keyed by its hash.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_secret: Option<String>,
}

impl DataSourceDescriptor {
    /// Whether this source can serve queries right now.
    #[must_use]
    pub const fn is_queryable(&self) -> bool {
        matches!(self.status, SourceStatus::Active)
    }

    /// The single logical table a file source exposes.
    ///
    /// Live sources expose their own tables via introspection instead.
    #[must_use]
    pub fn file_handle(&self) -> TableHandle {
        TableHandle {
            logical_name: file_table_name(&self.name),
            columns:      self.schema.clone(),
        }
    }
}

/// A logical table view exposed to the planner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableHandle {
    /// Name the planner references in generated SQL.
    pub logical_name: String,

    /// Ordered column schema.
    pub columns: SchemaMap,
}

impl TableHandle {
    /// Case-insensitive column lookup.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns
            .iter()
            .find(|(col, _)| col.eq_ignore_ascii_case(name))
            .map(|(_, schema)| schema)
    }
}

/// Derive the logical table name for a file source: lowercased, whitespace
/// runs collapsed to `_`.
#[must_use]
pub fn file_table_name(source_name: &str) -> String {
    source_name
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}
