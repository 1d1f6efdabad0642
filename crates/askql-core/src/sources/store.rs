//! Collaborator interface to the platform's source catalog and row store.

use askql_error::Result;
use async_trait::async_trait;

use crate::db::types::Row;
use crate::sources::descriptor::DataSourceDescriptor;

/// Access to a user's connected sources and, for file sources, their
/// materialized rows.
///
/// Owned by the platform outside the core; the core only reads.
#[async_trait]
pub trait DataSourceStore: Send + Sync {
    /// The user's currently connected sources, in connect order.
    async fn list_active(&self, user_id: i64) -> Result<Vec<DataSourceDescriptor>>;

    /// Up to `limit` materialized rows of a file source, in ingest order.
    async fn rows_of(&self, source_id: i64, limit: u32) -> Result<Vec<Row>>;
}
