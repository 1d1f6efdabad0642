//! Schema introspection over heterogeneous sources.
//!
//! File sources carry their schema on the descriptor; live sources are
//! introspected through their pool (`information_schema`, default schema
//! only, read-only).

use std::sync::Arc;

use askql_error::{GatewayError, Result};
use tracing::debug;

use crate::db::pool::PoolRegistry;
use crate::sources::descriptor::{DataSourceDescriptor, TableHandle};

/// Resolves the table handles a source exposes to the planner.
pub struct SchemaIntrospector {
    registry: Arc<PoolRegistry>,
}

impl SchemaIntrospector {
    /// Create an introspector over the process-global pool registry.
    #[must_use]
    pub fn new(registry: Arc<PoolRegistry>) -> Self {
        Self { registry }
    }

    /// The handles a source exposes: exactly one for a file source, every
    /// base table in the default schema for a live source.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Configuration` when a live descriptor has no
    /// connection secret, otherwise propagates pool/driver errors.
    pub async fn handles_for(
        &self,
        descriptor: &DataSourceDescriptor,
    ) -> Result<Vec<TableHandle>> {
        if !descriptor.kind.is_live() {
            return Ok(vec![descriptor.file_handle()]);
        }

        let secret = descriptor.connection_secret.as_deref().ok_or_else(|| {
            GatewayError::config(format!(
                "live source {} has no connection secret",
                descriptor.id
            ))
        })?;
        let pool = self.registry.pool(descriptor.kind, secret)?;
        let handles = pool.introspect().await?;
        debug!(
            source = descriptor.id,
            kind = %descriptor.kind,
            tables = handles.len(),
            "introspected live source"
        );
        Ok(handles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::descriptor::{ColumnSchema, SchemaMap, SourceKind, SourceStatus};

    fn file_descriptor() -> DataSourceDescriptor {
        let mut schema = SchemaMap::new();
        schema.insert("region".to_string(), ColumnSchema::of_type("text"));
        schema.insert("amount".to_string(), ColumnSchema::of_type("numeric"));
        DataSourceDescriptor {
            id: 7,
            name: "EU Orders".to_string(),
            kind: SourceKind::File,
            schema,
            row_count: 50,
            status: SourceStatus::Active,
            connection_secret: None,
        }
    }

    #[tokio::test]
    async fn test_file_source_exposes_single_handle() {
        let introspector = SchemaIntrospector::new(Arc::new(PoolRegistry::new()));
        let handles = introspector.handles_for(&file_descriptor()).await.unwrap();
        assert_eq!(handles.len(), 1);
        assert_eq!(handles[0].logical_name, "eu_orders");
        assert_eq!(handles[0].columns.len(), 2);
    }

    #[tokio::test]
    async fn test_live_source_without_secret_is_config_error() {
        let introspector = SchemaIntrospector::new(Arc::new(PoolRegistry::new()));
        let mut descriptor = file_descriptor();
        descriptor.kind = SourceKind::Postgres;
        descriptor.connection_secret = None;
        let err = introspector.handles_for(&descriptor).await.unwrap_err();
        assert!(matches!(err, GatewayError::Configuration { .. }));
    }
}
