//! Active-source resolution for one request.
//!
//! Decides which of a user's sources a question runs against. Tiers that
//! permit multi-step plans may query several sources at once through a
//! virtual composite with every handle flattened in; everyone else gets
//! their first queryable source.

use std::sync::Arc;

use askql_error::Result;
use serde::Serialize;
use tracing::debug;

use crate::config::TierPolicy;
use crate::sources::descriptor::{DataSourceDescriptor, SourceStatus, TableHandle};
use crate::sources::introspect::SchemaIntrospector;
use crate::sources::store::DataSourceStore;

/// Why no source could be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InactiveReason {
    /// The user has connected nothing.
    NoSources,
    /// A source exists but holds no rows.
    EmptySource,
    /// Every source is still syncing.
    Syncing,
    /// Every source is in an error state.
    Errored,
}

/// One resolved source with the handles it exposes.
#[derive(Debug, Clone)]
pub struct SourceBinding {
    /// The backing source.
    pub descriptor: DataSourceDescriptor,
    /// The tables it exposes to the planner.
    pub handles: Vec<TableHandle>,
}

/// The data a request will execute against.
#[derive(Debug, Clone)]
pub struct ResolvedData {
    /// Resolved sources with their handles, in resolution order.
    pub bindings: Vec<SourceBinding>,

    /// Sum of the sources' recorded row counts.
    pub total_rows: u64,

    /// True when two or more sources were flattened into a composite.
    pub composite: bool,
}

impl ResolvedData {
    /// Every table handle the planner may reference, in binding order.
    pub fn handles(&self) -> impl Iterator<Item = &TableHandle> {
        self.bindings.iter().flat_map(|b| b.handles.iter())
    }

    /// Logical table names, in handle order.
    #[must_use]
    pub fn table_names(&self) -> Vec<String> {
        self.handles().map(|h| h.logical_name.clone()).collect()
    }

    /// True when no handle exposes any table.
    #[must_use]
    pub fn no_tables(&self) -> bool {
        self.handles().next().is_none()
    }

    /// The first resolved binding.
    #[must_use]
    pub fn primary(&self) -> &SourceBinding {
        &self.bindings[0]
    }

    /// Whether any backing source is live.
    #[must_use]
    pub fn has_live_source(&self) -> bool {
        self.bindings.iter().any(|b| b.descriptor.kind.is_live())
    }

    /// Case-insensitive column lookup across every handle.
    #[must_use]
    pub fn find_column(&self, name: &str) -> bool {
        self.handles().any(|h| h.column(name).is_some())
    }

    /// The source whose handles include this table, falling back to the
    /// primary source when nothing matches.
    #[must_use]
    pub fn source_for_table(&self, table: &str) -> &DataSourceDescriptor {
        self.bindings
            .iter()
            .find(|b| b.handles.iter().any(|h| h.logical_name.eq_ignore_ascii_case(table)))
            .map_or(&self.primary().descriptor, |b| &b.descriptor)
    }
}

/// Outcome of source resolution.
#[derive(Debug, Clone)]
pub enum ResolveOutcome {
    /// Ready to plan against this data.
    Active(ResolvedData),
    /// Nothing to query.
    Inactive(InactiveReason),
}

/// Resolves a user's queryable sources for one request.
pub struct DataSourceResolver {
    store:        Arc<dyn DataSourceStore>,
    introspector: Arc<SchemaIntrospector>,
}

impl DataSourceResolver {
    /// Create a resolver over the platform's source store.
    #[must_use]
    pub fn new(store: Arc<dyn DataSourceStore>, introspector: Arc<SchemaIntrospector>) -> Self {
        Self {
            store,
            introspector,
        }
    }

    /// All of the user's connected sources, unresolved.
    ///
    /// # Errors
    ///
    /// Propagates store errors.
    pub async fn list(&self, user_id: i64) -> Result<Vec<DataSourceDescriptor>> {
        self.store.list_active(user_id).await
    }

    /// Resolve what this request queries.
    ///
    /// # Errors
    ///
    /// Propagates store, pool and introspection errors. An inactive result
    /// is not an error.
    pub async fn get_active(&self, user_id: i64, tier: &TierPolicy) -> Result<ResolveOutcome> {
        let all = self.store.list_active(user_id).await?;
        if all.is_empty() {
            return Ok(ResolveOutcome::Inactive(InactiveReason::NoSources));
        }

        let mut queryable: Vec<DataSourceDescriptor> =
            all.iter().filter(|s| s.is_queryable()).cloned().collect();
        if queryable.is_empty() {
            return Ok(ResolveOutcome::Inactive(inactive_reason(&all)));
        }

        if !(tier.allow_multi_step && queryable.len() >= 2) {
            queryable.truncate(1);
        }

        let mut bindings = Vec::with_capacity(queryable.len());
        for descriptor in queryable {
            let handles = self.introspector.handles_for(&descriptor).await?;
            bindings.push(SourceBinding {
                descriptor,
                handles,
            });
        }
        let total_rows = bindings.iter().map(|b| b.descriptor.row_count).sum();
        let composite = bindings.len() > 1;
        debug!(
            user = user_id,
            sources = bindings.len(),
            tables = bindings.iter().map(|b| b.handles.len()).sum::<usize>(),
            composite,
            "resolved data sources"
        );

        Ok(ResolveOutcome::Active(ResolvedData {
            bindings,
            total_rows,
            composite,
        }))
    }
}

/// Pick the most informative reason when nothing is queryable.
fn inactive_reason(sources: &[DataSourceDescriptor]) -> InactiveReason {
    if sources.iter().any(|s| matches!(s.status, SourceStatus::Empty)) {
        InactiveReason::EmptySource
    } else if sources.iter().any(|s| matches!(s.status, SourceStatus::Syncing)) {
        InactiveReason::Syncing
    } else {
        InactiveReason::Errored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use askql_error::GatewayError;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    use crate::config::{TierName, TierPolicy};
    use crate::db::pool::PoolRegistry;
    use crate::db::types::Row;
    use crate::sources::descriptor::{ColumnSchema, SchemaMap, SourceKind};

    struct FixedStore {
        sources: Mutex<Vec<DataSourceDescriptor>>,
    }

    #[async_trait]
    impl DataSourceStore for FixedStore {
        async fn list_active(&self, _user_id: i64) -> Result<Vec<DataSourceDescriptor>> {
            Ok(self.sources.lock().clone())
        }

        async fn rows_of(&self, _source_id: i64, _limit: u32) -> Result<Vec<Row>> {
            Err(GatewayError::internal("not used in these tests"))
        }
    }

    fn file_source(id: i64, name: &str, status: SourceStatus) -> DataSourceDescriptor {
        let mut schema = SchemaMap::new();
        schema.insert("product".to_string(), ColumnSchema::of_type("text"));
        schema.insert("revenue".to_string(), ColumnSchema::of_type("numeric"));
        DataSourceDescriptor {
            id,
            name: name.to_string(),
            kind: SourceKind::File,
            schema,
            row_count: 100,
            status,
            connection_secret: None,
        }
    }

    fn resolver(sources: Vec<DataSourceDescriptor>) -> DataSourceResolver {
        let store = Arc::new(FixedStore {
            sources: Mutex::new(sources),
        });
        let introspector = Arc::new(SchemaIntrospector::new(Arc::new(PoolRegistry::new())));
        DataSourceResolver::new(store, introspector)
    }

    fn resolved(sources: Vec<DataSourceDescriptor>) -> ResolvedData {
        let bindings = sources
            .into_iter()
            .map(|descriptor| SourceBinding {
                handles: vec![descriptor.file_handle()],
                descriptor,
            })
            .collect::<Vec<_>>();
        let composite = bindings.len() > 1;
        ResolvedData {
            total_rows: bindings.iter().map(|b| b.descriptor.row_count).sum(),
            bindings,
            composite,
        }
    }

    #[tokio::test]
    async fn test_no_sources() {
        let outcome = resolver(vec![])
            .get_active(1, &TierPolicy::builtin(TierName::Starter))
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            ResolveOutcome::Inactive(InactiveReason::NoSources)
        ));
    }

    #[tokio::test]
    async fn test_empty_source_reason() {
        let outcome = resolver(vec![file_source(1, "Sales", SourceStatus::Empty)])
            .get_active(1, &TierPolicy::builtin(TierName::Starter))
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            ResolveOutcome::Inactive(InactiveReason::EmptySource)
        ));
    }

    #[tokio::test]
    async fn test_starter_gets_single_source_even_with_two_active() {
        let outcome = resolver(vec![
            file_source(1, "Sales", SourceStatus::Active),
            file_source(2, "Costs", SourceStatus::Active),
        ])
        .get_active(1, &TierPolicy::builtin(TierName::Starter))
        .await
        .unwrap();

        let ResolveOutcome::Active(data) = outcome else {
            panic!("expected active resolution");
        };
        assert!(!data.composite);
        assert_eq!(data.bindings.len(), 1);
        assert_eq!(data.table_names(), vec!["sales"]);
    }

    #[tokio::test]
    async fn test_professional_gets_composite() {
        let outcome = resolver(vec![
            file_source(1, "Sales", SourceStatus::Active),
            file_source(2, "Costs", SourceStatus::Active),
        ])
        .get_active(1, &TierPolicy::builtin(TierName::Professional))
        .await
        .unwrap();

        let ResolveOutcome::Active(data) = outcome else {
            panic!("expected active resolution");
        };
        assert!(data.composite);
        assert_eq!(data.table_names(), vec!["sales", "costs"]);
        assert_eq!(data.total_rows, 200);
    }

    #[tokio::test]
    async fn test_syncing_sources_not_queryable() {
        let outcome = resolver(vec![file_source(1, "Sales", SourceStatus::Syncing)])
            .get_active(1, &TierPolicy::builtin(TierName::Professional))
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            ResolveOutcome::Inactive(InactiveReason::Syncing)
        ));
    }

    #[test]
    fn test_find_column_case_insensitive() {
        let data = resolved(vec![file_source(1, "Sales", SourceStatus::Active)]);
        assert!(data.find_column("Revenue"));
        assert!(!data.find_column("cost"));
    }

    #[test]
    fn test_source_for_table_routes_to_matching_binding() {
        let data = resolved(vec![
            file_source(1, "Sales", SourceStatus::Active),
            file_source(2, "Costs", SourceStatus::Active),
        ]);
        assert_eq!(data.source_for_table("costs").id, 2);
        assert_eq!(data.source_for_table("sales").id, 1);
        // Unknown table falls back to the primary source.
        assert_eq!(data.source_for_table("unknown").id, 1);
    }
}
