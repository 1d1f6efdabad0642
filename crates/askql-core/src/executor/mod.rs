//! Query execution over heterogeneous backends.
//!
//! Dispatch is by source kind. File sources are a bounded row scan: the
//! validated SQL is only the tier-checked representation of intent, and the
//! result is the source's materialized rows up to its LIMIT. Live sources
//! run the validated statement through their process-global pool.
//!
//! The executor assumes exactly what the validator guarantees; it never
//! re-validates and never executes anything but `enhanced_sql`.

use std::sync::Arc;
use std::sync::LazyLock;
use std::time::Duration;

use askql_error::{GatewayError, Result};
use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::TierPolicy;
use crate::db::pool::PoolRegistry;
use crate::db::types::Row;
use crate::sql::validator::limit_of;
use crate::sources::descriptor::{DataSourceDescriptor, file_table_name};
use crate::sources::store::DataSourceStore;

static FROM_TABLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bFROM\s+["`]?([A-Za-z_][A-Za-z0-9_]*)"#).expect("from-table regex")
});

/// Rows returned by one executed statement.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    /// Result rows in backend order.
    pub rows: Vec<Row>,

    /// Always equal to `rows.len()`.
    pub row_count: usize,

    /// Logical tables the statement referenced.
    pub tables: Vec<String>,

    /// True when the result filled the effective limit; more rows may exist.
    pub truncated: bool,
}

impl QueryResult {
    /// An empty result over the given tables.
    #[must_use]
    pub fn empty(tables: Vec<String>) -> Self {
        Self {
            rows: Vec::new(),
            row_count: 0,
            tables,
            truncated: false,
        }
    }

    /// Build a result from rows, recording whether the limit was hit.
    #[must_use]
    pub fn from_rows(rows: Vec<Row>, tables: Vec<String>, effective_limit: usize) -> Self {
        let row_count = rows.len();
        Self {
            rows,
            row_count,
            tables,
            truncated: row_count == effective_limit && effective_limit > 0,
        }
    }
}

/// The first table referenced in a statement's FROM clause.
#[must_use]
pub fn referenced_table(sql: &str) -> Option<String> {
    FROM_TABLE_RE.captures(sql).map(|caps| caps[1].to_lowercase())
}

/// Runs validated statements against file or live backends.
pub struct QueryExecutor {
    registry: Arc<PoolRegistry>,
    store:    Arc<dyn DataSourceStore>,
}

impl QueryExecutor {
    /// Create an executor over the pool registry and the file row store.
    #[must_use]
    pub fn new(registry: Arc<PoolRegistry>, store: Arc<dyn DataSourceStore>) -> Self {
        Self { registry, store }
    }

    /// Run one validated statement against a source.
    ///
    /// `sql` must be a validator's `enhanced_sql`. `deadline` is the
    /// remaining request budget; expiry maps to `GatewayError::Timeout`.
    ///
    /// # Errors
    ///
    /// Returns `Timeout` on deadline expiry and propagates driver errors.
    /// The orchestrator reports all of them as `SQL_ERROR`.
    pub async fn run(
        &self,
        source: &DataSourceDescriptor,
        sql: &str,
        tier: &TierPolicy,
        deadline: Duration,
    ) -> Result<QueryResult> {
        let table = referenced_table(sql).unwrap_or_else(|| file_table_name(&source.name));

        let result = if source.kind.is_live() {
            self.run_live(source, sql, tier, deadline, table).await
        } else {
            self.run_file(source, sql, tier, deadline, table).await
        };

        match &result {
            Ok(r) => debug!(
                source = source.id,
                kind = %source.kind,
                rows = r.row_count,
                truncated = r.truncated,
                "executed query"
            ),
            Err(e) => warn!(source = source.id, kind = %source.kind, error = %e, "query failed"),
        }
        result
    }

    /// File path: bounded row scan honoring the validated LIMIT.
    async fn run_file(
        &self,
        source: &DataSourceDescriptor,
        sql: &str,
        tier: &TierPolicy,
        deadline: Duration,
        table: String,
    ) -> Result<QueryResult> {
        let effective_limit = limit_of(sql).unwrap_or(tier.max_rows).min(tier.max_rows);
        let rows = tokio::time::timeout(deadline, self.store.rows_of(source.id, effective_limit))
            .await
            .map_err(|_| GatewayError::Timeout {
                timeout_ms: deadline.as_millis() as u64,
            })??;

        Ok(QueryResult::from_rows(rows, vec![table], effective_limit as usize))
    }

    /// Live path: execute through the pool, then clamp to the tier cap.
    async fn run_live(
        &self,
        source: &DataSourceDescriptor,
        sql: &str,
        tier: &TierPolicy,
        deadline: Duration,
        table: String,
    ) -> Result<QueryResult> {
        let secret = source.connection_secret.as_deref().ok_or_else(|| {
            GatewayError::config(format!("live source {} has no connection secret", source.id))
        })?;
        let pool = self.registry.pool(source.kind, secret)?;

        let mut rows = tokio::time::timeout(deadline, pool.execute(sql))
            .await
            .map_err(|_| GatewayError::Timeout {
                timeout_ms: deadline.as_millis() as u64,
            })??;

        // The validator already capped the LIMIT; the truncation here only
        // guards against backends that ignore it.
        let cap = tier.max_rows as usize;
        if rows.len() > cap {
            rows.truncate(cap);
        }
        let effective_limit = limit_of(sql).unwrap_or(tier.max_rows).min(tier.max_rows);
        Ok(QueryResult::from_rows(rows, vec![table], effective_limit as usize))
    }
}
