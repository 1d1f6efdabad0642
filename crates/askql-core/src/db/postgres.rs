//! PostgreSQL driver: query execution and schema introspection.
//!
//! Result rows come back through `row_to_json` so the wire representation is
//! one JSON document per row. That keeps numeric types (NUMERIC included)
//! lossless without per-type decoding, and deserializing into an `IndexMap`
//! preserves the projection's column order.

use askql_error::{GatewayError, Result};
use deadpool_postgres::Pool;
use indexmap::IndexMap;

use crate::db::types::{coerce_scalar, normalize_column_name, Row};
use crate::sources::descriptor::{ColumnSchema, SchemaMap, TableHandle};

/// Execute a validated read-only query, returning normalized rows.
///
/// # Errors
///
/// Returns `GatewayError::ConnectionPool` when no connection can be acquired
/// and `GatewayError::Database` (with the SQL state when available) on
/// execution failure.
pub async fn execute(pool: &Pool, sql: &str) -> Result<Vec<Row>> {
    let client = pool.get().await.map_err(|e| GatewayError::ConnectionPool {
        message: format!("failed to acquire postgres connection: {e}"),
    })?;

    let wrapped = format!("SELECT row_to_json(q)::text AS data FROM ({sql}) AS q");
    let rows = client.query(&wrapped, &[]).await.map_err(|e| GatewayError::Database {
        message:   format!("postgres query failed: {e}"),
        sql_state: e.code().map(|c| c.code().to_string()),
    })?;

    let mut results = Vec::with_capacity(rows.len());
    for row in rows {
        let data: String = row.get(0);
        let parsed: IndexMap<String, serde_json::Value> =
            serde_json::from_str(&data).map_err(|e| GatewayError::Database {
                message:   format!("postgres returned malformed row JSON: {e}"),
                sql_state: None,
            })?;
        results.push(normalize_row(parsed));
    }
    Ok(results)
}

/// List every base table in the default schema with its columns in
/// `ordinal_position` order.
///
/// # Errors
///
/// Returns `GatewayError::ConnectionPool` or `GatewayError::Database` as for
/// [`execute`].
pub async fn introspect(pool: &Pool) -> Result<Vec<TableHandle>> {
    let client = pool.get().await.map_err(|e| GatewayError::ConnectionPool {
        message: format!("failed to acquire postgres connection: {e}"),
    })?;

    let tables_query = r"
        SELECT table_name
        FROM information_schema.tables
        WHERE table_schema = 'public'
          AND table_type = 'BASE TABLE'
        ORDER BY table_name
    ";
    let table_rows = client.query(tables_query, &[]).await.map_err(|e| GatewayError::Database {
        message:   format!("failed to list postgres tables: {e}"),
        sql_state: e.code().map(|c| c.code().to_string()),
    })?;

    let columns_query = r"
        SELECT column_name, data_type
        FROM information_schema.columns
        WHERE table_schema = 'public'
          AND table_name = $1
        ORDER BY ordinal_position
    ";

    let mut handles = Vec::with_capacity(table_rows.len());
    for table_row in table_rows {
        let table_name: String = table_row.get(0);
        let column_rows =
            client.query(columns_query, &[&table_name]).await.map_err(|e| {
                GatewayError::Database {
                    message:   format!("failed to list columns of {table_name}: {e}"),
                    sql_state: e.code().map(|c| c.code().to_string()),
                }
            })?;

        let mut columns = SchemaMap::new();
        for column_row in column_rows {
            let name: String = column_row.get(0);
            let data_type: String = column_row.get(1);
            columns.insert(normalize_column_name(&name), ColumnSchema::of_type(data_type));
        }
        handles.push(TableHandle {
            logical_name: table_name,
            columns,
        });
    }
    Ok(handles)
}

fn normalize_row(parsed: IndexMap<String, serde_json::Value>) -> Row {
    parsed
        .into_iter()
        .map(|(name, value)| (normalize_column_name(&name), coerce_scalar(value)))
        .collect()
}
