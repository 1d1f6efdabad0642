//! MySQL driver: query execution and schema introspection.
//!
//! `sqlx` decodes by static type, so each cell is extracted with a match on
//! the column's declared type and a string fallback for everything else.

use askql_error::{GatewayError, Result};
use serde_json::Value;
use sqlx::mysql::{MySqlPool, MySqlRow};
use sqlx::{Column, Row as SqlxRow, TypeInfo};

use crate::db::types::{coerce_scalar, normalize_column_name, Row};
use crate::sources::descriptor::{ColumnSchema, SchemaMap, TableHandle};

/// Execute a validated read-only query, returning normalized rows.
///
/// # Errors
///
/// Returns `GatewayError::Database` on driver failure.
pub async fn execute(pool: &MySqlPool, sql: &str) -> Result<Vec<Row>> {
    let rows = sqlx::query(sql).fetch_all(pool).await.map_err(map_sqlx_error)?;

    let mut results = Vec::with_capacity(rows.len());
    for row in &rows {
        let mut out = Row::new();
        for (index, column) in row.columns().iter().enumerate() {
            let name = normalize_column_name(column.name());
            let value = extract_value(row, index, column.type_info().name());
            out.insert(name, coerce_scalar(value));
        }
        results.push(out);
    }
    Ok(results)
}

/// List every base table in the connection's default schema with its columns
/// in `ORDINAL_POSITION` order.
///
/// # Errors
///
/// Returns `GatewayError::Database` on driver failure.
pub async fn introspect(pool: &MySqlPool) -> Result<Vec<TableHandle>> {
    let tables_query = r"
        SELECT table_name
        FROM information_schema.tables
        WHERE table_schema = DATABASE()
          AND table_type = 'BASE TABLE'
        ORDER BY table_name
    ";
    let table_rows = sqlx::query(tables_query).fetch_all(pool).await.map_err(map_sqlx_error)?;

    let columns_query = r"
        SELECT column_name, data_type
        FROM information_schema.columns
        WHERE table_schema = DATABASE()
          AND table_name = ?
        ORDER BY ordinal_position
    ";

    let mut handles = Vec::with_capacity(table_rows.len());
    for table_row in &table_rows {
        let table_name: String = table_row.try_get_unchecked(0).map_err(map_sqlx_error)?;
        let column_rows = sqlx::query(columns_query)
            .bind(&table_name)
            .fetch_all(pool)
            .await
            .map_err(map_sqlx_error)?;

        let mut columns = SchemaMap::new();
        for column_row in &column_rows {
            let name: String = column_row.try_get_unchecked(0).map_err(map_sqlx_error)?;
            let data_type: String = column_row.try_get_unchecked(1).map_err(map_sqlx_error)?;
            columns
                .insert(normalize_column_name(&name), ColumnSchema::of_type(data_type.to_lowercase()));
        }
        handles.push(TableHandle {
            logical_name: table_name,
            columns,
        });
    }
    Ok(handles)
}

/// Extract one cell as JSON, handling the common MySQL types.
fn extract_value(row: &MySqlRow, index: usize, type_name: &str) -> Value {
    match type_name {
        "BOOLEAN" => row
            .try_get::<Option<bool>, _>(index)
            .ok()
            .flatten()
            .map_or(Value::Null, Value::Bool),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => row
            .try_get::<Option<i64>, _>(index)
            .ok()
            .flatten()
            .map_or(Value::Null, |v| Value::Number(v.into())),
        "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
        | "BIGINT UNSIGNED" => row
            .try_get::<Option<u64>, _>(index)
            .ok()
            .flatten()
            .map_or(Value::Null, |v| Value::Number(v.into())),
        "FLOAT" | "DOUBLE" => row
            .try_get::<Option<f64>, _>(index)
            .ok()
            .flatten()
            .and_then(serde_json::Number::from_f64)
            .map_or(Value::Null, Value::Number),
        // DECIMAL travels as text in the wire protocol; decode raw and let
        // the caller coerce.
        "DECIMAL" => row
            .try_get_unchecked::<Option<String>, _>(index)
            .ok()
            .flatten()
            .map_or(Value::Null, Value::String),
        "DATE" => row
            .try_get::<Option<chrono::NaiveDate>, _>(index)
            .ok()
            .flatten()
            .map_or(Value::Null, |d| Value::String(d.to_string())),
        "DATETIME" | "TIMESTAMP" => row
            .try_get::<Option<chrono::NaiveDateTime>, _>(index)
            .ok()
            .flatten()
            .map_or(Value::Null, |d| Value::String(d.format("%Y-%m-%d %H:%M:%S").to_string())),
        "JSON" => row
            .try_get::<Option<Value>, _>(index)
            .ok()
            .flatten()
            .unwrap_or(Value::Null),
        // VARCHAR, CHAR, TEXT, ENUM and anything else: raw string fallback.
        _ => row
            .try_get_unchecked::<Option<String>, _>(index)
            .ok()
            .flatten()
            .map_or(Value::Null, Value::String),
    }
}

fn map_sqlx_error(e: sqlx::Error) -> GatewayError {
    match &e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => GatewayError::ConnectionPool {
            message: format!("mysql pool unavailable: {e}"),
        },
        sqlx::Error::Database(db) => GatewayError::Database {
            message:   format!("mysql query failed: {db}"),
            sql_state: db.code().map(|c| c.to_string()),
        },
        _ => GatewayError::Database {
            message:   format!("mysql query failed: {e}"),
            sql_state: None,
        },
    }
}
