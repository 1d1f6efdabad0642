//! Database row types and normalization helpers.

use indexmap::IndexMap;
use serde_json::Value;

/// One result row: ordered column → scalar mapping.
///
/// Order is preserved so charts and synthesized answers see columns in the
/// order the query projected them.
pub type Row = IndexMap<String, Value>;

/// Point-in-time snapshot of a pool's connection usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolMetrics {
    /// Connections currently checked out.
    pub in_use:    usize,
    /// Idle connections held open.
    pub idle:      usize,
    /// Configured ceiling.
    pub max_open:  usize,
}

/// Normalize a column name as the executor exposes it: lowercased.
#[must_use]
pub fn normalize_column_name(name: &str) -> String {
    name.to_ascii_lowercase()
}

/// Coerce a string cell to a number when it unambiguously is one.
///
/// Live drivers hand back DECIMAL/NUMERIC columns as strings; downstream
/// stages (quality analysis, response validation, charts) want numbers.
/// Anything that does not parse cleanly stays a string.
#[must_use]
pub fn coerce_scalar(value: Value) -> Value {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() || trimmed != s {
                return Value::String(s);
            }
            // Leading zeros ("007") and leading plus are identifiers, not
            // numbers.
            if trimmed.starts_with('+')
                || (trimmed.len() > 1 && trimmed.starts_with('0') && !trimmed.starts_with("0."))
            {
                return Value::String(s);
            }
            if let Ok(n) = trimmed.parse::<i64>() {
                return Value::Number(n.into());
            }
            if let Ok(f) = trimmed.parse::<f64>() {
                if f.is_finite() {
                    if let Some(n) = serde_json::Number::from_f64(f) {
                        return Value::Number(n);
                    }
                }
            }
            Value::String(s)
        },
        other => other,
    }
}

/// Extract an f64 from any numeric-looking scalar.
#[must_use]
pub fn scalar_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                trimmed.parse::<f64>().ok().filter(|f| f.is_finite())
            }
        },
        _ => None,
    }
}
