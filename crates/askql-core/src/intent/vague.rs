//! Vague-query detection and canonical default insights.
//!
//! Questions like "analyze", "tell me about my data" or "top products" are
//! too thin to plan from, but the schema alone supports a useful canonical
//! answer. The default-insight branch builds that answer deterministically:
//! a summary, trend, or top-N query over the first suitable columns.

use serde::Serialize;

use crate::sources::descriptor::TableHandle;

/// Which canonical insight a vague question maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VagueKind {
    /// Overall shape of the data: row count and totals.
    Summary,
    /// A metric over the date column.
    Trend,
    /// Grouped totals ranked descending.
    TopN,
}

const TOP_PHRASES: &[&str] = &["top", "best", "highest", "biggest", "largest", "leading"];
const TREND_PHRASES: &[&str] = &["trend", "over time", "growth", "trajectory", "momentum"];
const SUMMARY_PHRASES: &[&str] = &[
    "analyze",
    "analyse",
    "tell me about",
    "overview",
    "summary",
    "summarize",
    "insight",
    "what's in my data",
    "whats in my data",
    "how is the business",
    "business performance",
    "key metrics",
    "recent activity",
];

/// Detect whether a question is vague, and which canonical insight fits.
#[must_use]
pub fn detect(message: &str) -> Option<VagueKind> {
    let normalized = message
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    let word = |phrase: &str| {
        normalized.split(|c: char| !c.is_alphanumeric()).any(|w| w == phrase)
            || (phrase.contains(' ') && normalized.contains(phrase))
    };

    if TREND_PHRASES.iter().copied().any(|p| word(p)) {
        Some(VagueKind::Trend)
    } else if TOP_PHRASES.iter().copied().any(|p| word(p)) {
        Some(VagueKind::TopN)
    } else if SUMMARY_PHRASES.iter().copied().any(|p| word(p)) {
        Some(VagueKind::Summary)
    } else {
        None
    }
}

/// Column roles inferred from a handle's schema.
#[derive(Debug, Clone, Default)]
pub struct ColumnRoles {
    /// First numeric column (metric).
    pub numeric: Option<String>,
    /// First categorical column (dimension).
    pub categorical: Option<String>,
    /// First date-like column.
    pub date: Option<String>,
}

const NUMERIC_TYPES: &[&str] = &[
    "int", "integer", "bigint", "smallint", "numeric", "decimal", "real", "double", "float",
    "number", "money",
];

const DATE_NAME_HINTS: &[&str] = &["date", "time", "created", "updated"];

/// Among unnamed numeric columns, a money-like name makes the better
/// default metric than whatever happens to come first.
const METRIC_NAME_HINTS: &[&str] = &["revenue", "sales", "amount", "total", "value", "price"];

/// Infer metric, dimension and date columns for one handle.
#[must_use]
pub fn column_roles(handle: &TableHandle, question: &str) -> ColumnRoles {
    let question_lower = question.to_lowercase();
    let mut roles = ColumnRoles::default();

    // A column named in the question wins its role outright.
    for (name, schema) in &handle.columns {
        if !question_lower.contains(name.to_lowercase().as_str()) {
            continue;
        }
        if is_numeric_type(&schema.data_type) {
            roles.numeric.get_or_insert_with(|| name.clone());
        } else if is_date_column(name, &schema.data_type) {
            roles.date.get_or_insert_with(|| name.clone());
        } else {
            roles.categorical.get_or_insert_with(|| name.clone());
        }
    }

    if roles.numeric.is_none() {
        roles.numeric = handle
            .columns
            .iter()
            .filter(|(_, schema)| is_numeric_type(&schema.data_type))
            .find(|(name, _)| {
                let lower = name.to_lowercase();
                METRIC_NAME_HINTS.iter().any(|h| lower.contains(h))
            })
            .map(|(name, _)| name.clone());
    }

    for (name, schema) in &handle.columns {
        if is_numeric_type(&schema.data_type) {
            roles.numeric.get_or_insert_with(|| name.clone());
        } else if is_date_column(name, &schema.data_type) {
            roles.date.get_or_insert_with(|| name.clone());
        } else {
            roles.categorical.get_or_insert_with(|| name.clone());
        }
    }
    roles
}

fn is_numeric_type(data_type: &str) -> bool {
    let lower = data_type.to_lowercase();
    NUMERIC_TYPES.iter().any(|t| lower.contains(t))
}

fn is_date_column(name: &str, data_type: &str) -> bool {
    let type_lower = data_type.to_lowercase();
    if type_lower.contains("date") || type_lower.contains("timestamp") {
        return true;
    }
    let name_lower = name.to_lowercase();
    DATE_NAME_HINTS.iter().any(|h| name_lower.contains(h))
}

/// A canonical query the default-insight branch will run.
#[derive(Debug, Clone)]
pub struct DefaultInsight {
    /// Which canonical shape was chosen.
    pub kind: VagueKind,
    /// The SQL to validate and execute.
    pub sql: String,
    /// The concrete question the analysis stage narrates.
    pub narrated_question: String,
}

/// Build the canonical SQL for a vague question over one handle.
///
/// Returns `None` when the schema cannot support the requested shape; the
/// caller then falls through to normal planning.
#[must_use]
pub fn build_default_insight(
    kind: VagueKind,
    handle: &TableHandle,
    question: &str,
) -> Option<DefaultInsight> {
    let roles = column_roles(handle, question);
    let table = &handle.logical_name;

    match kind {
        VagueKind::TopN => {
            let category = roles.categorical?;
            let metric = roles.numeric?;
            Some(DefaultInsight {
                kind,
                sql: format!(
                    "SELECT {category}, SUM({metric}) AS total_{metric}, COUNT(*) AS count \
                     FROM {table} GROUP BY {category} ORDER BY total_{metric} DESC LIMIT 10"
                ),
                narrated_question: format!("Top {category} by {metric}"),
            })
        },
        VagueKind::Trend => {
            let date = roles.date?;
            let metric = roles.numeric?;
            Some(DefaultInsight {
                kind,
                sql: format!(
                    "SELECT {date}, SUM({metric}) AS total_{metric} \
                     FROM {table} GROUP BY {date} ORDER BY {date}"
                ),
                narrated_question: format!("{metric} over {date}"),
            })
        },
        VagueKind::Summary => {
            let metric = roles.numeric.clone()?;
            let sql = match roles.categorical {
                Some(category) => format!(
                    "SELECT {category}, SUM({metric}) AS total_{metric}, COUNT(*) AS count \
                     FROM {table} GROUP BY {category} ORDER BY total_{metric} DESC LIMIT 10"
                ),
                None => format!(
                    "SELECT COUNT(*) AS row_count, SUM({metric}) AS total_{metric}, \
                     AVG({metric}) AS avg_{metric} FROM {table}"
                ),
            };
            Some(DefaultInsight {
                kind,
                sql,
                narrated_question: format!("Overview of {table} by {metric}"),
            })
        },
    }
}
