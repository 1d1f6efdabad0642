//! Final response assembly.
//!
//! Ordering is fixed: quality disclosure first (verbatim), then the metaphor
//! preface, then the one-line data basis, then the answer body and optional
//! forecast. Charts and suggestions attach only when the tier allows them.

use crate::chat::types::{ChartKind, ChartSpec, ChatResponse, ResponseMeta};
use crate::config::TierPolicy;
use crate::db::types::{Row, scalar_as_f64};
use crate::executor::QueryResult;
use crate::intent::Intent;
use crate::prompt::{Analysis, ChartHint};

/// Everything assembly needs beyond the analysis itself.
pub struct AssemblyContext<'a> {
    /// Tier the request ran under.
    pub tier: &'a TierPolicy,

    /// Routed intent.
    pub intent: Intent,

    /// Metaphor preface, when a rewrite drove the answer.
    pub metaphor_preface: Option<&'a str>,

    /// Quality disclosure, when inspection found caveats.
    pub quality_disclosure: Option<&'a str>,

    /// The executed result backing the answer.
    pub result: &'a QueryResult,

    /// The user explicitly asked for a chart.
    pub chart_requested: bool,

    /// The user explicitly asked for a forecast.
    pub forecast_requested: bool,
}

/// Assemble the final response from an analysis and its context.
#[must_use]
pub fn assemble(analysis: &Analysis, ctx: &AssemblyContext<'_>) -> ChatResponse {
    let mut sections = Vec::new();
    if let Some(disclosure) = ctx.quality_disclosure {
        sections.push(disclosure.to_string());
    }
    if let Some(preface) = ctx.metaphor_preface {
        sections.push(preface.to_string());
    }
    sections.push(data_basis_line(ctx.result));
    sections.push(analysis.text.trim().to_string());
    if ctx.tier.allow_forecast {
        if let Some(forecast) = &analysis.forecast {
            sections.push(format!("Forecast: {}", forecast.trim()));
        }
    } else if ctx.forecast_requested {
        sections.push("Forecasts are available on the enterprise plan.".to_string());
    }
    let text = sections.join("\n\n");

    let chart = if ctx.tier.allow_charts {
        analysis
            .chart
            .as_ref()
            .and_then(|hint| attach_chart_data(hint, &ctx.result.rows))
            .or_else(|| {
                if ctx.chart_requested {
                    derive_chart(&ctx.result.rows)
                } else {
                    None
                }
            })
    } else {
        None
    };

    let suggestions = if ctx.tier.allow_suggestions && !analysis.suggestions.is_empty() {
        Some(analysis.suggestions.clone())
    } else {
        None
    };

    ChatResponse {
        text,
        chart,
        meta: ResponseMeta {
            intent: ctx.intent.as_str().to_string(),
            tier: ctx.tier.name,
            tables: ctx.result.tables.clone(),
            rows: ctx.result.row_count,
            limited: ctx.result.row_count as u64 == u64::from(ctx.tier.max_rows),
            metaphor_used: ctx.metaphor_preface.is_some(),
            suggestions,
        },
    }
}

/// The fixed "Data basis" line naming tables and row count.
#[must_use]
pub fn data_basis_line(result: &QueryResult) -> String {
    format!(
        "Data basis: {} ({} rows analyzed)",
        result.tables.join(", "),
        result.row_count
    )
}

/// Attach result rows to a model-proposed chart, if its columns exist.
fn attach_chart_data(hint: &ChartHint, rows: &[Row]) -> Option<ChartSpec> {
    let first = rows.first()?;
    let x = resolve_column(first, &hint.x)?;
    let y = resolve_column(first, &hint.y)?;
    Some(ChartSpec {
        kind: hint.kind,
        x,
        y,
        data: rows.to_vec(),
    })
}

/// Derive a chart with no hint: first column as x, first numeric column
/// (other than x) as y. Bar by default, line when x looks like a date.
#[must_use]
pub fn derive_chart(rows: &[Row]) -> Option<ChartSpec> {
    let first = rows.first()?;
    let x = first.keys().next()?.clone();
    let y = first
        .iter()
        .find(|(name, value)| **name != x && scalar_as_f64(value).is_some())
        .map(|(name, _)| name.clone())?;

    let x_lower = x.to_lowercase();
    let kind = if ["date", "time", "month", "week", "day"].iter().any(|h| x_lower.contains(h)) {
        ChartKind::Line
    } else {
        ChartKind::Bar
    };
    Some(ChartSpec {
        kind,
        x,
        y,
        data: rows.to_vec(),
    })
}

fn resolve_column(row: &Row, wanted: &str) -> Option<String> {
    row.keys().find(|k| k.eq_ignore_ascii_case(wanted)).cloned()
}
