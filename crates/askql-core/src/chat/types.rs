//! Request and response shapes for the chat entry point.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::TierName;
use crate::db::types::Row;

/// One incoming chat turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    /// The asking user.
    pub user_id: i64,

    /// The user's tier at request time.
    pub tier: TierName,

    /// The free-text question.
    pub message: String,

    /// Transcript this turn belongs to.
    #[serde(default)]
    pub conversation_id: Option<i64>,

    /// Allow longer, more detailed answers.
    #[serde(default)]
    pub extended_responses: bool,

    /// This turn clicks through a suggestion we offered; it consumes no
    /// hourly rate-limit credit.
    #[serde(default)]
    pub is_suggestion_followup: bool,

    /// Idempotency key for short-window resubmissions.
    #[serde(default)]
    pub request_id: Option<Uuid>,

    /// The user explicitly asked for a chart.
    #[serde(default)]
    pub request_chart: bool,

    /// The user explicitly asked for a forecast.
    #[serde(default)]
    pub request_forecast: bool,
}

/// Chart shapes the frontend can render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    /// Continuous metric over an ordered axis.
    Line,
    /// Grouped totals.
    Bar,
    /// Filled line.
    Area,
    /// Share of whole.
    Pie,
}

/// A renderable chart derived from the executed rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSpec {
    /// Chart shape.
    #[serde(rename = "type")]
    pub kind: ChartKind,

    /// Column plotted on the x axis.
    pub x: String,

    /// Column plotted on the y axis.
    pub y: String,

    /// The rows the chart plots, in result order.
    pub data: Vec<Row>,
}

/// Metadata attached to every response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMeta {
    /// Routed intent, wire form (`data_query`, `faq_product`, `irrelevant`).
    pub intent: String,

    /// Tier the request ran under.
    pub tier: TierName,

    /// Logical tables the executing step(s) referenced.
    pub tables: Vec<String>,

    /// Rows the executing step(s) returned.
    pub rows: usize,

    /// True when the result hit the tier's row cap.
    pub limited: bool,

    /// True when a metaphor rewrite drove this answer.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub metaphor_used: bool,

    /// Follow-up questions the user might click next.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestions: Option<Vec<String>>,
}

/// The answer returned to the transport layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    /// The grounded answer text.
    pub text: String,

    /// Optional chart, present only for chart-enabled tiers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart: Option<ChartSpec>,

    /// Response metadata.
    pub meta: ResponseMeta,
}
