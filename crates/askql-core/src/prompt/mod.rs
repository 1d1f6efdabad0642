//! Typed capabilities over an external chat model.
//!
//! The model is replaceable: the orchestrator only sees the
//! [`PromptService`] trait. Each capability pins a system role, temperature
//! zero, a bounded token cap and an explicit output contract; parse failures
//! degrade to structured "not applicable" values instead of crashing the
//! pipeline.

pub mod http;
pub mod templates;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use askql_error::Result;

use crate::chat::types::ChartKind;
use crate::config::TierPolicy;
use crate::executor::QueryResult;

pub use http::HttpPromptService;

/// Model-side review of a planned statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmSqlReview {
    /// False only when the model is confident the statement is wrong.
    pub is_valid: bool,

    /// Problems the model saw.
    #[serde(default)]
    pub concerns: Vec<String>,

    /// Improvements the model proposed.
    #[serde(default)]
    pub recommendations: Vec<String>,

    /// A repaired statement, when the model could produce one.
    #[serde(default, rename = "correctedSQL")]
    pub corrected_sql: Option<String>,
}

impl LlmSqlReview {
    /// The neutral review used when the model's output was unusable.
    #[must_use]
    pub fn not_applicable() -> Self {
        Self {
            is_valid:        true,
            concerns:        Vec::new(),
            recommendations: Vec::new(),
            corrected_sql:   None,
        }
    }
}

/// One step of a multi-step outline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutlineStep {
    /// 1-based position in the plan.
    pub order: u32,

    /// What this step contributes.
    pub description: String,

    /// The single-step question this step answers.
    pub sub_question: String,

    /// Orders of the steps whose results this step needs.
    #[serde(default)]
    pub depends_on: Vec<u32>,
}

/// The model's multi-step decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiStepOutline {
    /// False when one query should answer the question.
    pub needs_multi_step: bool,

    /// Ordered steps; empty when single-step.
    #[serde(default)]
    pub steps: Vec<OutlineStep>,
}

impl MultiStepOutline {
    /// The single-step outline used when the model's output was unusable.
    #[must_use]
    pub fn single_step() -> Self {
        Self {
            needs_multi_step: false,
            steps:            Vec::new(),
        }
    }
}

/// Chart shape the model proposes; the core attaches the data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartHint {
    /// Chart shape.
    #[serde(rename = "type")]
    pub kind: ChartKind,

    /// Column plotted on the x axis.
    pub x: String,

    /// Column plotted on the y axis.
    pub y: String,
}

/// Analysis of one executed result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    /// The grounded answer text.
    pub text: String,

    /// Proposed chart, when useful and permitted.
    #[serde(default)]
    pub chart: Option<ChartHint>,

    /// Follow-up questions, when permitted.
    #[serde(default)]
    pub suggestions: Vec<String>,

    /// Forecast paragraph, when permitted.
    #[serde(default)]
    pub forecast: Option<String>,
}

impl Analysis {
    /// Wrap raw model text when the structured contract was not honored.
    #[must_use]
    pub fn plain_text(text: impl Into<String>) -> Self {
        Self {
            text:        text.into(),
            chart:       None,
            suggestions: Vec::new(),
            forecast:    None,
        }
    }
}

/// Narrative style passed to the analyze and synthesize capabilities.
#[derive(Debug, Clone, Copy)]
pub struct NarrativeRules {
    /// Word budget for the answer.
    pub word_cap: u32,

    /// The model may propose a chart.
    pub allow_chart: bool,

    /// The model may propose follow-up suggestions.
    pub allow_suggestions: bool,

    /// The model may add a forecast section.
    pub allow_forecast: bool,
}

impl NarrativeRules {
    /// Derive the rules for one request from its tier policy.
    #[must_use]
    pub fn for_tier(tier: &TierPolicy, extended_responses: bool) -> Self {
        let word_cap = if extended_responses {
            tier.response_word_cap.saturating_mul(2)
        } else {
            tier.response_word_cap
        };
        Self {
            word_cap,
            allow_chart: tier.allow_charts,
            allow_suggestions: tier.allow_suggestions,
            allow_forecast: tier.allow_forecast,
        }
    }

    /// Render the rules as prompt constraints.
    #[must_use]
    pub fn as_prompt_clause(&self) -> String {
        let mut clauses = vec![format!("Keep the answer under {} words.", self.word_cap)];
        if self.allow_chart {
            clauses.push("You may propose a chart when the data suits one.".to_string());
        } else {
            clauses.push("Set chart to null.".to_string());
        }
        if self.allow_suggestions {
            clauses.push("You may propose up to three follow-up suggestions.".to_string());
        } else {
            clauses.push("Leave suggestions empty.".to_string());
        }
        if self.allow_forecast {
            clauses.push("You may add a short forecast.".to_string());
        } else {
            clauses.push("Set forecast to null.".to_string());
        }
        clauses.join(" ")
    }
}

/// Digest of one executed step, passed to synthesis.
#[derive(Debug, Clone, Serialize)]
pub struct StepSummary {
    /// 1-based step order.
    pub order: u32,

    /// The sub-question this step answered.
    pub sub_question: String,

    /// Rows the step returned.
    pub row_count: usize,

    /// JSON rendering of (up to) the first rows, for grounding.
    pub rows_preview: String,
}

impl StepSummary {
    /// Digest a result for synthesis, previewing at most `preview_rows`
    /// rows.
    #[must_use]
    pub fn from_result(
        order: u32,
        sub_question: &str,
        result: &QueryResult,
        preview_rows: usize,
    ) -> Self {
        let preview: Vec<_> = result.rows.iter().take(preview_rows).collect();
        Self {
            order,
            sub_question: sub_question.to_string(),
            row_count: result.row_count,
            rows_preview: serde_json::to_string(&preview).unwrap_or_else(|_| "[]".to_string()),
        }
    }
}

/// The chat-model capabilities the pipeline depends on.
#[async_trait]
pub trait PromptService: Send + Sync {
    /// Plan one read-only statement for a question. Returns the model's raw
    /// output; sentinel extraction happens in the planner.
    async fn plan_sql(&self, question: &str, schema: &str) -> Result<String>;

    /// Ask the model to review a planned statement.
    async fn validate_sql(&self, sql: &str, question: &str, schema: &str)
    -> Result<LlmSqlReview>;

    /// Ask whether a question needs multiple steps, and for the outline.
    async fn plan_multi_step(
        &self,
        question: &str,
        schema: &str,
        max_sub_steps: u32,
    ) -> Result<MultiStepOutline>;

    /// Explain one executed result.
    async fn analyze(
        &self,
        question: &str,
        result: &QueryResult,
        rules: &NarrativeRules,
        missing_columns: &[String],
    ) -> Result<Analysis>;

    /// Combine several step results into one answer.
    async fn synthesize(
        &self,
        question: &str,
        steps: &[StepSummary],
        rules: &NarrativeRules,
    ) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TierName;

    #[test]
    fn test_rules_follow_tier_flags() {
        let starter = NarrativeRules::for_tier(&TierPolicy::builtin(TierName::Starter), false);
        assert_eq!(starter.word_cap, 60);
        assert!(!starter.allow_chart && !starter.allow_suggestions && !starter.allow_forecast);

        let enterprise =
            NarrativeRules::for_tier(&TierPolicy::builtin(TierName::Enterprise), false);
        assert!(enterprise.allow_chart && enterprise.allow_suggestions && enterprise.allow_forecast);
    }

    #[test]
    fn test_extended_doubles_word_cap() {
        let rules = NarrativeRules::for_tier(&TierPolicy::builtin(TierName::Professional), true);
        assert_eq!(rules.word_cap, 360);
    }

    #[test]
    fn test_prompt_clause_names_denied_features() {
        let rules = NarrativeRules::for_tier(&TierPolicy::builtin(TierName::Starter), false);
        let clause = rules.as_prompt_clause();
        assert!(clause.contains("Set chart to null."));
        assert!(clause.contains("Leave suggestions empty."));
        assert!(clause.contains("Set forecast to null."));
    }

    #[test]
    fn test_review_defaults_tolerate_sparse_json() {
        let review: LlmSqlReview = serde_json::from_str(r#"{"isValid": true}"#).unwrap();
        assert!(review.is_valid);
        assert!(review.concerns.is_empty());
        assert!(review.corrected_sql.is_none());
    }

    #[test]
    fn test_outline_parses_camel_case() {
        let outline: MultiStepOutline = serde_json::from_str(
            r#"{"needsMultiStep": true, "steps": [
                {"order": 1, "description": "totals", "subQuestion": "Q1 revenue?", "dependsOn": []},
                {"order": 2, "description": "compare", "subQuestion": "Q2 revenue?", "dependsOn": [1]}
            ]}"#,
        )
        .unwrap();
        assert!(outline.needs_multi_step);
        assert_eq!(outline.steps.len(), 2);
        assert_eq!(outline.steps[1].depends_on, vec![1]);
    }
}
