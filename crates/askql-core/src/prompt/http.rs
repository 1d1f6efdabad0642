//! HTTP prompt backend speaking an OpenAI-compatible chat-completions API.
//!
//! Includes retry with exponential backoff for transient failures and a
//! per-call timeout. Temperature is pinned to zero for every capability.

use std::time::Duration;

use askql_error::{GatewayError, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::PromptConfig;
use crate::executor::QueryResult;
use crate::prompt::templates::{
    ANALYZE_SYSTEM, MULTI_STEP_SYSTEM, PLAN_SQL_SYSTEM, SYNTHESIZE_SYSTEM, VALIDATE_SQL_SYSTEM,
    multi_step_prompt, plan_sql_prompt, strip_code_fences, validate_sql_prompt,
};
use crate::prompt::{
    Analysis, LlmSqlReview, MultiStepOutline, NarrativeRules, PromptService, StepSummary,
};

/// Token cap for SQL planning.
const PLAN_MAX_TOKENS: u32 = 400;
/// Token cap for the model-side review.
const VALIDATE_MAX_TOKENS: u32 = 400;
/// Token cap for multi-step outlines.
const MULTI_STEP_MAX_TOKENS: u32 = 600;
/// Token cap for result analysis.
const ANALYZE_MAX_TOKENS: u32 = 800;
/// Token cap for synthesis.
const SYNTHESIZE_MAX_TOKENS: u32 = 700;

/// Rows included verbatim in analysis and synthesis prompts.
const PROMPT_ROW_PREVIEW: usize = 30;

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model:       &'a str,
    messages:    Vec<ChatTurn<'a>>,
    temperature: f32,
    max_tokens:  u32,
}

#[derive(Serialize)]
struct ChatTurn<'a> {
    role:    &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// [`PromptService`] over an OpenAI-compatible HTTP endpoint.
pub struct HttpPromptService {
    client: reqwest::Client,
    config: PromptConfig,
}

impl HttpPromptService {
    /// Build the service; the HTTP client carries the configured timeout.
    #[must_use]
    pub fn new(config: PromptConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .unwrap_or_default();
        Self { client, config }
    }

    /// One chat completion with retry on transient failure.
    async fn complete(&self, system: &str, user: &str, max_tokens: u32) -> Result<String> {
        let request = ChatCompletionRequest {
            model: &self.config.model,
            messages: vec![
                ChatTurn {
                    role:    "system",
                    content: system,
                },
                ChatTurn {
                    role:    "user",
                    content: user,
                },
            ],
            temperature: 0.0,
            max_tokens,
        };

        let mut attempt = 0;
        let mut delay = Duration::from_millis(self.config.retry_delay_ms);
        loop {
            attempt += 1;
            match self.try_once(&request).await {
                Ok(content) => return Ok(content),
                Err(RequestFailure::Fatal(err)) => return Err(err),
                Err(RequestFailure::Transient(err)) => {
                    if attempt >= self.config.max_retries.max(1) {
                        return Err(err);
                    }
                    warn!(attempt, error = %err, "prompt backend transient failure; retrying");
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                },
            }
        }
    }

    async fn try_once(
        &self,
        request: &ChatCompletionRequest<'_>,
    ) -> std::result::Result<String, RequestFailure> {
        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    // Deadline expiry on the model call surfaces like a
                    // backend failure so the user gets the same guidance.
                    RequestFailure::Fatal(GatewayError::sql("model backend timed out"))
                } else {
                    RequestFailure::Transient(GatewayError::validation(format!(
                        "model backend unreachable: {e}"
                    )))
                }
            })?;

        let status = response.status();
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(RequestFailure::Transient(GatewayError::validation(format!(
                "model backend returned {status}"
            ))));
        }
        if !status.is_success() {
            return Err(RequestFailure::Fatal(GatewayError::validation(format!(
                "model backend rejected the request with {status}"
            ))));
        }

        let parsed: ChatCompletionResponse = response.json().await.map_err(|e| {
            RequestFailure::Transient(GatewayError::validation(format!(
                "model backend returned malformed JSON: {e}"
            )))
        })?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();
        debug!(chars = content.len(), "prompt backend responded");
        Ok(content)
    }
}

enum RequestFailure {
    /// Worth another attempt.
    Transient(GatewayError),
    /// Retrying cannot help.
    Fatal(GatewayError),
}

/// Parse strict-JSON model output, tolerating markdown fences.
fn parse_json<T: serde::de::DeserializeOwned>(raw: &str) -> Option<T> {
    serde_json::from_str(strip_code_fences(raw)).ok()
}

fn result_digest(result: &QueryResult) -> String {
    let preview: Vec<_> = result.rows.iter().take(PROMPT_ROW_PREVIEW).collect();
    format!(
        "{} rows from {} (showing up to {PROMPT_ROW_PREVIEW}):\n{}",
        result.row_count,
        result.tables.join(", "),
        serde_json::to_string(&preview).unwrap_or_else(|_| "[]".to_string())
    )
}

#[async_trait::async_trait]
impl PromptService for HttpPromptService {
    async fn plan_sql(&self, question: &str, schema: &str) -> Result<String> {
        let raw = self
            .complete(PLAN_SQL_SYSTEM, &plan_sql_prompt(question, schema), PLAN_MAX_TOKENS)
            .await?;
        Ok(strip_code_fences(&raw).to_string())
    }

    async fn validate_sql(
        &self,
        sql: &str,
        question: &str,
        schema: &str,
    ) -> Result<LlmSqlReview> {
        let raw = self
            .complete(
                VALIDATE_SQL_SYSTEM,
                &validate_sql_prompt(sql, question, schema),
                VALIDATE_MAX_TOKENS,
            )
            .await?;
        Ok(parse_json(&raw).unwrap_or_else(LlmSqlReview::not_applicable))
    }

    async fn plan_multi_step(
        &self,
        question: &str,
        schema: &str,
        max_sub_steps: u32,
    ) -> Result<MultiStepOutline> {
        let raw = self
            .complete(
                MULTI_STEP_SYSTEM,
                &multi_step_prompt(question, schema, max_sub_steps),
                MULTI_STEP_MAX_TOKENS,
            )
            .await?;
        Ok(parse_json(&raw).unwrap_or_else(MultiStepOutline::single_step))
    }

    async fn analyze(
        &self,
        question: &str,
        result: &QueryResult,
        rules: &NarrativeRules,
        missing_columns: &[String],
    ) -> Result<Analysis> {
        let mut user = format!(
            "Question: {question}\n\nData:\n{}\n\nConstraints: {}",
            result_digest(result),
            rules.as_prompt_clause()
        );
        if !missing_columns.is_empty() {
            user.push_str(&format!(
                "\n\nNote: the data lacks these columns the user asked about: {}. \
                 Mention the limitation briefly.",
                missing_columns.join(", ")
            ));
        }

        let raw = self.complete(ANALYZE_SYSTEM, &user, ANALYZE_MAX_TOKENS).await?;
        Ok(parse_json(&raw).unwrap_or_else(|| Analysis::plain_text(strip_code_fences(&raw))))
    }

    async fn synthesize(
        &self,
        question: &str,
        steps: &[StepSummary],
        rules: &NarrativeRules,
    ) -> Result<String> {
        let steps_text = steps
            .iter()
            .map(|step| {
                format!(
                    "Step {}: {} ({} rows): {}",
                    step.order, step.sub_question, step.row_count, step.rows_preview
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        let user = format!(
            "Question: {question}\n\nStep results:\n{steps_text}\n\nConstraints: {}",
            rules.as_prompt_clause()
        );
        let raw = self.complete(SYNTHESIZE_SYSTEM, &user, SYNTHESIZE_MAX_TOKENS).await?;
        Ok(raw.trim().to_string())
    }
}
