//! Top-level request pipeline.
//!
//! One request flows `Rate → Metaphor → Intent → Resolve → Guard → branch`.
//! The data branch checks for missing columns, takes the default-insight
//! shortcut for vague questions, then plans (single- or multi-step),
//! validates, executes, inspects quality, narrates, and finally runs the
//! hallucination guard before assembly. Every failure is caught at its seam
//! and mapped to a user-facing response; `chat` never returns an error.

use std::sync::Arc;

use askql_error::{GatewayError, Result};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::chat::assembly::{AssemblyContext, assemble, derive_chart};
use crate::chat::dedup::{DEDUP_TTL_MS, DedupCache};
use crate::chat::store::{ConversationStore, content_hash};
use crate::chat::types::{ChatRequest, ChatResponse, ResponseMeta};
use crate::clock::Clock;
use crate::config::{TierCatalog, TierPolicy};
use crate::executor::{QueryExecutor, QueryResult, referenced_table};
use crate::intent::{
    Intent, RequiredColumn, classify, column_roles, detect_missing, maybe_rewrite,
};
use crate::intent::vague::{self, build_default_insight};
use crate::planner::{PlanDecision, Planner};
use crate::prompt::templates::schema_text;
use crate::prompt::{Analysis, NarrativeRules, PromptService, StepSummary};
use crate::quality::{self, DataQualityReport};
use crate::rate_limit::RateLimiter;
use crate::response;
use crate::sources::descriptor::DataSourceDescriptor;
use crate::sources::resolver::{
    DataSourceResolver, InactiveReason, ResolveOutcome, ResolvedData,
};
use crate::sql;

/// Fixed reply for explicitly off-topic questions.
const IRRELEVANT_REPLY: &str = "I'm your data analyst, so I'll stay in my lane: ask me anything \
     about the data you've connected and I'll dig in.";

/// Fixed reply for product questions.
const FAQ_REPLY: &str = "I turn plain-language questions into safe, read-only queries over the \
     data you connect. Upload a CSV or Excel file, or connect a PostgreSQL or MySQL database, \
     then ask things like \"what's the top product?\" or \"compare this quarter to last\". \
     Higher plans add charts, follow-up suggestions, multi-step analysis and forecasts.";

/// Rows from each step carried into the synthesis prompt.
const SYNTHESIS_PREVIEW_ROWS: usize = 10;

/// The query orchestration core's single entry point.
pub struct Orchestrator {
    catalog:       TierCatalog,
    limiter:       RateLimiter,
    resolver:      DataSourceResolver,
    planner:       Planner,
    prompts:       Arc<dyn PromptService>,
    executor:      QueryExecutor,
    conversations: Arc<dyn ConversationStore>,
    dedup:         DedupCache,
    clock:         Arc<dyn Clock>,
}

impl Orchestrator {
    /// Wire the pipeline together.
    #[allow(clippy::too_many_arguments)]
    // Reason: this is the composition root; every collaborator is distinct.
    #[must_use]
    pub fn new(
        catalog: TierCatalog,
        limiter: RateLimiter,
        resolver: DataSourceResolver,
        planner: Planner,
        prompts: Arc<dyn PromptService>,
        executor: QueryExecutor,
        conversations: Arc<dyn ConversationStore>,
        dedup: DedupCache,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            catalog,
            limiter,
            resolver,
            planner,
            prompts,
            executor,
            conversations,
            dedup,
            clock,
        }
    }

    /// Answer one question. Infallible: failures become user-facing
    /// responses with suggested next steps.
    pub async fn chat(&self, request: ChatRequest) -> ChatResponse {
        let tier = self.catalog.policy(request.tier).clone();

        // Repeat submission with the same request id within a minute.
        if let Some(request_id) = request.request_id {
            if let Some(previous) = self.dedup.get(request.user_id, request_id) {
                info!(user = request.user_id, %request_id, "request-id dedup hit");
                return previous;
            }
        }

        // Identical content within the dedup window returns the stored
        // answer byte for byte.
        let hash = content_hash(request.user_id, request.conversation_id, &request.message);
        if let Some(previous) = self.find_recent_by_hash(&hash).await {
            info!(user = request.user_id, "content-hash dedup hit");
            return previous;
        }

        let decision = self.limiter.check(request.user_id, &tier, request.is_suggestion_followup);
        if !decision.allow {
            let message = decision
                .message
                .unwrap_or_else(|| "You're over your plan's query limit.".to_string());
            return self.plain_response(
                &tier,
                classify(&request.message),
                GatewayError::rate_limit(message).user_message(),
            );
        }

        let rewrite = maybe_rewrite(&request.message);
        let question =
            rewrite.as_ref().map_or_else(|| request.message.clone(), |r| r.rewritten.clone());
        // A metaphor rewrite overrides irrelevant classification.
        let intent = if rewrite.is_some() {
            Intent::DataQuery
        } else {
            classify(&request.message)
        };
        info!(
            user = request.user_id,
            tier = %tier.name,
            intent = intent.as_str(),
            metaphor = rewrite.is_some(),
            "routing chat request"
        );

        if let Err(e) = self
            .conversations
            .save_user(
                request.user_id,
                request.conversation_id,
                &request.message,
                request.request_id,
            )
            .await
        {
            warn!(user = request.user_id, error = %e, "failed to persist user turn");
        }

        let response = match intent {
            Intent::Irrelevant => self.plain_response(&tier, intent, IRRELEVANT_REPLY.to_string()),
            Intent::FaqProduct => self.plain_response(&tier, intent, FAQ_REPLY.to_string()),
            Intent::DataQuery => {
                let preface = rewrite.as_ref().map(|r| r.preface.as_str());
                self.data_branch(&request, &tier, &question, preface).await
            },
        };

        if let Err(e) = self
            .conversations
            .save_ai(
                request.user_id,
                request.conversation_id,
                &response.text,
                serde_json::to_value(&response.meta).ok(),
                &hash,
            )
            .await
        {
            warn!(user = request.user_id, error = %e, "failed to persist assistant turn");
        }
        if let Some(request_id) = request.request_id {
            self.dedup.insert(request.user_id, request_id, response.clone());
        }
        response
    }

    /// The stored answer for this content hash, if fresh and complete.
    async fn find_recent_by_hash(&self, hash: &str) -> Option<ChatResponse> {
        let previous = match self.conversations.find_by_hash(hash).await {
            Ok(found) => found?,
            Err(e) => {
                warn!(error = %e, "content-hash lookup failed");
                return None;
            },
        };
        if !previous.is_complete {
            return None;
        }
        let age_ms = self.clock.now_millis() - previous.created_at.timestamp_millis();
        if age_ms >= DEDUP_TTL_MS {
            return None;
        }

        let meta = previous
            .metadata
            .and_then(|value| serde_json::from_value::<ResponseMeta>(value).ok())
            .unwrap_or_else(|| ResponseMeta {
                intent: Intent::DataQuery.as_str().to_string(),
                tier: crate::config::TierName::Starter,
                tables: Vec::new(),
                rows: 0,
                limited: false,
                metaphor_used: false,
                suggestions: None,
            });
        Some(ChatResponse {
            text: previous.content,
            chart: None,
            meta,
        })
    }

    // ========================================================================
    // Data branch
    // ========================================================================

    async fn data_branch(
        &self,
        request: &ChatRequest,
        tier: &TierPolicy,
        question: &str,
        preface: Option<&str>,
    ) -> ChatResponse {
        let deadline = Instant::now() + tier.exec_timeout();

        let data = match self.resolver.get_active(request.user_id, tier).await {
            Ok(ResolveOutcome::Active(data)) => data,
            Ok(ResolveOutcome::Inactive(reason)) => {
                return self.no_data_response(tier, reason);
            },
            Err(e) => return self.failure_response(tier, Intent::DataQuery, &e),
        };
        // A live database whose default schema holds no tables has nothing
        // to query either.
        if data.no_tables() {
            return self.no_data_response(tier, InactiveReason::EmptySource);
        }

        let missing = detect_missing(question, &data);
        if !missing.is_empty() {
            return self.educational_response(tier, &data, &missing);
        }

        if let Some(kind) = vague::detect(question) {
            if let Some(response) = self
                .default_insight_branch(request, tier, question, preface, &data, kind, deadline)
                .await
            {
                return response;
            }
            // Schema can't support the canonical shape; plan normally.
        }

        let schema = schema_text(data.handles());
        let decision = match with_llm_deadline(
            deadline,
            self.planner.decide(question, &schema, tier),
        )
        .await
        {
            Ok(decision) => decision,
            Err(e) => return self.failure_response(tier, Intent::DataQuery, &e),
        };

        let outcome = match decision {
            PlanDecision::SingleStep => {
                self.single_step(request, tier, question, preface, &data, &schema, deadline).await
            },
            PlanDecision::MultiStep(steps) => {
                self.multi_step(request, tier, question, preface, &data, &schema, steps, deadline)
                    .await
            },
        };
        match outcome {
            Ok(response) => response,
            Err(StepFailure::MissingColumns(missing)) => {
                self.educational_response(tier, &data, &missing)
            },
            Err(StepFailure::Error(e)) => self.failure_response(tier, Intent::DataQuery, &e),
        }
    }

    async fn single_step(
        &self,
        request: &ChatRequest,
        tier: &TierPolicy,
        question: &str,
        preface: Option<&str>,
        data: &ResolvedData,
        schema: &str,
        deadline: Instant,
    ) -> std::result::Result<ChatResponse, StepFailure> {
        let plan = with_llm_deadline(deadline, self.planner.plan_single(question, schema)).await?;
        if !plan.missing_columns.is_empty() {
            return Err(StepFailure::MissingColumns(resolve_required(&plan.missing_columns)));
        }

        let mut sql = self.checked_sql(&plan.sql, tier)?;
        if tier.llm_sql_validation {
            sql = self.llm_review(&sql, question, schema, tier, deadline).await;
        }

        let source = source_for(data, &sql);
        let result = self
            .executor
            .run(source, &sql, tier, deadline.saturating_duration_since(Instant::now()))
            .await
            .map_err(StepFailure::Error)?;

        let report = quality::analyze(&result.rows);
        let rules = NarrativeRules::for_tier(tier, request.extended_responses);
        let analysis = with_llm_deadline(
            deadline,
            self.prompts.analyze(question, &result, &rules, &[]),
        )
        .await?;

        Ok(self.guard_and_assemble(request, tier, question, preface, &result, &report, analysis))
    }

    #[allow(clippy::too_many_arguments)]
    // Reason: the step loop threads the full request context through.
    async fn multi_step(
        &self,
        request: &ChatRequest,
        tier: &TierPolicy,
        question: &str,
        preface: Option<&str>,
        data: &ResolvedData,
        schema: &str,
        steps: Vec<crate::prompt::OutlineStep>,
        deadline: Instant,
    ) -> std::result::Result<ChatResponse, StepFailure> {
        let mut summaries = Vec::with_capacity(steps.len());
        let mut combined_rows = Vec::new();
        let mut tables: Vec<String> = Vec::new();
        let mut truncated = false;

        for step in &steps {
            let plan = with_llm_deadline(
                deadline,
                self.planner.plan_single(&step.sub_question, schema),
            )
            .await?;
            if !plan.missing_columns.is_empty() {
                return Err(StepFailure::MissingColumns(resolve_required(&plan.missing_columns)));
            }

            let sql = self.checked_sql(&plan.sql, tier)?;
            let source = source_for(data, &sql);
            let result = self
                .executor
                .run(source, &sql, tier, deadline.saturating_duration_since(Instant::now()))
                .await
                .map_err(StepFailure::Error)?;

            summaries.push(StepSummary::from_result(
                step.order,
                &step.sub_question,
                &result,
                SYNTHESIS_PREVIEW_ROWS,
            ));
            for table in &result.tables {
                if !tables.contains(table) {
                    tables.push(table.clone());
                }
            }
            truncated = truncated || result.truncated;
            combined_rows.extend(result.rows);
        }

        let rules = NarrativeRules::for_tier(tier, request.extended_responses);
        let text = with_llm_deadline(
            deadline,
            self.prompts.synthesize(question, &summaries, &rules),
        )
        .await?;

        let row_count = combined_rows.len();
        let combined = QueryResult {
            rows: combined_rows,
            row_count,
            tables,
            truncated,
        };
        let report = quality::analyze(&combined.rows);
        let analysis = Analysis::plain_text(text);
        Ok(self.guard_and_assemble(request, tier, question, preface, &combined, &report, analysis))
    }

    /// The default-insight shortcut for vague questions. Returns `None`
    /// when no handle supports the canonical shape.
    #[allow(clippy::too_many_arguments)]
    // Reason: shares the step context with the planning branches.
    async fn default_insight_branch(
        &self,
        request: &ChatRequest,
        tier: &TierPolicy,
        question: &str,
        preface: Option<&str>,
        data: &ResolvedData,
        kind: vague::VagueKind,
        deadline: Instant,
    ) -> Option<ChatResponse> {
        let insight = data
            .handles()
            .find_map(|handle| build_default_insight(kind, handle, question))?;

        let outcome: std::result::Result<ChatResponse, StepFailure> = async {
            let sql = self.checked_sql(&insight.sql, tier)?;
            let source = source_for(data, &sql);
            let result = self
                .executor
                .run(source, &sql, tier, deadline.saturating_duration_since(Instant::now()))
                .await
                .map_err(StepFailure::Error)?;

            let report = quality::analyze(&result.rows);
            let rules = NarrativeRules::for_tier(tier, request.extended_responses);
            let analysis = with_llm_deadline(
                deadline,
                self.prompts.analyze(&insight.narrated_question, &result, &rules, &[]),
            )
            .await?;
            Ok(self.guard_and_assemble(request, tier, question, preface, &result, &report, analysis))
        }
        .await;

        match outcome {
            Ok(response) => Some(response),
            Err(StepFailure::MissingColumns(_)) => None,
            Err(StepFailure::Error(e)) => {
                Some(self.failure_response(tier, Intent::DataQuery, &e))
            },
        }
    }

    // ========================================================================
    // Shared tail and response builders
    // ========================================================================

    /// Run the static validator and surface its errors.
    fn checked_sql(
        &self,
        sql: &str,
        tier: &TierPolicy,
    ) -> std::result::Result<String, StepFailure> {
        let report = sql::validate(sql, tier);
        if report.is_valid {
            for warning in &report.warnings {
                info!(warning = %warning, "sql validator rewrote the statement");
            }
            Ok(report.enhanced_sql)
        } else {
            Err(StepFailure::Error(GatewayError::validation(report.errors.join("; "))))
        }
    }

    /// Model-side review; any repair must re-pass the static validator.
    async fn llm_review(
        &self,
        sql: &str,
        question: &str,
        schema: &str,
        tier: &TierPolicy,
        deadline: Instant,
    ) -> String {
        let review = match with_llm_deadline(
            deadline,
            self.prompts.validate_sql(sql, question, schema),
        )
        .await
        {
            Ok(review) => review,
            Err(e) => {
                warn!(error = %e, "model review unavailable; keeping validated SQL");
                return sql.to_string();
            },
        };

        if review.is_valid {
            return sql.to_string();
        }
        if let Some(corrected) = review.corrected_sql {
            let re_checked = sql::validate(&corrected, tier);
            if re_checked.is_valid {
                info!("adopted model-corrected SQL");
                return re_checked.enhanced_sql;
            }
        }
        sql.to_string()
    }

    /// Hallucination guard, then assembly.
    #[allow(clippy::too_many_arguments)]
    // Reason: assembly needs the full pipeline context in one place.
    fn guard_and_assemble(
        &self,
        request: &ChatRequest,
        tier: &TierPolicy,
        question: &str,
        preface: Option<&str>,
        result: &QueryResult,
        report: &DataQualityReport,
        analysis: Analysis,
    ) -> ChatResponse {
        let validation = response::validate(&analysis.text, result, question);
        if !validation.is_valid {
            warn!(errors = ?validation.errors, "response failed grounding; suppressing");
            return ChatResponse {
                text:  askql_error::GENERIC_FALLBACK.to_string(),
                chart: None,
                meta:  ResponseMeta {
                    intent: Intent::DataQuery.as_str().to_string(),
                    tier: tier.name,
                    tables: result.tables.clone(),
                    rows: result.row_count,
                    limited: result.row_count as u64 == u64::from(tier.max_rows),
                    metaphor_used: preface.is_some(),
                    suggestions: None,
                },
            };
        }

        let mut response = assemble(
            &analysis,
            &AssemblyContext {
                tier,
                intent: Intent::DataQuery,
                metaphor_preface: preface,
                quality_disclosure: report.disclosure_message.as_deref(),
                result,
                chart_requested: request.request_chart,
                forecast_requested: request.request_forecast,
            },
        );
        // An explicit chart ask with no model hint still gets a derived one.
        if response.chart.is_none() && tier.allow_charts && request.request_chart {
            response.chart = derive_chart(&result.rows);
        }
        response
    }

    fn plain_response(&self, tier: &TierPolicy, intent: Intent, text: String) -> ChatResponse {
        ChatResponse {
            text,
            chart: None,
            meta: ResponseMeta {
                intent: intent.as_str().to_string(),
                tier: tier.name,
                tables: Vec::new(),
                rows: 0,
                limited: false,
                metaphor_used: false,
                suggestions: None,
            },
        }
    }

    fn failure_response(
        &self,
        tier: &TierPolicy,
        intent: Intent,
        error: &GatewayError,
    ) -> ChatResponse {
        warn!(code = error.error_code(), error = %error, "request failed");
        let suggestions = error.suggestions();
        let text = if suggestions.is_empty() {
            error.user_message()
        } else {
            format!("{}\n\nNext steps: {}.", error.user_message(), suggestions.join("; "))
        };
        self.plain_response(tier, intent, text)
    }

    fn no_data_response(&self, tier: &TierPolicy, reason: InactiveReason) -> ChatResponse {
        let text = match reason {
            InactiveReason::EmptySource => format!(
                "Your connected source doesn't contain any rows yet. {}",
                askql_error::NO_DATA_MESSAGE
            ),
            InactiveReason::Syncing => {
                "Your data is still syncing. Give it a moment, then ask again.".to_string()
            },
            InactiveReason::Errored => format!(
                "Your source's last sync failed. {}",
                askql_error::NO_DATA_MESSAGE
            ),
            InactiveReason::NoSources => askql_error::NO_DATA_MESSAGE.to_string(),
        };
        self.plain_response(tier, Intent::DataQuery, text)
    }

    /// Fixed, structured missing-columns reply. Never calls the model.
    fn educational_response(
        &self,
        tier: &TierPolicy,
        data: &ResolvedData,
        missing: &[RequiredColumn],
    ) -> ChatResponse {
        let mut lines =
            vec!["To answer that, your data would need these columns:".to_string(), String::new()];
        for column in missing {
            let mut line = format!(
                "• {} ({}), e.g. {}",
                column.name, column.data_type, column.example
            );
            if !column.alternatives.is_empty() {
                line.push_str(&format!(". Alternatives: {}", column.alternatives.join(", ")));
            }
            lines.push(line);
        }

        let supported = supported_analyses(data);
        if !supported.is_empty() {
            lines.push(String::new());
            lines.push("With the columns you have today, I can still help with:".to_string());
            for analysis in supported {
                lines.push(format!("• {analysis}"));
            }
        }

        self.plain_response(tier, Intent::DataQuery, lines.join("\n"))
    }
}

/// A failure inside one planning/execution step.
enum StepFailure {
    /// The planner flagged columns the schema lacks.
    MissingColumns(Vec<RequiredColumn>),
    /// Anything else, already mapped to the taxonomy.
    Error(GatewayError),
}

impl From<GatewayError> for StepFailure {
    fn from(e: GatewayError) -> Self {
        Self::Error(e)
    }
}

/// Model deadline wrapper: expiry reads as a validation problem with a
/// simplify-the-question suggestion, per the seam taxonomy.
async fn with_llm_deadline<T>(
    deadline: Instant,
    fut: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout_at(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(GatewayError::validation(
            "the analysis took too long; try a simpler question",
        )),
    }
}

/// Pick the backing source for a statement by its FROM table.
fn source_for<'a>(data: &'a ResolvedData, sql: &str) -> &'a DataSourceDescriptor {
    match referenced_table(sql) {
        Some(table) => data.source_for_table(&table),
        None => &data.primary().descriptor,
    }
}

/// Turn planner-flagged column names into educational entries, reusing the
/// curated catalog where a name matches and synthesizing a generic entry
/// where it doesn't.
fn resolve_required(names: &[String]) -> Vec<RequiredColumn> {
    names
        .iter()
        .map(|name| {
            crate::intent::requirements::catalog_entry(name).unwrap_or_else(|| RequiredColumn {
                name:         name.clone(),
                data_type:    "numeric".to_string(),
                example:      "42".to_string(),
                alternatives: Vec::new(),
            })
        })
        .collect()
}

/// Analyses the current schema still supports, for the educational reply.
fn supported_analyses(data: &ResolvedData) -> Vec<String> {
    let Some(handle) = data.handles().next() else {
        return Vec::new();
    };
    let roles = column_roles(handle, "");
    let mut supported = Vec::new();
    if let (Some(metric), Some(category)) = (&roles.numeric, &roles.categorical) {
        supported.push(format!("Top {category} by {metric}"));
    }
    if let (Some(metric), Some(date)) = (&roles.numeric, &roles.date) {
        supported.push(format!("{metric} trends over {date}"));
    }
    if let Some(metric) = &roles.numeric {
        supported.push(format!("Totals and averages for {metric}"));
    }
    supported
}
