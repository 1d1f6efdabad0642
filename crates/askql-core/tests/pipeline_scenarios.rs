//! End-to-end pipeline scenarios over in-memory collaborators.
//!
//! These drive the full orchestrator: rate limiting, metaphor rewriting,
//! intent routing, source resolution, planning, validation, execution,
//! quality inspection, synthesis and the hallucination guard.

use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;

use askql_core::chat::dedup::DedupCache;
use askql_core::chat::types::{ChatRequest, ChatResponse};
use askql_core::chat::Orchestrator;
use askql_core::config::{TierCatalog, TierName};
use askql_core::db::pool::PoolRegistry;
use askql_core::db::types::Row;
use askql_core::executor::QueryExecutor;
use askql_core::planner::Planner;
use askql_core::prompt::{Analysis, ChartHint, MultiStepOutline, OutlineStep};
use askql_core::chat::types::ChartKind;
use askql_core::rate_limit::RateLimiter;
use askql_core::sources::descriptor::{
    ColumnSchema, DataSourceDescriptor, SchemaMap, SourceKind, SourceStatus,
};
use askql_core::sources::introspect::SchemaIntrospector;
use askql_core::sources::resolver::DataSourceResolver;
use askql_error::GENERIC_FALLBACK;
use askql_test_utils::{
    InMemoryConversationStore, InMemorySourceStore, ManualClock, ScriptedPromptService, row,
};

struct Harness {
    clock:         Arc<ManualClock>,
    sources:       Arc<InMemorySourceStore>,
    conversations: Arc<InMemoryConversationStore>,
    prompts:       Arc<ScriptedPromptService>,
    orchestrator:  Orchestrator,
}

fn harness() -> Harness {
    let _ = tracing_subscriber::fmt().with_env_filter("askql_core=debug").try_init();

    let clock = ManualClock::new();
    let sources = Arc::new(InMemorySourceStore::new());
    let conversations = Arc::new(InMemoryConversationStore::new(clock.clone()));
    let prompts = Arc::new(ScriptedPromptService::new());
    let registry = Arc::new(PoolRegistry::new());

    let orchestrator = Orchestrator::new(
        TierCatalog::default(),
        RateLimiter::new(clock.clone()),
        DataSourceResolver::new(sources.clone(), Arc::new(SchemaIntrospector::new(registry.clone()))),
        Planner::new(prompts.clone()),
        prompts.clone(),
        QueryExecutor::new(registry, sources.clone()),
        conversations.clone(),
        DedupCache::new(clock.clone()),
        clock.clone(),
    );

    Harness {
        clock,
        sources,
        conversations,
        prompts,
        orchestrator,
    }
}

fn sales_rows() -> Vec<Row> {
    vec![
        row(&[("date", json!("2026-01-05")), ("product", json!("widget")), ("units", json!(12)), ("revenue", json!(1500))]),
        row(&[("date", json!("2026-01-06")), ("product", json!("gadget")), ("units", json!(7)), ("revenue", json!(900))]),
        row(&[("date", json!("2026-01-07")), ("product", json!("widget")), ("units", json!(4)), ("revenue", json!(600))]),
    ]
}

fn seed_sales(harness: &Harness, user_id: i64) {
    harness.sources.add_file_source(
        user_id,
        1,
        "Sales",
        &[("date", "date"), ("product", "text"), ("units", "integer"), ("revenue", "numeric")],
        sales_rows(),
    );
}

fn request(user_id: i64, tier: TierName, message: &str) -> ChatRequest {
    ChatRequest {
        user_id,
        tier,
        message: message.to_string(),
        conversation_id: Some(10),
        extended_responses: false,
        is_suggestion_followup: false,
        request_id: None,
        request_chart: false,
        request_forecast: false,
    }
}

async fn chat(harness: &Harness, req: ChatRequest) -> ChatResponse {
    harness.orchestrator.chat(req).await
}

// ============================================================================
// S1: starter tier, file source, top-product question
// ============================================================================

#[tokio::test]
async fn test_s1_starter_top_product() {
    let harness = harness();
    seed_sales(&harness, 1);
    harness
        .prompts
        .push_analysis(Analysis::plain_text("Widget is your top product with 1500 in revenue."));

    let response = chat(&harness, request(1, TierName::Starter, "what's the top product?")).await;

    assert!(response.text.contains("Widget is your top product"));
    assert!(response.text.contains("Data basis: sales (3 rows analyzed)"));
    assert_eq!(response.meta.tables, vec!["sales"]);
    assert_eq!(response.meta.rows, 3);
    assert!(!response.meta.limited);
    assert!(response.chart.is_none(), "starter tier never gets charts");
    // The canonical top-N shortcut answers without the planner.
    assert_eq!(harness.prompts.calls(), vec!["analyze"]);
}

// ============================================================================
// S2: professional tier, weather metaphor
// ============================================================================

#[tokio::test]
async fn test_s2_professional_weather_metaphor() {
    let harness = harness();
    seed_sales(&harness, 2);
    harness.prompts.push_analysis(Analysis {
        text:        "Business looks healthy: widget brought in 1500, gadget 900.".to_string(),
        chart:       Some(ChartHint {
            kind: ChartKind::Bar,
            x:    "product".to_string(),
            y:    "revenue".to_string(),
        }),
        suggestions: vec!["Which product grew fastest?".to_string()],
        forecast:    None,
    });

    let response = chat(&harness, request(2, TierName::Professional, "how's the weather?")).await;

    assert!(
        response.text.starts_with("☀️ Let me check the business weather for you..."),
        "preface must lead: {}",
        response.text
    );
    assert!(response.meta.metaphor_used);
    assert_eq!(response.meta.intent, "data_query");
    let chart = response.chart.expect("professional tier gets the chart");
    assert_eq!(chart.x, "product");
    assert_eq!(chart.data.len(), 3);
    assert_eq!(response.meta.suggestions.unwrap().len(), 1);
    assert!(response.text.split_whitespace().count() <= 180);
}

// ============================================================================
// S3: enterprise tier, multi-step comparison
// ============================================================================

#[tokio::test]
async fn test_s3_enterprise_multi_step() {
    let harness = harness();
    harness.sources.add_file_source(
        3,
        7,
        "Orders",
        &[("quarter", "text"), ("total", "numeric")],
        vec![
            row(&[("quarter", json!("Q1")), ("total", json!(125_000.50))]),
            row(&[("quarter", json!("Q2")), ("total", json!(98_000.25))]),
        ],
    );
    harness.prompts.push_outline(MultiStepOutline {
        needs_multi_step: true,
        steps:            vec![
            OutlineStep {
                order:        1,
                description:  "quarterly totals".to_string(),
                sub_question: "What was revenue in Q1?".to_string(),
                depends_on:   vec![],
            },
            OutlineStep {
                order:        2,
                description:  "compare quarters".to_string(),
                sub_question: "What was revenue in Q2?".to_string(),
                depends_on:   vec![1],
            },
        ],
    });
    harness.prompts.push_plan("SELECT quarter, total FROM orders WHERE quarter = 'Q1' LIMIT 10");
    harness.prompts.push_plan("SELECT quarter, total FROM orders WHERE quarter = 'Q2' LIMIT 10");
    harness.prompts.push_synthesis(
        "Q1 brought in 125000.50 against 98000.25 in Q2, a decline driven by fewer large orders. \
         Forecast: if the slide continues, Q3 lands below 90000.25.",
    );

    let response = chat(
        &harness,
        request(3, TierName::Enterprise, "compare Q1 vs Q2 revenue and say why"),
    )
    .await;

    assert!(response.text.contains("125000.50"));
    assert!(response.text.contains("98000.25"));
    assert!(response.text.contains("Forecast:"));
    assert_eq!(response.meta.tables, vec!["orders"]);
    // Two steps, each scanning both quarterly rows.
    assert_eq!(response.meta.rows, 4);
    let calls = harness.prompts.calls();
    assert_eq!(
        calls,
        vec!["plan_multi_step", "plan_sql", "plan_sql", "synthesize"],
        "multi-step path skips the per-step model review"
    );
}

// ============================================================================
// S4: empty source short-circuits before any model call
// ============================================================================

#[tokio::test]
async fn test_s4_empty_source_no_data() {
    let harness = harness();
    harness.sources.add_file_source(4, 9, "Sales", &[("product", "text")], vec![]);

    let response = chat(&harness, request(4, TierName::Starter, "show me churn")).await;

    assert!(response.text.contains("connect a database"));
    assert!(response.text.contains("upload a file"));
    assert!(harness.prompts.calls().is_empty(), "no model call for empty sources");
}

// ============================================================================
// S5: missing-column educational reply
// ============================================================================

#[tokio::test]
async fn test_s5_profit_margin_educational() {
    let harness = harness();
    seed_sales(&harness, 5);

    let response = chat(&harness, request(5, TierName::Starter, "what's my profit margin?")).await;

    assert!(response.text.contains("cost (numeric), e.g. 42.50"));
    assert!(response.text.contains("Alternatives: cogs, unit_cost, expenses"));
    assert!(response.text.contains("I can still help with"));
    assert!(response.text.contains("Top product by revenue"));
    assert!(harness.prompts.calls().is_empty(), "educational reply never calls the model");
}

// ============================================================================
// S6: enterprise spam cap
// ============================================================================

#[tokio::test]
async fn test_s6_enterprise_spam_cap() {
    let harness = harness();
    seed_sales(&harness, 6);

    for i in 0..60 {
        let response = chat(
            &harness,
            request(6, TierName::Enterprise, &format!("what can you do? (attempt {i})")),
        )
        .await;
        assert_eq!(response.meta.intent, "faq_product");
        harness.clock.advance_ms(10);
    }

    let denied = chat(
        &harness,
        request(6, TierName::Enterprise, "what can you do? (attempt 60)"),
    )
    .await;
    assert!(
        denied.text.contains("rapid succession"),
        "61st request in a minute is denied: {}",
        denied.text
    );
    assert!(harness.prompts.calls().is_empty());
}

// ============================================================================
// Deduplication (property 6)
// ============================================================================

#[tokio::test]
async fn test_identical_resubmission_returns_identical_text() {
    let harness = harness();
    seed_sales(&harness, 7);
    harness
        .prompts
        .push_analysis(Analysis::plain_text("Widget is your top product with 1500 in revenue."));

    let first = chat(&harness, request(7, TierName::Starter, "what's the top product?")).await;
    harness.clock.advance_ms(5_000);
    let second = chat(&harness, request(7, TierName::Starter, "what's the top product?")).await;

    assert_eq!(first.text, second.text, "byte-identical within the dedup window");
    assert_eq!(
        harness.prompts.calls(),
        vec!["analyze"],
        "the second submission does not re-run the pipeline"
    );
}

#[tokio::test]
async fn test_request_id_dedup_round_trip() {
    let harness = harness();
    seed_sales(&harness, 8);
    harness
        .prompts
        .push_analysis(Analysis::plain_text("Widget is your top product with 1500 in revenue."));

    let request_id = Uuid::new_v4();
    let mut req = request(8, TierName::Starter, "what's the top product?");
    req.request_id = Some(request_id);
    let first = chat(&harness, req.clone()).await;

    // Different content, same request id: still the cached response.
    req.message = "what's the top product?? (resent)".to_string();
    let second = chat(&harness, req).await;
    assert_eq!(first.text, second.text);
}

// ============================================================================
// Hallucination guard (property 10)
// ============================================================================

#[tokio::test]
async fn test_empty_result_with_specific_number_suppressed() {
    let harness = harness();
    // Active descriptor whose row store is empty: the scan returns nothing.
    let mut schema = SchemaMap::new();
    schema.insert("product".to_string(), ColumnSchema::of_type("text"));
    schema.insert("revenue".to_string(), ColumnSchema::of_type("numeric"));
    harness.sources.add_descriptor(9, DataSourceDescriptor {
        id: 20,
        name: "Sales".to_string(),
        kind: SourceKind::File,
        schema,
        row_count: 5,
        status: SourceStatus::Active,
        connection_secret: None,
    });
    harness
        .prompts
        .push_analysis(Analysis::plain_text("The top product brought in 42."));

    let response = chat(&harness, request(9, TierName::Starter, "what's the top product?")).await;

    assert_eq!(response.text, GENERIC_FALLBACK);
    assert!(response.chart.is_none());
    assert_eq!(response.meta.rows, 0);
}

// ============================================================================
// Routing edges
// ============================================================================

#[tokio::test]
async fn test_irrelevant_question_stays_out_of_pipeline() {
    let harness = harness();
    seed_sales(&harness, 11);

    let response = chat(
        &harness,
        request(11, TierName::Professional, "what is the capital of France?"),
    )
    .await;

    assert_eq!(response.meta.intent, "irrelevant");
    assert!(harness.prompts.calls().is_empty());
}

#[tokio::test]
async fn test_transcript_records_both_turns() {
    let harness = harness();
    seed_sales(&harness, 12);
    harness
        .prompts
        .push_analysis(Analysis::plain_text("Widget is your top product with 1500 in revenue."));

    let response = chat(&harness, request(12, TierName::Starter, "what's the top product?")).await;
    let messages = harness.conversations.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].content, "what's the top product?");
    assert_eq!(messages[1].content, response.text);
    assert!(messages[1].metadata.is_some());
}
