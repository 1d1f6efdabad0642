//! In-memory collaborator fakes shared by askql unit and integration tests.
//!
//! Everything here is deterministic: a manual clock, an in-memory source
//! store with materialized file rows, an in-memory transcript store, and a
//! scripted prompt service that replays queued responses and records which
//! capabilities were called.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use askql_core::chat::store::{ChatMessage, ConversationStore, MessageRole, content_hash};
use askql_core::clock::Clock;
use askql_core::db::types::Row;
use askql_core::executor::QueryResult;
use askql_core::prompt::{
    Analysis, LlmSqlReview, MultiStepOutline, NarrativeRules, PromptService, StepSummary,
};
use askql_core::sources::descriptor::{
    ColumnSchema, DataSourceDescriptor, SchemaMap, SourceKind, SourceStatus,
};
use askql_core::sources::store::DataSourceStore;
use askql_error::{GatewayError, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use indexmap::IndexMap;
use parking_lot::Mutex;
use uuid::Uuid;

// ============================================================================
// Clock
// ============================================================================

/// A clock tests move by hand.
pub struct ManualClock {
    now_ms: Mutex<i64>,
}

impl ManualClock {
    /// Start the clock at a fixed point (2026-01-01T00:00:00Z).
    #[must_use]
    pub fn new() -> Arc<Self> {
        Self::starting_at(1_767_225_600_000)
    }

    /// Start the clock at an explicit epoch-millisecond timestamp.
    #[must_use]
    pub fn starting_at(epoch_ms: i64) -> Arc<Self> {
        Arc::new(Self {
            now_ms: Mutex::new(epoch_ms),
        })
    }

    /// Move time forward.
    pub fn advance_ms(&self, delta_ms: i64) {
        *self.now_ms.lock() += delta_ms;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(*self.now_ms.lock()).single().expect("valid timestamp")
    }
}

// ============================================================================
// Source store
// ============================================================================

struct StoredSource {
    descriptor: DataSourceDescriptor,
    rows:       Vec<Row>,
}

/// In-memory [`DataSourceStore`] with materialized file rows.
#[derive(Default)]
pub struct InMemorySourceStore {
    sources: Mutex<Vec<(i64, StoredSource)>>,
}

impl InMemorySourceStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a file source for a user with its schema and rows.
    pub fn add_file_source(
        &self,
        user_id: i64,
        id: i64,
        name: &str,
        columns: &[(&str, &str)],
        rows: Vec<Row>,
    ) {
        let mut schema = SchemaMap::new();
        for (column, data_type) in columns {
            schema.insert((*column).to_string(), ColumnSchema::of_type(*data_type));
        }
        let descriptor = DataSourceDescriptor {
            id,
            name: name.to_string(),
            kind: SourceKind::File,
            schema,
            row_count: rows.len() as u64,
            status: if rows.is_empty() { SourceStatus::Empty } else { SourceStatus::Active },
            connection_secret: None,
        };
        self.sources.lock().push((
            user_id,
            StoredSource {
                descriptor,
                rows,
            },
        ));
    }

    /// Register an arbitrary descriptor (live sources, odd statuses).
    pub fn add_descriptor(&self, user_id: i64, descriptor: DataSourceDescriptor) {
        self.sources.lock().push((
            user_id,
            StoredSource {
                descriptor,
                rows: Vec::new(),
            },
        ));
    }
}

#[async_trait]
impl DataSourceStore for InMemorySourceStore {
    async fn list_active(&self, user_id: i64) -> Result<Vec<DataSourceDescriptor>> {
        Ok(self
            .sources
            .lock()
            .iter()
            .filter(|(owner, _)| *owner == user_id)
            .map(|(_, stored)| stored.descriptor.clone())
            .collect())
    }

    async fn rows_of(&self, source_id: i64, limit: u32) -> Result<Vec<Row>> {
        let sources = self.sources.lock();
        let stored = sources
            .iter()
            .map(|(_, stored)| stored)
            .find(|stored| stored.descriptor.id == source_id)
            .ok_or_else(|| GatewayError::internal(format!("unknown source {source_id}")))?;
        Ok(stored.rows.iter().take(limit as usize).cloned().collect())
    }
}

/// Build a row from column/value pairs.
#[must_use]
pub fn row(pairs: &[(&str, serde_json::Value)]) -> Row {
    let mut row: Row = IndexMap::new();
    for (name, value) in pairs {
        row.insert((*name).to_string(), value.clone());
    }
    row
}

// ============================================================================
// Conversation store
// ============================================================================

/// In-memory [`ConversationStore`].
pub struct InMemoryConversationStore {
    clock:    Arc<dyn Clock>,
    next_id:  AtomicI64,
    messages: Mutex<Vec<ChatMessage>>,
}

impl InMemoryConversationStore {
    /// An empty store stamping messages with `clock`.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            next_id: AtomicI64::new(1),
            messages: Mutex::new(Vec::new()),
        }
    }

    /// Every stored message, in insertion order.
    #[must_use]
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.messages.lock().clone()
    }

    fn store(
        &self,
        conversation_id: Option<i64>,
        role: MessageRole,
        content: &str,
        message_hash: String,
        request_id: Option<Uuid>,
        metadata: Option<serde_json::Value>,
    ) -> ChatMessage {
        let message = ChatMessage {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            conversation_id,
            role,
            content: content.to_string(),
            message_hash,
            request_id,
            is_complete: true,
            metadata,
            created_at: self.clock.now(),
        };
        self.messages.lock().push(message.clone());
        message
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn save_user(
        &self,
        user_id: i64,
        conversation_id: Option<i64>,
        content: &str,
        request_id: Option<Uuid>,
    ) -> Result<ChatMessage> {
        Ok(self.store(
            conversation_id,
            MessageRole::User,
            content,
            content_hash(user_id, conversation_id, content),
            request_id,
            None,
        ))
    }

    async fn save_ai(
        &self,
        _user_id: i64,
        conversation_id: Option<i64>,
        content: &str,
        metadata: Option<serde_json::Value>,
        request_hash: &str,
    ) -> Result<ChatMessage> {
        Ok(self.store(
            conversation_id,
            MessageRole::Assistant,
            content,
            request_hash.to_string(),
            None,
            metadata,
        ))
    }

    async fn update(&self, message_id: i64, content: &str, is_complete: bool) -> Result<()> {
        let mut messages = self.messages.lock();
        let message = messages
            .iter_mut()
            .find(|m| m.id == message_id)
            .ok_or_else(|| GatewayError::internal(format!("unknown message {message_id}")))?;
        message.content = content.to_string();
        message.is_complete = is_complete;
        Ok(())
    }

    async fn find_by_hash(&self, message_hash: &str) -> Result<Option<ChatMessage>> {
        Ok(self
            .messages
            .lock()
            .iter()
            .rev()
            .find(|m| m.message_hash == message_hash && m.role == MessageRole::Assistant)
            .cloned())
    }
}

// ============================================================================
// Prompt service
// ============================================================================

/// Scripted [`PromptService`]: replays queued responses and records calls.
#[derive(Default)]
pub struct ScriptedPromptService {
    plans:      Mutex<VecDeque<String>>,
    reviews:    Mutex<VecDeque<LlmSqlReview>>,
    outlines:   Mutex<VecDeque<MultiStepOutline>>,
    analyses:   Mutex<VecDeque<Analysis>>,
    syntheses:  Mutex<VecDeque<String>>,
    calls:      Mutex<Vec<&'static str>>,
}

impl ScriptedPromptService {
    /// An empty script; unscripted calls fail loudly.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a planner response (raw model output, sentinels included).
    pub fn push_plan(&self, sql: &str) {
        self.plans.lock().push_back(sql.to_string());
    }

    /// Queue a model review.
    pub fn push_review(&self, review: LlmSqlReview) {
        self.reviews.lock().push_back(review);
    }

    /// Queue a multi-step outline.
    pub fn push_outline(&self, outline: MultiStepOutline) {
        self.outlines.lock().push_back(outline);
    }

    /// Queue an analysis.
    pub fn push_analysis(&self, analysis: Analysis) {
        self.analyses.lock().push_back(analysis);
    }

    /// Queue a synthesis answer.
    pub fn push_synthesis(&self, text: &str) {
        self.syntheses.lock().push_back(text.to_string());
    }

    /// Capability names invoked so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }

    fn record(&self, capability: &'static str) {
        self.calls.lock().push(capability);
    }

    fn pop<T>(queue: &Mutex<VecDeque<T>>, capability: &'static str) -> Result<T> {
        queue
            .lock()
            .pop_front()
            .ok_or_else(|| GatewayError::internal(format!("no scripted {capability} response")))
    }
}

#[async_trait]
impl PromptService for ScriptedPromptService {
    async fn plan_sql(&self, _question: &str, _schema: &str) -> Result<String> {
        self.record("plan_sql");
        Self::pop(&self.plans, "plan_sql")
    }

    async fn validate_sql(
        &self,
        _sql: &str,
        _question: &str,
        _schema: &str,
    ) -> Result<LlmSqlReview> {
        self.record("validate_sql");
        Ok(self.reviews.lock().pop_front().unwrap_or_else(LlmSqlReview::not_applicable))
    }

    async fn plan_multi_step(
        &self,
        _question: &str,
        _schema: &str,
        _max_sub_steps: u32,
    ) -> Result<MultiStepOutline> {
        self.record("plan_multi_step");
        Ok(self.outlines.lock().pop_front().unwrap_or_else(MultiStepOutline::single_step))
    }

    async fn analyze(
        &self,
        _question: &str,
        _result: &QueryResult,
        _rules: &NarrativeRules,
        _missing_columns: &[String],
    ) -> Result<Analysis> {
        self.record("analyze");
        Self::pop(&self.analyses, "analyze")
    }

    async fn synthesize(
        &self,
        _question: &str,
        _steps: &[StepSummary],
        _rules: &NarrativeRules,
    ) -> Result<String> {
        self.record("synthesize");
        Self::pop(&self.syntheses, "synthesize")
    }
}
