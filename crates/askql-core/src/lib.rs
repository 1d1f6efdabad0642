//! askql-core: the query orchestration core of the askql natural-language
//! analytics gateway.
//!
//! Users pose business questions in free text; this crate turns them into
//! safe, read-only analytical SQL over their connected data (uploaded file
//! tables, live PostgreSQL or MySQL), executes them, and synthesizes a
//! grounded answer with hallucination guards.
//!
//! # Architecture
//!
//! ```text
//! ChatRequest
//!     ↓
//! Orchestrator (chat::orchestrator)
//!     ├─ RateLimiter            (rate_limit)
//!     ├─ MetaphorMapper/Intent  (intent)
//!     ├─ DataSourceResolver     (sources) ── SchemaIntrospector ── PoolRegistry (db)
//!     ├─ Planner                (planner) ── PromptService (prompt)
//!     ├─ SQL safety validator   (sql)
//!     ├─ QueryExecutor          (executor)
//!     ├─ DataQualityAnalyzer    (quality)
//!     └─ ResponseValidator      (response)
//!     ↓
//! ChatResponse
//! ```
//!
//! Transport, authentication, ingestion and persistence live outside; the
//! core depends only on the collaborator traits in [`sources`], [`chat`] and
//! [`prompt`], plus [`clock::Clock`].

pub mod chat;
pub mod clock;
pub mod config;
pub mod db;
pub mod executor;
pub mod intent;
pub mod planner;
pub mod prompt;
pub mod quality;
pub mod rate_limit;
pub mod response;
pub mod sources;
pub mod sql;

pub use askql_error::{GatewayError, Result};

pub use chat::{ChatRequest, ChatResponse, Orchestrator};
pub use config::{TierCatalog, TierName, TierPolicy};
