//! Intent routing: classification, metaphor rewriting, vague-query
//! detection, and concept-to-column requirements.
//!
//! Everything here is deterministic keyword lookup over data-driven tables;
//! no I/O and no model calls.

pub mod classifier;
pub mod metaphor;
pub mod requirements;
pub mod vague;

pub use classifier::{Intent, classify};
pub use metaphor::{MetaphorRewrite, maybe_rewrite};
pub use requirements::{RequiredColumn, detect_missing};
pub use vague::{DefaultInsight, VagueKind, build_default_insight, column_roles, detect};
