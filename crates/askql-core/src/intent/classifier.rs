//! Keyword-driven intent routing.
//!
//! Classification is a lookup over data-driven pattern tables, so new
//! phrases are additive edits to the tables, not new branches. Everything
//! defaults to a data query; calling something irrelevant requires an
//! explicit off-topic phrase.

use serde::Serialize;

/// Where a message should be routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// An analytical question over the user's data.
    DataQuery,
    /// A question about the product itself (plans, connections, features).
    FaqProduct,
    /// Explicitly off-topic smalltalk or trivia.
    Irrelevant,
}

impl Intent {
    /// Wire form used in response metadata.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DataQuery => "data_query",
            Self::FaqProduct => "faq_product",
            Self::Irrelevant => "irrelevant",
        }
    }
}

/// Off-topic phrases. Each must be explicit enough that a business question
/// cannot contain it by accident.
const IRRELEVANT_PHRASES: &[&str] = &[
    "capital of",
    "recipe for",
    "write a poem",
    "write me a poem",
    "tell me a joke",
    "meaning of life",
    "weather in",
    "weather forecast for",
    "who won the",
    "translate this",
    "lyrics of",
    "lyrics to",
    "directions to",
    "how do i cook",
];

/// Product questions: plans, data connections, capabilities.
const FAQ_PHRASES: &[&str] = &[
    "what can you do",
    "what do you do",
    "how do i connect",
    "how do i upload",
    "how to connect",
    "how to upload",
    "supported database",
    "which databases",
    "pricing",
    "how much does",
    "upgrade my plan",
    "change my plan",
    "cancel my subscription",
    "free trial",
    "is my data safe",
    "data privacy",
];

/// Classify one message.
#[must_use]
pub fn classify(message: &str) -> Intent {
    let normalized = normalize(message);

    if FAQ_PHRASES.iter().any(|p| normalized.contains(p)) {
        return Intent::FaqProduct;
    }
    if IRRELEVANT_PHRASES.iter().any(|p| normalized.contains(p)) {
        return Intent::Irrelevant;
    }
    Intent::DataQuery
}

/// Lowercase and collapse whitespace runs so multi-word phrases match
/// regardless of the user's spacing.
fn normalize(message: &str) -> String {
    message
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
