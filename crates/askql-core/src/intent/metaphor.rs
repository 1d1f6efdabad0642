//! Metaphor mapping: casual or figurative questions rewritten into concrete
//! business queries.
//!
//! Each pattern pairs trigger phrases with the concrete question the
//! pipeline should actually answer and a short human preface acknowledging
//! the figure of speech. A metaphor match overrides irrelevant
//! classification: "how's the weather?" is smalltalk on the surface but a
//! health check in intent.

/// One metaphor rewrite rule.
struct MetaphorPattern {
    /// Lowercased trigger phrases; any match fires the rule.
    triggers: &'static [&'static str],
    /// The concrete business question the pipeline answers instead.
    rewritten: &'static str,
    /// Preface prepended to the final response.
    preface: &'static str,
}

const PATTERNS: &[MetaphorPattern] = &[
    MetaphorPattern {
        triggers:  &["how's the weather", "hows the weather", "how is the weather"],
        rewritten: "Give me an overview of current business performance",
        preface:   "☀️ Let me check the business weather for you...",
    },
    MetaphorPattern {
        triggers:  &["temperature check", "take the temperature"],
        rewritten: "Summarize how key metrics are doing right now",
        preface:   "🌡️ Taking the temperature of your business...",
    },
    MetaphorPattern {
        triggers:  &["how's the pulse", "pulse check", "check the pulse"],
        rewritten: "Summarize recent activity across my data",
        preface:   "💓 Checking the pulse...",
    },
    MetaphorPattern {
        triggers:  &["are we winning", "how are we doing", "how's it going"],
        rewritten: "Give me an overview of current business performance",
        preface:   "🏆 Let's see how you're doing...",
    },
    MetaphorPattern {
        triggers:  &["crystal ball", "look into the future", "what's coming"],
        rewritten: "Show recent trends in my key metrics",
        preface:   "🔮 No crystal ball here, but the trends say a lot...",
    },
    MetaphorPattern {
        triggers:  &["low-hanging fruit", "low hanging fruit", "quick wins"],
        rewritten: "Which segments have the highest totals I could grow further?",
        preface:   "🍏 Looking for the low-hanging fruit...",
    },
    MetaphorPattern {
        triggers:  &["bleeding money", "burning money", "money pit"],
        rewritten: "Which segments have the lowest or most negative totals?",
        preface:   "🩹 Let's find where it hurts...",
    },
];

/// A fired metaphor rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaphorRewrite {
    /// The concrete question the pipeline answers.
    pub rewritten: String,
    /// Human preface for the final response.
    pub preface: String,
}

/// Rewrite a figurative question, if one of the known patterns matches.
#[must_use]
pub fn maybe_rewrite(message: &str) -> Option<MetaphorRewrite> {
    let normalized = message
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    PATTERNS
        .iter()
        .find(|pattern| pattern.triggers.iter().any(|t| normalized.contains(t)))
        .map(|pattern| MetaphorRewrite {
            rewritten: pattern.rewritten.to_string(),
            preface:   pattern.preface.to_string(),
        })
}
