//! Sliding-window rate limiting, per user and tier-aware.
//!
//! Bounded tiers get an hourly quota; the unbounded tier gets a per-minute
//! spam cap instead. Free follow-ups (clicking a suggestion we offered)
//! consume no hourly credit but still count against the spam cap. Checks
//! are serialized per store: one lock covers the read-and-append.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use crate::clock::Clock;
use crate::config::TierPolicy;

/// The hourly window, in milliseconds.
pub const HOUR_WINDOW_MS: i64 = 3_600_000;

/// The spam window, in milliseconds.
pub const SPAM_WINDOW_MS: i64 = 60_000;

/// One recorded request.
#[derive(Debug, Clone, Copy)]
struct RequestRecord {
    timestamp_ms: i64,
    /// Free follow-ups sit in the window for the spam cap but never count
    /// against the hourly quota.
    free: bool,
}

/// The verdict for one request.
#[derive(Debug, Clone, Serialize)]
pub struct RateDecision {
    /// Whether the request may proceed.
    pub allow: bool,

    /// Denial message naming the offending limit; `None` when allowed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl RateDecision {
    const fn allowed() -> Self {
        Self {
            allow:   true,
            message: None,
        }
    }

    fn denied(message: String) -> Self {
        Self {
            allow:   false,
            message: Some(message),
        }
    }
}

/// Sliding-window limiter over an injected clock.
pub struct RateLimiter {
    clock:   Arc<dyn Clock>,
    records: Mutex<HashMap<i64, Vec<RequestRecord>>>,
}

impl RateLimiter {
    /// Create a limiter reading time from `clock`.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Check one request and, when allowed, record it atomically.
    ///
    /// Never fails; denial is a value, not an error.
    pub fn check(&self, user_id: i64, tier: &TierPolicy, is_free_followup: bool) -> RateDecision {
        let now = self.clock.now_millis();
        let mut records = self.records.lock();
        let window = records.entry(user_id).or_default();
        window.retain(|r| now - r.timestamp_ms < HOUR_WINDOW_MS);

        match tier.max_queries_per_hour {
            Some(hourly_cap) => {
                if !is_free_followup {
                    let used = window.iter().filter(|r| !r.free).count();
                    if used as u64 >= u64::from(hourly_cap) {
                        return RateDecision::denied(hourly_denial(tier, hourly_cap));
                    }
                }
            },
            None => {
                if let Some(spam_cap) = tier.spam_window_cap {
                    let recent =
                        window.iter().filter(|r| now - r.timestamp_ms < SPAM_WINDOW_MS).count();
                    if recent as u64 >= u64::from(spam_cap) {
                        return RateDecision::denied(
                            "You're sending too many queries in rapid succession. \
                             Give me a minute to catch up, then ask away."
                                .to_string(),
                        );
                    }
                }
            },
        }

        window.push(RequestRecord {
            timestamp_ms: now,
            free: is_free_followup,
        });
        RateDecision::allowed()
    }
}

fn hourly_denial(tier: &TierPolicy, cap: u32) -> String {
    let upgrade = tier.name.upgrade_target().map_or_else(String::new, |target| {
        format!(" Upgrade to {target} for a higher limit.")
    });
    format!(
        "You've reached the {cap} queries per hour included in your {} plan. \
         The window slides, so capacity frees up as older queries age out.{upgrade}",
        tier.name
    )
}
