//! Short-lived request deduplication.
//!
//! Two layers, both consulted before any work happens: an in-process
//! `(user, request_id)` cache that shortcuts repeat submissions within a
//! minute, and the transcript store's content-hash lookup for identical
//! `(user, conversation, message)` resubmissions. This module owns the
//! first layer.

use std::sync::Arc;

use dashmap::DashMap;
use uuid::Uuid;

use crate::chat::types::ChatResponse;
use crate::clock::Clock;

/// How long a cached response answers resubmissions, in milliseconds.
pub const DEDUP_TTL_MS: i64 = 60_000;

struct CachedResponse {
    response:     ChatResponse,
    stored_at_ms: i64,
}

/// In-process `(user, request_id)` response cache.
pub struct DedupCache {
    clock:   Arc<dyn Clock>,
    entries: DashMap<(i64, Uuid), CachedResponse>,
}

impl DedupCache {
    /// Create a cache reading time from `clock`.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            entries: DashMap::new(),
        }
    }

    /// The previously returned response for this request id, if still fresh.
    #[must_use]
    pub fn get(&self, user_id: i64, request_id: Uuid) -> Option<ChatResponse> {
        let now = self.clock.now_millis();
        let key = (user_id, request_id);
        let hit = self.entries.get(&key)?;
        if now - hit.stored_at_ms < DEDUP_TTL_MS {
            Some(hit.response.clone())
        } else {
            drop(hit);
            self.entries.remove(&key);
            None
        }
    }

    /// Remember a response; expired entries are swept on the way in.
    pub fn insert(&self, user_id: i64, request_id: Uuid, response: ChatResponse) {
        let now = self.clock.now_millis();
        self.entries.retain(|_, cached| now - cached.stored_at_ms < DEDUP_TTL_MS);
        self.entries.insert(
            (user_id, request_id),
            CachedResponse {
                response,
                stored_at_ms: now,
            },
        );
    }
}
