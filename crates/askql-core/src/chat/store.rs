//! Collaborator interface to the transcript store.
//!
//! The platform owns persistence; the core only appends turns and looks up
//! recent content hashes for deduplication.

use askql_error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Who produced a transcript message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// The human asking.
    User,
    /// The gateway answering.
    Assistant,
}

/// One persisted transcript message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Store-assigned identifier.
    pub id: i64,

    /// Transcript this message belongs to.
    pub conversation_id: Option<i64>,

    /// Who produced it.
    pub role: MessageRole,

    /// The message text.
    pub content: String,

    /// For user turns, `sha256(user_id || conversation_id || content)` of
    /// the turn itself; for assistant turns, the hash of the user turn they
    /// answer.
    pub message_hash: String,

    /// Idempotency key carried from the request, if any.
    pub request_id: Option<Uuid>,

    /// False while an answer is still being assembled.
    pub is_complete: bool,

    /// Response metadata serialized alongside assistant turns.
    pub metadata: Option<serde_json::Value>,

    /// Store-assigned creation time.
    pub created_at: DateTime<Utc>,
}

/// Access to the transcript store.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Persist the user's turn. Returns the stored message.
    async fn save_user(
        &self,
        user_id: i64,
        conversation_id: Option<i64>,
        content: &str,
        request_id: Option<Uuid>,
    ) -> Result<ChatMessage>;

    /// Persist the assistant's turn. `request_hash` is the content hash of
    /// the user turn it answers; deduplication looks replies up by it.
    async fn save_ai(
        &self,
        user_id: i64,
        conversation_id: Option<i64>,
        content: &str,
        metadata: Option<serde_json::Value>,
        request_hash: &str,
    ) -> Result<ChatMessage>;

    /// Mark a previously saved message complete and overwrite its content.
    async fn update(&self, message_id: i64, content: &str, is_complete: bool) -> Result<()>;

    /// The most recent assistant message with this content hash, if it was
    /// stored within the deduplication window.
    async fn find_by_hash(&self, message_hash: &str) -> Result<Option<ChatMessage>>;
}

/// The content hash deduplication keys on.
#[must_use]
pub fn content_hash(user_id: i64, conversation_id: Option<i64>, content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_id.to_le_bytes());
    hasher.update(conversation_id.unwrap_or(0).to_le_bytes());
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_stable() {
        let a = content_hash(1, Some(2), "top products");
        let b = content_hash(1, Some(2), "top products");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_content_hash_scoped_by_user_and_conversation() {
        let base = content_hash(1, Some(2), "top products");
        assert_ne!(base, content_hash(3, Some(2), "top products"));
        assert_ne!(base, content_hash(1, Some(9), "top products"));
        assert_ne!(base, content_hash(1, None, "top products"));
    }
}
