//! Collaborator stores
//!
//! The gateway consumes conversation, memory, and video-artifact
//! persistence through narrow trait interfaces. The process-local
//! implementations here back development and tests; production deployments
//! swap in implementations over their own persistence without touching the
//! core. Upserts are idempotent on their natural keys.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::llm::{GatewayResult, Role};

/// Result of a conversation ownership check
#[derive(Debug, Clone)]
pub struct OwnershipCheck {
    pub exists: bool,
    pub total_tokens: u64,
}

/// A persisted conversation message
#[derive(Debug, Clone)]
pub struct MessageRecord {
    pub conversation_id: Uuid,
    pub role: Role,
    pub content: String,
    pub token_count: u64,
    pub model_used: Option<String>,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One long-term memory row. Unique on
/// `(conversation_id, source_window_end_at)`.
#[derive(Debug, Clone)]
pub struct UserMemory {
    pub id: Uuid,
    pub user_id: String,
    pub conversation_id: Option<Uuid>,
    pub source_window_end_at: DateTime<Utc>,
    pub summary_text: String,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Per-conversation summarization debounce state
#[derive(Debug, Clone)]
pub struct ConversationMemoryState {
    pub conversation_id: Uuid,
    pub user_id: String,
    pub last_summarized_at: Option<DateTime<Utc>>,
    pub last_summarized_message_created_at: Option<DateTime<Utc>>,
    pub last_summarized_total_tokens: Option<u64>,
    pub updated_at: DateTime<Utc>,
}

/// Compact metadata for a processed video asset
#[derive(Debug, Clone)]
pub struct VideoArtifact {
    pub id: Uuid,
    pub user_id: String,
    pub ready: bool,
    pub title: String,
    pub summary: String,
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn verify_ownership(
        &self,
        conversation_id: Uuid,
        user_id: &str,
    ) -> GatewayResult<OwnershipCheck>;

    async fn increment_tokens(&self, conversation_id: Uuid, delta: u64) -> GatewayResult<()>;

    async fn record_message(&self, record: MessageRecord) -> GatewayResult<()>;
}

#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn list_recent(&self, user_id: &str, limit: usize) -> GatewayResult<Vec<UserMemory>>;

    async fn upsert_memory(&self, row: UserMemory) -> GatewayResult<()>;

    async fn get_state(
        &self,
        conversation_id: Uuid,
    ) -> GatewayResult<Option<ConversationMemoryState>>;

    async fn upsert_state(&self, row: ConversationMemoryState) -> GatewayResult<()>;

    async fn list_messages_since(
        &self,
        conversation_id: Uuid,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> GatewayResult<Vec<MessageRecord>>;
}

#[async_trait]
pub trait VideoArtifactStore: Send + Sync {
    /// Ready artifacts among `asset_ids` that belong to `user_id`
    async fn list_ready_for(
        &self,
        asset_ids: &[Uuid],
        user_id: &str,
    ) -> GatewayResult<Vec<VideoArtifact>>;
}

#[derive(Debug, Clone)]
struct ConversationRow {
    user_id: String,
    total_tokens: u64,
}

/// Process-local store backing all three collaborator interfaces
#[derive(Default)]
pub struct InMemoryStore {
    conversations: DashMap<Uuid, ConversationRow>,
    messages: DashMap<Uuid, Vec<MessageRecord>>,
    memories: DashMap<String, UserMemory>,
    states: DashMap<Uuid, ConversationMemoryState>,
    videos: DashMap<Uuid, VideoArtifact>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Natural key for the memory upsert
    fn memory_key(conversation_id: Option<Uuid>, window_end: DateTime<Utc>) -> String {
        format!(
            "{}:{}",
            conversation_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "global".to_string()),
            window_end.timestamp_millis()
        )
    }

    pub fn seed_conversation(&self, conversation_id: Uuid, user_id: &str, total_tokens: u64) {
        self.conversations.insert(
            conversation_id,
            ConversationRow {
                user_id: user_id.to_string(),
                total_tokens,
            },
        );
    }

    pub fn seed_video(&self, artifact: VideoArtifact) {
        self.videos.insert(artifact.id, artifact);
    }

    pub fn message_count(&self, conversation_id: Uuid) -> usize {
        self.messages
            .get(&conversation_id)
            .map(|m| m.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    async fn verify_ownership(
        &self,
        conversation_id: Uuid,
        user_id: &str,
    ) -> GatewayResult<OwnershipCheck> {
        match self.conversations.get(&conversation_id) {
            Some(row) if row.user_id == user_id => Ok(OwnershipCheck {
                exists: true,
                total_tokens: row.total_tokens,
            }),
            _ => Ok(OwnershipCheck {
                exists: false,
                total_tokens: 0,
            }),
        }
    }

    async fn increment_tokens(&self, conversation_id: Uuid, delta: u64) -> GatewayResult<()> {
        if let Some(mut row) = self.conversations.get_mut(&conversation_id) {
            row.total_tokens += delta;
        }
        Ok(())
    }

    async fn record_message(&self, record: MessageRecord) -> GatewayResult<()> {
        self.messages
            .entry(record.conversation_id)
            .or_default()
            .push(record);
        Ok(())
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn list_recent(&self, user_id: &str, limit: usize) -> GatewayResult<Vec<UserMemory>> {
        let mut rows: Vec<UserMemory> = self
            .memories
            .iter()
            .filter(|entry| entry.value().user_id == user_id)
            .map(|entry| entry.value().clone())
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn upsert_memory(&self, row: UserMemory) -> GatewayResult<()> {
        let key = Self::memory_key(row.conversation_id, row.source_window_end_at);
        self.memories.insert(key, row);
        Ok(())
    }

    async fn get_state(
        &self,
        conversation_id: Uuid,
    ) -> GatewayResult<Option<ConversationMemoryState>> {
        Ok(self.states.get(&conversation_id).map(|s| s.clone()))
    }

    async fn upsert_state(&self, row: ConversationMemoryState) -> GatewayResult<()> {
        self.states.insert(row.conversation_id, row);
        Ok(())
    }

    async fn list_messages_since(
        &self,
        conversation_id: Uuid,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> GatewayResult<Vec<MessageRecord>> {
        let mut rows: Vec<MessageRecord> = self
            .messages
            .get(&conversation_id)
            .map(|m| m.clone())
            .unwrap_or_default()
            .into_iter()
            .filter(|m| since.map(|s| m.created_at > s).unwrap_or(true))
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        rows.truncate(limit);
        Ok(rows)
    }
}

#[async_trait]
impl VideoArtifactStore for InMemoryStore {
    async fn list_ready_for(
        &self,
        asset_ids: &[Uuid],
        user_id: &str,
    ) -> GatewayResult<Vec<VideoArtifact>> {
        Ok(asset_ids
            .iter()
            .filter_map(|id| self.videos.get(id))
            .filter(|a| a.user_id == user_id && a.ready)
            .map(|a| a.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_row(user: &str, conv: Option<Uuid>, at: DateTime<Utc>) -> UserMemory {
        UserMemory {
            id: Uuid::new_v4(),
            user_id: user.to_string(),
            conversation_id: conv,
            source_window_end_at: at,
            summary_text: "prefers terse answers".to_string(),
            tags: vec!["style".to_string()],
            created_at: at,
        }
    }

    #[tokio::test]
    async fn test_ownership_check() {
        let store = InMemoryStore::new();
        let conv = Uuid::new_v4();
        store.seed_conversation(conv, "alice", 1200);

        let owned = store.verify_ownership(conv, "alice").await.unwrap();
        assert!(owned.exists);
        assert_eq!(owned.total_tokens, 1200);

        let other = store.verify_ownership(conv, "bob").await.unwrap();
        assert!(!other.exists);
    }

    #[tokio::test]
    async fn test_memory_upsert_idempotent_on_natural_key() {
        let store = InMemoryStore::new();
        let conv = Some(Uuid::new_v4());
        let at = Utc::now();

        store.upsert_memory(memory_row("alice", conv, at)).await.unwrap();
        store.upsert_memory(memory_row("alice", conv, at)).await.unwrap();

        let rows = store.list_recent("alice", 10).await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn test_list_messages_since_filters_and_orders() {
        let store = InMemoryStore::new();
        let conv = Uuid::new_v4();
        let base = Utc::now();
        for offset in [0i64, 60, 120] {
            store
                .record_message(MessageRecord {
                    conversation_id: conv,
                    role: Role::User,
                    content: format!("m{}", offset),
                    token_count: 5,
                    model_used: None,
                    image_url: None,
                    created_at: base + chrono::Duration::seconds(offset),
                })
                .await
                .unwrap();
        }

        let rows = store
            .list_messages_since(conv, Some(base), 24)
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].content, "m60");
    }

    #[tokio::test]
    async fn test_video_artifacts_filter_ownership_and_readiness() {
        let store = InMemoryStore::new();
        let ready = Uuid::new_v4();
        let pending = Uuid::new_v4();
        store.seed_video(VideoArtifact {
            id: ready,
            user_id: "alice".to_string(),
            ready: true,
            title: "demo".to_string(),
            summary: "login flow walkthrough".to_string(),
        });
        store.seed_video(VideoArtifact {
            id: pending,
            user_id: "alice".to_string(),
            ready: false,
            title: "wip".to_string(),
            summary: String::new(),
        });

        let found = store
            .list_ready_for(&[ready, pending], "alice")
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, ready);
    }
}
