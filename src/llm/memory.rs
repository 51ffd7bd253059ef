//! Long-term memory subsystem
//!
//! Retrieval ranks a user's recent memory rows against keywords from the
//! current query and produces a bounded context block injected ahead of
//! the request. Summarization runs detached after a response completes,
//! debounced per conversation by time and token-growth gates, and writes
//! back through idempotent upserts. Every failure in here degrades
//! silently; memory never interrupts a request.

use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::GatewayConfig;
use crate::stores::{ConversationMemoryState, MemoryStore, UserMemory};

use super::providers::{Adapters, CallOptions};
use super::registry;
use super::sse::collect_stream_text;
use super::tokens::estimate_tokens;
use super::{Message, ModelTier, Provider, Role, ThinkingLevel};

pub const MEMORY_BLOCK_HEADER: &str = "### Long-Term User Memory";
pub const MEMORY_BLOCK_FOOTER: &str = "### End Memory";

const RETRIEVAL_LIMIT: usize = 24;
const MAX_SELECTED: usize = 3;
const MAX_BLOCK_CHARS: usize = 1500;
const MAX_KEYWORDS: usize = 20;
const MAX_TAGS: usize = 8;

const SUMMARIZE_INTERVAL_MINUTES: i64 = 10;
const SUMMARIZE_TOKEN_DELTA: u64 = 2200;
const MIN_TRANSCRIPT_TOKENS: u64 = 220;
const MIN_NEW_MESSAGES: usize = 2;
const SUMMARIZE_TIMEOUT: Duration = Duration::from_secs(15);
const SUMMARIZE_WINDOW: usize = 24;

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "can", "had", "her", "was", "one",
    "our", "out", "has", "have", "this", "that", "with", "from", "they", "what", "when", "where",
    "which", "their", "will", "would", "there", "been", "about", "into", "than", "them", "then",
    "some", "could", "should", "your", "just", "like", "over", "also", "only", "very", "please",
];

/// Lowercase, strip punctuation, drop stop words, keep tokens of length
/// three or more, cap at twenty.
pub fn extract_keywords(text: &str) -> Vec<String> {
    let mut keywords = Vec::new();
    for raw in text.to_lowercase().split_whitespace() {
        let word: String = raw.chars().filter(|c| c.is_alphanumeric()).collect();
        if word.len() < 3 || STOP_WORDS.contains(&word.as_str()) || keywords.contains(&word) {
            continue;
        }
        keywords.push(word);
        if keywords.len() >= MAX_KEYWORDS {
            break;
        }
    }
    keywords
}

/// Relevance score: each keyword found in the summary text counts two,
/// each exact tag match counts three.
pub fn score_memory(memory: &UserMemory, keywords: &[String]) -> u32 {
    let summary = memory.summary_text.to_lowercase();
    let mut score = 0;
    for keyword in keywords {
        if summary.contains(keyword.as_str()) {
            score += 2;
        }
        if memory.tags.iter().any(|tag| tag == keyword) {
            score += 3;
        }
    }
    score
}

/// The assembled retrieval result for one request
#[derive(Debug, Clone, Default)]
pub struct MemoryContext {
    pub block: String,
    pub hits: usize,
    pub tokens: u64,
}

/// Assemble the bounded context block from selected memories
fn build_block(selected: &[&UserMemory]) -> String {
    let mut block = String::from(MEMORY_BLOCK_HEADER);
    for memory in selected {
        block.push_str("\n- ");
        block.push_str(memory.summary_text.trim());
    }
    block.push('\n');
    block.push_str(MEMORY_BLOCK_FOOTER);
    if block.chars().count() > MAX_BLOCK_CHARS {
        block = block.chars().take(MAX_BLOCK_CHARS).collect();
    }
    block
}

/// Rank the user's recent memories against the query and produce the
/// context block. Store failures degrade to an empty context.
pub async fn fetch_relevant(
    store: &dyn MemoryStore,
    user_id: &str,
    query: &str,
) -> MemoryContext {
    let rows = match store.list_recent(user_id, RETRIEVAL_LIMIT).await {
        Ok(rows) => rows,
        Err(e) => {
            warn!("memory retrieval failed, continuing without context: {}", e);
            return MemoryContext::default();
        }
    };
    if rows.is_empty() {
        return MemoryContext::default();
    }

    let keywords = extract_keywords(query);
    let mut scored: Vec<(&UserMemory, u32)> = rows
        .iter()
        .map(|memory| (memory, score_memory(memory, &keywords)))
        .collect();
    scored.sort_by(|a, b| b.1.cmp(&a.1));

    let selected: Vec<&UserMemory> = if scored.first().map(|(_, s)| *s).unwrap_or(0) > 0 {
        scored
            .iter()
            .filter(|(_, score)| *score > 0)
            .take(MAX_SELECTED)
            .map(|(memory, _)| *memory)
            .collect()
    } else {
        // Nothing scored; fall back to the single most recent row
        vec![&rows[0]]
    };

    let block = build_block(&selected);
    let tokens = estimate_tokens(&block);
    MemoryContext {
        hits: selected.len(),
        block,
        tokens,
    }
}

/// Prepend the memory block to the user query for routing and prompting
pub fn inject(block: &str, query: &str) -> String {
    if block.is_empty() {
        query.to_string()
    } else {
        format!("{}\n\nCurrent request:\n{}", block, query)
    }
}

/// Cheapest tier per provider for summarization calls
fn summarizer_tier(provider: Provider) -> ModelTier {
    match provider {
        Provider::OpenAI => ModelTier::Gpt5Mini,
        Provider::Anthropic => ModelTier::Haiku45,
        Provider::Google => ModelTier::Gemini3Flash,
    }
}

/// Provider preference order for summarization
const SUMMARIZER_LADDER: &[Provider] = &[Provider::OpenAI, Provider::Anthropic, Provider::Google];

fn summarize_prompt(transcript: &str) -> String {
    format!(
        "Extract durable user memory from the conversation below. Capture \
         stable preferences, facts about the user, and ongoing goals in at \
         most five short sentences. Skip anything transient or one-off.\n\n{}",
        transcript
    )
}

/// Decide whether the gates allow a summarization pass.
///
/// Either gate is sufficient: enough wall-clock since the last pass, or
/// enough token growth in the conversation.
pub fn gates_fire(state: Option<&ConversationMemoryState>, total_tokens: u64) -> (bool, bool) {
    let time_gate = state
        .and_then(|s| s.last_summarized_at)
        .map(|t| Utc::now() - t >= ChronoDuration::minutes(SUMMARIZE_INTERVAL_MINUTES))
        .unwrap_or(true);
    let token_gate = total_tokens
        .saturating_sub(
            state
                .and_then(|s| s.last_summarized_total_tokens)
                .unwrap_or(0),
        )
        >= SUMMARIZE_TOKEN_DELTA;
    (time_gate, token_gate)
}

/// Fire-and-forget summarization pass for one conversation.
///
/// Spawned detached after a response completes; all failures are logged
/// and swallowed.
pub async fn maybe_summarize(
    store: Arc<dyn MemoryStore>,
    adapters: Arc<Adapters>,
    config: Arc<GatewayConfig>,
    conversation_id: Uuid,
    user_id: String,
    total_tokens: u64,
) {
    let state = match store.get_state(conversation_id).await {
        Ok(state) => state,
        Err(e) => {
            warn!("memory state read failed: {}", e);
            return;
        }
    };

    let (time_gate, token_gate) = gates_fire(state.as_ref(), total_tokens);
    if !time_gate && !token_gate {
        return;
    }

    let since = state.as_ref().and_then(|s| s.last_summarized_message_created_at);
    let messages = match store
        .list_messages_since(conversation_id, since, SUMMARIZE_WINDOW)
        .await
    {
        Ok(messages) => messages,
        Err(e) => {
            warn!("memory message fetch failed: {}", e);
            return;
        }
    };
    if messages.len() < MIN_NEW_MESSAGES {
        return;
    }

    let transcript: String = messages
        .iter()
        .map(|m| {
            let role = match m.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            format!("{}: {}\n", role, m.content)
        })
        .collect();
    let transcript_tokens = estimate_tokens(&transcript);
    if transcript_tokens < MIN_TRANSCRIPT_TOKENS && !time_gate {
        return;
    }

    let readiness = config.readiness();
    let Some(provider) = SUMMARIZER_LADDER
        .iter()
        .copied()
        .find(|p| readiness.is_ready(*p))
    else {
        debug!("no provider ready for memory summarization");
        return;
    };
    let tier = summarizer_tier(provider);
    let entry = registry::entry(tier);
    let client = match adapters.get(provider) {
        Ok(client) => client,
        Err(e) => {
            warn!("summarizer adapter unavailable: {}", e);
            return;
        }
    };

    let prompt_messages = vec![Message::user(summarize_prompt(&transcript))];
    let opts = CallOptions {
        max_output_tokens: Some(512),
        thinking_level: ThinkingLevel::Low,
    };
    let call = async {
        let stream = client
            .call_stream(
                entry.provider_model_id,
                entry.budget_cap,
                &prompt_messages,
                &[],
                &opts,
            )
            .await?;
        collect_stream_text(stream).await
    };
    let summary = match tokio::time::timeout(SUMMARIZE_TIMEOUT, call).await {
        Ok(Ok(text)) if !text.trim().is_empty() => text.trim().to_string(),
        Ok(Ok(_)) => return,
        Ok(Err(e)) => {
            warn!("memory summarization call failed: {}", e);
            return;
        }
        Err(_) => {
            warn!("memory summarization timed out");
            return;
        }
    };

    let window_end = messages
        .last()
        .map(|m| m.created_at)
        .unwrap_or_else(Utc::now);
    let tags: Vec<String> = extract_keywords(&summary)
        .into_iter()
        .take(MAX_TAGS)
        .collect();
    let now = Utc::now();

    let row = UserMemory {
        id: Uuid::new_v4(),
        user_id: user_id.clone(),
        conversation_id: Some(conversation_id),
        source_window_end_at: window_end,
        summary_text: summary,
        tags,
        created_at: now,
    };
    if let Err(e) = store.upsert_memory(row).await {
        warn!("memory upsert failed: {}", e);
        return;
    }
    if let Err(e) = store
        .upsert_state(ConversationMemoryState {
            conversation_id,
            user_id,
            last_summarized_at: Some(now),
            last_summarized_message_created_at: Some(window_end),
            last_summarized_total_tokens: Some(total_tokens),
            updated_at: now,
        })
        .await
    {
        warn!("memory state upsert failed: {}", e);
    }
    debug!(%conversation_id, "memory summarization stored");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::InMemoryStore;

    fn memory(user: &str, summary: &str, tags: &[&str], age_minutes: i64) -> UserMemory {
        let at = Utc::now() - ChronoDuration::minutes(age_minutes);
        UserMemory {
            id: Uuid::new_v4(),
            user_id: user.to_string(),
            conversation_id: None,
            source_window_end_at: at,
            summary_text: summary.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            created_at: at,
        }
    }

    #[test]
    fn test_keyword_extraction() {
        let keywords = extract_keywords("Why does the Rust borrow checker reject this code?");
        assert!(keywords.contains(&"rust".to_string()));
        assert!(keywords.contains(&"borrow".to_string()));
        // Stop words and short tokens dropped
        assert!(!keywords.contains(&"the".to_string()));
        assert!(!keywords.iter().any(|k| k.len() < 3));
    }

    #[test]
    fn test_keyword_cap() {
        let text = (0..50)
            .map(|i| format!("keyword{}", i))
            .collect::<Vec<_>>()
            .join(" ");
        assert_eq!(extract_keywords(&text).len(), 20);
    }

    #[test]
    fn test_scoring_weights_tags_over_summary() {
        let keywords = vec!["rust".to_string()];
        let tagged = memory("alice", "nothing relevant", &["rust"], 0);
        let summarized = memory("alice", "writes rust daily", &[], 0);
        assert_eq!(score_memory(&tagged, &keywords), 3);
        assert_eq!(score_memory(&summarized, &keywords), 2);
    }

    #[tokio::test]
    async fn test_fetch_relevant_selects_top_scorers() {
        let store = InMemoryStore::new();
        for row in [
            memory("alice", "prefers rust and terse answers", &["rust"], 5),
            memory("alice", "works on kubernetes clusters", &["kubernetes"], 10),
            memory("alice", "enjoys gardening", &[], 20),
        ] {
            store.upsert_memory(row).await.unwrap();
        }

        let ctx = fetch_relevant(&store, "alice", "help me with rust lifetimes").await;
        assert_eq!(ctx.hits, 1);
        assert!(ctx.block.starts_with(MEMORY_BLOCK_HEADER));
        assert!(ctx.block.contains("terse answers"));
        assert!(!ctx.block.contains("gardening"));
        assert!(ctx.tokens > 0);
    }

    #[tokio::test]
    async fn test_fetch_relevant_falls_back_to_most_recent() {
        let store = InMemoryStore::new();
        store
            .upsert_memory(memory("alice", "enjoys gardening", &[], 20))
            .await
            .unwrap();
        store
            .upsert_memory(memory("alice", "recently moved to lisbon", &[], 2))
            .await
            .unwrap();

        let ctx = fetch_relevant(&store, "alice", "qqq zzz xyzzy").await;
        assert_eq!(ctx.hits, 1);
        assert!(ctx.block.contains("lisbon"));
    }

    #[tokio::test]
    async fn test_fetch_relevant_empty_store() {
        let store = InMemoryStore::new();
        let ctx = fetch_relevant(&store, "alice", "anything").await;
        assert!(ctx.block.is_empty());
        assert_eq!(ctx.hits, 0);
        assert_eq!(ctx.tokens, 0);
    }

    #[test]
    fn test_block_truncated() {
        let rows: Vec<UserMemory> = (0..10)
            .map(|i| memory("alice", &format!("note {} {}", i, "x".repeat(400)), &[], i))
            .collect();
        let refs: Vec<&UserMemory> = rows.iter().collect();
        let block = build_block(&refs);
        assert!(block.chars().count() <= 1500);
    }

    #[test]
    fn test_inject_shapes_prompt() {
        assert_eq!(inject("", "question"), "question");
        let injected = inject("### Long-Term User Memory\n- x\n### End Memory", "question");
        assert!(injected.ends_with("Current request:\nquestion"));
        assert!(injected.starts_with(MEMORY_BLOCK_HEADER));
    }

    #[test]
    fn test_gates() {
        // No prior state: both gates open on first pass
        let (time_gate, token_gate) = gates_fire(None, 5000);
        assert!(time_gate);
        assert!(token_gate);

        let fresh = ConversationMemoryState {
            conversation_id: Uuid::new_v4(),
            user_id: "alice".to_string(),
            last_summarized_at: Some(Utc::now()),
            last_summarized_message_created_at: Some(Utc::now()),
            last_summarized_total_tokens: Some(4000),
            updated_at: Utc::now(),
        };
        let (time_gate, token_gate) = gates_fire(Some(&fresh), 4100);
        assert!(!time_gate);
        assert!(!token_gate);

        let (_, token_gate) = gates_fire(Some(&fresh), 4000 + 2200);
        assert!(token_gate);

        let stale = ConversationMemoryState {
            last_summarized_at: Some(Utc::now() - ChronoDuration::minutes(11)),
            ..fresh
        };
        let (time_gate, _) = gates_fire(Some(&stale), 4100);
        assert!(time_gate);
    }
}
