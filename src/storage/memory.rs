//! In-Memory History Storage
//!
//! Information Hiding:
//! - HashMap of per-conversation slots hidden from users
//! - Map lock only guards slot lookup; each slot has its own lock for appends
//! - Slots are never removed, so clear and append linearize on the slot lock
//! - Data is lost when the process terminates

use super::{trim_to_limit, Exchange, HistoryStore};
use crate::error::StoreError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

type Slot = Arc<Mutex<Vec<Exchange>>>;

/// Transient store backed by a process-local map
pub struct InMemoryHistoryStore {
    conversations: RwLock<HashMap<String, Slot>>,
    max_exchanges: usize,
}

impl InMemoryHistoryStore {
    pub fn new(max_exchanges: usize) -> Self {
        Self {
            conversations: RwLock::new(HashMap::new()),
            max_exchanges,
        }
    }

    async fn slot(&self, conversation_id: &str) -> Slot {
        if let Some(slot) = self.conversations.read().await.get(conversation_id) {
            return slot.clone();
        }

        let mut conversations = self.conversations.write().await;
        conversations
            .entry(conversation_id.to_string())
            .or_default()
            .clone()
    }
}

impl Default for InMemoryHistoryStore {
    fn default() -> Self {
        Self::new(0)
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn get_history(&self, conversation_id: &str) -> Result<Vec<Exchange>, StoreError> {
        let slot = self.conversations.read().await.get(conversation_id).cloned();
        let history = match slot {
            Some(slot) => slot.lock().await.clone(),
            None => Vec::new(),
        };

        tracing::debug!(
            "[InMemoryHistoryStore] Loaded {} exchanges for conversation '{}'",
            history.len(),
            conversation_id
        );
        Ok(history)
    }

    async fn append(
        &self,
        conversation_id: &str,
        question: &str,
        answer: &str,
    ) -> Result<(), StoreError> {
        let slot = self.slot(conversation_id).await;
        let mut history = slot.lock().await;
        history.push(Exchange::new(question, answer));
        trim_to_limit(&mut history, self.max_exchanges);

        tracing::debug!(
            "[InMemoryHistoryStore] Conversation '{}' now holds {} exchanges",
            conversation_id,
            history.len()
        );
        Ok(())
    }

    async fn clear(&self, conversation_id: &str) -> Result<(), StoreError> {
        // Empty the slot in place; an append holding the slot handle must
        // stay visible afterwards
        let slot = self.conversations.read().await.get(conversation_id).cloned();
        if let Some(slot) = slot {
            slot.lock().await.clear();
        }
        tracing::debug!("[InMemoryHistoryStore] Cleared conversation '{}'", conversation_id);
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_append_and_load_in_order() {
        let store = InMemoryHistoryStore::new(0);

        store.append("chat-1", "Hello", "Hi there").await.unwrap();
        store.append("chat-1", "How are you?", "Fine").await.unwrap();

        let history = store.get_history("chat-1").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].question, "Hello");
        assert_eq!(history[1].answer, "Fine");
        assert!(history[0].timestamp.is_some());
    }

    #[tokio::test]
    async fn test_unknown_conversation_is_empty() {
        let store = InMemoryHistoryStore::default();
        let history = store.get_history("nonexistent").await.unwrap();
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn test_conversations_are_isolated() {
        let store = InMemoryHistoryStore::new(0);
        store.append("a", "qa", "aa").await.unwrap();
        store.append("b", "qb", "ab").await.unwrap();

        let a = store.get_history("a").await.unwrap();
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].question, "qa");
    }

    #[tokio::test]
    async fn test_clear_is_idempotent() {
        let store = InMemoryHistoryStore::new(0);
        store.append("chat-1", "q", "a").await.unwrap();

        store.clear("chat-1").await.unwrap();
        store.clear("chat-1").await.unwrap();
        store.clear("never-seen").await.unwrap();

        assert!(store.get_history("chat-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retention_limit() {
        let store = InMemoryHistoryStore::new(2);
        for i in 0..4 {
            store.append("chat-1", &format!("q{}", i), "a").await.unwrap();
        }

        let history = store.get_history("chat-1").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].question, "q2");
        assert_eq!(history[1].question, "q3");
    }

    #[tokio::test]
    async fn test_concurrent_appends_same_conversation() {
        let store = Arc::new(InMemoryHistoryStore::new(0));

        let handles: Vec<_> = (0..32)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store.append("shared", &format!("q{}", i), "a").await.unwrap();
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.get_history("shared").await.unwrap().len(), 32);
    }

    #[tokio::test]
    async fn test_clear_keeps_slot_handles_live() {
        let store = InMemoryHistoryStore::new(0);
        store.append("chat-1", "old", "a").await.unwrap();

        // Handle taken by an append that has not locked yet
        let in_flight = store.slot("chat-1").await;
        store.clear("chat-1").await.unwrap();
        in_flight.lock().await.push(Exchange::new("late", "b"));

        let history = store.get_history("chat-1").await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].question, "late");
    }
}
