//! Document-Backed History Storage
//!
//! Information Hiding:
//! - One document per conversation; the document layout belongs to the collection
//! - Every backing call is bounded by a timeout and mapped to `StoreError`
//! - Same-conversation append safety comes from the collection's atomic update

use super::{Exchange, HistoryStore};
use crate::error::StoreError;
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;

/// Remote document collection holding one document per conversation.
///
/// `push` must be a single atomic document update that creates the
/// document when missing and keeps only the newest `max_exchanges`
/// entries (0 keeps all).
#[async_trait]
pub trait DocumentCollection: Send + Sync {
    async fn load(&self, conversation_id: &str) -> Result<Option<Vec<Exchange>>, StoreError>;

    async fn push(
        &self,
        conversation_id: &str,
        exchange: Exchange,
        max_exchanges: usize,
    ) -> Result<(), StoreError>;

    async fn remove(&self, conversation_id: &str) -> Result<(), StoreError>;

    fn name(&self) -> &'static str;
}

/// Persistent store over a [`DocumentCollection`]
pub struct DocumentHistoryStore<C> {
    collection: C,
    max_exchanges: usize,
    call_timeout: Duration,
}

impl<C: DocumentCollection> DocumentHistoryStore<C> {
    pub fn new(collection: C, max_exchanges: usize, call_timeout: Duration) -> Self {
        Self {
            collection,
            max_exchanges,
            call_timeout,
        }
    }

    async fn bounded<T, F>(&self, op: &str, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match timeout(self.call_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                tracing::warn!("[DocumentHistoryStore] {} failed: {}", op, e);
                Err(e)
            }
            Err(_) => {
                tracing::warn!(
                    "[DocumentHistoryStore] {} timed out after {:?}",
                    op,
                    self.call_timeout
                );
                Err(StoreError::Timeout(self.call_timeout))
            }
        }
    }
}

#[async_trait]
impl<C: DocumentCollection> HistoryStore for DocumentHistoryStore<C> {
    async fn get_history(&self, conversation_id: &str) -> Result<Vec<Exchange>, StoreError> {
        let history = self
            .bounded("load", self.collection.load(conversation_id))
            .await?
            .unwrap_or_default();

        tracing::debug!(
            "[DocumentHistoryStore] Loaded {} exchanges for conversation '{}'",
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
        let exchange = Exchange::new(question, answer);
        self.bounded(
            "push",
            self.collection
                .push(conversation_id, exchange, self.max_exchanges),
        )
        .await?;

        tracing::debug!(
            "[DocumentHistoryStore] Appended exchange to conversation '{}'",
            conversation_id
        );
        Ok(())
    }

    async fn clear(&self, conversation_id: &str) -> Result<(), StoreError> {
        self.bounded("remove", self.collection.remove(conversation_id))
            .await?;
        tracing::debug!("[DocumentHistoryStore] Cleared conversation '{}'", conversation_id);
        Ok(())
    }

    fn backend(&self) -> &'static str {
        self.collection.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::trim_to_limit;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeCollection {
        documents: Mutex<HashMap<String, Vec<Exchange>>>,
        offline: AtomicBool,
        stall: AtomicBool,
    }

    #[async_trait]
    impl DocumentCollection for FakeCollection {
        async fn load(&self, conversation_id: &str) -> Result<Option<Vec<Exchange>>, StoreError> {
            self.check().await?;
            Ok(self.documents.lock().unwrap().get(conversation_id).cloned())
        }

        async fn push(
            &self,
            conversation_id: &str,
            exchange: Exchange,
            max_exchanges: usize,
        ) -> Result<(), StoreError> {
            self.check().await?;
            let mut documents = self.documents.lock().unwrap();
            let history = documents.entry(conversation_id.to_string()).or_default();
            history.push(exchange);
            trim_to_limit(history, max_exchanges);
            Ok(())
        }

        async fn remove(&self, conversation_id: &str) -> Result<(), StoreError> {
            self.check().await?;
            self.documents.lock().unwrap().remove(conversation_id);
            Ok(())
        }

        fn name(&self) -> &'static str {
            "fake"
        }
    }

    impl FakeCollection {
        async fn check(&self) -> Result<(), StoreError> {
            if self.stall.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            if self.offline.load(Ordering::SeqCst) {
                return Err(StoreError::Connectivity("connection refused".to_string()));
            }
            Ok(())
        }
    }

    fn store(collection: FakeCollection) -> DocumentHistoryStore<FakeCollection> {
        DocumentHistoryStore::new(collection, 3, Duration::from_millis(50))
    }

    #[tokio::test]
    async fn test_missing_document_is_empty_history() {
        let store = store(FakeCollection::default());
        assert!(store.get_history("unknown").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_append_applies_retention() {
        let store = store(FakeCollection::default());
        for i in 0..5 {
            store.append("chat", &format!("q{}", i), "a").await.unwrap();
        }

        let history = store.get_history("chat").await.unwrap();
        let questions: Vec<&str> = history.iter().map(|e| e.question.as_str()).collect();
        assert_eq!(questions, vec!["q2", "q3", "q4"]);
    }

    #[tokio::test]
    async fn test_connectivity_error_is_typed() {
        let collection = FakeCollection::default();
        collection.offline.store(true, Ordering::SeqCst);
        let store = store(collection);

        let err = store.get_history("chat").await.unwrap_err();
        assert!(matches!(err, StoreError::Connectivity(_)));
    }

    #[tokio::test]
    async fn test_stalled_backend_times_out() {
        let collection = FakeCollection::default();
        collection.stall.store(true, Ordering::SeqCst);
        let store = store(collection);

        let err = store.append("chat", "q", "a").await.unwrap_err();
        assert!(matches!(err, StoreError::Timeout(d) if d == Duration::from_millis(50)));
    }

    #[tokio::test]
    async fn test_clear_missing_document() {
        let store = store(FakeCollection::default());
        store.clear("never-seen").await.unwrap();
        assert_eq!(store.backend(), "fake");
    }
}
