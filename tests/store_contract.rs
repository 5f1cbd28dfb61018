//! The history store contract must not depend on the active backend.
//!
//! The same scripted append/get/clear sequence runs against the in-memory
//! store and the document store (over an in-process collection double).

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use telebridge::storage::{DocumentCollection, DocumentHistoryStore, InMemoryHistoryStore};
use telebridge::{Exchange, HistoryStore, StoreError};

/// Collection double with the same single-document atomicity as MongoDB
#[derive(Default)]
struct InProcessCollection {
    documents: Mutex<HashMap<String, Vec<Exchange>>>,
}

#[async_trait]
impl DocumentCollection for InProcessCollection {
    async fn load(&self, conversation_id: &str) -> Result<Option<Vec<Exchange>>, StoreError> {
        Ok(self.documents.lock().unwrap().get(conversation_id).cloned())
    }

    async fn push(
        &self,
        conversation_id: &str,
        exchange: Exchange,
        max_exchanges: usize,
    ) -> Result<(), StoreError> {
        tokio::task::yield_now().await;
        let mut documents = self.documents.lock().unwrap();
        let history = documents.entry(conversation_id.to_string()).or_default();
        history.push(exchange);
        if max_exchanges > 0 && history.len() > max_exchanges {
            let excess = history.len() - max_exchanges;
            history.drain(..excess);
        }
        Ok(())
    }

    async fn remove(&self, conversation_id: &str) -> Result<(), StoreError> {
        self.documents.lock().unwrap().remove(conversation_id);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "in-process"
    }
}

fn backends(max_exchanges: usize) -> Vec<Arc<dyn HistoryStore>> {
    vec![
        Arc::new(InMemoryHistoryStore::new(max_exchanges)),
        Arc::new(DocumentHistoryStore::new(
            InProcessCollection::default(),
            max_exchanges,
            Duration::from_secs(1),
        )),
    ]
}

fn pairs(history: &[Exchange]) -> Vec<(String, String)> {
    history
        .iter()
        .map(|e| (e.question.clone(), e.answer.clone()))
        .collect()
}

/// Runs a fixed script and records every observation
async fn script(store: &dyn HistoryStore) -> Vec<Vec<(String, String)>> {
    let mut observations = Vec::new();

    observations.push(pairs(&store.get_history("42").await.unwrap()));

    store.append("42", "What is X?", "X is ...").await.unwrap();
    store.append("42", "And Y?", "Y is ...").await.unwrap();
    store.append("7", "Other chat", "Other answer").await.unwrap();
    observations.push(pairs(&store.get_history("42").await.unwrap()));
    observations.push(pairs(&store.get_history("7").await.unwrap()));

    store.clear("42").await.unwrap();
    store.clear("42").await.unwrap();
    observations.push(pairs(&store.get_history("42").await.unwrap()));
    observations.push(pairs(&store.get_history("7").await.unwrap()));

    for i in 0..5 {
        store
            .append("trim", &format!("q{}", i), &format!("a{}", i))
            .await
            .unwrap();
    }
    observations.push(pairs(&store.get_history("trim").await.unwrap()));

    observations
}

#[tokio::test]
async fn test_scripted_sequence_matches_across_backends() {
    let mut results = Vec::new();
    for store in backends(3) {
        results.push((store.backend(), script(store.as_ref()).await));
    }

    let (_, memory) = &results[0];
    let (document_backend, document) = &results[1];
    assert_eq!(*document_backend, "in-process");
    assert_eq!(memory, document);

    assert!(memory[0].is_empty());
    assert_eq!(
        memory[1],
        vec![
            ("What is X?".to_string(), "X is ...".to_string()),
            ("And Y?".to_string(), "Y is ...".to_string()),
        ]
    );
    assert_eq!(memory[2].len(), 1);
    assert!(memory[3].is_empty());
    assert_eq!(memory[4].len(), 1);
    let trimmed: Vec<&str> = memory[5].iter().map(|(q, _)| q.as_str()).collect();
    assert_eq!(trimmed, vec!["q2", "q3", "q4"]);
}

#[tokio::test]
async fn test_n_appends_are_returned_in_order() {
    for store in backends(0) {
        for i in 0..25 {
            store.append("ordered", &format!("q{}", i), "a").await.unwrap();
        }

        let history = store.get_history("ordered").await.unwrap();
        let questions: Vec<String> = history.iter().map(|e| e.question.clone()).collect();
        let expected: Vec<String> = (0..25).map(|i| format!("q{}", i)).collect();
        assert_eq!(questions, expected, "backend {}", store.backend());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_appends_lose_nothing() {
    const CALLERS: usize = 64;

    for store in backends(0) {
        let tasks = (0..CALLERS).map(|i| {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .append("busy", &format!("q{}", i), &format!("a{}", i))
                    .await
                    .unwrap();
            })
        });

        for result in futures::future::join_all(tasks).await {
            result.unwrap();
        }

        let history = store.get_history("busy").await.unwrap();
        assert_eq!(history.len(), CALLERS, "backend {}", store.backend());
    }
}
