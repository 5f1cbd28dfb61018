//! Conversation History Storage
//!
//! Information Hiding:
//! - Backend details (process map, document collection) hidden behind one trait
//! - The dispatcher never learns which variant is active
//! - Retention trimming is enforced by every variant, not by callers

use crate::config::{Deployment, Settings};
use crate::dispatcher::StoreFailurePolicy;
use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

pub mod document;
pub mod memory;
pub mod mongo;

pub use document::{DocumentCollection, DocumentHistoryStore};
pub use memory::InMemoryHistoryStore;
pub use mongo::MongoCollection;

/// One question/answer pair. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exchange {
    pub question: String,
    pub answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Exchange {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            timestamp: Some(Utc::now()),
        }
    }
}

/// Per-conversation exchange log.
///
/// An unknown conversation id reads as an empty history. Appends for the
/// same id never lose updates; appends for different ids may run
/// concurrently.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Exchanges for the conversation, oldest first
    async fn get_history(&self, conversation_id: &str) -> Result<Vec<Exchange>, StoreError>;

    /// Append one exchange, creating the history if absent
    async fn append(
        &self,
        conversation_id: &str,
        question: &str,
        answer: &str,
    ) -> Result<(), StoreError>;

    /// Remove the history. Clearing an unknown id is a no-op.
    async fn clear(&self, conversation_id: &str) -> Result<(), StoreError>;

    /// Short backend name for logs
    fn backend(&self) -> &'static str;
}

/// Drop the oldest exchanges so at most `max_exchanges` remain. 0 keeps all.
pub(crate) fn trim_to_limit(history: &mut Vec<Exchange>, max_exchanges: usize) {
    if max_exchanges > 0 && history.len() > max_exchanges {
        let excess = history.len() - max_exchanges;
        history.drain(..excess);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageType {
    Memory,
    MongoDb,
}

impl FromStr for StorageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StorageType::Memory),
            "mongodb" => Ok(StorageType::MongoDb),
            other => Err(format!("unknown storage type '{}'", other)),
        }
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageType::Memory => write!(f, "memory"),
            StorageType::MongoDb => write!(f, "mongodb"),
        }
    }
}

/// Build the store selected by `STORAGE_TYPE`. Called once at start-up.
///
/// An unreachable MongoDB is fatal under `StoreFailurePolicy::Fail` and only
/// logged under `Degrade`.
pub async fn open_store(
    deployment: &Deployment,
    settings: &Settings,
) -> anyhow::Result<Arc<dyn HistoryStore>> {
    let max_exchanges = settings.history.max_exchanges;

    let store: Arc<dyn HistoryStore> = match (deployment.storage_type, &deployment.mongodb) {
        (StorageType::Memory, _) => Arc::new(InMemoryHistoryStore::new(max_exchanges)),
        (StorageType::MongoDb, Some(mongo)) => {
            let collection = MongoCollection::connect(mongo, settings.store_timeout()).await?;
            if let Err(e) = collection.ping().await {
                match settings.store.failure_policy {
                    StoreFailurePolicy::Fail => return Err(e.into()),
                    // Per-call errors are handled by the dispatcher from here on
                    StoreFailurePolicy::Degrade => tracing::warn!(
                        "MongoDB unreachable at start-up, continuing without history: {}",
                        e
                    ),
                }
            }
            Arc::new(DocumentHistoryStore::new(
                collection,
                max_exchanges,
                settings.store_timeout(),
            ))
        }
        (StorageType::MongoDb, None) => {
            anyhow::bail!("MongoDB storage selected without MongoDB settings")
        }
    };

    tracing::info!(
        "History store ready: backend={}, max_exchanges={}",
        store.backend(),
        max_exchanges
    );
    Ok(store)
}
