//! MongoDB collection backing for [`DocumentHistoryStore`](super::DocumentHistoryStore).
//!
//! Documents look like `{ _id: <conversation id>, exchanges: [...] }`.
//! Appends are a single `$push` with `$slice` and upsert, so concurrent
//! appends to one conversation are serialized by the server.

use super::{DocumentCollection, Exchange};
use crate::config::MongoConfig;
use crate::error::StoreError;
use async_trait::async_trait;
use mongodb::bson::{doc, Bson, Document};
use mongodb::options::ClientOptions;
use mongodb::{Client, Collection, Database};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize)]
struct ConversationDocument {
    #[serde(rename = "_id")]
    conversation_id: String,
    #[serde(default)]
    exchanges: Vec<Exchange>,
}

/// Shared handle to the history collection. The driver pools
/// connections internally, so one instance serves every conversation.
pub struct MongoCollection {
    collection: Collection<ConversationDocument>,
    database: Database,
}

impl MongoCollection {
    /// Build the client. No I/O happens here: the driver connects lazily
    /// and re-selects a server on every operation.
    pub async fn connect(config: &MongoConfig, timeout: Duration) -> Result<Self, StoreError> {
        let mut options = ClientOptions::parse(&config.uri).await?;
        options.app_name = Some(env!("CARGO_PKG_NAME").to_string());
        options.connect_timeout = Some(timeout);
        options.server_selection_timeout = Some(timeout);

        let client = Client::with_options(options)?;
        let database = client.database(&config.db_name);

        Ok(Self {
            collection: database.collection(&config.collection_name),
            database,
        })
    }

    /// Round-trip a `ping` to check the deployment is reachable
    pub async fn ping(&self) -> Result<(), StoreError> {
        self.database.run_command(doc! { "ping": 1 }).await?;

        tracing::info!(
            "[MongoCollection] Connected to database '{}', collection '{}'",
            self.database.name(),
            self.collection.name()
        );
        Ok(())
    }
}

fn push_update(exchange: &Exchange, max_exchanges: usize) -> Result<Document, StoreError> {
    let entry = mongodb::bson::to_bson(exchange)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;

    let mut push = doc! { "$each": Bson::Array(vec![entry]) };
    if max_exchanges > 0 {
        push.insert("$slice", -(max_exchanges as i64));
    }

    Ok(doc! { "$push": { "exchanges": push } })
}

#[async_trait]
impl DocumentCollection for MongoCollection {
    async fn load(&self, conversation_id: &str) -> Result<Option<Vec<Exchange>>, StoreError> {
        let document = self
            .collection
            .find_one(doc! { "_id": conversation_id })
            .await?;
        Ok(document.map(|d| d.exchanges))
    }

    async fn push(
        &self,
        conversation_id: &str,
        exchange: Exchange,
        max_exchanges: usize,
    ) -> Result<(), StoreError> {
        let update = push_update(&exchange, max_exchanges)?;
        self.collection
            .update_one(doc! { "_id": conversation_id }, update)
            .upsert(true)
            .await?;
        Ok(())
    }

    async fn remove(&self, conversation_id: &str) -> Result<(), StoreError> {
        let result = self
            .collection
            .delete_one(doc! { "_id": conversation_id })
            .await?;
        tracing::debug!(
            "[MongoCollection] Removed {} document(s) for '{}'",
            result.deleted_count,
            conversation_id
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "mongodb"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_update_with_limit() {
        let update = push_update(&Exchange::new("q", "a"), 10).unwrap();
        let push = update.get_document("$push").unwrap();
        let exchanges = push.get_document("exchanges").unwrap();

        assert_eq!(exchanges.get_i64("$slice").unwrap(), -10);
        let each = exchanges.get_array("$each").unwrap();
        assert_eq!(each.len(), 1);
        let entry = each[0].as_document().unwrap();
        assert_eq!(entry.get_str("question").unwrap(), "q");
        assert_eq!(entry.get_str("answer").unwrap(), "a");
    }

    #[test]
    fn test_push_update_unbounded() {
        let update = push_update(&Exchange::new("q", "a"), 0).unwrap();
        let exchanges = update
            .get_document("$push")
            .unwrap()
            .get_document("exchanges")
            .unwrap();
        assert!(!exchanges.contains_key("$slice"));
    }

    #[test]
    fn test_document_without_exchanges_decodes() {
        let raw = doc! { "_id": "42" };
        let parsed: ConversationDocument = mongodb::bson::from_document(raw).unwrap();
        assert_eq!(parsed.conversation_id, "42");
        assert!(parsed.exchanges.is_empty());
    }
}
