//! Dialogue Dispatcher - one inbound message turn
//!
//! Information Hiding:
//! - Which store variant is active is invisible here
//! - Request construction for the answer service is internal
//! - Update de-duplication is best-effort and bounded

use crate::config::Settings;
use crate::core::answer::{AnswerRequest, AnswerService};
use crate::error::DispatchError;
use crate::storage::HistoryStore;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Reply sent to the user when a turn fails
pub const APOLOGY: &str = "Sorry, something went wrong. Please try again later.";

/// What to do when the history store cannot be reached.
///
/// `Fail` surfaces the store error for the turn. `Degrade` answers with an
/// empty history when the read fails and only logs a failed append.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreFailurePolicy {
    #[default]
    Fail,
    Degrade,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub conversation_id: String,
    pub user_text: String,
    /// Platform update identifier, used to drop redeliveries
    pub update_id: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct DispatcherOptions {
    pub failure_policy: StoreFailurePolicy,
    /// Recently seen update ids to remember; 0 disables de-duplication
    pub dedup_capacity: usize,
}

impl Default for DispatcherOptions {
    fn default() -> Self {
        Self {
            failure_policy: StoreFailurePolicy::Fail,
            dedup_capacity: 1024,
        }
    }
}

impl From<&Settings> for DispatcherOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            failure_policy: settings.store.failure_policy,
            dedup_capacity: settings.dispatcher.dedup_capacity,
        }
    }
}

pub struct Dispatcher {
    store: Arc<dyn HistoryStore>,
    answers: Arc<dyn AnswerService>,
    failure_policy: StoreFailurePolicy,
    seen_updates: Option<Mutex<LruCache<i64, ()>>>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn HistoryStore>,
        answers: Arc<dyn AnswerService>,
        options: DispatcherOptions,
    ) -> Self {
        let seen_updates =
            NonZeroUsize::new(options.dedup_capacity).map(|cap| Mutex::new(LruCache::new(cap)));

        Self {
            store,
            answers,
            failure_policy: options.failure_policy,
            seen_updates,
        }
    }

    /// Process a platform update. Returns `Ok(None)` for a redelivered update.
    pub async fn handle_update(
        &self,
        message: &InboundMessage,
    ) -> Result<Option<String>, DispatchError> {
        if let Some(update_id) = message.update_id {
            if !self.mark_seen(update_id).await {
                tracing::debug!(
                    "[Dispatcher] Skipping duplicate update {} for conversation '{}'",
                    update_id,
                    message.conversation_id
                );
                return Ok(None);
            }
        }

        let result = self
            .handle_message(&message.conversation_id, &message.user_text)
            .await;

        // A failed turn may be redelivered and should then run again
        if result.is_err() {
            if let Some(update_id) = message.update_id {
                self.forget(update_id).await;
            }
        }

        result.map(Some)
    }

    /// Answer `user_text` in the context of the conversation's history and
    /// record the exchange. Nothing is recorded when the answer call fails.
    pub async fn handle_message(
        &self,
        conversation_id: &str,
        user_text: &str,
    ) -> Result<String, DispatchError> {
        let history = match self.store.get_history(conversation_id).await {
            Ok(history) => history,
            Err(e) if self.failure_policy == StoreFailurePolicy::Degrade => {
                tracing::warn!(
                    "[Dispatcher] History unavailable for '{}', answering without it: {}",
                    conversation_id,
                    e
                );
                Vec::new()
            }
            Err(e) => return Err(e.into()),
        };

        let request = AnswerRequest::new(user_text, &history);
        let answer = self.answers.generate(&request).await?;

        match self.store.append(conversation_id, user_text, &answer).await {
            Ok(()) => {}
            Err(e) if self.failure_policy == StoreFailurePolicy::Degrade => {
                tracing::warn!(
                    "[Dispatcher] Exchange for '{}' not recorded: {}",
                    conversation_id,
                    e
                );
            }
            Err(e) => return Err(e.into()),
        }

        tracing::info!(
            "[Dispatcher] Answered conversation '{}' ({} prior exchanges)",
            conversation_id,
            history.len()
        );
        Ok(answer)
    }

    pub async fn clear_conversation(&self, conversation_id: &str) -> Result<(), DispatchError> {
        self.store.clear(conversation_id).await?;
        Ok(())
    }

    /// Returns false when the id was already seen
    async fn mark_seen(&self, update_id: i64) -> bool {
        let Some(seen) = &self.seen_updates else {
            return true;
        };
        let mut seen = seen.lock().await;
        if seen.contains(&update_id) {
            return false;
        }
        seen.put(update_id, ());
        true
    }

    async fn forget(&self, update_id: i64) {
        if let Some(seen) = &self.seen_updates {
            seen.lock().await.pop(&update_id);
        }
    }
}
