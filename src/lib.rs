//! Telebridge - relays Telegram messages to a remote answer service
//!
//! Each chat keeps a bounded question/answer history in a pluggable store
//! (process memory or MongoDB) that is sent along with every question so
//! answers can use earlier turns as context.

pub mod config;
pub mod core;
pub mod dispatcher;
pub mod error;
pub mod gateway;
pub mod storage;

pub use config::{Deployment, Settings};
pub use dispatcher::{Dispatcher, DispatcherOptions, InboundMessage, StoreFailurePolicy};
pub use error::{AnswerServiceError, ConfigError, DispatchError, StoreError};
pub use storage::{Exchange, HistoryStore};

use crate::core::answer::HttpAnswerClient;
use gateway::{ConversationLanes, Gateway, TelegramClient};
use std::future::Future;
use std::sync::Arc;

/// Wire store, answer client, dispatcher and gateway, then poll until
/// `shutdown` resolves.
pub async fn run<S>(settings: Settings, deployment: Deployment, shutdown: S) -> anyhow::Result<()>
where
    S: Future<Output = ()>,
{
    let store = storage::open_store(&deployment, &settings).await?;

    let answers = Arc::new(HttpAnswerClient::new(
        &deployment.api_base,
        deployment.api_key.clone(),
        settings.answer_timeout(),
    ));
    tracing::info!("Answer service endpoint: {}", answers.endpoint());

    let dispatcher = Arc::new(Dispatcher::new(
        store,
        answers,
        DispatcherOptions::from(&settings),
    ));

    let client = Arc::new(TelegramClient::new(&deployment.telegram_token));
    let lanes = ConversationLanes::new(dispatcher, client.clone(), settings.lane_idle_timeout());

    Gateway::new(client, lanes, settings.poll_timeout())
        .run(shutdown)
        .await;

    tracing::info!("Telebridge shutdown complete");
    Ok(())
}
