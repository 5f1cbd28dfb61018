//! Telegram gateway - long polling, command replies and lane routing

pub mod commands;
pub mod format;
pub mod lanes;
pub mod telegram;

pub use commands::Command;
pub use lanes::ConversationLanes;
pub use telegram::{OutgoingMessage, ParseMode, ReplySink, TelegramClient, Update};

use crate::dispatcher::InboundMessage;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

const POLL_ERROR_PAUSE: Duration = Duration::from_secs(5);

pub struct Gateway {
    client: Arc<TelegramClient>,
    lanes: ConversationLanes,
    poll_timeout: Duration,
}

impl Gateway {
    pub fn new(client: Arc<TelegramClient>, lanes: ConversationLanes, poll_timeout: Duration) -> Self {
        Self {
            client,
            lanes,
            poll_timeout,
        }
    }

    /// Poll until `shutdown` resolves, then drain the lanes
    pub async fn run<S>(self, shutdown: S)
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut offset: Option<i64> = None;

        tracing::info!("[Gateway] Polling for updates");

        loop {
            let updates = tokio::select! {
                _ = &mut shutdown => break,
                result = self.client.get_updates(offset, self.poll_timeout) => result,
            };

            match updates {
                Ok(updates) => {
                    for update in updates {
                        offset = Some(update.update_id + 1);
                        route_update(update, self.client.as_ref(), &self.lanes).await;
                    }
                }
                Err(e) => {
                    tracing::warn!("[Gateway] Polling failed: {:#}", e);
                    tokio::select! {
                        _ = &mut shutdown => break,
                        _ = tokio::time::sleep(POLL_ERROR_PAUSE) => {}
                    }
                }
            }
        }

        tracing::info!("[Gateway] Shutdown requested");
        self.lanes.shutdown().await;
    }
}

/// Send commands their static reply, queue plain text on the chat's lane and
/// drop everything else.
pub async fn route_update(update: Update, replies: &dyn ReplySink, lanes: &ConversationLanes) {
    let Some(message) = update.message else {
        return;
    };
    let Some(text) = message.text.as_deref() else {
        return;
    };

    if let Some(command) = Command::parse(text) {
        tracing::debug!("[Gateway] {:?} from chat {}", command, message.chat.id);
        if let Err(e) = replies.send_reply(command.reply(&message)).await {
            tracing::warn!("[Gateway] Command reply to chat {} failed: {:#}", message.chat.id, e);
        }
        return;
    }

    if commands::is_command(text) {
        tracing::debug!("[Gateway] Ignoring unknown command from chat {}", message.chat.id);
        return;
    }

    let inbound = InboundMessage {
        conversation_id: message.chat.id.to_string(),
        user_text: text.to_string(),
        update_id: Some(update.update_id),
    };
    lanes.submit(message.chat.id, inbound).await;
}
