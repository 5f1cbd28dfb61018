//! Per-conversation processing lanes
//!
//! Information Hiding:
//! - One spawned task per active chat, fed through its own channel
//! - Turns for one chat run in arrival order; different chats run in parallel
//! - Idle lanes retire themselves and are respawned on the next message

use super::format::{escape_markdown, split_chunks, RAW_CHUNK_CHARS};
use super::telegram::{OutgoingMessage, ParseMode, ReplySink};
use crate::dispatcher::{Dispatcher, InboundMessage, APOLOGY};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;

struct LaneHandle {
    id: u64,
    sender: UnboundedSender<InboundMessage>,
    task: JoinHandle<()>,
}

type LaneMap = Arc<Mutex<HashMap<i64, LaneHandle>>>;

#[derive(Clone)]
struct LaneContext {
    dispatcher: Arc<Dispatcher>,
    replies: Arc<dyn ReplySink>,
    lanes: LaneMap,
    idle_timeout: Duration,
}

pub struct ConversationLanes {
    context: LaneContext,
    next_id: AtomicU64,
}

impl ConversationLanes {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        replies: Arc<dyn ReplySink>,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            context: LaneContext {
                dispatcher,
                replies,
                lanes: Arc::new(Mutex::new(HashMap::new())),
                idle_timeout,
            },
            next_id: AtomicU64::new(0),
        }
    }

    /// Queue a message on its chat's lane, starting the lane if needed
    pub async fn submit(&self, chat_id: i64, message: InboundMessage) {
        let mut lanes = self.context.lanes.lock().await;

        let message = match lanes.get(&chat_id) {
            Some(lane) => match lane.sender.send(message) {
                Ok(()) => return,
                // Receiver gone: the lane task ended abnormally
                Err(mpsc::error::SendError(message)) => message,
            },
            None => message,
        };

        let (sender, receiver) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let task = tokio::spawn(lane_loop(chat_id, id, receiver, self.context.clone()));

        // Fresh receiver, cannot be closed yet
        let _ = sender.send(message);
        lanes.insert(chat_id, LaneHandle { id, sender, task });

        tracing::debug!("[ConversationLanes] Started lane {} for chat {}", id, chat_id);
    }

    pub async fn active_lanes(&self) -> usize {
        self.context.lanes.lock().await.len()
    }

    /// Stop accepting work and wait for queued turns to finish
    pub async fn shutdown(&self) {
        let handles: Vec<LaneHandle> = {
            let mut lanes = self.context.lanes.lock().await;
            lanes.drain().map(|(_, handle)| handle).collect()
        };

        let tasks: Vec<JoinHandle<()>> = handles
            .into_iter()
            .map(|LaneHandle { task, .. }| task)
            .collect();

        tracing::info!("[ConversationLanes] Draining {} lanes", tasks.len());
        futures::future::join_all(tasks).await;
    }
}

async fn lane_loop(
    chat_id: i64,
    lane_id: u64,
    mut receiver: UnboundedReceiver<InboundMessage>,
    context: LaneContext,
) {
    loop {
        match timeout(context.idle_timeout, receiver.recv()).await {
            Ok(Some(message)) => process_turn(chat_id, message, &context).await,
            Ok(None) => break,
            Err(_) => {
                // Retire under the map lock so no submit can race the exit
                let mut lanes = context.lanes.lock().await;
                match receiver.try_recv() {
                    Ok(message) => {
                        drop(lanes);
                        process_turn(chat_id, message, &context).await;
                    }
                    Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {
                        if lanes.get(&chat_id).map(|lane| lane.id) == Some(lane_id) {
                            lanes.remove(&chat_id);
                        }
                        break;
                    }
                }
            }
        }
    }

    tracing::debug!("[ConversationLanes] Lane {} for chat {} stopped", lane_id, chat_id);
}

async fn process_turn(chat_id: i64, message: InboundMessage, context: &LaneContext) {
    let answer = match context.dispatcher.handle_update(&message).await {
        Ok(Some(answer)) => answer,
        Ok(None) => return,
        Err(e) => {
            tracing::error!(
                "[ConversationLanes] Turn failed for conversation '{}': {}",
                message.conversation_id,
                e
            );
            deliver(context, OutgoingMessage::plain(chat_id, APOLOGY)).await;
            return;
        }
    };

    for chunk in split_chunks(&answer, RAW_CHUNK_CHARS) {
        let formatted = OutgoingMessage::plain(chat_id, escape_markdown(&chunk))
            .with_parse_mode(ParseMode::MarkdownV2);

        // Chunks can split markup Telegram refuses to parse; the raw text always goes through
        if let Err(e) = context.replies.send_reply(formatted).await {
            tracing::warn!(
                "[ConversationLanes] MarkdownV2 reply to chat {} rejected, resending as plain text: {:#}",
                chat_id,
                e
            );
            deliver(context, OutgoingMessage::plain(chat_id, chunk)).await;
        }
    }
}

async fn deliver(context: &LaneContext, reply: OutgoingMessage) {
    let chat_id = reply.chat_id;
    if let Err(e) = context.replies.send_reply(reply).await {
        tracing::warn!("[ConversationLanes] Reply to chat {} failed: {:#}", chat_id, e);
    }
}
