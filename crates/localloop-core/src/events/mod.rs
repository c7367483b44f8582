//! Server push: stream decoding, typed events and their routing.
//!
//! Frames arrive over a single server-sent events connection, are decoded
//! once into [`PushEvent`] and handed to exactly one cache handler.

mod router;
mod sse;
mod transport;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

pub use router::NotificationRouter;
pub use sse::{SseFrame, SseParser};
pub use transport::{FrameStream, HttpPushTransport, PushTransport};

use crate::cache::{MessageCache, NotificationFeed, RequestCache, TransactionCache};
use crate::error::Result;
use crate::models::{BackendMessage, BackendNotification, ItemRequest, Transaction};

/// A typed push event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushEvent {
    Connected,
    Heartbeat,
    Notification(BackendNotification),
    RequestUpdate(ItemRequest),
    TransactionUpdate(Transaction),
    Message(BackendMessage),
    /// Backend-reported stream error
    ServerError { message: String },
}

impl PushEvent {
    /// Decode a frame. Unknown event names yield `Ok(None)`.
    pub fn from_frame(frame: &SseFrame) -> Result<Option<Self>> {
        let event = match frame.event.as_str() {
            "connected" => Self::Connected,
            "heartbeat" => Self::Heartbeat,
            "notification" => Self::Notification(serde_json::from_str(&frame.data)?),
            "request_update" => Self::RequestUpdate(serde_json::from_str(&frame.data)?),
            "transaction_update" => Self::TransactionUpdate(serde_json::from_str(&frame.data)?),
            "message" => Self::Message(serde_json::from_str(&frame.data)?),
            "error" => Self::ServerError {
                message: error_message(&frame.data),
            },
            other => {
                tracing::debug!(event = other, "Skipping unknown push event");
                return Ok(None);
            }
        };
        Ok(Some(event))
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Heartbeat => "heartbeat",
            Self::Notification(_) => "notification",
            Self::RequestUpdate(_) => "request_update",
            Self::TransactionUpdate(_) => "transaction_update",
            Self::Message(_) => "message",
            Self::ServerError { .. } => "error",
        }
    }
}

fn error_message(data: &str) -> String {
    let parsed = serde_json::from_str::<Value>(data).ok();
    parsed
        .as_ref()
        .and_then(|value| value.get("message").or_else(|| value.get("error")))
        .and_then(Value::as_str)
        .map_or_else(|| data.trim().to_string(), str::to_string)
}

/// Push connection lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error(String),
}

/// Receives domain events from the router, one at a time in arrival order.
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    async fn handle(&self, event: PushEvent);
}

/// Routes each domain event to the cache that owns it.
pub struct EventDispatcher {
    requests: Arc<RequestCache>,
    transactions: Arc<TransactionCache>,
    messages: Arc<MessageCache>,
    notifications: Arc<NotificationFeed>,
}

impl EventDispatcher {
    pub const fn new(
        requests: Arc<RequestCache>,
        transactions: Arc<TransactionCache>,
        messages: Arc<MessageCache>,
        notifications: Arc<NotificationFeed>,
    ) -> Self {
        Self {
            requests,
            transactions,
            messages,
            notifications,
        }
    }
}

#[async_trait]
impl EventHandler for EventDispatcher {
    async fn handle(&self, event: PushEvent) {
        match event {
            PushEvent::Notification(notification) => {
                self.notifications.handle_notification(&notification).await;
            }
            PushEvent::RequestUpdate(request) => {
                self.requests.handle_request_update(request).await;
            }
            PushEvent::TransactionUpdate(transaction) => {
                self.transactions
                    .handle_transaction_update(transaction)
                    .await;
            }
            PushEvent::Message(message) => self.messages.handle_message(message).await,
            PushEvent::ServerError { message } => {
                tracing::warn!("Push stream reported an error: {}", message);
            }
            PushEvent::Connected | PushEvent::Heartbeat => {}
        }
    }
}
