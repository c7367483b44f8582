//! Notification models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Actor, ConversationId, ItemId, RequestId, TransactionId, UserId};

/// Generic notification pushed by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendNotification {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub recipient: Option<UserId>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub sender: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Notification,
    RequestAccepted,
    TransactionCreated,
    Message,
}

impl NotificationKind {
    const fn id_prefix(self) -> &'static str {
        match self {
            Self::Notification => "notification",
            Self::RequestAccepted => "request",
            Self::TransactionCreated => "transaction",
            Self::Message => "message",
        }
    }

    /// Deterministic feed id for a source entity of this kind.
    pub fn notification_id(self, source_id: &str) -> String {
        format!("{}_{source_id}", self.id_prefix())
    }
}

/// A user-facing entry in the notification feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub actor: Option<Actor>,
    #[serde(default)]
    pub item_title: Option<String>,
    #[serde(default)]
    pub item_id: Option<ItemId>,
    #[serde(default)]
    pub request_id: Option<RequestId>,
    #[serde(default)]
    pub transaction_id: Option<TransactionId>,
    #[serde(default)]
    pub conversation_id: Option<ConversationId>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub read: bool,
}

impl Notification {
    pub fn new(
        kind: NotificationKind,
        source_id: &str,
        title: impl Into<String>,
        message: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: kind.notification_id(source_id),
            kind,
            title: title.into(),
            message: message.into(),
            actor: None,
            item_title: None,
            item_id: None,
            request_id: None,
            transaction_id: None,
            conversation_id: None,
            timestamp,
            read: false,
        }
    }
}
