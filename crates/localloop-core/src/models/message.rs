//! Conversation and message models

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ConversationId, ItemId, MessageId, TransactionId, UserId};
use crate::pending::Tracked;

/// Message as stored by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendMessage {
    #[serde(rename = "_id")]
    pub id: MessageId,
    pub conversation: ConversationId,
    pub author: UserId,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub read_at: Option<DateTime<Utc>>,
}

/// Conversation as stored by the backend, keyed by transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendConversation {
    #[serde(rename = "_id")]
    pub id: ConversationId,
    pub participant1: UserId,
    pub participant2: UserId,
    pub transaction: TransactionId,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_message_at: Option<DateTime<Utc>>,
}

impl BackendConversation {
    /// The participant that is not `user`, if `user` takes part.
    pub fn counterpart(&self, user: &UserId) -> Option<&UserId> {
        if &self.participant1 == user {
            Some(&self.participant2)
        } else if &self.participant2 == user {
            Some(&self.participant1)
        } else {
            None
        }
    }
}

/// Local cache key: sorted participant pair plus item id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationKey(String);

impl ConversationKey {
    pub fn new(user: &UserId, other: &UserId, item: &ItemId) -> Self {
        let (first, second) = if user <= other {
            (user, other)
        } else {
            (other, user)
        };
        Self(format!("{first}_{second}_{item}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A message in the local conversation cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub from_user_id: UserId,
    pub to_user_id: UserId,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub read: bool,
}

impl Message {
    /// Map a backend message into the viewer's perspective.
    ///
    /// Messages authored by the viewer are always read for the viewer;
    /// otherwise read state follows the backend `readAt` stamp.
    pub fn from_backend(message: &BackendMessage, viewer: &UserId, counterpart: &UserId) -> Self {
        let authored_by_viewer = &message.author == viewer;
        let to_user_id = if authored_by_viewer {
            counterpart.clone()
        } else {
            viewer.clone()
        };
        Self {
            id: message.id.clone(),
            from_user_id: message.author.clone(),
            to_user_id,
            content: message.content.clone(),
            timestamp: message.created_at,
            read: authored_by_viewer || message.read_at.is_some(),
        }
    }

    pub fn is_unread_for(&self, user: &UserId) -> bool {
        &self.to_user_id == user && !self.read
    }
}

/// A messaging thread between two users about one item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub user_id: UserId,
    pub other_user_id: UserId,
    pub item_id: ItemId,
    pub messages: Vec<Tracked<Message>>,
    pub last_message_time: DateTime<Utc>,
    #[serde(default)]
    pub backend_conversation_id: Option<ConversationId>,
}

impl Conversation {
    pub fn new(user_id: UserId, other_user_id: UserId, item_id: ItemId) -> Self {
        Self {
            user_id,
            other_user_id,
            item_id,
            messages: Vec::new(),
            last_message_time: Utc::now(),
            backend_conversation_id: None,
        }
    }

    pub fn key(&self) -> ConversationKey {
        ConversationKey::new(&self.user_id, &self.other_user_id, &self.item_id)
    }

    pub fn involves(&self, user: &UserId) -> bool {
        &self.user_id == user || &self.other_user_id == user
    }

    pub fn unread_count(&self, user: &UserId) -> usize {
        self.messages
            .iter()
            .filter(|message| message.is_unread_for(user))
            .count()
    }

    pub fn position(&self, id: &MessageId) -> Option<usize> {
        self.messages.iter().position(|message| &message.id == id)
    }

    /// Keep messages in ascending timestamp order and refresh the activity stamp.
    pub fn normalize(&mut self) {
        self.messages.sort_by_key(|message| message.timestamp);
        if let Some(last) = self.messages.last() {
            if last.timestamp > self.last_message_time {
                self.last_message_time = last.timestamp;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversation_key_is_order_independent() {
        let item = ItemId::new("item-1");
        let a = UserId::new("alice");
        let b = UserId::new("bob");
        assert_eq!(
            ConversationKey::new(&a, &b, &item),
            ConversationKey::new(&b, &a, &item)
        );
        assert_eq!(
            ConversationKey::new(&b, &a, &item).as_str(),
            "alice_bob_item-1"
        );
    }

    #[test]
    fn own_messages_are_read_for_viewer() {
        let backend = BackendMessage {
            id: MessageId::new("m1"),
            conversation: ConversationId::new("c1"),
            author: UserId::new("alice"),
            content: "hi".to_string(),
            created_at: Utc::now(),
            read_at: None,
        };
        let alice = UserId::new("alice");
        let bob = UserId::new("bob");

        let for_alice = Message::from_backend(&backend, &alice, &bob);
        assert!(for_alice.read);
        assert_eq!(for_alice.to_user_id, bob);

        let for_bob = Message::from_backend(&backend, &bob, &alice);
        assert!(!for_bob.read);
        assert!(for_bob.is_unread_for(&bob));
    }

    #[test]
    fn counterpart_requires_membership() {
        let conversation = BackendConversation {
            id: ConversationId::new("c1"),
            participant1: UserId::new("alice"),
            participant2: UserId::new("bob"),
            transaction: TransactionId::new("t1"),
            created_at: None,
            last_message_at: None,
        };
        assert_eq!(
            conversation.counterpart(&UserId::new("bob")),
            Some(&UserId::new("alice"))
        );
        assert_eq!(conversation.counterpart(&UserId::new("carol")), None);
    }
}
