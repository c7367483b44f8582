//! User-facing notification feed.
//!
//! Every notification id is derived from its source entity, and the feed
//! remembers the ids it accepted over the last thirty days, plus any still
//! on display. A replayed event therefore never yields a second entry, and
//! a dismissed entry never comes back.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::{read, write, ProfileCache};
use crate::models::{
    BackendMessage, BackendNotification, Item, ItemRequest, Notification, NotificationKind,
    Transaction,
};
use crate::storage::{KeyValueStore, NOTIFICATIONS_KEY};

const BROADCAST_CAPACITY: usize = 64;
const SEEN_RETENTION_DAYS: i64 = 30;

/// Result of offering a notification to the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// The id was accepted before; nothing changed
    Duplicate,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct FeedState {
    #[serde(default)]
    notifications: Vec<Notification>,
    /// Accepted ids and when they were first accepted
    #[serde(default)]
    seen: BTreeMap<String, DateTime<Utc>>,
}

impl FeedState {
    /// Forget ids older than the retention window that are no longer shown.
    fn prune_seen(&mut self, now: DateTime<Utc>) {
        let cutoff = now - Duration::days(SEEN_RETENTION_DAYS);
        let shown: BTreeSet<&str> = self
            .notifications
            .iter()
            .map(|notification| notification.id.as_str())
            .collect();
        self.seen
            .retain(|id, accepted_at| *accepted_at >= cutoff || shown.contains(id.as_str()));
    }
}

pub struct NotificationFeed {
    store: Arc<dyn KeyValueStore>,
    profiles: Arc<ProfileCache>,
    state: RwLock<FeedState>,
    events: broadcast::Sender<Notification>,
}

impl NotificationFeed {
    pub fn new(store: Arc<dyn KeyValueStore>, profiles: Arc<ProfileCache>) -> Self {
        let state = load_state(store.as_ref());
        let (events, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            store,
            profiles,
            state: RwLock::new(state),
            events,
        }
    }

    /// Newly inserted notifications, in insertion order.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.events.subscribe()
    }

    /// Newest first.
    pub fn notifications(&self) -> Vec<Notification> {
        read(&self.state).notifications.clone()
    }

    pub fn unread_count(&self) -> usize {
        read(&self.state)
            .notifications
            .iter()
            .filter(|notification| !notification.read)
            .count()
    }

    /// Offer a notification; at most one entry per id is ever accepted.
    pub fn push(&self, notification: Notification) -> InsertOutcome {
        {
            let now = Utc::now();
            let mut state = write(&self.state);
            if state.seen.contains_key(&notification.id) {
                tracing::debug!(id = %notification.id, "Duplicate notification ignored");
                return InsertOutcome::Duplicate;
            }
            state.prune_seen(now);
            state.seen.insert(notification.id.clone(), now);
            state.notifications.insert(0, notification.clone());
        }
        self.persist();
        tracing::info!(id = %notification.id, kind = ?notification.kind, "Notification added");
        // Nobody listening is fine.
        let _ = self.events.send(notification);
        InsertOutcome::Inserted
    }

    pub async fn handle_notification(&self, source: &BackendNotification) -> InsertOutcome {
        let mut notification = Notification::new(
            NotificationKind::Notification,
            &source.id,
            source
                .title
                .clone()
                .filter(|title| !title.trim().is_empty())
                .unwrap_or_else(|| "New Notification".to_string()),
            source.content.clone().unwrap_or_default(),
            source.created_at,
        );
        if let Some(sender) = &source.sender {
            notification.actor = Some(self.profiles.actor(sender).await);
        }
        self.push(notification)
    }

    /// Tell the requester their request was accepted.
    pub async fn show_request_accepted(
        &self,
        request: &ItemRequest,
        item: Option<&Item>,
    ) -> InsertOutcome {
        let title = item.map_or("an item", Item::display_title);
        let mut notification = Notification::new(
            NotificationKind::RequestAccepted,
            request.id.as_str(),
            "Request Accepted!",
            format!("Your request for \"{title}\" has been accepted!"),
            Utc::now(),
        );
        if let Some(owner) = item.and_then(|item| item.owner.as_ref()) {
            notification.actor = Some(self.profiles.actor(owner).await);
        }
        notification.item_title = item.map(|item| item.display_title().to_string());
        notification.item_id = Some(request.item.clone());
        notification.request_id = Some(request.id.clone());
        self.push(notification)
    }

    /// Tell the lender someone wants to pick up their item.
    pub async fn show_transaction_created(
        &self,
        transaction: &Transaction,
        item: Option<&Item>,
    ) -> InsertOutcome {
        let title = item.map_or("an item", Item::display_title);
        let mut notification = Notification::new(
            NotificationKind::TransactionCreated,
            transaction.id.as_str(),
            "New Transaction!",
            format!("Someone wants to borrow \"{title}\"!"),
            Utc::now(),
        );
        notification.actor = Some(self.profiles.actor(&transaction.to).await);
        notification.item_title = item.map(|item| item.display_title().to_string());
        notification.item_id = Some(transaction.item.clone());
        notification.transaction_id = Some(transaction.id.clone());
        self.push(notification)
    }

    pub async fn show_message(&self, message: &BackendMessage, item: Option<&Item>) -> InsertOutcome {
        let content = if message.content.trim().is_empty() {
            "You have a new message".to_string()
        } else {
            message.content.clone()
        };
        let mut notification = Notification::new(
            NotificationKind::Message,
            message.id.as_str(),
            "New Message",
            content,
            message.created_at,
        );
        notification.actor = Some(self.profiles.actor(&message.author).await);
        notification.item_title = item.map(|item| item.display_title().to_string());
        notification.item_id = item.map(|item| item.id.clone());
        notification.conversation_id = Some(message.conversation.clone());
        self.push(notification)
    }

    pub fn mark_read(&self, id: &str) -> bool {
        let changed = {
            let mut state = write(&self.state);
            state
                .notifications
                .iter_mut()
                .find(|notification| notification.id == id && !notification.read)
                .map(|notification| notification.read = true)
                .is_some()
        };
        if changed {
            self.persist();
        }
        changed
    }

    pub fn mark_all_read(&self) {
        {
            let mut state = write(&self.state);
            for notification in &mut state.notifications {
                notification.read = true;
            }
        }
        self.persist();
    }

    /// Remove an entry; its id stays known so replays cannot restore it.
    pub fn dismiss(&self, id: &str) -> bool {
        let removed = {
            let mut state = write(&self.state);
            let before = state.notifications.len();
            state.notifications.retain(|notification| notification.id != id);
            before != state.notifications.len()
        };
        if removed {
            self.persist();
        }
        removed
    }

    /// Empty the visible feed. Seen ids are kept.
    pub fn clear(&self) {
        write(&self.state).notifications.clear();
        self.persist();
    }

    fn persist(&self) {
        let encoded = serde_json::to_string(&*read(&self.state));
        let result = match encoded {
            Ok(encoded) => self.store.set(NOTIFICATIONS_KEY, &encoded),
            Err(error) => Err(error.into()),
        };
        if let Err(error) = result {
            tracing::warn!("Failed to persist notifications: {}", error);
        }
    }
}

fn load_state(store: &dyn KeyValueStore) -> FeedState {
    let raw = match store.get(NOTIFICATIONS_KEY) {
        Ok(Some(raw)) if !raw.trim().is_empty() => raw,
        Ok(_) => return FeedState::default(),
        Err(error) => {
            tracing::warn!("Failed to read persisted notifications: {}", error);
            return FeedState::default();
        }
    };
    match serde_json::from_str::<FeedState>(&raw) {
        Ok(mut state) => {
            for notification in &state.notifications {
                state
                    .seen
                    .entry(notification.id.clone())
                    .or_insert(notification.timestamp);
            }
            state.prune_seen(Utc::now());
            state
        }
        Err(error) => {
            tracing::warn!("Discarding unreadable notification feed: {}", error);
            FeedState::default()
        }
    }
}
