//! Conversation cache.
//!
//! Conversations are keyed locally by the sorted participant pair plus the
//! item, and bound lazily to a backend conversation. The backend only
//! knows conversations per transaction, so a binding needs a transaction
//! between the two users for that item.
//!
//! The whole map is persisted after every change and reloaded verbatim.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;

use super::{read, write, ItemCache, LastError, NotificationFeed, TransactionCache};
use crate::api::MarketplaceApi;
use crate::auth::SessionManager;
use crate::error::{Error, Result};
use crate::models::{
    BackendMessage, Conversation, ConversationId, ConversationKey, ItemId, Message, MessageId,
    UserId,
};
use crate::pending::{reconcile, FailurePolicy, SyncStatus, Tracked};
use crate::storage::{KeyValueStore, CONVERSATIONS_KEY};

type ConversationMap = BTreeMap<ConversationKey, Conversation>;

pub struct MessageCache {
    api: Arc<dyn MarketplaceApi>,
    session: Arc<SessionManager>,
    transactions: Arc<TransactionCache>,
    items: Arc<ItemCache>,
    notifications: Arc<NotificationFeed>,
    store: Arc<dyn KeyValueStore>,
    conversations: RwLock<ConversationMap>,
    last_error: LastError,
}

impl MessageCache {
    pub fn new(
        api: Arc<dyn MarketplaceApi>,
        session: Arc<SessionManager>,
        transactions: Arc<TransactionCache>,
        items: Arc<ItemCache>,
        notifications: Arc<NotificationFeed>,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        let conversations = load_conversations(store.as_ref());
        Self {
            api,
            session,
            transactions,
            items,
            notifications,
            store,
            conversations: RwLock::new(conversations),
            last_error: LastError::default(),
        }
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.get()
    }

    /// The conversation between `user` and `other` about `item`, created empty if new.
    pub fn conversation(&self, user: &UserId, other: &UserId, item: &ItemId) -> Conversation {
        self.with_conversation(user, other, item, |conversation| conversation.clone())
    }

    /// Conversations `user` takes part in, most recently active first.
    pub fn user_conversations(&self, user: &UserId) -> Vec<Conversation> {
        let mut conversations: Vec<_> = read(&self.conversations)
            .values()
            .filter(|conversation| conversation.involves(user))
            .cloned()
            .collect();
        conversations.sort_by(|a, b| b.last_message_time.cmp(&a.last_message_time));
        conversations
    }

    pub fn unread_count(&self, user: &UserId) -> usize {
        read(&self.conversations)
            .values()
            .filter(|conversation| conversation.involves(user))
            .map(|conversation| conversation.unread_count(user))
            .sum()
    }

    pub fn conversation_unread_count(&self, user: &UserId, other: &UserId, item: &ItemId) -> usize {
        read(&self.conversations)
            .get(&ConversationKey::new(user, other, item))
            .map_or(0, |conversation| conversation.unread_count(user))
    }

    /// Backend conversation id for this thread, resolving and creating it as needed.
    pub async fn ensure_binding(
        &self,
        user: &UserId,
        other: &UserId,
        item: &ItemId,
    ) -> Result<ConversationId> {
        let key = ConversationKey::new(user, other, item);
        if let Some(id) = read(&self.conversations)
            .get(&key)
            .and_then(|conversation| conversation.backend_conversation_id.clone())
        {
            return Ok(id);
        }

        let transaction = self
            .transactions
            .transaction_between(user, other, item)
            .await?
            .ok_or_else(|| Error::MissingBinding(key.to_string()))?;

        let existing = self
            .api
            .conversations_by_user(user)
            .await?
            .into_iter()
            .find(|conversation| conversation.transaction == transaction.id);
        let id = match existing {
            Some(conversation) => conversation.id,
            None => {
                tracing::info!(transaction_id = %transaction.id, "Creating backend conversation");
                self.api
                    .create_conversation(user, other, &transaction.id)
                    .await?
            }
        };

        self.with_conversation(user, other, item, |conversation| {
            conversation.backend_conversation_id = Some(id.clone());
        });
        Ok(id)
    }

    /// Send a message. The message is always kept locally; a delivery
    /// failure leaves it flagged as failed instead of returning an error.
    pub async fn send_message(
        &self,
        from: &UserId,
        to: &UserId,
        item: &ItemId,
        content: &str,
    ) -> Tracked<Message> {
        let content = content.trim().to_string();
        let temporary = Message {
            id: MessageId::temporary(),
            from_user_id: from.clone(),
            to_user_id: to.clone(),
            content: content.clone(),
            timestamp: Utc::now(),
            read: true,
        };
        let temporary_id = temporary.id.clone();
        self.with_conversation(from, to, item, |conversation| {
            conversation.messages.push(Tracked::optimistic(temporary.clone()));
            conversation.last_message_time = temporary.timestamp;
        });

        let delivered = match self.ensure_binding(from, to, item).await {
            Ok(conversation_id) => self.api.send_message(&conversation_id, &content).await,
            Err(error) => Err(error),
        };

        let settled = self.with_conversation(from, to, item, |conversation| {
            settle_sent(conversation, &temporary_id, delivered)
        });
        match settled {
            Ok(message) => message,
            Err(error) => {
                self.last_error.record("Failed to send message", &error);
                self.conversation(from, to, item)
                    .messages
                    .into_iter()
                    .find(|message| message.id == temporary_id)
                    .unwrap_or_else(|| {
                        let mut failed = Tracked::optimistic(temporary);
                        failed.fail(FailurePolicy::Retain);
                        failed
                    })
            }
        }
    }

    /// Mark everything addressed to `user` in this thread as read.
    ///
    /// Without a transaction the change stays local. When the conversation
    /// cannot be resolved nothing is marked; backend failures are returned
    /// after the local change.
    pub async fn mark_as_read(&self, user: &UserId, other: &UserId, item: &ItemId) -> Result<()> {
        let conversation_id = match self.ensure_binding(user, other, item).await {
            Ok(id) => id,
            Err(Error::MissingBinding(key)) => {
                tracing::debug!(%key, "No backend conversation; marking read locally");
                self.mark_local_read(user, other, item);
                return Ok(());
            }
            Err(error) => {
                tracing::error!("Failed to resolve conversation for read receipt: {}", error);
                return Err(error);
            }
        };

        self.mark_local_read(user, other, item);
        if let Err(error) = self.api.mark_conversation_read(&conversation_id).await {
            tracing::error!(conversation_id = %conversation_id, "Failed to mark conversation read: {}", error);
            return Err(error);
        }
        Ok(())
    }

    fn mark_local_read(&self, user: &UserId, other: &UserId, item: &ItemId) {
        self.with_conversation(user, other, item, |conversation| {
            for message in &mut conversation.messages {
                if message.is_unread_for(user) {
                    let mut value = message.value().clone();
                    value.read = true;
                    message.confirm_with(value);
                }
            }
        });
    }

    /// Merge the backend history into the local thread.
    ///
    /// Failures leave the cached thread untouched and are recorded.
    pub async fn fetch_messages(
        &self,
        user: &UserId,
        other: &UserId,
        item: &ItemId,
    ) -> Vec<Tracked<Message>> {
        self.last_error.clear();
        let fetched = match self.ensure_binding(user, other, item).await {
            Ok(conversation_id) => self.api.messages(&conversation_id).await,
            Err(error) => Err(error),
        };
        match fetched {
            Ok(messages) => self.with_conversation(user, other, item, |conversation| {
                for message in &messages {
                    merge_message(conversation, Message::from_backend(message, user, other));
                }
                conversation.normalize();
                conversation.messages.clone()
            }),
            Err(Error::MissingBinding(_)) => self.conversation(user, other, item).messages,
            Err(error) => {
                self.last_error.record("Failed to fetch messages", &error);
                self.conversation(user, other, item).messages
            }
        }
    }

    /// Merge a pushed message and notify the viewer about messages from others.
    pub async fn handle_message(&self, message: BackendMessage) {
        let Some(viewer) = self.session.current_user_id() else {
            tracing::debug!(message_id = %message.id, "Message received while signed out");
            return;
        };

        let item = match self.thread_for(&viewer, &message.conversation).await {
            Ok((other, item_id)) => {
                let local = Message::from_backend(&message, &viewer, &other);
                self.with_conversation(&viewer, &other, &item_id, |conversation| {
                    conversation.backend_conversation_id = Some(message.conversation.clone());
                    merge_message(conversation, local);
                    conversation.normalize();
                });
                self.items.item_or_none(&item_id).await
            }
            Err(error) => {
                tracing::warn!(
                    conversation_id = %message.conversation,
                    "Could not place pushed message in a thread: {}",
                    error
                );
                None
            }
        };

        if message.author != viewer {
            self.notifications
                .show_message(&message, item.as_ref())
                .await;
        }
    }

    /// Counterpart and item of a backend conversation the viewer takes part in.
    async fn thread_for(
        &self,
        viewer: &UserId,
        conversation_id: &ConversationId,
    ) -> Result<(UserId, ItemId)> {
        let known = read(&self.conversations)
            .values()
            .find(|conversation| {
                conversation.backend_conversation_id.as_ref() == Some(conversation_id)
                    && conversation.involves(viewer)
            })
            .map(|conversation| {
                let other = if &conversation.user_id == viewer {
                    conversation.other_user_id.clone()
                } else {
                    conversation.user_id.clone()
                };
                (other, conversation.item_id.clone())
            });
        if let Some(thread) = known {
            return Ok(thread);
        }

        let conversation = self
            .api
            .conversations_by_user(viewer)
            .await?
            .into_iter()
            .find(|conversation| &conversation.id == conversation_id)
            .ok_or_else(|| Error::NotFound(format!("conversation {conversation_id}")))?;
        let other = conversation
            .counterpart(viewer)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("conversation {conversation_id}")))?;
        let transaction = self.transactions.transaction(&conversation.transaction).await?;
        Ok((other, transaction.item))
    }

    fn with_conversation<R>(
        &self,
        user: &UserId,
        other: &UserId,
        item: &ItemId,
        change: impl FnOnce(&mut Conversation) -> R,
    ) -> R {
        let result = {
            let mut conversations = write(&self.conversations);
            let conversation = conversations
                .entry(ConversationKey::new(user, other, item))
                .or_insert_with(|| Conversation::new(user.clone(), other.clone(), item.clone()));
            change(conversation)
        };
        self.persist();
        result
    }

    fn persist(&self) {
        let encoded = serde_json::to_string(&*read(&self.conversations));
        let result = match encoded {
            Ok(encoded) => self.store.set(CONVERSATIONS_KEY, &encoded),
            Err(error) => Err(error.into()),
        };
        if let Err(error) = result {
            tracing::warn!("Failed to persist conversations: {}", error);
        }
    }
}

/// Insert `message`, or update the entry that already carries its id.
fn merge_message(conversation: &mut Conversation, message: Message) {
    match conversation.position(&message.id) {
        Some(index) => {
            let entry = &mut conversation.messages[index];
            let read = message.read || entry.read;
            entry.accept_remote(Message { read, ..message });
        }
        None => conversation.messages.push(Tracked::confirmed(message)),
    }
}

/// Resolve an optimistic message with the delivery outcome.
///
/// On success the temporary id becomes the canonical one, unless a push
/// already delivered that id, in which case the temporary entry is dropped.
fn settle_sent(
    conversation: &mut Conversation,
    temporary_id: &MessageId,
    delivered: Result<MessageId>,
) -> Result<Tracked<Message>> {
    let Some(index) = conversation.position(temporary_id) else {
        return Err(Error::NotFound(format!("pending message {temporary_id}")));
    };

    match delivered {
        Ok(canonical) => {
            if let Some(existing) = conversation.position(&canonical) {
                let pushed = conversation.messages[existing].clone();
                conversation.messages.remove(index);
                return Ok(pushed);
            }
            let entry = &mut conversation.messages[index];
            let mut value = entry.value().clone();
            value.id = canonical;
            reconcile(entry, Ok::<_, Error>(Some(value)), FailurePolicy::Retain)?;
            Ok(entry.clone())
        }
        Err(error) => {
            let entry = &mut conversation.messages[index];
            reconcile(entry, Err::<Option<Message>, _>(error), FailurePolicy::Retain)?;
            Ok(entry.clone())
        }
    }
}

fn load_conversations(store: &dyn KeyValueStore) -> ConversationMap {
    let raw = match store.get(CONVERSATIONS_KEY) {
        Ok(Some(raw)) if !raw.trim().is_empty() => raw,
        Ok(_) => return ConversationMap::new(),
        Err(error) => {
            tracing::warn!("Failed to read persisted conversations: {}", error);
            return ConversationMap::new();
        }
    };
    match serde_json::from_str::<ConversationMap>(&raw) {
        Ok(mut conversations) => {
            // Deliveries in flight when the process stopped never completed.
            for message in conversations
                .values_mut()
                .flat_map(|conversation| conversation.messages.iter_mut())
                .filter(|message| message.status() == SyncStatus::Optimistic)
            {
                message.fail(FailurePolicy::Retain);
            }
            conversations
        }
        Err(error) => {
            tracing::warn!("Discarding unreadable conversation cache: {}", error);
            ConversationMap::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::auth::testing::signed_in_manager;
    use crate::cache::ProfileCache;
    use crate::models::TransactionStatus;
    use crate::storage::MemoryStore;
    use crate::testing::{conversation, item, message, transaction, FakeApi};

    struct Harness {
        api: Arc<FakeApi>,
        feed: Arc<NotificationFeed>,
        cache: MessageCache,
    }

    async fn harness(viewer: &str, store: Arc<MemoryStore>) -> Harness {
        let api = Arc::new(FakeApi::new());
        {
            let mut state = api.state();
            state.viewer = Some(UserId::new(viewer));
            state
                .items
                .insert(ItemId::new("lamp"), item("lamp", "lender", "Lamp"));
        }
        let (session, _) = signed_in_manager(viewer).await;
        let items = Arc::new(ItemCache::new(api.clone()));
        let feed = Arc::new(NotificationFeed::new(
            Arc::new(MemoryStore::new()),
            Arc::new(ProfileCache::new(api.clone())),
        ));
        let transactions = Arc::new(TransactionCache::new(
            api.clone(),
            session.clone(),
            items.clone(),
            feed.clone(),
        ));
        let cache = MessageCache::new(
            api.clone(),
            session,
            transactions,
            items,
            feed.clone(),
            store,
        );
        Harness {
            api,
            feed,
            cache,
        }
    }

    fn ids() -> (UserId, UserId, ItemId) {
        (
            UserId::new("borrower"),
            UserId::new("lender"),
            ItemId::new("lamp"),
        )
    }

    fn with_transaction(api: &FakeApi) {
        api.state().transactions.push(transaction(
            "t1",
            "lender",
            "borrower",
            "lamp",
            TransactionStatus::InProgress,
        ));
    }

    #[tokio::test]
    async fn send_without_transaction_is_kept_as_failed() {
        let h = harness("borrower", Arc::new(MemoryStore::new())).await;
        let (me, other, lamp) = ids();

        let sent = h.cache.send_message(&me, &other, &lamp, " hello ").await;
        assert_eq!(sent.status(), SyncStatus::Failed);
        assert_eq!(sent.content, "hello");

        let conversation = h.cache.conversation(&me, &other, &lamp);
        assert_eq!(conversation.messages.len(), 1);
        assert_eq!(conversation.messages[0].status(), SyncStatus::Failed);
        assert!(h.cache.last_error().is_some());
        assert_eq!(h.api.calls("send_message"), 0);
    }

    #[tokio::test]
    async fn send_binds_once_and_swaps_temporary_id() {
        let h = harness("borrower", Arc::new(MemoryStore::new())).await;
        with_transaction(&h.api);
        let (me, other, lamp) = ids();

        let first = h.cache.send_message(&me, &other, &lamp, "hi").await;
        let second = h.cache.send_message(&me, &other, &lamp, "there").await;

        assert_eq!(first.status(), SyncStatus::Confirmed);
        assert!(!first.id.is_temporary());
        assert!(!second.id.is_temporary());
        assert_eq!(h.api.calls("create_conversation"), 1);
        assert_eq!(h.api.calls("conversations_by_user"), 1);
        let conversation = h.cache.conversation(&me, &other, &lamp);
        assert_eq!(conversation.messages.len(), 2);
        assert!(conversation.backend_conversation_id.is_some());
    }

    #[tokio::test]
    async fn existing_backend_conversation_is_reused() {
        let h = harness("borrower", Arc::new(MemoryStore::new())).await;
        with_transaction(&h.api);
        h.api
            .state()
            .conversations
            .push(conversation("c1", "borrower", "lender", "t1"));
        let (me, other, lamp) = ids();

        let id = h.cache.ensure_binding(&me, &other, &lamp).await.unwrap();
        assert_eq!(id, ConversationId::new("c1"));
        assert_eq!(h.api.calls("create_conversation"), 0);
    }

    #[test]
    fn push_before_send_completion_is_deduplicated() {
        let (me, other, lamp) = ids();
        let mut conversation = Conversation::new(me.clone(), other.clone(), lamp);
        let temporary = MessageId::temporary();
        conversation.messages.push(Tracked::optimistic(Message {
            id: temporary.clone(),
            from_user_id: me.clone(),
            to_user_id: other.clone(),
            content: "hi".to_string(),
            timestamp: Utc::now(),
            read: true,
        }));
        merge_message(
            &mut conversation,
            Message::from_backend(&message("m1", "c1", "borrower", "hi", 0), &me, &other),
        );

        let settled = settle_sent(&mut conversation, &temporary, Ok(MessageId::new("m1"))).unwrap();
        assert_eq!(settled.id, MessageId::new("m1"));
        assert_eq!(conversation.messages.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_push_updates_in_place_and_notifies_once() {
        let h = harness("borrower", Arc::new(MemoryStore::new())).await;
        with_transaction(&h.api);
        h.api
            .state()
            .conversations
            .push(conversation("c1", "lender", "borrower", "t1"));
        let (me, other, lamp) = ids();

        let pushed = message("m1", "c1", "lender", "is it still free?", 1);
        h.cache.handle_message(pushed.clone()).await;
        h.cache.handle_message(pushed).await;

        let conversation = h.cache.conversation(&me, &other, &lamp);
        assert_eq!(conversation.messages.len(), 1);
        assert_eq!(conversation.backend_conversation_id, Some(ConversationId::new("c1")));
        assert_eq!(h.cache.unread_count(&me), 1);
        let notifications = h.feed.notifications();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].item_title.as_deref(), Some("Lamp"));
    }

    #[tokio::test]
    async fn own_pushed_messages_do_not_notify() {
        let h = harness("borrower", Arc::new(MemoryStore::new())).await;
        with_transaction(&h.api);
        h.api
            .state()
            .conversations
            .push(conversation("c1", "lender", "borrower", "t1"));

        h.cache
            .handle_message(message("m1", "c1", "borrower", "on my way", 1))
            .await;
        assert!(h.feed.notifications().is_empty());
        assert_eq!(h.cache.unread_count(&UserId::new("borrower")), 0);
    }

    #[tokio::test]
    async fn mark_as_read_without_transaction_is_local_only() {
        let h = harness("borrower", Arc::new(MemoryStore::new())).await;
        let (me, other, lamp) = ids();
        h.cache.with_conversation(&me, &other, &lamp, |conversation| {
            conversation.messages.push(Tracked::confirmed(Message {
                id: MessageId::new("m1"),
                from_user_id: other.clone(),
                to_user_id: me.clone(),
                content: "hey".to_string(),
                timestamp: Utc::now(),
                read: false,
            }));
        });

        h.cache.mark_as_read(&me, &other, &lamp).await.unwrap();
        assert_eq!(h.cache.conversation_unread_count(&me, &other, &lamp), 0);
        assert_eq!(h.api.calls("mark_conversation_read"), 0);
    }

    #[tokio::test]
    async fn unresolved_conversation_keeps_messages_unread() {
        let h = harness("borrower", Arc::new(MemoryStore::new())).await;
        with_transaction(&h.api);
        h.api.fail("conversations_by_user");
        let (me, other, lamp) = ids();
        h.cache.with_conversation(&me, &other, &lamp, |conversation| {
            conversation.messages.push(Tracked::confirmed(Message {
                id: MessageId::new("m1"),
                from_user_id: other.clone(),
                to_user_id: me.clone(),
                content: "still free?".to_string(),
                timestamp: Utc::now(),
                read: false,
            }));
        });

        let result = h.cache.mark_as_read(&me, &other, &lamp).await;
        assert!(matches!(result, Err(Error::Server { .. })));
        assert_eq!(h.cache.conversation_unread_count(&me, &other, &lamp), 1);
        assert_eq!(h.api.calls("mark_conversation_read"), 0);
    }

    #[tokio::test]
    async fn mark_as_read_rethrows_backend_failure() {
        let h = harness("borrower", Arc::new(MemoryStore::new())).await;
        with_transaction(&h.api);
        h.api.fail("mark_conversation_read");
        let (me, other, lamp) = ids();

        let result = h.cache.mark_as_read(&me, &other, &lamp).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn fetched_history_is_merged_in_order() {
        let h = harness("borrower", Arc::new(MemoryStore::new())).await;
        with_transaction(&h.api);
        {
            let mut state = h.api.state();
            state
                .conversations
                .push(conversation("c1", "lender", "borrower", "t1"));
            state.messages.push(message("m2", "c1", "borrower", "second", 2));
            let mut first = message("m1", "c1", "lender", "first", 1);
            first.read_at = Some(Utc::now());
            state.messages.push(first);
        }
        let (me, other, lamp) = ids();

        let messages = h.cache.fetch_messages(&me, &other, &lamp).await;
        let contents: Vec<_> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second"]);
        assert!(messages.iter().all(|m| m.read));

        // A second fetch does not duplicate anything.
        assert_eq!(h.cache.fetch_messages(&me, &other, &lamp).await.len(), 2);
    }

    #[tokio::test]
    async fn cache_round_trips_through_storage() {
        let store = Arc::new(MemoryStore::new());
        let (me, other, lamp) = ids();
        let before = {
            let h = harness("borrower", store.clone()).await;
            with_transaction(&h.api);
            h.cache.send_message(&me, &other, &lamp, "hello").await;
            h.cache.conversation(&me, &other, &lamp)
        };
        assert!(store.get(CONVERSATIONS_KEY).unwrap().is_some());

        let h = harness("borrower", store).await;
        assert_eq!(h.cache.conversation(&me, &other, &lamp), before);
        assert_eq!(h.cache.user_conversations(&me).len(), 1);
    }

    #[test]
    fn in_flight_messages_fail_on_reload() {
        let store = MemoryStore::new();
        let (me, other, lamp) = ids();
        let mut conversation = Conversation::new(me.clone(), other.clone(), lamp);
        conversation.messages.push(Tracked::optimistic(Message {
            id: MessageId::temporary(),
            from_user_id: me,
            to_user_id: other,
            content: "pending".to_string(),
            timestamp: Utc::now(),
            read: true,
        }));
        let mut map = ConversationMap::new();
        map.insert(conversation.key(), conversation);
        store
            .set(CONVERSATIONS_KEY, &serde_json::to_string(&map).unwrap())
            .unwrap();

        let loaded = load_conversations(&store);
        let message = &loaded.values().next().unwrap().messages[0];
        assert_eq!(message.status(), SyncStatus::Failed);
    }
}
