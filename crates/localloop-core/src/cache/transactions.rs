//! Transaction lifecycle cache.
//!
//! `is_lending` is decided the first time a transaction is materialised
//! and never recomputed afterwards, whatever later updates say.

use std::sync::{Arc, RwLock};

use chrono::Utc;

use super::{read, write, ItemCache, LastError, NotificationFeed};
use crate::api::MarketplaceApi;
use crate::auth::SessionManager;
use crate::error::Result;
use crate::models::{
    ItemId, Transaction, TransactionId, TransactionStatus, TransactionWithItem, UserId,
};
use crate::pending::{reconcile, FailurePolicy, Tracked};

/// Lifecycle steps a participant can take on a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    PickUp,
    Return,
    ConfirmReturn,
    Cancel,
}

impl LifecycleAction {
    /// Local effect of the step, mirroring what the backend will do.
    pub fn apply(self, transaction: &mut Transaction) {
        match self {
            Self::PickUp => {
                transaction.status = transaction.status_after_pickup();
                transaction.picked_up_at = Some(Utc::now());
            }
            Self::Return => {
                transaction.status = TransactionStatus::PendingReturn;
                transaction.returned_at = Some(Utc::now());
            }
            Self::ConfirmReturn => transaction.status = TransactionStatus::Completed,
            Self::Cancel => transaction.status = TransactionStatus::Cancelled,
        }
    }

    const fn describe(self) -> &'static str {
        match self {
            Self::PickUp => "mark as picked up",
            Self::Return => "mark as returned",
            Self::ConfirmReturn => "confirm return",
            Self::Cancel => "cancel transaction",
        }
    }
}

pub struct TransactionCache {
    api: Arc<dyn MarketplaceApi>,
    session: Arc<SessionManager>,
    items: Arc<ItemCache>,
    notifications: Arc<NotificationFeed>,
    entries: RwLock<Vec<Tracked<TransactionWithItem>>>,
    last_error: LastError,
}

impl TransactionCache {
    pub fn new(
        api: Arc<dyn MarketplaceApi>,
        session: Arc<SessionManager>,
        items: Arc<ItemCache>,
        notifications: Arc<NotificationFeed>,
    ) -> Self {
        Self {
            api,
            session,
            items,
            notifications,
            entries: RwLock::new(Vec::new()),
            last_error: LastError::default(),
        }
    }

    pub fn transactions(&self) -> Vec<Tracked<TransactionWithItem>> {
        read(&self.entries).clone()
    }

    pub fn find(&self, id: &TransactionId) -> Option<Tracked<TransactionWithItem>> {
        read(&self.entries)
            .iter()
            .find(|entry| &entry.transaction.id == id)
            .cloned()
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.get()
    }

    /// Reload every transaction `user` takes part in.
    ///
    /// A failed load empties the list and records the error.
    pub async fn fetch_transactions(&self, user: &UserId) -> Vec<Tracked<TransactionWithItem>> {
        self.last_error.clear();
        let transactions = match self.api.transactions_by_user(user).await {
            Ok(transactions) => transactions,
            Err(error) => {
                self.last_error
                    .record("Failed to fetch transactions", &error);
                write(&self.entries).clear();
                return Vec::new();
            }
        };

        let mut fetched = Vec::with_capacity(transactions.len());
        for transaction in transactions {
            let item_details = self.items.item_or_none(&transaction.item).await;
            let is_lending = &transaction.from == user;
            fetched.push((transaction, item_details, is_lending));
        }

        let mut entries = write(&self.entries);
        let refreshed: Vec<_> = fetched
            .into_iter()
            .map(|(transaction, item_details, is_lending)| {
                let is_lending = entries
                    .iter()
                    .find(|entry| entry.transaction.id == transaction.id)
                    .map_or(is_lending, |entry| entry.is_lending);
                Tracked::confirmed(TransactionWithItem {
                    transaction,
                    item_details,
                    is_lending,
                })
            })
            .collect();
        entries.clone_from(&refreshed);
        refreshed
    }

    /// A transaction by id, from cache or the backend.
    pub async fn transaction(&self, id: &TransactionId) -> Result<Transaction> {
        if let Some(entry) = self.find(id) {
            return Ok(entry.transaction.clone());
        }
        self.api.transaction(id).await
    }

    /// The transaction linking `user` and `other` around `item`, if any.
    pub fn find_between(&self, user: &UserId, other: &UserId, item: &ItemId) -> Option<Transaction> {
        latest_between(
            read(&self.entries).iter().map(|entry| &entry.transaction),
            user,
            other,
            item,
        )
    }

    /// Like [`Self::find_between`], asking the backend on a cache miss.
    pub async fn transaction_between(
        &self,
        user: &UserId,
        other: &UserId,
        item: &ItemId,
    ) -> Result<Option<Transaction>> {
        if let Some(transaction) = self.find_between(user, other, item) {
            return Ok(Some(transaction));
        }
        let transactions = self.api.transactions_by_user(user).await?;
        Ok(latest_between(transactions.iter(), user, other, item))
    }

    pub async fn mark_picked_up(&self, id: &TransactionId) -> Result<()> {
        self.run_lifecycle(id, LifecycleAction::PickUp).await
    }

    pub async fn mark_returned(&self, id: &TransactionId) -> Result<()> {
        self.run_lifecycle(id, LifecycleAction::Return).await
    }

    pub async fn confirm_return(&self, id: &TransactionId) -> Result<()> {
        self.run_lifecycle(id, LifecycleAction::ConfirmReturn).await
    }

    pub async fn cancel_transaction(&self, id: &TransactionId) -> Result<()> {
        self.run_lifecycle(id, LifecycleAction::Cancel).await
    }

    /// Apply `action` locally, ask the backend, then confirm or roll back.
    pub async fn run_lifecycle(&self, id: &TransactionId, action: LifecycleAction) -> Result<()> {
        self.with_entry(id, |entry| {
            entry.apply_optimistic(|value| action.apply(&mut value.transaction));
        });

        let outcome = match action {
            LifecycleAction::PickUp => self.api.mark_picked_up(id).await,
            LifecycleAction::Return => self.api.mark_returned(id).await,
            LifecycleAction::ConfirmReturn => self.api.confirm_return(id).await,
            LifecycleAction::Cancel => self.api.cancel_transaction(id).await,
        };

        let settled = {
            let mut entries = write(&self.entries);
            match entries.iter_mut().find(|entry| &entry.transaction.id == id) {
                Some(entry) => reconcile(entry, outcome.map(|()| None), FailurePolicy::Rollback),
                None => outcome,
            }
        };
        if let Err(error) = &settled {
            self.last_error
                .record(&format!("Failed to {}", action.describe()), error);
        } else {
            tracing::info!(transaction_id = %id, ?action, "Transaction updated");
        }
        settled
    }

    /// Merge a pushed transaction, materialising it when unknown.
    pub async fn handle_transaction_update(&self, update: Transaction) {
        if let Some(merged) = self.merge_existing(&update) {
            self.notify_if_pickup_pending(&merged).await;
            return;
        }

        let item_details = self.items.item_or_none(&update.item).await;
        let is_lending = self
            .session
            .current_user_id()
            .is_some_and(|viewer| update.from == viewer);

        let materialised = {
            let mut entries = write(&self.entries);
            if let Some(entry) = entries
                .iter_mut()
                .find(|entry| entry.transaction.id == update.id)
            {
                // Tracked meanwhile; keep its fixed role.
                let merged = TransactionWithItem {
                    transaction: update,
                    item_details: entry.item_details.clone().or(item_details),
                    is_lending: entry.is_lending,
                };
                entry.accept_remote(merged.clone());
                merged
            } else {
                let created = TransactionWithItem {
                    transaction: update,
                    item_details,
                    is_lending,
                };
                entries.push(Tracked::confirmed(created.clone()));
                created
            }
        };
        tracing::debug!(transaction_id = %materialised.transaction.id, is_lending, "Transaction materialised");
        self.notify_if_pickup_pending(&materialised).await;
    }

    pub fn clear(&self) {
        write(&self.entries).clear();
        self.last_error.clear();
    }

    fn merge_existing(&self, update: &Transaction) -> Option<TransactionWithItem> {
        let mut entries = write(&self.entries);
        let entry = entries
            .iter_mut()
            .find(|entry| entry.transaction.id == update.id)?;
        let merged = TransactionWithItem {
            transaction: update.clone(),
            item_details: entry.item_details.clone(),
            is_lending: entry.is_lending,
        };
        entry.accept_remote(merged.clone());
        Some(merged)
    }

    fn with_entry(&self, id: &TransactionId, change: impl FnOnce(&mut Tracked<TransactionWithItem>)) {
        let mut entries = write(&self.entries);
        if let Some(entry) = entries.iter_mut().find(|entry| &entry.transaction.id == id) {
            change(entry);
        }
    }

    async fn notify_if_pickup_pending(&self, entry: &TransactionWithItem) {
        if entry.transaction.status == TransactionStatus::PendingPickup && entry.is_lending {
            self.notifications
                .show_transaction_created(&entry.transaction, entry.item_details.as_ref())
                .await;
        }
    }
}

fn latest_between<'a>(
    transactions: impl Iterator<Item = &'a Transaction>,
    user: &UserId,
    other: &UserId,
    item: &ItemId,
) -> Option<Transaction> {
    transactions
        .filter(|tx| &tx.item == item && tx.is_between(user, other))
        .max_by_key(|tx| tx.created_at)
        .cloned()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::auth::testing::signed_in_manager;
    use crate::cache::ProfileCache;
    use crate::pending::SyncStatus;
    use crate::storage::MemoryStore;
    use crate::testing::{at, item, transaction, FakeApi};

    struct Harness {
        api: Arc<FakeApi>,
        feed: Arc<NotificationFeed>,
        cache: TransactionCache,
    }

    async fn harness(viewer: &str) -> Harness {
        let api = Arc::new(FakeApi::new());
        api.state()
            .items
            .insert(ItemId::new("lamp"), item("lamp", "lender", "Lamp"));
        let (session, _) = signed_in_manager(viewer).await;
        let items = Arc::new(ItemCache::new(api.clone()));
        let feed = Arc::new(NotificationFeed::new(
            Arc::new(MemoryStore::new()),
            Arc::new(ProfileCache::new(api.clone())),
        ));
        let cache = TransactionCache::new(api.clone(), session, items, feed.clone());
        Harness { api, feed, cache }
    }

    #[tokio::test]
    async fn failed_reload_degrades_to_empty_list() {
        let h = harness("lender").await;
        h.api.state().transactions.push(transaction(
            "t1",
            "lender",
            "borrower",
            "lamp",
            TransactionStatus::InProgress,
        ));
        let user = UserId::new("lender");
        assert_eq!(h.cache.fetch_transactions(&user).await.len(), 1);

        h.api.fail("transactions_by_user");
        assert!(h.cache.fetch_transactions(&user).await.is_empty());
        assert!(h.cache.transactions().is_empty());
        assert!(h.cache.last_error().is_some());
    }

    #[tokio::test]
    async fn is_lending_is_fixed_at_first_insert() {
        let h = harness("lender").await;
        let mut update = transaction("t1", "lender", "borrower", "lamp", TransactionStatus::PendingPickup);
        h.cache.handle_transaction_update(update.clone()).await;
        assert!(h.cache.find(&TransactionId::new("t1")).unwrap().is_lending);

        // A later payload with swapped roles does not flip the flag.
        update.from = UserId::new("borrower");
        update.to = UserId::new("lender");
        update.status = TransactionStatus::InProgress;
        h.cache.handle_transaction_update(update).await;

        let entry = h.cache.find(&TransactionId::new("t1")).unwrap();
        assert!(entry.is_lending);
        assert_eq!(entry.transaction.status, TransactionStatus::InProgress);
        assert_eq!(
            entry.item_details.as_ref().map(|item| item.title.as_str()),
            Some("Lamp")
        );
    }

    #[tokio::test]
    async fn pending_pickup_notifies_lender_once() {
        let h = harness("lender").await;
        let update = transaction("t1", "lender", "borrower", "lamp", TransactionStatus::PendingPickup);

        h.cache.handle_transaction_update(update.clone()).await;
        h.cache.handle_transaction_update(update).await;

        let notifications = h.feed.notifications();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].id, "transaction_t1");
        assert_eq!(notifications[0].message, "Someone wants to borrow \"Lamp\"!");
    }

    #[tokio::test]
    async fn borrower_is_not_notified_of_pending_pickup() {
        let h = harness("borrower").await;
        h.cache
            .handle_transaction_update(transaction(
                "t1",
                "lender",
                "borrower",
                "lamp",
                TransactionStatus::PendingPickup,
            ))
            .await;

        assert!(!h.cache.find(&TransactionId::new("t1")).unwrap().is_lending);
        assert!(h.feed.notifications().is_empty());
    }

    #[tokio::test]
    async fn pickup_moves_borrow_to_in_progress() {
        let h = harness("borrower").await;
        h.api.state().transactions.push(transaction(
            "t1",
            "lender",
            "borrower",
            "lamp",
            TransactionStatus::PendingPickup,
        ));
        h.cache.fetch_transactions(&UserId::new("borrower")).await;

        h.cache
            .mark_picked_up(&TransactionId::new("t1"))
            .await
            .unwrap();
        let entry = h.cache.find(&TransactionId::new("t1")).unwrap();
        assert_eq!(entry.transaction.status, TransactionStatus::InProgress);
        assert!(entry.transaction.picked_up_at.is_some());
        assert_eq!(entry.status(), SyncStatus::Confirmed);
    }

    #[tokio::test]
    async fn failed_lifecycle_step_rolls_back_and_rethrows() {
        let h = harness("borrower").await;
        h.api.state().transactions.push(transaction(
            "t1",
            "lender",
            "borrower",
            "lamp",
            TransactionStatus::InProgress,
        ));
        h.cache.fetch_transactions(&UserId::new("borrower")).await;
        h.api.fail("mark_returned");

        let result = h.cache.mark_returned(&TransactionId::new("t1")).await;
        assert!(result.is_err());
        let entry = h.cache.find(&TransactionId::new("t1")).unwrap();
        assert_eq!(entry.transaction.status, TransactionStatus::InProgress);
        assert_eq!(entry.transaction.returned_at, None);
        assert!(h.cache.last_error().is_some());
    }

    #[tokio::test]
    async fn refetch_keeps_existing_role() {
        let h = harness("lender").await;
        h.cache
            .handle_transaction_update(transaction(
                "t1",
                "lender",
                "borrower",
                "lamp",
                TransactionStatus::Completed,
            ))
            .await;
        // The backend now reports the same id with roles swapped.
        h.api.state().transactions.push(transaction(
            "t1",
            "borrower",
            "lender",
            "lamp",
            TransactionStatus::Completed,
        ));

        let fetched = h.cache.fetch_transactions(&UserId::new("lender")).await;
        assert_eq!(fetched.len(), 1);
        assert!(fetched[0].is_lending);
    }

    #[tokio::test]
    async fn transaction_between_falls_back_to_backend() {
        let h = harness("borrower").await;
        let mut older = transaction("t1", "lender", "borrower", "lamp", TransactionStatus::Completed);
        older.created_at = at(-60);
        let newer = transaction("t2", "lender", "borrower", "lamp", TransactionStatus::PendingPickup);
        {
            let mut state = h.api.state();
            state.transactions.push(older);
            state.transactions.push(newer);
        }

        let found = h
            .cache
            .transaction_between(
                &UserId::new("borrower"),
                &UserId::new("lender"),
                &ItemId::new("lamp"),
            )
            .await
            .unwrap();
        assert_eq!(found.map(|tx| tx.id), Some(TransactionId::new("t2")));
        assert_eq!(
            h.cache
                .find_between(
                    &UserId::new("borrower"),
                    &UserId::new("lender"),
                    &ItemId::new("other")
                ),
            None
        );
    }
}
