//! Client-side caches reconciled against the backend and the push stream.
//!
//! Each cache owns its state behind a synchronous lock that is never held
//! across an `.await`; backend calls happen between short critical
//! sections.

pub mod items;
pub mod listings;
pub mod messages;
pub mod notifications;
pub mod profiles;
pub mod requests;
pub mod transactions;

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub use items::ItemCache;
pub use listings::ListingCache;
pub use messages::MessageCache;
pub use notifications::{InsertOutcome, NotificationFeed};
pub use profiles::ProfileCache;
pub use requests::RequestCache;
pub use transactions::TransactionCache;

pub(crate) fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// Last failure recorded by a cache, shown next to stale data.
#[derive(Debug, Default)]
pub(crate) struct LastError(RwLock<Option<String>>);

impl LastError {
    pub(crate) fn record(&self, context: &str, error: &crate::Error) {
        tracing::warn!("{}: {}", context, error);
        *write(&self.0) = Some(format!("{context}: {error}"));
    }

    pub(crate) fn clear(&self) {
        *write(&self.0) = None;
    }

    pub(crate) fn get(&self) -> Option<String> {
        read(&self.0).clone()
    }
}
