//! Optimistic local mutations and their reconciliation.
//!
//! Every cache entry that can be written locally before the backend
//! confirms it is wrapped in [`Tracked`]. The request, transaction and
//! message caches all go through [`reconcile`] once the backend answers,
//! and through [`Tracked::accept_remote`] when a push event carries the
//! authoritative copy (last write wins, keyed by canonical id).

use std::ops::Deref;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Applied locally, backend has not answered yet
    Optimistic,
    /// Matches what the backend last reported
    #[default]
    Confirmed,
    /// Backend rejected the mutation and the local value was kept
    Failed,
}

/// What to do with a local value when the backend rejects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Keep the tentative value, flagged as failed
    Retain,
    /// Restore the value from before the optimistic change
    Rollback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound(serialize = "T: Serialize", deserialize = "T: Deserialize<'de>"))]
pub struct Tracked<T> {
    value: T,
    #[serde(default)]
    status: SyncStatus,
    #[serde(skip)]
    rollback: Option<T>,
}

impl<T> Tracked<T> {
    pub const fn confirmed(value: T) -> Self {
        Self {
            value,
            status: SyncStatus::Confirmed,
            rollback: None,
        }
    }

    /// A locally created entry with nothing to roll back to.
    pub const fn optimistic(value: T) -> Self {
        Self {
            value,
            status: SyncStatus::Optimistic,
            rollback: None,
        }
    }

    pub const fn status(&self) -> SyncStatus {
        self.status
    }

    pub fn is_pending(&self) -> bool {
        self.status == SyncStatus::Optimistic
    }

    pub const fn value(&self) -> &T {
        &self.value
    }

    pub fn into_inner(self) -> T {
        self.value
    }

    /// Mark the current value as acknowledged by the backend.
    pub fn confirm(&mut self) {
        self.status = SyncStatus::Confirmed;
        self.rollback = None;
    }

    /// Replace the value with the backend's copy and confirm it.
    pub fn confirm_with(&mut self, value: T) {
        self.value = value;
        self.confirm();
    }

    /// Authoritative remote state wins over whatever is pending locally.
    pub fn accept_remote(&mut self, value: T) {
        self.confirm_with(value);
    }

    pub fn fail(&mut self, policy: FailurePolicy) {
        match (policy, self.rollback.take()) {
            (FailurePolicy::Rollback, Some(previous)) => {
                self.value = previous;
                self.status = SyncStatus::Confirmed;
            }
            _ => self.status = SyncStatus::Failed,
        }
    }
}

impl<T: Clone> Tracked<T> {
    /// Apply a tentative change, remembering the last confirmed value.
    pub fn apply_optimistic(&mut self, change: impl FnOnce(&mut T)) {
        if self.rollback.is_none() {
            self.rollback = Some(self.value.clone());
        }
        change(&mut self.value);
        self.status = SyncStatus::Optimistic;
    }
}

impl<T> Deref for Tracked<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

/// Settle a tracked entry with the outcome of its backend call.
///
/// `Ok(Some(value))` replaces the entry with the backend copy, `Ok(None)`
/// confirms the local value as is, and `Err` applies `policy` before the
/// error is handed back to the caller.
pub fn reconcile<T, E>(
    entry: &mut Tracked<T>,
    outcome: Result<Option<T>, E>,
    policy: FailurePolicy,
) -> Result<(), E> {
    match outcome {
        Ok(Some(value)) => {
            entry.confirm_with(value);
            Ok(())
        }
        Ok(None) => {
            entry.confirm();
            Ok(())
        }
        Err(error) => {
            entry.fail(policy);
            Err(error)
        }
    }
}
