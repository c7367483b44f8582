//! Transaction model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Item, ItemId, TransactionId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Borrow,
    Transfer,
    Item,
}

/// `PENDING_PICKUP -> IN_PROGRESS | COMPLETED -> PENDING_RETURN -> COMPLETED`,
/// or `CANCELLED` from any open state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    PendingPickup,
    InProgress,
    PendingReturn,
    Completed,
    Cancelled,
}

impl TransactionStatus {
    pub const fn is_open(self) -> bool {
        !matches!(self, Self::Completed | Self::Cancelled)
    }
}

/// An accepted exchange between a lender (`from`) and a borrower (`to`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    #[serde(rename = "_id")]
    pub id: TransactionId,
    pub from: UserId,
    pub to: UserId,
    pub item: ItemId,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub status: TransactionStatus,
    #[serde(default)]
    pub from_notes: String,
    #[serde(default)]
    pub to_notes: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub picked_up_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub returned_at: Option<DateTime<Utc>>,
}

impl Transaction {
    /// Whether this transaction links exactly `a` and `b`, in either role.
    pub fn is_between(&self, a: &UserId, b: &UserId) -> bool {
        (&self.from == a && &self.to == b) || (&self.from == b && &self.to == a)
    }

    /// The participant that is not `user`.
    pub fn counterpart(&self, user: &UserId) -> &UserId {
        if &self.from == user {
            &self.to
        } else {
            &self.from
        }
    }

    /// Status after pickup: borrows stay open until returned.
    pub const fn status_after_pickup(&self) -> TransactionStatus {
        match self.transaction_type {
            TransactionType::Borrow => TransactionStatus::InProgress,
            TransactionType::Transfer | TransactionType::Item => TransactionStatus::Completed,
        }
    }
}

/// A transaction enriched for the current viewer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionWithItem {
    pub transaction: Transaction,
    pub item_details: Option<Item>,
    /// True iff the viewer is the `from` party; fixed at first insertion
    pub is_lending: bool,
}
