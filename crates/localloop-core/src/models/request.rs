//! Item request model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Item, ItemId, RequestId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestType {
    Borrow,
    Transfer,
    Item,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Rejected,
    Cancelled,
}

/// A borrower's ask against an item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRequest {
    #[serde(rename = "_id")]
    pub id: RequestId,
    pub requester: UserId,
    pub item: ItemId,
    #[serde(rename = "type")]
    pub request_type: RequestType,
    pub status: RequestStatus,
    #[serde(default)]
    pub requester_notes: String,
    #[serde(default)]
    pub requested_start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub requested_end_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Input for `ItemRequesting/createRequest`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRequest {
    pub requester: UserId,
    pub item: ItemId,
    pub request_type: RequestType,
    pub notes: String,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl NewRequest {
    /// Local mirror of the request the backend just created.
    pub fn into_pending(self, id: RequestId) -> ItemRequest {
        ItemRequest {
            id,
            requester: self.requester,
            item: self.item,
            request_type: self.request_type,
            status: RequestStatus::Pending,
            requester_notes: self.notes,
            requested_start_time: self.start_time,
            requested_end_time: self.end_time,
            created_at: Utc::now(),
        }
    }
}

/// A request with the item details cached alongside it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestWithItem {
    pub request: ItemRequest,
    pub item_details: Option<Item>,
}
