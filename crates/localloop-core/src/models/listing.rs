//! Listing and availability window models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ItemId, ListingId, WindowId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ListingType {
    Borrow,
    Transfer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ListingStatus {
    Available,
    Pending,
    Claimed,
    Expired,
}

/// A published offer to lend or transfer one item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    #[serde(rename = "_id")]
    pub id: ListingId,
    #[serde(default)]
    pub item: Option<ItemId>,
    #[serde(rename = "type")]
    pub listing_type: ListingType,
    pub status: ListingStatus,
    /// Dorm the listing is visible to
    #[serde(default)]
    pub dorm_visibility: String,
}

/// Optional filters for `ItemListing/_getListings`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingFilter {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub listing_type: Option<ListingType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ListingStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dorm_visibility: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WindowStatus {
    Available,
    Reserved,
}

/// A time range during which an item can be picked up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityWindow {
    #[serde(rename = "_id")]
    pub id: WindowId,
    pub item: ItemId,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: WindowStatus,
}

impl AvailabilityWindow {
    pub fn is_reserved(&self) -> bool {
        self.status == WindowStatus::Reserved
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemPhoto {
    #[serde(rename = "_id")]
    pub id: String,
    pub item: ItemId,
    pub photo_url: String,
    pub order: i32,
}
