//! Backend actions.
//!
//! The backend exposes one POST endpoint per "Concept/action". Queries are
//! prefixed with `_` and answer arrays, even for single-row lookups. The
//! caches talk to the backend exclusively through [`MarketplaceApi`], which
//! lets tests substitute a scripted implementation.

mod client;
pub(crate) mod http;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

pub use client::{ApiClient, TokenPlacement};

use crate::error::Result;
use crate::models::{
    AvailabilityWindow, BackendConversation, BackendMessage, ConversationId, Item, ItemDetails,
    ItemId, ItemPhoto, ItemRequest, Listing, ListingFilter, ListingStatus, ListingType, MessageId,
    NewRequest, ProfileUpdate, RequestId, Transaction, TransactionId, UserId, UserProfile,
    WindowId,
};

#[async_trait]
pub trait MarketplaceApi: Send + Sync + 'static {
    // Item
    async fn item(&self, item: &ItemId) -> Result<Item>;
    async fn items_by_owner(&self, owner: &UserId) -> Result<Vec<Item>>;
    async fn all_items(&self) -> Result<Vec<Item>>;
    async fn create_item(&self, details: &ItemDetails) -> Result<ItemId>;
    async fn update_item(&self, item: &ItemId, details: &ItemDetails) -> Result<()>;
    async fn delete_item(&self, item: &ItemId) -> Result<()>;

    // ItemListing
    async fn list_item(
        &self,
        item: &ItemId,
        listing_type: ListingType,
        dorm_visibility: &str,
    ) -> Result<()>;
    async fn unlist_item(&self, item: &ItemId) -> Result<()>;
    async fn update_listing_status(&self, item: &ItemId, status: ListingStatus) -> Result<()>;
    async fn set_availability(
        &self,
        item: &ItemId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<WindowId>;
    async fn reserve_window(&self, window: &WindowId) -> Result<()>;
    async fn remove_availability(&self, window: &WindowId) -> Result<()>;
    async fn listings(&self, filter: &ListingFilter) -> Result<Vec<Listing>>;
    async fn listing_by_item(&self, item: &ItemId) -> Result<Listing>;
    async fn availability_by_item(&self, item: &ItemId) -> Result<Vec<AvailabilityWindow>>;
    async fn photos_by_item(&self, item: &ItemId) -> Result<Vec<ItemPhoto>>;
    async fn available_item_count(&self) -> Result<u64>;

    // ItemRequesting
    async fn create_request(&self, request: &NewRequest) -> Result<RequestId>;
    async fn accept_request(&self, request: &RequestId) -> Result<()>;
    async fn reject_request(&self, request: &RequestId) -> Result<()>;
    async fn cancel_request(&self, request: &RequestId) -> Result<()>;
    async fn requests_by_item(&self, item: &ItemId) -> Result<Vec<ItemRequest>>;
    async fn requests_by_requester(&self, requester: &UserId) -> Result<Vec<ItemRequest>>;
    async fn other_pending_requests(
        &self,
        item: &ItemId,
        exclude: &RequestId,
    ) -> Result<Vec<RequestId>>;

    // ItemTransaction
    async fn transactions_by_user(&self, user: &UserId) -> Result<Vec<Transaction>>;
    async fn transaction(&self, transaction: &TransactionId) -> Result<Transaction>;
    async fn mark_picked_up(&self, transaction: &TransactionId) -> Result<()>;
    async fn mark_returned(&self, transaction: &TransactionId) -> Result<()>;
    async fn confirm_return(&self, transaction: &TransactionId) -> Result<()>;
    async fn cancel_transaction(&self, transaction: &TransactionId) -> Result<()>;

    // Communication
    async fn create_conversation(
        &self,
        participant1: &UserId,
        participant2: &UserId,
        transaction: &TransactionId,
    ) -> Result<ConversationId>;
    async fn send_message(&self, conversation: &ConversationId, content: &str)
        -> Result<MessageId>;
    async fn mark_conversation_read(&self, conversation: &ConversationId) -> Result<()>;
    async fn messages(&self, conversation: &ConversationId) -> Result<Vec<BackendMessage>>;
    async fn conversations_by_user(&self, user: &UserId) -> Result<Vec<BackendConversation>>;

    // UserProfile
    async fn create_profile(&self, display_name: &str, dorm: &str) -> Result<()>;
    async fn update_profile(&self, update: &ProfileUpdate) -> Result<()>;
    async fn profile(&self, user: &UserId) -> Result<Option<UserProfile>>;

    // UserAuthentication account maintenance
    async fn change_password(&self, old_password: &str, new_password: &str) -> Result<()>;
    async fn delete_account(&self, password: &str) -> Result<()>;
}

#[derive(Deserialize)]
struct ItemRow {
    item: Item,
}

#[derive(Deserialize)]
struct ItemList {
    #[serde(default)]
    items: Vec<Item>,
}

#[derive(Deserialize)]
struct CreatedItem {
    item: ItemId,
}

#[derive(Deserialize)]
struct CreatedWindow {
    window: WindowId,
}

#[derive(Deserialize)]
struct CountRow {
    count: u64,
}

#[derive(Deserialize)]
struct CreatedRequest {
    request: RequestId,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OtherRequestRow {
    other_request: RequestId,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionRow {
    transaction_doc: Transaction,
}

#[derive(Deserialize)]
struct CreatedConversation {
    conversation: ConversationId,
}

#[derive(Deserialize)]
struct SentMessage {
    message: MessageId,
}

#[derive(Deserialize)]
struct MessageRow {
    #[serde(default)]
    messages: Vec<BackendMessage>,
}

#[derive(Deserialize)]
struct ConversationList {
    #[serde(default)]
    conversations: Vec<BackendConversation>,
}

#[derive(Deserialize)]
struct ProfileRow {
    profile: UserProfile,
}

/// [`MarketplaceApi`] over HTTP.
#[derive(Clone)]
pub struct HttpMarketplaceApi {
    client: ApiClient,
}

impl HttpMarketplaceApi {
    pub const fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub const fn client(&self) -> &ApiClient {
        &self.client
    }
}

#[async_trait]
impl MarketplaceApi for HttpMarketplaceApi {
    async fn item(&self, item: &ItemId) -> Result<Item> {
        let row: ItemRow = self
            .client
            .query_first("Item/_getItemById", json!({ "item": item }))
            .await?;
        Ok(row.item)
    }

    async fn items_by_owner(&self, owner: &UserId) -> Result<Vec<Item>> {
        let list: ItemList = self
            .client
            .call(
                "Item/_getItemsByOwner",
                json!({ "owner": owner }),
                TokenPlacement::Header,
            )
            .await?;
        Ok(list.items)
    }

    async fn all_items(&self) -> Result<Vec<Item>> {
        let list: ItemList = self
            .client
            .call("Item/_getAllItems", json!({}), TokenPlacement::Header)
            .await?;
        Ok(list.items)
    }

    async fn create_item(&self, details: &ItemDetails) -> Result<ItemId> {
        let created: CreatedItem = self
            .client
            .call(
                "Item/createItem",
                json!({
                    "title": details.title,
                    "description": details.description,
                    "category": details.category,
                    "condition": details.condition,
                }),
                TokenPlacement::HeaderAndBody,
            )
            .await?;
        Ok(created.item)
    }

    async fn update_item(&self, item: &ItemId, details: &ItemDetails) -> Result<()> {
        self.client
            .execute(
                "Item/updateItemDetails",
                json!({
                    "item": item,
                    "title": details.title,
                    "description": details.description,
                    "category": details.category,
                    "condition": details.condition,
                }),
                TokenPlacement::HeaderAndBody,
            )
            .await
    }

    async fn delete_item(&self, item: &ItemId) -> Result<()> {
        self.client
            .execute(
                "Item/deleteItem",
                json!({ "item": item }),
                TokenPlacement::HeaderAndBody,
            )
            .await
    }

    async fn list_item(
        &self,
        item: &ItemId,
        listing_type: ListingType,
        dorm_visibility: &str,
    ) -> Result<()> {
        self.client
            .execute(
                "ItemListing/listItem",
                json!({
                    "item": item,
                    "type": listing_type,
                    "dormVisibility": dorm_visibility,
                }),
                TokenPlacement::HeaderAndBody,
            )
            .await
    }

    async fn unlist_item(&self, item: &ItemId) -> Result<()> {
        self.client
            .execute(
                "ItemListing/unlistItem",
                json!({ "item": item }),
                TokenPlacement::Header,
            )
            .await
    }

    async fn update_listing_status(&self, item: &ItemId, status: ListingStatus) -> Result<()> {
        self.client
            .execute(
                "ItemListing/updateListingStatus",
                json!({ "item": item, "status": status }),
                TokenPlacement::Header,
            )
            .await
    }

    async fn set_availability(
        &self,
        item: &ItemId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<WindowId> {
        let created: CreatedWindow = self
            .client
            .call(
                "ItemListing/setAvailability",
                json!({ "item": item, "startTime": start, "endTime": end }),
                TokenPlacement::HeaderAndBody,
            )
            .await?;
        Ok(created.window)
    }

    async fn reserve_window(&self, window: &WindowId) -> Result<()> {
        self.client
            .execute(
                "ItemListing/reserveWindow",
                json!({ "window": window }),
                TokenPlacement::Header,
            )
            .await
    }

    async fn remove_availability(&self, window: &WindowId) -> Result<()> {
        self.client
            .execute(
                "ItemListing/removeAvailability",
                json!({ "window": window }),
                TokenPlacement::HeaderAndBody,
            )
            .await
    }

    async fn listings(&self, filter: &ListingFilter) -> Result<Vec<Listing>> {
        self.client
            .query("ItemListing/_getListings", serde_json::to_value(filter)?)
            .await
    }

    async fn listing_by_item(&self, item: &ItemId) -> Result<Listing> {
        self.client
            .query_first("ItemListing/_getListingByItem", json!({ "item": item }))
            .await
    }

    async fn availability_by_item(&self, item: &ItemId) -> Result<Vec<AvailabilityWindow>> {
        self.client
            .query("ItemListing/_getAvailabilityByItem", json!({ "item": item }))
            .await
    }

    async fn photos_by_item(&self, item: &ItemId) -> Result<Vec<ItemPhoto>> {
        self.client
            .query("ItemListing/_getPhotosByItem", json!({ "item": item }))
            .await
    }

    async fn available_item_count(&self) -> Result<u64> {
        let rows: Vec<CountRow> = self
            .client
            .query("ItemListing/_getAvailableItemCount", json!({}))
            .await?;
        Ok(rows.first().map_or(0, |row| row.count))
    }

    async fn create_request(&self, request: &NewRequest) -> Result<RequestId> {
        let created: CreatedRequest = self
            .client
            .call(
                "ItemRequesting/createRequest",
                json!({
                    "item": request.item,
                    "type": request.request_type,
                    "notes": request.notes,
                    "startTime": request.start_time,
                    "endTime": request.end_time,
                }),
                TokenPlacement::HeaderAndBody,
            )
            .await?;
        Ok(created.request)
    }

    async fn accept_request(&self, request: &RequestId) -> Result<()> {
        self.client
            .execute(
                "ItemRequesting/acceptRequest",
                json!({ "request": request }),
                TokenPlacement::HeaderAndBody,
            )
            .await
    }

    async fn reject_request(&self, request: &RequestId) -> Result<()> {
        self.client
            .execute(
                "ItemRequesting/rejectRequest",
                json!({ "request": request }),
                TokenPlacement::HeaderAndBody,
            )
            .await
    }

    async fn cancel_request(&self, request: &RequestId) -> Result<()> {
        self.client
            .execute(
                "ItemRequesting/cancelRequest",
                json!({ "request": request }),
                TokenPlacement::HeaderAndBody,
            )
            .await
    }

    async fn requests_by_item(&self, item: &ItemId) -> Result<Vec<ItemRequest>> {
        self.client
            .query("ItemRequesting/_getRequestsByItem", json!({ "item": item }))
            .await
    }

    async fn requests_by_requester(&self, requester: &UserId) -> Result<Vec<ItemRequest>> {
        self.client
            .query(
                "ItemRequesting/_getRequestsByRequester",
                json!({ "requester": requester }),
            )
            .await
    }

    async fn other_pending_requests(
        &self,
        item: &ItemId,
        exclude: &RequestId,
    ) -> Result<Vec<RequestId>> {
        let rows: Vec<OtherRequestRow> = self
            .client
            .query(
                "ItemRequesting/_getOtherPendingRequests",
                json!({ "item": item, "exclude": exclude }),
            )
            .await?;
        Ok(rows.into_iter().map(|row| row.other_request).collect())
    }

    async fn transactions_by_user(&self, user: &UserId) -> Result<Vec<Transaction>> {
        self.client
            .query("ItemTransaction/_getTransactionsByUser", json!({ "user": user }))
            .await
    }

    async fn transaction(&self, transaction: &TransactionId) -> Result<Transaction> {
        let row: TransactionRow = self
            .client
            .query_first(
                "ItemTransaction/_getTransaction",
                json!({ "transaction": transaction }),
            )
            .await?;
        Ok(row.transaction_doc)
    }

    async fn mark_picked_up(&self, transaction: &TransactionId) -> Result<()> {
        self.transaction_action("ItemTransaction/markPickedUp", transaction)
            .await
    }

    async fn mark_returned(&self, transaction: &TransactionId) -> Result<()> {
        self.transaction_action("ItemTransaction/markReturned", transaction)
            .await
    }

    async fn confirm_return(&self, transaction: &TransactionId) -> Result<()> {
        self.transaction_action("ItemTransaction/confirmReturn", transaction)
            .await
    }

    async fn cancel_transaction(&self, transaction: &TransactionId) -> Result<()> {
        self.transaction_action("ItemTransaction/cancelTransaction", transaction)
            .await
    }

    async fn create_conversation(
        &self,
        participant1: &UserId,
        participant2: &UserId,
        transaction: &TransactionId,
    ) -> Result<ConversationId> {
        let created: CreatedConversation = self
            .client
            .call(
                "Communication/createConversation",
                json!({
                    "participant1": participant1,
                    "participant2": participant2,
                    "transaction": transaction,
                }),
                TokenPlacement::HeaderAndBody,
            )
            .await?;
        Ok(created.conversation)
    }

    async fn send_message(
        &self,
        conversation: &ConversationId,
        content: &str,
    ) -> Result<MessageId> {
        let sent: SentMessage = self
            .client
            .call(
                "Communication/sendMessage",
                json!({ "conversation": conversation, "content": content }),
                TokenPlacement::HeaderAndBody,
            )
            .await?;
        Ok(sent.message)
    }

    async fn mark_conversation_read(&self, conversation: &ConversationId) -> Result<()> {
        self.client
            .execute(
                "Communication/markConversationRead",
                json!({ "conversation": conversation }),
                TokenPlacement::HeaderAndBody,
            )
            .await
    }

    async fn messages(&self, conversation: &ConversationId) -> Result<Vec<BackendMessage>> {
        let rows: Vec<MessageRow> = self
            .client
            .query(
                "Communication/_getMessages",
                json!({ "conversation": conversation }),
            )
            .await?;
        Ok(rows
            .into_iter()
            .next()
            .map(|row| row.messages)
            .unwrap_or_default())
    }

    async fn conversations_by_user(&self, user: &UserId) -> Result<Vec<BackendConversation>> {
        let list: ConversationList = self
            .client
            .call(
                "Communication/_getConversationsByUser",
                json!({ "user": user }),
                TokenPlacement::Header,
            )
            .await?;
        Ok(list.conversations)
    }

    async fn create_profile(&self, display_name: &str, dorm: &str) -> Result<()> {
        self.client
            .execute(
                "UserProfile/createProfile",
                json!({ "displayName": display_name, "dorm": dorm }),
                TokenPlacement::HeaderAndBody,
            )
            .await
    }

    async fn update_profile(&self, update: &ProfileUpdate) -> Result<()> {
        self.client
            .execute(
                "UserProfile/updateProfile",
                serde_json::to_value(update)?,
                TokenPlacement::HeaderAndBody,
            )
            .await
    }

    async fn profile(&self, user: &UserId) -> Result<Option<UserProfile>> {
        let rows: Vec<ProfileRow> = self
            .client
            .query("UserProfile/_getProfile", json!({ "user": user }))
            .await?;
        Ok(rows.into_iter().next().map(|row| row.profile))
    }

    async fn change_password(&self, old_password: &str, new_password: &str) -> Result<()> {
        self.client
            .execute(
                "UserAuthentication/changePassword",
                json!({ "oldPassword": old_password, "newPassword": new_password }),
                TokenPlacement::HeaderAndBody,
            )
            .await
    }

    async fn delete_account(&self, password: &str) -> Result<()> {
        self.client
            .execute(
                "UserAuthentication/deleteAccount",
                json!({ "password": password }),
                TokenPlacement::HeaderAndBody,
            )
            .await
    }
}

impl HttpMarketplaceApi {
    async fn transaction_action(&self, endpoint: &str, transaction: &TransactionId) -> Result<()> {
        self.client
            .execute(
                endpoint,
                json!({ "transaction": transaction }),
                TokenPlacement::Header,
            )
            .await
    }
}
