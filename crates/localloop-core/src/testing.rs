//! Scripted in-memory backend and fixtures for unit tests.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::api::MarketplaceApi;
use crate::error::{Error, Result};
use crate::models::{
    AvailabilityWindow, BackendConversation, BackendMessage, ConversationId, Item, ItemDetails,
    ItemId, ItemPhoto, ItemRequest, Listing, ListingFilter, ListingStatus, ListingType, MessageId,
    NewRequest, ProfileUpdate, RequestId, RequestStatus, RequestType, Transaction, TransactionId,
    TransactionStatus, TransactionType, UserId, UserProfile, WindowId, WindowStatus,
};

#[derive(Default)]
pub struct FakeState {
    pub items: BTreeMap<ItemId, Item>,
    pub listings: Vec<Listing>,
    pub windows: Vec<AvailabilityWindow>,
    pub requests: Vec<ItemRequest>,
    pub transactions: Vec<Transaction>,
    pub conversations: Vec<BackendConversation>,
    pub messages: Vec<BackendMessage>,
    pub profiles: BTreeMap<UserId, UserProfile>,
    /// Author of messages sent through the fake
    pub viewer: Option<UserId>,
    /// Actions that answer with a 500
    pub failing: BTreeSet<&'static str>,
    /// Every action invoked, in order
    pub calls: Vec<&'static str>,
    next_id: u64,
}

impl FakeState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }
}

#[derive(Default)]
pub struct FakeApi {
    state: Mutex<FakeState>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn fail(&self, action: &'static str) {
        self.state().failing.insert(action);
    }

    pub fn recover(&self, action: &'static str) {
        self.state().failing.remove(action);
    }

    pub fn calls(&self, action: &str) -> usize {
        self.state().calls.iter().filter(|call| **call == action).count()
    }

    fn begin(&self, action: &'static str) -> Result<MutexGuard<'_, FakeState>> {
        let mut state = self.state();
        state.calls.push(action);
        if state.failing.contains(action) {
            return Err(Error::Server {
                status: 500,
                message: format!("{action} failed"),
            });
        }
        Ok(state)
    }
}

pub fn at(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap() + Duration::minutes(minutes)
}

pub fn item(id: &str, owner: &str, title: &str) -> Item {
    Item {
        id: ItemId::new(id),
        owner: Some(UserId::new(owner)),
        title: title.to_string(),
        description: String::new(),
        category: "Other".to_string(),
        condition: "Good".to_string(),
        created_at: Some(at(0)),
    }
}

pub fn request(id: &str, requester: &str, item: &str, status: RequestStatus) -> ItemRequest {
    ItemRequest {
        id: RequestId::new(id),
        requester: UserId::new(requester),
        item: ItemId::new(item),
        request_type: RequestType::Borrow,
        status,
        requester_notes: String::new(),
        requested_start_time: None,
        requested_end_time: None,
        created_at: at(0),
    }
}

pub fn transaction(
    id: &str,
    from: &str,
    to: &str,
    item: &str,
    status: TransactionStatus,
) -> Transaction {
    Transaction {
        id: TransactionId::new(id),
        from: UserId::new(from),
        to: UserId::new(to),
        item: ItemId::new(item),
        transaction_type: TransactionType::Borrow,
        status,
        from_notes: String::new(),
        to_notes: String::new(),
        created_at: at(0),
        picked_up_at: None,
        returned_at: None,
    }
}

pub fn conversation(id: &str, p1: &str, p2: &str, transaction: &str) -> BackendConversation {
    BackendConversation {
        id: ConversationId::new(id),
        participant1: UserId::new(p1),
        participant2: UserId::new(p2),
        transaction: TransactionId::new(transaction),
        created_at: Some(at(0)),
        last_message_at: None,
    }
}

pub fn message(id: &str, conversation: &str, author: &str, content: &str, minute: i64) -> BackendMessage {
    BackendMessage {
        id: MessageId::new(id),
        conversation: ConversationId::new(conversation),
        author: UserId::new(author),
        content: content.to_string(),
        created_at: at(minute),
        read_at: None,
    }
}

pub fn profile(user: &str, display_name: &str) -> UserProfile {
    UserProfile {
        user: UserId::new(user),
        display_name: display_name.to_string(),
        dorm: "Baker".to_string(),
        bio: String::new(),
        created_at: None,
        lender_score: 0.0,
        borrower_score: 0.0,
        points: 0,
        avatar_url: None,
    }
}

fn not_found(what: &str, id: &impl std::fmt::Display) -> Error {
    Error::Api {
        status: 404,
        message: format!("{what} {id} not found"),
    }
}

#[async_trait]
impl MarketplaceApi for FakeApi {
    async fn item(&self, item: &ItemId) -> Result<Item> {
        let state = self.begin("item")?;
        state
            .items
            .get(item)
            .cloned()
            .ok_or_else(|| not_found("item", item))
    }

    async fn items_by_owner(&self, owner: &UserId) -> Result<Vec<Item>> {
        let state = self.begin("items_by_owner")?;
        Ok(state
            .items
            .values()
            .filter(|item| item.owner.as_ref() == Some(owner))
            .cloned()
            .collect())
    }

    async fn all_items(&self) -> Result<Vec<Item>> {
        let state = self.begin("all_items")?;
        Ok(state.items.values().cloned().collect())
    }

    async fn create_item(&self, details: &ItemDetails) -> Result<ItemId> {
        let mut state = self.begin("create_item")?;
        let id = ItemId::new(state.next_id("item"));
        state.items.insert(
            id.clone(),
            Item {
                id: id.clone(),
                owner: None,
                title: details.title.clone(),
                description: details.description.clone(),
                category: details.category.clone(),
                condition: details.condition.clone(),
                created_at: Some(at(0)),
            },
        );
        Ok(id)
    }

    async fn update_item(&self, item: &ItemId, details: &ItemDetails) -> Result<()> {
        let mut state = self.begin("update_item")?;
        let entry = state
            .items
            .get_mut(item)
            .ok_or_else(|| not_found("item", item))?;
        entry.title.clone_from(&details.title);
        entry.description.clone_from(&details.description);
        entry.category.clone_from(&details.category);
        entry.condition.clone_from(&details.condition);
        Ok(())
    }

    async fn delete_item(&self, item: &ItemId) -> Result<()> {
        let mut state = self.begin("delete_item")?;
        state
            .items
            .remove(item)
            .map(|_| ())
            .ok_or_else(|| not_found("item", item))
    }

    async fn list_item(
        &self,
        item: &ItemId,
        listing_type: ListingType,
        dorm_visibility: &str,
    ) -> Result<()> {
        let mut state = self.begin("list_item")?;
        let id = state.next_id("listing");
        state.listings.push(Listing {
            id: id.into(),
            item: Some(item.clone()),
            listing_type,
            status: ListingStatus::Available,
            dorm_visibility: dorm_visibility.to_string(),
        });
        Ok(())
    }

    async fn unlist_item(&self, item: &ItemId) -> Result<()> {
        let mut state = self.begin("unlist_item")?;
        state.listings.retain(|listing| listing.item.as_ref() != Some(item));
        Ok(())
    }

    async fn update_listing_status(&self, item: &ItemId, status: ListingStatus) -> Result<()> {
        let mut state = self.begin("update_listing_status")?;
        let listing = state
            .listings
            .iter_mut()
            .find(|listing| listing.item.as_ref() == Some(item))
            .ok_or_else(|| not_found("listing for item", item))?;
        listing.status = status;
        Ok(())
    }

    async fn set_availability(
        &self,
        item: &ItemId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<WindowId> {
        let mut state = self.begin("set_availability")?;
        let id = WindowId::new(state.next_id("window"));
        state.windows.push(AvailabilityWindow {
            id: id.clone(),
            item: item.clone(),
            start_time: start,
            end_time: end,
            status: WindowStatus::Available,
        });
        Ok(id)
    }

    async fn reserve_window(&self, window: &WindowId) -> Result<()> {
        let mut state = self.begin("reserve_window")?;
        let entry = state
            .windows
            .iter_mut()
            .find(|entry| &entry.id == window)
            .ok_or_else(|| not_found("window", window))?;
        if entry.is_reserved() {
            return Err(Error::Api {
                status: 400,
                message: "Window is already reserved".to_string(),
            });
        }
        entry.status = WindowStatus::Reserved;
        Ok(())
    }

    async fn remove_availability(&self, window: &WindowId) -> Result<()> {
        let mut state = self.begin("remove_availability")?;
        state.windows.retain(|entry| &entry.id != window);
        Ok(())
    }

    async fn listings(&self, filter: &ListingFilter) -> Result<Vec<Listing>> {
        let state = self.begin("listings")?;
        Ok(state
            .listings
            .iter()
            .filter(|listing| filter.status.map_or(true, |status| listing.status == status))
            .filter(|listing| {
                filter
                    .listing_type
                    .map_or(true, |kind| listing.listing_type == kind)
            })
            .filter(|listing| {
                filter
                    .dorm_visibility
                    .as_ref()
                    .map_or(true, |dorm| &listing.dorm_visibility == dorm)
            })
            .cloned()
            .collect())
    }

    async fn listing_by_item(&self, item: &ItemId) -> Result<Listing> {
        let state = self.begin("listing_by_item")?;
        state
            .listings
            .iter()
            .find(|listing| listing.item.as_ref() == Some(item))
            .cloned()
            .ok_or_else(|| Error::NotFound("ItemListing/_getListingByItem".to_string()))
    }

    async fn availability_by_item(&self, item: &ItemId) -> Result<Vec<AvailabilityWindow>> {
        let state = self.begin("availability_by_item")?;
        Ok(state
            .windows
            .iter()
            .filter(|window| &window.item == item)
            .cloned()
            .collect())
    }

    async fn photos_by_item(&self, _item: &ItemId) -> Result<Vec<ItemPhoto>> {
        self.begin("photos_by_item")?;
        Ok(Vec::new())
    }

    async fn available_item_count(&self) -> Result<u64> {
        let state = self.begin("available_item_count")?;
        Ok(state
            .listings
            .iter()
            .filter(|listing| listing.status == ListingStatus::Available)
            .count() as u64)
    }

    async fn create_request(&self, request: &NewRequest) -> Result<RequestId> {
        let mut state = self.begin("create_request")?;
        let id = RequestId::new(state.next_id("request"));
        state.requests.push(request.clone().into_pending(id.clone()));
        Ok(id)
    }

    async fn accept_request(&self, request: &RequestId) -> Result<()> {
        self.set_request_status("accept_request", request, RequestStatus::Accepted)
    }

    async fn reject_request(&self, request: &RequestId) -> Result<()> {
        self.set_request_status("reject_request", request, RequestStatus::Rejected)
    }

    async fn cancel_request(&self, request: &RequestId) -> Result<()> {
        self.set_request_status("cancel_request", request, RequestStatus::Cancelled)
    }

    async fn requests_by_item(&self, item: &ItemId) -> Result<Vec<ItemRequest>> {
        let state = self.begin("requests_by_item")?;
        Ok(state
            .requests
            .iter()
            .filter(|request| &request.item == item)
            .cloned()
            .collect())
    }

    async fn requests_by_requester(&self, requester: &UserId) -> Result<Vec<ItemRequest>> {
        let state = self.begin("requests_by_requester")?;
        Ok(state
            .requests
            .iter()
            .filter(|request| &request.requester == requester)
            .cloned()
            .collect())
    }

    async fn other_pending_requests(
        &self,
        item: &ItemId,
        exclude: &RequestId,
    ) -> Result<Vec<RequestId>> {
        let state = self.begin("other_pending_requests")?;
        Ok(state
            .requests
            .iter()
            .filter(|request| {
                &request.item == item
                    && &request.id != exclude
                    && request.status == RequestStatus::Pending
            })
            .map(|request| request.id.clone())
            .collect())
    }

    async fn transactions_by_user(&self, user: &UserId) -> Result<Vec<Transaction>> {
        let state = self.begin("transactions_by_user")?;
        Ok(state
            .transactions
            .iter()
            .filter(|tx| &tx.from == user || &tx.to == user)
            .cloned()
            .collect())
    }

    async fn transaction(&self, transaction: &TransactionId) -> Result<Transaction> {
        let state = self.begin("transaction")?;
        state
            .transactions
            .iter()
            .find(|tx| &tx.id == transaction)
            .cloned()
            .ok_or_else(|| not_found("transaction", transaction))
    }

    async fn mark_picked_up(&self, transaction: &TransactionId) -> Result<()> {
        self.update_transaction("mark_picked_up", transaction, |tx| {
            tx.status = tx.status_after_pickup();
        })
    }

    async fn mark_returned(&self, transaction: &TransactionId) -> Result<()> {
        self.update_transaction("mark_returned", transaction, |tx| {
            tx.status = TransactionStatus::PendingReturn;
        })
    }

    async fn confirm_return(&self, transaction: &TransactionId) -> Result<()> {
        self.update_transaction("confirm_return", transaction, |tx| {
            tx.status = TransactionStatus::Completed;
        })
    }

    async fn cancel_transaction(&self, transaction: &TransactionId) -> Result<()> {
        self.update_transaction("cancel_transaction", transaction, |tx| {
            tx.status = TransactionStatus::Cancelled;
        })
    }

    async fn create_conversation(
        &self,
        participant1: &UserId,
        participant2: &UserId,
        transaction: &TransactionId,
    ) -> Result<ConversationId> {
        let mut state = self.begin("create_conversation")?;
        let id = state.next_id("conversation");
        let created = conversation(
            &id,
            participant1.as_str(),
            participant2.as_str(),
            transaction.as_str(),
        );
        state.conversations.push(created);
        Ok(ConversationId::new(id))
    }

    async fn send_message(
        &self,
        conversation: &ConversationId,
        content: &str,
    ) -> Result<MessageId> {
        let mut state = self.begin("send_message")?;
        let id = state.next_id("message");
        let participant = state
            .conversations
            .iter()
            .find(|entry| &entry.id == conversation)
            .map(|entry| entry.participant1.clone())
            .ok_or_else(|| not_found("conversation", conversation))?;
        let author = state.viewer.clone().unwrap_or(participant);
        state.messages.push(BackendMessage {
            id: MessageId::new(id.clone()),
            conversation: conversation.clone(),
            author,
            content: content.to_string(),
            created_at: Utc::now(),
            read_at: None,
        });
        Ok(MessageId::new(id))
    }

    async fn mark_conversation_read(&self, conversation: &ConversationId) -> Result<()> {
        let mut state = self.begin("mark_conversation_read")?;
        for message in state
            .messages
            .iter_mut()
            .filter(|message| &message.conversation == conversation)
        {
            message.read_at.get_or_insert_with(Utc::now);
        }
        Ok(())
    }

    async fn messages(&self, conversation: &ConversationId) -> Result<Vec<BackendMessage>> {
        let state = self.begin("messages")?;
        Ok(state
            .messages
            .iter()
            .filter(|message| &message.conversation == conversation)
            .cloned()
            .collect())
    }

    async fn conversations_by_user(&self, user: &UserId) -> Result<Vec<BackendConversation>> {
        let state = self.begin("conversations_by_user")?;
        Ok(state
            .conversations
            .iter()
            .filter(|entry| entry.counterpart(user).is_some())
            .cloned()
            .collect())
    }

    async fn create_profile(&self, display_name: &str, dorm: &str) -> Result<()> {
        let mut state = self.begin("create_profile")?;
        let mut created = profile("me", display_name);
        created.dorm = dorm.to_string();
        state.profiles.insert(created.user.clone(), created);
        Ok(())
    }

    async fn update_profile(&self, update: &ProfileUpdate) -> Result<()> {
        let mut state = self.begin("update_profile")?;
        let entry = state
            .profiles
            .get_mut(&UserId::new("me"))
            .ok_or_else(|| not_found("profile", &"me"))?;
        entry.display_name.clone_from(&update.display_name);
        entry.dorm.clone_from(&update.dorm);
        entry.bio.clone_from(&update.bio);
        Ok(())
    }

    async fn profile(&self, user: &UserId) -> Result<Option<UserProfile>> {
        let state = self.begin("profile")?;
        Ok(state.profiles.get(user).cloned())
    }

    async fn change_password(&self, _old_password: &str, _new_password: &str) -> Result<()> {
        self.begin("change_password").map(|_| ())
    }

    async fn delete_account(&self, _password: &str) -> Result<()> {
        self.begin("delete_account").map(|_| ())
    }
}

impl FakeApi {
    fn set_request_status(
        &self,
        action: &'static str,
        request: &RequestId,
        status: RequestStatus,
    ) -> Result<()> {
        let mut state = self.begin(action)?;
        let entry = state
            .requests
            .iter_mut()
            .find(|entry| &entry.id == request)
            .ok_or_else(|| not_found("request", request))?;
        entry.status = status;
        Ok(())
    }

    fn update_transaction(
        &self,
        action: &'static str,
        transaction: &TransactionId,
        change: impl FnOnce(&mut Transaction),
    ) -> Result<()> {
        let mut state = self.begin(action)?;
        let entry = state
            .transactions
            .iter_mut()
            .find(|entry| &entry.id == transaction)
            .ok_or_else(|| not_found("transaction", transaction))?;
        change(entry);
        Ok(())
    }
}
