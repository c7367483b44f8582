//! Incoming and outgoing item requests.
//!
//! State changes initiated here are backend-first: the local copy only
//! moves after the backend accepted the action. Push updates are merged
//! into whichever list already tracks the request; untracked requests are
//! never materialised from a push.

use std::sync::{Arc, RwLock};

use super::{read, write, ItemCache, LastError, NotificationFeed};
use crate::api::MarketplaceApi;
use crate::auth::SessionManager;
use crate::error::Result;
use crate::models::{
    Item, ItemId, ItemRequest, NewRequest, RequestId, RequestStatus, RequestWithItem, UserId,
};
use crate::pending::Tracked;

#[derive(Debug, Default)]
struct RequestLists {
    incoming: Vec<Tracked<RequestWithItem>>,
    outgoing: Vec<Tracked<RequestWithItem>>,
}

pub struct RequestCache {
    api: Arc<dyn MarketplaceApi>,
    session: Arc<SessionManager>,
    items: Arc<ItemCache>,
    notifications: Arc<NotificationFeed>,
    lists: RwLock<RequestLists>,
    last_error: LastError,
}

impl RequestCache {
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
            lists: RwLock::new(RequestLists::default()),
            last_error: LastError::default(),
        }
    }

    /// Requests for the viewer's items, newest first.
    pub fn incoming(&self) -> Vec<Tracked<RequestWithItem>> {
        read(&self.lists).incoming.clone()
    }

    /// Requests the viewer made, newest first.
    pub fn outgoing(&self) -> Vec<Tracked<RequestWithItem>> {
        read(&self.lists).outgoing.clone()
    }

    pub fn find(&self, id: &RequestId) -> Option<Tracked<RequestWithItem>> {
        let lists = read(&self.lists);
        lists
            .incoming
            .iter()
            .chain(lists.outgoing.iter())
            .find(|entry| &entry.request.id == id)
            .cloned()
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.get()
    }

    /// Reload requests for every item `owner` owns.
    ///
    /// Per-item failures are skipped; a failed item listing leaves an empty
    /// list and a recorded error.
    pub async fn fetch_incoming(&self, owner: &UserId) -> Vec<Tracked<RequestWithItem>> {
        self.last_error.clear();
        let items = match self.items.items_by_owner(owner).await {
            Ok(items) => items,
            Err(error) => {
                self.last_error
                    .record("Failed to fetch incoming requests", &error);
                write(&self.lists).incoming.clear();
                return Vec::new();
            }
        };

        let mut incoming = Vec::new();
        for item in items {
            match self.api.requests_by_item(&item.id).await {
                Ok(requests) => incoming.extend(requests.into_iter().map(|request| {
                    Tracked::confirmed(RequestWithItem {
                        request,
                        item_details: Some(item.clone()),
                    })
                })),
                Err(error) => {
                    tracing::warn!(item_id = %item.id, "Failed to fetch requests for item: {}", error);
                }
            }
        }
        sort_newest_first(&mut incoming);
        write(&self.lists).incoming.clone_from(&incoming);
        incoming
    }

    pub async fn fetch_outgoing(&self, requester: &UserId) -> Vec<Tracked<RequestWithItem>> {
        self.last_error.clear();
        let requests = match self.api.requests_by_requester(requester).await {
            Ok(requests) => requests,
            Err(error) => {
                self.last_error
                    .record("Failed to fetch outgoing requests", &error);
                write(&self.lists).outgoing.clear();
                return Vec::new();
            }
        };

        let mut outgoing = Vec::with_capacity(requests.len());
        for request in requests {
            let item_details = self.items.item_or_none(&request.item).await;
            outgoing.push(Tracked::confirmed(RequestWithItem {
                request,
                item_details,
            }));
        }
        sort_newest_first(&mut outgoing);
        write(&self.lists).outgoing.clone_from(&outgoing);
        outgoing
    }

    /// Create a request and track it as pending until the push stream echoes it.
    pub async fn create_request(&self, new_request: NewRequest) -> Result<RequestId> {
        let id = match self.api.create_request(&new_request).await {
            Ok(id) => id,
            Err(error) => {
                self.last_error.record("Failed to create request", &error);
                return Err(error);
            }
        };
        tracing::info!(request_id = %id, item_id = %new_request.item, "Request created");

        let item_details = self.items.item_or_none(&new_request.item).await;
        let entry = Tracked::optimistic(RequestWithItem {
            request: new_request.into_pending(id.clone()),
            item_details,
        });
        let mut lists = write(&self.lists);
        if !lists.outgoing.iter().any(|existing| existing.request.id == id) {
            lists.outgoing.insert(0, entry);
        }
        Ok(id)
    }

    pub async fn accept_request(&self, id: &RequestId) -> Result<()> {
        if let Err(error) = self.api.accept_request(id).await {
            self.last_error.record("Failed to accept request", &error);
            return Err(error);
        }
        set_status(&mut write(&self.lists).incoming, id, RequestStatus::Accepted);
        Ok(())
    }

    pub async fn reject_request(&self, id: &RequestId) -> Result<()> {
        if let Err(error) = self.api.reject_request(id).await {
            self.last_error.record("Failed to reject request", &error);
            return Err(error);
        }
        set_status(&mut write(&self.lists).incoming, id, RequestStatus::Rejected);
        Ok(())
    }

    pub async fn cancel_request(&self, id: &RequestId) -> Result<()> {
        if let Err(error) = self.api.cancel_request(id).await {
            self.last_error.record("Failed to cancel request", &error);
            return Err(error);
        }
        set_status(&mut write(&self.lists).outgoing, id, RequestStatus::Cancelled);
        Ok(())
    }

    /// Other pending requests for `item`, excluding `exclude`.
    pub async fn other_pending_requests(
        &self,
        item: &ItemId,
        exclude: &RequestId,
    ) -> Result<Vec<RequestId>> {
        self.api.other_pending_requests(item, exclude).await
    }

    /// Merge a pushed request into the lists that already track it.
    pub async fn handle_request_update(&self, update: ItemRequest) {
        let (tracked_incoming, tracked_outgoing) = {
            let mut lists = write(&self.lists);
            (
                merge_update(&mut lists.incoming, &update),
                merge_update(&mut lists.outgoing, &update),
            )
        };
        tracing::debug!(
            request_id = %update.id,
            status = ?update.status,
            incoming = tracked_incoming.is_some(),
            outgoing = tracked_outgoing.is_some(),
            "Request update"
        );

        if update.status != RequestStatus::Accepted {
            return;
        }
        match (tracked_incoming, tracked_outgoing) {
            (_, Some(item_details)) => {
                self.notifications
                    .show_request_accepted(&update, item_details.as_ref())
                    .await;
            }
            (None, None) if self.is_viewer(&update.requester) => {
                let item_details = self.items.item_or_none(&update.item).await;
                self.notifications
                    .show_request_accepted(&update, item_details.as_ref())
                    .await;
            }
            _ => {}
        }
    }

    fn is_viewer(&self, user: &UserId) -> bool {
        self.session
            .current_user_id()
            .map_or(true, |viewer| &viewer == user)
    }

    pub fn clear(&self) {
        *write(&self.lists) = RequestLists::default();
        self.last_error.clear();
    }
}

/// Replace a tracked request with the pushed copy, keeping item details.
///
/// Returns the preserved item details when the request was tracked.
fn merge_update(
    list: &mut [Tracked<RequestWithItem>],
    update: &ItemRequest,
) -> Option<Option<Item>> {
    let entry = list
        .iter_mut()
        .find(|entry| entry.request.id == update.id)?;
    let item_details = entry.item_details.clone();
    entry.accept_remote(RequestWithItem {
        request: update.clone(),
        item_details: item_details.clone(),
    });
    Some(item_details)
}

fn set_status(list: &mut [Tracked<RequestWithItem>], id: &RequestId, status: RequestStatus) {
    if let Some(entry) = list.iter_mut().find(|entry| &entry.request.id == id) {
        let mut value = entry.value().clone();
        value.request.status = status;
        entry.confirm_with(value);
    }
}

fn sort_newest_first(list: &mut [Tracked<RequestWithItem>]) {
    list.sort_by(|a, b| b.request.created_at.cmp(&a.request.created_at));
}
