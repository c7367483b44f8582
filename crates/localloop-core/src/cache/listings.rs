//! Listings and pickup availability.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};

use super::{read, write, LastError};
use crate::api::MarketplaceApi;
use crate::error::{Error, Result};
use crate::models::{
    AvailabilityWindow, ItemId, ItemPhoto, Listing, ListingFilter, ListingStatus, ListingType,
    WindowId, WindowStatus,
};

pub struct ListingCache {
    api: Arc<dyn MarketplaceApi>,
    listings: RwLock<HashMap<ItemId, Listing>>,
    windows: RwLock<HashMap<ItemId, Vec<AvailabilityWindow>>>,
    /// Windows with a reservation call in flight
    reserving: Mutex<HashSet<WindowId>>,
    last_error: LastError,
}

impl ListingCache {
    pub fn new(api: Arc<dyn MarketplaceApi>) -> Self {
        Self {
            api,
            listings: RwLock::new(HashMap::new()),
            windows: RwLock::new(HashMap::new()),
            reserving: Mutex::new(HashSet::new()),
            last_error: LastError::default(),
        }
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.get()
    }

    pub fn cached(&self, item: &ItemId) -> Option<Listing> {
        read(&self.listings).get(item).cloned()
    }

    /// Listings matching `filter`; a failed fetch yields an empty list.
    pub async fn fetch_listings(&self, filter: &ListingFilter) -> Vec<Listing> {
        self.last_error.clear();
        match self.api.listings(filter).await {
            Ok(listings) => {
                let mut cache = write(&self.listings);
                for listing in &listings {
                    if let Some(item) = &listing.item {
                        cache.insert(item.clone(), listing.clone());
                    }
                }
                listings
            }
            Err(error) => {
                self.last_error.record("Failed to fetch listings", &error);
                Vec::new()
            }
        }
    }

    /// The listing for `item`, or `None` when it is not listed.
    pub async fn listing_for_item(&self, item: &ItemId) -> Result<Option<Listing>> {
        match self.api.listing_by_item(item).await {
            Ok(listing) => {
                write(&self.listings).insert(item.clone(), listing.clone());
                Ok(Some(listing))
            }
            Err(Error::NotFound(_)) => {
                write(&self.listings).remove(item);
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }

    pub async fn list_item(
        &self,
        item: &ItemId,
        listing_type: ListingType,
        dorm_visibility: &str,
    ) -> Result<()> {
        let dorm = dorm_visibility.trim();
        if dorm.is_empty() {
            return Err(Error::InvalidInput(
                "Dorm visibility must not be empty".to_string(),
            ));
        }
        self.api.list_item(item, listing_type, dorm).await?;
        tracing::info!(item_id = %item, ?listing_type, "Item listed");
        if let Err(error) = self.listing_for_item(item).await {
            tracing::warn!(item_id = %item, "Listed item could not be reloaded: {}", error);
        }
        Ok(())
    }

    pub async fn unlist_item(&self, item: &ItemId) -> Result<()> {
        self.api.unlist_item(item).await?;
        write(&self.listings).remove(item);
        tracing::info!(item_id = %item, "Item unlisted");
        Ok(())
    }

    pub async fn update_listing_status(&self, item: &ItemId, status: ListingStatus) -> Result<()> {
        self.api.update_listing_status(item, status).await?;
        if let Some(listing) = write(&self.listings).get_mut(item) {
            listing.status = status;
        }
        Ok(())
    }

    /// Availability windows for `item`, earliest first.
    pub async fn availability(&self, item: &ItemId) -> Result<Vec<AvailabilityWindow>> {
        let mut windows = self.api.availability_by_item(item).await?;
        windows.sort_by_key(|window| window.start_time);
        write(&self.windows).insert(item.clone(), windows.clone());
        Ok(windows)
    }

    pub async fn set_availability(
        &self,
        item: &ItemId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<WindowId> {
        if end <= start {
            return Err(Error::InvalidInput(
                "Availability window must end after it starts".to_string(),
            ));
        }
        let id = self.api.set_availability(item, start, end).await?;
        let mut windows = write(&self.windows);
        let entry = windows.entry(item.clone()).or_default();
        entry.push(AvailabilityWindow {
            id: id.clone(),
            item: item.clone(),
            start_time: start,
            end_time: end,
            status: WindowStatus::Available,
        });
        entry.sort_by_key(|window| window.start_time);
        Ok(id)
    }

    /// Reserve a pickup window. A window is reserved at most once: a known
    /// reservation or a concurrent attempt is refused before the backend.
    pub async fn reserve_window(&self, window: &WindowId) -> Result<()> {
        if self
            .cached_window(window)
            .is_some_and(|cached| cached.is_reserved())
        {
            return Err(already_reserved(window));
        }
        let _guard = ReservationGuard::acquire(&self.reserving, window)?;

        self.api.reserve_window(window).await?;
        self.update_window(window, |cached| cached.status = WindowStatus::Reserved);
        tracing::info!(window_id = %window, "Window reserved");
        Ok(())
    }

    pub async fn remove_availability(&self, window: &WindowId) -> Result<()> {
        self.api.remove_availability(window).await?;
        for windows in write(&self.windows).values_mut() {
            windows.retain(|cached| &cached.id != window);
        }
        Ok(())
    }

    /// Photos for `item`, in display order.
    pub async fn photos(&self, item: &ItemId) -> Result<Vec<ItemPhoto>> {
        let mut photos = self.api.photos_by_item(item).await?;
        photos.sort_by_key(|photo| photo.order);
        Ok(photos)
    }

    pub async fn available_count(&self) -> Result<u64> {
        self.api.available_item_count().await
    }

    pub fn clear(&self) {
        write(&self.listings).clear();
        write(&self.windows).clear();
    }

    fn cached_window(&self, id: &WindowId) -> Option<AvailabilityWindow> {
        read(&self.windows)
            .values()
            .flatten()
            .find(|window| &window.id == id)
            .cloned()
    }

    fn update_window(&self, id: &WindowId, change: impl FnOnce(&mut AvailabilityWindow)) {
        if let Some(window) = write(&self.windows)
            .values_mut()
            .flatten()
            .find(|window| &window.id == id)
        {
            change(window);
        }
    }
}

fn already_reserved(window: &WindowId) -> Error {
    Error::InvalidInput(format!("Window {window} is already reserved"))
}

/// Marks a window as being reserved until dropped.
struct ReservationGuard<'a> {
    set: &'a Mutex<HashSet<WindowId>>,
    window: WindowId,
}

impl<'a> ReservationGuard<'a> {
    fn acquire(set: &'a Mutex<HashSet<WindowId>>, window: &WindowId) -> Result<Self> {
        let mut in_flight = set.lock().unwrap_or_else(PoisonError::into_inner);
        if !in_flight.insert(window.clone()) {
            return Err(already_reserved(window));
        }
        Ok(Self {
            set,
            window: window.clone(),
        })
    }
}

impl Drop for ReservationGuard<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.window);
    }
}
