//! Item detail cache

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::{read, write};
use crate::api::MarketplaceApi;
use crate::error::{Error, Result};
use crate::models::{Item, ItemDetails, ItemId, UserId};
use crate::util::non_blank;

pub struct ItemCache {
    api: Arc<dyn MarketplaceApi>,
    items: RwLock<HashMap<ItemId, Item>>,
}

impl ItemCache {
    pub fn new(api: Arc<dyn MarketplaceApi>) -> Self {
        Self {
            api,
            items: RwLock::new(HashMap::new()),
        }
    }

    pub fn cached(&self, id: &ItemId) -> Option<Item> {
        read(&self.items).get(id).cloned()
    }

    /// Item details, served from cache when possible.
    pub async fn item(&self, id: &ItemId) -> Result<Item> {
        if let Some(item) = self.cached(id) {
            return Ok(item);
        }
        let item = self.api.item(id).await?;
        self.remember(item.clone());
        Ok(item)
    }

    /// Like [`Self::item`], but a failed lookup only logs.
    pub async fn item_or_none(&self, id: &ItemId) -> Option<Item> {
        match self.item(id).await {
            Ok(item) => Some(item),
            Err(error) => {
                tracing::warn!(item_id = %id, "Failed to fetch item details: {}", error);
                None
            }
        }
    }

    pub async fn items_by_owner(&self, owner: &UserId) -> Result<Vec<Item>> {
        let items = self.api.items_by_owner(owner).await?;
        self.remember_all(&items);
        Ok(items)
    }

    pub async fn all_items(&self) -> Result<Vec<Item>> {
        let items = self.api.all_items().await?;
        self.remember_all(&items);
        Ok(items)
    }

    pub async fn create_item(&self, owner: &UserId, details: ItemDetails) -> Result<ItemId> {
        let details = validate_details(details)?;
        let id = self.api.create_item(&details).await?;
        tracing::info!(item_id = %id, "Item created");
        self.remember(Item {
            id: id.clone(),
            owner: Some(owner.clone()),
            title: details.title,
            description: details.description,
            category: details.category,
            condition: details.condition,
            created_at: Some(chrono::Utc::now()),
        });
        Ok(id)
    }

    pub async fn update_item(&self, id: &ItemId, details: ItemDetails) -> Result<()> {
        let details = validate_details(details)?;
        self.api.update_item(id, &details).await?;
        if let Some(item) = write(&self.items).get_mut(id) {
            item.title = details.title;
            item.description = details.description;
            item.category = details.category;
            item.condition = details.condition;
        }
        Ok(())
    }

    pub async fn delete_item(&self, id: &ItemId) -> Result<()> {
        self.api.delete_item(id).await?;
        write(&self.items).remove(id);
        Ok(())
    }

    fn remember(&self, item: Item) {
        write(&self.items).insert(item.id.clone(), item);
    }

    fn remember_all(&self, items: &[Item]) {
        let mut cache = write(&self.items);
        for item in items {
            cache.insert(item.id.clone(), item.clone());
        }
    }
}

fn validate_details(details: ItemDetails) -> Result<ItemDetails> {
    let title = non_blank(&details.title)
        .ok_or_else(|| Error::InvalidInput("Item title must not be empty".to_string()))?;
    Ok(ItemDetails {
        title,
        description: details.description.trim().to_string(),
        category: details.category.trim().to_string(),
        condition: details.condition.trim().to_string(),
    })
}
