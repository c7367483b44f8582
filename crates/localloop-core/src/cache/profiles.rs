//! User profile cache

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::{read, write};
use crate::api::MarketplaceApi;
use crate::error::Result;
use crate::models::{Actor, ProfileUpdate, UserId, UserProfile};

pub struct ProfileCache {
    api: Arc<dyn MarketplaceApi>,
    profiles: RwLock<HashMap<UserId, UserProfile>>,
}

impl ProfileCache {
    pub fn new(api: Arc<dyn MarketplaceApi>) -> Self {
        Self {
            api,
            profiles: RwLock::new(HashMap::new()),
        }
    }

    pub fn cached(&self, user: &UserId) -> Option<UserProfile> {
        read(&self.profiles).get(user).cloned()
    }

    /// Cached profile, fetched on first use. Users without a profile yield `None`.
    pub async fn profile(&self, user: &UserId) -> Result<Option<UserProfile>> {
        if let Some(profile) = self.cached(user) {
            return Ok(Some(profile));
        }
        self.refresh(user).await
    }

    pub async fn refresh(&self, user: &UserId) -> Result<Option<UserProfile>> {
        let profile = self.api.profile(user).await?;
        if let Some(profile) = &profile {
            write(&self.profiles).insert(user.clone(), profile.clone());
        }
        Ok(profile)
    }

    pub async fn create_profile(&self, user: &UserId, display_name: &str, dorm: &str) -> Result<()> {
        self.api.create_profile(display_name, dorm).await?;
        tracing::info!(user_id = %user, "Profile created");
        self.invalidate(user);
        Ok(())
    }

    pub async fn update_profile(&self, user: &UserId, update: &ProfileUpdate) -> Result<()> {
        self.api.update_profile(update).await?;
        if let Some(profile) = write(&self.profiles).get_mut(user) {
            profile.display_name.clone_from(&update.display_name);
            profile.dorm.clone_from(&update.dorm);
            profile.bio.clone_from(&update.bio);
        }
        Ok(())
    }

    /// Presentation identity for `user`; lookup failures degrade to a placeholder.
    pub async fn actor(&self, user: &UserId) -> Actor {
        match self.profile(user).await {
            Ok(Some(profile)) => Actor::from(&profile),
            Ok(None) => Actor::unknown(user.clone()),
            Err(error) => {
                tracing::debug!(user_id = %user, "Profile lookup failed: {}", error);
                Actor::unknown(user.clone())
            }
        }
    }

    pub async fn display_name(&self, user: &UserId) -> String {
        self.actor(user).await.display_name
    }

    pub fn invalidate(&self, user: &UserId) {
        write(&self.profiles).remove(user);
    }
}
