//! Application context.
//!
//! Builds every component once, in dependency order, and hands out shared
//! handles. Nothing in the crate is reachable through globals.

use std::sync::Arc;

use crate::api::{ApiClient, HttpMarketplaceApi, MarketplaceApi};
use crate::auth::{AuthTransport, HttpAuthTransport, Session, SessionManager};
use crate::cache::{
    ItemCache, ListingCache, MessageCache, NotificationFeed, ProfileCache, RequestCache,
    TransactionCache,
};
use crate::config::ClientConfig;
use crate::error::Result;
use crate::events::{EventDispatcher, HttpPushTransport, NotificationRouter, PushTransport};
use crate::storage::KeyValueStore;

pub struct AppContext {
    pub config: ClientConfig,
    pub session: Arc<SessionManager>,
    pub api: Arc<dyn MarketplaceApi>,
    pub items: Arc<ItemCache>,
    pub profiles: Arc<ProfileCache>,
    pub listings: Arc<ListingCache>,
    pub notifications: Arc<NotificationFeed>,
    pub requests: Arc<RequestCache>,
    pub transactions: Arc<TransactionCache>,
    pub messages: Arc<MessageCache>,
    pub router: Arc<NotificationRouter>,
}

impl AppContext {
    /// Wire the HTTP backends.
    ///
    /// `session_store` keeps tokens; `cache_store` keeps conversations and
    /// the notification feed.
    pub fn new(
        config: ClientConfig,
        session_store: Arc<dyn KeyValueStore>,
        cache_store: Arc<dyn KeyValueStore>,
    ) -> Result<Self> {
        let auth = Arc::new(HttpAuthTransport::new(config.clone())?);
        let push = Arc::new(HttpPushTransport::new(&config)?);
        let api_config = config.clone();
        Self::with_backends(config, session_store, cache_store, auth, push, move |session| {
            let client = ApiClient::new(api_config, session)?;
            let api: Arc<dyn MarketplaceApi> = Arc::new(HttpMarketplaceApi::new(client));
            Ok(api)
        })
    }

    /// Wire the context around caller-supplied backends.
    ///
    /// `api` receives the session manager so that an HTTP client can
    /// refresh tokens through it.
    pub fn with_backends<F>(
        config: ClientConfig,
        session_store: Arc<dyn KeyValueStore>,
        cache_store: Arc<dyn KeyValueStore>,
        auth: Arc<dyn AuthTransport>,
        push: Arc<dyn PushTransport>,
        api: F,
    ) -> Result<Self>
    where
        F: FnOnce(Arc<SessionManager>) -> Result<Arc<dyn MarketplaceApi>>,
    {
        let session = Arc::new(SessionManager::new(
            auth,
            session_store,
            config.token_expiry_margin_secs,
        ));
        let api = api(session.clone())?;

        let items = Arc::new(ItemCache::new(api.clone()));
        let profiles = Arc::new(ProfileCache::new(api.clone()));
        let listings = Arc::new(ListingCache::new(api.clone()));
        let notifications = Arc::new(NotificationFeed::new(cache_store.clone(), profiles.clone()));
        let requests = Arc::new(RequestCache::new(
            api.clone(),
            session.clone(),
            items.clone(),
            notifications.clone(),
        ));
        let transactions = Arc::new(TransactionCache::new(
            api.clone(),
            session.clone(),
            items.clone(),
            notifications.clone(),
        ));
        let messages = Arc::new(MessageCache::new(
            api.clone(),
            session.clone(),
            transactions.clone(),
            items.clone(),
            notifications.clone(),
            cache_store,
        ));
        let dispatcher = Arc::new(EventDispatcher::new(
            requests.clone(),
            transactions.clone(),
            messages.clone(),
            notifications.clone(),
        ));
        let router = Arc::new(NotificationRouter::new(
            &config,
            push,
            session.clone(),
            dispatcher,
        ));

        Ok(Self {
            config,
            session,
            api,
            items,
            profiles,
            listings,
            notifications,
            requests,
            transactions,
            messages,
            router,
        })
    }

    /// Restore the persisted session, if any.
    pub fn initialize(&self) -> Result<Option<Session>> {
        self.session.initialize()
    }

    /// Sign out and drop per-user cache state. Conversations and the
    /// notification feed stay on disk.
    pub async fn sign_out(&self) {
        self.session.logout().await;
        self.requests.clear();
        self.transactions.clear();
        self.listings.clear();
    }

    /// Probe the backend; any HTTP answer counts as reachable.
    pub async fn check_backend(&self) -> Result<u16> {
        ApiClient::new(self.config.clone(), self.session.clone())?
            .check_backend()
            .await
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::auth::testing::{tokens_for, FakeAuthTransport};
    use crate::models::{ItemId, RequestStatus, UserId};
    use crate::storage::MemoryStore;
    use crate::testing::{item, request, FakeApi};

    struct NoPush;

    #[async_trait::async_trait]
    impl PushTransport for NoPush {
        async fn connect(&self, _access_token: &str) -> Result<crate::events::FrameStream> {
            Err(crate::Error::Network("offline".to_string()))
        }
    }

    #[tokio::test]
    async fn components_share_one_session_and_backend() {
        let auth = Arc::new(FakeAuthTransport::default());
        auth.push_login(Ok(tokens_for("me", 3_600)));
        let fake = Arc::new(FakeApi::new());
        fake.state()
            .items
            .insert(ItemId::new("i1"), item("i1", "owner", "Lamp"));
        fake.state()
            .requests
            .push(request("r1", "me", "i1", RequestStatus::Pending));
        let api = fake.clone();

        let context = AppContext::with_backends(
            ClientConfig::new("http://localhost:8000").unwrap(),
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryStore::new()),
            auth,
            Arc::new(NoPush),
            move |_| Ok(api as Arc<dyn MarketplaceApi>),
        )
        .unwrap();

        assert_eq!(context.initialize().unwrap(), None);
        context.session.login("me", "password").await.unwrap();
        let me = context.session.current_user_id().unwrap();
        assert_eq!(me, UserId::new("me"));

        context.requests.fetch_outgoing(&me).await;
        assert_eq!(context.requests.outgoing().len(), 1);
        // The request cache filled the shared item cache.
        assert!(context.items.cached(&ItemId::new("i1")).is_some());

        context.sign_out().await;
        assert!(!context.session.is_authenticated());
        assert!(context.requests.outgoing().is_empty());
    }
}
