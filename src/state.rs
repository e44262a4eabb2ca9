use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::accounts::{AccountService, DynIdentityProvider, SessionStore};
use crate::config::Config;
use crate::feed::{
    DocumentNotificationSink, DocumentPostRepository, DynNotificationSink, DynPostRepository,
    LikeRegistry,
};
use crate::retry::RetryPolicy;
use crate::store::DynDocumentStore;

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: DynDocumentStore,
    pub posts: DynPostRepository,
    pub notifications: DynNotificationSink,
    pub likes: Arc<LikeRegistry>,
    pub accounts: Arc<AccountService>,
    pub sessions: Arc<SessionStore>,
    pub identity: DynIdentityProvider,
}

impl AppState {
    /// Wire every service onto one document store
    pub fn new(config: Config, store: DynDocumentStore) -> Self {
        let sessions = Arc::new(SessionStore::new(
            store.clone(),
            config.auth.session_hours,
        ));
        let notifications: DynNotificationSink =
            Arc::new(DocumentNotificationSink::new(store.clone()));
        let likes = LikeRegistry::new(
            store.clone(),
            notifications.clone(),
            RetryPolicy::from(&config.likes),
        );
        let accounts = AccountService::new(store.clone(), sessions.clone(), config.auth.bcrypt_cost);

        Self {
            posts: Arc::new(DocumentPostRepository::new(store.clone())),
            notifications,
            likes: Arc::new(likes),
            accounts: Arc::new(accounts),
            identity: sessions.clone(),
            sessions,
            store,
            config,
        }
    }
}
