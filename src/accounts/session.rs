use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::SESSIONS;
use crate::feed::UserId;
use crate::store::{DynDocumentStore, StoreError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user_id: UserId,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Resolves the caller behind a session token. Callers pass the resolved id
/// explicitly into every operation; nothing reads it from ambient state.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn current_user_id(&self, token: &str) -> Result<Option<UserId>, StoreError>;
}

pub type DynIdentityProvider = Arc<dyn IdentityProvider>;

/// Session-backed identity provider
pub struct SessionStore {
    store: DynDocumentStore,
    lifetime: Duration,
}

impl SessionStore {
    pub fn new(store: DynDocumentStore, hours: u64) -> Self {
        Self {
            store,
            lifetime: Duration::hours(hours as i64),
        }
    }

    /// Create a new session for a user. Returns the token and its expiry.
    pub async fn create(
        &self,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<(String, DateTime<Utc>), StoreError> {
        let token = generate_token();
        let session = Session {
            user_id: user_id.clone(),
            expires_at: now + self.lifetime,
            created_at: now,
        };
        self.store
            .put(SESSIONS, &token, serde_json::to_value(&session)?)
            .await?;

        tracing::info!("Session created for {}", user_id);
        Ok((token, session.expires_at))
    }

    pub async fn load(&self, token: &str) -> Result<Option<Session>, StoreError> {
        self.store
            .get(SESSIONS, token)
            .await?
            .map(|doc| doc.decode())
            .transpose()
    }

    /// Delete a session by token.
    pub async fn delete(&self, token: &str) -> Result<bool, StoreError> {
        self.store.remove(SESSIONS, token).await
    }

    /// Remove every session that has expired as of `now`. Returns how many were deleted.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let docs = self.store.list(SESSIONS, None).await?;

        let mut deleted = 0u64;
        for doc in docs {
            // Undecodable sessions can never resolve, so they go too
            let expired = match doc.decode::<Session>() {
                Ok(session) => !session.is_live(now),
                Err(_) => true,
            };
            if expired && self.store.remove(SESSIONS, &doc.key).await? {
                deleted += 1;
            }
        }

        if deleted > 0 {
            tracing::info!("Purged {} expired session(s)", deleted);
        }
        Ok(deleted)
    }
}

#[async_trait]
impl IdentityProvider for SessionStore {
    async fn current_user_id(&self, token: &str) -> Result<Option<UserId>, StoreError> {
        if token.is_empty() {
            return Ok(None);
        }
        match self.load(token).await? {
            Some(session) if session.is_live(Utc::now()) => Ok(Some(session.user_id)),
            Some(_) => {
                self.delete(token).await?;
                Ok(None)
            }
            None => Ok(None),
        }
    }
}

/// Generate a cryptographically random 32-byte hex token.
fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
