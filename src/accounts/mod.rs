// Accounts - signup, signin and profile data
pub mod session;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::feed::UserId;
use crate::store::{DynDocumentStore, StoreError};

pub use session::{DynIdentityProvider, IdentityProvider, Session, SessionStore};

pub const USERS: &str = "users";
pub const SESSIONS: &str = "sessions";

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("Invalid account data: {0}")]
    Invalid(String),

    #[error("User id already taken: {0}")]
    IdTaken(UserId),

    #[error("Invalid id or password")]
    InvalidCredentials,

    #[error("User not found: {0}")]
    NotFound(UserId),

    #[error("Password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAccount {
    pub name: String,
    pub id: String,
    pub password: String,
    #[serde(default)]
    pub phone_number: String,
}

/// Stored body of a user document; the login id is the document key
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserRecord {
    name: String,
    #[serde(default)]
    phone_number: String,
    password_hash: String,
    #[serde(default)]
    profile_image: String,
    created_at: DateTime<Utc>,
}

/// Public view of a user
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: UserId,
    pub name: String,
    pub profile_image: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Profile {
    fn from_record(id: UserId, record: UserRecord) -> Self {
        Self {
            id,
            name: record.name,
            profile_image: Some(record.profile_image).filter(|uri| !uri.is_empty()),
            created_at: record.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedIn {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: Profile,
}

pub struct AccountService {
    store: DynDocumentStore,
    sessions: Arc<SessionStore>,
    bcrypt_cost: u32,
}

impl AccountService {
    pub fn new(store: DynDocumentStore, sessions: Arc<SessionStore>, bcrypt_cost: u32) -> Self {
        Self {
            store,
            sessions,
            bcrypt_cost,
        }
    }

    /// Register a new user. The password is stored only as a bcrypt hash.
    pub async fn signup(&self, account: NewAccount) -> Result<Profile, AccountError> {
        let name = account.name.trim();
        let id = account.id.trim();
        if name.is_empty() {
            return Err(AccountError::Invalid("name is required".into()));
        }
        if id.is_empty() {
            return Err(AccountError::Invalid("id is required".into()));
        }
        if account.password.is_empty() {
            return Err(AccountError::Invalid("password is required".into()));
        }

        let user_id = UserId::new(id);
        let record = UserRecord {
            name: name.to_string(),
            phone_number: account.phone_number,
            password_hash: bcrypt::hash(&account.password, self.bcrypt_cost)?,
            profile_image: String::new(),
            created_at: Utc::now(),
        };

        // The user document is keyed by login id, so a taken id is a write conflict
        match self
            .store
            .put(USERS, id, serde_json::to_value(&record).map_err(StoreError::from)?)
            .await
        {
            Ok(_) => {}
            Err(e) if e.is_conflict() => return Err(AccountError::IdTaken(user_id)),
            Err(e) => return Err(e.into()),
        }

        tracing::info!("Registered user {}", user_id);
        Ok(Profile::from_record(user_id, record))
    }

    /// Check credentials and open a session.
    pub async fn signin(&self, id: &str, password: &str) -> Result<SignedIn, AccountError> {
        let user_id = UserId::new(id.trim());
        let record = match self.load(&user_id).await? {
            Some(record) => record,
            None => {
                tracing::info!("Sign-in for unknown id {}", user_id);
                return Err(AccountError::InvalidCredentials);
            }
        };

        // A stored hash bcrypt cannot parse is a data fault, not a bad password
        if !bcrypt::verify(password, &record.password_hash)? {
            tracing::info!("Sign-in with wrong password for {}", user_id);
            return Err(AccountError::InvalidCredentials);
        }

        let (token, expires_at) = self.sessions.create(&user_id, Utc::now()).await?;
        Ok(SignedIn {
            token,
            expires_at,
            user: Profile::from_record(user_id, record),
        })
    }

    pub async fn signout(&self, token: &str) -> Result<bool, AccountError> {
        Ok(self.sessions.delete(token).await?)
    }

    pub async fn profile(&self, id: &UserId) -> Result<Option<Profile>, AccountError> {
        Ok(self
            .load(id)
            .await?
            .map(|record| Profile::from_record(id.clone(), record)))
    }

    /// Profile image URI; `Ok(None)` when the user exists but has none set
    pub async fn profile_image(&self, id: &UserId) -> Result<Option<String>, AccountError> {
        match self.profile(id).await? {
            Some(profile) => Ok(profile.profile_image),
            None => Err(AccountError::NotFound(id.clone())),
        }
    }

    pub async fn update_profile_image(
        &self,
        id: &UserId,
        uri: &str,
    ) -> Result<Profile, AccountError> {
        let mut tx = crate::store::Transaction::new(self.store.as_ref());
        let doc = tx
            .get(USERS, id.as_str())
            .await?
            .ok_or_else(|| AccountError::NotFound(id.clone()))?;

        let mut record: UserRecord = doc.decode()?;
        record.profile_image = uri.to_string();
        tx.set(
            USERS,
            id.as_str(),
            serde_json::to_value(&record).map_err(StoreError::from)?,
        );
        tx.commit().await?;

        tracing::info!("Profile image updated for {}", id);
        Ok(Profile::from_record(id.clone(), record))
    }

    async fn load(&self, id: &UserId) -> Result<Option<UserRecord>, AccountError> {
        if id.is_empty() {
            return Ok(None);
        }
        Ok(self
            .store
            .get(USERS, id.as_str())
            .await?
            .map(|doc| doc.decode())
            .transpose()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryDocumentStore;

    // Minimum bcrypt cost keeps the tests fast
    const TEST_COST: u32 = 4;

    fn service() -> (AccountService, DynDocumentStore) {
        let store: DynDocumentStore = Arc::new(MemoryDocumentStore::new());
        let sessions = Arc::new(SessionStore::new(store.clone(), 24));
        (AccountService::new(store.clone(), sessions, TEST_COST), store)
    }

    fn alice() -> NewAccount {
        NewAccount {
            name: "Alice".into(),
            id: "alice".into(),
            password: "s3cret!".into(),
            phone_number: "01012345678".into(),
        }
    }

    #[tokio::test]
    async fn test_signup_stores_hash_not_plaintext() {
        let (accounts, store) = service();
        let profile = accounts.signup(alice()).await.unwrap();
        assert_eq!(profile.id, UserId::new("alice"));
        assert_eq!(profile.profile_image, None);

        let doc = store.get(USERS, "alice").await.unwrap().unwrap();
        let hash = doc.body["passwordHash"].as_str().unwrap();
        assert_ne!(hash, "s3cret!");
        assert!(hash.starts_with("$2"));
        assert!(doc.body.get("password").is_none());
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let (accounts, _) = service();
        accounts.signup(alice()).await.unwrap();

        let err = accounts.signup(alice()).await.unwrap_err();
        assert!(matches!(err, AccountError::IdTaken(ref id) if id.as_str() == "alice"));
    }

    #[tokio::test]
    async fn test_signup_requires_fields() {
        let (accounts, _) = service();
        let mut missing_id = alice();
        missing_id.id = "  ".into();
        assert!(matches!(
            accounts.signup(missing_id).await,
            Err(AccountError::Invalid(_))
        ));

        let mut missing_password = alice();
        missing_password.password = String::new();
        assert!(matches!(
            accounts.signup(missing_password).await,
            Err(AccountError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn test_signin_issues_working_session() {
        let (accounts, _) = service();
        accounts.signup(alice()).await.unwrap();

        let signed_in = accounts.signin("alice", "s3cret!").await.unwrap();
        assert_eq!(signed_in.user.name, "Alice");
        assert_eq!(signed_in.token.len(), 64);

        let who = accounts
            .sessions
            .current_user_id(&signed_in.token)
            .await
            .unwrap();
        assert_eq!(who, Some(UserId::new("alice")));

        assert!(accounts.signout(&signed_in.token).await.unwrap());
        let who = accounts
            .sessions
            .current_user_id(&signed_in.token)
            .await
            .unwrap();
        assert_eq!(who, None);
    }

    #[tokio::test]
    async fn test_signin_rejects_wrong_password_and_unknown_id() {
        let (accounts, _) = service();
        accounts.signup(alice()).await.unwrap();

        assert!(matches!(
            accounts.signin("alice", "wrong").await,
            Err(AccountError::InvalidCredentials)
        ));
        assert!(matches!(
            accounts.signin("bob", "s3cret!").await,
            Err(AccountError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_signin_with_corrupt_hash_is_hash_error() {
        let (accounts, store) = service();
        store
            .put(
                USERS,
                "alice",
                serde_json::json!({
                    "name": "Alice",
                    "passwordHash": "not-a-bcrypt-hash",
                    "createdAt": Utc::now(),
                }),
            )
            .await
            .unwrap();

        let err = accounts.signin("alice", "whatever").await.unwrap_err();
        assert!(matches!(err, AccountError::Hash(_)));
    }

    #[tokio::test]
    async fn test_profile_lookup_distinguishes_missing() {
        let (accounts, _) = service();
        accounts.signup(alice()).await.unwrap();

        assert!(accounts.profile(&UserId::new("alice")).await.unwrap().is_some());
        assert!(accounts.profile(&UserId::new("bob")).await.unwrap().is_none());
        assert!(matches!(
            accounts.profile_image(&UserId::new("bob")).await,
            Err(AccountError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_profile_image() {
        let (accounts, _) = service();
        accounts.signup(alice()).await.unwrap();
        let alice_id = UserId::new("alice");

        assert_eq!(accounts.profile_image(&alice_id).await.unwrap(), None);

        let updated = accounts
            .update_profile_image(&alice_id, "file:///me.png")
            .await
            .unwrap();
        assert_eq!(updated.profile_image.as_deref(), Some("file:///me.png"));
        assert_eq!(
            accounts.profile_image(&alice_id).await.unwrap().as_deref(),
            Some("file:///me.png")
        );

        // Password still works after the rewrite
        assert!(accounts.signin("alice", "s3cret!").await.is_ok());
    }

    #[tokio::test]
    async fn test_update_profile_image_for_missing_user() {
        let (accounts, _) = service();
        let err = accounts
            .update_profile_image(&UserId::new("ghost"), "file:///x.png")
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::NotFound(_)));
    }
}
