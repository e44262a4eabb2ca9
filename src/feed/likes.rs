// Like registry - per-post set of likers, toggled under optimistic concurrency
use chrono::Utc;
use serde::Serialize;
use thiserror::Error;

use super::domain::{like_notification_content, LikeOutcome, Likes, NotificationId, Post, PostId, UserId};
use super::notifications::DynNotificationSink;
use super::POSTS;
use crate::retry::{with_retry, RetryError, RetryPolicy};
use crate::store::{DynDocumentStore, StoreError, Transaction};

#[derive(Debug, Error)]
pub enum LikeError {
    #[error("Post not found: {0}")]
    NotFound(PostId),

    #[error("Caller id must not be empty")]
    InvalidCaller,

    #[error("Like was not applied: post kept changing ({attempts} attempts)")]
    TransactionConflict { attempts: u32 },

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Malformed post document: {0}")]
    Malformed(String),
}

impl LikeError {
    fn is_conflict(&self) -> bool {
        matches!(self, Self::TransactionConflict { .. })
    }
}

impl From<StoreError> for LikeError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict { .. } => LikeError::TransactionConflict { attempts: 1 },
            StoreError::Unavailable(msg) => LikeError::StoreUnavailable(msg),
            StoreError::Serialization(e) => LikeError::Malformed(e.to_string()),
        }
    }
}

/// Committed result of a toggle. Clients render from `likes`, which is the
/// map exactly as written by this call's transaction.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeToggle {
    pub post_id: PostId,
    pub outcome: LikeOutcome,
    pub likes: Likes,
    pub like_count: usize,
    pub notification: Option<NotificationId>,
}

pub struct LikeRegistry {
    store: DynDocumentStore,
    notifications: DynNotificationSink,
    retry: RetryPolicy,
}

impl LikeRegistry {
    pub fn new(
        store: DynDocumentStore,
        notifications: DynNotificationSink,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            notifications,
            retry,
        }
    }

    /// Flip `caller`'s like on `post_id`.
    ///
    /// The read, the flip and the write-back form one transaction; if another
    /// writer commits in between, the whole attempt is repeated against the
    /// fresh document. On `Liked` by someone other than the author, the author
    /// is notified after the commit (best effort, at most once).
    pub async fn toggle_like(
        &self,
        post_id: &PostId,
        caller: &UserId,
    ) -> Result<LikeToggle, LikeError> {
        if caller.is_empty() {
            return Err(LikeError::InvalidCaller);
        }

        let (outcome, post) = with_retry(&self.retry, LikeError::is_conflict, || {
            self.toggle_once(post_id, caller)
        })
        .await
        .map_err(|e| match e {
            RetryError::Fatal(e) => e,
            RetryError::Exhausted { attempts, .. } => {
                LikeError::TransactionConflict { attempts }
            }
        })?;

        tracing::info!("{} {:?} post {}", caller, outcome, post_id);

        let notification = match outcome {
            LikeOutcome::Liked if post.author_id != *caller => {
                self.notify_author(&post, caller).await
            }
            _ => None,
        };

        Ok(LikeToggle {
            post_id: post.id,
            outcome,
            like_count: post.likes.len(),
            likes: post.likes,
            notification,
        })
    }

    async fn toggle_once(
        &self,
        post_id: &PostId,
        caller: &UserId,
    ) -> Result<(LikeOutcome, Post), LikeError> {
        let mut tx = Transaction::new(self.store.as_ref());

        let doc = tx
            .get(POSTS, post_id.as_str())
            .await?
            .ok_or_else(|| LikeError::NotFound(post_id.clone()))?;
        let mut post = Post::from_document(&doc)?;

        let outcome = post.likes.toggle(caller);

        // Write back the whole document with only `likes` replaced
        let mut body = doc.body;
        let fields = body
            .as_object_mut()
            .ok_or_else(|| LikeError::Malformed(format!("post {} is not an object", post_id)))?;
        fields.insert(
            "likes".to_string(),
            serde_json::to_value(&post.likes).map_err(StoreError::from)?,
        );
        tx.set(POSTS, post_id.as_str(), body);

        tx.commit().await?;
        Ok((outcome, post))
    }

    async fn notify_author(&self, post: &Post, liker: &UserId) -> Option<NotificationId> {
        let content = like_notification_content(liker);
        match self
            .notifications
            .append(&post.author_id, &content, Utc::now())
            .await
        {
            Ok(id) => Some(id),
            Err(e) => {
                // The like is already committed; losing the notification is accepted
                tracing::warn!(
                    "Failed to notify {} about like on {}: {}",
                    post.author_id,
                    post.id,
                    e
                );
                None
            }
        }
    }

    async fn load(&self, post_id: &PostId) -> Result<Post, LikeError> {
        let doc = self
            .store
            .get(POSTS, post_id.as_str())
            .await?
            .ok_or_else(|| LikeError::NotFound(post_id.clone()))?;
        Ok(Post::from_document(&doc)?)
    }

    /// Number of likers right now. Always read from the store.
    pub async fn like_count(&self, post_id: &PostId) -> Result<usize, LikeError> {
        Ok(self.load(post_id).await?.likes.len())
    }

    pub async fn is_liked(&self, post_id: &PostId, user: &UserId) -> Result<bool, LikeError> {
        Ok(self.load(post_id).await?.likes.contains(user))
    }

    /// The whole like set from a single read, for callers that derive
    /// several values (count, membership) and need them to agree.
    pub async fn likes_of(&self, post_id: &PostId) -> Result<Likes, LikeError> {
        Ok(self.load(post_id).await?.likes)
    }

    pub async fn likers(&self, post_id: &PostId) -> Result<Vec<UserId>, LikeError> {
        Ok(self.load(post_id).await?.likes.iter().cloned().collect())
    }
}
