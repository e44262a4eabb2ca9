use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

use super::domain::{Likes, NewPost, Post, PostId, PostRecord, UserId, MAX_IMAGES};
use super::POSTS;
use crate::store::{DynDocumentStore, FieldFilter, StoreError};

#[derive(Debug, Error)]
pub enum PostError {
    #[error("A post can carry at most {max} images, got {count}")]
    TooManyImages { count: usize, max: usize },

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[async_trait]
pub trait PostRepository: Send + Sync {
    /// Store a new post authored by `author` with an empty like set
    async fn create(
        &self,
        author: &UserId,
        post: NewPost,
        now: DateTime<Utc>,
    ) -> Result<Post, PostError>;

    async fn get(&self, id: &PostId) -> Result<Option<Post>, StoreError>;

    /// Every post, newest first
    async fn list_all(&self) -> Result<Vec<Post>, StoreError>;

    /// Posts by one author, newest first
    async fn list_by_author(&self, author: &UserId) -> Result<Vec<Post>, StoreError>;
}

pub struct DocumentPostRepository {
    store: DynDocumentStore,
}

impl DocumentPostRepository {
    pub fn new(store: DynDocumentStore) -> Self {
        Self { store }
    }
}

fn newest_first(mut posts: Vec<Post>) -> Vec<Post> {
    posts.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
    posts
}

#[async_trait]
impl PostRepository for DocumentPostRepository {
    async fn create(
        &self,
        author: &UserId,
        post: NewPost,
        now: DateTime<Utc>,
    ) -> Result<Post, PostError> {
        if post.images.len() > MAX_IMAGES {
            return Err(PostError::TooManyImages {
                count: post.images.len(),
                max: MAX_IMAGES,
            });
        }

        let record = PostRecord {
            author_id: author.clone(),
            text: post.text,
            images: post.images,
            created_at: now,
            likes: Likes::new(),
        };
        let doc = self
            .store
            .create(POSTS, serde_json::to_value(&record).map_err(StoreError::from)?)
            .await?;

        tracing::info!("Post {} created by {}", doc.key, author);
        Ok(Post::from_document(&doc)?)
    }

    async fn get(&self, id: &PostId) -> Result<Option<Post>, StoreError> {
        self.store
            .get(POSTS, id.as_str())
            .await?
            .map(|doc| Post::from_document(&doc))
            .transpose()
    }

    async fn list_all(&self) -> Result<Vec<Post>, StoreError> {
        let docs = self.store.list(POSTS, None).await?;
        let posts = docs
            .iter()
            .map(Post::from_document)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(newest_first(posts))
    }

    async fn list_by_author(&self, author: &UserId) -> Result<Vec<Post>, StoreError> {
        let filter = FieldFilter::eq("authorId", author.as_str());
        let docs = self.store.list(POSTS, Some(&filter)).await?;
        let posts = docs
            .iter()
            .map(Post::from_document)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(newest_first(posts))
    }
}

/// Type alias for Arc-wrapped repository (for AppState)
pub type DynPostRepository = Arc<dyn PostRepository>;
