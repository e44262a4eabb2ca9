// Domain types - pure data, no side effects
use chrono::{DateTime, Utc};
use serde::de::Deserializer;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::store::{Document, StoreError};

pub const MAX_IMAGES: usize = 5;

macro_rules! string_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

string_id!(UserId);
string_id!(PostId);
string_id!(NotificationId);

/// Result of a toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LikeOutcome {
    Liked,
    Unliked,
}

/// The set of users who liked a post.
///
/// Stored as a `{ userId: true }` map. Presence is the like; a `false` entry
/// read from storage counts as absent and is dropped on the next write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Likes(BTreeSet<UserId>);

impl Likes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, user: &UserId) -> bool {
        self.0.contains(user)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &UserId> {
        self.0.iter()
    }

    /// Flip `user`'s presence. Exactly one insert or one remove.
    pub fn toggle(&mut self, user: &UserId) -> LikeOutcome {
        if self.0.remove(user) {
            LikeOutcome::Unliked
        } else {
            self.0.insert(user.clone());
            LikeOutcome::Liked
        }
    }
}

impl FromIterator<UserId> for Likes {
    fn from_iter<I: IntoIterator<Item = UserId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Serialize for Likes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for user in &self.0 {
            map.serialize_entry(user.as_str(), &true)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Likes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<String, bool>::deserialize(deserializer)?;
        Ok(raw
            .into_iter()
            .filter(|(_, liked)| *liked)
            .map(|(user, _)| UserId(user))
            .collect())
    }
}

/// A post as served to clients
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: PostId,
    pub author_id: UserId,
    pub text: String,
    pub images: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub likes: Likes,
}

/// Stored body of a post document; the id is the document key
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PostRecord {
    pub author_id: UserId,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub images: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub likes: Likes,
}

impl Post {
    pub fn from_document(doc: &Document) -> Result<Self, StoreError> {
        let record: PostRecord = doc.decode()?;
        Ok(Self {
            id: PostId::new(doc.key.clone()),
            author_id: record.author_id,
            text: record.text,
            images: record.images,
            created_at: record.created_at,
            likes: record.likes,
        })
    }

    pub fn like_count(&self) -> usize {
        self.likes.len()
    }
}

/// Input for creating a post
#[derive(Debug, Clone, Deserialize)]
pub struct NewPost {
    pub text: String,
    #[serde(default)]
    pub images: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: NotificationId,
    pub target_user_id: UserId,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct NotificationRecord {
    pub target_user_id: UserId,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn from_document(doc: &Document) -> Result<Self, StoreError> {
        let record: NotificationRecord = doc.decode()?;
        Ok(Self {
            id: NotificationId::new(doc.key.clone()),
            target_user_id: record.target_user_id,
            content: record.content,
            created_at: record.created_at,
        })
    }
}

/// Text of the notification sent to an author when `liker` likes their post
pub fn like_notification_content(liker: &UserId) -> String {
    format!("{} liked your post.", liker)
}
