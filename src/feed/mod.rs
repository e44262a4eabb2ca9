pub mod domain;
pub mod likes;
pub mod notifications;
pub mod posts;

pub const POSTS: &str = "posts";
pub const NOTIFICATIONS: &str = "notifications";

pub use domain::{
    LikeOutcome, Likes, NewPost, Notification, NotificationId, Post, PostId, UserId,
};
pub use likes::{LikeError, LikeRegistry, LikeToggle};
pub use notifications::{DocumentNotificationSink, DynNotificationSink, NotificationSink};
pub use posts::{DocumentPostRepository, DynPostRepository, PostError, PostRepository};
