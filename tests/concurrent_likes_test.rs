//! Concurrent like toggles against the SQLite store
//!
//! Many callers race on one post document. Every toggle must land exactly
//! once: nothing lost to a stale read, nothing applied twice by a retry.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tempfile::TempDir;

use likeboard::db;
use likeboard::feed::{
    DocumentNotificationSink, DocumentPostRepository, DynNotificationSink, LikeOutcome,
    LikeRegistry, NewPost, NotificationSink, PostId, PostRepository, UserId,
};
use likeboard::retry::RetryPolicy;
use likeboard::store::{DynDocumentStore, SqliteDocumentStore};

struct Fixture {
    _dir: TempDir,
    registry: Arc<LikeRegistry>,
    notifications: DynNotificationSink,
    post_id: PostId,
}

async fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let pool = db::create_pool(&dir.path().join("likes.db")).unwrap();
    db::run_migrations(&pool).unwrap();
    let store: DynDocumentStore = Arc::new(SqliteDocumentStore::new(pool));

    let posts = DocumentPostRepository::new(store.clone());
    let post = posts
        .create(
            &UserId::new("author"),
            NewPost {
                text: "race me".into(),
                images: vec![],
            },
            Utc::now(),
        )
        .await
        .unwrap();

    // Generous budget: the point is correctness under contention, not giving up
    let retry = RetryPolicy {
        max_retries: 100,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(20),
        backoff_multiplier: 2.0,
        jitter: true,
    };
    let notifications: DynNotificationSink =
        Arc::new(DocumentNotificationSink::new(store.clone()));
    let registry = Arc::new(LikeRegistry::new(store, notifications.clone(), retry));

    Fixture {
        _dir: dir,
        registry,
        notifications,
        post_id: post.id,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_distinct_likers_all_land() {
    let fx = fixture().await;
    let callers: Vec<UserId> = (0..16).map(|i| UserId::new(format!("user-{:02}", i))).collect();

    let tasks = callers.iter().cloned().map(|caller| {
        let registry = fx.registry.clone();
        let post_id = fx.post_id.clone();
        tokio::spawn(async move { registry.toggle_like(&post_id, &caller).await })
    });

    for result in futures::future::join_all(tasks).await {
        let toggle = result.unwrap().unwrap();
        assert_eq!(toggle.outcome, LikeOutcome::Liked);
    }

    assert_eq!(fx.registry.like_count(&fx.post_id).await.unwrap(), 16);
    let likers = fx.registry.likers(&fx.post_id).await.unwrap();
    assert_eq!(likers, callers);

    // One notification per committed like, none duplicated by retries
    let notified = fx
        .notifications
        .list_for(&UserId::new("author"))
        .await
        .unwrap();
    assert_eq!(notified.len(), 16);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_double_toggles_cancel_out() {
    let fx = fixture().await;

    // Each of 8 callers toggles twice, all at once
    let tasks = (0..16).map(|i| {
        let registry = fx.registry.clone();
        let post_id = fx.post_id.clone();
        let caller = UserId::new(format!("user-{}", i % 8));
        tokio::spawn(async move { registry.toggle_like(&post_id, &caller).await })
    });

    let outcomes: Vec<LikeOutcome> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap().unwrap().outcome)
        .collect();

    let liked = outcomes.iter().filter(|o| **o == LikeOutcome::Liked).count();
    assert_eq!(liked, 8);
    assert_eq!(fx.registry.like_count(&fx.post_id).await.unwrap(), 0);
}
