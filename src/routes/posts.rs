use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::error::AppResult;
use crate::extractors::{CurrentUser, MaybeUser};
use crate::feed::{LikeToggle, NewPost, Post, PostId, UserId};
use crate::state::AppState;

// --- View structs ---

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    #[serde(flatten)]
    pub post: Post,
    pub like_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub liked_by_me: Option<bool>,
}

impl PostView {
    pub fn new(post: Post, viewer: Option<&UserId>) -> Self {
        Self {
            like_count: post.like_count(),
            liked_by_me: viewer.map(|v| post.likes.contains(v)),
            post,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeSummary {
    pub post_id: PostId,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub liked_by_me: Option<bool>,
}

// --- Router ---

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/posts", get(list_posts).post(create_post))
        .route("/api/posts/{id}/likes", get(like_summary))
        .route("/api/posts/{id}/like", post(toggle_like))
}

// --- Handlers ---

async fn list_posts(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
) -> AppResult<Json<Vec<PostView>>> {
    let viewer = user.as_ref().map(|u| &u.id);
    let posts = state.posts.list_all().await?;
    Ok(Json(
        posts
            .into_iter()
            .map(|p| PostView::new(p, viewer))
            .collect(),
    ))
}

async fn create_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(new_post): Json<NewPost>,
) -> AppResult<Response> {
    let post = state.posts.create(&user.id, new_post, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(PostView::new(post, Some(&user.id)))).into_response())
}

async fn like_summary(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Path(id): Path<String>,
) -> AppResult<Json<LikeSummary>> {
    let post_id = PostId::new(id);
    // Count and membership come from the same read
    let likes = state.likes.likes_of(&post_id).await?;

    Ok(Json(LikeSummary {
        post_id,
        count: likes.len(),
        liked_by_me: user.map(|u| likes.contains(&u.id)),
    }))
}

/// The response carries the committed like map; clients render from it
async fn toggle_like(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<LikeToggle>> {
    let toggle = state.likes.toggle_like(&PostId::new(id), &user.id).await?;
    Ok(Json(toggle))
}
