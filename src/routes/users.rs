use axum::extract::{Path, State};
use axum::routing::{get, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::accounts::Profile;
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, MaybeUser};
use crate::feed::UserId;
use crate::routes::posts::PostView;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ProfileImageForm {
    pub uri: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileImageView {
    pub user_id: UserId,
    pub profile_image: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/me", get(me))
        .route("/api/me/profile-image", put(update_profile_image))
        .route("/api/users/{id}", get(profile))
        .route("/api/users/{id}/posts", get(user_posts))
        .route("/api/users/{id}/profile-image", get(profile_image))
}

async fn me(State(state): State<AppState>, user: CurrentUser) -> AppResult<Json<Profile>> {
    let profile = state
        .accounts
        .profile(&user.id)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(profile))
}

async fn profile(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Profile>> {
    let profile = state
        .accounts
        .profile(&UserId::new(id))
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(profile))
}

/// `profileImage` is null when the user has none set; 404 when the user is unknown
async fn profile_image(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<ProfileImageView>> {
    let user_id = UserId::new(id);
    let profile_image = state.accounts.profile_image(&user_id).await?;
    Ok(Json(ProfileImageView {
        user_id,
        profile_image,
    }))
}

async fn user_posts(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Path(id): Path<String>,
) -> AppResult<Json<Vec<PostView>>> {
    let viewer = user.as_ref().map(|u| &u.id);
    let posts = state.posts.list_by_author(&UserId::new(id)).await?;
    Ok(Json(
        posts
            .into_iter()
            .map(|p| PostView::new(p, viewer))
            .collect(),
    ))
}

async fn update_profile_image(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(form): Json<ProfileImageForm>,
) -> AppResult<Json<Profile>> {
    let uri = form.uri.trim();
    if uri.is_empty() {
        return Err(AppError::BadRequest("Image URI cannot be empty".into()));
    }
    let profile = state.accounts.update_profile_image(&user.id, uri).await?;
    Ok(Json(profile))
}
