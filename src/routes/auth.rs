use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;

use crate::accounts::NewAccount;
use crate::error::AppResult;
use crate::extractors::CurrentUser;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct SigninForm {
    pub id: String,
    pub password: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/auth/signup", post(signup))
        .route("/api/auth/signin", post(signin))
        .route("/api/auth/signout", post(signout))
}

async fn signup(
    State(state): State<AppState>,
    Json(account): Json<NewAccount>,
) -> AppResult<Response> {
    let profile = state.accounts.signup(account).await?;
    Ok((StatusCode::CREATED, Json(profile)).into_response())
}

async fn signin(
    State(state): State<AppState>,
    Json(form): Json<SigninForm>,
) -> AppResult<Response> {
    let signed_in = state.accounts.signin(&form.id, &form.password).await?;

    let max_age = (signed_in.expires_at - Utc::now()).num_seconds().max(0);
    let cookie = format!(
        "{}={}; HttpOnly; SameSite=Strict; Path=/; Max-Age={}",
        state.config.auth.cookie_name, signed_in.token, max_age
    );

    Ok((StatusCode::OK, [(header::SET_COOKIE, cookie)], Json(signed_in)).into_response())
}

async fn signout(State(state): State<AppState>, user: CurrentUser) -> AppResult<Response> {
    state.accounts.signout(&user.token).await?;

    let cookie = format!(
        "{}=; HttpOnly; SameSite=Strict; Path=/; Max-Age=0",
        state.config.auth.cookie_name
    );
    Ok((StatusCode::NO_CONTENT, [(header::SET_COOKIE, cookie)]).into_response())
}
