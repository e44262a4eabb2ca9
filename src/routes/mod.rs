pub mod auth;
pub mod notifications;
pub mod posts;
pub mod users;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::AppResult;
use crate::state::AppState;

/// Full application router with middleware, ready to serve
pub fn app(state: AppState) -> Router {
    let cors_any_origin = state.config.server.cors_any_origin;

    let mut router = Router::new()
        .route("/health", get(health))
        .merge(auth::router())
        .merge(posts::router())
        .merge(users::router())
        .merge(notifications::router())
        .layer(TraceLayer::new_for_http());

    if cors_any_origin {
        router = router.layer(CorsLayer::permissive());
    }

    router.with_state(state)
}

/// Liveness plus a round trip to the store
async fn health(State(state): State<AppState>) -> AppResult<Json<Value>> {
    state.store.get("health", "ping").await?;
    Ok(Json(json!({ "status": "ok" })))
}
