use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;

use crate::api::rest::session::CurrentSession;
use crate::engine::identity::{register_identity, Registration};
use crate::error::AppError;
use crate::models::identity::Identity;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/identities", post(register))
        .route("/identities/me", get(me))
}

async fn register(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<Registration>,
) -> Result<(StatusCode, Json<Identity>), AppError> {
    let identity = register_identity(&state, payload)?;
    Ok((StatusCode::CREATED, Json(identity)))
}

async fn me(
    State(state): State<Arc<AppState>>,
    CurrentSession(session): CurrentSession,
) -> Result<Json<Identity>, AppError> {
    let identity = state
        .store
        .identity(session.identity_id())
        .ok_or(AppError::IdentityMissing)?;

    Ok(Json(identity))
}
