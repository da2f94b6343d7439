use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::rest::session::CurrentSession;
use crate::engine::lifecycle::{self, SelectHost};
use crate::error::AppError;
use crate::models::ride_match::{Decision, RideMatch};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/matches", post(select_host).get(list_matches))
        .route("/matches/:id", get(get_match))
        .route("/matches/:id/respond", post(respond))
        .route("/matches/:id/start", post(start))
}

async fn select_host(
    State(state): State<Arc<AppState>>,
    CurrentSession(session): CurrentSession,
    Json(payload): Json<SelectHost>,
) -> Result<(StatusCode, Json<RideMatch>), AppError> {
    let ride_match = lifecycle::select_host(&state, &session, payload)?;
    Ok((StatusCode::CREATED, Json(ride_match)))
}

async fn list_matches(
    State(state): State<Arc<AppState>>,
    CurrentSession(session): CurrentSession,
) -> Json<Vec<RideMatch>> {
    Json(lifecycle::my_matches(&state, &session))
}

async fn get_match(
    State(state): State<Arc<AppState>>,
    CurrentSession(session): CurrentSession,
    Path(id): Path<Uuid>,
) -> Result<Json<RideMatch>, AppError> {
    Ok(Json(lifecycle::get_match(&state, &session, id)?))
}

#[derive(Deserialize)]
pub struct RespondRequest {
    pub decision: Decision,
}

async fn respond(
    State(state): State<Arc<AppState>>,
    CurrentSession(session): CurrentSession,
    Path(id): Path<Uuid>,
    Json(payload): Json<RespondRequest>,
) -> Result<Json<RideMatch>, AppError> {
    let ride_match = lifecycle::respond_to_match(&state, &session, id, payload.decision)?;
    Ok(Json(ride_match))
}

#[derive(Deserialize)]
pub struct StartRequest {
    pub otp: String,
}

async fn start(
    State(state): State<Arc<AppState>>,
    CurrentSession(session): CurrentSession,
    Path(id): Path<Uuid>,
    Json(payload): Json<StartRequest>,
) -> Result<Json<RideMatch>, AppError> {
    let ride_match = lifecycle::verify_otp_and_start(&state, &session, id, &payload.otp)?;
    Ok(Json(ride_match))
}
