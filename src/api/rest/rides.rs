use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::rest::session::CurrentSession;
use crate::engine::lifecycle::{self, NewRide};
use crate::engine::matching::{self, HostCandidate, MatchQuery, NearbyHost};
use crate::error::AppError;
use crate::geo::proximity::DEFAULT_PROXIMITY_RADIUS_KM;
use crate::models::ride::Ride;
use crate::models::route::GeoPoint;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/rides", post(create_ride).get(list_rides))
        .route("/rides/:id", get(get_ride))
        .route("/rides/:id/matches", get(find_matches))
        .route("/rides/:id/cancel", post(cancel_ride))
        .route("/rides/:id/complete", post(complete_ride))
        .route("/hosts/nearby", get(nearby_hosts))
}

async fn create_ride(
    State(state): State<Arc<AppState>>,
    CurrentSession(session): CurrentSession,
    Json(payload): Json<NewRide>,
) -> Result<(StatusCode, Json<Ride>), AppError> {
    let ride = lifecycle::create_ride(&state, &session, payload).await?;
    Ok((StatusCode::CREATED, Json(ride)))
}

async fn list_rides(
    State(state): State<Arc<AppState>>,
    CurrentSession(session): CurrentSession,
) -> Json<Vec<Ride>> {
    Json(lifecycle::ride_history(&state, &session))
}

async fn get_ride(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Ride>, AppError> {
    Ok(Json(lifecycle::get_ride(&state, id)?))
}

async fn find_matches(
    State(state): State<Arc<AppState>>,
    CurrentSession(session): CurrentSession,
    Path(id): Path<Uuid>,
    Query(query): Query<MatchQuery>,
) -> Result<Json<Vec<HostCandidate>>, AppError> {
    let candidates = matching::find_matches(&state, &session, id, &query)?;
    Ok(Json(candidates))
}

async fn cancel_ride(
    State(state): State<Arc<AppState>>,
    CurrentSession(session): CurrentSession,
    Path(id): Path<Uuid>,
) -> Result<Json<Ride>, AppError> {
    Ok(Json(lifecycle::cancel_ride(&state, &session, id)?))
}

async fn complete_ride(
    State(state): State<Arc<AppState>>,
    CurrentSession(session): CurrentSession,
    Path(id): Path<Uuid>,
) -> Result<Json<Ride>, AppError> {
    Ok(Json(lifecycle::complete_ride(&state, &session, id)?))
}

#[derive(Deserialize)]
pub struct NearbyQuery {
    pub lat: f64,
    pub lng: f64,
    pub radius_km: Option<f64>,
}

async fn nearby_hosts(
    State(state): State<Arc<AppState>>,
    CurrentSession(session): CurrentSession,
    Query(query): Query<NearbyQuery>,
) -> Result<Json<Vec<NearbyHost>>, AppError> {
    let location = GeoPoint::new(query.lat, query.lng);
    let radius_km = query.radius_km.unwrap_or(DEFAULT_PROXIMITY_RADIUS_KM);

    let hosts = matching::nearby_hosts(&state, &session, &location, radius_km)?;
    Ok(Json(hosts))
}
