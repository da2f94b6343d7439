use std::cmp::Ordering;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::engine::scoring::{compute_score, ScoreBreakdown, ScoringConfig};
use crate::error::AppError;
use crate::geo::haversine_km;
use crate::geo::proximity::{trip_fits_route, GeoBounds, DEFAULT_PROXIMITY_RADIUS_KM};
use crate::models::identity::Session;
use crate::models::ride::{Ride, RideKind, Waypoint};
use crate::models::route::{GeoPoint, Route};
use crate::state::AppState;

pub const DEFAULT_THRESHOLD: f64 = 75.0;
pub const DEFAULT_SCAN_LIMIT: usize = 500;

#[derive(Debug, Clone, PartialEq)]
pub struct MatchingConfig {
    pub scoring: ScoringConfig,
    pub proximity_radius_km: f64,
    pub threshold: f64,
    /// Upper bound on host rides scored per query.
    pub scan_limit: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            scoring: ScoringConfig::default(),
            proximity_radius_km: DEFAULT_PROXIMITY_RADIUS_KM,
            threshold: DEFAULT_THRESHOLD,
            scan_limit: DEFAULT_SCAN_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostCandidate {
    pub ride_id: Uuid,
    pub host_id: String,
    pub score: f64,
    pub breakdown: ScoreBreakdown,
    pub origin: Waypoint,
    pub destination: Waypoint,
    pub seats_available: Option<u32>,
    pub price_per_seat: Option<f64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MatchQuery {
    pub threshold: Option<f64>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NearbyHost {
    pub distance_km: f64,
    pub ride: Ride,
}

/// Ranks `hosts` against the rider's route.
///
/// Skips the rider's own rides and anything that is not an open host ride.
/// A host qualifies when both ends of the rider's trip lie within the
/// proximity radius of the host route and the similarity reaches `threshold`.
/// Ordered by score, best first; ties go to the host that posted earliest.
pub fn find_candidates(
    rider_id: &str,
    rider_route: &Route,
    hosts: &[Ride],
    threshold: f64,
    config: &MatchingConfig,
) -> Vec<HostCandidate> {
    let trip_start = rider_route.start();
    let trip_end = rider_route.end();
    let radius = config.proximity_radius_km;
    let mode = config.scoring.distance_mode;

    let mut candidates: Vec<HostCandidate> = hosts
        .iter()
        .filter(|host| host.owner_id != rider_id && host.is_open_host())
        .filter(|host| {
            let bounds = GeoBounds::of_route(&host.route).padded(radius);
            bounds.contains(&trip_start) && bounds.contains(&trip_end)
        })
        .filter(|host| trip_fits_route(&trip_start, &trip_end, &host.route, radius, mode))
        .filter_map(|host| {
            let (score, breakdown) = compute_score(rider_route, &host.route, &config.scoring);
            debug!(ride_id = %host.id, score, "scored host route");

            if score >= threshold {
                Some(HostCandidate {
                    ride_id: host.id,
                    host_id: host.owner_id.clone(),
                    score,
                    breakdown,
                    origin: host.origin.clone(),
                    destination: host.destination.clone(),
                    seats_available: host.seats_available,
                    price_per_seat: host.price_per_seat,
                    created_at: host.created_at,
                })
            } else {
                None
            }
        })
        .collect();

    candidates.sort_by(rank);
    candidates
}

fn rank(a: &HostCandidate, b: &HostCandidate) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.created_at.cmp(&b.created_at))
}

/// Candidate hosts for one of the session's rider rides.
pub fn find_matches(
    state: &AppState,
    session: &Session,
    rider_ride_id: Uuid,
    query: &MatchQuery,
) -> Result<Vec<HostCandidate>, AppError> {
    let rider_ride = state
        .store
        .ride(rider_ride_id)
        .ok_or_else(|| AppError::NotFound(format!("ride {rider_ride_id} not found")))?;

    if rider_ride.owner_id != session.identity_id() {
        return Err(AppError::Forbidden(format!(
            "ride {rider_ride_id} belongs to another identity"
        )));
    }
    if rider_ride.kind != RideKind::Rider {
        return Err(AppError::BadRequest(format!(
            "ride {rider_ride_id} is a host ride; matches are searched for rider rides"
        )));
    }

    let config = &state.config.matching;
    let threshold = query.threshold.unwrap_or(config.threshold);
    if !(0.0..=100.0).contains(&threshold) {
        return Err(AppError::BadRequest(format!(
            "threshold must be within [0, 100], got {threshold}"
        )));
    }

    let start = Instant::now();
    let (trip_start, trip_end) = (rider_ride.route.start(), rider_ride.route.end());
    let snapshot = state.store.open_host_rides(config.scan_limit, |host| {
        let bounds = GeoBounds::of_route(&host.route).padded(config.proximity_radius_km);
        bounds.contains(&trip_start) && bounds.contains(&trip_end)
    });
    let scanned = snapshot.len();

    let mut candidates = find_candidates(
        session.identity_id(),
        &rider_ride.route,
        &snapshot,
        threshold,
        config,
    );
    if let Some(limit) = query.limit {
        candidates.truncate(limit);
    }

    let elapsed = start.elapsed().as_secs_f64();
    state.metrics.match_scan_seconds.observe(elapsed);
    state
        .metrics
        .match_queries_total
        .with_label_values(&[if candidates.is_empty() { "empty" } else { "found" }])
        .inc();

    info!(
        rider_ride_id = %rider_ride_id,
        scanned,
        candidates = candidates.len(),
        threshold,
        "candidate scan finished"
    );

    Ok(candidates)
}

/// Open host rides starting within `radius_km` of `location`, nearest first.
/// Used before the rider has posted a route of their own.
pub fn nearby_hosts(
    state: &AppState,
    session: &Session,
    location: &GeoPoint,
    radius_km: f64,
) -> Result<Vec<NearbyHost>, AppError> {
    location.validate()?;
    if !radius_km.is_finite() || radius_km <= 0.0 {
        return Err(AppError::BadRequest(format!(
            "radius must be positive, got {radius_km}"
        )));
    }

    let bounds = GeoBounds::around(location, radius_km);
    let mut nearby: Vec<NearbyHost> = state
        .store
        .open_host_rides(state.config.matching.scan_limit, |ride| {
            ride.owner_id != session.identity_id() && bounds.contains(&ride.origin.location)
        })
        .into_iter()
        .filter_map(|ride| {
            let distance_km = haversine_km(location, &ride.origin.location);
            (distance_km <= radius_km).then_some(NearbyHost { distance_km, ride })
        })
        .collect();

    nearby.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
    Ok(nearby)
}
