//! Ride and match lifecycle: creation, host selection, host decisions and the
//! OTP-gated start.
//!
//! Rides and matches are separate documents. Multi-document changes write the
//! match first (a versioned conditional write that decides concurrent races),
//! then the rides, and roll earlier writes back if a later one fails.

use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::directions::coordinate_label;
use crate::engine::scoring::score;
use crate::engine::transitions::{transition, MatchEvent, RideEvent};
use crate::error::AppError;
use crate::geo::polyline;
use crate::geo::sampler::declutter;
use crate::models::identity::Session;
use crate::models::ride::{Ride, RideKind, RideStatus, Waypoint};
use crate::models::ride_match::{Decision, MatchStatus, MatchUpdate, RideMatch};
use crate::models::route::{GeoPoint, Route};
use crate::state::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct PlaceInput {
    pub location: GeoPoint,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewRide {
    pub kind: RideKind,
    pub origin: PlaceInput,
    pub destination: PlaceInput,
    pub seats_available: Option<u32>,
    pub price_per_seat: Option<f64>,
    /// Encoded polyline. When absent the directions provider is asked.
    pub polyline: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SelectHost {
    pub host_ride_id: Uuid,
    /// Defaults to the rider's most recent open rider ride.
    pub rider_ride_id: Option<Uuid>,
}

pub async fn create_ride(state: &AppState, session: &Session, new_ride: NewRide) -> Result<Ride, AppError> {
    new_ride.origin.location.validate()?;
    new_ride.destination.location.validate()?;

    let (seats_available, price_per_seat) = match new_ride.kind {
        RideKind::Host => {
            let seats = new_ride
                .seats_available
                .ok_or_else(|| AppError::BadRequest("host rides need seats_available".to_string()))?;
            let price = new_ride
                .price_per_seat
                .ok_or_else(|| AppError::BadRequest("host rides need price_per_seat".to_string()))?;
            if !price.is_finite() || price < 0.0 {
                return Err(AppError::BadRequest(format!(
                    "price_per_seat must be >= 0, got {price}"
                )));
            }
            (Some(seats), Some(price))
        }
        RideKind::Rider => (None, None),
    };

    let route = resolve_route(state, &new_ride).await?;
    let origin = waypoint(state, new_ride.origin).await;
    let destination = waypoint(state, new_ride.destination).await;

    let now = Utc::now();
    let ride = state.store.insert_ride(Ride {
        id: Uuid::now_v7(),
        owner_id: session.identity_id().to_string(),
        kind: new_ride.kind,
        origin,
        destination,
        route,
        seats_available,
        price_per_seat,
        status: RideStatus::Available,
        created_at: now,
        updated_at: now,
        version: 0,
    });

    let kind_label = match ride.kind {
        RideKind::Host => "host",
        RideKind::Rider => "rider",
    };
    state
        .metrics
        .rides_created_total
        .with_label_values(&[kind_label])
        .inc();

    info!(
        ride_id = %ride.id,
        owner_id = %ride.owner_id,
        kind = kind_label,
        route_points = ride.route.len(),
        "ride created"
    );

    Ok(ride)
}

async fn resolve_route(state: &AppState, new_ride: &NewRide) -> Result<Route, AppError> {
    let encoded = match &new_ride.polyline {
        Some(encoded) => encoded.clone(),
        None => {
            state
                .directions
                .route_polyline(new_ride.origin.location, new_ride.destination.location)
                .await?
        }
    };

    let route = polyline::decode(&encoded)?;
    Ok(declutter(&route, state.config.declutter_km))
}

async fn waypoint(state: &AppState, place: PlaceInput) -> Waypoint {
    let address = match place.address.map(|a| a.trim().to_string()).filter(|a| !a.is_empty()) {
        Some(address) => address,
        None => describe(state, place.location).await,
    };

    Waypoint {
        location: place.location,
        address,
        timestamp: Utc::now(),
    }
}

async fn describe(state: &AppState, point: GeoPoint) -> String {
    let Some(geocoder) = &state.geocoder else {
        return coordinate_label(&point);
    };

    match geocoder.reverse_geocode(point).await {
        Ok(address) => address,
        Err(err) => {
            warn!(error = %err, "reverse geocoding failed; labelling with coordinates");
            coordinate_label(&point)
        }
    }
}

pub fn get_ride(state: &AppState, ride_id: Uuid) -> Result<Ride, AppError> {
    load_ride(state, ride_id)
}

pub fn ride_history(state: &AppState, session: &Session) -> Vec<Ride> {
    state.store.rides_of(session.identity_id())
}

pub fn cancel_ride(state: &AppState, session: &Session, ride_id: Uuid) -> Result<Ride, AppError> {
    let cancelled = apply_owner_event(state, session, ride_id, RideEvent::Cancel)?;
    close_matches(state, &cancelled);
    Ok(cancelled)
}

pub fn complete_ride(state: &AppState, session: &Session, ride_id: Uuid) -> Result<Ride, AppError> {
    apply_owner_event(state, session, ride_id, RideEvent::Complete)
}

fn apply_owner_event(
    state: &AppState,
    session: &Session,
    ride_id: Uuid,
    event: RideEvent,
) -> Result<Ride, AppError> {
    let ride = load_ride(state, ride_id)?;
    ensure_owner(&ride, session)?;

    let updated = state.store.update_ride(ride.id, ride.version, |r| {
        r.status = transition(r.status, event)?;
        Ok(())
    })?;

    info!(ride_id = %updated.id, ?event, status = ?updated.status, "ride status changed");
    Ok(updated)
}

/// Matches on a cancelled ride can no longer reach pickup. Undecided and
/// accepted ones are rejected; an accepted one also hands the seat back to
/// the host ride, or reopens the rider ride, on the other side.
fn close_matches(state: &AppState, cancelled: &Ride) {
    for open in state.store.matches_for_ride(cancelled.id) {
        if !matches!(open.status, MatchStatus::Pending | MatchStatus::Accepted) {
            continue;
        }

        if let Err(err) = close_match(state, &open, cancelled.id) {
            warn!(match_id = %open.id, error = %err, "could not close match of cancelled ride");
        }
    }
}

fn close_match(state: &AppState, open: &RideMatch, cancelled_ride_id: Uuid) -> Result<(), AppError> {
    let closed = state.store.update_match(open.id, open.version, |m| {
        m.status = transition(m.status, MatchEvent::RideCancelled)?;
        m.responded_at.get_or_insert_with(Utc::now);
        Ok(())
    })?;

    if open.status == MatchStatus::Accepted {
        let counterpart = if open.ride_id == cancelled_ride_id {
            open.rider_ride_id
        } else {
            open.ride_id
        };

        if let Err(err) = release_counterpart(state, counterpart) {
            state.store.restore_match(open, &closed);
            return Err(err);
        }
    }

    state
        .store
        .release_active_match(&closed.rider_id, closed.ride_id, closed.id);
    state.publish(MatchUpdate::from(&closed));
    Ok(())
}

/// Undoes what an accept did to `ride_id`: a host ride gets its seat back and
/// a `Matched` ride nobody else holds becomes `Available` again.
fn release_counterpart(state: &AppState, ride_id: Uuid) -> Result<Ride, AppError> {
    let mut conflicts = 0;
    loop {
        let ride = load_ride(state, ride_id)?;
        let still_held = ride.kind == RideKind::Host
            && state.store.matches_for_ride(ride_id).iter().any(|m| {
                m.ride_id == ride_id && matches!(m.status, MatchStatus::Accepted | MatchStatus::Started)
            });

        let result = state.store.update_ride(ride.id, ride.version, |r| {
            if r.kind == RideKind::Host {
                r.seats_available = Some(r.seats_available.unwrap_or(0).saturating_add(1));
            }
            if r.status == RideStatus::Matched && !still_held {
                r.status = transition(r.status, RideEvent::RiderWithdrew)?;
            }
            Ok(())
        });

        match result {
            Err(AppError::StoreConflict(_)) if conflicts < 2 => conflicts += 1,
            other => return other,
        }
    }
}

/// A rider picks a host ride; creates a pending match for the host to decide.
pub fn select_host(state: &AppState, session: &Session, request: SelectHost) -> Result<RideMatch, AppError> {
    let rider_id = session.identity_id();
    let host_ride = load_ride(state, request.host_ride_id)?;

    if host_ride.kind != RideKind::Host {
        return Err(AppError::BadRequest(format!("ride {} is not a host ride", host_ride.id)));
    }
    if host_ride.owner_id == rider_id {
        return Err(AppError::BadRequest("cannot join your own ride".to_string()));
    }
    if !host_ride.is_open_host() {
        return Err(AppError::InvalidTransition(format!(
            "ride {} is {:?} with {} seat(s) and is not taking riders",
            host_ride.id,
            host_ride.status,
            host_ride.seats_available.unwrap_or(0)
        )));
    }

    let rider_ride = match request.rider_ride_id {
        Some(id) => {
            let ride = load_ride(state, id)?;
            ensure_owner(&ride, session)?;
            if ride.kind != RideKind::Rider {
                return Err(AppError::BadRequest(format!("ride {id} is not a rider ride")));
            }
            if ride.status != RideStatus::Available {
                return Err(AppError::InvalidTransition(format!(
                    "rider ride {id} is {:?}",
                    ride.status
                )));
            }
            ride
        }
        None => state.store.latest_open_rider_ride(rider_id).ok_or_else(|| {
            AppError::BadRequest("no open rider ride; create one before selecting a host".to_string())
        })?,
    };

    let similarity = score(&rider_ride.route, &host_ride.route, &state.config.matching.scoring);

    let ride_match = RideMatch {
        id: Uuid::now_v7(),
        rider_id: rider_id.to_string(),
        host_id: host_ride.owner_id.clone(),
        ride_id: host_ride.id,
        rider_ride_id: rider_ride.id,
        rider_origin: rider_ride.origin.clone(),
        rider_destination: rider_ride.destination.clone(),
        host_origin: host_ride.origin.clone(),
        host_destination: host_ride.destination.clone(),
        score: similarity,
        status: MatchStatus::Pending,
        otp_attempts: 0,
        created_at: Utc::now(),
        responded_at: None,
        started_at: None,
        version: 0,
    };

    state
        .store
        .claim_active_match(rider_id, host_ride.id, ride_match.id)?;
    let ride_match = state.store.insert_match(ride_match);
    state.publish(MatchUpdate::from(&ride_match));

    info!(
        match_id = %ride_match.id,
        rider_id = %ride_match.rider_id,
        host_id = %ride_match.host_id,
        score = ride_match.score,
        "host selected"
    );

    Ok(ride_match)
}

pub fn get_match(state: &AppState, session: &Session, match_id: Uuid) -> Result<RideMatch, AppError> {
    let ride_match = load_match(state, match_id)?;
    if !ride_match.involves(session.identity_id()) {
        return Err(AppError::Forbidden(format!("match {match_id} belongs to other identities")));
    }
    Ok(ride_match)
}

pub fn my_matches(state: &AppState, session: &Session) -> Vec<RideMatch> {
    state.store.matches_of(session.identity_id())
}

/// Host accepts or rejects a pending match. Riders cannot decide for themselves.
pub fn respond_to_match(
    state: &AppState,
    session: &Session,
    match_id: Uuid,
    decision: Decision,
) -> Result<RideMatch, AppError> {
    let current = load_match(state, match_id)?;
    ensure_host(&current, session)?;

    let updated = match decision {
        Decision::Accept => accept(state, &current)?,
        Decision::Reject => {
            let rejected = state.store.update_match(current.id, current.version, |m| {
                m.status = transition(m.status, MatchEvent::Reject)?;
                m.responded_at = Some(Utc::now());
                Ok(())
            })?;
            state
                .store
                .release_active_match(&rejected.rider_id, rejected.ride_id, rejected.id);
            rejected
        }
    };

    let label = match decision {
        Decision::Accept => "accept",
        Decision::Reject => "reject",
    };
    state
        .metrics
        .match_decisions_total
        .with_label_values(&[label])
        .inc();
    state.publish(MatchUpdate::from(&updated));

    info!(match_id = %updated.id, status = ?updated.status, "host responded to match");
    Ok(updated)
}

fn accept(state: &AppState, current: &RideMatch) -> Result<RideMatch, AppError> {
    let host_ride = load_ride(state, current.ride_id)?;
    let rider_ride = load_ride(state, current.rider_ride_id)?;

    transition(current.status, MatchEvent::Accept)?;
    transition(host_ride.status, RideEvent::MatchAccepted)?;
    if host_ride.seats_available.unwrap_or(0) == 0 {
        return Err(AppError::Conflict(format!("ride {} has no seats left", host_ride.id)));
    }
    if rider_ride.status != RideStatus::Available {
        return Err(AppError::InvalidTransition(format!(
            "rider ride {} is {:?}; a rider joins one host at a time",
            rider_ride.id, rider_ride.status
        )));
    }

    let accepted = state.store.update_match(current.id, current.version, |m| {
        m.status = transition(m.status, MatchEvent::Accept)?;
        m.responded_at = Some(Utc::now());
        Ok(())
    })?;

    let host_written = state.store.update_ride(host_ride.id, host_ride.version, |ride| {
        let seats = ride.seats_available.unwrap_or(0);
        if seats == 0 {
            return Err(AppError::Conflict(format!("ride {} has no seats left", ride.id)));
        }
        ride.seats_available = Some(seats - 1);
        ride.status = transition(ride.status, RideEvent::MatchAccepted)?;
        Ok(())
    });
    let host_written = match host_written {
        Ok(written) => written,
        Err(err) => {
            state.store.restore_match(current, &accepted);
            return Err(err);
        }
    };

    let rider_written = state.store.update_ride(rider_ride.id, rider_ride.version, |ride| {
        ride.status = transition(ride.status, RideEvent::MatchAccepted)?;
        Ok(())
    });
    if let Err(err) = rider_written {
        state.store.restore_ride(&host_ride, &host_written);
        state.store.restore_match(current, &accepted);
        return Err(err);
    }

    Ok(accepted)
}

/// Host submits the code the rider shows at pickup. On an exact match the
/// match and both rides move to `Started`; otherwise nothing but the attempt
/// counter changes.
///
/// Every submission first reserves an attempt with a conditional write, so
/// parallel guesses race on the match version and at most
/// `otp_max_attempts` codes are ever compared. A correct code gives its
/// reservation back in the same write that starts the match.
pub fn verify_otp_and_start(
    state: &AppState,
    session: &Session,
    match_id: Uuid,
    code: &str,
) -> Result<RideMatch, AppError> {
    let current = load_match(state, match_id)?;
    ensure_host(&current, session)?;
    transition(current.status, MatchEvent::OtpVerified)?;

    let rider = state
        .store
        .identity(&current.rider_id)
        .ok_or(AppError::IdentityMissing)?;

    let host_ride = load_ride(state, current.ride_id)?;
    let rider_ride = load_ride(state, current.rider_ride_id)?;
    transition(host_ride.status, RideEvent::RiderBoarded)?;
    transition(rider_ride.status, RideEvent::RiderBoarded)?;

    let reserved = reserve_attempt(state, &current)?;

    if rider.otp.as_bytes() != code.as_bytes() {
        count_otp(state, "mismatch");
        warn!(match_id = %match_id, attempts = reserved.otp_attempts, "pickup otp mismatch");
        return Err(AppError::OtpMismatch);
    }

    let started_at = Utc::now();
    let started = state.store.update_match(reserved.id, reserved.version, |m| {
        m.status = transition(m.status, MatchEvent::OtpVerified)?;
        m.otp_attempts = m.otp_attempts.saturating_sub(1);
        m.started_at = Some(started_at);
        Ok(())
    })?;

    let board = |ride: &mut Ride| -> Result<(), AppError> {
        ride.status = transition(ride.status, RideEvent::RiderBoarded)?;
        Ok(())
    };

    let host_written = match state.store.update_ride(host_ride.id, host_ride.version, board) {
        Ok(written) => written,
        Err(err) => {
            state.store.restore_match(&current, &started);
            return Err(err);
        }
    };
    if let Err(err) = state.store.update_ride(rider_ride.id, rider_ride.version, board) {
        state.store.restore_ride(&host_ride, &host_written);
        state.store.restore_match(&current, &started);
        return Err(err);
    }

    count_otp(state, "success");
    state.publish(MatchUpdate::from(&started));
    info!(match_id = %started.id, ride_id = %started.ride_id, "ride started");

    Ok(started)
}

/// Counts one attempt against the match unless the limit is already spent.
fn reserve_attempt(state: &AppState, current: &RideMatch) -> Result<RideMatch, AppError> {
    let max_attempts = state.config.otp_max_attempts;

    let reserved = state.store.update_match(current.id, current.version, |m| {
        transition(m.status, MatchEvent::OtpVerified)?;
        if max_attempts > 0 && m.otp_attempts >= max_attempts {
            return Err(AppError::OtpLocked(m.id.to_string()));
        }
        m.otp_attempts = m.otp_attempts.saturating_add(1);
        Ok(())
    });

    if let Err(AppError::OtpLocked(_)) = &reserved {
        count_otp(state, "locked");
    }
    reserved
}

fn count_otp(state: &AppState, outcome: &str) {
    state
        .metrics
        .otp_verifications_total
        .with_label_values(&[outcome])
        .inc();
}

fn load_ride(state: &AppState, ride_id: Uuid) -> Result<Ride, AppError> {
    state
        .store
        .ride(ride_id)
        .ok_or_else(|| AppError::NotFound(format!("ride {ride_id} not found")))
}

fn load_match(state: &AppState, match_id: Uuid) -> Result<RideMatch, AppError> {
    state
        .store
        .ride_match(match_id)
        .ok_or_else(|| AppError::NotFound(format!("match {match_id} not found")))
}

fn ensure_owner(ride: &Ride, session: &Session) -> Result<(), AppError> {
    if ride.owner_id == session.identity_id() {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!("ride {} belongs to another identity", ride.id)))
    }
}

fn ensure_host(ride_match: &RideMatch, session: &Session) -> Result<(), AppError> {
    if ride_match.host_id == session.identity_id() {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "only the host can act on match {}",
            ride_match.id
        )))
    }
}
