use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::route::{GeoPoint, Route};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RideKind {
    Host,
    Rider,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum RideStatus {
    Available,
    Matched,
    Started,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Waypoint {
    pub location: GeoPoint,
    pub address: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ride {
    pub id: Uuid,
    pub owner_id: String,
    pub kind: RideKind,
    pub origin: Waypoint,
    pub destination: Waypoint,
    pub route: Route,
    pub seats_available: Option<u32>,
    pub price_per_seat: Option<f64>,
    pub status: RideStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl Ride {
    pub fn is_open_host(&self) -> bool {
        self.kind == RideKind::Host
            && self.status == RideStatus::Available
            && self.seats_available.unwrap_or(0) > 0
    }
}
