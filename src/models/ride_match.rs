use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::ride::Waypoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum MatchStatus {
    Pending,
    Accepted,
    Rejected,
    Started,
}

impl MatchStatus {
    /// Active matches block a second selection of the same host ride by the same rider.
    pub fn is_active(self) -> bool {
        !matches!(self, MatchStatus::Rejected)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Accept,
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RideMatch {
    pub id: Uuid,
    pub rider_id: String,
    pub host_id: String,
    /// The host ride being joined.
    pub ride_id: Uuid,
    pub rider_ride_id: Uuid,
    pub rider_origin: Waypoint,
    pub rider_destination: Waypoint,
    pub host_origin: Waypoint,
    pub host_destination: Waypoint,
    pub score: f64,
    pub status: MatchStatus,
    pub otp_attempts: u32,
    pub created_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub version: u64,
}

impl RideMatch {
    pub fn involves(&self, identity_id: &str) -> bool {
        self.rider_id == identity_id || self.host_id == identity_id
    }
}

/// Broadcast to subscribers whenever a match is created or changes status.
#[derive(Debug, Clone, Serialize)]
pub struct MatchUpdate {
    pub match_id: Uuid,
    pub ride_id: Uuid,
    pub rider_id: String,
    pub host_id: String,
    pub status: MatchStatus,
    pub at: DateTime<Utc>,
}

impl From<&RideMatch> for MatchUpdate {
    fn from(m: &RideMatch) -> Self {
        Self {
            match_id: m.id,
            ride_id: m.ride_id,
            rider_id: m.rider_id.clone(),
            host_id: m.host_id.clone(),
            status: m.status,
            at: Utc::now(),
        }
    }
}
