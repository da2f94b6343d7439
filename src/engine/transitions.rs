//! The single place where legal status changes for rides and matches live.

use std::fmt::Debug;

use crate::error::AppError;
use crate::models::ride::RideStatus;
use crate::models::ride_match::MatchStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RideEvent {
    MatchAccepted,
    /// An accepted rider left before boarding and no other rider holds the ride.
    RiderWithdrew,
    RiderBoarded,
    Complete,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchEvent {
    Accept,
    Reject,
    OtpVerified,
    /// One of the two rides was cancelled before pickup.
    RideCancelled,
}

/// Pooled host rides may take further riders while seats remain, so
/// `Matched` and `Started` accept repeated accept/board events.
const RIDE_TRANSITIONS: &[(RideStatus, RideEvent, RideStatus)] = &[
    (RideStatus::Available, RideEvent::MatchAccepted, RideStatus::Matched),
    (RideStatus::Matched, RideEvent::MatchAccepted, RideStatus::Matched),
    (RideStatus::Matched, RideEvent::RiderWithdrew, RideStatus::Available),
    (RideStatus::Matched, RideEvent::RiderBoarded, RideStatus::Started),
    (RideStatus::Started, RideEvent::RiderBoarded, RideStatus::Started),
    (RideStatus::Started, RideEvent::Complete, RideStatus::Completed),
    (RideStatus::Available, RideEvent::Cancel, RideStatus::Cancelled),
    (RideStatus::Matched, RideEvent::Cancel, RideStatus::Cancelled),
    (RideStatus::Started, RideEvent::Cancel, RideStatus::Cancelled),
];

const MATCH_TRANSITIONS: &[(MatchStatus, MatchEvent, MatchStatus)] = &[
    (MatchStatus::Pending, MatchEvent::Accept, MatchStatus::Accepted),
    (MatchStatus::Pending, MatchEvent::Reject, MatchStatus::Rejected),
    (MatchStatus::Accepted, MatchEvent::OtpVerified, MatchStatus::Started),
    (MatchStatus::Pending, MatchEvent::RideCancelled, MatchStatus::Rejected),
    (MatchStatus::Accepted, MatchEvent::RideCancelled, MatchStatus::Rejected),
];

pub trait StateMachine: Copy + Debug + PartialEq + 'static {
    type Event: Copy + Debug + PartialEq + 'static;

    const ENTITY: &'static str;

    fn table() -> &'static [(Self, Self::Event, Self)];

    fn next(self, event: Self::Event) -> Option<Self> {
        Self::table()
            .iter()
            .find(|(from, on, _)| *from == self && *on == event)
            .map(|(_, _, to)| *to)
    }
}

impl StateMachine for RideStatus {
    type Event = RideEvent;

    const ENTITY: &'static str = "ride";

    fn table() -> &'static [(Self, Self::Event, Self)] {
        RIDE_TRANSITIONS
    }
}

impl StateMachine for MatchStatus {
    type Event = MatchEvent;

    const ENTITY: &'static str = "match";

    fn table() -> &'static [(Self, Self::Event, Self)] {
        MATCH_TRANSITIONS
    }
}

pub fn transition<S: StateMachine>(from: S, event: S::Event) -> Result<S, AppError> {
    from.next(event).ok_or_else(|| {
        AppError::InvalidTransition(format!("{} cannot handle {event:?} while {from:?}", S::ENTITY))
    })
}
