//! In-process document store.
//!
//! One map per collection. Each document is updated atomically on its own;
//! nothing spans documents, so callers compose multi-document changes from
//! versioned conditional writes and roll back by hand when a later write fails.

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::warn;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::identity::{Identity, Session};
use crate::models::ride::{Ride, RideKind, RideStatus};
use crate::models::ride_match::RideMatch;

#[derive(Default)]
pub struct RideStore {
    rides: DashMap<Uuid, Ride>,
    rides_by_identity: DashMap<String, Vec<Uuid>>,
    matches: DashMap<Uuid, RideMatch>,
    /// (rider, host ride) -> the one match for that pair that is not rejected.
    active_matches: DashMap<(String, Uuid), Uuid>,
    identities: DashMap<String, Identity>,
}

impl RideStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_identity(&self, identity: Identity) -> Result<Identity, AppError> {
        match self.identities.entry(identity.id.clone()) {
            Entry::Occupied(_) => Err(AppError::Conflict(format!(
                "identity {} is already registered",
                identity.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(identity.clone());
                Ok(identity)
            }
        }
    }

    pub fn identity(&self, id: &str) -> Option<Identity> {
        self.identities.get(id).map(|entry| entry.value().clone())
    }

    /// Resolves a caller-supplied identity id into a session. Unknown or blank
    /// ids mean there is no stable identity to act as.
    pub fn session(&self, identity_id: &str) -> Result<Session, AppError> {
        let identity_id = identity_id.trim();
        if identity_id.is_empty() || !self.identities.contains_key(identity_id) {
            return Err(AppError::IdentityMissing);
        }
        Ok(Session::new(identity_id.to_string()))
    }

    pub fn insert_ride(&self, ride: Ride) -> Ride {
        self.rides_by_identity
            .entry(ride.owner_id.clone())
            .or_default()
            .push(ride.id);
        self.rides.insert(ride.id, ride.clone());
        ride
    }

    pub fn ride(&self, id: Uuid) -> Option<Ride> {
        self.rides.get(&id).map(|entry| entry.value().clone())
    }

    /// Ride history of one identity, newest first.
    pub fn rides_of(&self, owner_id: &str) -> Vec<Ride> {
        let ids = self
            .rides_by_identity
            .get(owner_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();

        let mut rides: Vec<Ride> = ids.into_iter().filter_map(|id| self.ride(id)).collect();
        rides.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rides
    }

    pub fn latest_open_rider_ride(&self, owner_id: &str) -> Option<Ride> {
        self.rides_of(owner_id)
            .into_iter()
            .find(|ride| ride.kind == RideKind::Rider && ride.status == RideStatus::Available)
    }

    /// Point-in-time copy of open host rides accepted by `keep`, oldest first,
    /// at most `limit`. `keep` runs before the cut, so rides it rejects never
    /// use up the limit. Past the limit the newest qualifying hosts are left
    /// out until older ones fill up or close.
    pub fn open_host_rides<F>(&self, limit: usize, keep: F) -> Vec<Ride>
    where
        F: Fn(&Ride) -> bool,
    {
        let mut hosts: Vec<Ride> = self
            .rides
            .iter()
            .filter(|entry| entry.value().is_open_host() && keep(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();

        hosts.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        hosts.truncate(limit);
        hosts
    }

    /// Applies `change` to a copy of the ride and commits it only if the stored
    /// version still equals `expected_version` and `change` succeeds.
    pub fn update_ride<F>(&self, id: Uuid, expected_version: u64, change: F) -> Result<Ride, AppError>
    where
        F: FnOnce(&mut Ride) -> Result<(), AppError>,
    {
        let mut entry = self
            .rides
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("ride {id} not found")))?;

        if entry.version != expected_version {
            return Err(AppError::StoreConflict(format!(
                "ride {id} is at version {}, expected {expected_version}",
                entry.version
            )));
        }

        let mut draft = entry.value().clone();
        change(&mut draft)?;
        draft.version += 1;
        draft.updated_at = Utc::now();

        *entry = draft.clone();
        Ok(draft)
    }

    /// Puts `previous` back if nobody wrote the ride after `written`.
    pub fn restore_ride(&self, previous: &Ride, written: &Ride) {
        match self.rides.get_mut(&previous.id) {
            Some(mut entry) if entry.version == written.version => {
                let mut restored = previous.clone();
                restored.version = written.version + 1;
                restored.updated_at = Utc::now();
                *entry = restored;
            }
            _ => warn!(ride_id = %previous.id, "ride changed concurrently; rollback skipped"),
        }
    }

    pub fn claim_active_match(&self, rider_id: &str, ride_id: Uuid, match_id: Uuid) -> Result<(), AppError> {
        match self.active_matches.entry((rider_id.to_string(), ride_id)) {
            Entry::Occupied(existing) => Err(AppError::Conflict(format!(
                "match {} is already active for this ride",
                existing.get()
            ))),
            Entry::Vacant(slot) => {
                slot.insert(match_id);
                Ok(())
            }
        }
    }

    pub fn release_active_match(&self, rider_id: &str, ride_id: Uuid, match_id: Uuid) {
        self.active_matches
            .remove_if(&(rider_id.to_string(), ride_id), |_, active| *active == match_id);
    }

    pub fn insert_match(&self, ride_match: RideMatch) -> RideMatch {
        self.matches.insert(ride_match.id, ride_match.clone());
        ride_match
    }

    pub fn ride_match(&self, id: Uuid) -> Option<RideMatch> {
        self.matches.get(&id).map(|entry| entry.value().clone())
    }

    /// Matches where the identity is rider or host, newest first.
    pub fn matches_of(&self, identity_id: &str) -> Vec<RideMatch> {
        let mut found: Vec<RideMatch> = self
            .matches
            .iter()
            .filter(|entry| entry.value().involves(identity_id))
            .map(|entry| entry.value().clone())
            .collect();

        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        found
    }

    /// Matches on a ride, whether it is the host ride or the rider's request.
    pub fn matches_for_ride(&self, ride_id: Uuid) -> Vec<RideMatch> {
        self.matches
            .iter()
            .filter(|entry| entry.value().ride_id == ride_id || entry.value().rider_ride_id == ride_id)
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn update_match<F>(&self, id: Uuid, expected_version: u64, change: F) -> Result<RideMatch, AppError>
    where
        F: FnOnce(&mut RideMatch) -> Result<(), AppError>,
    {
        let mut entry = self
            .matches
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("match {id} not found")))?;

        if entry.version != expected_version {
            return Err(AppError::StoreConflict(format!(
                "match {id} is at version {}, expected {expected_version}",
                entry.version
            )));
        }

        let mut draft = entry.value().clone();
        change(&mut draft)?;
        draft.version += 1;

        *entry = draft.clone();
        Ok(draft)
    }

    pub fn restore_match(&self, previous: &RideMatch, written: &RideMatch) {
        match self.matches.get_mut(&previous.id) {
            Some(mut entry) if entry.version == written.version => {
                let mut restored = previous.clone();
                restored.version = written.version + 1;
                *entry = restored;
            }
            _ => warn!(match_id = %previous.id, "match changed concurrently; rollback skipped"),
        }
    }

    pub fn ride_count(&self) -> usize {
        self.rides.len()
    }

    pub fn match_count(&self) -> usize {
        self.matches.len()
    }

    pub fn identity_count(&self) -> usize {
        self.identities.len()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use super::RideStore;
    use crate::error::AppError;
    use crate::models::identity::Identity;
    use crate::models::ride::{Ride, RideKind, RideStatus, Waypoint};
    use crate::models::route::{GeoPoint, Route};

    fn identity(id: &str) -> Identity {
        Identity {
            id: id.to_string(),
            otp: "123456".to_string(),
            verified: false,
            display_name: None,
            created_at: Utc::now(),
        }
    }

    fn ride(owner: &str, kind: RideKind, age_minutes: i64) -> Ride {
        let at = Utc::now() - Duration::minutes(age_minutes);
        let route = Route::new(vec![GeoPoint::new(12.90, 77.50), GeoPoint::new(12.95, 77.60)]).unwrap();
        let waypoint = |p: GeoPoint| Waypoint {
            location: p,
            address: "somewhere".to_string(),
            timestamp: at,
        };

        Ride {
            id: Uuid::now_v7(),
            owner_id: owner.to_string(),
            kind,
            origin: waypoint(route.start()),
            destination: waypoint(route.end()),
            route,
            seats_available: (kind == RideKind::Host).then_some(1),
            price_per_seat: None,
            status: RideStatus::Available,
            created_at: at,
            updated_at: at,
            version: 0,
        }
    }

    #[test]
    fn duplicate_identity_is_rejected() {
        let store = RideStore::new();
        store.register_identity(identity("+911234567890")).unwrap();

        let err = store.register_identity(identity("+911234567890")).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn session_requires_registered_identity() {
        let store = RideStore::new();
        assert!(matches!(store.session("  "), Err(AppError::IdentityMissing)));
        assert!(matches!(store.session("ghost"), Err(AppError::IdentityMissing)));

        store.register_identity(identity("alice")).unwrap();
        assert_eq!(store.session(" alice ").unwrap().identity_id(), "alice");
    }

    #[test]
    fn stale_version_is_a_store_conflict() {
        let store = RideStore::new();
        let stored = store.insert_ride(ride("alice", RideKind::Host, 0));

        let updated = store
            .update_ride(stored.id, 0, |r| {
                r.status = RideStatus::Matched;
                Ok(())
            })
            .unwrap();
        assert_eq!(updated.version, 1);

        let err = store
            .update_ride(stored.id, 0, |r| {
                r.status = RideStatus::Cancelled;
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, AppError::StoreConflict(_)));
        assert_eq!(store.ride(stored.id).unwrap().status, RideStatus::Matched);
    }

    #[test]
    fn failed_change_leaves_document_untouched() {
        let store = RideStore::new();
        let stored = store.insert_ride(ride("alice", RideKind::Host, 0));

        let result = store.update_ride(stored.id, 0, |r| {
            r.seats_available = Some(0);
            Err(AppError::Conflict("nope".into()))
        });

        assert!(result.is_err());
        let current = store.ride(stored.id).unwrap();
        assert_eq!(current.seats_available, Some(1));
        assert_eq!(current.version, 0);
    }

    #[test]
    fn restore_puts_previous_state_back() {
        let store = RideStore::new();
        let before = store.insert_ride(ride("alice", RideKind::Host, 0));
        let written = store
            .update_ride(before.id, 0, |r| {
                r.status = RideStatus::Matched;
                Ok(())
            })
            .unwrap();

        store.restore_ride(&before, &written);

        let current = store.ride(before.id).unwrap();
        assert_eq!(current.status, RideStatus::Available);
        assert_eq!(current.version, 2);
    }

    #[test]
    fn active_match_claim_is_exclusive_until_released() {
        let store = RideStore::new();
        let ride_id = Uuid::now_v7();
        let first = Uuid::now_v7();
        let second = Uuid::now_v7();

        store.claim_active_match("rider", ride_id, first).unwrap();
        assert!(store.claim_active_match("rider", ride_id, second).is_err());
        assert!(store.claim_active_match("other-rider", ride_id, second).is_ok());

        store.release_active_match("rider", ride_id, second);
        assert!(store.claim_active_match("rider", ride_id, second).is_err());

        store.release_active_match("rider", ride_id, first);
        assert!(store.claim_active_match("rider", ride_id, second).is_ok());
    }

    #[test]
    fn history_and_open_hosts_are_ordered() {
        let store = RideStore::new();
        let old_host = store.insert_ride(ride("alice", RideKind::Host, 20));
        let new_host = store.insert_ride(ride("bob", RideKind::Host, 5));
        let request = store.insert_ride(ride("alice", RideKind::Rider, 1));

        let history: Vec<Uuid> = store.rides_of("alice").iter().map(|r| r.id).collect();
        assert_eq!(history, vec![request.id, old_host.id]);

        let hosts: Vec<Uuid> = store.open_host_rides(10, |_| true).iter().map(|r| r.id).collect();
        assert_eq!(hosts, vec![old_host.id, new_host.id]);
        assert_eq!(store.open_host_rides(1, |_| true)[0].id, old_host.id);

        assert_eq!(store.latest_open_rider_ride("alice").unwrap().id, request.id);
        assert!(store.latest_open_rider_ride("bob").is_none());
    }

    #[test]
    fn host_limit_applies_after_filtering() {
        let store = RideStore::new();
        let skipped = store.insert_ride(ride("alice", RideKind::Host, 30));
        let wanted = store.insert_ride(ride("bob", RideKind::Host, 10));
        let newest = store.insert_ride(ride("carol", RideKind::Host, 1));

        let hosts = store.open_host_rides(1, |r| r.id != skipped.id);
        assert_eq!(hosts.len(), 1);
        assert_eq!(hosts[0].id, wanted.id);

        let hosts: Vec<Uuid> = store
            .open_host_rides(5, |r| r.id != skipped.id)
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(hosts, vec![wanted.id, newest.id]);
    }
}
