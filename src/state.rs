use std::sync::Arc;

use tokio::sync::broadcast;

use crate::config::Config;
use crate::directions::{DirectionsProvider, Geocoder};
use crate::models::ride_match::MatchUpdate;
use crate::observability::metrics::Metrics;
use crate::store::RideStore;

pub struct AppState {
    pub config: Config,
    pub store: RideStore,
    pub match_events_tx: broadcast::Sender<MatchUpdate>,
    pub directions: Arc<dyn DirectionsProvider>,
    pub geocoder: Option<Arc<dyn Geocoder>>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(
        config: Config,
        directions: Arc<dyn DirectionsProvider>,
        geocoder: Option<Arc<dyn Geocoder>>,
    ) -> Self {
        let (match_events_tx, _unused_rx) = broadcast::channel(config.event_buffer_size.max(1));

        Self {
            config,
            store: RideStore::new(),
            match_events_tx,
            directions,
            geocoder,
            metrics: Metrics::new(),
        }
    }

    pub fn publish(&self, update: MatchUpdate) {
        // No subscribers is fine; events are best-effort notifications.
        let _ = self.match_events_tx.send(update);
    }
}
