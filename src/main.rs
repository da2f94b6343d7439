use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use ridepool::api;
use ridepool::config::Config;
use ridepool::directions::google::GoogleMapsClient;
use ridepool::directions::{DirectionsProvider, Geocoder, UnconfiguredDirections};
use ridepool::error::AppError;
use ridepool::state::AppState;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false);
    if config.log_format == "json" {
        subscriber.json().init();
    } else {
        subscriber.compact().init();
    }

    let (directions, geocoder): (Arc<dyn DirectionsProvider>, Option<Arc<dyn Geocoder>>) =
        match config.maps.api_key.clone() {
            Some(api_key) => {
                let client = Arc::new(GoogleMapsClient::new(&config.maps, api_key)?);
                tracing::info!(api_base = %config.maps.api_base, "maps provider configured");
                (client.clone(), Some(client))
            }
            None => {
                tracing::warn!("MAPS_API_KEY not set; rides must be created with an encoded polyline");
                (Arc::new(UnconfiguredDirections), None)
            }
        };

    let http_port = config.http_port;
    let shared_state = Arc::new(AppState::new(config, directions, geocoder));
    let app = api::rest::router(shared_state);

    let bind_addr = format!("0.0.0.0:{http_port}");
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(http_port, "http server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
