pub mod google;

use async_trait::async_trait;

use crate::error::AppError;
use crate::models::route::GeoPoint;

/// Turns an origin/destination pair into an encoded polyline.
#[async_trait]
pub trait DirectionsProvider: Send + Sync {
    async fn route_polyline(&self, origin: GeoPoint, destination: GeoPoint) -> Result<String, AppError>;
}

/// Human-readable address for a coordinate. Display only.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn reverse_geocode(&self, point: GeoPoint) -> Result<String, AppError>;
}

/// Used when no maps key is configured; callers must supply polylines themselves.
pub struct UnconfiguredDirections;

#[async_trait]
impl DirectionsProvider for UnconfiguredDirections {
    async fn route_polyline(&self, _origin: GeoPoint, _destination: GeoPoint) -> Result<String, AppError> {
        Err(AppError::RouteUnavailable(
            "no directions provider configured; send an encoded polyline".to_string(),
        ))
    }
}

pub fn coordinate_label(point: &GeoPoint) -> String {
    format!("{:.5},{:.5}", point.lat, point.lng)
}
