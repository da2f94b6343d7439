use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

use crate::config::MapsConfig;
use crate::directions::{coordinate_label, DirectionsProvider, Geocoder};
use crate::error::AppError;
use crate::models::route::GeoPoint;

#[derive(Debug, Deserialize)]
struct DirectionsResponse {
    status: String,
    #[serde(default)]
    routes: Vec<DirectionsRoute>,
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DirectionsRoute {
    overview_polyline: OverviewPolyline,
}

#[derive(Debug, Deserialize)]
struct OverviewPolyline {
    points: String,
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    results: Vec<GeocodeResult>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    formatted_address: String,
}

pub struct GoogleMapsClient {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
}

impl GoogleMapsClient {
    pub fn new(config: &MapsConfig, api_key: String) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|err| AppError::Internal(format!("failed to build http client: {err}")))?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// Transport and decoding failures are reported through `unavailable`, so
    /// each lookup surfaces its own error kind.
    async fn get_json<T>(
        &self,
        path: &str,
        query: &[(&str, String)],
        unavailable: fn(String) -> AppError,
    ) -> Result<T, AppError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let url = format!("{}{}", self.api_base, path);
        let res = self
            .client
            .get(url)
            .query(&[("key", self.api_key.as_str())])
            .query(query)
            .send()
            .await
            .map_err(|err| unavailable(format!("maps request failed: {err}")))?;

        let status_code = res.status();
        if !status_code.is_success() {
            return Err(unavailable(format!("maps provider answered http {status_code}")));
        }

        res.json::<T>()
            .await
            .map_err(|err| unavailable(format!("unreadable maps response: {err}")))
    }
}

#[async_trait]
impl DirectionsProvider for GoogleMapsClient {
    #[tracing::instrument(skip(self))]
    async fn route_polyline(&self, origin: GeoPoint, destination: GeoPoint) -> Result<String, AppError> {
        let data: DirectionsResponse = self
            .get_json(
                "/maps/api/directions/json",
                &[
                    ("origin", coordinate_label(&origin)),
                    ("destination", coordinate_label(&destination)),
                ],
                AppError::RouteUnavailable,
            )
            .await?;

        overview_polyline(data)
    }
}

#[async_trait]
impl Geocoder for GoogleMapsClient {
    #[tracing::instrument(skip(self))]
    async fn reverse_geocode(&self, point: GeoPoint) -> Result<String, AppError> {
        let data: GeocodeResponse = self
            .get_json(
                "/maps/api/geocode/json",
                &[("latlng", coordinate_label(&point))],
                AppError::GeocodeUnavailable,
            )
            .await?;

        first_address(data)
    }
}

fn overview_polyline(data: DirectionsResponse) -> Result<String, AppError> {
    if data.status != "OK" {
        let detail = data.error_message.unwrap_or_default();
        warn!(status = %data.status, detail = %detail, "directions lookup failed");
        return Err(AppError::RouteUnavailable(format!(
            "directions status {}",
            data.status
        )));
    }

    data.routes
        .into_iter()
        .next()
        .map(|route| route.overview_polyline.points)
        .filter(|points| !points.is_empty())
        .ok_or_else(|| AppError::RouteUnavailable("directions returned no route".to_string()))
}

fn first_address(data: GeocodeResponse) -> Result<String, AppError> {
    if data.status != "OK" {
        return Err(AppError::GeocodeUnavailable(format!(
            "geocode status {}",
            data.status
        )));
    }

    data.results
        .into_iter()
        .next()
        .map(|result| result.formatted_address)
        .ok_or_else(|| AppError::GeocodeUnavailable("geocode returned no address".to_string()))
}

#[cfg(test)]
mod tests {
    use super::{first_address, overview_polyline, DirectionsResponse, GeocodeResponse};
    use crate::error::AppError;

    #[test]
    fn extracts_first_route_polyline() {
        let data: DirectionsResponse = serde_json::from_str(
            r#"{
                "status": "OK",
                "routes": [
                    { "overview_polyline": { "points": "_p~iF~ps|U_ulLnnqC" } },
                    { "overview_polyline": { "points": "ignored" } }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(overview_polyline(data).unwrap(), "_p~iF~ps|U_ulLnnqC");
    }

    #[test]
    fn non_ok_status_is_route_unavailable() {
        let data: DirectionsResponse = serde_json::from_str(
            r#"{ "status": "REQUEST_DENIED", "error_message": "bad key", "routes": [] }"#,
        )
        .unwrap();

        let err = overview_polyline(data).unwrap_err();
        assert!(matches!(err, AppError::RouteUnavailable(msg) if msg.contains("REQUEST_DENIED")));
    }

    #[test]
    fn ok_without_routes_is_route_unavailable() {
        let data: DirectionsResponse = serde_json::from_str(r#"{ "status": "OK" }"#).unwrap();
        assert!(matches!(overview_polyline(data), Err(AppError::RouteUnavailable(_))));
    }

    #[test]
    fn geocode_takes_first_formatted_address() {
        let data: GeocodeResponse = serde_json::from_str(
            r#"{ "status": "OK", "results": [ { "formatted_address": "MG Road, Bengaluru" } ] }"#,
        )
        .unwrap();
        assert_eq!(first_address(data).unwrap(), "MG Road, Bengaluru");

        let empty: GeocodeResponse = serde_json::from_str(r#"{ "status": "ZERO_RESULTS" }"#).unwrap();
        assert!(matches!(
            first_address(empty),
            Err(AppError::GeocodeUnavailable(msg)) if msg.contains("ZERO_RESULTS")
        ));

        let no_results: GeocodeResponse = serde_json::from_str(r#"{ "status": "OK", "results": [] }"#).unwrap();
        assert!(matches!(first_address(no_results), Err(AppError::GeocodeUnavailable(_))));
    }
}
