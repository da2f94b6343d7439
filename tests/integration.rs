use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use ridepool::api::rest::router;
use ridepool::config::Config;
use ridepool::directions::DirectionsProvider;
use ridepool::error::AppError;
use ridepool::geo::polyline;
use ridepool::models::route::GeoPoint;
use ridepool::state::AppState;
use serde_json::{json, Value};
use tower::ServiceExt;

/// Answers every directions request with a straight line between the ends.
struct StraightLineDirections;

#[async_trait]
impl DirectionsProvider for StraightLineDirections {
    async fn route_polyline(&self, origin: GeoPoint, destination: GeoPoint) -> Result<String, AppError> {
        Ok(polyline::encode(&line(origin, destination, 10)))
    }
}

fn setup() -> Router {
    let state = AppState::new(Config::default(), Arc::new(StraightLineDirections), None);
    router(Arc::new(state))
}

fn line(from: GeoPoint, to: GeoPoint, n: usize) -> Vec<GeoPoint> {
    (0..n)
        .map(|i| {
            let t = i as f64 / (n - 1) as f64;
            GeoPoint::new(from.lat + (to.lat - from.lat) * t, from.lng + (to.lng - from.lng) * t)
        })
        .collect()
}

fn commute_polyline() -> String {
    polyline::encode(&line(GeoPoint::new(12.90, 77.50), GeoPoint::new(12.95, 77.60), 50))
}

fn json_request(method: &str, uri: &str, identity: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(identity) = identity {
        builder = builder.header("x-identity-id", identity);
    }
    builder
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn get_request(uri: &str, identity: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(identity) = identity {
        builder = builder.header("x-identity-id", identity);
    }
    builder.body(Body::empty()).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Registers the identity and returns its pickup OTP.
async fn register(app: &Router, id: &str) -> String {
    let response = app
        .clone()
        .oneshot(json_request("POST", "/identities", None, json!({ "id": id })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = body_json(response).await;
    body["otp"].as_str().unwrap().to_string()
}

async fn post_ride(app: &Router, owner: &str, body: Value) -> Value {
    let response = app
        .clone()
        .oneshot(json_request("POST", "/rides", Some(owner), body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await
}

fn host_body(polyline: &str) -> Value {
    json!({
        "kind": "Host",
        "origin": { "location": { "lat": 12.90, "lng": 77.50 }, "address": "Koramangala" },
        "destination": { "location": { "lat": 12.95, "lng": 77.60 }, "address": "Indiranagar" },
        "seats_available": 3,
        "price_per_seat": 60.0,
        "polyline": polyline
    })
}

fn rider_body(polyline: &str) -> Value {
    json!({
        "kind": "Rider",
        "origin": { "location": { "lat": 12.90, "lng": 77.50 } },
        "destination": { "location": { "lat": 12.95, "lng": 77.60 } },
        "polyline": polyline
    })
}

#[tokio::test]
async fn health_returns_ok() {
    let app = setup();
    let response = app.oneshot(get_request("/health", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["identities"], 0);
    assert_eq!(body["rides"], 0);
    assert_eq!(body["matches"], 0);
}

#[tokio::test]
async fn metrics_returns_prometheus_format() {
    let app = setup();
    register(&app, "alice").await;
    post_ride(&app, "alice", host_body(&commute_polyline())).await;

    let response = app.oneshot(get_request("/metrics", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.contains("text/plain"));

    let body = body_string(response).await;
    assert!(body.contains("rides_created_total"));
}

#[tokio::test]
async fn registering_twice_returns_409() {
    let app = setup();
    register(&app, "+911234567890").await;

    let response = app
        .clone()
        .oneshot(json_request("POST", "/identities", None, json!({ "id": "+911234567890" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn me_returns_unverified_identity() {
    let app = setup();
    let otp = register(&app, "alice").await;

    let response = app
        .oneshot(get_request("/identities/me", Some("alice")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["id"], "alice");
    assert_eq!(body["verified"], false);
    assert_eq!(body["otp"], otp.as_str());
}

#[tokio::test]
async fn missing_or_unknown_identity_returns_401() {
    let app = setup();

    let response = app
        .clone()
        .oneshot(json_request("POST", "/rides", None, rider_body(&commute_polyline())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(get_request("/rides", Some("stranger")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["retryable"], false);
}

#[tokio::test]
async fn malformed_polyline_returns_422() {
    let app = setup();
    register(&app, "alice").await;

    let response = app
        .oneshot(json_request("POST", "/rides", Some("alice"), rider_body("_p~iF~ps|")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn ride_without_polyline_uses_directions_provider() {
    let app = setup();
    register(&app, "alice").await;

    let mut body = host_body("");
    body.as_object_mut().unwrap().remove("polyline");
    let ride = post_ride(&app, "alice", body).await;

    assert_eq!(ride["status"], "Available");
    assert_eq!(ride["route"].as_array().unwrap().len(), 10);
    assert_eq!(ride["origin"]["address"], "Koramangala");
}

#[tokio::test]
async fn identical_host_ranks_first_with_full_score() {
    let app = setup();
    register(&app, "host-same").await;
    register(&app, "host-far").await;
    register(&app, "rider").await;

    let same = post_ride(&app, "host-same", host_body(&commute_polyline())).await;
    let far_route = polyline::encode(&line(GeoPoint::new(13.20, 77.80), GeoPoint::new(13.30, 77.90), 50));
    post_ride(&app, "host-far", host_body(&far_route)).await;
    let request = post_ride(&app, "rider", rider_body(&commute_polyline())).await;

    let uri = format!("/rides/{}/matches", request["id"].as_str().unwrap());
    let response = app.oneshot(get_request(&uri, Some("rider"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let candidates = body_json(response).await;
    let candidates = candidates.as_array().unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0]["ride_id"], same["id"]);
    assert!((candidates[0]["score"].as_f64().unwrap() - 100.0).abs() < 1e-6);
}

#[tokio::test]
async fn no_candidates_is_an_empty_list() {
    let app = setup();
    register(&app, "rider").await;
    let request = post_ride(&app, "rider", rider_body(&commute_polyline())).await;

    let uri = format!("/rides/{}/matches?threshold=10", request["id"].as_str().unwrap());
    let response = app.oneshot(get_request(&uri, Some("rider"))).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!([]));
}

#[tokio::test]
async fn nearby_hosts_lists_rides_starting_close_by() {
    let app = setup();
    register(&app, "alice").await;
    register(&app, "bob").await;
    let host = post_ride(&app, "alice", host_body(&commute_polyline())).await;

    let response = app
        .clone()
        .oneshot(get_request("/hosts/nearby?lat=12.901&lng=77.501", Some("bob")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["ride"]["id"], host["id"]);

    let response = app
        .oneshot(get_request("/hosts/nearby?lat=13.5&lng=78.0", Some("bob")))
        .await
        .unwrap();
    assert_eq!(body_json(response).await, json!([]));
}

#[tokio::test]
async fn match_lifecycle_end_to_end() {
    let app = setup();
    register(&app, "alice").await;
    let bob_otp = register(&app, "bob").await;

    let host = post_ride(&app, "alice", host_body(&commute_polyline())).await;
    let request = post_ride(&app, "bob", rider_body(&commute_polyline())).await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/matches",
            Some("bob"),
            json!({ "host_ride_id": host["id"] }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let pending = body_json(response).await;
    assert_eq!(pending["status"], "Pending");
    assert_eq!(pending["rider_ride_id"], request["id"]);
    let match_id = pending["id"].as_str().unwrap().to_string();

    let start_uri = format!("/matches/{match_id}/start");
    let response = app
        .clone()
        .oneshot(json_request("POST", &start_uri, Some("alice"), json!({ "otp": bob_otp })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/matches/{match_id}/respond"),
            Some("bob"),
            json!({ "decision": "accept" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/matches/{match_id}/respond"),
            Some("alice"),
            json!({ "decision": "accept" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "Accepted");

    let wrong = if bob_otp == "000000" { "111111" } else { "000000" };
    let response = app
        .clone()
        .oneshot(json_request("POST", &start_uri, Some("alice"), json!({ "otp": wrong })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["retryable"], true);

    let response = app
        .clone()
        .oneshot(get_request(&format!("/matches/{match_id}"), Some("bob")))
        .await
        .unwrap();
    let current = body_json(response).await;
    assert_eq!(current["status"], "Accepted");
    assert_eq!(current["otp_attempts"], 1);

    let response = app
        .clone()
        .oneshot(json_request("POST", &start_uri, Some("alice"), json!({ "otp": bob_otp })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "Started");

    let response = app
        .clone()
        .oneshot(get_request(&format!("/rides/{}", host["id"].as_str().unwrap()), Some("alice")))
        .await
        .unwrap();
    let host_now = body_json(response).await;
    assert_eq!(host_now["status"], "Started");
    assert_eq!(host_now["seats_available"], 2);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/rides/{}/complete", host["id"].as_str().unwrap()),
            Some("alice"),
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "Completed");

    let response = app
        .oneshot(get_request("/matches", Some("alice")))
        .await
        .unwrap();
    assert_eq!(body_json(response).await.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn strangers_cannot_read_a_match() {
    let app = setup();
    register(&app, "alice").await;
    register(&app, "bob").await;
    register(&app, "eve").await;

    let host = post_ride(&app, "alice", host_body(&commute_polyline())).await;
    post_ride(&app, "bob", rider_body(&commute_polyline())).await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/matches",
            Some("bob"),
            json!({ "host_ride_id": host["id"] }),
        ))
        .await
        .unwrap();
    let match_id = body_json(response).await["id"].as_str().unwrap().to_string();

    let response = app
        .oneshot(get_request(&format!("/matches/{match_id}"), Some("eve")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
