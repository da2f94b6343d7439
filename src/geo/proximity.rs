//! Geofencing primitives: point-to-segment and point-to-route distances, and
//! a cheap bounding box used to discard far-away routes before exact checks.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::geo::{haversine_km, initial_bearing_rad, EARTH_RADIUS_KM};
use crate::models::route::{GeoPoint, Route};

pub const DEFAULT_PROXIMITY_RADIUS_KM: f64 = 0.5;

/// How "distance from a point to a route" is measured. Scoring and proximity
/// filtering always use the same mode.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMode {
    /// Nearest route vertex.
    PointToPoint,
    /// Nearest route segment (cross-track, clamped to the segment).
    #[default]
    PointToSegment,
}

impl FromStr for DistanceMode {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "point_to_point" | "point" => Ok(DistanceMode::PointToPoint),
            "point_to_segment" | "segment" => Ok(DistanceMode::PointToSegment),
            other => Err(format!(
                "unknown distance mode {other:?}, expected point_to_point or point_to_segment"
            )),
        }
    }
}

pub fn point_distance_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    haversine_km(a, b)
}

/// Signed cross-track distance of `point` from the great circle through
/// `start` and `end`, in km.
pub fn cross_track_km(point: &GeoPoint, start: &GeoPoint, end: &GeoPoint) -> f64 {
    let angular_13 = haversine_km(start, point) / EARTH_RADIUS_KM;
    let bearing_13 = initial_bearing_rad(start, point);
    let bearing_12 = initial_bearing_rad(start, end);

    (angular_13.sin() * (bearing_13 - bearing_12).sin())
        .clamp(-1.0, 1.0)
        .asin()
        * EARTH_RADIUS_KM
}

/// Distance from `point` to the segment `start`..`end`.
///
/// Uses the cross-track distance while the along-track projection lies on the
/// segment; outside it, the distance to the nearer endpoint.
pub fn point_to_segment_km(point: &GeoPoint, start: &GeoPoint, end: &GeoPoint) -> f64 {
    let segment_km = haversine_km(start, end);
    let to_start_km = haversine_km(start, point);
    if segment_km < 1e-9 || to_start_km < 1e-9 {
        return to_start_km;
    }

    let angular_13 = to_start_km / EARTH_RADIUS_KM;
    let relative_bearing = initial_bearing_rad(start, point) - initial_bearing_rad(start, end);
    if relative_bearing.cos() < 0.0 {
        return to_start_km;
    }

    let cross_track = (angular_13.sin() * relative_bearing.sin()).clamp(-1.0, 1.0).asin();
    let along_track_km =
        (angular_13.cos() / cross_track.cos()).clamp(-1.0, 1.0).acos() * EARTH_RADIUS_KM;

    if along_track_km > segment_km {
        return haversine_km(end, point);
    }

    (cross_track * EARTH_RADIUS_KM).abs()
}

pub fn point_to_route_km(point: &GeoPoint, route: &Route) -> f64 {
    route
        .segments()
        .map(|(start, end)| point_to_segment_km(point, start, end))
        .fold(f64::INFINITY, f64::min)
}

pub fn nearest_vertex_km(point: &GeoPoint, route: &Route) -> f64 {
    route
        .points()
        .iter()
        .map(|vertex| haversine_km(point, vertex))
        .fold(f64::INFINITY, f64::min)
}

pub fn distance_to_route_km(point: &GeoPoint, route: &Route, mode: DistanceMode) -> f64 {
    match mode {
        DistanceMode::PointToPoint => nearest_vertex_km(point, route),
        DistanceMode::PointToSegment => point_to_route_km(point, route),
    }
}

pub fn within_radius(point: &GeoPoint, route: &Route, radius_km: f64, mode: DistanceMode) -> bool {
    distance_to_route_km(point, route, mode) <= radius_km
}

/// Both ends of the rider's trip must lie near the host route.
pub fn trip_fits_route(
    trip_start: &GeoPoint,
    trip_end: &GeoPoint,
    route: &Route,
    radius_km: f64,
    mode: DistanceMode,
) -> bool {
    within_radius(trip_start, route, radius_km, mode) && within_radius(trip_end, route, radius_km, mode)
}

/// Axis-aligned lat/lng box used as a pre-filter. Route boxes include the
/// poleward bulge of each great-circle segment, and padding converts km to
/// degrees at the box's widest latitude, so everything within the radius of
/// the route in either distance mode falls inside.
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct GeoBounds {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl GeoBounds {
    pub fn around(center: &GeoPoint, radius_km: f64) -> Self {
        let bounds = Self {
            north: center.lat,
            south: center.lat,
            east: center.lng,
            west: center.lng,
        };
        bounds.padded(radius_km)
    }

    pub fn of_route(route: &Route) -> Self {
        let start = route.start();
        route.segments().fold(
            Self {
                north: start.lat,
                south: start.lat,
                east: start.lng,
                west: start.lng,
            },
            |acc, (a, b)| {
                let (south, north) = arc_latitude_range(a, b);
                Self {
                    north: acc.north.max(north),
                    south: acc.south.min(south),
                    east: acc.east.max(a.lng).max(b.lng),
                    west: acc.west.min(a.lng).min(b.lng),
                }
            },
        )
    }

    pub fn padded(&self, radius_km: f64) -> Self {
        let d_lat = (radius_km / EARTH_RADIUS_KM).to_degrees();
        let widest_lat = self.north.abs().max(self.south.abs()).min(89.0);
        let d_lng = d_lat / widest_lat.to_radians().cos();

        Self {
            north: (self.north + d_lat).min(90.0),
            south: (self.south - d_lat).max(-90.0),
            east: (self.east + d_lng).min(180.0),
            west: (self.west - d_lng).max(-180.0),
        }
    }

    pub fn contains(&self, point: &GeoPoint) -> bool {
        (self.south..=self.north).contains(&point.lat) && (self.west..=self.east).contains(&point.lng)
    }
}

/// Latitudes covered by the great-circle arc from `a` to `b`. The arc reaches
/// past both endpoints when the circle's highest (or lowest) point lies on it.
fn arc_latitude_range(a: &GeoPoint, b: &GeoPoint) -> (f64, f64) {
    let mut south = a.lat.min(b.lat);
    let mut north = a.lat.max(b.lat);

    let (va, vb) = (unit_vector(a), unit_vector(b));
    let Some(normal) = normalized(cross(va, vb)) else {
        return (south, north);
    };
    // North pole projected onto the circle's plane.
    let Some(top) = normalized([-normal[2] * normal[0], -normal[2] * normal[1], 1.0 - normal[2] * normal[2]])
    else {
        return (south, north);
    };

    let on_arc = |p: [f64; 3]| dot(cross(va, p), normal) >= 0.0 && dot(cross(p, vb), normal) >= 0.0;
    if on_arc(top) {
        north = north.max(top[2].clamp(-1.0, 1.0).asin().to_degrees());
    }
    let bottom = top.map(|c| -c);
    if on_arc(bottom) {
        south = south.min(bottom[2].clamp(-1.0, 1.0).asin().to_degrees());
    }

    (south, north)
}

fn unit_vector(p: &GeoPoint) -> [f64; 3] {
    let (lat, lng) = (p.lat.to_radians(), p.lng.to_radians());
    [lat.cos() * lng.cos(), lat.cos() * lng.sin(), lat.sin()]
}

fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn normalized(v: [f64; 3]) -> Option<[f64; 3]> {
    let norm = dot(v, v).sqrt();
    (norm > 1e-12).then(|| v.map(|c| c / norm))
}
