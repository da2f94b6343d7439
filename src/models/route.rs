use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(AppError::BadRequest(format!(
                "coordinate out of range: ({}, {})",
                self.lat, self.lng
            )))
        }
    }
}

/// An ordered path of at least two valid points.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "Vec<GeoPoint>", into = "Vec<GeoPoint>")]
pub struct Route {
    points: Vec<GeoPoint>,
}

impl Route {
    pub fn new(points: Vec<GeoPoint>) -> Result<Self, AppError> {
        if points.len() < 2 {
            return Err(AppError::BadRequest(format!(
                "route needs at least 2 points, got {}",
                points.len()
            )));
        }

        if let Some(bad) = points.iter().find(|p| !p.is_valid()) {
            return Err(AppError::BadRequest(format!(
                "route point out of range: ({}, {})",
                bad.lat, bad.lng
            )));
        }

        Ok(Self { points })
    }

    pub fn points(&self) -> &[GeoPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn start(&self) -> GeoPoint {
        self.points[0]
    }

    pub fn end(&self) -> GeoPoint {
        self.points[self.points.len() - 1]
    }

    pub fn segments(&self) -> impl Iterator<Item = (&GeoPoint, &GeoPoint)> {
        self.points.windows(2).map(|pair| (&pair[0], &pair[1]))
    }

    /// Skips validation; callers guarantee the invariant (derived from an existing route).
    pub(crate) fn from_trusted(points: Vec<GeoPoint>) -> Self {
        debug_assert!(points.len() >= 2);
        Self { points }
    }
}

impl TryFrom<Vec<GeoPoint>> for Route {
    type Error = AppError;

    fn try_from(points: Vec<GeoPoint>) -> Result<Self, Self::Error> {
        Route::new(points)
    }
}

impl From<Route> for Vec<GeoPoint> {
    fn from(route: Route) -> Self {
        route.points
    }
}
