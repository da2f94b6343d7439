use serde::{Deserialize, Serialize};

use crate::geo::proximity::{distance_to_route_km, DistanceMode};
use crate::geo::sampler::{normalize, DEFAULT_SAMPLE_POINTS};
use crate::models::route::{GeoPoint, Route};

const POINT_MATCH_WEIGHT: f64 = 0.6;
const DISTANCE_WEIGHT: f64 = 0.2;
const DIRECTION_WEIGHT: f64 = 0.2;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ScoreWeights {
    pub point_match: f64,
    pub distance: f64,
    pub direction: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            point_match: POINT_MATCH_WEIGHT,
            distance: DISTANCE_WEIGHT,
            direction: DIRECTION_WEIGHT,
        }
    }
}

impl ScoreWeights {
    pub fn validate(&self) -> Result<(), String> {
        let all = [self.point_match, self.distance, self.direction];
        if all.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(format!("score weights must be non-negative: {self:?}"));
        }

        let sum: f64 = all.iter().sum();
        if (sum - 1.0).abs() > 1e-6 {
            return Err(format!("score weights must sum to 1, got {sum}"));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoringConfig {
    pub sample_points: usize,
    pub match_radius_km: f64,
    /// Score points lost per km of average offset.
    pub distance_penalty_per_km: f64,
    pub distance_mode: DistanceMode,
    pub weights: ScoreWeights,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            sample_points: DEFAULT_SAMPLE_POINTS,
            match_radius_km: 0.5,
            distance_penalty_per_km: 20.0,
            distance_mode: DistanceMode::default(),
            weights: ScoreWeights::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ScoreBreakdown {
    pub match_ratio: f64,
    pub avg_distance_km: f64,
    pub max_distance_km: f64,
    pub distance_score: f64,
    pub direction_similarity: f64,
}

/// Similarity of `a` to `b` in [0, 100].
///
/// Not exactly symmetric: each point of `a` is measured against `b`, so
/// `score(a, b)` and `score(b, a)` can differ slightly.
pub fn score(a: &Route, b: &Route, config: &ScoringConfig) -> f64 {
    compute_score(a, b, config).0
}

pub fn compute_score(a: &Route, b: &Route, config: &ScoringConfig) -> (f64, ScoreBreakdown) {
    let a = normalize(a, config.sample_points);
    let b = normalize(b, config.sample_points);

    let mut matched = 0usize;
    let mut total_km = 0.0;
    let mut max_km: f64 = 0.0;

    for point in a.points() {
        let nearest_km = distance_to_route_km(point, &b, config.distance_mode);
        total_km += nearest_km;
        max_km = max_km.max(nearest_km);
        if nearest_km <= config.match_radius_km {
            matched += 1;
        }
    }

    let count = a.len() as f64;
    let avg_distance_km = total_km / count;

    let breakdown = ScoreBreakdown {
        match_ratio: matched as f64 / count,
        avg_distance_km,
        max_distance_km: max_km,
        distance_score: (100.0 - avg_distance_km * config.distance_penalty_per_km).max(0.0),
        direction_similarity: direction_similarity(direction(&a), direction(&b)),
    };

    (weighted_score(&breakdown, &config.weights), breakdown)
}

pub fn weighted_score(breakdown: &ScoreBreakdown, weights: &ScoreWeights) -> f64 {
    let score = (breakdown.match_ratio * 100.0 * weights.point_match)
        + (breakdown.distance_score * weights.distance)
        + (breakdown.direction_similarity * 100.0 * weights.direction);

    score.clamp(0.0, 100.0)
}

/// End minus start as a plain lat/lng delta.
fn direction(route: &Route) -> GeoPoint {
    let start = route.start();
    let end = route.end();
    GeoPoint::new(end.lat - start.lat, end.lng - start.lng)
}

/// Cosine similarity mapped onto [0, 1]; zero vectors have no direction.
fn direction_similarity(a: GeoPoint, b: GeoPoint) -> f64 {
    let mag_a = a.lat.hypot(a.lng);
    let mag_b = b.lat.hypot(b.lng);
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    let cos = (a.lat * b.lat + a.lng * b.lng) / (mag_a * mag_b);
    ((cos + 1.0) / 2.0).clamp(0.0, 1.0)
}
