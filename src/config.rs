use std::env;

use crate::engine::matching::{MatchingConfig, DEFAULT_SCAN_LIMIT, DEFAULT_THRESHOLD};
use crate::engine::scoring::{ScoreWeights, ScoringConfig};
use crate::error::AppError;
use crate::geo::proximity::{DistanceMode, DEFAULT_PROXIMITY_RADIUS_KM};
use crate::geo::sampler::{DEFAULT_DECLUTTER_KM, DEFAULT_SAMPLE_POINTS};

#[derive(Debug, Clone, PartialEq)]
pub struct MapsConfig {
    pub api_base: String,
    pub api_key: Option<String>,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub log_format: String,
    pub event_buffer_size: usize,
    pub maps: MapsConfig,
    pub matching: MatchingConfig,
    pub declutter_km: f64,
    /// Wrong pickup codes allowed per match; 0 means unlimited.
    pub otp_max_attempts: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            log_format: "compact".to_string(),
            event_buffer_size: 1024,
            maps: MapsConfig {
                api_base: "https://maps.googleapis.com".to_string(),
                api_key: None,
                timeout_ms: 10_000,
            },
            matching: MatchingConfig::default(),
            declutter_km: DEFAULT_DECLUTTER_KM,
            otp_max_attempts: 5,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let weights = ScoreWeights {
            point_match: parse_or_default("MATCH_WEIGHT_POINTS", 0.6)?,
            distance: parse_or_default("MATCH_WEIGHT_DISTANCE", 0.2)?,
            direction: parse_or_default("MATCH_WEIGHT_DIRECTION", 0.2)?,
        };
        weights.validate().map_err(AppError::Internal)?;

        let scoring = ScoringConfig {
            sample_points: parse_or_default("MATCH_SAMPLE_POINTS", DEFAULT_SAMPLE_POINTS)?,
            match_radius_km: parse_or_default("MATCH_RADIUS_KM", 0.5)?,
            distance_penalty_per_km: parse_or_default("MATCH_DISTANCE_PENALTY_PER_KM", 20.0)?,
            distance_mode: parse_or_default("MATCH_DISTANCE_MODE", DistanceMode::default())?,
            weights,
        };

        let matching = MatchingConfig {
            scoring,
            proximity_radius_km: parse_or_default("PROXIMITY_RADIUS_KM", DEFAULT_PROXIMITY_RADIUS_KM)?,
            threshold: parse_or_default("MATCH_THRESHOLD", DEFAULT_THRESHOLD)?,
            scan_limit: parse_or_default("MATCH_SCAN_LIMIT", DEFAULT_SCAN_LIMIT)?,
        };

        if !(0.0..=100.0).contains(&matching.threshold) {
            return Err(AppError::Internal(format!(
                "invalid MATCH_THRESHOLD: {} is outside [0, 100]",
                matching.threshold
            )));
        }

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_format: env::var("LOG_FORMAT").unwrap_or_else(|_| "compact".to_string()),
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            maps: MapsConfig {
                api_base: env::var("MAPS_API_BASE")
                    .unwrap_or_else(|_| "https://maps.googleapis.com".to_string()),
                api_key: env::var("MAPS_API_KEY").ok().filter(|key| !key.trim().is_empty()),
                timeout_ms: parse_or_default("MAPS_TIMEOUT_MS", 10_000)?,
            },
            matching,
            declutter_km: parse_or_default("ROUTE_DECLUTTER_KM", DEFAULT_DECLUTTER_KM)?,
            otp_max_attempts: parse_or_default("OTP_MAX_ATTEMPTS", 5)?,
        })
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
