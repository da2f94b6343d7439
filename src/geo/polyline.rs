//! Encoded polyline codec (the directions-provider "overview polyline" format).
//!
//! Each coordinate is stored as a delta from the previous one, scaled by 1e5,
//! zig-zag signed and split into 5-bit groups. Every group is offset by 63 to
//! land in printable ASCII; groups with 0x20 set continue into the next byte.

use crate::error::AppError;
use crate::models::route::{GeoPoint, Route};

const PRECISION: f64 = 1e5;
const CHAR_OFFSET: u8 = 63;
const CONTINUATION: i64 = 0x20;
const GROUP_MASK: i64 = 0x1f;
const MAX_SHIFT: u32 = 35;

/// Decodes a polyline into a route. A polyline that decodes to fewer than two
/// points is rejected as malformed because it cannot describe a route.
pub fn decode(encoded: &str) -> Result<Route, AppError> {
    let points = decode_points(encoded)?;
    if points.len() < 2 {
        return Err(AppError::MalformedPolyline(format!(
            "decoded {} point(s), a route needs at least 2",
            points.len()
        )));
    }

    Ok(Route::from_trusted(points))
}

pub fn decode_points(encoded: &str) -> Result<Vec<GeoPoint>, AppError> {
    let bytes = encoded.as_bytes();
    let mut index = 0;
    let mut lat: i64 = 0;
    let mut lng: i64 = 0;
    let mut points = Vec::with_capacity(bytes.len() / 4);

    while index < bytes.len() {
        lat = accumulate(lat, next_value(bytes, &mut index)?)?;

        if index >= bytes.len() {
            return Err(AppError::MalformedPolyline(format!(
                "latitude ending at byte {index} has no longitude"
            )));
        }
        lng = accumulate(lng, next_value(bytes, &mut index)?)?;

        let point = GeoPoint::new(lat as f64 / PRECISION, lng as f64 / PRECISION);
        if !point.is_valid() {
            return Err(AppError::MalformedPolyline(format!(
                "decoded coordinate out of range: ({}, {})",
                point.lat, point.lng
            )));
        }
        points.push(point);
    }

    Ok(points)
}

pub fn encode(points: &[GeoPoint]) -> String {
    let mut out = String::with_capacity(points.len() * 8);
    let mut prev_lat: i64 = 0;
    let mut prev_lng: i64 = 0;

    for point in points {
        let lat = (point.lat * PRECISION).round() as i64;
        let lng = (point.lng * PRECISION).round() as i64;

        encode_value(lat - prev_lat, &mut out);
        encode_value(lng - prev_lng, &mut out);

        prev_lat = lat;
        prev_lng = lng;
    }

    out
}

fn next_value(bytes: &[u8], index: &mut usize) -> Result<i64, AppError> {
    let mut result: i64 = 0;
    let mut shift: u32 = 0;

    loop {
        let byte = *bytes.get(*index).ok_or_else(|| {
            AppError::MalformedPolyline(format!("input ends mid-group at byte {index}"))
        })?;

        if !(CHAR_OFFSET..=126).contains(&byte) {
            return Err(AppError::MalformedPolyline(format!(
                "invalid character {:?} at byte {index}",
                byte as char
            )));
        }
        if shift >= MAX_SHIFT {
            return Err(AppError::MalformedPolyline(format!(
                "value starting before byte {index} is too long"
            )));
        }

        *index += 1;
        let chunk = i64::from(byte - CHAR_OFFSET);
        result |= (chunk & GROUP_MASK) << shift;
        shift += 5;

        if chunk & CONTINUATION == 0 {
            break;
        }
    }

    if result & 1 == 1 {
        Ok(!(result >> 1))
    } else {
        Ok(result >> 1)
    }
}

fn accumulate(total: i64, delta: i64) -> Result<i64, AppError> {
    total
        .checked_add(delta)
        .ok_or_else(|| AppError::MalformedPolyline("coordinate overflow".to_string()))
}

fn encode_value(delta: i64, out: &mut String) {
    let zigzag = if delta < 0 { !(delta << 1) } else { delta << 1 };
    let mut value = zigzag as u64;

    while value >= CONTINUATION as u64 {
        let group = (value & GROUP_MASK as u64) as u8 | CONTINUATION as u8;
        out.push((group + CHAR_OFFSET) as char);
        value >>= 5;
    }
    out.push((value as u8 + CHAR_OFFSET) as char);
}
