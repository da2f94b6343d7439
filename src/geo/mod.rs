pub mod polyline;
pub mod proximity;
pub mod sampler;

use crate::models::route::GeoPoint;

pub const EARTH_RADIUS_KM: f64 = 6_371.0;

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().min(1.0).asin();

    EARTH_RADIUS_KM * central_angle
}

/// Initial great-circle bearing from `from` to `to`, in radians.
pub fn initial_bearing_rad(from: &GeoPoint, to: &GeoPoint) -> f64 {
    let lat1 = from.lat.to_radians();
    let lat2 = to.lat.to_radians();
    let delta_lng = (to.lng - from.lng).to_radians();

    let y = delta_lng.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * delta_lng.cos();

    y.atan2(x)
}

/// Initial bearing in degrees, normalized to [0, 360).
pub fn initial_bearing_deg(from: &GeoPoint, to: &GeoPoint) -> f64 {
    initial_bearing_rad(from, to).to_degrees().rem_euclid(360.0)
}

#[cfg(test)]
mod tests {
    use super::{haversine_km, initial_bearing_deg};
    use crate::models::route::GeoPoint;

    #[test]
    fn zero_distance_for_same_point() {
        let p = GeoPoint::new(12.9716, 77.5946);
        let distance = haversine_km(&p, &p);
        assert!(distance < 1e-9);
    }

    #[test]
    fn london_to_paris_is_around_343_km() {
        let london = GeoPoint::new(51.5074, -0.1278);
        let paris = GeoPoint::new(48.8566, 2.3522);
        let distance = haversine_km(&london, &paris);
        assert!((distance - 343.0).abs() < 5.0);
    }

    #[test]
    fn hundredth_of_a_degree_latitude_is_about_1_1_km() {
        let a = GeoPoint::new(0.0, 0.0);
        let b = GeoPoint::new(0.01, 0.0);
        assert!((haversine_km(&a, &b) - 1.112).abs() < 0.01);
    }

    #[test]
    fn bearing_points_east_along_equator() {
        let a = GeoPoint::new(0.0, 0.0);
        let b = GeoPoint::new(0.0, 1.0);
        assert!((initial_bearing_deg(&a, &b) - 90.0).abs() < 1e-9);

        let north = GeoPoint::new(1.0, 0.0);
        assert!(initial_bearing_deg(&a, &north).abs() < 1e-9);
    }
}
