use crate::geo::haversine_km;
use crate::models::route::{GeoPoint, Route};

pub const DEFAULT_SAMPLE_POINTS: usize = 50;
pub const DEFAULT_DECLUTTER_KM: f64 = 0.1;

/// Resamples `route` to exactly `n` points by interpolating along point
/// indices. Routes that already have `n` points or fewer come back unchanged.
/// `n` below 2 is treated as 2 so endpoints always survive.
pub fn normalize(route: &Route, n: usize) -> Route {
    let n = n.max(2);
    let points = route.points();
    if points.len() <= n {
        return route.clone();
    }

    let step = (points.len() - 1) as f64 / (n - 1) as f64;
    let last = points.len() - 1;

    let resampled = (0..n)
        .map(|i| {
            let index = i as f64 * step;
            let low = (index.floor() as usize).min(last);
            let high = (low + 1).min(last);
            let fraction = index - low as f64;

            let a = points[low];
            let b = points[high];
            GeoPoint::new(
                a.lat + (b.lat - a.lat) * fraction,
                a.lng + (b.lng - a.lng) * fraction,
            )
        })
        .collect();

    Route::from_trusted(resampled)
}

/// Greedy forward pass that drops points closer than `min_separation_km` to
/// the last kept point. First and last points are always kept.
pub fn declutter(route: &Route, min_separation_km: f64) -> Route {
    let points = route.points();
    if points.len() <= 2 {
        return route.clone();
    }

    let mut kept = Vec::with_capacity(points.len());
    kept.push(points[0]);

    for point in &points[1..points.len() - 1] {
        let last_kept = kept[kept.len() - 1];
        if haversine_km(&last_kept, point) > min_separation_km {
            kept.push(*point);
        }
    }

    kept.push(points[points.len() - 1]);
    Route::from_trusted(kept)
}

#[cfg(test)]
mod tests {
    use super::{declutter, normalize};
    use crate::models::route::{GeoPoint, Route};

    fn straight_route(n: usize) -> Route {
        let points = (0..n)
            .map(|i| GeoPoint::new(12.90, 77.50 + i as f64 * 0.001))
            .collect();
        Route::new(points).unwrap()
    }

    #[test]
    fn short_routes_are_returned_unchanged() {
        let route = straight_route(10);
        assert_eq!(normalize(&route, 50), route);
    }

    #[test]
    fn long_routes_are_resampled_to_exact_count() {
        let route = straight_route(137);
        let normalized = normalize(&route, 50);

        assert_eq!(normalized.len(), 50);
        assert_eq!(normalized.start(), route.start());
        assert!((normalized.end().lng - route.end().lng).abs() < 1e-12);
    }

    #[test]
    fn interpolates_between_neighbours() {
        let route = Route::new(vec![
            GeoPoint::new(0.0, 0.0),
            GeoPoint::new(0.0, 1.0),
            GeoPoint::new(0.0, 2.0),
            GeoPoint::new(0.0, 3.0),
            GeoPoint::new(0.0, 4.0),
        ])
        .unwrap();

        let normalized = normalize(&route, 3);
        let lngs: Vec<f64> = normalized.points().iter().map(|p| p.lng).collect();
        assert_eq!(lngs, vec![0.0, 2.0, 4.0]);

        let normalized = normalize(&route, 4);
        assert!((normalized.points()[1].lng - 4.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn tiny_sample_counts_keep_endpoints() {
        let route = straight_route(20);
        let normalized = normalize(&route, 0);
        assert_eq!(normalized.len(), 2);
        assert_eq!(normalized.start(), route.start());
    }

    #[test]
    fn declutter_drops_points_near_last_kept() {
        let route = Route::new(vec![
            GeoPoint::new(12.9000, 77.5000),
            GeoPoint::new(12.9001, 77.5000),
            GeoPoint::new(12.9002, 77.5000),
            GeoPoint::new(12.9020, 77.5000),
            GeoPoint::new(12.9021, 77.5000),
            GeoPoint::new(12.9022, 77.5000),
        ])
        .unwrap();

        let decluttered = declutter(&route, 0.1);
        let lats: Vec<f64> = decluttered.points().iter().map(|p| p.lat).collect();
        assert_eq!(lats, vec![12.9000, 12.9020, 12.9022]);
    }

    #[test]
    fn declutter_keeps_two_point_routes() {
        let route = Route::new(vec![GeoPoint::new(0.0, 0.0), GeoPoint::new(0.0, 0.0)]).unwrap();
        assert_eq!(declutter(&route, 0.1).len(), 2);
    }
}
