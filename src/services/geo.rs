//! Great-circle distance helpers for the "near" query

use crate::db::repositories::BoundingBox;

/// Earth radius in meters
pub const EARTH_RADIUS_M: f64 = 6_378_100.0;

/// Meters per degree of latitude
const METERS_PER_DEGREE: f64 = 111_320.0;

/// Haversine distance in meters between two `(lng, lat)` points
pub fn haversine_distance(from: (f64, f64), to: (f64, f64)) -> f64 {
    let (lng1, lat1) = (from.0.to_radians(), from.1.to_radians());
    let (lng2, lat2) = (to.0.to_radians(), to.1.to_radians());

    let dlat = lat2 - lat1;
    let dlng = lng2 - lng1;
    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().min(1.0).asin();

    EARTH_RADIUS_M * c
}

/// A box guaranteed to contain every point within `radius_m` of `center`.
///
/// Longitude is left unbounded near the poles and when the box would
/// cross the antimeridian.
pub fn bounding_box(center: (f64, f64), radius_m: f64) -> BoundingBox {
    let (lng, lat) = center;
    // the degree length uses a smaller radius than EARTH_RADIUS_M; pad it
    let dlat = radius_m / METERS_PER_DEGREE * 1.01;
    let min_lat = (lat - dlat).max(-90.0);
    let max_lat = (lat + dlat).min(90.0);

    let cos_lat = min_lat.to_radians().cos().min(max_lat.to_radians().cos());
    let lng_range = if cos_lat <= f64::EPSILON {
        None
    } else {
        let dlng = dlat / cos_lat;
        let (min_lng, max_lng) = (lng - dlng, lng + dlng);
        if min_lng < -180.0 || max_lng > 180.0 {
            None
        } else {
            Some((min_lng, max_lng))
        }
    };

    BoundingBox {
        min_lat,
        max_lat,
        lng: lng_range,
    }
}

/// Whether `(lng, lat)` lies inside the WGS84 ranges
pub fn valid_coordinates(lng: f64, lat: f64) -> bool {
    lng.is_finite() && lat.is_finite() && (-180.0..=180.0).contains(&lng) && (-90.0..=90.0).contains(&lat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_haversine_known_distance() {
        // Toronto to Montreal, roughly 504 km
        let toronto = (-79.3832, 43.6532);
        let montreal = (-73.5673, 45.5017);
        let d = haversine_distance(toronto, montreal);
        assert!((495_000.0..515_000.0).contains(&d), "distance was {}", d);
    }

    #[test]
    fn test_haversine_zero() {
        assert_eq!(haversine_distance((10.0, 10.0), (10.0, 10.0)), 0.0);
    }

    #[test]
    fn test_bounding_box_near_antimeridian() {
        let bbox = bounding_box((179.99, 0.0), 10_000.0);
        assert!(bbox.lng.is_none());
    }

    #[test]
    fn test_bounding_box_at_pole() {
        let bbox = bounding_box((0.0, 90.0), 10_000.0);
        assert_eq!(bbox.max_lat, 90.0);
        assert!(bbox.lng.is_none());
    }

    #[test]
    fn test_valid_coordinates() {
        assert!(valid_coordinates(-180.0, 90.0));
        assert!(!valid_coordinates(-180.1, 0.0));
        assert!(!valid_coordinates(0.0, f64::INFINITY));
        assert!(!valid_coordinates(f64::NAN, 0.0));
        assert!(!valid_coordinates(0.0, 90.5));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(20))]

        #[test]
        fn haversine_is_symmetric(
            lng1 in -180.0..180.0f64, lat1 in -90.0..90.0f64,
            lng2 in -180.0..180.0f64, lat2 in -90.0..90.0f64,
        ) {
            let a = haversine_distance((lng1, lat1), (lng2, lat2));
            let b = haversine_distance((lng2, lat2), (lng1, lat1));
            prop_assert!((a - b).abs() < 1e-6);
            prop_assert!(a >= 0.0);
            prop_assert!(a <= std::f64::consts::PI * EARTH_RADIUS_M + 1.0);
        }

        #[test]
        fn bounding_box_contains_points_within_radius(
            lng in -170.0..170.0f64, lat in -80.0..80.0f64,
            bearing in 0.0..360.0f64, fraction in 0.0..1.0f64,
        ) {
            let radius = 10_000.0;
            // walk `fraction * radius` meters from the center along `bearing`
            let dist = fraction * radius / EARTH_RADIUS_M;
            let (lat_r, lng_r, b) = (lat.to_radians(), lng.to_radians(), bearing.to_radians());
            let lat2 = (lat_r.sin() * dist.cos() + lat_r.cos() * dist.sin() * b.cos()).asin();
            let lng2 = lng_r + (b.sin() * dist.sin() * lat_r.cos()).atan2(dist.cos() - lat_r.sin() * lat2.sin());
            let point = (lng2.to_degrees(), lat2.to_degrees());

            let bbox = bounding_box((lng, lat), radius);
            prop_assert!(point.1 >= bbox.min_lat && point.1 <= bbox.max_lat);
            if let Some((min_lng, max_lng)) = bbox.lng {
                prop_assert!(point.0 >= min_lng && point.0 <= max_lng);
            }
        }
    }
}
