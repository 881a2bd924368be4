//! Spherical earth helpers shared by the projections.

use map_common::Point;

/// WGS84 mean earth radius (meters), used for ground distances.
pub const MEAN_EARTH_RADIUS: f64 = 6371008.8;

/// WGS84 semi-major axis (meters), used by Web Mercator and the OGC scale formula.
pub const WGS84_SEMI_MAJOR: f64 = 6378137.0;

/// Length of one degree of arc on the WGS84 semi-major sphere.
pub const METERS_PER_DEGREE: f64 = WGS84_SEMI_MAJOR * 2.0 * std::f64::consts::PI / 360.0;

/// Great-circle distance in meters between two lon/lat positions (degrees).
pub fn haversine_distance(a: Point, b: Point) -> f64 {
    let (lat1, lat2) = (a.y.to_radians(), b.y.to_radians());
    let dlat = lat2 - lat1;
    let dlon = (b.x - a.x).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * MEAN_EARTH_RADIUS * h.sqrt().min(1.0).asin()
}

/// Longitude difference folded into `[-180, 180)`.
pub fn normalize_longitude(lon: f64) -> f64 {
    (lon + 180.0).rem_euclid(360.0) - 180.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_one_degree_on_equator() {
        let d = haversine_distance(Point::new(0.0, 0.0), Point::new(1.0, 0.0));
        assert!((d - 111195.08).abs() < 1.0, "got {}", d);
    }

    #[test]
    fn test_haversine_across_antimeridian() {
        let d = haversine_distance(Point::new(179.5, 0.0), Point::new(-179.5, 0.0));
        assert!((d - 111195.08).abs() < 1.0, "got {}", d);
    }

    #[test]
    fn test_normalize_longitude() {
        assert_eq!(normalize_longitude(190.0), -170.0);
        assert_eq!(normalize_longitude(-190.0), 170.0);
        assert_eq!(normalize_longitude(180.0), -180.0);
    }
}
