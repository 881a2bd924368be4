//! Spherical Web Mercator (EPSG:3857).

use std::f64::consts::PI;
use std::sync::Arc;

use map_common::Point;

use crate::error::{ProjectionError, Result};
use crate::geographic::WGS84_SEMI_MAJOR;
use crate::transform::{MathTransform, Transform};

/// Latitude where Web Mercator's square world ends.
pub const MAX_LATITUDE: f64 = 85.05112877980659;

/// Convert latitude to Web Mercator Y coordinate
pub fn lat_to_mercator_y(lat: f64) -> f64 {
    let lat_rad = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
    ((PI / 4.0) + (lat_rad / 2.0)).tan().ln() * WGS84_SEMI_MAJOR
}

/// Convert Web Mercator Y coordinate to latitude
pub fn mercator_y_to_lat(y: f64) -> f64 {
    let y_normalized = y / WGS84_SEMI_MAJOR;
    (2.0 * y_normalized.exp().atan() - PI / 2.0).to_degrees()
}

/// Web Mercator conversion between CRS:84 degrees and meters.
///
/// Longitudes are not wrapped: 190° maps beyond the eastern edge, which is
/// what wrap-around replication relies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WebMercator {
    inverse: bool,
}

impl WebMercator {
    /// Degrees to meters.
    pub fn forward() -> Self {
        Self { inverse: false }
    }

    /// Meters to degrees.
    pub fn reverse() -> Self {
        Self { inverse: true }
    }
}

impl MathTransform for WebMercator {
    fn transform_point(&self, p: Point) -> Result<Point> {
        if !p.is_finite() {
            return Err(ProjectionError::out_of_domain(p, "non-finite coordinate"));
        }
        if self.inverse {
            Ok(Point::new(
                (p.x / WGS84_SEMI_MAJOR).to_degrees(),
                mercator_y_to_lat(p.y),
            ))
        } else {
            if p.y.abs() > 90.0 {
                return Err(ProjectionError::out_of_domain(p, "latitude beyond the poles"));
            }
            Ok(Point::new(
                p.x.to_radians() * WGS84_SEMI_MAJOR,
                lat_to_mercator_y(p.y),
            ))
        }
    }

    fn inverse(&self) -> Result<Transform> {
        Ok(Arc::new(Self {
            inverse: !self.inverse,
        }))
    }
}
