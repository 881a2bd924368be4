//! Lambert Conformal Conic projection.
//!
//! Used for mid-latitude grids with a mostly east-west extent.
//! It maps a cone tangent or secant to the Earth's surface onto a flat plane.
//!
//! The projection parameters include:
//! - Reference latitude (lat0): The latitude of the false origin
//! - Reference longitude (lon0): The central meridian (LoV in GRIB2)
//! - Standard parallel(s): Latin1 and Latin2 (can be equal for tangent cone)
//!
//! Projected coordinates are meters from the false origin.

use std::f64::consts::PI;
use std::sync::Arc;

use map_common::Point;

use crate::error::{ProjectionError, Result};
use crate::geographic::normalize_longitude;
use crate::transform::{MathTransform, Transform};

/// Earth radius used by the HRRR grid definition (meters).
const HRRR_EARTH_RADIUS: f64 = 6371229.0;

/// Lambert Conformal projection parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct LambertConformal {
    /// Central meridian (LoV) in radians
    pub lon0: f64,
    /// Latitude of the false origin in radians
    pub lat0: f64,
    /// First standard parallel in radians
    pub latin1: f64,
    /// Second standard parallel in radians
    pub latin2: f64,
    /// Earth radius (meters)
    pub earth_radius: f64,
    /// Cone constant (n)
    n: f64,
    /// F constant
    f: f64,
    /// Rho at the false origin
    rho0: f64,
    /// Meters to degrees when set
    inverse: bool,
}

impl LambertConformal {
    /// Create a new Lambert Conformal projection, angles in degrees.
    pub fn new(lat0_deg: f64, lov_deg: f64, latin1_deg: f64, latin2_deg: f64, earth_radius: f64) -> Self {
        let lat0 = lat0_deg.to_radians();
        let lon0 = lov_deg.to_radians();
        let latin1 = latin1_deg.to_radians();
        let latin2 = latin2_deg.to_radians();

        // Compute cone constant n
        let n = if (latin1 - latin2).abs() < 1e-10 {
            // Tangent cone (single standard parallel)
            latin1.sin()
        } else {
            // Secant cone (two standard parallels)
            let ln_ratio = (latin1.cos() / latin2.cos()).ln();
            let tan_ratio =
                ((PI / 4.0 + latin2 / 2.0).tan() / (PI / 4.0 + latin1 / 2.0).tan()).ln();
            ln_ratio / tan_ratio
        };

        let f = (latin1.cos() * (PI / 4.0 + latin1 / 2.0).tan().powf(n)) / n;
        let rho0 = earth_radius * f / (PI / 4.0 + lat0 / 2.0).tan().powf(n);

        Self {
            lon0,
            lat0,
            latin1,
            latin2,
            earth_radius,
            n,
            f,
            rho0,
            inverse: false,
        }
    }

    /// Create HRRR projection with standard parameters.
    ///
    /// HRRR uses Lambert Conformal with:
    /// - LoV: 262.5°E (= -97.5°W)
    /// - Standard parallels: 38.5°N (both), also the origin latitude
    pub fn hrrr() -> Self {
        Self::new(38.5, -97.5, 38.5, 38.5, HRRR_EARTH_RADIUS)
    }

    fn rho(&self, lat: f64) -> f64 {
        self.earth_radius * self.f / (PI / 4.0 + lat / 2.0).tan().powf(self.n)
    }

    /// Geographic (lon/lat degrees) to projected meters.
    pub fn project(&self, lon_deg: f64, lat_deg: f64) -> Result<Point> {
        if lat_deg.abs() >= 90.0 || !lon_deg.is_finite() {
            return Err(ProjectionError::out_of_domain(
                Point::new(lon_deg, lat_deg),
                "latitude at or beyond a pole",
            ));
        }
        let dlon = normalize_longitude(lon_deg - self.lon0.to_degrees()).to_radians();
        let rho = self.rho(lat_deg.to_radians());
        let theta = self.n * dlon;
        Ok(Point::new(rho * theta.sin(), self.rho0 - rho * theta.cos()))
    }

    /// Projected meters to geographic (lon/lat degrees).
    pub fn unproject(&self, x: f64, y: f64) -> Result<Point> {
        if !x.is_finite() || !y.is_finite() {
            return Err(ProjectionError::out_of_domain(
                Point::new(x, y),
                "non-finite coordinate",
            ));
        }
        let dy = self.rho0 - y;
        let mut rho = x.hypot(dy);
        let mut theta = x.atan2(dy);
        if self.n < 0.0 {
            rho = -rho;
            theta = (-x).atan2(-dy);
        }
        let lat = 2.0 * (self.earth_radius * self.f / rho).powf(1.0 / self.n).atan() - PI / 2.0;
        let lon = self.lon0 + theta / self.n;
        Ok(Point::new(lon.to_degrees(), lat.to_degrees()))
    }
}

impl MathTransform for LambertConformal {
    fn transform_point(&self, p: Point) -> Result<Point> {
        if self.inverse {
            self.unproject(p.x, p.y)
        } else {
            self.project(p.x, p.y)
        }
    }

    fn inverse(&self) -> Result<Transform> {
        Ok(Arc::new(Self {
            inverse: !self.inverse,
            ..self.clone()
        }))
    }
}
