//! Spherical polar stereographic projection with a latitude of true scale.

use std::f64::consts::FRAC_PI_4;
use std::sync::Arc;

use map_common::Point;

use crate::error::{ProjectionError, Result};
use crate::geographic::WGS84_SEMI_MAJOR;
use crate::transform::{MathTransform, Transform};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pole {
    North,
    South,
}

/// Polar stereographic projection between lon/lat degrees and meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolarStereographic {
    pole: Pole,
    /// Central meridian in degrees
    lon0: f64,
    /// `R·cos(φc) / tan(π/4 − φc/2)` with φc the true-scale latitude
    /// folded to the projection hemisphere.
    k: f64,
    inverse: bool,
}

impl PolarStereographic {
    pub fn new(pole: Pole, lat_ts_deg: f64, lon0_deg: f64) -> Self {
        let phi_c = lat_ts_deg.abs().to_radians();
        let k = WGS84_SEMI_MAJOR * phi_c.cos() / (FRAC_PI_4 - phi_c / 2.0).tan();
        Self {
            pole,
            lon0: lon0_deg,
            k,
            inverse: false,
        }
    }

    /// EPSG:3413 NSIDC Sea Ice Polar Stereographic North.
    pub fn nsidc_north() -> Self {
        Self::new(Pole::North, 70.0, -45.0)
    }

    /// EPSG:3031 Antarctic Polar Stereographic.
    pub fn antarctic() -> Self {
        Self::new(Pole::South, -71.0, 0.0)
    }

    fn project(&self, p: Point) -> Result<Point> {
        let lat = match self.pole {
            Pole::North => p.y,
            Pole::South => -p.y,
        };
        if lat <= -90.0 || lat > 90.0 || !p.is_finite() {
            return Err(ProjectionError::out_of_domain(p, "opposite pole is not projectable"));
        }
        let rho = self.k * (FRAC_PI_4 - lat.to_radians() / 2.0).tan();
        let dlon = (p.x - self.lon0).to_radians();
        Ok(match self.pole {
            Pole::North => Point::new(rho * dlon.sin(), -rho * dlon.cos()),
            Pole::South => Point::new(rho * dlon.sin(), rho * dlon.cos()),
        })
    }

    fn unproject(&self, p: Point) -> Result<Point> {
        if !p.is_finite() {
            return Err(ProjectionError::out_of_domain(p, "non-finite coordinate"));
        }
        let rho = p.x.hypot(p.y);
        let colat = 2.0 * (rho / self.k).atan();
        let lat = 90.0 - colat.to_degrees();
        Ok(match self.pole {
            Pole::North => Point::new(self.lon0 + p.x.atan2(-p.y).to_degrees(), lat),
            Pole::South => Point::new(self.lon0 + p.x.atan2(p.y).to_degrees(), -lat),
        })
    }
}

impl MathTransform for PolarStereographic {
    fn transform_point(&self, p: Point) -> Result<Point> {
        if self.inverse {
            self.unproject(p)
        } else {
            self.project(p)
        }
    }

    fn inverse(&self) -> Result<Transform> {
        Ok(Arc::new(Self {
            inverse: !self.inverse,
            ..*self
        }))
    }
}
