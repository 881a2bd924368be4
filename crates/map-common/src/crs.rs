//! Coordinate Reference System codes and their static properties.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{BoundingBox, Point};

/// Half the circumference of the Web Mercator sphere, in meters.
pub const WEB_MERCATOR_HALF_WORLD: f64 = 20037508.342789244;

/// Well-known CRS codes understood by the renderer.
///
/// Codes compare and hash by value, so two independently parsed
/// `"EPSG:4326"` strings yield the same cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CrsCode {
    /// WGS84 geographic, longitude first (CRS:84 axis order), degrees
    Crs84,
    /// NAD83 geographic, longitude first, degrees
    Epsg4269,
    /// Web Mercator (meters)
    Epsg3857,
    /// Polar Stereographic North (meters)
    Epsg3413,
    /// Polar Stereographic South (meters)
    Epsg3031,
    /// Lambert Conformal Conic used by the HRRR CONUS grid (meters)
    HrrrLambert,
    /// Local engineering plane in meters with no geographic link
    Engineering,
}

/// Unit of both horizontal axes of a CRS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AxisUnit {
    Degree,
    Metre,
}

impl CrsCode {
    /// Parse a CRS string (supports both SRS and CRS parameter formats).
    ///
    /// Accepts formats like:
    /// - "EPSG:4326" (read with longitude first)
    /// - "epsg:3857"
    /// - "CRS:84"
    pub fn from_wms_string(s: &str) -> Result<Self, CrsParseError> {
        let normalized = s.trim().to_uppercase();

        match normalized.as_str() {
            "EPSG:4326" | "CRS:84" | "OGC:CRS84" => Ok(CrsCode::Crs84),
            "EPSG:4269" => Ok(CrsCode::Epsg4269),
            "EPSG:3857" | "EPSG:900913" => Ok(CrsCode::Epsg3857),
            "EPSG:3413" => Ok(CrsCode::Epsg3413),
            "EPSG:3031" => Ok(CrsCode::Epsg3031),
            "LCC:HRRR" => Ok(CrsCode::HrrrLambert),
            "LOCAL" | "ENGINEERING" => Ok(CrsCode::Engineering),
            _ => Err(CrsParseError::UnsupportedCrs(s.to_string())),
        }
    }

    /// Check if this is a geographic (lon/lat) CRS.
    pub fn is_geographic(&self) -> bool {
        matches!(self, CrsCode::Crs84 | CrsCode::Epsg4269)
    }

    /// Whether coordinates can be converted to geographic ones at all.
    pub fn is_georeferenced(&self) -> bool {
        !matches!(self, CrsCode::Engineering)
    }

    pub fn axis_unit(&self) -> AxisUnit {
        if self.is_geographic() {
            AxisUnit::Degree
        } else {
            AxisUnit::Metre
        }
    }

    /// Valid domain of this CRS.
    pub fn valid_bounds(&self) -> BoundingBox {
        match self {
            CrsCode::Crs84 | CrsCode::Epsg4269 => BoundingBox::new(-180.0, -90.0, 180.0, 90.0),
            CrsCode::Epsg3857 => BoundingBox::new(
                -WEB_MERCATOR_HALF_WORLD,
                -WEB_MERCATOR_HALF_WORLD,
                WEB_MERCATOR_HALF_WORLD,
                WEB_MERCATOR_HALF_WORLD,
            ),
            CrsCode::HrrrLambert => {
                // CONUS coverage with margin, meters from the projection origin
                BoundingBox::new(-3000000.0, -2000000.0, 3000000.0, 2000000.0)
            }
            CrsCode::Epsg3413 | CrsCode::Epsg3031 => {
                BoundingBox::new(-4000000.0, -4000000.0, 4000000.0, 4000000.0)
            }
            CrsCode::Engineering => BoundingBox::new(
                f64::NEG_INFINITY,
                f64::NEG_INFINITY,
                f64::INFINITY,
                f64::INFINITY,
            ),
        }
    }

    /// Two positions one period apart on the periodic (wrap-around) axis.
    ///
    /// The vector from the first to the second point is the translation that
    /// maps a coordinate onto its next replica. `None` for CRSs without a
    /// periodic axis.
    pub fn wrap_points(&self) -> Option<[Point; 2]> {
        match self {
            CrsCode::Crs84 | CrsCode::Epsg4269 => {
                Some([Point::new(-180.0, 0.0), Point::new(180.0, 0.0)])
            }
            CrsCode::Epsg3857 => Some([
                Point::new(-WEB_MERCATOR_HALF_WORLD, 0.0),
                Point::new(WEB_MERCATOR_HALF_WORLD, 0.0),
            ]),
            _ => None,
        }
    }
}

impl fmt::Display for CrsCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            CrsCode::Crs84 => "CRS:84",
            CrsCode::Epsg4269 => "EPSG:4269",
            CrsCode::Epsg3857 => "EPSG:3857",
            CrsCode::Epsg3413 => "EPSG:3413",
            CrsCode::Epsg3031 => "EPSG:3031",
            CrsCode::HrrrLambert => "LCC:HRRR",
            CrsCode::Engineering => "LOCAL",
        };
        write!(f, "{}", code)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CrsParseError {
    #[error("Unsupported CRS: {0}")]
    UnsupportedCrs(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_crs() {
        assert_eq!(CrsCode::from_wms_string("EPSG:4326").unwrap(), CrsCode::Crs84);
        assert_eq!(
            CrsCode::from_wms_string("epsg:3857").unwrap(),
            CrsCode::Epsg3857
        );
        assert_eq!(CrsCode::from_wms_string("CRS:84").unwrap(), CrsCode::Crs84);
        assert!(CrsCode::from_wms_string("EPSG:99999").is_err());
    }

    #[test]
    fn test_wrap_points() {
        let [a, b] = CrsCode::Crs84.wrap_points().unwrap();
        assert_eq!(b.x - a.x, 360.0);
        assert!(CrsCode::Engineering.wrap_points().is_none());
        assert!(CrsCode::HrrrLambert.wrap_points().is_none());
    }

    #[test]
    fn test_display_round_trip() {
        for code in [
            CrsCode::Crs84,
            CrsCode::Epsg4269,
            CrsCode::Epsg3857,
            CrsCode::Epsg3413,
            CrsCode::Epsg3031,
            CrsCode::HrrrLambert,
            CrsCode::Engineering,
        ] {
            assert_eq!(CrsCode::from_wms_string(&code.to_string()).unwrap(), code);
        }
    }
}
