//! Finding the coordinate operation between two CRS codes.

use std::sync::Arc;

use map_common::CrsCode;
use tracing::debug;

use crate::affine::Affine2D;
use crate::error::{ProjectionError, Result};
use crate::lambert::LambertConformal;
use crate::mercator::WebMercator;
use crate::polar::PolarStereographic;
use crate::transform::{concatenate, MathTransform, Transform};

/// Source of coordinate operations between CRS.
///
/// Resolution may be expensive; callers are expected to cache the result.
pub trait CoordinateOperationResolver: Send + Sync {
    fn resolve(&self, source: CrsCode, target: CrsCode) -> Result<Transform>;
}

/// Resolver for the built-in CRS codes.
///
/// Georeferenced CRS are connected through CRS:84. NAD83 and WGS84 are
/// treated as the same datum. The engineering CRS only maps to itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultResolver;

impl DefaultResolver {
    /// Projected to geographic, `None` for the engineering CRS.
    fn to_geographic(crs: CrsCode) -> Option<Result<Transform>> {
        let projection: Transform = match crs {
            CrsCode::Crs84 | CrsCode::Epsg4269 => return Some(Ok(Arc::new(Affine2D::identity()))),
            CrsCode::Epsg3857 => Arc::new(WebMercator::forward()),
            CrsCode::Epsg3413 => Arc::new(PolarStereographic::nsidc_north()),
            CrsCode::Epsg3031 => Arc::new(PolarStereographic::antarctic()),
            CrsCode::HrrrLambert => Arc::new(LambertConformal::hrrr()),
            CrsCode::Engineering => return None,
        };
        Some(projection.inverse())
    }

    fn from_geographic(crs: CrsCode) -> Option<Transform> {
        match crs {
            CrsCode::Crs84 | CrsCode::Epsg4269 => Some(Arc::new(Affine2D::identity())),
            CrsCode::Epsg3857 => Some(Arc::new(WebMercator::forward())),
            CrsCode::Epsg3413 => Some(Arc::new(PolarStereographic::nsidc_north())),
            CrsCode::Epsg3031 => Some(Arc::new(PolarStereographic::antarctic())),
            CrsCode::HrrrLambert => Some(Arc::new(LambertConformal::hrrr())),
            CrsCode::Engineering => None,
        }
    }
}

impl CoordinateOperationResolver for DefaultResolver {
    fn resolve(&self, source: CrsCode, target: CrsCode) -> Result<Transform> {
        if source == target || (source.is_geographic() && target.is_geographic()) {
            return Ok(Arc::new(Affine2D::identity()));
        }
        let not_found = || ProjectionError::OperationNotFound {
            from: source,
            to: target,
        };
        let to_geo = Self::to_geographic(source).ok_or_else(not_found)??;
        let from_geo = Self::from_geographic(target).ok_or_else(not_found)?;
        debug!(source = %source, target = %target, "Resolved coordinate operation");
        Ok(concatenate(to_geo, from_geo))
    }
}
