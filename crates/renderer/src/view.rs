//! The view transform of one rendering pass.
//!
//! A [`ViewTransform`] relates display space (device pixels) to objective
//! space (the projected CRS of the view) and derives the resolution, scale
//! and rotation of the view from the target grid geometry.

use map_common::{AxisUnit, BoundingBox, CrsCode, GridGeometry, PixelAnchor, Point};
use projection::geographic::{haversine_distance, METERS_PER_DEGREE};
use projection::{Affine2D, CoordinateOperationResolver};
use tracing::warn;

use crate::error::{RenderError, Result};

/// Reference resolution used when no DPI is given (OGC WMS value).
pub const DEFAULT_DPI: f64 = 90.0;

/// Pixel size assumed by the Symbology Encoding scale formula (0.28 mm).
const SE_PIXEL_SIZE_M: f64 = 0.00028;

const INCH_M: f64 = 0.0254;

#[derive(Debug, Clone, PartialEq)]
pub struct ViewTransform {
    objective_to_display: Affine2D,
    display_to_objective: Affine2D,
    display_bounds: BoundingBox,
    resolution: [f64; 2],
    geographic_scale: f64,
    symbology_scale: f64,
    rotation: f64,
    dpi: f64,
    anchor: PixelAnchor,
}

impl ViewTransform {
    /// Build the view transform of `grid` rendered at `dpi`.
    ///
    /// Only the horizontal 2D part of the grid is used. Fails when that
    /// part's grid to CRS transform is not affine or not invertible.
    pub fn new(
        grid: &GridGeometry,
        dpi: f64,
        anchor: PixelAnchor,
        resolver: &dyn CoordinateOperationResolver,
    ) -> Result<Self> {
        if !dpi.is_finite() || dpi <= 0.0 {
            return Err(RenderError::Config(format!("dpi must be > 0, got {}", dpi)));
        }
        let grid = grid.to_2d();
        if grid.extent.is_empty() {
            return Err(RenderError::Map(map_common::MapError::InvalidGrid(format!(
                "empty extent {:?}",
                grid.extent
            ))));
        }

        let coefficients = grid.grid_to_crs_coefficients(anchor).ok_or_else(|| {
            let description = match &grid.grid_to_crs {
                map_common::GridToCrs::NonLinear { description } => description.clone(),
                other => format!("{:?}", other),
            };
            RenderError::NonAffineGridToCrs(description)
        })?;

        let extent = grid.extent;
        let display_to_objective = Affine2D::translation(extent.low_x as f64, extent.low_y as f64)
            .then(&Affine2D::from_coefficients(coefficients));
        let objective_to_display = display_to_objective
            .try_inverse()
            .map_err(|e| RenderError::NotInvertible(e.to_string()))?;

        let display_bounds = BoundingBox::new(0.0, 0.0, grid.width() as f64, grid.height() as f64);

        let [rx, ry] = grid
            .resolution()
            .ok_or_else(|| RenderError::NonAffineGridToCrs("no resolution".to_string()))?;
        let dpi_factor = DEFAULT_DPI / dpi;
        let resolution = [rx * dpi_factor, ry * dpi_factor];

        let rotation = objective_to_display.rotation_angle();

        let geographic_scale = match geographic_scale(
            grid.crs,
            &display_to_objective,
            &display_bounds,
            dpi,
            resolver,
        ) {
            Ok(scale) => scale,
            Err(e) => {
                warn!(crs = %grid.crs, error = %e, "Could not compute geographic scale, using 1");
                1.0
            }
        };

        let symbology_scale = symbology_scale(grid.crs, &display_to_objective, &display_bounds);

        Ok(Self {
            objective_to_display,
            display_to_objective,
            display_bounds,
            resolution,
            geographic_scale,
            symbology_scale,
            rotation,
            dpi,
            anchor,
        })
    }

    pub fn objective_to_display(&self) -> &Affine2D {
        &self.objective_to_display
    }

    pub fn display_to_objective(&self) -> &Affine2D {
        &self.display_to_objective
    }

    /// Canvas rectangle in pixels, origin at the upper-left corner.
    pub fn display_bounds(&self) -> &BoundingBox {
        &self.display_bounds
    }

    /// Objective envelope of the canvas.
    pub fn objective_envelope(&self) -> BoundingBox {
        self.display_to_objective.apply_bbox(&self.display_bounds)
    }

    /// Objective units per display pixel on each CRS axis, DPI adjusted.
    pub fn resolution(&self) -> [f64; 2] {
        self.resolution
    }

    /// Ground scale denominator at the view centre.
    pub fn geographic_scale(&self) -> f64 {
        self.geographic_scale
    }

    /// Approximate OGC SE scale denominator.
    ///
    /// Only suitable for min/max scale rule filtering.
    pub fn symbology_scale(&self) -> f64 {
        self.symbology_scale
    }

    /// Rotation of objective space on the display, in radians.
    pub fn rotation(&self) -> f64 {
        self.rotation
    }

    pub fn dpi(&self) -> f64 {
        self.dpi
    }

    pub fn anchor(&self) -> PixelAnchor {
        self.anchor
    }

    /// Display coordinate sampled for the pixel at column `x`, row `y`.
    ///
    /// Under the cell-centre convention integer display coordinates already
    /// address pixel centres.
    pub fn pixel_sample_point(&self, x: u32, y: u32) -> Point {
        match self.anchor {
            PixelAnchor::CellCorner => Point::new(x as f64 + 0.5, y as f64 + 0.5),
            PixelAnchor::CellCenter => Point::new(x as f64, y as f64),
        }
    }
}

/// Ground distance covered by one pixel at the view centre, divided by the
/// physical pixel size.
fn geographic_scale(
    crs: CrsCode,
    display_to_objective: &Affine2D,
    display_bounds: &BoundingBox,
    dpi: f64,
    resolver: &dyn CoordinateOperationResolver,
) -> Result<f64> {
    let center = display_bounds.center();
    let p0 = display_to_objective.apply(center);
    let p1 = display_to_objective.apply(Point::new(center.x + 1.0, center.y));

    let distance = if crs.is_georeferenced() {
        let to_geo = resolver.resolve(crs, CrsCode::Crs84)?;
        let g0 = to_geo.transform_point(p0)?;
        let g1 = to_geo.transform_point(p1)?;
        haversine_distance(g0, g1)
    } else {
        p0.distance(&p1)
    };

    let scale = distance / (INCH_M / dpi);
    if !scale.is_finite() || scale <= 0.0 {
        return Err(RenderError::invalid_geometry(format!(
            "degenerate ground distance {}",
            distance
        )));
    }
    Ok(scale)
}

/// OGC SE scale: canvas width in meters over the width in 0.28 mm pixels.
fn symbology_scale(crs: CrsCode, display_to_objective: &Affine2D, display_bounds: &BoundingBox) -> f64 {
    let envelope = display_to_objective.apply_bbox(display_bounds);
    let width = match crs.axis_unit() {
        AxisUnit::Degree => envelope.width() * METERS_PER_DEGREE,
        AxisUnit::Metre => envelope.width(),
    };
    width / (display_bounds.width() * SE_PIXEL_SIZE_M)
}
