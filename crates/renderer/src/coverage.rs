//! Raster coverages and their resampling onto the canvas.
//!
//! Resampling walks the display pixels, one row per rayon task, maps each
//! sample point back to the coverage grid through objective and data space
//! and takes the nearest cell. Both the general pipeline and the raster
//! fast path go through [`paint_coverage`], so their output is identical.

use std::sync::Arc;

use image::RgbaImage;
use rayon::prelude::*;
use map_common::{BoundingBox, GridGeometry, PixelAnchor, Point};
use projection::Affine2D;
use tracing::debug;

use crate::context::{PaintSession, RenderingContext};
use crate::error::{RenderError, Result};
use crate::layer::CoverageSource;

/// RGBA samples on an affine grid.
#[derive(Debug, Clone)]
pub struct Coverage {
    grid: GridGeometry,
    image: Arc<RgbaImage>,
    crs_to_grid: Affine2D,
}

impl Coverage {
    /// Fails when the image size differs from the grid extent or the grid
    /// has no invertible affine transform.
    pub fn new(grid: GridGeometry, image: RgbaImage) -> Result<Self> {
        if image.width() != grid.width() || image.height() != grid.height() {
            return Err(RenderError::Map(map_common::MapError::InvalidGrid(format!(
                "image is {}x{} but grid extent is {}x{}",
                image.width(),
                image.height(),
                grid.width(),
                grid.height()
            ))));
        }
        let coefficients = grid
            .grid_to_crs_coefficients(PixelAnchor::CellCorner)
            .ok_or_else(|| RenderError::NonAffineGridToCrs(format!("{:?}", grid.grid_to_crs)))?;
        let crs_to_grid = Affine2D::from_coefficients(coefficients)
            .try_inverse()
            .map_err(|e| RenderError::NotInvertible(e.to_string()))?;
        Ok(Self {
            grid,
            image: Arc::new(image),
            crs_to_grid,
        })
    }

    pub fn grid(&self) -> &GridGeometry {
        &self.grid
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Envelope of the coverage in its CRS.
    pub fn footprint(&self) -> BoundingBox {
        self.grid.envelope().unwrap_or_else(BoundingBox::empty)
    }

    /// Nearest cell value at a position in the coverage CRS.
    pub fn sample(&self, p: Point) -> Option<[u8; 4]> {
        let g = self.crs_to_grid.apply(p);
        if !g.is_finite() {
            return None;
        }
        let col = g.x.floor() as i64 - self.grid.extent.low_x;
        let row = g.y.floor() as i64 - self.grid.extent.low_y;
        if col < 0 || row < 0 || col >= self.image.width() as i64 || row >= self.image.height() as i64 {
            return None;
        }
        Some(self.image.get_pixel(col as u32, row as u32).0)
    }
}

/// A coverage held in memory, returned whole for every read.
#[derive(Debug, Clone)]
pub struct MemoryCoverage {
    coverage: Coverage,
}

impl MemoryCoverage {
    pub fn new(coverage: Coverage) -> Self {
        Self { coverage }
    }
}

impl CoverageSource for MemoryCoverage {
    fn grid(&self) -> &GridGeometry {
        self.coverage.grid()
    }

    fn read(&self, region: &BoundingBox, _resolution: [f64; 2]) -> Result<Coverage> {
        if !self.coverage.footprint().intersects(region) {
            debug!(region = ?region, "Coverage read outside of footprint");
        }
        Ok(self.coverage.clone())
    }
}

/// Read the part of `source` needed by the view.
///
/// `None` when the source's time range does not overlap the view's.
pub fn read_for_view(ctx: &RenderingContext, source: &dyn CoverageSource) -> Result<Option<Coverage>> {
    let grid = source.grid();
    if let (Some(wanted), Some(available)) = (ctx.temporal(), grid.temporal) {
        if !wanted.overlaps(&available) {
            debug!(
                wanted = ?wanted,
                available = ?available,
                "Skipping coverage outside of the requested time range"
            );
            return Ok(None);
        }
    }
    let region = ctx.data_region(grid.crs)?;
    let coverage = source.read(&region, ctx.view().resolution())?;
    Ok(Some(coverage))
}

/// Resample `coverage` onto a canvas-sized image.
///
/// Returns `None` when no canvas pixel falls on the coverage.
pub fn resample(ctx: &RenderingContext, coverage: &Coverage) -> Result<Option<RgbaImage>> {
    let crs = coverage.grid().crs;
    let objective_to_data = ctx.data_to_objective(crs)?.inverse()?;
    let display_to_objective = *ctx.view().display_to_objective();
    let bounds = ctx.canvas_display_bounds();
    let (width, height) = (bounds.width() as u32, bounds.height() as u32);

    // Candidates are tried in order; shifted copies reach coverages stored
    // in another period, like 0..360 longitudes.
    let shifts: Vec<Point> = match ctx.wrap() {
        Some(wrap) => {
            let period = wrap.period();
            vec![Point::new(0.0, 0.0), period.scale(-1.0), period]
        }
        None => vec![Point::new(0.0, 0.0)],
    };

    let mut output = RgbaImage::new(width, height);
    let row_len = width as usize * 4;
    if row_len == 0 {
        return Ok(None);
    }
    let wrap = ctx.wrap();
    let painted = output
        .par_chunks_mut(row_len)
        .enumerate()
        .map(|(y, row)| {
            let mut painted = false;
            for (x, pixel) in row.chunks_exact_mut(4).enumerate() {
                let objective =
                    display_to_objective.apply(ctx.view().pixel_sample_point(x as u32, y as u32));
                let objective = match wrap {
                    Some(wrap) => wrap.normalize_point(objective),
                    None => objective,
                };
                let value = shifts.iter().find_map(|shift| {
                    let data = objective_to_data.transform_point(objective.add(shift)).ok()?;
                    coverage.sample(data)
                });
                if let Some(value) = value.filter(|v| v[3] > 0) {
                    pixel.copy_from_slice(&value);
                    painted = true;
                }
            }
            painted
        })
        .reduce(|| false, |a, b| a | b);
    Ok(painted.then_some(output))
}

/// Resample and draw a coverage; returns whether anything was painted.
pub fn paint_coverage(
    ctx: &RenderingContext,
    session: &mut PaintSession<'_>,
    coverage: &Coverage,
    opacity: f32,
) -> Result<bool> {
    let Some(image) = resample(ctx, coverage)? else {
        return Ok(false);
    };
    session.switch_to_display();
    session.surface().draw_raster(&image, 0, 0, opacity)?;
    Ok(true)
}
