//! Rendering contexts.
//!
//! [`RenderingContextBuilder`] validates the target grid and produces a
//! frozen [`RenderingContext`]: the view transform, optional wrap-around
//! parameters, canvas bounds in every space and the per-pass caches. The
//! context is only read during a pass, so presentation streams can borrow it
//! while a [`PaintSession`] owns the drawing surface.

use std::sync::Arc;

use map_common::{BoundingBox, CrsCode, GridGeometry, PixelAnchor, Point, Polygon, TimeRange};
use projection::{Affine2D, CoordinateOperationResolver, DefaultResolver, Transform};
use tracing::debug;

use crate::cache::{LengthUnit, TransformCache, UnitCoefficientCache};
use crate::config::RendererConfig;
use crate::error::{RenderError, Result};
use crate::labels::{FontMetricsCache, LabelRenderer};
use crate::surface::DrawSurface;
use crate::view::ViewTransform;
use crate::wrap::{Replica, WrapAroundPlanner, WrapParams};

/// Canvas envelope in objective space, with the extra dimensions of the
/// target grid.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectiveEnvelope {
    pub horizontal: BoundingBox,
    pub temporal: Option<TimeRange>,
    pub elevation: Option<(f64, f64)>,
}

pub struct RenderingContextBuilder {
    grid: GridGeometry,
    dpi: Option<f64>,
    anchor: PixelAnchor,
    config: RendererConfig,
    resolver: Arc<dyn CoordinateOperationResolver>,
}

impl RenderingContextBuilder {
    pub fn new(grid: GridGeometry) -> Self {
        Self {
            grid,
            dpi: None,
            anchor: PixelAnchor::CellCorner,
            config: RendererConfig::default(),
            resolver: Arc::new(DefaultResolver),
        }
    }

    /// Output DPI; defaults to the configured DPI.
    pub fn dpi(mut self, dpi: f64) -> Self {
        self.dpi = Some(dpi);
        self
    }

    /// Pixel convention of display coordinates: cell corners for full
    /// canvases, cell centres for context copies addressing samples.
    pub fn anchor(mut self, anchor: PixelAnchor) -> Self {
        self.anchor = anchor;
        self
    }

    pub fn config(mut self, config: RendererConfig) -> Self {
        self.config = config;
        self
    }

    pub fn resolver(mut self, resolver: Arc<dyn CoordinateOperationResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn build(self) -> Result<RenderingContext> {
        self.config.validate().map_err(RenderError::Config)?;
        let dpi = self.dpi.unwrap_or(self.config.dpi);
        let view = ViewTransform::new(&self.grid, dpi, self.anchor, self.resolver.as_ref())?;

        let objective_crs = self.grid.crs;
        let objective_crs_2d = self.grid.to_2d().crs;
        let canvas_display_bounds = *view.display_bounds();

        let wrap = WrapAroundPlanner::from_config(&self.config).plan(
            objective_crs_2d,
            &view,
            self.config.clip_margin_px,
        );

        let raw_envelope = view.objective_envelope();
        let canvas_objective_bounds_2d = match &wrap {
            Some(params) => params.normalize(&raw_envelope),
            None => raw_envelope,
        };
        let canvas_objective_bounds = ObjectiveEnvelope {
            horizontal: canvas_objective_bounds_2d,
            temporal: self.grid.temporal,
            elevation: self.grid.elevation,
        };

        let display_clip = canvas_display_bounds.expand(self.config.clip_margin_px);
        let objective_clip = Polygon::new(
            display_clip
                .corners()
                .iter()
                .map(|c| view.display_to_objective().apply(*c))
                .collect(),
        );

        let transforms = Arc::new(TransformCache::new(
            self.resolver,
            objective_crs,
            *view.objective_to_display(),
        ));

        debug!(
            crs = %objective_crs,
            width = canvas_display_bounds.width(),
            height = canvas_display_bounds.height(),
            dpi = dpi,
            wrap = wrap.is_some(),
            "Built rendering context"
        );

        Ok(RenderingContext {
            view,
            wrap,
            objective_crs,
            objective_crs_2d,
            canvas_display_bounds,
            canvas_objective_bounds,
            canvas_objective_bounds_2d,
            display_clip,
            objective_clip,
            config: self.config,
            transforms,
            units: Arc::new(UnitCoefficientCache::new()),
            font_metrics: Arc::new(FontMetricsCache::new()),
        })
    }
}

/// Build a full-canvas context with default configuration.
pub fn build_context(grid: &GridGeometry, dpi: f64) -> Result<RenderingContext> {
    RenderingContextBuilder::new(grid.clone()).dpi(dpi).build()
}

/// Immutable state of one rendering or hit-testing pass.
#[derive(Debug)]
pub struct RenderingContext {
    view: ViewTransform,
    wrap: Option<WrapParams>,
    objective_crs: CrsCode,
    objective_crs_2d: CrsCode,
    canvas_display_bounds: BoundingBox,
    canvas_objective_bounds: ObjectiveEnvelope,
    canvas_objective_bounds_2d: BoundingBox,
    display_clip: BoundingBox,
    objective_clip: Polygon,
    config: RendererConfig,
    transforms: Arc<TransformCache>,
    units: Arc<UnitCoefficientCache>,
    font_metrics: Arc<FontMetricsCache>,
}

impl RenderingContext {
    pub fn view(&self) -> &ViewTransform {
        &self.view
    }

    pub fn wrap(&self) -> Option<&WrapParams> {
        self.wrap.as_ref()
    }

    pub fn objective_crs(&self) -> CrsCode {
        self.objective_crs
    }

    /// Horizontal component of the objective CRS.
    pub fn objective_crs_2d(&self) -> CrsCode {
        self.objective_crs_2d
    }

    pub fn canvas_display_bounds(&self) -> &BoundingBox {
        &self.canvas_display_bounds
    }

    pub fn canvas_objective_bounds(&self) -> &ObjectiveEnvelope {
        &self.canvas_objective_bounds
    }

    pub fn canvas_objective_bounds_2d(&self) -> &BoundingBox {
        &self.canvas_objective_bounds_2d
    }

    pub fn temporal(&self) -> Option<TimeRange> {
        self.canvas_objective_bounds.temporal
    }

    pub fn elevation(&self) -> Option<(f64, f64)> {
        self.canvas_objective_bounds.elevation
    }

    /// Canvas rectangle grown by the clip margin, in pixels.
    pub fn display_clip(&self) -> &BoundingBox {
        &self.display_clip
    }

    /// The display clip rectangle in objective space.
    pub fn objective_clip(&self) -> &Polygon {
        &self.objective_clip
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn transform_cache(&self) -> &Arc<TransformCache> {
        &self.transforms
    }

    pub fn font_metrics(&self) -> &Arc<FontMetricsCache> {
        &self.font_metrics
    }

    pub fn data_to_objective(&self, crs: CrsCode) -> Result<Transform> {
        self.transforms.data_to_objective(crs)
    }

    pub fn data_to_display(&self, crs: CrsCode) -> Result<Transform> {
        self.transforms.data_to_display(crs)
    }

    /// Objective units covered by one `unit` at the view centre.
    pub fn unit_to_objective(&self, unit: LengthUnit) -> f64 {
        self.units.get_or_compute(unit, || {
            let d2o = self.view.display_to_objective();
            let per_pixel = d2o.determinant().abs().sqrt();
            match unit {
                LengthUnit::Pixel => per_pixel,
                LengthUnit::Metre => {
                    let ground_per_pixel =
                        self.view.geographic_scale() * 0.0254 / self.view.dpi();
                    per_pixel / ground_per_pixel
                }
            }
        })
    }

    /// Copies of the scene in which an object with this objective envelope
    /// is visible. Without wrap-around this is the base view alone.
    pub fn replicas_for(&self, objective_bbox: &BoundingBox) -> Vec<Replica> {
        match &self.wrap {
            Some(params) => params.replicas_for(objective_bbox),
            None => vec![Replica {
                offset: 0,
                translation: Affine2D::identity(),
                objective_to_display: *self.view.objective_to_display(),
            }],
        }
    }

    /// Canvas area to query from a source in `crs`, clip margin included.
    ///
    /// The clip is cut to the objective CRS domain first, so a margin
    /// reaching past the poles does not fail the transform. Empty when the
    /// view lies entirely outside that domain.
    pub fn data_region(&self, crs: CrsCode) -> Result<BoundingBox> {
        let clip = self.objective_clip.bbox();
        let clip = match &self.wrap {
            Some(params) => params.normalize(&clip),
            None => clip,
        };
        let Some(clip) = clip.intersection(&self.objective_crs_2d.valid_bounds()) else {
            debug!(crs = %crs, "Canvas lies outside of the objective domain");
            return Ok(BoundingBox::empty());
        };
        let objective_to_data = self.data_to_objective(crs)?.inverse()?;
        Ok(objective_to_data.transform_bbox(&clip)?)
    }

    /// Cheap copy sharing this context's caches, for use on another thread
    /// with another surface.
    pub fn with_shared_cache(&self) -> Self {
        Self {
            view: self.view.clone(),
            wrap: self.wrap.clone(),
            objective_crs: self.objective_crs,
            objective_crs_2d: self.objective_crs_2d,
            canvas_display_bounds: self.canvas_display_bounds,
            canvas_objective_bounds: self.canvas_objective_bounds.clone(),
            canvas_objective_bounds_2d: self.canvas_objective_bounds_2d,
            display_clip: self.display_clip,
            objective_clip: self.objective_clip.clone(),
            config: self.config.clone(),
            transforms: Arc::clone(&self.transforms),
            units: Arc::clone(&self.units),
            font_metrics: Arc::clone(&self.font_metrics),
        }
    }

    /// Copy of this context with independent, empty caches.
    pub fn fork(&self) -> Self {
        Self {
            transforms: Arc::new(self.transforms.fork()),
            units: Arc::new(UnitCoefficientCache::new()),
            font_metrics: Arc::new(FontMetricsCache::new()),
            ..self.with_shared_cache()
        }
    }

    /// End of the pass: drop cached transforms.
    pub fn dispose(self) {
        self.transforms.clear();
        self.units.clear();
        self.font_metrics.clear();
    }
}

/// Coordinate space currently applied to the surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CoordinateSpace {
    Display,
    Objective,
    Other(Affine2D),
}

/// The mutable half of a pass: the surface being painted and the state
/// tied to it.
pub struct PaintSession<'s> {
    surface: &'s mut dyn DrawSurface,
    space: Option<CoordinateSpace>,
    labels: LabelRenderer,
    switches: usize,
}

impl<'s> PaintSession<'s> {
    pub fn new(ctx: &RenderingContext, surface: &'s mut dyn DrawSurface) -> Self {
        Self {
            surface,
            space: None,
            labels: LabelRenderer::new(
                ctx.config().label_min_spacing_px,
                Arc::clone(ctx.font_metrics()),
            ),
            switches: 0,
        }
    }

    pub fn surface(&mut self) -> &mut dyn DrawSurface {
        &mut *self.surface
    }

    pub fn space(&self) -> Option<CoordinateSpace> {
        self.space
    }

    pub fn labels(&mut self) -> &mut LabelRenderer {
        &mut self.labels
    }

    /// Number of transform changes sent to the surface.
    pub fn transform_switches(&self) -> usize {
        self.switches
    }

    fn switch(&mut self, space: CoordinateSpace, transform: Affine2D) {
        if self.space == Some(space) {
            return;
        }
        self.surface.set_transform(transform);
        self.space = Some(space);
        self.switches += 1;
    }

    pub fn switch_to_display(&mut self) {
        self.switch(CoordinateSpace::Display, Affine2D::identity());
    }

    pub fn switch_to_objective(&mut self, ctx: &RenderingContext) {
        self.switch(CoordinateSpace::Objective, *ctx.view().objective_to_display());
    }

    /// Apply an arbitrary source-to-display transform.
    pub fn switch_to(&mut self, transform: Affine2D) {
        self.switch(CoordinateSpace::Other(transform), transform);
    }

    /// Run label decimation and draw the survivors.
    pub fn render_labels(&mut self, ctx: &RenderingContext) -> usize {
        self.switch_to_display();
        self.labels.render(ctx, &mut *self.surface)
    }

    /// Release the surface.
    pub fn finish(self) -> LabelRenderer {
        self.labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::PixmapSurface;

    fn world() -> GridGeometry {
        GridGeometry::from_bbox(
            &BoundingBox::new(-180.0, -90.0, 180.0, 90.0),
            CrsCode::Crs84,
            360,
            180,
        )
        .unwrap()
    }

    #[test]
    fn test_clip_expanded_by_margin() {
        let ctx = build_context(&world(), 90.0).unwrap();
        assert_eq!(*ctx.display_clip(), BoundingBox::new(-50.0, -50.0, 410.0, 230.0));
        let objective = ctx.objective_clip().bbox();
        assert!((objective.min_x + 230.0).abs() < 1e-9);
    }

    #[test]
    fn test_unit_coefficients() {
        let ctx = build_context(&world(), 90.0).unwrap();
        assert!((ctx.unit_to_objective(LengthUnit::Pixel) - 1.0).abs() < 1e-12);
        // about 1/111 km of a degree per meter at the equator
        let per_metre = ctx.unit_to_objective(LengthUnit::Metre);
        assert!((per_metre * 111_195.0 - 1.0).abs() < 0.01, "got {}", per_metre);
    }

    #[test]
    fn test_fork_and_shared_cache() {
        let ctx = build_context(&world(), 90.0).unwrap();
        ctx.data_to_objective(CrsCode::Epsg3857).unwrap();
        let shared = ctx.with_shared_cache();
        assert!(Arc::ptr_eq(shared.transform_cache(), ctx.transform_cache()));
        let forked = ctx.fork();
        assert!(forked.transform_cache().is_empty());
        assert_eq!(forked.view(), ctx.view());
    }

    #[test]
    fn test_session_skips_redundant_switches() {
        let ctx = build_context(&world(), 90.0).unwrap();
        let mut surface = PixmapSurface::new(360, 180).unwrap();
        let mut session = PaintSession::new(&ctx, &mut surface);
        session.switch_to_display();
        session.switch_to_display();
        session.switch_to_objective(&ctx);
        session.switch_to_objective(&ctx);
        session.switch_to_display();
        assert_eq!(session.transform_switches(), 3);
        assert_eq!(session.space(), Some(CoordinateSpace::Display));
    }

    #[test]
    fn test_temporal_carried_to_envelope() {
        let range = TimeRange::parse("2024-01-01T00:00:00Z/2024-01-02T00:00:00Z").unwrap();
        let grid = world().with_temporal(range);
        let ctx = build_context(&grid, 90.0).unwrap();
        assert_eq!(ctx.temporal(), Some(range));
        assert_eq!(ctx.objective_crs_2d(), CrsCode::Crs84);
    }
}
