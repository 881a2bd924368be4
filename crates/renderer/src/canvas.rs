//! Scene rendering.
//!
//! A pass goes through two phases. Layers are turned into lazy presentation
//! streams, then the combined stream is drained onto the surface, followed
//! by the label pass. Failures are scoped to the layer or presentation that
//! raised them; the rest of the scene still renders.

use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use map_common::{Geometry, Point};
use projection::Affine2D;
use tracing::{debug, info, Level};

use crate::context::{PaintSession, RenderingContext};
use crate::coverage::{paint_coverage, read_for_view};
use crate::error::{RenderError, Result};
use crate::layer::{MapLayer, Resource, Scene, SceneLayer};
use crate::presentation::{LabelPresentation, Presentation, Presentations, ShapePresentation};
use crate::surface::DrawSurface;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderState {
    Prepared,
    Rendering,
    Finished,
    /// Stop requested by the monitor. Not an error.
    Stopped,
}

/// Caller-side observer of a pass.
pub trait Monitor: Send + Sync {
    fn stop_requested(&self) -> bool;

    /// Notified of every recovered failure. Must not panic.
    fn exception_occurred(&self, error: &RenderError, level: Level) {
        let _ = (error, level);
    }
}

/// Monitor that never stops.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullMonitor;

impl Monitor for NullMonitor {
    fn stop_requested(&self) -> bool {
        false
    }
}

/// Shared stop signal.
#[derive(Debug, Default)]
pub struct CancelFlag {
    stop: AtomicBool,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.stop.store(false, Ordering::SeqCst);
    }
}

impl Monitor for CancelFlag {
    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

/// A failure recovered during a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerFailure {
    pub layer: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderOutcome {
    pub state: RenderState,
    /// Whether anything reached the surface.
    pub painted: bool,
    pub failures: Vec<LayerFailure>,
    pub labels_drawn: usize,
}

impl RenderOutcome {
    fn new() -> Self {
        Self {
            state: RenderState::Prepared,
            painted: false,
            failures: Vec::new(),
            labels_drawn: 0,
        }
    }

    fn record(&mut self, monitor: &dyn Monitor, layer: &str, error: &RenderError) {
        info!(layer = %layer, error = %error, "Layer failed, continuing with the next one");
        monitor.exception_occurred(error, Level::INFO);
        self.failures.push(LayerFailure {
            layer: layer.to_string(),
            message: error.to_string(),
        });
    }
}

/// Writes a lone raster layer without going through presentations.
pub trait RasterFastPath: Send + Sync {
    /// `Ok(None)` declines, and the general pipeline runs instead.
    /// Otherwise returns whether anything was painted.
    fn write(
        &self,
        ctx: &RenderingContext,
        session: &mut PaintSession<'_>,
        layer: &MapLayer,
    ) -> Result<Option<bool>>;
}

/// Reads the coverage for the view and paints it straight away.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectRasterWriter;

impl RasterFastPath for DirectRasterWriter {
    fn write(
        &self,
        ctx: &RenderingContext,
        session: &mut PaintSession<'_>,
        layer: &MapLayer,
    ) -> Result<Option<bool>> {
        let Resource::Coverage(source) = &layer.resource else {
            return Ok(None);
        };
        match read_for_view(ctx, source.as_ref())? {
            Some(coverage) => paint_coverage(ctx, session, &coverage, layer.opacity).map(Some),
            None => Ok(Some(false)),
        }
    }
}

/// Always declines.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFastPath;

impl RasterFastPath for NoFastPath {
    fn write(&self, _: &RenderingContext, _: &mut PaintSession<'_>, _: &MapLayer) -> Result<Option<bool>> {
        Ok(None)
    }
}

#[derive(Clone)]
pub struct SceneRenderer {
    fast_path: Arc<dyn RasterFastPath>,
}

impl Default for SceneRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SceneRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneRenderer").finish_non_exhaustive()
    }
}

impl SceneRenderer {
    pub fn new() -> Self {
        Self {
            fast_path: Arc::new(DirectRasterWriter),
        }
    }

    pub fn with_fast_path(fast_path: Arc<dyn RasterFastPath>) -> Self {
        Self { fast_path }
    }

    /// Render `scene` onto `surface`, which must match the canvas size.
    ///
    /// Only an unusable surface is an error. Layer failures are recorded in
    /// the outcome. The monitor is polled before each layer; on a stop the
    /// layers accepted so far are still painted and the outcome is
    /// [`RenderState::Stopped`].
    pub fn render(
        &self,
        ctx: &RenderingContext,
        surface: &mut dyn DrawSurface,
        scene: &Scene,
        monitor: &dyn Monitor,
    ) -> Result<RenderOutcome> {
        let mut session = Self::begin(ctx, surface)?;
        let mut outcome = self.paint_layers(ctx, &mut session, scene, monitor);
        outcome.labels_drawn = session.render_labels(ctx);
        outcome.painted |= outcome.labels_drawn > 0;
        debug!(
            state = ?outcome.state,
            painted = outcome.painted,
            failures = outcome.failures.len(),
            labels = outcome.labels_drawn,
            switches = session.transform_switches(),
            "Render pass finished"
        );
        Ok(outcome)
    }

    /// Like [`render`](Self::render), but the queued labels are returned
    /// instead of being decimated and drawn, for a caller that places
    /// labels over a larger canvas.
    pub fn render_deferring_labels(
        &self,
        ctx: &RenderingContext,
        surface: &mut dyn DrawSurface,
        scene: &Scene,
        monitor: &dyn Monitor,
    ) -> Result<(RenderOutcome, Vec<LabelPresentation>)> {
        let mut session = Self::begin(ctx, surface)?;
        let outcome = self.paint_layers(ctx, &mut session, scene, monitor);
        let labels = session.finish().into_queued();
        Ok((outcome, labels))
    }

    fn begin<'s>(ctx: &RenderingContext, surface: &'s mut dyn DrawSurface) -> Result<PaintSession<'s>> {
        let canvas = ctx.canvas_display_bounds();
        let (width, height) = surface.size();
        if width as f64 != canvas.width() || height as f64 != canvas.height() {
            return Err(RenderError::surface(format!(
                "surface is {}x{} but the canvas is {}x{}",
                width,
                height,
                canvas.width(),
                canvas.height()
            )));
        }
        let mut session = PaintSession::new(ctx, surface);
        if let Some(background) = ctx.config().background {
            session.surface().clear(background);
        }
        Ok(session)
    }

    /// Every layer in z-order; labels stay queued in the session.
    fn paint_layers(
        &self,
        ctx: &RenderingContext,
        session: &mut PaintSession<'_>,
        scene: &Scene,
        monitor: &dyn Monitor,
    ) -> RenderOutcome {
        let mut outcome = RenderOutcome::new();
        let layers = scene.flatten();
        if let Some(layer) = self.fast_path_layer(ctx, &layers) {
            if monitor.stop_requested() {
                outcome.state = RenderState::Stopped;
                return outcome;
            }
            outcome.state = RenderState::Rendering;
            match self.fast_path.write(ctx, session, layer) {
                Ok(Some(painted)) => {
                    debug!(layer = %layer.name, painted = painted, "Raster layer written directly");
                    outcome.painted = painted;
                    outcome.state = RenderState::Finished;
                    return outcome;
                }
                Ok(None) => {}
                Err(e) => {
                    outcome.record(monitor, &layer.name, &e);
                    outcome.state = RenderState::Finished;
                    return outcome;
                }
            }
        }

        outcome.state = RenderState::Rendering;
        let mut pending: Vec<Presentations<'_>> = Vec::new();
        for layer in layers {
            if monitor.stop_requested() {
                debug!(layer = %layer.name(), "Stop requested");
                // layers already taken in are kept, later ones are skipped
                self.drain(ctx, session, &mut pending, &mut outcome, monitor);
                outcome.state = RenderState::Stopped;
                return outcome;
            }
            match layer {
                SceneLayer::Portrayed(map_layer) => match layer_presentations(ctx, map_layer) {
                    Ok(stream) => pending.push(stream),
                    Err(e) => outcome.record(monitor, &map_layer.name, &e),
                },
                SceneLayer::Direct(direct) => {
                    // layers below must be on the surface first
                    self.drain(ctx, session, &mut pending, &mut outcome, monitor);
                    match direct.painter.paint(ctx, session) {
                        Ok(painted) => outcome.painted |= painted,
                        Err(e) => outcome.record(monitor, &direct.name, &e),
                    }
                }
            }
        }
        self.drain(ctx, session, &mut pending, &mut outcome, monitor);
        outcome.state = RenderState::Finished;
        outcome
    }

    /// Presentations of every visible portrayed layer, in paint order,
    /// without painting anything. Failures appear as exception
    /// presentations.
    pub fn present<'a>(&'a self, ctx: &'a RenderingContext, scene: &'a Scene) -> Presentations<'a> {
        Box::new(
            scene
                .flatten()
                .into_iter()
                .filter_map(|layer| match layer {
                    SceneLayer::Portrayed(map_layer) => Some(map_layer),
                    SceneLayer::Direct(_) => None,
                })
                .flat_map(move |layer| {
                    layer_presentations(ctx, layer).unwrap_or_else(|e| {
                        Box::new(std::iter::once(Presentation::exception(&layer.name, &e)))
                    })
                }),
        )
    }

    fn fast_path_layer<'a>(&self, ctx: &RenderingContext, layers: &[&'a SceneLayer]) -> Option<&'a MapLayer> {
        if !ctx.config().raster_fast_path {
            return None;
        }
        let [only] = layers else {
            return None;
        };
        match *only {
            SceneLayer::Portrayed(layer)
                if layer.resource.is_coverage()
                    && layer.extensions.is_empty()
                    && layer.style.is_default_raster() =>
            {
                Some(layer)
            }
            _ => None,
        }
    }

    fn drain(
        &self,
        ctx: &RenderingContext,
        session: &mut PaintSession<'_>,
        pending: &mut Vec<Presentations<'_>>,
        outcome: &mut RenderOutcome,
        monitor: &dyn Monitor,
    ) {
        for stream in pending.drain(..) {
            for presentation in stream {
                paint_presentation(ctx, session, presentation, outcome, monitor);
            }
        }
    }
}

/// The style stream of a layer followed by its extensions' streams, with
/// failed items turned into exception presentations.
pub(crate) fn layer_presentations<'a>(
    ctx: &'a RenderingContext,
    layer: &'a MapLayer,
) -> Result<Presentations<'a>> {
    let name = layer.name.as_str();
    let styled = layer.style.presentations(ctx, layer)?;
    let extended = layer.extensions.iter().flat_map(move |extension| {
        extension
            .presentations(ctx, layer)
            .unwrap_or_else(|e| Box::new(std::iter::once(Err(e))))
    });
    Ok(Box::new(styled.chain(extended).map(move |item| {
        item.unwrap_or_else(|e| Presentation::exception(name, &e))
    })))
}

fn paint_presentation(
    ctx: &RenderingContext,
    session: &mut PaintSession<'_>,
    presentation: Presentation,
    outcome: &mut RenderOutcome,
    monitor: &dyn Monitor,
) {
    let layer = presentation.layer().to_string();
    let result = match presentation {
        Presentation::Shape(shape) => paint_shape(ctx, session, &shape),
        Presentation::Label(label) => {
            session.labels().queue(label);
            Ok(false)
        }
        Presentation::Coverage(coverage) => {
            paint_coverage(ctx, session, &coverage.coverage, coverage.opacity)
        }
        Presentation::Group(group) => {
            for child in group.children {
                paint_presentation(ctx, session, child, outcome, monitor);
            }
            Ok(false)
        }
        Presentation::Exception(exception) => Err(RenderError::portrayal(exception.message)),
    };
    match result {
        Ok(painted) => outcome.painted |= painted,
        Err(e) => outcome.record(monitor, &layer, &e),
    }
}

fn to_display(geometry: &Geometry, transform: &Affine2D) -> Geometry {
    let mut apply = |p: Point| -> std::result::Result<Point, Infallible> { Ok(transform.apply(p)) };
    match geometry.try_map(&mut apply) {
        Ok(g) => g,
        Err(never) => match never {},
    }
}

/// Paint a shape on every replica where it reaches the clip area.
fn paint_shape(
    ctx: &RenderingContext,
    session: &mut PaintSession<'_>,
    shape: &ShapePresentation,
) -> Result<bool> {
    let to_objective = ctx.data_to_objective(shape.crs)?;
    let objective = shape
        .geometry
        .try_map(&mut |p| to_objective.transform_point(p))?;
    let bbox = objective.bbox();
    if bbox.is_empty() {
        return Ok(false);
    }

    session.switch_to_display();
    let mut painted = false;
    for replica in ctx.replicas_for(&bbox) {
        let display = to_display(&objective, &replica.objective_to_display);
        if !display
            .bbox()
            .expand(shape.hit_tolerance())
            .intersects(ctx.display_clip())
        {
            continue;
        }
        painted |= draw_geometry(session.surface(), &display, shape)?;
    }
    Ok(painted)
}

fn draw_geometry(surface: &mut dyn DrawSurface, geometry: &Geometry, shape: &ShapePresentation) -> Result<bool> {
    match geometry {
        Geometry::Point(p) => match shape.fill.or(shape.stroke.map(|s| s.color)) {
            Some(color) if shape.point_radius > 0.0 => {
                surface.fill_circle(*p, shape.point_radius, color)?;
                Ok(true)
            }
            _ => Ok(false),
        },
        Geometry::LineString(line) => match &shape.stroke {
            Some(stroke) if line.points().len() >= 2 => {
                surface.stroke_path(line.points(), false, stroke)?;
                Ok(true)
            }
            _ => Ok(false),
        },
        Geometry::Polygon(polygon) => {
            let mut painted = false;
            if let Some(fill) = shape.fill {
                surface.fill_polygon(polygon, fill)?;
                painted = true;
            }
            if let Some(stroke) = &shape.stroke {
                for ring in polygon.rings() {
                    surface.stroke_path(ring, true, stroke)?;
                    painted = true;
                }
            }
            Ok(painted)
        }
        Geometry::Collection(items) => {
            let mut painted = false;
            for item in items {
                painted |= draw_geometry(surface, item, shape)?;
            }
            Ok(painted)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::build_context;
    use crate::layer::{Feature, MemoryFeatures};
    use crate::style::SimpleStyle;
    use crate::surface::PixmapSurface;
    use map_common::{BoundingBox, CrsCode, GridGeometry, LineString};

    fn ctx() -> RenderingContext {
        let grid = GridGeometry::from_bbox(
            &BoundingBox::new(-180.0, -90.0, 180.0, 90.0),
            CrsCode::Crs84,
            360,
            180,
        )
        .unwrap();
        build_context(&grid, 90.0).unwrap()
    }

    fn line_layer(name: &str, features: Vec<Feature>) -> MapLayer {
        MapLayer::new(
            name,
            Resource::Features(Arc::new(MemoryFeatures::new(CrsCode::Crs84, features))),
            Arc::new(SimpleStyle::default()),
        )
    }

    #[test]
    fn test_surface_size_checked() {
        let ctx = ctx();
        let mut surface = PixmapSurface::new(10, 10).unwrap();
        let result = SceneRenderer::new().render(&ctx, &mut surface, &Scene::new(), &NullMonitor);
        assert!(matches!(result, Err(RenderError::Surface(_))));
    }

    #[test]
    fn test_empty_scene_finishes_unpainted() {
        let ctx = ctx();
        let mut surface = PixmapSurface::new(360, 180).unwrap();
        let outcome = SceneRenderer::new()
            .render(&ctx, &mut surface, &Scene::new(), &NullMonitor)
            .unwrap();
        assert_eq!(outcome.state, RenderState::Finished);
        assert!(!outcome.painted);
    }

    #[test]
    fn test_line_crossing_antimeridian_painted_on_both_sides() {
        let ctx = ctx();
        let line = Feature::new(
            "route",
            Geometry::LineString(LineString::new(vec![
                Point::new(170.0, 0.0),
                Point::new(190.0, 0.0),
            ])),
        );
        let scene = Scene::new().with_layer(line_layer("routes", vec![line]));
        let mut surface = PixmapSurface::new(360, 180).unwrap();
        let outcome = SceneRenderer::new()
            .render(&ctx, &mut surface, &scene, &NullMonitor)
            .unwrap();
        assert!(outcome.painted);
        // 175E on the base copy, 175W through the decreasing replica
        assert!(surface.pixel(355, 90).unwrap()[3] > 0);
        assert!(surface.pixel(5, 90).unwrap()[3] > 0);
        assert_eq!(surface.pixel(180, 90).unwrap()[3], 0);
    }

    #[test]
    fn test_present_reports_failures_inline() {
        let ctx = ctx();
        let broken = MapLayer::new(
            "broken",
            Resource::Features(Arc::new(MemoryFeatures::new(CrsCode::Engineering, Vec::new()))),
            Arc::new(SimpleStyle::default()),
        );
        let ok = line_layer(
            "points",
            vec![Feature::new("p", Geometry::Point(Point::new(0.0, 0.0)))],
        );
        let scene = Scene::new().with_layer(broken).with_layer(ok);
        let renderer = SceneRenderer::new();
        let out: Vec<Presentation> = renderer.present(&ctx, &scene).collect();
        assert_eq!(out.len(), 2);
        assert!(matches!(out[0], Presentation::Exception(_)));
        assert_eq!(out[1].feature_id(), Some("p"));
    }
}
