//! Reverse queries: which presentations are under a display region.

use std::sync::Arc;

use map_common::{BoundingBox, CrsCode, Geometry, Point, Polygon};
use tracing::{debug, info, warn};

use crate::cache::LengthUnit;
use crate::canvas::{layer_presentations, LayerFailure, Monitor};
use crate::context::RenderingContext;
use crate::error::Result;
use crate::layer::{Scene, SceneLayer};
use crate::presentation::{CoveragePresentation, LabelPresentation, Presentation, ShapePresentation};

/// The query region in display and objective space.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchArea {
    display: Polygon,
    objective: Polygon,
    display_bbox: BoundingBox,
    objective_bbox: BoundingBox,
}

impl SearchArea {
    pub fn new(ctx: &RenderingContext, display: Polygon) -> Self {
        let to_objective = ctx.view().display_to_objective();
        let map_ring = |ring: &[Point]| -> Vec<Point> { ring.iter().map(|p| to_objective.apply(*p)).collect() };
        let objective = Polygon::with_interiors(
            map_ring(display.exterior.as_slice()),
            display.interiors.iter().map(|r| map_ring(r.as_slice())).collect(),
        );
        Self {
            display_bbox: display.bbox(),
            objective_bbox: objective.bbox(),
            display,
            objective,
        }
    }

    /// Square of `2 * radius` pixels centred on a display position.
    pub fn from_display_point(ctx: &RenderingContext, p: Point, radius: f64) -> Self {
        let bbox = BoundingBox::new(p.x - radius, p.y - radius, p.x + radius, p.y + radius);
        Self::new(ctx, Polygon::from_bbox(&bbox))
    }

    pub fn display(&self) -> &Polygon {
        &self.display
    }

    pub fn objective(&self) -> &Polygon {
        &self.objective
    }

    pub fn display_bbox(&self) -> &BoundingBox {
        &self.display_bbox
    }

    pub fn objective_bbox(&self) -> &BoundingBox {
        &self.objective_bbox
    }
}

/// Receives every presentation found under the search area.
pub trait Visitor {
    fn visit(&mut self, presentation: &Presentation);

    fn is_stop_requested(&self) -> bool {
        false
    }
}

/// Visitor collecting hits, optionally stopping after `limit` of them.
#[derive(Debug, Default)]
pub struct CollectingVisitor {
    pub hits: Vec<Presentation>,
    pub limit: Option<usize>,
}

impl CollectingVisitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            hits: Vec::new(),
            limit: Some(limit),
        }
    }
}

impl Visitor for CollectingVisitor {
    fn visit(&mut self, presentation: &Presentation) {
        self.hits.push(presentation.clone());
    }

    fn is_stop_requested(&self) -> bool {
        self.limit.is_some_and(|limit| self.hits.len() >= limit)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HitOutcome {
    /// Leaf presentations tested against the search area.
    pub tested: usize,
    pub hits: usize,
    /// The walk ended early on a visitor or monitor request.
    pub stopped: bool,
    pub failures: Vec<LayerFailure>,
}

#[derive(Default, Clone)]
pub struct HitTester {
    monitor: Option<Arc<dyn Monitor>>,
}

impl std::fmt::Debug for HitTester {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HitTester")
            .field("monitor", &self.monitor.is_some())
            .finish()
    }
}

enum Flow {
    Continue,
    Stop,
}

impl HitTester {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_monitor(monitor: Arc<dyn Monitor>) -> Self {
        Self {
            monitor: Some(monitor),
        }
    }

    fn stop_requested(&self, visitor: &dyn Visitor) -> bool {
        visitor.is_stop_requested() || self.monitor.as_ref().is_some_and(|m| m.stop_requested())
    }

    /// Visit every presentation whose footprint meets `display_shape`,
    /// topmost layer first.
    pub fn hit_test(
        &self,
        ctx: &RenderingContext,
        scene: &Scene,
        display_shape: &Polygon,
        visitor: &mut dyn Visitor,
    ) -> Result<HitOutcome> {
        let area = SearchArea::new(ctx, display_shape.clone());
        let mut outcome = HitOutcome::default();

        for layer in scene.flatten().into_iter().rev() {
            if self.stop_requested(visitor) {
                outcome.stopped = true;
                break;
            }
            let SceneLayer::Portrayed(map_layer) = layer else {
                continue;
            };
            let stream = match layer_presentations(ctx, map_layer) {
                Ok(stream) => stream,
                Err(e) => {
                    info!(layer = %map_layer.name, error = %e, "Skipping layer in hit test");
                    outcome.failures.push(LayerFailure {
                        layer: map_layer.name.clone(),
                        message: e.to_string(),
                    });
                    continue;
                }
            };
            for presentation in stream {
                if let Flow::Stop = self.test(ctx, &area, &presentation, visitor, &mut outcome) {
                    outcome.stopped = true;
                    debug!(tested = outcome.tested, hits = outcome.hits, "Hit test stopped");
                    return Ok(outcome);
                }
            }
        }
        Ok(outcome)
    }

    fn test(
        &self,
        ctx: &RenderingContext,
        area: &SearchArea,
        presentation: &Presentation,
        visitor: &mut dyn Visitor,
        outcome: &mut HitOutcome,
    ) -> Flow {
        let hit = match presentation {
            Presentation::Group(group) => {
                for child in &group.children {
                    if let Flow::Stop = self.test(ctx, area, child, visitor, outcome) {
                        return Flow::Stop;
                    }
                }
                return Flow::Continue;
            }
            Presentation::Exception(exception) => {
                info!(layer = %exception.layer, message = %exception.message, "Skipping failed presentation");
                outcome.failures.push(LayerFailure {
                    layer: exception.layer.clone(),
                    message: exception.message.clone(),
                });
                return Flow::Continue;
            }
            Presentation::Shape(shape) => shape_hit(ctx, area, shape),
            Presentation::Label(label) => label_hit(ctx, area, label),
            Presentation::Coverage(coverage) => coverage_hit(ctx, area, coverage),
        };
        outcome.tested += 1;

        match hit {
            Ok(false) => {}
            Ok(true) => {
                outcome.hits += 1;
                visitor.visit(presentation);
            }
            Err(e) => warn!(layer = %presentation.layer(), error = %e, "Hit test failed for presentation"),
        }
        if self.stop_requested(visitor) {
            Flow::Stop
        } else {
            Flow::Continue
        }
    }
}

fn objective_geometry(ctx: &RenderingContext, crs: CrsCode, geometry: &Geometry) -> Result<Geometry> {
    let to_objective = ctx.data_to_objective(crs)?;
    Ok(geometry.try_map(&mut |p| to_objective.transform_point(p))?)
}

/// Whether any replica of an objective geometry meets the display area.
fn replicas_meet(ctx: &RenderingContext, area: &SearchArea, objective: &Geometry, tolerance_px: f64) -> bool {
    let bbox = objective.bbox();
    if bbox.is_empty() {
        return false;
    }
    if ctx.wrap().is_none() {
        let tolerance = tolerance_px * ctx.unit_to_objective(LengthUnit::Pixel);
        if !bbox.expand(tolerance).intersects(area.objective_bbox()) {
            return false;
        }
    }
    ctx.replicas_for(&bbox).iter().any(|replica| {
        let t = replica.objective_to_display;
        let mut apply = |p: Point| -> std::result::Result<Point, std::convert::Infallible> { Ok(t.apply(p)) };
        match objective.try_map(&mut apply) {
            Ok(display) => display.intersects_polygon(area.display(), tolerance_px),
            Err(never) => match never {},
        }
    })
}

fn shape_hit(ctx: &RenderingContext, area: &SearchArea, shape: &ShapePresentation) -> Result<bool> {
    let objective = objective_geometry(ctx, shape.crs, &shape.geometry)?;
    Ok(replicas_meet(ctx, area, &objective, shape.hit_tolerance()))
}

fn label_hit(ctx: &RenderingContext, area: &SearchArea, label: &LabelPresentation) -> Result<bool> {
    let objective = objective_geometry(ctx, label.crs, &Geometry::Point(label.anchor))?;
    Ok(replicas_meet(ctx, area, &objective, label.size as f64 / 2.0))
}

fn coverage_hit(ctx: &RenderingContext, area: &SearchArea, coverage: &CoveragePresentation) -> Result<bool> {
    let footprint = coverage.coverage.footprint();
    if footprint.is_empty() {
        return Ok(false);
    }
    let to_objective = ctx.data_to_objective(coverage.coverage.grid().crs)?;
    let objective = to_objective.transform_bbox(&footprint)?;
    Ok(replicas_meet(
        ctx,
        area,
        &Geometry::Polygon(Polygon::from_bbox(&objective)),
        0.0,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::build_context;
    use crate::layer::{Feature, MapLayer, MemoryFeatures, Resource};
    use crate::style::SimpleStyle;
    use map_common::GridGeometry;

    fn ctx() -> RenderingContext {
        let grid = GridGeometry::from_bbox(
            &BoundingBox::new(0.0, 0.0, 100.0, 100.0),
            CrsCode::Engineering,
            100,
            100,
        )
        .unwrap();
        build_context(&grid, 90.0).unwrap()
    }

    fn points(name: &str, at: &[(f64, f64)]) -> MapLayer {
        let features = at
            .iter()
            .enumerate()
            .map(|(i, (x, y))| Feature::new(format!("{}-{}", name, i), Geometry::Point(Point::new(*x, *y))))
            .collect();
        MapLayer::new(
            name,
            Resource::Features(Arc::new(MemoryFeatures::new(CrsCode::Engineering, features))),
            Arc::new(SimpleStyle::default()),
        )
    }

    #[test]
    fn test_search_area_flips_to_objective() {
        let ctx = ctx();
        let area = SearchArea::from_display_point(&ctx, Point::new(10.0, 10.0), 2.0);
        // display row 10 is objective y 90
        assert_eq!(*area.objective_bbox(), BoundingBox::new(8.0, 88.0, 12.0, 92.0));
    }

    #[test]
    fn test_topmost_layer_visited_first() {
        let ctx = ctx();
        let scene = Scene::new()
            .with_layer(points("bottom", &[(50.0, 50.0)]))
            .with_layer(points("top", &[(50.0, 50.0), (5.0, 5.0)]));
        let area = Polygon::from_bbox(&BoundingBox::new(48.0, 48.0, 52.0, 52.0));
        let mut visitor = CollectingVisitor::new();
        let outcome = HitTester::new().hit_test(&ctx, &scene, &area, &mut visitor).unwrap();
        let layers: Vec<&str> = visitor.hits.iter().map(|p| p.layer()).collect();
        assert_eq!(layers, vec!["top", "bottom"]);
        assert_eq!(outcome.tested, 3);
        assert!(!outcome.stopped);
    }

    #[test]
    fn test_point_radius_counts_as_footprint() {
        let ctx = ctx();
        let scene = Scene::new().with_layer(points("p", &[(50.0, 50.0)]));
        // 2 px left of the marker, inside its 3 px radius
        let area = Polygon::from_bbox(&BoundingBox::new(46.0, 49.0, 48.0, 51.0));
        let mut visitor = CollectingVisitor::new();
        let outcome = HitTester::new().hit_test(&ctx, &scene, &area, &mut visitor).unwrap();
        assert_eq!(outcome.hits, 1);
    }
}
