//! Tests for hit testing a scene under a display region.

mod common;

use std::sync::Arc;

use common::{feature_layer, point_feature, raster_layer, stroke_style, BrokenFeatures};
use map_common::{BoundingBox, CrsCode, Point, Polygon};
use renderer::{
    build_context, CancelFlag, CollectingVisitor, HitTester, MapLayer, Presentation, RenderingContext,
    Resource, Scene, SearchArea, SimpleStyle, Visitor,
};
use test_utils::{create_solid_image, segment_line, world_grid};

fn world_ctx() -> RenderingContext {
    build_context(&world_grid(360, 180), 90.0).unwrap()
}

fn points(name: &str, at: &[(f64, f64)]) -> MapLayer {
    let features = at
        .iter()
        .enumerate()
        .map(|(i, (x, y))| point_feature(&format!("{}-{}", name, i), *x, *y))
        .collect();
    feature_layer(name, CrsCode::Crs84, features, SimpleStyle::default())
}

/// Display square of `2 * radius` pixels around `(x, y)`.
fn square(x: f64, y: f64, radius: f64) -> Polygon {
    Polygon::from_bbox(&BoundingBox::new(x - radius, y - radius, x + radius, y + radius))
}

/// Stops after the first hit and remembers what it saw.
#[derive(Default)]
struct FirstHit {
    seen: Vec<String>,
}

impl Visitor for FirstHit {
    fn visit(&mut self, presentation: &Presentation) {
        self.seen.push(presentation.layer().to_string());
    }

    fn is_stop_requested(&self) -> bool {
        !self.seen.is_empty()
    }
}

#[test]
fn test_stop_after_first_match_skips_lower_layers() {
    let ctx = world_ctx();
    let scene = Scene::new()
        .with_layer(points("bottom", &[(0.0, 0.0), (1.0, 0.0)]))
        .with_layer(points("middle", &[(0.0, 0.0)]))
        .with_layer(points("top", &[(0.0, 0.0)]));
    let mut visitor = FirstHit::default();

    let outcome = HitTester::new()
        .hit_test(&ctx, &scene, &square(180.0, 90.0, 2.0), &mut visitor)
        .unwrap();

    assert_eq!(visitor.seen, vec!["top"]);
    assert!(outcome.stopped);
    assert_eq!(outcome.tested, 1);
    assert_eq!(outcome.hits, 1);
}

#[test]
fn test_collects_every_layer_without_limit() {
    let ctx = world_ctx();
    let scene = Scene::new()
        .with_layer(points("bottom", &[(0.0, 0.0), (60.0, 0.0)]))
        .with_layer(points("top", &[(0.0, 0.0)]));
    let mut visitor = CollectingVisitor::new();

    let outcome = HitTester::new()
        .hit_test(&ctx, &scene, &square(180.0, 90.0, 2.0), &mut visitor)
        .unwrap();

    let layers: Vec<&str> = visitor.hits.iter().map(|p| p.layer()).collect();
    assert_eq!(layers, vec!["top", "bottom"]);
    assert_eq!(outcome.tested, 3);
    assert!(!outcome.stopped);
}

#[test]
fn test_limit_visitor_stops_walk() {
    let ctx = world_ctx();
    let scene = Scene::new()
        .with_layer(points("bottom", &[(0.0, 0.0)]))
        .with_layer(points("top", &[(0.0, 0.0), (0.5, 0.0)]));
    let mut visitor = CollectingVisitor::with_limit(2);
    let outcome = HitTester::new()
        .hit_test(&ctx, &scene, &square(180.0, 90.0, 2.0), &mut visitor)
        .unwrap();
    assert_eq!(outcome.tested, 2);
    assert!(visitor.hits.iter().all(|p| p.layer() == "top"));
}

#[test]
fn test_monitor_stop_before_walk() {
    let ctx = world_ctx();
    let scene = Scene::new().with_layer(points("p", &[(0.0, 0.0)]));
    let cancel = Arc::new(CancelFlag::new());
    cancel.cancel();
    let mut visitor = CollectingVisitor::new();
    let outcome = HitTester::with_monitor(cancel)
        .hit_test(&ctx, &scene, &square(180.0, 90.0, 2.0), &mut visitor)
        .unwrap();
    assert!(outcome.stopped);
    assert_eq!(outcome.tested, 0);
}

#[test]
fn test_hit_on_wrapped_replica() {
    let ctx = world_ctx();
    // 190E shows at 170W, display column 10
    let scene = Scene::new().with_layer(points("far-east", &[(190.0, 0.0)]));
    let mut visitor = CollectingVisitor::new();
    let outcome = HitTester::new()
        .hit_test(&ctx, &scene, &square(10.0, 90.0, 1.0), &mut visitor)
        .unwrap();
    assert_eq!(outcome.hits, 1);
}

#[test]
fn test_hit_mercator_layer_on_world_view() {
    let ctx = world_ctx();
    let layer = feature_layer(
        "mercator",
        CrsCode::Epsg3857,
        vec![point_feature("origin", 0.0, 0.0)],
        SimpleStyle::default(),
    );
    let scene = Scene::new().with_layer(layer);
    let mut visitor = CollectingVisitor::new();
    let outcome = HitTester::new()
        .hit_test(&ctx, &scene, &square(180.0, 90.0, 2.0), &mut visitor)
        .unwrap();
    assert!(outcome.failures.is_empty());
    assert_eq!(outcome.hits, 1);
}

#[test]
fn test_line_stroke_width_is_tolerance() {
    let ctx = world_ctx();
    let layer = feature_layer(
        "roads",
        CrsCode::Crs84,
        vec![renderer::Feature::new("r", segment_line((-30.0, 0.0), (30.0, 0.0)))],
        stroke_style([0, 0, 0, 255], 8.0),
    );
    let scene = Scene::new().with_layer(layer);

    // 3 px above the line, within half of the 8 px stroke
    let mut visitor = CollectingVisitor::new();
    HitTester::new()
        .hit_test(&ctx, &scene, &square(180.0, 87.0, 0.5), &mut visitor)
        .unwrap();
    assert_eq!(visitor.hits.len(), 1);

    let mut visitor = CollectingVisitor::new();
    HitTester::new()
        .hit_test(&ctx, &scene, &square(180.0, 80.0, 0.5), &mut visitor)
        .unwrap();
    assert!(visitor.hits.is_empty());
}

#[test]
fn test_coverage_footprint_hit() {
    let ctx = world_ctx();
    let coverage_grid = test_utils::view_grid((0.0, 0.0, 20.0, 20.0), CrsCode::Crs84, 4, 4);
    let scene = Scene::new().with_layer(raster_layer(
        "patch",
        coverage_grid,
        create_solid_image(4, 4, [9, 9, 9, 255]),
    ));

    let mut visitor = CollectingVisitor::new();
    HitTester::new()
        .hit_test(&ctx, &scene, &square(190.0, 80.0, 1.0), &mut visitor)
        .unwrap();
    assert_eq!(visitor.hits.len(), 1);
    assert!(matches!(visitor.hits[0], Presentation::Coverage(_)));

    let mut visitor = CollectingVisitor::new();
    HitTester::new()
        .hit_test(&ctx, &scene, &square(100.0, 80.0, 1.0), &mut visitor)
        .unwrap();
    assert!(visitor.hits.is_empty());
}

#[test]
fn test_failed_layer_skipped() {
    let ctx = world_ctx();
    let broken = MapLayer::new(
        "broken",
        Resource::Features(Arc::new(BrokenFeatures)),
        Arc::new(SimpleStyle::default()),
    );
    let scene = Scene::new()
        .with_layer(points("ok", &[(0.0, 0.0)]))
        .with_layer(broken);
    let mut visitor = CollectingVisitor::new();
    let outcome = HitTester::new()
        .hit_test(&ctx, &scene, &square(180.0, 90.0, 2.0), &mut visitor)
        .unwrap();
    assert_eq!(outcome.hits, 1);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].layer, "broken");
}

#[test]
fn test_search_area_from_point() {
    let ctx = world_ctx();
    let area = SearchArea::from_display_point(&ctx, Point::new(180.0, 90.0), 5.0);
    assert_eq!(*area.objective_bbox(), BoundingBox::new(-5.0, -5.0, 5.0, 5.0));
    assert_eq!(*area.display_bbox(), BoundingBox::new(175.0, 85.0, 185.0, 95.0));
}
