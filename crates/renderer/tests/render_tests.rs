//! Tests for the scene rendering pipeline.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::{
    feature_layer, point_feature, raster_layer, stroke_style, BrokenFeatures, Call, RecordingSurface,
};
use map_common::{BoundingBox, CrsCode, Point};
use renderer::layer::FeatureIter;
use renderer::{
    build_context, render_tiles, CancelFlag, DirectLayer, DirectPainter, DirectRasterWriter, Feature,
    FeatureSource, LabelRule, MapLayer, Monitor, NoFastPath, NullMonitor, PaintSession, PixmapSurface,
    RasterFastPath, RenderError, RenderState, RendererConfig, RenderingContext, RenderingContextBuilder,
    Resource, Scene, SceneRenderer, SimpleStyle,
};
use test_utils::{create_index_image, segment_line, view_grid, world_grid};

const RED: [u8; 4] = [255, 0, 0, 255];
const GREEN: [u8; 4] = [0, 255, 0, 255];
const BLUE: [u8; 4] = [0, 0, 255, 255];

fn world_ctx() -> RenderingContext {
    build_context(&world_grid(360, 180), 90.0).unwrap()
}

fn line_layer(name: &str, color: [u8; 4], from: (f64, f64), to: (f64, f64)) -> MapLayer {
    feature_layer(
        name,
        CrsCode::Crs84,
        vec![Feature::new(format!("{}-line", name), segment_line(from, to))],
        stroke_style(color, 2.0),
    )
}

/// Counts failures reported to the monitor.
#[derive(Debug, Default)]
struct CountingMonitor {
    exceptions: AtomicUsize,
}

impl Monitor for CountingMonitor {
    fn stop_requested(&self) -> bool {
        false
    }

    fn exception_occurred(&self, _error: &RenderError, _level: tracing::Level) {
        self.exceptions.fetch_add(1, Ordering::SeqCst);
    }
}

/// Allows `polls` stop checks, then asks to stop.
#[derive(Debug)]
struct StopAfter {
    polls: AtomicUsize,
}

impl Monitor for StopAfter {
    fn stop_requested(&self) -> bool {
        self.polls
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_err()
    }
}

/// Every second feature fails to decode.
#[derive(Debug)]
struct FlakyFeatures;

impl FeatureSource for FlakyFeatures {
    fn crs(&self) -> CrsCode {
        CrsCode::Crs84
    }

    fn features<'a>(&'a self, _region: &BoundingBox) -> renderer::Result<FeatureIter<'a>> {
        Ok(Box::new((0..4).map(|i| {
            if i % 2 == 0 {
                Ok(point_feature(&format!("ok-{}", i), i as f64 * 10.0, 0.0))
            } else {
                Err(RenderError::store(format!("bad record {}", i)))
            }
        })))
    }
}

struct Marker;

impl DirectPainter for Marker {
    fn paint(&self, _ctx: &RenderingContext, session: &mut PaintSession<'_>) -> renderer::Result<bool> {
        session.switch_to_display();
        session.surface().fill_circle(Point::new(20.0, 20.0), 4.0, GREEN)?;
        Ok(true)
    }
}

struct FailingPainter;

impl DirectPainter for FailingPainter {
    fn paint(&self, _ctx: &RenderingContext, _session: &mut PaintSession<'_>) -> renderer::Result<bool> {
        Err(RenderError::portrayal("painter crashed"))
    }
}

/// Delegates to [`DirectRasterWriter`] and counts invocations.
#[derive(Debug, Default)]
struct CountingFastPath {
    calls: AtomicUsize,
}

impl RasterFastPath for CountingFastPath {
    fn write(
        &self,
        ctx: &RenderingContext,
        session: &mut PaintSession<'_>,
        layer: &MapLayer,
    ) -> renderer::Result<Option<bool>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        DirectRasterWriter.write(ctx, session, layer)
    }
}

// ============================================================================
// Failure isolation
// ============================================================================

#[test]
fn test_broken_layer_does_not_stop_the_pass() {
    let ctx = world_ctx();
    let broken = MapLayer::new(
        "broken",
        Resource::Features(Arc::new(BrokenFeatures)),
        Arc::new(SimpleStyle::default()),
    );
    let scene = Scene::new()
        .with_layer(broken)
        .with_layer(line_layer("roads", RED, (-20.0, 0.0), (20.0, 0.0)));
    let monitor = CountingMonitor::default();
    let mut surface = PixmapSurface::new(360, 180).unwrap();

    let outcome = SceneRenderer::new()
        .render(&ctx, &mut surface, &scene, &monitor)
        .unwrap();

    assert!(outcome.painted);
    assert_eq!(outcome.state, RenderState::Finished);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].layer, "broken");
    assert!(outcome.failures[0].message.contains("connection refused"));
    assert_eq!(monitor.exceptions.load(Ordering::SeqCst), 1);
    // the valid line crosses the canvas centre
    assert!(surface.pixel(180, 90).unwrap()[3] > 0);
}

#[test]
fn test_bad_feature_skipped_others_painted() {
    let ctx = world_ctx();
    let layer = MapLayer::new(
        "flaky",
        Resource::Features(Arc::new(FlakyFeatures)),
        Arc::new(stroke_style(RED, 1.0)),
    );
    let scene = Scene::new().with_layer(layer);
    let mut surface = RecordingSurface::new(360, 180);

    let outcome = SceneRenderer::new()
        .render(&ctx, &mut surface, &scene, &NullMonitor)
        .unwrap();

    assert!(outcome.painted);
    assert_eq!(outcome.failures.len(), 2);
    let circles = surface
        .calls
        .iter()
        .filter(|c| matches!(c, Call::Circle { .. }))
        .count();
    assert_eq!(circles, 2);
}

#[test]
fn test_failing_direct_layer_recorded() {
    let ctx = world_ctx();
    let scene = Scene::new()
        .with_layer(DirectLayer::new("overlay", Arc::new(FailingPainter)))
        .with_layer(line_layer("roads", RED, (-20.0, 0.0), (20.0, 0.0)));
    let mut surface = RecordingSurface::new(360, 180);
    let outcome = SceneRenderer::new()
        .render(&ctx, &mut surface, &scene, &NullMonitor)
        .unwrap();
    assert!(outcome.painted);
    assert_eq!(outcome.failures[0].layer, "overlay");
}

#[test]
fn test_mercator_layer_on_pole_to_pole_view() {
    // the clip margin reaches past the poles of the CRS:84 world view
    let ctx = world_ctx();
    let scene = Scene::new().with_layer(feature_layer(
        "mercator",
        CrsCode::Epsg3857,
        vec![point_feature("origin", 0.0, 0.0), point_feature("north", 0.0, 15_000_000.0)],
        stroke_style(RED, 1.0),
    ));
    let mut surface = RecordingSurface::new(360, 180);

    let outcome = SceneRenderer::new()
        .render(&ctx, &mut surface, &scene, &NullMonitor)
        .unwrap();

    assert!(outcome.failures.is_empty(), "{:?}", outcome.failures);
    assert!(outcome.painted);
    let circles = surface
        .calls
        .iter()
        .filter(|c| matches!(c, Call::Circle { .. }))
        .count();
    assert_eq!(circles, 2);
}

#[test]
fn test_mismatched_surface_is_an_error() {
    let ctx = world_ctx();
    let mut surface = RecordingSurface::new(100, 100);
    let result = SceneRenderer::new().render(&ctx, &mut surface, &Scene::new(), &NullMonitor);
    assert!(matches!(result, Err(RenderError::Surface(_))));
}

// ============================================================================
// Ordering and cancellation
// ============================================================================

#[test]
fn test_direct_layer_painted_between_neighbours() {
    let ctx = world_ctx();
    let scene = Scene::new()
        .with_layer(line_layer("below", RED, (-50.0, 10.0), (50.0, 10.0)))
        .with_layer(DirectLayer::new("marker", Arc::new(Marker)))
        .with_layer(line_layer("above", BLUE, (-50.0, -10.0), (50.0, -10.0)));
    let mut surface = RecordingSurface::new(360, 180);

    let outcome = SceneRenderer::new()
        .render(&ctx, &mut surface, &scene, &NullMonitor)
        .unwrap();

    assert!(outcome.painted);
    let red = surface.first_with_color(RED).unwrap();
    let green = surface.first_with_color(GREEN).unwrap();
    let blue = surface.first_with_color(BLUE).unwrap();
    assert!(red < green && green < blue, "order {} {} {}", red, green, blue);
}

#[test]
fn test_stop_before_first_layer() {
    let ctx = world_ctx();
    let scene = Scene::new().with_layer(line_layer("roads", RED, (-20.0, 0.0), (20.0, 0.0)));
    let cancel = CancelFlag::new();
    cancel.cancel();
    let mut surface = RecordingSurface::new(360, 180);

    let outcome = SceneRenderer::new()
        .render(&ctx, &mut surface, &scene, &cancel)
        .unwrap();

    assert_eq!(outcome.state, RenderState::Stopped);
    assert!(!outcome.painted);
    assert!(surface.draw_calls().is_empty());
}

#[test]
fn test_stop_midway_is_not_an_error() {
    let ctx = world_ctx();
    let scene = Scene::new()
        .with_layer(line_layer("a", RED, (-20.0, 0.0), (20.0, 0.0)))
        .with_layer(line_layer("b", GREEN, (-20.0, 5.0), (20.0, 5.0)))
        .with_layer(line_layer("c", BLUE, (-20.0, 9.0), (20.0, 9.0)));
    let monitor = StopAfter {
        polls: AtomicUsize::new(2),
    };
    let mut surface = RecordingSurface::new(360, 180);

    let outcome = SceneRenderer::new()
        .render(&ctx, &mut surface, &scene, &monitor)
        .unwrap();

    assert_eq!(outcome.state, RenderState::Stopped);
    assert!(outcome.failures.is_empty());
    // layers accepted before the stop are still painted
    assert!(outcome.painted);
    assert!(surface.first_with_color(RED).is_some());
    assert!(surface.first_with_color(GREEN).is_some());
    assert!(surface.first_with_color(BLUE).is_none());
}

#[test]
fn test_background_cleared_first() {
    let config = RendererConfig {
        background: Some([255, 255, 255, 255]),
        ..Default::default()
    };
    let ctx = RenderingContextBuilder::new(world_grid(360, 180))
        .config(config)
        .build()
        .unwrap();
    let scene = Scene::new().with_layer(line_layer("roads", RED, (-20.0, 0.0), (20.0, 0.0)));
    let mut surface = RecordingSurface::new(360, 180);
    SceneRenderer::new()
        .render(&ctx, &mut surface, &scene, &NullMonitor)
        .unwrap();
    assert_eq!(surface.calls.first(), Some(&Call::Clear([255, 255, 255, 255])));
}

// ============================================================================
// Labels
// ============================================================================

#[test]
fn test_overlapping_labels_keep_highest_priority() {
    let ctx = world_ctx();
    let labelled = |name: &str, text: &str, priority: i32| {
        let style = SimpleStyle {
            label: Some(LabelRule {
                attribute: "name".to_string(),
                color: [0, 0, 0, 255],
                size: 12.0,
                priority,
            }),
            ..SimpleStyle::default()
        };
        feature_layer(
            name,
            CrsCode::Crs84,
            vec![point_feature(name, 10.0, 10.0).with_attribute("name", text)],
            style,
        )
    };
    let scene = Scene::new()
        .with_layer(labelled("towns", "Town", 1))
        .with_layer(labelled("capitals", "Capital", 10));
    let mut surface = RecordingSurface::new(360, 180);

    let outcome = SceneRenderer::new()
        .render(&ctx, &mut surface, &scene, &NullMonitor)
        .unwrap();

    assert_eq!(outcome.labels_drawn, 1);
    assert_eq!(surface.texts(), vec!["Capital"]);
    // labels come after every layer
    let last_shape = surface
        .calls
        .iter()
        .rposition(|c| matches!(c, Call::Circle { .. }))
        .unwrap();
    let first_text = surface
        .calls
        .iter()
        .position(|c| matches!(c, Call::Text(_)))
        .unwrap();
    assert!(last_shape < first_text);
}

// ============================================================================
// Rasters
// ============================================================================

fn raster_scene() -> Scene {
    Scene::new().with_layer(raster_layer("sst", world_grid(90, 45), create_index_image(90, 45)))
}

#[test]
fn test_fast_path_matches_general_pipeline() {
    let ctx = build_context(&view_grid((100.0, -60.0, 260.0, 60.0), CrsCode::Crs84, 160, 120), 90.0).unwrap();
    let scene = raster_scene();

    let counting = Arc::new(CountingFastPath::default());
    let mut fast = PixmapSurface::new(160, 120).unwrap();
    let fast_outcome = SceneRenderer::with_fast_path(counting.clone())
        .render(&ctx, &mut fast, &scene, &NullMonitor)
        .unwrap();
    assert_eq!(counting.calls.load(Ordering::SeqCst), 1);

    let mut general = PixmapSurface::new(160, 120).unwrap();
    let general_outcome = SceneRenderer::with_fast_path(Arc::new(NoFastPath))
        .render(&ctx, &mut general, &scene, &NullMonitor)
        .unwrap();

    assert!(fast_outcome.painted && general_outcome.painted);
    assert_eq!(fast.pixmap().data(), general.pixmap().data());
    // east of the antimeridian is filled from the western cells
    assert_eq!(fast.pixel(159, 60).unwrap()[3], 255);
}

#[test]
fn test_fast_path_skipped_for_mixed_scenes() {
    let ctx = world_ctx();
    let scene = raster_scene().with_layer(line_layer("roads", RED, (-20.0, 0.0), (20.0, 0.0)));
    let counting = Arc::new(CountingFastPath::default());
    let mut surface = RecordingSurface::new(360, 180);
    let outcome = SceneRenderer::with_fast_path(counting.clone())
        .render(&ctx, &mut surface, &scene, &NullMonitor)
        .unwrap();
    assert!(outcome.painted);
    assert_eq!(counting.calls.load(Ordering::SeqCst), 0);
    assert!(matches!(surface.draw_calls()[0], Call::Raster { .. }));
}

#[test]
fn test_fast_path_disabled_by_config() {
    let config = RendererConfig {
        raster_fast_path: false,
        ..Default::default()
    };
    let ctx = RenderingContextBuilder::new(world_grid(360, 180))
        .config(config)
        .build()
        .unwrap();
    let counting = Arc::new(CountingFastPath::default());
    let mut surface = RecordingSurface::new(360, 180);
    SceneRenderer::with_fast_path(counting.clone())
        .render(&ctx, &mut surface, &raster_scene(), &NullMonitor)
        .unwrap();
    assert_eq!(counting.calls.load(Ordering::SeqCst), 0);
}

// ============================================================================
// Tiles
// ============================================================================

#[test]
fn test_tiled_render_matches_single_pass() {
    let grid = view_grid((100.0, -60.0, 260.0, 60.0), CrsCode::Crs84, 160, 120);
    let config = RendererConfig::default();
    let scene = raster_scene();
    let renderer = SceneRenderer::new();

    let ctx = RenderingContextBuilder::new(grid.clone())
        .config(config.clone())
        .build()
        .unwrap();
    let mut single = PixmapSurface::new(160, 120).unwrap();
    renderer.render(&ctx, &mut single, &scene, &NullMonitor).unwrap();

    let tiled = render_tiles(&grid, &scene, 48, &config, &renderer, &NullMonitor).unwrap();
    assert_eq!(tiled.tiles, 12);
    assert!(tiled.painted);
    assert_eq!(tiled.state, RenderState::Finished);
    assert_eq!(tiled.surface.pixmap().data(), single.pixmap().data());
}

#[test]
fn test_tiled_labels_placed_once_across_seams() {
    // tile seams fall at 148E and 196E; both labels overlap the first one
    let grid = view_grid((100.0, -60.0, 260.0, 60.0), CrsCode::Crs84, 160, 120);
    let config = RendererConfig::default();
    let labelled = |name: &str, lon: f64, priority: i32| {
        let style = SimpleStyle {
            stroke: None,
            point_radius: 0.0,
            label: Some(LabelRule {
                attribute: "name".to_string(),
                color: [0, 0, 0, 255],
                size: 12.0,
                priority,
            }),
            ..SimpleStyle::default()
        };
        feature_layer(
            name,
            CrsCode::Crs84,
            vec![point_feature(name, lon, 0.0).with_attribute("name", "8888")],
            style,
        )
    };
    let scene = Scene::new()
        .with_layer(labelled("west", 146.0, 1))
        .with_layer(labelled("east", 150.0, 5));
    let renderer = SceneRenderer::new();

    let ctx = RenderingContextBuilder::new(grid.clone())
        .config(config.clone())
        .build()
        .unwrap();
    let mut single = PixmapSurface::new(160, 120).unwrap();
    let outcome = renderer.render(&ctx, &mut single, &scene, &NullMonitor).unwrap();
    assert_eq!(outcome.labels_drawn, 1);

    let tiled = render_tiles(&grid, &scene, 48, &config, &renderer, &NullMonitor).unwrap();
    assert_eq!(tiled.labels_drawn, 1);
    assert!(tiled.painted);
    assert_eq!(tiled.surface.pixmap().data(), single.pixmap().data());
}

#[test]
fn test_tiled_render_collects_failures() {
    let grid = world_grid(64, 32);
    let broken = MapLayer::new(
        "broken",
        Resource::Features(Arc::new(BrokenFeatures)),
        Arc::new(SimpleStyle::default()),
    );
    let scene = Scene::new().with_layer(broken);
    let tiled = render_tiles(
        &grid,
        &scene,
        32,
        &RendererConfig::default(),
        &SceneRenderer::new(),
        &NullMonitor,
    )
    .unwrap();
    assert_eq!(tiled.tiles, 2);
    assert_eq!(tiled.failures.len(), 2);
    assert!(!tiled.painted);
}

#[test]
fn test_zero_tile_size_rejected() {
    let result = render_tiles(
        &world_grid(10, 10),
        &Scene::new(),
        0,
        &RendererConfig::default(),
        &SceneRenderer::new(),
        &NullMonitor,
    );
    assert!(matches!(result, Err(RenderError::Config(_))));
}

#[test]
fn test_polygon_interior_filled() {
    let ctx = world_ctx();
    let style = SimpleStyle {
        fill: Some(GREEN),
        ..SimpleStyle::default()
    };
    let layer = feature_layer(
        "areas",
        CrsCode::Crs84,
        vec![Feature::new("box", test_utils::rect_polygon(-10.0, -10.0, 10.0, 10.0))],
        style,
    );
    let mut surface = PixmapSurface::new(360, 180).unwrap();
    let outcome = SceneRenderer::new()
        .render(&ctx, &mut surface, &Scene::new().with_layer(layer), &NullMonitor)
        .unwrap();
    assert!(outcome.painted);
    assert_eq!(surface.pixel(180, 90).unwrap(), GREEN);
}
