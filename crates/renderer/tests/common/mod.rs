//! Helpers shared by the renderer integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use image::RgbaImage;
use map_common::{BoundingBox, CrsCode, Geometry, GridGeometry, Point, Polygon};
use projection::{Affine2D, CoordinateOperationResolver, DefaultResolver, Transform};
use renderer::layer::FeatureIter;
use renderer::{
    Coverage, DefaultRasterStyle, DrawSurface, Feature, FeatureSource, MapLayer, MemoryCoverage,
    MemoryFeatures, RenderError, Resource, SimpleStyle, StrokeStyle,
};

/// One call received by a [`RecordingSurface`].
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    SetTransform,
    Clear([u8; 4]),
    Stroke { points: Vec<Point>, color: [u8; 4] },
    FillPolygon([u8; 4]),
    Circle { center: Point, color: [u8; 4] },
    Raster { x: i32, y: i32, width: u32, height: u32 },
    Text(String),
}

/// A surface that draws nothing and remembers every call.
#[derive(Debug)]
pub struct RecordingSurface {
    width: u32,
    height: u32,
    transform: Affine2D,
    pub calls: Vec<Call>,
}

impl RecordingSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            transform: Affine2D::identity(),
            calls: Vec::new(),
        }
    }

    pub fn draw_calls(&self) -> Vec<&Call> {
        self.calls
            .iter()
            .filter(|c| !matches!(c, Call::SetTransform | Call::Clear(_)))
            .collect()
    }

    pub fn texts(&self) -> Vec<&str> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Index of the first call drawn with `color`.
    pub fn first_with_color(&self, color: [u8; 4]) -> Option<usize> {
        self.calls.iter().position(|c| match c {
            Call::Stroke { color: c, .. } | Call::Circle { color: c, .. } | Call::FillPolygon(c) => {
                *c == color
            }
            _ => false,
        })
    }
}

impl DrawSurface for RecordingSurface {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn set_transform(&mut self, transform: Affine2D) {
        self.transform = transform;
        self.calls.push(Call::SetTransform);
    }

    fn transform(&self) -> Affine2D {
        self.transform
    }

    fn clear(&mut self, color: [u8; 4]) {
        self.calls.push(Call::Clear(color));
    }

    fn stroke_path(&mut self, points: &[Point], _closed: bool, stroke: &StrokeStyle) -> renderer::Result<()> {
        self.calls.push(Call::Stroke {
            points: points.iter().map(|p| self.transform.apply(*p)).collect(),
            color: stroke.color,
        });
        Ok(())
    }

    fn fill_polygon(&mut self, _polygon: &Polygon, color: [u8; 4]) -> renderer::Result<()> {
        self.calls.push(Call::FillPolygon(color));
        Ok(())
    }

    fn fill_circle(&mut self, center: Point, _radius: f64, color: [u8; 4]) -> renderer::Result<()> {
        self.calls.push(Call::Circle {
            center: self.transform.apply(center),
            color,
        });
        Ok(())
    }

    fn draw_raster(&mut self, image: &RgbaImage, x: i32, y: i32, _opacity: f32) -> renderer::Result<()> {
        self.calls.push(Call::Raster {
            x,
            y,
            width: image.width(),
            height: image.height(),
        });
        Ok(())
    }

    fn draw_text(&mut self, text: &str, _center: Point, _size: f32, _color: [u8; 4]) -> renderer::Result<()> {
        self.calls.push(Call::Text(text.to_string()));
        Ok(())
    }

    fn rendering_hints(&self) -> BTreeMap<String, String> {
        BTreeMap::new()
    }
}

/// Resolver counting how many operations it had to look up.
#[derive(Debug, Default)]
pub struct CountingResolver {
    pub lookups: AtomicUsize,
}

impl CountingResolver {
    pub fn count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl CoordinateOperationResolver for CountingResolver {
    fn resolve(&self, source: CrsCode, target: CrsCode) -> projection::Result<Transform> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        DefaultResolver.resolve(source, target)
    }
}

/// A feature store whose every read fails.
#[derive(Debug)]
pub struct BrokenFeatures;

impl FeatureSource for BrokenFeatures {
    fn crs(&self) -> CrsCode {
        CrsCode::Crs84
    }

    fn features<'a>(&'a self, _region: &BoundingBox) -> renderer::Result<FeatureIter<'a>> {
        Err(RenderError::store("connection refused"))
    }
}

pub fn stroke_style(color: [u8; 4], width: f32) -> SimpleStyle {
    SimpleStyle {
        stroke: Some(StrokeStyle { color, width }),
        ..SimpleStyle::default()
    }
}

pub fn feature_layer(name: &str, crs: CrsCode, features: Vec<Feature>, style: SimpleStyle) -> MapLayer {
    MapLayer::new(
        name,
        Resource::Features(Arc::new(MemoryFeatures::new(crs, features))),
        Arc::new(style),
    )
}

pub fn point_feature(id: &str, x: f64, y: f64) -> Feature {
    Feature::new(id, Geometry::Point(Point::new(x, y)))
}

pub fn raster_layer(name: &str, grid: GridGeometry, image: RgbaImage) -> MapLayer {
    let coverage = Coverage::new(grid, image).expect("valid coverage fixture");
    MapLayer::new(
        name,
        Resource::Coverage(Arc::new(MemoryCoverage::new(coverage))),
        Arc::new(DefaultRasterStyle),
    )
}
