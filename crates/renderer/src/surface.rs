//! Drawing surfaces.
//!
//! The renderer hands geometries in the surface's current coordinate space
//! to a [`DrawSurface`]. [`PixmapSurface`] rasterizes them with tiny-skia.

use std::collections::BTreeMap;
use std::path::Path;

use image::RgbaImage;
use map_common::{Point, Polygon};
use projection::Affine2D;
use tiny_skia::{
    FillRule, FilterQuality, IntSize, LineCap, LineJoin, Paint, PathBuilder, Pixmap, PixmapPaint,
    Stroke, Transform,
};

use crate::error::{RenderError, Result};
use crate::presentation::StrokeStyle;
use crate::text;

/// Rasterization target of one rendering pass.
///
/// Coordinates given to the drawing calls are mapped through the transform
/// last passed to [`set_transform`](DrawSurface::set_transform). Sizes
/// (stroke widths, radii, text) are always in pixels, and rasters are always
/// placed in display pixels.
pub trait DrawSurface {
    /// Size in pixels.
    fn size(&self) -> (u32, u32);

    fn set_transform(&mut self, transform: Affine2D);

    fn transform(&self) -> Affine2D;

    /// Fill the whole surface, ignoring the transform.
    fn clear(&mut self, color: [u8; 4]);

    fn stroke_path(&mut self, points: &[Point], closed: bool, stroke: &StrokeStyle) -> Result<()>;

    fn fill_polygon(&mut self, polygon: &Polygon, color: [u8; 4]) -> Result<()>;

    fn fill_circle(&mut self, center: Point, radius: f64, color: [u8; 4]) -> Result<()>;

    /// Composite a straight-alpha RGBA image with its upper-left corner at
    /// display pixel `(x, y)`.
    fn draw_raster(&mut self, image: &RgbaImage, x: i32, y: i32, opacity: f32) -> Result<()>;

    /// Draw `text` centred on `center` on a light plate.
    fn draw_text(&mut self, text: &str, center: Point, size: f32, color: [u8; 4]) -> Result<()>;

    fn rendering_hints(&self) -> BTreeMap<String, String>;
}

/// A [`DrawSurface`] backed by a tiny-skia pixmap.
///
/// Coordinates are transformed in `f64` before being narrowed to the `f32`
/// tiny-skia works with, so large projected coordinates keep their
/// precision.
pub struct PixmapSurface {
    pixmap: Pixmap,
    transform: Affine2D,
    anti_alias: bool,
}

impl std::fmt::Debug for PixmapSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixmapSurface")
            .field("width", &self.pixmap.width())
            .field("height", &self.pixmap.height())
            .field("anti_alias", &self.anti_alias)
            .finish()
    }
}

impl PixmapSurface {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        let pixmap = Pixmap::new(width, height).ok_or_else(|| {
            RenderError::surface(format!("cannot allocate {}x{} pixmap", width, height))
        })?;
        Ok(Self::from_pixmap(pixmap))
    }

    pub fn from_pixmap(pixmap: Pixmap) -> Self {
        Self {
            pixmap,
            transform: Affine2D::identity(),
            anti_alias: true,
        }
    }

    pub fn with_anti_alias(mut self, anti_alias: bool) -> Self {
        self.anti_alias = anti_alias;
        self
    }

    pub fn pixmap(&self) -> &Pixmap {
        &self.pixmap
    }

    pub fn into_pixmap(self) -> Pixmap {
        self.pixmap
    }

    /// Straight-alpha color of one pixel.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        let c = self.pixmap.pixel(x, y)?.demultiply();
        Some([c.red(), c.green(), c.blue(), c.alpha()])
    }

    /// Number of pixels with non-zero alpha.
    pub fn painted_pixels(&self) -> usize {
        self.pixmap.pixels().iter().filter(|p| p.alpha() > 0).count()
    }

    pub fn encode_png(&self) -> Result<Vec<u8>> {
        self.pixmap
            .encode_png()
            .map_err(|e| RenderError::surface(format!("PNG encoding failed: {}", e)))
    }

    pub fn save_png(&self, path: impl AsRef<Path>) -> Result<()> {
        self.pixmap
            .save_png(path.as_ref())
            .map_err(|e| RenderError::surface(format!("cannot write {}: {}", path.as_ref().display(), e)))
    }

    fn paint(&self, color: [u8; 4]) -> Paint<'static> {
        let mut paint = Paint::default();
        paint.set_color_rgba8(color[0], color[1], color[2], color[3]);
        paint.anti_alias = self.anti_alias;
        paint
    }

    fn device(&self, p: Point) -> (f32, f32) {
        let q = self.transform.apply(p);
        (q.x as f32, q.y as f32)
    }
}

fn round_stroke(width: f32) -> Stroke {
    Stroke {
        width,
        line_cap: LineCap::Round,
        line_join: LineJoin::Round,
        ..Stroke::default()
    }
}

impl DrawSurface for PixmapSurface {
    fn size(&self) -> (u32, u32) {
        (self.pixmap.width(), self.pixmap.height())
    }

    fn set_transform(&mut self, transform: Affine2D) {
        self.transform = transform;
    }

    fn transform(&self) -> Affine2D {
        self.transform
    }

    fn clear(&mut self, color: [u8; 4]) {
        self.pixmap
            .fill(tiny_skia::Color::from_rgba8(color[0], color[1], color[2], color[3]));
    }

    fn stroke_path(&mut self, points: &[Point], closed: bool, stroke: &StrokeStyle) -> Result<()> {
        if points.len() < 2 {
            return Ok(());
        }
        let mut pb = PathBuilder::new();
        let (x, y) = self.device(points[0]);
        pb.move_to(x, y);
        for p in &points[1..] {
            let (x, y) = self.device(*p);
            pb.line_to(x, y);
        }
        if closed {
            pb.close();
        }
        if let Some(path) = pb.finish() {
            let paint = self.paint(stroke.color);
            self.pixmap
                .stroke_path(&path, &paint, &round_stroke(stroke.width), Transform::identity(), None);
        }
        Ok(())
    }

    fn fill_polygon(&mut self, polygon: &Polygon, color: [u8; 4]) -> Result<()> {
        let mut pb = PathBuilder::new();
        for ring in polygon.rings() {
            if ring.len() < 3 {
                continue;
            }
            let (x, y) = self.device(ring[0]);
            pb.move_to(x, y);
            for p in &ring[1..] {
                let (x, y) = self.device(*p);
                pb.line_to(x, y);
            }
            pb.close();
        }
        if let Some(path) = pb.finish() {
            let paint = self.paint(color);
            self.pixmap
                .fill_path(&path, &paint, FillRule::EvenOdd, Transform::identity(), None);
        }
        Ok(())
    }

    fn fill_circle(&mut self, center: Point, radius: f64, color: [u8; 4]) -> Result<()> {
        let (x, y) = self.device(center);
        if let Some(path) = PathBuilder::from_circle(x, y, radius as f32) {
            let paint = self.paint(color);
            self.pixmap
                .fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);
        }
        Ok(())
    }

    fn draw_raster(&mut self, image: &RgbaImage, x: i32, y: i32, opacity: f32) -> Result<()> {
        let (w, h) = image.dimensions();
        let size = IntSize::from_wh(w, h)
            .ok_or_else(|| RenderError::surface(format!("invalid raster size {}x{}", w, h)))?;

        // tiny-skia stores premultiplied alpha
        let mut data = Vec::with_capacity(image.as_raw().len());
        for px in image.pixels() {
            let [r, g, b, a] = px.0;
            let mul = |c: u8| ((c as u32 * a as u32 + 127) / 255) as u8;
            data.extend_from_slice(&[mul(r), mul(g), mul(b), a]);
        }
        let src = Pixmap::from_vec(data, size)
            .ok_or_else(|| RenderError::surface("raster buffer does not match its size"))?;

        let paint = PixmapPaint {
            opacity: opacity.clamp(0.0, 1.0),
            quality: FilterQuality::Nearest,
            ..PixmapPaint::default()
        };
        self.pixmap
            .draw_pixmap(x, y, src.as_ref(), &paint, Transform::identity(), None);
        Ok(())
    }

    fn draw_text(&mut self, text: &str, center: Point, size: f32, color: [u8; 4]) -> Result<()> {
        let (x, y) = self.device(center);
        let glyphs = text::rasterize(text, size, color)?;
        let (w, h) = (glyphs.width() as f32, glyphs.height() as f32);

        // light plate for readability
        let pad = text::GlyphMetrics::for_size(size)?.padding;
        let plate = tiny_skia::Rect::from_xywh(
            x - w / 2.0 - pad,
            y - h / 2.0 - pad,
            w + pad * 2.0,
            h + pad * 2.0,
        );
        if let Some(rect) = plate {
            let plate_paint = self.paint([255, 255, 255, 220]);
            self.pixmap
                .fill_rect(rect, &plate_paint, Transform::identity(), None);
        }

        let left = (x - w / 2.0).round() as i32;
        let top = (y - h / 2.0).round() as i32;
        self.draw_raster(&glyphs, left, top, 1.0)
    }

    fn rendering_hints(&self) -> BTreeMap<String, String> {
        let mut hints = BTreeMap::new();
        hints.insert("antialiasing".to_string(), self.anti_alias.to_string());
        hints.insert("raster.interpolation".to_string(), "nearest".to_string());
        hints.insert("text".to_string(), "truetype".to_string());
        hints
    }
}
