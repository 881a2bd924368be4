//! Test data generators for synthetic rasters and vector geometry.
//!
//! Raster generators produce predictable patterns so a test can tell from
//! a single pixel which source cell was sampled. Random generators take an
//! explicit seed so failures reproduce.

use image::{Rgba, RgbaImage};
use map_common::{BoundingBox, Geometry, LineString, Point, Polygon};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Creates an image whose pixel at `(col, row)` encodes its own position.
///
/// Red is `col % 256`, green is `row % 256`, blue is 0 and alpha is opaque.
///
/// # Example
///
/// ```
/// use test_utils::create_index_image;
///
/// let image = create_index_image(10, 5);
/// assert_eq!(image.get_pixel(3, 4).0, [3, 4, 0, 255]);
/// ```
pub fn create_index_image(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |col, row| {
        Rgba([(col % 256) as u8, (row % 256) as u8, 0, 255])
    })
}

/// Creates a two-colour checkerboard with square cells of `cell` pixels.
pub fn create_checkerboard(width: u32, height: u32, cell: u32, a: [u8; 4], b: [u8; 4]) -> RgbaImage {
    let cell = cell.max(1);
    RgbaImage::from_fn(width, height, |col, row| {
        if (col / cell + row / cell) % 2 == 0 {
            Rgba(a)
        } else {
            Rgba(b)
        }
    })
}

/// Creates a left-to-right red gradient, useful to spot horizontal shifts.
pub fn create_gradient_image(width: u32, height: u32) -> RgbaImage {
    let span = width.saturating_sub(1).max(1) as f32;
    RgbaImage::from_fn(width, height, |col, _| {
        let v = (col as f32 / span * 255.0).round() as u8;
        Rgba([v, 0, 255 - v, 255])
    })
}

/// Creates a solid colour image.
pub fn create_solid_image(width: u32, height: u32, color: [u8; 4]) -> RgbaImage {
    RgbaImage::from_pixel(width, height, Rgba(color))
}

/// Seeded RNG for reproducible property-style tests.
pub fn seeded_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// `count` uniformly distributed points inside `bbox`.
pub fn random_points(rng: &mut impl Rng, bbox: &BoundingBox, count: usize) -> Vec<Point> {
    (0..count)
        .map(|_| {
            Point::new(
                rng.gen_range(bbox.min_x..=bbox.max_x),
                rng.gen_range(bbox.min_y..=bbox.max_y),
            )
        })
        .collect()
}

/// A random polyline of `vertices` points inside `bbox`.
pub fn random_line(rng: &mut impl Rng, bbox: &BoundingBox, vertices: usize) -> Geometry {
    Geometry::LineString(LineString::new(random_points(rng, bbox, vertices.max(2))))
}

/// An axis-aligned rectangle polygon.
pub fn rect_polygon(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Geometry {
    Geometry::Polygon(Polygon::from_bbox(&BoundingBox::new(min_x, min_y, max_x, max_y)))
}

/// A straight segment as a two-point line string.
pub fn segment_line(from: (f64, f64), to: (f64, f64)) -> Geometry {
    Geometry::LineString(LineString::new(vec![
        Point::new(from.0, from.1),
        Point::new(to.0, to.1),
    ]))
}
