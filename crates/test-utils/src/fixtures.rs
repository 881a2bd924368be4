//! Common test fixtures for rendering tests.
//!
//! Views are described as target grid geometries, the way a caller hands
//! them to the renderer.

use map_common::crs::WEB_MERCATOR_HALF_WORLD;
use map_common::{BoundingBox, CrsCode, GridGeometry};

/// Common bounding box definitions for testing.
pub mod bbox {
    /// Global bounding box (-180 to 180, -90 to 90)
    pub const GLOBAL: (f64, f64, f64, f64) = (-180.0, -90.0, 180.0, 90.0);

    /// Continental United States bounding box
    pub const CONUS: (f64, f64, f64, f64) = (-130.0, 20.0, -60.0, 55.0);

    /// Europe bounding box
    pub const EUROPE: (f64, f64, f64, f64) = (-15.0, 35.0, 45.0, 72.0);

    /// Pacific view centred on the antimeridian, east edge past 180
    pub const PACIFIC: (f64, f64, f64, f64) = (150.0, -40.0, 210.0, 20.0);

    /// View spanning more than two periods of longitude
    pub const MULTI_WORLD: (f64, f64, f64, f64) = (-900.0, -90.0, 900.0, 90.0);

    /// Local engineering plane, meters
    pub const LOCAL: (f64, f64, f64, f64) = (0.0, 0.0, 1000.0, 1000.0);
}

fn to_bbox((min_x, min_y, max_x, max_y): (f64, f64, f64, f64)) -> BoundingBox {
    BoundingBox::new(min_x, min_y, max_x, max_y)
}

/// North-up view grid over `bbox` in `crs`.
///
/// # Panics
///
/// On an empty box or a zero size, which are fixture bugs.
pub fn view_grid(bbox: (f64, f64, f64, f64), crs: CrsCode, width: u32, height: u32) -> GridGeometry {
    GridGeometry::from_bbox(&to_bbox(bbox), crs, width, height)
        .unwrap_or_else(|e| panic!("invalid fixture grid {:?}: {}", bbox, e))
}

/// Whole world in CRS:84 at one pixel per `360 / width` degrees.
pub fn world_grid(width: u32, height: u32) -> GridGeometry {
    view_grid(bbox::GLOBAL, CrsCode::Crs84, width, height)
}

/// Pacific view crossing the antimeridian, 2 pixels per degree.
pub fn pacific_grid() -> GridGeometry {
    view_grid(bbox::PACIFIC, CrsCode::Crs84, 120, 120)
}

/// Full Web Mercator square.
pub fn mercator_world_grid(size: u32) -> GridGeometry {
    let h = WEB_MERCATOR_HALF_WORLD;
    view_grid((-h, -h, h, h), CrsCode::Epsg3857, size, size)
}

/// One kilometre square of a local plane, one pixel per `1000 / size` m.
pub fn local_grid(size: u32) -> GridGeometry {
    view_grid(bbox::LOCAL, CrsCode::Engineering, size, size)
}

/// A view grid rotated by `theta` radians about its centre.
pub fn rotated_grid(bbox: (f64, f64, f64, f64), crs: CrsCode, size: u32, theta: f64) -> GridGeometry {
    let grid = view_grid(bbox, crs, size, size);
    let center = to_bbox(bbox).center();
    let (sx, sy) = (
        (bbox.2 - bbox.0) / size as f64,
        (bbox.3 - bbox.1) / size as f64,
    );
    let (sin, cos) = theta.sin_cos();
    // grid (i, j) -> rotate the scaled offset from the grid centre
    let half = size as f64 / 2.0;
    let m00 = sx * cos;
    let m01 = sy * sin;
    let m10 = sx * sin;
    let m11 = -sy * cos;
    let coefficients = [
        m00,
        m01,
        center.x - m00 * half - m01 * half,
        m10,
        m11,
        center.y - m10 * half - m11 * half,
    ];
    GridGeometry::new(grid.extent, crs, coefficients, grid.anchor)
}
