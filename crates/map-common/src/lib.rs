//! Common types shared across the map rendering crates.
//!
//! Everything here is plain data: bounding boxes, coordinate reference
//! system codes, grid geometries, simple 2D geometry primitives, colors and
//! time ranges. Coordinate math that needs a projection lives in the
//! `projection` crate.

pub mod bbox;
pub mod crs;
pub mod error;
pub mod geometry;
pub mod grid;
pub mod style;
pub mod time;

pub use bbox::BoundingBox;
pub use crs::{AxisUnit, CrsCode};
pub use error::{MapError, MapResult};
pub use geometry::{Geometry, LineString, Point, Polygon, Segment};
pub use grid::{GridExtent, GridGeometry, GridToCrs, PixelAnchor};
pub use style::Color;
pub use time::TimeRange;
