//! Grid geometry: the discrete raster domain a view or coverage lives on.

use serde::{Deserialize, Serialize};

use crate::{BoundingBox, CrsCode, MapError, MapResult, Point, TimeRange};

/// Integer pixel bounds of a grid. `high` values are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridExtent {
    pub low_x: i64,
    pub low_y: i64,
    pub high_x: i64,
    pub high_y: i64,
}

impl GridExtent {
    pub fn new(low_x: i64, low_y: i64, high_x: i64, high_y: i64) -> Self {
        Self {
            low_x,
            low_y,
            high_x,
            high_y,
        }
    }

    /// Extent of a `width` × `height` image starting at the origin.
    pub fn of_size(width: u32, height: u32) -> Self {
        Self::new(0, 0, width as i64, height as i64)
    }

    pub fn width(&self) -> u32 {
        (self.high_x - self.low_x).max(0) as u32
    }

    pub fn height(&self) -> u32 {
        (self.high_y - self.low_y).max(0) as u32
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// The extent as a bounding box in grid coordinates (cell corners).
    pub fn to_bbox(&self) -> BoundingBox {
        BoundingBox::new(
            self.low_x as f64,
            self.low_y as f64,
            self.high_x as f64,
            self.high_y as f64,
        )
    }
}

/// Which point of a cell the grid-to-CRS transform maps integer indices to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PixelAnchor {
    /// Integer grid coordinates address the upper-left cell corner.
    #[default]
    CellCorner,
    /// Integer grid coordinates address the cell center.
    CellCenter,
}

/// Grid to CRS conversion.
///
/// Coefficients follow the usual row-major layout of the first two rows of a
/// 3×3 affine matrix: `x' = m00·i + m01·j + m02`, `y' = m10·i + m11·j + m12`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GridToCrs {
    Affine { coefficients: [f64; 6] },
    /// A curvilinear or otherwise non-linear grid. Such a grid can describe
    /// a coverage but can never back a rendering view.
    NonLinear { description: String },
}

impl GridToCrs {
    /// Affine coefficients, or `None` for non-linear grids.
    pub fn affine(&self) -> Option<[f64; 6]> {
        match self {
            GridToCrs::Affine { coefficients } => Some(*coefficients),
            GridToCrs::NonLinear { .. } => None,
        }
    }
}

/// Immutable description of a discrete raster domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridGeometry {
    pub extent: GridExtent,
    pub crs: CrsCode,
    pub grid_to_crs: GridToCrs,
    pub anchor: PixelAnchor,
    /// Temporal axis when the source geometry has more than two dimensions.
    #[serde(default)]
    pub temporal: Option<TimeRange>,
    /// Vertical axis when the source geometry has more than two dimensions.
    #[serde(default)]
    pub elevation: Option<(f64, f64)>,
}

impl GridGeometry {
    /// Create a grid geometry from an affine transform expressed for `anchor`.
    pub fn new(extent: GridExtent, crs: CrsCode, coefficients: [f64; 6], anchor: PixelAnchor) -> Self {
        Self {
            extent,
            crs,
            grid_to_crs: GridToCrs::Affine { coefficients },
            anchor,
            temporal: None,
            elevation: None,
        }
    }

    /// North-up grid of `width` × `height` pixels exactly covering `bbox`.
    ///
    /// Row 0 is at `bbox.max_y`, matching image conventions.
    pub fn from_bbox(bbox: &BoundingBox, crs: CrsCode, width: u32, height: u32) -> MapResult<Self> {
        if width == 0 || height == 0 {
            return Err(MapError::InvalidGrid(format!(
                "grid size must be positive, got {}x{}",
                width, height
            )));
        }
        if bbox.is_empty() || bbox.width() == 0.0 || bbox.height() == 0.0 {
            return Err(MapError::InvalidBbox(format!("{:?}", bbox)));
        }
        let sx = bbox.width() / width as f64;
        let sy = bbox.height() / height as f64;
        Ok(Self::new(
            GridExtent::of_size(width, height),
            crs,
            [sx, 0.0, bbox.min_x, 0.0, -sy, bbox.max_y],
            PixelAnchor::CellCorner,
        ))
    }

    pub fn with_temporal(mut self, range: TimeRange) -> Self {
        self.temporal = Some(range);
        self
    }

    pub fn with_elevation(mut self, min: f64, max: f64) -> Self {
        self.elevation = Some((min, max));
        self
    }

    /// Horizontal 2D part of this geometry with extra dimensions dropped.
    pub fn to_2d(&self) -> GridGeometry {
        GridGeometry {
            temporal: None,
            elevation: None,
            ..self.clone()
        }
    }

    pub fn width(&self) -> u32 {
        self.extent.width()
    }

    pub fn height(&self) -> u32 {
        self.extent.height()
    }

    /// Affine coefficients converted to the requested pixel anchor.
    pub fn grid_to_crs_coefficients(&self, anchor: PixelAnchor) -> Option<[f64; 6]> {
        let m = self.grid_to_crs.affine()?;
        let shift = match (self.anchor, anchor) {
            (a, b) if a == b => 0.0,
            // center transform used with corner indices: shift by -0.5 cell
            (PixelAnchor::CellCenter, PixelAnchor::CellCorner) => -0.5,
            _ => 0.5,
        };
        Some([
            m[0],
            m[1],
            m[2] + shift * (m[0] + m[1]),
            m[3],
            m[4],
            m[5] + shift * (m[3] + m[4]),
        ])
    }

    /// Map grid coordinates (corner convention) to CRS coordinates.
    pub fn grid_to_crs_point(&self, i: f64, j: f64) -> Option<Point> {
        let m = self.grid_to_crs_coefficients(PixelAnchor::CellCorner)?;
        Some(Point::new(
            m[0] * i + m[1] * j + m[2],
            m[3] * i + m[4] * j + m[5],
        ))
    }

    /// Ground size of one cell along each CRS axis.
    ///
    /// Computed on the horizontal 2D part only, as the magnitude of each row
    /// of the linear part of the grid-to-CRS transform.
    pub fn resolution(&self) -> Option<[f64; 2]> {
        let m = self.grid_to_crs.affine()?;
        Some([m[0].hypot(m[1]), m[3].hypot(m[4])])
    }

    /// CRS envelope of the whole extent.
    pub fn envelope(&self) -> Option<BoundingBox> {
        let corners = self.extent.to_bbox().corners();
        let mut bbox = BoundingBox::empty();
        for c in corners {
            let p = self.grid_to_crs_point(c.x, c.y)?;
            bbox.add_point(p.x, p.y);
        }
        Some(bbox)
    }

    /// Center of the extent in grid coordinates.
    pub fn point_of_interest(&self) -> Point {
        self.extent.to_bbox().center()
    }

    /// Child grid covering `width` × `height` cells starting at grid
    /// coordinates `(x, y)`, sharing this grid's transform.
    pub fn subgrid(&self, x: i64, y: i64, width: u32, height: u32) -> MapResult<GridGeometry> {
        let extent = GridExtent::new(x, y, x + width as i64, y + height as i64);
        if extent.low_x < self.extent.low_x
            || extent.low_y < self.extent.low_y
            || extent.high_x > self.extent.high_x
            || extent.high_y > self.extent.high_y
            || extent.is_empty()
        {
            return Err(MapError::InvalidGrid(format!(
                "sub-extent {:?} outside of {:?}",
                extent, self.extent
            )));
        }
        Ok(GridGeometry {
            extent,
            ..self.clone()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_bbox_resolution() {
        let bbox = BoundingBox::new(-180.0, -90.0, 180.0, 90.0);
        let grid = GridGeometry::from_bbox(&bbox, CrsCode::Crs84, 720, 360).unwrap();
        let res = grid.resolution().unwrap();
        assert!((res[0] - 0.5).abs() < 1e-12);
        assert!((res[1] - 0.5).abs() < 1e-12);
        assert_eq!(grid.envelope().unwrap(), bbox);
    }

    #[test]
    fn test_anchor_conversion() {
        let bbox = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let grid = GridGeometry::from_bbox(&bbox, CrsCode::Engineering, 10, 10).unwrap();
        let center = grid
            .grid_to_crs_coefficients(PixelAnchor::CellCenter)
            .unwrap();
        // cell (0,0) center is half a cell inside the upper-left corner
        assert!((center[2] - 0.5).abs() < 1e-12);
        assert!((center[5] - 9.5).abs() < 1e-12);
    }

    #[test]
    fn test_non_linear_has_no_resolution() {
        let mut grid =
            GridGeometry::from_bbox(&BoundingBox::new(0.0, 0.0, 1.0, 1.0), CrsCode::Engineering, 4, 4)
                .unwrap();
        grid.grid_to_crs = GridToCrs::NonLinear {
            description: "curvilinear".into(),
        };
        assert!(grid.resolution().is_none());
        assert!(grid.envelope().is_none());
    }

    #[test]
    fn test_subgrid_bounds() {
        let grid =
            GridGeometry::from_bbox(&BoundingBox::new(0.0, 0.0, 8.0, 8.0), CrsCode::Engineering, 8, 8)
                .unwrap();
        let sub = grid.subgrid(4, 4, 4, 4).unwrap();
        assert_eq!(sub.envelope().unwrap(), BoundingBox::new(4.0, 0.0, 8.0, 4.0));
        assert!(grid.subgrid(6, 6, 4, 4).is_err());
    }
}
