//! Minimal 2D geometry primitives used by presentations and hit testing.
//!
//! Geometries carry no CRS; the renderer tracks which space a geometry is
//! expressed in. Coordinates are `f64` throughout.

use serde::{Deserialize, Serialize};

use crate::BoundingBox;

/// A position in a 2D coordinate space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    pub fn dot(&self, other: &Point) -> f64 {
        self.x * other.x + self.y * other.y
    }

    pub fn sub(&self, other: &Point) -> Point {
        Point::new(self.x - other.x, self.y - other.y)
    }

    pub fn add(&self, other: &Point) -> Point {
        Point::new(self.x + other.x, self.y + other.y)
    }

    pub fn scale(&self, factor: f64) -> Point {
        Point::new(self.x * factor, self.y * factor)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// A straight line segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub a: Point,
    pub b: Point,
}

impl Segment {
    pub const fn new(a: Point, b: Point) -> Self {
        Self { a, b }
    }

    pub fn length(&self) -> f64 {
        self.a.distance(&self.b)
    }

    /// Shortest distance from `p` to any point of the segment.
    pub fn distance_to_point(&self, p: &Point) -> f64 {
        let d = self.b.sub(&self.a);
        let len_sq = d.dot(&d);
        if len_sq == 0.0 {
            return self.a.distance(p);
        }
        let t = (p.sub(&self.a).dot(&d) / len_sq).clamp(0.0, 1.0);
        self.a.add(&d.scale(t)).distance(p)
    }

    /// Whether the two closed segments share at least one point.
    pub fn intersects(&self, other: &Segment) -> bool {
        let o1 = orientation(&self.a, &self.b, &other.a);
        let o2 = orientation(&self.a, &self.b, &other.b);
        let o3 = orientation(&other.a, &other.b, &self.a);
        let o4 = orientation(&other.a, &other.b, &self.b);

        if o1 != o2 && o3 != o4 {
            return true;
        }

        (o1 == 0 && on_segment(&self.a, &other.a, &self.b))
            || (o2 == 0 && on_segment(&self.a, &other.b, &self.b))
            || (o3 == 0 && on_segment(&other.a, &self.a, &other.b))
            || (o4 == 0 && on_segment(&other.a, &self.b, &other.b))
    }

    /// Shortest distance between two segments (zero when they cross).
    pub fn distance_to_segment(&self, other: &Segment) -> f64 {
        if self.intersects(other) {
            return 0.0;
        }
        self.distance_to_point(&other.a)
            .min(self.distance_to_point(&other.b))
            .min(other.distance_to_point(&self.a))
            .min(other.distance_to_point(&self.b))
    }

    pub fn bbox(&self) -> BoundingBox {
        BoundingBox::from_points([&self.a, &self.b])
    }
}

fn orientation(p: &Point, q: &Point, r: &Point) -> i8 {
    let v = (q.y - p.y) * (r.x - q.x) - (q.x - p.x) * (r.y - q.y);
    if v.abs() < f64::EPSILON {
        0
    } else if v > 0.0 {
        1
    } else {
        2
    }
}

fn on_segment(p: &Point, q: &Point, r: &Point) -> bool {
    q.x <= p.x.max(r.x) && q.x >= p.x.min(r.x) && q.y <= p.y.max(r.y) && q.y >= p.y.min(r.y)
}

/// An open polyline.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LineString(pub Vec<Point>);

impl LineString {
    pub fn new(points: Vec<Point>) -> Self {
        Self(points)
    }

    pub fn points(&self) -> &[Point] {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = Segment> + '_ {
        self.0.windows(2).map(|w| Segment::new(w[0], w[1]))
    }

    pub fn length(&self) -> f64 {
        self.segments().map(|s| s.length()).sum()
    }

    pub fn bbox(&self) -> BoundingBox {
        BoundingBox::from_points(&self.0)
    }
}

/// A polygon with one exterior ring and optional holes.
///
/// Rings are stored without repeating the first point; closing is implicit.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Polygon {
    pub exterior: Vec<Point>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interiors: Vec<Vec<Point>>,
}

impl Polygon {
    pub fn new(exterior: Vec<Point>) -> Self {
        Self {
            exterior,
            interiors: Vec::new(),
        }
    }

    pub fn with_interiors(exterior: Vec<Point>, interiors: Vec<Vec<Point>>) -> Self {
        Self {
            exterior,
            interiors,
        }
    }

    pub fn from_bbox(bbox: &BoundingBox) -> Self {
        Self::new(bbox.corners().to_vec())
    }

    pub fn bbox(&self) -> BoundingBox {
        BoundingBox::from_points(&self.exterior)
    }

    pub fn rings(&self) -> impl Iterator<Item = &[Point]> {
        std::iter::once(self.exterior.as_slice()).chain(self.interiors.iter().map(Vec::as_slice))
    }

    /// All ring edges, including the implicit closing edges.
    pub fn edges(&self) -> impl Iterator<Item = Segment> + '_ {
        self.rings().flat_map(ring_edges)
    }

    /// Even-odd point in polygon test over all rings.
    pub fn contains_point(&self, p: &Point) -> bool {
        let mut inside = false;
        for ring in self.rings() {
            let n = ring.len();
            if n < 3 {
                continue;
            }
            let mut j = n - 1;
            for i in 0..n {
                let (pi, pj) = (ring[i], ring[j]);
                if (pi.y > p.y) != (pj.y > p.y)
                    && p.x < (pj.x - pi.x) * (p.y - pi.y) / (pj.y - pi.y) + pi.x
                {
                    inside = !inside;
                }
                j = i;
            }
        }
        inside
    }

    /// Shortest distance from `p` to the polygon boundary.
    pub fn boundary_distance(&self, p: &Point) -> f64 {
        self.edges()
            .map(|e| e.distance_to_point(p))
            .fold(f64::INFINITY, f64::min)
    }

    /// Whether the segment touches the polygon area or comes within `tolerance`
    /// of its boundary.
    pub fn touches_segment(&self, segment: &Segment, tolerance: f64) -> bool {
        if self.contains_point(&segment.a) || self.contains_point(&segment.b) {
            return true;
        }
        self.edges()
            .any(|e| e.distance_to_segment(segment) <= tolerance)
    }
}

fn ring_edges(ring: &[Point]) -> impl Iterator<Item = Segment> + '_ {
    let n = ring.len();
    (0..n).filter(move |_| n >= 2).map(move |i| Segment::new(ring[i], ring[(i + 1) % n]))
}

/// Geometry of a feature or a hit-test query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    Point(Point),
    LineString(LineString),
    Polygon(Polygon),
    Collection(Vec<Geometry>),
}

impl Geometry {
    pub fn bbox(&self) -> BoundingBox {
        match self {
            Geometry::Point(p) => BoundingBox::new(p.x, p.y, p.x, p.y),
            Geometry::LineString(l) => l.bbox(),
            Geometry::Polygon(p) => p.bbox(),
            Geometry::Collection(items) => items
                .iter()
                .fold(BoundingBox::empty(), |acc, g| acc.union(&g.bbox())),
        }
    }

    /// Apply a fallible point mapping to every coordinate.
    pub fn try_map<E>(&self, f: &mut impl FnMut(Point) -> Result<Point, E>) -> Result<Geometry, E> {
        Ok(match self {
            Geometry::Point(p) => Geometry::Point(f(*p)?),
            Geometry::LineString(l) => Geometry::LineString(LineString(
                l.0.iter().map(|p| f(*p)).collect::<Result<_, _>>()?,
            )),
            Geometry::Polygon(poly) => {
                let mut map_ring = |ring: &[Point]| -> Result<Vec<Point>, E> {
                    ring.iter().map(|p| f(*p)).collect()
                };
                let exterior = map_ring(&poly.exterior)?;
                let interiors = poly
                    .interiors
                    .iter()
                    .map(|r| map_ring(r))
                    .collect::<Result<_, _>>()?;
                Geometry::Polygon(Polygon::with_interiors(exterior, interiors))
            }
            Geometry::Collection(items) => Geometry::Collection(
                items.iter().map(|g| g.try_map(f)).collect::<Result<_, _>>()?,
            ),
        })
    }

    pub fn translate(&self, dx: f64, dy: f64) -> Geometry {
        let mut shift = |p: Point| -> Result<Point, std::convert::Infallible> {
            Ok(Point::new(p.x + dx, p.y + dy))
        };
        match self.try_map(&mut shift) {
            Ok(g) => g,
            Err(never) => match never {},
        }
    }

    /// Whether this geometry, rendered with the given tolerance (half stroke
    /// width or point radius), touches the query polygon.
    pub fn intersects_polygon(&self, query: &Polygon, tolerance: f64) -> bool {
        if !self.bbox().expand(tolerance).intersects(&query.bbox()) {
            return false;
        }
        match self {
            Geometry::Point(p) => {
                query.contains_point(p) || query.boundary_distance(p) <= tolerance
            }
            Geometry::LineString(l) => match l.0.as_slice() {
                [] => false,
                [only] => query.contains_point(only) || query.boundary_distance(only) <= tolerance,
                _ => l.segments().any(|s| query.touches_segment(&s, tolerance)),
            },
            Geometry::Polygon(poly) => {
                // query inside the polygon, or boundaries touching
                query.exterior.iter().any(|p| poly.contains_point(p))
                    || poly.edges().any(|e| query.touches_segment(&e, tolerance))
            }
            Geometry::Collection(items) => items.iter().any(|g| g.intersects_polygon(query, tolerance)),
        }
    }
}
