//! The math transform abstraction and transform composition.

use std::fmt;
use std::sync::Arc;

use map_common::{BoundingBox, Point};

use crate::affine::Affine2D;
use crate::error::Result;

/// Shared handle to a transform.
pub type Transform = Arc<dyn MathTransform>;

/// A 2D coordinate conversion between two spaces.
///
/// Implementations are immutable and cheap to share across threads.
pub trait MathTransform: Send + Sync + fmt::Debug {
    fn transform_point(&self, p: Point) -> Result<Point>;

    fn inverse(&self) -> Result<Transform>;

    /// The transform as a matrix when it is affine.
    fn as_affine(&self) -> Option<Affine2D> {
        None
    }

    fn is_identity(&self) -> bool {
        false
    }

    fn transform_points(&self, points: &[Point]) -> Result<Vec<Point>> {
        points.iter().map(|p| self.transform_point(*p)).collect()
    }

    /// Envelope of the transformed box.
    ///
    /// Non-linear transforms may bend the box edges, so edges are densified
    /// before transforming.
    fn transform_bbox(&self, bbox: &BoundingBox) -> Result<BoundingBox> {
        const STEPS: usize = 10;
        let mut out = BoundingBox::empty();
        for t in 0..=STEPS {
            let frac = t as f64 / STEPS as f64;
            let x = bbox.min_x + frac * bbox.width();
            let y = bbox.min_y + frac * bbox.height();
            for p in [
                Point::new(x, bbox.min_y),
                Point::new(x, bbox.max_y),
                Point::new(bbox.min_x, y),
                Point::new(bbox.max_x, y),
            ] {
                let q = self.transform_point(p)?;
                out.add_point(q.x, q.y);
            }
        }
        Ok(out)
    }
}

/// Two transforms applied in sequence.
#[derive(Debug, Clone)]
pub struct Concatenated {
    first: Transform,
    second: Transform,
}

impl MathTransform for Concatenated {
    fn transform_point(&self, p: Point) -> Result<Point> {
        self.second.transform_point(self.first.transform_point(p)?)
    }

    fn inverse(&self) -> Result<Transform> {
        Ok(concatenate(self.second.inverse()?, self.first.inverse()?))
    }
}

/// Compose `first` then `second`, folding affine pairs into one matrix and
/// dropping identities.
pub fn concatenate(first: Transform, second: Transform) -> Transform {
    if first.is_identity() {
        return second;
    }
    if second.is_identity() {
        return first;
    }
    if let (Some(a), Some(b)) = (first.as_affine(), second.as_affine()) {
        return Arc::new(a.then(&b));
    }
    Arc::new(Concatenated { first, second })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mercator::WebMercator;

    #[test]
    fn test_affine_pairs_fold() {
        let t = concatenate(
            Arc::new(Affine2D::translation(1.0, 2.0)),
            Arc::new(Affine2D::scale(3.0, 3.0)),
        );
        let affine = t.as_affine().unwrap();
        assert_eq!(affine.apply(Point::new(0.0, 0.0)), Point::new(3.0, 6.0));
    }

    #[test]
    fn test_identity_dropped() {
        let merc: Transform = Arc::new(WebMercator::forward());
        let t = concatenate(Arc::new(Affine2D::identity()), merc);
        assert!(t.as_affine().is_none());
        let p = t.transform_point(Point::new(0.0, 0.0)).unwrap();
        assert!(p.x.abs() < 1e-9 && p.y.abs() < 1e-9);
    }

    #[test]
    fn test_concatenated_inverse() {
        let t = concatenate(
            Arc::new(WebMercator::forward()),
            Arc::new(Affine2D::scale(1e-3, 1e-3)),
        );
        let inv = t.inverse().unwrap();
        let p = Point::new(12.0, 45.0);
        let back = inv.transform_point(t.transform_point(p).unwrap()).unwrap();
        assert!((back.x - p.x).abs() < 1e-9);
        assert!((back.y - p.y).abs() < 1e-9);
    }
}
