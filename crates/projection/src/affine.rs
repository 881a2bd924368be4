//! 2D affine transforms.
//!
//! An [`Affine2D`] is a 3×3 homogeneous matrix whose last row is `[0 0 1]`.
//! Composition and inversion are delegated to nalgebra.

use std::sync::Arc;

use map_common::{BoundingBox, Point};
use nalgebra::{Matrix3, Vector3};

use crate::error::{ProjectionError, Result};
use crate::transform::MathTransform;

/// Determinants below this magnitude are treated as singular.
const SINGULAR_EPSILON: f64 = 1e-300;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine2D {
    m: Matrix3<f64>,
}

impl Default for Affine2D {
    fn default() -> Self {
        Self::identity()
    }
}

impl Affine2D {
    pub fn identity() -> Self {
        Self {
            m: Matrix3::identity(),
        }
    }

    /// Build from `[m00, m01, m02, m10, m11, m12]`.
    pub fn from_coefficients(c: [f64; 6]) -> Self {
        Self {
            m: Matrix3::new(c[0], c[1], c[2], c[3], c[4], c[5], 0.0, 0.0, 1.0),
        }
    }

    pub fn translation(dx: f64, dy: f64) -> Self {
        Self::from_coefficients([1.0, 0.0, dx, 0.0, 1.0, dy])
    }

    pub fn scale(sx: f64, sy: f64) -> Self {
        Self::from_coefficients([sx, 0.0, 0.0, 0.0, sy, 0.0])
    }

    /// Counter-clockwise rotation by `theta` radians around the origin.
    pub fn rotation(theta: f64) -> Self {
        let (s, c) = theta.sin_cos();
        Self::from_coefficients([c, -s, 0.0, s, c, 0.0])
    }

    /// Rotation by `theta` around `(cx, cy)`.
    pub fn rotation_about(theta: f64, cx: f64, cy: f64) -> Self {
        Self::translation(-cx, -cy)
            .then(&Self::rotation(theta))
            .then(&Self::translation(cx, cy))
    }

    pub fn coefficients(&self) -> [f64; 6] {
        let m = &self.m;
        [
            m[(0, 0)],
            m[(0, 1)],
            m[(0, 2)],
            m[(1, 0)],
            m[(1, 1)],
            m[(1, 2)],
        ]
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.m
    }

    /// Transform applying `self` first, then `next`.
    pub fn then(&self, next: &Affine2D) -> Affine2D {
        Affine2D { m: next.m * self.m }
    }

    /// Determinant of the linear part.
    pub fn determinant(&self) -> f64 {
        self.m[(0, 0)] * self.m[(1, 1)] - self.m[(0, 1)] * self.m[(1, 0)]
    }

    pub fn is_finite(&self) -> bool {
        self.m.iter().all(|v| v.is_finite())
    }

    pub fn try_inverse(&self) -> Result<Affine2D> {
        let det = self.determinant();
        if !self.is_finite() || !det.is_finite() || det.abs() < SINGULAR_EPSILON {
            return Err(ProjectionError::NotInvertible(format!(
                "affine determinant is {}",
                det
            )));
        }
        self.m
            .try_inverse()
            .map(|m| Affine2D { m })
            .ok_or_else(|| ProjectionError::NotInvertible("singular matrix".to_string()))
    }

    pub fn apply(&self, p: Point) -> Point {
        let v = self.m * Vector3::new(p.x, p.y, 1.0);
        Point::new(v.x, v.y)
    }

    /// Apply only the linear part (for direction vectors).
    pub fn apply_vector(&self, v: Point) -> Point {
        Point::new(
            self.m[(0, 0)] * v.x + self.m[(0, 1)] * v.y,
            self.m[(1, 0)] * v.x + self.m[(1, 1)] * v.y,
        )
    }

    /// Bounding box of the transformed corners (exact for affine maps).
    pub fn apply_bbox(&self, bbox: &BoundingBox) -> BoundingBox {
        let corners = bbox.corners().map(|c| self.apply(c));
        BoundingBox::from_points(&corners)
    }

    pub fn translation_part(&self) -> (f64, f64) {
        (self.m[(0, 2)], self.m[(1, 2)])
    }

    /// True when the linear part is the identity.
    pub fn is_translation(&self, tolerance: f64) -> bool {
        (self.m[(0, 0)] - 1.0).abs() <= tolerance
            && self.m[(0, 1)].abs() <= tolerance
            && self.m[(1, 0)].abs() <= tolerance
            && (self.m[(1, 1)] - 1.0).abs() <= tolerance
    }

    pub fn is_identity_within(&self, tolerance: f64) -> bool {
        let (tx, ty) = self.translation_part();
        self.is_translation(tolerance) && tx.abs() <= tolerance && ty.abs() <= tolerance
    }

    pub fn approx_eq(&self, other: &Affine2D, tolerance: f64) -> bool {
        self.m
            .iter()
            .zip(other.m.iter())
            .all(|(a, b)| (a - b).abs() <= tolerance * a.abs().max(b.abs()).max(1.0))
    }

    /// `+1` for a non-flipped transform, `-1` for one axis flipped, `0` when
    /// the linear part is not a scaled rotation (shear).
    pub fn flip(&self) -> i8 {
        let scale_x = sign(self.m[(0, 0)]);
        let scale_y = sign(self.m[(1, 1)]);
        let shear_x = sign(self.m[(0, 1)]);
        let shear_y = sign(self.m[(1, 0)]);
        if scale_x == scale_y && shear_x == -shear_y {
            1
        } else if scale_x == -scale_y && shear_x == shear_y {
            -1
        } else {
            0
        }
    }

    /// Rotation angle of the linear part in radians, flip compensated.
    pub fn rotation_angle(&self) -> f64 {
        let flip = self.flip();
        let (m00, m01, m10, m11) = (
            self.m[(0, 0)],
            self.m[(0, 1)],
            self.m[(1, 0)],
            self.m[(1, 1)],
        );
        if flip == 0 {
            return m10.atan2(m00);
        }
        let scale_x = m00.hypot(m01);
        let scale_y = m11.hypot(m10) * flip as f64;
        (m10 / scale_y - m01 / scale_x).atan2(m11 / scale_y + m00 / scale_x)
    }

    /// Per-axis scale factors (magnitude of each row of the linear part).
    pub fn scale_factors(&self) -> [f64; 2] {
        [
            self.m[(0, 0)].hypot(self.m[(0, 1)]),
            self.m[(1, 0)].hypot(self.m[(1, 1)]),
        ]
    }
}

fn sign(v: f64) -> i8 {
    if v > 0.0 {
        1
    } else if v < 0.0 {
        -1
    } else {
        0
    }
}

impl MathTransform for Affine2D {
    fn transform_point(&self, p: Point) -> Result<Point> {
        Ok(self.apply(p))
    }

    fn inverse(&self) -> Result<Arc<dyn MathTransform>> {
        Ok(Arc::new(self.try_inverse()?))
    }

    fn as_affine(&self) -> Option<Affine2D> {
        Some(*self)
    }

    fn is_identity(&self) -> bool {
        self.is_identity_within(0.0)
    }

    fn transform_bbox(&self, bbox: &BoundingBox) -> Result<BoundingBox> {
        Ok(self.apply_bbox(bbox))
    }
}
