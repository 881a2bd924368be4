//! Wrap-around planning for CRS with a periodic axis.
//!
//! When the objective CRS repeats along one axis (longitude), a view can show
//! more than one period. The planner computes how many translated replicas
//! of the scene are needed on each side of the cut line and the transforms
//! that draw them.

use map_common::{BoundingBox, CrsCode, Point, Polygon, Segment};
use projection::Affine2D;
use tracing::{debug, warn};

use crate::config::RendererConfig;
use crate::error::{RenderError, Result};
use crate::view::ViewTransform;

/// Foot of the perpendicular from `p` onto the line through `w0` and `w1`.
///
/// For a line of slope `m` through `(x2, y2)` the projection is
/// `x' = ((y - y0)·m + x) / (m² + 1)`, `y' = x'·m + y0` with
/// `y0 = y2 - m·x2`. A vertical line keeps `y` and takes `x' = x2`.
pub fn nearest_colinear_point(p: Point, w0: Point, w1: Point) -> Point {
    let dx = w1.x - w0.x;
    if dx == 0.0 {
        return Point::new(w1.x, p.y);
    }
    let m = (w1.y - w0.y) / dx;
    let y0 = w1.y - m * w1.x;
    let x = ((p.y - y0) * m + p.x) / (m * m + 1.0);
    Point::new(x, x * m + y0)
}

/// One copy of the scene to draw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Replica {
    /// Number of periods shifted, negative toward the decreasing side.
    pub offset: i64,
    /// Translation applied in objective space.
    pub translation: Affine2D,
    /// `translation` followed by the view's objective to display transform.
    pub objective_to_display: Affine2D,
}

/// Replication parameters for one view.
///
/// Index 0 of every transform array is the untranslated scene.
#[derive(Debug, Clone, PartialEq)]
pub struct WrapParams {
    wrap_points: [Point; 2],
    dec_nb: usize,
    inc_nb: usize,
    dec_obj: Vec<Affine2D>,
    inc_obj: Vec<Affine2D>,
    dec_obj_to_disp: Vec<Affine2D>,
    inc_obj_to_disp: Vec<Affine2D>,
    area: Polygon,
    dec_line: Segment,
    inc_line: Segment,
    /// Objective envelope of the clip rectangle, used to select replicas.
    clip_envelope: BoundingBox,
}

impl WrapParams {
    pub fn wrap_points(&self) -> [Point; 2] {
        self.wrap_points
    }

    /// Translation of one period.
    pub fn period(&self) -> Point {
        self.wrap_points[1].sub(&self.wrap_points[0])
    }

    pub fn dec_nb(&self) -> usize {
        self.dec_nb
    }

    pub fn inc_nb(&self) -> usize {
        self.inc_nb
    }

    pub fn dec_obj(&self) -> &[Affine2D] {
        &self.dec_obj
    }

    pub fn inc_obj(&self) -> &[Affine2D] {
        &self.inc_obj
    }

    pub fn dec_obj_to_disp(&self) -> &[Affine2D] {
        &self.dec_obj_to_disp
    }

    pub fn inc_obj_to_disp(&self) -> &[Affine2D] {
        &self.inc_obj_to_disp
    }

    /// The full periodic range as a polygon in objective space.
    pub fn area(&self) -> &Polygon {
        &self.area
    }

    /// Cut line through the first wrap point.
    pub fn dec_line(&self) -> &Segment {
        &self.dec_line
    }

    /// Cut line through the second wrap point.
    pub fn inc_line(&self) -> &Segment {
        &self.inc_line
    }

    /// Every replica, decreasing side first, then the base scene, then the
    /// increasing side.
    pub fn replicas(&self) -> impl Iterator<Item = Replica> + '_ {
        let dec = (1..=self.dec_nb).rev().map(move |i| Replica {
            offset: -(i as i64),
            translation: self.dec_obj[i],
            objective_to_display: self.dec_obj_to_disp[i],
        });
        let inc = (0..=self.inc_nb).map(move |i| Replica {
            offset: i as i64,
            translation: self.inc_obj[i],
            objective_to_display: self.inc_obj_to_disp[i],
        });
        dec.chain(inc)
    }

    /// Replicas whose translated `bbox` (objective space) reaches the clip
    /// area of the view.
    pub fn replicas_for(&self, bbox: &BoundingBox) -> Vec<Replica> {
        self.replicas()
            .filter(|r| r.translation.apply_bbox(bbox).intersects(&self.clip_envelope))
            .collect()
    }

    /// Whether a geometry with this objective envelope crosses a cut line.
    pub fn crosses_cut_line(&self, bbox: &BoundingBox) -> bool {
        let outline = Polygon::from_bbox(bbox);
        outline.touches_segment(&self.dec_line, 0.0) || outline.touches_segment(&self.inc_line, 0.0)
    }

    /// Number of whole periods between `p` and the canonical range.
    fn periods_from_canonical(&self, p: Point) -> f64 {
        let delta = self.period();
        let k = p.sub(&self.wrap_points[0]).dot(&delta) / delta.dot(&delta);
        k.floor()
    }

    /// `p` shifted by whole periods into the canonical range.
    pub fn normalize_point(&self, p: Point) -> Point {
        let shift = self.periods_from_canonical(p);
        p.sub(&self.period().scale(shift))
    }

    /// Canonical representative of an objective box.
    ///
    /// The box is shifted by whole periods so its centre lies in the
    /// canonical range. When it still crosses a cut line, or spans a whole
    /// period, the periodic axis is widened to the full range.
    pub fn normalize(&self, bbox: &BoundingBox) -> BoundingBox {
        let shift = self.period().scale(self.periods_from_canonical(bbox.center()));
        let moved = bbox.translate(-shift.x, -shift.y);
        let [w0, w1] = self.wrap_points;
        let delta = self.period();
        if delta.x.abs() >= delta.y.abs() {
            let (lo, hi) = (w0.x.min(w1.x), w0.x.max(w1.x));
            if moved.min_x < lo || moved.max_x > hi {
                return BoundingBox::new(lo, moved.min_y, hi, moved.max_y);
            }
        } else {
            let (lo, hi) = (w0.y.min(w1.y), w0.y.max(w1.y));
            if moved.min_y < lo || moved.max_y > hi {
                return BoundingBox::new(moved.min_x, lo, moved.max_x, hi);
            }
        }
        moved
    }
}

/// Computes [`WrapParams`] for a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WrapAroundPlanner {
    max_replicas: usize,
    overlap_margin: usize,
}

impl Default for WrapAroundPlanner {
    fn default() -> Self {
        Self::new(3, 1)
    }
}

impl WrapAroundPlanner {
    pub fn new(max_replicas: usize, overlap_margin: usize) -> Self {
        Self {
            max_replicas,
            overlap_margin,
        }
    }

    pub fn from_config(config: &RendererConfig) -> Self {
        Self::new(config.max_wrap_replicas, config.wrap_overlap_margin)
    }

    /// Plan replication for `view` in `crs`.
    ///
    /// `None` when the CRS has no periodic axis, or when planning fails; the
    /// pass then renders without replicas.
    pub fn plan(&self, crs: CrsCode, view: &ViewTransform, clip_margin_px: f64) -> Option<WrapParams> {
        let wrap_points = crs.wrap_points()?;
        self.plan_with_points(crs, wrap_points, view, clip_margin_px)
    }

    fn plan_with_points(
        &self,
        crs: CrsCode,
        wrap_points: [Point; 2],
        view: &ViewTransform,
        clip_margin_px: f64,
    ) -> Option<WrapParams> {
        match self.try_plan(crs, wrap_points, view, clip_margin_px) {
            Ok(params) => {
                debug!(
                    crs = %crs,
                    dec = params.dec_nb,
                    inc = params.inc_nb,
                    "Planned wrap-around replicas"
                );
                Some(params)
            }
            Err(e) => {
                warn!(crs = %crs, error = %e, "Wrap-around planning failed, rendering without replicas");
                None
            }
        }
    }

    fn try_plan(
        &self,
        crs: CrsCode,
        wrap_points: [Point; 2],
        view: &ViewTransform,
        clip_margin_px: f64,
    ) -> Result<WrapParams> {
        let [w0, w1] = wrap_points;
        let delta = w1.sub(&w0);
        let len2 = delta.dot(&delta);
        if !len2.is_finite() || len2 == 0.0 {
            return Err(RenderError::invalid_geometry("degenerate wrap points"));
        }

        let display_to_objective = view.display_to_objective();
        let mut dec_needed = 0.0_f64;
        let mut inc_needed = 0.0_f64;
        for corner in view.display_bounds().corners() {
            let objective = display_to_objective.apply(corner);
            let on_line = nearest_colinear_point(objective, w0, w1);
            let k = on_line.sub(&w0).dot(&delta) / len2;
            if !k.is_finite() {
                return Err(RenderError::invalid_geometry(format!(
                    "corner {:?} has no position on the periodic axis",
                    objective
                )));
            }
            if k < 0.0 {
                dec_needed = dec_needed.max((-k).ceil());
            } else if k > 1.0 {
                inc_needed = inc_needed.max((k - 1.0).ceil());
            }
        }

        let dec_nb = self.replica_count(dec_needed);
        let inc_nb = self.replica_count(inc_needed);

        let base = *view.objective_to_display();
        let shifts = |n: usize, sign: f64| -> Vec<Affine2D> {
            (0..=n)
                .map(|i| {
                    let f = sign * i as f64;
                    Affine2D::translation(f * delta.x, f * delta.y)
                })
                .collect()
        };
        let dec_obj = shifts(dec_nb, -1.0);
        let inc_obj = shifts(inc_nb, 1.0);
        let dec_obj_to_disp = dec_obj.iter().map(|t| t.then(&base)).collect();
        let inc_obj_to_disp = inc_obj.iter().map(|t| t.then(&base)).collect();

        // Cut lines run perpendicular to the period across the CRS domain.
        let normal = Point::new(-delta.y, delta.x).scale(1.0 / len2.sqrt());
        let (s_min, s_max) = crs
            .valid_bounds()
            .corners()
            .iter()
            .map(|c| c.sub(&w0).dot(&normal))
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), s| (lo.min(s), hi.max(s)));
        if !s_min.is_finite() || !s_max.is_finite() {
            return Err(RenderError::invalid_geometry(format!(
                "unbounded domain for {}",
                crs
            )));
        }
        let dec_line = Segment::new(w0.add(&normal.scale(s_min)), w0.add(&normal.scale(s_max)));
        let inc_line = Segment::new(w1.add(&normal.scale(s_min)), w1.add(&normal.scale(s_max)));
        let area = Polygon::new(vec![dec_line.a, inc_line.a, inc_line.b, dec_line.b]);

        let clip_envelope =
            display_to_objective.apply_bbox(&view.display_bounds().expand(clip_margin_px));

        Ok(WrapParams {
            wrap_points,
            dec_nb,
            inc_nb,
            dec_obj,
            inc_obj,
            dec_obj_to_disp,
            inc_obj_to_disp,
            area,
            dec_line,
            inc_line,
            clip_envelope,
        })
    }

    /// Needed replicas, plus the overlap margin, never above the maximum.
    fn replica_count(&self, needed: f64) -> usize {
        let needed = needed.min(self.max_replicas as f64) as usize;
        (needed + self.overlap_margin).min(self.max_replicas)
    }
}
