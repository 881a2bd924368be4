//! Label placement.
//!
//! Labels are queued while presentations are painted and drawn in a final
//! pass, so they end up above every layer. Overlapping labels are
//! decimated: higher priority first, then first come first served.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use map_common::{BoundingBox, Point};
use tracing::{debug, warn};

use crate::context::RenderingContext;
use crate::error::Result;
use crate::presentation::LabelPresentation;
use crate::surface::DrawSurface;
use crate::text::GlyphMetrics;

/// Label font metrics per size, shared by every label renderer of a pass.
#[derive(Debug, Default)]
pub struct FontMetricsCache {
    entries: Mutex<HashMap<u32, GlyphMetrics>>,
}

impl FontMetricsCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metrics(&self, size: f32) -> Result<GlyphMetrics> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(metrics) = entries.get(&size.to_bits()) {
            return Ok(*metrics);
        }
        let metrics = GlyphMetrics::for_size(size)?;
        entries.insert(size.to_bits(), metrics);
        Ok(metrics)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

/// A label with its position on the canvas.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedLabel {
    pub label: LabelPresentation,
    pub center: Point,
    /// Plate rectangle in display pixels.
    pub bbox: BoundingBox,
}

#[derive(Debug)]
pub struct LabelRenderer {
    min_spacing: f64,
    metrics: Arc<FontMetricsCache>,
    queued: Vec<LabelPresentation>,
}

impl LabelRenderer {
    pub fn new(min_spacing: f64, metrics: Arc<FontMetricsCache>) -> Self {
        Self {
            min_spacing,
            metrics,
            queued: Vec::new(),
        }
    }

    pub fn queue(&mut self, label: LabelPresentation) {
        self.queued.push(label);
    }

    pub fn len(&self) -> usize {
        self.queued.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queued.is_empty()
    }

    /// The queued labels, undrawn.
    pub fn into_queued(self) -> Vec<LabelPresentation> {
        self.queued
    }

    /// Display position of a label, on the first replica that puts its
    /// anchor on the canvas. `None` when it is off screen.
    fn place(&self, ctx: &RenderingContext, label: &LabelPresentation) -> Result<Option<PlacedLabel>> {
        let objective = ctx.data_to_objective(label.crs)?.transform_point(label.anchor)?;
        let canvas = ctx.canvas_display_bounds();
        let anchor_box = BoundingBox::new(objective.x, objective.y, objective.x, objective.y);
        let center = ctx
            .replicas_for(&anchor_box)
            .iter()
            .map(|r| r.objective_to_display.apply(objective))
            .find(|p| canvas.contains_point(p.x, p.y));
        let Some(center) = center else {
            return Ok(None);
        };

        let metrics = self.metrics.metrics(label.size)?;
        let half_w = (metrics.text_width(&label.text)? / 2.0 + metrics.padding) as f64;
        let half_h = (metrics.text_height() / 2.0 + metrics.padding) as f64;
        Ok(Some(PlacedLabel {
            label: label.clone(),
            center,
            bbox: BoundingBox::new(
                center.x - half_w,
                center.y - half_h,
                center.x + half_w,
                center.y + half_h,
            ),
        }))
    }

    /// Drain the queue and keep the labels that fit.
    pub fn decimate(&mut self, ctx: &RenderingContext) -> Vec<PlacedLabel> {
        let mut queued = std::mem::take(&mut self.queued);
        // stable: equal priorities keep their paint order
        queued.sort_by(|a, b| b.priority.cmp(&a.priority));

        let mut placed: Vec<PlacedLabel> = Vec::new();
        for label in &queued {
            let candidate = match self.place(ctx, label) {
                Ok(Some(candidate)) => candidate,
                Ok(None) => continue,
                Err(e) => {
                    warn!(
                        layer = %label.layer,
                        feature = %label.feature,
                        error = %e,
                        "Could not place label"
                    );
                    continue;
                }
            };
            let padded = candidate.bbox.expand(self.min_spacing);
            if placed.iter().any(|p| p.bbox.intersects(&padded)) {
                continue;
            }
            placed.push(candidate);
        }
        debug!(queued = queued.len(), placed = placed.len(), "Decimated labels");
        placed
    }

    /// Decimate and draw; returns the number of labels drawn.
    pub fn render(&mut self, ctx: &RenderingContext, surface: &mut dyn DrawSurface) -> usize {
        let mut drawn = 0;
        for placed in self.decimate(ctx) {
            let label = &placed.label;
            match surface.draw_text(&label.text, placed.center, label.size, label.color) {
                Ok(()) => drawn += 1,
                Err(e) => warn!(layer = %label.layer, error = %e, "Could not draw label"),
            }
        }
        drawn
    }
}
