//! Tiled rendering.
//!
//! The canvas grid is cut into tiles that are rendered as independent
//! passes in parallel, each with its own context and surface, then
//! composited into one image. Labels are collected from every tile and
//! placed once over the whole canvas, so they are neither cut at a seam nor
//! decimated per tile.

use std::collections::HashSet;
use std::sync::Arc;

use map_common::GridGeometry;
use rayon::prelude::*;
use tiny_skia::{Pixmap, PixmapPaint, Transform};
use tracing::debug;

use crate::canvas::{LayerFailure, Monitor, RenderState, SceneRenderer};
use crate::config::RendererConfig;
use crate::context::RenderingContextBuilder;
use crate::error::{RenderError, Result};
use crate::labels::LabelRenderer;
use crate::layer::Scene;
use crate::presentation::LabelPresentation;
use crate::surface::PixmapSurface;

/// One tile of a tiled pass: its offset in the canvas and its rendering.
struct RenderedTile {
    x: i32,
    y: i32,
    pixmap: Pixmap,
    state: RenderState,
    painted: bool,
    failures: Vec<LayerFailure>,
    labels: Vec<LabelPresentation>,
}

/// The composited result of a tiled pass.
#[derive(Debug)]
pub struct TiledRender {
    pub surface: PixmapSurface,
    pub tiles: usize,
    pub painted: bool,
    /// Stopped when any tile was stopped.
    pub state: RenderState,
    pub failures: Vec<LayerFailure>,
    pub labels_drawn: usize,
}

/// Pixel offsets and sizes of the tiles covering `width` x `height`.
pub fn tile_layout(width: u32, height: u32, tile_size: u32) -> Vec<(u32, u32, u32, u32)> {
    let mut tiles = Vec::new();
    if tile_size == 0 {
        return tiles;
    }
    for y in (0..height).step_by(tile_size as usize) {
        for x in (0..width).step_by(tile_size as usize) {
            tiles.push((x, y, tile_size.min(width - x), tile_size.min(height - y)));
        }
    }
    tiles
}

/// Render `scene` over `grid` in tiles of `tile_size` pixels.
pub fn render_tiles(
    grid: &GridGeometry,
    scene: &Scene,
    tile_size: u32,
    config: &RendererConfig,
    renderer: &SceneRenderer,
    monitor: &dyn Monitor,
) -> Result<TiledRender> {
    if tile_size == 0 {
        return Err(RenderError::Config("tile size must be > 0".to_string()));
    }
    let (width, height) = (grid.width(), grid.height());
    let layout = tile_layout(width, height, tile_size);
    debug!(width = width, height = height, tiles = layout.len(), "Rendering tiles");

    let rendered: Vec<RenderedTile> = layout
        .par_iter()
        .map(|&(x, y, w, h)| -> Result<RenderedTile> {
            let sub = grid.subgrid(
                grid.extent.low_x + x as i64,
                grid.extent.low_y + y as i64,
                w,
                h,
            )?;
            let ctx = RenderingContextBuilder::new(sub)
                .config(config.clone())
                .build()?;
            let mut surface = PixmapSurface::new(w, h)?;
            let (outcome, labels) = renderer.render_deferring_labels(&ctx, &mut surface, scene, monitor)?;
            ctx.dispose();
            Ok(RenderedTile {
                x: x as i32,
                y: y as i32,
                pixmap: surface.into_pixmap(),
                state: outcome.state,
                painted: outcome.painted,
                failures: outcome.failures,
                labels,
            })
        })
        .collect::<Result<_>>()?;

    let mut canvas = Pixmap::new(width, height)
        .ok_or_else(|| RenderError::surface(format!("cannot allocate {}x{} canvas", width, height)))?;
    let tiles = rendered.len();
    let mut painted = false;
    let mut state = RenderState::Finished;
    let mut failures = Vec::new();
    let mut labels = Vec::new();
    let mut seen = HashSet::new();
    for tile in rendered {
        canvas.draw_pixmap(
            tile.x,
            tile.y,
            tile.pixmap.as_ref(),
            &PixmapPaint::default(),
            Transform::identity(),
            None,
        );
        painted |= tile.painted;
        if tile.state == RenderState::Stopped {
            state = RenderState::Stopped;
        }
        failures.extend(tile.failures);
        // features near a seam are read by every tile whose clip reaches them
        labels.extend(tile.labels.into_iter().filter(|l| seen.insert(label_key(l))));
    }

    let mut surface = PixmapSurface::from_pixmap(canvas);
    let ctx = RenderingContextBuilder::new(grid.clone())
        .config(config.clone())
        .build()?;
    let mut placer = LabelRenderer::new(config.label_min_spacing_px, Arc::clone(ctx.font_metrics()));
    for label in labels {
        placer.queue(label);
    }
    let labels_drawn = placer.render(&ctx, &mut surface);
    ctx.dispose();
    debug!(labels = labels_drawn, "Placed labels over the full canvas");

    Ok(TiledRender {
        surface,
        tiles,
        painted: painted || labels_drawn > 0,
        state,
        failures,
        labels_drawn,
    })
}

fn label_key(label: &LabelPresentation) -> (String, String, String, u64, u64) {
    (
        label.layer.clone(),
        label.feature.clone(),
        label.text.clone(),
        label.anchor.x.to_bits(),
        label.anchor.y.to_bits(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_covers_canvas() {
        let tiles = tile_layout(100, 70, 32);
        assert_eq!(tiles.len(), 4 * 3);
        let area: u32 = tiles.iter().map(|(_, _, w, h)| w * h).sum();
        assert_eq!(area, 100 * 70);
        assert_eq!(tiles.last(), Some(&(96, 64, 4, 6)));
    }

    #[test]
    fn test_zero_tile_size() {
        assert!(tile_layout(10, 10, 0).is_empty());
    }
}
