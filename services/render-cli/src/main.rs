//! Render CLI.
//!
//! Renders a JSON scene onto a PNG, or reports the features under a pixel
//! of the same view as JSON.

mod scene_file;

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use map_common::{BoundingBox, CrsCode, GridGeometry, Point, TimeRange};
use renderer::{
    render_tiles, CollectingVisitor, HitTester, PixmapSurface, Presentation, RenderState,
    RendererConfig, RenderingContextBuilder, SceneRenderer, SearchArea,
};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use scene_file::SceneFile;

#[derive(Parser, Debug)]
#[command(name = "render-cli")]
#[command(about = "Render map scenes and query features under the cursor")]
struct Cli {
    /// Log level
    #[arg(long, default_value = "info", env = "RUST_LOG", global = true)]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "RENDER_LOG_JSON", global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render the scene to a PNG file
    Render {
        #[command(flatten)]
        view: ViewArgs,

        /// Output PNG path
        #[arg(short, long)]
        output: PathBuf,

        /// Render in parallel tiles of this many pixels
        #[arg(long, env = "RENDER_TILE_SIZE")]
        tile_size: Option<u32>,
    },

    /// Print the presentations under a display pixel as JSON
    Pick {
        #[command(flatten)]
        view: ViewArgs,

        /// Display column
        #[arg(long)]
        x: f64,

        /// Display row
        #[arg(long)]
        y: f64,

        /// Half size of the search square in pixels
        #[arg(long, default_value = "3")]
        radius: f64,

        /// Stop after this many hits
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[derive(Args, Debug)]
struct ViewArgs {
    /// Scene description (JSON)
    #[arg(short, long)]
    scene: PathBuf,

    /// View extent: minx,miny,maxx,maxy in the view CRS
    #[arg(long, value_parser = parse_bbox)]
    bbox: BoundingBox,

    /// View CRS
    #[arg(long, default_value = "CRS:84", value_parser = parse_crs)]
    crs: CrsCode,

    #[arg(long, default_value = "512")]
    width: u32,

    #[arg(long, default_value = "256")]
    height: u32,

    /// Overrides RENDER_DPI
    #[arg(long)]
    dpi: Option<f64>,

    /// ISO 8601 instant or start/end interval of the view
    #[arg(long, value_parser = parse_time)]
    time: Option<TimeRange>,
}

fn parse_bbox(s: &str) -> Result<BoundingBox, String> {
    BoundingBox::from_wms_string(s).map_err(|e| e.to_string())
}

fn parse_crs(s: &str) -> Result<CrsCode, String> {
    CrsCode::from_wms_string(s).map_err(|e| e.to_string())
}

fn parse_time(s: &str) -> Result<TimeRange, String> {
    TimeRange::parse(s).map_err(|e| e.to_string())
}

impl ViewArgs {
    fn grid(&self) -> Result<GridGeometry> {
        let grid = GridGeometry::from_bbox(&self.bbox, self.crs, self.width, self.height)?;
        Ok(match self.time {
            Some(time) => grid.with_temporal(time),
            None => grid,
        })
    }

    fn config(&self) -> Result<RendererConfig> {
        let mut config = RendererConfig::from_env();
        if let Some(dpi) = self.dpi {
            config.dpi = dpi;
        }
        config
            .validate()
            .map_err(|e| anyhow!("invalid renderer configuration: {}", e))?;
        Ok(config)
    }
}

#[derive(Debug, Serialize)]
struct PickReport {
    tested: usize,
    stopped: bool,
    hits: Vec<PickHit>,
    failures: Vec<PickFailure>,
}

#[derive(Debug, Serialize)]
struct PickHit {
    layer: String,
    feature: Option<String>,
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct PickFailure {
    layer: String,
    message: String,
}

impl From<&Presentation> for PickHit {
    fn from(presentation: &Presentation) -> Self {
        let kind = match presentation {
            Presentation::Shape(_) => "shape",
            Presentation::Label(_) => "label",
            Presentation::Coverage(_) => "coverage",
            Presentation::Group(_) => "group",
            Presentation::Exception(_) => "exception",
        };
        Self {
            layer: presentation.layer().to_string(),
            feature: presentation.feature_id().map(str::to_string),
            kind,
        }
    }
}

fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    if cli.log_json {
        fmt().with_env_filter(filter).with_target(true).json().init();
    } else {
        fmt().with_env_filter(filter).with_target(true).init();
    }

    match cli.command {
        Command::Render {
            view,
            output,
            tile_size,
        } => render(&view, &output, tile_size),
        Command::Pick {
            view,
            x,
            y,
            radius,
            limit,
        } => pick(&view, Point::new(x, y), radius, limit),
    }
}

fn render(view: &ViewArgs, output: &Path, tile_size: Option<u32>) -> Result<()> {
    let start = Instant::now();
    let scene = SceneFile::load(&view.scene)?;
    let grid = view.grid()?;
    let config = view.config()?;
    let renderer = SceneRenderer::new();
    let monitor = renderer::NullMonitor;

    let (surface, state, painted, failures) = match tile_size {
        Some(tile_size) => {
            let tiled = render_tiles(&grid, &scene, tile_size, &config, &renderer, &monitor)?;
            info!(tiles = tiled.tiles, labels = tiled.labels_drawn, "Rendered tiles");
            (tiled.surface, tiled.state, tiled.painted, tiled.failures)
        }
        None => {
            let ctx = RenderingContextBuilder::new(grid).config(config).build()?;
            let mut surface = PixmapSurface::new(view.width, view.height)?;
            let outcome = renderer.render(&ctx, &mut surface, &scene, &monitor)?;
            info!(labels = outcome.labels_drawn, "Rendered scene");
            ctx.dispose();
            (surface, outcome.state, outcome.painted, outcome.failures)
        }
    };

    for failure in &failures {
        warn!(layer = %failure.layer, error = %failure.message, "Layer skipped");
    }
    if state == RenderState::Stopped {
        bail!("rendering was stopped before completion");
    }
    if !painted {
        warn!("Nothing was painted");
    }

    surface
        .save_png(output)
        .with_context(|| format!("cannot save {}", output.display()))?;
    info!(
        output = %output.display(),
        failures = failures.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Wrote image"
    );
    Ok(())
}

fn pick(view: &ViewArgs, at: Point, radius: f64, limit: Option<usize>) -> Result<()> {
    let scene = SceneFile::load(&view.scene)?;
    let ctx = RenderingContextBuilder::new(view.grid()?)
        .config(view.config()?)
        .build()?;

    let area = SearchArea::from_display_point(&ctx, at, radius);
    let mut visitor = match limit {
        Some(limit) => CollectingVisitor::with_limit(limit),
        None => CollectingVisitor::new(),
    };
    let outcome = HitTester::new().hit_test(&ctx, &scene, area.display(), &mut visitor)?;
    info!(tested = outcome.tested, hits = outcome.hits, "Hit test finished");

    let report = PickReport {
        tested: outcome.tested,
        stopped: outcome.stopped,
        hits: visitor.hits.iter().map(PickHit::from).collect(),
        failures: outcome
            .failures
            .into_iter()
            .map(|f| PickFailure {
                layer: f.layer,
                message: f.message,
            })
            .collect(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
