//! JSON scene descriptions.
//!
//! ```json
//! {
//!   "layers": [
//!     { "name": "sst", "kind": "raster", "image": "sst.png",
//!       "crs": "CRS:84", "bbox": [-180, -90, 180, 90] },
//!     { "name": "ports", "kind": "features", "crs": "EPSG:3857",
//!       "features": [...], "style": { "stroke_color": "#ff0000" } }
//!   ]
//! }
//! ```
//!
//! Relative image and style paths resolve against the scene file's
//! directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use map_common::{BoundingBox, CrsCode, GridGeometry, TimeRange};
use renderer::{
    Coverage, DefaultRasterStyle, Feature, MapLayer, MemoryCoverage, MemoryFeatures, Resource, Scene,
    SceneItem, SimpleStyle, StyleDefinition, StyleEvaluator,
};
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
pub struct SceneFile {
    pub layers: Vec<LayerEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LayerEntry {
    Features {
        name: String,
        crs: String,
        features: Vec<Feature>,
        #[serde(default)]
        style: Option<StyleDefinition>,
        #[serde(default)]
        style_file: Option<PathBuf>,
        #[serde(flatten)]
        display: DisplayOptions,
    },
    Raster {
        name: String,
        crs: String,
        image: PathBuf,
        bbox: [f64; 4],
        /// ISO 8601 instant or `start/end` interval of the data.
        #[serde(default)]
        time: Option<String>,
        #[serde(flatten)]
        display: DisplayOptions,
    },
    Group {
        name: String,
        #[serde(default = "default_true")]
        visible: bool,
        layers: Vec<LayerEntry>,
    },
}

#[derive(Debug, Deserialize)]
pub struct DisplayOptions {
    #[serde(default = "default_opacity")]
    pub opacity: f32,
    #[serde(default = "default_true")]
    pub visible: bool,
}

fn default_opacity() -> f32 {
    1.0
}

fn default_true() -> bool {
    true
}

impl SceneFile {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("invalid scene description")
    }

    pub fn load(path: &Path) -> Result<Scene> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read scene {}", path.display()))?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_json(&json)?.into_scene(base)
    }

    pub fn into_scene(self, base: &Path) -> Result<Scene> {
        let items = self
            .layers
            .into_iter()
            .map(|entry| entry.into_item(base))
            .collect::<Result<Vec<_>>>()?;
        Ok(Scene { items })
    }
}

fn parse_crs(s: &str) -> Result<CrsCode> {
    CrsCode::from_wms_string(s).map_err(|e| anyhow!(e))
}

impl LayerEntry {
    fn into_item(self, base: &Path) -> Result<SceneItem> {
        let (layer, display) = match self {
            LayerEntry::Group {
                name,
                visible,
                layers,
            } => {
                let children = layers
                    .into_iter()
                    .map(|entry| entry.into_item(base))
                    .collect::<Result<Vec<_>>>()?;
                return Ok(SceneItem::Group {
                    name,
                    visible,
                    children,
                });
            }
            LayerEntry::Features {
                name,
                crs,
                features,
                style,
                style_file,
                display,
            } => {
                let style: Arc<dyn StyleEvaluator> = match (style, style_file) {
                    (Some(_), Some(_)) => bail!("layer '{}' sets both style and style_file", name),
                    (Some(definition), None) => Arc::new(definition.into_style()?),
                    (None, Some(file)) => {
                        let path = base.join(file);
                        let path = path
                            .to_str()
                            .ok_or_else(|| anyhow!("non UTF-8 style path {}", path.display()))?;
                        Arc::new(SimpleStyle::from_file(path)?)
                    }
                    (None, None) => Arc::new(SimpleStyle::default()),
                };
                debug!(layer = %name, features = features.len(), "Loaded feature layer");
                let source = MemoryFeatures::new(parse_crs(&crs)?, features);
                (MapLayer::new(name, Resource::Features(Arc::new(source)), style), display)
            }
            LayerEntry::Raster {
                name,
                crs,
                image,
                bbox,
                time,
                display,
            } => {
                let path = base.join(&image);
                let pixels = image::open(&path)
                    .with_context(|| format!("cannot read raster {}", path.display()))?
                    .to_rgba8();
                let [min_x, min_y, max_x, max_y] = bbox;
                let mut grid = GridGeometry::from_bbox(
                    &BoundingBox::new(min_x, min_y, max_x, max_y),
                    parse_crs(&crs)?,
                    pixels.width(),
                    pixels.height(),
                )?;
                if let Some(time) = time {
                    grid = grid.with_temporal(TimeRange::parse(&time)?);
                }
                debug!(
                    layer = %name,
                    width = pixels.width(),
                    height = pixels.height(),
                    "Loaded raster layer"
                );
                let coverage = Coverage::new(grid, pixels)?;
                (
                    MapLayer::new(
                        name,
                        Resource::Coverage(Arc::new(MemoryCoverage::new(coverage))),
                        Arc::new(DefaultRasterStyle),
                    ),
                    display,
                )
            }
        };

        let mut layer = layer.with_opacity(display.opacity);
        layer.visible = display.visible;
        Ok(SceneItem::Layer(layer.into()))
    }
}
