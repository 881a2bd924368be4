//! Scene model: features, data sources, layers and their ordering.

use std::fmt;
use std::sync::Arc;

use map_common::{BoundingBox, CrsCode, Geometry, GridGeometry};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::context::{PaintSession, RenderingContext};
use crate::coverage::Coverage;
use crate::error::Result;
use crate::presentation::{FeatureId, PresentationStream};
use crate::style::StyleEvaluator;

/// A vector feature in its source CRS.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub id: FeatureId,
    pub geometry: Geometry,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl Feature {
    pub fn new(id: impl Into<FeatureId>, geometry: Geometry) -> Self {
        Self {
            id: id.into(),
            geometry,
            attributes: Map::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Attribute rendered as text; strings lose their quotes.
    pub fn attribute_text(&self, key: &str) -> Option<String> {
        match self.attributes.get(key)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

pub type FeatureIter<'a> = Box<dyn Iterator<Item = Result<Feature>> + 'a>;

/// Read access to a vector data store.
pub trait FeatureSource: Send + Sync {
    fn crs(&self) -> CrsCode;

    /// Features whose envelope intersects `region`, given in the source CRS.
    fn features<'a>(&'a self, region: &BoundingBox) -> Result<FeatureIter<'a>>;
}

/// Read access to a raster data store.
pub trait CoverageSource: Send + Sync {
    /// Full grid geometry of the stored coverage.
    fn grid(&self) -> &GridGeometry;

    /// Read `region` (coverage CRS) at about `resolution` objective units
    /// per pixel. Implementations may return more than requested.
    fn read(&self, region: &BoundingBox, resolution: [f64; 2]) -> Result<Coverage>;
}

/// Features held in memory.
#[derive(Debug, Clone)]
pub struct MemoryFeatures {
    crs: CrsCode,
    features: Vec<Feature>,
}

impl MemoryFeatures {
    pub fn new(crs: CrsCode, features: Vec<Feature>) -> Self {
        Self { crs, features }
    }
}

impl FeatureSource for MemoryFeatures {
    fn crs(&self) -> CrsCode {
        self.crs
    }

    fn features<'a>(&'a self, region: &BoundingBox) -> Result<FeatureIter<'a>> {
        let region = *region;
        Ok(Box::new(
            self.features
                .iter()
                .filter(move |f| f.geometry.bbox().intersects(&region))
                .cloned()
                .map(Ok),
        ))
    }
}

/// The data a layer portrays.
#[derive(Clone)]
pub enum Resource {
    Features(Arc<dyn FeatureSource>),
    Coverage(Arc<dyn CoverageSource>),
}

impl Resource {
    pub fn crs(&self) -> CrsCode {
        match self {
            Resource::Features(source) => source.crs(),
            Resource::Coverage(source) => source.grid().crs,
        }
    }

    pub fn is_coverage(&self) -> bool {
        matches!(self, Resource::Coverage(_))
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Features(source) => write!(f, "Features({})", source.crs()),
            Resource::Coverage(source) => write!(f, "Coverage({})", source.grid().crs),
        }
    }
}

/// Additional presentations generated for a layer after its style ran,
/// such as decorations or derived symbols.
pub trait PortrayalExtension: Send + Sync {
    fn presentations<'a>(
        &'a self,
        ctx: &'a RenderingContext,
        layer: &'a MapLayer,
    ) -> Result<PresentationStream<'a>>;
}

/// A layer portrayed through presentations.
#[derive(Clone)]
pub struct MapLayer {
    pub name: String,
    pub resource: Resource,
    pub style: Arc<dyn StyleEvaluator>,
    pub extensions: Vec<Arc<dyn PortrayalExtension>>,
    pub visible: bool,
    pub opacity: f32,
}

impl MapLayer {
    pub fn new(name: impl Into<String>, resource: Resource, style: Arc<dyn StyleEvaluator>) -> Self {
        Self {
            name: name.into(),
            resource,
            style,
            extensions: Vec::new(),
            visible: true,
            opacity: 1.0,
        }
    }

    pub fn with_extension(mut self, extension: Arc<dyn PortrayalExtension>) -> Self {
        self.extensions.push(extension);
        self
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity.clamp(0.0, 1.0);
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }
}

impl fmt::Debug for MapLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapLayer")
            .field("name", &self.name)
            .field("resource", &self.resource)
            .field("extensions", &self.extensions.len())
            .field("visible", &self.visible)
            .field("opacity", &self.opacity)
            .finish()
    }
}

/// Painter that draws straight to the surface, bypassing presentations.
pub trait DirectPainter: Send + Sync {
    /// Paint the layer; returns whether anything was drawn.
    fn paint(&self, ctx: &RenderingContext, session: &mut PaintSession<'_>) -> Result<bool>;
}

#[derive(Clone)]
pub struct DirectLayer {
    pub name: String,
    pub painter: Arc<dyn DirectPainter>,
    pub visible: bool,
}

impl DirectLayer {
    pub fn new(name: impl Into<String>, painter: Arc<dyn DirectPainter>) -> Self {
        Self {
            name: name.into(),
            painter,
            visible: true,
        }
    }
}

impl fmt::Debug for DirectLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectLayer")
            .field("name", &self.name)
            .field("visible", &self.visible)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub enum SceneLayer {
    Portrayed(MapLayer),
    Direct(DirectLayer),
}

impl SceneLayer {
    pub fn name(&self) -> &str {
        match self {
            SceneLayer::Portrayed(layer) => &layer.name,
            SceneLayer::Direct(layer) => &layer.name,
        }
    }

    pub fn is_visible(&self) -> bool {
        match self {
            SceneLayer::Portrayed(layer) => layer.visible,
            SceneLayer::Direct(layer) => layer.visible,
        }
    }
}

impl From<MapLayer> for SceneLayer {
    fn from(layer: MapLayer) -> Self {
        SceneLayer::Portrayed(layer)
    }
}

impl From<DirectLayer> for SceneLayer {
    fn from(layer: DirectLayer) -> Self {
        SceneLayer::Direct(layer)
    }
}

#[derive(Debug, Clone)]
pub enum SceneItem {
    Layer(SceneLayer),
    Group {
        name: String,
        visible: bool,
        children: Vec<SceneItem>,
    },
}

/// Ordered scene; the first item is painted first (bottom of the z-order).
#[derive(Debug, Clone, Default)]
pub struct Scene {
    pub items: Vec<SceneItem>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_layer(mut self, layer: impl Into<SceneLayer>) -> Self {
        self.items.push(SceneItem::Layer(layer.into()));
        self
    }

    pub fn with_group(mut self, name: impl Into<String>, children: Vec<SceneItem>) -> Self {
        self.items.push(SceneItem::Group {
            name: name.into(),
            visible: true,
            children,
        });
        self
    }

    /// Visible layers in ascending z-order, groups expanded.
    pub fn flatten(&self) -> Vec<&SceneLayer> {
        fn walk<'a>(items: &'a [SceneItem], out: &mut Vec<&'a SceneLayer>) {
            for item in items {
                match item {
                    SceneItem::Layer(layer) if layer.is_visible() => out.push(layer),
                    SceneItem::Layer(_) => {}
                    SceneItem::Group {
                        visible, children, ..
                    } => {
                        if *visible {
                            walk(children, out);
                        }
                    }
                }
            }
        }
        let mut out = Vec::new();
        walk(&self.items, &mut out);
        out
    }
}
