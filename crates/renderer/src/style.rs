//! Style evaluation: turning layer data into presentations.
//!
//! Styles are pluggable through [`StyleEvaluator`]. Two defaults ship with
//! the renderer: [`SimpleStyle`] for vector features and
//! [`DefaultRasterStyle`] for coverages.

use map_common::{Color, CrsCode, Geometry, Point};
use serde::{Deserialize, Serialize};

use crate::context::RenderingContext;
use crate::coverage::read_for_view;
use crate::error::{RenderError, Result};
use crate::layer::{Feature, MapLayer, Resource};
use crate::presentation::{
    CoveragePresentation, GroupPresentation, LabelPresentation, Presentation, PresentationStream,
    ShapePresentation, StrokeStyle,
};

/// Produces the presentations of a layer for one pass.
pub trait StyleEvaluator: Send + Sync {
    /// Lazy presentation sequence for `layer`. An `Err` for the whole call
    /// means the layer could not be portrayed at all; `Err` items are
    /// failures of single presentations.
    fn presentations<'a>(
        &'a self,
        ctx: &'a RenderingContext,
        layer: &'a MapLayer,
    ) -> Result<PresentationStream<'a>>;

    /// True only for the unmodified default raster style, which allows the
    /// renderer to write a lone coverage layer directly.
    fn is_default_raster(&self) -> bool {
        false
    }
}

/// Scale denominators a rule applies to. `min` is inclusive, `max`
/// exclusive, as in OGC Symbology Encoding.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleRange {
    pub min: f64,
    pub max: f64,
}

impl Default for ScaleRange {
    fn default() -> Self {
        Self {
            min: 0.0,
            max: f64::INFINITY,
        }
    }
}

impl ScaleRange {
    pub fn contains(&self, scale: f64) -> bool {
        scale >= self.min && scale < self.max
    }
}

/// Label rule: text taken from a feature attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelRule {
    pub attribute: String,
    pub color: [u8; 4],
    pub size: f32,
    #[serde(default)]
    pub priority: i32,
}

/// One symbolizer applied to every feature of a layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimpleStyle {
    pub stroke: Option<StrokeStyle>,
    pub fill: Option<[u8; 4]>,
    /// Radius of point markers in pixels.
    pub point_radius: f64,
    pub label: Option<LabelRule>,
    pub scale_range: ScaleRange,
}

impl Default for SimpleStyle {
    fn default() -> Self {
        Self {
            stroke: Some(StrokeStyle {
                color: [0, 0, 0, 255],
                width: 1.0,
            }),
            fill: None,
            point_radius: 3.0,
            label: None,
            scale_range: ScaleRange::default(),
        }
    }
}

/// JSON form of a [`SimpleStyle`], with colors as CSS strings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StyleDefinition {
    pub stroke_color: Option<String>,
    pub stroke_width: Option<f32>,
    pub fill_color: Option<String>,
    pub point_radius: Option<f64>,
    pub label_attribute: Option<String>,
    pub label_color: Option<String>,
    pub label_size: Option<f32>,
    pub label_priority: Option<i32>,
    pub min_scale: Option<f64>,
    pub max_scale: Option<f64>,
}

fn parse_color(value: &str) -> Result<[u8; 4]> {
    let (r, g, b, a) = Color::parse(value)
        .ok_or_else(|| RenderError::portrayal(format!("invalid color '{}'", value)))?
        .to_rgba();
    Ok([r, g, b, a])
}

impl StyleDefinition {
    pub fn into_style(self) -> Result<SimpleStyle> {
        let defaults = SimpleStyle::default();
        let stroke = match (self.stroke_color, self.stroke_width) {
            (None, None) => defaults.stroke,
            (color, width) => Some(StrokeStyle {
                color: match color {
                    Some(c) => parse_color(&c)?,
                    None => [0, 0, 0, 255],
                },
                width: width.unwrap_or(1.0),
            }),
        };
        let fill = self.fill_color.as_deref().map(parse_color).transpose()?;
        let label = match self.label_attribute {
            Some(attribute) => Some(LabelRule {
                attribute,
                color: match self.label_color {
                    Some(c) => parse_color(&c)?,
                    None => [0, 0, 0, 255],
                },
                size: self.label_size.unwrap_or(10.0),
                priority: self.label_priority.unwrap_or(0),
            }),
            None => None,
        };
        Ok(SimpleStyle {
            stroke,
            fill,
            point_radius: self.point_radius.unwrap_or(defaults.point_radius),
            label,
            scale_range: ScaleRange {
                min: self.min_scale.unwrap_or(0.0),
                max: self.max_scale.unwrap_or(f64::INFINITY),
            },
        })
    }
}

impl SimpleStyle {
    /// Load a style from its JSON definition.
    pub fn from_json(json: &str) -> Result<Self> {
        let definition: StyleDefinition = serde_json::from_str(json)
            .map_err(|e| RenderError::portrayal(format!("invalid style JSON: {}", e)))?;
        definition.into_style()
    }

    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RenderError::portrayal(format!("cannot read style {}: {}", path, e)))?;
        Self::from_json(&content)
    }

    fn portray(&self, layer: &MapLayer, crs: CrsCode, feature: Feature) -> Presentation {
        let shape = Presentation::Shape(ShapePresentation {
            layer: layer.name.clone(),
            feature: feature.id.clone(),
            crs,
            geometry: feature.geometry.clone(),
            stroke: self.stroke.map(|s| StrokeStyle {
                color: fade(s.color, layer.opacity),
                width: s.width,
            }),
            fill: self.fill.map(|c| fade(c, layer.opacity)),
            point_radius: self.point_radius,
        });

        let label = self.label.as_ref().and_then(|rule| {
            let text = feature.attribute_text(&rule.attribute)?;
            Some(Presentation::Label(LabelPresentation {
                layer: layer.name.clone(),
                feature: feature.id.clone(),
                crs,
                anchor: label_anchor(&feature.geometry)?,
                text,
                color: fade(rule.color, layer.opacity),
                size: rule.size,
                priority: rule.priority,
            }))
        });

        match label {
            Some(label) => Presentation::Group(GroupPresentation {
                layer: layer.name.clone(),
                feature: Some(feature.id),
                children: vec![shape, label],
            }),
            None => shape,
        }
    }
}

impl StyleEvaluator for SimpleStyle {
    fn presentations<'a>(
        &'a self,
        ctx: &'a RenderingContext,
        layer: &'a MapLayer,
    ) -> Result<PresentationStream<'a>> {
        if !self.scale_range.contains(ctx.view().symbology_scale()) {
            return Ok(Box::new(std::iter::empty()));
        }
        match &layer.resource {
            Resource::Features(source) => {
                let crs = source.crs();
                let region = ctx.data_region(crs)?;
                let features = source.features(&region)?;
                Ok(Box::new(
                    features.map(move |feature| Ok(self.portray(layer, crs, feature?))),
                ))
            }
            Resource::Coverage(_) => DefaultRasterStyle.presentations(ctx, layer),
        }
    }
}

/// Paints a coverage as is, resampled onto the canvas.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultRasterStyle;

impl StyleEvaluator for DefaultRasterStyle {
    fn presentations<'a>(
        &'a self,
        ctx: &'a RenderingContext,
        layer: &'a MapLayer,
    ) -> Result<PresentationStream<'a>> {
        let source = match &layer.resource {
            Resource::Coverage(source) => source,
            Resource::Features(_) => {
                return Err(RenderError::portrayal(format!(
                    "layer '{}' has no coverage to portray",
                    layer.name
                )))
            }
        };
        // Read lazily so nothing is loaded until the stream is drained.
        let read = std::iter::once_with(move || {
            let coverage = read_for_view(ctx, source.as_ref())?;
            Ok(coverage.map(|coverage| {
                Presentation::Coverage(CoveragePresentation {
                    layer: layer.name.clone(),
                    coverage,
                    opacity: layer.opacity,
                })
            }))
        });
        Ok(Box::new(read.filter_map(Result::transpose)))
    }

    fn is_default_raster(&self) -> bool {
        true
    }
}

fn fade(color: [u8; 4], opacity: f32) -> [u8; 4] {
    let [r, g, b, a] = color;
    [r, g, b, (a as f32 * opacity.clamp(0.0, 1.0)).round() as u8]
}

/// Where a feature's label is placed, in the feature's CRS.
fn label_anchor(geometry: &Geometry) -> Option<Point> {
    match geometry {
        Geometry::Point(p) => Some(*p),
        Geometry::LineString(line) => line.points().get(line.points().len() / 2).copied(),
        Geometry::Polygon(polygon) => {
            let bbox = polygon.bbox();
            (!bbox.is_empty()).then(|| bbox.center())
        }
        Geometry::Collection(children) => children.iter().find_map(label_anchor),
    }
}
