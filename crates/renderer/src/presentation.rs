//! Presentations: styled, renderable units produced by style evaluation.
//!
//! Presentations are plain data. Painting them is the job of the scene
//! renderer, hit testing walks them without painting.

use map_common::{CrsCode, Geometry, Point};
use serde::{Deserialize, Serialize};

use crate::coverage::Coverage;
use crate::error::{RenderError, Result};

/// Identifier of a source feature.
pub type FeatureId = String;

/// Lazy sequence of presentations yielded by a style evaluator.
pub type PresentationStream<'a> = Box<dyn Iterator<Item = Result<Presentation>> + 'a>;

/// Lazy sequence of presentations with failures already turned into
/// [`Presentation::Exception`] markers.
pub type Presentations<'a> = Box<dyn Iterator<Item = Presentation> + 'a>;

/// Stroke of a line or polygon outline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrokeStyle {
    pub color: [u8; 4],
    /// Width in display pixels.
    pub width: f32,
}

/// A vector geometry in its data CRS with its symbolizer.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapePresentation {
    pub layer: String,
    pub feature: FeatureId,
    pub crs: CrsCode,
    pub geometry: Geometry,
    pub stroke: Option<StrokeStyle>,
    pub fill: Option<[u8; 4]>,
    /// Radius of point markers in display pixels.
    pub point_radius: f64,
}

impl ShapePresentation {
    /// Distance in pixels within which the shape counts as touched.
    pub fn hit_tolerance(&self) -> f64 {
        let half_stroke = self.stroke.map(|s| s.width as f64 / 2.0).unwrap_or(0.0);
        match self.geometry {
            Geometry::Point(_) => self.point_radius.max(half_stroke),
            _ => half_stroke,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabelPresentation {
    pub layer: String,
    pub feature: FeatureId,
    pub crs: CrsCode,
    /// Anchor in the data CRS; the label is centred on it.
    pub anchor: Point,
    pub text: String,
    pub color: [u8; 4],
    /// Glyph height in pixels.
    pub size: f32,
    /// Higher priorities win label collisions.
    pub priority: i32,
}

#[derive(Debug, Clone)]
pub struct CoveragePresentation {
    pub layer: String,
    pub coverage: Coverage,
    pub opacity: f32,
}

/// Presentations produced together for one feature.
#[derive(Debug, Clone)]
pub struct GroupPresentation {
    pub layer: String,
    pub feature: Option<FeatureId>,
    pub children: Vec<Presentation>,
}

/// Marker left in the stream where evaluation failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionPresentation {
    pub layer: String,
    pub message: String,
}

#[derive(Debug, Clone)]
pub enum Presentation {
    Shape(ShapePresentation),
    Label(LabelPresentation),
    Coverage(CoveragePresentation),
    Group(GroupPresentation),
    Exception(ExceptionPresentation),
}

impl Presentation {
    pub fn exception(layer: &str, error: &RenderError) -> Self {
        Presentation::Exception(ExceptionPresentation {
            layer: layer.to_string(),
            message: error.to_string(),
        })
    }

    pub fn layer(&self) -> &str {
        match self {
            Presentation::Shape(p) => &p.layer,
            Presentation::Label(p) => &p.layer,
            Presentation::Coverage(p) => &p.layer,
            Presentation::Group(p) => &p.layer,
            Presentation::Exception(p) => &p.layer,
        }
    }

    pub fn feature_id(&self) -> Option<&str> {
        match self {
            Presentation::Shape(p) => Some(&p.feature),
            Presentation::Label(p) => Some(&p.feature),
            Presentation::Group(p) => p.feature.as_deref(),
            Presentation::Coverage(_) | Presentation::Exception(_) => None,
        }
    }

    /// Number of non-group presentations in this tree.
    pub fn leaf_count(&self) -> usize {
        match self {
            Presentation::Group(g) => g.children.iter().map(Presentation::leaf_count).sum(),
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape(id: &str) -> Presentation {
        Presentation::Shape(ShapePresentation {
            layer: "roads".into(),
            feature: id.into(),
            crs: CrsCode::Crs84,
            geometry: Geometry::Point(Point::new(0.0, 0.0)),
            stroke: None,
            fill: None,
            point_radius: 3.0,
        })
    }

    #[test]
    fn test_group_leaf_count() {
        let group = Presentation::Group(GroupPresentation {
            layer: "roads".into(),
            feature: Some("a".into()),
            children: vec![
                shape("a"),
                Presentation::Group(GroupPresentation {
                    layer: "roads".into(),
                    feature: None,
                    children: vec![shape("b"), shape("c")],
                }),
            ],
        });
        assert_eq!(group.leaf_count(), 3);
        assert_eq!(group.feature_id(), Some("a"));
    }

    #[test]
    fn test_exception_carries_message() {
        let p = Presentation::exception("broken", &RenderError::store("disk on fire"));
        assert_eq!(p.layer(), "broken");
        match p {
            Presentation::Exception(e) => assert!(e.message.contains("disk on fire")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_point_hit_tolerance() {
        match shape("a") {
            Presentation::Shape(s) => assert_eq!(s.hit_tolerance(), 3.0),
            _ => unreachable!(),
        }
    }
}
