//! Map rendering core.
//!
//! Renders an ordered scene of vector and raster layers onto a pixel
//! surface, and answers the reverse question of which features lie under a
//! region of that surface.
//!
//! A pass starts from a target [`GridGeometry`](map_common::GridGeometry):
//! - [`RenderingContextBuilder`] derives the [`ViewTransform`] between
//!   objective and display space, plans wrap-around replicas for periodic
//!   CRSs and sets up the per-pass transform caches.
//! - [`SceneRenderer`] turns layers into presentations and paints them.
//! - [`HitTester`] walks the same presentations in reverse z-order.
//! - [`render_tiles`] splits a large canvas into passes run in parallel.

pub mod cache;
pub mod canvas;
pub mod config;
pub mod context;
pub mod coverage;
pub mod error;
pub mod hit;
pub mod labels;
pub mod layer;
pub mod presentation;
pub mod style;
pub mod surface;
pub mod text;
pub mod tiles;
pub mod view;
pub mod wrap;

pub use cache::{LengthUnit, TransformCache, UnitCoefficientCache};
pub use canvas::{
    CancelFlag, DirectRasterWriter, LayerFailure, Monitor, NoFastPath, NullMonitor, RasterFastPath,
    RenderOutcome, RenderState, SceneRenderer,
};
pub use config::RendererConfig;
pub use context::{
    build_context, CoordinateSpace, ObjectiveEnvelope, PaintSession, RenderingContext,
    RenderingContextBuilder,
};
pub use coverage::{Coverage, MemoryCoverage};
pub use error::{RenderError, Result};
pub use hit::{CollectingVisitor, HitOutcome, HitTester, SearchArea, Visitor};
pub use labels::{FontMetricsCache, LabelRenderer, PlacedLabel};
pub use layer::{
    CoverageSource, DirectLayer, DirectPainter, Feature, FeatureSource, MapLayer, MemoryFeatures,
    PortrayalExtension, Resource, Scene, SceneItem, SceneLayer,
};
pub use presentation::{
    CoveragePresentation, ExceptionPresentation, FeatureId, GroupPresentation, LabelPresentation,
    Presentation, PresentationStream, Presentations, ShapePresentation, StrokeStyle,
};
pub use style::{DefaultRasterStyle, LabelRule, ScaleRange, SimpleStyle, StyleDefinition, StyleEvaluator};
pub use surface::{DrawSurface, PixmapSurface};
pub use text::GlyphMetrics;
pub use tiles::{render_tiles, tile_layout, TiledRender};
pub use view::{ViewTransform, DEFAULT_DPI};
pub use wrap::{nearest_colinear_point, Replica, WrapAroundPlanner, WrapParams};
