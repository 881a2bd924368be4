//! Error types for rendering.

use map_common::MapError;
use projection::ProjectionError;
use thiserror::Error;

/// Errors that can occur while building a rendering context or painting.
#[derive(Error, Debug)]
pub enum RenderError {
    /// The 2D grid to CRS transform of the target grid is not affine.
    #[error("grid to CRS transform is not affine: {0}")]
    NonAffineGridToCrs(String),

    /// The 2D grid to CRS transform of the target grid has no inverse.
    #[error("grid to CRS transform is not invertible: {0}")]
    NotInvertible(String),

    /// A coordinate operation failed.
    #[error("projection error: {0}")]
    Projection(#[from] ProjectionError),

    /// Invalid map input (grid, bbox, CRS).
    #[error("invalid map input: {0}")]
    Map(#[from] MapError),

    /// A data source failed to deliver features or coverage samples.
    #[error("data store error: {0}")]
    Store(String),

    /// Style evaluation or portrayal failed.
    #[error("portrayal error: {0}")]
    Portrayal(String),

    /// The drawing surface rejected an operation.
    #[error("surface error: {0}")]
    Surface(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Geometry that cannot be drawn or tested.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),
}

impl RenderError {
    /// Create a Store error.
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a Portrayal error.
    pub fn portrayal(msg: impl Into<String>) -> Self {
        Self::Portrayal(msg.into())
    }

    /// Create a Surface error.
    pub fn surface(msg: impl Into<String>) -> Self {
        Self::Surface(msg.into())
    }

    /// Create an InvalidGeometry error.
    pub fn invalid_geometry(msg: impl Into<String>) -> Self {
        Self::InvalidGeometry(msg.into())
    }
}

/// Result type for rendering operations.
pub type Result<T> = std::result::Result<T, RenderError>;
