//! Error types for coordinate operations.

use map_common::{CrsCode, Point};
use thiserror::Error;

/// Errors raised while building or applying a coordinate operation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProjectionError {
    /// The transform has no inverse (singular or non-finite matrix).
    #[error("transform is not invertible: {0}")]
    NotInvertible(String),

    /// A point falls outside the domain where the projection is defined.
    #[error("point ({x}, {y}) is outside the projection domain: {reason}")]
    OutOfDomain { x: f64, y: f64, reason: &'static str },

    /// No operation is known between the two CRS.
    #[error("no coordinate operation from {from} to {to}")]
    OperationNotFound { from: CrsCode, to: CrsCode },
}

impl ProjectionError {
    pub fn out_of_domain(p: Point, reason: &'static str) -> Self {
        Self::OutOfDomain {
            x: p.x,
            y: p.y,
            reason,
        }
    }
}

/// Result type for projection operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;
