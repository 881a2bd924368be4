//! Error types for the shared map types.

use thiserror::Error;

use crate::bbox::BboxParseError;
use crate::crs::CrsParseError;
use crate::time::TimeParseError;

/// Result type alias using MapError.
pub type MapResult<T> = Result<T, MapError>;

/// Errors raised while building or parsing common map types.
#[derive(Debug, Error)]
pub enum MapError {
    #[error("Invalid CRS: {0}")]
    InvalidCrs(String),

    #[error("Invalid BBOX: {0}")]
    InvalidBbox(String),

    #[error("Invalid grid geometry: {0}")]
    InvalidGrid(String),

    #[error("Invalid time specification: {0}")]
    InvalidTime(String),

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),
}

impl From<CrsParseError> for MapError {
    fn from(err: CrsParseError) -> Self {
        MapError::InvalidCrs(err.to_string())
    }
}

impl From<BboxParseError> for MapError {
    fn from(err: BboxParseError) -> Self {
        MapError::InvalidBbox(err.to_string())
    }
}

impl From<TimeParseError> for MapError {
    fn from(err: TimeParseError) -> Self {
        MapError::InvalidTime(err.to_string())
    }
}
