//! Coordinate reference system transformations.
//!
//! Implements map projections from scratch: affine transforms backed by
//! nalgebra, Web Mercator, Lambert Conformal Conic and polar stereographic
//! math, and a resolver that finds the operation between two CRS codes.

pub mod affine;
pub mod error;
pub mod geographic;
pub mod lambert;
pub mod mercator;
pub mod operation;
pub mod polar;
pub mod transform;

pub use affine::Affine2D;
pub use error::{ProjectionError, Result};
pub use lambert::LambertConformal;
pub use mercator::WebMercator;
pub use operation::{CoordinateOperationResolver, DefaultResolver};
pub use polar::PolarStereographic;
pub use transform::{concatenate, MathTransform, Transform};
