//! Per-pass caches of coordinate operations.
//!
//! Entries are only ever added. A cache belongs to one rendering context and
//! is never valid for another view.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use map_common::CrsCode;
use projection::{concatenate, Affine2D, CoordinateOperationResolver, Transform};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // the maps stay consistent even if a holder panicked mid-lookup
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Data CRS to objective and data CRS to display transforms.
pub struct TransformCache {
    resolver: Arc<dyn CoordinateOperationResolver>,
    objective_crs: CrsCode,
    objective_to_display: Affine2D,
    to_objective: Mutex<HashMap<CrsCode, Transform>>,
    to_display: Mutex<HashMap<CrsCode, Transform>>,
}

impl std::fmt::Debug for TransformCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformCache")
            .field("objective_crs", &self.objective_crs)
            .field("to_objective", &lock(&self.to_objective).len())
            .field("to_display", &lock(&self.to_display).len())
            .finish()
    }
}

impl TransformCache {
    pub fn new(
        resolver: Arc<dyn CoordinateOperationResolver>,
        objective_crs: CrsCode,
        objective_to_display: Affine2D,
    ) -> Self {
        Self {
            resolver,
            objective_crs,
            objective_to_display,
            to_objective: Mutex::new(HashMap::new()),
            to_display: Mutex::new(HashMap::new()),
        }
    }

    /// An empty cache for the same view and resolver.
    pub fn fork(&self) -> Self {
        Self::new(
            Arc::clone(&self.resolver),
            self.objective_crs,
            self.objective_to_display,
        )
    }

    pub fn resolver(&self) -> &Arc<dyn CoordinateOperationResolver> {
        &self.resolver
    }

    /// Transform from `crs` to the objective CRS, resolved once.
    ///
    /// The lock is held while resolving so concurrent callers never resolve
    /// the same pair twice.
    pub fn data_to_objective(&self, crs: CrsCode) -> Result<Transform> {
        let mut map = lock(&self.to_objective);
        if let Some(transform) = map.get(&crs) {
            return Ok(Arc::clone(transform));
        }
        let transform = self.resolver.resolve(crs, self.objective_crs)?;
        debug!(source = %crs, target = %self.objective_crs, "Cached data to objective transform");
        map.insert(crs, Arc::clone(&transform));
        Ok(transform)
    }

    /// Transform from `crs` to display pixels.
    ///
    /// When the data to objective part is affine the result is a single
    /// matrix.
    pub fn data_to_display(&self, crs: CrsCode) -> Result<Transform> {
        let mut map = lock(&self.to_display);
        if let Some(transform) = map.get(&crs) {
            return Ok(Arc::clone(transform));
        }
        let to_objective = self.data_to_objective(crs)?;
        let transform = concatenate(to_objective, Arc::new(self.objective_to_display));
        map.insert(crs, Arc::clone(&transform));
        Ok(transform)
    }

    /// Number of cached entries in both maps.
    pub fn len(&self) -> usize {
        lock(&self.to_objective).len() + lock(&self.to_display).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        lock(&self.to_objective).clear();
        lock(&self.to_display).clear();
    }
}

/// Length units a style may express sizes in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LengthUnit {
    /// Ground meters.
    Metre,
    /// Display pixels.
    Pixel,
}

/// Conversion factors from [`LengthUnit`]s to objective units at the view
/// centre.
#[derive(Debug, Default)]
pub struct UnitCoefficientCache {
    coefficients: Mutex<HashMap<LengthUnit, f64>>,
}

impl UnitCoefficientCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached coefficient for `unit`, computed with `compute` on first use.
    pub fn get_or_compute(&self, unit: LengthUnit, compute: impl FnOnce() -> f64) -> f64 {
        *lock(&self.coefficients).entry(unit).or_insert_with(compute)
    }

    pub fn len(&self) -> usize {
        lock(&self.coefficients).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        lock(&self.coefficients).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use map_common::Point;
    use projection::DefaultResolver;

    #[test]
    fn test_affine_display_transform_is_folded() {
        let cache = TransformCache::new(
            Arc::new(DefaultResolver),
            CrsCode::Crs84,
            Affine2D::scale(2.0, -2.0),
        );
        let t = cache.data_to_display(CrsCode::Epsg4269).unwrap();
        let affine = t.as_affine().unwrap();
        assert_eq!(affine.apply(Point::new(1.0, 1.0)), Point::new(2.0, -2.0));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_fork_starts_empty() {
        let cache = TransformCache::new(Arc::new(DefaultResolver), CrsCode::Epsg3857, Affine2D::identity());
        cache.data_to_objective(CrsCode::Crs84).unwrap();
        assert_eq!(cache.len(), 1);
        assert!(cache.fork().is_empty());
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_unit_coefficients_computed_once() {
        let cache = UnitCoefficientCache::new();
        let mut calls = 0;
        let a = cache.get_or_compute(LengthUnit::Pixel, || {
            calls += 1;
            0.5
        });
        let b = cache.get_or_compute(LengthUnit::Pixel, || {
            calls += 1;
            1.0
        });
        assert_eq!((a, b, calls), (0.5, 0.5, 1));
    }
}
