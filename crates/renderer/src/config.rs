//! Configuration for the renderer.

use map_common::Color;
use serde::{Deserialize, Serialize};

/// Configuration shared by every rendering pass built from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RendererConfig {
    /// Output resolution in dots per inch. 90 is the OGC reference.
    pub dpi: f64,

    /// Extra pixels around the canvas kept when clipping, so thick strokes
    /// crossing the edge are not cut.
    pub clip_margin_px: f64,

    /// Upper bound of wrap-around replicas in each direction.
    pub max_wrap_replicas: usize,

    /// Replicas added beyond the computed minimum for geometries straddling
    /// the cut line. Still bounded by `max_wrap_replicas`.
    pub wrap_overlap_margin: usize,

    /// Background painted before the first layer, RGBA.
    pub background: Option<[u8; 4]>,

    /// Minimum free space between two labels in pixels.
    pub label_min_spacing_px: f64,

    /// Allow the single raster layer short-circuit.
    pub raster_fast_path: bool,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            dpi: 90.0,
            clip_margin_px: 50.0,
            max_wrap_replicas: 3,
            wrap_overlap_margin: 1,
            background: None,
            label_min_spacing_px: 8.0,
            raster_fast_path: true,
        }
    }
}

impl RendererConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("RENDER_DPI") {
            if let Ok(dpi) = val.parse() {
                config.dpi = dpi;
            }
        }

        if let Ok(val) = std::env::var("RENDER_CLIP_MARGIN") {
            if let Ok(margin) = val.parse() {
                config.clip_margin_px = margin;
            }
        }

        if let Ok(val) = std::env::var("RENDER_MAX_WRAP_REPLICAS") {
            if let Ok(max) = val.parse() {
                config.max_wrap_replicas = max;
            }
        }

        if let Ok(val) = std::env::var("RENDER_WRAP_MARGIN") {
            if let Ok(margin) = val.parse() {
                config.wrap_overlap_margin = margin;
            }
        }

        if let Ok(val) = std::env::var("RENDER_BACKGROUND") {
            if val.eq_ignore_ascii_case("none") {
                config.background = None;
            } else if let Some(color) = Color::parse(&val) {
                let (r, g, b, a) = color.to_rgba();
                config.background = Some([r, g, b, a]);
            }
        }

        if let Ok(val) = std::env::var("RENDER_LABEL_SPACING") {
            if let Ok(spacing) = val.parse() {
                config.label_min_spacing_px = spacing;
            }
        }

        if let Ok(val) = std::env::var("RENDER_RASTER_FAST_PATH") {
            config.raster_fast_path = val.to_lowercase() == "true" || val == "1";
        }

        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if !self.dpi.is_finite() || self.dpi <= 0.0 {
            return Err(format!("dpi must be > 0, got {}", self.dpi));
        }

        if !self.clip_margin_px.is_finite() || self.clip_margin_px < 0.0 {
            return Err("clip_margin_px must be >= 0".to_string());
        }

        if !self.label_min_spacing_px.is_finite() || self.label_min_spacing_px < 0.0 {
            return Err("label_min_spacing_px must be >= 0".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = RendererConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.dpi, 90.0);
        assert_eq!(config.clip_margin_px, 50.0);
        assert_eq!(config.max_wrap_replicas, 3);
        assert_eq!(config.wrap_overlap_margin, 1);
    }

    #[test]
    fn test_validate_rejects_bad_dpi() {
        let config = RendererConfig {
            dpi: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_serde_round_trip() {
        let config = RendererConfig {
            background: Some([255, 255, 255, 255]),
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: RendererConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
