//! Label text: the embedded font, its metrics and glyph rasterization.

use std::sync::OnceLock;

use image::{Rgba, RgbaImage};
use imageproc::drawing::draw_text_mut;
use rusttype::{point, Font, Scale};

use crate::error::{RenderError, Result};

/// Embedded font data - DejaVu Sans Mono
const FONT_DATA: &[u8] = include_bytes!("../assets/DejaVuSansMono.ttf");

/// The label font, parsed on first use.
pub fn label_font() -> Result<&'static Font<'static>> {
    static FONT: OnceLock<Option<Font<'static>>> = OnceLock::new();
    FONT.get_or_init(|| Font::try_from_bytes(FONT_DATA))
        .as_ref()
        .ok_or_else(|| RenderError::surface("embedded label font could not be parsed"))
}

/// Vertical metrics of the label font at one size, in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlyphMetrics {
    pub size: f32,
    /// Height above the baseline.
    pub ascent: f32,
    /// Depth below the baseline, negative.
    pub descent: f32,
    /// Plate margin around the text.
    pub padding: f32,
}

impl GlyphMetrics {
    pub fn for_size(size: f32) -> Result<Self> {
        let v_metrics = label_font()?.v_metrics(Scale::uniform(size));
        Ok(Self {
            size,
            ascent: v_metrics.ascent,
            descent: v_metrics.descent,
            padding: size * 0.2,
        })
    }

    pub fn text_height(&self) -> f32 {
        self.ascent - self.descent
    }

    /// Advance width of `text`, kerning included.
    pub fn text_width(&self, text: &str) -> Result<f32> {
        Ok(layout_width(label_font()?, Scale::uniform(self.size), text))
    }
}

fn layout_width(font: &Font<'_>, scale: Scale, text: &str) -> f32 {
    font.layout(text, scale, point(0.0, 0.0))
        .last()
        .map(|g| g.position().x + g.unpositioned().h_metrics().advance_width)
        .unwrap_or(0.0)
}

/// `text` drawn in `color` on a transparent image sized to its advance
/// width and line height.
pub fn rasterize(text: &str, size: f32, color: [u8; 4]) -> Result<RgbaImage> {
    let font = label_font()?;
    let scale = Scale::uniform(size);
    let metrics = GlyphMetrics::for_size(size)?;
    let width = layout_width(font, scale, text).ceil().max(1.0) as u32;
    let height = metrics.text_height().ceil().max(1.0) as u32;

    // transparent pixels carry the text colour so blended edges keep it
    let [r, g, b, _] = color;
    let mut image = RgbaImage::from_pixel(width, height, Rgba([r, g, b, 0]));
    draw_text_mut(&mut image, Rgba(color), 0, 0, scale, font, text);
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_font_loads() {
        assert!(label_font().is_ok());
    }

    #[test]
    fn test_width_grows_with_every_character() {
        let m = GlyphMetrics::for_size(10.0).unwrap();
        let lima = m.text_width("Lima").unwrap();
        let tokyo = m.text_width("Tokyo").unwrap();
        assert!(lima > 0.0);
        // monospace: one advance per character
        assert!((tokyo / lima - 5.0 / 4.0).abs() < 1e-3);
        assert_eq!(m.text_width("").unwrap(), 0.0);
    }

    #[test]
    fn test_line_height_scales_with_size() {
        let small = GlyphMetrics::for_size(10.0).unwrap();
        let large = GlyphMetrics::for_size(20.0).unwrap();
        assert!(small.ascent > 0.0 && small.descent < 0.0);
        assert!((large.text_height() / small.text_height() - 2.0).abs() < 1e-3);
    }

    #[test]
    fn test_every_letter_is_inked() {
        // letters without a glyph would leave their cell blank
        let size = 16.0;
        let image = rasterize("Lima", size, [0, 0, 0, 255]).unwrap();
        let advance = GlyphMetrics::for_size(size).unwrap().text_width("L").unwrap();
        for i in 0..4 {
            let from = (i as f32 * advance) as u32;
            let to = (((i + 1) as f32 * advance) as u32).min(image.width());
            let inked = (from..to)
                .flat_map(|x| (0..image.height()).map(move |y| (x, y)))
                .any(|(x, y)| image.get_pixel(x, y).0[3] > 0);
            assert!(inked, "character {} of Lima is blank", i);
        }
    }
}
