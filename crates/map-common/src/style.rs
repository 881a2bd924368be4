//! Color values used by the default styles.

use serde::{Deserialize, Serialize};

/// Color representation supporting multiple formats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Color {
    /// Hex string: "#RRGGBB" or "#RRGGBBAA"
    Hex(String),

    /// RGB array: [r, g, b] or [r, g, b, a]
    Array(Vec<u8>),

    /// Explicit RGBA
    Rgba { r: u8, g: u8, b: u8, a: u8 },
}

impl Color {
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Color::Rgba { r, g, b, a }
    }

    pub fn transparent() -> Self {
        Color::rgba(0, 0, 0, 0)
    }

    /// Parse a hex string or one of a few CSS color names.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.starts_with('#') {
            let digits = s.trim_start_matches('#');
            if (digits.len() == 6 || digits.len() == 8)
                && digits.chars().all(|c| c.is_ascii_hexdigit())
            {
                return Some(Color::Hex(s.to_string()));
            }
            return None;
        }
        named_color(s).map(|(r, g, b, a)| Color::rgba(r, g, b, a))
    }

    /// Convert to RGBA tuple.
    pub fn to_rgba(&self) -> (u8, u8, u8, u8) {
        match self {
            Color::Hex(s) => parse_hex_color(s),
            Color::Array(arr) => {
                let r = arr.first().copied().unwrap_or(0);
                let g = arr.get(1).copied().unwrap_or(0);
                let b = arr.get(2).copied().unwrap_or(0);
                let a = arr.get(3).copied().unwrap_or(255);
                (r, g, b, a)
            }
            Color::Rgba { r, g, b, a } => (*r, *g, *b, *a),
        }
    }

    /// Same color with its alpha multiplied by `opacity` (0..=1).
    pub fn with_opacity(&self, opacity: f32) -> Color {
        let (r, g, b, a) = self.to_rgba();
        let a = (a as f32 * opacity.clamp(0.0, 1.0)).round() as u8;
        Color::rgba(r, g, b, a)
    }
}

fn parse_hex_color(s: &str) -> (u8, u8, u8, u8) {
    let s = s.trim_start_matches('#');
    let channel = |i: usize| u8::from_str_radix(&s[i..i + 2], 16).unwrap_or(0);

    match s.len() {
        6 => (channel(0), channel(2), channel(4), 255),
        8 => (channel(0), channel(2), channel(4), channel(6)),
        _ => (0, 0, 0, 255),
    }
}

fn named_color(name: &str) -> Option<(u8, u8, u8, u8)> {
    Some(match name.to_lowercase().as_str() {
        "transparent" => (0, 0, 0, 0),
        "black" => (0, 0, 0, 255),
        "white" => (255, 255, 255, 255),
        "red" => (255, 0, 0, 255),
        "green" => (0, 255, 0, 255),
        "blue" => (0, 0, 255, 255),
        "yellow" => (255, 255, 0, 255),
        "cyan" => (0, 255, 255, 255),
        "magenta" => (255, 0, 255, 255),
        "orange" => (255, 165, 0, 255),
        "purple" => (128, 0, 128, 255),
        "gray" | "grey" => (128, 128, 128, 255),
        _ => return None,
    })
}
