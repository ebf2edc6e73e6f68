//! RGBA colour in normalized float channels

use crate::error::ArmlError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Colour with channels in `0.0..=1.0`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const RED: Color = Color::rgb(1.0, 0.0, 0.0);
    pub const GREEN: Color = Color::rgb(0.0, 1.0, 0.0);
    pub const BLUE: Color = Color::rgb(0.0, 0.0, 1.0);
    pub const WHITE: Color = Color::rgb(1.0, 1.0, 1.0);
    pub const BLACK: Color = Color::rgb(0.0, 0.0, 0.0);
    /// Fully transparent black; turns the strip off
    pub const CLEAR: Color = Color::new(0.0, 0.0, 0.0, 0.0);

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Opaque colour
    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self::new(r, g, b, 1.0)
    }

    /// Linear interpolation, `t` clamped to `0..=1`
    pub fn lerp(self, to: Color, t: f32) -> Color {
        let t = t.clamp(0.0, 1.0);
        Color {
            r: self.r + (to.r - self.r) * t,
            g: self.g + (to.g - self.g) * t,
            b: self.b + (to.b - self.b) * t,
            a: self.a + (to.a - self.a) * t,
        }
    }
}

impl FromStr for Color {
    type Err = ArmlError;

    /// Accepts `#RRGGBB`, `#RRGGBBAA` (leading `#` optional) or a colour name
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ArmlError::InvalidColor { input: s.to_string() };

        match s.to_ascii_lowercase().as_str() {
            "red" => return Ok(Color::RED),
            "green" => return Ok(Color::GREEN),
            "blue" => return Ok(Color::BLUE),
            "white" => return Ok(Color::WHITE),
            "black" => return Ok(Color::BLACK),
            "clear" | "off" => return Ok(Color::CLEAR),
            _ => {}
        }

        let hex = s.strip_prefix('#').unwrap_or(s);
        if !(hex.len() == 6 || hex.len() == 8) || !hex.is_ascii() {
            return Err(invalid());
        }

        let channel = |i: usize| -> Result<f32, ArmlError> {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .map(|v| v as f32 / 255.0)
                .map_err(|_| invalid())
        };

        let a = if hex.len() == 8 { channel(6)? } else { 1.0 };
        Ok(Color::new(channel(0)?, channel(2)?, channel(4)?, a))
    }
}
