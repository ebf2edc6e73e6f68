//! Outbound command encoding
//!
//! Renders LED intents into the sketch's line grammar. Every function here
//! is pure; the queue and controller decide when the result is written.
//!
//! | Intent | Wire form |
//! |---|---|
//! | solid colour | `R255G0B128W10A255E` |
//! | brightness | `ARML_B120` |
//! | ready / loading | `ARML_READY` / `ARML_LOADING` |
//! | default lights | `ARML_DEFAULT` |
//! | IMU enable | `ARML_IMU` |
//! | animation | `Anim2Ba_S_<bg>_X_<fg>_H1_L3_PS0_PE72_T` |

use crate::color::Color;
use crate::config::{AnimationConfig, AnimationDirection};
use crate::constants::{MAX_BRIGHTNESS, MAX_FADE_STEPS};
use std::fmt;
use std::sync::Arc;

/// Pre-encoded ASCII command, immutable once built
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OutboundMessage(Arc<str>);

impl OutboundMessage {
    pub fn new(text: impl Into<Arc<str>>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OutboundMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OutboundMessage {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for OutboundMessage {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl PartialEq<str> for OutboundMessage {
    fn eq(&self, other: &str) -> bool {
        &*self.0 == other
    }
}

impl PartialEq<&str> for OutboundMessage {
    fn eq(&self, other: &&str) -> bool {
        &*self.0 == *other
    }
}

/// Scale a `0..=1` channel to a byte, rounding half away from zero
fn channel(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn solid_color_body(color: Color, white: u8) -> String {
    format!(
        "R{}G{}B{}W{}A{}E",
        channel(color.r),
        channel(color.g),
        channel(color.b),
        white,
        channel(color.a)
    )
}

/// `R<r>G<g>B<b>W<white>A<alpha>E`
///
/// The trailing `E` lets the sketch ignore anything after a complete colour.
pub fn solid_color(color: Color, white: u8) -> OutboundMessage {
    solid_color_body(color, white).into()
}

/// `ARML_B<level>`, level capped at 254
pub fn brightness(level: u8) -> OutboundMessage {
    format!("ARML_B{}", level.min(MAX_BRIGHTNESS)).into()
}

pub fn ready(is_ready: bool) -> OutboundMessage {
    if is_ready {
        "ARML_READY".into()
    } else {
        "ARML_LOADING".into()
    }
}

pub fn default_lights() -> OutboundMessage {
    "ARML_DEFAULT".into()
}

pub fn imu_enable() -> OutboundMessage {
    "ARML_IMU".into()
}

/// All channels off, sent before the port is released
pub fn blackout() -> OutboundMessage {
    solid_color(Color::CLEAR, 0)
}

// =============================================================================
// Animation
// =============================================================================

/// Animation style on the strip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimationStyle {
    /// Progress bar style
    Simple,
    /// Moving segment of `length` pixels
    Snake,
}

/// Mode token that prefixes an animation command
pub fn animation_mode(style: AnimationStyle, direction: AnimationDirection) -> &'static str {
    match (style, direction) {
        (AnimationStyle::Simple, AnimationDirection::Forwards) => "Anim1",
        (AnimationStyle::Snake, AnimationDirection::Forwards) => "Anim2",
        (AnimationStyle::Simple, AnimationDirection::Backwards) => "Anim1Ba",
        (AnimationStyle::Snake, AnimationDirection::Backwards) => "Anim2Ba",
    }
}

/// Per-call animation parameters; `None` falls back to the configured default
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AnimationOverrides {
    /// Seconds per loop
    pub rate: Option<f32>,
    pub length: Option<u32>,
    pub start_index: Option<u32>,
    pub end_index: Option<u32>,
}

/// Fully resolved animation parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnimationParams {
    pub rate: f32,
    pub length: u32,
    pub start_index: u32,
    pub end_index: u32,
}

impl AnimationParams {
    /// First explicit value wins, then config; the end index prefers the
    /// strip length and uses `end_pixel_index` when the strip length is unset.
    pub fn resolve(overrides: AnimationOverrides, defaults: &AnimationConfig) -> Self {
        let end_index = overrides.end_index.unwrap_or(
            if defaults.total_pixels_in_strip > 0 {
                defaults.total_pixels_in_strip
            } else {
                defaults.end_pixel_index
            },
        );

        Self {
            rate: overrides.rate.unwrap_or(defaults.time_secs),
            length: overrides.length.unwrap_or(defaults.pixel_length),
            start_index: overrides.start_index.unwrap_or(defaults.start_pixel_index),
            end_index,
        }
    }
}

/// `<Mode>_S_<bg>_X_<fg>_H<rate>_L<length>_PS<start>_PE<end>[_T]`
pub fn animation(
    background: Color,
    foreground: Color,
    white: u8,
    overrides: AnimationOverrides,
    defaults: &AnimationConfig,
) -> OutboundMessage {
    let style = if defaults.snake {
        AnimationStyle::Snake
    } else {
        AnimationStyle::Simple
    };
    let params = AnimationParams::resolve(overrides, defaults);

    let mut cmd = format!(
        "{}_S_{}_X_{}_H{}_L{}_PS{}_PE{}",
        animation_mode(style, defaults.direction),
        solid_color_body(background, white),
        solid_color_body(foreground, white),
        params.rate,
        params.length,
        params.start_index,
        params.end_index
    );
    if defaults.clear_outside_range {
        cmd.push_str("_T");
    }
    cmd.into()
}

// =============================================================================
// Fade
// =============================================================================

/// Number of colour steps a fade of `duration_secs` expands into, at most
/// `MAX_FADE_STEPS`
pub fn fade_steps(duration_secs: f32) -> usize {
    let steps = (duration_secs * 10.0 - 2.0).round();
    if steps.is_nan() || steps <= 0.0 {
        0
    } else if steps >= MAX_FADE_STEPS as f32 {
        MAX_FADE_STEPS
    } else {
        steps as usize
    }
}

/// Expand a fade into discrete solid-colour commands ending on `to`
///
/// A duration too short for any step collapses to the target colour alone.
pub fn fade(from: Color, to: Color, duration_secs: f32, white: u8) -> Vec<OutboundMessage> {
    let steps = fade_steps(duration_secs);
    if steps == 0 {
        return vec![solid_color(to, white)];
    }

    (1..=steps)
        .map(|i| solid_color(from.lerp(to, i as f32 / steps as f32), white))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solid_color_rounds_half_up() {
        let msg = solid_color(Color::new(1.0, 0.0, 0.5, 1.0), 10);
        assert_eq!(msg, "R255G0B128W10A255E");
    }

    #[test]
    fn test_solid_color_clamps_out_of_range_channels() {
        let msg = solid_color(Color::new(1.7, -0.3, f32::NAN, 2.0), 0);
        assert_eq!(msg, "R255G0B0W0A255E");
    }

    #[test]
    fn test_brightness_caps_level() {
        assert_eq!(brightness(50), "ARML_B50");
        assert_eq!(brightness(255), "ARML_B254");
    }

    #[test]
    fn test_literal_commands() {
        assert_eq!(ready(true), "ARML_READY");
        assert_eq!(ready(false), "ARML_LOADING");
        assert_eq!(default_lights(), "ARML_DEFAULT");
        assert_eq!(imu_enable(), "ARML_IMU");
        assert_eq!(blackout(), "R0G0B0W0A0E");
    }

    #[test]
    fn test_animation_modes() {
        use AnimationDirection::*;
        assert_eq!(animation_mode(AnimationStyle::Simple, Forwards), "Anim1");
        assert_eq!(animation_mode(AnimationStyle::Snake, Forwards), "Anim2");
        assert_eq!(animation_mode(AnimationStyle::Simple, Backwards), "Anim1Ba");
        assert_eq!(animation_mode(AnimationStyle::Snake, Backwards), "Anim2Ba");
    }

    #[test]
    fn test_animation_uses_configured_defaults() {
        let defaults = AnimationConfig {
            time_secs: 2.5,
            pixel_length: 4,
            start_pixel_index: 3,
            total_pixels_in_strip: 144,
            ..AnimationConfig::default()
        };

        let msg = animation(
            Color::BLACK,
            Color::RED,
            0,
            AnimationOverrides::default(),
            &defaults,
        );

        assert_eq!(
            msg,
            "Anim1_S_R0G0B0W0A255E_X_R255G0B0W0A255E_H2.5_L4_PS3_PE144"
        );
    }

    #[test]
    fn test_animation_end_index_falls_back_when_strip_unset() {
        let defaults = AnimationConfig {
            total_pixels_in_strip: 0,
            end_pixel_index: 60,
            ..AnimationConfig::default()
        };

        let params = AnimationParams::resolve(AnimationOverrides::default(), &defaults);
        assert_eq!(params.end_index, 60);
        assert_eq!(params.rate, 1.0);
        assert_eq!(params.length, 1);
        assert_eq!(params.start_index, 0);
    }

    #[test]
    fn test_animation_overrides_win() {
        let defaults = AnimationConfig {
            snake: true,
            direction: AnimationDirection::Backwards,
            clear_outside_range: true,
            total_pixels_in_strip: 144,
            ..AnimationConfig::default()
        };
        let overrides = AnimationOverrides {
            rate: Some(0.5),
            length: Some(6),
            start_index: Some(10),
            end_index: Some(20),
        };

        let msg = animation(Color::WHITE, Color::BLUE, 5, overrides, &defaults);

        assert_eq!(
            msg,
            "Anim2Ba_S_R255G255B255W5A255E_X_R0G0B255W5A255E_H0.5_L6_PS10_PE20_T"
        );
    }

    #[test]
    fn test_fade_step_count() {
        assert_eq!(fade_steps(1.0), 8);
        assert_eq!(fade_steps(0.5), 3);
        assert_eq!(fade_steps(0.2), 0);
        assert_eq!(fade_steps(-4.0), 0);
        assert_eq!(fade_steps(f32::NAN), 0);
    }

    #[test]
    fn test_absurd_fade_is_capped() {
        assert_eq!(fade_steps(1e9), MAX_FADE_STEPS);
        assert_eq!(fade_steps(f32::INFINITY), MAX_FADE_STEPS);

        let steps = fade(Color::RED, Color::BLUE, 1e9, 0);
        assert_eq!(steps.len(), MAX_FADE_STEPS);
        assert_eq!(steps.last(), Some(&solid_color(Color::BLUE, 0)));
    }

    #[test]
    fn test_fade_ends_on_target() {
        let steps = fade(Color::BLACK, Color::RED, 1.0, 0);

        assert_eq!(steps.len(), 8);
        assert_eq!(steps[0], "R32G0B0W0A255E");
        assert_eq!(steps[7], "R255G0B0W0A255E");
    }

    #[test]
    fn test_fade_too_short_sends_target_only() {
        let steps = fade(Color::RED, Color::BLUE, 0.1, 0);
        assert_eq!(steps, vec![solid_color(Color::BLUE, 0)]);
    }
}
