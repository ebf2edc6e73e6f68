//! Configuration management
//!
//! Config is a TOML file (default `arml-bridge.toml` in the working
//! directory). Every section falls back to defaults for missing keys.

use crate::constants::{
    DEFAULT_BAUD_RATE, DEFAULT_END_PIXEL_INDEX, DEFAULT_POST_DISCONNECT_DELAY_MS,
    DEFAULT_READER_JOIN_TIMEOUT_MS, DEFAULT_READ_TIMEOUT_MS, DEFAULT_RECONNECT_DELAY_MS,
    DEFAULT_WRITE_INTERVAL_SECS, DEFAULT_WRITE_TIMEOUT_MS, MAX_BRIGHTNESS,
};
use crate::error::{ArmlError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Config file name used when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "arml-bridge.toml";

// =============================================================================
// Application Configuration
// =============================================================================

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub serial: SerialConfig,
    pub led: LedConfig,
    pub animation: AnimationConfig,
}

// =============================================================================
// Serial Configuration
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Serial port name (empty = auto-detect)
    pub port: String,
    pub baud_rate: u32,
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
    /// Time between drain ticks
    pub write_interval_secs: f64,
    /// Log every raw line received from the device
    pub print_all_messages: bool,
    /// Bound on joining the reader thread at shutdown
    pub reader_join_timeout_ms: u64,
    /// Reopen the port after it disappears
    pub reconnect: bool,
    /// Wait between failed open attempts
    pub reconnect_delay_ms: u64,
    /// Wait after a lost link before reopening
    pub post_disconnect_delay_ms: u64,
    /// Resends of one message before giving up on it (unset = never give up)
    pub max_ack_retries: Option<u32>,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            write_timeout_ms: DEFAULT_WRITE_TIMEOUT_MS,
            write_interval_secs: DEFAULT_WRITE_INTERVAL_SECS,
            print_all_messages: false,
            reader_join_timeout_ms: DEFAULT_READER_JOIN_TIMEOUT_MS,
            reconnect: true,
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            post_disconnect_delay_ms: DEFAULT_POST_DISCONNECT_DELAY_MS,
            max_ack_retries: None,
        }
    }
}

impl SerialConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn write_interval(&self) -> Duration {
        Duration::from_secs_f64(self.write_interval_secs)
    }

    pub fn reader_join_timeout(&self) -> Duration {
        Duration::from_millis(self.reader_join_timeout_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn post_disconnect_delay(&self) -> Duration {
        Duration::from_millis(self.post_disconnect_delay_ms)
    }
}

// =============================================================================
// LED Configuration
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedConfig {
    /// White channel level sent with every solid colour
    pub white_brightness: u8,
    /// Brightness forced on every (re)connect
    pub overall_brightness: u8,
    /// Force `ARML_READY` on connect (otherwise `ARML_LOADING`)
    pub startup_ready: bool,
}

impl Default for LedConfig {
    fn default() -> Self {
        Self {
            white_brightness: 0,
            overall_brightness: MAX_BRIGHTNESS,
            startup_ready: true,
        }
    }
}

// =============================================================================
// Animation Configuration
// =============================================================================

/// Direction the animation travels along the strip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnimationDirection {
    #[default]
    Forwards,
    Backwards,
}

/// Defaults used when an animation call leaves parameters out
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationConfig {
    /// Snake animation instead of simple progress
    pub snake: bool,
    pub direction: AnimationDirection,
    /// Pixels in the strip (0 = unset, fall back to `end_pixel_index`)
    pub total_pixels_in_strip: u32,
    /// Seconds for one full loop
    pub time_secs: f32,
    pub pixel_length: u32,
    pub start_pixel_index: u32,
    pub end_pixel_index: u32,
    /// Turn off pixels outside the animated range
    pub clear_outside_range: bool,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            snake: false,
            direction: AnimationDirection::Forwards,
            total_pixels_in_strip: 0,
            time_secs: 1.0,
            pixel_length: 1,
            start_pixel_index: 0,
            end_pixel_index: DEFAULT_END_PIXEL_INDEX,
            clear_outside_range: false,
        }
    }
}

// =============================================================================
// Load / Save
// =============================================================================

impl Config {
    /// Check values that would break the drain timer or the wire format
    pub fn validate(&self) -> Result<()> {
        if !(self.serial.write_interval_secs.is_finite() && self.serial.write_interval_secs > 0.0)
        {
            return Err(ArmlError::ConfigValidation {
                field: "serial.write_interval_secs",
                reason: format!("must be > 0, got {}", self.serial.write_interval_secs),
            });
        }
        if self.serial.baud_rate == 0 {
            return Err(ArmlError::ConfigValidation {
                field: "serial.baud_rate",
                reason: "must be > 0".into(),
            });
        }
        if self.led.overall_brightness > MAX_BRIGHTNESS {
            return Err(ArmlError::ConfigValidation {
                field: "led.overall_brightness",
                reason: format!("must be <= {}", MAX_BRIGHTNESS),
            });
        }
        if !(self.animation.time_secs.is_finite() && self.animation.time_secs >= 0.0) {
            return Err(ArmlError::ConfigValidation {
                field: "animation.time_secs",
                reason: format!("must be >= 0, got {}", self.animation.time_secs),
            });
        }
        Ok(())
    }
}

/// Resolve the config path (explicit or default file name)
pub fn config_path(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

/// Load config from file; a missing file yields defaults
pub fn load(path: &Path) -> Result<Config> {
    if !path.exists() {
        debug!("No config at {}, using defaults", path.display());
        return Ok(Config::default());
    }

    let content = fs::read_to_string(path).map_err(|e| ArmlError::ConfigRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    let config: Config = toml::from_str(&content).map_err(|e| ArmlError::ConfigParse {
        path: path.to_path_buf(),
        source: e,
    })?;
    config.validate()?;
    Ok(config)
}

/// Save config to file
pub fn save(config: &Config, path: &Path) -> Result<()> {
    let content =
        toml::to_string_pretty(config).map_err(|e| ArmlError::ConfigValidation {
            field: "config",
            reason: e.to_string(),
        })?;
    fs::write(path, content).map_err(|e| ArmlError::ConfigRead {
        path: path.to_path_buf(),
        source: e,
    })
}

// ============================================================================
// Tests
// ============================================================================
