//! Centralized error types for the bridge
//!
//! All bridge errors are represented by the `ArmlError` enum.
//! Use `Result<T>` as shorthand for `std::result::Result<T, ArmlError>`.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// All bridge errors
#[derive(Debug)]
pub enum ArmlError {
    // === Transport ===
    /// Serial port could not be opened (unplugged, wrong name, permission denied)
    PortUnavailable {
        port: String,
        source: serialport::Error,
    },
    /// Write attempted while no port is attached
    PortNotOpen,
    /// Serial write failed or timed out
    Write {
        port: String,
        source: std::io::Error,
    },
    /// Reader thread did not stop within the configured bound
    ReaderJoinTimeout { timeout: Duration },

    // === Detection ===
    /// No Arduino-like device found
    NoDeviceFound,
    /// More than one candidate device found
    MultipleDevicesFound { ports: Vec<String> },

    // === Config ===
    /// Config file could not be read or written
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Config file is not valid TOML for our schema
    ConfigParse {
        path: PathBuf,
        source: toml::de::Error,
    },
    /// Invalid config value
    ConfigValidation { field: &'static str, reason: String },

    // === Input ===
    /// Colour argument could not be parsed
    InvalidColor { input: String },

    // === Runtime ===
    /// Tokio runtime creation failed
    Runtime { source: std::io::Error },
}

impl std::error::Error for ArmlError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::PortUnavailable { source, .. } => Some(source),
            Self::Write { source, .. }
            | Self::ConfigRead { source, .. }
            | Self::Runtime { source } => Some(source),
            Self::ConfigParse { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl fmt::Display for ArmlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PortUnavailable { port, source } => {
                write!(f, "Cannot open serial port {}: {}", port, source)
            }
            Self::PortNotOpen => write!(f, "Serial port is not open"),
            Self::Write { port, source } => write!(f, "Write to {} failed: {}", port, source),
            Self::ReaderJoinTimeout { timeout } => {
                write!(f, "Reader thread did not stop within {:?}", timeout)
            }
            Self::NoDeviceFound => write!(f, "No Arduino found"),
            Self::MultipleDevicesFound { ports } => {
                write!(f, "Multiple Arduinos found ({}), specify a port", ports.join(", "))
            }
            Self::ConfigRead { path, .. } => write!(f, "Cannot access config: {}", path.display()),
            Self::ConfigParse { path, source } => {
                write!(f, "Invalid config {}: {}", path.display(), source)
            }
            Self::ConfigValidation { field, reason } => {
                write!(f, "Invalid {}: {}", field, reason)
            }
            Self::InvalidColor { input } => write!(f, "Invalid colour: {}", input),
            Self::Runtime { .. } => write!(f, "Failed to create runtime"),
        }
    }
}

/// Alias for Result with ArmlError
pub type Result<T> = std::result::Result<T, ArmlError>;
