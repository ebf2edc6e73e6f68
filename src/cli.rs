//! Command-line interface definition using clap
//!
//! Provides structured argument parsing with automatic help generation.

use crate::color::Color;
use crate::config::Config;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

// =============================================================================
// CLI Definition
// =============================================================================

/// Host-side driver for the ARML LED strip and IMU
#[derive(Parser, Debug, Default)]
#[command(name = "arml-bridge")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose debug output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file (default: arml-bridge.toml)
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Serial port to use (overrides config, skips auto-detection)
    #[arg(long, value_name = "PORT", global = true)]
    pub port: Option<String>,

    /// Baud rate (overrides config)
    #[arg(long, value_name = "N", global = true)]
    pub baud: Option<u32>,

    /// Log every line received from the device
    #[arg(long, global = true)]
    pub print_all: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    /// Apply command-line overrides on top of the loaded config
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(port) = &self.port {
            config.serial.port = port.clone();
        }
        if let Some(baud) = self.baud {
            config.serial.baud_rate = baud;
        }
        if self.print_all {
            config.serial.print_all_messages = true;
        }
    }
}

/// What to do once connected
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Keep the link alive until Ctrl-C (default)
    Run,

    /// Set a solid colour (#RRGGBB, #RRGGBBAA or a name)
    Color {
        color: Color,
        /// Send immediately instead of queueing
        #[arg(long)]
        force: bool,
    },

    /// Set the overall brightness (0-254)
    Brightness {
        level: u8,
        #[arg(long)]
        force: bool,
    },

    /// Show the ready state
    Ready,

    /// Show the loading state
    Loading,

    /// Return to the sketch's default lights
    Default,

    /// Run an animation between two colours
    Animate {
        background: Color,
        foreground: Color,
        /// Animation time in seconds
        #[arg(long)]
        rate: Option<f32>,
        /// Lit pixels
        #[arg(long)]
        length: Option<u32>,
        /// First pixel index
        #[arg(long)]
        start: Option<u32>,
        /// Last pixel index
        #[arg(long)]
        end: Option<u32>,
    },

    /// Fade between two colours on the host
    Fade {
        from: Color,
        to: Color,
        /// Duration in seconds
        secs: f32,
    },

    /// Enable the IMU and print orientation updates
    Imu {
        /// Stop after this many seconds (default: until Ctrl-C)
        #[arg(long, value_name = "N")]
        seconds: Option<u64>,
        /// Time between printed samples
        #[arg(long, value_name = "MS", default_value_t = 200)]
        interval_ms: u64,
    },

    /// List serial ports
    Ports,
}

// =============================================================================
// Tests
// =============================================================================
