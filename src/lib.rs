//! Host-side driver for the ARML Arduino LED strip and IMU
//!
//! - `transport`: serial port, background line reader
//! - `codec`: command grammar, acknowledgements, IMU lines
//! - `queue`: ack-paced single-flight command queue
//! - `controller`: caller API for LED intents and IMU orientation
//! - `session`: connection lifetime and reconnection

pub mod cli;
pub mod codec;
pub mod color;
pub mod config;
pub mod constants;
pub mod controller;
pub mod error;
pub mod imu;
pub mod logging;
pub mod queue;
pub mod session;
pub mod stats;
pub mod transport;
