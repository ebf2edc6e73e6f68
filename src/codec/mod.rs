//! Line protocol spoken with the Arduino sketch
//!
//! Separates wire format from transport and queue logic:
//! - **command**: outbound command grammar (host -> device)
//! - **ack**: acknowledgement echoes (device -> host)
//! - **imu**: quaternion broadcasts (device -> host)

pub mod ack;
pub mod command;
pub mod imu;

pub use command::{AnimationOverrides, OutboundMessage};

use crate::imu::Quaternion;

/// Classified inbound line
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceLine<'a> {
    /// Acknowledgement carrying the echoed command
    Ack { echo: &'a str },
    /// IMU orientation sample
    Imu(Quaternion),
    /// Anything else the sketch prints (boot banner, debug output)
    Other,
}

/// Classify one raw line from the device
///
/// Acknowledgements take precedence; only non-ack lines are tried as IMU samples.
pub fn decode_line(line: &str) -> DeviceLine<'_> {
    if let Some(echo) = ack::parse_echo(line) {
        return DeviceLine::Ack { echo };
    }
    match imu::parse_quaternion(line) {
        Some(q) => DeviceLine::Imu(q),
        None => DeviceLine::Other,
    }
}
