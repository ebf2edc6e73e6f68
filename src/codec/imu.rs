//! IMU quaternion line parsing
//!
//! The BNO055 sketch broadcasts `qx,qy,qz,qw` on the same link as the
//! LED acknowledgements.

use crate::imu::Quaternion;

/// Parse a `qx,qy,qz,qw` line
///
/// Anything other than exactly four numeric fields returns `None`.
pub fn parse_quaternion(line: &str) -> Option<Quaternion> {
    let mut fields = line.trim().split(',');
    let mut next = || fields.next()?.trim().parse::<f64>().ok();

    let x = next()?;
    let y = next()?;
    let z = next()?;
    let w = next()?;
    if fields.next().is_some() {
        return None;
    }
    Some(Quaternion::new(x, y, z, w))
}
