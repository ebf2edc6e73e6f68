//! BNO055 orientation tracking
//!
//! Samples arrive in the sensor frame. Callers consume them remapped into a
//! Y-up, left-handed frame and offset by a calibration snapshot taken from
//! the first non-zero reading, so the installation starts facing "forward".

/// |sin(pitch)| at which yaw and roll can no longer be told apart
const GIMBAL_LOCK_SIN: f64 = 0.999_999;

/// Unit quaternion in `(x, y, z, w)` order
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Quaternion {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Quaternion {
    pub const IDENTITY: Quaternion = Quaternion::new(0.0, 0.0, 0.0, 1.0);

    pub const fn new(x: f64, y: f64, z: f64, w: f64) -> Self {
        Self { x, y, z, w }
    }

    /// All components zero; the sensor reports this before it has a fix
    pub fn is_zero(&self) -> bool {
        self.x == 0.0 && self.y == 0.0 && self.z == 0.0 && self.w == 0.0
    }

    pub fn normalized(self) -> Self {
        let len = (self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w).sqrt();
        if len == 0.0 || !len.is_finite() {
            return Self::IDENTITY;
        }
        Self::new(self.x / len, self.y / len, self.z / len, self.w / len)
    }

    /// Sensor frame to caller frame: `(-qy, -qz, qx, qw)`
    pub fn remapped(self) -> Self {
        Self::new(-self.y, -self.z, self.x, self.w)
    }

    /// Euler angles in degrees (ZXY rotation order), each in `[0, 360)`
    pub fn euler_degrees(self) -> [f64; 3] {
        let Quaternion { x, y, z, w } = self.normalized();

        let sin_pitch = (2.0 * (w * x - y * z)).clamp(-1.0, 1.0);
        let pitch = sin_pitch.asin();

        let (yaw, roll) = if sin_pitch.abs() >= GIMBAL_LOCK_SIN {
            // Yaw and roll share one axis at +-90 pitch; fold it all into yaw
            let yaw = (2.0 * (w * y - x * z)).atan2(1.0 - 2.0 * (y * y + z * z));
            (yaw, 0.0)
        } else {
            (
                (2.0 * (w * y + x * z)).atan2(1.0 - 2.0 * (x * x + y * y)),
                (2.0 * (w * z + x * y)).atan2(1.0 - 2.0 * (x * x + z * z)),
            )
        };

        [
            wrap_degrees(pitch.to_degrees()),
            wrap_degrees(yaw.to_degrees()),
            wrap_degrees(roll.to_degrees()),
        ]
    }
}

fn wrap_degrees(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Orientation derived from the latest sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Orientation {
    /// Latest sample in the caller's frame
    pub remapped_rotation: Quaternion,
    /// Euler angles relative to the calibration snapshot, degrees in `[0, 360)`
    pub euler_angles: [f64; 3],
}

/// Latest IMU sample plus calibration state
#[derive(Debug, Default)]
pub struct ImuTracker {
    latest: Option<Quaternion>,
    calibration: Option<[f64; 3]>,
}

impl ImuTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current sample; the first non-zero one becomes the zero pose
    pub fn update(&mut self, sample: Quaternion) {
        self.latest = Some(sample);
        if self.calibration.is_none() && !sample.is_zero() {
            // Heading only: drop the roll component from the reference
            let remapped = sample.remapped();
            let reference = Quaternion::new(remapped.x, remapped.y, 0.0, remapped.w);
            self.calibration = Some(reference.euler_degrees());
        }
    }

    pub fn latest(&self) -> Option<Quaternion> {
        self.latest
    }

    pub fn calibration(&self) -> Option<[f64; 3]> {
        self.calibration
    }

    /// Orientation of the latest sample relative to the calibration snapshot
    pub fn orientation(&self) -> Option<Orientation> {
        let remapped = self.latest?.remapped();
        let current = remapped.euler_degrees();
        let offset = self.calibration.unwrap_or([0.0; 3]);
        Some(Orientation {
            remapped_rotation: remapped,
            euler_angles: [
                wrap_degrees(current[0] - offset[0]),
                wrap_degrees(current[1] - offset[1]),
                wrap_degrees(current[2] - offset[2]),
            ],
        })
    }

    /// Make the current pose the new zero
    pub fn recalibrate(&mut self) {
        if let Some(sample) = self.latest {
            self.calibration = Some(sample.remapped().euler_degrees());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-6;

    fn assert_angles(actual: [f64; 3], expected: [f64; 3]) {
        for (a, e) in actual.iter().zip(expected.iter()) {
            let diff = (a - e).abs();
            assert!(
                diff < EPS || (diff - 360.0).abs() < EPS,
                "expected {:?}, got {:?}",
                expected,
                actual
            );
        }
    }

    #[test]
    fn test_remap_axes() {
        let q = Quaternion::new(0.1, 0.2, 0.3, 0.9).remapped();
        assert_eq!(q, Quaternion::new(-0.2, -0.3, 0.1, 0.9));
    }

    #[test]
    fn test_euler_single_axis_rotations() {
        let h = std::f64::consts::FRAC_1_SQRT_2;

        assert_angles(Quaternion::new(0.0, h, 0.0, h).euler_degrees(), [0.0, 90.0, 0.0]);
        assert_angles(Quaternion::new(h, 0.0, 0.0, h).euler_degrees(), [90.0, 0.0, 0.0]);
        assert_angles(Quaternion::new(0.0, 0.0, h, h).euler_degrees(), [0.0, 0.0, 90.0]);
        assert_angles(Quaternion::IDENTITY.euler_degrees(), [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_euler_at_gimbal_lock_keeps_heading() {
        let h = std::f64::consts::FRAC_1_SQRT_2;

        assert_angles(Quaternion::new(-h, 0.0, 0.0, h).euler_degrees(), [270.0, 0.0, 0.0]);

        // Yaw 90 then pitch 90 (q = qy * qx): heading survives, roll is zero
        let yaw_then_pitch = Quaternion::new(0.5, 0.5, -0.5, 0.5);
        assert_angles(yaw_then_pitch.euler_degrees(), [90.0, 90.0, 0.0]);
    }

    #[test]
    fn test_no_sample_no_orientation() {
        let tracker = ImuTracker::new();
        assert!(tracker.orientation().is_none());
    }

    #[test]
    fn test_first_sample_becomes_zero() {
        let h = std::f64::consts::FRAC_1_SQRT_2;
        let mut tracker = ImuTracker::new();

        // Sensor z rotation maps onto caller yaw
        tracker.update(Quaternion::new(0.0, 0.0, h, h));
        let first = tracker.orientation().unwrap();
        assert_angles(first.euler_angles, [0.0, 0.0, 0.0]);
        assert_angles(tracker.calibration().unwrap(), [0.0, 270.0, 0.0]);

        tracker.update(Quaternion::IDENTITY);
        let second = tracker.orientation().unwrap();
        assert_angles(second.euler_angles, [0.0, 90.0, 0.0]);
    }

    #[test]
    fn test_calibration_taken_from_first_sample_not_first_query() {
        let h = std::f64::consts::FRAC_1_SQRT_2;
        let mut tracker = ImuTracker::new();

        tracker.update(Quaternion::new(0.0, 0.0, h, h));
        tracker.update(Quaternion::IDENTITY);

        assert_angles(tracker.calibration().unwrap(), [0.0, 270.0, 0.0]);
        assert_angles(tracker.orientation().unwrap().euler_angles, [0.0, 90.0, 0.0]);
    }

    #[test]
    fn test_zero_sample_does_not_calibrate() {
        let mut tracker = ImuTracker::new();
        tracker.update(Quaternion::default());
        assert!(tracker.orientation().is_some());
        assert!(tracker.calibration().is_none());
    }

    #[test]
    fn test_recalibrate_uses_current_pose() {
        let h = std::f64::consts::FRAC_1_SQRT_2;
        let mut tracker = ImuTracker::new();
        tracker.update(Quaternion::IDENTITY);

        tracker.update(Quaternion::new(0.0, 0.0, h, h));
        tracker.recalibrate();

        assert_angles(tracker.orientation().unwrap().euler_angles, [0.0, 0.0, 0.0]);
    }
}
