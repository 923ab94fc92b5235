//! Fixed-point arithmetic for deterministic simulation state
//!
//! Positions and velocities are stored as `i32` with 1000 units per meter.
//! Fixed-point keeps the authoritative state bit-identical across runs and
//! makes wire quantization exact, while geometry math converts to `f32`.

use serde::{Deserialize, Serialize};

use crate::util::vec3::Vec3;

/// Fixed-point scalar: 1000 units = 1.0 meter
pub type Fixed = i32;

/// Fixed-point units per meter
pub const FIXED_PRECISION: i32 = 1000;

/// Multiply a `Fixed` by this to get meters
pub const FIXED_TO_FLOAT: f32 = 1.0 / FIXED_PRECISION as f32;

/// Multiply meters by this to get `Fixed`
pub const FLOAT_TO_FIXED: f32 = FIXED_PRECISION as f32;

/// 3-component fixed-point vector (position or velocity)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedVec3 {
    pub x: Fixed,
    pub y: Fixed,
    pub z: Fixed,
}

impl FixedVec3 {
    pub const ZERO: FixedVec3 = FixedVec3 { x: 0, y: 0, z: 0 };

    #[inline]
    pub fn new(x: Fixed, y: Fixed, z: Fixed) -> Self {
        Self { x, y, z }
    }

    #[inline]
    pub fn from_vec3(v: Vec3) -> Self {
        Self {
            x: (v.x * FLOAT_TO_FIXED) as Fixed,
            y: (v.y * FLOAT_TO_FIXED) as Fixed,
            z: (v.z * FLOAT_TO_FIXED) as Fixed,
        }
    }

    #[inline]
    pub fn to_vec3(self) -> Vec3 {
        Vec3 {
            x: self.x as f32 * FIXED_TO_FLOAT,
            y: self.y as f32 * FIXED_TO_FLOAT,
            z: self.z as f32 * FIXED_TO_FLOAT,
        }
    }

    /// Component-wise linear interpolation toward `other` by fraction `t`
    ///
    /// Matches the history interpolation rule: the fractional offset is
    /// truncated back to fixed-point, so results stay deterministic.
    pub fn lerp(self, other: FixedVec3, t: f32) -> Self {
        Self {
            x: self.x + ((other.x - self.x) as f32 * t) as Fixed,
            y: self.y + ((other.y - self.y) as f32 * t) as Fixed,
            z: self.z + ((other.z - self.z) as f32 * t) as Fixed,
        }
    }

    /// Distance in meters to another fixed-point vector
    pub fn distance_to(self, other: FixedVec3) -> f32 {
        self.to_vec3().distance_to(other.to_vec3())
    }

    /// Squared distance in meters
    pub fn distance_sq_to(self, other: FixedVec3) -> f32 {
        self.to_vec3().distance_sq_to(other.to_vec3())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let v = Vec3::new(10.5, -2.25, 0.001);
        let fixed = FixedVec3::from_vec3(v);
        let back = fixed.to_vec3();
        assert!((back.x - v.x).abs() < FIXED_TO_FLOAT);
        assert!((back.y - v.y).abs() < FIXED_TO_FLOAT);
        assert!((back.z - v.z).abs() < FIXED_TO_FLOAT);
    }

    #[test]
    fn test_lerp_endpoints() {
        let a = FixedVec3::new(0, 0, 0);
        let b = FixedVec3::new(1000, 2000, -4000);
        assert_eq!(a.lerp(b, 0.0), a);
        assert_eq!(a.lerp(b, 1.0), b);
    }

    #[test]
    fn test_lerp_midpoint() {
        let a = FixedVec3::new(0, 0, 0);
        let b = FixedVec3::new(1000, 0, 500);
        let mid = a.lerp(b, 0.5);
        assert_eq!(mid, FixedVec3::new(500, 0, 250));
    }

    #[test]
    fn test_distance_meters() {
        let a = FixedVec3::from_vec3(Vec3::new(0.0, 0.0, 0.0));
        let b = FixedVec3::from_vec3(Vec3::new(3.0, 0.0, 4.0));
        assert!((a.distance_to(b) - 5.0).abs() < 0.01);
    }
}
