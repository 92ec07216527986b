use super::{Matrix3, Vector3};
use nalgebra as na;

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// A quaternion for representing rotations
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct Quaternion {
    pub w: f32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Quaternion {
    /// Creates a new quaternion
    #[inline]
    pub fn new(w: f32, x: f32, y: f32, z: f32) -> Self {
        Self { w, x, y, z }
    }

    /// Creates an identity quaternion (no rotation)
    #[inline]
    pub fn identity() -> Self {
        Self { w: 1.0, x: 0.0, y: 0.0, z: 0.0 }
    }

    /// Creates a quaternion from an axis and an angle in radians
    pub fn from_axis_angle(axis: Vector3, angle: f32) -> Self {
        let axis = axis.normalize();
        let half = angle * 0.5;
        let s = half.sin();
        Self {
            w: half.cos(),
            x: axis.x * s,
            y: axis.y * s,
            z: axis.z * s,
        }
    }

    /// Returns the axis and angle of the rotation
    pub fn to_axis_angle(&self) -> (Vector3, f32) {
        let q = self.normalize();
        let angle = 2.0 * q.w.clamp(-1.0, 1.0).acos();
        let s = (1.0 - q.w * q.w).sqrt();
        if s < super::EPSILON {
            (Vector3::unit_y(), 0.0)
        } else {
            (Vector3::new(q.x / s, q.y / s, q.z / s), angle)
        }
    }

    /// Returns the conjugate of the quaternion
    #[inline]
    pub fn conjugate(&self) -> Self {
        Self { w: self.w, x: -self.x, y: -self.y, z: -self.z }
    }

    /// Returns the squared length of the quaternion
    #[inline]
    pub fn length_squared(&self) -> f32 {
        self.w * self.w + self.x * self.x + self.y * self.y + self.z * self.z
    }

    /// Returns the length of the quaternion
    #[inline]
    pub fn length(&self) -> f32 {
        self.length_squared().sqrt()
    }

    /// Returns a normalized copy of the quaternion
    pub fn normalize(&self) -> Self {
        let len = self.length();
        if len < super::EPSILON {
            Self::identity()
        } else {
            Self {
                w: self.w / len,
                x: self.x / len,
                y: self.y / len,
                z: self.z / len,
            }
        }
    }

    /// Returns the dot product with another quaternion
    #[inline]
    pub fn dot(&self, other: &Self) -> f32 {
        self.w * other.w + self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Rotates a vector by this quaternion
    pub fn rotate(&self, v: Vector3) -> Vector3 {
        // q * v * q^-1 expanded via the cross product form
        let u = Vector3::new(self.x, self.y, self.z);
        let uv = u.cross(&v);
        let uuv = u.cross(&uv);
        v + (uv * self.w + uuv) * 2.0
    }

    /// Rotates a vector by the inverse of this quaternion
    #[inline]
    pub fn rotate_inverse(&self, v: Vector3) -> Vector3 {
        self.conjugate().rotate(v)
    }

    /// Converts the quaternion to a rotation matrix
    pub fn to_rotation_matrix(&self) -> Matrix3 {
        let q = self.normalize();
        let (w, x, y, z) = (q.w, q.x, q.y, q.z);
        Matrix3::new([
            [1.0 - 2.0 * (y * y + z * z), 2.0 * (x * y - w * z), 2.0 * (x * z + w * y)],
            [2.0 * (x * y + w * z), 1.0 - 2.0 * (x * x + z * z), 2.0 * (y * z - w * x)],
            [2.0 * (x * z - w * y), 2.0 * (y * z + w * x), 1.0 - 2.0 * (x * x + y * y)],
        ])
    }

    /// Converts to a nalgebra quaternion
    pub fn to_nalgebra(&self) -> na::Quaternion<f32> {
        na::Quaternion::new(self.w, self.x, self.y, self.z)
    }

    /// Creates from a nalgebra quaternion
    pub fn from_nalgebra(q: &na::Quaternion<f32>) -> Self {
        Self { w: q.w, x: q.i, y: q.j, z: q.k }
    }
}

impl std::ops::Mul for Quaternion {
    type Output = Self;

    fn mul(self, other: Self) -> Self {
        Self {
            w: self.w * other.w - self.x * other.x - self.y * other.y - self.z * other.z,
            x: self.w * other.x + self.x * other.w + self.y * other.z - self.z * other.y,
            y: self.w * other.y - self.x * other.z + self.y * other.w + self.z * other.x,
            z: self.w * other.z + self.x * other.y - self.y * other.x + self.z * other.w,
        }
    }
}

impl std::ops::MulAssign for Quaternion {
    fn mul_assign(&mut self, other: Self) {
        *self = *self * other;
    }
}
