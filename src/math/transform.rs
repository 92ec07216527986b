use super::{Quaternion, Vector3};

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// A rigid transform (position and rotation) in world space
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct Transform {
    /// The position component of the transform
    pub position: Vector3,

    /// The rotation component of the transform
    pub rotation: Quaternion,
}

impl Transform {
    /// Creates a new transform
    #[inline]
    pub fn new(position: Vector3, rotation: Quaternion) -> Self {
        Self { position, rotation }
    }

    /// Creates an identity transform
    #[inline]
    pub fn identity() -> Self {
        Self {
            position: Vector3::zero(),
            rotation: Quaternion::identity(),
        }
    }

    /// Creates a transform at the given position with no rotation
    #[inline]
    pub fn from_position(position: Vector3) -> Self {
        Self {
            position,
            rotation: Quaternion::identity(),
        }
    }

    /// Transforms a point from local space to world space
    #[inline]
    pub fn transform_point(&self, point: Vector3) -> Vector3 {
        self.rotation.rotate(point) + self.position
    }

    /// Transforms a direction from local space to world space (no translation)
    #[inline]
    pub fn transform_direction(&self, direction: Vector3) -> Vector3 {
        self.rotation.rotate(direction)
    }

    /// Transforms a point from world space to local space
    #[inline]
    pub fn inverse_transform_point(&self, point: Vector3) -> Vector3 {
        self.rotation.rotate_inverse(point - self.position)
    }

    /// Transforms a direction from world space to local space
    #[inline]
    pub fn inverse_transform_direction(&self, direction: Vector3) -> Vector3 {
        self.rotation.rotate_inverse(direction)
    }

    /// Combines this transform with another (this * other)
    pub fn combine(&self, other: &Self) -> Self {
        Self {
            position: self.transform_point(other.position),
            rotation: (self.rotation * other.rotation).normalize(),
        }
    }

    /// Returns the inverse of this transform
    pub fn inverse(&self) -> Self {
        let inv_rotation = self.rotation.conjugate();
        Self {
            position: inv_rotation.rotate(-self.position),
            rotation: inv_rotation,
        }
    }
}
