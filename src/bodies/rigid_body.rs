use crate::bodies::RigidBodyType;
use crate::core::BodyHandle;
use crate::math::{Matrix3, Quaternion, Transform, Vector3};

use bitflags::bitflags;

/// Type alias for a handle to a rigid body
pub type RigidBodyHandle = BodyHandle;

bitflags! {
    /// Per-body behavior flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BodyFlags: u32 {
        /// The body is affected by gravity during integration
        const AFFECTED_BY_GRAVITY = 1 << 0;
        /// The body is never deleted by the environment (world anchors)
        const NEVER_DELETED = 1 << 1;
    }
}

/// A rigid body, owned by the embedding engine's solver and referenced by
/// vehicle controllers and constraints. Controllers only apply impulses;
/// integration is driven externally once per tick.
pub struct RigidBody {
    /// The body's transform in world space
    transform: Transform,

    /// The body's linear velocity
    linear_velocity: Vector3,

    /// The body's angular velocity
    angular_velocity: Vector3,

    /// The body's type (dynamic or static)
    body_type: RigidBodyType,

    /// The body's mass
    mass: f32,

    /// Inverse of the body's mass
    inv_mass: f32,

    /// The body's inertia tensor in local space
    inertia_tensor: Matrix3,

    /// Inverse of the body's inertia tensor in local space
    inv_inertia_tensor: Matrix3,

    /// The body's linear damping
    linear_damping: f32,

    /// The body's angular damping
    angular_damping: f32,

    /// The body's flags
    flags: BodyFlags,
}

impl RigidBody {
    /// Creates a new dynamic body at a position with the given mass.
    /// The inertia tensor defaults to that of a unit sphere of the mass.
    pub fn new_dynamic(position: Vector3, mass: f32) -> Self {
        let mass = mass.max(crate::math::EPSILON);
        let inertia = 0.4 * mass;
        Self {
            transform: Transform::from_position(position),
            linear_velocity: Vector3::zero(),
            angular_velocity: Vector3::zero(),
            body_type: RigidBodyType::Dynamic,
            mass,
            inv_mass: 1.0 / mass,
            inertia_tensor: Matrix3::from_diagonal(Vector3::new(inertia, inertia, inertia)),
            inv_inertia_tensor: Matrix3::from_diagonal(Vector3::new(
                1.0 / inertia,
                1.0 / inertia,
                1.0 / inertia,
            )),
            linear_damping: 0.0,
            angular_damping: 0.0,
            flags: BodyFlags::AFFECTED_BY_GRAVITY,
        }
    }

    /// Creates a new static body at a position
    pub fn new_static(position: Vector3) -> Self {
        let mut body = Self::new_dynamic(position, 1.0);
        body.body_type = RigidBodyType::Static;
        body.inv_mass = 0.0;
        body.inv_inertia_tensor = Matrix3::zero();
        body.flags = BodyFlags::NEVER_DELETED;
        body
    }

    /// Gets the body's transform
    pub fn get_transform(&self) -> Transform {
        self.transform
    }

    /// Sets the body's transform
    pub fn set_transform(&mut self, transform: Transform) {
        self.transform = transform;
    }

    /// Gets the body's position
    pub fn get_position(&self) -> Vector3 {
        self.transform.position
    }

    /// Sets the body's position
    pub fn set_position(&mut self, position: Vector3) {
        self.transform.position = position;
    }

    /// Gets the body's rotation
    pub fn get_rotation(&self) -> Quaternion {
        self.transform.rotation
    }

    /// Sets the body's rotation
    pub fn set_rotation(&mut self, rotation: Quaternion) {
        self.transform.rotation = rotation.normalize();
    }

    /// Gets the body's linear velocity
    pub fn get_linear_velocity(&self) -> Vector3 {
        self.linear_velocity
    }

    /// Sets the body's linear velocity
    pub fn set_linear_velocity(&mut self, velocity: Vector3) {
        self.linear_velocity = velocity;
    }

    /// Gets the body's angular velocity
    pub fn get_angular_velocity(&self) -> Vector3 {
        self.angular_velocity
    }

    /// Sets the body's angular velocity
    pub fn set_angular_velocity(&mut self, velocity: Vector3) {
        self.angular_velocity = velocity;
    }

    /// Gets the body's mass
    pub fn get_mass(&self) -> f32 {
        self.mass
    }

    /// Sets the body's mass (static bodies keep zero inverse mass)
    pub fn set_mass(&mut self, mass: f32) {
        self.mass = mass.max(crate::math::EPSILON);
        if self.body_type == RigidBodyType::Dynamic {
            self.inv_mass = 1.0 / self.mass;
        }
    }

    /// Gets the inverse mass
    pub fn get_inverse_mass(&self) -> f32 {
        self.inv_mass
    }

    /// Gets the body type
    pub fn get_body_type(&self) -> RigidBodyType {
        self.body_type
    }

    /// Returns whether the body is static
    pub fn is_static(&self) -> bool {
        self.body_type == RigidBodyType::Static
    }

    /// Sets the inertia tensor in local space
    pub fn set_inertia_tensor(&mut self, tensor: Matrix3) {
        self.inertia_tensor = tensor;
        if self.body_type == RigidBodyType::Dynamic {
            if let Some(inv) = tensor.inverse() {
                self.inv_inertia_tensor = inv;
            }
        }
    }

    /// Gets the inverse inertia tensor in world space
    pub fn get_inverse_inertia_tensor_world(&self) -> Matrix3 {
        let rot = self.transform.rotation.to_rotation_matrix();
        rot.multiply_matrix(&self.inv_inertia_tensor)
            .multiply_matrix(&rot.transpose())
    }

    /// Sets the linear and angular damping factors
    pub fn set_damping(&mut self, linear: f32, angular: f32) {
        self.linear_damping = linear.max(0.0);
        self.angular_damping = angular.max(0.0);
    }

    /// Gets the linear damping factor
    pub fn get_linear_damping(&self) -> f32 {
        self.linear_damping
    }

    /// Gets the angular damping factor
    pub fn get_angular_damping(&self) -> f32 {
        self.angular_damping
    }

    /// Returns the body flags
    pub fn flags(&self) -> BodyFlags {
        self.flags
    }

    /// Sets the body flags
    pub fn set_flags(&mut self, flags: BodyFlags) {
        self.flags = flags;
    }

    /// Returns the velocity of the body surface at a world-space point
    pub fn velocity_at_point(&self, point: Vector3) -> Vector3 {
        let r = point - self.transform.position;
        self.linear_velocity + self.angular_velocity.cross(&r)
    }

    /// Applies a linear impulse at the center of mass
    pub fn apply_impulse(&mut self, impulse: Vector3) {
        if self.is_static() {
            return;
        }
        self.linear_velocity += impulse * self.inv_mass;
    }

    /// Applies an impulse at a world-space point, producing both linear and
    /// angular velocity change
    pub fn apply_impulse_at_point(&mut self, impulse: Vector3, point: Vector3) {
        if self.is_static() {
            return;
        }
        self.linear_velocity += impulse * self.inv_mass;
        let r = point - self.transform.position;
        let angular = r.cross(&impulse);
        self.angular_velocity += self
            .get_inverse_inertia_tensor_world()
            .multiply_vector(angular);
    }

    /// Applies an angular impulse in world space
    pub fn apply_angular_impulse(&mut self, impulse: Vector3) {
        if self.is_static() {
            return;
        }
        self.angular_velocity += self
            .get_inverse_inertia_tensor_world()
            .multiply_vector(impulse);
    }

    /// Applies an angular impulse expressed in the body's local frame
    pub fn apply_angular_impulse_local(&mut self, impulse: Vector3) {
        let world = self.transform.transform_direction(impulse);
        self.apply_angular_impulse(world);
    }

    /// Advances the body by one step: applies gravity and damping, then
    /// integrates velocities into the transform (symplectic Euler)
    pub fn integrate(&mut self, gravity: Vector3, dt: f32) {
        if self.is_static() {
            return;
        }

        if self.flags.contains(BodyFlags::AFFECTED_BY_GRAVITY) {
            self.linear_velocity += gravity * dt;
        }

        // Exponential damping, matching controller expectations of
        // per-second damping factors.
        let linear_factor = (1.0 - self.linear_damping * dt).clamp(0.0, 1.0);
        let angular_factor = (1.0 - self.angular_damping * dt).clamp(0.0, 1.0);
        self.linear_velocity *= linear_factor;
        self.angular_velocity *= angular_factor;

        self.transform.position += self.linear_velocity * dt;

        let omega = self.angular_velocity;
        let angle = omega.length() * dt;
        if angle > crate::math::EPSILON {
            let axis = omega.normalize();
            let dq = Quaternion::from_axis_angle(axis, angle);
            self.transform.rotation = (dq * self.transform.rotation).normalize();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_impulse_changes_velocity_by_inverse_mass() {
        let mut body = RigidBody::new_dynamic(Vector3::zero(), 2.0);
        body.apply_impulse(Vector3::new(4.0, 0.0, 0.0));
        assert_relative_eq!(body.get_linear_velocity().x, 2.0);
    }

    #[test]
    fn test_static_body_ignores_impulses() {
        let mut body = RigidBody::new_static(Vector3::zero());
        body.apply_impulse(Vector3::new(100.0, 0.0, 0.0));
        body.apply_impulse_at_point(Vector3::unit_y(), Vector3::unit_x());
        assert!(body.get_linear_velocity().is_zero());
        assert!(body.get_angular_velocity().is_zero());
    }

    #[test]
    fn test_off_center_impulse_spins_body() {
        let mut body = RigidBody::new_dynamic(Vector3::zero(), 1.0);
        body.apply_impulse_at_point(Vector3::new(0.0, 1.0, 0.0), Vector3::new(1.0, 0.0, 0.0));
        assert!(body.get_angular_velocity().z > 0.0);
    }

    #[test]
    fn test_integration_under_gravity() {
        let mut body = RigidBody::new_dynamic(Vector3::new(0.0, 10.0, 0.0), 1.0);
        let gravity = Vector3::new(0.0, -9.81, 0.0);
        let dt = 1.0 / 60.0;
        for _ in 0..60 {
            body.integrate(gravity, dt);
        }
        assert!(body.get_position().y < 10.0);
        assert_relative_eq!(body.get_linear_velocity().y, -9.81, epsilon = 0.2);
    }
}
