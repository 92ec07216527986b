//! The typed joint payload of a constraint: one sum type over the seven
//! joint kinds, with a single exhaustive match for solving, motors,
//! transform updates and parameter read-back.
//!
//! Solving runs in two passes per iteration, the way the rest of the
//! engine's solver works: a velocity pass with accumulated impulses and
//! effective-mass terms, then a position pass with direct Baumgarte-style
//! correction. The velocity pass reports the impulse magnitudes it applied
//! so the breakable decorator can watch them.

use crate::bodies::RigidBody;
use crate::core::{BodyHandle, BodyStorage};
use crate::math::{clamp, to_degrees, to_radians, Matrix3, Quaternion, Transform, Vector3, EPSILON};
use crate::constraints::params::{
    AxisLimit, BallSocketParams, FixedParams, HingeParams, LengthParams, PulleyParams,
    RagdollParams, SlidingParams,
};

/// Position correction factor
const BIAS: f32 = 0.2;

/// Position error below this is ignored, meters
const SLOP: f32 = 0.01;

/// Impulse magnitudes applied by one velocity pass
#[derive(Debug, Clone, Copy, Default)]
pub struct SolveImpulse {
    /// Summed linear impulse magnitude
    pub linear: f32,

    /// Summed angular impulse magnitude
    pub angular: f32,
}

impl SolveImpulse {
    fn add_linear(&mut self, lambda: f32) {
        self.linear += lambda.abs();
    }

    fn add_angular(&mut self, lambda: f32) {
        self.angular += lambda.abs();
    }
}

/// Snapshot of both endpoint bodies taken before a solve pass. Velocities
/// are updated in place and written back once at the end of the pass.
struct SolvePair {
    pos_a: Vector3,
    pos_b: Vector3,
    vel_a: Vector3,
    vel_b: Vector3,
    omega_a: Vector3,
    omega_b: Vector3,
    inv_mass_a: f32,
    inv_mass_b: f32,
    inv_inertia_a: Matrix3,
    inv_inertia_b: Matrix3,
    transform_a: Transform,
    transform_b: Transform,
}

impl SolvePair {
    fn fetch(
        bodies: &BodyStorage<RigidBody>,
        body_a: BodyHandle,
        body_b: BodyHandle,
        mass_scale: [f32; 2],
    ) -> Option<Self> {
        let a = bodies.get(body_a)?;
        let b = bodies.get(body_b)?;

        // A mass scale above one makes the body harder to move through
        // this joint; zero means unset.
        let scale_a = if mass_scale[0] > 0.0 { mass_scale[0] } else { 1.0 };
        let scale_b = if mass_scale[1] > 0.0 { mass_scale[1] } else { 1.0 };

        let mut inv_inertia_a = a.get_inverse_inertia_tensor_world();
        let mut inv_inertia_b = b.get_inverse_inertia_tensor_world();
        for row in 0..3 {
            for col in 0..3 {
                inv_inertia_a.data[row][col] /= scale_a;
                inv_inertia_b.data[row][col] /= scale_b;
            }
        }

        Some(Self {
            pos_a: a.get_position(),
            pos_b: b.get_position(),
            vel_a: a.get_linear_velocity(),
            vel_b: b.get_linear_velocity(),
            omega_a: a.get_angular_velocity(),
            omega_b: b.get_angular_velocity(),
            inv_mass_a: a.get_inverse_mass() / scale_a,
            inv_mass_b: b.get_inverse_mass() / scale_b,
            inv_inertia_a,
            inv_inertia_b,
            transform_a: a.get_transform(),
            transform_b: b.get_transform(),
        })
    }

    fn apply_velocities(
        &self,
        bodies: &mut BodyStorage<RigidBody>,
        body_a: BodyHandle,
        body_b: BodyHandle,
    ) {
        if let Some(a) = bodies.get_mut(body_a) {
            a.set_linear_velocity(self.vel_a);
            a.set_angular_velocity(self.omega_a);
        }
        if let Some(b) = bodies.get_mut(body_b) {
            b.set_linear_velocity(self.vel_b);
            b.set_angular_velocity(self.omega_b);
        }
    }

    /// Solves one linear constraint axis at the given anchors and applies
    /// the impulse to the cached velocities. Returns the impulse magnitude.
    fn solve_linear_axis(
        &mut self,
        n: Vector3,
        ra: Vector3,
        rb: Vector3,
        bias: f32,
        strength: f32,
    ) -> f32 {
        let vel_at_a = self.vel_a + self.omega_a.cross(&ra);
        let vel_at_b = self.vel_b + self.omega_b.cross(&rb);
        let c_dot = (vel_at_b - vel_at_a).dot(&n);

        let ra_n = ra.cross(&n);
        let rb_n = rb.cross(&n);
        let k = self.inv_mass_a
            + self.inv_mass_b
            + ra_n.dot(&self.inv_inertia_a.multiply_vector(ra_n))
            + rb_n.dot(&self.inv_inertia_b.multiply_vector(rb_n));
        if k <= EPSILON {
            return 0.0;
        }

        let lambda = -(c_dot + bias) / k * strength;
        let p = n * lambda;

        self.vel_a -= p * self.inv_mass_a;
        self.omega_a -= self.inv_inertia_a.multiply_vector(ra.cross(&p));
        self.vel_b += p * self.inv_mass_b;
        self.omega_b += self.inv_inertia_b.multiply_vector(rb.cross(&p));
        lambda
    }

    /// Solves one angular constraint axis and applies the impulse to the
    /// cached angular velocities. Returns the impulse magnitude.
    fn solve_angular_axis(&mut self, n: Vector3, bias: f32, strength: f32) -> f32 {
        let c_dot = (self.omega_b - self.omega_a).dot(&n);
        let k = n.dot(&self.inv_inertia_a.multiply_vector(n))
            + n.dot(&self.inv_inertia_b.multiply_vector(n));
        if k <= EPSILON {
            return 0.0;
        }

        let lambda = -(c_dot + bias) / k * strength;
        self.apply_angular(n, lambda);
        lambda
    }

    fn apply_angular(&mut self, n: Vector3, lambda: f32) {
        self.omega_a -= self.inv_inertia_a.multiply_vector(n * lambda);
        self.omega_b += self.inv_inertia_b.multiply_vector(n * lambda);
    }

    /// Effective mass of an angular axis
    fn angular_mass(&self, n: Vector3) -> f32 {
        n.dot(&self.inv_inertia_a.multiply_vector(n))
            + n.dot(&self.inv_inertia_b.multiply_vector(n))
    }
}

/// Moves both bodies' positions to shrink a point error, weighted by
/// inverse mass. Returns the remaining error magnitude.
fn correct_point_error(
    bodies: &mut BodyStorage<RigidBody>,
    body_a: BodyHandle,
    body_b: BodyHandle,
    error: Vector3,
) -> f32 {
    let len = error.length();
    if len <= SLOP {
        return len;
    }

    let (inv_a, inv_b) = {
        let Some(a) = bodies.get(body_a) else { return len };
        let Some(b) = bodies.get(body_b) else { return len };
        (a.get_inverse_mass(), b.get_inverse_mass())
    };
    let mass_sum = inv_a + inv_b;
    if mass_sum <= EPSILON {
        return len;
    }

    let correction = error.normalize() * ((len - SLOP) * BIAS / mass_sum);
    if let Some(a) = bodies.get_mut(body_a) {
        let p = a.get_position() + correction * inv_a;
        a.set_position(p);
    }
    if let Some(b) = bodies.get_mut(body_b) {
        let p = b.get_position() - correction * inv_b;
        b.set_position(p);
    }
    len
}

/// Rotates both bodies toward each other around `axis` by `angle * BIAS`,
/// split evenly between the movable bodies
fn correct_angular_error(
    bodies: &mut BodyStorage<RigidBody>,
    body_a: BodyHandle,
    body_b: BodyHandle,
    axis: Vector3,
    angle: f32,
) {
    if angle.abs() <= EPSILON || axis.is_zero() {
        return;
    }
    let correction = angle * BIAS * 0.5;
    if let Some(a) = bodies.get_mut(body_a) {
        if !a.is_static() {
            let dq = Quaternion::from_axis_angle(axis, correction);
            a.set_rotation(dq * a.get_rotation());
        }
    }
    if let Some(b) = bodies.get_mut(body_b) {
        if !b.is_static() {
            let dq = Quaternion::from_axis_angle(axis, -correction);
            b.set_rotation(dq * b.get_rotation());
        }
    }
}

/// Builds an orthonormal basis perpendicular to a unit vector
fn perpendicular_basis(n: Vector3) -> (Vector3, Vector3) {
    let helper = if n.x.abs() < 0.7 {
        Vector3::unit_x()
    } else {
        Vector3::unit_y()
    };
    let u = n.cross(&helper).normalize();
    let v = n.cross(&u);
    (u, v)
}

/// One rotation axis of a ragdoll joint, limits in radians
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RagdollAxis {
    pub min: f32,
    pub max: f32,
    pub free: bool,
    pub motor_velocity: f32,
    pub torque: f32,
}

/// Pins a point on each body together
#[derive(Debug, Clone)]
pub struct BallSocketJoint {
    pub anchor_a: Vector3,
    pub anchor_b: Vector3,
}

/// Welds the attached body to the reference body
#[derive(Debug, Clone)]
pub struct FixedJoint {
    /// Attached body's target frame in reference space
    pub frame: Transform,
}

/// Single-axis rotation joint
#[derive(Debug, Clone)]
pub struct HingeJoint {
    pub anchor_a: Vector3,
    pub anchor_b: Vector3,
    pub axis_a: Vector3,
    pub axis_b: Vector3,
    pub perp_a: Vector3,
    pub perp_b: Vector3,
    /// Rotation limits in radians; None leaves the axis free
    pub limit: Option<(f32, f32)>,
    pub motor_enabled: bool,
    /// Motor target velocity, radians per second
    pub motor_target_velocity: f32,
    /// Motor/friction torque budget
    pub motor_max_torque: f32,
    /// Accumulated motor impulse for the current tick
    pub(crate) motor_impulse: f32,
    /// Hinge angle measured during the last solve
    pub current_angle: f32,
}

/// Slide along one axis of the reference body
#[derive(Debug, Clone)]
pub struct SlidingJoint {
    /// Attached body's frame in reference space
    pub frame: Transform,
    /// Slide axis in reference space
    pub axis: Vector3,
    /// Travel limits along the axis; None disables them
    pub limit: Option<(f32, f32)>,
    /// Axial friction force (and default motor budget)
    pub friction: f32,
    /// Motor target velocity along the axis
    pub motor_velocity: f32,
    /// Motor force budget; friction is used when zero
    pub motor_max_force: f32,
    /// Accumulated axial impulse for the current tick
    pub(crate) axial_impulse: f32,
}

/// Rope over two pulley points
#[derive(Debug, Clone)]
pub struct PulleyJoint {
    pub pulley_points: [Vector3; 2],
    pub anchor_a: Vector3,
    pub anchor_b: Vector3,
    pub total_length: f32,
    pub gear_ratio: f32,
    pub is_rigid: bool,
}

/// Keeps two anchors within a length band
#[derive(Debug, Clone)]
pub struct LengthJoint {
    pub anchor_a: Vector3,
    pub anchor_b: Vector3,
    pub total_length: f32,
    pub min_length: f32,
}

/// Three-axis limited joint
#[derive(Debug, Clone)]
pub struct RagdollJoint {
    /// Joint frame in reference body space
    pub frame_a: Transform,
    /// Joint frame in attached body space
    pub frame_b: Transform,
    pub axes: [RagdollAxis; 3],
    pub only_angular_limits: bool,
    pub use_clockwise_rotations: bool,
}

/// The joint kind payload
#[derive(Debug, Clone)]
pub enum JointKind {
    BallSocket(BallSocketJoint),
    Fixed(FixedJoint),
    Hinge(HingeJoint),
    Sliding(SlidingJoint),
    Pulley(PulleyJoint),
    Length(LengthJoint),
    Ragdoll(RagdollJoint),
}

impl JointKind {
    /// Short name for diagnostics
    pub fn name(&self) -> &'static str {
        match self {
            JointKind::BallSocket(_) => "ballsocket",
            JointKind::Fixed(_) => "fixed",
            JointKind::Hinge(_) => "hinge",
            JointKind::Sliding(_) => "sliding",
            JointKind::Pulley(_) => "pulley",
            JointKind::Length(_) => "length",
            JointKind::Ragdoll(_) => "ragdoll",
        }
    }
}

/// A joint between a reference body and an attached body
#[derive(Debug, Clone)]
pub struct Joint {
    /// The reference body
    pub body_a: BodyHandle,

    /// The attached body
    pub body_b: BodyHandle,

    /// Per-body mass scale applied while solving
    pub mass_scale: [f32; 2],

    /// Solver strength (tau)
    pub strength: f32,

    /// The typed payload
    pub kind: JointKind,
}

impl Joint {
    pub fn new(body_a: BodyHandle, body_b: BodyHandle, strength: f32, kind: JointKind) -> Self {
        Self {
            body_a,
            body_b,
            mass_scale: [1.0, 1.0],
            strength: clamp(strength, EPSILON, 1.0),
            kind,
        }
    }

    /// Returns whether this joint involves the given body
    pub fn involves_body(&self, body: BodyHandle) -> bool {
        self.body_a == body || self.body_b == body
    }

    /// One velocity-solve pass. Returns the impulse magnitudes applied so
    /// the breakable decorator can compare them against its limits.
    pub fn solve_velocity(&mut self, dt: f32, bodies: &mut BodyStorage<RigidBody>) -> SolveImpulse {
        let mut applied = SolveImpulse::default();
        let Some(mut pair) = SolvePair::fetch(bodies, self.body_a, self.body_b, self.mass_scale)
        else {
            return applied;
        };
        let strength = self.strength;

        match &mut self.kind {
            JointKind::BallSocket(joint) => {
                let ra = pair.transform_a.transform_direction(joint.anchor_a);
                let rb = pair.transform_b.transform_direction(joint.anchor_b);
                for n in [Vector3::unit_x(), Vector3::unit_y(), Vector3::unit_z()] {
                    applied.add_linear(pair.solve_linear_axis(n, ra, rb, 0.0, strength));
                }
            }

            JointKind::Fixed(joint) => {
                let pivot_a = pair.transform_a.transform_point(joint.frame.position);
                let ra = pivot_a - pair.pos_a;
                let rb = Vector3::zero();
                for n in [Vector3::unit_x(), Vector3::unit_y(), Vector3::unit_z()] {
                    applied.add_linear(pair.solve_linear_axis(n, ra, rb, 0.0, strength));
                }
                for n in [Vector3::unit_x(), Vector3::unit_y(), Vector3::unit_z()] {
                    applied.add_angular(pair.solve_angular_axis(n, 0.0, strength));
                }
            }

            JointKind::Hinge(joint) => {
                let ra = pair.transform_a.transform_direction(joint.anchor_a);
                let rb = pair.transform_b.transform_direction(joint.anchor_b);
                for n in [Vector3::unit_x(), Vector3::unit_y(), Vector3::unit_z()] {
                    applied.add_linear(pair.solve_linear_axis(n, ra, rb, 0.0, strength));
                }

                let axis = pair.transform_a.transform_direction(joint.axis_a).normalize();
                let (u, v) = perpendicular_basis(axis);
                applied.add_angular(pair.solve_angular_axis(u, 0.0, strength));
                applied.add_angular(pair.solve_angular_axis(v, 0.0, strength));

                // Hinge angle from the perpendicular reference axes.
                let perp_a = pair.transform_a.transform_direction(joint.perp_a);
                let perp_b = pair.transform_b.transform_direction(joint.perp_b);
                let sine = perp_a.cross(&perp_b).dot(&axis);
                let cosine = perp_a.dot(&perp_b);
                joint.current_angle = sine.atan2(cosine);

                // Motor (or friction when the target velocity is zero).
                if joint.motor_enabled && joint.motor_max_torque > 0.0 {
                    let k = pair.angular_mass(axis);
                    if k > EPSILON {
                        let rel = (pair.omega_b - pair.omega_a).dot(&axis);
                        let lambda = (joint.motor_target_velocity - rel) / k;

                        let max_impulse = joint.motor_max_torque * dt;
                        let old = joint.motor_impulse;
                        joint.motor_impulse =
                            clamp(joint.motor_impulse + lambda, -max_impulse, max_impulse);
                        let delta = joint.motor_impulse - old;
                        pair.apply_angular(axis, delta);
                        applied.add_angular(delta);
                    }
                }

                // Limits.
                if let Some((min, max)) = joint.limit {
                    let violation = if joint.current_angle < min {
                        joint.current_angle - min
                    } else if joint.current_angle > max {
                        joint.current_angle - max
                    } else {
                        0.0
                    };
                    if violation != 0.0 {
                        let bias = BIAS * violation / dt;
                        applied.add_angular(pair.solve_angular_axis(axis, bias, strength));
                    }
                }
            }

            JointKind::Sliding(joint) => {
                let axis = pair.transform_a.transform_direction(joint.axis).normalize();
                let frame_origin = pair.transform_a.transform_point(joint.frame.position);
                let offset = pair.pos_b - frame_origin;
                let travel = offset.dot(&axis);

                let ra = pair.pos_b - pair.pos_a;
                let rb = Vector3::zero();

                // Lock motion perpendicular to the slide axis.
                let (u, v) = perpendicular_basis(axis);
                applied.add_linear(pair.solve_linear_axis(u, ra, rb, 0.0, strength));
                applied.add_linear(pair.solve_linear_axis(v, ra, rb, 0.0, strength));

                // Lock all relative rotation.
                for n in [Vector3::unit_x(), Vector3::unit_y(), Vector3::unit_z()] {
                    applied.add_angular(pair.solve_angular_axis(n, 0.0, strength));
                }

                // Motor along the axis, or friction when no motor is set.
                let budget = if joint.motor_max_force > 0.0 {
                    joint.motor_max_force
                } else {
                    joint.friction
                };
                if budget > 0.0 {
                    let k = pair.inv_mass_a + pair.inv_mass_b;
                    if k > EPSILON {
                        let rel = (pair.vel_b - pair.vel_a).dot(&axis);
                        let target = if joint.motor_max_force > 0.0 {
                            joint.motor_velocity
                        } else {
                            0.0
                        };
                        let lambda = (target - rel) / k;
                        let max_impulse = budget * dt;
                        let old = joint.axial_impulse;
                        joint.axial_impulse =
                            clamp(joint.axial_impulse + lambda, -max_impulse, max_impulse);
                        let delta = joint.axial_impulse - old;
                        let p = axis * delta;
                        pair.vel_a -= p * pair.inv_mass_a;
                        pair.vel_b += p * pair.inv_mass_b;
                        applied.add_linear(delta);
                    }
                }

                // Travel limits.
                if let Some((min, max)) = joint.limit {
                    let violation = if travel < min {
                        travel - min
                    } else if travel > max {
                        travel - max
                    } else {
                        0.0
                    };
                    if violation != 0.0 {
                        let bias = BIAS * violation / dt;
                        applied.add_linear(pair.solve_linear_axis(axis, ra, rb, bias, strength));
                    }
                }
            }

            JointKind::Pulley(joint) => {
                let anchor_a = pair.transform_a.transform_point(joint.anchor_a);
                let anchor_b = pair.transform_b.transform_point(joint.anchor_b);
                let to_a = anchor_a - joint.pulley_points[0];
                let to_b = anchor_b - joint.pulley_points[1];
                let len_a = to_a.length();
                let len_b = to_b.length();
                if len_a > EPSILON && len_b > EPSILON {
                    let n_a = to_a / len_a;
                    let n_b = to_b / len_b;
                    let ratio = joint.gear_ratio.max(EPSILON);
                    let c = len_a + ratio * len_b - joint.total_length;

                    if joint.is_rigid || c > 0.0 {
                        let ra = anchor_a - pair.pos_a;
                        let rb = anchor_b - pair.pos_b;
                        let vel_at_a = pair.vel_a + pair.omega_a.cross(&ra);
                        let vel_at_b = pair.vel_b + pair.omega_b.cross(&rb);
                        let c_dot = vel_at_a.dot(&n_a) + ratio * vel_at_b.dot(&n_b);

                        let ra_n = ra.cross(&n_a);
                        let rb_n = rb.cross(&n_b);
                        let k = pair.inv_mass_a
                            + ra_n.dot(&pair.inv_inertia_a.multiply_vector(ra_n))
                            + ratio
                                * ratio
                                * (pair.inv_mass_b
                                    + rb_n.dot(&pair.inv_inertia_b.multiply_vector(rb_n)));
                        if k > EPSILON {
                            let bias = BIAS * c.max(0.0) / dt;
                            let mut j = (c_dot + bias) / k * strength;
                            if !joint.is_rigid && j < 0.0 {
                                // A slack rope can only pull.
                                j = 0.0;
                            }
                            let p_a = n_a * -j;
                            let p_b = n_b * (-j * ratio);
                            pair.vel_a += p_a * pair.inv_mass_a;
                            pair.omega_a += pair.inv_inertia_a.multiply_vector(ra.cross(&p_a));
                            pair.vel_b += p_b * pair.inv_mass_b;
                            pair.omega_b += pair.inv_inertia_b.multiply_vector(rb.cross(&p_b));
                            applied.add_linear(j);
                        }
                    }
                }
            }

            JointKind::Length(joint) => {
                let anchor_a = pair.transform_a.transform_point(joint.anchor_a);
                let anchor_b = pair.transform_b.transform_point(joint.anchor_b);
                let delta = anchor_b - anchor_a;
                let dist = delta.length();
                if dist > EPSILON {
                    let n = delta / dist;
                    let ra = anchor_a - pair.pos_a;
                    let rb = anchor_b - pair.pos_b;

                    let vel_at_a = pair.vel_a + pair.omega_a.cross(&ra);
                    let vel_at_b = pair.vel_b + pair.omega_b.cross(&rb);
                    let c_dot = (vel_at_b - vel_at_a).dot(&n);

                    let ra_n = ra.cross(&n);
                    let rb_n = rb.cross(&n);
                    let k = pair.inv_mass_a
                        + pair.inv_mass_b
                        + ra_n.dot(&pair.inv_inertia_a.multiply_vector(ra_n))
                        + rb_n.dot(&pair.inv_inertia_b.multiply_vector(rb_n));
                    if k > EPSILON {
                        let mut lambda = 0.0;
                        if dist > joint.total_length {
                            // Taut: stop the anchors separating.
                            let bias = BIAS * (dist - joint.total_length) / dt;
                            lambda = (-(c_dot + bias) / k * strength).min(0.0);
                        } else if joint.min_length > 0.0 && dist < joint.min_length {
                            // Compressed below the minimum: push apart.
                            let bias = BIAS * (dist - joint.min_length) / dt;
                            lambda = (-(c_dot + bias) / k * strength).max(0.0);
                        }
                        if lambda != 0.0 {
                            let p = n * lambda;
                            pair.vel_a -= p * pair.inv_mass_a;
                            pair.omega_a -= pair.inv_inertia_a.multiply_vector(ra.cross(&p));
                            pair.vel_b += p * pair.inv_mass_b;
                            pair.omega_b += pair.inv_inertia_b.multiply_vector(rb.cross(&p));
                            applied.add_linear(lambda);
                        }
                    }
                }
            }

            JointKind::Ragdoll(joint) => {
                if !joint.only_angular_limits {
                    let pivot_a = pair.transform_a.transform_point(joint.frame_a.position);
                    let pivot_b = pair.transform_b.transform_point(joint.frame_b.position);
                    let ra = pivot_a - pair.pos_a;
                    let rb = pivot_b - pair.pos_b;
                    for n in [Vector3::unit_x(), Vector3::unit_y(), Vector3::unit_z()] {
                        applied.add_linear(pair.solve_linear_axis(n, ra, rb, 0.0, strength));
                    }
                }

                let frame_rot_a = (pair.transform_a.rotation * joint.frame_a.rotation).normalize();
                let frame_rot_b = (pair.transform_b.rotation * joint.frame_b.rotation).normalize();
                let rel = (frame_rot_a.conjugate() * frame_rot_b).normalize();
                let angles = twist_angles(&rel);

                for (index, axis_data) in joint.axes.iter().enumerate() {
                    let world_axis = frame_rot_a.rotate(basis_axis(index));
                    let angle = angles[index];

                    if !axis_data.free {
                        // Locked axis: drive the angle back to zero.
                        let bias = BIAS * angle / dt;
                        applied.add_angular(pair.solve_angular_axis(world_axis, bias, strength));
                        continue;
                    }

                    // Limit enforcement.
                    let violation = if angle < axis_data.min {
                        angle - axis_data.min
                    } else if angle > axis_data.max {
                        angle - axis_data.max
                    } else {
                        0.0
                    };
                    if violation != 0.0 {
                        let bias = BIAS * violation / dt;
                        applied.add_angular(pair.solve_angular_axis(world_axis, bias, strength));
                    }

                    // Joint friction / motor about the axis.
                    if axis_data.torque > 0.0 {
                        let k = pair.angular_mass(world_axis);
                        if k > EPSILON {
                            let rel_omega = (pair.omega_b - pair.omega_a).dot(&world_axis);
                            let lambda = (axis_data.motor_velocity - rel_omega) / k;
                            let max_impulse = axis_data.torque * dt;
                            let delta = clamp(lambda, -max_impulse, max_impulse);
                            pair.apply_angular(world_axis, delta);
                            applied.add_angular(delta);
                        }
                    }
                }
            }
        }

        pair.apply_velocities(bodies, self.body_a, self.body_b);
        applied
    }

    /// One position-correction pass. Returns the position error observed
    /// before correction, for the group error state machine.
    pub fn solve_position(&mut self, _dt: f32, bodies: &mut BodyStorage<RigidBody>) -> f32 {
        let Some(pair) = SolvePair::fetch(bodies, self.body_a, self.body_b, self.mass_scale)
        else {
            return 0.0;
        };

        match &self.kind {
            JointKind::BallSocket(joint) => {
                let pa = pair.transform_a.transform_point(joint.anchor_a);
                let pb = pair.transform_b.transform_point(joint.anchor_b);
                correct_point_error(bodies, self.body_a, self.body_b, pb - pa)
            }

            JointKind::Fixed(joint) => {
                let target = pair.transform_a.combine(&joint.frame);
                let error = pair.pos_b - target.position;

                // Align the attached rotation with the target frame.
                let delta = (target.rotation.conjugate() * pair.transform_b.rotation).normalize();
                let (axis, angle) = delta.to_axis_angle();
                if angle.abs() > EPSILON {
                    let world_axis = target.rotation.rotate(axis);
                    correct_angular_error(bodies, self.body_a, self.body_b, world_axis, angle);
                }
                correct_point_error(bodies, self.body_a, self.body_b, error)
            }

            JointKind::Hinge(joint) => {
                let pa = pair.transform_a.transform_point(joint.anchor_a);
                let pb = pair.transform_b.transform_point(joint.anchor_b);
                let error = correct_point_error(bodies, self.body_a, self.body_b, pb - pa);

                // Re-align the hinge axes.
                let axis_a = pair.transform_a.transform_direction(joint.axis_a);
                let axis_b = pair.transform_b.transform_direction(joint.axis_b);
                let mut cross = axis_a.cross(&axis_b);
                if let Some(sine) = cross.try_normalize_mut() {
                    let angle = sine.atan2(axis_a.dot(&axis_b));
                    correct_angular_error(bodies, self.body_a, self.body_b, cross, angle);
                }
                error
            }

            JointKind::Sliding(joint) => {
                let axis = pair.transform_a.transform_direction(joint.axis).normalize();
                let frame_origin = pair.transform_a.transform_point(joint.frame.position);
                let offset = pair.pos_b - frame_origin;
                let perpendicular = offset.reject(&axis);
                correct_point_error(bodies, self.body_a, self.body_b, -perpendicular)
            }

            JointKind::Pulley(joint) => {
                let anchor_a = pair.transform_a.transform_point(joint.anchor_a);
                let anchor_b = pair.transform_b.transform_point(joint.anchor_b);
                let len_a = (anchor_a - joint.pulley_points[0]).length();
                let len_b = (anchor_b - joint.pulley_points[1]).length();
                (len_a + joint.gear_ratio * len_b - joint.total_length).max(0.0)
            }

            JointKind::Length(joint) => {
                let anchor_a = pair.transform_a.transform_point(joint.anchor_a);
                let anchor_b = pair.transform_b.transform_point(joint.anchor_b);
                let dist = anchor_a.distance(&anchor_b);
                (dist - joint.total_length).max(0.0)
            }

            JointKind::Ragdoll(joint) => {
                if joint.only_angular_limits {
                    0.0
                } else {
                    let pa = pair.transform_a.transform_point(joint.frame_a.position);
                    let pb = pair.transform_b.transform_point(joint.frame_b.position);
                    correct_point_error(bodies, self.body_a, self.body_b, pb - pa)
                }
            }
        }
    }

    /// Resets per-tick accumulators; call once before the solve iterations
    pub fn begin_tick(&mut self) {
        match &mut self.kind {
            JointKind::Hinge(joint) => joint.motor_impulse = 0.0,
            JointKind::Sliding(joint) => joint.axial_impulse = 0.0,
            _ => {}
        }
    }

    /// Sets the linear motor of a sliding joint; ignored by other kinds
    pub fn set_linear_motor(&mut self, speed: f32, max_force: f32) {
        if let JointKind::Sliding(joint) = &mut self.kind {
            joint.motor_velocity = speed;
            joint.motor_max_force = max_force.max(0.0);
        }
    }

    /// Sets the angular motor of a hinge, or updates ragdoll axis friction
    /// when the speed is zero
    pub fn set_angular_motor(&mut self, speed: f32, max_impulse: f32) {
        match &mut self.kind {
            JointKind::Hinge(joint) => {
                joint.motor_enabled = true;
                joint.motor_target_velocity = speed;
                joint.motor_max_torque = max_impulse.abs();
            }
            JointKind::Ragdoll(joint) if speed == 0.0 => {
                for axis in &mut joint.axes {
                    if axis.free {
                        axis.torque = max_impulse.abs();
                    }
                }
            }
            _ => {}
        }
    }

    /// Re-parents a ragdoll joint's local frames without recreating it
    pub fn update_ragdoll_transforms(
        &mut self,
        constraint_to_reference: Transform,
        constraint_to_attached: Transform,
    ) {
        if let JointKind::Ragdoll(joint) = &mut self.kind {
            joint.frame_a = constraint_to_reference;
            joint.frame_b = constraint_to_attached;
        }
    }

    /// Local constraint frames for ragdoll, ball-socket and fixed joints
    pub fn constraint_transform(&self) -> Option<(Transform, Transform)> {
        match &self.kind {
            JointKind::Ragdoll(joint) => Some((joint.frame_a, joint.frame_b)),
            JointKind::BallSocket(joint) => Some((
                Transform::from_position(joint.anchor_a),
                Transform::from_position(joint.anchor_b),
            )),
            JointKind::Fixed(joint) => Some((joint.frame, Transform::identity())),
            _ => None,
        }
    }
}

/// Per-axis twist angles of a relative rotation quaternion
fn twist_angles(rel: &Quaternion) -> [f32; 3] {
    let w = rel.w.clamp(-1.0, 1.0);
    [
        2.0 * rel.x.atan2(w),
        2.0 * rel.y.atan2(w),
        2.0 * rel.z.atan2(w),
    ]
}

fn basis_axis(index: usize) -> Vector3 {
    match index {
        0 => Vector3::unit_x(),
        1 => Vector3::unit_y(),
        _ => Vector3::unit_z(),
    }
}

// Parameter read-back: the inverse of construction, used by persistence
// and GetConstraintParams-style queries.

impl Joint {
    pub(crate) fn write_ballsocket(&self, joint: &BallSocketJoint) -> BallSocketParams {
        BallSocketParams {
            constraint_position: [joint.anchor_a, joint.anchor_b],
            constraint: Default::default(),
        }
    }

    pub(crate) fn write_fixed(&self, joint: &FixedJoint) -> FixedParams {
        FixedParams {
            attached_ref_xform: joint.frame,
            constraint: Default::default(),
        }
    }

    pub(crate) fn write_hinge(
        &self,
        joint: &HingeJoint,
        bodies: &BodyStorage<RigidBody>,
    ) -> HingeParams {
        let mut params = HingeParams {
            reference_perp_axis: joint.perp_a,
            attached_perp_axis: joint.perp_b,
            ..HingeParams::default()
        };
        if let Some(a) = bodies.get(self.body_a) {
            let transform = a.get_transform();
            params.world_position = transform.transform_point(joint.anchor_a);
            params.world_axis_direction = transform.transform_direction(joint.axis_a);
        }
        if let Some((min, max)) = joint.limit {
            params.hinge_axis.min_rotation = to_degrees(min);
            params.hinge_axis.max_rotation = to_degrees(max);
        }
        if joint.motor_enabled {
            params.hinge_axis.angular_velocity = to_degrees(joint.motor_target_velocity);
            params.hinge_axis.torque = to_degrees(joint.motor_max_torque);
        }
        params
    }

    pub(crate) fn write_sliding(&self, joint: &SlidingJoint) -> SlidingParams {
        let (limit_min, limit_max) = joint.limit.unwrap_or((0.0, 0.0));
        SlidingParams {
            attached_ref_xform: joint.frame,
            slide_axis_ref: joint.axis,
            limit_min,
            limit_max,
            friction: joint.friction,
            velocity: joint.motor_velocity,
            constraint: Default::default(),
        }
    }

    pub(crate) fn write_pulley(&self, joint: &PulleyJoint) -> PulleyParams {
        PulleyParams {
            pulley_position: joint.pulley_points,
            object_position: [joint.anchor_a, joint.anchor_b],
            total_length: joint.total_length,
            gear_ratio: joint.gear_ratio,
            is_rigid: joint.is_rigid,
            constraint: Default::default(),
        }
    }

    pub(crate) fn write_length(&self, joint: &LengthJoint) -> LengthParams {
        LengthParams {
            object_position: [joint.anchor_a, joint.anchor_b],
            total_length: joint.total_length,
            min_length: joint.min_length,
            constraint: Default::default(),
        }
    }

    pub(crate) fn write_ragdoll(&self, joint: &RagdollJoint) -> RagdollParams {
        let mut params = RagdollParams {
            constraint_to_reference: joint.frame_a,
            constraint_to_attached: joint.frame_b,
            only_angular_limits: joint.only_angular_limits,
            use_clockwise_rotations: false,
            ..RagdollParams::default()
        };
        for (index, axis) in joint.axes.iter().enumerate() {
            params.axes[index] = AxisLimit {
                min_rotation: to_degrees(axis.min),
                max_rotation: to_degrees(axis.max),
                angular_velocity: to_degrees(axis.motor_velocity),
                torque: axis.torque,
            };
        }
        params
    }
}

/// Builds a ragdoll axis table from authored axis limits, applying the
/// clockwise-rotation flip the authoring convention calls for
pub(crate) fn ragdoll_axes_from_params(params: &RagdollParams) -> [RagdollAxis; 3] {
    let mut axes = [RagdollAxis {
        min: 0.0,
        max: 0.0,
        free: false,
        motor_velocity: 0.0,
        torque: 0.0,
    }; 3];

    for index in 0..3 {
        let axis = &params.axes[index];
        let (mut min, mut max) = (to_radians(axis.min_rotation), to_radians(axis.max_rotation));
        if params.use_clockwise_rotations {
            // Authored angles are clockwise; the solver is counter-clockwise.
            let tmp = min;
            min = -max;
            max = -tmp;
        }
        axes[index] = RagdollAxis {
            min,
            max,
            free: axis.is_free(),
            motor_velocity: to_radians(axis.angular_velocity),
            torque: axis.torque,
        };
    }
    axes
}
