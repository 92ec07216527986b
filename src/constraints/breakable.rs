//! The breakable decorator. It wraps a real joint, watches the impulse the
//! joint applies each tick, and stops the joint from constraining anything
//! once a limit is exceeded. Breaking is one-way; a broken joint stays
//! inert until it is destroyed.

use crate::bodies::RigidBody;
use crate::constraints::joint::{Joint, SolveImpulse};
use crate::constraints::params::{BreakableParams, UNBREAKABLE_LIMIT};
use crate::core::BodyStorage;

/// A joint wrapped with force/torque break limits
#[derive(Debug, Clone)]
pub struct BreakableJoint {
    /// The real constrained joint
    joint: Joint,

    /// Linear force above which the joint breaks
    linear_limit: f32,

    /// Torque above which the joint breaks
    angular_limit: f32,

    /// Whether the joint has broken
    broken: bool,

    /// Linear impulse accumulated over the current tick
    accumulated_linear: f32,

    /// Angular impulse accumulated over the current tick
    accumulated_angular: f32,
}

impl BreakableJoint {
    /// Wraps a joint with the given breakable limits. Zero limits fall back
    /// to the unbreakable sentinel; the mass scales transfer to the joint.
    pub fn new(mut joint: Joint, params: &BreakableParams) -> Self {
        joint.mass_scale = [
            if params.body_mass_scale[0] > 0.0 {
                params.body_mass_scale[0]
            } else {
                1.0
            },
            if params.body_mass_scale[1] > 0.0 {
                params.body_mass_scale[1]
            } else {
                1.0
            },
        ];

        Self {
            joint,
            linear_limit: if params.force_limit > 0.0 {
                params.force_limit
            } else {
                UNBREAKABLE_LIMIT
            },
            angular_limit: if params.torque_limit > 0.0 {
                params.torque_limit
            } else {
                UNBREAKABLE_LIMIT
            },
            broken: false,
            accumulated_linear: 0.0,
            accumulated_angular: 0.0,
        }
    }

    /// The wrapped joint
    pub fn real_joint(&self) -> &Joint {
        &self.joint
    }

    /// The wrapped joint, mutable
    pub fn real_joint_mut(&mut self) -> &mut Joint {
        &mut self.joint
    }

    /// Whether the joint has exceeded a limit and stopped constraining
    pub fn is_broken(&self) -> bool {
        self.broken
    }

    /// The configured linear force limit
    pub fn force_limit(&self) -> f32 {
        self.linear_limit
    }

    /// The configured torque limit
    pub fn torque_limit(&self) -> f32 {
        self.angular_limit
    }

    /// Resets the per-tick impulse accounting
    pub fn begin_tick(&mut self) {
        self.accumulated_linear = 0.0;
        self.accumulated_angular = 0.0;
        self.joint.begin_tick();
    }

    /// Velocity solve, accumulating the applied impulses. A broken joint
    /// does nothing.
    pub fn solve_velocity(&mut self, dt: f32, bodies: &mut BodyStorage<RigidBody>) -> SolveImpulse {
        if self.broken {
            return SolveImpulse::default();
        }
        let applied = self.joint.solve_velocity(dt, bodies);
        self.accumulated_linear += applied.linear;
        self.accumulated_angular += applied.angular;
        applied
    }

    /// Position solve; a broken joint reports no error
    pub fn solve_position(&mut self, dt: f32, bodies: &mut BodyStorage<RigidBody>) -> f32 {
        if self.broken {
            return 0.0;
        }
        self.joint.solve_position(dt, bodies)
    }

    /// Compares the tick's accumulated impulse against the limits: a force
    /// limit breaks once the equivalent force was sustained for the whole
    /// solve interval. Returns true when the joint breaks on this call.
    pub fn end_tick(&mut self, dt: f32) -> bool {
        if self.broken {
            return false;
        }
        if self.accumulated_linear > self.linear_limit * dt
            || self.accumulated_angular > self.angular_limit * dt
        {
            self.broken = true;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::joint::{JointKind, LengthJoint};
    use crate::core::BodyHandle;
    use crate::math::Vector3;

    fn test_joint() -> Joint {
        Joint::new(
            BodyHandle(1),
            BodyHandle(2),
            1.0,
            JointKind::Length(LengthJoint {
                anchor_a: Vector3::zero(),
                anchor_b: Vector3::zero(),
                total_length: 1.0,
                min_length: 0.0,
            }),
        )
    }

    #[test]
    fn test_zero_limits_fall_back_to_unbreakable() {
        let params = BreakableParams::default();
        let breakable = BreakableJoint::new(test_joint(), &params);
        assert_eq!(breakable.force_limit(), UNBREAKABLE_LIMIT);
        assert_eq!(breakable.torque_limit(), UNBREAKABLE_LIMIT);
    }

    #[test]
    fn test_break_threshold_is_exact() {
        let params = BreakableParams {
            force_limit: 100.0,
            ..BreakableParams::default()
        };
        let dt = 0.01;

        // 99% of the limit does not break.
        let mut breakable = BreakableJoint::new(test_joint(), &params);
        breakable.begin_tick();
        breakable.accumulated_linear = 99.0 * dt;
        assert!(!breakable.end_tick(dt));
        assert!(!breakable.is_broken());

        // Just over the limit breaks, exactly once.
        breakable.begin_tick();
        breakable.accumulated_linear = 101.0 * dt;
        assert!(breakable.end_tick(dt));
        assert!(breakable.is_broken());
        assert!(!breakable.end_tick(dt));
    }

    #[test]
    fn test_mass_scale_transfers_to_joint() {
        let params = BreakableParams {
            body_mass_scale: [2.0, 0.0],
            ..BreakableParams::default()
        };
        let breakable = BreakableJoint::new(test_joint(), &params);
        assert_eq!(breakable.real_joint().mass_scale, [2.0, 1.0]);
    }
}
