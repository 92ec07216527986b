//! Immutable parameter blocks for constraint construction. A block is
//! passed by value to a factory on [`crate::constraints::ConstraintSet`];
//! a fully-formed constraint comes back or an error does — no partially
//! constructed joint is ever observable.
//!
//! Angles are authored in degrees, positions in the sim frame (meters).

use crate::math::{Transform, Vector3};

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// Force/torque limits at or above this value never break
pub const UNBREAKABLE_LIMIT: f32 = 1e12;

/// Breakable-limit block shared by every joint kind
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct BreakableParams {
    /// Solver strength (tau) in (0, 1]
    pub strength: f32,

    /// Linear force above which the joint breaks; 0 means unbreakable
    pub force_limit: f32,

    /// Torque above which the joint breaks; 0 means unbreakable
    pub torque_limit: f32,

    /// Mass scale applied to the (reference, attached) bodies while
    /// solving this joint
    pub body_mass_scale: [f32; 2],

    /// Whether the owning group starts active
    pub is_active: bool,
}

impl Default for BreakableParams {
    fn default() -> Self {
        Self {
            strength: 1.0,
            force_limit: 0.0,
            torque_limit: 0.0,
            body_mass_scale: [1.0, 1.0],
            is_active: true,
        }
    }
}

impl BreakableParams {
    /// Whether these limits call for the breakable decorator: a finite
    /// nonzero limit below the unbreakable sentinel, or a mass scale that
    /// is neither unset (0) nor neutral (1)
    pub fn is_breakable(&self) -> bool {
        (self.force_limit != 0.0 && self.force_limit < UNBREAKABLE_LIMIT)
            || (self.torque_limit != 0.0 && self.torque_limit < UNBREAKABLE_LIMIT)
            || (self.body_mass_scale[0] != 1.0 && self.body_mass_scale[0] != 0.0)
            || (self.body_mass_scale[1] != 1.0 && self.body_mass_scale[1] != 0.0)
    }
}

/// Rotation limit and drive for one joint axis
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct AxisLimit {
    /// Minimum rotation, degrees. Equal min and max means the axis is
    /// locked (degenerate).
    pub min_rotation: f32,

    /// Maximum rotation, degrees
    pub max_rotation: f32,

    /// Motor target angular velocity, degrees per second
    pub angular_velocity: f32,

    /// Motor/friction torque budget
    pub torque: f32,
}

impl AxisLimit {
    /// Whether this axis allows any rotation
    pub fn is_free(&self) -> bool {
        self.min_rotation != self.max_rotation
    }
}

/// Welds the attached body to the reference body
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct FixedParams {
    /// Attached body's frame expressed in the reference body's space
    pub attached_ref_xform: Transform,

    /// Breakable limits
    pub constraint: BreakableParams,
}

impl Default for FixedParams {
    fn default() -> Self {
        Self {
            attached_ref_xform: Transform::identity(),
            constraint: BreakableParams::default(),
        }
    }
}

/// Single-axis rotation joint
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct HingeParams {
    /// Hinge pivot in world space at construction time
    pub world_position: Vector3,

    /// Hinge axis in world space at construction time
    pub world_axis_direction: Vector3,

    /// Axis perpendicular to the hinge axis, in reference body space;
    /// defines the zero angle
    pub reference_perp_axis: Vector3,

    /// The same perpendicular expressed in attached body space
    pub attached_perp_axis: Vector3,

    /// Limit and motor for the hinge axis
    pub hinge_axis: AxisLimit,

    /// Breakable limits
    pub constraint: BreakableParams,
}

impl Default for HingeParams {
    fn default() -> Self {
        Self {
            world_position: Vector3::zero(),
            world_axis_direction: Vector3::unit_y(),
            reference_perp_axis: Vector3::unit_x(),
            attached_perp_axis: Vector3::unit_x(),
            hinge_axis: AxisLimit::default(),
            constraint: BreakableParams::default(),
        }
    }
}

/// Pins a point on each body together, leaving rotation free
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct BallSocketParams {
    /// Socket position in each body's local space (reference, attached)
    pub constraint_position: [Vector3; 2],

    /// Breakable limits
    pub constraint: BreakableParams,
}

impl Default for BallSocketParams {
    fn default() -> Self {
        Self {
            constraint_position: [Vector3::zero(); 2],
            constraint: BreakableParams::default(),
        }
    }
}

/// Lets the attached body slide along one axis of the reference body
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct SlidingParams {
    /// Attached body's frame expressed in the reference body's space
    pub attached_ref_xform: Transform,

    /// Slide axis in reference body space
    pub slide_axis_ref: Vector3,

    /// Travel limits along the axis, meters. Equal limits disable them.
    pub limit_min: f32,
    pub limit_max: f32,

    /// Friction force along the axis (also the motor force budget)
    pub friction: f32,

    /// Motor target velocity along the axis, m/s
    pub velocity: f32,

    /// Breakable limits
    pub constraint: BreakableParams,
}

impl Default for SlidingParams {
    fn default() -> Self {
        Self {
            attached_ref_xform: Transform::identity(),
            slide_axis_ref: Vector3::unit_z(),
            limit_min: 0.0,
            limit_max: 0.0,
            friction: 0.0,
            velocity: 0.0,
            constraint: BreakableParams::default(),
        }
    }
}

/// Two bodies hanging from a rope over two pulley points
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct PulleyParams {
    /// Pulley anchor points in world space
    pub pulley_position: [Vector3; 2],

    /// Rope attachment on each body, local space
    pub object_position: [Vector3; 2],

    /// Total rope length: |a to pulley a| + gear_ratio * |b to pulley b|
    pub total_length: f32,

    /// Mechanical advantage of the second side
    pub gear_ratio: f32,

    /// Whether the rope also resists going slack
    pub is_rigid: bool,

    /// Breakable limits
    pub constraint: BreakableParams,
}

impl Default for PulleyParams {
    fn default() -> Self {
        Self {
            pulley_position: [Vector3::zero(); 2],
            object_position: [Vector3::zero(); 2],
            total_length: 1.0,
            gear_ratio: 1.0,
            is_rigid: false,
            constraint: BreakableParams::default(),
        }
    }
}

/// Keeps two anchor points within a length band (a rope)
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct LengthParams {
    /// Rope attachment on each body, local space
    pub object_position: [Vector3; 2],

    /// Maximum distance between the anchors
    pub total_length: f32,

    /// Minimum distance between the anchors (0 disables)
    pub min_length: f32,

    /// Breakable limits
    pub constraint: BreakableParams,
}

impl Default for LengthParams {
    fn default() -> Self {
        Self {
            object_position: [Vector3::zero(); 2],
            total_length: 1.0,
            min_length: 0.0,
            constraint: BreakableParams::default(),
        }
    }
}

/// Three-axis limited joint for ragdoll limbs
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct RagdollParams {
    /// Joint frame expressed in the reference body's space
    pub constraint_to_reference: Transform,

    /// Joint frame expressed in the attached body's space
    pub constraint_to_attached: Transform,

    /// Per-axis rotation limits and drives (x, y, z of the joint frame)
    pub axes: [AxisLimit; 3],

    /// Skip the translation lock and constrain rotation only
    pub only_angular_limits: bool,

    /// Whether the authored limits use clockwise-positive rotations
    pub use_clockwise_rotations: bool,

    /// Breakable limits
    pub constraint: BreakableParams,
}

impl Default for RagdollParams {
    fn default() -> Self {
        Self {
            constraint_to_reference: Transform::identity(),
            constraint_to_attached: Transform::identity(),
            axes: [AxisLimit::default(); 3],
            only_angular_limits: false,
            use_clockwise_rotations: false,
            constraint: BreakableParams::default(),
        }
    }
}

/// Shared solver settings for a constraint group
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct GroupParams {
    /// Extra solver iterations on top of the set's base count
    pub additional_iterations: u32,

    /// Consecutive over-tolerance ticks before the group flags an error
    pub min_error_ticks: u32,

    /// Position error tolerance, meters
    pub error_tolerance: f32,
}

impl Default for GroupParams {
    fn default() -> Self {
        Self {
            additional_iterations: 0,
            min_error_ticks: 15,
            error_tolerance: 0.08,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_breakable_predicate() {
        let mut params = BreakableParams::default();
        assert!(!params.is_breakable());

        params.force_limit = 100.0;
        assert!(params.is_breakable());

        params.force_limit = UNBREAKABLE_LIMIT;
        assert!(!params.is_breakable());

        params.torque_limit = 50.0;
        assert!(params.is_breakable());

        params.torque_limit = 0.0;
        params.body_mass_scale = [2.0, 1.0];
        assert!(params.is_breakable());

        // Zero mass scale means "unset", not "breakable".
        params.body_mass_scale = [0.0, 0.0];
        assert!(!params.is_breakable());
    }

    #[test]
    fn test_axis_limit_degenerate() {
        let mut axis = AxisLimit::default();
        assert!(!axis.is_free());
        axis.min_rotation = -30.0;
        axis.max_rotation = 45.0;
        assert!(axis.is_free());
    }
}
