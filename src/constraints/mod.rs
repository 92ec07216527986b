//! Typed, groupable, optionally breakable joints between rigid bodies.
//!
//! Joints are built from immutable parameter blocks through the factory
//! methods on [`ConstraintSet`]. A joint whose breakable block carries a
//! finite limit is wrapped in the breakable decorator; everything else is
//! rigid. Both are reached uniformly through `real_joint`.

pub mod params;
mod breakable;
mod constraint;
mod group;
mod joint;

pub use breakable::BreakableJoint;
pub use constraint::{
    Constraint, ConstraintKind, ConstraintSet, ConstraintSnapshot, ConstraintTemplate,
    GroupSnapshot,
};
pub use group::ConstraintGroup;
pub use joint::{Joint, JointKind, SolveImpulse};
pub use params::{
    AxisLimit, BallSocketParams, BreakableParams, FixedParams, GroupParams, HingeParams,
    LengthParams, PulleyParams, RagdollParams, SlidingParams, UNBREAKABLE_LIMIT,
};
