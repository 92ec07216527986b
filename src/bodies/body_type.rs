#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// The motion type of a rigid body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum RigidBodyType {
    /// A fully simulated body, moved by impulses
    Dynamic,

    /// An immovable body (terrain, anchors)
    Static,
}
