pub mod storage;
pub mod events;

pub use self::events::{BodyEvent, ConstraintEvent, EventQueue, PhysicsEvent, VehicleEvent};
pub use self::storage::{BodyStorage, ConstraintStorage, GroupStorage, Storage};

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// A unique identifier for a body in the physics environment.
///
/// Ids are never reused, so a stored handle acts as a weak reference: once
/// the body is removed the handle can never alias a newer body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct BodyHandle(pub(crate) u32);

/// A unique identifier for a constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct ConstraintHandle(pub(crate) u32);

/// A unique identifier for a constraint group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct GroupHandle(pub(crate) u32);
