mod body_type;
mod rigid_body;

pub use body_type::RigidBodyType;
pub use rigid_body::{RigidBody, RigidBodyHandle};
