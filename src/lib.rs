pub mod math;
pub mod units;
pub mod core;
pub mod bodies;
pub mod trace;
pub mod suspension;
pub mod vehicle;
pub mod constraints;

/// Re-export common types for easier usage
pub use crate::bodies::{RigidBody, RigidBodyType};
pub use crate::constraints::{Constraint, ConstraintGroup, ConstraintSet};
pub use crate::core::{BodyHandle, BodyStorage, ConstraintHandle, EventQueue};
pub use crate::math::Vector3;
pub use crate::units::UnitScale;
pub use crate::vehicle::{AirboatController, ControlInput, OperatingParams, WheeledVehicleController};

/// Error types for the vehicle physics layer
pub mod error {
    use thiserror::Error;

    #[derive(Error, Debug)]
    pub enum PhysicsError {
        #[error("Invalid parameter: {0}")]
        InvalidParameter(String),

        #[error("Resource not found: {0}")]
        ResourceNotFound(String),

        #[error("Simulation stability error: {0}")]
        SimulationError(String),

        #[error("Internal error: {0}")]
        InternalError(String),
    }
}

/// Result type for physics operations
pub type Result<T> = std::result::Result<T, error::PhysicsError>;

/// Engine version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
