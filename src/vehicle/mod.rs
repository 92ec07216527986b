//! Vehicle controllers built on the raycast suspension model.
//!
//! [`WheeledVehicleController`] drives a car-style chassis with an
//! engine/transmission model; [`AirboatController`] drives a buoyant craft
//! with turbine thrust and attitude stabilizers. Both are invoked once per
//! simulation tick and apply impulses to the chassis body; neither owns the
//! body or performs integration.

pub mod params;
mod airboat;
mod wheeled;

pub use airboat::{AirboatController, AirboatControllerTemplate};
pub use params::{
    AxleParams, BodyParams, EngineParams, SteeringParams, SuspensionParams, VehicleParams,
    WheelParams,
};
pub use wheeled::{VehicleControllerTemplate, WheeledVehicleController};

use bitflags::bitflags;

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// Driver inputs for one simulation tick
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct ControlInput {
    /// Throttle in [-1, 1]; negative is reverse
    pub throttle: f32,

    /// Brake pressure in [0, 1]
    pub brake: f32,

    /// Whether the handbrake is pulled
    pub handbrake: bool,

    /// Left-only handbrake (powerslide)
    pub handbrake_left: bool,

    /// Right-only handbrake (powerslide)
    pub handbrake_right: bool,

    /// Steering in [-1, 1]; negative steers left
    pub steering: f32,

    /// Whether steering comes from an analog stick (direct mapping)
    /// rather than digital keys (integrated over time)
    pub analog_steering: bool,

    /// Whether the boost button is held
    pub boost: bool,
}

/// A pure data snapshot of the vehicle state for HUD/telemetry consumers
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct OperatingParams {
    /// Signed forward speed in game units per second
    pub speed: f32,

    /// Estimated engine RPM
    pub engine_rpm: f32,

    /// Current gear index (0-based)
    pub gear: usize,

    /// Seconds until the booster can fire again
    pub boost_delay: f32,

    /// Booster recharge as a percentage [0, 100]
    pub boost_time_left: i32,

    /// Speed of the fastest skidding wheel surface, 0 when not skidding
    pub skid_speed: f32,

    /// Surface id under the fastest skidding wheel
    pub skid_surface_id: u32,

    /// Current steering angle in degrees
    pub steering_angle: f32,

    /// Number of wheels with a surface contact this tick
    pub wheels_in_contact: usize,

    /// Number of wheels without a surface contact this tick
    pub wheels_not_in_contact: usize,

    /// Whether the engine torque boost is active
    pub is_torque_boosting: bool,
}

bitflags! {
    /// Internal controller state flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct VehicleFlags: u32 {
        /// Wheel torque has been zeroed since the last throttle release
        const THROTTLE_STOPPED = 1 << 0;
        /// The handbrake lock is currently applied to the wheels
        const HANDBRAKE_ON = 1 << 1;
    }
}

/// Which tire material set the wheels currently present, reported to the
/// environment for skid-mark rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum TireType {
    Normal,
    Braking,
    Powerslide,
}
