//! The nested tuning configuration for a wheeled vehicle. Positions and
//! lengths are authored in game units; speeds on [`EngineParams`] are
//! authored in miles per hour and converted to game units per second by
//! [`VehicleParams::data_reload`] before simulation.

use crate::math::Vector3;
use crate::units::{self, UnitScale};

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// Maximum number of axles a vehicle supports
pub const MAX_AXLE_COUNT: usize = 4;

/// Maximum number of gears in a transmission
pub const MAX_GEAR_COUNT: usize = 10;

/// Chassis-level tuning
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct BodyParams {
    /// Extra gravity applied to the chassis, as a multiple of world gravity
    pub add_gravity: f32,

    /// Share of drive torque reflected back into the chassis as reaction
    /// torque, rocking it under throttle (0 disables)
    pub counter_torque_factor: f32,

    /// Ceiling on the chassis angular speed, radians per second
    /// (0 disables the clamp)
    pub max_angular_velocity: f32,

    /// Downward force applied while the chassis is roughly upright, as a
    /// multiple of chassis weight
    pub tilt_force: f32,

    /// Height above the mass center at which the tilt force acts, game units
    pub tilt_force_height: f32,
}

impl Default for BodyParams {
    fn default() -> Self {
        Self {
            add_gravity: 0.0,
            counter_torque_factor: 0.0,
            max_angular_velocity: 0.0,
            tilt_force: 1.0,
            tilt_force_height: 0.0,
        }
    }
}

/// Per-wheel tuning
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct WheelParams {
    /// Wheel radius, game units
    pub radius: f32,

    /// Wheel mass
    pub mass: f32,

    /// Wheel spin inertia
    pub inertia: f32,

    /// Linear damping on the wheel
    pub damping: f32,

    /// Rotational damping on the wheel
    pub rot_damping: f32,

    /// Multiplier on surface friction under this wheel
    pub friction_scale: f32,

    /// Material the wheel presents normally
    pub material_index: i32,

    /// Material while braking hard (-1 keeps the normal material)
    pub brake_material_index: i32,

    /// Material while powersliding (-1 keeps the normal material)
    pub skid_material_index: i32,

    /// Additional suspension travel beyond the rest length, game units
    pub spring_additional_length: f32,
}

impl Default for WheelParams {
    fn default() -> Self {
        Self {
            radius: 15.0,
            mass: 50.0,
            inertia: 2.0,
            damping: 0.0,
            rot_damping: 0.0,
            friction_scale: 1.0,
            material_index: 0,
            brake_material_index: -1,
            skid_material_index: -1,
            spring_additional_length: 0.0,
        }
    }
}

/// Per-axle suspension tuning. Spring constants are authored
/// mass-independent and scaled by the chassis mass at controller setup.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct SuspensionParams {
    /// Spring constant
    pub spring_constant: f32,

    /// Damping while the spring extends
    pub spring_damping: f32,

    /// Damping while the spring compresses
    pub spring_damping_compression: f32,

    /// Anti-sway stabilizer constant
    pub stabilizer_constant: f32,

    /// Ceiling on the force the suspension can put into the chassis
    pub max_body_force: f32,
}

impl Default for SuspensionParams {
    fn default() -> Self {
        Self {
            spring_constant: 30.0,
            spring_damping: 2.0,
            spring_damping_compression: 4.0,
            stabilizer_constant: 0.0,
            max_body_force: 0.0,
        }
    }
}

/// One axle: placement, its wheels, suspension and drive distribution
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct AxleParams {
    /// Axle center offset from the chassis origin, game units
    pub offset: Vector3,

    /// Offset from the axle center to each wheel (mirrored per side)
    pub wheel_offset: Vector3,

    /// Raycast origin offset from the chassis origin
    pub raytrace_center_offset: Vector3,

    /// Offset from the raycast center to each wheel's ray (mirrored)
    pub raytrace_offset: Vector3,

    /// Wheel tuning shared by both wheels on the axle
    pub wheels: WheelParams,

    /// Suspension tuning shared by both wheels on the axle
    pub suspension: SuspensionParams,

    /// Share of engine torque routed to this axle; shares are normalized
    /// so they sum to one
    pub torque_factor: f32,

    /// Share of brake torque routed to this axle
    pub brake_factor: f32,
}

impl Default for AxleParams {
    fn default() -> Self {
        Self {
            offset: Vector3::zero(),
            wheel_offset: Vector3::zero(),
            raytrace_center_offset: Vector3::zero(),
            raytrace_offset: Vector3::zero(),
            wheels: WheelParams::default(),
            suspension: SuspensionParams::default(),
            torque_factor: 0.5,
            brake_factor: 0.5,
        }
    }
}

/// Engine and transmission tuning
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct EngineParams {
    /// Engine power, horsepower
    pub horsepower: f32,

    /// Rated top speed. Authored in mph; game units per second after
    /// [`VehicleParams::data_reload`]
    pub max_speed: f32,

    /// Top reverse speed, same units as `max_speed`
    pub max_rev_speed: f32,

    /// Top speed while boosting, same units as `max_speed`
    pub boost_max_speed: f32,

    /// RPM at which engine torque drops to zero
    pub max_rpm: f32,

    /// Final drive ratio
    pub axle_ratio: f32,

    /// Whether the transmission shifts automatically
    pub is_auto_transmission: bool,

    /// Number of gears in use (at most `gear_ratios.len()`)
    pub gear_count: usize,

    /// Gear ratios, first gear first
    pub gear_ratios: Vec<f32>,

    /// Estimated RPM above which the transmission shifts up
    pub shift_up_rpm: f32,

    /// Estimated RPM below which the transmission shifts down
    pub shift_down_rpm: f32,

    /// Boost force (torque multiplier when `torque_boost` is set)
    pub boost_force: f32,

    /// Seconds a boost lasts
    pub boost_duration: f32,

    /// Seconds after a boost before the next can fire
    pub boost_delay: f32,

    /// Speed ratio past the governed top speed at which automatic braking
    /// engages
    pub autobrake_speed_gain: f32,

    /// Braking strength of the automatic speed governor
    pub autobrake_speed_factor: f32,

    /// Whether boost multiplies engine torque instead of pushing the body
    pub torque_boost: bool,
}

impl Default for EngineParams {
    fn default() -> Self {
        Self {
            horsepower: 300.0,
            max_speed: 50.0,
            max_rev_speed: 20.0,
            boost_max_speed: 70.0,
            max_rpm: 6000.0,
            axle_ratio: 3.5,
            is_auto_transmission: true,
            gear_count: 4,
            gear_ratios: vec![2.8, 1.9, 1.4, 1.0],
            shift_up_rpm: 4500.0,
            shift_down_rpm: 1500.0,
            boost_force: 2.0,
            boost_duration: 2.0,
            boost_delay: 5.0,
            autobrake_speed_gain: 1.0,
            autobrake_speed_factor: 2.0,
            torque_boost: true,
        }
    }
}

/// Steering-curve tuning
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct SteeringParams {
    /// Steering degrees at and below `speed_slow`
    pub degrees_slow: f32,

    /// Steering degrees at and above `speed_fast`
    pub degrees_fast: f32,

    /// Steering degrees at the boosted top speed
    pub degrees_boost: f32,

    /// Speed bounds for the slow/fast blend, mph
    pub speed_slow: f32,
    pub speed_fast: f32,

    /// Exponent applied to the steering input for non-linear response
    /// (0 keeps the input linear)
    pub steering_exponent: f32,

    /// Lateral acceleration of the powerslide push, game units per
    /// second squared
    pub power_slide_accel: f32,

    /// Whether this vehicle is allowed to skid (tire switching, skid
    /// readback)
    pub is_skid_allowed: bool,

    /// Whether the vehicle kicks up dust clouds (passed through to the
    /// environment)
    pub dust_cloud: bool,
}

impl Default for SteeringParams {
    fn default() -> Self {
        Self {
            degrees_slow: 50.0,
            degrees_fast: 18.0,
            degrees_boost: 10.0,
            speed_slow: 12.5,
            speed_fast: 37.5,
            steering_exponent: 0.0,
            power_slide_accel: 200.0,
            is_skid_allowed: true,
            dust_cloud: false,
        }
    }
}

/// The complete vehicle tuning tree
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct VehicleParams {
    /// Number of axles in use
    pub axle_count: usize,

    /// Wheels per axle (2 for every shipped vehicle)
    pub wheels_per_axle: usize,

    /// Chassis tuning
    pub body: BodyParams,

    /// Per-axle tuning
    pub axles: Vec<AxleParams>,

    /// Engine and transmission tuning
    pub engine: EngineParams,

    /// Steering tuning
    pub steering: SteeringParams,
}

impl Default for VehicleParams {
    fn default() -> Self {
        Self {
            axle_count: 2,
            wheels_per_axle: 2,
            body: BodyParams::default(),
            axles: vec![AxleParams::default(), AxleParams::default()],
            engine: EngineParams::default(),
            steering: SteeringParams::default(),
        }
    }
}

impl VehicleParams {
    /// Converts the mph-authored engine speeds to game units per second.
    /// Called once when a controller takes ownership of the params; speeds
    /// are compared against the chassis speed readback during simulation.
    pub fn data_reload(&mut self, scale: &UnitScale) {
        self.engine.max_speed = units::speed_mph_to_game(self.engine.max_speed, scale);
        self.engine.max_rev_speed = units::speed_mph_to_game(self.engine.max_rev_speed, scale);
        self.engine.boost_max_speed = units::speed_mph_to_game(self.engine.boost_max_speed, scale);
    }

    /// Returns the normalization factor that makes the axle torque factors
    /// sum to one
    pub fn torque_scale(&self) -> f32 {
        let total: f32 = self.axles[..self.axle_count.min(self.axles.len())]
            .iter()
            .map(|axle| axle.torque_factor)
            .sum();
        if total > 0.0 {
            1.0 / total
        } else {
            1.0
        }
    }
}
