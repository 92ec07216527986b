//! Wheeled-vehicle controller: engine, transmission, steering, brakes and
//! the per-wheel ground forces, all built on the raycast suspension.
//!
//! The controller references the chassis by handle and is ticked once per
//! simulation step with the driver's control inputs. All physical effects
//! are impulses applied to the chassis; the wheels themselves are virtual.

use crate::bodies::RigidBody;
use crate::core::{BodyHandle, EventQueue, VehicleEvent};
use crate::error::PhysicsError;
use crate::math::{clamp, remap_clamped, to_radians, Vector3};
use crate::suspension::{
    cast_wheels, ground_spring_impulse, Axle, CastMode, Impact, WheelPoint, MAX_WHEEL_COUNT,
};
use crate::trace::SurfaceTrace;
use crate::units::{self, UnitScale};
use crate::vehicle::params::{VehicleParams, MAX_AXLE_COUNT};
use crate::vehicle::{ControlInput, OperatingParams, TireType, VehicleFlags};
use crate::Result;

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// Speed below which opposing throttle no longer auto-handbrakes,
/// game units per second
const THROTTLE_OPPOSING_FORCE_EPSILON: f32 = 5.0;

/// Wheel surface speeds below this are not skidding
const VEHICLE_SKID_EPSILON: f32 = 0.1;

/// Speed (mph) above which a pulled handbrake becomes a powerslide
const POWERSLIDE_MIN_SPEED_MPH: f32 = 18.0;

/// Locked wheels at or above this speed always register as skidding,
/// game units per second
const LOCKED_WHEEL_SKID_SPEED: f32 = 30.0;

const WATT_PER_HP: f32 = 745.0;
const SECONDS_PER_MINUTE: f32 = 60.0;

/// Fraction of lateral slip the tires cancel per second at friction 1.0
const TIRE_GRIP_PER_SECOND: f32 = 8.0;

/// Standard gravity used for brake force and drag scaling, m/s^2
const GRAVITY: f32 = 9.81;

/// Booster timer: one boost runs for its duration, then the whole
/// duration + delay window must expire before the next one
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
struct BoosterState {
    /// Body force of the active boost (0 for torque boosts)
    force: f32,

    /// Seconds of boost remaining
    time_to_go: f32,

    /// Seconds until the booster can fire again
    delay: f32,
}

impl BoosterState {
    fn activate(&mut self, force: f32, duration: f32, delay: f32) {
        if self.delay <= 0.0 && self.time_to_go <= 0.0 {
            self.force = force;
            self.time_to_go = duration;
            self.delay = duration + delay;
        }
    }

    fn update(&mut self, dt: f32) {
        if self.time_to_go > 0.0 {
            self.time_to_go = (self.time_to_go - dt).max(0.0);
        }
        if self.delay > 0.0 {
            self.delay = (self.delay - dt).max(0.0);
        }
    }

    fn is_boosting(&self) -> bool {
        self.time_to_go > 0.0
    }
}

/// Flat snapshot of a controller, sufficient to rebuild identical runtime
/// state. Body references are carried as handles and re-attached by
/// identity on restore.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct VehicleControllerTemplate {
    pub chassis: BodyHandle,
    pub params: VehicleParams,
    pub state: OperatingParams,
    /// Raw [`VehicleFlags`] bits
    pub flags: u32,
    pub tire_type: TireType,
    pub occupied: bool,
    pub engine_disabled: bool,
    pub body_mass: f32,
    pub total_wheel_mass: f32,
    pub gravity_length: f32,
    pub torque_scale: f32,
    /// Wheel hard points in game space
    pub wheel_positions: Vec<Vector3>,
    /// Raycast origins in game space
    pub trace_positions: Vec<Vector3>,
    /// Chassis velocity snapshot
    pub velocity: Vector3,
}

/// Raycast car simulation with an automatic transmission
pub struct WheeledVehicleController {
    /// The chassis body this controller drives
    chassis: BodyHandle,

    /// Vehicle tuning; engine speeds already converted to game units/s
    params: VehicleParams,

    /// Unit scale for readbacks and parameter conversion
    scale: UnitScale,

    /// Virtual wheels, axle by axle
    wheels: Vec<WheelPoint>,

    /// Axle grouping with stabilizer/torque/brake distribution
    axles: Vec<Axle>,

    /// Live operating state, also the HUD readback
    state: OperatingParams,

    /// Controller state flags
    flags: VehicleFlags,

    /// Tire material currently presented
    tire_type: TireType,

    /// Whether a driver is in the vehicle
    occupied: bool,

    /// Whether engine force is suppressed
    engine_disabled: bool,

    /// Normalization factor for the axle torque shares
    torque_scale: f32,

    /// Chassis mass at setup
    body_mass: f32,

    /// Combined mass of all wheels
    total_wheel_mass: f32,

    /// Largest wheel radius, meters
    wheel_radius: f32,

    /// Gravity magnitude used for brake scaling
    gravity_length: f32,

    /// Boost timer
    booster: BoosterState,

    /// Powerslide lateral accelerations (front, rear), m/s^2,
    /// positive pushes left
    powerslide_accel: (f32, f32),

    /// Impacts of the most recent tick
    impacts: Vec<Impact>,
}

impl WheeledVehicleController {
    /// Creates a controller for a chassis. Invalid configurations (too many
    /// axles or wheels, gear table shorter than the gear count) are
    /// rejected here, never discovered mid-simulation.
    pub fn new(
        chassis: BodyHandle,
        mut params: VehicleParams,
        body_mass: f32,
        scale: UnitScale,
    ) -> Result<Self> {
        if params.axle_count == 0 || params.axle_count > MAX_AXLE_COUNT {
            return Err(PhysicsError::InvalidParameter(format!(
                "axle count {} out of range [1, {MAX_AXLE_COUNT}]",
                params.axle_count
            )));
        }
        if params.axles.len() < params.axle_count {
            return Err(PhysicsError::InvalidParameter(
                "fewer axle params than axle_count".to_string(),
            ));
        }
        let wheel_count = params.axle_count * params.wheels_per_axle;
        if wheel_count == 0 || wheel_count > MAX_WHEEL_COUNT {
            return Err(PhysicsError::InvalidParameter(format!(
                "wheel count {wheel_count} out of range [1, {MAX_WHEEL_COUNT}]"
            )));
        }
        if params.engine.gear_count == 0
            || params.engine.gear_count > params.engine.gear_ratios.len()
        {
            return Err(PhysicsError::InvalidParameter(format!(
                "gear count {} exceeds the gear ratio table ({})",
                params.engine.gear_count,
                params.engine.gear_ratios.len()
            )));
        }

        params.data_reload(&scale);
        let torque_scale = params.torque_scale();

        let mut controller = Self {
            chassis,
            params,
            scale,
            wheels: Vec::new(),
            axles: Vec::new(),
            state: OperatingParams::default(),
            flags: VehicleFlags::empty(),
            tire_type: TireType::Normal,
            occupied: false,
            engine_disabled: false,
            torque_scale,
            body_mass,
            total_wheel_mass: 0.0,
            wheel_radius: 0.0,
            gravity_length: GRAVITY,
            booster: BoosterState::default(),
            powerslide_accel: (0.0, 0.0),
            impacts: Vec::new(),
        };
        controller.init_wheels();
        Ok(controller)
    }

    /// Builds the wheel points and axle records from the axle params
    fn init_wheels(&mut self) {
        self.wheels.clear();
        self.axles.clear();
        self.total_wheel_mass = 0.0;
        self.wheel_radius = 0.0;

        let total_max_speed = self
            .params
            .engine
            .boost_max_speed
            .max(self.params.engine.max_speed);

        for (axle_index, axle) in self.params.axles[..self.params.axle_count]
            .iter()
            .enumerate()
        {
            let radius = units::distance_to_sim(axle.wheels.radius, &self.scale);
            // Suspension travel: wheel radius plus any authored extra length.
            let travel = radius
                + units::distance_to_sim(axle.wheels.spring_additional_length, &self.scale);

            for side in 0..self.params.wheels_per_axle {
                let mirror = if side & 1 == 1 { 1.0 } else { -1.0 };
                let hard_game = axle.offset + axle.wheel_offset * mirror;
                let trace_game = axle.raytrace_center_offset + axle.raytrace_offset * mirror;

                let mut wheel = WheelPoint::new(
                    units::position_to_sim(hard_game, &self.scale),
                    units::position_to_sim(trace_game, &self.scale),
                    radius,
                );
                wheel.raycast_length = travel.max(0.0);
                wheel.spring_rest_length = travel.max(0.0);
                wheel.spring_constant = axle.suspension.spring_constant * self.body_mass;
                wheel.spring_damp_relax = axle.suspension.spring_damping * self.body_mass;
                wheel.spring_damp_compress =
                    axle.suspension.spring_damping_compression * self.body_mass;
                wheel.friction = axle.wheels.friction_scale;
                // Spin ceiling in radians per second at the boosted top speed.
                let max_speed_sim = units::distance_to_sim(total_max_speed, &self.scale);
                wheel.max_rotation_speed = max_speed_sim / radius.max(crate::math::EPSILON);
                self.wheels.push(wheel);
                self.total_wheel_mass += axle.wheels.mass;
            }

            self.axles.push(Axle {
                first_wheel: axle_index * self.params.wheels_per_axle,
                wheel_count: self.params.wheels_per_axle,
                stabilizer_constant: axle.suspension.stabilizer_constant * self.body_mass,
                torque_factor: axle.torque_factor,
                brake_factor: axle.brake_factor,
            });

            if radius > self.wheel_radius {
                self.wheel_radius = radius;
            }
        }
    }

    /// The chassis body this controller drives
    pub fn chassis(&self) -> BodyHandle {
        self.chassis
    }

    /// The HUD/telemetry snapshot for this tick
    pub fn operating_params(&self) -> OperatingParams {
        self.state
    }

    /// The vehicle tuning tree
    pub fn vehicle_params(&self) -> &VehicleParams {
        &self.params
    }

    /// Mutable vehicle tuning; call when live-editing parameters
    pub fn vehicle_params_mut(&mut self) -> &mut VehicleParams {
        &mut self.params
    }

    /// Number of wheels
    pub fn wheel_count(&self) -> usize {
        self.wheels.len()
    }

    /// Mutable access to a wheel point for tuning
    pub fn wheel_mut(&mut self, index: usize) -> Option<&mut WheelPoint> {
        self.wheels.get_mut(index)
    }

    /// Overrides the friction of one wheel
    pub fn set_wheel_friction(&mut self, index: usize, friction: f32) {
        if let Some(wheel) = self.wheels.get_mut(index) {
            wheel.friction = friction;
        }
    }

    /// Sets the suspension travel of one wheel
    pub fn set_spring_length(&mut self, index: usize, length: f32) {
        if let Some(wheel) = self.wheels.get_mut(index) {
            let sim = units::distance_to_sim(length, &self.scale);
            wheel.raycast_length = sim.max(0.0);
            wheel.spring_rest_length = sim.max(0.0);
        }
    }

    /// Returns the contact point and surface of one wheel this tick
    pub fn wheel_contact_point(&self, index: usize) -> Option<(Vector3, u32)> {
        let impact = self.impacts.get(index)?;
        if impact.hit {
            Some((impact.point, impact.surface_id))
        } else {
            None
        }
    }

    /// Suppresses or restores engine force
    pub fn set_engine_disabled(&mut self, disable: bool) {
        self.engine_disabled = disable;
    }

    /// Returns whether engine force is suppressed
    pub fn is_engine_disabled(&self) -> bool {
        self.engine_disabled
    }

    /// Returns whether the booster is currently firing
    pub fn is_boosting(&self) -> bool {
        self.booster.is_boosting()
    }

    /// Lets the booster timer run outside of update; returns the remaining
    /// recharge delay
    pub fn update_booster(&mut self, dt: f32) -> f32 {
        self.booster.update(dt);
        self.state.boost_delay = self.booster.delay;
        self.state.boost_delay
    }

    /// A driver entered the vehicle
    pub fn on_vehicle_enter(&mut self) {
        self.occupied = true;
        self.state = OperatingParams {
            gear: 0,
            ..OperatingParams::default()
        };
        self.booster = BoosterState::default();
        self.flags = VehicleFlags::empty();
        // The exit path parks the vehicle with locked wheels.
        for wheel in &mut self.wheels {
            wheel.fixed = false;
        }
    }

    /// The driver left the vehicle: restore normal tires, lock the wheels,
    /// re-enable the engine
    pub fn on_vehicle_exit(&mut self, events: &mut EventQueue) {
        self.occupied = false;

        if self.params.steering.is_skid_allowed {
            if self.tire_type != TireType::Normal {
                self.tire_type = TireType::Normal;
                let material = self.params.axles[0].wheels.material_index;
                events.push_vehicle(VehicleEvent::TireMaterialChanged { material });
            }
            for wheel in &mut self.wheels {
                wheel.fixed = true;
            }
            self.state.skid_speed = 0.0;
        }

        self.set_engine_disabled(false);
    }

    /// Update the vehicle controller, once per simulation tick
    pub fn update(
        &mut self,
        dt: f32,
        controls_in: &ControlInput,
        chassis: &mut RigidBody,
        trace: &dyn SurfaceTrace,
        events: &mut EventQueue,
    ) {
        if dt <= 0.0 {
            return;
        }
        let mut controls = *controls_in;

        // Raycasts first: every decision below keys off this tick's
        // contacts.
        let impacts = cast_wheels(
            &mut self.wheels,
            chassis,
            trace,
            &CastMode::Ground,
            0.0,
            false,
        );

        // Speed readback: signed speed along the chassis forward axis.
        let forward = chassis.get_transform().transform_direction(Vector3::unit_z());
        let forward_speed = chassis.get_linear_velocity().dot(&forward);
        self.state.speed = units::distance_to_game(forward_speed, &self.scale);
        let speed_mph = units::speed_game_to_mph(self.state.speed, &self.scale);
        let abs_speed_mph = speed_mph.abs();

        let mut throttle = controls.throttle;
        let mut brake = controls.brake;
        let handbrake = controls.handbrake;
        let powerslide = handbrake && abs_speed_mph > POWERSLIDE_MIN_SPEED_MPH;

        if handbrake {
            throttle = 0.0;
        }

        if self.is_boosting() {
            controls.boost = true;
            throttle = if throttle < 0.0 { -1.0 } else { 1.0 };
        }

        // With no inputs at all, drag the vehicle to a stop.
        if throttle == 0.0 && brake == 0.0 && !handbrake {
            brake = 0.1;
        }

        // Update steering.
        self.update_steering(&controls, dt, abs_speed_mph);

        // Update powerslide.
        self.update_powerslide(&controls, powerslide, speed_mph, events);

        // Update engine.
        self.update_engine(&controls, dt, throttle, brake);

        // Update handbrake.
        self.update_handbrake(throttle, handbrake, powerslide, &impacts);

        // Update skidding.
        self.update_skidding(handbrake, &impacts, events);

        // Apply the wheel and extra forces to the chassis.
        self.simulate_wheels(&impacts, chassis, dt);
        self.update_extra_forces(chassis, dt);

        self.impacts = impacts;
    }

    /// Steering angle from speed and input; also points the first axle
    fn update_steering(&mut self, controls: &ControlInput, dt: f32, speed_mph: f32) {
        let angle = self.calc_steering(dt, speed_mph, controls.steering, controls.analog_steering);
        let radians = to_radians(angle);
        for index in 0..self.params.wheels_per_axle.min(self.wheels.len()) {
            self.wheels[index].steer(radians);
        }
        self.state.steering_angle = angle;
    }

    fn calc_steering(&self, _dt: f32, speed_mph: f32, steering: f32, analog: bool) -> f32 {
        let s = &self.params.steering;
        let mut degrees = remap_clamped(
            speed_mph,
            s.speed_slow,
            s.speed_fast,
            s.degrees_slow,
            s.degrees_fast,
        );

        // Past the rated top speed, tighten further toward the boost angle.
        let speed_game = units::speed_mph_to_game(speed_mph, &self.scale);
        if speed_game > self.params.engine.max_speed {
            degrees = remap_clamped(
                speed_game,
                self.params.engine.max_speed,
                self.params.engine.boost_max_speed,
                s.degrees_fast,
                s.degrees_boost,
            );
        }

        if s.steering_exponent != 0.0 {
            let sign = if steering < 0.0 { -1.0 } else { 1.0 };
            let abs_steering = steering.abs();
            if analog {
                // Analog sticks map position directly, so shape the full
                // range with a fixed square curve and clamp to the speed
                // cone. Keeps stick position to turn rate constant.
                let output = abs_steering.powf(2.0) * sign * s.degrees_slow;
                return clamp(output, -degrees, degrees);
            }
            // Digital steering is integrated, keep time-to-full-turn
            // constant.
            return abs_steering.powf(s.steering_exponent) * sign * degrees;
        }
        steering * degrees
    }

    /// Tire material switching and the lateral powerslide push
    fn update_powerslide(
        &mut self,
        controls: &ControlInput,
        powerslide: bool,
        speed_mph: f32,
        events: &mut EventQueue,
    ) {
        if !self.params.steering.is_skid_allowed || !self.occupied {
            return;
        }

        let slide_left = powerslide && controls.handbrake_left;
        let slide_right = powerslide && controls.handbrake_right;

        let new_tire_type = if slide_left || slide_right {
            TireType::Powerslide
        } else if powerslide {
            TireType::Braking
        } else {
            TireType::Normal
        };

        if new_tire_type != self.tire_type {
            self.tire_type = new_tire_type;
            let wheels = &self.params.axles[0].wheels;
            let material = match new_tire_type {
                TireType::Powerslide if wheels.skid_material_index != -1 => {
                    wheels.skid_material_index
                }
                TireType::Braking if wheels.brake_material_index != -1 => {
                    wheels.brake_material_index
                }
                _ => wheels.material_index,
            };
            events.push_vehicle(VehicleEvent::TireMaterialChanged { material });
        }

        // Push the car a little. Positive acceleration is to the left.
        let mut front = 0.0;
        let mut rear = 0.0;
        if speed_mph > 0.0 && slide_left != slide_right {
            let blend = remap_clamped(
                speed_mph,
                self.params.steering.speed_slow,
                self.params.steering.speed_fast,
                0.0,
                1.0,
            );
            let accel = units::distance_to_sim(
                self.params.steering.power_slide_accel,
                &self.scale,
            ) * blend;
            if slide_left {
                front = accel;
                rear = -accel;
            } else {
                front = -accel;
                rear = accel;
            }
        }
        self.powerslide_accel = (front, rear);
    }

    fn update_engine(&mut self, controls: &ControlInput, dt: f32, throttle: f32, brake: f32) {
        let torque_boost = self.update_engine_turbo_start(controls, dt);
        self.calc_engine(throttle, brake, controls.steering, torque_boost);
        self.update_engine_turbo_finish();
    }

    fn update_engine_turbo_start(&mut self, controls: &ControlInput, dt: f32) -> bool {
        let mut torque_boost = false;
        if controls.boost {
            if self.params.engine.torque_boost {
                // Boost is applied at the engine level.
                torque_boost = true;
                self.booster.activate(
                    0.0,
                    self.params.engine.boost_duration,
                    self.params.engine.boost_delay,
                );
            } else {
                // Body force booster.
                self.booster.activate(
                    self.params.engine.boost_force,
                    self.params.engine.boost_duration,
                    self.params.engine.boost_delay,
                );
            }
        }

        self.booster.update(dt);
        self.state.boost_delay = self.booster.delay;
        self.state.is_torque_boosting = torque_boost;

        torque_boost
    }

    fn update_engine_turbo_finish(&mut self) {
        let window = self.params.engine.boost_duration + self.params.engine.boost_delay;
        if window > 0.0 {
            self.state.boost_time_left = if self.state.boost_delay > 0.0 {
                (100.0 - 100.0 * self.state.boost_delay / window) as i32
            } else {
                100
            };
        }
    }

    /// Automatic transmission: estimate RPM from the average wheel spin and
    /// walk the gears. Shifting up requires forward throttle; shifting down
    /// happens whenever RPM falls below the threshold.
    fn calc_engine_transmission(&mut self, throttle: f32) {
        if !self.params.engine.is_auto_transmission {
            return;
        }
        let engine = &self.params.engine;

        let mut avg_rot_speed = 0.0;
        for wheel in &self.wheels {
            avg_rot_speed += wheel.angular_velocity.abs();
        }
        avg_rot_speed *= 0.5 / std::f32::consts::PI / self.wheels.len() as f32;

        let rpm = |gear: usize| {
            avg_rot_speed * engine.axle_ratio * engine.gear_ratios[gear] * SECONDS_PER_MINUTE
        };
        let mut est_rpm = rpm(self.state.gear);

        // Only shift up when throttling forward; top gear is count-1.
        if throttle > 0.0 {
            while est_rpm > engine.shift_up_rpm && self.state.gear < engine.gear_count - 1 {
                self.state.gear += 1;
                est_rpm = rpm(self.state.gear);
            }
        }

        while est_rpm < engine.shift_down_rpm && self.state.gear > 0 {
            self.state.gear -= 1;
            est_rpm = rpm(self.state.gear);
        }

        self.state.engine_rpm = est_rpm;
    }

    /// Engine and brake torque distribution.
    /// Throttle goes forward and backward [-1, 1], brake [0, 1].
    fn calc_engine(&mut self, mut throttle: f32, mut brake: f32, steering: f32, torque_boost: bool) {
        self.calc_engine_transmission(throttle);

        if self.engine_disabled {
            throttle = 0.0;
        }

        let abs_speed = self.state.speed.abs();
        let engine = &self.params.engine;

        // Speed governor: above the (boosted) top speed attenuate throttle,
        // and past the autobrake gain replace it with braking proportional
        // to the excess.
        let max_speed = if torque_boost {
            engine.boost_max_speed
        } else {
            engine.max_speed
        }
        .max(1.0);
        if throttle > 0.0 && abs_speed > max_speed {
            let frac = abs_speed / max_speed;
            if frac > engine.autobrake_speed_gain {
                throttle = 0.0;
                brake = (frac - 1.0) * engine.autobrake_speed_factor;
                if self.state.wheels_in_contact == 0 {
                    brake = 0.0;
                }
            }
            throttle *= 0.1;
        }

        // Reverse governor.
        if throttle < 0.0 && !torque_boost && abs_speed > engine.max_rev_speed {
            throttle *= 0.1;
        }

        if throttle != 0.0 {
            self.flags.remove(VehicleFlags::THROTTLE_STOPPED);

            // The force that propels the car.
            let mut wheel_force_by_throttle = throttle
                * engine.horsepower
                * (WATT_PER_HP * SECONDS_PER_MINUTE)
                * engine.gear_ratios[self.state.gear]
                * engine.axle_ratio
                / (engine.max_rpm * self.wheel_radius * (2.0 * std::f32::consts::PI));

            if self.state.engine_rpm >= engine.max_rpm {
                wheel_force_by_throttle = 0.0;
            }

            let boost_force = engine.boost_force;
            let max_speed_for_boost = engine.max_speed;
            let boosting = torque_boost && self.booster.is_boosting();

            let mut wheel_index = 0;
            for (axle_index, axle) in self.axles.iter().enumerate() {
                let axle_factor =
                    self.params.axles[axle_index].torque_factor * self.torque_scale;

                let mut boost_factor = 0.5;
                if boosting {
                    // Damp the boost at low speed and in hard turns, where
                    // it would just spin the tires. Full boost only comes
                    // in a straight line at high speed.
                    let speed_factor =
                        remap_clamped(abs_speed, 0.0, max_speed_for_boost, 0.1, 1.0);
                    let turn_factor = 1.0 - steering.abs() * 0.95;
                    let damped_boost = boost_force * speed_factor * turn_factor;
                    if damped_boost > boost_factor {
                        boost_factor = damped_boost;
                    }
                }

                let radius =
                    units::distance_to_sim(self.params.axles[axle_index].wheels.radius, &self.scale);
                let axle_torque = boost_factor * wheel_force_by_throttle * axle_factor * radius;

                for _ in 0..axle.wheel_count {
                    self.wheels[wheel_index].torque = axle_torque;
                    wheel_index += 1;
                }
            }
        } else if brake != 0.0 {
            self.flags.remove(VehicleFlags::THROTTLE_STOPPED);

            // Brake torque opposing the direction of travel.
            let wheel_force_by_brake =
                brake * self.gravity_length * (self.body_mass + self.total_wheel_mass);
            let sign = if self.state.speed >= 0.0 { -1.0 } else { 1.0 };

            let mut wheel_index = 0;
            for (axle_index, axle) in self.axles.iter().enumerate() {
                let radius =
                    units::distance_to_sim(self.params.axles[axle_index].wheels.radius, &self.scale);
                let torque = 0.5 * sign * wheel_force_by_brake * axle.brake_factor * radius;
                for _ in 0..axle.wheel_count {
                    self.wheels[wheel_index].torque = torque;
                    wheel_index += 1;
                }
            }
        } else if !self.flags.contains(VehicleFlags::THROTTLE_STOPPED) {
            self.flags.insert(VehicleFlags::THROTTLE_STOPPED);
            for wheel in &mut self.wheels {
                wheel.torque = 0.0;
            }
        }
    }

    /// The handbrake locks the wheels, but only while something is actually
    /// under them; locking airborne wheels makes the car land badly.
    fn update_handbrake(
        &mut self,
        throttle: f32,
        handbrake: bool,
        powerslide: bool,
        impacts: &[Impact],
    ) {
        let mut handbrake = handbrake;

        if !powerslide {
            // Opposing throttle acts as a handbrake so low throttle can
            // hold the car against gravity.
            if (throttle < 0.0 && self.state.speed > THROTTLE_OPPOSING_FORCE_EPSILON)
                || (throttle > 0.0 && self.state.speed < -THROTTLE_OPPOSING_FORCE_EPSILON)
            {
                handbrake = true;
            }
        }

        if handbrake {
            handbrake = impacts.iter().any(|impact| impact.hit);
        }

        let current = self.flags.contains(VehicleFlags::HANDBRAKE_ON);
        if handbrake != current {
            self.flags.set(VehicleFlags::HANDBRAKE_ON, handbrake);
            for wheel in &mut self.wheels {
                wheel.fixed = handbrake;
            }
        }
    }

    /// Finds the fastest-slipping contact point and reports it
    fn update_skidding(&mut self, handbrake: bool, impacts: &[Impact], events: &mut EventQueue) {
        self.state.skid_speed = 0.0;
        self.state.skid_surface_id = 0;
        self.state.wheels_in_contact = self.wheels.len();
        self.state.wheels_not_in_contact = 0;

        if !self.params.steering.is_skid_allowed {
            return;
        }

        let abs_speed = self.state.speed.abs();
        self.state.wheels_in_contact = 0;
        self.state.wheels_not_in_contact = 0;

        for (wheel, impact) in self.wheels.iter().zip(impacts) {
            if !impact.hit || !impact.usable {
                self.state.wheels_not_in_contact += 1;
                continue;
            }
            self.state.wheels_in_contact += 1;

            // The net surface velocity is zero when the wheel is fully
            // engaged in driving the car; any excess is skid.
            let forward = impact.projected_axis_direction.cross(&impact.normal);
            let rolling = forward * (wheel.angular_velocity * wheel.radius);
            let slip = impact.projected_surface_speed - rolling;
            let speed = units::distance_to_game(slip.length(), &self.scale);
            if speed > self.state.skid_speed {
                self.state.skid_speed = speed;
                self.state.skid_surface_id = impact.surface_id;
            }
        }

        // Locked wheels at speed always skid.
        if handbrake && abs_speed > LOCKED_WHEEL_SKID_SPEED {
            self.state.skid_speed = abs_speed;
        }

        if self.state.skid_speed > VEHICLE_SKID_EPSILON {
            events.push_vehicle(VehicleEvent::Skid {
                speed: self.state.skid_speed,
                surface_id: self.state.skid_surface_id,
            });
        }
    }

    /// Suspension, drive, brake, grip, stabilizer and powerslide forces
    fn simulate_wheels(&mut self, impacts: &[Impact], chassis: &mut RigidBody, dt: f32) {
        let mass = chassis.get_mass();
        let contact_count = impacts.iter().filter(|impact| impact.hit).count().max(1);

        for (index, (wheel, impact)) in self.wheels.iter_mut().zip(impacts).enumerate() {
            if !impact.hit || !impact.usable {
                // Airborne: spin up freely under drive torque.
                if !wheel.fixed {
                    let inertia = self.params.axles[index / self.params.wheels_per_axle]
                        .wheels
                        .inertia
                        .max(crate::math::EPSILON);
                    wheel.angular_velocity += wheel.torque / inertia * dt;
                    wheel.angular_velocity = clamp(
                        wheel.angular_velocity,
                        -wheel.max_rotation_speed,
                        wheel.max_rotation_speed,
                    );
                } else {
                    wheel.angular_velocity = 0.0;
                }
                continue;
            }

            // Suspension spring, optionally capped by the axle's max body
            // force.
            if let Some(mut impulse) = ground_spring_impulse(wheel, impact, dt) {
                let max_force = self.params.axles[index / self.params.wheels_per_axle]
                    .suspension
                    .max_body_force
                    * self.body_mass;
                if max_force > 0.0 {
                    let max_impulse = max_force * dt;
                    let len = impulse.length();
                    if len > max_impulse {
                        impulse = impulse * (max_impulse / len);
                    }
                }
                chassis.apply_impulse_at_point(impulse, impact.point);
            }

            let forward = impact.projected_axis_direction.cross(&impact.normal);

            if wheel.fixed {
                // Locked wheel: resist all sliding across the contact plane.
                let grip = clamp(impact.friction * TIRE_GRIP_PER_SECOND * dt, 0.0, 1.0);
                let impulse =
                    -impact.projected_surface_speed * (grip * mass / contact_count as f32);
                chassis.apply_impulse_at_point(impulse, impact.point);
                wheel.angular_velocity = 0.0;
                continue;
            }

            // Drive/brake force from the wheel torque, with surface
            // traction.
            if wheel.torque != 0.0 {
                let traction = clamp(impact.friction, 0.0, 1.0);
                let impulse = forward * (wheel.torque * wheel.inv_radius * traction * dt);
                chassis.apply_impulse_at_point(impulse, impact.point);
            }

            // Lateral grip: cancel a friction-scaled fraction of the slip
            // across the wheel axis each tick.
            let lateral_speed = impact
                .projected_surface_speed
                .dot(&impact.projected_axis_direction);
            let grip = clamp(impact.friction * TIRE_GRIP_PER_SECOND * dt, 0.0, 1.0);
            let impulse = -impact.projected_axis_direction
                * (lateral_speed * grip * mass / contact_count as f32);
            chassis.apply_impulse_at_point(impulse, impact.point);

            // Rolling estimate from the contact speed.
            let ground_speed = impact.projected_surface_speed.dot(&forward);
            wheel.angular_velocity = clamp(
                ground_speed * wheel.inv_radius,
                -wheel.max_rotation_speed,
                wheel.max_rotation_speed,
            );
        }

        // Engine reaction torque rocks the chassis opposite the wheel spin.
        let counter = self.params.body.counter_torque_factor;
        if counter != 0.0 && impacts.iter().any(|impact| impact.hit) {
            let total_torque: f32 = self.wheels.iter().map(|wheel| wheel.torque).sum();
            if total_torque != 0.0 {
                chassis.apply_angular_impulse_local(Vector3::new(
                    -total_torque * counter * dt,
                    0.0,
                    0.0,
                ));
            }
        }

        self.apply_stabilizers(impacts, chassis, dt);
        self.apply_powerslide_push(impacts, chassis, dt);
    }

    /// Anti-sway bars: transfer force between the two wheels of an axle in
    /// proportion to their compression difference
    fn apply_stabilizers(&self, impacts: &[Impact], chassis: &mut RigidBody, dt: f32) {
        for axle in &self.axles {
            if axle.wheel_count != 2 || axle.stabilizer_constant <= 0.0 {
                continue;
            }
            let left = axle.first_wheel;
            let right = axle.first_wheel + 1;
            let (Some(left_impact), Some(right_impact)) = (impacts.get(left), impacts.get(right))
            else {
                continue;
            };
            if !left_impact.hit || !right_impact.hit {
                continue;
            }

            let delta = self.wheels[left].raycast_dist - self.wheels[right].raycast_dist;
            let impulse = axle.stabilizer_constant * delta * dt;
            chassis
                .apply_impulse_at_point(left_impact.normal * impulse, left_impact.point);
            chassis
                .apply_impulse_at_point(right_impact.normal * -impulse, right_impact.point);
        }
    }

    /// The powerslide lateral push at the front and rear axles
    fn apply_powerslide_push(&self, impacts: &[Impact], chassis: &mut RigidBody, dt: f32) {
        let (front, rear) = self.powerslide_accel;
        if front == 0.0 && rear == 0.0 {
            return;
        }

        // Positive acceleration pushes left (-X in the chassis frame).
        let left = chassis
            .get_transform()
            .transform_direction(Vector3::new(-1.0, 0.0, 0.0));
        let mass_share = chassis.get_mass() * 0.5;

        for (axle_index, accel) in [(0usize, front), (self.axles.len().saturating_sub(1), rear)] {
            if accel == 0.0 {
                continue;
            }
            let Some(axle) = self.axles.get(axle_index) else { continue };
            let mut point = Vector3::zero();
            let mut count = 0;
            for wheel_index in axle.first_wheel..axle.first_wheel + axle.wheel_count {
                if let Some(impact) = impacts.get(wheel_index) {
                    if impact.hit {
                        point += impact.point;
                        count += 1;
                    }
                }
            }
            if count == 0 {
                continue;
            }
            point /= count as f32;
            chassis.apply_impulse_at_point(left * (accel * mass_share * dt), point);
        }
    }

    /// Tilt downforce while the chassis is on its side, the body-force
    /// booster, and the global angular velocity limit
    fn update_extra_forces(&mut self, chassis: &mut RigidBody, dt: f32) {
        let transform = chassis.get_transform();
        let mass = chassis.get_mass();

        // Extra downward force, applied above the mass center so a car on
        // its side gets pushed back onto its wheels.
        let up_alignment = transform.transform_direction(Vector3::unit_y()).y;
        if up_alignment.abs() < 0.05 {
            let force = self.params.body.tilt_force * self.gravity_length * mass;
            let height =
                units::distance_to_sim(self.params.body.tilt_force_height, &self.scale);
            let point =
                transform.position + transform.transform_direction(Vector3::unit_y()) * height;
            chassis.apply_impulse_at_point(Vector3::new(0.0, -force * dt, 0.0), point);
        }

        // Body-force booster push.
        if self.booster.is_boosting() && self.booster.force > 0.0 {
            let forward = transform.transform_direction(Vector3::unit_z());
            chassis.apply_impulse(forward * (self.booster.force * mass * dt));
        }

        // Global angular velocity limit.
        let max_ang = self.params.body.max_angular_velocity;
        if max_ang > 0.0 {
            let ang = chassis.get_angular_velocity();
            let len = ang.length();
            if len > max_ang {
                chassis.set_angular_velocity(ang * (max_ang / len));
            }
        }
    }

    /// Writes the controller to a flat template for persistence. The
    /// handbrake flag is dropped so the wheels re-lock correctly on load.
    pub fn write_to_template(&self, chassis: &RigidBody) -> VehicleControllerTemplate {
        let mut flags = self.flags;
        flags.remove(VehicleFlags::HANDBRAKE_ON);

        VehicleControllerTemplate {
            chassis: self.chassis,
            params: self.params.clone(),
            state: self.state,
            flags: flags.bits(),
            tire_type: self.tire_type,
            occupied: self.occupied,
            engine_disabled: self.engine_disabled,
            body_mass: self.body_mass,
            total_wheel_mass: self.total_wheel_mass,
            gravity_length: self.gravity_length,
            torque_scale: self.torque_scale,
            wheel_positions: self
                .wheels
                .iter()
                .map(|wheel| units::position_to_game(wheel.hard_point, &self.scale))
                .collect(),
            trace_positions: self
                .wheels
                .iter()
                .map(|wheel| units::position_to_game(wheel.raycast_start, &self.scale))
                .collect(),
            velocity: chassis.get_linear_velocity(),
        }
    }

    /// Rebuilds a controller from a template, re-attaching the chassis by
    /// handle identity
    pub fn init_from_template(template: &VehicleControllerTemplate, scale: UnitScale) -> Self {
        let params = template.params.clone();
        let torque_scale = params.torque_scale();

        let mut controller = Self {
            chassis: template.chassis,
            params,
            scale,
            wheels: Vec::new(),
            axles: Vec::new(),
            state: template.state,
            flags: VehicleFlags::from_bits_truncate(template.flags),
            tire_type: template.tire_type,
            occupied: template.occupied,
            engine_disabled: template.engine_disabled,
            torque_scale,
            body_mass: template.body_mass,
            total_wheel_mass: template.total_wheel_mass,
            wheel_radius: 0.0,
            gravity_length: template.gravity_length,
            booster: BoosterState::default(),
            powerslide_accel: (0.0, 0.0),
            impacts: Vec::new(),
        };
        controller.init_wheels();

        // Saved games carry the exact wheel placements; prefer them over
        // the axle-derived defaults.
        for (index, (hard, trace)) in template
            .wheel_positions
            .iter()
            .zip(&template.trace_positions)
            .enumerate()
        {
            if let Some(wheel) = controller.wheels.get_mut(index) {
                wheel.hard_point = units::position_to_sim(*hard, &scale);
                wheel.raycast_start = units::position_to_sim(*trace, &scale);
            }
        }
        controller
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::BodyHandle;

    fn controller() -> WheeledVehicleController {
        WheeledVehicleController::new(
            BodyHandle(1),
            VehicleParams::default(),
            1000.0,
            UnitScale::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_invalid_gear_table_rejected() {
        let mut params = VehicleParams::default();
        params.engine.gear_count = 9;
        assert!(WheeledVehicleController::new(
            BodyHandle(1),
            params,
            1000.0,
            UnitScale::default()
        )
        .is_err());
    }

    #[test]
    fn test_torque_factors_normalized() {
        let mut params = VehicleParams::default();
        params.axles[0].torque_factor = 3.0;
        params.axles[1].torque_factor = 1.0;
        let c = WheeledVehicleController::new(
            BodyHandle(1),
            params,
            1000.0,
            UnitScale::default(),
        )
        .unwrap();
        assert!((c.torque_scale - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_booster_window() {
        let mut booster = BoosterState::default();
        booster.activate(0.0, 2.0, 5.0);
        assert!(booster.is_boosting());
        assert_eq!(booster.delay, 7.0);

        // A second activation during the window is ignored.
        booster.update(1.0);
        booster.activate(0.0, 2.0, 5.0);
        assert_eq!(booster.delay, 6.0);

        booster.update(1.5);
        assert!(!booster.is_boosting());
        assert!(booster.delay > 0.0);

        booster.update(10.0);
        booster.activate(0.0, 2.0, 5.0);
        assert!(booster.is_boosting());
    }

    #[test]
    fn test_transmission_gear_bounds() {
        let mut c = controller();
        // Spin the wheels hard: RPM estimate climbs, gear shifts up but
        // never past the top gear.
        for wheel in &mut c.wheels {
            wheel.angular_velocity = 500.0;
        }
        c.calc_engine_transmission(1.0);
        assert!(c.state.gear <= c.params.engine.gear_count - 1);

        // Stopped wheels shift all the way back down.
        for wheel in &mut c.wheels {
            wheel.angular_velocity = 0.0;
        }
        c.calc_engine_transmission(1.0);
        assert_eq!(c.state.gear, 0);
    }

    #[test]
    fn test_no_upshift_without_forward_throttle() {
        let mut c = controller();
        for wheel in &mut c.wheels {
            wheel.angular_velocity = 500.0;
        }
        c.calc_engine_transmission(0.0);
        assert_eq!(c.state.gear, 0);
        c.calc_engine_transmission(-1.0);
        assert_eq!(c.state.gear, 0);
    }

    #[test]
    fn test_steering_angle_bounded() {
        let c = controller();
        for speed in [0.0, 10.0, 25.0, 50.0, 80.0] {
            for steering in [-1.0, -0.5, 0.0, 0.5, 1.0] {
                let angle = c.calc_steering(0.01, speed, steering, false);
                let bound = c
                    .params
                    .steering
                    .degrees_slow
                    .max(c.params.steering.degrees_fast)
                    .max(c.params.steering.degrees_boost);
                assert!(angle.abs() <= bound + 1e-4);
            }
        }
    }
}
