//! The airboat, a sporty nimble water craft.
//!
//! Four raycast pontoon points keep the hull on the water (or ground), a
//! turbine pushes it along its forward axis, and PD stabilizers keep the
//! nose up while airborne. All forces are mass-proportional so the same
//! tuning works across chassis masses.

use crate::bodies::RigidBody;
use crate::core::{BodyHandle, EventQueue, VehicleEvent};
use crate::math::{remap_clamped, to_radians, Vector3};
use crate::suspension::{
    buoyancy_impulse, cast_wheels, count_surface_contacts, ground_spring_impulse, Axle, CastMode,
    Impact, PontoonParams, WaterCastParams, WheelPoint,
};
use crate::trace::SurfaceTrace;
use crate::units::{self, UnitScale};
use crate::vehicle::params::VehicleParams;
use crate::vehicle::{ControlInput, OperatingParams};
use crate::error::PhysicsError;
use crate::Result;

use log::warn;

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

const STEERING_RATE_MIN: f32 = 0.00045;
const STEERING_RATE_MAX: f32 = 5.0 * STEERING_RATE_MIN;
const STEERING_INTERVAL: f32 = 0.5;

const ROT_DRAG: f32 = 0.00004;
const ROT_DAMPING: f32 = 0.001;

// Mass-independent thrust values, N/kg
const THRUST_MAX: f32 = 11.0;
const THRUST_MAX_REVERSE: f32 = 7.5;

// Mass-independent drag values, per local axis
const WATER_DRAG_LEFT_RIGHT: f32 = 0.6;
const WATER_DRAG_FORWARD_BACK: f32 = 0.005;
const WATER_DRAG_UP_DOWN: f32 = 0.0025;

const GROUND_DRAG_LEFT_RIGHT: f32 = 2.0;
const GROUND_DRAG_FORWARD_BACK: f32 = 1.0;
const GROUND_DRAG_UP_DOWN: f32 = 0.8;

// Reduces friction on all surfaces other than water, unitless
const DRY_FRICTION_SCALE: f32 = 0.6;

const GRAVITY: f32 = 9.81;

// Below this speed a jump is a weak jump: thrust is halved and the pitch
// stabilizer stays off, which kills the floaty air control
const WEAK_JUMP_SPEED: f32 = 11.0;

// Energy per unit mass a tick of ground drag must eliminate before the
// environment is told about the scrape
const FRICTION_EVENT_ENERGY: f32 = 0.05;

// Chassis damping while no driver is aboard, so an abandoned hull coasts
// to rest instead of drifting forever
const UNOCCUPIED_DAMPING: f32 = 0.2;

/// Flat snapshot of an airboat controller, sufficient to rebuild identical
/// runtime state. The chassis is carried as a handle and re-attached by
/// identity on restore.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct AirboatControllerTemplate {
    pub chassis: BodyHandle,
    pub params: VehicleParams,
    pub body_mass: f32,
    pub water_params: WaterCastParams,
    pub pontoon_params: PontoonParams,
    pub steering_reversed: bool,
    pub occupied: bool,
    pub sim_time: f32,
    /// Pontoon hard points in game space
    pub wheel_positions: Vec<Vector3>,
    /// Raycast origins in game space
    pub trace_positions: Vec<Vector3>,
}

/// Raycast airboat simulation. Owns its pontoon points; references the
/// chassis body by handle and applies impulses to it once per tick.
pub struct AirboatController {
    /// The chassis body this controller drives
    chassis: BodyHandle,

    /// Vehicle tuning the pontoon points were built from
    params: VehicleParams,

    /// Chassis mass at setup; suspension constants were scaled by it
    body_mass: f32,

    /// Pontoon contact points: front-left, front-right, rear-left,
    /// rear-right
    wheels: Vec<WheelPoint>,

    /// Axle grouping for the pontoon points
    axles: Vec<Axle>,

    /// Water cast tuning
    water_params: WaterCastParams,

    /// Buoyancy tuning
    pontoon_params: PontoonParams,

    /// Unit scale for readback conversion
    scale: UnitScale,

    /// Current steering input [-1, 1]
    steering_angle: f32,

    /// Steering input of the previous tick, signed by the reverse state
    prev_steering_angle: f32,

    /// Whether steering is currently reversed (driving backwards)
    steering_reversed: bool,

    /// Whether the current steering input is analog
    analog_steering: bool,

    /// Seconds since the last steering sign change
    steer_time: f32,

    /// Turbine thrust, N/kg; sign is direction
    thrust: f32,

    /// Whether no pontoon has a surface contact
    airborne: bool,

    /// Seconds spent airborne
    air_time: f32,

    /// Whether the current jump started below the weak-jump speed
    weak_jump: bool,

    /// Previous pitch error for the derivative term
    pitch_error_prev: f32,

    /// Previous roll error for the derivative term
    roll_error_prev: f32,

    /// Accumulated simulation time, drives the wave noise
    sim_time: f32,

    /// Chassis speed cached at the start of the tick
    speed: f32,

    /// Chassis velocity in the local frame, cached at the start of the tick
    local_velocity: Vector3,

    /// Whether a driver is aboard
    occupied: bool,

    /// Impacts of the most recent tick, for readback
    impacts: Vec<Impact>,
}

impl AirboatController {
    /// Creates an airboat from vehicle params. The chassis body is owned by
    /// the environment; `body_mass` scales the suspension constants once,
    /// the way the authored values expect.
    pub fn new(
        chassis: BodyHandle,
        params: &VehicleParams,
        body_mass: f32,
        scale: UnitScale,
    ) -> Result<Self> {
        if params.axle_count == 0 || params.axle_count > crate::vehicle::params::MAX_AXLE_COUNT {
            return Err(PhysicsError::InvalidParameter(format!(
                "airboat axle count {} out of range",
                params.axle_count
            )));
        }
        if params.axles.len() < params.axle_count {
            return Err(PhysicsError::InvalidParameter(
                "fewer axle params than axle_count".to_string(),
            ));
        }

        let mut wheels = Vec::new();
        let mut axles = Vec::new();

        for (axle_index, axle) in params.axles[..params.axle_count].iter().enumerate() {
            for side in 0..params.wheels_per_axle {
                // Wheels alternate left/right of the axle center.
                let mirror = if side & 1 == 1 { 1.0 } else { -1.0 };
                let hard_game = axle.offset + axle.wheel_offset * mirror;
                let trace_game = axle.raytrace_center_offset + axle.raytrace_offset * mirror;

                let mut wheel = WheelPoint::new(
                    units::position_to_sim(hard_game, &scale),
                    units::position_to_sim(trace_game, &scale),
                    units::distance_to_sim(axle.wheels.radius, &scale),
                );
                wheel.spring_constant = axle.suspension.spring_constant * body_mass;
                wheel.spring_damp_relax = axle.suspension.spring_damping * body_mass;
                wheel.spring_damp_compress =
                    axle.suspension.spring_damping_compression * body_mass;
                wheel.spring_rest_length =
                    -units::distance_to_sim(axle.wheels.spring_additional_length, &scale);
                wheel.friction = 1.0;
                wheels.push(wheel);
            }

            axles.push(Axle {
                first_wheel: axle_index * params.wheels_per_axle,
                wheel_count: params.wheels_per_axle,
                stabilizer_constant: axle.suspension.stabilizer_constant * body_mass,
                torque_factor: axle.torque_factor,
                brake_factor: axle.brake_factor,
            });
        }

        Ok(Self {
            chassis,
            params: params.clone(),
            body_mass,
            wheels,
            axles,
            water_params: WaterCastParams::default(),
            pontoon_params: PontoonParams::default(),
            scale,
            steering_angle: 0.0,
            prev_steering_angle: 0.0,
            steering_reversed: false,
            analog_steering: false,
            steer_time: 0.0,
            thrust: 0.0,
            airborne: false,
            air_time: 0.0,
            weak_jump: false,
            pitch_error_prev: 0.0,
            roll_error_prev: 0.0,
            sim_time: 0.0,
            speed: 0.0,
            local_velocity: Vector3::zero(),
            occupied: false,
            impacts: Vec::new(),
        })
    }

    /// The chassis body this controller drives
    pub fn chassis(&self) -> BodyHandle {
        self.chassis
    }

    /// Returns whether the craft is airborne
    pub fn is_airborne(&self) -> bool {
        self.airborne
    }

    /// Returns whether the current jump is a weak jump
    pub fn is_weak_jump(&self) -> bool {
        self.weak_jump
    }

    /// Current turbine thrust, N/kg
    pub fn thrust(&self) -> f32 {
        self.thrust
    }

    /// Mutable access to a pontoon point for tuning
    pub fn wheel_mut(&mut self, index: usize) -> Option<&mut WheelPoint> {
        self.wheels.get_mut(index)
    }

    /// Number of pontoon points
    pub fn wheel_count(&self) -> usize {
        self.wheels.len()
    }

    /// Overrides the friction of one pontoon point
    pub fn set_wheel_friction(&mut self, index: usize, friction: f32) {
        if let Some(wheel) = self.wheels.get_mut(index) {
            wheel.friction = friction;
        }
    }

    /// Locks or unlocks a pontoon point
    pub fn fix_wheel(&mut self, index: usize, fixed: bool) {
        if let Some(wheel) = self.wheels.get_mut(index) {
            wheel.fixed = fixed;
        }
    }

    /// The pontoon axle grouping
    pub fn axles(&self) -> &[Axle] {
        &self.axles
    }

    /// Water cast tuning, mutable
    pub fn water_params_mut(&mut self) -> &mut WaterCastParams {
        &mut self.water_params
    }

    /// Buoyancy tuning, mutable
    pub fn pontoon_params_mut(&mut self) -> &mut PontoonParams {
        &mut self.pontoon_params
    }

    /// A driver boarded the craft: live control state resets and the hull
    /// stops the coast-to-rest damping
    pub fn on_vehicle_enter(&mut self, chassis: &mut RigidBody) {
        self.occupied = true;
        self.thrust = 0.0;
        self.steering_angle = 0.0;
        self.prev_steering_angle = 0.0;
        self.steering_reversed = false;
        self.steer_time = 0.0;
        chassis.set_damping(0.0, 0.0);
    }

    /// The driver left: cut the turbine and let damping bring the
    /// abandoned hull to rest
    pub fn on_vehicle_exit(&mut self, chassis: &mut RigidBody) {
        self.occupied = false;
        self.thrust = 0.0;
        self.steering_angle = 0.0;
        chassis.set_damping(UNOCCUPIED_DAMPING, UNOCCUPIED_DAMPING);
    }

    /// Whether a driver is aboard
    pub fn is_occupied(&self) -> bool {
        self.occupied
    }

    /// Writes the controller to a flat template for persistence
    pub fn write_to_template(&self) -> AirboatControllerTemplate {
        AirboatControllerTemplate {
            chassis: self.chassis,
            params: self.params.clone(),
            body_mass: self.body_mass,
            water_params: self.water_params,
            pontoon_params: self.pontoon_params,
            steering_reversed: self.steering_reversed,
            occupied: self.occupied,
            sim_time: self.sim_time,
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
        }
    }

    /// Rebuilds a controller from a template, re-attaching the chassis by
    /// handle identity
    pub fn init_from_template(
        template: &AirboatControllerTemplate,
        scale: UnitScale,
    ) -> Result<Self> {
        let mut boat = Self::new(template.chassis, &template.params, template.body_mass, scale)?;
        boat.water_params = template.water_params;
        boat.pontoon_params = template.pontoon_params;
        boat.steering_reversed = template.steering_reversed;
        boat.occupied = template.occupied;
        boat.sim_time = template.sim_time;

        // Saved games carry the exact pontoon placements; prefer them over
        // the axle-derived defaults.
        for (index, (hard, trace)) in template
            .wheel_positions
            .iter()
            .zip(&template.trace_positions)
            .enumerate()
        {
            if let Some(wheel) = boat.wheels.get_mut(index) {
                wheel.hard_point = units::position_to_sim(*hard, &scale);
                wheel.raycast_start = units::position_to_sim(*trace, &scale);
            }
        }
        Ok(boat)
    }

    /// A data snapshot for HUD/telemetry consumers
    pub fn operating_params(&self) -> OperatingParams {
        let contacts = count_surface_contacts(&self.impacts);
        OperatingParams {
            speed: units::distance_to_game(self.local_velocity.z, &self.scale),
            steering_angle: self.steering_angle,
            wheels_in_contact: contacts,
            wheels_not_in_contact: self.wheels.len() - contacts,
            ..OperatingParams::default()
        }
    }

    /// Maps throttle input [-1, 1] to turbine thrust
    fn update_throttle(&mut self, throttle: f32) {
        if throttle.abs() < 0.01 {
            self.thrust = 0.0;
        } else if throttle > 0.0 {
            self.thrust = THRUST_MAX * throttle;
        } else {
            self.thrust = THRUST_MAX_REVERSE * throttle;
        }
    }

    /// Applies the steering input and steers the front pontoon points
    fn do_steering(&mut self, steering: f32, analog: bool) {
        if self.steering_angle == steering && self.analog_steering == analog {
            return;
        }
        self.analog_steering = analog;
        self.steering_angle = steering;

        for index in 0..self.water_params.front_point_count.min(self.wheels.len()) {
            self.wheels[index].steer(steering);
        }
    }

    /// Entry point for the airboat simulation, called once per tick
    pub fn update(
        &mut self,
        dt: f32,
        controls: &ControlInput,
        chassis: &mut RigidBody,
        trace: &dyn SurfaceTrace,
        events: &mut EventQueue,
    ) {
        if dt <= 0.0 {
            return;
        }
        self.sim_time += dt;

        // Cache speed and the local velocity vector so the work happens once.
        let transform = chassis.get_transform();
        self.speed = chassis.get_linear_velocity().length();
        self.local_velocity =
            transform.inverse_transform_direction(chassis.get_linear_velocity());

        self.update_throttle(controls.throttle);
        self.do_steering(controls.steering, controls.analog_steering);

        let impacts = cast_wheels(
            &mut self.wheels,
            chassis,
            trace,
            &CastMode::Water(self.water_params),
            self.sim_time,
            self.thrust != 0.0,
        );

        self.update_airborne_state(&impacts, dt);

        // Pontoons. Buoyancy or ground impacts.
        self.simulate_pontoons(&impacts, chassis, dt);

        // Drag due to water and ground friction.
        self.simulate_drag(&impacts, chassis, dt, events);

        // Turbine (fan).
        self.simulate_turbine(chassis, dt);

        // Steering.
        self.simulate_steering(chassis, dt);

        // Anti-pitch.
        self.keep_upright_pitch(&impacts, chassis, dt);

        // Anti-roll.
        self.keep_upright_roll(&impacts, chassis, dt);

        self.impacts = impacts;
    }

    /// Determines whether we are airborne and whether the jump was weak or
    /// strong. Weak jumps are jumps below a threshold speed; they halve the
    /// turbine and disable the pitch controller.
    fn update_airborne_state(&mut self, impacts: &[Impact], dt: f32) {
        if count_surface_contacts(impacts) == 0 {
            if !self.airborne {
                self.airborne = true;
                self.air_time = 0.0;
                if self.speed < WEAK_JUMP_SPEED {
                    self.weak_jump = true;
                }
            } else {
                self.air_time += dt;
            }
        } else {
            self.airborne = false;
            self.weak_jump = false;
        }
    }

    fn simulate_pontoons(&self, impacts: &[Impact], chassis: &mut RigidBody, dt: f32) {
        let mass = chassis.get_mass();
        for (wheel, impact) in self.wheels.iter().zip(impacts) {
            if impact.hit {
                if let Some(impulse) = ground_spring_impulse(wheel, impact, dt) {
                    chassis.apply_impulse_at_point(impulse, impact.point);
                }
            } else if impact.in_water {
                let impulse = buoyancy_impulse(
                    &self.pontoon_params,
                    mass,
                    impact.depth,
                    self.wheels.len(),
                    dt,
                );
                chassis.apply_impulse_at_point(impulse, impact.point);
            }
        }
    }

    /// Drag due to water and ground friction. Water and ground each get
    /// their own per-axis coefficients; the pontoons resist sideways motion
    /// far more than forward motion.
    fn simulate_drag(
        &self,
        impacts: &[Impact],
        chassis: &mut RigidBody,
        dt: f32,
        events: &mut EventQueue,
    ) {
        let transform = chassis.get_transform();
        let mass = chassis.get_mass();

        let mut points_in_water = 0;
        let mut points_on_ground = 0;
        let mut ground_friction = 0.0;
        let mut average_dampening = 0.0;
        let mut friction_point = Vector3::zero();
        let mut friction_normal = Vector3::zero();

        // Tally contacts and find the surface hit by the most points.
        let mut surface_ids: Vec<(u32, usize)> = Vec::new();
        for impact in impacts.iter().filter(|impact| impact.hit) {
            if impact.hit_water {
                average_dampening += impact.dampening;
                points_in_water += 1;
            } else {
                ground_friction += impact.friction;
                points_on_ground += 1;
                friction_point += impact.point;
                friction_normal += impact.normal;
                match surface_ids.iter_mut().find(|(id, _)| *id == impact.surface_id) {
                    Some((_, count)) => *count += 1,
                    None => surface_ids.push((impact.surface_id, 1)),
                }
            }
        }
        let top_surface = surface_ids
            .iter()
            .max_by_key(|(_, count)| *count)
            .map(|(id, _)| *id)
            .unwrap_or(0);

        if points_in_water > 0 {
            average_dampening /= points_in_water as f32;
            let _ = average_dampening; // reserved for fluid dampening tuning

            let neg_local = -self.local_velocity;
            let drag_local = Vector3::new(
                WATER_DRAG_LEFT_RIGHT * neg_local.x,
                WATER_DRAG_UP_DOWN * neg_local.y,
                WATER_DRAG_FORWARD_BACK * neg_local.z,
            ) * (self.speed * mass * dt);

            chassis.apply_impulse(transform.transform_direction(drag_local));
        }

        if points_on_ground > 0 && self.speed > 0.0 {
            ground_friction /= points_on_ground as f32;
            friction_point /= points_on_ground as f32;
            friction_normal = friction_normal.normalize();

            let friction_drag =
                mass * GRAVITY * DRY_FRICTION_SCALE * ground_friction / self.speed;

            let energy_before = 0.5 * mass * chassis.get_linear_velocity().length_squared();

            let neg_local = -self.local_velocity;
            let drag_local = Vector3::new(
                GROUND_DRAG_LEFT_RIGHT * neg_local.x,
                GROUND_DRAG_UP_DOWN * neg_local.y,
                GROUND_DRAG_FORWARD_BACK * neg_local.z,
            ) * (friction_drag * dt);

            chassis.apply_impulse(transform.transform_direction(drag_local));

            // Report how much energy friction ate, for scrape sounds.
            let energy_after = 0.5 * mass * chassis.get_linear_velocity().length_squared();
            let eliminated = (energy_before - energy_after) * dt / mass;
            if eliminated > FRICTION_EVENT_ENERGY {
                events.push_vehicle(VehicleEvent::FrictionScrape {
                    energy: eliminated,
                    surface_id: top_surface,
                    point: friction_point,
                    normal: friction_normal,
                });
            }
        }
    }

    fn simulate_turbine(&self, chassis: &mut RigidBody, dt: f32) {
        // Reduce the turbine power during weak jumps to avoid unrealistic
        // air control. Also, reduce reverse thrust while airborne.
        let mut thrust = self.thrust;
        if self.weak_jump || (self.airborne && thrust < 0.0) {
            thrust *= 0.5;
        }

        let forward = chassis.get_transform().transform_direction(Vector3::unit_z());

        if forward.y > 0.5 && thrust > 0.0 {
            // Driving up a slope. Reduce upward thrust to prevent ludicrous
            // climbing of steep surfaces.
            thrust *= 1.0 - forward.y;
        } else if forward.y < -0.5 && thrust < 0.0 {
            // Reversing up a slope.
            thrust *= 1.0 + forward.y;
        }

        chassis.apply_impulse(forward * (thrust * chassis.get_mass() * dt));
    }

    fn simulate_steering(&mut self, chassis: &mut RigidBody, dt: f32) {
        // Calculate the steering direction: forward or reverse. Don't mess
        // with the direction while we're steering, unless thrust is applied.
        // This prevents the steering from reversing because we started
        // drifting backwards.
        if self.steering_angle == 0.0 || self.thrust != 0.0 {
            if !self.analog_steering {
                if self.thrust < 0.0 {
                    self.steering_reversed = true;
                } else if self.thrust > 0.0 || self.local_velocity.z > 0.0 {
                    self.steering_reversed = false;
                }
            } else {
                // Dead zone through the middle of the stick so drift does
                // not flip the steering sign.
                if self.thrust < -2.0 {
                    self.steering_reversed = true;
                } else if self.thrust > 2.0 || self.local_velocity.z > 0.0 {
                    self.steering_reversed = false;
                }
            }
        }

        let mass = chassis.get_mass();
        let mut steering_force = 0.0;
        if self.steering_angle.abs() > 0.01 {
            let mut steering_sign = if self.steering_angle < 0.0 { -1.0 } else { 1.0 };
            if self.steering_reversed {
                steering_sign *= -1.0;
            }

            // On a sign change (or when steering starts) reset the steer
            // timer so the force blends back in over the interval.
            let prev_sign = if self.prev_steering_angle < 0.0 { -1.0 } else { 1.0 };
            if self.prev_steering_angle.abs() < 0.01 || steering_sign != prev_sign {
                self.steer_time = 0.0;
            }

            let steer_scale = if !self.analog_steering {
                remap_clamped(
                    self.steer_time,
                    0.0,
                    STEERING_INTERVAL,
                    STEERING_RATE_MIN,
                    STEERING_RATE_MAX,
                )
            } else {
                remap_clamped(
                    self.steering_angle.abs(),
                    0.0,
                    STEERING_INTERVAL,
                    STEERING_RATE_MIN,
                    STEERING_RATE_MAX,
                )
            };

            steering_force = steer_scale * mass / dt * -steering_sign;
            self.steer_time += dt;
        }

        self.prev_steering_angle =
            self.steering_angle * if self.steering_reversed { -1.0 } else { 1.0 };

        // Drag proportional to the square of the yaw speed, damping
        // proportional to the yaw speed, both opposing the rotation.
        let yaw = chassis.get_angular_velocity().y;
        let yaw_sign = if yaw < 0.0 { -1.0 } else { 1.0 };
        let rotational_drag = -(ROT_DRAG * yaw * yaw * mass / dt) * yaw_sign;
        let rotational_damping = -(ROT_DAMPING * yaw.abs() * mass / dt) * yaw_sign;

        let net = steering_force + rotational_drag + rotational_damping;
        chassis.apply_angular_impulse_local(Vector3::new(0.0, net, 0.0));
    }

    /// Prevents us from nosing down dramatically during jumps, which
    /// increases the maximum jump distance.
    fn keep_upright_pitch(&mut self, impacts: &[Impact], chassis: &mut RigidBody, dt: f32) {
        // Pitch control is off during weak jumps. This reduces the unreal
        // floaty sensation.
        if self.weak_jump {
            return;
        }

        self.keep_upright_axis(impacts, chassis, dt, UprightAxis::Pitch);
    }

    /// Roll stabilizer while airborne
    fn keep_upright_roll(&mut self, impacts: &[Impact], chassis: &mut RigidBody, dt: f32) {
        self.keep_upright_axis(impacts, chassis, dt, UprightAxis::Roll);
    }

    fn keep_upright_axis(
        &mut self,
        impacts: &[Impact],
        chassis: &mut RigidBody,
        dt: f32,
        axis: UprightAxis,
    ) {
        // Reference vector in chassis space: up, pitched back 10 degrees.
        let lean = to_radians(10.0);
        let reference = Vector3::new(0.0, lean.cos(), lean.sin());

        // Goal vector: world up, expressed in chassis space. We try to
        // align the reference with the goal.
        let transform = chassis.get_transform();
        let mut goal = transform.inverse_transform_direction(Vector3::unit_y());

        // Each stabilizer only corrects its own axis.
        match axis {
            UprightAxis::Pitch => goal.x = reference.x,
            UprightAxis::Roll => goal.y = reference.y,
        }
        if goal.try_normalize_mut().is_none() {
            warn!("airboat {:?} stabilizer: degenerate goal axis, skipping correction", axis);
            return;
        }

        // atan2 is well defined, so use dot & cross rather than asin(cross).
        let mut rot_axis = reference.cross(&goal);
        let cosine = reference.dot(&goal);
        let sine = match rot_axis.try_normalize_mut() {
            Some(len) => len,
            None => {
                self.set_axis_error(axis, 0.0);
                return;
            }
        };
        let angle = sine.atan2(cosine);

        // No correction while any pontoon is touching a surface.
        if count_surface_contacts(impacts) > 0 {
            self.set_axis_error(axis, angle);
            return;
        }

        let (kp, kd, max_impulse_deg, dead_zone_deg) = match axis {
            UprightAxis::Pitch => (0.1, 0.04, 1.5, 0.0),
            UprightAxis::Roll => (0.2, 0.3, 2.0, 10.0),
        };

        if dead_zone_deg > 0.0 && angle.abs() < to_radians(dead_zone_deg) {
            self.set_axis_error(axis, angle);
            return;
        }

        let mass = chassis.get_mass();
        let prev = self.axis_error(axis);
        let mut impulse = rot_axis * (mass * (kp * angle + kd / dt * (angle - prev)));
        self.set_axis_error(axis, angle);

        // Clamp the impulse at a maximum length.
        let max_len = to_radians(max_impulse_deg) * mass;
        let len = impulse.length();
        if len > max_len {
            impulse = impulse * (max_len / len);
        }

        chassis.apply_angular_impulse_local(impulse);
    }

    fn axis_error(&self, axis: UprightAxis) -> f32 {
        match axis {
            UprightAxis::Pitch => self.pitch_error_prev,
            UprightAxis::Roll => self.roll_error_prev,
        }
    }

    fn set_axis_error(&mut self, axis: UprightAxis, error: f32) {
        match axis {
            UprightAxis::Pitch => self.pitch_error_prev = error,
            UprightAxis::Roll => self.roll_error_prev = error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UprightAxis {
    Pitch,
    Roll,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_throttle_maps_to_thrust() {
        let params = VehicleParams::default();
        let mut boat =
            AirboatController::new(BodyHandle(1), &params, 100.0, UnitScale::default()).unwrap();

        boat.update_throttle(1.0);
        assert_eq!(boat.thrust(), THRUST_MAX);
        boat.update_throttle(-1.0);
        assert_eq!(boat.thrust(), -THRUST_MAX_REVERSE);
        boat.update_throttle(0.005);
        assert_eq!(boat.thrust(), 0.0);
    }

    #[test]
    fn test_invalid_axle_count_rejected() {
        let mut params = VehicleParams::default();
        params.axle_count = 9;
        assert!(
            AirboatController::new(BodyHandle(1), &params, 100.0, UnitScale::default()).is_err()
        );
    }
}
