//! Raycast suspension shared by the wheeled and floating vehicle
//! controllers.
//!
//! A [`WheelPoint`] is a virtual wheel or pontoon: it has no collision
//! geometry of its own and finds its ground or water contact by casting a
//! ray each tick. The cast produces one [`Impact`] per point per tick; the
//! controllers turn impacts into spring, buoyancy, drive and drag impulses.

use crate::bodies::RigidBody;
use crate::math::{clamp, remap_clamped, Ray, Vector3, EPSILON};
use crate::trace::SurfaceTrace;

use log::warn;

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// Maximum number of wheel points a controller supports
pub const MAX_WHEEL_COUNT: usize = 10;

/// Length of the vertical probe used to measure submersion depth, meters
const WATER_DEPTH_PROBE_LENGTH: f32 = 25.4;

/// A single suspension contact point in the chassis-local sim frame
/// (+Z forward, +Y up, +X lateral, meters)
#[derive(Debug, Clone)]
pub struct WheelPoint {
    /// Hard-point position on the chassis
    pub hard_point: Vector3,

    /// Raycast start offset on the chassis
    pub raycast_start: Vector3,

    /// Raycast direction (unit, normally straight down)
    pub raycast_dir: Vector3,

    /// Maximum ray length for this tick; recomputed every cast, never
    /// persisted across ticks
    pub raycast_length: f32,

    /// Measured distance to the impact from the last cast
    pub raycast_dist: f32,

    /// Spring constant (mass-independent, N/kg per meter)
    pub spring_constant: f32,

    /// Damping applied while the spring is extending
    pub spring_damp_relax: f32,

    /// Damping applied while the spring is compressing
    pub spring_damp_compress: f32,

    /// Rest length of the spring including pre-tension
    pub spring_rest_length: f32,

    /// Friction coefficient of the wheel itself
    pub friction: f32,

    /// Wheel radius
    pub radius: f32,

    /// Cached inverse of the wheel radius
    pub inv_radius: f32,

    /// Drive/brake torque currently applied to this wheel
    pub torque: f32,

    /// Estimated wheel spin rate, radians per second
    pub angular_velocity: f32,

    /// Spin rate ceiling derived from the engine's top speed
    pub max_rotation_speed: f32,

    /// Handbrake lock: a fixed wheel does not roll
    pub fixed: bool,

    /// Wheel rotation axis, rotated around +Y by the steering angle
    pub axis_direction: Vector3,
}

impl WheelPoint {
    /// Creates a wheel point at a hard point, casting straight down
    pub fn new(hard_point: Vector3, raycast_start: Vector3, radius: f32) -> Self {
        let radius = radius.max(EPSILON);
        Self {
            hard_point,
            raycast_start,
            raycast_dir: Vector3::new(0.0, -1.0, 0.0),
            raycast_length: 0.0,
            raycast_dist: 0.0,
            spring_constant: 0.0,
            spring_damp_relax: 0.0,
            spring_damp_compress: 0.0,
            spring_rest_length: 0.0,
            friction: 1.0,
            radius,
            inv_radius: 1.0 / radius,
            torque: 0.0,
            angular_velocity: 0.0,
            max_rotation_speed: f32::MAX,
            fixed: false,
            axis_direction: Vector3::unit_x(),
        }
    }

    /// Points the wheel's rotation axis for a steering angle in radians,
    /// rotating the lateral axis around the chassis up axis
    pub fn steer(&mut self, angle: f32) {
        let (sin, cos) = angle.sin_cos();
        self.axis_direction = Vector3::new(cos, 0.0, -sin);
    }
}

/// Groups wheel points into an axle with shared distribution factors
#[derive(Debug, Clone, Copy)]
pub struct Axle {
    /// Index of the first wheel on this axle
    pub first_wheel: usize,

    /// Number of wheels on this axle
    pub wheel_count: usize,

    /// Anti-sway stabilizer constant
    pub stabilizer_constant: f32,

    /// Share of engine torque routed to this axle (normalized by the
    /// controller so shares sum to one)
    pub torque_factor: f32,

    /// Share of brake torque routed to this axle
    pub brake_factor: f32,
}

/// The result of one wheel point's raycast for the current tick. Fully
/// recomputed every cast; carries no cross-tick identity.
#[derive(Debug, Clone, Copy)]
pub struct Impact {
    /// Whether the ray hit a surface
    pub hit: bool,

    /// Whether the hit surface is water
    pub hit_water: bool,

    /// Whether the ray start point was already submerged
    pub in_water: bool,

    /// World-space impact point (recomputed from the wheel, not the trace)
    pub point: Vector3,

    /// World-space surface normal at the impact
    pub normal: Vector3,

    /// Submersion depth of the contact, meters
    pub depth: f32,

    /// Friction of the contacted surface times the wheel friction
    pub friction: f32,

    /// Dampening of the contacted surface
    pub dampening: f32,

    /// Identifier of the contacted surface
    pub surface_id: u32,

    /// World-space cast direction (inverted when cast out of water)
    pub cast_dir: Vector3,

    /// Inverse portion of the surface normal along the cast direction,
    /// used to scale spring response on steep surfaces
    pub inv_normal_dot_dir: f32,

    /// Chassis surface speed at the impact point
    pub surface_speed: Vector3,

    /// Surface speed projected onto the contact plane
    pub projected_surface_speed: Vector3,

    /// Wheel rotation axis in world space
    pub axis_direction: Vector3,

    /// Rotation axis projected onto the contact plane, normalized.
    /// Invalid when `usable` is false.
    pub projected_axis_direction: Vector3,

    /// Measured ray distance
    pub distance: f32,

    /// False when the projected axis failed to normalize; force terms
    /// that depend on it are skipped for this tick
    pub usable: bool,
}

impl Impact {
    fn empty() -> Self {
        Self {
            hit: false,
            hit_water: false,
            in_water: false,
            point: Vector3::zero(),
            normal: Vector3::zero(),
            depth: 0.0,
            friction: 1.0,
            dampening: 0.0,
            surface_id: 0,
            cast_dir: Vector3::zero(),
            inv_normal_dot_dir: 1.0,
            surface_speed: Vector3::zero(),
            projected_surface_speed: Vector3::zero(),
            axis_direction: Vector3::unit_x(),
            projected_axis_direction: Vector3::unit_x(),
            distance: 0.0,
            usable: true,
        }
    }
}

/// Tuning for water-aware casts (pontoons)
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct WaterCastParams {
    /// Default ray length, meters
    pub default_length: f32,

    /// Shortened waterline probe length when the endpoint is submerged
    pub water_length_low: f32,

    /// Lengthened probe for front pontoons at full forward speed
    pub water_length_high: f32,

    /// Wave noise amplitude at rest / at full speed
    pub noise_max: f32,
    pub noise_min: f32,

    /// Wave noise frequency at rest / at full speed
    pub freq_min: f32,
    pub freq_max: f32,

    /// Phase spread between paired pontoons at low speed, seconds
    pub phase_max: f32,

    /// Number of leading points treated as the paired front pontoons
    pub front_point_count: usize,

    /// Forward speed at which the lift blend saturates, m/s
    pub lift_saturation_speed: f32,

    /// Total speed at which the noise blend saturates, m/s
    pub noise_saturation_speed: f32,
}

impl Default for WaterCastParams {
    fn default() -> Self {
        Self {
            default_length: 0.35,
            water_length_low: 0.1,
            water_length_high: 0.35,
            noise_max: 0.03,
            noise_min: 0.01,
            freq_min: 1.5,
            freq_max: 1.5,
            phase_max: 1.5,
            front_point_count: 2,
            lift_saturation_speed: 10.0,
            noise_saturation_speed: 15.0,
        }
    }
}

/// How a batch of wheel points should be cast
#[derive(Debug, Clone, Copy)]
pub enum CastMode {
    /// Plain ground probes: each wheel uses its own ray length
    Ground,

    /// Water-aware probes with waterline clamping and wave noise
    Water(WaterCastParams),
}

/// Returns an amount to add to a front pontoon raycast to simulate wave
/// motion: a sinusoid whose amplitude falls and whose phase spread between
/// the paired points collapses as speed rises. Pure in its inputs, so the
/// bob is continuous and repeatable.
pub fn wave_noise(params: &WaterCastParams, point_index: usize, speed_ratio: f32, time: f32) -> f32 {
    let amplitude = remap_clamped(1.0 - speed_ratio, 0.0, 1.0, params.noise_min, params.noise_max);

    let mut phase = 0.0;
    if speed_ratio < 0.3 {
        phase = point_index as f32 * params.phase_max;
    }

    let frequency = remap_clamped(speed_ratio, 0.0, 1.0, params.freq_min, params.freq_max);

    amplitude * (frequency * (time + phase)).sin()
}

/// Casts every wheel point against the world and fills one [`Impact`] per
/// point. `sim_time` feeds the wave noise; `thrust_active` halves the
/// forward lift blend when the turbine is idle.
pub fn cast_wheels(
    wheels: &mut [WheelPoint],
    chassis: &RigidBody,
    trace: &dyn SurfaceTrace,
    mode: &CastMode,
    sim_time: f32,
    thrust_active: bool,
) -> Vec<Impact> {
    let transform = chassis.get_transform();
    let velocity = chassis.get_linear_velocity();
    let speed = velocity.length();
    let local_velocity = transform.inverse_transform_direction(velocity);

    let mut impacts = vec![Impact::empty(); wheels.len()];
    let mut starts = vec![Vector3::zero(); wheels.len()];
    let mut dirs = vec![Vector3::zero(); wheels.len()];
    let mut lengths = vec![0.0f32; wheels.len()];

    let (speed_ratio, forward_speed_ratio, water) = match mode {
        CastMode::Ground => (0.0, 0.0, None),
        CastMode::Water(params) => {
            let mut forward = clamp(local_velocity.z / params.lift_saturation_speed, 0.0, 1.0);
            if !thrust_active {
                forward *= 0.5;
            }
            let total = clamp(speed / params.noise_saturation_speed, 0.0, 1.0);
            (total, forward, Some(*params))
        }
    };

    // Set up each ray: world start/direction, water handling, wave noise.
    let mut front_points_in_water = 0;
    for (i, wheel) in wheels.iter().enumerate() {
        let impact = &mut impacts[i];

        starts[i] = transform.transform_point(wheel.raycast_start);
        dirs[i] = transform.transform_direction(wheel.raycast_dir);
        lengths[i] = match &water {
            Some(params) => params.default_length,
            None => wheel.raycast_length.max(0.0),
        };

        if let Some(params) = &water {
            // A submerged start point casts up out of the fluid instead, so
            // a boat resting on the bottom still finds the water surface.
            if trace.point_in_water(starts[i]) {
                dirs[i] = -dirs[i];
                impact.in_water = true;
            }

            let end = starts[i] + dirs[i] * lengths[i];
            if trace.point_in_water(end) {
                lengths[i] = params.water_length_low;
                if i < params.front_point_count {
                    front_points_in_water += 1;
                    lengths[i] += wave_noise(params, i, speed_ratio, sim_time);
                }
            }
        }
    }

    // With both front pontoons in the water, lift them out in proportion to
    // forward speed. Doing it to only one of the pair would twist the hull.
    if let Some(params) = &water {
        if front_points_in_water == params.front_point_count && front_points_in_water > 0 {
            for i in 0..params.front_point_count.min(wheels.len()) {
                lengths[i] = remap_clamped(
                    forward_speed_ratio,
                    0.0,
                    1.0,
                    params.water_length_low,
                    params.water_length_high,
                );
                lengths[i] += wave_noise(params, i, speed_ratio, sim_time);
            }
        }
    }

    // Trace and record surface data.
    for i in 0..wheels.len() {
        let impact = &mut impacts[i];
        let ray = Ray::new(starts[i], dirs[i]);

        let result = if impact.in_water {
            // Start is underwater: trace up to find the surface, and probe
            // straight up for the submersion depth.
            let result = trace.trace_ray(&ray, lengths[i]);
            impact.depth = water_depth(trace, starts[i]);
            result
        } else {
            trace.trace_ray_with_water(&ray, lengths[i])
        };

        if result.fraction < 1.0 {
            impact.hit = true;
            impact.depth = if result.hit_water {
                impact.hit_water = true;
                water_depth(trace, result.end_position)
            } else {
                0.0
            };
            impact.point = result.end_position;
            impact.normal = result.normal;
            impact.surface_id = result.surface_id;
            impact.friction = result.surface_friction;
            impact.dampening = result.surface_dampening;
        }
    }

    // Derive the per-point response data from the trace results.
    for (i, wheel) in wheels.iter_mut().enumerate() {
        let impact = &mut impacts[i];

        wheel.raycast_length = lengths[i].max(0.0);
        impact.cast_dir = dirs[i];

        if impact.hit {
            impact.distance = (impact.point - starts[i]).length();
            impact.inv_normal_dot_dir =
                1.1 / (impact.cast_dir.dot(&impact.normal).abs() + 0.1);
            impact.friction *= wheel.friction;
        } else {
            impact.distance = wheel.raycast_length;
            impact.inv_normal_dot_dir = 1.0;
            impact.normal = -impact.cast_dir;
            impact.friction = 1.0;
        }
        wheel.raycast_dist = impact.distance;

        // Contact point is measured from the wheel along the cast, not
        // taken from the trace end position.
        impact.point = starts[i] + impact.cast_dir * impact.distance;

        impact.surface_speed = chassis.velocity_at_point(impact.point);
        impact.projected_surface_speed = impact.surface_speed.reject(&impact.normal);

        impact.axis_direction = transform.transform_direction(wheel.axis_direction);
        let mut projected = impact.axis_direction.reject(&impact.normal);
        match projected.try_normalize_mut() {
            Some(_) => impact.projected_axis_direction = projected,
            None => {
                warn!("wheel {i}: projected axis direction failed to normalize, skipping point this tick");
                impact.usable = false;
            }
        }
    }

    impacts
}

/// Measures how deep a point sits below the fluid surface by probing
/// straight up through the fluid
fn water_depth(trace: &dyn SurfaceTrace, point: Vector3) -> f32 {
    let probe = Ray::new(point, Vector3::unit_y());
    let result = trace.trace_ray_with_water(&probe, WATER_DEPTH_PROBE_LENGTH);
    WATER_DEPTH_PROBE_LENGTH * result.fraction_left_solid
}

/// Computes the spring-damper impulse for a ground impact, or None when the
/// spring is not compressed. The impulse acts along the surface normal at
/// the impact point.
pub fn ground_spring_impulse(wheel: &WheelPoint, impact: &Impact, dt: f32) -> Option<Vector3> {
    let diff = wheel.raycast_dist - wheel.raycast_length;
    if diff >= 0.0 {
        return None;
    }

    let mut force = -diff * wheel.spring_constant;
    force *= clamp(impact.inv_normal_dot_dir, 0.0, 3.0);

    // Damping is sign-dependent: relax damping while the spring extends,
    // compression damping while it closes.
    let speed_delta = impact.projected_surface_speed - impact.surface_speed;
    let spring_speed = speed_delta.dot(&impact.cast_dir);
    if spring_speed > 0.0 {
        force -= wheel.spring_damp_relax * spring_speed;
    } else {
        force -= wheel.spring_damp_compress * spring_speed;
    }

    if force < 0.0 {
        force = 0.0;
    }

    // Spring constants are mass-independent, so no mass factor here.
    Some(impact.normal * (force * dt))
}

/// Tuning for the pontoon buoyancy response
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct PontoonParams {
    /// Overall buoyancy gain
    pub buoyancy_scalar: f32,

    /// Combined waterline cross-section of the pontoons, square meters
    pub area: f32,

    /// Physical pontoon height; submerged volume clamps here, meters
    pub height: f32,

    /// Draft factor converting probe depth into effective draft
    pub draft_scale: f32,

    /// Fluid density, kg/m^3
    pub fluid_density: f32,
}

impl Default for PontoonParams {
    fn default() -> Self {
        Self {
            buoyancy_scalar: 1.6,
            area: 2.8,
            height: 0.41,
            draft_scale: 0.0254,
            fluid_density: 1000.0,
        }
    }
}

/// Computes the upward buoyancy impulse one contact point contributes.
/// The force is proportional to the displaced water mass, split across the
/// craft's contact points, and is exactly zero at zero depth and clamped at
/// the pontoon height.
pub fn buoyancy_impulse(
    params: &PontoonParams,
    mass: f32,
    depth: f32,
    point_count: usize,
    dt: f32,
) -> Vector3 {
    if point_count == 0 {
        return Vector3::zero();
    }

    let depth = clamp(depth, 0.0, params.height);
    let submerged_volume = params.area * depth * params.draft_scale;

    let force = params.buoyancy_scalar * (1.0 / point_count as f32)
        * mass
        * submerged_volume
        * params.fluid_density;

    Vector3::new(0.0, force * dt, 0.0)
}

/// Counts the points whose raycast found a surface this tick
pub fn count_surface_contacts(impacts: &[Impact]) -> usize {
    impacts.iter().filter(|impact| impact.hit).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wave_noise_is_repeatable() {
        let params = WaterCastParams::default();
        let a = wave_noise(&params, 0, 0.2, 1.5);
        let b = wave_noise(&params, 0, 0.2, 1.5);
        assert_eq!(a, b);
    }

    #[test]
    fn test_wave_noise_phase_differs_between_pair_at_low_speed() {
        let params = WaterCastParams::default();
        let left = wave_noise(&params, 0, 0.0, 0.4);
        let right = wave_noise(&params, 1, 0.0, 0.4);
        assert_ne!(left, right);

        // At high speed the phase spread collapses.
        let left = wave_noise(&params, 0, 0.9, 0.4);
        let right = wave_noise(&params, 1, 0.9, 0.4);
        assert_eq!(left, right);
    }

    #[test]
    fn test_wave_noise_amplitude_decreases_with_speed() {
        let params = WaterCastParams::default();
        let slow: f32 = (0..100)
            .map(|i| wave_noise(&params, 0, 0.0, i as f32 * 0.1).abs())
            .fold(0.0, f32::max);
        let fast: f32 = (0..100)
            .map(|i| wave_noise(&params, 0, 1.0, i as f32 * 0.1).abs())
            .fold(0.0, f32::max);
        assert!(slow > fast);
    }

    #[test]
    fn test_buoyancy_zero_at_surface_and_clamped_at_height() {
        let params = PontoonParams::default();
        let dt = 0.01;
        assert!(buoyancy_impulse(&params, 100.0, 0.0, 4, dt).is_zero());

        let at_height = buoyancy_impulse(&params, 100.0, params.height, 4, dt);
        let beyond = buoyancy_impulse(&params, 100.0, params.height * 3.0, 4, dt);
        assert_eq!(at_height, beyond);
    }

    #[test]
    fn test_buoyancy_monotonic_in_depth() {
        let params = PontoonParams::default();
        let mut prev = -1.0;
        for i in 0..50 {
            let depth = i as f32 * 0.02;
            let impulse = buoyancy_impulse(&params, 100.0, depth, 4, 0.01).y;
            assert!(impulse >= prev);
            prev = impulse;
        }
    }

    #[test]
    fn test_spring_impulse_zero_when_not_compressed() {
        let mut wheel = WheelPoint::new(Vector3::zero(), Vector3::zero(), 0.3);
        wheel.spring_constant = 100.0;
        wheel.raycast_length = 0.35;
        wheel.raycast_dist = 0.35;
        let impact = Impact::empty();
        assert!(ground_spring_impulse(&wheel, &impact, 0.01).is_none());
    }

    #[test]
    fn test_spring_impulse_never_negative() {
        let mut wheel = WheelPoint::new(Vector3::zero(), Vector3::zero(), 0.3);
        wheel.spring_constant = 50.0;
        wheel.spring_damp_relax = 1000.0;
        wheel.raycast_length = 0.35;
        wheel.raycast_dist = 0.30;

        let mut impact = Impact::empty();
        impact.normal = Vector3::unit_y();
        impact.cast_dir = Vector3::new(0.0, -1.0, 0.0);
        // A fast upward (extending) chassis drives the raw force negative
        // through the relax damping term; the floor must clamp it to zero,
        // not flip the impulse sign.
        impact.surface_speed = Vector3::new(0.0, 40.0, 0.0);
        impact.projected_surface_speed = Vector3::zero();

        if let Some(v) = ground_spring_impulse(&wheel, &impact, 0.01) {
            assert!(v.y >= 0.0);
        }
    }
}
