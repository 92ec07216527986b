mod common;

use common::FlatWorld;
use rand::{Rng, SeedableRng};
use vehicle_phys::bodies::RigidBody;
use vehicle_phys::math::Vector3;
use vehicle_phys::suspension::{
    cast_wheels, ground_spring_impulse, CastMode, WaterCastParams, WheelPoint,
};

fn chassis_at(height: f32) -> RigidBody {
    RigidBody::new_dynamic(Vector3::new(0.0, height, 0.0), 100.0)
}

fn basic_wheel() -> WheelPoint {
    let mut wheel = WheelPoint::new(Vector3::zero(), Vector3::zero(), 0.3);
    wheel.raycast_length = 0.5;
    wheel.spring_constant = 100.0;
    wheel.spring_damp_relax = 5.0;
    wheel.spring_damp_compress = 8.0;
    wheel
}

#[test]
fn test_ground_cast_hits_and_reports_surface() {
    let world = FlatWorld::dry_ground(0.0);
    let chassis = chassis_at(0.4);
    let mut wheels = vec![basic_wheel()];

    let impacts = cast_wheels(&mut wheels, &chassis, &world, &CastMode::Ground, 0.0, false);

    assert_eq!(impacts.len(), 1);
    let impact = &impacts[0];
    assert!(impact.hit);
    assert!(!impact.hit_water);
    assert_eq!(impact.normal, Vector3::unit_y());
    assert_eq!(impact.surface_id, 1);
    assert!((impact.distance - 0.4).abs() < 1e-4);
    assert!((wheels[0].raycast_dist - 0.4).abs() < 1e-4);
}

#[test]
fn test_airborne_cast_reports_miss_but_fills_impact() {
    let world = FlatWorld::dry_ground(0.0);
    let chassis = chassis_at(10.0);
    let mut wheels = vec![basic_wheel()];

    let impacts = cast_wheels(&mut wheels, &chassis, &world, &CastMode::Ground, 0.0, false);

    let impact = &impacts[0];
    assert!(!impact.hit);
    // A miss still carries usable aggregate data: the distance is the full
    // ray and the normal opposes the cast.
    assert!((impact.distance - wheels[0].raycast_length).abs() < 1e-5);
    assert_eq!(impact.normal, Vector3::unit_y());
    assert!(impact.usable);
}

#[test]
fn test_submerged_start_inverts_cast_and_measures_depth() {
    let world = FlatWorld::lake(0.0, -50.0);
    let chassis = chassis_at(-0.2);
    let mut wheels = vec![basic_wheel()];

    let impacts = cast_wheels(
        &mut wheels,
        &chassis,
        &world,
        &CastMode::Water(WaterCastParams::default()),
        0.0,
        false,
    );

    let impact = &impacts[0];
    assert!(impact.in_water);
    assert!(!impact.hit);
    // The upward probe reports how far below the surface the point sits.
    assert!((impact.depth - 0.2).abs() < 1e-3);
    // The cast direction was inverted to point up out of the fluid.
    assert!(impact.cast_dir.y > 0.0);
}

#[test]
fn test_water_endpoint_clamps_ray_length() {
    let params = WaterCastParams::default();
    let world = FlatWorld::lake(0.0, -50.0);
    // Start just above the surface so the default-length endpoint lands in
    // the water.
    let chassis = chassis_at(0.05);
    let mut wheels = vec![basic_wheel(), basic_wheel()];
    wheels[1].raycast_start = Vector3::new(1.0, 0.0, 0.0);

    let impacts = cast_wheels(
        &mut wheels,
        &chassis,
        &world,
        &CastMode::Water(params),
        0.25,
        false,
    );

    for wheel in &wheels {
        // Clamped to the waterline probe plus at most the wave noise.
        assert!(wheel.raycast_length <= params.water_length_low + params.noise_max + 1e-4);
        assert!(wheel.raycast_length >= 0.0);
    }
    assert!(impacts[0].hit && impacts[0].hit_water);
}

#[test]
fn test_front_pair_lift_grows_with_forward_speed() {
    let params = WaterCastParams::default();
    let world = FlatWorld::lake(0.0, -50.0);

    let mut slow_chassis = chassis_at(0.05);
    slow_chassis.set_linear_velocity(Vector3::zero());
    let mut fast_chassis = chassis_at(0.05);
    fast_chassis.set_linear_velocity(Vector3::new(0.0, 0.0, params.lift_saturation_speed));

    let mut slow_wheels = vec![basic_wheel(), basic_wheel()];
    slow_wheels[1].raycast_start = Vector3::new(1.0, 0.0, 0.0);
    let mut fast_wheels = slow_wheels.clone();

    // Same cast time so the wave noise term is identical.
    let time = 0.7;
    cast_wheels(
        &mut slow_wheels,
        &slow_chassis,
        &world,
        &CastMode::Water(params),
        time,
        true,
    );
    cast_wheels(
        &mut fast_wheels,
        &fast_chassis,
        &world,
        &CastMode::Water(params),
        time,
        true,
    );

    // Forward speed lengthens the front probes, lifting the nose.
    assert!(fast_wheels[0].raycast_length > slow_wheels[0].raycast_length);
}

#[test]
fn test_spring_force_non_negative_over_random_inputs() {
    let mut rng = rand::rngs::StdRng::seed_from_u64(0x5EED);
    let dt = 1.0 / 60.0;

    for _ in 0..2000 {
        let mut wheel = basic_wheel();
        wheel.spring_constant = rng.gen_range(0.0..5000.0);
        wheel.spring_damp_relax = rng.gen_range(0.0..500.0);
        wheel.spring_damp_compress = rng.gen_range(0.0..500.0);
        wheel.raycast_length = rng.gen_range(0.0..1.0);
        wheel.raycast_dist = rng.gen_range(0.0..1.0);

        let world = FlatWorld::dry_ground(0.0);
        let chassis = {
            let mut body = chassis_at(wheel.raycast_dist);
            body.set_linear_velocity(Vector3::new(
                rng.gen_range(-30.0..30.0),
                rng.gen_range(-30.0..30.0),
                rng.gen_range(-30.0..30.0),
            ));
            body
        };
        let mut wheels = vec![wheel];
        let impacts = cast_wheels(&mut wheels, &chassis, &world, &CastMode::Ground, 0.0, false);

        if let Some(impulse) = ground_spring_impulse(&wheels[0], &impacts[0], dt) {
            // The impulse acts along the surface normal and never pulls the
            // chassis down into the ground.
            assert!(
                impulse.dot(&impacts[0].normal) >= 0.0,
                "spring impulse must not be attractive: {impulse:?}"
            );
        }
    }
}

#[test]
fn test_zero_travel_wheel_produces_no_force() {
    let mut wheel = basic_wheel();
    wheel.raycast_length = 0.0;
    wheel.raycast_dist = 0.0;

    let world = FlatWorld::dry_ground(0.0);
    let chassis = chassis_at(0.0);
    let mut wheels = vec![wheel];
    let impacts = cast_wheels(&mut wheels, &chassis, &world, &CastMode::Ground, 0.0, false);

    assert!(ground_spring_impulse(&wheels[0], &impacts[0], 1.0 / 60.0).is_none());
}
