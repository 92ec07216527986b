mod common;

use common::FlatWorld;
use vehicle_phys::bodies::RigidBody;
use vehicle_phys::core::{BodyStorage, EventQueue, Storage};
use vehicle_phys::math::Vector3;
use vehicle_phys::vehicle::{AirboatController, ControlInput, VehicleParams};
use vehicle_phys::UnitScale;

const DT: f32 = 1.0 / 60.0;
const GRAVITY: Vector3 = Vector3 {
    x: 0.0,
    y: -9.81,
    z: 0.0,
};

/// Stiff enough suspension that the hull floats on the water surface
fn airboat_params() -> VehicleParams {
    let mut params = VehicleParams::default();
    for axle in &mut params.axles {
        axle.suspension.spring_constant = 300.0;
        axle.suspension.spring_damping = 30.0;
        axle.suspension.spring_damping_compression = 40.0;
    }
    params
}

/// Builds an airboat and its chassis; pontoon points are placed at the
/// four corners of a 1 x 2 meter hull
fn build_airboat(height: f32, mass: f32) -> (BodyStorage<RigidBody>, AirboatController) {
    let mut bodies: BodyStorage<RigidBody> = BodyStorage::new();
    let chassis = bodies.add(RigidBody::new_dynamic(Vector3::new(0.0, height, 0.0), mass));

    let mut boat =
        AirboatController::new(chassis, &airboat_params(), mass, UnitScale::default()).unwrap();

    let corners = [
        Vector3::new(-0.5, 0.0, 1.0),
        Vector3::new(0.5, 0.0, 1.0),
        Vector3::new(-0.5, 0.0, -1.0),
        Vector3::new(0.5, 0.0, -1.0),
    ];
    for (index, corner) in corners.iter().enumerate() {
        let wheel = boat.wheel_mut(index).unwrap();
        wheel.hard_point = *corner;
        wheel.raycast_start = *corner;
    }

    (bodies, boat)
}

fn tick(
    boat: &mut AirboatController,
    bodies: &mut BodyStorage<RigidBody>,
    world: &FlatWorld,
    controls: &ControlInput,
    events: &mut EventQueue,
) {
    let chassis = bodies.get_mut(boat.chassis()).unwrap();
    boat.update(DT, controls, chassis, world, events);
    chassis.integrate(GRAVITY, DT);
}

#[test]
fn test_stationary_airboat_reaches_hover_equilibrium() {
    let world = FlatWorld::lake(0.0, -50.0);
    // All four pontoons start half a pontoon height under water.
    let (mut bodies, mut boat) = build_airboat(-0.205, 100.0);
    let controls = ControlInput::default();
    let mut events = EventQueue::new();

    for _ in 0..1800 {
        tick(&mut boat, &mut bodies, &world, &controls, &mut events);
    }

    // Steady hover: averaged over a window, buoyancy balances gravity
    // (zero mean vertical acceleration and no net drift). The wave bob
    // keeps the instantaneous velocity from ever being exactly zero.
    let mut velocity_sum = 0.0;
    let start_height = bodies.get(boat.chassis()).unwrap().get_position().y;
    let window = 300;
    for _ in 0..window {
        tick(&mut boat, &mut bodies, &world, &controls, &mut events);
        velocity_sum += bodies.get(boat.chassis()).unwrap().get_linear_velocity().y;
    }
    let chassis = bodies.get(boat.chassis()).unwrap();
    let mean_velocity = velocity_sum / window as f32;
    let drift = chassis.get_position().y - start_height;

    assert!(
        mean_velocity.abs() < 0.1,
        "mean vertical velocity {mean_velocity} m/s, expected a balanced hover"
    );
    assert!(
        drift.abs() < 0.25,
        "hull drifted {drift} m over the sample window"
    );
    let height = chassis.get_position().y;
    assert!(
        height > -0.5 && height < 0.5,
        "hull settled at {height}, expected near the surface"
    );
}

#[test]
fn test_weak_jump_classification() {
    // No water, ground far below: airborne from the first tick.
    let world = FlatWorld::dry_ground(-100.0);
    let controls = ControlInput::default();
    let mut events = EventQueue::new();

    // Slow launch: a weak jump.
    let (mut bodies, mut boat) = build_airboat(10.0, 100.0);
    tick(&mut boat, &mut bodies, &world, &controls, &mut events);
    assert!(boat.is_airborne());
    assert!(boat.is_weak_jump());

    // Fast launch: a strong jump keeps full control.
    let (mut bodies, mut boat) = build_airboat(10.0, 100.0);
    bodies
        .get_mut(boat.chassis())
        .unwrap()
        .set_linear_velocity(Vector3::new(0.0, 0.0, 15.0));
    tick(&mut boat, &mut bodies, &world, &controls, &mut events);
    assert!(boat.is_airborne());
    assert!(!boat.is_weak_jump());
}

#[test]
fn test_landing_clears_jump_flags() {
    let world = FlatWorld::dry_ground(-100.0);
    let mut events = EventQueue::new();
    let controls = ControlInput::default();

    let (mut bodies, mut boat) = build_airboat(10.0, 100.0);
    tick(&mut boat, &mut bodies, &world, &controls, &mut events);
    assert!(boat.is_weak_jump());

    // Teleport onto the ground; the next contact clears both flags.
    bodies
        .get_mut(boat.chassis())
        .unwrap()
        .set_position(Vector3::new(0.0, -99.9, 0.0));
    bodies
        .get_mut(boat.chassis())
        .unwrap()
        .set_linear_velocity(Vector3::zero());
    tick(&mut boat, &mut bodies, &world, &controls, &mut events);
    assert!(!boat.is_airborne());
    assert!(!boat.is_weak_jump());
}

#[test]
fn test_turbine_accelerates_forward() {
    let world = FlatWorld::lake(0.0, -50.0);
    let (mut bodies, mut boat) = build_airboat(-0.02, 100.0);
    let mut events = EventQueue::new();

    let controls = ControlInput {
        throttle: 1.0,
        ..ControlInput::default()
    };

    for _ in 0..120 {
        tick(&mut boat, &mut bodies, &world, &controls, &mut events);
    }

    let forward_speed = bodies.get(boat.chassis()).unwrap().get_linear_velocity().z;
    assert!(
        forward_speed > 1.0,
        "turbine should push the boat forward, got {forward_speed} m/s"
    );
}

#[test]
fn test_steering_sign_holds_while_turning_without_thrust() {
    let world = FlatWorld::lake(0.0, -50.0);
    let (mut bodies, mut boat) = build_airboat(-0.02, 100.0);
    let mut events = EventQueue::new();

    // Reverse thrust flips the steering direction.
    let reverse = ControlInput {
        throttle: -1.0,
        ..ControlInput::default()
    };
    tick(&mut boat, &mut bodies, &world, &reverse, &mut events);

    // Now drift forward while holding a turn with no thrust: the reversed
    // steering sign must not flip mid-turn.
    bodies
        .get_mut(boat.chassis())
        .unwrap()
        .set_linear_velocity(Vector3::new(0.0, 0.0, 5.0));
    let turning = ControlInput {
        throttle: 0.0,
        steering: 0.6,
        ..ControlInput::default()
    };
    for _ in 0..30 {
        tick(&mut boat, &mut bodies, &world, &turning, &mut events);
    }

    let params = boat.operating_params();
    assert!(params.steering_angle > 0.0);
    // The drift did not destroy the contact count bookkeeping either.
    assert_eq!(
        params.wheels_in_contact + params.wheels_not_in_contact,
        boat.wheel_count()
    );
}

#[test]
fn test_exit_damps_hull_enter_releases_it() {
    let (mut bodies, mut boat) = build_airboat(-0.02, 100.0);

    let chassis = bodies.get_mut(boat.chassis()).unwrap();
    boat.on_vehicle_exit(chassis);
    assert!(!boat.is_occupied());
    assert!(chassis.get_linear_damping() > 0.0);

    boat.on_vehicle_enter(chassis);
    assert!(boat.is_occupied());
    assert_eq!(chassis.get_linear_damping(), 0.0);
}

#[test]
fn test_template_round_trip_preserves_pontoons() {
    let (mut bodies, mut boat) = build_airboat(-0.02, 100.0);
    let world = FlatWorld::lake(0.0, -50.0);
    let mut events = EventQueue::new();

    // Run a few ticks so the snapshot carries real state, not defaults.
    let reverse = ControlInput {
        throttle: -1.0,
        ..ControlInput::default()
    };
    for _ in 0..10 {
        tick(&mut boat, &mut bodies, &world, &reverse, &mut events);
    }

    let template = boat.write_to_template();
    let mut restored =
        AirboatController::init_from_template(&template, UnitScale::default()).unwrap();

    assert_eq!(restored.chassis(), boat.chassis());
    assert_eq!(restored.wheel_count(), boat.wheel_count());

    // Restored pontoon placements match the source exactly.
    for index in 0..boat.wheel_count() {
        let a = boat.wheel_mut(index).unwrap().hard_point;
        let b = restored.wheel_mut(index).unwrap().hard_point;
        assert!((a - b).length() < 1e-4);
    }
}
