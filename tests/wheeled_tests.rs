mod common;

use common::FlatWorld;
use vehicle_phys::bodies::RigidBody;
use vehicle_phys::core::{BodyStorage, EventQueue, PhysicsEvent, Storage, VehicleEvent};
use vehicle_phys::math::Vector3;
use vehicle_phys::units;
use vehicle_phys::vehicle::{ControlInput, VehicleParams, WheeledVehicleController};
use vehicle_phys::UnitScale;

const DT: f32 = 1.0 / 60.0;
const GRAVITY: Vector3 = Vector3 {
    x: 0.0,
    y: -9.81,
    z: 0.0,
};

fn car_params() -> VehicleParams {
    let mut params = VehicleParams::default();
    for axle in &mut params.axles {
        axle.suspension.spring_constant = 150.0;
        axle.suspension.spring_damping = 15.0;
        axle.suspension.spring_damping_compression = 20.0;
    }
    params
}

/// A car resting on flat ground, wheels at the corners of a 2 x 3 m frame
fn build_car(mass: f32) -> (BodyStorage<RigidBody>, WheeledVehicleController) {
    let mut bodies: BodyStorage<RigidBody> = BodyStorage::new();
    let chassis = bodies.add(RigidBody::new_dynamic(Vector3::new(0.0, 0.3, 0.0), mass));

    let mut car =
        WheeledVehicleController::new(chassis, car_params(), mass, UnitScale::default()).unwrap();

    let corners = [
        Vector3::new(-1.0, 0.0, 1.5),
        Vector3::new(1.0, 0.0, 1.5),
        Vector3::new(-1.0, 0.0, -1.5),
        Vector3::new(1.0, 0.0, -1.5),
    ];
    for (index, corner) in corners.iter().enumerate() {
        let wheel = car.wheel_mut(index).unwrap();
        wheel.hard_point = *corner;
        wheel.raycast_start = *corner;
    }
    car.on_vehicle_enter();

    (bodies, car)
}

fn tick(
    car: &mut WheeledVehicleController,
    bodies: &mut BodyStorage<RigidBody>,
    world: &FlatWorld,
    controls: &ControlInput,
    events: &mut EventQueue,
) {
    let chassis = bodies.get_mut(car.chassis()).unwrap();
    car.update(DT, controls, chassis, world, events);
    chassis.integrate(GRAVITY, DT);
}

#[test]
fn test_full_throttle_approaches_but_never_exceeds_governed_speed() {
    let world = FlatWorld::dry_ground(0.0);
    let (mut bodies, mut car) = build_car(1500.0);
    let mut events = EventQueue::new();

    let controls = ControlInput {
        throttle: 1.0,
        boost: true,
        ..ControlInput::default()
    };

    let boost_max = car.vehicle_params().engine.boost_max_speed;
    let rated_max = car.vehicle_params().engine.max_speed;
    let scale = UnitScale::default();

    let mut top_speed: f32 = 0.0;
    for _ in 0..3600 {
        tick(&mut car, &mut bodies, &world, &controls, &mut events);
        let speed = car.operating_params().speed;
        top_speed = top_speed.max(speed);
        assert!(
            speed <= boost_max * 1.05,
            "governor let the car reach {} (boost max {})",
            units::speed_game_to_mph(speed, &scale),
            units::speed_game_to_mph(boost_max, &scale)
        );
    }

    // The car made real progress toward its rated top speed.
    assert!(
        top_speed > rated_max * 0.5,
        "car only reached {top_speed} of {rated_max} game units/s"
    );
}

#[test]
fn test_transmission_shifts_up_with_speed() {
    let world = FlatWorld::dry_ground(0.0);
    let (mut bodies, mut car) = build_car(1500.0);
    let mut events = EventQueue::new();

    let controls = ControlInput {
        throttle: 1.0,
        ..ControlInput::default()
    };

    assert_eq!(car.operating_params().gear, 0);
    for _ in 0..1200 {
        tick(&mut car, &mut bodies, &world, &controls, &mut events);
    }
    let params = car.operating_params();
    assert!(
        params.gear >= 1,
        "gear stuck at {} with rpm {}",
        params.gear,
        params.engine_rpm
    );
    assert!(params.gear <= 3);
}

#[test]
fn test_handbrake_only_locks_wheels_with_ground_contact() {
    let mut events = EventQueue::new();
    let controls = ControlInput {
        handbrake: true,
        ..ControlInput::default()
    };

    // Airborne: the lock must not engage.
    let world = FlatWorld::dry_ground(-100.0);
    let (mut bodies, mut car) = build_car(1500.0);
    tick(&mut car, &mut bodies, &world, &controls, &mut events);
    for index in 0..car.wheel_count() {
        assert!(!car.wheel_mut(index).unwrap().fixed);
    }

    // On the ground the same input locks every wheel.
    let world = FlatWorld::dry_ground(0.0);
    let (mut bodies, mut car) = build_car(1500.0);
    tick(&mut car, &mut bodies, &world, &controls, &mut events);
    for index in 0..car.wheel_count() {
        assert!(car.wheel_mut(index).unwrap().fixed);
    }
}

#[test]
fn test_powerslide_switches_tire_material() {
    let world = FlatWorld::dry_ground(0.0);
    let (mut bodies, mut car) = build_car(1500.0);
    let mut events = EventQueue::new();

    // Give the wheels distinct skid material so the switch is observable.
    car.vehicle_params_mut().axles[0].wheels.skid_material_index = 42;

    // Fast enough that the handbrake is a powerslide.
    let fast = units::speed_mph_to_game(30.0, &UnitScale::default());
    let fast_sim = units::distance_to_sim(fast, &UnitScale::default());
    bodies
        .get_mut(car.chassis())
        .unwrap()
        .set_linear_velocity(Vector3::new(0.0, 0.0, fast_sim));

    let controls = ControlInput {
        handbrake: true,
        handbrake_left: true,
        ..ControlInput::default()
    };
    tick(&mut car, &mut bodies, &world, &controls, &mut events);

    let mut saw_material_change = false;
    while let Some(event) = events.next() {
        if let PhysicsEvent::Vehicle(VehicleEvent::TireMaterialChanged { material }) = event {
            assert_eq!(material, 42);
            saw_material_change = true;
        }
    }
    assert!(saw_material_change);
}

#[test]
fn test_idle_vehicle_settles_on_suspension() {
    let world = FlatWorld::dry_ground(0.0);
    let (mut bodies, mut car) = build_car(1500.0);
    let mut events = EventQueue::new();
    let controls = ControlInput::default();

    for _ in 0..600 {
        tick(&mut car, &mut bodies, &world, &controls, &mut events);
    }

    let chassis = bodies.get(car.chassis()).unwrap();
    // Suspension holds the frame off the ground with little residual motion.
    assert!(chassis.get_position().y > 0.0);
    assert!(chassis.get_linear_velocity().length() < 0.5);
    let params = car.operating_params();
    assert_eq!(params.wheels_in_contact, 4);
    assert_eq!(params.wheels_not_in_contact, 0);
}

#[test]
fn test_reentry_unlocks_parked_wheels() {
    let (_bodies, mut car) = build_car(1500.0);
    let mut events = EventQueue::new();

    // Exiting parks the vehicle with the wheels locked.
    car.on_vehicle_exit(&mut events);
    for index in 0..car.wheel_count() {
        assert!(car.wheel_mut(index).unwrap().fixed);
    }

    // Climbing back in releases them.
    car.on_vehicle_enter();
    for index in 0..car.wheel_count() {
        assert!(!car.wheel_mut(index).unwrap().fixed);
    }
}

#[test]
fn test_template_round_trip_preserves_tuning() {
    let (bodies, car) = build_car(1500.0);
    let chassis = bodies.get(car.chassis()).unwrap();

    let template = car.write_to_template(chassis);
    let restored = WheeledVehicleController::init_from_template(&template, UnitScale::default());

    assert_eq!(restored.chassis(), car.chassis());
    assert_eq!(restored.wheel_count(), car.wheel_count());
    let original_engine = &car.vehicle_params().engine;
    let restored_engine = &restored.vehicle_params().engine;
    assert_eq!(original_engine.gear_count, restored_engine.gear_count);
    assert!((original_engine.max_speed - restored_engine.max_speed).abs() < 1e-4);
    assert!((original_engine.horsepower - restored_engine.horsepower).abs() < 1e-4);
}
