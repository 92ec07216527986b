use vehicle_phys::bodies::RigidBody;
use vehicle_phys::constraints::{
    AxisLimit, BallSocketParams, BreakableParams, ConstraintKind, ConstraintSet, GroupParams,
    HingeParams, LengthParams, PulleyParams, RagdollParams, UNBREAKABLE_LIMIT,
};
use vehicle_phys::core::{
    BodyHandle, BodyStorage, ConstraintEvent, EventQueue, PhysicsEvent, Storage,
};
use vehicle_phys::math::{to_radians, Vector3};

const DT: f32 = 1.0 / 60.0;
const GRAVITY: Vector3 = Vector3 {
    x: 0.0,
    y: -9.81,
    z: 0.0,
};

fn anchored_pair(mass: f32) -> (BodyStorage<RigidBody>, BodyHandle, BodyHandle) {
    let mut bodies: BodyStorage<RigidBody> = BodyStorage::new();
    let anchor = bodies.add(RigidBody::new_static(Vector3::new(0.0, 10.0, 0.0)));
    let hanging = bodies.add(RigidBody::new_dynamic(Vector3::new(0.0, 9.0, 0.0), mass));
    (bodies, anchor, hanging)
}

/// One simulation tick: gravity + integration, then the constraint solve
fn step(
    set: &mut ConstraintSet,
    bodies: &mut BodyStorage<RigidBody>,
    hanging: BodyHandle,
    events: &mut EventQueue,
) {
    bodies.get_mut(hanging).unwrap().integrate(GRAVITY, DT);
    set.solve(bodies, DT, events);
}

fn hanging_ballsocket(
    set: &mut ConstraintSet,
    bodies: &BodyStorage<RigidBody>,
    anchor: BodyHandle,
    hanging: BodyHandle,
    force_limit: f32,
) -> vehicle_phys::core::ConstraintHandle {
    let params = BallSocketParams {
        // Socket at the anchor position, expressed in each body's frame.
        constraint_position: [Vector3::zero(), Vector3::new(0.0, 1.0, 0.0)],
        constraint: BreakableParams {
            force_limit,
            torque_limit: UNBREAKABLE_LIMIT,
            ..BreakableParams::default()
        },
    };
    set.create_ballsocket(bodies, anchor, hanging, None, params)
        .unwrap()
}

#[test]
fn test_breakable_holds_below_force_limit() {
    // A 9.9 kg body pulls with ~97 N, just under the 100 N limit.
    let (mut bodies, anchor, hanging) = anchored_pair(9.9);
    let mut set = ConstraintSet::new();
    let mut events = EventQueue::new();
    let handle = hanging_ballsocket(&mut set, &bodies, anchor, hanging, 100.0);

    for _ in 0..120 {
        step(&mut set, &mut bodies, hanging, &mut events);
    }

    assert!(!set.constraint(handle).unwrap().is_broken());
    assert!(events.constraint_events().is_empty());
    // The joint is actually holding: the body has not fallen away.
    let y = bodies.get(hanging).unwrap().get_position().y;
    assert!(y > 8.5, "joint let the body sag to {y}");
}

#[test]
fn test_breakable_breaks_above_force_limit() {
    // A 15 kg body needs ~147 N of support, past the 100 N limit.
    let (mut bodies, anchor, hanging) = anchored_pair(15.0);
    let mut set = ConstraintSet::new();
    let mut events = EventQueue::new();
    let handle = hanging_ballsocket(&mut set, &bodies, anchor, hanging, 100.0);

    for _ in 0..120 {
        step(&mut set, &mut bodies, hanging, &mut events);
    }

    assert!(set.constraint(handle).unwrap().is_broken());
    let broken: Vec<_> = events
        .constraint_events()
        .into_iter()
        .filter(|event| matches!(event, ConstraintEvent::Broken(h) if *h == handle))
        .collect();
    assert_eq!(broken.len(), 1, "exactly one break notification");

    // A broken joint no longer resists motion: the body falls.
    let y_before = bodies.get(hanging).unwrap().get_position().y;
    for _ in 0..60 {
        step(&mut set, &mut bodies, hanging, &mut events);
    }
    let y_after = bodies.get(hanging).unwrap().get_position().y;
    assert!(y_after < y_before - 1.0, "broken joint still holding");
}

#[test]
fn test_unbreakable_sentinel_never_wraps() {
    let (bodies, anchor, hanging) = anchored_pair(10.0);
    let mut set = ConstraintSet::new();

    let params = BallSocketParams {
        constraint_position: [Vector3::zero(), Vector3::new(0.0, 1.0, 0.0)],
        constraint: BreakableParams {
            force_limit: UNBREAKABLE_LIMIT,
            torque_limit: UNBREAKABLE_LIMIT,
            ..BreakableParams::default()
        },
    };
    let handle = set
        .create_ballsocket(&bodies, anchor, hanging, None, params)
        .unwrap();
    assert!(!set.constraint(handle).unwrap().is_breakable());
}

#[test]
fn test_body_deletion_disables_constraint() {
    let (mut bodies, anchor, hanging) = anchored_pair(10.0);
    let mut set = ConstraintSet::new();
    let mut events = EventQueue::new();

    let group = set.create_constraint_group(GroupParams::default());
    let params = BallSocketParams {
        constraint_position: [Vector3::zero(), Vector3::new(0.0, 1.0, 0.0)],
        constraint: BreakableParams::default(),
    };
    let handle = set
        .create_ballsocket(&bodies, anchor, hanging, Some(group), params)
        .unwrap();
    assert_eq!(set.group(group).unwrap().members().len(), 1);

    // Destroy the hanging body; the owner notifies the constraint set.
    bodies.remove(hanging);
    set.on_body_removed(hanging, &mut events);

    let constraint = set.constraint(handle).unwrap();
    assert!(constraint.is_inert());
    assert!(set.group(group).unwrap().members().is_empty());
    assert!(matches!(
        events.next(),
        Some(PhysicsEvent::Constraint(ConstraintEvent::Disabled(h))) if h == handle
    ));

    // An inert shell solves to nothing without crashing.
    set.solve(&mut bodies, DT, &mut events);
}

#[test]
fn test_inactive_group_skips_members() {
    let (mut bodies, anchor, hanging) = anchored_pair(10.0);
    let mut set = ConstraintSet::new();
    let mut events = EventQueue::new();

    let group = set.create_constraint_group(GroupParams::default());
    let params = BallSocketParams {
        constraint_position: [Vector3::zero(), Vector3::new(0.0, 1.0, 0.0)],
        constraint: BreakableParams::default(),
    };
    set.create_ballsocket(&bodies, anchor, hanging, Some(group), params)
        .unwrap();

    set.group_mut(group).unwrap().deactivate();
    for _ in 0..60 {
        step(&mut set, &mut bodies, hanging, &mut events);
    }
    // Nothing held the body.
    assert!(bodies.get(hanging).unwrap().get_position().y < 7.0);

    // Reactivating does not require recreating the members.
    set.group_mut(group).unwrap().activate();
    for _ in 0..120 {
        step(&mut set, &mut bodies, hanging, &mut events);
    }
    let velocity = bodies.get(hanging).unwrap().get_linear_velocity().length();
    assert!(velocity < 2.0, "reactivated joint should arrest the fall");
}

#[test]
fn test_single_dof_ragdoll_becomes_hinge() {
    let (bodies, anchor, hanging) = anchored_pair(10.0);
    let mut set = ConstraintSet::new();

    let mut params = RagdollParams::default();
    params.axes[2] = AxisLimit {
        min_rotation: -45.0,
        max_rotation: 45.0,
        angular_velocity: 0.0,
        torque: 0.0,
    };
    let handle = set
        .create_ragdoll(&bodies, anchor, hanging, None, params)
        .unwrap();
    assert_eq!(set.constraint(handle).unwrap().kind(), ConstraintKind::Hinge);
}

#[test]
fn test_multi_dof_ragdoll_stays_ragdoll() {
    let (bodies, anchor, hanging) = anchored_pair(10.0);
    let mut set = ConstraintSet::new();

    let mut params = RagdollParams::default();
    for axis in &mut params.axes {
        axis.min_rotation = -30.0;
        axis.max_rotation = 30.0;
    }
    let handle = set
        .create_ragdoll(&bodies, anchor, hanging, None, params)
        .unwrap();
    assert_eq!(
        set.constraint(handle).unwrap().kind(),
        ConstraintKind::Ragdoll
    );
}

/// The synthesized hinge and a (nearly) single-DOF ragdoll must respond to
/// the same torque sequence with matching motion about the free axis.
#[test]
fn test_ragdoll_hinge_equivalence_on_free_axis() {
    fn spin_world(make_params: impl Fn() -> RagdollParams) -> f32 {
        let mut bodies: BodyStorage<RigidBody> = BodyStorage::new();
        let anchor = bodies.add(RigidBody::new_static(Vector3::zero()));
        let spinner = bodies.add(RigidBody::new_dynamic(Vector3::zero(), 1.0));

        let mut set = ConstraintSet::new();
        let mut events = EventQueue::new();
        set.create_ragdoll(&bodies, anchor, spinner, None, make_params())
            .unwrap();

        for tick in 0..240 {
            // A fixed torque sequence about the free (z) axis.
            let torque = if tick < 120 { 0.4 } else { -0.2 };
            bodies
                .get_mut(spinner)
                .unwrap()
                .apply_angular_impulse(Vector3::new(0.0, 0.0, torque * DT));
            set.solve(&mut bodies, DT, &mut events);
            let spinner_body = bodies.get_mut(spinner).unwrap();
            spinner_body.integrate(Vector3::zero(), DT);
        }

        let rotation = bodies.get(spinner).unwrap().get_rotation();
        // Twist about z.
        2.0 * rotation.z.atan2(rotation.w)
    }

    let hinge_angle = spin_world(|| {
        let mut params = RagdollParams::default();
        params.only_angular_limits = true;
        params.axes[2] = AxisLimit {
            min_rotation: -40.0,
            max_rotation: 40.0,
            ..AxisLimit::default()
        };
        params
    });

    // Opening the other axes a hair forces the full ragdoll path while
    // leaving the physical joint essentially single-DOF.
    let ragdoll_angle = spin_world(|| {
        let mut params = RagdollParams::default();
        params.only_angular_limits = true;
        params.axes[0] = AxisLimit {
            min_rotation: -0.01,
            max_rotation: 0.01,
            ..AxisLimit::default()
        };
        params.axes[1] = AxisLimit {
            min_rotation: -0.01,
            max_rotation: 0.01,
            ..AxisLimit::default()
        };
        params.axes[2] = AxisLimit {
            min_rotation: -40.0,
            max_rotation: 40.0,
            ..AxisLimit::default()
        };
        params
    });

    assert!(
        (hinge_angle - ragdoll_angle).abs() < to_radians(8.0),
        "hinge {hinge_angle} rad vs ragdoll {ragdoll_angle} rad"
    );
    // Both stayed within the declared limit (with solver tolerance).
    assert!(hinge_angle.abs() <= to_radians(45.0));
    assert!(ragdoll_angle.abs() <= to_radians(45.0));
}

#[test]
fn test_length_constraint_keeps_rope_taut_limit() {
    let (mut bodies, anchor, hanging) = anchored_pair(5.0);
    let mut set = ConstraintSet::new();
    let mut events = EventQueue::new();

    let params = LengthParams {
        object_position: [Vector3::zero(), Vector3::zero()],
        total_length: 1.5,
        min_length: 0.0,
        constraint: BreakableParams::default(),
    };
    set.create_length(&bodies, anchor, hanging, None, params)
        .unwrap();

    for _ in 0..600 {
        step(&mut set, &mut bodies, hanging, &mut events);
    }

    let distance = bodies
        .get(hanging)
        .unwrap()
        .get_position()
        .distance(&Vector3::new(0.0, 10.0, 0.0));
    assert!(
        distance <= 1.5 + 0.1,
        "rope stretched to {distance}, limit 1.5"
    );
    // The rope is a limit, not a rod: it ended up hanging at full length.
    assert!(distance > 1.0);
}

#[test]
fn test_pulley_holds_combined_rope_length() {
    let mut bodies: BodyStorage<RigidBody> = BodyStorage::new();
    let left = bodies.add(RigidBody::new_dynamic(Vector3::new(-2.0, 5.0, 0.0), 10.0));
    let right = bodies.add(RigidBody::new_dynamic(Vector3::new(2.0, 5.0, 0.0), 10.0));
    let mut set = ConstraintSet::new();
    let mut events = EventQueue::new();

    let pulleys = [Vector3::new(-2.0, 10.0, 0.0), Vector3::new(2.0, 10.0, 0.0)];
    // Both sides start 5 m below their pulley: the rope begins exactly taut.
    let params = PulleyParams {
        pulley_position: pulleys,
        object_position: [Vector3::zero(), Vector3::zero()],
        total_length: 10.0,
        gear_ratio: 1.0,
        is_rigid: false,
        constraint: BreakableParams::default(),
    };
    set.create_pulley(&bodies, left, right, None, params).unwrap();

    for _ in 0..600 {
        bodies.get_mut(left).unwrap().integrate(GRAVITY, DT);
        bodies.get_mut(right).unwrap().integrate(GRAVITY, DT);
        set.solve(&mut bodies, DT, &mut events);
    }

    let pos_left = bodies.get(left).unwrap().get_position();
    let pos_right = bodies.get(right).unwrap().get_position();
    let combined = pos_left.distance(&pulleys[0]) + pos_right.distance(&pulleys[1]);
    assert!(
        combined <= 10.0 + 0.2,
        "rope stretched to {combined}, limit 10"
    );
    // Equal masses balance: neither side winched the other up.
    assert!((pos_left.y - pos_right.y).abs() < 0.5);
}

#[test]
fn test_constraint_params_round_trip() {
    let (bodies, anchor, hanging) = anchored_pair(10.0);
    let mut set = ConstraintSet::new();

    let params = HingeParams {
        world_position: Vector3::new(0.0, 10.0, 0.0),
        world_axis_direction: Vector3::unit_z(),
        hinge_axis: AxisLimit {
            min_rotation: -30.0,
            max_rotation: 60.0,
            ..AxisLimit::default()
        },
        constraint: BreakableParams {
            force_limit: 500.0,
            torque_limit: 250.0,
            body_mass_scale: [1.0, 2.0],
            ..BreakableParams::default()
        },
        ..HingeParams::default()
    };
    let handle = set
        .create_hinge(&bodies, anchor, hanging, None, params)
        .unwrap();

    // Serialize, restore into a fresh set, and compare the read-back.
    let snapshot = set.write_to_template(handle, &bodies).unwrap();
    let mut restored_set = ConstraintSet::new();
    let restored = restored_set
        .restore_constraint(&snapshot, &bodies)
        .unwrap();

    let original = set.constraint(handle).unwrap().constraint_params();
    let round_tripped = restored_set
        .constraint(restored)
        .unwrap()
        .constraint_params();

    assert!((original.force_limit - round_tripped.force_limit).abs() < 1e-3);
    assert!((original.torque_limit - round_tripped.torque_limit).abs() < 1e-3);
    assert_eq!(original.body_mass_scale, round_tripped.body_mass_scale);
    assert_eq!(
        set.constraint(handle).unwrap().kind(),
        restored_set.constraint(restored).unwrap().kind()
    );
}
