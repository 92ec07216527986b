//! Constraints and the set that owns them.
//!
//! A [`Constraint`] joins a reference body and an attached body through a
//! typed joint, optionally wrapped in the breakable decorator and
//! optionally belonging to one [`ConstraintGroup`]. The
//! [`ConstraintSet`] is the factory and solver driver: it validates
//! parameter blocks, builds fully-formed constraints, observes body
//! destruction, and runs the per-tick solve.

use crate::bodies::RigidBody;
use crate::constraints::breakable::BreakableJoint;
use crate::constraints::group::ConstraintGroup;
use crate::constraints::joint::{
    ragdoll_axes_from_params, BallSocketJoint, FixedJoint, HingeJoint, Joint, JointKind,
    LengthJoint, PulleyJoint, RagdollJoint, SlidingJoint,
};
use crate::constraints::params::{
    BallSocketParams, BreakableParams, FixedParams, GroupParams, HingeParams, LengthParams,
    PulleyParams, RagdollParams, SlidingParams,
};
use crate::core::{
    BodyHandle, BodyStorage, ConstraintEvent, ConstraintHandle, ConstraintStorage, EventQueue,
    GroupHandle, GroupStorage, Storage,
};
use crate::error::PhysicsError;
use crate::math::{to_radians, Vector3};
use crate::Result;

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// The kind of joint a constraint carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum ConstraintKind {
    Ragdoll,
    Hinge,
    Fixed,
    BallSocket,
    Sliding,
    Pulley,
    Length,
}

/// The joint payload slot: plain and rigid, or wrapped in the breakable
/// decorator. Both are reached through the same `real_joint` accessor.
#[derive(Debug, Clone)]
enum JointSlot {
    Rigid(Joint),
    Breakable(BreakableJoint),
}

/// A typed joint between two bodies
#[derive(Debug, Clone)]
pub struct Constraint {
    /// The reference body
    reference: BodyHandle,

    /// The attached body
    attached: BodyHandle,

    /// The owning group, if any
    group: Option<GroupHandle>,

    /// The joint kind this constraint was built as
    kind: ConstraintKind,

    /// The breakable block it was built with, for read-back
    breakable_params: BreakableParams,

    /// Whether an ungrouped constraint participates in solving
    active: bool,

    /// The joint payload; None once an endpoint body died
    slot: Option<JointSlot>,
}

impl Constraint {
    /// The reference body
    pub fn reference_body(&self) -> BodyHandle {
        self.reference
    }

    /// The attached body
    pub fn attached_body(&self) -> BodyHandle {
        self.attached
    }

    /// The owning group, if any
    pub fn group(&self) -> Option<GroupHandle> {
        self.group
    }

    /// The joint kind this constraint was built as
    pub fn kind(&self) -> ConstraintKind {
        self.kind
    }

    /// Whether an endpoint body died and left this constraint inert
    pub fn is_inert(&self) -> bool {
        self.slot.is_none()
    }

    /// Whether the breakable decorator is present
    pub fn is_breakable(&self) -> bool {
        matches!(self.slot, Some(JointSlot::Breakable(_)))
    }

    /// Whether a breakable joint has exceeded its limit
    pub fn is_broken(&self) -> bool {
        match &self.slot {
            Some(JointSlot::Breakable(joint)) => joint.is_broken(),
            _ => false,
        }
    }

    /// Whether this constraint participates in solving this tick
    pub fn is_active(&self) -> bool {
        self.active && self.slot.is_some()
    }

    /// Enables solving for an ungrouped constraint
    pub fn activate(&mut self) {
        self.active = true;
    }

    /// Disables solving for an ungrouped constraint
    pub fn deactivate(&mut self) {
        self.active = false;
    }

    /// The real joint, unwrapping the breakable decorator transparently
    pub fn real_joint(&self) -> Option<&Joint> {
        match &self.slot {
            Some(JointSlot::Rigid(joint)) => Some(joint),
            Some(JointSlot::Breakable(joint)) => Some(joint.real_joint()),
            None => None,
        }
    }

    /// The real joint, mutable
    pub fn real_joint_mut(&mut self) -> Option<&mut Joint> {
        match &mut self.slot {
            Some(JointSlot::Rigid(joint)) => Some(joint),
            Some(JointSlot::Breakable(joint)) => Some(joint.real_joint_mut()),
            None => None,
        }
    }

    /// Breakable-limit read-back; `is_active` reflects the live state
    pub fn constraint_params(&self) -> BreakableParams {
        BreakableParams {
            is_active: self.active,
            ..self.breakable_params
        }
    }

    /// Local constraint frames for ragdoll, ball-socket and fixed joints
    pub fn constraint_transform(
        &self,
    ) -> Option<(crate::math::Transform, crate::math::Transform)> {
        self.real_joint()?.constraint_transform()
    }

    /// Sets the linear motor of a sliding constraint
    pub fn set_linear_motor(&mut self, speed: f32, max_force: f32) {
        if let Some(joint) = self.real_joint_mut() {
            joint.set_linear_motor(speed, max_force);
        }
    }

    /// Sets the angular motor of a hinge, or ragdoll friction at zero speed
    pub fn set_angular_motor(&mut self, speed: f32, max_impulse: f32) {
        if let Some(joint) = self.real_joint_mut() {
            joint.set_angular_motor(to_radians(speed), to_radians(max_impulse.abs()));
        }
    }

    /// Re-parents a ragdoll joint's local frames
    pub fn update_ragdoll_transforms(
        &mut self,
        constraint_to_reference: crate::math::Transform,
        constraint_to_attached: crate::math::Transform,
    ) {
        if let Some(joint) = self.real_joint_mut() {
            joint.update_ragdoll_transforms(constraint_to_reference, constraint_to_attached);
        }
    }

    /// Detaches the constraint from its bodies, leaving an inert shell
    fn sever(&mut self) {
        self.slot = None;
    }

    fn begin_tick(&mut self) {
        match &mut self.slot {
            Some(JointSlot::Rigid(joint)) => joint.begin_tick(),
            Some(JointSlot::Breakable(joint)) => joint.begin_tick(),
            None => {}
        }
    }

    fn solve_velocity(&mut self, dt: f32, bodies: &mut BodyStorage<RigidBody>) {
        match &mut self.slot {
            Some(JointSlot::Rigid(joint)) => {
                joint.solve_velocity(dt, bodies);
            }
            Some(JointSlot::Breakable(joint)) => {
                joint.solve_velocity(dt, bodies);
            }
            None => {}
        }
    }

    fn solve_position(&mut self, dt: f32, bodies: &mut BodyStorage<RigidBody>) -> f32 {
        match &mut self.slot {
            Some(JointSlot::Rigid(joint)) => joint.solve_position(dt, bodies),
            Some(JointSlot::Breakable(joint)) => joint.solve_position(dt, bodies),
            None => 0.0,
        }
    }

    /// Returns true when a breakable joint broke on this tick
    fn end_tick(&mut self, dt: f32) -> bool {
        match &mut self.slot {
            Some(JointSlot::Breakable(joint)) => joint.end_tick(dt),
            _ => false,
        }
    }
}

/// Per-kind parameter payload for persistence
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum ConstraintTemplate {
    Ragdoll(RagdollParams),
    Hinge(HingeParams),
    Fixed(FixedParams),
    BallSocket(BallSocketParams),
    Sliding(SlidingParams),
    Pulley(PulleyParams),
    Length(LengthParams),
}

/// Flat persistence record for one constraint
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct ConstraintSnapshot {
    pub reference: BodyHandle,
    pub attached: BodyHandle,
    pub group: Option<GroupHandle>,
    /// None for an inert constraint; it restores as an empty shell
    pub template: Option<ConstraintTemplate>,
}

/// Flat persistence record for one constraint group
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct GroupSnapshot {
    pub params: GroupParams,
    pub is_active: bool,
}

/// Owns all constraints and groups; factory, lifecycle observer and solver
/// driver
pub struct ConstraintSet {
    constraints: ConstraintStorage<Constraint>,
    groups: GroupStorage<ConstraintGroup>,

    /// Velocity iterations for constraints without extra group iterations
    base_iterations: u32,
}

impl Default for ConstraintSet {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstraintSet {
    pub fn new() -> Self {
        Self {
            constraints: ConstraintStorage::new(),
            groups: GroupStorage::new(),
            base_iterations: 4,
        }
    }

    /// Creates a container for a group of constraints
    pub fn create_constraint_group(&mut self, params: GroupParams) -> GroupHandle {
        self.groups.add(ConstraintGroup::new(&params))
    }

    /// A constraint group by handle
    pub fn group(&self, handle: GroupHandle) -> Option<&ConstraintGroup> {
        self.groups.get(handle)
    }

    /// A constraint group by handle, mutable
    pub fn group_mut(&mut self, handle: GroupHandle) -> Option<&mut ConstraintGroup> {
        self.groups.get_mut(handle)
    }

    /// A constraint by handle
    pub fn constraint(&self, handle: ConstraintHandle) -> Option<&Constraint> {
        self.constraints.get(handle)
    }

    /// A constraint by handle, mutable
    pub fn constraint_mut(&mut self, handle: ConstraintHandle) -> Option<&mut Constraint> {
        self.constraints.get_mut(handle)
    }

    /// Number of live constraints (including inert shells)
    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    /// Whether the set holds no constraints
    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    fn validate_bodies(
        &self,
        bodies: &BodyStorage<RigidBody>,
        reference: BodyHandle,
        attached: BodyHandle,
    ) -> Result<()> {
        if !bodies.contains(reference) {
            return Err(PhysicsError::ResourceNotFound(format!(
                "reference body {reference:?} not found"
            )));
        }
        if !bodies.contains(attached) {
            return Err(PhysicsError::ResourceNotFound(format!(
                "attached body {attached:?} not found"
            )));
        }
        if reference == attached {
            return Err(PhysicsError::InvalidParameter(
                "constraint endpoints must be two distinct bodies".to_string(),
            ));
        }
        Ok(())
    }

    /// Wraps a built joint per the breakable predicate and registers it
    fn install(
        &mut self,
        reference: BodyHandle,
        attached: BodyHandle,
        group: Option<GroupHandle>,
        kind: ConstraintKind,
        breakable: BreakableParams,
        joint: Joint,
    ) -> Result<ConstraintHandle> {
        if let Some(group_handle) = group {
            if !self.groups.contains(group_handle) {
                return Err(PhysicsError::ResourceNotFound(format!(
                    "constraint group {group_handle:?} not found"
                )));
            }
        }

        let slot = if breakable.is_breakable() {
            JointSlot::Breakable(BreakableJoint::new(joint, &breakable))
        } else {
            JointSlot::Rigid(joint)
        };

        let handle = self.constraints.add(Constraint {
            reference,
            attached,
            group,
            kind,
            breakable_params: breakable,
            active: breakable.is_active,
            slot: Some(slot),
        });

        if let Some(group_handle) = group {
            if let Some(group) = self.groups.get_mut(group_handle) {
                group.add_member(handle);
                if breakable.is_active {
                    group.activate();
                }
            }
        }

        Ok(handle)
    }

    /// Creates a ball-socket constraint
    pub fn create_ballsocket(
        &mut self,
        bodies: &BodyStorage<RigidBody>,
        reference: BodyHandle,
        attached: BodyHandle,
        group: Option<GroupHandle>,
        params: BallSocketParams,
    ) -> Result<ConstraintHandle> {
        self.validate_bodies(bodies, reference, attached)?;
        let joint = Joint::new(
            reference,
            attached,
            params.constraint.strength,
            JointKind::BallSocket(BallSocketJoint {
                anchor_a: params.constraint_position[0],
                anchor_b: params.constraint_position[1],
            }),
        );
        self.install(
            reference,
            attached,
            group,
            ConstraintKind::BallSocket,
            params.constraint,
            joint,
        )
    }

    /// Creates a fixed (weld) constraint
    pub fn create_fixed(
        &mut self,
        bodies: &BodyStorage<RigidBody>,
        reference: BodyHandle,
        attached: BodyHandle,
        group: Option<GroupHandle>,
        params: FixedParams,
    ) -> Result<ConstraintHandle> {
        self.validate_bodies(bodies, reference, attached)?;
        let joint = Joint::new(
            reference,
            attached,
            params.constraint.strength,
            JointKind::Fixed(FixedJoint {
                frame: params.attached_ref_xform,
            }),
        );
        self.install(
            reference,
            attached,
            group,
            ConstraintKind::Fixed,
            params.constraint,
            joint,
        )
    }

    /// Creates a limited hinge constraint
    pub fn create_hinge(
        &mut self,
        bodies: &BodyStorage<RigidBody>,
        reference: BodyHandle,
        attached: BodyHandle,
        group: Option<GroupHandle>,
        params: HingeParams,
    ) -> Result<ConstraintHandle> {
        self.validate_bodies(bodies, reference, attached)?;

        let axis = params.world_axis_direction.normalize();
        if axis.is_zero() {
            return Err(PhysicsError::InvalidParameter(
                "hinge axis must be a nonzero direction".to_string(),
            ));
        }

        let transform_a = bodies.get_body(reference)?.get_transform();
        let transform_b = bodies.get_body(attached)?.get_transform();

        let mut hinge = HingeJoint {
            anchor_a: transform_a.inverse_transform_point(params.world_position),
            anchor_b: transform_b.inverse_transform_point(params.world_position),
            axis_a: transform_a.inverse_transform_direction(axis),
            axis_b: transform_b.inverse_transform_direction(axis),
            perp_a: params.reference_perp_axis.normalize(),
            perp_b: params.attached_perp_axis.normalize(),
            limit: None,
            motor_enabled: false,
            motor_target_velocity: 0.0,
            motor_max_torque: 0.0,
            motor_impulse: 0.0,
            current_angle: 0.0,
        };
        if params.hinge_axis.is_free() {
            hinge.limit = Some((
                to_radians(params.hinge_axis.min_rotation),
                to_radians(params.hinge_axis.max_rotation),
            ));
        }
        if params.hinge_axis.torque != 0.0 {
            hinge.motor_enabled = true;
            hinge.motor_target_velocity = to_radians(params.hinge_axis.angular_velocity);
            hinge.motor_max_torque = to_radians(params.hinge_axis.torque.abs());
        }

        let joint = Joint::new(
            reference,
            attached,
            params.constraint.strength,
            JointKind::Hinge(hinge),
        );
        self.install(
            reference,
            attached,
            group,
            ConstraintKind::Hinge,
            params.constraint,
            joint,
        )
    }

    /// Creates a sliding (prismatic) constraint
    pub fn create_sliding(
        &mut self,
        bodies: &BodyStorage<RigidBody>,
        reference: BodyHandle,
        attached: BodyHandle,
        group: Option<GroupHandle>,
        params: SlidingParams,
    ) -> Result<ConstraintHandle> {
        self.validate_bodies(bodies, reference, attached)?;

        let axis = params.slide_axis_ref.normalize();
        if axis.is_zero() {
            return Err(PhysicsError::InvalidParameter(
                "slide axis must be a nonzero direction".to_string(),
            ));
        }

        let mut sliding = SlidingJoint {
            frame: params.attached_ref_xform,
            axis,
            limit: None,
            friction: 0.0,
            motor_velocity: 0.0,
            motor_max_force: 0.0,
            axial_impulse: 0.0,
        };
        if params.limit_min != params.limit_max {
            sliding.limit = Some((params.limit_min, params.limit_max));
        }
        if params.friction != 0.0 {
            if params.velocity != 0.0 {
                sliding.motor_velocity = params.velocity;
                sliding.motor_max_force = params.friction.abs();
            } else {
                sliding.friction = params.friction.abs();
            }
        }

        let joint = Joint::new(
            reference,
            attached,
            params.constraint.strength,
            JointKind::Sliding(sliding),
        );
        self.install(
            reference,
            attached,
            group,
            ConstraintKind::Sliding,
            params.constraint,
            joint,
        )
    }

    /// Creates a pulley constraint
    pub fn create_pulley(
        &mut self,
        bodies: &BodyStorage<RigidBody>,
        reference: BodyHandle,
        attached: BodyHandle,
        group: Option<GroupHandle>,
        params: PulleyParams,
    ) -> Result<ConstraintHandle> {
        self.validate_bodies(bodies, reference, attached)?;
        if params.total_length <= 0.0 || params.gear_ratio <= 0.0 {
            return Err(PhysicsError::InvalidParameter(
                "pulley needs a positive rope length and gear ratio".to_string(),
            ));
        }
        let joint = Joint::new(
            reference,
            attached,
            params.constraint.strength,
            JointKind::Pulley(PulleyJoint {
                pulley_points: params.pulley_position,
                anchor_a: params.object_position[0],
                anchor_b: params.object_position[1],
                total_length: params.total_length,
                gear_ratio: params.gear_ratio,
                is_rigid: params.is_rigid,
            }),
        );
        self.install(
            reference,
            attached,
            group,
            ConstraintKind::Pulley,
            params.constraint,
            joint,
        )
    }

    /// Creates a length (rope) constraint
    pub fn create_length(
        &mut self,
        bodies: &BodyStorage<RigidBody>,
        reference: BodyHandle,
        attached: BodyHandle,
        group: Option<GroupHandle>,
        params: LengthParams,
    ) -> Result<ConstraintHandle> {
        self.validate_bodies(bodies, reference, attached)?;
        if params.total_length <= 0.0 || params.min_length < 0.0 {
            return Err(PhysicsError::InvalidParameter(
                "length constraint needs a positive total length".to_string(),
            ));
        }
        let joint = Joint::new(
            reference,
            attached,
            params.constraint.strength,
            JointKind::Length(LengthJoint {
                anchor_a: params.object_position[0],
                anchor_b: params.object_position[1],
                total_length: params.total_length,
                min_length: params.min_length,
            }),
        );
        self.install(
            reference,
            attached,
            group,
            ConstraintKind::Length,
            params.constraint,
            joint,
        )
    }

    /// Creates a ragdoll constraint. When exactly one axis range is
    /// non-degenerate the factory synthesizes an equivalent single-axis
    /// hinge instead; a hinge is cheaper to solve and behaves identically
    /// for a true single-DOF joint.
    pub fn create_ragdoll(
        &mut self,
        bodies: &BodyStorage<RigidBody>,
        reference: BodyHandle,
        attached: BodyHandle,
        group: Option<GroupHandle>,
        params: RagdollParams,
    ) -> Result<ConstraintHandle> {
        self.validate_bodies(bodies, reference, attached)?;

        if let Some(hinge) = convert_ragdoll_to_hinge(&params, bodies, reference) {
            return self.create_hinge(bodies, reference, attached, group, hinge);
        }

        let joint = Joint::new(
            reference,
            attached,
            params.constraint.strength,
            JointKind::Ragdoll(RagdollJoint {
                frame_a: params.constraint_to_reference,
                frame_b: params.constraint_to_attached,
                axes: ragdoll_axes_from_params(&params),
                only_angular_limits: params.only_angular_limits,
                use_clockwise_rotations: params.use_clockwise_rotations,
            }),
        );
        self.install(
            reference,
            attached,
            group,
            ConstraintKind::Ragdoll,
            params.constraint,
            joint,
        )
    }

    /// Releases a constraint explicitly, dropping it from its group
    pub fn release(&mut self, handle: ConstraintHandle) {
        if let Some(constraint) = self.constraints.remove(handle) {
            if let Some(group_handle) = constraint.group {
                if let Some(group) = self.groups.get_mut(group_handle) {
                    group.remove_member(handle);
                }
            }
        }
    }

    /// Releases a group; member constraints survive ungrouped
    pub fn release_group(&mut self, handle: GroupHandle) {
        if let Some(group) = self.groups.remove(handle) {
            for &member in group.members() {
                if let Some(constraint) = self.constraints.get_mut(member) {
                    constraint.group = None;
                }
            }
        }
    }

    /// Notification that a body was removed from its storage. Every
    /// constraint with that endpoint detaches, drops out of its group, and
    /// reports itself disabled. The constraint object itself survives as an
    /// inert shell.
    pub fn on_body_removed(&mut self, body: BodyHandle, events: &mut EventQueue) {
        for handle in self.constraints.handles() {
            let Some(constraint) = self.constraints.get_mut(handle) else {
                continue;
            };
            if constraint.is_inert() || !constraint.real_joint().map_or(false, |j| j.involves_body(body)) {
                continue;
            }

            constraint.sever();
            let group = constraint.group.take();
            if let Some(group_handle) = group {
                if let Some(group) = self.groups.get_mut(group_handle) {
                    group.remove_member(handle);
                }
            }
            events.push_constraint(ConstraintEvent::Disabled(handle));
        }
    }

    /// Runs the constraint solve for one tick: velocity iterations per
    /// group, one position pass, the group error state machine, and the
    /// breakable end-of-tick check
    pub fn solve(&mut self, bodies: &mut BodyStorage<RigidBody>, dt: f32, events: &mut EventQueue) {
        if dt <= 0.0 {
            return;
        }

        let all = self.constraints.handles();
        for &handle in &all {
            if let Some(constraint) = self.constraints.get_mut(handle) {
                constraint.begin_tick();
            }
        }

        // Grouped constraints.
        for group_handle in self.groups.handles() {
            let (active, iterations, members) = {
                let group = match self.groups.get(group_handle) {
                    Some(group) => group,
                    None => continue,
                };
                (
                    group.is_active(),
                    self.base_iterations + group.additional_iterations(),
                    group.members().to_vec(),
                )
            };
            if !active || members.is_empty() {
                continue;
            }

            for _ in 0..iterations.max(1) {
                for &member in &members {
                    if let Some(constraint) = self.constraints.get_mut(member) {
                        constraint.solve_velocity(dt, bodies);
                    }
                }
            }

            let mut max_error = 0.0f32;
            for &member in &members {
                if let Some(constraint) = self.constraints.get_mut(member) {
                    max_error = max_error.max(constraint.solve_position(dt, bodies));
                }
            }
            if let Some(group) = self.groups.get_mut(group_handle) {
                group.observe_error(max_error);
            }
        }

        // Ungrouped constraints.
        for &handle in &all {
            let base_iterations = self.base_iterations;
            let Some(constraint) = self.constraints.get_mut(handle) else {
                continue;
            };
            if constraint.group.is_some() || !constraint.is_active() {
                continue;
            }
            for _ in 0..base_iterations.max(1) {
                constraint.solve_velocity(dt, bodies);
            }
            constraint.solve_position(dt, bodies);
        }

        // Break checks, one uniform notification for every joint kind.
        for &handle in &all {
            if let Some(constraint) = self.constraints.get_mut(handle) {
                if constraint.end_tick(dt) {
                    events.push_constraint(ConstraintEvent::Broken(handle));
                }
            }
        }
    }

    /// Runs extra position-only iterations for a group's constraints that
    /// join the given body pair, untangling an interpenetration the
    /// velocity solve cannot fix
    pub fn solve_penetration(
        &mut self,
        group_handle: GroupHandle,
        bodies: &mut BodyStorage<RigidBody>,
        body_a: BodyHandle,
        body_b: BodyHandle,
    ) {
        let members = match self.groups.get(group_handle) {
            Some(group) => group.members().to_vec(),
            None => return,
        };

        for _ in 0..self.base_iterations.max(1) {
            for &member in &members {
                let Some(constraint) = self.constraints.get_mut(member) else {
                    continue;
                };
                let involves = constraint
                    .real_joint()
                    .map_or(false, |j| j.involves_body(body_a) && j.involves_body(body_b));
                if involves {
                    constraint.solve_position(0.0, bodies);
                }
            }
        }
    }

    /// Writes one constraint to a flat persistence record
    pub fn write_to_template(
        &self,
        handle: ConstraintHandle,
        bodies: &BodyStorage<RigidBody>,
    ) -> Option<ConstraintSnapshot> {
        let constraint = self.constraints.get(handle)?;

        let template = constraint.real_joint().map(|joint| {
            let breakable = constraint.constraint_params();
            match &joint.kind {
                JointKind::BallSocket(j) => {
                    let mut params = joint.write_ballsocket(j);
                    params.constraint = breakable;
                    ConstraintTemplate::BallSocket(params)
                }
                JointKind::Fixed(j) => {
                    let mut params = joint.write_fixed(j);
                    params.constraint = breakable;
                    ConstraintTemplate::Fixed(params)
                }
                JointKind::Hinge(j) => {
                    let mut params = joint.write_hinge(j, bodies);
                    params.constraint = breakable;
                    ConstraintTemplate::Hinge(params)
                }
                JointKind::Sliding(j) => {
                    let mut params = joint.write_sliding(j);
                    params.constraint = breakable;
                    ConstraintTemplate::Sliding(params)
                }
                JointKind::Pulley(j) => {
                    let mut params = joint.write_pulley(j);
                    params.constraint = breakable;
                    ConstraintTemplate::Pulley(params)
                }
                JointKind::Length(j) => {
                    let mut params = joint.write_length(j);
                    params.constraint = breakable;
                    ConstraintTemplate::Length(params)
                }
                JointKind::Ragdoll(j) => {
                    let mut params = joint.write_ragdoll(j);
                    params.constraint = breakable;
                    ConstraintTemplate::Ragdoll(params)
                }
            }
        });

        Some(ConstraintSnapshot {
            reference: constraint.reference,
            attached: constraint.attached,
            group: constraint.group,
            template,
        })
    }

    /// Restores a constraint from a persistence record. Inert records come
    /// back as inert shells.
    pub fn restore_constraint(
        &mut self,
        snapshot: &ConstraintSnapshot,
        bodies: &BodyStorage<RigidBody>,
    ) -> Result<ConstraintHandle> {
        let ConstraintSnapshot {
            reference,
            attached,
            group,
            template,
        } = snapshot;

        match template {
            None => Ok(self.constraints.add(Constraint {
                reference: *reference,
                attached: *attached,
                group: None,
                kind: ConstraintKind::Fixed,
                breakable_params: BreakableParams::default(),
                active: false,
                slot: None,
            })),
            Some(ConstraintTemplate::BallSocket(params)) => {
                self.create_ballsocket(bodies, *reference, *attached, *group, *params)
            }
            Some(ConstraintTemplate::Fixed(params)) => {
                self.create_fixed(bodies, *reference, *attached, *group, *params)
            }
            Some(ConstraintTemplate::Hinge(params)) => {
                self.create_hinge(bodies, *reference, *attached, *group, *params)
            }
            Some(ConstraintTemplate::Sliding(params)) => {
                self.create_sliding(bodies, *reference, *attached, *group, *params)
            }
            Some(ConstraintTemplate::Pulley(params)) => {
                self.create_pulley(bodies, *reference, *attached, *group, *params)
            }
            Some(ConstraintTemplate::Length(params)) => {
                self.create_length(bodies, *reference, *attached, *group, *params)
            }
            Some(ConstraintTemplate::Ragdoll(params)) => {
                self.create_ragdoll(bodies, *reference, *attached, *group, *params)
            }
        }
    }

    /// Writes a group to a flat persistence record
    pub fn write_group_template(&self, handle: GroupHandle) -> Option<GroupSnapshot> {
        let group = self.groups.get(handle)?;
        Some(GroupSnapshot {
            params: group.error_params(),
            is_active: group.is_active(),
        })
    }

    /// Restores a group inactive; collect the handles of snapshots that
    /// were active and pass them to [`Self::post_restore_activate`] after
    /// the member constraints are restored
    pub fn restore_group(&mut self, snapshot: &GroupSnapshot) -> GroupHandle {
        self.create_constraint_group(snapshot.params)
    }

    /// Activates restored groups once their members exist again
    pub fn post_restore_activate(&mut self, handles: &[GroupHandle]) {
        for &handle in handles {
            if let Some(group) = self.groups.get_mut(handle) {
                group.activate();
            }
        }
    }
}

/// Checks whether a ragdoll parameter block describes a single degree of
/// freedom; if so, builds the equivalent limited hinge. The hinge must
/// reproduce axis direction, perpendicular reference axes, limit sign
/// convention and friction scaling exactly or the joint behaves differently
/// than its authored parameters.
fn convert_ragdoll_to_hinge(
    ragdoll: &RagdollParams,
    bodies: &BodyStorage<RigidBody>,
    reference: BodyHandle,
) -> Option<HingeParams> {
    let mut dof_count = 0;
    let mut dof_index = 0;
    for (index, axis) in ragdoll.axes.iter().enumerate() {
        if axis.is_free() {
            dof_index = index;
            dof_count += 1;
        }
    }
    if dof_count != 1 {
        return None;
    }

    let reference_body = bodies.get(reference)?;
    let constraint_to_world = reference_body
        .get_transform()
        .combine(&ragdoll.constraint_to_reference);

    let mut hinge = HingeParams {
        constraint: ragdoll.constraint,
        ..HingeParams::default()
    };
    // Ragdoll solving ignores the strength; force the hinge default.
    hinge.constraint.strength = 1.0;

    hinge.world_position = constraint_to_world.position;
    hinge.world_axis_direction = constraint_to_world
        .rotation
        .rotate(unit_axis(dof_index));

    // The zero-angle reference is the next axis around, expressed in each
    // body's space through the constraint frame.
    let mut reference_perp = Vector3::zero();
    match (dof_index + 1) % 3 {
        0 => reference_perp.x = 1.0,
        1 => reference_perp.y = 1.0,
        _ => reference_perp.z = 1.0,
    }
    hinge.reference_perp_axis = reference_perp;

    let perp_constraint = ragdoll
        .constraint_to_reference
        .rotation
        .rotate_inverse(reference_perp);
    hinge.attached_perp_axis = ragdoll
        .constraint_to_attached
        .rotation
        .rotate(perp_constraint);

    hinge.hinge_axis = ragdoll.axes[dof_index];

    // Preserve the joint friction through the hinge's mass scaling.
    hinge.hinge_axis.torque *= reference_body.get_mass();

    // The hinge solver uses counter-clockwise limits; flip when the ragdoll
    // was not authored clockwise.
    if !ragdoll.use_clockwise_rotations {
        let tmp = hinge.hinge_axis.min_rotation;
        hinge.hinge_axis.min_rotation = -hinge.hinge_axis.max_rotation;
        hinge.hinge_axis.max_rotation = -tmp;
    }

    Some(hinge)
}

fn unit_axis(index: usize) -> Vector3 {
    match index {
        0 => Vector3::unit_x(),
        1 => Vector3::unit_y(),
        _ => Vector3::unit_z(),
    }
}
