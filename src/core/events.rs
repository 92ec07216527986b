use crate::core::{BodyHandle, ConstraintHandle};
use crate::math::Vector3;
use std::collections::VecDeque;

/// Lifecycle events for constraints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintEvent {
    /// One of the constraint's endpoint bodies was destroyed; the constraint
    /// detached itself and is now an inert shell
    Disabled(ConstraintHandle),

    /// A breakable constraint exceeded its force or torque limit during
    /// solving and no longer constrains relative motion
    Broken(ConstraintHandle),
}

/// Events reported by vehicle controllers for the embedding engine
/// (sound, particles, decals). Purely informational side-effects.
#[derive(Debug, Clone)]
pub enum VehicleEvent {
    /// The tire material changed (normal / braking / powerslide skid)
    TireMaterialChanged {
        /// The material index now applied to the wheels
        material: i32,
    },

    /// A wheel is skidding against a surface
    Skid {
        /// Speed of the wheel surface relative to the contacted surface
        speed: f32,
        /// Identifier of the contacted surface
        surface_id: u32,
    },

    /// Ground friction eliminated enough energy this tick to be audible
    FrictionScrape {
        /// Eliminated energy per unit mass
        energy: f32,
        /// The surface contacted by the most points this tick
        surface_id: u32,
        /// Averaged contact point in world space
        point: Vector3,
        /// Averaged contact normal
        normal: Vector3,
    },
}

/// Events related to a single body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyEvent {
    /// A body has been removed from its storage
    Removed(BodyHandle),
}

/// A physics event of any kind
#[derive(Debug, Clone)]
pub enum PhysicsEvent {
    Constraint(ConstraintEvent),
    Vehicle(VehicleEvent),
    Body(BodyEvent),
}

/// A queue of physics events, drained by the embedding engine once per tick
#[derive(Debug, Default)]
pub struct EventQueue {
    events: VecDeque<PhysicsEvent>,
}

impl EventQueue {
    /// Creates a new empty event queue
    pub fn new() -> Self {
        Self {
            events: VecDeque::new(),
        }
    }

    /// Adds an event to the queue
    pub fn push(&mut self, event: PhysicsEvent) {
        self.events.push_back(event);
    }

    /// Adds a constraint event to the queue
    pub fn push_constraint(&mut self, event: ConstraintEvent) {
        self.events.push_back(PhysicsEvent::Constraint(event));
    }

    /// Adds a vehicle event to the queue
    pub fn push_vehicle(&mut self, event: VehicleEvent) {
        self.events.push_back(PhysicsEvent::Vehicle(event));
    }

    /// Adds a body event to the queue
    pub fn push_body(&mut self, event: BodyEvent) {
        self.events.push_back(PhysicsEvent::Body(event));
    }

    /// Gets the next event from the queue
    pub fn next(&mut self) -> Option<PhysicsEvent> {
        self.events.pop_front()
    }

    /// Returns whether the queue is empty
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Returns the number of queued events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Clears all events from the queue
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Returns all queued constraint events without draining them
    pub fn constraint_events(&self) -> Vec<ConstraintEvent> {
        self.events
            .iter()
            .filter_map(|e| match e {
                PhysicsEvent::Constraint(c) => Some(*c),
                _ => None,
            })
            .collect()
    }
}
