//! Constraint groups: a shared solver context for a set of constraints,
//! with its own iteration count, error tolerance and active/inactive state.
//! A group's lifetime is independent of its members; a member whose body
//! dies is silently dropped from the group.

use crate::constraints::params::GroupParams;
use crate::core::ConstraintHandle;

/// Shared solver settings and error state for a set of constraints
#[derive(Debug, Clone)]
pub struct ConstraintGroup {
    /// Extra solver iterations on top of the set's base count
    additional_iterations: u32,

    /// Consecutive over-tolerance ticks before the error flag sets
    min_error_ticks: u32,

    /// Position error tolerance, meters
    error_tolerance: f32,

    /// Whether members participate in the solver
    active: bool,

    /// Whether the group is currently flagged as in error
    error: bool,

    /// Consecutive ticks the error exceeded the tolerance
    error_ticks: u32,

    /// Member constraints
    members: Vec<ConstraintHandle>,
}

impl ConstraintGroup {
    /// Creates an inactive group with the given solver settings
    pub fn new(params: &GroupParams) -> Self {
        Self {
            additional_iterations: params.additional_iterations,
            min_error_ticks: params.min_error_ticks,
            error_tolerance: params.error_tolerance,
            active: false,
            error: false,
            error_ticks: 0,
            members: Vec::new(),
        }
    }

    /// Enables solving for the group's members
    pub fn activate(&mut self) {
        self.active = true;
    }

    /// Disables solving without touching the members
    pub fn deactivate(&mut self) {
        self.active = false;
    }

    /// Whether members currently participate in the solver
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Whether the group has persisted above its error tolerance
    pub fn is_in_error_state(&self) -> bool {
        self.error
    }

    /// Clears the error flag and restarts the tick counter
    pub fn clear_error_state(&mut self) {
        self.error = false;
        self.error_ticks = 0;
    }

    /// Reads back the solver settings
    pub fn error_params(&self) -> GroupParams {
        GroupParams {
            additional_iterations: self.additional_iterations,
            min_error_ticks: self.min_error_ticks,
            error_tolerance: self.error_tolerance,
        }
    }

    /// Adjusts the error detection settings
    pub fn set_error_params(&mut self, params: &GroupParams) {
        self.min_error_ticks = params.min_error_ticks;
        self.error_tolerance = params.error_tolerance;
    }

    /// Extra iterations this group runs on top of the base count
    pub fn additional_iterations(&self) -> u32 {
        self.additional_iterations
    }

    /// The group's member constraints
    pub fn members(&self) -> &[ConstraintHandle] {
        &self.members
    }

    pub(crate) fn add_member(&mut self, member: ConstraintHandle) {
        self.members.push(member);
    }

    pub(crate) fn remove_member(&mut self, member: ConstraintHandle) {
        self.members.retain(|&m| m != member);
    }

    /// Feeds one tick's worst member position error into the error state
    /// machine
    pub(crate) fn observe_error(&mut self, max_error: f32) {
        if max_error > self.error_tolerance {
            self.error_ticks += 1;
            if self.error_ticks >= self.min_error_ticks {
                self.error = true;
            }
        } else {
            self.error_ticks = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activation_does_not_touch_members() {
        let mut group = ConstraintGroup::new(&GroupParams::default());
        group.add_member(crate::core::ConstraintHandle(7));
        assert!(!group.is_active());

        group.activate();
        assert!(group.is_active());
        assert_eq!(group.members().len(), 1);

        group.deactivate();
        assert!(!group.is_active());
        assert_eq!(group.members().len(), 1);
    }

    #[test]
    fn test_error_state_machine_needs_consecutive_ticks() {
        let params = GroupParams {
            min_error_ticks: 3,
            error_tolerance: 0.05,
            ..GroupParams::default()
        };
        let mut group = ConstraintGroup::new(&params);

        group.observe_error(0.1);
        group.observe_error(0.1);
        assert!(!group.is_in_error_state());

        // A good tick resets the counter.
        group.observe_error(0.01);
        group.observe_error(0.1);
        group.observe_error(0.1);
        assert!(!group.is_in_error_state());

        group.observe_error(0.1);
        assert!(group.is_in_error_state());

        group.clear_error_state();
        assert!(!group.is_in_error_state());
    }
}
