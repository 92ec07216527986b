//! Conversion between the game's coordinate/unit convention and the
//! simulation's internal convention.
//!
//! Game space is right-handed with +Z up and distances in game units
//! (inches). Simulation space is right-handed with +Y up and distances in
//! meters; vehicle-local frames use +Z forward, +Y up, +X lateral. The two
//! differ only by an axis permutation and a uniform distance scale, so every
//! function here is pure and parameterized by a single immutable
//! [`UnitScale`] injected at engine start.

use crate::math::{Quaternion, Transform, Vector3};

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// Meters per second in one mile per hour
pub const MPH_TO_METERS_PER_SECOND: f32 = 0.44707;

/// The immutable distance-scale configuration shared by all conversions
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct UnitScale {
    /// Meters per game distance unit
    pub meters_per_unit: f32,
}

impl Default for UnitScale {
    fn default() -> Self {
        // One game unit is an inch.
        Self { meters_per_unit: 0.0254 }
    }
}

impl UnitScale {
    /// Creates a unit scale with the given meters-per-unit factor
    pub fn new(meters_per_unit: f32) -> Self {
        Self { meters_per_unit }
    }
}

/// Converts a scalar distance from game units to meters
#[inline]
pub fn distance_to_sim(distance: f32, scale: &UnitScale) -> f32 {
    distance * scale.meters_per_unit
}

/// Converts a scalar distance from meters to game units
#[inline]
pub fn distance_to_game(distance: f32, scale: &UnitScale) -> f32 {
    distance / scale.meters_per_unit
}

/// Converts a position from game space (+Z up) to sim space (+Y up)
#[inline]
pub fn position_to_sim(p: Vector3, scale: &UnitScale) -> Vector3 {
    Vector3::new(p.x, p.z, -p.y) * scale.meters_per_unit
}

/// Converts a position from sim space (+Y up) to game space (+Z up)
#[inline]
pub fn position_to_game(p: Vector3, scale: &UnitScale) -> Vector3 {
    Vector3::new(p.x, -p.z, p.y) / scale.meters_per_unit
}

/// Converts a direction from game space to sim space (permutation only)
#[inline]
pub fn direction_to_sim(d: Vector3) -> Vector3 {
    Vector3::new(d.x, d.z, -d.y)
}

/// Converts a direction from sim space to game space (permutation only)
#[inline]
pub fn direction_to_game(d: Vector3) -> Vector3 {
    Vector3::new(d.x, -d.z, d.y)
}

/// Converts a rotation from game space to sim space
#[inline]
pub fn rotation_to_sim(q: Quaternion) -> Quaternion {
    Quaternion::new(q.w, q.x, q.z, -q.y)
}

/// Converts a rotation from sim space to game space
#[inline]
pub fn rotation_to_game(q: Quaternion) -> Quaternion {
    Quaternion::new(q.w, q.x, -q.z, q.y)
}

/// Converts a whole rigid transform from game space to sim space
pub fn transform_to_sim(t: &Transform, scale: &UnitScale) -> Transform {
    Transform::new(position_to_sim(t.position, scale), rotation_to_sim(t.rotation))
}

/// Converts a whole rigid transform from sim space to game space
pub fn transform_to_game(t: &Transform, scale: &UnitScale) -> Transform {
    Transform::new(position_to_game(t.position, scale), rotation_to_game(t.rotation))
}

/// Converts a speed in miles per hour to game units per second.
/// Engine tuning tables quote speeds in mph.
#[inline]
pub fn speed_mph_to_game(mph: f32, scale: &UnitScale) -> f32 {
    distance_to_game(mph * MPH_TO_METERS_PER_SECOND, scale)
}

/// Converts a speed in game units per second to miles per hour
#[inline]
pub fn speed_game_to_mph(speed: f32, scale: &UnitScale) -> f32 {
    distance_to_sim(speed, scale) / MPH_TO_METERS_PER_SECOND
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_position_round_trip() {
        let scale = UnitScale::default();
        let p = Vector3::new(12.0, -7.5, 33.0);
        let back = position_to_game(position_to_sim(p, &scale), &scale);
        assert_relative_eq!(back.x, p.x, epsilon = 1e-4);
        assert_relative_eq!(back.y, p.y, epsilon = 1e-4);
        assert_relative_eq!(back.z, p.z, epsilon = 1e-4);
    }

    #[test]
    fn test_up_axis_maps_to_up_axis() {
        // Game +Z (up) must land on sim +Y (up).
        let up = direction_to_sim(Vector3::unit_z());
        assert_eq!(up, Vector3::unit_y());
        assert_eq!(direction_to_game(Vector3::unit_y()), Vector3::unit_z());
    }

    #[test]
    fn test_direction_preserves_length_and_handedness() {
        let a = direction_to_sim(Vector3::unit_x());
        let b = direction_to_sim(Vector3::unit_y());
        let c = direction_to_sim(Vector3::unit_z());
        assert_relative_eq!(a.length(), 1.0);
        // x cross y = z must hold after the permutation
        let cross = a.cross(&b);
        assert_relative_eq!(cross.dot(&c), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_mph_conversion() {
        let scale = UnitScale::default();
        // 1 mph = 0.44707 m/s = 17.6 game units (inches) per second
        assert_relative_eq!(speed_mph_to_game(1.0, &scale), 17.601, epsilon = 1e-2);
        assert_relative_eq!(
            speed_game_to_mph(speed_mph_to_game(30.0, &scale), &scale),
            30.0,
            epsilon = 1e-3
        );
    }
}
