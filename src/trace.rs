//! The external raycast capability the suspension model is built on.
//!
//! The embedding engine owns the world geometry and fluid volumes; this
//! crate only issues rays through the [`SurfaceTrace`] seam and consumes the
//! surface data that comes back.

use crate::math::{Ray, Vector3};

/// Result of a single trace against the world
#[derive(Debug, Clone, Copy)]
pub struct TraceResult {
    /// Whether the ray hit anything before its full length
    pub hit: bool,

    /// Fraction of the ray length at which the hit occurred (1.0 = no hit)
    pub fraction: f32,

    /// World-space end position of the trace
    pub end_position: Vector3,

    /// Surface normal at the hit point
    pub normal: Vector3,

    /// Identifier of the hit surface's material properties
    pub surface_id: u32,

    /// Friction of the hit surface
    pub surface_friction: f32,

    /// Dampening of the hit surface (1/t to come to a complete stop)
    pub surface_dampening: f32,

    /// Whether the hit surface belongs to a fluid volume
    pub hit_water: bool,

    /// Fraction of the ray spent inside solid/fluid before leaving it.
    /// Used by the vertical probe that measures submersion depth.
    pub fraction_left_solid: f32,
}

impl TraceResult {
    /// A trace that hit nothing
    pub fn miss(ray: &Ray, length: f32) -> Self {
        Self {
            hit: false,
            fraction: 1.0,
            end_position: ray.origin + ray.normalized_direction() * length,
            normal: Vector3::zero(),
            surface_id: 0,
            surface_friction: 1.0,
            surface_dampening: 0.0,
            hit_water: false,
            fraction_left_solid: 0.0,
        }
    }
}

/// The ray-trace capability provided by the embedding engine
pub trait SurfaceTrace {
    /// Traces a ray against solid world geometry only
    fn trace_ray(&self, ray: &Ray, length: f32) -> TraceResult;

    /// Traces a ray against solid geometry and fluid surfaces, reporting
    /// whether the segment crossed a fluid boundary
    fn trace_ray_with_water(&self, ray: &Ray, length: f32) -> TraceResult;

    /// Returns whether a world-space point is inside a fluid volume
    fn point_in_water(&self, point: Vector3) -> bool;
}
