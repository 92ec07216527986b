use vehicle_phys::math::{clamp, Ray, Vector3, EPSILON};
use vehicle_phys::trace::{SurfaceTrace, TraceResult};

/// A world made of one horizontal ground plane and an optional water plane
/// above it. Enough terrain for suspension and vehicle tests.
pub struct FlatWorld {
    pub ground_height: f32,
    pub water_height: Option<f32>,
    pub friction: f32,
    pub dampening: f32,
    pub surface_id: u32,
}

impl FlatWorld {
    pub fn dry_ground(height: f32) -> Self {
        Self {
            ground_height: height,
            water_height: None,
            friction: 1.0,
            dampening: 0.0,
            surface_id: 1,
        }
    }

    pub fn lake(water_height: f32, bottom: f32) -> Self {
        Self {
            ground_height: bottom,
            water_height: Some(water_height),
            friction: 1.0,
            dampening: 0.2,
            surface_id: 2,
        }
    }

    /// Intersects a downward-facing ray with a horizontal plane
    fn plane_hit(origin: Vector3, dir: Vector3, length: f32, plane_y: f32) -> Option<f32> {
        if dir.y >= -EPSILON || length <= EPSILON {
            return None;
        }
        let t = (plane_y - origin.y) / dir.y;
        if t >= 0.0 && t <= length {
            Some(t)
        } else {
            None
        }
    }

    fn hit_result(&self, ray: &Ray, length: f32, t: f32, water: bool) -> TraceResult {
        let dir = ray.normalized_direction();
        TraceResult {
            hit: true,
            fraction: t / length,
            end_position: ray.origin + dir * t,
            normal: Vector3::unit_y(),
            surface_id: if water { self.surface_id + 100 } else { self.surface_id },
            surface_friction: self.friction,
            surface_dampening: self.dampening,
            hit_water: water,
            fraction_left_solid: 0.0,
        }
    }
}

impl SurfaceTrace for FlatWorld {
    fn trace_ray(&self, ray: &Ray, length: f32) -> TraceResult {
        let dir = ray.normalized_direction();
        match Self::plane_hit(ray.origin, dir, length, self.ground_height) {
            Some(t) => self.hit_result(ray, length, t, false),
            None => TraceResult::miss(ray, length),
        }
    }

    fn trace_ray_with_water(&self, ray: &Ray, length: f32) -> TraceResult {
        let dir = ray.normalized_direction();

        let solid = Self::plane_hit(ray.origin, dir, length, self.ground_height);
        let water = self.water_height.and_then(|w| {
            // The water surface only exists when approached from above.
            if ray.origin.y > w {
                Self::plane_hit(ray.origin, dir, length, w)
            } else {
                None
            }
        });

        let mut result = match (solid, water) {
            (Some(ts), Some(tw)) => {
                if tw < ts {
                    self.hit_result(ray, length, tw, true)
                } else {
                    self.hit_result(ray, length, ts, false)
                }
            }
            (Some(ts), None) => self.hit_result(ray, length, ts, false),
            (None, Some(tw)) => self.hit_result(ray, length, tw, true),
            (None, None) => TraceResult::miss(ray, length),
        };

        // Depth probes start inside the water and point up.
        if let Some(w) = self.water_height {
            if ray.origin.y < w && dir.y > EPSILON {
                result.fraction_left_solid =
                    clamp((w - ray.origin.y) / (length * dir.y), 0.0, 1.0);
            }
        }
        result
    }

    fn point_in_water(&self, point: Vector3) -> bool {
        self.water_height.map_or(false, |w| point.y < w)
    }
}
