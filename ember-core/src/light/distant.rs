use std::f32::consts::PI;

use crate::geometry::{coordinate_system, Point3f, Vector3f};
use crate::light::{env_radius, EmitSample, IlluminateSample};
use crate::ray::Ray;
use crate::sampling::concentric_sample_disk;
use crate::spectrum::Spectrum;

/// Directional (sun-like) light. `direction` is the direction the light
/// travels.
#[derive(Debug, Clone)]
pub struct DistantLight {
    pub direction: Vector3f,
    pub radiance: Spectrum,
    world_center: Point3f,
    world_radius: f32,
}

impl DistantLight {
    pub fn new(direction: Vector3f, radiance: Spectrum) -> DistantLight {
        DistantLight {
            direction: direction.normalize(),
            radiance,
            world_center: Point3f::zero(),
            world_radius: 1.0,
        }
    }

    pub fn set_world(&mut self, center: Point3f, radius: f32) {
        self.world_center = center;
        self.world_radius = env_radius(radius);
    }

    pub fn power(&self) -> f32 {
        self.radiance.y() * PI * self.world_radius * self.world_radius
    }

    pub fn emit(&self, time: f32, u0: f32, u1: f32) -> Option<EmitSample> {
        // Start from a disk just outside the scene, facing along the light.
        let disk = concentric_sample_disk(u0, u1);
        let (x, y) = coordinate_system(&self.direction);
        let origin = self.world_center - self.direction * self.world_radius
            + x * (disk.x * self.world_radius)
            + y * (disk.y * self.world_radius);
        let disk_pdf = 1.0 / (PI * self.world_radius * self.world_radius);
        Some(EmitSample {
            radiance: self.radiance,
            ray: Ray::new(origin, self.direction, time),
            emission_pdf_w: disk_pdf,
            direct_pdf_a: 1.0,
            cos_theta_at_light: 1.0,
        })
    }

    pub fn illuminate(&self, p: &Point3f, time: f32) -> Option<IlluminateSample> {
        let distance = 2.0 * self.world_radius;
        let mut shadow_ray = Ray::segment(*p, -self.direction, 0.0, distance, time);
        shadow_ray.update_min_max_with_epsilon();
        Some(IlluminateSample {
            radiance: self.radiance,
            shadow_ray,
            direct_pdf_w: 1.0,
            emission_pdf_w: 1.0 / (PI * self.world_radius * self.world_radius),
            cos_theta_at_light: 1.0,
        })
    }
}
