use std::f32::consts::PI;

use crate::geometry::{coordinate_system, Point3f};
use crate::light::{env_radius, EmitSample, IlluminateSample};
use crate::ray::Ray;
use crate::sampling::{concentric_sample_disk, uniform_sample_sphere, uniform_sphere_pdf};
use crate::spectrum::Spectrum;

/// Constant environment light: the same radiance from every direction.
#[derive(Debug, Clone)]
pub struct ConstantInfiniteLight {
    pub radiance: Spectrum,
    world_center: Point3f,
    world_radius: f32,
}

impl ConstantInfiniteLight {
    pub fn new(radiance: Spectrum) -> ConstantInfiniteLight {
        ConstantInfiniteLight {
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
        4.0 * PI * PI * self.world_radius * self.world_radius * self.radiance.y()
    }

    fn disk_pdf(&self) -> f32 {
        1.0 / (PI * self.world_radius * self.world_radius)
    }

    pub fn emit(&self, time: f32, u0: f32, u1: f32, u2: f32, u3: f32) -> Option<EmitSample> {
        // Pick a direction into the scene, then an origin on the disk
        // outside the scene perpendicular to it.
        let dir = uniform_sample_sphere(u0, u1);
        let disk = concentric_sample_disk(u2, u3);
        let (x, y) = coordinate_system(&dir);
        let origin = self.world_center - dir * self.world_radius
            + x * (disk.x * self.world_radius)
            + y * (disk.y * self.world_radius);
        Some(EmitSample {
            radiance: self.radiance,
            ray: Ray::new(origin, dir, time),
            emission_pdf_w: uniform_sphere_pdf() * self.disk_pdf(),
            direct_pdf_a: uniform_sphere_pdf(),
            cos_theta_at_light: 1.0,
        })
    }

    pub fn illuminate(&self, p: &Point3f, time: f32, u0: f32, u1: f32) -> Option<IlluminateSample> {
        let dir = uniform_sample_sphere(u0, u1);
        let distance = (*p - self.world_center).length() + 2.0 * self.world_radius;
        let mut shadow_ray = Ray::segment(*p, dir, 0.0, distance, time);
        shadow_ray.update_min_max_with_epsilon();
        Some(IlluminateSample {
            radiance: self.radiance,
            shadow_ray,
            direct_pdf_w: uniform_sphere_pdf(),
            emission_pdf_w: uniform_sphere_pdf() * self.disk_pdf(),
            cos_theta_at_light: 1.0,
        })
    }

    /// Radiance for an escaped ray. The direct pdf here is in solid angle.
    pub fn get_radiance(&self) -> (Spectrum, f32, f32) {
        (
            self.radiance,
            uniform_sphere_pdf(),
            uniform_sphere_pdf() * self.disk_pdf(),
        )
    }
}
