use std::f32::consts::PI;

use crate::geometry::Point3f;
use crate::light::{EmitSample, IlluminateSample};
use crate::ray::Ray;
use crate::sampling::{uniform_sample_sphere, uniform_sphere_pdf};
use crate::spectrum::Spectrum;

/// Isotropic point light; `intensity` is radiant intensity (W/sr).
#[derive(Debug, Clone)]
pub struct PointLight {
    pub position: Point3f,
    pub intensity: Spectrum,
}

impl PointLight {
    pub fn new(position: Point3f, intensity: Spectrum) -> PointLight {
        PointLight {
            position,
            intensity,
        }
    }

    pub fn power(&self) -> f32 {
        4.0 * PI * self.intensity.y()
    }

    pub fn emit(&self, time: f32, u0: f32, u1: f32) -> Option<EmitSample> {
        let dir = uniform_sample_sphere(u0, u1);
        Some(EmitSample {
            radiance: self.intensity,
            ray: Ray::new(self.position, dir, time),
            emission_pdf_w: uniform_sphere_pdf(),
            direct_pdf_a: 1.0,
            cos_theta_at_light: 1.0,
        })
    }

    pub fn illuminate(&self, p: &Point3f, time: f32) -> Option<IlluminateSample> {
        let to_light = self.position - *p;
        let distance_squared = to_light.length_squared();
        if distance_squared == 0.0 {
            return None;
        }
        let distance = distance_squared.sqrt();
        let dir = to_light / distance;
        let mut shadow_ray = Ray::segment(*p, dir, 0.0, distance, time);
        shadow_ray.update_min_max_with_epsilon();
        Some(IlluminateSample {
            radiance: self.intensity,
            shadow_ray,
            direct_pdf_w: distance_squared,
            emission_pdf_w: uniform_sphere_pdf(),
            cos_theta_at_light: 1.0,
        })
    }
}
