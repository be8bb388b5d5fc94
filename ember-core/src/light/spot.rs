use std::f32::consts::PI;

use crate::geometry::{coordinate_system, Point3f, Vector3f};
use crate::light::{EmitSample, IlluminateSample};
use crate::ray::Ray;
use crate::sampling::{uniform_cone_pdf, uniform_sample_cone};
use crate::spectrum::Spectrum;

/// Spot light with a smooth falloff between the hot-spot cone and the total
/// cone.
#[derive(Debug, Clone)]
pub struct SpotLight {
    pub position: Point3f,
    pub direction: Vector3f,
    pub intensity: Spectrum,
    cos_total_width: f32,
    cos_falloff_start: f32,
}

impl SpotLight {
    pub fn new(
        position: Point3f,
        direction: Vector3f,
        intensity: Spectrum,
        total_width_deg: f32,
        falloff_start_deg: f32,
    ) -> SpotLight {
        SpotLight {
            position,
            direction: direction.normalize(),
            intensity,
            cos_total_width: total_width_deg.to_radians().cos(),
            cos_falloff_start: falloff_start_deg.to_radians().cos(),
        }
    }

    fn falloff(&self, cos_theta: f32) -> f32 {
        if cos_theta < self.cos_total_width {
            return 0.0;
        }
        if cos_theta > self.cos_falloff_start {
            return 1.0;
        }
        let delta =
            (cos_theta - self.cos_total_width) / (self.cos_falloff_start - self.cos_total_width);
        delta * delta * delta * delta
    }

    pub fn power(&self) -> f32 {
        self.intensity.y() * 2.0 * PI * (1.0 - 0.5 * (self.cos_falloff_start + self.cos_total_width))
    }

    /// A point strictly outside the total cone can never receive light.
    pub fn always_in_shadow(&self, p: &Point3f) -> bool {
        let to_p = *p - self.position;
        let len = to_p.length();
        if len == 0.0 {
            return false;
        }
        to_p.dot(&self.direction) / len < self.cos_total_width
    }

    pub fn emit(&self, time: f32, u0: f32, u1: f32) -> Option<EmitSample> {
        let local = uniform_sample_cone(u0, u1, self.cos_total_width);
        let (x, y) = coordinate_system(&self.direction);
        let dir = x * local.x + y * local.y + self.direction * local.z;
        Some(EmitSample {
            radiance: self.intensity * self.falloff(local.z),
            ray: Ray::new(self.position, dir, time),
            emission_pdf_w: uniform_cone_pdf(self.cos_total_width),
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
        let falloff = self.falloff((-dir).dot(&self.direction));
        if falloff == 0.0 {
            return None;
        }
        let mut shadow_ray = Ray::segment(*p, dir, 0.0, distance, time);
        shadow_ray.update_min_max_with_epsilon();
        Some(IlluminateSample {
            radiance: self.intensity * falloff,
            shadow_ray,
            direct_pdf_w: distance_squared,
            emission_pdf_w: uniform_cone_pdf(self.cos_total_width),
            cos_theta_at_light: 1.0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cone_shadow_test() {
        let spot = SpotLight::new(
            Point3f::zero(),
            Vector3f::new(0.0, 0.0, 1.0),
            Spectrum::white(),
            30.0,
            20.0,
        );
        assert!(!spot.always_in_shadow(&Point3f::new(0.0, 0.0, 5.0)));
        assert!(spot.always_in_shadow(&Point3f::new(5.0, 0.0, 0.1)));
    }

    #[test]
    fn test_falloff_is_smooth_edge() {
        let spot = SpotLight::new(
            Point3f::zero(),
            Vector3f::new(0.0, 0.0, 1.0),
            Spectrum::white(),
            40.0,
            10.0,
        );
        assert_eq!(spot.falloff(1.0), 1.0);
        assert_eq!(spot.falloff(0.0), 0.0);
        let mid = spot.falloff(25.0f32.to_radians().cos());
        assert!(mid > 0.0 && mid < 1.0);
    }
}
