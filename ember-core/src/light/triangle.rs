use std::f32::consts::PI;

use crate::geometry::{coordinate_system, Normal3f, Point3f, Vector3f};
use crate::light::{EmitSample, IlluminateSample};
use crate::ray::Ray;
use crate::sampling::{cosine_sample_hemisphere, uniform_sample_triangle};
use crate::spectrum::Spectrum;
use crate::INV_PI;

/// One emissive triangle. Emission is Lambertian from the front face
/// (the side the geometric normal points to).
#[derive(Debug, Clone)]
pub struct TriangleLight {
    pub v0: Point3f,
    pub v1: Point3f,
    pub v2: Point3f,
    pub normal: Normal3f,
    pub emission: Spectrum,
    pub object_id: u32,
    area: f32,
    inv_area: f32,
}

impl TriangleLight {
    pub fn new(
        v0: Point3f,
        v1: Point3f,
        v2: Point3f,
        emission: Spectrum,
        object_id: u32,
    ) -> TriangleLight {
        let cross = (v1 - v0).cross(&(v2 - v0));
        let area = 0.5 * cross.length();
        TriangleLight {
            v0,
            v1,
            v2,
            normal: Normal3f::from(cross.normalize()),
            emission,
            object_id,
            area,
            inv_area: 1.0 / area,
        }
    }

    pub fn area(&self) -> f32 {
        self.area
    }

    pub fn power(&self) -> f32 {
        self.emission.y() * self.area * PI
    }

    fn sample_point(&self, u0: f32, u1: f32) -> Point3f {
        let (b0, b1) = uniform_sample_triangle(u0, u1);
        let b2 = 1.0 - b0 - b1;
        Point3f::new(
            b0 * self.v0.x + b1 * self.v1.x + b2 * self.v2.x,
            b0 * self.v0.y + b1 * self.v1.y + b2 * self.v2.y,
            b0 * self.v0.z + b1 * self.v1.z + b2 * self.v2.z,
        )
    }

    pub fn emit(&self, time: f32, u0: f32, u1: f32, u2: f32, u3: f32) -> Option<EmitSample> {
        let origin = self.sample_point(u0, u1);
        let local = cosine_sample_hemisphere(u2, u3);
        let cos_theta = local.z;
        if cos_theta <= 0.0 {
            return None;
        }
        let n = Vector3f::from(self.normal);
        let (x, y) = coordinate_system(&n);
        let dir = x * local.x + y * local.y + n * local.z;
        Some(EmitSample {
            radiance: self.emission * cos_theta,
            ray: Ray::new(origin, dir, time),
            emission_pdf_w: self.inv_area * cos_theta * INV_PI,
            direct_pdf_a: self.inv_area,
            cos_theta_at_light: cos_theta,
        })
    }

    pub fn illuminate(&self, p: &Point3f, time: f32, u0: f32, u1: f32) -> Option<IlluminateSample> {
        let on_light = self.sample_point(u0, u1);
        let to_light = on_light - *p;
        let distance_squared = to_light.length_squared();
        if distance_squared == 0.0 {
            return None;
        }
        let distance = distance_squared.sqrt();
        let dir = to_light / distance;
        let cos_at_light = self.normal.dotv(&(-dir));
        if cos_at_light <= 0.0 {
            // Receiver is behind the emitting face.
            return None;
        }
        let mut shadow_ray = Ray::segment(*p, dir, 0.0, distance, time);
        shadow_ray.update_min_max_with_epsilon();
        Some(IlluminateSample {
            radiance: self.emission,
            shadow_ray,
            // Solid-angle conversion of the uniform area pdf.
            direct_pdf_w: self.inv_area * distance_squared / cos_at_light,
            emission_pdf_w: self.inv_area * cos_at_light * INV_PI,
            cos_theta_at_light: cos_at_light,
        })
    }

    /// Radiance seen by a ray that hit the triangle from direction
    /// `fixed_dir` (towards the viewer).
    pub fn get_radiance(
        &self,
        fixed_dir: &Vector3f,
        _hit_n: Option<&Normal3f>,
    ) -> Option<(Spectrum, f32, f32)> {
        let cos = self.normal.dotv(fixed_dir);
        if cos <= 0.0 {
            return None;
        }
        Some((
            self.emission,
            self.inv_area,
            self.inv_area * cos * INV_PI,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_triangle() -> TriangleLight {
        TriangleLight::new(
            Point3f::new(0.0, 0.0, 0.0),
            Point3f::new(1.0, 0.0, 0.0),
            Point3f::new(0.0, 1.0, 0.0),
            Spectrum::white(),
            0,
        )
    }

    #[test]
    fn test_area_and_normal() {
        let light = unit_triangle();
        assert!((light.area() - 0.5).abs() < 1e-6);
        assert!((light.normal.dot(&Normal3f::new(0.0, 0.0, 1.0)) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_back_side_is_dark() {
        let light = unit_triangle();
        assert!(light
            .illuminate(&Point3f::new(0.2, 0.2, -1.0), 0.0, 0.3, 0.3)
            .is_none());
        assert!(light
            .get_radiance(&Vector3f::new(0.0, 0.0, -1.0), None)
            .is_none());
    }

    #[test]
    fn test_illuminate_pdf_solid_angle() {
        let light = unit_triangle();
        // Straight above: cos at light is 1 and pdf_w grows with d^2.
        let s1 = light
            .illuminate(&Point3f::new(0.25, 0.25, 1.0), 0.0, 0.5, 0.5)
            .unwrap();
        let s2 = light
            .illuminate(&Point3f::new(0.25, 0.25, 2.0), 0.0, 0.5, 0.5)
            .unwrap();
        assert!(s2.direct_pdf_w > s1.direct_pdf_w);
    }
}
