//! Light sources. Every emitter answers two questions: "emit a ray carrying
//! flux" (for light tracing) and "illuminate this point" (for direct light
//! sampling), each with the pdfs the MIS weights need.

use crate::geometry::{Normal3f, Point3f, Vector3f};
use crate::ray::Ray;
use crate::spectrum::Spectrum;

mod distant;
mod infinite;
mod point;
mod spot;
mod triangle;

pub use self::distant::DistantLight;
pub use self::infinite::ConstantInfiniteLight;
pub use self::point::PointLight;
pub use self::spot::SpotLight;
pub use self::triangle::TriangleLight;

pub mod strategy;

/// Result of sampling an emitted ray from a light.
#[derive(Debug, Clone)]
pub struct EmitSample {
    pub radiance: Spectrum,
    pub ray: Ray,
    pub emission_pdf_w: f32,
    pub direct_pdf_a: f32,
    pub cos_theta_at_light: f32,
}

/// Result of sampling the light from a receiving point.
#[derive(Debug, Clone)]
pub struct IlluminateSample {
    pub radiance: Spectrum,
    pub shadow_ray: Ray,
    pub direct_pdf_w: f32,
    pub emission_pdf_w: f32,
    pub cos_theta_at_light: f32,
}

#[derive(Debug, Clone)]
pub enum LightKind {
    Triangle(TriangleLight),
    Point(PointLight),
    Spot(SpotLight),
    Distant(DistantLight),
    ConstantInfinite(ConstantInfiniteLight),
}

#[derive(Debug, Clone)]
pub struct LightSource {
    /// Index of this light in the scene light list.
    pub light_scene_index: u32,
    /// Radiance group the contribution is accumulated into.
    pub group: u32,
    /// User importance multiplier for light strategies.
    pub importance: f32,
    pub direct_light_sampling_enabled: bool,
    pub kind: LightKind,
}

impl LightSource {
    pub fn new(kind: LightKind) -> LightSource {
        LightSource {
            light_scene_index: 0,
            group: 0,
            importance: 1.0,
            direct_light_sampling_enabled: true,
            kind,
        }
    }

    pub fn is_environmental(&self) -> bool {
        matches!(self.kind, LightKind::ConstantInfinite(_))
    }

    pub fn is_infinite(&self) -> bool {
        matches!(
            self.kind,
            LightKind::ConstantInfinite(_) | LightKind::Distant(_)
        )
    }

    pub fn is_intersectable(&self) -> bool {
        matches!(self.kind, LightKind::Triangle(_))
    }

    pub fn is_delta(&self) -> bool {
        matches!(
            self.kind,
            LightKind::Point(_) | LightKind::Spot(_) | LightKind::Distant(_)
        )
    }

    /// Cache entries skip lights that can never reach them.
    pub fn always_in_shadow(&self, p: &Point3f, _n: &Normal3f) -> bool {
        match &self.kind {
            LightKind::Spot(spot) => spot.always_in_shadow(p),
            _ => false,
        }
    }

    /// Approximate emitted power, used to weight light selection.
    pub fn power(&self) -> f32 {
        match &self.kind {
            LightKind::Triangle(l) => l.power(),
            LightKind::Point(l) => l.power(),
            LightKind::Spot(l) => l.power(),
            LightKind::Distant(l) => l.power(),
            LightKind::ConstantInfinite(l) => l.power(),
        }
    }

    /// Cache the scene extent on lights that need it; called once per
    /// preprocess.
    pub fn preprocess(&mut self, world_center: Point3f, world_radius: f32) {
        match &mut self.kind {
            LightKind::Distant(l) => l.set_world(world_center, world_radius),
            LightKind::ConstantInfinite(l) => l.set_world(world_center, world_radius),
            _ => {}
        }
    }

    pub fn emit(&self, time: f32, u0: f32, u1: f32, u2: f32, u3: f32, _u4: f32) -> Option<EmitSample> {
        match &self.kind {
            LightKind::Triangle(l) => l.emit(time, u0, u1, u2, u3),
            LightKind::Point(l) => l.emit(time, u2, u3),
            LightKind::Spot(l) => l.emit(time, u2, u3),
            LightKind::Distant(l) => l.emit(time, u0, u1),
            LightKind::ConstantInfinite(l) => l.emit(time, u0, u1, u2, u3),
        }
    }

    pub fn illuminate(
        &self,
        p: &Point3f,
        time: f32,
        u0: f32,
        u1: f32,
        _u2: f32,
    ) -> Option<IlluminateSample> {
        match &self.kind {
            LightKind::Triangle(l) => l.illuminate(p, time, u0, u1),
            LightKind::Point(l) => l.illuminate(p, time),
            LightKind::Spot(l) => l.illuminate(p, time),
            LightKind::Distant(l) => l.illuminate(p, time),
            LightKind::ConstantInfinite(l) => l.illuminate(p, time, u0, u1),
        }
    }

    /// Radiance carried by a ray that hit (or escaped to) this light, with
    /// the pdfs needed to weight the hit against direct light sampling.
    /// Finite lights return an area pdf, environmental ones a solid-angle
    /// pdf.
    pub fn get_radiance(
        &self,
        fixed_dir: &Vector3f,
        hit_n: Option<&Normal3f>,
    ) -> Option<(Spectrum, f32, f32)> {
        match &self.kind {
            LightKind::Triangle(l) => l.get_radiance(fixed_dir, hit_n),
            LightKind::ConstantInfinite(l) => Some(l.get_radiance()),
            _ => None,
        }
    }
}

/// Radius of the sphere standing in for "infinitely far away": the scene
/// bounding sphere grown a little.
pub fn env_radius(world_radius: f32) -> f32 {
    world_radius * 1.05
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags() {
        let point = LightSource::new(LightKind::Point(PointLight::new(
            Point3f::zero(),
            Spectrum::white(),
        )));
        assert!(point.is_delta());
        assert!(!point.is_environmental());
        assert!(!point.is_intersectable());

        let mut env = LightSource::new(LightKind::ConstantInfinite(ConstantInfiniteLight::new(
            Spectrum::grey(0.5),
        )));
        env.preprocess(Point3f::zero(), 10.0);
        assert!(env.is_environmental());
        assert!(env.is_infinite());
        assert!(!env.is_delta());
    }

    #[test]
    fn test_point_light_illuminate_falls_off_with_distance() {
        let light = LightSource::new(LightKind::Point(PointLight::new(
            Point3f::zero(),
            Spectrum::white(),
        )));
        let near = light
            .illuminate(&Point3f::new(0.0, 0.0, 1.0), 0.0, 0.0, 0.0, 0.0)
            .unwrap();
        let far = light
            .illuminate(&Point3f::new(0.0, 0.0, 2.0), 0.0, 0.0, 0.0, 0.0)
            .unwrap();
        // The 1/d^2 falloff lives in direct_pdf_w.
        assert!((far.direct_pdf_w / near.direct_pdf_w - 4.0).abs() < 1e-4);
    }
}
