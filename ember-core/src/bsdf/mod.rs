//! Local scattering model: a `Bsdf` bundles a hit point with the material at
//! that point and exposes evaluation, sampling and pdf queries in world
//! space.
//!
//! Conventions follow the path-tracing formulation used by the integrators:
//! `evaluate` returns the BSDF value already multiplied by `|cos θ_in|` and
//! `sample` returns the value multiplied by `cos θ_in / pdf_w`.

use std::sync::Arc;

use bitflags::bitflags;

use crate::epsilon;
use crate::geometry::{Frame, Normal3f, Point2f, Point3f, Vector3f};
use crate::spectrum::Spectrum;

mod material;

pub use self::material::Material;

bitflags! {
    pub struct BsdfEvent: u32 {
        const NONE     = 0;
        const DIFFUSE  = 1;
        const GLOSSY   = 1 << 1;
        const SPECULAR = 1 << 2;
        const REFLECT  = 1 << 3;
        const TRANSMIT = 1 << 4;
    }
}

/// Everything the intersection oracle resolves about a surface hit.
#[derive(Debug, Clone)]
pub struct HitPoint {
    pub p: Point3f,
    /// Geometric normal, front face by triangle winding.
    pub geometry_n: Normal3f,
    /// Shading normal, flipped towards the viewer side.
    pub shade_n: Normal3f,
    /// Direction towards the viewer (opposite of the incoming ray).
    pub fixed_dir: Vector3f,
    pub uv: Point2f,
    /// True when the incoming ray crosses into the object (hits the front
    /// face).
    pub into_object: bool,
    pub material_id: u32,
    pub object_id: u32,
    pub interior_volume: Option<u32>,
    pub exterior_volume: Option<u32>,
}

impl HitPoint {
    /// The shading normal on the side the path lands on.
    pub fn landing_shade_n(&self) -> Normal3f {
        self.shade_n
    }

    pub fn landing_geometry_n(&self) -> Normal3f {
        if self.into_object {
            self.geometry_n
        } else {
            -self.geometry_n
        }
    }
}

#[derive(Debug, Clone)]
pub struct BsdfEval {
    /// BSDF value times `|cos θ_in|`.
    pub value: Spectrum,
    pub event: BsdfEvent,
    pub pdf_w: f32,
    pub reverse_pdf_w: f32,
}

#[derive(Debug, Clone)]
pub struct BsdfSample {
    /// BSDF value times `cos θ_in / pdf_w`.
    pub value: Spectrum,
    pub sampled_dir: Vector3f,
    pub pdf_w: f32,
    pub cos_sampled_dir: f32,
    pub event: BsdfEvent,
}

#[derive(Clone)]
pub struct Bsdf {
    pub hit_point: HitPoint,
    pub material: Arc<Material>,
    /// Index into the scene light list when the surface is emissive.
    pub triangle_light_index: Option<u32>,
    frame: Frame,
}

impl Bsdf {
    pub fn new(
        hit_point: HitPoint,
        material: Arc<Material>,
        triangle_light_index: Option<u32>,
    ) -> Bsdf {
        let frame = Frame::from_normal(&hit_point.shade_n);
        Bsdf {
            hit_point,
            material,
            triangle_light_index,
            frame,
        }
    }

    pub fn event_types(&self) -> BsdfEvent {
        self.material.event_types()
    }

    pub fn is_delta(&self) -> bool {
        self.material.is_delta()
    }

    /// Surface interactions only; volume scattering keeps its own flag in
    /// the cache key.
    pub fn is_volume(&self) -> bool {
        false
    }

    pub fn glossiness(&self) -> f32 {
        self.material.glossiness()
    }

    pub fn albedo(&self) -> Spectrum {
        self.material.albedo()
    }

    pub fn is_light_source(&self) -> bool {
        self.triangle_light_index.is_some()
    }

    /// Evaluate the BSDF towards `generated_dir` (world space). Returns
    /// `None` for a black evaluation, including any query on a delta
    /// material.
    pub fn evaluate(&self, generated_dir: &Vector3f) -> Option<BsdfEval> {
        let local_fixed = self.frame.to_local(&self.hit_point.fixed_dir);
        let local_generated = self.frame.to_local(generated_dir);
        self.material
            .evaluate(&local_fixed, &local_generated, self.hit_point.into_object)
    }

    /// Sample an incident direction; the returned value is premultiplied by
    /// `cos/pdf`.
    pub fn sample(&self, u0: f32, u1: f32) -> Option<BsdfSample> {
        let local_fixed = self.frame.to_local(&self.hit_point.fixed_dir);
        self.material
            .sample(&local_fixed, u0, u1, self.hit_point.into_object)
            .map(|mut sample| {
                sample.sampled_dir = self.frame.to_world(&sample.sampled_dir);
                sample
            })
    }

    /// Forward and reverse solid-angle pdfs of `sampled_dir`.
    pub fn pdf(&self, sampled_dir: &Vector3f) -> (f32, f32) {
        let local_fixed = self.frame.to_local(&self.hit_point.fixed_dir);
        let local_sampled = self.frame.to_local(sampled_dir);
        self.material
            .pdf(&local_fixed, &local_sampled, self.hit_point.into_object)
    }

    /// Epsilon-offset origin for the next ray leaving the hit point in
    /// direction `dir`.
    pub fn get_ray_origin(&self, dir: &Vector3f) -> Point3f {
        let geometry_n = Vector3f::from(self.hit_point.geometry_n);
        let e = epsilon::epsilon_point(&self.hit_point.p);
        if dir.dot(&geometry_n) > 0.0 {
            self.hit_point.p + geometry_n * e
        } else {
            self.hit_point.p - geometry_n * e
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_hit_point() -> HitPoint {
        HitPoint {
            p: Point3f::zero(),
            geometry_n: Normal3f::new(0.0, 0.0, 1.0),
            shade_n: Normal3f::new(0.0, 0.0, 1.0),
            fixed_dir: Vector3f::new(0.0, 0.0, 1.0),
            uv: Point2f::new(0.0, 0.0),
            into_object: true,
            material_id: 0,
            object_id: 0,
            interior_volume: None,
            exterior_volume: None,
        }
    }

    #[test]
    fn test_matte_sample_stays_in_hemisphere() {
        let bsdf = Bsdf::new(
            test_hit_point(),
            Arc::new(Material::matte(Spectrum::grey(0.7))),
            None,
        );
        for i in 0..16 {
            let u = (i as f32 + 0.5) / 16.0;
            let sample = bsdf.sample(u, 1.0 - u).unwrap();
            assert!(sample.sampled_dir.dotn(&bsdf.hit_point.shade_n) > 0.0);
            assert!(sample.pdf_w > 0.0);
            assert!(sample.event.contains(BsdfEvent::DIFFUSE | BsdfEvent::REFLECT));
        }
    }

    #[test]
    fn test_matte_eval_pdf_consistency() {
        let bsdf = Bsdf::new(
            test_hit_point(),
            Arc::new(Material::matte(Spectrum::grey(0.7))),
            None,
        );
        let dir = Vector3f::new(0.3, 0.2, 0.9).normalize();
        let eval = bsdf.evaluate(&dir).unwrap();
        let (pdf, _rev) = bsdf.pdf(&dir);
        assert!((eval.pdf_w - pdf).abs() < 1e-6);
    }

    #[test]
    fn test_mirror_is_delta() {
        let bsdf = Bsdf::new(
            test_hit_point(),
            Arc::new(Material::mirror(Spectrum::grey(0.9))),
            None,
        );
        assert!(bsdf.is_delta());
        assert!(bsdf.evaluate(&Vector3f::new(0.0, 0.0, 1.0)).is_none());
        let sample = bsdf.sample(0.5, 0.5).unwrap();
        assert!(sample.event.contains(BsdfEvent::SPECULAR));
    }

    #[test]
    fn test_ray_origin_offset_side() {
        let bsdf = Bsdf::new(
            test_hit_point(),
            Arc::new(Material::matte(Spectrum::grey(0.5))),
            None,
        );
        let above = bsdf.get_ray_origin(&Vector3f::new(0.0, 0.0, 1.0));
        let below = bsdf.get_ray_origin(&Vector3f::new(0.0, 0.0, -1.0));
        assert!(above.z > 0.0);
        assert!(below.z < 0.0);
    }
}
