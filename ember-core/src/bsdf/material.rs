//! Closed set of surface scattering models behind a uniform
//! evaluate/sample/pdf dispatch. All directions are in the local shading
//! frame where z is the shading normal and the fixed (viewer) direction has
//! z > 0.

use std::f32::consts::PI;

use crate::bsdf::{BsdfEval, BsdfEvent, BsdfSample};
use crate::geometry::{local_reflect, Vector3f};
use crate::sampling::cosine_sample_hemisphere;
use crate::spectrum::Spectrum;
use crate::INV_PI;

#[derive(Debug, Clone)]
pub enum Material {
    Matte {
        kd: Spectrum,
    },
    Mirror {
        kr: Spectrum,
    },
    Glass {
        kr: Spectrum,
        kt: Spectrum,
        eta: f32,
    },
    Glossy {
        ks: Spectrum,
        exponent: f32,
    },
    /// Pass-through surface; the intersection oracle treats hits on it as
    /// invisible and multiplies the path throughput by the transparency.
    Null {
        transparency: Spectrum,
    },
}

/// Fresnel reflectance for a dielectric interface. `cos_i` is the incident
/// cosine on the viewer side, `eta` the relative index entering the surface.
fn fresnel_dielectric(cos_i: f32, eta: f32) -> f32 {
    let sin_t2 = (1.0 - cos_i * cos_i) / (eta * eta);
    if sin_t2 >= 1.0 {
        // Total internal reflection
        return 1.0;
    }
    let cos_t = (1.0 - sin_t2).sqrt();
    let r_parl = (eta * cos_i - cos_t) / (eta * cos_i + cos_t);
    let r_perp = (cos_i - eta * cos_t) / (cos_i + eta * cos_t);
    0.5 * (r_parl * r_parl + r_perp * r_perp)
}

impl Material {
    pub fn matte(kd: Spectrum) -> Material {
        Material::Matte { kd }
    }

    pub fn mirror(kr: Spectrum) -> Material {
        Material::Mirror { kr }
    }

    pub fn glass(kr: Spectrum, kt: Spectrum, eta: f32) -> Material {
        Material::Glass { kr, kt, eta }
    }

    pub fn glossy(ks: Spectrum, exponent: f32) -> Material {
        Material::Glossy { ks, exponent }
    }

    pub fn null() -> Material {
        Material::Null {
            transparency: Spectrum::white(),
        }
    }

    /// A pass-through surface with partial (alpha-cutout style)
    /// transparency.
    pub fn null_with_transparency(transparency: Spectrum) -> Material {
        Material::Null { transparency }
    }

    pub fn event_types(&self) -> BsdfEvent {
        match self {
            Material::Matte { .. } => BsdfEvent::DIFFUSE | BsdfEvent::REFLECT,
            Material::Mirror { .. } => BsdfEvent::SPECULAR | BsdfEvent::REFLECT,
            Material::Glass { .. } => {
                BsdfEvent::SPECULAR | BsdfEvent::REFLECT | BsdfEvent::TRANSMIT
            }
            Material::Glossy { .. } => BsdfEvent::GLOSSY | BsdfEvent::REFLECT,
            Material::Null { .. } => BsdfEvent::SPECULAR | BsdfEvent::TRANSMIT,
        }
    }

    pub fn is_delta(&self) -> bool {
        matches!(
            self,
            Material::Mirror { .. } | Material::Glass { .. } | Material::Null { .. }
        )
    }

    pub fn is_pass_through(&self) -> bool {
        matches!(self, Material::Null { .. })
    }

    /// Resolve the pass-through test for a hit on this surface. `u` is the
    /// uniform pass-through sample: with probability equal to the mean
    /// transparency the hit fails and `Some(weight)` is returned (the ray
    /// continues, attenuated by the weight); otherwise the surface keeps
    /// the hit and `None` is returned. The weight is `transparency / prob`,
    /// so the estimate stays unbiased.
    pub fn pass_through_transparency(&self, u: f32) -> Option<Spectrum> {
        match self {
            Material::Null { transparency } => {
                let filter =
                    (transparency.r + transparency.g + transparency.b) * (1.0 / 3.0);
                if filter > 0.0 && u < filter {
                    Some(*transparency / filter)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    pub fn glossiness(&self) -> f32 {
        match self {
            Material::Glossy { exponent, .. } => (2.0 / (exponent + 2.0)).sqrt(),
            Material::Matte { .. } => 1.0,
            _ => 0.0,
        }
    }

    pub fn albedo(&self) -> Spectrum {
        match self {
            Material::Matte { kd } => *kd,
            Material::Mirror { kr } => *kr,
            Material::Glass { kr, kt, .. } => (*kr + *kt) * 0.5,
            Material::Glossy { ks, .. } => *ks,
            Material::Null { transparency } => *transparency,
        }
    }

    pub fn evaluate(
        &self,
        fixed: &Vector3f,
        generated: &Vector3f,
        _into_object: bool,
    ) -> Option<BsdfEval> {
        match self {
            Material::Matte { kd } => {
                if generated.z <= 0.0 || fixed.z <= 0.0 {
                    return None;
                }
                let cos_in = generated.z;
                Some(BsdfEval {
                    value: *kd * INV_PI * cos_in,
                    event: BsdfEvent::DIFFUSE | BsdfEvent::REFLECT,
                    pdf_w: cos_in * INV_PI,
                    reverse_pdf_w: fixed.z * INV_PI,
                })
            }
            Material::Glossy { ks, exponent } => {
                if generated.z <= 0.0 || fixed.z <= 0.0 {
                    return None;
                }
                let wr = local_reflect(fixed);
                let cos_alpha = generated.dot(&wr);
                if cos_alpha <= 0.0 {
                    return None;
                }
                let lobe = cos_alpha.powf(*exponent);
                let f = *ks * ((exponent + 2.0) / (2.0 * PI)) * lobe;
                let pdf = (exponent + 1.0) / (2.0 * PI) * lobe;
                Some(BsdfEval {
                    value: f * generated.z,
                    event: BsdfEvent::GLOSSY | BsdfEvent::REFLECT,
                    pdf_w: pdf,
                    // The Phong lobe is symmetric in the reflected pair.
                    reverse_pdf_w: pdf,
                })
            }
            // Delta materials never evaluate.
            Material::Mirror { .. } | Material::Glass { .. } | Material::Null { .. } => None,
        }
    }

    pub fn sample(
        &self,
        fixed: &Vector3f,
        u0: f32,
        u1: f32,
        into_object: bool,
    ) -> Option<BsdfSample> {
        match self {
            Material::Matte { kd } => {
                if fixed.z <= 0.0 {
                    return None;
                }
                let dir = cosine_sample_hemisphere(u0, u1);
                let cos = dir.z;
                if cos <= 0.0 {
                    return None;
                }
                Some(BsdfSample {
                    value: *kd,
                    sampled_dir: dir,
                    pdf_w: cos * INV_PI,
                    cos_sampled_dir: cos,
                    event: BsdfEvent::DIFFUSE | BsdfEvent::REFLECT,
                })
            }
            Material::Mirror { kr } => {
                let dir = local_reflect(fixed);
                Some(BsdfSample {
                    value: *kr,
                    sampled_dir: dir,
                    pdf_w: 1.0,
                    cos_sampled_dir: dir.z.abs(),
                    event: BsdfEvent::SPECULAR | BsdfEvent::REFLECT,
                })
            }
            Material::Glass { kr, kt, eta } => {
                let eta_rel = if into_object { *eta } else { 1.0 / *eta };
                let f = fresnel_dielectric(fixed.z, eta_rel);
                if u0 < f {
                    let dir = local_reflect(fixed);
                    Some(BsdfSample {
                        value: *kr,
                        sampled_dir: dir,
                        pdf_w: f,
                        cos_sampled_dir: dir.z.abs(),
                        event: BsdfEvent::SPECULAR | BsdfEvent::REFLECT,
                    })
                } else {
                    // Refract; the TIR branch never reaches here because
                    // fresnel_dielectric returns 1 in that case.
                    let inv_eta = 1.0 / eta_rel;
                    let sin_t2 = (1.0 - fixed.z * fixed.z) * inv_eta * inv_eta;
                    let cos_t = (1.0 - sin_t2).max(0.0).sqrt();
                    let dir = Vector3f::new(-fixed.x * inv_eta, -fixed.y * inv_eta, -cos_t);
                    Some(BsdfSample {
                        value: *kt,
                        sampled_dir: dir,
                        pdf_w: 1.0 - f,
                        cos_sampled_dir: cos_t,
                        event: BsdfEvent::SPECULAR | BsdfEvent::TRANSMIT,
                    })
                }
            }
            Material::Glossy { ks, exponent } => {
                if fixed.z <= 0.0 {
                    return None;
                }
                let wr = local_reflect(fixed);
                // Sample the power-cosine lobe around the mirror direction.
                let cos_alpha = u0.powf(1.0 / (exponent + 1.0));
                let sin_alpha = (1.0 - cos_alpha * cos_alpha).max(0.0).sqrt();
                let phi = 2.0 * PI * u1;
                let (lx, ly) = crate::geometry::coordinate_system(&wr);
                let dir =
                    lx * (sin_alpha * phi.cos()) + ly * (sin_alpha * phi.sin()) + wr * cos_alpha;
                if dir.z <= 0.0 {
                    return None;
                }
                let pdf = (exponent + 1.0) / (2.0 * PI) * cos_alpha.powf(*exponent);
                if pdf <= 0.0 {
                    return None;
                }
                let value = *ks * ((exponent + 2.0) / (exponent + 1.0)) * dir.z;
                Some(BsdfSample {
                    value,
                    sampled_dir: dir,
                    pdf_w: pdf,
                    cos_sampled_dir: dir.z,
                    event: BsdfEvent::GLOSSY | BsdfEvent::REFLECT,
                })
            }
            // Transmission through a pass-through surface is resolved by
            // the intersection oracle; a null hit that survived the
            // pass-through test scatters nothing.
            Material::Null { .. } => None,
        }
    }

    pub fn pdf(&self, fixed: &Vector3f, sampled: &Vector3f, _into_object: bool) -> (f32, f32) {
        match self {
            Material::Matte { .. } => {
                if sampled.z <= 0.0 || fixed.z <= 0.0 {
                    (0.0, 0.0)
                } else {
                    (sampled.z * INV_PI, fixed.z * INV_PI)
                }
            }
            Material::Glossy { exponent, .. } => {
                if sampled.z <= 0.0 || fixed.z <= 0.0 {
                    return (0.0, 0.0);
                }
                let wr = local_reflect(fixed);
                let cos_alpha = sampled.dot(&wr);
                if cos_alpha <= 0.0 {
                    return (0.0, 0.0);
                }
                let pdf = (exponent + 1.0) / (2.0 * PI) * cos_alpha.powf(*exponent);
                (pdf, pdf)
            }
            Material::Mirror { .. } | Material::Glass { .. } | Material::Null { .. } => (0.0, 0.0),
        }
    }
}
