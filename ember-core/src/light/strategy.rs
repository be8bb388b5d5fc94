//! Scene-global emitter selection, plus the spatially-varying dispatch that
//! consults the direct-light sampling cache.

use std::sync::Arc;

use log::debug;

use crate::dlsc::DirectLightSamplingCache;
use crate::error::{RenderError, Result};
use crate::geometry::{Normal3f, Point3f};
use crate::light::LightSource;
use crate::sampling::Distribution1d;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LightStrategyType {
    Uniform,
    Power,
    LogPower,
    DlsCache,
}

impl LightStrategyType {
    pub fn parse(tag: &str) -> Result<LightStrategyType> {
        match tag {
            "UNIFORM" => Ok(LightStrategyType::Uniform),
            "POWER" => Ok(LightStrategyType::Power),
            "LOG_POWER" | "LOGPOWER" => Ok(LightStrategyType::LogPower),
            "DLS_CACHE" => Ok(LightStrategyType::DlsCache),
            other => Err(RenderError::config(
                "lightstrategy.type",
                format!("unknown light strategy {:?}", other),
            )),
        }
    }
}

pub struct LightStrategy {
    strategy_type: LightStrategyType,
    /// Scene-global distribution; for the cache strategy this is the
    /// log-power fallback selected at engine start.
    lights_distribution: Distribution1d,
    cache: Option<Arc<DirectLightSamplingCache>>,
}

fn strategy_weights(
    lights: &[LightSource],
    strategy_type: LightStrategyType,
    only_infinite_lights: bool,
    env_radius: f32,
) -> Vec<f32> {
    let inv_env_radius2 = 1.0 / (env_radius * env_radius);
    lights
        .iter()
        .map(|light| {
            if only_infinite_lights && !light.is_infinite() {
                return 0.0;
            }
            match strategy_type {
                LightStrategyType::Uniform => light.importance,
                LightStrategyType::Power => {
                    let mut power = light.power();
                    // Avoid over-sampling of distant lights
                    if light.is_infinite() {
                        power *= inv_env_radius2;
                    }
                    power * light.importance
                }
                LightStrategyType::LogPower | LightStrategyType::DlsCache => {
                    (1.0 + light.power()).ln() * light.importance
                }
            }
        })
        .collect()
}

impl LightStrategy {
    pub fn preprocess(
        lights: &[LightSource],
        strategy_type: LightStrategyType,
        only_infinite_lights: bool,
        env_radius: f32,
        cache: Option<Arc<DirectLightSamplingCache>>,
    ) -> Result<LightStrategy> {
        if lights.is_empty() {
            return Err(RenderError::Scene(
                "the scene has no light sources".to_string(),
            ));
        }
        let weights = strategy_weights(lights, strategy_type, only_infinite_lights, env_radius);
        debug!(
            "Light strategy {:?} over {} lights",
            strategy_type,
            lights.len()
        );

        Ok(LightStrategy {
            strategy_type,
            lights_distribution: Distribution1d::new(&weights),
            cache: if strategy_type == LightStrategyType::DlsCache {
                cache
            } else {
                None
            },
        })
    }

    pub fn strategy_type(&self) -> LightStrategyType {
        self.strategy_type
    }

    /// Pick a light for direct sampling at a shading point. Returns the
    /// light index and the discrete pick pdf.
    pub fn sample_lights(
        &self,
        u: f32,
        p: &Point3f,
        n: &Normal3f,
        is_volume: bool,
    ) -> Option<(usize, f32)> {
        if let Some(cache) = &self.cache {
            if let Some(distribution) = cache.get_light_distribution(p, n, is_volume) {
                let (index, pdf) = distribution.sample_discrete(u);
                if pdf <= 0.0 {
                    return None;
                }
                return Some((index, pdf));
            }
        }
        let (index, pdf) = self.lights_distribution.sample_discrete(u);
        if pdf <= 0.0 {
            None
        } else {
            Some((index, pdf))
        }
    }

    /// The pick pdf of a specific light at a shading point, for MIS of
    /// emission hit by a BSDF-sampled ray.
    pub fn sample_light_pdf(
        &self,
        light_index: usize,
        p: &Point3f,
        n: &Normal3f,
        is_volume: bool,
    ) -> f32 {
        if let Some(cache) = &self.cache {
            if let Some(distribution) = cache.get_light_distribution(p, n, is_volume) {
                return distribution.pdf_discrete(light_index);
            }
        }
        self.lights_distribution.pdf_discrete(light_index)
    }

    /// Position-independent pick pdf, used where no shading point exists
    /// (light path starts).
    pub fn sample_lights_global(&self, u: f32) -> Option<(usize, f32)> {
        let (index, pdf) = self.lights_distribution.sample_discrete(u);
        if pdf <= 0.0 {
            None
        } else {
            Some((index, pdf))
        }
    }

    pub fn sample_light_pdf_global(&self, light_index: usize) -> f32 {
        self.lights_distribution.pdf_discrete(light_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::light::{LightKind, PointLight};
    use crate::spectrum::Spectrum;

    fn make_lights(intensities: &[f32]) -> Vec<LightSource> {
        intensities
            .iter()
            .map(|&i| {
                LightSource::new(LightKind::Point(PointLight::new(
                    Point3f::zero(),
                    Spectrum::grey(i),
                )))
            })
            .collect()
    }

    #[test]
    fn test_uniform_ignores_power() {
        let lights = make_lights(&[1.0, 100.0]);
        let strategy = LightStrategy::preprocess(
            &lights,
            LightStrategyType::Uniform,
            false,
            1.0,
            None,
        )
        .unwrap();
        assert!((strategy.sample_light_pdf_global(0) - 0.5).abs() < 1e-6);
        assert!((strategy.sample_light_pdf_global(1) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_power_prefers_bright_lights() {
        let lights = make_lights(&[1.0, 100.0]);
        let strategy =
            LightStrategy::preprocess(&lights, LightStrategyType::Power, false, 1.0, None)
                .unwrap();
        assert!(strategy.sample_light_pdf_global(1) > strategy.sample_light_pdf_global(0));
    }

    #[test]
    fn test_log_power_compresses_ratio() {
        let lights = make_lights(&[1.0, 100.0]);
        let power =
            LightStrategy::preprocess(&lights, LightStrategyType::Power, false, 1.0, None)
                .unwrap();
        let log_power =
            LightStrategy::preprocess(&lights, LightStrategyType::LogPower, false, 1.0, None)
                .unwrap();
        let power_ratio = power.sample_light_pdf_global(1) / power.sample_light_pdf_global(0);
        let log_ratio =
            log_power.sample_light_pdf_global(1) / log_power.sample_light_pdf_global(0);
        assert!(log_ratio < power_ratio);
    }

    #[test]
    fn test_no_lights_is_a_scene_error() {
        let err = LightStrategy::preprocess(&[], LightStrategyType::Power, false, 1.0, None);
        assert!(err.is_err());
    }

    #[test]
    fn test_parse() {
        assert_eq!(
            LightStrategyType::parse("DLS_CACHE").unwrap(),
            LightStrategyType::DlsCache
        );
        assert!(LightStrategyType::parse("NOPE").is_err());
    }
}
