//! Direct-light sampling cache: a preprocess-time cache of per-position
//! emitter importance distributions, queried at every direct-light step to
//! bias light selection toward what actually illuminates the hit point.

use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::bsdf::{Bsdf, BsdfEvent};
use crate::config::Properties;
use crate::error::{RenderError, Result};
use crate::geometry::{Normal3f, Point3f};
use crate::rng::Rng;
use crate::sampler::{SampleType, Sampler, SobolSampler, SobolSamplerSharedData};
use crate::sampling::{radical_inverse, Distribution1d};
use crate::scene::Scene;
use crate::spectrum::Spectrum;
use crate::volume::PathVolumeInfo;

mod bvh;
mod octree;
mod radius;

pub use self::bvh::{BvhEntry, DlscBvh};
pub use self::octree::DlscOctree;
pub use self::radius::film_to_scene_radius;

const NEIGHBORS_RADIUS_SCALE: f32 = 1.5;
const PERSISTENT_MAGIC: u32 = 0x454d_4443;
const PERSISTENT_VERSION: u32 = 2;

/// The percentage of image plane to cover with the auto-estimated radius.
const IMAGE_PLANE_RADIUS: f32 = 0.1;
/// Fallback radius in world units.
const DEFAULT_RADIUS: f32 = 0.15;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlscVisibilityParams {
    pub max_path_depth: u32,
    pub max_sample_count: u32,
    pub target_hit_rate: f32,
    /// 0 = estimate the radius from the camera footprint.
    pub lookup_radius: f32,
    pub lookup_normal_angle: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlscEntryParams {
    pub warmup_samples: u32,
    pub max_passes: u32,
    pub convergence_threshold: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlscPersistentParams {
    pub file_name: Option<String>,
    pub safe_save: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlscParams {
    pub visibility: DlscVisibilityParams,
    pub entry: DlscEntryParams,
    pub persistent: DlscPersistentParams,
}

impl Default for DlscParams {
    fn default() -> DlscParams {
        DlscParams {
            visibility: DlscVisibilityParams {
                max_path_depth: 4,
                max_sample_count: 1024 * 1024,
                target_hit_rate: 0.995,
                lookup_radius: 0.0,
                lookup_normal_angle: 25.0,
            },
            entry: DlscEntryParams {
                warmup_samples: 24,
                max_passes: 1024,
                convergence_threshold: 0.01,
            },
            persistent: DlscPersistentParams {
                file_name: None,
                safe_save: true,
            },
        }
    }
}

impl DlscParams {
    pub fn from_properties(cfg: &Properties) -> Result<DlscParams> {
        let defaults = DlscParams::default();
        let file_name = cfg.get_raw("lightstrategy.dlscache.persistent.file");
        Ok(DlscParams {
            visibility: DlscVisibilityParams {
                max_path_depth: cfg.get_u32(
                    "lightstrategy.dlscache.visibility.maxpathdepth",
                    defaults.visibility.max_path_depth,
                )?,
                max_sample_count: cfg.get_u32(
                    "lightstrategy.dlscache.visibility.maxsamplecount",
                    defaults.visibility.max_sample_count,
                )?,
                target_hit_rate: cfg.get_f32_in_range(
                    "lightstrategy.dlscache.visibility.targethitrate",
                    defaults.visibility.target_hit_rate,
                    0.0,
                    1.0,
                )?,
                lookup_radius: cfg.get_f32(
                    "lightstrategy.dlscache.visibility.lookupradius",
                    defaults.visibility.lookup_radius,
                )?,
                lookup_normal_angle: cfg.get_f32(
                    "lightstrategy.dlscache.visibility.lookupnormalangle",
                    defaults.visibility.lookup_normal_angle,
                )?,
            },
            entry: DlscEntryParams {
                warmup_samples: cfg.get_u32(
                    "lightstrategy.dlscache.entry.warmupsamples",
                    defaults.entry.warmup_samples,
                )?,
                max_passes: cfg.get_u32(
                    "lightstrategy.dlscache.entry.maxpasses",
                    defaults.entry.max_passes,
                )?,
                convergence_threshold: cfg.get_f32(
                    "lightstrategy.dlscache.entry.convergencethreshold",
                    defaults.entry.convergence_threshold,
                )?,
            },
            persistent: DlscPersistentParams {
                file_name: file_name.map(str::to_string),
                safe_save: cfg.get_bool("lightstrategy.dlscache.persistent.safesave", true)?,
            },
        })
    }
}

/// One cache entry: a representative surface point plus the emitter
/// distribution built for it. The distribution is `None` when no sampled
/// light delivered any luminance; callers fall back to the scene-global
/// strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlscEntry {
    pub p: Point3f,
    pub n: Normal3f,
    pub is_volume: bool,
    pub distribution: Option<Distribution1d>,
}

impl BvhEntry for DlscEntry {
    fn position(&self) -> Point3f {
        self.p
    }
    fn normal(&self) -> Normal3f {
        self.n
    }
    fn is_volume(&self) -> bool {
        self.is_volume
    }
}

/// A merged bundle of nearby visibility hits sharing one cache entry.
struct VisibilityParticle {
    bsdf_list: Vec<Bsdf>,
    vol_info_list: Vec<PathVolumeInfo>,
}

impl VisibilityParticle {
    fn new(bsdf: Bsdf, vol_info: PathVolumeInfo) -> VisibilityParticle {
        VisibilityParticle {
            bsdf_list: vec![bsdf],
            vol_info_list: vec![vol_info],
        }
    }

    fn add(&mut self, bsdf: Bsdf, vol_info: PathVolumeInfo) {
        self.bsdf_list.push(bsdf);
        self.vol_info_list.push(vol_info);
    }
}

#[derive(Serialize, Deserialize)]
struct PersistentCache {
    magic: u32,
    version: u32,
    params: DlscParams,
    entries: Vec<DlscEntry>,
    bvh: Option<DlscBvh>,
}

pub struct DirectLightSamplingCache {
    params: DlscParams,
    entries: Vec<DlscEntry>,
    bvh: Option<DlscBvh>,
}

impl DirectLightSamplingCache {
    /// True when the surface can host a cache entry: anything non-delta
    /// and non-specular.
    pub fn is_cache_enabled(bsdf: &Bsdf) -> bool {
        !bsdf.is_delta() && !bsdf.event_types().contains(BsdfEvent::SPECULAR)
    }

    pub fn params(&self) -> &DlscParams {
        &self.params
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Build the cache, or load it from the configured persistent file.
    pub fn build(
        mut params: DlscParams,
        scene: &Scene,
        interrupt: &AtomicBool,
    ) -> Result<DirectLightSamplingCache> {
        if let Some(file_name) = params.persistent.file_name.clone() {
            if Path::new(&file_name).exists() {
                match Self::load_persistent(&file_name) {
                    Ok(cache) => {
                        info!("DLSC: loaded persistent cache {}", file_name);
                        return Ok(cache);
                    }
                    Err(err) => {
                        warn!("DLSC: persistent cache rejected ({}); rebuilding", err);
                    }
                }
            }
        }

        info!("DLSC: building direct light sampling cache");

        if params.visibility.lookup_radius == 0.0 {
            params.visibility.lookup_radius = film_to_scene_radius(
                scene,
                IMAGE_PLANE_RADIUS,
                DEFAULT_RADIUS,
                params.visibility.max_path_depth,
                &Self::is_cache_enabled,
                interrupt,
            );
            info!("DLSC: best radius {}", params.visibility.lookup_radius);
        }
        if interrupt.load(Ordering::Relaxed) {
            return Err(RenderError::Cancelled);
        }

        let particles = trace_visibility_particles(&params, scene, interrupt)?;
        info!("DLSC: {} visibility particles", particles.len());

        let mut cache = DirectLightSamplingCache {
            params,
            entries: Vec::new(),
            bvh: None,
        };
        if !particles.is_empty() {
            cache.build_cache_entries(scene, &particles, interrupt)?;
        }

        if !cache.entries.is_empty() {
            cache.bvh = Some(DlscBvh::new(
                &cache.entries,
                cache.params.visibility.lookup_radius,
                cache.params.visibility.lookup_normal_angle,
            ));
        } else {
            warn!("DLSC: the cache is empty");
        }

        if let Some(file_name) = cache.params.persistent.file_name.clone() {
            cache.save_persistent(&file_name)?;
        }

        Ok(cache)
    }

    /// Runtime lookup: the emitter distribution of the nearest cache entry,
    /// or `None` (the caller then uses the engine-selected fallback).
    pub fn get_light_distribution(
        &self,
        p: &Point3f,
        n: &Normal3f,
        is_volume: bool,
    ) -> Option<&Distribution1d> {
        let bvh = self.bvh.as_ref()?;
        let index = bvh.get_nearest_entry(&self.entries, p, n, is_volume)?;
        self.entries[index].distribution.as_ref()
    }

    fn build_cache_entries(
        &mut self,
        scene: &Scene,
        particles: &[VisibilityParticle],
        interrupt: &AtomicBool,
    ) -> Result<()> {
        info!(
            "DLSC: filling cache entries with {} light sources",
            scene
                .lights
                .iter()
                .filter(|l| l.direct_light_sampling_enabled)
                .count()
        );

        // Received luminance per particle, computed in parallel with
        // per-thread scratch and a final gather. The radical-inverse pass
        // sequence makes each entry's result independent of scheduling.
        let thread_count = num_cpus::get().max(1);
        let next_entry = AtomicUsize::new(0);
        let progress = indicatif::ProgressBar::new(particles.len() as u64);
        let progress = &progress;
        let params = &self.params;
        let chunks: Vec<Vec<(usize, Vec<f32>)>> = crossbeam::scope(|scope| {
            let handles: Vec<_> = (0..thread_count)
                .map(|_| {
                    let next_entry = &next_entry;
                    scope.spawn(move |_| {
                        let mut scratch = Vec::new();
                        loop {
                            if interrupt.load(Ordering::Relaxed) {
                                break;
                            }
                            let index = next_entry.fetch_add(1, Ordering::Relaxed);
                            if index >= particles.len() {
                                break;
                            }
                            let received =
                                compute_received_luminance(params, scene, &particles[index]);
                            scratch.push((index, received));
                            progress.inc(1);
                        }
                        scratch
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        })
        .unwrap();
        progress.finish_and_clear();
        if interrupt.load(Ordering::Relaxed) {
            return Err(RenderError::Cancelled);
        }

        let mut received_luminance = vec![Vec::new(); particles.len()];
        for chunk in chunks {
            for (index, received) in chunk {
                received_luminance[index] = received;
            }
        }

        // Initialize the entries from the first (representative) hit of
        // each particle.
        self.entries = particles
            .iter()
            .map(|particle| {
                let hit = &particle.bsdf_list[0].hit_point;
                DlscEntry {
                    p: hit.p,
                    n: hit.landing_shade_n(),
                    is_volume: particle.bsdf_list[0].is_volume(),
                    distribution: None,
                }
            })
            .collect();

        // Merge each entry with its neighborhood and build the final
        // distributions.
        let merge_bvh = DlscBvh::new(
            &self.entries,
            NEIGHBORS_RADIUS_SCALE * self.params.visibility.lookup_radius,
            self.params.visibility.lookup_normal_angle,
        );
        let light_count = scene.lights.len();
        let mut distributions: Vec<Option<Distribution1d>> = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            let near = merge_bvh.get_all_near_entries(
                &self.entries,
                &entry.p,
                &entry.n,
                entry.is_volume,
            );
            let mut merged = vec![0.0f32; light_count];
            for &index in &near {
                for (slot, value) in merged.iter_mut().zip(&received_luminance[index]) {
                    *slot += value;
                }
            }
            let scale = 1.0 / near.len().max(1) as f32;
            for value in &mut merged {
                *value *= scale;
            }

            let max_luminance = merged.iter().cloned().fold(0.0f32, f32::max);
            if max_luminance > 0.0 {
                // Normalize and floor at 2.5% of the maximum so no emitter
                // is ever permanently unreachable from this entry.
                let inv = 1.0 / max_luminance;
                for value in &mut merged {
                    *value = (*value * inv).max(0.025);
                }
                distributions.push(Some(Distribution1d::new(&merged)));
            } else {
                // No light reaches this entry: callers revert to the
                // scene-global strategy.
                distributions.push(None);
            }
        }
        for (entry, distribution) in self.entries.iter_mut().zip(distributions) {
            entry.distribution = distribution;
        }

        Ok(())
    }

    fn load_persistent(file_name: &str) -> Result<DirectLightSamplingCache> {
        let bytes = fs::read(file_name)?;
        let cache: PersistentCache = bincode::deserialize(&bytes)
            .map_err(|e| RenderError::Cache(format!("corrupted cache file: {}", e)))?;
        if cache.magic != PERSISTENT_MAGIC {
            return Err(RenderError::Cache("not a DLSC cache file".to_string()));
        }
        if cache.version != PERSISTENT_VERSION {
            return Err(RenderError::Cache(format!(
                "cache version {} does not match {}",
                cache.version, PERSISTENT_VERSION
            )));
        }
        Ok(DirectLightSamplingCache {
            params: cache.params,
            entries: cache.entries,
            bvh: cache.bvh,
        })
    }

    fn save_persistent(&self, file_name: &str) -> Result<()> {
        info!("DLSC: saving persistent cache {}", file_name);
        let blob = PersistentCache {
            magic: PERSISTENT_MAGIC,
            version: PERSISTENT_VERSION,
            params: self.params.clone(),
            entries: self.entries.clone(),
            bvh: self.bvh.clone(),
        };
        let bytes = bincode::serialize(&blob)
            .map_err(|e| RenderError::Cache(format!("serialization failed: {}", e)))?;
        if self.params.persistent.safe_save {
            let tmp_name = format!("{}.tmp", file_name);
            fs::write(&tmp_name, &bytes)?;
            fs::rename(&tmp_name, file_name)?;
        } else {
            fs::write(file_name, &bytes)?;
        }
        Ok(())
    }
}

/// Trace eye paths and collect merged visibility particles. Single
/// threaded: the particle order must not depend on scheduling, so two
/// builds of the same scene produce identical persistent caches.
fn trace_visibility_particles(
    params: &DlscParams,
    scene: &Scene,
    interrupt: &AtomicBool,
) -> Result<Vec<VisibilityParticle>> {
    const SAMPLE_BOOT_SIZE: u32 = 5;
    const SAMPLE_STEP_SIZE: u32 = 4;
    const RR_DEPTH: u32 = 3;
    const RR_CAP: f32 = 0.5;

    let camera = &scene.camera;
    let shared = std::sync::Arc::new(SobolSamplerSharedData::new(131, None));
    let mut sampler = SobolSampler::new(
        Rng::new(1),
        None,
        None,
        true,
        0.0,
        0.0,
        16,
        16,
        1,
        1,
        shared,
    );
    sampler.request_samples(
        SampleType::PixelNormalizedOnly,
        SAMPLE_BOOT_SIZE + params.visibility.max_path_depth * SAMPLE_STEP_SIZE,
    );

    let mut octree = DlscOctree::new(
        scene.world_bounds(),
        params.visibility.lookup_radius,
        params.visibility.lookup_normal_angle,
    );
    let mut particles: Vec<VisibilityParticle> = Vec::new();
    let mut cache_hits = 0u64;
    let mut candidates = 0u64;

    let film_width = camera.film_width as f32;
    let film_height = camera.film_height as f32;

    for sample_index in 0..params.visibility.max_sample_count {
        if interrupt.load(Ordering::Relaxed) {
            return Err(RenderError::Cancelled);
        }

        let film_x = sampler.get_sample(0) * (film_width - 1.0);
        let film_y = sampler.get_sample(1) * (film_height - 1.0);
        let time = camera.generate_ray_time(sampler.get_sample(4));
        let mut eye_ray = camera.generate_ray(
            time,
            film_x,
            film_y,
            sampler.get_sample(2),
            sampler.get_sample(3),
        );

        let mut volume_info = PathVolumeInfo::new();
        let mut depth = 0u32;
        loop {
            let sample_offset = SAMPLE_BOOT_SIZE + depth * SAMPLE_STEP_SIZE;
            let (hit, _connection_throughput) = scene.intersect(
                &mut eye_ray,
                &mut volume_info,
                sampler.get_sample(sample_offset),
            );
            let hit = match hit {
                Some(h) => h,
                None => break,
            };

            if DirectLightSamplingCache::is_cache_enabled(&hit.bsdf) {
                candidates += 1;
                let p = hit.bsdf.hit_point.p;
                let n = hit.bsdf.hit_point.landing_shade_n();
                let is_volume = hit.bsdf.is_volume();
                match octree.get_entry(&p, &n, is_volume) {
                    Some(index) => {
                        particles[index as usize]
                            .add(hit.bsdf.clone(), volume_info.clone());
                        cache_hits += 1;
                    }
                    None => {
                        let index = particles.len() as u32;
                        particles
                            .push(VisibilityParticle::new(hit.bsdf.clone(), volume_info.clone()));
                        octree.add(index, p, n, is_volume);
                    }
                }
            }

            depth += 1;
            if depth >= params.visibility.max_path_depth {
                break;
            }

            let bsdf_sample = match hit.bsdf.sample(
                sampler.get_sample(sample_offset + 1),
                sampler.get_sample(sample_offset + 2),
            ) {
                Some(s) => s,
                None => break,
            };
            if !bsdf_sample.event.contains(BsdfEvent::SPECULAR) && depth >= RR_DEPTH {
                let rr_prob = crate::clamp(bsdf_sample.value.max_component_value(), RR_CAP, 1.0);
                if rr_prob < sampler.get_sample(sample_offset + 3) {
                    break;
                }
            }
            volume_info.update(bsdf_sample.event, &hit.bsdf);
            eye_ray.update(
                hit.bsdf.get_ray_origin(&bsdf_sample.sampled_dir),
                bsdf_sample.sampled_dir,
            );
        }

        sampler.next_sample(&[]);

        // Stop early once the candidate stream is mostly falling into
        // existing entries.
        if sample_index % 1024 == 1023 && candidates > 512 {
            let hit_rate = cache_hits as f32 / candidates as f32;
            if hit_rate >= params.visibility.target_hit_rate {
                info!(
                    "DLSC: visibility hit rate {:.4} reached after {} samples",
                    hit_rate,
                    sample_index + 1
                );
                break;
            }
        }
    }

    Ok(particles)
}

/// Sample one light for one entry pass, using the radical-inverse bases
/// (3, 5, 7, 11, 13) at the pass index, plus base 17 for the shadow-ray
/// pass-through sample.
fn sample_light(
    scene: &Scene,
    particle: &VisibilityParticle,
    light_index: usize,
    pass: u32,
) -> f32 {
    let u1 = radical_inverse(pass, 3);
    let u2 = radical_inverse(pass, 5);
    let u3 = radical_inverse(pass, 7);
    let u4 = radical_inverse(pass, 11);
    let time_u = radical_inverse(pass, 13);

    // Select a sampling point among the merged hits
    let bsdf_count = particle.bsdf_list.len();
    let bsdf_index = ((u4 * bsdf_count as f32) as usize).min(bsdf_count - 1);
    let sampling_bsdf = &particle.bsdf_list[bsdf_index];

    let light = &scene.lights[light_index];
    let time = scene.camera.generate_ray_time(time_u);
    let illuminate = match light.illuminate(&sampling_bsdf.hit_point.p, time, u1, u2, u3) {
        Some(sample) => sample,
        None => return 0.0,
    };
    if illuminate.radiance.is_black() {
        return 0.0;
    }

    // Reject samples arriving from behind unless the surface transmits.
    let landing_n = sampling_bsdf.hit_point.landing_shade_n();
    if !sampling_bsdf.event_types().contains(BsdfEvent::TRANSMIT)
        && illuminate.shadow_ray.d.dotn(&landing_n) <= 0.0
    {
        return 0.0;
    }

    let u5 = radical_inverse(pass, 17);
    let vol_info = &particle.vol_info_list[bsdf_index];
    match scene.intersect_shadow(&illuminate.shadow_ray, vol_info, u5) {
        Some(connection_throughput) => {
            let incoming =
                connection_throughput * illuminate.radiance / illuminate.direct_pdf_w;
            incoming.y()
        }
        None => 0.0,
    }
}

/// Estimate the luminance each light delivers to one entry, stopping a
/// light as soon as its running mean stops moving.
fn compute_received_luminance(
    params: &DlscParams,
    scene: &Scene,
    particle: &VisibilityParticle,
) -> Vec<f32> {
    let mut received = vec![0.0f32; scene.lights.len()];

    for (light_index, light) in scene.lights.iter().enumerate() {
        if !light.direct_light_sampling_enabled {
            continue;
        }

        // Check if all the shadow rays can be skipped
        let always_in_shadow = particle.bsdf_list.iter().all(|bsdf| {
            light.always_in_shadow(&bsdf.hit_point.p, &bsdf.hit_point.landing_shade_n())
        });
        if always_in_shadow {
            continue;
        }

        // Environmental light sources are hard to sample and can produce
        // wrong cache entries with few samples.
        let warmup = if light.is_environmental() {
            params.entry.warmup_samples.max(512)
        } else {
            params.entry.warmup_samples
        };

        let mut total = 0.0f32;
        let mut previous_steps: VecDeque<f32> = VecDeque::with_capacity(warmup as usize + 1);
        let mut passes_used = params.entry.max_passes;
        for pass in 0..params.entry.max_passes {
            total += sample_light(scene, particle, light_index, pass);

            let current_step = total / (pass + 1) as f32;
            if pass > warmup {
                let previous_step = previous_steps.front().copied().unwrap_or(0.0);
                let convergence = (current_step - previous_step).abs();
                let threshold = current_step * params.entry.convergence_threshold;
                if convergence == 0.0 || convergence < threshold {
                    passes_used = pass + 1;
                    break;
                }
            }
            previous_steps.push_back(current_step);
            if previous_steps.len() > warmup as usize {
                previous_steps.pop_front();
            }
        }

        received[light_index] = total / passes_used as f32;
    }

    received
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spectrum::Spectrum;

    #[test]
    fn test_default_params() {
        let params = DlscParams::default();
        assert_eq!(params.visibility.lookup_radius, 0.0);
        assert!(params.persistent.safe_save);
    }

    #[test]
    fn test_params_from_properties() {
        let mut cfg = Properties::new();
        cfg.set("lightstrategy.dlscache.entry.warmupsamples", 48)
            .set("lightstrategy.dlscache.visibility.lookupradius", 0.25)
            .set("lightstrategy.dlscache.persistent.file", "cache.dlsc");
        let params = DlscParams::from_properties(&cfg).unwrap();
        assert_eq!(params.entry.warmup_samples, 48);
        assert_eq!(params.visibility.lookup_radius, 0.25);
        assert_eq!(params.persistent.file_name.as_deref(), Some("cache.dlsc"));
    }

    #[test]
    fn test_empty_cache_lookup_is_none() {
        let cache = DirectLightSamplingCache {
            params: DlscParams::default(),
            entries: Vec::new(),
            bvh: None,
        };
        assert!(cache
            .get_light_distribution(&Point3f::zero(), &Normal3f::new(0.0, 0.0, 1.0), false)
            .is_none());
    }

    #[test]
    fn test_cache_enabled_classification() {
        use crate::bsdf::{HitPoint, Material};
        use crate::geometry::{Point2f, Vector3f};
        use std::sync::Arc;

        let hit = HitPoint {
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
        };
        let matte = Bsdf::new(
            hit.clone(),
            Arc::new(Material::matte(Spectrum::grey(0.5))),
            None,
        );
        assert!(DirectLightSamplingCache::is_cache_enabled(&matte));

        let mirror = Bsdf::new(hit, Arc::new(Material::mirror(Spectrum::white())), None);
        assert!(!DirectLightSamplingCache::is_cache_enabled(&mirror));
    }
}
