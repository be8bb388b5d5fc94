//! The path tracer proper: the unidirectional eye integrator with next
//! event estimation and MIS, and the light-path integrator used by the
//! light-tracing engine and the hybrid back/forward mode.

use crate::bsdf::BsdfEvent;
use crate::config::Properties;
use crate::engine::pathdepth::{PathDepthInfo, PathDepthLimits};
use crate::error::Result;
use crate::film::{Film, FilmChannels, SampleResult};
use crate::geometry::{Normal3f, Point3f};
use crate::light::strategy::LightStrategy;
use crate::ray::Ray;
use crate::sampler::Sampler;
use crate::sampling::{pdf_a_to_w, power_heuristic};
use crate::scene::Scene;
use crate::spectrum::Spectrum;
use crate::volume::PathVolumeInfo;

pub const EYE_SAMPLE_BOOT_SIZE: u32 = 5;
pub const EYE_SAMPLE_STEP_SIZE: u32 = 9;
pub const LIGHT_SAMPLE_BOOT_SIZE: u32 = 13;
pub const LIGHT_SAMPLE_STEP_SIZE: u32 = 5;

/// Everything a tracer call needs from the engine, read-only.
pub struct TracerContext<'a> {
    pub scene: &'a Scene,
    pub film: &'a Film,
    /// Strategy consulted at every direct-light step (possibly the DLSC).
    pub illuminate_strategy: &'a LightStrategy,
    /// Scene-global strategy used to start light paths.
    pub emit_strategy: &'a LightStrategy,
}

#[derive(Debug, Clone)]
pub struct PathTracer {
    pub max_path_depth: PathDepthLimits,
    pub rr_depth: u32,
    pub rr_cap: f32,
    pub sqrt_variance_clamp_max_value: f32,
    pub hybrid_back_forward_enable: bool,
    pub eye_sample_size: u32,
    pub light_sample_size: u32,
}

/// `clamp(max component, cap, 1)`: the classic Russian Roulette survival
/// probability.
pub fn russian_roulette_prob(value: Spectrum, cap: f32) -> f32 {
    crate::clamp(value.max_component_value(), cap, 1.0)
}

impl PathTracer {
    pub fn from_properties(cfg: &Properties) -> Result<PathTracer> {
        let defaults = PathDepthLimits::default();
        let total = cfg.get_u32("path.pathdepth.total", defaults.depth)?;
        let max_path_depth = PathDepthLimits {
            depth: total,
            diffuse: cfg.get_u32("path.pathdepth.diffuse", defaults.diffuse.min(total))?,
            glossy: cfg.get_u32("path.pathdepth.glossy", defaults.glossy.min(total))?,
            specular: cfg.get_u32("path.pathdepth.specular", defaults.specular.min(total))?,
        };
        let rr_depth = cfg.get_u32("path.russianroulette.depth", 3)?;
        let rr_cap = cfg.get_f32_in_range("path.russianroulette.cap", 0.5, 0.0, 1.0)?;
        let sqrt_variance_clamp_max_value =
            cfg.get_f32("path.clamping.variance.maxvalue", 0.0)?;
        let hybrid_back_forward_enable = cfg.get_bool("path.hybridbackforward.enable", false)?;

        Ok(PathTracer {
            max_path_depth,
            rr_depth,
            rr_cap,
            sqrt_variance_clamp_max_value,
            hybrid_back_forward_enable,
            eye_sample_size: EYE_SAMPLE_BOOT_SIZE + total * EYE_SAMPLE_STEP_SIZE,
            light_sample_size: LIGHT_SAMPLE_BOOT_SIZE + total * LIGHT_SAMPLE_STEP_SIZE,
        })
    }

    fn eye_result_channels(film: &Film) -> FilmChannels {
        film.channels()
            & (FilmChannels::RADIANCE_PER_PIXEL_NORMALIZED
                | FilmChannels::ALPHA
                | FilmChannels::DEPTH
                | FilmChannels::SHADING_NORMAL
                | FilmChannels::ALBEDO
                | FilmChannels::MATERIAL_ID
                | FilmChannels::OBJECT_ID
                | FilmChannels::UV)
    }

    /// Direct light sampling at a non-delta eye vertex.
    fn direct_light_sampling(
        &self,
        ctx: &TracerContext<'_>,
        time: f32,
        u0: f32,
        u1: f32,
        u2: f32,
        u3: f32,
        u4: f32,
        bsdf: &crate::bsdf::Bsdf,
        volume_info: &PathVolumeInfo,
        depth_info: &PathDepthInfo,
        path_throughput: Spectrum,
        sample_result: &mut SampleResult,
    ) {
        if bsdf.is_delta() {
            return;
        }
        let p = bsdf.hit_point.p;
        let landing_n = bsdf.hit_point.landing_geometry_n();
        let (light_index, light_pick_pdf) = match ctx.illuminate_strategy.sample_lights(
            u0,
            &p,
            &landing_n,
            bsdf.is_volume(),
        ) {
            Some(pick) => pick,
            None => return,
        };
        let light = &ctx.scene.lights[light_index];

        let illuminate = match light.illuminate(&p, time, u1, u2, u3) {
            Some(sample) => sample,
            None => return,
        };
        if illuminate.radiance.is_black() {
            return;
        }
        let eval = match bsdf.evaluate(&illuminate.shadow_ray.d) {
            Some(eval) => eval,
            None => return,
        };

        // The shadow ray must not mutate the eye path's volume stack.
        let connection_throughput =
            match ctx.scene.intersect_shadow(&illuminate.shadow_ray, volume_info, u4) {
                Some(t) => t,
                None => return,
            };

        // A light source that can not be intersected can not be sampled by
        // the BSDF either.
        let mut bsdf_pdf_w = if light.is_environmental() || light.is_intersectable() {
            eval.pdf_w
        } else {
            0.0
        };
        // The +1 accounts for the current vertex, used here for direct
        // lighting.
        if depth_info.depth + 1 >= self.rr_depth {
            bsdf_pdf_w *= russian_roulette_prob(eval.value, self.rr_cap);
        }

        let direct_light_sampling_pdf_w = illuminate.direct_pdf_w * light_pick_pdf;
        let weight = if light.is_delta() {
            1.0
        } else {
            power_heuristic(direct_light_sampling_pdf_w, bsdf_pdf_w)
        };

        let factor = 1.0 / direct_light_sampling_pdf_w;
        sample_result.add_radiance(
            light.group,
            path_throughput
                * connection_throughput
                * illuminate.radiance
                * eval.value
                * (weight * factor),
        );
    }

    /// Emission picked up by a BSDF-sampled ray that hit a light source,
    /// weighted against direct light sampling.
    fn direct_hit_finite_light(
        &self,
        ctx: &TracerContext<'_>,
        bsdf: &crate::bsdf::Bsdf,
        distance: f32,
        last_event: BsdfEvent,
        last_pdf_w: f32,
        last_vertex: Option<(Point3f, Normal3f)>,
        path_throughput: Spectrum,
        sample_result: &mut SampleResult,
    ) {
        let light_index = match bsdf.triangle_light_index {
            Some(i) => i as usize,
            None => return,
        };
        let light = &ctx.scene.lights[light_index];
        let (radiance, direct_pdf_a, _emission_pdf_w) =
            match light.get_radiance(&bsdf.hit_point.fixed_dir, Some(&bsdf.hit_point.geometry_n)) {
                Some(r) => r,
                None => return,
            };

        let weight = match last_vertex {
            // The first vertex and post-specular vertices take the
            // emission unweighted.
            None => 1.0,
            Some(_) if last_event.contains(BsdfEvent::SPECULAR) => 1.0,
            Some((last_p, last_n)) => {
                let cos_at_light = bsdf
                    .hit_point
                    .fixed_dir
                    .dotn(&bsdf.hit_point.geometry_n)
                    .abs();
                let direct_pdf_w = pdf_a_to_w(direct_pdf_a, distance, cos_at_light);
                let pick_pdf = ctx.illuminate_strategy.sample_light_pdf(
                    light_index,
                    &last_p,
                    &last_n,
                    false,
                );
                power_heuristic(last_pdf_w, direct_pdf_w * pick_pdf)
            }
        };

        sample_result.add_radiance(light.group, path_throughput * radiance * weight);
    }

    fn direct_hit_env_lights(
        &self,
        ctx: &TracerContext<'_>,
        ray_dir: crate::geometry::Vector3f,
        last_event: BsdfEvent,
        last_pdf_w: f32,
        last_vertex: Option<(Point3f, Normal3f)>,
        path_throughput: Spectrum,
        sample_result: &mut SampleResult,
    ) {
        for light in ctx.scene.environment_lights() {
            let (radiance, direct_pdf_w, _emission_pdf_w) =
                match light.get_radiance(&(-ray_dir), None) {
                    Some(r) => r,
                    None => continue,
                };
            let weight = match last_vertex {
                None => 1.0,
                Some(_) if last_event.contains(BsdfEvent::SPECULAR) => 1.0,
                Some((last_p, last_n)) => {
                    let pick_pdf = ctx.illuminate_strategy.sample_light_pdf(
                        light.light_scene_index as usize,
                        &last_p,
                        &last_n,
                        false,
                    );
                    power_heuristic(last_pdf_w, direct_pdf_w * pick_pdf)
                }
            };
            sample_result.add_radiance(light.group, path_throughput * radiance * weight);
        }
    }

    /// Trace one eye path and return its sample result.
    pub fn render_eye_sample(
        &self,
        ctx: &TracerContext<'_>,
        sampler: &mut dyn Sampler,
    ) -> SampleResult {
        let mut sample_result = SampleResult::new(
            Self::eye_result_channels(ctx.film),
            ctx.scene.light_group_count(),
        );
        sample_result.film_x = sampler.get_sample(0);
        sample_result.film_y = sampler.get_sample(1);

        let camera = &ctx.scene.camera;
        let time = camera.generate_ray_time(sampler.get_sample(4));
        let mut ray = camera.generate_ray(
            time,
            sample_result.film_x,
            sample_result.film_y,
            sampler.get_sample(2),
            sampler.get_sample(3),
        );

        let mut volume_info = PathVolumeInfo::new();
        let mut depth_info = PathDepthInfo::default();
        let mut path_throughput = Spectrum::white();
        let mut last_event = BsdfEvent::SPECULAR;
        let mut last_pdf_w = 1.0f32;
        let mut last_vertex: Option<(Point3f, Normal3f)> = None;
        let mut is_transmitted_path = true;
        let mut albedo_to_do = true;

        loop {
            sample_result.first_path_vertex = depth_info.depth == 0;
            let sample_offset =
                EYE_SAMPLE_BOOT_SIZE + depth_info.depth * EYE_SAMPLE_STEP_SIZE;

            let (hit, connection_throughput) = ctx.scene.intersect(
                &mut ray,
                &mut volume_info,
                sampler.get_sample(sample_offset),
            );
            path_throughput *= connection_throughput;

            let hit = match hit {
                Some(h) => h,
                None => {
                    // The ray escaped: collect environment radiance.
                    self.direct_hit_env_lights(
                        ctx,
                        ray.d,
                        last_event,
                        last_pdf_w,
                        last_vertex,
                        path_throughput,
                        &mut sample_result,
                    );
                    if sample_result.first_path_vertex {
                        sample_result.alpha = 0.0;
                        sample_result.depth = f32::INFINITY;
                    } else if is_transmitted_path {
                        // A purely transmitted path that escapes keeps the
                        // background visible through it.
                        sample_result.alpha = 0.0;
                    }
                    break;
                }
            };

            let bsdf = hit.bsdf;

            if sample_result.first_path_vertex {
                sample_result.alpha = 1.0;
                sample_result.depth = hit.t;
                sample_result.shading_normal = bsdf.hit_point.shade_n;
                sample_result.material_id = bsdf.hit_point.material_id;
                sample_result.object_id = bsdf.hit_point.object_id;
                sample_result.uv = bsdf.hit_point.uv;
            }
            if albedo_to_do && !bsdf.is_delta() {
                sample_result.albedo = path_throughput * bsdf.albedo();
                albedo_to_do = false;
            }

            // Emitted radiance of intersectable lights
            if bsdf.is_light_source() {
                self.direct_hit_finite_light(
                    ctx,
                    &bsdf,
                    hit.t,
                    last_event,
                    last_pdf_w,
                    last_vertex,
                    path_throughput,
                    &mut sample_result,
                );
            }

            self.direct_light_sampling(
                ctx,
                time,
                sampler.get_sample(sample_offset + 1),
                sampler.get_sample(sample_offset + 2),
                sampler.get_sample(sample_offset + 3),
                sampler.get_sample(sample_offset + 4),
                sampler.get_sample(sample_offset + 5),
                &bsdf,
                &volume_info,
                &depth_info,
                path_throughput,
                &mut sample_result,
            );

            // Sample the next direction
            let bsdf_sample = match bsdf.sample(
                sampler.get_sample(sample_offset + 6),
                sampler.get_sample(sample_offset + 7),
            ) {
                Some(s) => s,
                None => break,
            };
            if sample_result.first_path_vertex {
                sample_result.first_path_vertex_event = bsdf_sample.event;
            }
            if depth_info.is_last_path_vertex(&self.max_path_depth, bsdf_sample.event) {
                break;
            }

            // Russian Roulette, after this vertex's direct light but
            // before continuing the path.
            let mut rr_prob = 1.0;
            if !bsdf_sample.event.contains(BsdfEvent::SPECULAR)
                && depth_info.depth + 1 >= self.rr_depth
            {
                rr_prob = russian_roulette_prob(bsdf_sample.value, self.rr_cap);
                if rr_prob < sampler.get_sample(sample_offset + 8) {
                    break;
                }
                path_throughput /= rr_prob;
            }
            path_throughput *= bsdf_sample.value;

            last_event = bsdf_sample.event;
            last_pdf_w = bsdf_sample.pdf_w * rr_prob;
            last_vertex = Some((bsdf.hit_point.p, bsdf.hit_point.landing_geometry_n()));
            is_transmitted_path =
                is_transmitted_path && bsdf_sample.event.contains(BsdfEvent::TRANSMIT);

            depth_info.increment(bsdf_sample.event);
            volume_info.update(bsdf_sample.event, &bsdf);
            ray.update(
                bsdf.get_ray_origin(&bsdf_sample.sampled_dir),
                bsdf_sample.sampled_dir,
            );
        }

        sample_result
    }

    /// Trace one light path and connect every non-delta vertex to the
    /// camera. With `only_caustics` set (hybrid back/forward mode) only
    /// vertices reached through a specular chain splat, since the eye path
    /// cannot sample those.
    pub fn render_light_sample(
        &self,
        ctx: &TracerContext<'_>,
        sampler: &mut dyn Sampler,
        only_caustics: bool,
    ) -> Vec<SampleResult> {
        let mut results = Vec::new();
        let camera = &ctx.scene.camera;
        let time = camera.generate_ray_time(sampler.get_sample(12));
        let lens_point = camera.sample_lens(time, sampler.get_sample(3), sampler.get_sample(4));

        let (light_index, light_pick_pdf) =
            match ctx.emit_strategy.sample_lights_global(sampler.get_sample(2)) {
                Some(pick) => pick,
                None => return results,
            };
        let light = &ctx.scene.lights[light_index];

        let emit = match light.emit(
            time,
            sampler.get_sample(5),
            sampler.get_sample(6),
            sampler.get_sample(7),
            sampler.get_sample(8),
            sampler.get_sample(9),
        ) {
            Some(e) => e,
            None => return results,
        };
        if emit.radiance.is_black() {
            return results;
        }

        let mut path_throughput =
            emit.radiance / (emit.emission_pdf_w * light_pick_pdf);
        let light_group = light.group;
        let mut ray = emit.ray;
        let mut volume_info = PathVolumeInfo::new();
        let mut has_specular_bounce = false;
        let mut depth = 1u32;

        while depth <= self.max_path_depth.depth {
            let sample_offset =
                LIGHT_SAMPLE_BOOT_SIZE + (depth - 1) * LIGHT_SAMPLE_STEP_SIZE;

            let (hit, connection_throughput) = ctx.scene.intersect(
                &mut ray,
                &mut volume_info,
                sampler.get_sample(sample_offset),
            );
            let hit = match hit {
                Some(h) => h,
                None => break,
            };
            path_throughput *= connection_throughput;

            let bsdf = hit.bsdf;
            if !bsdf.is_delta() && (!only_caustics || has_specular_bounce) {
                self.connect_to_eye(
                    ctx,
                    time,
                    &bsdf,
                    &volume_info,
                    lens_point,
                    path_throughput,
                    light_group,
                    sampler.get_sample(sample_offset + 1),
                    &mut results,
                );
            }

            if depth >= self.max_path_depth.depth {
                break;
            }

            let bsdf_sample = match bsdf.sample(
                sampler.get_sample(sample_offset + 2),
                sampler.get_sample(sample_offset + 3),
            ) {
                Some(s) => s,
                None => break,
            };
            if depth >= self.rr_depth {
                let rr_prob = russian_roulette_prob(bsdf_sample.value, self.rr_cap);
                if rr_prob < sampler.get_sample(sample_offset + 4) {
                    break;
                }
                path_throughput /= rr_prob;
            }
            path_throughput *= bsdf_sample.value;
            has_specular_bounce |= bsdf_sample.event.contains(BsdfEvent::SPECULAR);

            volume_info.update(bsdf_sample.event, &bsdf);
            ray.update(
                bsdf.get_ray_origin(&bsdf_sample.sampled_dir),
                bsdf_sample.sampled_dir,
            );
            depth += 1;
        }

        results
    }

    fn connect_to_eye(
        &self,
        ctx: &TracerContext<'_>,
        time: f32,
        bsdf: &crate::bsdf::Bsdf,
        volume_info: &PathVolumeInfo,
        lens_point: Point3f,
        path_throughput: Spectrum,
        light_group: u32,
        pass_through_u: f32,
        results: &mut Vec<SampleResult>,
    ) {
        if ctx.scene.objects[bsdf.hit_point.material_id as usize].camera_invisible {
            return;
        }
        let camera = &ctx.scene.camera;
        let to_vertex = bsdf.hit_point.p - lens_point;
        let eye_distance = to_vertex.length();
        if eye_distance <= 0.0 {
            return;
        }
        let eye_dir = to_vertex / eye_distance;

        let eval = match bsdf.evaluate(&(-eye_dir)) {
            Some(e) => e,
            None => return,
        };

        let film_position = match camera.get_sample_position(&Ray::segment(
            lens_point,
            eye_dir,
            0.0,
            eye_distance,
            time,
        )) {
            Some(p) => p,
            None => return,
        };

        // Occlusion between the vertex and the lens
        let shadow_origin = bsdf.get_ray_origin(&(-eye_dir));
        let shadow_distance = (lens_point - shadow_origin).length();
        let mut shadow_ray =
            Ray::segment(shadow_origin, -eye_dir, 0.0, shadow_distance, time);
        shadow_ray.update_min_max_with_epsilon();
        let connection_throughput =
            match ctx.scene.intersect_shadow(&shadow_ray, volume_info, pass_through_u) {
                Some(t) => t,
                None => return,
            };

        let (_camera_pdf_w, flux_to_radiance) = match camera.get_pdf(&eye_dir, eye_distance) {
            Some(p) => p,
            None => return,
        };

        let mut sample_result =
            SampleResult::new(FilmChannels::RADIANCE_PER_SCREEN_NORMALIZED, ctx.scene.light_group_count());
        sample_result.film_x = film_position.x;
        sample_result.film_y = film_position.y;
        sample_result.add_radiance(
            light_group,
            path_throughput * connection_throughput * eval.value * flux_to_radiance,
        );
        results.push(sample_result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_sizes() {
        let mut cfg = Properties::new();
        cfg.set("path.pathdepth.total", 4);
        let tracer = PathTracer::from_properties(&cfg).unwrap();
        assert_eq!(
            tracer.eye_sample_size,
            EYE_SAMPLE_BOOT_SIZE + 4 * EYE_SAMPLE_STEP_SIZE
        );
        assert_eq!(
            tracer.light_sample_size,
            LIGHT_SAMPLE_BOOT_SIZE + 4 * LIGHT_SAMPLE_STEP_SIZE
        );
    }

    #[test]
    fn test_rr_prob_bounds() {
        assert_eq!(russian_roulette_prob(Spectrum::grey(0.1), 0.5), 0.5);
        assert_eq!(russian_roulette_prob(Spectrum::grey(0.7), 0.5), 0.7);
        assert_eq!(russian_roulette_prob(Spectrum::grey(3.0), 0.5), 1.0);
    }

    #[test]
    fn test_bad_rr_cap_rejected() {
        let mut cfg = Properties::new();
        cfg.set("path.russianroulette.cap", 1.5);
        assert!(PathTracer::from_properties(&cfg).is_err());
    }
}
