//! Bidirectional path tracer with the Vertex Connection and Merging weight
//! recurrence. Vertex merging is optional; the plain BiDir engine runs with
//! a zero merge weight.

use std::collections::HashMap;

use crate::bsdf::{Bsdf, BsdfEvent};
use crate::config::Properties;
use crate::engine::tracer::{russian_roulette_prob, TracerContext};
use crate::error::Result;
use crate::film::{FilmChannels, SampleResult};
use crate::geometry::{Point3f, Vector3f};
use crate::ray::Ray;
use crate::rng::Rng;
use crate::sampler::Sampler;
use crate::sampling::{pdf_a_to_w, pdf_w_to_a};
use crate::spectrum::Spectrum;
use crate::volume::PathVolumeInfo;

pub const BIDIR_SAMPLE_BOOT_SIZE: u32 = 13;
pub const BIDIR_LIGHT_SAMPLE_STEP_SIZE: u32 = 5;
pub const BIDIR_EYE_SAMPLE_STEP_SIZE: u32 = 10;

/// Balance form of the partial-MIS accumulator terms.
#[inline]
fn mis(x: f32) -> f32 {
    x
}

/// One stored light-path vertex with its partial MIS accumulators.
#[derive(Clone)]
pub struct PathVertexVm {
    pub bsdf: Bsdf,
    pub throughput: Spectrum,
    pub volume_info: PathVolumeInfo,
    pub depth: u32,
    pub d_vcm: f32,
    pub d_vc: f32,
    pub d_vm: f32,
    pub light_group: u32,
}

#[derive(Debug, Clone)]
pub struct VertexMergingParams {
    pub base_radius: f32,
    pub radius_alpha: f32,
    pub light_paths_count: u32,
}

#[derive(Debug, Clone)]
pub struct BiDirTracer {
    pub max_eye_path_depth: u32,
    pub max_light_path_depth: u32,
    pub rr_depth: u32,
    pub rr_cap: f32,
    pub sqrt_variance_clamp_max_value: f32,
    pub vertex_merging: Option<VertexMergingParams>,
}

impl BiDirTracer {
    pub fn from_properties(cfg: &Properties, world_radius: f32) -> Result<BiDirTracer> {
        let total = cfg.get_u32("path.pathdepth.total", 10)?;
        let vm_enabled = cfg.get_bool("bidirvm.enable", false)?;
        let vertex_merging = if vm_enabled {
            Some(VertexMergingParams {
                base_radius: cfg.get_f32("bidirvm.startradius.scale", 0.003)? * world_radius,
                radius_alpha: cfg.get_f32_in_range("bidirvm.alpha", 0.95, 1e-3, 1.0)?,
                light_paths_count: cfg.get_u32("bidirvm.lightpath.count", 16)?.max(1),
            })
        } else {
            None
        };
        Ok(BiDirTracer {
            max_eye_path_depth: cfg.get_u32("path.maxdepth.eye", total)?,
            max_light_path_depth: cfg.get_u32("path.maxdepth.light", total)?,
            rr_depth: cfg.get_u32("path.russianroulette.depth", 3)?,
            rr_cap: cfg.get_f32_in_range("path.russianroulette.cap", 0.5, 0.0, 1.0)?,
            sqrt_variance_clamp_max_value: cfg.get_f32("path.clamping.variance.maxvalue", 0.0)?,
            vertex_merging,
        })
    }

    pub fn sample_size(&self) -> u32 {
        BIDIR_SAMPLE_BOOT_SIZE
            + self.max_light_path_depth * BIDIR_LIGHT_SAMPLE_STEP_SIZE
            + self.max_eye_path_depth * BIDIR_EYE_SAMPLE_STEP_SIZE
    }

    /// Merge radius for the given iteration: shrinks as the render
    /// converges so merging bias vanishes in the limit.
    pub fn merge_radius(&self, iteration: u32) -> f32 {
        match &self.vertex_merging {
            Some(vm) => {
                let exponent = (1.0 - vm.radius_alpha) * 0.5;
                (vm.base_radius / ((iteration + 1) as f32).powf(exponent)).max(1e-5)
            }
            None => 0.0,
        }
    }

    fn light_paths_count(&self) -> u32 {
        self.vertex_merging
            .as_ref()
            .map(|vm| vm.light_paths_count)
            .unwrap_or(1)
    }

    /// Advance a path vertex through one BSDF bounce, updating throughput,
    /// the volume stack and the MIS accumulators.
    #[allow(clippy::too_many_arguments)]
    fn bounce(
        &self,
        vertex: &mut PathVertexVm,
        u0: f32,
        u1: f32,
        rr_u: f32,
        mis_vc_weight_factor: f32,
        mis_vm_weight_factor: f32,
        ray: &mut Ray,
        time: f32,
    ) -> Option<BsdfEvent> {
        let bsdf_sample = vertex.bsdf.sample(u0, u1)?;

        let (_, mut bsdf_rev_pdf_w) = if bsdf_sample.event.contains(BsdfEvent::SPECULAR) {
            (bsdf_sample.pdf_w, bsdf_sample.pdf_w)
        } else {
            vertex.bsdf.pdf(&bsdf_sample.sampled_dir)
        };

        let mut bsdf_pdf_w = bsdf_sample.pdf_w;
        if vertex.depth >= self.rr_depth {
            let prob = russian_roulette_prob(bsdf_sample.value, self.rr_cap);
            if prob < rr_u {
                return None;
            }
            vertex.throughput /= prob;
            bsdf_pdf_w *= prob;
            bsdf_rev_pdf_w *= prob;
        }

        vertex.throughput *= bsdf_sample.value;

        let cos_sampled = bsdf_sample.cos_sampled_dir;
        if bsdf_sample.event.contains(BsdfEvent::SPECULAR) {
            vertex.d_vcm = 0.0;
            let factor = mis(cos_sampled);
            vertex.d_vc *= factor;
            vertex.d_vm *= factor;
        } else {
            vertex.d_vc = mis(cos_sampled / bsdf_pdf_w)
                * (vertex.d_vc * mis(bsdf_rev_pdf_w) + vertex.d_vcm + mis_vm_weight_factor);
            vertex.d_vm = mis(cos_sampled / bsdf_pdf_w)
                * (vertex.d_vm * mis(bsdf_rev_pdf_w)
                    + vertex.d_vcm * mis_vc_weight_factor
                    + 1.0);
            vertex.d_vcm = mis(1.0 / bsdf_pdf_w);
        }

        vertex.volume_info.update(bsdf_sample.event, &vertex.bsdf);
        *ray = Ray::new(
            vertex.bsdf.get_ray_origin(&bsdf_sample.sampled_dir),
            bsdf_sample.sampled_dir,
            time,
        );
        vertex.depth += 1;
        Some(bsdf_sample.event)
    }

    /// Trace one light sub-path, connecting every stored vertex to the eye.
    #[allow(clippy::too_many_arguments)]
    fn trace_light_path(
        &self,
        ctx: &TracerContext<'_>,
        time: f32,
        lens_point: Point3f,
        mut dim: impl FnMut(u32) -> f32,
        mis_vc_weight_factor: f32,
        mis_vm_weight_factor: f32,
        light_path_vertices: &mut Vec<PathVertexVm>,
        results: &mut Vec<SampleResult>,
        connect_eye: bool,
    ) -> bool {
        let (light_index, light_pick_pdf) = match ctx.emit_strategy.sample_lights_global(dim(2)) {
            Some(pick) => pick,
            None => return false,
        };
        let light = &ctx.scene.lights[light_index];

        let emit = match light.emit(time, dim(5), dim(6), dim(7), dim(8), dim(9)) {
            Some(e) => e,
            None => return true,
        };
        if emit.radiance.is_black() {
            return true;
        }

        let light_emit_pdf_w = emit.emission_pdf_w * light_pick_pdf;
        let light_direct_pdf_w = emit.direct_pdf_a * light_pick_pdf;

        let mut vertex = PathVertexVm {
            bsdf: Bsdf::new(
                // Placeholder until the first hit; depth 1 vertices are
                // never stored before being overwritten.
                placeholder_hit_point(),
                std::sync::Arc::new(crate::bsdf::Material::null()),
                None,
            ),
            throughput: emit.radiance / light_emit_pdf_w,
            volume_info: PathVolumeInfo::new(),
            depth: 1,
            d_vcm: mis(light_direct_pdf_w / light_emit_pdf_w),
            d_vc: 0.0,
            d_vm: 0.0,
            light_group: light.group,
        };
        // A light source that can not be intersected can not be hit by a
        // BSDF-sampled eye ray.
        if light.is_environmental() || light.is_intersectable() {
            let used_cos = if light.is_environmental() {
                1.0
            } else {
                emit.cos_theta_at_light
            };
            vertex.d_vc = mis(used_cos / light_emit_pdf_w);
        }
        vertex.d_vm = vertex.d_vc * mis_vc_weight_factor;

        let is_env = light.is_environmental();
        let mut ray = emit.ray;
        while vertex.depth <= self.max_light_path_depth {
            let sample_offset =
                BIDIR_SAMPLE_BOOT_SIZE + (vertex.depth - 1) * BIDIR_LIGHT_SAMPLE_STEP_SIZE;

            let mut volume_info = vertex.volume_info.clone();
            let (hit, connection_throughput) =
                ctx.scene.intersect(&mut ray, &mut volume_info, dim(sample_offset));
            vertex.volume_info = volume_info;
            let hit = match hit {
                Some(h) => h,
                None => break,
            };

            vertex.throughput *= connection_throughput;
            vertex.bsdf = hit.bsdf;

            // Infinite lights use solid-angle MIS instead of area
            if vertex.depth > 1 || !is_env {
                vertex.d_vcm *= mis(hit.t * hit.t);
            }
            let cos_in = vertex
                .bsdf
                .hit_point
                .fixed_dir
                .dotn(&vertex.bsdf.hit_point.shade_n)
                .abs();
            let factor = 1.0 / mis(cos_in);
            vertex.d_vcm *= factor;
            vertex.d_vc *= factor;
            vertex.d_vm *= factor;

            if !vertex.bsdf.is_delta() {
                light_path_vertices.push(vertex.clone());
                if connect_eye {
                    let u = dim(sample_offset + 1);
                    self.connect_to_eye(
                        ctx,
                        time,
                        &vertex,
                        lens_point,
                        mis_vm_weight_factor,
                        u,
                        results,
                    );
                }
            }

            if vertex.depth >= self.max_light_path_depth {
                break;
            }
            let bounced = self.bounce(
                &mut vertex,
                dim(sample_offset + 2),
                dim(sample_offset + 3),
                dim(sample_offset + 4),
                mis_vc_weight_factor,
                mis_vm_weight_factor,
                &mut ray,
                time,
            );
            if bounced.is_none() {
                break;
            }
        }

        true
    }

    fn connect_to_eye(
        &self,
        ctx: &TracerContext<'_>,
        time: f32,
        light_vertex: &PathVertexVm,
        lens_point: Point3f,
        mis_vm_weight_factor: f32,
        pass_through_u: f32,
        results: &mut Vec<SampleResult>,
    ) {
        let camera = &ctx.scene.camera;
        if ctx.scene.objects[light_vertex.bsdf.hit_point.material_id as usize].camera_invisible {
            return;
        }
        let to_vertex = light_vertex.bsdf.hit_point.p - lens_point;
        let eye_distance = to_vertex.length();
        if eye_distance <= 0.0 {
            return;
        }
        let eye_dir = to_vertex / eye_distance;

        let eval = match light_vertex.bsdf.evaluate(&(-eye_dir)) {
            Some(e) => e,
            None => return,
        };
        let mut bsdf_rev_pdf_w = eval.reverse_pdf_w;
        if light_vertex.depth >= self.rr_depth {
            bsdf_rev_pdf_w *= russian_roulette_prob(eval.value, self.rr_cap);
        }

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

        let shadow_origin = light_vertex.bsdf.get_ray_origin(&(-eye_dir));
        let shadow_distance = (lens_point - shadow_origin).length();
        let mut shadow_ray = Ray::segment(shadow_origin, -eye_dir, 0.0, shadow_distance, time);
        shadow_ray.update_min_max_with_epsilon();
        let connection_throughput = match ctx.scene.intersect_shadow(
            &shadow_ray,
            &light_vertex.volume_info,
            pass_through_u,
        ) {
            Some(t) => t,
            None => return,
        };

        let cos_to_camera = light_vertex
            .bsdf
            .hit_point
            .shade_n
            .dotv(&(-eye_dir));
        let (camera_pdf_w, flux_to_radiance) = match camera.get_pdf(&eye_dir, eye_distance) {
            Some(p) => p,
            None => return,
        };
        let camera_pdf_a = pdf_w_to_a(camera_pdf_w, eye_distance, cos_to_camera);

        let weight_light = mis(camera_pdf_a / self.light_paths_count() as f32)
            * (mis_vm_weight_factor + light_vertex.d_vcm + light_vertex.d_vc * mis(bsdf_rev_pdf_w));
        let mis_weight = 1.0 / (weight_light + 1.0);

        let radiance = (mis_weight * flux_to_radiance)
            * connection_throughput
            * light_vertex.throughput
            * eval.value;

        let mut sample_result = SampleResult::new(
            FilmChannels::RADIANCE_PER_SCREEN_NORMALIZED,
            ctx.scene.light_group_count(),
        );
        sample_result.film_x = film_position.x;
        sample_result.film_y = film_position.y;
        sample_result.add_radiance(light_vertex.light_group, radiance);
        results.push(sample_result);
    }

    /// Direct light sampling at an eye vertex, with the bidirectional MIS
    /// weight.
    #[allow(clippy::too_many_arguments)]
    fn direct_light_sampling(
        &self,
        ctx: &TracerContext<'_>,
        time: f32,
        u0: f32,
        u1: f32,
        u2: f32,
        u3: f32,
        u4: f32,
        mis_vm_weight_factor: f32,
        eye_vertex: &PathVertexVm,
        sample_result: &mut SampleResult,
    ) {
        if eye_vertex.bsdf.is_delta() {
            return;
        }
        let p = eye_vertex.bsdf.hit_point.p;
        let landing_n = eye_vertex.bsdf.hit_point.landing_geometry_n();
        let (light_index, light_pick_pdf) = match ctx.illuminate_strategy.sample_lights(
            u0,
            &p,
            &landing_n,
            eye_vertex.bsdf.is_volume(),
        ) {
            Some(pick) => pick,
            None => return,
        };
        let light = &ctx.scene.lights[light_index];

        let illuminate = match light.illuminate(&p, time, u1, u2, u3) {
            Some(s) => s,
            None => return,
        };
        if illuminate.radiance.is_black() {
            return;
        }
        let eval = match eye_vertex.bsdf.evaluate(&illuminate.shadow_ray.d) {
            Some(e) => e,
            None => return,
        };

        let connection_throughput = match ctx.scene.intersect_shadow(
            &illuminate.shadow_ray,
            &eye_vertex.volume_info,
            u4,
        ) {
            Some(t) => t,
            None => return,
        };

        let mut bsdf_pdf_w = if light.is_environmental() || light.is_intersectable() {
            eval.pdf_w
        } else {
            0.0
        };
        let mut bsdf_rev_pdf_w = eval.reverse_pdf_w;
        if eye_vertex.depth + 1 >= self.rr_depth {
            let prob = russian_roulette_prob(eval.value, self.rr_cap);
            bsdf_pdf_w *= prob;
            bsdf_rev_pdf_w *= prob;
        }

        let cos_theta_to_light = illuminate
            .shadow_ray
            .d
            .dotn(&eye_vertex.bsdf.hit_point.shade_n)
            .abs();
        let direct_light_sampling_pdf_w = illuminate.direct_pdf_w * light_pick_pdf;

        // emissionPdfA / directPdfA == emissionPdfW / directPdfW
        let weight_light = mis(bsdf_pdf_w / direct_light_sampling_pdf_w);
        let weight_camera = mis(
            illuminate.emission_pdf_w * cos_theta_to_light
                / (illuminate.direct_pdf_w * illuminate.cos_theta_at_light),
        ) * (mis_vm_weight_factor
            + eye_vertex.d_vcm
            + eye_vertex.d_vc * mis(bsdf_rev_pdf_w));
        let mis_weight = 1.0 / (weight_light + 1.0 + weight_camera);

        let factor = 1.0 / direct_light_sampling_pdf_w;
        sample_result.add_radiance(
            light.group,
            (mis_weight * factor)
                * eye_vertex.throughput
                * connection_throughput
                * illuminate.radiance
                * eval.value,
        );
    }

    /// Vertex connection between one eye vertex and one light vertex.
    #[allow(clippy::too_many_arguments)]
    fn connect_vertices(
        &self,
        ctx: &TracerContext<'_>,
        time: f32,
        eye_vertex: &PathVertexVm,
        light_vertex: &PathVertexVm,
        mis_vm_weight_factor: f32,
        u0: f32,
        sample_result: &mut SampleResult,
    ) {
        let mut p2p_dir = light_vertex.bsdf.hit_point.p - eye_vertex.bsdf.hit_point.p;
        let p2p_distance2 = p2p_dir.length_squared();
        if p2p_distance2 <= 0.0 {
            return;
        }
        let p2p_distance = p2p_distance2.sqrt();
        p2p_dir = p2p_dir / p2p_distance;

        let eye_eval = match eye_vertex.bsdf.evaluate(&p2p_dir) {
            Some(e) => e,
            None => return,
        };
        let light_eval = match light_vertex.bsdf.evaluate(&(-p2p_dir)) {
            Some(e) => e,
            None => return,
        };

        let cos_at_camera = eye_vertex.bsdf.hit_point.shade_n.dotv(&p2p_dir);
        let cos_at_light = light_vertex.bsdf.hit_point.shade_n.dotv(&(-p2p_dir));
        // The BSDF eval values already carry the incident cosine, so only
        // the inverse-square term of the geometry factor remains.
        let geometry_term = 1.0 / p2p_distance2;

        let shadow_origin = eye_vertex.bsdf.get_ray_origin(&p2p_dir);
        let shadow_distance = (light_vertex.bsdf.hit_point.p - shadow_origin).length();
        let mut shadow_ray = Ray::segment(shadow_origin, p2p_dir, 0.0, shadow_distance, time);
        shadow_ray.update_min_max_with_epsilon();
        let connection_throughput =
            match ctx
                .scene
                .intersect_shadow(&shadow_ray, &eye_vertex.volume_info, u0)
            {
                Some(t) => t,
                None => return,
            };

        let mut eye_bsdf_pdf_w = eye_eval.pdf_w;
        let mut eye_bsdf_rev_pdf_w = eye_eval.reverse_pdf_w;
        if eye_vertex.depth >= self.rr_depth {
            let prob = russian_roulette_prob(eye_eval.value, self.rr_cap);
            eye_bsdf_pdf_w *= prob;
            eye_bsdf_rev_pdf_w *= prob;
        }
        let mut light_bsdf_pdf_w = light_eval.pdf_w;
        let mut light_bsdf_rev_pdf_w = light_eval.reverse_pdf_w;
        if light_vertex.depth >= self.rr_depth {
            let prob = russian_roulette_prob(light_eval.value, self.rr_cap);
            light_bsdf_pdf_w *= prob;
            light_bsdf_rev_pdf_w *= prob;
        }

        let eye_bsdf_pdf_a = pdf_w_to_a(eye_bsdf_pdf_w, p2p_distance, cos_at_light);
        let light_bsdf_pdf_a = pdf_w_to_a(light_bsdf_pdf_w, p2p_distance, cos_at_camera);

        let weight_light = mis(eye_bsdf_pdf_a)
            * (mis_vm_weight_factor
                + light_vertex.d_vcm
                + light_vertex.d_vc * mis(light_bsdf_rev_pdf_w));
        let weight_camera = mis(light_bsdf_pdf_a)
            * (mis_vm_weight_factor + eye_vertex.d_vcm + eye_vertex.d_vc * mis(eye_bsdf_rev_pdf_w));
        let mis_weight = 1.0 / (weight_light + 1.0 + weight_camera);

        sample_result.add_radiance(
            light_vertex.light_group,
            (mis_weight * geometry_term)
                * eye_vertex.throughput
                * eye_eval.value
                * connection_throughput
                * light_eval.value
                * light_vertex.throughput,
        );
    }

    /// Emission hit by the eye path.
    fn direct_hit_light(
        &self,
        ctx: &TracerContext<'_>,
        eye_vertex: &PathVertexVm,
        hit_distance: f32,
        finite: bool,
        ray_dir: Vector3f,
        sample_result: &mut SampleResult,
    ) {
        let add = |light_index: usize,
                   radiance: Spectrum,
                   direct_pdf: f32,
                   emission_pdf_w: f32,
                   sample_result: &mut SampleResult| {
            if radiance.is_black() {
                return;
            }
            let light = &ctx.scene.lights[light_index];
            if eye_vertex.depth == 1 {
                sample_result.add_radiance(light.group, eye_vertex.throughput * radiance);
                return;
            }
            let light_pick_pdf = ctx.emit_strategy.sample_light_pdf_global(light_index);
            let weight_camera = mis(direct_pdf * light_pick_pdf) * eye_vertex.d_vcm
                + mis(emission_pdf_w * light_pick_pdf) * eye_vertex.d_vc;
            let mis_weight = 1.0 / (weight_camera + 1.0);
            sample_result
                .add_radiance(light.group, mis_weight * eye_vertex.throughput * radiance);
        };

        if finite {
            if let Some(light_index) = eye_vertex.bsdf.triangle_light_index {
                if let Some((radiance, direct_pdf_a, emission_pdf_w)) = ctx.scene.lights
                    [light_index as usize]
                    .get_radiance(
                        &eye_vertex.bsdf.hit_point.fixed_dir,
                        Some(&eye_vertex.bsdf.hit_point.geometry_n),
                    )
                {
                    // Convert the area pdf at the light to solid angle at
                    // the previous vertex.
                    let cos_at_light = eye_vertex
                        .bsdf
                        .hit_point
                        .fixed_dir
                        .dotn(&eye_vertex.bsdf.hit_point.geometry_n)
                        .abs();
                    let direct_pdf_w = pdf_a_to_w(direct_pdf_a, hit_distance, cos_at_light);
                    add(
                        light_index as usize,
                        radiance,
                        direct_pdf_w,
                        emission_pdf_w,
                        sample_result,
                    );
                }
            }
        } else {
            for light in ctx.scene.environment_lights() {
                if let Some((radiance, direct_pdf_w, emission_pdf_w)) =
                    light.get_radiance(&(-ray_dir), None)
                {
                    add(
                        light.light_scene_index as usize,
                        radiance,
                        direct_pdf_w,
                        emission_pdf_w,
                        sample_result,
                    );
                }
            }
        }
    }

    fn vm_weight_factor(&self, radius: f32) -> f32 {
        match &self.vertex_merging {
            Some(vm) => {
                mis(std::f32::consts::PI * radius * radius * vm.light_paths_count as f32)
            }
            None => 0.0,
        }
    }

    /// Render one full bidirectional sample: one (or, with merging, N)
    /// light sub-paths plus one eye sub-path with connections and optional
    /// merging at every non-delta eye vertex.
    pub fn render_sample(
        &self,
        ctx: &TracerContext<'_>,
        sampler: &mut dyn Sampler,
        aux_rng: &mut Rng,
        iteration: u32,
    ) -> Vec<SampleResult> {
        let mut results = Vec::new();
        let mut light_path_vertices: Vec<PathVertexVm> = Vec::new();

        let camera = &ctx.scene.camera;
        let time = camera.generate_ray_time(sampler.get_sample(12));
        let lens_point = camera.sample_lens(time, sampler.get_sample(3), sampler.get_sample(4));

        let merge_radius = self.merge_radius(iteration);
        let mis_vm_weight_factor = self.vm_weight_factor(merge_radius);
        let mis_vc_weight_factor = if mis_vm_weight_factor > 0.0 {
            mis(1.0 / mis_vm_weight_factor)
        } else {
            0.0
        };

        // The paired light path consumes sampler dimensions; the extra
        // merging-only paths run on the auxiliary RNG.
        let valid_light_path = self.trace_light_path(
            ctx,
            time,
            lens_point,
            |d| sampler.get_sample(d),
            mis_vc_weight_factor,
            mis_vm_weight_factor,
            &mut light_path_vertices,
            &mut results,
            true,
        );
        let paired_vertex_count = light_path_vertices.len();
        for _ in 1..self.light_paths_count() {
            let mut rng = *aux_rng;
            self.trace_light_path(
                ctx,
                time,
                lens_point,
                |_| rng.uniform_f32(),
                mis_vc_weight_factor,
                mis_vm_weight_factor,
                &mut light_path_vertices,
                &mut results,
                false,
            );
            *aux_rng = rng;
        }

        if !valid_light_path {
            return results;
        }

        // Hash grid over all light vertices for merging.
        let merge_grid = self
            .vertex_merging
            .as_ref()
            .map(|_| MergeGrid::new(&light_path_vertices, merge_radius));

        //----------------------------------------------------------------
        // Trace the eye path
        //----------------------------------------------------------------

        let mut eye_sample_result = SampleResult::new(
            ctx.film.channels()
                & (FilmChannels::RADIANCE_PER_PIXEL_NORMALIZED
                    | FilmChannels::ALPHA
                    | FilmChannels::DEPTH
                    | FilmChannels::SHADING_NORMAL
                    | FilmChannels::ALBEDO),
            ctx.scene.light_group_count(),
        );
        eye_sample_result.film_x = sampler.get_sample(0);
        eye_sample_result.film_y = sampler.get_sample(1);

        let mut eye_ray = camera.generate_ray(
            time,
            eye_sample_result.film_x,
            eye_sample_result.film_y,
            sampler.get_sample(10),
            sampler.get_sample(11),
        );
        let (camera_pdf_w, _) = match camera.get_pdf(&eye_ray.d, 0.0) {
            Some(p) => p,
            None => return results,
        };

        let mut eye_vertex = PathVertexVm {
            bsdf: Bsdf::new(
                placeholder_hit_point(),
                std::sync::Arc::new(crate::bsdf::Material::null()),
                None,
            ),
            throughput: Spectrum::white(),
            volume_info: PathVolumeInfo::new(),
            depth: 1,
            d_vcm: mis(self.light_paths_count() as f32 / camera_pdf_w),
            d_vc: 0.0,
            d_vm: 0.0,
            light_group: 0,
        };

        let mut is_transmitted_path = true;
        let mut albedo_to_do = true;
        while eye_vertex.depth <= self.max_eye_path_depth {
            let first_vertex = eye_vertex.depth == 1;
            let sample_offset = BIDIR_SAMPLE_BOOT_SIZE
                + self.max_light_path_depth * BIDIR_LIGHT_SAMPLE_STEP_SIZE
                + (eye_vertex.depth - 1) * BIDIR_EYE_SAMPLE_STEP_SIZE;

            let mut volume_info = eye_vertex.volume_info.clone();
            let (hit, connection_throughput) = ctx.scene.intersect(
                &mut eye_ray,
                &mut volume_info,
                sampler.get_sample(sample_offset),
            );
            eye_vertex.volume_info = volume_info;
            eye_vertex.throughput *= connection_throughput;

            let hit = match hit {
                Some(h) => h,
                None => {
                    self.direct_hit_light(
                        ctx,
                        &eye_vertex,
                        0.0,
                        false,
                        eye_ray.d,
                        &mut eye_sample_result,
                    );
                    if first_vertex {
                        eye_sample_result.alpha = 0.0;
                        eye_sample_result.depth = f32::INFINITY;
                    } else if is_transmitted_path {
                        eye_sample_result.alpha = 0.0;
                    }
                    break;
                }
            };

            eye_vertex.bsdf = hit.bsdf;
            if first_vertex {
                eye_sample_result.alpha = 1.0;
                eye_sample_result.depth = hit.t;
                eye_sample_result.shading_normal = eye_vertex.bsdf.hit_point.shade_n;
            }
            if albedo_to_do && !eye_vertex.bsdf.is_delta() {
                eye_sample_result.albedo = eye_vertex.throughput * eye_vertex.bsdf.albedo();
                albedo_to_do = false;
            }

            // Update the MIS constants
            let cos_in = eye_vertex
                .bsdf
                .hit_point
                .fixed_dir
                .dotn(&eye_vertex.bsdf.hit_point.shade_n)
                .abs();
            let factor = 1.0 / mis(cos_in);
            eye_vertex.d_vcm *= mis(hit.t * hit.t) * factor;
            eye_vertex.d_vc *= factor;
            eye_vertex.d_vm *= factor;

            if eye_vertex.bsdf.is_light_source() {
                self.direct_hit_light(
                    ctx,
                    &eye_vertex,
                    hit.t,
                    true,
                    eye_ray.d,
                    &mut eye_sample_result,
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
                mis_vm_weight_factor,
                &eye_vertex,
                &mut eye_sample_result,
            );

            if !eye_vertex.bsdf.is_delta() {
                // Vertex connections against the paired light path only.
                for light_vertex in &light_path_vertices[..paired_vertex_count] {
                    self.connect_vertices(
                        ctx,
                        time,
                        &eye_vertex,
                        light_vertex,
                        mis_vm_weight_factor,
                        sampler.get_sample(sample_offset + 6),
                        &mut eye_sample_result,
                    );
                }
                // Vertex merging against every light vertex.
                if let Some(grid) = &merge_grid {
                    self.merge_vertices(
                        &eye_vertex,
                        grid,
                        &light_path_vertices,
                        merge_radius,
                        mis_vc_weight_factor,
                        &mut eye_sample_result,
                    );
                }
            }

            let bounced = self.bounce(
                &mut eye_vertex,
                sampler.get_sample(sample_offset + 7),
                sampler.get_sample(sample_offset + 8),
                sampler.get_sample(sample_offset + 9),
                mis_vc_weight_factor,
                mis_vm_weight_factor,
                &mut eye_ray,
                time,
            );
            match bounced {
                Some(event) => {
                    is_transmitted_path =
                        is_transmitted_path && event.contains(BsdfEvent::TRANSMIT);
                }
                None => break,
            }
        }

        results.push(eye_sample_result);
        results
    }

    fn merge_vertices(
        &self,
        eye_vertex: &PathVertexVm,
        grid: &MergeGrid,
        light_path_vertices: &[PathVertexVm],
        radius: f32,
        mis_vc_weight_factor: f32,
        sample_result: &mut SampleResult,
    ) {
        let vm = match &self.vertex_merging {
            Some(vm) => vm,
            None => return,
        };
        let radius2 = radius * radius;
        let normalization =
            1.0 / (std::f32::consts::PI * radius2 * vm.light_paths_count as f32);
        let p = eye_vertex.bsdf.hit_point.p;

        for &index in grid.query(&p) {
            let light_vertex = &light_path_vertices[index];
            if p.distance_squared(&light_vertex.bsdf.hit_point.p) > radius2 {
                continue;
            }
            // Evaluate the eye BSDF towards the light vertex's incident
            // direction (photon-mapping style density estimation).
            let photon_dir = light_vertex.bsdf.hit_point.fixed_dir;
            let eval = match eye_vertex.bsdf.evaluate(&photon_dir) {
                Some(e) => e,
                None => continue,
            };

            let weight_light = light_vertex.d_vcm * mis_vc_weight_factor
                + light_vertex.d_vm * mis(eval.pdf_w);
            let weight_camera = eye_vertex.d_vcm * mis_vc_weight_factor
                + eye_vertex.d_vm * mis(eval.reverse_pdf_w);
            let mis_weight = 1.0 / (weight_light + 1.0 + weight_camera);

            sample_result.add_radiance(
                light_vertex.light_group,
                (mis_weight * normalization)
                    * eye_vertex.throughput
                    * eval.value
                    * light_vertex.throughput,
            );
        }
    }
}

/// Spatial hash over light-vertex positions; cell size equals the merge
/// radius so a query only has to visit the 27 surrounding cells.
struct MergeGrid {
    cells: HashMap<(i32, i32, i32), Vec<usize>>,
    inv_cell_size: f32,
}

impl MergeGrid {
    fn new(vertices: &[PathVertexVm], radius: f32) -> MergeGrid {
        let inv_cell_size = 1.0 / (2.0 * radius).max(1e-6);
        let mut cells: HashMap<(i32, i32, i32), Vec<usize>> = HashMap::new();
        for (index, vertex) in vertices.iter().enumerate() {
            let key = Self::cell_of(&vertex.bsdf.hit_point.p, inv_cell_size);
            cells.entry(key).or_default().push(index);
        }
        MergeGrid {
            cells,
            inv_cell_size,
        }
    }

    fn cell_of(p: &Point3f, inv_cell_size: f32) -> (i32, i32, i32) {
        (
            (p.x * inv_cell_size).floor() as i32,
            (p.y * inv_cell_size).floor() as i32,
            (p.z * inv_cell_size).floor() as i32,
        )
    }

    fn query(&self, p: &Point3f) -> impl Iterator<Item = &usize> {
        let center = Self::cell_of(p, self.inv_cell_size);
        (-1..=1)
            .flat_map(move |dx| {
                (-1..=1).flat_map(move |dy| (-1..=1).map(move |dz| (dx, dy, dz)))
            })
            .filter_map(move |(dx, dy, dz)| {
                self.cells
                    .get(&(center.0 + dx, center.1 + dy, center.2 + dz))
            })
            .flatten()
    }
}

fn placeholder_hit_point() -> crate::bsdf::HitPoint {
    crate::bsdf::HitPoint {
        p: Point3f::zero(),
        geometry_n: crate::geometry::Normal3f::new(0.0, 0.0, 1.0),
        shade_n: crate::geometry::Normal3f::new(0.0, 0.0, 1.0),
        fixed_dir: Vector3f::new(0.0, 0.0, 1.0),
        uv: crate::geometry::Point2f::new(0.0, 0.0),
        into_object: true,
        material_id: 0,
        object_id: 0,
        interior_volume: None,
        exterior_volume: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_radius_schedule() {
        let mut cfg = Properties::new();
        cfg.set("bidirvm.enable", true)
            .set("bidirvm.startradius.scale", 0.01)
            .set("bidirvm.alpha", 0.7);
        let tracer = BiDirTracer::from_properties(&cfg, 100.0).unwrap();
        let r0 = tracer.merge_radius(0);
        let r10 = tracer.merge_radius(10);
        let r100 = tracer.merge_radius(100);
        assert!((r0 - 1.0).abs() < 1e-5);
        assert!(r10 < r0 && r100 < r10);
        assert!(r100 > 0.0);
    }

    #[test]
    fn test_plain_bidir_has_no_vm(){
        let cfg = Properties::new();
        let tracer = BiDirTracer::from_properties(&cfg, 1.0).unwrap();
        assert!(tracer.vertex_merging.is_none());
        assert_eq!(tracer.merge_radius(5), 0.0);
        assert_eq!(tracer.vm_weight_factor(0.0), 0.0);
    }

    #[test]
    fn test_sample_size_covers_both_paths() {
        let cfg = Properties::new();
        let tracer = BiDirTracer::from_properties(&cfg, 1.0).unwrap();
        assert_eq!(
            tracer.sample_size(),
            BIDIR_SAMPLE_BOOT_SIZE
                + tracer.max_light_path_depth * BIDIR_LIGHT_SAMPLE_STEP_SIZE
                + tracer.max_eye_path_depth * BIDIR_EYE_SAMPLE_STEP_SIZE
        );
    }
}
