//! Estimate a scene-space lookup radius from an image-plane radius: probe
//! rays record the camera footprint (dpdx/dpdy) stretched along the path to
//! the first cache-eligible hit.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::info;

use crate::bsdf::{Bsdf, BsdfEvent};
use crate::rng::Rng;
use crate::sampler::{SampleType, Sampler, SobolSampler, SobolSamplerSharedData};
use crate::scene::Scene;
use crate::spectrum::Spectrum;
use crate::volume::PathVolumeInfo;

/// Hard coded probe RR parameters
const PROBE_RR_DEPTH: u32 = 3;
const PROBE_RR_CAP: f32 = 0.5;

const SAMPLE_BOOT_SIZE: u32 = 5;
const SAMPLE_STEP_SIZE: u32 = 4;

struct ProbeResult {
    accumulated_radius: f32,
    count: u32,
}

fn probe_thread(
    scene: &Scene,
    image_plane_radius: f32,
    max_path_depth: u32,
    validator: &(dyn Fn(&Bsdf) -> bool + Sync),
    thread_index: usize,
    work_size: u32,
    interrupt: &AtomicBool,
) -> ProbeResult {
    let camera = &scene.camera;
    let film_width = camera.film_width as f32;
    let film_height = camera.film_height as f32;
    let image_plane_delta_x = film_width * image_plane_radius;
    let image_plane_delta_y = film_height * image_plane_radius;

    let shared = Arc::new(SobolSamplerSharedData::new(131 + thread_index as u32, None));
    let mut sampler = SobolSampler::new(
        Rng::new(1 + thread_index as u64),
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
    let sample_size = SAMPLE_BOOT_SIZE + max_path_depth * SAMPLE_STEP_SIZE;
    sampler.request_samples(SampleType::PixelNormalizedOnly, sample_size);

    let mut result = ProbeResult {
        accumulated_radius: 0.0,
        count: 0,
    };

    for _ in 0..work_size {
        if interrupt.load(Ordering::Relaxed) {
            break;
        }

        // The film sub-region is intentionally ignored so border rendering
        // does not skew the estimate.
        let film_x = sampler.get_sample(0) * (film_width - 1.0);
        let film_y = sampler.get_sample(1) * (film_height - 1.0);
        let u0 = sampler.get_sample(2);
        let u1 = sampler.get_sample(3);
        let time = camera.generate_ray_time(sampler.get_sample(4));

        let mut eye_ray = camera.generate_ray(time, film_x, film_y, u0, u1);

        // No true ray differential support in the camera interface, so
        // difference three rays across one image-plane delta.
        let ray_dx = camera.generate_ray(time, film_x + image_plane_delta_x, film_y, u0, u1);
        let ray_dy = camera.generate_ray(time, film_x, film_y + image_plane_delta_y, u0, u1);
        let dpdx = (eye_ray.at(1.0).distance(&ray_dx.at(1.0))
            - eye_ray.at(0.0).distance(&ray_dx.at(0.0)))
        .abs();
        let dpdy = (eye_ray.at(1.0).distance(&ray_dy.at(1.0))
            - eye_ray.at(0.0).distance(&ray_dy.at(0.0)))
        .abs();
        if !dpdx.is_finite() || !dpdy.is_finite() {
            sampler.next_sample(&[]);
            continue;
        }

        let mut volume_info = PathVolumeInfo::new();
        let mut path_throughput = Spectrum::white();
        let mut path_length = 0.0;
        let mut depth = 0u32;
        loop {
            let sample_offset = SAMPLE_BOOT_SIZE + depth * SAMPLE_STEP_SIZE;
            let pass_through = sampler.get_sample(sample_offset);

            let (hit, connection_throughput) =
                scene.intersect(&mut eye_ray, &mut volume_info, pass_through);
            path_throughput *= connection_throughput;

            let hit = match hit {
                Some(h) => h,
                None => break,
            };

            path_length += hit.t;

            if validator(&hit.bsdf) {
                // Found a place where a cache entry could live.
                result.accumulated_radius += (dpdx * path_length).max(dpdy * path_length);
                result.count += 1;
                break;
            }

            depth += 1;
            if depth >= max_path_depth {
                break;
            }

            let bsdf_sample = match hit
                .bsdf
                .sample(sampler.get_sample(sample_offset + 1), sampler.get_sample(sample_offset + 2))
            {
                Some(s) => s,
                None => break,
            };

            if !bsdf_sample.event.contains(BsdfEvent::SPECULAR) && depth >= PROBE_RR_DEPTH {
                let rr_prob = crate::clamp(bsdf_sample.value.max_component_value(), PROBE_RR_CAP, 1.0);
                if rr_prob < sampler.get_sample(sample_offset + 3) {
                    break;
                }
                path_throughput /= rr_prob;
            }
            path_throughput *= bsdf_sample.value;

            volume_info.update(bsdf_sample.event, &hit.bsdf);
            eye_ray.update(
                hit.bsdf.get_ray_origin(&bsdf_sample.sampled_dir),
                bsdf_sample.sampled_dir,
            );
        }

        sampler.next_sample(&[]);
    }

    result
}

/// Mean scene-space radius covering `image_plane_radius` of the image, or
/// `default_radius` when too few probe paths found an eligible surface.
pub fn film_to_scene_radius(
    scene: &Scene,
    image_plane_radius: f32,
    default_radius: f32,
    max_path_depth: u32,
    validator: &(dyn Fn(&Bsdf) -> bool + Sync),
    interrupt: &AtomicBool,
) -> f32 {
    let thread_count = num_cpus::get().max(1);
    // 16 passes at 256 x 256 resolution, split across the threads
    let work_size = (16 * 256 * 256 / thread_count) as u32;

    let results: Vec<ProbeResult> = crossbeam::scope(|scope| {
        let handles: Vec<_> = (0..thread_count)
            .map(|thread_index| {
                scope.spawn(move |_| {
                    probe_thread(
                        scene,
                        image_plane_radius,
                        max_path_depth,
                        validator,
                        thread_index,
                        work_size,
                        interrupt,
                    )
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    })
    .unwrap();

    let total: f32 = results.iter().map(|r| r.accumulated_radius).sum();
    let count: u32 = results.iter().map(|r| r.count).sum();

    if count > 256 {
        let radius = total / count as f32;
        info!(
            "Film to scene radius: {} ({} valid probe samples)",
            radius, count
        );
        radius
    } else {
        info!(
            "Film to scene radius: falling back to default {} ({} valid probe samples)",
            default_radius, count
        );
        default_radius
    }
}
