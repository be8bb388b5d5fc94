//! The production sampler: Owen-scrambled Sobol over atomically-claimed
//! pixel buckets, with noise-driven adaptive sampling.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::film::{Film, FilmChannels, FilmSampleSplatter, SampleResult};
use crate::rng::Rng;
use crate::sampler::sobol_sequence::{SobolSequence, SOBOL_START_OFFSET};
use crate::sampler::{splat_sample_results, SampleType, Sampler, SamplerType};
use crate::sampling::{decode_morton2_x, decode_morton2_y};
use crate::{clamp, lerp};

/// Engine-scoped state shared by the Sobol samplers of all workers.
pub struct SobolSamplerSharedData {
    seed_base: u32,
    film: Option<Arc<Film>>,
    bucket_index: AtomicU32,
    pass_per_pixel: Vec<AtomicU32>,
}

impl SobolSamplerSharedData {
    pub fn new(seed: u32, film: Option<Arc<Film>>) -> SobolSamplerSharedData {
        let pixel_count = film
            .as_ref()
            .map(|f| f.sub_region().pixel_count() as usize)
            .unwrap_or(1);
        let mut pass_per_pixel = Vec::with_capacity(pixel_count);
        pass_per_pixel.resize_with(pixel_count, || AtomicU32::new(SOBOL_START_OFFSET));
        SobolSamplerSharedData {
            seed_base: seed % (u32::MAX - 1) + 1,
            film,
            bucket_index: AtomicU32::new(0),
            pass_per_pixel,
        }
    }

    pub fn from_rng(rng: &mut Rng, film: Option<Arc<Film>>) -> SobolSamplerSharedData {
        SobolSamplerSharedData::new(rng.uniform_u32(), film)
    }

    /// Reset on scene edit: every pixel restarts its pass sequence.
    pub fn reset(&self) {
        for pass in &self.pass_per_pixel {
            pass.store(SOBOL_START_OFFSET, Ordering::Relaxed);
        }
        self.bucket_index.store(0, Ordering::Relaxed);
    }

    pub fn seed_base(&self) -> u32 {
        self.seed_base
    }

    /// Atomically claim the next bucket; the bucket seed never collapses to
    /// zero.
    fn get_new_bucket(&self, bucket_count: u32) -> (u32, u32) {
        let index = self.bucket_index.fetch_add(1, Ordering::Relaxed) % bucket_count;
        let seed = (self.seed_base.wrapping_add(index)) % (u32::MAX - 1) + 1;
        (index, seed)
    }

    fn get_new_pixel_pass(&self, pixel_index: u32) -> u32 {
        let index = (pixel_index as usize).min(self.pass_per_pixel.len() - 1);
        self.pass_per_pixel[index].fetch_add(1, Ordering::Relaxed)
    }

    /// Minimum pass over all pixels; drives spp-style progress reporting.
    pub fn min_pass(&self) -> u32 {
        self.pass_per_pixel
            .iter()
            .map(|p| p.load(Ordering::Relaxed))
            .min()
            .unwrap_or(SOBOL_START_OFFSET)
            - SOBOL_START_OFFSET
    }
}

pub struct SobolSampler {
    film: Option<Arc<Film>>,
    splatter: Option<Arc<FilmSampleSplatter>>,
    shared: Arc<SobolSamplerSharedData>,
    sequence: SobolSequence,
    rng: Rng,

    image_samples_enable: bool,
    adaptive_strength: f32,
    adaptive_user_importance_weight: f32,
    bucket_size: u32,
    tile_size: u32,
    super_sampling: u32,
    overlapping: u32,

    thread_index: usize,
    sample_type: SampleType,
    bucket_index: u32,
    pixel_offset: u32,
    pass_offset: u32,
    pass: u32,
    sample0: f32,
    sample1: f32,
}

impl SobolSampler {
    pub fn new(
        rng: Rng,
        film: Option<Arc<Film>>,
        splatter: Option<Arc<FilmSampleSplatter>>,
        image_samples_enable: bool,
        adaptive_strength: f32,
        adaptive_user_importance_weight: f32,
        bucket_size: u32,
        tile_size: u32,
        super_sampling: u32,
        overlapping: u32,
        shared: Arc<SobolSamplerSharedData>,
    ) -> SobolSampler {
        SobolSampler {
            film,
            splatter,
            shared,
            sequence: SobolSequence::new(),
            rng,
            image_samples_enable,
            adaptive_strength: clamp(adaptive_strength, 0.0, 0.95),
            adaptive_user_importance_weight,
            bucket_size: crate::round_up_pow_2(bucket_size.max(1)),
            tile_size: crate::round_up_pow_2(tile_size.max(1)),
            super_sampling: super_sampling.max(1),
            overlapping: overlapping.max(1),
            thread_index: 0,
            sample_type: SampleType::PixelNormalizedOnly,
            bucket_index: 0,
            pixel_offset: 0,
            pass_offset: 0,
            pass: SOBOL_START_OFFSET,
            sample0: 0.0,
            sample1: 0.0,
        }
    }

    fn init_new_sample(&mut self) {
        let do_image_samples = self.image_samples_enable && self.film.is_some();

        let (region, tile_width_count, bucket_count) = if do_image_samples {
            let region = self.film.as_ref().map(|f| f.sub_region()).unwrap();
            let tile_width_count = (region.width() + self.tile_size - 1) / self.tile_size;
            let tile_height_count = (region.height() + self.tile_size - 1) / self.tile_size;
            let covered = tile_width_count * self.tile_size * tile_height_count * self.tile_size;
            let bucket_count = self.overlapping * ((covered + self.bucket_size - 1) / self.bucket_size);
            (Some(region), tile_width_count, bucket_count)
        } else {
            (None, 0, u32::MAX)
        };

        loop {
            self.pass_offset += 1;
            if self.pass_offset >= self.super_sampling {
                self.pixel_offset += 1;
                self.pass_offset = 0;

                if self.pixel_offset >= self.bucket_size {
                    let (bucket_index, bucket_seed) = self.shared.get_new_bucket(bucket_count);
                    self.bucket_index = bucket_index;
                    self.pixel_offset = 0;
                    self.pass_offset = 0;
                    self.rng.set_sequence(u64::from(bucket_seed));
                }
            }

            let (pixel_x, pixel_y) = match region {
                Some(region) => {
                    // Map the bucket position to a pixel: Morton order
                    // inside a tile, row-major across tiles.
                    let pixel_bucket_index =
                        (self.bucket_index / self.overlapping) * self.bucket_size + self.pixel_offset;
                    let morton_offset = pixel_bucket_index % (self.tile_size * self.tile_size);
                    let pixel_tile_index = pixel_bucket_index / (self.tile_size * self.tile_size);

                    let sub_x = (pixel_tile_index % tile_width_count) * self.tile_size
                        + decode_morton2_x(morton_offset);
                    let sub_y = (pixel_tile_index / tile_width_count) * self.tile_size
                        + decode_morton2_y(morton_offset);
                    if sub_x >= region.width() || sub_y >= region.height() {
                        // Skip the pixels out of the film sub-region
                        continue;
                    }

                    let pixel_x = region.x_min + sub_x;
                    let pixel_y = region.y_min + sub_y;

                    if self.adaptive_strength > 0.0 {
                        let engine_film = self.shared.film.clone();
                        if let Some(film) = engine_film {
                            if film.has_channel(FilmChannels::NOISE)
                                && !self.adaptive_keep(&film, pixel_x, pixel_y)
                            {
                                continue;
                            }
                        }
                    }

                    self.pass = self.shared.get_new_pixel_pass(sub_x + sub_y * region.width());
                    (pixel_x, pixel_y)
                }
                None => {
                    self.pass = self.shared.get_new_pixel_pass(0);
                    (0, 0)
                }
            };

            self.sequence.rng_pass = self.rng.uniform_u32();

            self.sample0 = pixel_x as f32 + self.sequence.sample_owen(self.pass, 0);
            self.sample1 = pixel_y as f32 + self.sequence.sample_owen(self.pass, 1);
            break;
        }
    }

    /// Adaptive test: sample the pixel in proportion to how far from
    /// convergence it is. The uniform is always consumed so streams stay in
    /// lockstep whether or not the pixel is skipped.
    fn adaptive_keep(&mut self, film: &Film, pixel_x: u32, pixel_y: u32) -> bool {
        let noise = film.noise_at(pixel_x, pixel_y);

        let threshold = match film.user_importance_at(pixel_x, pixel_y) {
            Some(user_importance) => {
                if noise.is_infinite() {
                    user_importance
                } else if user_importance > 0.0 {
                    lerp(self.adaptive_user_importance_weight, noise, user_importance)
                } else {
                    0.0
                }
            }
            None => noise,
        };

        // The floor of the pixel importance is set by the adaptive strength.
        let threshold = threshold.max(1.0 - self.adaptive_strength);

        self.rng.uniform_f32() <= threshold
    }
}

impl Sampler for SobolSampler {
    fn sampler_type(&self) -> SamplerType {
        SamplerType::Sobol
    }

    fn set_thread_index(&mut self, index: usize) {
        self.thread_index = index;
    }

    fn request_samples(&mut self, sample_type: SampleType, size: u32) {
        self.sample_type = sample_type;
        self.sequence.request_samples(size);
        // Force a fresh bucket claim on the first sample.
        self.pixel_offset = self.bucket_size;
        self.pass_offset = self.super_sampling;
        self.init_new_sample();
    }

    fn get_sample(&mut self, index: u32) -> f32 {
        match index {
            0 => self.sample0,
            1 => self.sample1,
            _ => self.sequence.sample_owen(self.pass, index),
        }
    }

    fn next_sample(&mut self, results: &[SampleResult]) {
        splat_sample_results(
            self.film.as_ref(),
            self.splatter.as_ref(),
            self.thread_index,
            self.sample_type,
            results,
            1.0,
        );
        self.init_new_sample();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_sampler(film: Option<Arc<Film>>, adaptive: f32) -> SobolSampler {
        let shared = Arc::new(SobolSamplerSharedData::new(131, film.clone()));
        let mut sampler = SobolSampler::new(
            Rng::new(1),
            film,
            None,
            true,
            adaptive,
            0.75,
            16,
            16,
            1,
            1,
            shared,
        );
        sampler.request_samples(SampleType::PixelNormalizedOnly, 8);
        sampler
    }

    #[test]
    fn test_samples_cover_sub_region() {
        let mut film = Film::new(8, 8);
        film.init(1);
        let film = Arc::new(film);
        let mut sampler = make_sampler(Some(Arc::clone(&film)), 0.0);

        let mut seen = vec![0u32; 64];
        for _ in 0..256 {
            let x = sampler.get_sample(0) as u32;
            let y = sampler.get_sample(1) as u32;
            assert!(x < 8 && y < 8);
            seen[(y * 8 + x) as usize] += 1;
            sampler.next_sample(&[]);
        }
        // With adaptive off, 256 samples over 64 pixels average 4 per
        // pixel up to bucket quantization.
        let visited = seen.iter().filter(|&&c| c > 0).count();
        assert!(visited >= 56, "only {} pixels visited", visited);
    }

    #[test]
    fn test_determinism_per_seed() {
        let make = || {
            let mut film = Film::new(4, 4);
            film.init(1);
            make_sampler(Some(Arc::new(film)), 0.0)
        };
        let mut a = make();
        let mut b = make();
        for _ in 0..64 {
            for dim in 0..8 {
                assert_eq!(a.get_sample(dim), b.get_sample(dim));
            }
            a.next_sample(&[]);
            b.next_sample(&[]);
        }
    }

    #[test]
    fn test_sample_range() {
        let mut sampler = make_sampler(None, 0.0);
        for _ in 0..128 {
            for dim in 2..8 {
                let v = sampler.get_sample(dim);
                assert!((0.0..1.0).contains(&v));
            }
            sampler.next_sample(&[]);
        }
    }

    #[test]
    fn test_per_pixel_pass_counter() {
        let shared = SobolSamplerSharedData::new(7, None);
        assert_eq!(shared.get_new_pixel_pass(0), SOBOL_START_OFFSET);
        assert_eq!(shared.get_new_pixel_pass(0), SOBOL_START_OFFSET + 1);
        shared.reset();
        assert_eq!(shared.get_new_pixel_pass(0), SOBOL_START_OFFSET);
    }
}
