//! The baseline sampler: independent uniform values, with round-robin pixel
//! coverage of the film sub-region for dimensions 0/1.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::film::{Film, FilmSampleSplatter, SampleResult};
use crate::rng::Rng;
use crate::sampler::{splat_sample_results, SampleType, Sampler, SamplerType};

pub struct RandomSamplerSharedData {
    pixel_index: AtomicU32,
}

impl RandomSamplerSharedData {
    pub fn new() -> RandomSamplerSharedData {
        RandomSamplerSharedData {
            pixel_index: AtomicU32::new(0),
        }
    }

    pub fn reset(&self) {
        self.pixel_index.store(0, Ordering::Relaxed);
    }

    fn next_pixel(&self, pixel_count: u32) -> u32 {
        self.pixel_index.fetch_add(1, Ordering::Relaxed) % pixel_count
    }
}

impl Default for RandomSamplerSharedData {
    fn default() -> Self {
        RandomSamplerSharedData::new()
    }
}

pub struct RandomSampler {
    rng: Rng,
    film: Option<Arc<Film>>,
    splatter: Option<Arc<FilmSampleSplatter>>,
    shared: Arc<RandomSamplerSharedData>,
    image_samples_enable: bool,
    thread_index: usize,
    sample_type: SampleType,
    sample0: f32,
    sample1: f32,
}

impl RandomSampler {
    pub fn new(
        rng: Rng,
        film: Option<Arc<Film>>,
        splatter: Option<Arc<FilmSampleSplatter>>,
        image_samples_enable: bool,
        shared: Arc<RandomSamplerSharedData>,
    ) -> RandomSampler {
        let mut sampler = RandomSampler {
            rng,
            film,
            splatter,
            shared,
            image_samples_enable,
            thread_index: 0,
            sample_type: SampleType::PixelNormalizedOnly,
            sample0: 0.0,
            sample1: 0.0,
        };
        sampler.init_new_sample();
        sampler
    }

    fn init_new_sample(&mut self) {
        match (&self.film, self.image_samples_enable) {
            (Some(film), true) => {
                let region = film.sub_region();
                let pixel = self.shared.next_pixel(region.pixel_count());
                let x = region.x_min + pixel % region.width();
                let y = region.y_min + pixel / region.width();
                self.sample0 = x as f32 + self.rng.uniform_f32();
                self.sample1 = y as f32 + self.rng.uniform_f32();
            }
            _ => {
                self.sample0 = self.rng.uniform_f32();
                self.sample1 = self.rng.uniform_f32();
            }
        }
    }
}

impl Sampler for RandomSampler {
    fn sampler_type(&self) -> SamplerType {
        SamplerType::Random
    }

    fn set_thread_index(&mut self, index: usize) {
        self.thread_index = index;
    }

    fn request_samples(&mut self, sample_type: SampleType, _size: u32) {
        self.sample_type = sample_type;
        self.init_new_sample();
    }

    fn get_sample(&mut self, index: u32) -> f32 {
        match index {
            0 => self.sample0,
            1 => self.sample1,
            _ => self.rng.uniform_f32(),
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

    #[test]
    fn test_pixel_coverage() {
        let mut film = Film::new(4, 4);
        film.init(1);
        let film = Arc::new(film);
        let shared = Arc::new(RandomSamplerSharedData::new());
        let mut sampler = RandomSampler::new(
            Rng::new(1),
            Some(Arc::clone(&film)),
            None,
            true,
            shared,
        );
        sampler.request_samples(SampleType::PixelNormalizedOnly, 4);

        let mut seen = [false; 16];
        for _ in 0..16 {
            let x = sampler.get_sample(0) as u32;
            let y = sampler.get_sample(1) as u32;
            seen[(y * 4 + x) as usize] = true;
            sampler.next_sample(&[]);
        }
        // Round-robin pixel selection visits every pixel exactly once per
        // 16 samples.
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn test_free_dims_without_image_samples() {
        let mut sampler = RandomSampler::new(
            Rng::new(3),
            None,
            None,
            false,
            Arc::new(RandomSamplerSharedData::new()),
        );
        sampler.request_samples(SampleType::ScreenNormalizedOnly, 8);
        for i in 0..8 {
            let v = sampler.get_sample(i);
            assert!((0.0..1.0).contains(&v));
        }
    }
}
