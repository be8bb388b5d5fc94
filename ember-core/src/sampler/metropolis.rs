//! Metropolis sampler: large/small mutations over the sample vector with
//! Kelemen-style reweighting of accepted and rejected proposals.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::film::{Film, FilmSampleSplatter, SampleResult};
use crate::rng::Rng;
use crate::sampler::{splat_sample_results, SampleType, Sampler, SamplerType};

/// Shared mean-intensity estimate; large-step samples feed it so the
/// per-sample weights are normalized consistently across workers.
pub struct MetropolisSamplerSharedData {
    totals: Mutex<(f64, u64)>,
}

impl MetropolisSamplerSharedData {
    pub fn new() -> MetropolisSamplerSharedData {
        MetropolisSamplerSharedData {
            totals: Mutex::new((0.0, 0)),
        }
    }

    pub fn reset(&self) {
        *self.totals.lock() = (0.0, 0);
    }

    fn add_large_step(&self, luminance: f64) {
        let mut totals = self.totals.lock();
        totals.0 += luminance;
        totals.1 += 1;
    }

    fn mean_intensity(&self) -> f32 {
        let totals = self.totals.lock();
        if totals.1 > 0 && totals.0 > 0.0 {
            (totals.0 / totals.1 as f64) as f32
        } else {
            1.0
        }
    }
}

impl Default for MetropolisSamplerSharedData {
    fn default() -> Self {
        MetropolisSamplerSharedData::new()
    }
}

/// Power-law mutation of a single coordinate with wrap-around.
fn mutate(x: f32, random_value: f32) -> f32 {
    const S1: f32 = 1.0 / 512.0;
    const S2: f32 = 1.0 / 16.0;

    let dx = S1 / (S1 / S2 + (2.0 * random_value - 1.0).abs()) - S1 / (S1 / S2 + 1.0);
    let mutated = if random_value < 0.5 {
        let v = x + dx;
        if v < 1.0 {
            v
        } else {
            v - 1.0
        }
    } else {
        let v = x - dx;
        if v < 0.0 {
            v + 1.0
        } else {
            v
        }
    };
    mutated.min(crate::ONE_MINUS_EPSILON).max(0.0)
}

/// Mutation restricted to a maximum range, for the image-plane dimensions.
/// The step length is log-uniform between `range` and `range / 64`.
fn mutate_scaled(x: f32, range: f32, random_value: f32) -> f32 {
    const S1: f32 = 64.0;

    let a = (2.0 * random_value - 1.0).abs();
    let dx = range * (-(S1.ln()) * a).exp();
    let mutated = if random_value < 0.5 {
        let v = x + dx;
        if v < 1.0 {
            v
        } else {
            v - 1.0
        }
    } else {
        let v = x - dx;
        if v < 0.0 {
            v + 1.0
        } else {
            v
        }
    };
    mutated.min(crate::ONE_MINUS_EPSILON).max(0.0)
}

pub struct MetropolisSampler {
    rng: Rng,
    film: Option<Arc<Film>>,
    splatter: Option<Arc<FilmSampleSplatter>>,
    shared: Arc<MetropolisSamplerSharedData>,
    image_samples_enable: bool,

    large_mutation_probability: f32,
    image_mutation_range: f32,
    max_rejects: u32,

    thread_index: usize,
    sample_type: SampleType,

    current_samples: Vec<f32>,
    candidate_samples: Vec<f32>,
    current_results: Vec<SampleResult>,
    current_luminance: f32,
    current_weight: f32,
    consecutive_rejects: u32,
    is_large_mutation: bool,
}

impl MetropolisSampler {
    pub fn new(
        rng: Rng,
        film: Option<Arc<Film>>,
        splatter: Option<Arc<FilmSampleSplatter>>,
        image_samples_enable: bool,
        large_mutation_probability: f32,
        image_mutation_range: f32,
        max_rejects: u32,
        shared: Arc<MetropolisSamplerSharedData>,
    ) -> MetropolisSampler {
        MetropolisSampler {
            rng,
            film,
            splatter,
            shared,
            image_samples_enable,
            large_mutation_probability,
            image_mutation_range,
            max_rejects,
            thread_index: 0,
            sample_type: SampleType::ScreenNormalizedOnly,
            current_samples: Vec::new(),
            candidate_samples: Vec::new(),
            current_results: Vec::new(),
            current_luminance: 0.0,
            current_weight: 0.0,
            consecutive_rejects: 0,
            is_large_mutation: true,
        }
    }

    fn mutate_all(&mut self) {
        if self.is_large_mutation {
            for sample in &mut self.candidate_samples {
                *sample = self.rng.uniform_f32();
            }
        } else {
            for (index, sample) in self.candidate_samples.iter_mut().enumerate() {
                let u = self.rng.uniform_f32();
                let image_dim = self.image_samples_enable && index < 2;
                *sample = if image_dim {
                    mutate_scaled(self.current_samples[index], self.image_mutation_range, u)
                } else {
                    mutate(self.current_samples[index], u)
                };
            }
        }
    }

    /// Map normalized dimension 0/1 onto the film sub-region.
    fn map_image_sample(&self, index: u32, value: f32) -> f32 {
        match (&self.film, self.image_samples_enable) {
            (Some(film), true) if index < 2 => {
                let region = film.sub_region();
                if index == 0 {
                    region.x_min as f32 + value * region.width() as f32
                } else {
                    region.y_min as f32 + value * region.height() as f32
                }
            }
            _ => value,
        }
    }
}

impl Sampler for MetropolisSampler {
    fn sampler_type(&self) -> SamplerType {
        SamplerType::Metropolis
    }

    fn set_thread_index(&mut self, index: usize) {
        self.thread_index = index;
    }

    fn request_samples(&mut self, sample_type: SampleType, size: u32) {
        self.sample_type = sample_type;
        self.current_samples = vec![0.0; size as usize];
        self.candidate_samples = vec![0.0; size as usize];
        self.is_large_mutation = true;
        self.mutate_all();
    }

    fn get_sample(&mut self, index: u32) -> f32 {
        let value = self.candidate_samples[index as usize];
        self.map_image_sample(index, value)
    }

    fn next_sample(&mut self, results: &[SampleResult]) {
        let candidate_luminance: f32 = results.iter().map(SampleResult::radiance_y).sum();

        if self.is_large_mutation {
            self.shared.add_large_step(f64::from(candidate_luminance));
        }
        let mean_intensity = self.shared.mean_intensity();

        let accept_probability =
            if self.current_luminance > 0.0 && self.consecutive_rejects < self.max_rejects {
                (candidate_luminance / self.current_luminance).min(1.0)
            } else {
                1.0
            };
        let candidate_weight =
            accept_probability + if self.is_large_mutation { 1.0 } else { 0.0 };
        self.current_weight += 1.0 - accept_probability;

        let accepted =
            accept_probability == 1.0 || self.rng.uniform_f32() < accept_probability;
        if accepted {
            // Flush the accumulated weight of the outgoing sample, then
            // promote the candidate.
            let norm = self.current_weight
                / (self.current_luminance / mean_intensity + self.large_mutation_probability);
            if norm > 0.0 && !self.current_results.is_empty() {
                splat_sample_results(
                    self.film.as_ref(),
                    self.splatter.as_ref(),
                    self.thread_index,
                    self.sample_type,
                    &self.current_results,
                    norm,
                );
            }
            self.current_results = results.to_vec();
            self.current_luminance = candidate_luminance;
            std::mem::swap(&mut self.current_samples, &mut self.candidate_samples);
            self.current_weight = candidate_weight;
            self.consecutive_rejects = 0;
        } else {
            // Splat the rejected candidate with its residual weight.
            let norm = candidate_weight
                / (candidate_luminance / mean_intensity + self.large_mutation_probability);
            if norm > 0.0 {
                splat_sample_results(
                    self.film.as_ref(),
                    self.splatter.as_ref(),
                    self.thread_index,
                    self.sample_type,
                    results,
                    norm,
                );
            }
            self.consecutive_rejects += 1;
        }

        self.is_large_mutation = self.rng.uniform_f32() < self.large_mutation_probability;
        self.mutate_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::film::FilmChannels;

    fn result_with_luminance(y: f32) -> SampleResult {
        let mut sr = SampleResult::new(FilmChannels::RADIANCE_PER_SCREEN_NORMALIZED, 1);
        sr.radiance[0] = crate::Spectrum::grey(y);
        sr
    }

    fn make_sampler(max_rejects: u32) -> MetropolisSampler {
        let mut sampler = MetropolisSampler::new(
            Rng::new(11),
            None,
            None,
            false,
            0.4,
            0.1,
            max_rejects,
            Arc::new(MetropolisSamplerSharedData::new()),
        );
        sampler.request_samples(SampleType::ScreenNormalizedOnly, 6);
        sampler
    }

    #[test]
    fn test_mutate_stays_in_unit_interval() {
        for i in 0..256 {
            let u = i as f32 / 256.0;
            let v = mutate(0.9, u);
            assert!((0.0..1.0).contains(&v), "{}", v);
            let w = mutate_scaled(0.1, 0.2, u);
            assert!((0.0..1.0).contains(&w), "{}", w);
        }
    }

    #[test]
    fn test_zero_luminance_always_accepts() {
        let mut sampler = make_sampler(128);
        // The very first proposal is accepted unconditionally.
        sampler.next_sample(&[result_with_luminance(0.5)]);
        assert_eq!(sampler.consecutive_rejects, 0);
        assert!((sampler.current_luminance - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_reject_cap_forces_acceptance() {
        let mut sampler = make_sampler(2);
        sampler.next_sample(&[result_with_luminance(100.0)]);
        // Dark proposals get rejected, but never more than max_rejects in
        // a row.
        let mut worst_streak = 0u32;
        for _ in 0..64 {
            sampler.next_sample(&[result_with_luminance(1e-6)]);
            worst_streak = worst_streak.max(sampler.consecutive_rejects);
        }
        assert!(worst_streak <= 2);
    }

    #[test]
    fn test_samples_valid_after_many_mutations() {
        let mut sampler = make_sampler(16);
        for round in 0..128 {
            for dim in 0..6 {
                let v = sampler.get_sample(dim);
                assert!((0.0..1.0).contains(&v), "round {} dim {}: {}", round, dim, v);
            }
            sampler.next_sample(&[result_with_luminance(1.0)]);
        }
    }
}
