//! Interactive preview sampler. The first frame visits a coarse zoom grid
//! and paints whole pixel blocks so tone mapping has full coverage from the
//! very first pass; later frames refine pixel by pixel along a randomized
//! visit sequence.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::film::{Film, FilmSampleSplatter, SampleResult};
use crate::rng::Rng;
use crate::sampler::{splat_sample_results, SampleType, Sampler, SamplerType};

pub struct RtPathSamplerSharedData {
    /// Randomized permutation of the sub-region pixel indices.
    pixel_sequence: Vec<u32>,
    worker_count: usize,
    workers_first_frame_done: AtomicUsize,
}

impl RtPathSamplerSharedData {
    pub fn new(film: &Film, worker_count: usize, seed: u32) -> RtPathSamplerSharedData {
        let pixel_count = film.sub_region().pixel_count();
        let mut pixel_sequence: Vec<u32> = (0..pixel_count).collect();
        let mut rng = Rng::new(u64::from(seed) | 1);
        // Fisher-Yates
        for i in (1..pixel_sequence.len()).rev() {
            let j = rng.uniform_u32_bounded(i as u32 + 1) as usize;
            pixel_sequence.swap(i, j);
        }
        RtPathSamplerSharedData {
            pixel_sequence,
            worker_count: worker_count.max(1),
            workers_first_frame_done: AtomicUsize::new(0),
        }
    }

    fn signal_first_frame_done(&self) {
        self.workers_first_frame_done.fetch_add(1, Ordering::Relaxed);
    }

    /// True once every worker painted its share of the zoom-phase frame.
    pub fn all_first_frames_done(&self) -> bool {
        self.workers_first_frame_done.load(Ordering::Relaxed) >= self.worker_count
    }

    pub fn reset(&self) {
        self.workers_first_frame_done.store(0, Ordering::Relaxed);
    }
}

enum Phase {
    /// Coarse grid; `index` walks this worker's stripe of grid cells.
    Zoom { index: usize },
    /// Fine refinement along the randomized sequence.
    Fine { index: usize },
}

pub struct RtPathSampler {
    rng: Rng,
    film: Option<Arc<Film>>,
    splatter: Option<Arc<FilmSampleSplatter>>,
    shared: Arc<RtPathSamplerSharedData>,
    zoom_factor: u32,
    zoom_weight: f32,

    thread_index: usize,
    sample_type: SampleType,
    phase: Phase,
    pixel_x: u32,
    pixel_y: u32,
    sample0: f32,
    sample1: f32,
}

impl RtPathSampler {
    pub fn new(
        rng: Rng,
        film: Option<Arc<Film>>,
        splatter: Option<Arc<FilmSampleSplatter>>,
        zoom_factor: u32,
        zoom_weight: f32,
        shared: Arc<RtPathSamplerSharedData>,
    ) -> RtPathSampler {
        let mut sampler = RtPathSampler {
            rng,
            film,
            splatter,
            shared,
            zoom_factor: zoom_factor.max(1),
            zoom_weight,
            thread_index: 0,
            sample_type: SampleType::PixelNormalizedOnly,
            phase: Phase::Zoom { index: 0 },
            pixel_x: 0,
            pixel_y: 0,
            sample0: 0.0,
            sample1: 0.0,
        };
        sampler.place_on_current_pixel();
        sampler
    }

    fn grid_cells(&self) -> (u32, u32) {
        let film = self.film.as_ref().expect("rtpath sampler requires a film");
        let region = film.sub_region();
        (
            (region.width() + self.zoom_factor - 1) / self.zoom_factor,
            (region.height() + self.zoom_factor - 1) / self.zoom_factor,
        )
    }

    fn place_on_current_pixel(&mut self) {
        let film = match &self.film {
            Some(f) => Arc::clone(f),
            None => return,
        };
        let region = film.sub_region();
        match self.phase {
            Phase::Zoom { index } => {
                let (gw, gh) = self.grid_cells();
                let cell_count = (gw * gh) as usize;
                let stripe_index =
                    self.thread_index + index * self.shared.worker_count;
                if stripe_index >= cell_count {
                    // This worker's share of the zoom frame is finished.
                    self.shared.signal_first_frame_done();
                    self.phase = Phase::Fine { index: 0 };
                    self.place_on_current_pixel();
                    return;
                }
                let cell = stripe_index as u32;
                self.pixel_x = region.x_min + (cell % gw) * self.zoom_factor;
                self.pixel_y = region.y_min + (cell / gw) * self.zoom_factor;
            }
            Phase::Fine { index } => {
                let stripe_index =
                    (self.thread_index + index * self.shared.worker_count)
                        % self.shared.pixel_sequence.len();
                let pixel = self.shared.pixel_sequence[stripe_index];
                self.pixel_x = region.x_min + pixel % region.width();
                self.pixel_y = region.y_min + pixel / region.width();
            }
        }
        self.sample0 = self.pixel_x as f32 + self.rng.uniform_f32();
        self.sample1 = self.pixel_y as f32 + self.rng.uniform_f32();
    }

    fn advance(&mut self) {
        match &mut self.phase {
            Phase::Zoom { index } => *index += 1,
            Phase::Fine { index } => *index += 1,
        }
        self.place_on_current_pixel();
    }

    pub fn in_zoom_phase(&self) -> bool {
        matches!(self.phase, Phase::Zoom { .. })
    }
}

impl Sampler for RtPathSampler {
    fn sampler_type(&self) -> SamplerType {
        SamplerType::RtPath
    }

    fn set_thread_index(&mut self, index: usize) {
        self.thread_index = index;
        self.phase = Phase::Zoom { index: 0 };
        self.place_on_current_pixel();
    }

    fn request_samples(&mut self, sample_type: SampleType, _size: u32) {
        self.sample_type = sample_type;
    }

    fn get_sample(&mut self, index: u32) -> f32 {
        match index {
            0 => self.sample0,
            1 => self.sample1,
            _ => self.rng.uniform_f32(),
        }
    }

    fn next_sample(&mut self, results: &[SampleResult]) {
        match (&self.phase, &self.film) {
            (Phase::Zoom { .. }, Some(film)) => {
                // Replicate the sample into the whole zoom block with a
                // fake weight so the preview has no holes.
                let region = film.sub_region();
                film.add_sample_count(self.thread_index, 1, 0);
                for sr in results {
                    for by in 0..self.zoom_factor {
                        for bx in 0..self.zoom_factor {
                            let x = self.pixel_x + bx;
                            let y = self.pixel_y + by;
                            if region.contains(x, y) {
                                film.add_sample(x, y, sr, self.zoom_weight);
                            }
                        }
                    }
                }
            }
            _ => {
                splat_sample_results(
                    self.film.as_ref(),
                    self.splatter.as_ref(),
                    self.thread_index,
                    self.sample_type,
                    results,
                    1.0,
                );
            }
        }
        self.advance();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::film::FilmChannels;
    use crate::spectrum::Spectrum;

    fn white_sample(x: f32, y: f32) -> SampleResult {
        let mut sr = SampleResult::new(FilmChannels::RADIANCE_PER_PIXEL_NORMALIZED, 1);
        sr.film_x = x;
        sr.film_y = y;
        sr.radiance[0] = Spectrum::white();
        sr
    }

    #[test]
    fn test_zoom_frame_covers_every_pixel() {
        let mut film = Film::new(16, 16);
        film.init(1);
        let film = Arc::new(film);
        let shared = Arc::new(RtPathSamplerSharedData::new(&film, 1, 7));
        let mut sampler = RtPathSampler::new(
            Rng::new(3),
            Some(Arc::clone(&film)),
            None,
            4,
            0.25,
            Arc::clone(&shared),
        );
        sampler.request_samples(SampleType::PixelNormalizedOnly, 4);

        while sampler.in_zoom_phase() {
            let sr = white_sample(sampler.get_sample(0), sampler.get_sample(1));
            sampler.next_sample(&[sr]);
        }
        assert!(shared.all_first_frames_done());
        // 100% coverage: every pixel got the replicated block splat.
        for y in 0..16 {
            for x in 0..16 {
                assert!(film.develop_pixel(x, y).y() > 0.0, "hole at {},{}", x, y);
            }
        }
        // 16 grid cells for a 16x16 film at zoom 4.
        assert_eq!(film.total_eye_sample_count(), 16);
    }

    #[test]
    fn test_fine_phase_single_pixel() {
        let mut film = Film::new(8, 8);
        film.init(1);
        let film = Arc::new(film);
        let shared = Arc::new(RtPathSamplerSharedData::new(&film, 1, 7));
        let mut sampler = RtPathSampler::new(
            Rng::new(3),
            Some(Arc::clone(&film)),
            None,
            4,
            0.25,
            shared,
        );
        sampler.request_samples(SampleType::PixelNormalizedOnly, 4);
        while sampler.in_zoom_phase() {
            let sr = white_sample(sampler.get_sample(0), sampler.get_sample(1));
            sampler.next_sample(&[sr]);
        }
        // Second frame: samples visit individual pixels.
        let mut seen = std::collections::HashSet::new();
        for _ in 0..64 {
            let x = sampler.get_sample(0) as u32;
            let y = sampler.get_sample(1) as u32;
            seen.insert((x, y));
            let sr = white_sample(x as f32 + 0.5, y as f32 + 0.5);
            sampler.next_sample(&[sr]);
        }
        // A full fine pass visits all 64 pixels once.
        assert_eq!(seen.len(), 64);
    }
}
