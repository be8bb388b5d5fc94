//! Firefly suppression: clamp how far a single sample may move a pixel from
//! its accumulated mean. Trades a small bias for much lower variance.

use crate::film::{Film, FilmChannels, SampleResult};
use crate::spectrum::Spectrum;

#[derive(Debug, Copy, Clone)]
pub struct VarianceClamping {
    sqrt_max_value: f32,
}

impl VarianceClamping {
    pub fn new(sqrt_max_value: f32) -> VarianceClamping {
        VarianceClamping { sqrt_max_value }
    }

    pub fn has_clamping(&self) -> bool {
        self.sqrt_max_value > 0.0
    }

    /// Clamp each radiance group of a completed sample against the pixel's
    /// current running mean.
    pub fn clamp(&self, film: &Film, sample_result: &mut SampleResult) {
        if !self.has_clamping()
            || !sample_result.has_channel(FilmChannels::RADIANCE_PER_PIXEL_NORMALIZED)
        {
            return;
        }
        let x = sample_result.film_x as u32;
        let y = sample_result.film_y as u32;
        let mean = film
            .pixel_radiance_mean(x.min(film.width() - 1), y.min(film.height() - 1))
            .unwrap_or_else(Spectrum::black);

        let delta = self.sqrt_max_value;
        for radiance in &mut sample_result.radiance {
            radiance.r = crate::clamp(radiance.r, (mean.r - delta).max(0.0), mean.r + delta);
            radiance.g = crate::clamp(radiance.g, (mean.g - delta).max(0.0), mean.g + delta);
            radiance.b = crate::clamp(radiance.b, (mean.b - delta).max(0.0), mean.b + delta);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn film_with_mean(mean: f32) -> Film {
        let mut film = Film::new(2, 2);
        film.init(1);
        let mut sr = SampleResult::new(FilmChannels::RADIANCE_PER_PIXEL_NORMALIZED, 1);
        sr.radiance[0] = Spectrum::grey(mean);
        film.add_sample(0, 0, &sr, 1.0);
        film
    }

    fn firefly() -> SampleResult {
        let mut sr = SampleResult::new(FilmChannels::RADIANCE_PER_PIXEL_NORMALIZED, 1);
        sr.film_x = 0.5;
        sr.film_y = 0.5;
        sr.radiance[0] = Spectrum::grey(100.0);
        sr
    }

    #[test]
    fn test_firefly_is_clamped() {
        let film = film_with_mean(1.0);
        let clamping = VarianceClamping::new(2.0);
        let mut sr = firefly();
        clamping.clamp(&film, &mut sr);
        assert!((sr.radiance[0].r - 3.0).abs() < 1e-5);
    }

    #[test]
    fn test_clamping_is_idempotent() {
        let film = film_with_mean(1.0);
        let clamping = VarianceClamping::new(2.0);
        let mut once = firefly();
        clamping.clamp(&film, &mut once);
        let mut twice = once.clone();
        clamping.clamp(&film, &mut twice);
        assert_eq!(once.radiance[0], twice.radiance[0]);
    }

    #[test]
    fn test_disabled_clamping_is_identity() {
        let film = film_with_mean(1.0);
        let clamping = VarianceClamping::new(0.0);
        let mut sr = firefly();
        clamping.clamp(&film, &mut sr);
        assert_eq!(sr.radiance[0], Spectrum::grey(100.0));
    }
}
