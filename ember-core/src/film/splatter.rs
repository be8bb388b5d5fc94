//! Sample splatting through the pixel filter footprint.

use crate::film::{Film, Filter, SampleResult};

/// Splats a `SampleResult` onto every pixel the filter footprint covers.
/// Stateless and shared by all workers.
pub struct FilmSampleSplatter {
    filter: Filter,
}

impl FilmSampleSplatter {
    pub fn new(filter: Filter) -> FilmSampleSplatter {
        FilmSampleSplatter { filter }
    }

    pub fn splat(&self, film: &Film, sr: &SampleResult, weight: f32) {
        // Continuous film coordinates; the pixel center sits at +0.5.
        let px = sr.film_x - 0.5;
        let py = sr.film_y - 0.5;
        let radius = self.filter.radius();

        let x0 = (px - radius).ceil().max(0.0) as u32;
        let x1 = ((px + radius).floor() as i64).min(film.width() as i64 - 1);
        let y0 = (py - radius).ceil().max(0.0) as u32;
        let y1 = ((py + radius).floor() as i64).min(film.height() as i64 - 1);
        if x1 < x0 as i64 || y1 < y0 as i64 {
            // Degenerate footprint: land on the nearest pixel.
            let x = (sr.film_x as u32).min(film.width() - 1);
            let y = (sr.film_y as u32).min(film.height() - 1);
            film.add_sample(x, y, sr, weight);
            return;
        }

        for y in y0..=(y1 as u32) {
            for x in x0..=(x1 as u32) {
                let fw = self.filter.evaluate(x as f32 - px, y as f32 - py);
                if fw > 0.0 {
                    film.add_sample(x, y, sr, weight * fw);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::film::FilmChannels;
    use crate::spectrum::Spectrum;

    #[test]
    fn test_box_filter_single_pixel() {
        let mut film = Film::new(4, 4);
        film.init(1);
        let splatter = FilmSampleSplatter::new(Filter::single_pixel());
        let mut sr = SampleResult::new(FilmChannels::RADIANCE_PER_PIXEL_NORMALIZED, 1);
        sr.film_x = 2.5;
        sr.film_y = 2.5;
        sr.radiance[0] = Spectrum::white();
        splatter.splat(&film, &sr, 1.0);

        assert!(film.develop_pixel(2, 2).y() > 0.0);
        assert_eq!(film.develop_pixel(1, 2).y(), 0.0);
        assert_eq!(film.develop_pixel(3, 2).y(), 0.0);
    }

    #[test]
    fn test_gaussian_spreads_but_preserves_mean() {
        let mut film = Film::new(8, 8);
        film.init(1);
        let splatter = FilmSampleSplatter::new(Filter::default_gaussian());
        let mut sr = SampleResult::new(FilmChannels::RADIANCE_PER_PIXEL_NORMALIZED, 1);
        sr.film_x = 4.5;
        sr.film_y = 4.5;
        sr.radiance[0] = Spectrum::grey(2.0);
        splatter.splat(&film, &sr, 1.0);

        // Neighbors receive weight…
        assert!(film.develop_pixel(3, 4).y() > 0.0);
        // …but the weighted mean of any covered pixel stays the sample
        // value, because value and weight use the same filter factor.
        let developed = film.develop_pixel(4, 4);
        assert!((developed.r - 2.0).abs() < 1e-4);
    }
}
