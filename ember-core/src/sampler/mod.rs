//! The sampler family: maps `(pixel, pass, dimension)` to `[0,1)` samples
//! and commits finished path contributions to the film.

use std::sync::Arc;

use crate::error::{RenderError, Result};
use crate::film::{Film, FilmSampleSplatter, SampleResult};

mod metropolis;
mod random;
mod rtpath;
mod sobol;
mod sobol_sequence;
mod tilepath;

pub use self::metropolis::{MetropolisSampler, MetropolisSamplerSharedData};
pub use self::random::{RandomSampler, RandomSamplerSharedData};
pub use self::rtpath::{RtPathSampler, RtPathSamplerSharedData};
pub use self::sobol::{SobolSampler, SobolSamplerSharedData};
pub use self::sobol_sequence::{
    generate_direction_vectors, SobolSequence, SOBOL_BITS, SOBOL_MAX_DIMENSIONS,
    SOBOL_START_OFFSET,
};
pub use self::tilepath::{TilePathSampler, TileWork};

/// Which film accumulator the sample results of a sampler target.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SampleType {
    PixelNormalizedOnly,
    ScreenNormalizedOnly,
    PixelNormalizedAndScreenNormalized,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SamplerType {
    Random,
    Sobol,
    Metropolis,
    TilePath,
    RtPath,
}

impl SamplerType {
    pub fn parse(tag: &str) -> Result<SamplerType> {
        match tag {
            "RANDOM" => Ok(SamplerType::Random),
            "SOBOL" => Ok(SamplerType::Sobol),
            "METROPOLIS" => Ok(SamplerType::Metropolis),
            "TILEPATHSAMPLER" => Ok(SamplerType::TilePath),
            "RTPATHCPUSAMPLER" => Ok(SamplerType::RtPath),
            other => Err(RenderError::config(
                "sampler.type",
                format!("unknown sampler type {:?}", other),
            )),
        }
    }
}

/// Per-path sample source. Dimensions 0 and 1 are the image-plane
/// coordinates when image samples are enabled.
pub trait Sampler: Send {
    fn sampler_type(&self) -> SamplerType;

    /// Associate with a worker thread; drives per-thread film counters.
    fn set_thread_index(&mut self, index: usize);

    /// Declare the accumulator target and how many dimensions each path
    /// consumes.
    fn request_samples(&mut self, sample_type: SampleType, size: u32);

    fn get_sample(&mut self, index: u32) -> f32;

    /// Commit a finished path: splat the results and advance to the next
    /// sample.
    fn next_sample(&mut self, results: &[SampleResult]);
}

/// Shared splat path used by all samplers: bump the sample counters, then
/// atomically add every result to the film.
pub(crate) fn splat_sample_results(
    film: Option<&Arc<Film>>,
    splatter: Option<&Arc<FilmSampleSplatter>>,
    thread_index: usize,
    sample_type: SampleType,
    results: &[SampleResult],
    weight: f32,
) {
    let film = match film {
        Some(f) => f,
        None => return,
    };
    let (pixel, screen) = match sample_type {
        SampleType::PixelNormalizedOnly => (1, 0),
        SampleType::ScreenNormalizedOnly => (0, 1),
        SampleType::PixelNormalizedAndScreenNormalized => (1, 1),
    };
    film.add_sample_count(thread_index, pixel, screen);

    for sr in results {
        if let Some(splatter) = splatter {
            splatter.splat(film, sr, weight);
        } else {
            let x = (sr.film_x as u32).min(film.width() - 1);
            let y = (sr.film_y as u32).min(film.height() - 1);
            film.add_sample(x, y, sr, weight);
        }
    }
}
