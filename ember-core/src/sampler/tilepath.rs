//! Tile-driven sampler: one sample per (tile pixel, AA sub-sample, pass),
//! reseeded per pixel so restarting a tile reproduces the same samples.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::film::{Film, FilmSampleSplatter, SampleResult};
use crate::rng::Rng;
use crate::sampler::{splat_sample_results, SampleType, Sampler, SamplerType};

/// A unit of tiled work handed out by the tile repository.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileWork {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub pass_index: u32,
    pub multipass_index: u32,
}

fn pixel_seed(x: u32, y: u32, pass: u32) -> u64 {
    let mix = (u64::from(x).wrapping_mul(0x9e37_79b9))
        ^ (u64::from(y).wrapping_mul(0x85eb_ca6b))
        ^ (u64::from(pass).wrapping_mul(0xc2b2_ae35));
    mix | 1
}

pub struct TilePathSampler {
    film: Option<Arc<Film>>,
    splatter: Option<Arc<FilmSampleSplatter>>,
    rng: Rng,
    aa_size: u32,

    tile: Option<TileWork>,
    px: u32,
    py: u32,
    aa_pass: u32,

    thread_index: usize,
    sample_type: SampleType,
    sample0: f32,
    sample1: f32,
}

impl TilePathSampler {
    pub fn new(
        film: Option<Arc<Film>>,
        splatter: Option<Arc<FilmSampleSplatter>>,
        aa_size: u32,
    ) -> TilePathSampler {
        TilePathSampler {
            film,
            splatter,
            rng: Rng::new(1),
            aa_size: aa_size.max(1),
            tile: None,
            px: 0,
            py: 0,
            aa_pass: 0,
            thread_index: 0,
            sample_type: SampleType::PixelNormalizedOnly,
            sample0: 0.0,
            sample1: 0.0,
        }
    }

    pub fn aa_samples(&self) -> u32 {
        self.aa_size * self.aa_size
    }

    /// Bind the sampler to a tile; restarting the same tile replays the
    /// identical sample stream.
    pub fn set_tile(&mut self, tile: TileWork) {
        self.tile = Some(tile);
        self.px = 0;
        self.py = 0;
        self.aa_pass = 0;
        self.init_pixel();
    }

    pub fn tile_done(&self) -> bool {
        match self.tile {
            None => true,
            Some(_) => self.aa_pass >= self.aa_samples(),
        }
    }

    fn init_pixel(&mut self) {
        if let Some(tile) = self.tile {
            let gx = tile.x + self.px;
            let gy = tile.y + self.py;
            let pass_value = tile.multipass_index * self.aa_samples() + self.aa_pass;
            self.rng.set_sequence(pixel_seed(gx, gy, pass_value));

            let aa_x = self.aa_pass % self.aa_size;
            let aa_y = self.aa_pass / self.aa_size;
            self.sample0 =
                gx as f32 + (aa_x as f32 + self.rng.uniform_f32()) / self.aa_size as f32;
            self.sample1 =
                gy as f32 + (aa_y as f32 + self.rng.uniform_f32()) / self.aa_size as f32;
        }
    }

    fn advance(&mut self) {
        if let Some(tile) = self.tile {
            self.px += 1;
            if self.px >= tile.width {
                self.px = 0;
                self.py += 1;
                if self.py >= tile.height {
                    self.py = 0;
                    self.aa_pass += 1;
                }
            }
            if !self.tile_done() {
                self.init_pixel();
            }
        }
    }
}

impl Sampler for TilePathSampler {
    fn sampler_type(&self) -> SamplerType {
        SamplerType::TilePath
    }

    fn set_thread_index(&mut self, index: usize) {
        self.thread_index = index;
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
        splat_sample_results(
            self.film.as_ref(),
            self.splatter.as_ref(),
            self.thread_index,
            self.sample_type,
            results,
            1.0,
        );
        self.advance();
    }
}
