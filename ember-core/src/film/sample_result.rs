use bitflags::bitflags;

use crate::bsdf::BsdfEvent;
use crate::geometry::{Normal3f, Point2f};
use crate::spectrum::Spectrum;

bitflags! {
    pub struct FilmChannels: u32 {
        const RADIANCE_PER_PIXEL_NORMALIZED  = 1;
        const RADIANCE_PER_SCREEN_NORMALIZED = 1 << 1;
        const ALPHA                          = 1 << 2;
        const DEPTH                          = 1 << 3;
        const SHADING_NORMAL                 = 1 << 4;
        const ALBEDO                         = 1 << 5;
        const MATERIAL_ID                    = 1 << 6;
        const OBJECT_ID                      = 1 << 7;
        const UV                             = 1 << 8;
        const NOISE                          = 1 << 9;
        const USER_IMPORTANCE                = 1 << 10;
    }
}

/// One path's contribution to the film, as handed from the tracer to the
/// sampler. `film_x`/`film_y` are fractional; the splatter interprets the
/// fraction through the pixel filter.
#[derive(Debug, Clone)]
pub struct SampleResult {
    pub film_x: f32,
    pub film_y: f32,
    pub channels: FilmChannels,
    /// Radiance per light group.
    pub radiance: Vec<Spectrum>,
    pub alpha: f32,
    pub depth: f32,
    pub albedo: Spectrum,
    pub shading_normal: Normal3f,
    pub material_id: u32,
    pub object_id: u32,
    pub uv: Point2f,
    pub first_path_vertex: bool,
    pub last_path_vertex: bool,
    pub first_path_vertex_event: BsdfEvent,
}

impl SampleResult {
    pub fn new(channels: FilmChannels, radiance_group_count: u32) -> SampleResult {
        SampleResult {
            film_x: 0.0,
            film_y: 0.0,
            channels,
            radiance: vec![Spectrum::black(); radiance_group_count as usize],
            alpha: 1.0,
            depth: f32::INFINITY,
            albedo: Spectrum::black(),
            shading_normal: Normal3f::zero(),
            material_id: 0,
            object_id: 0,
            uv: Point2f::new(f32::INFINITY, f32::INFINITY),
            first_path_vertex: true,
            last_path_vertex: false,
            first_path_vertex_event: BsdfEvent::NONE,
        }
    }

    pub fn has_channel(&self, channel: FilmChannels) -> bool {
        self.channels.contains(channel)
    }

    pub fn add_radiance(&mut self, group: u32, value: Spectrum) {
        let index = (group as usize).min(self.radiance.len() - 1);
        self.radiance[index] += value;
    }

    pub fn radiance_y(&self) -> f32 {
        self.radiance.iter().map(Spectrum::y).sum()
    }

    pub fn is_valid(&self) -> bool {
        self.radiance.iter().all(Spectrum::is_valid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_clamping() {
        let mut sr = SampleResult::new(FilmChannels::RADIANCE_PER_PIXEL_NORMALIZED, 2);
        // Out-of-range groups accumulate into the last one instead of
        // panicking.
        sr.add_radiance(7, Spectrum::white());
        assert_eq!(sr.radiance[1], Spectrum::white());
    }

    #[test]
    fn test_validity() {
        let mut sr = SampleResult::new(FilmChannels::RADIANCE_PER_PIXEL_NORMALIZED, 1);
        assert!(sr.is_valid());
        sr.radiance[0] = Spectrum::rgb(f32::NAN, 0.0, 0.0);
        assert!(!sr.is_valid());
    }
}
