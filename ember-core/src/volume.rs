//! Participating media and the per-path stack of nested volumes.

use crate::bsdf::{Bsdf, BsdfEvent};
use crate::spectrum::Spectrum;

/// A homogeneous absorbing medium. Scattering inside media is not modeled;
/// the medium only attenuates rays crossing it.
#[derive(Debug, Clone)]
pub struct Volume {
    pub sigma_a: Spectrum,
    /// Higher priority volumes win when media overlap.
    pub priority: i32,
}

impl Volume {
    pub fn new(sigma_a: Spectrum, priority: i32) -> Volume {
        Volume { sigma_a, priority }
    }

    /// Beam transmittance over a segment of length `dist`.
    pub fn transmittance(&self, dist: f32) -> Spectrum {
        Spectrum::rgb(
            (-self.sigma_a.r * dist).exp(),
            (-self.sigma_a.g * dist).exp(),
            (-self.sigma_a.b * dist).exp(),
        )
    }
}

/// Ordered stack of the volumes a path is currently inside, priority
/// ranked. The stack is copied by value for every ray that must not mutate
/// the path state (shadow rays, connection rays).
#[derive(Debug, Clone, Default)]
pub struct PathVolumeInfo {
    stack: Vec<u32>,
}

impl PathVolumeInfo {
    pub fn new() -> PathVolumeInfo {
        PathVolumeInfo::default()
    }

    /// The active medium: the highest-priority entry, latest added winning
    /// ties.
    pub fn current(&self, volumes: &[Volume]) -> Option<u32> {
        self.stack
            .iter()
            .enumerate()
            .max_by_key(|(pos, &idx)| (volumes[idx as usize].priority, *pos))
            .map(|(_, &idx)| idx)
    }

    pub fn add_volume(&mut self, volume: Option<u32>) {
        if let Some(idx) = volume {
            self.stack.push(idx);
        }
    }

    pub fn remove_volume(&mut self, volume: Option<u32>) {
        if let Some(idx) = volume {
            if let Some(pos) = self.stack.iter().rposition(|&v| v == idx) {
                self.stack.remove(pos);
            }
        }
    }

    /// Advance the stack after a scattering event: a transmission crossing
    /// into the object enters its interior volume, a transmission leaving
    /// exits it.
    pub fn update(&mut self, event: BsdfEvent, bsdf: &Bsdf) {
        if event.contains(BsdfEvent::TRANSMIT) {
            if bsdf.hit_point.into_object {
                self.add_volume(bsdf.hit_point.interior_volume);
            } else {
                self.remove_volume(bsdf.hit_point.interior_volume);
            }
        }
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transmittance() {
        let v = Volume::new(Spectrum::grey(1.0), 0);
        let t = v.transmittance(1.0);
        assert!((t.r - (-1.0f32).exp()).abs() < 1e-6);
        assert_eq!(v.transmittance(0.0), Spectrum::white());
    }

    #[test]
    fn test_priority_ranking() {
        let volumes = vec![
            Volume::new(Spectrum::grey(0.1), 0),
            Volume::new(Spectrum::grey(0.2), 5),
        ];
        let mut info = PathVolumeInfo::new();
        assert_eq!(info.current(&volumes), None);
        info.add_volume(Some(0));
        assert_eq!(info.current(&volumes), Some(0));
        info.add_volume(Some(1));
        assert_eq!(info.current(&volumes), Some(1));
        info.remove_volume(Some(1));
        assert_eq!(info.current(&volumes), Some(0));
    }

    #[test]
    fn test_clone_is_independent() {
        let mut a = PathVolumeInfo::new();
        a.add_volume(Some(3));
        let mut b = a.clone();
        b.remove_volume(Some(3));
        assert_eq!(a.depth(), 1);
        assert_eq!(b.depth(), 0);
    }
}
