//! Self-intersection epsilon, scaled with the magnitude of the value it
//! protects. Assumes IEEE 754 binary32.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::clamp;
use crate::geometry::Point3f;

pub const DEFAULT_EPSILON_MIN: f32 = 1e-9;
pub const DEFAULT_EPSILON_MAX: f32 = 1e-1;
const EPSILON_DISTANCE_FROM_VALUE: u32 = 0x80;

static MIN_EPSILON: AtomicU32 = AtomicU32::new(0);
static MAX_EPSILON: AtomicU32 = AtomicU32::new(0);

/// Engine-start configuration of the epsilon bounds. Rendering threads only
/// read them, so plain atomic stores are enough.
pub fn set_min(min: f32) {
    MIN_EPSILON.store(min.to_bits(), Ordering::Relaxed);
}

pub fn set_max(max: f32) {
    MAX_EPSILON.store(max.to_bits(), Ordering::Relaxed);
}

pub fn get_min() -> f32 {
    let bits = MIN_EPSILON.load(Ordering::Relaxed);
    if bits == 0 {
        DEFAULT_EPSILON_MIN
    } else {
        f32::from_bits(bits)
    }
}

pub fn get_max() -> f32 {
    let bits = MAX_EPSILON.load(Ordering::Relaxed);
    if bits == 0 {
        DEFAULT_EPSILON_MAX
    } else {
        f32::from_bits(bits)
    }
}

fn float_advance(value: f32) -> f32 {
    f32::from_bits(value.to_bits().wrapping_add(EPSILON_DISTANCE_FROM_VALUE))
}

/// Epsilon for a scalar value: the distance covered by advancing the float
/// representation a fixed number of ulps, clamped to the configured bounds.
pub fn epsilon(value: f32) -> f32 {
    let e = (float_advance(value) - value).abs();
    clamp(e, get_min(), get_max())
}

pub fn epsilon_point(p: &Point3f) -> f32 {
    epsilon(p.x).max(epsilon(p.y)).max(epsilon(p.z))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epsilon_scales_with_magnitude() {
        assert!(epsilon(1.0e6) > epsilon(1.0));
    }

    #[test]
    fn test_epsilon_bounds() {
        assert!(epsilon(0.0) >= DEFAULT_EPSILON_MIN);
        assert!(epsilon(1.0e30) <= DEFAULT_EPSILON_MAX);
    }
}
