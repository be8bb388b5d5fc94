use std::fmt;

use crate::epsilon;
use crate::geometry::{Point3f, Vector3f};

/// A ray with a half-open parametric range `[start, end)` and a time in
/// `[0, 1]` for motion blur. `start`/`end` are owned scratch: intersection
/// never mutates a ray shared with another path.
#[derive(Debug, Copy, Clone)]
pub struct Ray {
    pub o: Point3f,
    pub d: Vector3f,
    pub start: f32,
    pub end: f32,
    pub time: f32,
}

impl Ray {
    pub fn new(o: Point3f, d: Vector3f, time: f32) -> Ray {
        debug_assert!(!o.x.is_nan() && !o.y.is_nan() && !o.z.is_nan());
        debug_assert!(!d.has_nan());
        Ray {
            o,
            d,
            start: epsilon::epsilon_point(&o),
            end: f32::INFINITY,
            time,
        }
    }

    /// A ray limited to a segment, for shadow and connection tests.
    pub fn segment(o: Point3f, d: Vector3f, start: f32, end: f32, time: f32) -> Ray {
        debug_assert!(!d.has_nan());
        Ray {
            o,
            d,
            start,
            end,
            time,
        }
    }

    pub fn at(&self, t: f32) -> Point3f {
        self.o + self.d * t
    }

    /// Shrink the parametric range by the machine epsilon of each end point,
    /// protecting against self-intersection on both sides.
    pub fn update_min_max_with_epsilon(&mut self) {
        let e = epsilon::epsilon_point(&self.o);
        self.start += e;
        self.end -= e;
    }

    /// Move the origin along the direction; used when restarting a ray past
    /// a pass-through hit.
    pub fn update(&mut self, o: Point3f, d: Vector3f) {
        self.o = o;
        self.d = d;
        self.start = epsilon::epsilon_point(&o);
        self.end = f32::INFINITY;
    }
}

impl fmt::Display for Ray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[o={}, d={}, range=[{}, {}), time={}]",
            self.o, self.d, self.start, self.end, self.time
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_at() {
        let r = Ray::new(
            Point3f::new(1.0, 0.0, 0.0),
            Vector3f::new(0.0, 1.0, 0.0),
            0.0,
        );
        assert_eq!(r.at(2.0), Point3f::new(1.0, 2.0, 0.0));
    }

    #[test]
    fn test_epsilon_range() {
        let mut r = Ray::segment(
            Point3f::new(0.0, 0.0, 0.0),
            Vector3f::new(0.0, 0.0, 1.0),
            0.0,
            10.0,
            0.0,
        );
        r.update_min_max_with_epsilon();
        assert!(r.start > 0.0);
        assert!(r.end < 10.0);
    }
}
