use std::fmt;
use std::ops::{Add, AddAssign, Div, DivAssign, Index, Mul, MulAssign, Sub};

use serde::{Deserialize, Serialize};

use crate::clamp;

/// A linear RGB radiance value.
#[derive(Debug, Copy, PartialEq, Clone, Default, Serialize, Deserialize)]
pub struct Spectrum {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Spectrum {
    pub fn rgb(r: f32, g: f32, b: f32) -> Spectrum {
        Spectrum { r, g, b }
    }

    /// An RGB spectrum where all the components have the same value.
    pub fn grey(v: f32) -> Spectrum {
        Spectrum { r: v, g: v, b: v }
    }

    pub fn white() -> Spectrum {
        Spectrum::grey(1.0)
    }

    pub fn black() -> Spectrum {
        Spectrum::grey(0.0)
    }

    /// CIE luminance of the linear RGB value.
    pub fn y(&self) -> f32 {
        0.212_671 * self.r + 0.715_160 * self.g + 0.072_169 * self.b
    }

    pub fn is_black(&self) -> bool {
        self.r == 0.0 && self.g == 0.0 && self.b == 0.0
    }

    pub fn has_nan(&self) -> bool {
        self.r.is_nan() || self.g.is_nan() || self.b.is_nan()
    }

    pub fn has_inf(&self) -> bool {
        self.r.is_infinite() || self.g.is_infinite() || self.b.is_infinite()
    }

    /// Finite and non-negative in every component.
    pub fn is_valid(&self) -> bool {
        !self.has_nan() && !self.has_inf() && self.r >= 0.0 && self.g >= 0.0 && self.b >= 0.0
    }

    pub fn max_component_value(&self) -> f32 {
        self.r.max(self.g).max(self.b)
    }

    pub fn clamp(&self, low: f32, high: f32) -> Spectrum {
        Spectrum::rgb(
            clamp(self.r, low, high),
            clamp(self.g, low, high),
            clamp(self.b, low, high),
        )
    }

    /// Convert this linear RGB spectrum to non-linear sRGB bytes.
    pub fn to_srgb(self) -> [u8; 3] {
        let a = 0.055f32;
        let e = 1f32 / 2.4;
        let mut srgb = [0; 3];
        for i in 0..3 {
            let v = if self[i] <= 0.003_130_8 {
                12.92 * self[i]
            } else {
                (1.0 + a) * f32::powf(self[i], e) - a
            };
            srgb[i] = clamp(v * 255.0 + 0.5, 0.0, 255.0) as u8;
        }
        srgb
    }
}

impl Add for Spectrum {
    type Output = Spectrum;
    fn add(self, s: Spectrum) -> Spectrum {
        Spectrum::rgb(self.r + s.r, self.g + s.g, self.b + s.b)
    }
}

impl AddAssign for Spectrum {
    fn add_assign(&mut self, s: Spectrum) {
        self.r += s.r;
        self.g += s.g;
        self.b += s.b;
    }
}

impl Sub for Spectrum {
    type Output = Spectrum;
    fn sub(self, s: Spectrum) -> Spectrum {
        Spectrum::rgb(self.r - s.r, self.g - s.g, self.b - s.b)
    }
}

impl Mul for Spectrum {
    type Output = Spectrum;
    fn mul(self, s: Spectrum) -> Spectrum {
        Spectrum::rgb(self.r * s.r, self.g * s.g, self.b * s.b)
    }
}

impl MulAssign for Spectrum {
    fn mul_assign(&mut self, s: Spectrum) {
        self.r *= s.r;
        self.g *= s.g;
        self.b *= s.b;
    }
}

impl Mul<f32> for Spectrum {
    type Output = Spectrum;
    fn mul(self, s: f32) -> Spectrum {
        Spectrum::rgb(self.r * s, self.g * s, self.b * s)
    }
}

impl Mul<Spectrum> for f32 {
    type Output = Spectrum;
    fn mul(self, s: Spectrum) -> Spectrum {
        s * self
    }
}

impl MulAssign<f32> for Spectrum {
    fn mul_assign(&mut self, s: f32) {
        self.r *= s;
        self.g *= s;
        self.b *= s;
    }
}

impl Div<f32> for Spectrum {
    type Output = Spectrum;
    fn div(self, s: f32) -> Spectrum {
        let inv = 1.0 / s;
        self * inv
    }
}

impl DivAssign<f32> for Spectrum {
    fn div_assign(&mut self, s: f32) {
        let inv = 1.0 / s;
        *self *= inv;
    }
}

impl Index<usize> for Spectrum {
    type Output = f32;
    fn index(&self, i: usize) -> &f32 {
        match i {
            0 => &self.r,
            1 => &self.g,
            _ => &self.b,
        }
    }
}

impl fmt::Display for Spectrum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}, {}]", self.r, self.g, self.b)
    }
}
