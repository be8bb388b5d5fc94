//! Monte-Carlo sampling utilities: discrete distributions, MIS heuristics,
//! pdf conversions, low-discrepancy helpers and direction mappings.

use std::f32::consts::PI;

use serde::{Deserialize, Serialize};

use crate::geometry::{Point2f, Vector3f};
use crate::{find_interval, ONE_MINUS_EPSILON};

/// A piecewise-constant 1D distribution with a precomputed CDF.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Distribution1d {
    pub func: Vec<f32>,
    cdf: Vec<f32>,
    pub func_int: f32,
}

impl Distribution1d {
    pub fn new(f: &[f32]) -> Distribution1d {
        let n = f.len();
        let func = Vec::from(f);
        let mut cdf = vec![0.0; n + 1];
        for i in 1..(n + 1) {
            cdf[i] = cdf[i - 1] + func[i - 1] / n as f32;
        }
        let func_int = cdf[n];
        if func_int == 0.0 {
            cdf.iter_mut()
                .enumerate()
                .skip(1)
                .for_each(|(i, v)| *v = i as f32 / n as f32);
        } else {
            cdf.iter_mut().skip(1).for_each(|v| *v /= func_int);
        }

        Distribution1d {
            func,
            cdf,
            func_int,
        }
    }

    pub fn count(&self) -> usize {
        self.func.len()
    }

    pub fn sample_continuous(&self, u: f32) -> (f32, f32, usize) {
        let offset = find_interval(self.cdf.len(), |i| self.cdf[i] <= u);
        let mut du = u - self.cdf[offset];
        if self.cdf[offset + 1] - self.cdf[offset] > 0.0 {
            du /= self.cdf[offset + 1] - self.cdf[offset];
        }
        let pdf = if self.func_int > 0.0 {
            self.func[offset] / self.func_int
        } else {
            0.0
        };
        let x = (offset as f32 + du) / self.count() as f32;

        (x, pdf, offset)
    }

    pub fn sample_discrete(&self, u: f32) -> (usize, f32) {
        let offset = find_interval(self.cdf.len(), |i| self.cdf[i] <= u);
        (offset, self.pdf_discrete(offset))
    }

    pub fn pdf_discrete(&self, index: usize) -> f32 {
        if self.func_int > 0.0 {
            self.func[index] / (self.func_int * self.count() as f32)
        } else {
            0.0
        }
    }
}

/// Power heuristic (β = 2) MIS weight for one sample from each strategy.
pub fn power_heuristic(f_pdf: f32, g_pdf: f32) -> f32 {
    let f = f_pdf * f_pdf;
    let g = g_pdf * g_pdf;
    f / (f + g)
}

pub fn balance_heuristic(f_pdf: f32, g_pdf: f32) -> f32 {
    f_pdf / (f_pdf + g_pdf)
}

/// Convert a solid-angle pdf to an area pdf at distance `dist` with incident
/// cosine `cos_there`.
pub fn pdf_w_to_a(pdf_w: f32, dist: f32, cos_there: f32) -> f32 {
    pdf_w * cos_there.abs() / (dist * dist)
}

pub fn pdf_a_to_w(pdf_a: f32, dist: f32, cos_there: f32) -> f32 {
    pdf_a * dist * dist / cos_there.abs()
}

fn radical_inverse_specialized(base: u32, a: u32) -> f32 {
    let mut a = a as u64;
    let inv_base = 1.0 / base as f32;
    let mut reversed_digits: u64 = 0;
    let mut inv_base_n = 1.0;
    while a != 0 {
        let next = a / base as u64;
        let digit = a - next * base as u64;
        reversed_digits = reversed_digits * base as u64 + digit;
        inv_base_n *= inv_base;
        a = next;
    }
    (reversed_digits as f32 * inv_base_n).min(ONE_MINUS_EPSILON)
}

/// Radical inverse of `a` in a prime base. The DLSC entry pass uses bases
/// 3, 5, 7, 11, 13 and 17.
pub fn radical_inverse(a: u32, base: u32) -> f32 {
    debug_assert!(base >= 2);
    radical_inverse_specialized(base, a)
}

/// Interleave the low 16 bits of `v` with zeros.
fn part_1_by_1(v: u32) -> u32 {
    let mut x = v & 0x0000_ffff;
    x = (x ^ (x << 8)) & 0x00ff_00ff;
    x = (x ^ (x << 4)) & 0x0f0f_0f0f;
    x = (x ^ (x << 2)) & 0x3333_3333;
    x = (x ^ (x << 1)) & 0x5555_5555;
    x
}

fn compact_1_by_1(v: u32) -> u32 {
    let mut x = v & 0x5555_5555;
    x = (x ^ (x >> 1)) & 0x3333_3333;
    x = (x ^ (x >> 2)) & 0x0f0f_0f0f;
    x = (x ^ (x >> 4)) & 0x00ff_00ff;
    x = (x ^ (x >> 8)) & 0x0000_ffff;
    x
}

/// Morton code of a 2D coordinate (16 bits per axis).
pub fn encode_morton2(x: u32, y: u32) -> u32 {
    (part_1_by_1(y) << 1) + part_1_by_1(x)
}

pub fn decode_morton2_x(code: u32) -> u32 {
    compact_1_by_1(code)
}

pub fn decode_morton2_y(code: u32) -> u32 {
    compact_1_by_1(code >> 1)
}

pub fn uniform_sample_sphere(u1: f32, u2: f32) -> Vector3f {
    let z = 1.0 - 2.0 * u1;
    let r = (1.0 - z * z).max(0.0).sqrt();
    let phi = 2.0 * PI * u2;
    Vector3f::new(r * phi.cos(), r * phi.sin(), z)
}

pub fn uniform_sphere_pdf() -> f32 {
    1.0 / (4.0 * PI)
}

pub fn concentric_sample_disk(u1: f32, u2: f32) -> Point2f {
    let ox = 2.0 * u1 - 1.0;
    let oy = 2.0 * u2 - 1.0;
    if ox == 0.0 && oy == 0.0 {
        return Point2f::new(0.0, 0.0);
    }
    let (r, theta) = if ox.abs() > oy.abs() {
        (ox, (PI / 4.0) * (oy / ox))
    } else {
        (oy, PI / 2.0 - (PI / 4.0) * (ox / oy))
    };
    Point2f::new(r * theta.cos(), r * theta.sin())
}

/// Cosine-weighted hemisphere direction in the local frame (z up).
pub fn cosine_sample_hemisphere(u1: f32, u2: f32) -> Vector3f {
    let d = concentric_sample_disk(u1, u2);
    let z = (1.0 - d.x * d.x - d.y * d.y).max(0.0).sqrt();
    Vector3f::new(d.x, d.y, z)
}

pub fn uniform_sample_cone(u1: f32, u2: f32, cos_theta_max: f32) -> Vector3f {
    let cos_theta = (1.0 - u1) + u1 * cos_theta_max;
    let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
    let phi = 2.0 * PI * u2;
    Vector3f::new(phi.cos() * sin_theta, phi.sin() * sin_theta, cos_theta)
}

pub fn uniform_cone_pdf(cos_theta_max: f32) -> f32 {
    1.0 / (2.0 * PI * (1.0 - cos_theta_max))
}

/// Barycentric coordinates of a uniform triangle sample.
pub fn uniform_sample_triangle(u1: f32, u2: f32) -> (f32, f32) {
    let su1 = u1.sqrt();
    (1.0 - su1, u2 * su1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distribution_discrete() {
        let func = [0.0, 1.0, 0.0, 3.0];
        let distrib = Distribution1d::new(&func[..]);

        assert_eq!(4, distrib.count());
        assert_eq!((1, 0.25), distrib.sample_discrete(0.0));
        assert_eq!((1, 0.25), distrib.sample_discrete(0.2499));
        assert_eq!((3, 0.75), distrib.sample_discrete(0.2501));
        assert_eq!((3, 0.75), distrib.sample_discrete(ONE_MINUS_EPSILON));
        assert_eq!(0.25, distrib.pdf_discrete(1));
        assert_eq!(0.0, distrib.pdf_discrete(0));
    }

    #[test]
    fn test_distribution_zero_function() {
        let distrib = Distribution1d::new(&[0.0, 0.0]);
        let (index, pdf) = distrib.sample_discrete(0.3);
        assert_eq!(index, 0);
        assert_eq!(pdf, 0.0);
    }

    #[test]
    fn test_power_heuristic() {
        // Symmetric pdfs split the weight evenly and the two weights always
        // sum to one.
        assert_eq!(power_heuristic(1.0, 1.0), 0.5);
        for &(f, g) in &[(0.25, 3.0), (10.0, 0.1), (1e-3, 1e3)] {
            let sum = power_heuristic(f, g) + power_heuristic(g, f);
            assert!((sum - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_pdf_conversion_round_trip() {
        let pdf_w = 0.7;
        let pdf_a = pdf_w_to_a(pdf_w, 3.0, 0.5);
        assert!((pdf_a_to_w(pdf_a, 3.0, 0.5) - pdf_w).abs() < 1e-6);
    }

    #[test]
    fn test_radical_inverse_base2_like() {
        // base 3: 1 -> 1/3, 2 -> 2/3, 3 -> 1/9
        assert!((radical_inverse(1, 3) - 1.0 / 3.0).abs() < 1e-6);
        assert!((radical_inverse(2, 3) - 2.0 / 3.0).abs() < 1e-6);
        assert!((radical_inverse(3, 3) - 1.0 / 9.0).abs() < 1e-6);
    }

    #[test]
    fn test_morton_round_trip() {
        for &(x, y) in &[(0u32, 0u32), (1, 0), (0, 1), (13, 27), (255, 255)] {
            let code = encode_morton2(x, y);
            assert_eq!(decode_morton2_x(code), x);
            assert_eq!(decode_morton2_y(code), y);
        }
    }

    #[test]
    fn test_morton_locality() {
        // The first four codes cover the 2x2 block.
        let mut seen = vec![];
        for code in 0..4 {
            seen.push((decode_morton2_x(code), decode_morton2_y(code)));
        }
        seen.sort_unstable();
        assert_eq!(seen, vec![(0, 0), (0, 1), (1, 0), (1, 1)]);
    }

    #[test]
    fn test_discrete_sampling_frequencies() {
        use rand::{Rng, SeedableRng};

        let distrib = Distribution1d::new(&[1.0, 3.0]);
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let mut hits = [0u32; 2];
        for _ in 0..4096 {
            let (index, _) = distrib.sample_discrete(rng.gen::<f32>());
            hits[index] += 1;
        }
        // Expect a ~1:3 split.
        let ratio = hits[1] as f32 / hits[0] as f32;
        assert!((2.4..3.6).contains(&ratio), "ratio {}", ratio);
    }

    #[test]
    fn test_sphere_sample_is_unit() {
        for i in 0..16 {
            let u1 = i as f32 / 16.0;
            let v = uniform_sample_sphere(u1, 1.0 - u1);
            assert!((v.length() - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_triangle_sample_in_simplex() {
        for i in 0..32 {
            let (b1, b2) = uniform_sample_triangle(i as f32 / 32.0, 1.0 - i as f32 / 32.0);
            assert!(b1 >= 0.0 && b2 >= 0.0 && b1 + b2 <= 1.0 + 1e-6);
        }
    }
}
