//! Pixel reconstruction filters used by the sample splatter.

#[derive(Debug, Clone)]
pub enum Filter {
    Box { radius: f32 },
    Gaussian { radius: f32, alpha: f32 },
}

impl Filter {
    pub fn default_gaussian() -> Filter {
        Filter::Gaussian {
            radius: 1.5,
            alpha: 2.0,
        }
    }

    /// A zero-radius splat: every sample lands on exactly one pixel.
    pub fn single_pixel() -> Filter {
        Filter::Box { radius: 0.5 }
    }

    pub fn radius(&self) -> f32 {
        match self {
            Filter::Box { radius } => *radius,
            Filter::Gaussian { radius, .. } => *radius,
        }
    }

    pub fn evaluate(&self, x: f32, y: f32) -> f32 {
        match self {
            Filter::Box { radius } => {
                if x.abs() <= *radius && y.abs() <= *radius {
                    1.0
                } else {
                    0.0
                }
            }
            Filter::Gaussian { radius, alpha } => {
                let gaussian = |d: f32| {
                    let e = (-alpha * d * d).exp() - (-alpha * radius * radius).exp();
                    e.max(0.0)
                };
                gaussian(x) * gaussian(y)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_support() {
        let f = Filter::single_pixel();
        assert_eq!(f.evaluate(0.0, 0.0), 1.0);
        assert_eq!(f.evaluate(0.6, 0.0), 0.0);
    }

    #[test]
    fn test_gaussian_decays() {
        let f = Filter::default_gaussian();
        assert!(f.evaluate(0.0, 0.0) > f.evaluate(1.0, 0.0));
        assert_eq!(f.evaluate(2.0, 0.0), 0.0);
    }
}
