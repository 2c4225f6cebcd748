// blur.rs — Separable Gaussian smoothing of masks (CPU reference).
//
// The kernel is stored one-sided: weights[0] is the centre tap and
// weights[i] (i ≥ 1) applies to both ±i·stride. Weights come from the
// discrete Gaussian
//
//   g(0) = 1,  g(i) = exp(−i² / 2σ²)
//
// g(0) is pinned to 1 so a 2σ² that underflows to zero still gives a unit
// impulse rather than 0/0. Weights are then normalized so the full mirrored
// kernel sums to one:
//
//   weights[0] + 2 · Σ_{i=1}^{taps−1} weights[i] = 1
//
// `stride` spreads the taps apart without adding samples: with stride 2 a
// 10-tap kernel reaches ±18 texels using the same 19 reads per pass.
//
// Horizontal pass first, then the vertical pass over its output. Samples
// past the border replicate the edge texel.

use crate::config::{BlurConfig, MAX_TAPS};
use crate::error::ConfigError;
use crate::image::Image;

/// Precomputed separable Gaussian. Immutable once configured; build a new
/// one to change sigma, tap count or stride.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianBlur {
    weights: Vec<f32>,
    stride: usize,
    sigma: f32,
}

impl GaussianBlur {
    /// Compute and normalize the one-sided weights.
    pub fn configure(sigma: f32, taps: usize, stride: usize) -> Result<Self, ConfigError> {
        BlurConfig { sigma, taps, stride }.validate()?;

        let two_sigma_sq = 2.0 * sigma * sigma;
        let mut weights: Vec<f32> = (0..taps)
            .map(|i| match i {
                0 => 1.0,
                _ => {
                    let x = i as f32;
                    (-x * x / two_sigma_sq).exp()
                }
            })
            .collect();

        let total = weights[0] + 2.0 * weights[1..].iter().sum::<f32>();
        for w in &mut weights {
            *w /= total;
        }
        Ok(GaussianBlur { weights, stride, sigma })
    }

    pub fn from_config(config: &BlurConfig) -> Result<Self, ConfigError> {
        Self::configure(config.sigma, config.taps, config.stride)
    }

    /// One-sided normalized weights, centre first.
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    pub fn taps(&self) -> usize {
        self.weights.len()
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn sigma(&self) -> f32 {
        self.sigma
    }

    /// Weights packed four to a lane for a uniform block of
    /// `MAX_TAPS / 4` vec4s. Unused lanes are zero.
    pub fn packed_weights(&self) -> [[f32; 4]; MAX_TAPS / 4] {
        let mut packed = [[0.0f32; 4]; MAX_TAPS / 4];
        for (i, &w) in self.weights.iter().enumerate() {
            packed[i / 4][i % 4] = w;
        }
        packed
    }

    /// Horizontal then vertical pass. Returns the doubly-filtered mask.
    pub fn blur(&self, src: &Image<f32>) -> Image<f32> {
        let mut scratch = Image::new(src.width(), src.height());
        let mut dst = Image::new(src.width(), src.height());
        self.blur_into(src, &mut scratch, &mut dst);
        dst
    }

    /// Allocation-free variant. `scratch` receives the horizontal pass.
    ///
    /// # Panics
    /// Panics if the three images differ in size.
    pub fn blur_into(&self, src: &Image<f32>, scratch: &mut Image<f32>, dst: &mut Image<f32>) {
        assert!(
            src.same_size(scratch) && src.same_size(dst),
            "blur_into: dimension mismatch"
        );
        self.pass(src, scratch, (1, 0));
        self.pass(scratch, dst, (0, 1));
    }

    fn pass(&self, src: &Image<f32>, dst: &mut Image<f32>, (dx, dy): (isize, isize)) {
        let w = src.width();
        let stride = self.stride as isize;
        for (i, out) in dst.as_mut_slice().iter_mut().enumerate() {
            let x = (i % w) as isize;
            let y = (i / w) as isize;
            let mut acc = src.get_clamped(x, y) * self.weights[0];
            for (t, &wt) in self.weights.iter().enumerate().skip(1) {
                let o = t as isize * stride;
                acc += (src.get_clamped(x + o * dx, y + o * dy)
                    + src.get_clamped(x - o * dx, y - o * dy))
                    * wt;
            }
            *out = acc;
        }
    }
}
