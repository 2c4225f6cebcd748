// threshold.rs — Binarize a continuous mask (CPU reference).
//
//   out(p) = 1.0 if in(p) > cutoff else 0.0
//
// The blur leaves soft edges around every blob; thresholding at 0.5 snaps
// them back to a hard mask for contour extraction.

use crate::image::Image;

/// Fixed-cutoff binarization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Threshold {
    cutoff: f32,
}

impl Default for Threshold {
    fn default() -> Self {
        Threshold { cutoff: 0.5 }
    }
}

impl Threshold {
    pub fn new(cutoff: f32) -> Self {
        Threshold { cutoff }
    }

    pub fn cutoff(&self) -> f32 {
        self.cutoff
    }

    pub fn apply(&self, src: &Image<f32>) -> Image<f32> {
        let cutoff = self.cutoff;
        src.map(|v| if v > cutoff { 1.0 } else { 0.0 })
    }

    /// # Panics
    /// Panics if the images differ in size.
    pub fn apply_into(&self, src: &Image<f32>, dst: &mut Image<f32>) {
        assert!(src.same_size(dst), "threshold: dimension mismatch");
        for (d, &s) in dst.as_mut_slice().iter_mut().zip(src.as_slice()) {
            *d = if s > self.cutoff { 1.0 } else { 0.0 };
        }
    }
}
