// gpu/mod.rs — wgpu compute mirror of the mask stages.
//
// Each module mirrors a CPU reference in the parent crate, which stays the
// authoritative definition of the numbers; GPU tests compare against it.
//
//   history.rs     ↔ history.rs      frame ring + foreground mask
//   morphology.rs  ↔ morphology.rs   erode / dilate ping-pong
//   blur.rs        ↔ blur.rs         separable Gaussian
//   threshold.rs   ↔ threshold.rs    binarize
//   readback.rs    ↔ readback.rs     double-buffered device → host copy
//   tracker.rs     ↔ tracker.rs      per-feed pipeline
//
// Split: the GPU owns everything up to the binary mask; contour
// extraction, detection and matching stay on the host and run on the mask
// read back from the previous frame.

pub mod blur;
pub mod device;
pub mod history;
pub mod image;
pub mod kernel;
pub mod morphology;
pub mod readback;
pub mod threshold;
pub mod tracker;
