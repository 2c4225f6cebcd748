// error.rs — Construction-time errors.
//
// Per-frame work never fails: empty masks, empty contour lists and empty
// candidate sets all degrade to "no blobs this frame". Errors only come out
// of building a pipeline (bad configuration), feeding it frames of the
// wrong size, or the GPU device (setup, or a failed readback map).

use thiserror::Error;

/// A configuration value that cannot produce a working pipeline.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("frame dimensions must be non-zero (got {width}×{height})")]
    ZeroDimensions { width: usize, height: usize },

    #[error("history length must be at least 1")]
    EmptyHistory,

    #[error("blur sigma must be positive and finite (got {0})")]
    InvalidSigma(f32),

    #[error("blur tap count must be in 1..={max} (got {taps})")]
    InvalidTaps { taps: usize, max: usize },

    #[error("blur sample stride must be at least 1")]
    ZeroStride,

    #[error("trail cap must be at least 1")]
    ZeroTrailCap,

    #[error("direction smoothing must lie in [0, 1] (got {0})")]
    InvalidSmoothing(f32),

    #[error("failed to parse tracker configuration")]
    Parse(#[from] serde_json::Error),
}

/// Errors surfaced by the host-side pipeline.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("frame is {got_w}×{got_h}, pipeline expects {want_w}×{want_h}")]
    FrameSize { got_w: usize, got_h: usize, want_w: usize, want_h: usize },

    #[error("gpu: {0}")]
    Gpu(#[from] crate::gpu::device::GpuError),
}
