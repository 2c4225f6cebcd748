// footfall: background-subtraction blob tracking for overhead video.
//
// CPU reference stages live at the top level; `gpu` mirrors the mask
// stages as wgpu compute kernels.
//
//   frame → history (foreground) → morphology → blur → threshold
//         → readback → contour → blob (detect) → matcher → tracked blobs

pub mod image;
pub mod convert;
pub mod config;
pub mod error;

pub mod history;
pub mod morphology;
pub mod blur;
pub mod threshold;
pub mod readback;
pub mod contour;
pub mod blob;
pub mod matcher;
pub mod tracker;

pub mod gpu;

pub use config::TrackerConfig;
pub use error::{ConfigError, TrackerError};
pub use matcher::{Blob, BlobMatcher};
pub use tracker::{FrameStats, Tracker};
