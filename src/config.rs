// config.rs — Pipeline configuration.
//
// Everything is fixed at construction. A pipeline never re-reads its
// config, so changing a value means building a new `Tracker`.
//
// Defaults reproduce the tuned values for a 320×240 overhead camera with a
// ten-frame background history.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Upper bound on Gaussian taps. Sized to fit the GPU uniform block
/// (8 × vec4<f32> = 32 weights).
pub const MAX_TAPS: usize = 32;

/// Separable Gaussian blur parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlurConfig {
    /// Gaussian sigma.
    pub sigma: f32,
    /// One-sided tap count including the centre. The kernel spans
    /// `2 * taps - 1` samples.
    pub taps: usize,
    /// Distance in texels between consecutive taps.
    pub stride: usize,
}

impl Default for BlurConfig {
    fn default() -> Self {
        BlurConfig { sigma: 1.0, taps: 10, stride: 1 }
    }
}

impl BlurConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.sigma.is_finite() && self.sigma > 0.0) {
            return Err(ConfigError::InvalidSigma(self.sigma));
        }
        if self.taps == 0 || self.taps > MAX_TAPS {
            return Err(ConfigError::InvalidTaps { taps: self.taps, max: MAX_TAPS });
        }
        if self.stride == 0 {
            return Err(ConfigError::ZeroStride);
        }
        Ok(())
    }
}

/// Candidate filtering.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Contours whose bounding-box area is at or below this are dropped.
    pub min_area: i64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        DetectorConfig { min_area: 100 }
    }
}

/// Matching and blob lifecycle parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// A candidate/blob pair is accepted when its cost is strictly below
    /// this (squared pixel distance).
    pub max_cost: f32,
    /// Maximum number of positions kept in a blob's trail.
    pub trail_cap: usize,
    /// Positions are appended to the trail only once age exceeds this.
    pub trail_start_age: i32,
    /// Blobs are evicted once their age drops below this.
    pub eviction_age: i32,
    /// Number of most-recent trail segments summed for a direction sample.
    pub direction_segments: usize,
    /// Weight of the previous direction in the exponential blend.
    pub direction_smoothing: f32,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        MatcherConfig {
            max_cost: 1000.0,
            trail_cap: 55,
            trail_start_age: 10,
            eviction_age: -50,
            direction_segments: 5,
            direction_smoothing: 0.9,
        }
    }
}

impl MatcherConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.trail_cap == 0 {
            return Err(ConfigError::ZeroTrailCap);
        }
        if !(0.0..=1.0).contains(&self.direction_smoothing) {
            return Err(ConfigError::InvalidSmoothing(self.direction_smoothing));
        }
        Ok(())
    }
}

/// Full pipeline configuration.
///
/// # Example
/// ```
/// use footfall::config::TrackerConfig;
///
/// let config = TrackerConfig {
///     history_len: 4,
///     ..TrackerConfig::new(160, 120)
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Frame width in pixels.
    pub width: usize,
    /// Frame height in pixels.
    pub height: usize,
    /// Number of frames in the background history ring.
    pub history_len: usize,
    /// Colour distance above which a pixel is foreground.
    pub foreground_distance: f32,
    pub erode_iterations: usize,
    pub dilate_iterations: usize,
    pub blur: BlurConfig,
    /// Binarization cutoff applied after the blur.
    pub threshold: f32,
    pub detector: DetectorConfig,
    pub matcher: MatcherConfig,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig {
            width: 320,
            height: 240,
            history_len: 10,
            foreground_distance: 0.1,
            erode_iterations: 2,
            dilate_iterations: 3,
            blur: BlurConfig::default(),
            threshold: 0.5,
            detector: DetectorConfig::default(),
            matcher: MatcherConfig::default(),
        }
    }
}

impl TrackerConfig {
    /// Defaults for the given frame size.
    pub fn new(width: usize, height: usize) -> Self {
        TrackerConfig { width, height, ..Default::default() }
    }

    /// Parse a JSON document. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: TrackerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::ZeroDimensions { width: self.width, height: self.height });
        }
        if self.history_len == 0 {
            return Err(ConfigError::EmptyHistory);
        }
        self.blur.validate()?;
        self.matcher.validate()
    }
}
