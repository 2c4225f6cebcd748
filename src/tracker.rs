// tracker.rs — Per-feed pipeline context (CPU).
//
// Owns every stage and all mutable state for one camera feed. Two feeds
// means two `Tracker`s; nothing is shared or global.
//
// Per-frame call sequence:
//
//   {
//       let mut slot = tracker.begin_frame();   // history ring slot
//       draw(&mut slot);                        // external draw step
//   }                                           // slot dropped: cursor advances
//   let stats = tracker.apply();                // mask → blobs
//   render(tracker.blobs());
//
// `apply` runs:
//
//   1. Foreground mask    latest frame vs. ring average
//   2. Morphology         erode × E, then dilate × D
//   3. Blur               separable Gaussian
//   4. Threshold          > cutoff → 1.0
//   5. Readback           stage this mask, publish last frame's (one frame lag)
//   6. Contours           ContourSource on the published mask
//   7. Detect             contours → candidates (area filter)
//   8. Match              BlobMatcher::update
//
// Blobs therefore always describe the mask from one `apply` earlier.

use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::blob::{BlobDetector, Candidate};
use crate::blur::GaussianBlur;
use crate::config::TrackerConfig;
use crate::contour::{Contour, ContourSource, OuterContours};
use crate::error::TrackerError;
use crate::history::{FrameHistory, FrameSlot};
use crate::image::{Image, Rgb};
use crate::matcher::{Blob, BlobMatcher, MatchStats};
use crate::morphology::PingPong;
use crate::readback::HostReadback;
use crate::threshold::Threshold;

/// Wall-clock time spent in each part of one `apply`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StageTiming {
    /// Foreground mask, morphology, blur and threshold. On the GPU this
    /// is encoding and submission only.
    pub segmentation: Duration,
    /// Staging this mask and publishing the previous one.
    pub readback: Duration,
    pub contours: Duration,
    /// Candidate detection and matching.
    pub matching: Duration,
}

impl StageTiming {
    pub fn total(&self) -> Duration {
        self.segmentation + self.readback + self.contours + self.matching
    }
}

/// Statistics returned by each `apply`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameStats {
    /// Contours found in the published mask.
    pub contours: usize,
    /// Contours that passed the area filter.
    pub candidates: usize,
    pub matches: MatchStats,
    pub timing: StageTiming,
}

/// The host half shared by both pipelines: contour extraction on the
/// read-back mask, detection and matching.
pub(crate) struct BlobStages<S> {
    contour_source: S,
    contours: Vec<Contour>,
    detector: BlobDetector,
    candidates: Vec<Candidate>,
    matcher: BlobMatcher,
}

impl<S: ContourSource> BlobStages<S> {
    pub(crate) fn new(config: &TrackerConfig, contour_source: S) -> Self {
        BlobStages {
            contour_source,
            contours: Vec::new(),
            detector: BlobDetector::from_config(&config.detector),
            candidates: Vec::new(),
            matcher: BlobMatcher::new(config.matcher),
        }
    }

    /// Contours → candidates → matcher update on one tracker input.
    pub(crate) fn run(&mut self, mask: &Image<u8>, timing: &mut StageTiming) -> MatchStats {
        let t = Instant::now();
        self.contours = self.contour_source.find_contours(mask);
        timing.contours = t.elapsed();

        let t = Instant::now();
        self.detector.detect_into(&self.contours, &mut self.candidates);
        let matches = self.matcher.update(&self.candidates);
        timing.matching = t.elapsed();
        matches
    }

    pub(crate) fn stats(&self, matches: MatchStats, timing: StageTiming, frame: u64) -> FrameStats {
        let stats = FrameStats {
            contours: self.contours.len(),
            candidates: self.candidates.len(),
            matches,
            timing,
        };
        trace!(
            frame,
            contours = stats.contours,
            candidates = stats.candidates,
            tracked = matches.tracked,
            total_us = timing.total().as_micros() as u64,
            "frame applied"
        );
        stats
    }

    pub(crate) fn contours(&self) -> &[Contour] {
        &self.contours
    }

    pub(crate) fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub(crate) fn matcher(&self) -> &BlobMatcher {
        &self.matcher
    }
}

/// The CPU pipeline for one feed.
pub struct Tracker<S: ContourSource = OuterContours> {
    config: TrackerConfig,
    history: FrameHistory,
    foreground: Image<f32>,
    morphology: PingPong,
    blur: GaussianBlur,
    blur_scratch: Image<f32>,
    blurred: Image<f32>,
    threshold: Threshold,
    thresholded: Image<f32>,
    readback: HostReadback,
    blobs: BlobStages<S>,
    frames: u64,
}

impl Tracker {
    /// Build a pipeline with the default imageproc contour extraction.
    pub fn new(config: TrackerConfig) -> Result<Self, TrackerError> {
        Self::with_contour_source(config, OuterContours::default())
    }
}

impl<S: ContourSource> Tracker<S> {
    /// Build a pipeline that extracts contours with `contour_source`.
    pub fn with_contour_source(config: TrackerConfig, contour_source: S) -> Result<Self, TrackerError> {
        config.validate()?;
        let (w, h) = (config.width, config.height);

        let tracker = Tracker {
            history: FrameHistory::new(w, h, config.history_len, config.foreground_distance),
            foreground: Image::new(w, h),
            morphology: PingPong::new(w, h),
            blur: GaussianBlur::from_config(&config.blur)?,
            blur_scratch: Image::new(w, h),
            blurred: Image::new(w, h),
            threshold: Threshold::new(config.threshold),
            thresholded: Image::new(w, h),
            readback: HostReadback::new(w, h),
            blobs: BlobStages::new(&config, contour_source),
            frames: 0,
            config,
        };
        debug!(
            width = w,
            height = h,
            history = tracker.history.len(),
            erode = tracker.config.erode_iterations,
            dilate = tracker.config.dilate_iterations,
            "cpu tracker created"
        );
        Ok(tracker)
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Open the next history slot for the external draw step. Dropping
    /// the slot ends the frame.
    pub fn begin_frame(&mut self) -> FrameSlot<'_> {
        self.history.begin_frame()
    }

    /// Copy a complete frame into the next history slot.
    pub fn push_frame(&mut self, frame: &Image<Rgb>) -> Result<(), TrackerError> {
        if frame.width() != self.config.width || frame.height() != self.config.height {
            return Err(TrackerError::FrameSize {
                got_w: frame.width(),
                got_h: frame.height(),
                want_w: self.config.width,
                want_h: self.config.height,
            });
        }
        self.history.push(frame);
        Ok(())
    }

    /// Run every stage on the most recently written frame.
    pub fn apply(&mut self) -> FrameStats {
        let mut timing = StageTiming::default();

        let t = Instant::now();
        self.history.compute_foreground_mask_into(&mut self.foreground);
        self.morphology = std::mem::take(&mut self.morphology)
            .load(&self.foreground)
            .erode(self.config.erode_iterations)
            .dilate(self.config.dilate_iterations);
        self.blur.blur_into(self.morphology.read(), &mut self.blur_scratch, &mut self.blurred);
        self.threshold.apply_into(&self.blurred, &mut self.thresholded);
        timing.segmentation = t.elapsed();

        let t = Instant::now();
        self.readback.apply(&self.thresholded);
        timing.readback = t.elapsed();

        let matches = self.blobs.run(self.readback.output(), &mut timing);
        self.frames += 1;
        self.blobs.stats(matches, timing, self.frames)
    }

    /// Push a frame and apply in one call.
    pub fn process(&mut self, frame: &Image<Rgb>) -> Result<FrameStats, TrackerError> {
        self.push_frame(frame)?;
        Ok(self.apply())
    }

    /// Most recently written raw frame.
    pub fn latest_frame(&self) -> &Image<Rgb> {
        self.history.latest()
    }

    pub fn history(&self) -> &FrameHistory {
        &self.history
    }

    /// Background segmentation mask from the last `apply`.
    pub fn foreground_mask(&self) -> &Image<f32> {
        &self.foreground
    }

    /// Mask after erode and dilate.
    pub fn cleaned_mask(&self) -> &Image<f32> {
        self.morphology.read()
    }

    pub fn blurred_mask(&self) -> &Image<f32> {
        &self.blurred
    }

    /// Binary mask from the last `apply`, before readback.
    pub fn threshold_mask(&self) -> &Image<f32> {
        &self.thresholded
    }

    /// The mask blobs were detected on: the threshold mask of the
    /// previous `apply`, as 0/255.
    pub fn tracker_input(&self) -> &Image<u8> {
        self.readback.output()
    }

    pub fn contours(&self) -> &[Contour] {
        self.blobs.contours()
    }

    pub fn candidates(&self) -> &[Candidate] {
        self.blobs.candidates()
    }

    pub fn blobs(&self) -> &[Blob] {
        self.blobs.matcher().blobs()
    }

    pub fn matcher(&self) -> &BlobMatcher {
        self.blobs.matcher()
    }

    /// Number of `apply` calls so far.
    pub fn frame_count(&self) -> u64 {
        self.frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;

    fn small_config() -> TrackerConfig {
        TrackerConfig { history_len: 4, ..TrackerConfig::new(64, 48) }
    }

    // Black background: the freshly cleared ring already agrees with it, so
    // there is no warm-up foreground.
    fn scene(w: usize, h: usize, square: Option<(usize, usize)>) -> Image<Rgb> {
        let bg = Rgb::BLACK;
        let fg = Rgb::new(0.9, 0.9, 0.8);
        Image::from_fn(w, h, |x, y| match square {
            Some((sx, sy)) if (sx..sx + 16).contains(&x) && (sy..sy + 16).contains(&y) => fg,
            _ => bg,
        })
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = TrackerConfig { history_len: 0, ..small_config() };
        assert!(matches!(
            Tracker::new(config),
            Err(TrackerError::Config(ConfigError::EmptyHistory))
        ));
    }

    #[test]
    fn test_rejects_wrong_frame_size() {
        let mut t = Tracker::new(small_config()).unwrap();
        let err = t.push_frame(&Image::new(10, 10)).unwrap_err();
        assert!(matches!(err, TrackerError::FrameSize { got_w: 10, want_w: 64, .. }));
    }

    #[test]
    fn test_static_scene_yields_nothing() {
        let mut t = Tracker::new(small_config()).unwrap();
        let frame = scene(64, 48, None);
        for _ in 0..6 {
            let stats = t.process(&frame).unwrap();
            assert_eq!(stats.candidates, 0);
        }
        assert!(t.blobs().is_empty());
        assert_eq!(t.frame_count(), 6);
    }

    #[test]
    fn test_new_object_tracked_one_frame_late() {
        let mut t = Tracker::new(small_config()).unwrap();
        let empty = scene(64, 48, None);
        for _ in 0..4 {
            t.process(&empty).unwrap();
        }

        let with_square = scene(64, 48, Some((20, 16)));
        let stats = t.process(&with_square).unwrap();
        // The square is in the threshold mask but not yet read back.
        assert!(t.threshold_mask().count_above(0.0) > 0);
        assert_eq!(stats.candidates, 0);

        let stats = t.process(&with_square).unwrap();
        assert_eq!(stats.candidates, 1);
        assert_eq!(stats.matches.created, 1);
        let blob = &t.blobs()[0];
        assert!((blob.position.x - 27.5).abs() < 3.0, "x = {}", blob.position.x);
        assert!((blob.position.y - 23.5).abs() < 3.0, "y = {}", blob.position.y);
    }

    #[test]
    fn test_custom_contour_source() {
        let source = |_: &Image<u8>| vec![Contour::rect(0, 0, 20, 20), Contour::rect(0, 0, 5, 5)];
        let mut t = Tracker::with_contour_source(small_config(), source).unwrap();
        let stats = t.process(&scene(64, 48, None)).unwrap();
        assert_eq!(stats.contours, 2);
        assert_eq!(stats.candidates, 1);
        assert_eq!(t.blobs().len(), 1);
    }
}
