// gpu/tracker.rs — Per-feed pipeline with the mask stages on the GPU.
//
// Same stage order and outputs as the CPU `Tracker`; only the mask half
// moves to the device:
//
//   GPU  ┌ foreground mask   (history ring, one array layer per slot)
//        │ erode × E, dilate × D
//        │ blur (h, v)
//        │ threshold
//        └ copy → staging[toggle]         one submission per frame
//   ───────────────────── readback: map staging[1 − toggle] ─────
//   CPU    contours → candidates → BlobMatcher
//
// Every GPU pass of a frame is recorded into one encoder and submitted
// together with the readback copy. The host then maps the *previous*
// frame's staging buffer, so blobs describe the mask from one `apply`
// earlier, as on the CPU.

use std::time::Instant;

use tracing::debug;

use crate::blob::Candidate;
use crate::config::TrackerConfig;
use crate::contour::{Contour, ContourSource, OuterContours};
use crate::error::TrackerError;
use crate::gpu::blur::GpuBlur;
use crate::gpu::device::GpuDevice;
use crate::gpu::history::{GpuFrameHistory, GpuFrameSlot};
use crate::gpu::image::GpuMask;
use crate::gpu::morphology::{GpuMorphology, GpuPingPong};
use crate::gpu::readback::GpuReadback;
use crate::gpu::threshold::GpuThreshold;
use crate::image::{Image, Rgb};
use crate::matcher::{Blob, BlobMatcher};
use crate::threshold::Threshold;
use crate::tracker::{BlobStages, FrameStats, StageTiming};

/// The GPU pipeline for one feed. Borrows a shared `GpuDevice` per call.
pub struct GpuTracker<S: ContourSource = OuterContours> {
    config: TrackerConfig,
    history: GpuFrameHistory,
    morphology: GpuMorphology,
    /// Taken for the duration of `apply` and always put back.
    buffers: Option<GpuPingPong>,
    blur: GpuBlur,
    threshold: GpuThreshold,
    readback: GpuReadback,
    blobs: BlobStages<S>,
    frames: u64,
}

impl GpuTracker {
    /// Build a pipeline with the default imageproc contour extraction.
    pub fn new(gpu: &GpuDevice, config: TrackerConfig) -> Result<Self, TrackerError> {
        Self::with_contour_source(gpu, config, OuterContours::default())
    }
}

impl<S: ContourSource> GpuTracker<S> {
    pub fn with_contour_source(
        gpu: &GpuDevice,
        config: TrackerConfig,
        contour_source: S,
    ) -> Result<Self, TrackerError> {
        config.validate()?;
        let (w, h) = (config.width as u32, config.height as u32);

        let morphology = GpuMorphology::new(gpu);
        let buffers = morphology.ping_pong(gpu, w, h);
        let tracker = GpuTracker {
            history: GpuFrameHistory::new(gpu, w, h, config.history_len, config.foreground_distance),
            buffers: Some(buffers),
            morphology,
            blur: GpuBlur::new(gpu, &config.blur, w, h)?,
            threshold: GpuThreshold::new(gpu, Threshold::new(config.threshold), w, h),
            readback: GpuReadback::new(gpu, w, h),
            blobs: BlobStages::new(&config, contour_source),
            frames: 0,
            config,
        };
        debug!(
            width = w,
            height = h,
            history = tracker.history.len(),
            workgroup = %gpu.workgroup_size,
            "gpu tracker created"
        );
        Ok(tracker)
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Clear and open the next ring layer for the external draw step.
    /// Dropping the slot ends the frame.
    pub fn begin_frame<'a>(&'a mut self, gpu: &'a GpuDevice) -> GpuFrameSlot<'a> {
        self.history.begin_frame(gpu)
    }

    /// Upload a complete host frame into the next ring layer.
    pub fn push_frame(&mut self, gpu: &GpuDevice, frame: &Image<Rgb>) -> Result<(), TrackerError> {
        if frame.width() != self.config.width || frame.height() != self.config.height {
            return Err(TrackerError::FrameSize {
                got_w: frame.width(),
                got_h: frame.height(),
                want_w: self.config.width,
                want_h: self.config.height,
            });
        }
        self.history.push(gpu, frame);
        Ok(())
    }

    /// Record and submit the mask stages for the latest frame, read back
    /// the previous frame's mask, and run the host stages on it.
    ///
    /// Fails only if mapping a staging buffer fails.
    pub fn apply(&mut self, gpu: &GpuDevice) -> Result<FrameStats, TrackerError> {
        let mut timing = StageTiming::default();

        let t = Instant::now();
        let mut encoder = gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("GpuTracker::apply"),
        });
        self.history.encode_foreground(gpu, &mut encoder);
        let buffers = self
            .buffers
            .take()
            .expect("ping-pong buffers are returned by every apply")
            .load(&mut encoder, self.history.mask());
        let buffers = self.morphology.erode(gpu, &mut encoder, buffers, self.config.erode_iterations);
        let buffers = self.morphology.dilate(gpu, &mut encoder, buffers, self.config.dilate_iterations);
        self.blur.encode(gpu, &mut encoder, buffers.read());
        self.buffers = Some(buffers);
        self.threshold.encode(gpu, &mut encoder, self.blur.output());
        timing.segmentation = t.elapsed();

        let t = Instant::now();
        self.readback.apply(gpu, encoder, self.threshold.output())?;
        timing.readback = t.elapsed();

        let matches = self.blobs.run(self.readback.output(), &mut timing);
        self.frames += 1;
        Ok(self.blobs.stats(matches, timing, self.frames))
    }

    /// Push a frame and apply in one call.
    pub fn process(&mut self, gpu: &GpuDevice, frame: &Image<Rgb>) -> Result<FrameStats, TrackerError> {
        self.push_frame(gpu, frame)?;
        self.apply(gpu)
    }

    pub fn history(&self) -> &GpuFrameHistory {
        &self.history
    }

    /// Foreground mask of the last `apply`, on the device.
    pub fn foreground_mask(&self) -> &GpuMask {
        self.history.mask()
    }

    /// Mask after erode and dilate.
    pub fn cleaned_mask(&self) -> Option<&GpuMask> {
        self.buffers.as_ref().map(GpuPingPong::read)
    }

    pub fn blurred_mask(&self) -> &GpuMask {
        self.blur.output()
    }

    /// Binary mask of the last `apply`, before readback.
    pub fn threshold_mask(&self) -> &GpuMask {
        self.threshold.output()
    }

    /// The mask blobs were detected on: the previous `apply`'s threshold
    /// mask, as 0/255.
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

    pub fn frame_count(&self) -> u64 {
        self.frames
    }
}
