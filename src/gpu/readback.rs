// gpu/readback.rs — Double-buffered mask readback from the GPU.
//
// The GPU backend of `ReadbackRing` (see readback.rs). Slots are two
// MAP_READ staging buffers; a fence is the `SubmissionIndex` of the
// submission that recorded the copy.
//
// Per frame:
//
//   request  append copy(mask → buffer[toggle]) to the frame's encoder,
//            submit it, keep the SubmissionIndex
//   acquire  map buffer[1 − toggle], wait for *its* submission only, convert
//            to the u8 tracker input, unmap
//
// The wait in acquire targets last frame's submission, which has normally
// finished long before, so the host does not stall on this frame's work.

use tracing::debug;

use crate::gpu::device::{GpuDevice, GpuError};
use crate::gpu::image::{padded_row_bytes, unpad_rows_to_u8, GpuMask};
use crate::image::Image;
use crate::readback::ReadbackRing;

pub struct GpuReadback {
    ring: ReadbackRing<wgpu::Buffer, wgpu::SubmissionIndex>,
    output: Image<u8>,
    width: u32,
    height: u32,
    frame: u64,
    /// Frame number staged into each slot, set on request.
    staged: [u64; 2],
    acquired_frame: Option<u64>,
}

impl GpuReadback {
    pub fn new(gpu: &GpuDevice, width: u32, height: u32) -> Self {
        let size = (padded_row_bytes(width) * height) as u64;
        let staging = |label| {
            gpu.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        };
        GpuReadback {
            ring: ReadbackRing::new(staging("GpuReadback slot 0"), staging("GpuReadback slot 1")),
            output: Image::new(width as usize, height as usize),
            width,
            height,
            frame: 0,
            staged: [0; 2],
            acquired_frame: None,
        }
    }

    /// Finish `encoder` with a copy of `mask` into the write slot, submit
    /// it, and publish the mask submitted on the previous call.
    ///
    /// Returns the frame number of the published mask, or `None` on the
    /// first call, in which case the output is all background.
    pub fn apply(
        &mut self,
        gpu: &GpuDevice,
        mut encoder: wgpu::CommandEncoder,
        mask: &GpuMask,
    ) -> Result<Option<u64>, GpuError> {
        assert!(
            mask.width == self.width && mask.height == self.height,
            "GpuReadback: mask is {}×{}, readback is {}×{}",
            mask.width, mask.height, self.width, self.height,
        );
        let frame = self.frame;
        self.frame += 1;
        self.staged[self.ring.toggle()] = frame;
        let staged = self.staged;
        let read = 1 - self.ring.toggle();

        let width = self.width as usize;
        let output = &mut self.output;
        let acquired = self
            .ring
            .cycle(
                |buffer| {
                    mask.encode_copy_to_buffer(&mut encoder, buffer);
                    gpu.queue.submit(std::iter::once(encoder.finish()))
                },
                |buffer, fence| -> Result<u64, GpuError> {
                    let slice = buffer.slice(..);
                    let (tx, rx) = std::sync::mpsc::channel();
                    slice.map_async(wgpu::MapMode::Read, move |r| {
                        let _ = tx.send(r);
                    });
                    gpu.device.poll(wgpu::Maintain::WaitForSubmissionIndex(fence));
                    let mapped = match rx.try_recv() {
                        Ok(r) => r,
                        // Submission done but the map callback not yet run.
                        Err(_) => {
                            gpu.device.poll(wgpu::Maintain::Wait);
                            rx.recv().map_err(|_| GpuError::BufferMap(wgpu::BufferAsyncError))?
                        }
                    };
                    mapped.map_err(GpuError::BufferMap)?;

                    unpad_rows_to_u8(&slice.get_mapped_range(), width, output.as_mut_slice());
                    buffer.unmap();
                    Ok(staged[read])
                },
            )
            .transpose()?;

        if acquired.is_none() {
            debug!(frame, "no staged mask yet; tracker input cleared");
            self.output.fill(0);
        }
        self.acquired_frame = acquired;
        Ok(acquired)
    }

    /// Tracker input: the mask submitted one call earlier, as 0/255.
    pub fn output(&self) -> &Image<u8> {
        &self.output
    }

    pub fn acquired_frame(&self) -> Option<u64> {
        self.acquired_frame
    }

    pub fn toggle(&self) -> usize {
        self.ring.toggle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_gpu_test_in_subprocess(test_name: &str) -> String {
        let output = std::process::Command::new("cargo")
            .args(["test", "--lib", "--", test_name, "--exact", "--ignored", "--nocapture"])
            .output()
            .unwrap_or_else(|e| panic!("failed to spawn subprocess for {test_name}: {e}"));
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        print!("{stdout}");
        eprint!("{stderr}");
        stdout + &stderr
    }

    #[test]
    #[ignore = "GPU integration: run via outer subprocess wrapper"]
    fn inner_readback_lags_one_frame() {
        let gpu = GpuDevice::new().expect("need Vulkan GPU");
        // 70 texels: rows need padding in the staging buffers.
        let (w, h) = (70u32, 5u32);
        let masks: Vec<Image<f32>> = (0..4)
            .map(|k| Image::from_fn(w as usize, h as usize, |x, _| if x % 4 == k { 1.0 } else { 0.0 }))
            .collect();
        let gpu_mask = GpuMask::new(&gpu, w, h, "readback src");
        let mut rb = GpuReadback::new(&gpu, w, h);

        for (k, mask) in masks.iter().enumerate() {
            gpu_mask.upload(&gpu, mask);
            let encoder = gpu.device.create_command_encoder(&Default::default());
            let published = rb.apply(&gpu, encoder, &gpu_mask).expect("readback");
            if k == 0 {
                assert_eq!(published, None);
                assert!(rb.output().as_slice().iter().all(|&v| v == 0));
            } else {
                assert_eq!(published, Some(k as u64 - 1));
                let want = crate::convert::mask_f32_to_u8(&masks[k - 1]);
                assert_eq!(rb.output(), &want);
            }
        }
        println!("GPU_TEST_OK");
    }

    #[test]
    #[ignore = "requires a real Vulkan GPU"]
    fn test_readback_lags_one_frame() {
        let out = run_gpu_test_in_subprocess("gpu::readback::tests::inner_readback_lags_one_frame");
        assert!(out.contains("GPU_TEST_OK"), "inner test failed:\n{out}");
    }
}
