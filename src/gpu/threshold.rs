// gpu/threshold.rs — Binarize a mask on the GPU. Mirrors `Threshold`.

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::gpu::device::GpuDevice;
use crate::gpu::image::GpuMask;
use crate::gpu::kernel::MaskKernel;
use crate::threshold::Threshold;

/// Uniform parameters (must match `Params` in threshold.wgsl).
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct ThresholdParams {
    width: u32,
    height: u32,
    cutoff: f32,
    _pad: u32,
}

pub struct GpuThreshold {
    threshold: Threshold,
    kernel: MaskKernel,
    params_buf: wgpu::Buffer,
    output: GpuMask,
    bound: Option<(wgpu::Id<wgpu::Texture>, wgpu::BindGroup)>,
}

impl GpuThreshold {
    pub fn new(gpu: &GpuDevice, threshold: Threshold, width: u32, height: u32) -> Self {
        let kernel = MaskKernel::new(
            gpu,
            "threshold.wgsl",
            include_str!("../shaders/threshold.wgsl"),
            "threshold",
            wgpu::TextureViewDimension::D2,
        );
        let params = ThresholdParams { width, height, cutoff: threshold.cutoff(), _pad: 0 };
        let params_buf = gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("GpuThreshold params"),
            contents: bytemuck::bytes_of(&params),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let output = GpuMask::new(gpu, width, height, "GpuThreshold output");
        GpuThreshold { threshold, kernel, params_buf, output, bound: None }
    }

    pub fn threshold(&self) -> Threshold {
        self.threshold
    }

    /// Binary mask from the last recorded `encode`.
    pub fn output(&self) -> &GpuMask {
        &self.output
    }

    /// Record the pass over `input`.
    ///
    /// # Panics
    /// Panics if `input` differs in size from the stage.
    pub fn encode(&mut self, gpu: &GpuDevice, encoder: &mut wgpu::CommandEncoder, input: &GpuMask) {
        assert!(
            input.width == self.output.width && input.height == self.output.height,
            "GpuThreshold: input is {}×{}, stage is {}×{}",
            input.width, input.height, self.output.width, self.output.height,
        );

        let id = input.texture.global_id();
        if self.bound.as_ref().map(|(bound_id, _)| *bound_id) != Some(id) {
            self.bound = None;
        }
        let (_, bind_group) = self.bound.get_or_insert_with(|| {
            (id, self.kernel.bind_group(gpu, &input.view, &self.output.view, &self.params_buf))
        });
        self.kernel.dispatch(gpu, encoder, bind_group, self.output.width, self.output.height);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::Image;

    #[test]
    fn test_params_layout() {
        assert_eq!(std::mem::size_of::<ThresholdParams>(), 16);
    }

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
    fn inner_threshold_matches_cpu() {
        let gpu = GpuDevice::new().expect("need Vulkan GPU");
        // Ramp with exact 0.5 samples to pin down the strict comparison.
        let ramp = Image::from_fn(33, 9, |x, _| x as f32 / 32.0);
        let src = GpuMask::from_image(&gpu, &ramp, "threshold src");
        let mut stage = GpuThreshold::new(&gpu, Threshold::default(), 33, 9);

        let mut encoder = gpu.device.create_command_encoder(&Default::default());
        stage.encode(&gpu, &mut encoder, &src);
        gpu.queue.submit(std::iter::once(encoder.finish()));

        let got = stage.output().readback(&gpu);
        assert_eq!(got, Threshold::default().apply(&ramp));
        assert_eq!(got.get(16, 0), 0.0);
        assert_eq!(got.get(17, 0), 1.0);
        println!("GPU_TEST_OK");
    }

    #[test]
    #[ignore = "requires a real Vulkan GPU"]
    fn test_threshold_matches_cpu() {
        let out = run_gpu_test_in_subprocess("gpu::threshold::tests::inner_threshold_matches_cpu");
        assert!(out.contains("GPU_TEST_OK"), "inner test failed:\n{out}");
    }
}
