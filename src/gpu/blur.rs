// gpu/blur.rs — Separable Gaussian on the GPU.
//
// Mirrors `GaussianBlur` in blur.rs: the CPU type computes and normalizes
// the weights, this stage uploads them once and runs the two passes:
//
//   input ──(dir 1,0)──▶ intermediate ──(dir 0,1)──▶ output
//
// The textures are owned by the stage and the bind groups are rebuilt only
// when the input texture changes (the tracker always feeds the same one).

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::blur::GaussianBlur;
use crate::config::{BlurConfig, MAX_TAPS};
use crate::gpu::device::{GpuDevice, GpuError};
use crate::gpu::image::GpuMask;
use crate::gpu::kernel::MaskKernel;

/// Uniform parameters (must match `Params` in blur.wgsl).
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct BlurParams {
    width: u32,
    height: u32,
    num_taps: u32,
    stride: u32,
    dir_x: i32,
    dir_y: i32,
    _pad: [u32; 2],
    weights: [[f32; 4]; MAX_TAPS / 4],
}

impl BlurParams {
    fn new(blur: &GaussianBlur, width: u32, height: u32, (dir_x, dir_y): (i32, i32)) -> Self {
        BlurParams {
            width,
            height,
            num_taps: blur.taps() as u32,
            stride: blur.stride() as u32,
            dir_x,
            dir_y,
            _pad: [0; 2],
            weights: blur.packed_weights(),
        }
    }
}

pub struct GpuBlur {
    blur: GaussianBlur,
    kernel: MaskKernel,
    params: [wgpu::Buffer; 2],
    intermediate: GpuMask,
    output: GpuMask,
    /// Horizontal pass bind group and the input it was built for.
    bound: Option<(wgpu::Id<wgpu::Texture>, wgpu::BindGroup)>,
    vertical: wgpu::BindGroup,
}

impl GpuBlur {
    /// Compute weights for `config` and allocate `width × height` targets.
    pub fn new(gpu: &GpuDevice, config: &BlurConfig, width: u32, height: u32) -> Result<Self, GpuError> {
        let blur = GaussianBlur::from_config(config)?;
        Ok(Self::from_blur(gpu, blur, width, height))
    }

    pub fn from_blur(gpu: &GpuDevice, blur: GaussianBlur, width: u32, height: u32) -> Self {
        let kernel = MaskKernel::new(
            gpu,
            "blur.wgsl",
            include_str!("../shaders/blur.wgsl"),
            "blur_pass",
            wgpu::TextureViewDimension::D2,
        );

        let params = [(1, 0), (0, 1)].map(|dir| {
            let p = BlurParams::new(&blur, width, height, dir);
            gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("GpuBlur params"),
                contents: bytemuck::bytes_of(&p),
                usage: wgpu::BufferUsages::UNIFORM,
            })
        });

        let intermediate = GpuMask::new(gpu, width, height, "GpuBlur intermediate");
        let output = GpuMask::new(gpu, width, height, "GpuBlur output");
        let vertical = kernel.bind_group(gpu, &intermediate.view, &output.view, &params[1]);

        GpuBlur { blur, kernel, params, intermediate, output, bound: None, vertical }
    }

    /// The CPU kernel whose weights this stage runs.
    pub fn kernel(&self) -> &GaussianBlur {
        &self.blur
    }

    /// Result of the last recorded `encode`.
    pub fn output(&self) -> &GpuMask {
        &self.output
    }

    /// Record both passes over `input`.
    ///
    /// # Panics
    /// Panics if `input` differs in size from the stage.
    pub fn encode(&mut self, gpu: &GpuDevice, encoder: &mut wgpu::CommandEncoder, input: &GpuMask) {
        assert!(
            input.width == self.output.width && input.height == self.output.height,
            "GpuBlur: input is {}×{}, stage is {}×{}",
            input.width, input.height, self.output.width, self.output.height,
        );

        let id = input.texture.global_id();
        if self.bound.as_ref().map(|(bound_id, _)| *bound_id) != Some(id) {
            self.bound = None;
        }
        let (_, horizontal) = self.bound.get_or_insert_with(|| {
            (id, self.kernel.bind_group(gpu, &input.view, &self.intermediate.view, &self.params[0]))
        });

        let (w, h) = (self.output.width, self.output.height);
        self.kernel.dispatch(gpu, encoder, horizontal, w, h);
        self.kernel.dispatch(gpu, encoder, &self.vertical, w, h);
    }
}
