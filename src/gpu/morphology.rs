// gpu/morphology.rs — Erode / dilate on the GPU.
//
// Mirrors `morphology.rs`. Same six-tap stencil, same cutoffs, same
// clamp-to-edge borders, same ownership model: the two scratch masks live
// in a `GpuPingPong` that is passed by value into each call and handed back,
// so the caller always knows which texture holds the result.
//
// Each pass binds slot[read] as input and slot[1 − read] as output, then
// flips `read`. Because the pair never changes its textures, all four
// (operation × direction) bind groups are built once with the pair.
//
// Passes are only *recorded* here. Nothing runs until the caller submits
// the encoder, and consecutive compute passes in one encoder are ordered by
// wgpu, so no explicit barriers are needed between iterations.

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::gpu::device::GpuDevice;
use crate::gpu::image::GpuMask;
use crate::gpu::kernel::MaskKernel;
use crate::morphology::MorphOp;

/// Uniform parameters (must match `Params` in morphology.wgsl).
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct MorphParams {
    width: u32,
    height: u32,
    neighbour_cutoff: f32,
    _pad: u32,
}

fn op_index(op: MorphOp) -> usize {
    match op {
        MorphOp::Erode => 0,
        MorphOp::Dilate => 1,
    }
}

/// Two scratch masks, the index of the one holding the result, and the
/// bind groups for every pass they can take part in.
pub struct GpuPingPong {
    slots: [GpuMask; 2],
    read: usize,
    /// `[op][read slot]`
    bind_groups: [[wgpu::BindGroup; 2]; 2],
    _params: [wgpu::Buffer; 2],
}

impl GpuPingPong {
    /// Copy `src` into the read slot so the next pass uses it as input.
    ///
    /// # Panics
    /// Panics if `src` differs in size from the pair.
    pub fn load(self, encoder: &mut wgpu::CommandEncoder, src: &GpuMask) -> Self {
        let dst = &self.slots[self.read];
        assert!(
            src.width == dst.width && src.height == dst.height,
            "GpuPingPong::load: {}×{} into {}×{}",
            src.width, src.height, dst.width, dst.height,
        );
        encoder.copy_texture_to_texture(
            src.texture.as_image_copy(),
            dst.texture.as_image_copy(),
            dst.extent(),
        );
        self
    }

    /// Mask produced by the most recent pass (or the loaded input).
    pub fn read(&self) -> &GpuMask {
        &self.slots[self.read]
    }

    /// Index of the slot in the read role. Flips once per pass.
    pub fn read_slot(&self) -> usize {
        self.read
    }

    pub fn width(&self) -> u32 {
        self.slots[0].width
    }

    pub fn height(&self) -> u32 {
        self.slots[0].height
    }
}

/// The compiled morphology kernel.
pub struct GpuMorphology {
    kernel: MaskKernel,
}

impl GpuMorphology {
    pub fn new(gpu: &GpuDevice) -> Self {
        let kernel = MaskKernel::new(
            gpu,
            "morphology.wgsl",
            include_str!("../shaders/morphology.wgsl"),
            "morph_pass",
            wgpu::TextureViewDimension::D2,
        );
        GpuMorphology { kernel }
    }

    /// Allocate a zeroed pair of `width × height` masks wired to this
    /// kernel. Slot 0 starts in the read role.
    pub fn ping_pong(&self, gpu: &GpuDevice, width: u32, height: u32) -> GpuPingPong {
        let slots = [
            GpuMask::new(gpu, width, height, "GpuPingPong slot 0"),
            GpuMask::new(gpu, width, height, "GpuPingPong slot 1"),
        ];

        let params = [MorphOp::Erode, MorphOp::Dilate].map(|op| {
            let p = MorphParams { width, height, neighbour_cutoff: op.neighbour_cutoff(), _pad: 0 };
            gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("GpuMorphology params"),
                contents: bytemuck::bytes_of(&p),
                usage: wgpu::BufferUsages::UNIFORM,
            })
        });

        let bind_groups = [0, 1].map(|op| {
            [0, 1].map(|read| {
                self.kernel.bind_group(gpu, &slots[read].view, &slots[1 - read].view, &params[op])
            })
        });

        GpuPingPong { slots, read: 0, bind_groups, _params: params }
    }

    /// Record `iterations` erode passes on the pair's read slot.
    pub fn erode(
        &self,
        gpu: &GpuDevice,
        encoder: &mut wgpu::CommandEncoder,
        buffers: GpuPingPong,
        iterations: usize,
    ) -> GpuPingPong {
        self.run(gpu, encoder, buffers, MorphOp::Erode, iterations)
    }

    /// Record `iterations` dilate passes on the pair's read slot.
    pub fn dilate(
        &self,
        gpu: &GpuDevice,
        encoder: &mut wgpu::CommandEncoder,
        buffers: GpuPingPong,
        iterations: usize,
    ) -> GpuPingPong {
        self.run(gpu, encoder, buffers, MorphOp::Dilate, iterations)
    }

    /// Zero iterations record nothing and leave the read slot untouched.
    pub fn run(
        &self,
        gpu: &GpuDevice,
        encoder: &mut wgpu::CommandEncoder,
        mut buffers: GpuPingPong,
        op: MorphOp,
        iterations: usize,
    ) -> GpuPingPong {
        let (w, h) = (buffers.width(), buffers.height());
        for _ in 0..iterations {
            let bind_group = &buffers.bind_groups[op_index(op)][buffers.read];
            self.kernel.dispatch(gpu, encoder, bind_group, w, h);
            buffers.read = 1 - buffers.read;
        }
        buffers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::Image;
    use crate::morphology::PingPong;

    #[test]
    fn test_params_layout() {
        assert_eq!(std::mem::size_of::<MorphParams>(), 16);
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

    fn blobs(w: usize, h: usize) -> Image<f32> {
        Image::from_fn(w, h, |x, y| {
            let in_rect = (4..20).contains(&x) && (3..14).contains(&y);
            let speck = (x * 7 + y * 13) % 17 == 0;
            let edge = x == 0 && y > h / 2;
            if in_rect || speck || edge { 1.0 } else { 0.0 }
        })
    }

    #[test]
    #[ignore = "GPU integration: run via outer subprocess wrapper"]
    fn inner_erode_dilate_matches_cpu() {
        let gpu = GpuDevice::new().expect("need Vulkan GPU");
        let (w, h) = (45, 29);
        let mask = blobs(w, h);
        let src = GpuMask::from_image(&gpu, &mask, "morph src");
        let morph = GpuMorphology::new(&gpu);

        for (e, d) in [(0, 0), (1, 0), (0, 1), (2, 3), (3, 2)] {
            let mut encoder = gpu.device.create_command_encoder(&Default::default());
            let buffers = morph.ping_pong(&gpu, w as u32, h as u32).load(&mut encoder, &src);
            let buffers = morph.erode(&gpu, &mut encoder, buffers, e);
            let buffers = morph.dilate(&gpu, &mut encoder, buffers, d);
            gpu.queue.submit(std::iter::once(encoder.finish()));

            let expected = PingPong::new(w, h).load(&mask).erode(e).dilate(d);
            assert_eq!(buffers.read_slot(), expected.read_slot());
            assert_eq!(buffers.read().readback(&gpu), *expected.read(), "erode {e}, dilate {d}");
        }
        println!("GPU_TEST_OK");
    }

    #[test]
    #[ignore = "requires a real Vulkan GPU"]
    fn test_erode_dilate_matches_cpu() {
        let out = run_gpu_test_in_subprocess("gpu::morphology::tests::inner_erode_dilate_matches_cpu");
        assert!(out.contains("GPU_TEST_OK"), "inner test failed:\n{out}");
    }
}
