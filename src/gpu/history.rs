// gpu/history.rs — Frame history ring on the GPU.
//
// Mirrors `FrameHistory` in history.rs. The ring is a single Rgba8Unorm 2D
// array texture with one layer per slot:
//
//   layer:    0      1      2    …   N−1
//            ┌────┐ ┌────┐ ┌────┐   ┌────┐
//            │ f₇ │ │ f₈ │ │ f₉ │ … │ f₆ │      cursor → next layer to write
//            └────┘ └────┘ └────┘   └────┘
//
// Each layer has its own D2 view, which the external draw step can use as a
// render attachment (the frame is drawn straight into the ring), or frames
// can be uploaded from host memory. The background kernel reads all layers
// through one D2Array view.
//
// `begin_frame` clears the cursor layer with a render pass and returns a
// `GpuFrameSlot`; dropping the slot advances the cursor, exactly like the
// CPU `FrameSlot`.

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::convert::rgb_to_rgba8;
use crate::gpu::device::GpuDevice;
use crate::gpu::image::GpuMask;
use crate::gpu::kernel::MaskKernel;
use crate::image::{Image, Rgb};

/// Texel format of the ring layers.
pub const FRAME_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Uniform parameters (must match `Params` in background.wgsl).
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct BackgroundParams {
    width: u32,
    height: u32,
    num_slots: u32,
    latest: u32,
    cutoff: f32,
    _pad: [u32; 3],
}

/// N-layer frame ring plus the foreground-mask kernel.
pub struct GpuFrameHistory {
    texture: wgpu::Texture,
    layer_views: Vec<wgpu::TextureView>,
    kernel: MaskKernel,
    params_buf: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    mask: GpuMask,
    cursor: usize,
    latest: usize,
    foreground_distance: f32,
    width: u32,
    height: u32,
}

impl GpuFrameHistory {
    /// Allocate `len` black layers and compile the background kernel.
    ///
    /// # Panics
    /// Panics if `len == 0`.
    pub fn new(gpu: &GpuDevice, width: u32, height: u32, len: usize, foreground_distance: f32) -> Self {
        assert!(len > 0, "history ring needs at least one slot");

        // Fresh textures are zero-initialised: every layer starts black.
        let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("GpuFrameHistory ring"),
            size: wgpu::Extent3d { width, height, depth_or_array_layers: len as u32 },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: FRAME_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::COPY_DST
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });

        let layer_views = (0..len as u32)
            .map(|layer| {
                texture.create_view(&wgpu::TextureViewDescriptor {
                    label: Some("GpuFrameHistory layer"),
                    dimension: Some(wgpu::TextureViewDimension::D2),
                    base_array_layer: layer,
                    array_layer_count: Some(1),
                    ..Default::default()
                })
            })
            .collect();

        let array_view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("GpuFrameHistory array"),
            dimension: Some(wgpu::TextureViewDimension::D2Array),
            ..Default::default()
        });

        let kernel = MaskKernel::new(
            gpu,
            "background.wgsl",
            include_str!("../shaders/background.wgsl"),
            "foreground_mask",
            wgpu::TextureViewDimension::D2Array,
        );

        let params = BackgroundParams {
            width,
            height,
            num_slots: len as u32,
            latest: 0,
            cutoff: foreground_distance,
            _pad: [0; 3],
        };
        let params_buf = gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("GpuFrameHistory params"),
            contents: bytemuck::bytes_of(&params),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let mask = GpuMask::new(gpu, width, height, "GpuFrameHistory mask");
        let bind_group = kernel.bind_group(gpu, &array_view, &mask.view, &params_buf);

        GpuFrameHistory {
            texture,
            layer_views,
            kernel,
            params_buf,
            bind_group,
            mask,
            cursor: 0,
            latest: 0,
            foreground_distance,
            width,
            height,
        }
    }

    pub fn len(&self) -> usize {
        self.layer_views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layer_views.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn latest_index(&self) -> usize {
        self.latest
    }

    /// D2 view of one ring layer.
    pub fn layer_view(&self, index: usize) -> &wgpu::TextureView {
        &self.layer_views[index]
    }

    /// Foreground mask written by the last `encode_foreground`.
    pub fn mask(&self) -> &GpuMask {
        &self.mask
    }

    /// Clear the cursor layer and open it as this frame's write target.
    pub fn begin_frame<'a>(&'a mut self, gpu: &'a GpuDevice) -> GpuFrameSlot<'a> {
        let index = self.cursor;
        self.latest = index;

        let mut encoder = gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("GpuFrameHistory::begin_frame"),
        });
        {
            let _clear = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("clear history slot"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.layer_views[index],
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        }
        gpu.queue.submit(std::iter::once(encoder.finish()));

        GpuFrameSlot { history: self, gpu, index }
    }

    /// One full begin/upload/end cycle from a host frame.
    pub fn push(&mut self, gpu: &GpuDevice, frame: &Image<Rgb>) {
        let slot = self.begin_frame(gpu);
        slot.upload(frame);
    }

    /// Record the foreground-mask pass into `encoder`, writing `mask()`.
    pub fn encode_foreground(&self, gpu: &GpuDevice, encoder: &mut wgpu::CommandEncoder) {
        let params = BackgroundParams {
            width: self.width,
            height: self.height,
            num_slots: self.len() as u32,
            latest: self.latest as u32,
            cutoff: self.foreground_distance,
            _pad: [0; 3],
        };
        gpu.queue.write_buffer(&self.params_buf, 0, bytemuck::bytes_of(&params));
        self.kernel.dispatch(gpu, encoder, &self.bind_group, self.width, self.height);
    }

    fn end_frame(&mut self) {
        self.cursor = (self.cursor + 1) % self.layer_views.len();
    }

    fn write_layer(&self, gpu: &GpuDevice, index: usize, rgba: &[u8]) {
        assert_eq!(
            rgba.len(),
            (self.width * self.height * 4) as usize,
            "frame upload must be {}×{} RGBA8",
            self.width,
            self.height,
        );
        gpu.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d { x: 0, y: 0, z: index as u32 },
                aspect: wgpu::TextureAspect::All,
            },
            rgba,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(self.width * 4),
                rows_per_image: Some(self.height),
            },
            wgpu::Extent3d { width: self.width, height: self.height, depth_or_array_layers: 1 },
        );
    }
}

/// Write access to one ring layer for the duration of a frame.
pub struct GpuFrameSlot<'a> {
    history: &'a mut GpuFrameHistory,
    gpu: &'a GpuDevice,
    index: usize,
}

impl GpuFrameSlot<'_> {
    pub fn index(&self) -> usize {
        self.index
    }

    /// Render-attachment view of this slot's layer, for drawing the frame
    /// directly on the GPU.
    pub fn view(&self) -> &wgpu::TextureView {
        &self.history.layer_views[self.index]
    }

    /// Upload a host frame into this slot.
    ///
    /// # Panics
    /// Panics if `frame` does not match the ring's dimensions.
    pub fn upload(&self, frame: &Image<Rgb>) {
        self.upload_rgba8(&rgb_to_rgba8(frame));
    }

    /// Upload packed RGBA8 bytes into this slot.
    pub fn upload_rgba8(&self, rgba: &[u8]) {
        self.history.write_layer(self.gpu, self.index, rgba);
    }

    /// End the frame explicitly. Equivalent to dropping the slot.
    pub fn end(self) {}
}

impl Drop for GpuFrameSlot<'_> {
    fn drop(&mut self) {
        self.history.end_frame();
    }
}
