// gpu/image.rs — Device-resident masks and row staging.
//
// Every mask stage on the GPU reads one `R32Float` texture and writes
// another. `GpuMask` is that texture plus its view; the same texture is
// bound as `texture_2d<f32>` when read and as a write-only storage texture
// when written, so one allocation serves both roles across passes.
//
// ROW ALIGNMENT
// ─────────────
// `copy_texture_to_buffer` needs `bytes_per_row` to be a multiple of
// `COPY_BYTES_PER_ROW_ALIGNMENT` (256). A 320-pixel R32Float row is 1280
// bytes, which happens to be aligned, but 100 pixels (400 bytes) is not.
// Readback buffers are therefore sized with padded rows and the padding is
// stripped on the host:
//
//   buffer row y: [ w × 4 bytes of texels | padding up to 256k ]
//
// `queue.write_texture` has no such restriction, so uploads go straight
// from the host slice.

use crate::gpu::device::GpuDevice;
use crate::image::Image;

/// Texel format of every mask texture.
pub const MASK_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R32Float;

const COPY_ALIGNMENT: u32 = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

/// A single-channel f32 mask resident on the GPU.
pub struct GpuMask {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
}

impl GpuMask {
    /// Allocate a zeroed mask usable as a sampled input, a storage output,
    /// and both ends of a copy.
    pub fn new(gpu: &GpuDevice, width: u32, height: u32, label: &str) -> Self {
        let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: MASK_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::STORAGE_BINDING
                | wgpu::TextureUsages::COPY_DST
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        GpuMask { texture, view, width, height }
    }

    /// Allocate and fill from a host mask.
    pub fn from_image(gpu: &GpuDevice, src: &Image<f32>, label: &str) -> Self {
        let mask = Self::new(gpu, src.width() as u32, src.height() as u32, label);
        mask.upload(gpu, src);
        mask
    }

    pub fn extent(&self) -> wgpu::Extent3d {
        wgpu::Extent3d { width: self.width, height: self.height, depth_or_array_layers: 1 }
    }

    /// Overwrite the texture with `src`. Queued; visible to the next
    /// submission.
    ///
    /// # Panics
    /// Panics if `src` is not `width × height`.
    pub fn upload(&self, gpu: &GpuDevice, src: &Image<f32>) {
        assert!(
            src.width() as u32 == self.width && src.height() as u32 == self.height,
            "GpuMask::upload: {}×{} into {}×{}",
            src.width(), src.height(), self.width, self.height,
        );
        gpu.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytemuck::cast_slice(src.as_slice()),
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(self.width * 4),
                rows_per_image: Some(self.height),
            },
            self.extent(),
        );
    }

    /// Record a copy of the whole mask into `buffer`, which must hold
    /// `padded_row_bytes(width) * height` bytes.
    pub fn encode_copy_to_buffer(&self, encoder: &mut wgpu::CommandEncoder, buffer: &wgpu::Buffer) {
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row_bytes(self.width)),
                    rows_per_image: Some(self.height),
                },
            },
            self.extent(),
        );
    }

    /// Blocking read of the whole mask. Stalls the queue; for tests and
    /// debug views only.
    pub fn readback(&self, gpu: &GpuDevice) -> Image<f32> {
        let size = (padded_row_bytes(self.width) * self.height) as u64;
        let buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("GpuMask::readback"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("GpuMask::readback") });
        self.encode_copy_to_buffer(&mut encoder, &buffer);
        gpu.queue.submit(std::iter::once(encoder.finish()));

        let slice = buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |r| {
            tx.send(r).expect("readback channel closed");
        });
        gpu.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .expect("readback map callback never fired")
            .expect("readback map failed");

        let mut out = Image::new(self.width as usize, self.height as usize);
        {
            let mapped = slice.get_mapped_range();
            unpad_rows_f32(&mapped, self.width as usize, out.as_mut_slice());
        }
        buffer.unmap();
        out
    }
}

/// Round `value` up to the next multiple of `alignment`.
#[inline]
pub(crate) fn align_to(value: u32, alignment: u32) -> u32 {
    (value + alignment - 1) / alignment * alignment
}

/// Bytes per buffer row for an R32Float copy of `width` texels.
#[inline]
pub fn padded_row_bytes(width: u32) -> u32 {
    align_to(width * 4, COPY_ALIGNMENT)
}

/// Strip row padding from a mapped R32Float copy into a packed f32 slice
/// `width` texels wide.
pub(crate) fn unpad_rows_f32(padded: &[u8], width: usize, out: &mut [f32]) {
    let stride = padded_row_bytes(width as u32) as usize;
    for (dst_row, src_row) in out.chunks_exact_mut(width).zip(padded.chunks(stride)) {
        for (d, texel) in dst_row.iter_mut().zip(src_row.chunks_exact(4)) {
            *d = f32::from_le_bytes([texel[0], texel[1], texel[2], texel[3]]);
        }
    }
}

/// Same as [`unpad_rows_f32`], converting each texel to a 0/255 byte.
pub(crate) fn unpad_rows_to_u8(padded: &[u8], width: usize, out: &mut [u8]) {
    let stride = padded_row_bytes(width as u32) as usize;
    for (dst_row, src_row) in out.chunks_exact_mut(width).zip(padded.chunks(stride)) {
        for (d, texel) in dst_row.iter_mut().zip(src_row.chunks_exact(4)) {
            let v = f32::from_le_bytes([texel[0], texel[1], texel[2], texel[3]]);
            *d = (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        }
    }
}
