// gpu/kernel.rs — Shared shape of the per-pixel mask kernels.
//
// Every mask stage is the same kind of compute pass:
//
//   binding 0  texture_2d<f32> (or texture_2d_array<f32>)   input
//   binding 1  texture_storage_2d<r32float, write>          output
//   binding 2  uniform                                      stage params
//
// dispatched once per pixel over the frame. `MaskKernel` holds the compiled
// pipeline and its bind group layout; stages build their bind groups once
// (the textures they touch never change) and call `dispatch` per pass.

use crate::gpu::device::GpuDevice;
use crate::gpu::image::MASK_FORMAT;

/// A compiled single-input, single-output mask kernel.
pub struct MaskKernel {
    pipeline: wgpu::ComputePipeline,
    bgl: wgpu::BindGroupLayout,
    label: &'static str,
}

impl MaskKernel {
    /// Compile `entry_point` from a WGSL template. `input` is the view
    /// dimension of binding 0.
    pub fn new(
        gpu: &GpuDevice,
        label: &'static str,
        template: &str,
        entry_point: &'static str,
        input: wgpu::TextureViewDimension,
    ) -> Self {
        let shader = gpu.shader_module(label, template);

        let bgl = gpu.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(label),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: input,
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::StorageTexture {
                        access: wgpu::StorageTextureAccess::WriteOnly,
                        format: MASK_FORMAT,
                        view_dimension: wgpu::TextureViewDimension::D2,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let layout = gpu.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(label),
            bind_group_layouts: &[&bgl],
            push_constant_ranges: &[],
        });

        let pipeline = gpu.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(entry_point),
            layout: Some(&layout),
            module: &shader,
            entry_point,
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });

        MaskKernel { pipeline, bgl, label }
    }

    /// Bind `input` → `output` with `params`.
    pub fn bind_group(
        &self,
        gpu: &GpuDevice,
        input: &wgpu::TextureView,
        output: &wgpu::TextureView,
        params: &wgpu::Buffer,
    ) -> wgpu::BindGroup {
        gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(self.label),
            layout: &self.bgl,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: wgpu::BindingResource::TextureView(input) },
                wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::TextureView(output) },
                wgpu::BindGroupEntry { binding: 2, resource: params.as_entire_binding() },
            ],
        })
    }

    /// Record one pass over a `width × height` frame.
    pub fn dispatch(
        &self,
        gpu: &GpuDevice,
        encoder: &mut wgpu::CommandEncoder,
        bind_group: &wgpu::BindGroup,
        width: u32,
        height: u32,
    ) {
        let (wg_x, wg_y) = gpu.dispatch_size(width, height);
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(self.label),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        pass.dispatch_workgroups(wg_x, wg_y, 1);
    }
}
