//! Upload-and-blit path from a CPU frame to the swapchain
//!
//! The engine renders packed 32-bit pixels into a [`FrameTarget`]. Each
//! present copies them into a sampled texture and draws one letterboxed
//! quad generated in the vertex stage.

use super::{letterbox_scale, FrameTarget, PixelFormat};
use bytemuck::{Pod, Zeroable};

/// Vertices in the generated triangle strip
const STRIP_LEN: u32 = 4;

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
struct FitUniform {
    extent: [f32; 2],
    _unused: [f32; 2],
}

impl FitUniform {
    fn new(extent: [f32; 2]) -> Self {
        Self {
            extent,
            _unused: [0.0; 2],
        }
    }
}

/// Sampled copy of the last uploaded frame
struct UploadedFrame {
    texture: wgpu::Texture,
    bindings: wgpu::BindGroup,
    dims: (u32, u32),
    format: PixelFormat,
}

impl UploadedFrame {
    fn matches(&self, frame: &FrameTarget) -> bool {
        self.dims == (frame.width, frame.height) && self.format == frame.format
    }
}

pub(super) struct BlitPipeline {
    pipeline: wgpu::RenderPipeline,
    layout: wgpu::BindGroupLayout,
    fit: wgpu::Buffer,
    filter: wgpu::Sampler,
    frame: Option<UploadedFrame>,
    output_format: wgpu::TextureFormat,
}

fn layout_entry(binding: u32, visibility: wgpu::ShaderStages, ty: wgpu::BindingType) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty,
        count: None,
    }
}

impl BlitPipeline {
    pub fn new(device: &wgpu::Device, output_format: wgpu::TextureFormat) -> Self {
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("vidpane blit"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/blit.wgsl").into()),
        });

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("vidpane blit bindings"),
            entries: &[
                layout_entry(
                    0,
                    wgpu::ShaderStages::VERTEX,
                    wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: wgpu::BufferSize::new(std::mem::size_of::<FitUniform>() as u64),
                    },
                ),
                layout_entry(
                    1,
                    wgpu::ShaderStages::FRAGMENT,
                    wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                ),
                layout_entry(
                    2,
                    wgpu::ShaderStages::FRAGMENT,
                    wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                ),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: None,
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("vidpane blit"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &module,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &module,
                entry_point: Some("fs_main"),
                targets: &[Some(output_format.into())],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleStrip,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: Default::default(),
            multiview: None,
            cache: None,
        });

        let fit = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("vidpane blit fit"),
            size: std::mem::size_of::<FitUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let filter = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("vidpane blit filter"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        Self {
            pipeline,
            layout,
            fit,
            filter,
            frame: None,
            output_format,
        }
    }

    pub fn target_format(&self) -> wgpu::TextureFormat {
        self.output_format
    }

    /// Copy `frame` to the GPU, reallocating when its size or format changed
    pub fn upload(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, frame: &FrameTarget) {
        if frame.is_empty() {
            return;
        }
        if !self.frame.as_ref().is_some_and(|f| f.matches(frame)) {
            self.frame = Some(self.allocate(device, frame));
        }
        let Some(uploaded) = &self.frame else {
            return;
        };

        let extent = wgpu::Extent3d {
            width: frame.width,
            height: frame.height,
            depth_or_array_layers: 1,
        };
        queue.write_texture(
            uploaded.texture.as_image_copy(),
            &frame.pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(frame.stride as u32),
                rows_per_image: Some(frame.height),
            },
            extent,
        );
    }

    /// Scale the quad so the frame fits `surface_size` with bars
    pub fn set_viewport(&self, queue: &wgpu::Queue, surface_size: (u32, u32)) {
        let dims = self.frame.as_ref().map_or((0, 0), |f| f.dims);
        let fit = FitUniform::new(letterbox_scale(dims, surface_size));
        queue.write_buffer(&self.fit, 0, bytemuck::bytes_of(&fit));
    }

    /// Clear `target` to black, then draw the frame if one was uploaded
    pub fn draw(&self, encoder: &mut wgpu::CommandEncoder, target: &wgpu::TextureView) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("vidpane blit"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            ..Default::default()
        });

        if let Some(uploaded) = &self.frame {
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &uploaded.bindings, &[]);
            pass.draw(0..STRIP_LEN, 0..1);
        }
    }

    fn allocate(&self, device: &wgpu::Device, frame: &FrameTarget) -> UploadedFrame {
        log::debug!(
            "Allocating {}x{} {:?} frame texture",
            frame.width,
            frame.height,
            frame.format
        );
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("vidpane frame"),
            size: wgpu::Extent3d {
                width: frame.width,
                height: frame.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: frame.format.texture_format(),
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&Default::default());

        let bindings = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("vidpane blit bindings"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.fit.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&self.filter),
                },
            ],
        });

        UploadedFrame {
            texture,
            bindings,
            dims: (frame.width, frame.height),
            format: frame.format,
        }
    }
}
