//! wgpu device: stages are WGSL fragment shaders drawn over a fullscreen
//! triangle into float render targets.
//!
//! The surface is an offscreen `Rgba8Unorm` texture; hosts read it back
//! and present it however they like.

mod shaders;

use std::collections::HashMap;
use std::future::Future;
use std::pin::pin;
use std::task::{Context, Poll, Waker};

use glam::Vec4;
use thiserror::Error;
use tokio::sync::oneshot;
use wgpu::util::DeviceExt;

use crate::capabilities::{Capabilities, FilterMode, FormatSupport, TextureFormat};
use crate::device::{Blend, Device, Draw, Source, Target};
use crate::stage::{Define, StageError, StageKind, StageParams};

pub use shaders::source as stage_source;

const SURFACE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
const READBACK_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;

#[derive(Debug, Error)]
pub enum GpuError {
    #[error("no GPU adapter found")]
    NoAdapter,
    #[error("failed to open device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),
    #[error(transparent)]
    Stage(#[from] StageError),
}

fn wgpu_format(format: TextureFormat) -> wgpu::TextureFormat {
    match format {
        TextureFormat::R16Float => wgpu::TextureFormat::R16Float,
        TextureFormat::Rg16Float => wgpu::TextureFormat::Rg16Float,
        TextureFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
        TextureFormat::R32Float => wgpu::TextureFormat::R32Float,
        TextureFormat::Rg32Float => wgpu::TextureFormat::Rg32Float,
        TextureFormat::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
    }
}

fn blend_state(blend: Blend) -> Option<wgpu::BlendState> {
    match blend {
        Blend::Replace => None,
        Blend::Additive => {
            let add = wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::One,
                dst_factor: wgpu::BlendFactor::One,
                operation: wgpu::BlendOperation::Add,
            };
            Some(wgpu::BlendState {
                color: add,
                alpha: add,
            })
        }
        Blend::PremultipliedOver => Some(wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING),
    }
}

/// Resolves a future that completes without waiting, such as an error
/// scope on a native backend.
fn poll_ready<F: Future>(future: F) -> Option<F::Output> {
    let mut future = pin!(future);
    let mut cx = Context::from_waker(Waker::noop());
    match future.as_mut().poll(&mut cx) {
        Poll::Ready(output) => Some(output),
        Poll::Pending => None,
    }
}

pub struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    format: wgpu::TextureFormat,
    filter: FilterMode,
    width: u32,
    height: u32,
}

impl GpuTexture {
    fn new(
        device: &wgpu::Device,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        filter: FilterMode,
        label: &str,
    ) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Self {
            texture,
            view,
            format,
            filter,
            width: width.max(1),
            height: height.max(1),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }
}

pub struct GpuKernel {
    id: u64,
    stage: StageKind,
    module: wgpu::ShaderModule,
}

impl GpuKernel {
    pub fn stage(&self) -> StageKind {
        self.stage
    }
}

type PipelineKey = (u64, wgpu::TextureFormat, Blend);

pub struct GpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    capabilities: Capabilities,
    filtering: bool,
    surface: GpuTexture,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    nearest: wgpu::Sampler,
    linear: wgpu::Sampler,
    placeholder: GpuTexture,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    readback: Option<GpuKernel>,
    next_kernel: u64,
}

impl GpuDevice {
    pub async fn new(width: u32, height: u32) -> Result<Self, GpuError> {
        let instance = wgpu::Instance::default();

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(GpuError::NoAdapter)?;

        let wanted = wgpu::Features::TEXTURE_ADAPTER_SPECIFIC_FORMAT_FEATURES
            | wgpu::Features::FLOAT32_FILTERABLE;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("riseflow"),
                    required_features: adapter.features() & wanted,
                    required_limits: wgpu::Limits::downlevel_defaults()
                        .using_resolution(adapter.limits()),
                },
                None,
            )
            .await?;

        device.on_uncaptured_error(Box::new(|err| log::error!("wgpu: {err}")));

        let capabilities = probe(&adapter, device.features());
        log::info!(
            "GPU adapter {:?}, renderable float formats {:?}",
            adapter.get_info().name,
            capabilities.renderable
        );

        // without filtering every input is bound unfilterable with a nearest sampler
        let filtering = capabilities.supports_float_filtering;
        let sampler_binding = if filtering {
            wgpu::SamplerBindingType::Filtering
        } else {
            wgpu::SamplerBindingType::NonFiltering
        };

        let texture_entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: filtering },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };
        let sampler_entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(sampler_binding),
            count: None,
        };

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("stage bindings"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                texture_entry(1),
                sampler_entry(2),
                texture_entry(3),
                sampler_entry(4),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("stage pipeline layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let sampler = |filter, label| {
            device.create_sampler(&wgpu::SamplerDescriptor {
                label: Some(label),
                address_mode_u: wgpu::AddressMode::ClampToEdge,
                address_mode_v: wgpu::AddressMode::ClampToEdge,
                address_mode_w: wgpu::AddressMode::ClampToEdge,
                mag_filter: filter,
                min_filter: filter,
                mipmap_filter: wgpu::FilterMode::Nearest,
                ..Default::default()
            })
        };
        let nearest = sampler(wgpu::FilterMode::Nearest, "nearest");
        let linear = sampler(wgpu::FilterMode::Linear, "linear");

        let surface = GpuTexture::new(&device, width, height, SURFACE_FORMAT, FilterMode::Linear, "surface");
        let placeholder = GpuTexture::new(
            &device,
            1,
            1,
            wgpu::TextureFormat::Rgba16Float,
            FilterMode::Nearest,
            "unbound input",
        );

        let mut gpu = Self {
            device,
            queue,
            capabilities,
            filtering,
            surface,
            bind_group_layout,
            pipeline_layout,
            nearest,
            linear,
            placeholder,
            pipelines: HashMap::new(),
            readback: None,
            next_kernel: 0,
        };
        gpu.readback = Some(gpu.compile_stage(StageKind::Copy, &[])?);

        Ok(gpu)
    }

    pub fn wgpu_device(&self) -> &wgpu::Device {
        &self.device
    }

    fn sampler_for(&self, texture: &GpuTexture) -> &wgpu::Sampler {
        match texture.filter {
            FilterMode::Linear if self.filtering => &self.linear,
            _ => &self.nearest,
        }
    }

    fn create_pipeline(&self, kernel: &GpuKernel, format: wgpu::TextureFormat, blend: Blend) -> wgpu::RenderPipeline {
        self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(kernel.stage.name()),
            layout: Some(&self.pipeline_layout),
            vertex: wgpu::VertexState {
                module: &kernel.module,
                entry_point: "vs_main",
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                buffers: &[],
            },
            fragment: Some(wgpu::FragmentState {
                module: &kernel.module,
                entry_point: "fs_main",
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: blend_state(blend),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
        })
    }

    fn render(
        &mut self,
        kernel: &GpuKernel,
        params: &StageParams,
        inputs: [Option<&GpuTexture>; 2],
        target: Target<'_, GpuTexture>,
        blend: Blend,
    ) {
        let format = match &target {
            Target::Surface => self.surface.format,
            Target::Texture(texture) => texture.format,
        };

        let key = (kernel.id, format, blend);
        if !self.pipelines.contains_key(&key) {
            let pipeline = self.create_pipeline(kernel, format, blend);
            self.pipelines.insert(key, pipeline);
        }
        let Some(pipeline) = self.pipelines.get(&key) else {
            return;
        };

        let view = match &target {
            Target::Surface => &self.surface.view,
            Target::Texture(texture) => &texture.view,
        };

        let uniforms = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("stage params"),
            contents: bytemuck::bytes_of(params),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let first = inputs[0].unwrap_or(&self.placeholder);
        let second = inputs[1].unwrap_or(&self.placeholder);

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(kernel.stage.name()),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniforms.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&first.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(self.sampler_for(first)),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&second.view),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::Sampler(self.sampler_for(second)),
                },
            ],
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(kernel.stage.name()),
            });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(kernel.stage.name()),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.draw(0..3, 0..1);
        }

        self.queue.submit(std::iter::once(encoder.finish()));
    }

    fn read_back(&self, texture: &GpuTexture) -> Vec<Vec4> {
        let (width, height) = (texture.width, texture.height);
        let unpadded = width * 4 * std::mem::size_of::<f32>() as u32;
        let padded = unpadded.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
            * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback"),
            size: padded as u64 * height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("readback"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &texture.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = buffer.slice(..);
        let (sender, mut receiver) = oneshot::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);

        match receiver.try_recv() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                log::error!("readback mapping failed: {err}");
                return vec![Vec4::ZERO; (width * height) as usize];
            }
            Err(err) => {
                log::error!("readback never completed: {err}");
                return vec![Vec4::ZERO; (width * height) as usize];
            }
        }

        let mut texels = Vec::with_capacity((width * height) as usize);
        {
            let data = slice.get_mapped_range();
            for row in data.chunks(padded as usize) {
                let floats: &[f32] = bytemuck::cast_slice(&row[..unpadded as usize]);
                texels.extend(floats.chunks_exact(4).map(Vec4::from_slice));
            }
        }
        buffer.unmap();
        texels
    }
}

/// Render-target support per float format. 32-bit formats only count as
/// filterable with `FLOAT32_FILTERABLE`.
fn probe(adapter: &wgpu::Adapter, features: wgpu::Features) -> Capabilities {
    let float32_filterable = features.contains(wgpu::Features::FLOAT32_FILTERABLE);

    Capabilities::from_support(Capabilities::full().renderable.into_iter().map(|format| {
        let support = adapter.get_texture_format_features(wgpu_format(format));
        let support = FormatSupport {
            renderable: support
                .allowed_usages
                .contains(wgpu::TextureUsages::RENDER_ATTACHMENT),
            filterable: support
                .flags
                .contains(wgpu::TextureFormatFeatureFlags::FILTERABLE)
                && (format.is_half() || float32_filterable),
        };
        (format, support)
    }))
}

impl Device for GpuDevice {
    type Texture = GpuTexture;
    type Kernel = GpuKernel;

    fn capabilities(&self) -> Capabilities {
        self.capabilities.clone()
    }

    fn create_texture(&mut self, width: u32, height: u32, format: TextureFormat, filter: FilterMode) -> GpuTexture {
        GpuTexture::new(&self.device, width, height, wgpu_format(format), filter, "field")
    }

    fn compile_stage(&mut self, stage: StageKind, defines: &[Define]) -> Result<GpuKernel, StageError> {
        let source = shaders::source(stage, defines);

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(stage.name()),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });
        if let Some(Some(err)) = poll_ready(self.device.pop_error_scope()) {
            return Err(StageError::Compile {
                stage: stage.name(),
                message: err.to_string(),
            });
        }

        let id = self.next_kernel;
        self.next_kernel += 1;
        log::debug!("compiled stage {} as kernel {id}", stage.name());

        Ok(GpuKernel { id, stage, module })
    }

    fn surface_size(&self) -> (u32, u32) {
        (self.surface.width, self.surface.height)
    }

    fn resize_surface(&mut self, width: u32, height: u32) {
        if self.surface_size() != (width, height) {
            self.surface = GpuTexture::new(&self.device, width, height, SURFACE_FORMAT, FilterMode::Linear, "surface");
        }
    }

    fn draw(&mut self, draw: Draw<'_, Self>) {
        let Draw {
            kernel,
            params,
            inputs,
            target,
            blend,
            ..
        } = draw;
        self.render(kernel, params, inputs, target, blend);
    }

    fn read_texels(&mut self, source: Source<'_, GpuTexture>) -> Vec<Vec4> {
        let Some(copy) = self.readback.take() else {
            return Vec::new();
        };

        // the surface cannot be bound as an input while `self` renders,
        // so it is read through a snapshot
        let snapshot;
        let texture = match source {
            Source::Surface => {
                snapshot = self.snapshot_surface();
                &snapshot
            }
            Source::Texture(texture) => texture,
        };

        let mut staging = GpuTexture::new(
            &self.device,
            texture.width,
            texture.height,
            READBACK_FORMAT,
            FilterMode::Nearest,
            "readback staging",
        );
        self.render(
            &copy,
            &StageParams::default(),
            [Some(texture), None],
            Target::Texture(&mut staging),
            Blend::Replace,
        );
        self.readback = Some(copy);

        self.read_back(&staging)
    }
}

impl GpuDevice {
    fn snapshot_surface(&self) -> GpuTexture {
        let snapshot = GpuTexture::new(
            &self.device,
            self.surface.width,
            self.surface.height,
            SURFACE_FORMAT,
            FilterMode::Nearest,
            "surface snapshot",
        );
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("surface snapshot"),
            });
        encoder.copy_texture_to_texture(
            self.surface.texture.as_image_copy(),
            snapshot.texture.as_image_copy(),
            wgpu::Extent3d {
                width: self.surface.width,
                height: self.surface.height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));
        snapshot
    }
}
