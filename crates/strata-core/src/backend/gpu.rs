//! wgpu backend. Every pipeline variant shares the compositor WGSL module and
//! one bind group layout; recorded commands are turned into triangle lists
//! and uniform buffers at submit time.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use wgpu::util::DeviceExt;

use strata_shaders::{FragmentUniform, FrameUniform, MAX_GRADIENT_STOPS, filter, program};

use crate::color::{BlendMode, Color};
use crate::error::{RenderError, Result};
use crate::filters::{BlurStyle, ColorFilter};
use crate::formats::{
    LoadAction, MinMagFilter, PixelFormat, SamplerAddressMode, SamplerDescriptor, StorageMode,
    StoreAction, TextureDescriptor, TextureUsage, TileMode,
};
use crate::geometry::{ISize, Matrix, Point};
use crate::renderer::{
    Allocator, BackendType, BlitCommand, BlitPass, Capabilities, Command, CommandBuffer, Context,
    FragmentInfo, PipelineDescriptor, RenderPass, RenderTarget, StencilMode, Texture, TextureRef,
};

pub fn to_wgpu_format(format: PixelFormat) -> wgpu::TextureFormat {
    match format {
        PixelFormat::R8G8B8A8UNormInt => wgpu::TextureFormat::Rgba8Unorm,
        PixelFormat::B8G8R8A8UNormInt => wgpu::TextureFormat::Bgra8Unorm,
        PixelFormat::R8G8B8A8UNormIntSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
        PixelFormat::R16G16B16A16Float => wgpu::TextureFormat::Rgba16Float,
        PixelFormat::S8UInt => wgpu::TextureFormat::Stencil8,
        PixelFormat::D24UnormS8Uint => wgpu::TextureFormat::Depth24PlusStencil8,
    }
}

#[derive(Debug)]
pub struct WgpuTexture {
    descriptor: TextureDescriptor,
    texture: wgpu::Texture,
}

impl WgpuTexture {
    pub fn raw(&self) -> &wgpu::Texture {
        &self.texture
    }

    /// Base level view, used both as attachment and for sampling.
    fn view(&self) -> wgpu::TextureView {
        self.texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("strata:view"),
            base_mip_level: 0,
            mip_level_count: Some(1),
            ..Default::default()
        })
    }
}

impl Texture for WgpuTexture {
    fn descriptor(&self) -> &TextureDescriptor {
        &self.descriptor
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn gpu_texture(texture: &TextureRef) -> Result<&WgpuTexture> {
    texture
        .as_any()
        .downcast_ref::<WgpuTexture>()
        .ok_or_else(|| RenderError::Backend("texture was not created by the wgpu backend".into()))
}

pub struct WgpuAllocator {
    device: Arc<wgpu::Device>,
}

impl Allocator for WgpuAllocator {
    fn create_texture(&self, desc: &TextureDescriptor) -> Option<TextureRef> {
        let max = self.max_texture_size();
        if desc.size.is_empty() || desc.size.width > max.width || desc.size.height > max.height {
            tracing::warn!(size = ?desc.size, ?max, "texture allocation refused");
            return None;
        }
        let usage = if desc.format.is_stencil() {
            wgpu::TextureUsages::RENDER_ATTACHMENT
        } else {
            let mut usage = wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST;
            if desc.usage.contains(TextureUsage::RENDER_TARGET) {
                usage |= wgpu::TextureUsages::RENDER_ATTACHMENT;
            }
            if desc.usage.contains(TextureUsage::COPY) || desc.storage_mode == StorageMode::HostVisible {
                usage |= wgpu::TextureUsages::COPY_SRC;
            }
            usage
        };
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("strata:tex"),
            size: wgpu::Extent3d {
                width: desc.size.width as u32,
                height: desc.size.height as u32,
                depth_or_array_layers: 1,
            },
            mip_level_count: desc.mip_count.max(1),
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: to_wgpu_format(desc.format),
            usage,
            view_formats: &[],
        });
        Some(Arc::new(WgpuTexture { descriptor: desc.clone(), texture }))
    }

    fn max_texture_size(&self) -> ISize {
        let max = self.device.limits().max_texture_dimension_2d as i64;
        ISize::new(max, max)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct PipelineKey {
    descriptor: PipelineDescriptor,
    stencil_format: Option<wgpu::TextureFormat>,
}

struct PipelineCache {
    shader: wgpu::ShaderModule,
    bind_group_layout: wgpu::BindGroupLayout,
    layout: wgpu::PipelineLayout,
    pipelines: Mutex<HashMap<PipelineKey, Arc<wgpu::RenderPipeline>>>,
    samplers: Mutex<HashMap<SamplerDescriptor, Arc<wgpu::Sampler>>>,
    placeholder: wgpu::Texture,
}

fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

impl PipelineCache {
    fn new(device: &wgpu::Device) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("compositor-shader"),
            source: wgpu::ShaderSource::Wgsl(strata_shaders::COMPOSITOR_WGSL.into()),
        });
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("compositor-bgl"),
            entries: &[
                uniform_entry(0),
                uniform_entry(1),
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("compositor-pipeline-layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let placeholder = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("compositor-placeholder"),
            size: wgpu::Extent3d { width: 1, height: 1, depth_or_array_layers: 1 },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        Self {
            shader,
            bind_group_layout,
            layout,
            pipelines: Mutex::new(HashMap::new()),
            samplers: Mutex::new(HashMap::new()),
            placeholder,
        }
    }

    fn pipeline(&self, device: &wgpu::Device, key: PipelineKey) -> Arc<wgpu::RenderPipeline> {
        let mut pipelines = self.pipelines.lock().unwrap_or_else(|p| p.into_inner());
        pipelines
            .entry(key)
            .or_insert_with(|| Arc::new(self.create_pipeline(device, key)))
            .clone()
    }

    fn create_pipeline(&self, device: &wgpu::Device, key: PipelineKey) -> wgpu::RenderPipeline {
        let desc = key.descriptor;
        tracing::debug!(kind = ?desc.kind, blend = ?desc.blend_mode, stencil = ?desc.stencil_mode, "creating pipeline");
        let write_mask = if desc.blend_mode == BlendMode::Destination {
            wgpu::ColorWrites::empty()
        } else {
            wgpu::ColorWrites::ALL
        };
        let depth_stencil = key.stencil_format.map(|format| {
            let face = stencil_face(desc.stencil_mode);
            wgpu::DepthStencilState {
                format,
                depth_write_enabled: false,
                depth_compare: wgpu::CompareFunction::Always,
                stencil: wgpu::StencilState {
                    front: face,
                    back: face,
                    read_mask: 0xff,
                    write_mask: if matches!(desc.stencil_mode, StencilMode::Ignore | StencilMode::ClipCompare) {
                        0
                    } else {
                        0xff
                    },
                },
                bias: wgpu::DepthBiasState::default(),
            }
        });
        device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("compositor-pipeline"),
            layout: Some(&self.layout),
            vertex: wgpu::VertexState {
                module: &self.shader,
                entry_point: "vs_main",
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<[f32; 2]>() as u64,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &[wgpu::VertexAttribute {
                        offset: 0,
                        shader_location: 0,
                        format: wgpu::VertexFormat::Float32x2,
                    }],
                }],
            },
            fragment: Some(wgpu::FragmentState {
                module: &self.shader,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format: to_wgpu_format(desc.color_format),
                    blend: Some(blend_state(desc.blend_mode)),
                    write_mask,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
        })
    }

    fn sampler(&self, device: &wgpu::Device, desc: SamplerDescriptor) -> Arc<wgpu::Sampler> {
        let mut samplers = self.samplers.lock().unwrap_or_else(|p| p.into_inner());
        samplers
            .entry(desc)
            .or_insert_with(|| {
                let filter = |f: MinMagFilter| match f {
                    MinMagFilter::Nearest => wgpu::FilterMode::Nearest,
                    MinMagFilter::Linear => wgpu::FilterMode::Linear,
                };
                // Decal is emulated in the shader on top of clamping.
                let address = |mode: SamplerAddressMode| match mode {
                    SamplerAddressMode::ClampToEdge | SamplerAddressMode::Decal => {
                        wgpu::AddressMode::ClampToEdge
                    }
                    SamplerAddressMode::Repeat => wgpu::AddressMode::Repeat,
                    SamplerAddressMode::Mirror => wgpu::AddressMode::MirrorRepeat,
                };
                Arc::new(device.create_sampler(&wgpu::SamplerDescriptor {
                    label: Some("compositor-sampler"),
                    address_mode_u: address(desc.width_address_mode),
                    address_mode_v: address(desc.height_address_mode),
                    address_mode_w: wgpu::AddressMode::ClampToEdge,
                    mag_filter: filter(desc.mag_filter),
                    min_filter: filter(desc.min_filter),
                    mipmap_filter: wgpu::FilterMode::Nearest,
                    ..Default::default()
                }))
            })
            .clone()
    }
}

fn stencil_face(mode: StencilMode) -> wgpu::StencilFaceState {
    // The comparison reads as `reference <op> stored`.
    let (compare, pass_op) = match mode {
        StencilMode::Ignore => (wgpu::CompareFunction::Always, wgpu::StencilOperation::Keep),
        StencilMode::ClipCompare => (wgpu::CompareFunction::Equal, wgpu::StencilOperation::Keep),
        StencilMode::ClipIncrement => (wgpu::CompareFunction::Equal, wgpu::StencilOperation::IncrementClamp),
        StencilMode::ClipDecrement => (wgpu::CompareFunction::Equal, wgpu::StencilOperation::DecrementClamp),
        StencilMode::ClipRestore => (wgpu::CompareFunction::Less, wgpu::StencilOperation::Replace),
    };
    wgpu::StencilFaceState {
        compare,
        fail_op: wgpu::StencilOperation::Keep,
        depth_fail_op: wgpu::StencilOperation::Keep,
        pass_op,
    }
}

/// Fixed-function state for premultiplied colors.
fn blend_state(mode: BlendMode) -> wgpu::BlendState {
    use wgpu::BlendFactor as F;
    let (src, dst) = match mode {
        BlendMode::Clear => (F::Zero, F::Zero),
        BlendMode::Source => (F::One, F::Zero),
        BlendMode::Destination => (F::Zero, F::One),
        BlendMode::SourceOver => (F::One, F::OneMinusSrcAlpha),
        BlendMode::DestinationOver => (F::OneMinusDstAlpha, F::One),
        BlendMode::SourceIn => (F::DstAlpha, F::Zero),
        BlendMode::DestinationIn => (F::Zero, F::SrcAlpha),
        BlendMode::SourceOut => (F::OneMinusDstAlpha, F::Zero),
        BlendMode::DestinationOut => (F::Zero, F::OneMinusSrcAlpha),
        BlendMode::SourceATop => (F::DstAlpha, F::OneMinusSrcAlpha),
        BlendMode::DestinationATop => (F::OneMinusDstAlpha, F::SrcAlpha),
        BlendMode::Xor => (F::OneMinusDstAlpha, F::OneMinusSrcAlpha),
        BlendMode::Plus => (F::One, F::One),
        BlendMode::Modulate => {
            let component = wgpu::BlendComponent {
                src_factor: F::Zero,
                dst_factor: F::Src,
                operation: wgpu::BlendOperation::Add,
            };
            return wgpu::BlendState {
                color: component,
                alpha: wgpu::BlendComponent { dst_factor: F::SrcAlpha, ..component },
            };
        }
        advanced => {
            tracing::warn!(mode = ?advanced, "advanced blend mode has no fixed-function form; using source-over");
            (F::One, F::OneMinusSrcAlpha)
        }
    };
    let component = wgpu::BlendComponent { src_factor: src, dst_factor: dst, operation: wgpu::BlendOperation::Add };
    wgpu::BlendState { color: component, alpha: component }
}

fn columns(m: &Matrix) -> [[f32; 4]; 4] {
    let m = &m.m;
    [
        [m[0], m[1], m[2], m[3]],
        [m[4], m[5], m[6], m[7]],
        [m[8], m[9], m[10], m[11]],
        [m[12], m[13], m[14], m[15]],
    ]
}

/// Pass pixels to clip space. z is flattened to zero.
fn pixel_to_clip(size: ISize) -> Matrix {
    let (w, h) = (size.width.max(1) as f32, size.height.max(1) as f32);
    Matrix {
        m: [
            2.0 / w, 0.0, 0.0, 0.0, //
            0.0, -2.0 / h, 0.0, 0.0, //
            0.0, 0.0, 0.0, 0.0, //
            -1.0, 1.0, 0.0, 1.0,
        ],
    }
}

fn tile_code(mode: TileMode) -> u32 {
    match mode {
        TileMode::Clamp => 0,
        TileMode::Repeat => 1,
        TileMode::Mirror => 2,
        TileMode::Decal => 3,
    }
}

fn is_decal(sampler: &SamplerDescriptor) -> bool {
    sampler.width_address_mode == SamplerAddressMode::Decal
        || sampler.height_address_mode == SamplerAddressMode::Decal
}

fn texel_extent(m: &Matrix, v: Point) -> [f32; 2] {
    let p = m.basis().transform_point(v);
    [p.x.abs(), p.y.abs()]
}

/// Uniform contents and sampler for one command.
fn fragment_uniform(command: &Command) -> (FragmentUniform, SamplerDescriptor) {
    let mut u = FragmentUniform::default();
    let mut sampler = SamplerDescriptor::default();
    let texture_size = command.texture.as_ref().map(|t| t.size()).unwrap_or(ISize::new(1, 1));
    let (tw, th) = (texture_size.width.max(1) as f32, texture_size.height.max(1) as f32);
    u.texel = [1.0 / tw, 1.0 / th, 0.0, 0.0];
    let to_uv = |texture_transform: &Matrix| columns(&(Matrix::scale(1.0 / tw, 1.0 / th) * *texture_transform));

    match &command.fragment_info {
        FragmentInfo::None => u.mode[0] = program::NONE,
        FragmentInfo::Solid { color } => {
            u.mode[0] = program::SOLID;
            u.color = color.to_array();
        }
        FragmentInfo::Texture { alpha, texture_transform, sampler: s } => {
            u.mode[0] = program::TEXTURE;
            u.params[0] = *alpha;
            u.uv_transform = to_uv(texture_transform);
            u.filter[2] = is_decal(s) as u32;
            sampler = *s;
        }
        FragmentInfo::LinearGradient { start, end, colors, stops, tile_mode, alpha } => {
            u.mode[0] = program::LINEAR_GRADIENT;
            u.mode[1] = tile_code(*tile_mode);
            u.params[0] = *alpha;
            u.gradient = [start.x, start.y, end.x, end.y];
            if colors.len() > MAX_GRADIENT_STOPS {
                tracing::warn!(stops = colors.len(), "gradient truncated to {MAX_GRADIENT_STOPS} stops");
            }
            let count = colors.len().min(stops.len()).min(MAX_GRADIENT_STOPS);
            for i in 0..count {
                u.stops[i / 4][i % 4] = stops[i];
                u.colors[i] = colors[i].to_array();
            }
            u.mode[3] = count as u32;
        }
        FragmentInfo::ColorFilter { filter: color_filter, alpha, texture_transform } => {
            u.mode[0] = program::COLOR_FILTER;
            u.params[0] = *alpha;
            u.uv_transform = to_uv(texture_transform);
            u.filter[2] = 1;
            match color_filter {
                ColorFilter::Matrix(matrix) => {
                    let a = &matrix.array;
                    u.filter[0] = filter::MATRIX;
                    for col in 0..4 {
                        u.color_matrix[col] = [a[col], a[5 + col], a[10 + col], a[15 + col]];
                    }
                    u.color_offset = [a[4], a[9], a[14], a[19]];
                }
                ColorFilter::SrgbToLinear => u.filter[0] = filter::SRGB_TO_LINEAR,
                ColorFilter::LinearToSrgb => u.filter[0] = filter::LINEAR_TO_SRGB,
                ColorFilter::Blend { mode, color } => {
                    u.filter[0] = filter::BLEND;
                    u.color = color.premultiply().to_array();
                    u.filter[1] = if mode.is_advanced() {
                        tracing::warn!(?mode, "advanced blend color filter runs as source-over");
                        BlendMode::SourceOver as u32
                    } else {
                        *mode as u32
                    };
                }
            }
        }
        FragmentInfo::Blur { sigma, style, tile_mode, texture_transform } => {
            let sigma = texel_extent(texture_transform, *sigma);
            u.mode[0] = program::GAUSSIAN_BLUR;
            u.mode[2] = match style {
                BlurStyle::Normal => 0,
                BlurStyle::Solid => 1,
                BlurStyle::Outer => 2,
                BlurStyle::Inner => 3,
            };
            u.params[2] = sigma[0];
            u.params[3] = sigma[1];
            u.uv_transform = to_uv(texture_transform);
            sampler = SamplerDescriptor::linear().with_address_mode(tile_mode.address_mode());
            u.filter[2] = is_decal(&sampler) as u32;
        }
        FragmentInfo::Morphology { radius, dilate, texture_transform } => {
            let radius = texel_extent(texture_transform, *radius);
            u.mode[0] = program::MORPHOLOGY;
            u.mode[2] = *dilate as u32;
            u.params[2] = radius[0];
            u.params[3] = radius[1];
            u.uv_transform = to_uv(texture_transform);
            u.filter[2] = 1;
        }
        FragmentInfo::Checkerboard { color, square_size } => {
            u.mode[0] = program::CHECKERBOARD;
            u.color = color.to_array();
            u.params[1] = square_size.max(1.0);
        }
    }
    (u, sampler)
}

struct Shared {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    pipelines: PipelineCache,
}

pub struct WgpuContext {
    shared: Arc<Shared>,
    capabilities: Capabilities,
    allocator: Arc<WgpuAllocator>,
}

impl WgpuContext {
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        let pipelines = PipelineCache::new(&device);
        let capabilities = Capabilities {
            supports_framebuffer_fetch: false,
            supports_texture_to_texture_blits: true,
            supports_decal_sampler_address_mode: false,
            supports_mipmap_generation: false,
            ..Capabilities::default()
        };
        Self {
            allocator: Arc::new(WgpuAllocator { device: device.clone() }),
            shared: Arc::new(Shared { device, queue, pipelines }),
            capabilities,
        }
    }

    /// Opens the default adapter without a surface.
    pub fn headless() -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| RenderError::Backend("no compatible GPU adapter".into()))?;
        let info = adapter.get_info();
        tracing::info!(name = %info.name, backend = ?info.backend, "using GPU adapter");
        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor::default(), None))
            .map_err(|e| RenderError::Backend(format!("request_device failed: {e}")))?;
        Ok(Self::new(Arc::new(device), Arc::new(queue)))
    }

    pub fn device(&self) -> &Arc<wgpu::Device> {
        &self.shared.device
    }

    pub fn queue(&self) -> &Arc<wgpu::Queue> {
        &self.shared.queue
    }

    pub fn create_onscreen_target(&self, size: ISize) -> Result<RenderTarget> {
        let desc = TextureDescriptor {
            storage_mode: StorageMode::HostVisible,
            format: self.capabilities.default_color_format,
            size,
            mip_count: 1,
            usage: TextureUsage::RENDER_TARGET | TextureUsage::SHADER_READ | TextureUsage::COPY,
        };
        let texture = self.allocator.create_texture(&desc).ok_or_else(|| RenderError::Allocation {
            label: "Onscreen Color Texture".to_string(),
            size,
            format: desc.format,
            mip_count: 1,
        })?;
        Ok(RenderTarget::from_texture(texture))
    }

    /// Copies an 8-bit color texture back to the host as straight-alpha RGBA rows.
    pub fn read_rgba8(&self, texture: &TextureRef) -> Result<Vec<u8>> {
        let source = gpu_texture(texture)?;
        let format = source.descriptor.format;
        if format.bytes_per_pixel() != 4 || format.is_stencil() {
            return Err(RenderError::Backend(format!("cannot read back {format:?} textures")));
        }
        let (width, height) = (source.descriptor.size.width as u32, source.descriptor.size.height as u32);
        let unpadded = width * 4;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded = unpadded.div_ceil(align) * align;

        let device = &self.shared.device;
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("strata:readback"),
            size: padded as u64 * height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("readback") });
        encoder.copy_texture_to_buffer(
            source.texture.as_image_copy(),
            wgpu::ImageCopyBuffer {
                buffer: &buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
        );
        self.shared.queue.submit(Some(encoder.finish()));

        let slice = buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|e| RenderError::Backend(format!("readback channel closed: {e}")))?
            .map_err(|e| RenderError::Backend(format!("readback map failed: {e}")))?;

        let bgra = format == PixelFormat::B8G8R8A8UNormInt;
        let mut out = Vec::with_capacity((unpadded * height) as usize);
        {
            let data = slice.get_mapped_range();
            for row in data.chunks(padded as usize).take(height as usize) {
                for px in row[..unpadded as usize].chunks_exact(4) {
                    let (r, g, b, a) = if bgra { (px[2], px[1], px[0], px[3]) } else { (px[0], px[1], px[2], px[3]) };
                    let c = Color::rgba8(r, g, b, a).unpremultiply().to_rgba8();
                    out.extend_from_slice(&[c[0], c[1], c[2], a]);
                }
            }
        }
        buffer.unmap();
        Ok(out)
    }
}

impl Context for WgpuContext {
    fn backend_type(&self) -> BackendType {
        BackendType::Wgpu
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    fn resource_allocator(&self) -> Arc<dyn Allocator> {
        self.allocator.clone()
    }

    fn create_command_buffer(&self) -> Box<dyn CommandBuffer> {
        Box::new(WgpuCommandBuffer { shared: self.shared.clone(), label: String::new(), encoded: Vec::new() })
    }
}

enum Encoded {
    Render(RenderPass),
    Blit(BlitPass),
}

struct WgpuCommandBuffer {
    shared: Arc<Shared>,
    label: String,
    encoded: Vec<Encoded>,
}

struct PreparedDraw {
    pipeline: Arc<wgpu::RenderPipeline>,
    bind_group: wgpu::BindGroup,
    vertices: wgpu::Buffer,
    vertex_count: u32,
    stencil_reference: u32,
}

impl WgpuCommandBuffer {
    fn prepare(&self, command: &Command, size: ISize, stencil_format: Option<wgpu::TextureFormat>) -> Result<Option<PreparedDraw>> {
        let device = &self.shared.device;
        let cache = &self.shared.pipelines;

        let vertices: Vec<[f32; 2]> = command
            .vertex_buffer
            .triangles(command.pipeline.primitive_type)
            .into_iter()
            .flatten()
            .map(|p| [p.x, p.y])
            .collect();
        if vertices.is_empty() {
            return Ok(None);
        }
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("strata:vertices"),
            contents: bytemuck::cast_slice(&vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let frame = FrameUniform {
            mvp: columns(&(pixel_to_clip(size) * command.frame_info.mvp)),
            depth: [command.frame_info.depth, 0.0, 0.0, 0.0],
        };
        let (fragment, sampler) = fragment_uniform(command);
        let frame_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("strata:frame-info"),
            contents: bytemuck::bytes_of(&frame),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let fragment_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("strata:fragment-info"),
            contents: bytemuck::bytes_of(&fragment),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let view = match &command.texture {
            Some(texture) => gpu_texture(texture)?.view(),
            None => cache.placeholder.create_view(&wgpu::TextureViewDescriptor::default()),
        };
        let sampler = cache.sampler(device, sampler);
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("strata:bind-group"),
            layout: &cache.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: frame_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: fragment_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: wgpu::BindingResource::TextureView(&view) },
                wgpu::BindGroupEntry { binding: 3, resource: wgpu::BindingResource::Sampler(&sampler) },
            ],
        });

        let key = PipelineKey {
            descriptor: command.pipeline,
            stencil_format: if command.pipeline.has_stencil_attachment { stencil_format } else { None },
        };
        Ok(Some(PreparedDraw {
            pipeline: cache.pipeline(device, key),
            bind_group,
            vertices: vertex_buffer,
            vertex_count: vertices.len() as u32,
            stencil_reference: command.stencil_reference,
        }))
    }

    fn encode_render(&self, encoder: &mut wgpu::CommandEncoder, pass: RenderPass) -> Result<()> {
        let (target, label, commands) = pass.into_parts();
        let size = target.size();
        let color = target.color_attachment();
        let color_view = gpu_texture(&color.texture)?.view();
        let stencil = match target.stencil_attachment() {
            Some(attachment) => Some((attachment, gpu_texture(&attachment.texture)?)),
            None => None,
        };
        let stencil_view = stencil.as_ref().map(|(_, texture)| texture.view());
        let stencil_format = stencil.as_ref().map(|(_, texture)| to_wgpu_format(texture.descriptor.format));

        let mut draws = Vec::with_capacity(commands.len());
        for command in &commands {
            if let Some(draw) = self.prepare(command, size, stencil_format)? {
                draws.push(draw);
            }
        }

        let clear = color.clear_color;
        let color_load = match color.load_action {
            LoadAction::Clear => wgpu::LoadOp::Clear(wgpu::Color {
                r: clear.red as f64,
                g: clear.green as f64,
                b: clear.blue as f64,
                a: clear.alpha as f64,
            }),
            LoadAction::Load | LoadAction::DontCare => wgpu::LoadOp::Load,
        };
        let store = |action: StoreAction| match action {
            StoreAction::Store => wgpu::StoreOp::Store,
            StoreAction::DontCare => wgpu::StoreOp::Discard,
        };
        let depth_stencil_attachment = match (&stencil, &stencil_view) {
            (Some((attachment, _)), Some(view)) => Some(wgpu::RenderPassDepthStencilAttachment {
                view,
                depth_ops: None,
                stencil_ops: Some(wgpu::Operations {
                    load: match attachment.load_action {
                        LoadAction::Clear => wgpu::LoadOp::Clear(attachment.clear_stencil),
                        LoadAction::Load | LoadAction::DontCare => wgpu::LoadOp::Load,
                    },
                    store: store(attachment.store_action),
                }),
            }),
            _ => None,
        };

        let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(label.as_str()),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &color_view,
                resolve_target: None,
                ops: wgpu::Operations { load: color_load, store: store(color.store_action) },
            })],
            depth_stencil_attachment,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        for draw in &draws {
            rpass.set_pipeline(&draw.pipeline);
            rpass.set_bind_group(0, &draw.bind_group, &[]);
            rpass.set_stencil_reference(draw.stencil_reference);
            rpass.set_vertex_buffer(0, draw.vertices.slice(..));
            rpass.draw(0..draw.vertex_count, 0..1);
        }
        Ok(())
    }

    fn encode_blit(&self, encoder: &mut wgpu::CommandEncoder, pass: BlitPass) -> Result<()> {
        let label = pass.label().to_string();
        for command in pass.into_commands() {
            match command {
                BlitCommand::CopyTextureToTexture { source, destination } => {
                    let src = gpu_texture(&source)?;
                    let dst = gpu_texture(&destination)?;
                    let size = src.descriptor.size;
                    let dst_size = dst.descriptor.size;
                    encoder.copy_texture_to_texture(
                        src.texture.as_image_copy(),
                        dst.texture.as_image_copy(),
                        wgpu::Extent3d {
                            width: size.width.min(dst_size.width) as u32,
                            height: size.height.min(dst_size.height) as u32,
                            depth_or_array_layers: 1,
                        },
                    );
                }
                BlitCommand::GenerateMipmap { .. } => {
                    tracing::warn!(%label, "mipmap generation is not available on this backend");
                }
            }
        }
        Ok(())
    }
}

impl CommandBuffer for WgpuCommandBuffer {
    fn set_label(&mut self, label: &str) {
        self.label = label.to_string();
    }

    fn encode_render_pass(&mut self, pass: RenderPass) -> Result<()> {
        self.encoded.push(Encoded::Render(pass));
        Ok(())
    }

    fn encode_blit_pass(&mut self, pass: BlitPass) -> Result<()> {
        self.encoded.push(Encoded::Blit(pass));
        Ok(())
    }

    fn submit(mut self: Box<Self>) -> Result<()> {
        let encoded = std::mem::take(&mut self.encoded);
        let mut encoder = self
            .shared
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(self.label.as_str()) });
        for pass in encoded {
            match pass {
                Encoded::Render(pass) => self.encode_render(&mut encoder, pass)?,
                Encoded::Blit(pass) => self.encode_blit(&mut encoder, pass)?,
            }
        }
        self.shared.queue.submit(Some(encoder.finish()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::PrimitiveType;
    use crate::geometry::Rect;
    use crate::renderer::{FrameInfo, PipelineKind, VertexBuffer};

    #[test]
    fn blend_states_follow_porter_duff() {
        let state = blend_state(BlendMode::SourceOver);
        assert_eq!(state.color.src_factor, wgpu::BlendFactor::One);
        assert_eq!(state.color.dst_factor, wgpu::BlendFactor::OneMinusSrcAlpha);
        assert_eq!(blend_state(BlendMode::Screen), state);
        assert_eq!(blend_state(BlendMode::Destination).color.src_factor, wgpu::BlendFactor::Zero);
    }

    #[test]
    fn clip_restore_compares_reference_below_stored() {
        let face = stencil_face(StencilMode::ClipRestore);
        assert_eq!(face.compare, wgpu::CompareFunction::Less);
        assert_eq!(face.pass_op, wgpu::StencilOperation::Replace);
    }

    #[test]
    fn pixel_to_clip_maps_corners() {
        let m = pixel_to_clip(ISize::new(200, 100));
        let tl = m.transform_point(Point::new(0.0, 0.0));
        let br = m.transform_point(Point::new(200.0, 100.0));
        assert_eq!((tl.x, tl.y), (-1.0, 1.0));
        assert_eq!((br.x, br.y), (1.0, -1.0));
    }

    #[test]
    fn solid_draw_reads_back() {
        let context = match WgpuContext::headless() {
            Ok(context) => context,
            Err(err) => {
                eprintln!("skipping: {err}");
                return;
            }
        };
        let target = context.create_onscreen_target(ISize::new(16, 16)).unwrap();
        let texture = target.render_target_texture();
        let mut pass = RenderPass::new(target);
        pass.set_pipeline(PipelineDescriptor {
            kind: PipelineKind::SolidFill,
            blend_mode: BlendMode::SourceOver,
            stencil_mode: StencilMode::Ignore,
            primitive_type: PrimitiveType::TriangleStrip,
            color_format: PixelFormat::R8G8B8A8UNormInt,
            has_stencil_attachment: false,
        });
        pass.set_vertex_buffer(VertexBuffer::from_rect_strip(Rect::from_xywh(0.0, 0.0, 8.0, 16.0).points()));
        pass.bind_frame_info(FrameInfo::default());
        pass.bind_fragment_info(FragmentInfo::Solid { color: Color::RED });
        pass.draw().unwrap();
        let mut buffer = context.create_command_buffer();
        buffer.encode_render_pass(pass).unwrap();
        buffer.submit().unwrap();

        let pixels = context.read_rgba8(&texture).unwrap();
        assert_eq!(&pixels[0..4], &[255, 0, 0, 255]);
        let right = (8 * 16 + 12) * 4;
        assert_eq!(pixels[right + 3], 0);
    }
}
