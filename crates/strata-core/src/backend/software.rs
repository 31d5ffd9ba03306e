//! CPU backend. Textures are `tiny_skia` pixmaps holding premultiplied
//! RGBA8; every recorded pass is executed pixel by pixel at submit time and
//! kept around for inspection.

use std::any::Any;
use std::sync::{Arc, Mutex, MutexGuard};

use tiny_skia::{Pixmap, PremultipliedColorU8};

use crate::color::{BlendMode, Color};
use crate::error::{RenderError, Result};
use crate::filters::BlurStyle;
use crate::formats::{
    LoadAction, MinMagFilter, SamplerAddressMode, SamplerDescriptor, StorageMode,
    TextureDescriptor, TextureUsage, TileMode,
};
use crate::geometry::{ISize, Matrix, Point};
use crate::renderer::{
    Allocator, BackendType, BlitCommand, BlitPass, Capabilities, Command, CommandBuffer, Context,
    FragmentInfo, PipelineKind, RenderPass, RenderTarget, StencilMode, Texture, TextureRef,
};

const DEFAULT_MAX_TEXTURE_SIZE: i64 = 8192;

enum Storage {
    Color(Mutex<Pixmap>),
    Stencil(Mutex<Vec<u32>>),
}

pub struct SoftwareTexture {
    descriptor: TextureDescriptor,
    storage: Storage,
}

impl std::fmt::Debug for SoftwareTexture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoftwareTexture").field("descriptor", &self.descriptor).finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SoftwareTexture {
    fn new(descriptor: TextureDescriptor) -> Option<Self> {
        let width = u32::try_from(descriptor.size.width).ok()?;
        let height = u32::try_from(descriptor.size.height).ok()?;
        let storage = if descriptor.format.is_stencil() {
            Storage::Stencil(Mutex::new(vec![0; (width as usize) * (height as usize)]))
        } else {
            Storage::Color(Mutex::new(Pixmap::new(width, height)?))
        };
        Some(Self { descriptor, storage })
    }

    fn width(&self) -> u32 {
        self.descriptor.size.width as u32
    }

    /// Straight-alpha color of one pixel.
    pub fn pixel(&self, x: u32, y: u32) -> Option<Color> {
        let Storage::Color(pixmap) = &self.storage else {
            return None;
        };
        let pixel = lock(pixmap).pixel(x, y)?.demultiply();
        Some(Color::rgba8(pixel.red(), pixel.green(), pixel.blue(), pixel.alpha()))
    }

    /// Straight-alpha RGBA8 rows, top to bottom.
    pub fn to_rgba8(&self) -> Vec<u8> {
        let Storage::Color(pixmap) = &self.storage else {
            return Vec::new();
        };
        lock(pixmap)
            .pixels()
            .iter()
            .flat_map(|pixel| {
                let c = pixel.demultiply();
                [c.red(), c.green(), c.blue(), c.alpha()]
            })
            .collect()
    }

    pub fn stencil_value(&self, x: u32, y: u32) -> Option<u32> {
        let Storage::Stencil(values) = &self.storage else {
            return None;
        };
        let index = (y as usize) * (self.width() as usize) + x as usize;
        lock(values).get(index).copied()
    }

    fn image(&self) -> Result<FloatImage> {
        match &self.storage {
            Storage::Color(pixmap) => Ok(FloatImage::from_pixmap(&lock(pixmap))),
            Storage::Stencil(_) => Err(RenderError::Backend("cannot sample a stencil texture".into())),
        }
    }

    fn pixmap(&self) -> Result<MutexGuard<'_, Pixmap>> {
        match &self.storage {
            Storage::Color(pixmap) => Ok(lock(pixmap)),
            Storage::Stencil(_) => Err(RenderError::Backend("expected a color texture".into())),
        }
    }

    fn stencil(&self) -> Result<MutexGuard<'_, Vec<u32>>> {
        match &self.storage {
            Storage::Stencil(values) => Ok(lock(values)),
            Storage::Color(_) => Err(RenderError::Backend("expected a stencil texture".into())),
        }
    }
}

impl Texture for SoftwareTexture {
    fn descriptor(&self) -> &TextureDescriptor {
        &self.descriptor
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Resolves a texture handed out by this backend.
pub fn software_texture(texture: &TextureRef) -> Result<&SoftwareTexture> {
    texture
        .as_any()
        .downcast_ref::<SoftwareTexture>()
        .ok_or_else(|| RenderError::Backend("texture was not created by the software backend".into()))
}

/// Allocates pixmaps and remembers every descriptor it was asked for.
#[derive(Debug)]
pub struct SoftwareAllocator {
    max_texture_size: ISize,
    allocations: Mutex<Vec<TextureDescriptor>>,
}

impl SoftwareAllocator {
    pub fn new(max_texture_size: ISize) -> Self {
        Self { max_texture_size, allocations: Mutex::new(Vec::new()) }
    }

    /// Descriptors of every successful allocation, in order.
    pub fn allocations(&self) -> Vec<TextureDescriptor> {
        lock(&self.allocations).clone()
    }
}

impl Allocator for SoftwareAllocator {
    fn create_texture(&self, desc: &TextureDescriptor) -> Option<TextureRef> {
        if desc.size.is_empty()
            || desc.size.width > self.max_texture_size.width
            || desc.size.height > self.max_texture_size.height
        {
            tracing::warn!(size = ?desc.size, max = ?self.max_texture_size, "texture allocation refused");
            return None;
        }
        let texture = SoftwareTexture::new(desc.clone())?;
        lock(&self.allocations).push(desc.clone());
        Some(Arc::new(texture))
    }

    fn max_texture_size(&self) -> ISize {
        self.max_texture_size
    }
}

/// A render pass as it was submitted.
#[derive(Clone, Debug)]
pub struct RecordedPass {
    pub label: String,
    pub size: ISize,
    pub color_load_action: LoadAction,
    pub clear_color: Color,
    pub commands: Vec<Command>,
}

#[derive(Clone, Debug)]
pub struct RecordedBlit {
    pub label: String,
    pub commands: Vec<BlitCommand>,
}

#[derive(Debug, Default)]
struct Recording {
    render_passes: Vec<RecordedPass>,
    blit_passes: Vec<RecordedBlit>,
    command_buffers: Vec<String>,
}

pub struct SoftwareContext {
    capabilities: Capabilities,
    allocator: Arc<SoftwareAllocator>,
    recording: Arc<Mutex<Recording>>,
}

impl Default for SoftwareContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftwareContext {
    pub fn new() -> Self {
        Self {
            capabilities: Capabilities {
                supports_decal_sampler_address_mode: true,
                ..Capabilities::default()
            },
            allocator: Arc::new(SoftwareAllocator::new(ISize::new(
                DEFAULT_MAX_TEXTURE_SIZE,
                DEFAULT_MAX_TEXTURE_SIZE,
            ))),
            recording: Arc::new(Mutex::new(Recording::default())),
        }
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_max_texture_size(mut self, max_texture_size: ISize) -> Self {
        self.allocator = Arc::new(SoftwareAllocator::new(max_texture_size));
        self
    }

    pub fn allocator(&self) -> &Arc<SoftwareAllocator> {
        &self.allocator
    }

    /// A host visible color target suitable as the root of a render.
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

    pub fn render_passes(&self) -> Vec<RecordedPass> {
        lock(&self.recording).render_passes.clone()
    }

    pub fn blit_passes(&self) -> Vec<RecordedBlit> {
        lock(&self.recording).blit_passes.clone()
    }

    /// Labels of submitted command buffers, in submission order.
    pub fn command_buffer_labels(&self) -> Vec<String> {
        lock(&self.recording).command_buffers.clone()
    }

    pub fn clear_recording(&self) {
        *lock(&self.recording) = Recording::default();
    }
}

impl Context for SoftwareContext {
    fn backend_type(&self) -> BackendType {
        BackendType::Software
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    fn resource_allocator(&self) -> Arc<dyn Allocator> {
        self.allocator.clone()
    }

    fn create_command_buffer(&self) -> Box<dyn CommandBuffer> {
        Box::new(SoftwareCommandBuffer {
            label: String::new(),
            encoded: Vec::new(),
            recording: self.recording.clone(),
        })
    }
}

enum Encoded {
    Render(RenderPass),
    Blit(BlitPass),
}

struct SoftwareCommandBuffer {
    label: String,
    encoded: Vec<Encoded>,
    recording: Arc<Mutex<Recording>>,
}

impl CommandBuffer for SoftwareCommandBuffer {
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

    fn submit(self: Box<Self>) -> Result<()> {
        let SoftwareCommandBuffer { label, encoded, recording } = *self;
        let _span = tracing::trace_span!("software_submit", label = %label).entered();
        lock(&recording).command_buffers.push(label);
        for pass in encoded {
            match pass {
                Encoded::Render(pass) => {
                    let recorded = execute_render_pass(pass)?;
                    lock(&recording).render_passes.push(recorded);
                }
                Encoded::Blit(pass) => {
                    let recorded = RecordedBlit {
                        label: pass.label().to_string(),
                        commands: pass.commands().to_vec(),
                    };
                    execute_blit_pass(pass)?;
                    lock(&recording).blit_passes.push(recorded);
                }
            }
        }
        Ok(())
    }
}

// --------------------------------------------------------------------------
// Render pass execution

fn execute_render_pass(pass: RenderPass) -> Result<RecordedPass> {
    let (target, label, commands) = pass.into_parts();
    let color = target.color_attachment();
    let color_texture = software_texture(&color.texture)?;
    let size = target.size();

    if color.load_action == LoadAction::Clear {
        let clear = to_pixel(color.clear_color);
        color_texture.pixmap()?.pixels_mut().fill(clear);
    }
    let stencil_texture = match target.stencil_attachment() {
        Some(stencil) => {
            let texture = software_texture(&stencil.texture)?;
            if stencil.load_action == LoadAction::Clear {
                texture.stencil()?.fill(stencil.clear_stencil);
            }
            Some(texture)
        }
        None => None,
    };

    for command in &commands {
        if let Err(err) = execute_command(command, color_texture, stencil_texture, size) {
            tracing::error!(label = %command.label, %err, "software draw failed");
            return Err(err);
        }
    }

    Ok(RecordedPass {
        label,
        size,
        color_load_action: color.load_action,
        clear_color: color.clear_color,
        commands,
    })
}

/// Per-draw state resolved once before shading.
enum Program {
    None,
    Solid(Color),
    Texture { image: FloatImage, alpha: f32, texture_transform: Matrix, sampler: SamplerDescriptor },
    Gradient { start: Point, end: Point, colors: Vec<Color>, stops: Vec<f32>, tile_mode: TileMode, alpha: f32 },
    ColorFilter { image: FloatImage, filter: crate::filters::ColorFilter, alpha: f32, texture_transform: Matrix },
    Blur { source: FloatImage, blurred: FloatImage, style: BlurStyle, sampler: SamplerDescriptor, texture_transform: Matrix },
    Morphology { image: FloatImage, texture_transform: Matrix },
    Checkerboard { color: Color, square_size: f32 },
}

fn bound_image(command: &Command) -> Result<FloatImage> {
    let texture = command.texture.as_ref().ok_or_else(|| RenderError::InvalidCommand {
        label: command.label.clone(),
        reason: "pipeline samples a texture but none is bound",
    })?;
    software_texture(texture)?.image()
}

/// Length of `v` along each axis after mapping through the basis of `m`.
fn texel_extent(m: &Matrix, v: Point) -> Point {
    let p = m.basis().transform_point(v);
    Point::new(p.x.abs(), p.y.abs())
}

fn build_program(command: &Command) -> Result<Program> {
    Ok(match &command.fragment_info {
        FragmentInfo::None => Program::None,
        FragmentInfo::Solid { color } => Program::Solid(*color),
        FragmentInfo::Texture { alpha, texture_transform, sampler } => Program::Texture {
            image: bound_image(command)?,
            alpha: *alpha,
            texture_transform: *texture_transform,
            sampler: *sampler,
        },
        FragmentInfo::LinearGradient { start, end, colors, stops, tile_mode, alpha } => Program::Gradient {
            start: *start,
            end: *end,
            colors: colors.clone(),
            stops: stops.clone(),
            tile_mode: *tile_mode,
            alpha: *alpha,
        },
        FragmentInfo::ColorFilter { filter, alpha, texture_transform } => Program::ColorFilter {
            image: bound_image(command)?,
            filter: filter.clone(),
            alpha: *alpha,
            texture_transform: *texture_transform,
        },
        FragmentInfo::Blur { sigma, style, tile_mode, texture_transform } => {
            let source = bound_image(command)?;
            let sigma = texel_extent(texture_transform, *sigma);
            let mode = tile_mode.address_mode();
            let blurred = source.blur(sigma.x, sigma.y, mode);
            Program::Blur {
                source,
                blurred,
                style: *style,
                sampler: SamplerDescriptor::linear().with_address_mode(mode),
                texture_transform: *texture_transform,
            }
        }
        FragmentInfo::Morphology { radius, dilate, texture_transform } => {
            let radius = texel_extent(texture_transform, *radius);
            let image = bound_image(command)?.morphology(radius.x.round() as i32, radius.y.round() as i32, *dilate);
            Program::Morphology { image, texture_transform: *texture_transform }
        }
        FragmentInfo::Checkerboard { color, square_size } => Program::Checkerboard {
            color: *color,
            square_size: square_size.max(1.0),
        },
    })
}

impl Program {
    /// Premultiplied source color at `local` (the draw's local space) and
    /// `pixel` (pass space).
    fn shade(&self, local: Point, pixel: Point) -> Color {
        match self {
            Program::None => Color::BLACK_TRANSPARENT,
            Program::Solid(color) => *color,
            Program::Texture { image, alpha, texture_transform, sampler } => {
                image.sample(texture_transform.transform_point(local), sampler) * *alpha
            }
            Program::Gradient { start, end, colors, stops, tile_mode, alpha } => {
                gradient_color(*start, *end, colors, stops, *tile_mode, local) * *alpha
            }
            Program::ColorFilter { image, filter, alpha, texture_transform } => {
                let sampler = SamplerDescriptor::default().with_address_mode(SamplerAddressMode::Decal);
                let input = image.sample(texture_transform.transform_point(local), &sampler);
                filter.apply(input.unpremultiply()).premultiply() * *alpha
            }
            Program::Blur { source, blurred, style, sampler, texture_transform } => {
                let texel = texture_transform.transform_point(local);
                let blur = blurred.sample(texel, sampler);
                match style {
                    BlurStyle::Normal => blur,
                    BlurStyle::Solid => {
                        let src = source.sample(texel, sampler);
                        src + blur * (1.0 - src.alpha)
                    }
                    BlurStyle::Outer => blur * (1.0 - source.sample(texel, sampler).alpha),
                    BlurStyle::Inner => blur * source.sample(texel, sampler).alpha,
                }
            }
            Program::Morphology { image, texture_transform } => {
                let sampler = SamplerDescriptor::default().with_address_mode(SamplerAddressMode::Decal);
                image.sample(texture_transform.transform_point(local), &sampler)
            }
            Program::Checkerboard { color, square_size } => {
                let cell = (pixel.x / square_size).floor() + (pixel.y / square_size).floor();
                if (cell as i64).rem_euclid(2) == 0 { *color } else { Color::BLACK_TRANSPARENT }
            }
        }
    }
}

fn execute_command(
    command: &Command,
    color_texture: &SoftwareTexture,
    stencil_texture: Option<&SoftwareTexture>,
    size: ISize,
) -> Result<()> {
    let Some(inverse_mvp) = command.frame_info.mvp.invert() else {
        return Ok(());
    };
    // Sources are copied out before the target is locked; a draw may sample
    // the texture it writes to.
    let program = build_program(command)?;

    let width = size.width as usize;
    let height = size.height as usize;
    let covered = rasterize(command, width, height);

    let pipeline = &command.pipeline;
    let mut pixmap = color_texture.pixmap()?;
    let mut stencil = match stencil_texture {
        Some(texture) if pipeline.has_stencil_attachment => Some(texture.stencil()?),
        _ => None,
    };
    let reference = command.stencil_reference;

    for (index, _) in covered.iter().enumerate().filter(|(_, covered)| **covered) {
        if let Some(values) = stencil.as_mut() {
            let Some(value) = values.get_mut(index) else {
                continue;
            };
            let passed = match pipeline.stencil_mode {
                StencilMode::Ignore => true,
                StencilMode::ClipCompare => *value == reference,
                StencilMode::ClipIncrement => {
                    if *value == reference {
                        *value += 1;
                    }
                    continue;
                }
                StencilMode::ClipDecrement => {
                    if *value == reference {
                        *value = value.saturating_sub(1);
                    }
                    continue;
                }
                StencilMode::ClipRestore => {
                    if *value > reference {
                        *value = reference;
                    }
                    continue;
                }
            };
            if !passed {
                continue;
            }
        } else if pipeline.kind == PipelineKind::Clip {
            continue;
        }
        if pipeline.blend_mode == BlendMode::Destination {
            continue;
        }

        let pixel = Point::new((index % width) as f32 + 0.5, (index / width) as f32 + 0.5);
        let local = inverse_mvp.transform_point(pixel);
        let src = program.shade(local, pixel);

        let Some(slot) = pixmap.pixels_mut().get_mut(index) else {
            continue;
        };
        let dst = from_pixel(*slot);
        let out = dst.unpremultiply().blend(src.unpremultiply(), pipeline.blend_mode).premultiply();
        *slot = to_pixel(out);
    }
    Ok(())
}

/// Pixels whose centers fall inside any triangle of the draw.
fn rasterize(command: &Command, width: usize, height: usize) -> Vec<bool> {
    let mut covered = vec![false; width * height];
    let mvp = &command.frame_info.mvp;
    for triangle in command.vertex_buffer.triangles(command.pipeline.primitive_type) {
        let [a, b, c] = triangle.map(|p| mvp.transform_point(p));
        let area = edge(a, b, c);
        if area == 0.0 || !area.is_finite() {
            continue;
        }
        let min_x = a.x.min(b.x).min(c.x).floor().max(0.0) as usize;
        let min_y = a.y.min(b.y).min(c.y).floor().max(0.0) as usize;
        let max_x = (a.x.max(b.x).max(c.x).ceil().max(0.0) as usize).min(width);
        let max_y = (a.y.max(b.y).max(c.y).ceil().max(0.0) as usize).min(height);
        for y in min_y..max_y {
            for x in min_x..max_x {
                let p = Point::new(x as f32 + 0.5, y as f32 + 0.5);
                let w0 = edge(b, c, p) * area.signum();
                let w1 = edge(c, a, p) * area.signum();
                let w2 = edge(a, b, p) * area.signum();
                if w0 >= 0.0 && w1 >= 0.0 && w2 >= 0.0 {
                    covered[y * width + x] = true;
                }
            }
        }
    }
    covered
}

fn edge(a: Point, b: Point, p: Point) -> f32 {
    (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x)
}

fn gradient_color(
    start: Point,
    end: Point,
    colors: &[Color],
    stops: &[f32],
    tile_mode: TileMode,
    local: Point,
) -> Color {
    let (Some(first), Some(last)) = (colors.first(), colors.last()) else {
        return Color::BLACK_TRANSPARENT;
    };
    let axis = end - start;
    let length_squared = axis.x * axis.x + axis.y * axis.y;
    let t = if length_squared > 0.0 {
        let offset = local - start;
        (offset.x * axis.x + offset.y * axis.y) / length_squared
    } else {
        0.0
    };
    let t = match tile_mode {
        TileMode::Clamp => t.clamp(0.0, 1.0),
        TileMode::Repeat => t.rem_euclid(1.0),
        TileMode::Mirror => {
            let m = t.rem_euclid(2.0);
            if m > 1.0 { 2.0 - m } else { m }
        }
        TileMode::Decal => {
            if !(0.0..=1.0).contains(&t) {
                return Color::BLACK_TRANSPARENT;
            }
            t
        }
    };
    if t <= stops.first().copied().unwrap_or(0.0) {
        return *first;
    }
    for (i, window) in stops.windows(2).enumerate() {
        let (s0, s1) = (window[0], window[1]);
        if t <= s1 {
            let (Some(c0), Some(c1)) = (colors.get(i), colors.get(i + 1)) else {
                break;
            };
            let f = if s1 > s0 { (t - s0) / (s1 - s0) } else { 1.0 };
            return *c0 * (1.0 - f) + *c1 * f;
        }
    }
    *last
}

fn to_pixel(color: Color) -> PremultipliedColorU8 {
    let c = color.clamp01();
    let alpha = (c.alpha * 255.0).round() as u8;
    let channel = |v: f32| ((v * 255.0).round() as u8).min(alpha);
    PremultipliedColorU8::from_rgba(channel(c.red), channel(c.green), channel(c.blue), alpha)
        .unwrap_or(PremultipliedColorU8::TRANSPARENT)
}

fn from_pixel(pixel: PremultipliedColorU8) -> Color {
    Color::new(
        pixel.red() as f32 / 255.0,
        pixel.green() as f32 / 255.0,
        pixel.blue() as f32 / 255.0,
        pixel.alpha() as f32 / 255.0,
    )
}

// --------------------------------------------------------------------------
// Sampling and filter kernels

/// Premultiplied float copy of a texture.
#[derive(Clone, Debug)]
struct FloatImage {
    width: i64,
    height: i64,
    pixels: Vec<Color>,
}

impl FloatImage {
    fn from_pixmap(pixmap: &Pixmap) -> Self {
        Self {
            width: pixmap.width() as i64,
            height: pixmap.height() as i64,
            pixels: pixmap.pixels().iter().copied().map(from_pixel).collect(),
        }
    }

    fn resolve(coord: i64, extent: i64, mode: SamplerAddressMode) -> Option<i64> {
        if extent <= 0 {
            return None;
        }
        match mode {
            SamplerAddressMode::ClampToEdge => Some(coord.clamp(0, extent - 1)),
            SamplerAddressMode::Repeat => Some(coord.rem_euclid(extent)),
            SamplerAddressMode::Mirror => {
                let period = coord.rem_euclid(extent * 2);
                Some(if period >= extent { extent * 2 - 1 - period } else { period })
            }
            SamplerAddressMode::Decal => (0..extent).contains(&coord).then_some(coord),
        }
    }

    fn fetch(&self, x: i64, y: i64, sampler: &SamplerDescriptor) -> Color {
        let x = Self::resolve(x, self.width, sampler.width_address_mode);
        let y = Self::resolve(y, self.height, sampler.height_address_mode);
        match (x, y) {
            (Some(x), Some(y)) => self.pixels[(y * self.width + x) as usize],
            _ => Color::BLACK_TRANSPARENT,
        }
    }

    /// Samples at texel coordinates, where texel centers sit at `n + 0.5`.
    fn sample(&self, texel: Point, sampler: &SamplerDescriptor) -> Color {
        match sampler.mag_filter {
            MinMagFilter::Nearest => self.fetch(texel.x.floor() as i64, texel.y.floor() as i64, sampler),
            MinMagFilter::Linear => {
                let u = texel.x - 0.5;
                let v = texel.y - 0.5;
                let (x0, y0) = (u.floor(), v.floor());
                let (fx, fy) = (u - x0, v - y0);
                let (x0, y0) = (x0 as i64, y0 as i64);
                let top = self.fetch(x0, y0, sampler) * (1.0 - fx) + self.fetch(x0 + 1, y0, sampler) * fx;
                let bottom =
                    self.fetch(x0, y0 + 1, sampler) * (1.0 - fx) + self.fetch(x0 + 1, y0 + 1, sampler) * fx;
                top * (1.0 - fy) + bottom * fy
            }
        }
    }

    fn blur(&self, sigma_x: f32, sigma_y: f32, mode: SamplerAddressMode) -> FloatImage {
        let horizontal = self.convolve(&gaussian_kernel(sigma_x), true, mode);
        horizontal.convolve(&gaussian_kernel(sigma_y), false, mode)
    }

    fn convolve(&self, kernel: &[f32], horizontal: bool, mode: SamplerAddressMode) -> FloatImage {
        if kernel.len() <= 1 {
            return self.clone();
        }
        let sampler = SamplerDescriptor::default().with_address_mode(mode);
        let radius = (kernel.len() / 2) as i64;
        let mut pixels = Vec::with_capacity(self.pixels.len());
        for y in 0..self.height {
            for x in 0..self.width {
                let mut sum = Color::BLACK_TRANSPARENT;
                for (i, weight) in kernel.iter().enumerate() {
                    let offset = i as i64 - radius;
                    let texel = if horizontal {
                        self.fetch(x + offset, y, &sampler)
                    } else {
                        self.fetch(x, y + offset, &sampler)
                    };
                    sum = sum + texel * *weight;
                }
                pixels.push(sum);
            }
        }
        FloatImage { width: self.width, height: self.height, pixels }
    }

    fn morphology(&self, radius_x: i32, radius_y: i32, dilate: bool) -> FloatImage {
        let pass = |image: &FloatImage, radius: i32, horizontal: bool| -> FloatImage {
            if radius <= 0 {
                return image.clone();
            }
            let sampler = SamplerDescriptor::default().with_address_mode(SamplerAddressMode::Decal);
            let mut pixels = Vec::with_capacity(image.pixels.len());
            for y in 0..image.height {
                for x in 0..image.width {
                    let mut acc: Option<Color> = None;
                    for offset in -(radius as i64)..=(radius as i64) {
                        let c = if horizontal {
                            image.fetch(x + offset, y, &sampler)
                        } else {
                            image.fetch(x, y + offset, &sampler)
                        };
                        acc = Some(match acc {
                            None => c,
                            Some(a) if dilate => Color::new(
                                a.red.max(c.red),
                                a.green.max(c.green),
                                a.blue.max(c.blue),
                                a.alpha.max(c.alpha),
                            ),
                            Some(a) => Color::new(
                                a.red.min(c.red),
                                a.green.min(c.green),
                                a.blue.min(c.blue),
                                a.alpha.min(c.alpha),
                            ),
                        });
                    }
                    pixels.push(acc.unwrap_or(Color::BLACK_TRANSPARENT));
                }
            }
            FloatImage { width: image.width, height: image.height, pixels }
        };
        let horizontal = pass(self, radius_x, true);
        pass(&horizontal, radius_y, false)
    }
}

/// Normalized gaussian weights covering three standard deviations.
fn gaussian_kernel(sigma: f32) -> Vec<f32> {
    if sigma < 1e-3 {
        return vec![1.0];
    }
    let radius = (sigma * 3.0).ceil() as i32;
    let weights: Vec<f32> = (-radius..=radius)
        .map(|i| (-((i * i) as f32) / (2.0 * sigma * sigma)).exp())
        .collect();
    let total: f32 = weights.iter().sum();
    weights.into_iter().map(|w| w / total).collect()
}

// --------------------------------------------------------------------------
// Blits

fn execute_blit_pass(pass: BlitPass) -> Result<()> {
    for command in pass.into_commands() {
        match command {
            BlitCommand::CopyTextureToTexture { source, destination } => {
                if crate::renderer::same_texture(&source, &destination) {
                    continue;
                }
                let source = software_texture(&source)?.image()?;
                let destination = software_texture(&destination)?;
                let mut pixmap = destination.pixmap()?;
                let width = (pixmap.width() as i64).min(source.width);
                let height = (pixmap.height() as i64).min(source.height);
                let stride = pixmap.width() as i64;
                let pixels = pixmap.pixels_mut();
                for y in 0..height {
                    for x in 0..width {
                        pixels[(y * stride + x) as usize] = to_pixel(source.pixels[(y * source.width + x) as usize]);
                    }
                }
            }
            // Only the base level is stored; sampling always reads it.
            BlitCommand::GenerateMipmap { .. } => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::{PixelFormat, PrimitiveType};
    use crate::geometry::Rect;
    use crate::renderer::{FrameInfo, PipelineDescriptor, VertexBuffer};

    fn target(context: &SoftwareContext, size: ISize) -> RenderTarget {
        context.create_onscreen_target(size).unwrap()
    }

    fn solid_pipeline(blend_mode: BlendMode) -> PipelineDescriptor {
        PipelineDescriptor {
            kind: PipelineKind::SolidFill,
            blend_mode,
            stencil_mode: StencilMode::Ignore,
            primitive_type: PrimitiveType::TriangleStrip,
            color_format: PixelFormat::R8G8B8A8UNormInt,
            has_stencil_attachment: false,
        }
    }

    #[test]
    fn clear_then_fill_rect() {
        let context = SoftwareContext::new();
        let mut target = target(&context, ISize::new(8, 8));
        target.color_attachment_mut().clear_color = Color::BLUE;
        let texture = target.render_target_texture();

        let mut pass = RenderPass::new(target);
        pass.set_pipeline(solid_pipeline(BlendMode::SourceOver));
        pass.set_vertex_buffer(VertexBuffer::from_rect_strip(Rect::from_xywh(0.0, 0.0, 4.0, 4.0).points()));
        pass.bind_frame_info(FrameInfo::default());
        pass.bind_fragment_info(FragmentInfo::Solid { color: Color::RED });
        pass.draw().unwrap();

        let mut buffer = context.create_command_buffer();
        buffer.encode_render_pass(pass).unwrap();
        buffer.submit().unwrap();

        let texture = software_texture(&texture).unwrap();
        assert_eq!(texture.pixel(1, 1), Some(Color::RED));
        assert_eq!(texture.pixel(6, 6), Some(Color::BLUE));
        assert_eq!(context.render_passes().len(), 1);
    }

    #[test]
    fn allocator_refuses_oversized_textures() {
        let context = SoftwareContext::new().with_max_texture_size(ISize::new(16, 16));
        assert!(context.create_onscreen_target(ISize::new(32, 8)).is_err());
        assert!(context.create_onscreen_target(ISize::new(16, 16)).is_ok());
        assert_eq!(context.allocator().allocations().len(), 1);
    }

    #[test]
    fn gaussian_kernel_is_normalized() {
        let kernel = gaussian_kernel(2.0);
        assert_eq!(kernel.len(), 13);
        assert!((kernel.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        assert_eq!(gaussian_kernel(0.0), vec![1.0]);
    }

    #[test]
    fn decal_sampling_is_transparent_outside() {
        let image = FloatImage { width: 1, height: 1, pixels: vec![Color::RED] };
        let decal = SamplerDescriptor::default().with_address_mode(SamplerAddressMode::Decal);
        assert_eq!(image.sample(Point::new(0.5, 0.5), &decal), Color::RED);
        assert_eq!(image.sample(Point::new(1.5, 0.5), &decal), Color::BLACK_TRANSPARENT);
        let clamp = SamplerDescriptor::default();
        assert_eq!(image.sample(Point::new(4.5, 0.5), &clamp), Color::RED);
    }

    #[test]
    fn gradient_interpolates_between_stops() {
        let colors = [Color::BLACK, Color::WHITE];
        let mid = gradient_color(
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            &colors,
            &[0.0, 1.0],
            TileMode::Clamp,
            Point::new(5.0, 3.0),
        );
        assert!((mid.red - 0.5).abs() < 1e-5);
        let decal = gradient_color(
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            &colors,
            &[0.0, 1.0],
            TileMode::Decal,
            Point::new(15.0, 0.0),
        );
        assert_eq!(decal, Color::BLACK_TRANSPARENT);
    }
}
