//! Narrow renderer interfaces the compositor records against.
//!
//! Passes are plain recorders shared by every backend; a backend only has to
//! allocate textures and turn recorded passes into real work at submit time.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::color::Color;
use crate::error::{RenderError, Result};
use crate::formats::{
    LoadAction, PixelFormat, StorageMode, StoreAction, TextureDescriptor, TextureUsage,
};
use crate::geometry::ISize;

mod blit_pass;
mod render_pass;
mod render_target_cache;

pub use blit_pass::{BlitCommand, BlitPass};
pub use render_pass::{
    Command, FragmentInfo, FrameInfo, PipelineDescriptor, PipelineKind, RenderPass, StencilMode,
    VertexBuffer,
};
pub use render_target_cache::RenderTargetCache;

pub trait Texture: fmt::Debug + Send + Sync {
    fn descriptor(&self) -> &TextureDescriptor;

    fn size(&self) -> ISize {
        self.descriptor().size
    }

    fn as_any(&self) -> &dyn Any;
}

pub type TextureRef = Arc<dyn Texture>;

pub fn same_texture(a: &TextureRef, b: &TextureRef) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

pub trait Allocator: Send + Sync {
    /// Returns `None` when the backing memory cannot be provided.
    fn create_texture(&self, desc: &TextureDescriptor) -> Option<TextureRef>;

    fn max_texture_size(&self) -> ISize;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendType {
    Software,
    Wgpu,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Capabilities {
    pub supports_framebuffer_fetch: bool,
    pub supports_texture_to_texture_blits: bool,
    pub supports_decal_sampler_address_mode: bool,
    pub supports_mipmap_generation: bool,
    pub default_color_format: PixelFormat,
    pub default_stencil_format: PixelFormat,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            supports_framebuffer_fetch: false,
            supports_texture_to_texture_blits: true,
            supports_decal_sampler_address_mode: false,
            supports_mipmap_generation: true,
            default_color_format: PixelFormat::R8G8B8A8UNormInt,
            default_stencil_format: PixelFormat::S8UInt,
        }
    }
}

pub trait CommandBuffer {
    fn set_label(&mut self, label: &str);

    fn encode_render_pass(&mut self, pass: RenderPass) -> Result<()>;

    fn encode_blit_pass(&mut self, pass: BlitPass) -> Result<()>;

    /// Hands every encoded pass to the device in encoding order.
    fn submit(self: Box<Self>) -> Result<()>;
}

pub trait Context: Send + Sync {
    fn backend_type(&self) -> BackendType;

    fn capabilities(&self) -> &Capabilities;

    fn resource_allocator(&self) -> Arc<dyn Allocator>;

    fn create_command_buffer(&self) -> Box<dyn CommandBuffer>;
}

#[derive(Clone, Debug)]
pub struct ColorAttachment {
    pub texture: TextureRef,
    pub load_action: LoadAction,
    pub store_action: StoreAction,
    pub clear_color: Color,
}

#[derive(Clone, Debug)]
pub struct StencilAttachment {
    pub texture: TextureRef,
    pub load_action: LoadAction,
    pub store_action: StoreAction,
    pub clear_stencil: u32,
}

#[derive(Clone, Debug)]
pub struct RenderTarget {
    color: ColorAttachment,
    stencil: Option<StencilAttachment>,
}

impl RenderTarget {
    pub fn new(color: ColorAttachment) -> Self {
        Self { color, stencil: None }
    }

    /// Wraps an existing texture, clearing it to transparent black on first use.
    pub fn from_texture(texture: TextureRef) -> Self {
        Self::new(ColorAttachment {
            texture,
            load_action: LoadAction::Clear,
            store_action: StoreAction::Store,
            clear_color: Color::BLACK_TRANSPARENT,
        })
    }

    /// Allocates a color texture (and optionally a stencil buffer) sized `size`.
    pub fn create_offscreen(
        context: &dyn Context,
        allocator: &dyn Allocator,
        size: ISize,
        mip_count: u32,
        label: &str,
        clear_color: Color,
        with_stencil: bool,
    ) -> Result<RenderTarget> {
        if size.is_empty() {
            return Err(RenderError::InvalidRenderTarget("offscreen target has an empty size"));
        }
        let desc = TextureDescriptor {
            storage_mode: StorageMode::DevicePrivate,
            format: context.capabilities().default_color_format,
            size,
            mip_count: mip_count.max(1),
            usage: TextureUsage::RENDER_TARGET | TextureUsage::SHADER_READ | TextureUsage::COPY,
        };
        let texture = allocator.create_texture(&desc).ok_or_else(|| RenderError::Allocation {
            label: format!("{label} Color Texture"),
            size,
            format: desc.format,
            mip_count: desc.mip_count,
        })?;
        let mut target = RenderTarget::new(ColorAttachment {
            texture,
            load_action: LoadAction::Clear,
            store_action: StoreAction::Store,
            clear_color,
        });
        if with_stencil {
            target.setup_stencil_attachment(context, allocator, label)?;
        }
        Ok(target)
    }

    pub fn setup_stencil_attachment(
        &mut self,
        context: &dyn Context,
        allocator: &dyn Allocator,
        label: &str,
    ) -> Result<()> {
        let desc = TextureDescriptor {
            storage_mode: StorageMode::DeviceTransient,
            format: context.capabilities().default_stencil_format,
            size: self.size(),
            mip_count: 1,
            usage: TextureUsage::RENDER_TARGET,
        };
        let texture = allocator.create_texture(&desc).ok_or_else(|| RenderError::Allocation {
            label: format!("{label} Stencil Texture"),
            size: desc.size,
            format: desc.format,
            mip_count: 1,
        })?;
        self.stencil = Some(StencilAttachment {
            texture,
            load_action: LoadAction::Clear,
            store_action: StoreAction::DontCare,
            clear_stencil: 0,
        });
        Ok(())
    }

    pub fn size(&self) -> ISize {
        self.color.texture.size()
    }

    pub fn color_attachment(&self) -> &ColorAttachment {
        &self.color
    }

    pub fn color_attachment_mut(&mut self) -> &mut ColorAttachment {
        &mut self.color
    }

    pub fn stencil_attachment(&self) -> Option<&StencilAttachment> {
        self.stencil.as_ref()
    }

    pub fn stencil_attachment_mut(&mut self) -> Option<&mut StencilAttachment> {
        self.stencil.as_mut()
    }

    pub fn set_stencil_attachment(&mut self, stencil: Option<StencilAttachment>) {
        self.stencil = stencil;
    }

    /// The texture holding the final color output.
    pub fn render_target_texture(&self) -> TextureRef {
        self.color.texture.clone()
    }

    pub fn validate(&self) -> Result<()> {
        if self.size().is_empty() {
            return Err(RenderError::InvalidRenderTarget("color attachment has an empty size"));
        }
        if let Some(stencil) = &self.stencil {
            if !stencil.texture.descriptor().format.is_stencil() {
                return Err(RenderError::InvalidRenderTarget(
                    "stencil attachment does not use a stencil format",
                ));
            }
            if stencil.texture.size() != self.size() {
                return Err(RenderError::InvalidRenderTarget(
                    "stencil attachment size differs from the color attachment",
                ));
            }
        }
        Ok(())
    }
}
