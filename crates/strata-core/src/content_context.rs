use std::sync::Arc;

use crate::color::{BlendMode, Color};
use crate::entity::Entity;
use crate::error::Result;
use crate::formats::PrimitiveType;
use crate::geometry::ISize;
use crate::renderer::{
    BlitPass, Capabilities, Context, PipelineDescriptor, PipelineKind, RenderPass, RenderTarget,
    RenderTargetCache, StencilMode, TextureRef,
};

/// Everything contents need while rendering: the device context and the
/// render target cache shared by every offscreen allocation of a frame.
pub struct ContentContext {
    context: Arc<dyn Context>,
    render_target_cache: Arc<RenderTargetCache>,
}

impl ContentContext {
    pub fn new(context: Arc<dyn Context>) -> Self {
        let render_target_cache = Arc::new(RenderTargetCache::new(context.resource_allocator()));
        Self { context, render_target_cache }
    }

    pub fn with_render_target_cache(
        context: Arc<dyn Context>,
        render_target_cache: Arc<RenderTargetCache>,
    ) -> Self {
        Self { context, render_target_cache }
    }

    pub fn context(&self) -> &Arc<dyn Context> {
        &self.context
    }

    pub fn capabilities(&self) -> &Capabilities {
        self.context.capabilities()
    }

    pub fn render_target_cache(&self) -> &Arc<RenderTargetCache> {
        &self.render_target_cache
    }

    /// Pipeline state matching the pass attachments, with SourceOver blending.
    pub fn options_from_pass(&self, kind: PipelineKind, pass: &RenderPass) -> PipelineDescriptor {
        PipelineDescriptor {
            kind,
            blend_mode: BlendMode::SourceOver,
            stencil_mode: StencilMode::ClipCompare,
            primitive_type: PrimitiveType::Triangle,
            color_format: pass.render_target_pixel_format(),
            has_stencil_attachment: pass.has_stencil_attachment(),
        }
    }

    pub fn options_from_pass_and_entity(
        &self,
        kind: PipelineKind,
        pass: &RenderPass,
        entity: &Entity,
    ) -> PipelineDescriptor {
        PipelineDescriptor {
            blend_mode: entity.blend_mode(),
            ..self.options_from_pass(kind, pass)
        }
    }

    /// Renders `callback` into a fresh transparent texture of `size` and
    /// submits it. Mips are regenerated when more than one level is requested.
    pub fn make_subpass(
        &self,
        label: &str,
        size: ISize,
        mip_count: u32,
        callback: impl FnOnce(&ContentContext, &mut RenderPass) -> Result<()>,
    ) -> Result<TextureRef> {
        let target = RenderTarget::create_offscreen(
            &*self.context,
            &*self.render_target_cache,
            size,
            mip_count,
            label,
            Color::BLACK_TRANSPARENT,
            false,
        )?;
        let texture = target.render_target_texture();
        let mut pass = RenderPass::new(target);
        pass.set_label(label);
        callback(self, &mut pass)?;

        let mut command_buffer = self.context.create_command_buffer();
        command_buffer.set_label(label);
        command_buffer.encode_render_pass(pass)?;
        if texture.descriptor().mip_count > 1 && self.capabilities().supports_mipmap_generation {
            let mut blit = BlitPass::new(format!("{label} Mipmaps"));
            blit.generate_mipmap(texture.clone());
            command_buffer.encode_blit_pass(blit)?;
        }
        command_buffer.submit()?;
        Ok(texture)
    }
}
