use std::sync::Arc;

use crate::content_context::ContentContext;
use crate::entity::Entity;
use crate::error::Result;
use crate::formats::{PrimitiveType, SamplerDescriptor};
use crate::geometry::{Matrix, Rect};
use crate::renderer::{
    FragmentInfo, FrameInfo, PipelineKind, RenderPass, StencilMode, TextureRef, VertexBuffer,
};

use super::{Contents, Snapshot, snapshot_via_subpass};

/// Draws `source_rect` of a texture into `destination_rect`.
#[derive(Clone, Debug)]
pub struct TextureContents {
    destination_rect: Rect,
    texture: Option<TextureRef>,
    source_rect: Rect,
    sampler: SamplerDescriptor,
    opacity: f32,
    stencil_enabled: bool,
}

impl TextureContents {
    pub fn new(destination_rect: Rect) -> Self {
        Self {
            destination_rect,
            texture: None,
            source_rect: destination_rect,
            sampler: SamplerDescriptor::default(),
            opacity: 1.0,
            stencil_enabled: true,
        }
    }

    /// Whole texture at its own size, anchored at the origin.
    pub fn from_texture(texture: TextureRef) -> Self {
        let rect = Rect::from_isize(texture.size());
        let mut contents = Self::new(rect);
        contents.source_rect = rect;
        contents.texture = Some(texture);
        contents
    }

    pub fn set_texture(&mut self, texture: TextureRef) {
        self.texture = Some(texture);
    }

    pub fn texture(&self) -> Option<&TextureRef> {
        self.texture.as_ref()
    }

    pub fn set_source_rect(&mut self, source_rect: Rect) {
        self.source_rect = source_rect;
    }

    pub fn set_sampler(&mut self, sampler: SamplerDescriptor) {
        self.sampler = sampler;
    }

    pub fn set_opacity(&mut self, opacity: f32) {
        self.opacity = opacity;
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    pub fn set_stencil_enabled(&mut self, enabled: bool) {
        self.stencil_enabled = enabled;
    }

    /// Maps destination coordinates to texel coordinates of the source rect.
    fn texture_transform(&self) -> Matrix {
        let dst = self.destination_rect;
        let src = self.source_rect;
        let sx = if dst.width() != 0.0 { src.width() / dst.width() } else { 1.0 };
        let sy = if dst.height() != 0.0 { src.height() / dst.height() } else { 1.0 };
        Matrix::translation(src.origin()) * Matrix::scale(sx, sy) * Matrix::translation(-dst.origin())
    }
}

impl Contents for TextureContents {
    fn coverage(&self, entity: &Entity) -> Option<Rect> {
        if self.opacity <= 0.0 || self.destination_rect.is_empty() || entity.transform().is_degenerate() {
            return None;
        }
        Some(self.destination_rect.transform_bounds(entity.transform()))
    }

    fn render(&self, renderer: &ContentContext, entity: &Entity, pass: &mut RenderPass) -> Result<()> {
        let Some(texture) = &self.texture else {
            return Ok(());
        };
        if self.destination_rect.is_empty() || self.source_rect.is_empty() {
            return Ok(());
        }
        let mut options = renderer.options_from_pass_and_entity(PipelineKind::Texture, pass, entity);
        options.primitive_type = PrimitiveType::TriangleStrip;
        if !self.stencil_enabled {
            options.stencil_mode = StencilMode::Ignore;
        }

        pass.set_command_label("Texture Fill");
        pass.set_pipeline(options);
        pass.set_stencil_reference(entity.clip_depth());
        pass.set_vertex_buffer(VertexBuffer::from_rect_strip(self.destination_rect.points()));
        pass.bind_frame_info(FrameInfo { mvp: *entity.transform(), depth: entity.shader_clip_depth() });
        pass.bind_fragment_info(FragmentInfo::Texture {
            alpha: self.opacity,
            texture_transform: self.texture_transform(),
            sampler: self.sampler,
        });
        pass.bind_texture(texture.clone());
        pass.draw()
    }

    fn can_inherit_opacity(&self, _entity: &Entity) -> bool {
        true
    }

    fn with_inherited_opacity(&self, opacity: f32) -> Option<Arc<dyn Contents>> {
        let mut faded = self.clone();
        faded.opacity *= opacity;
        Some(Arc::new(faded))
    }

    /// Hands out the texture itself when drawing it would be a plain copy.
    fn render_to_snapshot(
        &self,
        renderer: &ContentContext,
        entity: &Entity,
        coverage_limit: Option<Rect>,
        mip_count: u32,
        label: &str,
    ) -> Result<Option<Snapshot>> {
        if let Some(texture) = &self.texture {
            let full = Rect::from_isize(texture.size());
            let transform = *entity.transform() * Matrix::translation(self.destination_rect.origin());
            if self.opacity >= 1.0
                && self.source_rect == full
                && self.destination_rect.size() == full.size()
                && texture.descriptor().mip_count >= mip_count
            {
                let mut snapshot = Snapshot::new(texture.clone(), transform);
                snapshot.sampler = self.sampler;
                return Ok(Some(snapshot));
            }
        }
        snapshot_via_subpass(self, renderer, entity, coverage_limit, mip_count, label)
    }
}
