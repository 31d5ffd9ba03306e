//! Lazily opened render passes over one entity pass target.
//!
//! A pass target is written by a sequence of render passes. The first one
//! clears it; every later one starts on a fresh color texture that gets the
//! previous contents drawn back in, so whatever ended the previous pass can
//! keep sampling the old texture.

use std::sync::Arc;

use crate::color::BlendMode;
use crate::content_context::ContentContext;
use crate::contents::{ClipCoverageKind, TextureContents};
use crate::entity::Entity;
use crate::error::{RenderError, Result};
use crate::formats::{LoadAction, StoreAction};
use crate::renderer::{Allocator, BlitPass, CommandBuffer, RenderPass, RenderTarget, TextureRef};

/// A render target plus the spare color texture it swaps to when flipped.
#[derive(Debug)]
pub struct EntityPassTarget {
    target: RenderTarget,
    secondary_color_texture: Option<TextureRef>,
}

impl EntityPassTarget {
    pub fn new(target: RenderTarget) -> Self {
        Self { target, secondary_color_texture: None }
    }

    /// Swaps the color attachment for the spare texture and returns the
    /// texture that was written so far.
    pub fn flip(&mut self, allocator: &dyn Allocator) -> Result<TextureRef> {
        let secondary = match self.secondary_color_texture.take() {
            Some(texture) => texture,
            None => {
                let desc = self.target.color_attachment().texture.descriptor().clone();
                allocator.create_texture(&desc).ok_or_else(|| RenderError::Allocation {
                    label: "EntityPassTarget Secondary Color Texture".to_string(),
                    size: desc.size,
                    format: desc.format,
                    mip_count: desc.mip_count,
                })?
            }
        };
        let previous = std::mem::replace(&mut self.target.color_attachment_mut().texture, secondary);
        self.secondary_color_texture = Some(previous.clone());
        Ok(previous)
    }

    pub fn render_target(&self) -> &RenderTarget {
        &self.target
    }

    pub fn render_target_mut(&mut self) -> &mut RenderTarget {
        &mut self.target
    }

    pub fn into_render_target(self) -> RenderTarget {
        self.target
    }
}

/// Clip entities drawn into the current target, kept so they can be drawn
/// again when the stencil buffer starts over in a new render pass.
#[derive(Debug, Default)]
pub struct ClipRecorder {
    entities: Vec<Entity>,
}

impl ClipRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_entity(&mut self, entity: &Entity, kind: ClipCoverageKind) {
        match kind {
            ClipCoverageKind::NoChange => {}
            ClipCoverageKind::Append => self.entities.push(entity.clone()),
            ClipCoverageKind::Restore => {
                self.entities.pop();
            }
        }
    }

    pub fn replay_entities(&self) -> &[Entity] {
        &self.entities
    }
}

/// The active render pass and the recorder for clips drawn into it.
pub struct RenderPassResult<'a> {
    pub pass: &'a mut RenderPass,
    pub clip_recorder: &'a mut ClipRecorder,
}

pub struct InlinePassContext {
    pass_target: EntityPassTarget,
    command_buffer: Option<Box<dyn CommandBuffer>>,
    pass: Option<RenderPass>,
    pass_count: u32,
    clip_recorder: ClipRecorder,
}

impl InlinePassContext {
    pub fn new(pass_target: EntityPassTarget) -> Self {
        Self {
            pass_target,
            command_buffer: None,
            pass: None,
            pass_count: 0,
            clip_recorder: ClipRecorder::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.pass.is_some()
    }

    /// Number of render passes opened so far.
    pub fn pass_count(&self) -> u32 {
        self.pass_count
    }

    /// The color texture currently being written.
    pub fn texture(&self) -> TextureRef {
        self.pass_target.render_target().render_target_texture()
    }

    pub fn pass_target(&self) -> &EntityPassTarget {
        &self.pass_target
    }

    /// Returns the active render pass, opening one first if needed.
    pub fn get_render_pass(
        &mut self,
        renderer: &ContentContext,
        pass_depth: u32,
    ) -> Result<RenderPassResult<'_>> {
        if self.pass.is_none() {
            self.begin_pass(renderer, pass_depth)?;
        }
        let pass = self.pass.as_mut().ok_or(RenderError::NoActivePass)?;
        Ok(RenderPassResult { pass, clip_recorder: &mut self.clip_recorder })
    }

    fn begin_pass(&mut self, renderer: &ContentContext, pass_depth: u32) -> Result<()> {
        let mut command_buffer = renderer.context().create_command_buffer();
        command_buffer.set_label(&format!(
            "EntityPass Command Buffer: Depth={pass_depth} Count={}",
            self.pass_count
        ));

        let backdrop = if self.pass_count > 0 {
            Some(self.pass_target.flip(&**renderer.render_target_cache())?)
        } else {
            None
        };

        let target = self.pass_target.render_target_mut();
        let color = target.color_attachment_mut();
        color.load_action = if backdrop.is_some() { LoadAction::DontCare } else { LoadAction::Clear };
        color.store_action = StoreAction::Store;
        let Some(stencil) = target.stencil_attachment_mut() else {
            return Err(RenderError::InvalidRenderTarget(
                "entity pass targets need a stencil attachment",
            ));
        };
        stencil.load_action = LoadAction::Clear;
        stencil.store_action = StoreAction::DontCare;

        let mut pass = RenderPass::new(target.clone());
        pass.set_label(format!("EntityPass Render Pass: Depth={pass_depth} Count={}", self.pass_count));

        if let Some(backdrop) = backdrop {
            let mut contents = TextureContents::from_texture(backdrop);
            contents.set_stencil_enabled(false);
            let mut entity = Entity::from_contents(Arc::new(contents));
            entity.set_blend_mode(BlendMode::Source);
            entity.render(renderer, &mut pass)?;

            for clip in self.clip_recorder.replay_entities() {
                if let Err(err) = clip.render(renderer, &mut pass) {
                    tracing::error!(%err, "failed to replay clip into a restarted pass");
                }
            }
        }

        self.command_buffer = Some(command_buffer);
        self.pass = Some(pass);
        self.pass_count += 1;
        Ok(())
    }

    /// Encodes and submits the active pass. Does nothing when no pass is open.
    pub fn end_pass(&mut self, renderer: &ContentContext) -> Result<()> {
        let Some(pass) = self.pass.take() else {
            return Ok(());
        };
        let mut command_buffer = self.command_buffer.take().ok_or(RenderError::NoActivePass)?;
        let label = pass.label().to_string();
        command_buffer.encode_render_pass(pass)?;

        let texture = self.texture();
        if texture.descriptor().mip_count > 1 {
            if renderer.capabilities().supports_mipmap_generation {
                let mut blit = BlitPass::new(format!("{label} Mipmaps"));
                blit.generate_mipmap(texture);
                command_buffer.encode_blit_pass(blit)?;
            } else {
                tracing::warn!(%label, "target wants mip levels but the device cannot generate them");
            }
        }
        command_buffer.submit()
    }

    pub fn into_render_target(self) -> RenderTarget {
        self.pass_target.into_render_target()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contents::{ClipContents, ClipRestoreContents};
    use crate::geometry::Rect;
    use crate::shape::Geometry;

    fn clip_entity() -> Entity {
        Entity::from_contents(Arc::new(ClipContents::new(
            Geometry::Rect(Rect::from_xywh(0.0, 0.0, 10.0, 10.0)),
            Default::default(),
        )))
    }

    #[test]
    fn recorder_pairs_appends_with_restores() {
        let mut recorder = ClipRecorder::new();
        recorder.record_entity(&clip_entity(), ClipCoverageKind::Append);
        recorder.record_entity(&clip_entity(), ClipCoverageKind::Append);
        assert_eq!(recorder.replay_entities().len(), 2);

        let restore = Entity::from_contents(Arc::new(ClipRestoreContents::new()));
        recorder.record_entity(&restore, ClipCoverageKind::Restore);
        assert_eq!(recorder.replay_entities().len(), 1);

        recorder.record_entity(&restore, ClipCoverageKind::NoChange);
        assert_eq!(recorder.replay_entities().len(), 1);
    }

    #[test]
    fn restore_on_empty_recorder_is_ignored() {
        let mut recorder = ClipRecorder::new();
        recorder.record_entity(&clip_entity(), ClipCoverageKind::Restore);
        assert!(recorder.replay_entities().is_empty());
    }
}
