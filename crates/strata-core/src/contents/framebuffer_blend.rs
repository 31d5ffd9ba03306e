use std::sync::Arc;

use crate::color::BlendMode;
use crate::content_context::ContentContext;
use crate::entity::Entity;
use crate::error::Result;
use crate::geometry::{Matrix, Rect};
use crate::renderer::{FragmentInfo, PipelineKind, RenderPass};

use super::Contents;

/// Blends child contents against the attachment it is drawn into by reading
/// the destination in the fragment stage. Only valid on devices with
/// framebuffer fetch.
#[derive(Clone, Debug)]
pub struct FramebufferBlendContents {
    child: Arc<dyn Contents>,
    blend_mode: BlendMode,
}

impl FramebufferBlendContents {
    pub fn new(child: Arc<dyn Contents>, blend_mode: BlendMode) -> Self {
        Self { child, blend_mode }
    }

    pub fn blend_mode(&self) -> BlendMode {
        self.blend_mode
    }
}

impl Contents for FramebufferBlendContents {
    fn coverage(&self, entity: &Entity) -> Option<Rect> {
        self.child.coverage(entity)
    }

    fn render(&self, renderer: &ContentContext, entity: &Entity, pass: &mut RenderPass) -> Result<()> {
        if !renderer.capabilities().supports_framebuffer_fetch {
            tracing::error!("framebuffer blend requested on a device without framebuffer fetch");
            return Ok(());
        }
        let limit = Rect::from_isize(pass.render_target_size());
        let Some(src) = self.child.render_to_snapshot(
            renderer,
            entity,
            Some(limit),
            1,
            "FramebufferBlendContents Snapshot",
        )?
        else {
            return Ok(());
        };

        // The pipeline carries the advanced mode; the fixed-function stage
        // just writes what the fragment stage produced.
        let mut options = renderer.options_from_pass(PipelineKind::FramebufferBlend, pass);
        options.blend_mode = self.blend_mode;
        src.draw(
            pass,
            "Framebuffer Advanced Blend",
            options,
            entity.clip_depth(),
            entity.shader_clip_depth(),
            FragmentInfo::Texture {
                alpha: src.opacity,
                texture_transform: Matrix::identity(),
                sampler: src.sampler,
            },
        )
    }
}
