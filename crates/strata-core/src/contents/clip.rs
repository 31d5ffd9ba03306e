use std::sync::Arc;

use crate::color::BlendMode;
use crate::content_context::ContentContext;
use crate::entity::Entity;
use crate::error::Result;
use crate::formats::PrimitiveType;
use crate::geometry::{Matrix, Rect};
use crate::renderer::{
    FragmentInfo, FrameInfo, PipelineKind, RenderPass, StencilMode, VertexBuffer,
};
use crate::shape::Geometry;

use super::{ClipCoverage, ClipCoverageKind, Contents};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ClipOperation {
    Difference,
    #[default]
    Intersect,
}

/// Writes a clip into the stencil buffer. Pixels inside the clip end up at
/// `clip_depth + 1`, which is what entities recorded under the clip test for.
#[derive(Clone, Debug)]
pub struct ClipContents {
    geometry: Option<Geometry>,
    clip_op: ClipOperation,
}

impl ClipContents {
    pub fn new(geometry: Geometry, clip_op: ClipOperation) -> Self {
        Self { geometry: Some(geometry), clip_op }
    }

    /// A clip with no geometry; intersecting with it clips everything out.
    pub fn empty(clip_op: ClipOperation) -> Self {
        Self { geometry: None, clip_op }
    }

    pub fn clip_op(&self) -> ClipOperation {
        self.clip_op
    }

    fn draw(
        &self,
        renderer: &ContentContext,
        pass: &mut RenderPass,
        label: &str,
        stencil_mode: StencilMode,
        stencil_reference: u32,
        primitive_type: PrimitiveType,
        vertex_buffer: VertexBuffer,
        frame_info: FrameInfo,
    ) -> Result<()> {
        let mut options = renderer.options_from_pass(PipelineKind::Clip, pass);
        options.blend_mode = BlendMode::Destination;
        options.stencil_mode = stencil_mode;
        options.primitive_type = primitive_type;

        pass.set_command_label(label);
        pass.set_pipeline(options);
        pass.set_stencil_reference(stencil_reference);
        pass.set_vertex_buffer(vertex_buffer);
        pass.bind_frame_info(frame_info);
        pass.bind_fragment_info(FragmentInfo::None);
        pass.draw()
    }
}

impl Contents for ClipContents {
    fn coverage(&self, _entity: &Entity) -> Option<Rect> {
        None
    }

    fn should_render(&self, _entity: &Entity, _clip_coverage: Option<Rect>) -> bool {
        true
    }

    fn can_inherit_opacity(&self, _entity: &Entity) -> bool {
        true
    }

    fn with_inherited_opacity(&self, _opacity: f32) -> Option<Arc<dyn Contents>> {
        Some(Arc::new(self.clone()))
    }

    fn clip_coverage(&self, entity: &Entity, current_clip_coverage: Option<Rect>) -> ClipCoverage {
        let Some(current) = current_clip_coverage else {
            return ClipCoverage { kind: ClipCoverageKind::Append, coverage: None };
        };
        match self.clip_op {
            // Can't shrink the coverage without knowing the shape's interior.
            ClipOperation::Difference => {
                ClipCoverage { kind: ClipCoverageKind::Append, coverage: Some(current) }
            }
            ClipOperation::Intersect => {
                let coverage = self
                    .geometry
                    .as_ref()
                    .and_then(|geometry| geometry.coverage(entity.transform()))
                    .and_then(|coverage| coverage.intersection(&current));
                ClipCoverage { kind: ClipCoverageKind::Append, coverage }
            }
        }
    }

    fn render(&self, renderer: &ContentContext, entity: &Entity, pass: &mut RenderPass) -> Result<()> {
        let Some(geometry) = &self.geometry else {
            return Ok(());
        };
        let depth = entity.shader_clip_depth();

        let mut stencil_reference = entity.clip_depth();
        if self.clip_op == ClipOperation::Difference {
            let full = Rect::from_isize(pass.render_target_size());
            self.draw(
                renderer,
                pass,
                "Difference Clip (Increment)",
                StencilMode::ClipIncrement,
                stencil_reference,
                PrimitiveType::TriangleStrip,
                VertexBuffer::from_rect_strip(full.points()),
                FrameInfo { mvp: Matrix::identity(), depth },
            )?;
            stencil_reference += 1;
        }

        let result = geometry.position_buffer(entity.transform(), pass.render_target_size());
        if result.vertex_buffer.is_empty() {
            return Ok(());
        }
        let (label, stencil_mode) = match self.clip_op {
            ClipOperation::Intersect => ("Intersect Clip", StencilMode::ClipIncrement),
            ClipOperation::Difference => ("Difference Clip (Punch)", StencilMode::ClipDecrement),
        };
        self.draw(
            renderer,
            pass,
            label,
            stencil_mode,
            stencil_reference,
            result.primitive_type,
            result.vertex_buffer,
            FrameInfo { mvp: result.transform, depth },
        )
    }
}

/// Pops clips by resetting the stencil to the entity's clip depth over the
/// area the popped clips could have touched.
#[derive(Clone, Debug, Default)]
pub struct ClipRestoreContents {
    restore_coverage: Option<Rect>,
}

impl ClipRestoreContents {
    pub fn new() -> Self {
        Self::default()
    }

    /// `coverage` is in pass space; `None` restores the whole target.
    pub fn with_restore_coverage(coverage: Option<Rect>) -> Self {
        Self { restore_coverage: coverage }
    }

    pub fn restore_coverage(&self) -> Option<Rect> {
        self.restore_coverage
    }
}

impl Contents for ClipRestoreContents {
    fn coverage(&self, _entity: &Entity) -> Option<Rect> {
        None
    }

    fn should_render(&self, _entity: &Entity, _clip_coverage: Option<Rect>) -> bool {
        true
    }

    fn can_inherit_opacity(&self, _entity: &Entity) -> bool {
        true
    }

    fn with_inherited_opacity(&self, _opacity: f32) -> Option<Arc<dyn Contents>> {
        Some(Arc::new(self.clone()))
    }

    fn clip_coverage(&self, _entity: &Entity, _current_clip_coverage: Option<Rect>) -> ClipCoverage {
        ClipCoverage { kind: ClipCoverageKind::Restore, coverage: None }
    }

    fn render(&self, renderer: &ContentContext, entity: &Entity, pass: &mut RenderPass) -> Result<()> {
        let rect = self
            .restore_coverage
            .unwrap_or_else(|| Rect::from_isize(pass.render_target_size()));
        if rect.is_empty() {
            return Ok(());
        }
        let mut options = renderer.options_from_pass(PipelineKind::Clip, pass);
        options.blend_mode = BlendMode::Destination;
        options.stencil_mode = StencilMode::ClipRestore;
        options.primitive_type = PrimitiveType::TriangleStrip;

        pass.set_command_label("Restore Clip");
        pass.set_pipeline(options);
        pass.set_stencil_reference(entity.clip_depth());
        pass.set_vertex_buffer(VertexBuffer::from_rect_strip(rect.points()));
        pass.bind_frame_info(FrameInfo { mvp: Matrix::identity(), depth: entity.shader_clip_depth() });
        pass.bind_fragment_info(FragmentInfo::None);
        pass.draw()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intersect_shrinks_coverage() {
        let clip = ClipContents::new(
            Geometry::Rect(Rect::from_xywh(50.0, 50.0, 100.0, 100.0)),
            ClipOperation::Intersect,
        );
        let coverage = clip.clip_coverage(&Entity::new(), Some(Rect::from_xywh(0.0, 0.0, 100.0, 100.0)));
        assert_eq!(coverage.kind, ClipCoverageKind::Append);
        assert_eq!(coverage.coverage, Some(Rect::from_ltrb(50.0, 50.0, 100.0, 100.0)));
    }

    #[test]
    fn zero_area_intersection_clips_everything() {
        let clip = ClipContents::new(
            Geometry::Rect(Rect::from_xywh(100.0, 0.0, 50.0, 50.0)),
            ClipOperation::Intersect,
        );
        let coverage = clip.clip_coverage(&Entity::new(), Some(Rect::from_xywh(0.0, 0.0, 100.0, 100.0)));
        assert_eq!(coverage.coverage, None);
    }

    #[test]
    fn difference_keeps_current_coverage() {
        let clip = ClipContents::new(
            Geometry::Rect(Rect::from_xywh(10.0, 10.0, 10.0, 10.0)),
            ClipOperation::Difference,
        );
        let current = Some(Rect::from_xywh(0.0, 0.0, 100.0, 100.0));
        assert_eq!(clip.clip_coverage(&Entity::new(), current).coverage, current);
        assert_eq!(clip.clip_coverage(&Entity::new(), None).coverage, None);
    }

    #[test]
    fn restore_reports_restore_kind() {
        let restore = ClipRestoreContents::new();
        let current = Some(Rect::from_xywh(0.0, 0.0, 10.0, 10.0));
        let coverage = restore.clip_coverage(&Entity::new(), current);
        assert_eq!(coverage.kind, ClipCoverageKind::Restore);
        assert!(restore.should_render(&Entity::new(), None));
    }
}
