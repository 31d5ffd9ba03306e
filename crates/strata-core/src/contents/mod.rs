//! Drawable contents wrapped by entities.

use std::fmt;
use std::sync::Arc;

use crate::color::{BlendMode, Color};
use crate::content_context::ContentContext;
use crate::entity::Entity;
use crate::error::Result;
use crate::filters::FilterContents;
use crate::formats::SamplerDescriptor;
use crate::geometry::{ISize, Matrix, Rect};
use crate::formats::PrimitiveType;
use crate::renderer::{FragmentInfo, FrameInfo, PipelineDescriptor, RenderPass, TextureRef, VertexBuffer};

mod checkerboard;
mod clip;
mod framebuffer_blend;
mod linear_gradient;
mod solid_color;
mod texture;

pub use checkerboard::CheckerboardContents;
pub use clip::{ClipContents, ClipOperation, ClipRestoreContents};
pub use framebuffer_blend::FramebufferBlendContents;
pub use linear_gradient::LinearGradientContents;
pub use solid_color::SolidColorContents;
pub use texture::TextureContents;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClipCoverageKind {
    NoChange,
    Append,
    Restore,
}

/// How an entity changes the clip coverage stack, in pass space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClipCoverage {
    pub kind: ClipCoverageKind,
    pub coverage: Option<Rect>,
}

/// A rendered texture and where it lands in pass space.
#[derive(Clone, Debug)]
pub struct Snapshot {
    pub texture: TextureRef,
    /// Texel coordinates to pass coordinates.
    pub transform: Matrix,
    pub sampler: SamplerDescriptor,
    pub opacity: f32,
}

impl Snapshot {
    pub fn new(texture: TextureRef, transform: Matrix) -> Self {
        Self { texture, transform, sampler: SamplerDescriptor::default(), opacity: 1.0 }
    }

    pub fn coverage(&self) -> Rect {
        Rect::from_isize(self.texture.size()).transform_bounds(&self.transform)
    }

    /// Records a quad covering the whole snapshot texture, placed by its transform.
    pub(crate) fn draw(
        &self,
        pass: &mut RenderPass,
        label: &str,
        mut pipeline: PipelineDescriptor,
        stencil_reference: u32,
        depth: f32,
        fragment_info: FragmentInfo,
    ) -> Result<()> {
        pipeline.primitive_type = PrimitiveType::TriangleStrip;
        pass.set_command_label(label);
        pass.set_pipeline(pipeline);
        pass.set_stencil_reference(stencil_reference);
        pass.set_vertex_buffer(VertexBuffer::from_rect_strip(
            Rect::from_isize(self.texture.size()).points(),
        ));
        pass.bind_frame_info(FrameInfo { mvp: self.transform, depth });
        pass.bind_fragment_info(fragment_info);
        pass.bind_texture(self.texture.clone());
        pass.draw()
    }
}

pub trait Contents: fmt::Debug + Send + Sync {
    /// Area the contents may touch when drawn by `entity`, in the entity's
    /// destination space. `None` means nothing is drawn.
    fn coverage(&self, entity: &Entity) -> Option<Rect>;

    fn render(&self, renderer: &ContentContext, entity: &Entity, pass: &mut RenderPass) -> Result<()>;

    fn clip_coverage(&self, _entity: &Entity, current_clip_coverage: Option<Rect>) -> ClipCoverage {
        ClipCoverage { kind: ClipCoverageKind::NoChange, coverage: current_clip_coverage }
    }

    fn should_render(&self, entity: &Entity, clip_coverage: Option<Rect>) -> bool {
        let Some(clip_coverage) = clip_coverage else {
            return false;
        };
        let Some(coverage) = self.coverage(entity) else {
            return false;
        };
        coverage.is_maximum() || coverage.intersects_with_rect(&clip_coverage)
    }

    fn is_opaque(&self) -> bool {
        false
    }

    /// The flat color these contents paint over the whole target, if any.
    fn as_background_color(&self, _entity: &Entity, _target_size: ISize) -> Option<Color> {
        None
    }

    fn can_inherit_opacity(&self, _entity: &Entity) -> bool {
        false
    }

    /// A copy with `opacity` folded in, or `None` when that is not possible.
    fn with_inherited_opacity(&self, _opacity: f32) -> Option<Arc<dyn Contents>> {
        None
    }

    /// Folds a color filter into the contents' own colors. Returns false when
    /// the filter has to run as a separate pass.
    fn apply_color_filter(&mut self, _filter: &dyn Fn(Color) -> Color) -> bool {
        false
    }

    fn as_filter(&self) -> Option<&FilterContents> {
        None
    }

    /// False for filters whose output may land outside a limit applied to
    /// their input, such as scaling matrices.
    fn is_translation_only_filter(&self) -> bool {
        self.as_filter().is_none_or(FilterContents::is_translation_only)
    }

    /// Renders into a texture sized to the coverage, clipped to `coverage_limit`.
    fn render_to_snapshot(
        &self,
        renderer: &ContentContext,
        entity: &Entity,
        coverage_limit: Option<Rect>,
        mip_count: u32,
        label: &str,
    ) -> Result<Option<Snapshot>> {
        snapshot_via_subpass(self, renderer, entity, coverage_limit, mip_count, label)
    }
}

/// Renders `contents` into a texture sized to its coverage, clipped to `coverage_limit`.
pub(crate) fn snapshot_via_subpass<C: Contents + ?Sized>(
    contents: &C,
    renderer: &ContentContext,
    entity: &Entity,
    coverage_limit: Option<Rect>,
    mip_count: u32,
    label: &str,
) -> Result<Option<Snapshot>> {
    let Some(coverage) = contents.coverage(entity) else {
        return Ok(None);
    };
    let Some(coverage) = Rect::intersection_opt(Some(coverage), coverage_limit) else {
        return Ok(None);
    };
    if coverage.is_maximum() {
        tracing::warn!(label, "cannot snapshot unbounded contents without a coverage limit");
        return Ok(None);
    }
    let coverage = coverage.round_out();
    let size = ISize::new(coverage.width() as i64, coverage.height() as i64);
    if size.is_empty() {
        return Ok(None);
    }

    let mut sub_entity = entity.clone();
    sub_entity.set_transform(Matrix::translation(-coverage.origin()) * *entity.transform());
    sub_entity.set_blend_mode(BlendMode::SourceOver);
    sub_entity.set_clip_depth(0);

    let texture = renderer.make_subpass(label, size, mip_count, |renderer, pass| {
        contents.render(renderer, &sub_entity, pass)
    })?;
    Ok(Some(Snapshot::new(texture, Matrix::translation(coverage.origin()))))
}
