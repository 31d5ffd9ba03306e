use std::sync::Arc;

use crate::color::{BlendMode, Color};
use crate::content_context::ContentContext;
use crate::contents::{ClipCoverage, ClipCoverageKind, Contents};
use crate::error::Result;
use crate::geometry::{ISize, Matrix, Rect};
use crate::renderer::RenderPass;

/// Depth step used to turn clip depths into shader depth values.
const DEPTH_EPSILON: f32 = 1.0 / 262_144.0;

/// A single drawable: contents placed by a transform, blended into the pass
/// and tested against the clip stack at `clip_depth`.
#[derive(Clone, Debug, Default)]
pub struct Entity {
    transform: Matrix,
    contents: Option<Arc<dyn Contents>>,
    blend_mode: BlendMode,
    clip_depth: u32,
    new_clip_depth: u32,
}

impl Entity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_contents(contents: Arc<dyn Contents>) -> Self {
        Self { contents: Some(contents), ..Self::default() }
    }

    pub fn transform(&self) -> &Matrix {
        &self.transform
    }

    pub fn set_transform(&mut self, transform: Matrix) {
        self.transform = transform;
    }

    pub fn contents(&self) -> Option<&Arc<dyn Contents>> {
        self.contents.as_ref()
    }

    pub fn set_contents(&mut self, contents: Arc<dyn Contents>) {
        self.contents = Some(contents);
    }

    pub fn blend_mode(&self) -> BlendMode {
        self.blend_mode
    }

    pub fn set_blend_mode(&mut self, blend_mode: BlendMode) {
        self.blend_mode = blend_mode;
    }

    pub fn clip_depth(&self) -> u32 {
        self.clip_depth
    }

    pub fn set_clip_depth(&mut self, clip_depth: u32) {
        self.clip_depth = clip_depth;
    }

    pub fn new_clip_depth(&self) -> u32 {
        self.new_clip_depth
    }

    pub fn set_new_clip_depth(&mut self, new_clip_depth: u32) {
        self.new_clip_depth = new_clip_depth;
    }

    /// Depth written by the vertex stage; later entities sit closer to the viewer.
    pub fn shader_clip_depth(&self) -> f32 {
        (1.0 - self.new_clip_depth as f32 * DEPTH_EPSILON).max(0.0)
    }

    pub fn coverage(&self) -> Option<Rect> {
        self.contents.as_ref()?.coverage(self)
    }

    pub fn should_render(&self, clip_coverage: Option<Rect>) -> bool {
        self.contents
            .as_ref()
            .is_some_and(|contents| contents.should_render(self, clip_coverage))
    }

    pub fn clip_coverage(&self, current_clip_coverage: Option<Rect>) -> ClipCoverage {
        match &self.contents {
            Some(contents) => contents.clip_coverage(self, current_clip_coverage),
            None => ClipCoverage {
                kind: ClipCoverageKind::NoChange,
                coverage: current_clip_coverage,
            },
        }
    }

    pub fn is_opaque(&self) -> bool {
        self.contents.as_ref().is_some_and(|contents| contents.is_opaque())
    }

    pub fn as_background_color(&self, target_size: ISize) -> Option<Color> {
        self.contents.as_ref()?.as_background_color(self, target_size)
    }

    pub fn can_inherit_opacity(&self) -> bool {
        self.contents.as_ref().is_some_and(|contents| contents.can_inherit_opacity(self))
    }

    /// Folds `opacity` into the contents. Returns false when the contents refuse.
    pub fn set_inherited_opacity(&mut self, opacity: f32) -> bool {
        if opacity >= 1.0 {
            return true;
        }
        let Some(contents) = &self.contents else {
            return true;
        };
        // Opaque draws were promoted to Source when added; once faded they
        // have to composite again.
        if self.blend_mode == BlendMode::Source && contents.is_opaque() {
            self.blend_mode = BlendMode::SourceOver;
        }
        match contents.with_inherited_opacity(opacity) {
            Some(faded) => {
                self.contents = Some(faded);
                true
            }
            None => false,
        }
    }

    pub fn render(&self, renderer: &ContentContext, pass: &mut RenderPass) -> Result<()> {
        match &self.contents {
            Some(contents) => contents.render(renderer, self, pass),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contents::SolidColorContents;
    use crate::shape::Geometry;

    #[test]
    fn fading_an_opaque_source_draw_composites_again() {
        let mut entity = Entity::from_contents(Arc::new(SolidColorContents::new(Geometry::Cover, Color::RED)));
        entity.set_blend_mode(BlendMode::Source);
        assert!(entity.set_inherited_opacity(0.5));
        assert_eq!(entity.blend_mode(), BlendMode::SourceOver);
        assert!(!entity.is_opaque());
    }

    #[test]
    fn full_opacity_leaves_the_entity_alone() {
        let mut entity = Entity::from_contents(Arc::new(SolidColorContents::new(Geometry::Cover, Color::RED)));
        entity.set_blend_mode(BlendMode::Source);
        assert!(entity.set_inherited_opacity(1.0));
        assert_eq!(entity.blend_mode(), BlendMode::Source);
    }

    #[test]
    fn shader_depth_decreases_with_later_draws() {
        let mut early = Entity::new();
        early.set_new_clip_depth(1);
        let mut late = Entity::new();
        late.set_new_clip_depth(2);
        assert!(late.shader_clip_depth() < early.shader_clip_depth());
    }
}
