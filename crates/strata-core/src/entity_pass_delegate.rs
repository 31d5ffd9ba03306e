use std::fmt;
use std::sync::Arc;

use crate::contents::{Contents, TextureContents};
use crate::filters::{FilterContents, FilterInput};
use crate::geometry::Matrix;
use crate::renderer::TextureRef;

use crate::entity_pass::EntityPass;

/// Decides how a subpass is turned back into something its parent can draw.
pub trait EntityPassDelegate: fmt::Debug + Send + Sync {
    /// True when the pass contributes nothing and can be dropped outright.
    fn can_elide(&self) -> bool;

    /// Opacity to fold into the pass entities when the pass can be drawn
    /// straight into its parent, or `None` when it needs its own target.
    fn collapse_opacity(&self, pass: &EntityPass) -> Option<f32>;

    /// Wraps the offscreen result of the pass. `effect_transform` is the pass
    /// transform expressed relative to the texture origin.
    fn create_contents_for_subpass_target(
        &self,
        texture: TextureRef,
        effect_transform: Matrix,
    ) -> Option<Arc<dyn Contents>>;

    /// The image filter applied to the flattened pass, if any.
    fn with_image_filter(
        &self,
        input: FilterInput,
        effect_transform: Matrix,
    ) -> Option<Arc<FilterContents>>;
}

/// Collapses whenever allowed and draws offscreen results as plain textures.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultEntityPassDelegate;

impl DefaultEntityPassDelegate {
    pub fn new() -> Arc<dyn EntityPassDelegate> {
        Arc::new(Self)
    }
}

impl EntityPassDelegate for DefaultEntityPassDelegate {
    fn can_elide(&self) -> bool {
        false
    }

    fn collapse_opacity(&self, _pass: &EntityPass) -> Option<f32> {
        Some(1.0)
    }

    fn create_contents_for_subpass_target(
        &self,
        texture: TextureRef,
        _effect_transform: Matrix,
    ) -> Option<Arc<dyn Contents>> {
        Some(Arc::new(TextureContents::from_texture(texture)))
    }

    fn with_image_filter(
        &self,
        _input: FilterInput,
        _effect_transform: Matrix,
    ) -> Option<Arc<FilterContents>> {
        None
    }
}
