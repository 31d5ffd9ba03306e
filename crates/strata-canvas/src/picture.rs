use strata_core::{Color, ContentContext, EntityPass, ISize, Rect, RenderTarget, Result};

/// A finished recording. Rendering does not consume it, so a picture can be
/// drawn into any number of targets.
#[derive(Debug)]
pub struct Picture {
    pass: Box<EntityPass>,
}

impl Picture {
    pub(crate) fn new(pass: Box<EntityPass>) -> Self {
        Self { pass }
    }

    pub fn pass(&self) -> &EntityPass {
        &self.pass
    }

    pub fn into_pass(self) -> Box<EntityPass> {
        self.pass
    }

    /// Bounds of everything drawn, or `None` when nothing was.
    pub fn bounds(&self) -> Option<Rect> {
        self.pass.elements_coverage(None)
    }

    pub fn render(&self, renderer: &ContentContext, render_target: &RenderTarget) -> Result<()> {
        self.pass.render(renderer, render_target)
    }

    /// Renders into a freshly allocated offscreen target of `size`.
    pub fn to_image(&self, renderer: &ContentContext, size: ISize) -> Result<RenderTarget> {
        let _span = tracing::debug_span!("picture_to_image", width = size.width, height = size.height).entered();
        let context = renderer.context();
        let allocator = context.resource_allocator();
        let target = RenderTarget::create_offscreen(
            &**context,
            &*allocator,
            size,
            1,
            "Picture Snapshot",
            Color::BLACK_TRANSPARENT,
            true,
        )?;
        self.render(renderer, &target)?;
        Ok(target)
    }
}
