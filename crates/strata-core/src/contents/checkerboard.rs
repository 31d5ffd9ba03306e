use crate::color::{BlendMode, Color};
use crate::content_context::ContentContext;
use crate::entity::Entity;
use crate::error::Result;
use crate::formats::PrimitiveType;
use crate::geometry::{Matrix, Rect};
use crate::renderer::{
    FragmentInfo, FrameInfo, PipelineKind, RenderPass, StencilMode, VertexBuffer,
};

use super::Contents;

/// Debug overlay that tints every other square of the whole target.
#[derive(Clone, Debug)]
pub struct CheckerboardContents {
    color: Color,
    square_size: f32,
}

impl Default for CheckerboardContents {
    fn default() -> Self {
        Self { color: Color::RED.with_alpha(0.25), square_size: 12.0 }
    }
}

impl CheckerboardContents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_color(&mut self, color: Color) {
        self.color = color;
    }

    pub fn set_square_size(&mut self, square_size: f32) {
        self.square_size = square_size;
    }
}

impl Contents for CheckerboardContents {
    fn coverage(&self, _entity: &Entity) -> Option<Rect> {
        None
    }

    fn render(&self, renderer: &ContentContext, _entity: &Entity, pass: &mut RenderPass) -> Result<()> {
        let mut options = renderer.options_from_pass(PipelineKind::Checkerboard, pass);
        options.blend_mode = BlendMode::SourceOver;
        options.stencil_mode = StencilMode::Ignore;
        options.primitive_type = PrimitiveType::TriangleStrip;

        let full = Rect::from_isize(pass.render_target_size());
        pass.set_command_label("Checkerboard");
        pass.set_pipeline(options);
        pass.set_vertex_buffer(VertexBuffer::from_rect_strip(full.points()));
        pass.bind_frame_info(FrameInfo { mvp: Matrix::identity(), depth: 0.0 });
        pass.bind_fragment_info(FragmentInfo::Checkerboard {
            color: self.color.premultiply(),
            square_size: self.square_size,
        });
        pass.draw()
    }
}
