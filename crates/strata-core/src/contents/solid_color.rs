use std::sync::Arc;

use crate::color::Color;
use crate::content_context::ContentContext;
use crate::entity::Entity;
use crate::error::Result;
use crate::geometry::{ISize, Rect};
use crate::renderer::{FragmentInfo, FrameInfo, PipelineKind, RenderPass};
use crate::shape::Geometry;

use super::Contents;

#[derive(Clone, Debug)]
pub struct SolidColorContents {
    geometry: Geometry,
    color: Color,
    inherited_opacity: f32,
}

impl SolidColorContents {
    pub fn new(geometry: Geometry, color: Color) -> Self {
        Self { geometry, color, inherited_opacity: 1.0 }
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Paint color with any inherited opacity applied.
    pub fn color(&self) -> Color {
        self.color.with_alpha(self.color.alpha * self.inherited_opacity)
    }
}

impl Contents for SolidColorContents {
    fn coverage(&self, entity: &Entity) -> Option<Rect> {
        if self.color().is_transparent() {
            return None;
        }
        self.geometry.coverage(entity.transform())
    }

    fn render(&self, renderer: &ContentContext, entity: &Entity, pass: &mut RenderPass) -> Result<()> {
        let result = self.geometry.position_buffer(entity.transform(), pass.render_target_size());
        if result.vertex_buffer.is_empty() {
            return Ok(());
        }
        let mut options = renderer.options_from_pass_and_entity(PipelineKind::SolidFill, pass, entity);
        options.primitive_type = result.primitive_type;

        pass.set_command_label("Solid Fill");
        pass.set_pipeline(options);
        pass.set_stencil_reference(entity.clip_depth());
        pass.set_vertex_buffer(result.vertex_buffer);
        pass.bind_frame_info(FrameInfo { mvp: result.transform, depth: entity.shader_clip_depth() });
        pass.bind_fragment_info(FragmentInfo::Solid { color: self.color().premultiply() });
        pass.draw()
    }

    fn is_opaque(&self) -> bool {
        self.color().is_opaque()
    }

    fn as_background_color(&self, entity: &Entity, target_size: ISize) -> Option<Color> {
        let target = Rect::from_isize(target_size);
        self.geometry
            .covers_area(entity.transform(), &target)
            .then(|| self.color())
    }

    fn can_inherit_opacity(&self, _entity: &Entity) -> bool {
        true
    }

    fn with_inherited_opacity(&self, opacity: f32) -> Option<Arc<dyn Contents>> {
        let mut faded = self.clone();
        faded.inherited_opacity *= opacity;
        Some(Arc::new(faded))
    }

    fn apply_color_filter(&mut self, filter: &dyn Fn(Color) -> Color) -> bool {
        self.color = filter(self.color);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Matrix, Point};

    #[test]
    fn transparent_color_covers_nothing() {
        let contents = SolidColorContents::new(
            Geometry::Rect(Rect::from_xywh(0.0, 0.0, 10.0, 10.0)),
            Color::RED.with_alpha(0.0),
        );
        assert_eq!(contents.coverage(&Entity::new()), None);
    }

    #[test]
    fn cover_geometry_reports_background_color() {
        let contents = SolidColorContents::new(Geometry::Cover, Color::BLUE);
        let mut entity = Entity::new();
        entity.set_transform(Matrix::translation(Point::new(5.0, 5.0)));
        assert_eq!(contents.as_background_color(&entity, ISize::new(50, 50)), Some(Color::BLUE));
    }

    #[test]
    fn partial_rect_is_not_a_background() {
        let contents = SolidColorContents::new(
            Geometry::Rect(Rect::from_xywh(0.0, 0.0, 10.0, 10.0)),
            Color::BLUE,
        );
        assert_eq!(contents.as_background_color(&Entity::new(), ISize::new(50, 50)), None);
    }

    #[test]
    fn inherited_opacity_scales_alpha() {
        let contents = SolidColorContents::new(Geometry::Cover, Color::RED.with_alpha(0.5));
        let faded = contents.with_inherited_opacity(0.5).unwrap();
        assert!(!faded.is_opaque());
        assert!(contents.can_inherit_opacity(&Entity::new()));
    }
}
