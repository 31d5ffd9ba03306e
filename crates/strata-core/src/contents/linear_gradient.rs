use std::sync::Arc;

use crate::color::Color;
use crate::content_context::ContentContext;
use crate::entity::Entity;
use crate::error::Result;
use crate::formats::TileMode;
use crate::geometry::{Point, Rect};
use crate::renderer::{FragmentInfo, FrameInfo, PipelineKind, RenderPass};
use crate::shape::Geometry;

use super::Contents;

#[derive(Clone, Debug)]
pub struct LinearGradientContents {
    geometry: Geometry,
    start: Point,
    end: Point,
    colors: Vec<Color>,
    stops: Vec<f32>,
    tile_mode: TileMode,
    opacity: f32,
}

impl LinearGradientContents {
    /// Stops default to an even spread when their count does not match the colors.
    pub fn new(
        geometry: Geometry,
        start: Point,
        end: Point,
        colors: Vec<Color>,
        stops: Vec<f32>,
        tile_mode: TileMode,
    ) -> Self {
        let stops = if stops.len() == colors.len() {
            stops
        } else {
            let last = colors.len().saturating_sub(1).max(1) as f32;
            (0..colors.len()).map(|i| i as f32 / last).collect()
        };
        Self { geometry, start, end, colors, stops, tile_mode, opacity: 1.0 }
    }

    pub fn colors(&self) -> &[Color] {
        &self.colors
    }
}

impl Contents for LinearGradientContents {
    fn coverage(&self, entity: &Entity) -> Option<Rect> {
        if self.opacity <= 0.0 || self.colors.iter().all(Color::is_transparent) {
            return None;
        }
        self.geometry.coverage(entity.transform())
    }

    fn render(&self, renderer: &ContentContext, entity: &Entity, pass: &mut RenderPass) -> Result<()> {
        let result = self.geometry.position_buffer(entity.transform(), pass.render_target_size());
        if result.vertex_buffer.is_empty() || self.colors.is_empty() {
            return Ok(());
        }
        let mut options =
            renderer.options_from_pass_and_entity(PipelineKind::LinearGradient, pass, entity);
        options.primitive_type = result.primitive_type;

        pass.set_command_label("Linear Gradient Fill");
        pass.set_pipeline(options);
        pass.set_stencil_reference(entity.clip_depth());
        pass.set_vertex_buffer(result.vertex_buffer);
        pass.bind_frame_info(FrameInfo { mvp: result.transform, depth: entity.shader_clip_depth() });
        pass.bind_fragment_info(FragmentInfo::LinearGradient {
            start: self.start,
            end: self.end,
            colors: self.colors.iter().map(|c| c.premultiply()).collect(),
            stops: self.stops.clone(),
            tile_mode: self.tile_mode,
            alpha: self.opacity,
        });
        pass.draw()
    }

    fn is_opaque(&self) -> bool {
        self.opacity >= 1.0
            && self.tile_mode != TileMode::Decal
            && self.colors.iter().all(Color::is_opaque)
    }

    fn can_inherit_opacity(&self, _entity: &Entity) -> bool {
        true
    }

    fn with_inherited_opacity(&self, opacity: f32) -> Option<Arc<dyn Contents>> {
        let mut faded = self.clone();
        faded.opacity *= opacity;
        Some(Arc::new(faded))
    }

    fn apply_color_filter(&mut self, filter: &dyn Fn(Color) -> Color) -> bool {
        for color in &mut self.colors {
            *color = filter(*color);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stops_are_spread_when_missing() {
        let contents = LinearGradientContents::new(
            Geometry::Cover,
            Point::ZERO,
            Point::new(100.0, 0.0),
            vec![Color::RED, Color::GREEN, Color::BLUE],
            Vec::new(),
            TileMode::Clamp,
        );
        assert_eq!(contents.stops, vec![0.0, 0.5, 1.0]);
        assert!(contents.is_opaque());
    }

    #[test]
    fn color_filter_is_absorbed() {
        let mut contents = LinearGradientContents::new(
            Geometry::Cover,
            Point::ZERO,
            Point::new(1.0, 0.0),
            vec![Color::RED, Color::BLUE],
            vec![0.0, 1.0],
            TileMode::Clamp,
        );
        assert!(contents.apply_color_filter(&|c: Color| c.with_alpha(0.5)));
        assert!(contents.colors().iter().all(|c| c.alpha == 0.5));
    }
}
