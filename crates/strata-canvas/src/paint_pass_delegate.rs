//! Delegates that turn a layer's paint into what its pass draws back.

use std::sync::Arc;

use strata_core::contents::TextureContents;
use strata_core::{
    BlendMode, Contents, EntityPass, EntityPassDelegate, FilterContents, FilterInput, Matrix,
    Rect, TextureRef,
};

use crate::paint::Paint;

/// Draws the layer texture with the paint's opacity and filters. Never
/// collapses.
#[derive(Clone, Debug)]
pub struct PaintPassDelegate {
    paint: Paint,
}

impl PaintPassDelegate {
    pub fn new(paint: Paint) -> Self {
        Self { paint }
    }
}

impl EntityPassDelegate for PaintPassDelegate {
    fn can_elide(&self) -> bool {
        self.paint.blend_mode == BlendMode::Destination
    }

    fn collapse_opacity(&self, _pass: &EntityPass) -> Option<f32> {
        None
    }

    fn create_contents_for_subpass_target(
        &self,
        texture: TextureRef,
        effect_transform: Matrix,
    ) -> Option<Arc<dyn Contents>> {
        Some(subpass_target_contents(&self.paint, texture, effect_transform))
    }

    fn with_image_filter(&self, input: FilterInput, effect_transform: Matrix) -> Option<Arc<FilterContents>> {
        layer_image_filter(&self.paint, input, effect_transform)
    }
}

/// Delegate for SourceOver layers. A layer without filters is drawn straight
/// into its parent when its alpha can be pushed down into its entities:
/// always at full alpha, and for translucent layers only when the entities
/// can take the opacity and do not overlap.
#[derive(Clone, Debug)]
pub struct OpacityPeepholePassDelegate {
    paint: Paint,
}

impl OpacityPeepholePassDelegate {
    pub fn new(paint: Paint) -> Self {
        Self { paint }
    }
}

impl EntityPassDelegate for OpacityPeepholePassDelegate {
    fn can_elide(&self) -> bool {
        self.paint.blend_mode == BlendMode::Destination
    }

    fn collapse_opacity(&self, pass: &EntityPass) -> Option<f32> {
        if self.paint.color_filter.is_some() || self.paint.image_filter.is_some() {
            return None;
        }
        let alpha = self.paint.color.alpha;
        if alpha <= 0.0 {
            return None;
        }

        let mut coverages: Vec<Rect> = Vec::new();
        let mut can_fold = true;
        let had_subpass = pass.iterate_until_subpass(|entity| {
            let composites = match entity.blend_mode() {
                BlendMode::SourceOver => true,
                BlendMode::Source => entity.is_opaque(),
                _ => false,
            };
            if !composites {
                can_fold = false;
                return false;
            }
            if alpha >= 1.0 {
                return true;
            }
            if !entity.can_inherit_opacity() {
                can_fold = false;
                return false;
            }
            if let Some(coverage) = entity.coverage() {
                if coverages.iter().any(|other| other.intersects_with_rect(&coverage)) {
                    can_fold = false;
                    return false;
                }
                coverages.push(coverage);
            }
            true
        });

        (can_fold && !had_subpass).then_some(alpha.min(1.0))
    }

    fn create_contents_for_subpass_target(
        &self,
        texture: TextureRef,
        effect_transform: Matrix,
    ) -> Option<Arc<dyn Contents>> {
        Some(subpass_target_contents(&self.paint, texture, effect_transform))
    }

    fn with_image_filter(&self, input: FilterInput, effect_transform: Matrix) -> Option<Arc<FilterContents>> {
        layer_image_filter(&self.paint, input, effect_transform)
    }
}

fn subpass_target_contents(paint: &Paint, texture: TextureRef, effect_transform: Matrix) -> Arc<dyn Contents> {
    let mut contents = TextureContents::from_texture(texture);
    if !paint.has_color_filter() {
        contents.set_opacity(paint.color.alpha);
    }
    paint.with_filters_for_subpass_target(Arc::new(contents), effect_transform)
}

fn layer_image_filter(
    paint: &Paint,
    input: FilterInput,
    effect_transform: Matrix,
) -> Option<Arc<FilterContents>> {
    paint
        .image_filter
        .as_ref()
        .map(|filter| filter.wrap_input(input, effect_transform))
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::contents::SolidColorContents;
    use strata_core::{Color, ColorFilter, Entity, Geometry, ImageFilter};

    fn rect_entity(rect: Rect, color: Color) -> Entity {
        Entity::from_contents(Arc::new(SolidColorContents::new(Geometry::Rect(rect), color)))
    }

    #[test]
    fn filters_prevent_collapsing() {
        let pass = EntityPass::new();
        let mut paint = Paint::with_color(Color::WHITE.with_alpha(0.5));
        paint.color_filter = Some(ColorFilter::Blend { mode: BlendMode::SourceOver, color: Color::BLUE });
        assert_eq!(OpacityPeepholePassDelegate::new(paint.clone()).collapse_opacity(&pass), None);

        paint.color_filter = None;
        paint.image_filter = Some(ImageFilter::blur(1.0, 1.0));
        assert_eq!(OpacityPeepholePassDelegate::new(paint).collapse_opacity(&pass), None);
    }

    #[test]
    fn opaque_layer_collapses_trivially() {
        let mut pass = EntityPass::new();
        pass.add_entity(rect_entity(Rect::from_xywh(0.0, 0.0, 100.0, 100.0), Color::RED));
        pass.add_entity(rect_entity(Rect::from_xywh(50.0, 50.0, 100.0, 100.0), Color::BLUE));
        let delegate = OpacityPeepholePassDelegate::new(Paint::with_color(Color::RED));
        assert_eq!(delegate.collapse_opacity(&pass), Some(1.0));
    }

    #[test]
    fn translucent_layer_folds_alpha_into_disjoint_entities() {
        let mut pass = EntityPass::new();
        pass.add_entity(rect_entity(Rect::from_xywh(0.0, 0.0, 100.0, 100.0), Color::RED));
        let delegate = OpacityPeepholePassDelegate::new(Paint::with_color(Color::RED.with_alpha(0.5)));
        assert_eq!(delegate.collapse_opacity(&pass), Some(0.5));

        pass.add_entity(rect_entity(Rect::from_xywh(50.0, 50.0, 100.0, 100.0), Color::BLUE));
        assert_eq!(delegate.collapse_opacity(&pass), None);
    }

    #[test]
    fn nested_layers_and_blends_keep_the_layer() {
        let delegate = OpacityPeepholePassDelegate::new(Paint::with_color(Color::RED));

        let mut with_subpass = EntityPass::new();
        with_subpass.add_subpass(Box::new(EntityPass::new()));
        assert_eq!(delegate.collapse_opacity(&with_subpass), None);

        let mut with_multiply = EntityPass::new();
        let mut entity = rect_entity(Rect::from_xywh(0.0, 0.0, 10.0, 10.0), Color::RED);
        entity.set_blend_mode(BlendMode::Multiply);
        with_multiply.add_entity(entity);
        assert_eq!(delegate.collapse_opacity(&with_multiply), None);
    }

    #[test]
    fn destination_layers_are_elided() {
        let paint = Paint { blend_mode: BlendMode::Destination, ..Paint::default() };
        assert!(PaintPassDelegate::new(paint.clone()).can_elide());
        assert!(OpacityPeepholePassDelegate::new(paint).can_elide());
        assert!(!PaintPassDelegate::new(Paint::default()).can_elide());
    }

    #[test]
    fn paint_delegate_never_collapses() {
        let delegate = PaintPassDelegate::new(Paint::with_color(Color::RED));
        assert_eq!(delegate.collapse_opacity(&EntityPass::new()), None);
    }
}
