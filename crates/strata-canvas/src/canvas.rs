//! Recording front end that builds an [`EntityPass`] tree.
//!
//! Every draw becomes an entity in the current pass. `save_layer` opens a
//! child pass that is attached to its parent on the matching `restore`.
//! Entities, passes and clips receive increasing depths in the order they
//! are recorded; a clip's depth is only known once it is popped.

use std::mem;
use std::sync::Arc;

use strata_core::contents::{ClipContents, ClipOperation, ClipRestoreContents, TextureContents};
use strata_core::formats::SamplerDescriptor;
use strata_core::{
    BackdropFilterProc, BlendMode, Entity, EntityPass, FilterInput, Geometry, ImageFilter, Matrix,
    Path, Point, Rect, RoundingRadii, TextureRef,
};

use crate::paint::Paint;
use crate::paint_pass_delegate::{OpacityPeepholePassDelegate, PaintPassDelegate};
use crate::picture::Picture;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderingMode {
    /// Draws land in the pass that was current when the entry was saved.
    Direct,
    /// The entry opened a layer with its own pass.
    Subpass,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DebugOptions {
    /// Overlays a checkerboard on every offscreen layer.
    pub offscreen_texture_checkerboard: bool,
}

#[derive(Clone, Copy, Debug)]
struct CanvasStackEntry {
    transform: Matrix,
    /// Device space area outside of which draws are known to be clipped.
    cull_rect: Option<Rect>,
    clip_depth: u32,
    num_clips: usize,
    rendering_mode: RenderingMode,
}

impl CanvasStackEntry {
    fn root(cull_rect: Option<Rect>) -> Self {
        Self {
            transform: Matrix::identity(),
            cull_rect,
            clip_depth: 0,
            num_clips: 0,
            rendering_mode: RenderingMode::Direct,
        }
    }
}

pub struct Canvas {
    base_pass: Box<EntityPass>,
    /// Open layers, innermost last. Each is attached to the pass below it
    /// when restored.
    layers: Vec<Box<EntityPass>>,
    current: CanvasStackEntry,
    saved: Vec<CanvasStackEntry>,
    current_depth: u32,
    initial_cull_rect: Option<Rect>,
    debug_options: DebugOptions,
}

impl Default for Canvas {
    fn default() -> Self {
        Self::new()
    }
}

impl Canvas {
    pub fn new() -> Self {
        Self::with_cull_rect(None)
    }

    pub fn with_cull_rect(cull_rect: Option<Rect>) -> Self {
        let mut canvas = Self {
            base_pass: Box::new(EntityPass::new()),
            layers: Vec::new(),
            current: CanvasStackEntry::root(cull_rect),
            saved: Vec::new(),
            current_depth: 0,
            initial_cull_rect: cull_rect,
            debug_options: DebugOptions::default(),
        };
        canvas.current_depth += 1;
        canvas.base_pass.set_new_clip_depth(canvas.current_depth);
        canvas
    }

    pub fn set_debug_options(&mut self, debug_options: DebugOptions) {
        self.debug_options = debug_options;
    }

    pub fn debug_options(&self) -> DebugOptions {
        self.debug_options
    }

    // ----------------------------------------------------------------------
    // Save and restore

    pub fn save(&mut self) {
        self.save_impl(false, BlendMode::SourceOver, None);
    }

    /// Opens a layer: everything drawn until the matching restore is
    /// flattened and composited with `paint`. `bounds` limits the layer in
    /// local coordinates. The backdrop filter is applied to whatever is
    /// behind the layer before it is drawn.
    pub fn save_layer(&mut self, paint: &Paint, bounds: Option<Rect>, backdrop_filter: Option<ImageFilter>) {
        let _span = tracing::trace_span!("save_layer", blend_mode = ?paint.blend_mode).entered();
        self.save_impl(true, paint.blend_mode, backdrop_filter);

        // Culling does not know how far the filter spreads.
        if paint.image_filter.is_some() {
            self.current.cull_rect = None;
        }

        let layer = self.current_pass();
        layer.set_bounds_limit(bounds);
        if let Some(image_filter) = &paint.image_filter {
            layer.set_required_mip_count(image_filter.required_mip_count());
        }
        if paint.blend_mode == BlendMode::SourceOver {
            layer.set_delegate(Arc::new(OpacityPeepholePassDelegate::new(paint.clone())));
        } else {
            layer.set_delegate(Arc::new(PaintPassDelegate::new(paint.clone())));
        }
    }

    fn save_impl(&mut self, create_subpass: bool, blend_mode: BlendMode, backdrop_filter: Option<ImageFilter>) {
        let mut entry = CanvasStackEntry {
            num_clips: 0,
            rendering_mode: RenderingMode::Direct,
            ..self.current
        };

        if create_subpass {
            entry.rendering_mode = RenderingMode::Subpass;
            let mut subpass = Box::new(EntityPass::new());
            self.current_depth += 1;
            subpass.set_new_clip_depth(self.current_depth);
            subpass.set_enable_offscreen_checkerboard(self.debug_options.offscreen_texture_checkerboard);
            if let Some(filter) = backdrop_filter {
                let parent = self.current_pass();
                parent.set_required_mip_count(parent.required_mip_count().max(filter.required_mip_count()));
                let proc: BackdropFilterProc =
                    Arc::new(move |input: FilterInput, effect_transform: Matrix| {
                        Some(filter.wrap_input(input, effect_transform))
                    });
                subpass.set_backdrop_filter(proc);
            }
            subpass.set_blend_mode(blend_mode);
            subpass.set_transform(self.current.transform);
            subpass.set_clip_depth(self.current.clip_depth);
            self.layers.push(subpass);
        }

        self.saved.push(mem::replace(&mut self.current, entry));
    }

    /// Pops the innermost save. Returns false when only the initial entry is left.
    pub fn restore(&mut self) -> bool {
        let Some(parent) = self.saved.pop() else {
            return false;
        };
        let depth = self.current_depth;
        let num_clips = self.current.num_clips;
        self.current_pass().pop_clips(num_clips, depth);

        let entry = mem::replace(&mut self.current, parent);
        if entry.rendering_mode == RenderingMode::Subpass {
            match self.layers.pop() {
                Some(layer) => {
                    self.current_pass().add_subpass(layer);
                }
                None => tracing::error!("restored a layer that was never opened"),
            }
        }

        if num_clips > 0 {
            self.restore_clip();
        }
        true
    }

    pub fn save_count(&self) -> usize {
        self.saved.len() + 1
    }

    pub fn restore_to_count(&mut self, count: usize) {
        while self.save_count() > count {
            if !self.restore() {
                return;
            }
        }
    }

    // ----------------------------------------------------------------------
    // Transforms

    pub fn transform(&self) -> &Matrix {
        &self.current.transform
    }

    /// Applies `transform` before the current transform.
    pub fn concat(&mut self, transform: &Matrix) {
        self.current.transform = self.current.transform * *transform;
    }

    /// Applies `transform` after the current transform.
    pub fn pre_concat(&mut self, transform: &Matrix) {
        self.current.transform = *transform * self.current.transform;
    }

    pub fn reset_transform(&mut self) {
        self.current.transform = Matrix::identity();
    }

    pub fn translate(&mut self, dx: f32, dy: f32) {
        self.concat(&Matrix::translation(Point::new(dx, dy)));
    }

    pub fn scale(&mut self, sx: f32, sy: f32) {
        self.concat(&Matrix::scale(sx, sy));
    }

    pub fn skew(&mut self, sx: f32, sy: f32) {
        self.concat(&Matrix::skew(sx, sy));
    }

    pub fn rotate(&mut self, radians: f32) {
        self.concat(&Matrix::rotation_z(radians));
    }

    /// The cull rect mapped back into local coordinates.
    pub fn local_cull_rect(&self) -> Option<Rect> {
        let cull_rect = self.current.cull_rect?;
        match self.current.transform.invert() {
            Some(inverse) => Some(cull_rect.transform_bounds(&inverse)),
            None => Some(Rect::default()),
        }
    }

    // ----------------------------------------------------------------------
    // Drawing

    pub fn draw_paint(&mut self, paint: &Paint) {
        self.draw_geometry(Geometry::Cover, paint);
    }

    pub fn draw_rect(&mut self, rect: Rect, paint: &Paint) {
        self.draw_geometry(Geometry::Rect(rect), paint);
    }

    pub fn draw_rrect(&mut self, rect: Rect, radii: RoundingRadii, paint: &Paint) {
        self.draw_geometry(Geometry::RoundRect { rect, radii }, paint);
    }

    pub fn draw_oval(&mut self, rect: Rect, paint: &Paint) {
        self.draw_geometry(Geometry::Ellipse(rect), paint);
    }

    pub fn draw_circle(&mut self, center: Point, radius: f32, paint: &Paint) {
        if radius <= 0.0 {
            return;
        }
        let bounds = Rect::from_ltrb(center.x - radius, center.y - radius, center.x + radius, center.y + radius);
        self.draw_geometry(Geometry::Ellipse(bounds), paint);
    }

    pub fn draw_path(&mut self, path: Path, paint: &Paint) {
        self.draw_geometry(Geometry::FillPath(path), paint);
    }

    /// Draws `source` texels of `texture` into `dest`.
    pub fn draw_image_rect(
        &mut self,
        texture: TextureRef,
        source: Rect,
        dest: Rect,
        paint: &Paint,
        sampler: SamplerDescriptor,
    ) {
        if source.is_empty() || dest.is_empty() || texture.size().is_empty() {
            return;
        }
        let mut contents = TextureContents::new(dest);
        contents.set_texture(texture);
        contents.set_source_rect(source);
        contents.set_sampler(sampler);
        if !paint.has_color_filter() {
            contents.set_opacity(paint.color.alpha);
        }

        let mut entity = Entity::from_contents(paint.with_filters(Arc::new(contents)));
        entity.set_transform(self.current.transform);
        entity.set_clip_depth(self.current.clip_depth);
        entity.set_blend_mode(paint.blend_mode);
        self.add_entity_to_current_pass(entity);
    }

    fn draw_geometry(&mut self, geometry: Geometry, paint: &Paint) {
        let mut entity = Entity::from_contents(paint.create_contents_for_geometry(geometry));
        entity.set_transform(self.current.transform);
        entity.set_clip_depth(self.current.clip_depth);
        entity.set_blend_mode(paint.blend_mode);
        self.add_entity_to_current_pass(entity);
    }

    fn add_entity_to_current_pass(&mut self, mut entity: Entity) {
        self.current_depth += 1;
        entity.set_new_clip_depth(self.current_depth);
        self.current_pass().add_entity(entity);
    }

    // ----------------------------------------------------------------------
    // Clipping

    pub fn clip_rect(&mut self, rect: Rect, clip_op: ClipOperation) {
        let geometry = Geometry::Rect(rect);
        if self.clip_is_redundant(&geometry, clip_op) {
            return;
        }
        self.clip_geometry(geometry, clip_op);
        match clip_op {
            ClipOperation::Intersect => self.intersect_culling(rect),
            ClipOperation::Difference => self.subtract_culling(rect),
        }
    }

    pub fn clip_rrect(&mut self, rect: Rect, radii: RoundingRadii, clip_op: ClipOperation) {
        let geometry = Geometry::RoundRect { rect, radii };
        if self.clip_is_redundant(&geometry, clip_op) {
            return;
        }
        self.clip_geometry(geometry, clip_op);
        match clip_op {
            ClipOperation::Intersect => self.intersect_culling(rect),
            ClipOperation::Difference => {
                let radius = radii
                    .top_left
                    .max(radii.top_right)
                    .max(radii.bottom_right)
                    .max(radii.bottom_left);
                if radius <= 0.0 {
                    self.subtract_culling(rect);
                    return;
                }
                // Only the flat middle bands are certainly removed.
                if radius * 2.0 < rect.width() {
                    self.subtract_culling(rect.expand_xy(-radius, 0.0));
                }
                if radius * 2.0 < rect.height() {
                    self.subtract_culling(rect.expand_xy(0.0, -radius));
                }
            }
        }
    }

    pub fn clip_oval(&mut self, bounds: Rect, clip_op: ClipOperation) {
        let geometry = Geometry::Ellipse(bounds);
        if self.clip_is_redundant(&geometry, clip_op) {
            return;
        }
        self.clip_geometry(geometry, clip_op);
        if clip_op == ClipOperation::Intersect {
            self.intersect_culling(bounds);
        }
    }

    pub fn clip_path(&mut self, path: Path, clip_op: ClipOperation) {
        let bounds = path.bounds();
        self.clip_geometry(Geometry::FillPath(path), clip_op);
        if clip_op == ClipOperation::Intersect {
            if let Some(bounds) = bounds {
                self.intersect_culling(bounds);
            }
        }
    }

    /// An intersect clip that contains the whole cull rect changes nothing.
    fn clip_is_redundant(&self, geometry: &Geometry, clip_op: ClipOperation) -> bool {
        clip_op == ClipOperation::Intersect
            && self
                .current
                .cull_rect
                .is_some_and(|cull_rect| geometry.covers_area(&self.current.transform, &cull_rect))
    }

    fn clip_geometry(&mut self, geometry: Geometry, clip_op: ClipOperation) {
        let mut entity = Entity::from_contents(Arc::new(ClipContents::new(geometry, clip_op)));
        entity.set_transform(self.current.transform);
        entity.set_clip_depth(self.current.clip_depth);
        self.current_pass().push_clip(entity);

        self.current.clip_depth += 1;
        self.current.num_clips += 1;
    }

    fn intersect_culling(&mut self, clip_rect: Rect) {
        let clip_rect = clip_rect.transform_bounds(&self.current.transform);
        self.current.cull_rect = Some(match self.current.cull_rect {
            Some(cull_rect) => cull_rect.intersection(&clip_rect).unwrap_or_default(),
            None => clip_rect,
        });
    }

    fn subtract_culling(&mut self, clip_rect: Rect) {
        // Without a cull rect the difference is not a rectangle.
        let Some(cull_rect) = self.current.cull_rect else {
            return;
        };
        let clip_rect = clip_rect.transform_bounds(&self.current.transform);
        self.current.cull_rect = Some(cutout(cull_rect, clip_rect));
    }

    /// Resets the stencil to the depth of the entry that is current again.
    fn restore_clip(&mut self) {
        let mut entity = Entity::from_contents(Arc::new(ClipRestoreContents::new()));
        entity.set_transform(self.current.transform);
        entity.set_clip_depth(self.current.clip_depth);
        self.add_entity_to_current_pass(entity);
    }

    // ----------------------------------------------------------------------
    // Finishing

    fn current_pass(&mut self) -> &mut EntityPass {
        match self.layers.last_mut() {
            Some(layer) => layer.as_mut(),
            None => self.base_pass.as_mut(),
        }
    }

    /// Closes every open layer and clip and hands out the recorded tree. The
    /// canvas starts over with its initial cull rect.
    pub fn end_recording_as_picture(&mut self) -> Picture {
        let depth = self.current_depth;
        while let Some(mut layer) = self.layers.pop() {
            layer.pop_all_clips(depth);
            self.current_pass().add_subpass(layer);
        }
        self.base_pass.pop_all_clips(depth);

        let mut fresh = Canvas::with_cull_rect(self.initial_cull_rect);
        fresh.debug_options = self.debug_options;
        let recorded = mem::replace(self, fresh);
        Picture::new(recorded.base_pass)
    }
}

/// `rect` minus `hole`, when the remainder is still a rectangle. Otherwise
/// `rect` is returned unchanged.
fn cutout(rect: Rect, hole: Rect) -> Rect {
    if hole.contains(&rect) {
        return Rect::default();
    }
    let spans_x = hole.left <= rect.left && hole.right >= rect.right;
    let spans_y = hole.top <= rect.top && hole.bottom >= rect.bottom;
    let mut result = rect;
    if spans_x {
        if hole.top <= rect.top && hole.bottom > rect.top {
            result.top = hole.bottom;
        } else if hole.bottom >= rect.bottom && hole.top < rect.bottom {
            result.bottom = hole.top;
        }
    }
    if spans_y {
        if hole.left <= rect.left && hole.right > rect.left {
            result.left = hole.right;
        } else if hole.right >= rect.right && hole.left < rect.right {
            result.right = hole.left;
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::{Color, Element};

    fn depths(picture: &Picture) -> Vec<u32> {
        let mut depths = Vec::new();
        picture.pass().iterate_all_elements(&mut |element| {
            depths.push(match element {
                Element::Entity(entity) => entity.new_clip_depth(),
                Element::Subpass(subpass) => subpass.new_clip_depth(),
            });
            true
        });
        depths
    }

    #[test]
    fn clip_depths_follow_recording_order() {
        let mut canvas = Canvas::new();
        let radii = RoundingRadii::uniform(10.0);
        canvas.draw_rrect(Rect::from_ltrb(0.0, 0.0, 100.0, 100.0), radii, &Paint::default());
        canvas.clip_rrect(Rect::from_ltrb(0.0, 0.0, 50.0, 50.0), radii, ClipOperation::Intersect);
        canvas.save_layer(&Paint::default(), None, None);
        canvas.draw_rrect(Rect::from_ltrb(0.0, 0.0, 50.0, 50.0), radii, &Paint::default());

        let picture = canvas.end_recording_as_picture();
        assert_eq!(depths(&picture), vec![2, 4, 3, 4]);
    }

    #[test]
    fn restore_pops_clips_and_emits_a_restore() {
        let mut canvas = Canvas::new();
        canvas.save();
        canvas.clip_rect(Rect::from_xywh(0.0, 0.0, 10.0, 10.0), ClipOperation::Intersect);
        canvas.draw_rect(Rect::from_xywh(0.0, 0.0, 20.0, 20.0), &Paint::default());
        assert!(canvas.restore());
        assert!(!canvas.restore());

        let picture = canvas.end_recording_as_picture();
        let elements = picture.pass().elements();
        assert_eq!(elements.len(), 3);
        let Element::Entity(clip) = &elements[0] else {
            panic!("expected the clip entity first");
        };
        assert_eq!(clip.new_clip_depth(), 2);
        assert_eq!(clip.clip_depth(), 0);
        let Element::Entity(draw) = &elements[1] else {
            panic!("expected the draw second");
        };
        assert_eq!(draw.clip_depth(), 1);
        let Element::Entity(restore) = &elements[2] else {
            panic!("expected the restore last");
        };
        assert_eq!(restore.clip_depth(), 0);
        assert_eq!(restore.new_clip_depth(), 3);
    }

    #[test]
    fn save_count_tracks_saves_and_layers() {
        let mut canvas = Canvas::new();
        assert_eq!(canvas.save_count(), 1);
        canvas.save();
        canvas.save_layer(&Paint::default(), None, None);
        canvas.save();
        assert_eq!(canvas.save_count(), 4);
        canvas.restore_to_count(2);
        assert_eq!(canvas.save_count(), 2);
        canvas.restore_to_count(0);
        assert_eq!(canvas.save_count(), 1);
        assert_eq!(canvas.end_recording_as_picture().pass().subpasses_depth(), 2);
    }

    #[test]
    fn transforms_are_scoped_to_saves() {
        let mut canvas = Canvas::new();
        canvas.translate(10.0, 0.0);
        canvas.save();
        canvas.scale(2.0, 2.0);
        let point = canvas.transform().transform_point(Point::new(1.0, 1.0));
        assert_eq!(point, Point::new(12.0, 2.0));
        canvas.restore();
        assert_eq!(canvas.transform(), &Matrix::translation(Point::new(10.0, 0.0)));
        canvas.pre_concat(&Matrix::scale(2.0, 2.0));
        assert_eq!(canvas.transform().transform_point(Point::ZERO), Point::new(20.0, 0.0));
        canvas.reset_transform();
        assert!(canvas.transform().is_identity());
    }

    #[test]
    fn layer_is_recorded_with_the_save_state() {
        let mut canvas = Canvas::new();
        canvas.translate(5.0, 5.0);
        canvas.clip_rect(Rect::from_xywh(0.0, 0.0, 50.0, 50.0), ClipOperation::Intersect);
        let paint = Paint { blend_mode: BlendMode::Screen, ..Paint::default() };
        canvas.save_layer(&paint, Some(Rect::from_xywh(0.0, 0.0, 10.0, 10.0)), None);
        canvas.restore();

        let picture = canvas.end_recording_as_picture();
        let Some(Element::Subpass(layer)) = picture.pass().elements().get(1) else {
            panic!("expected the layer after the clip");
        };
        assert_eq!(layer.blend_mode(), BlendMode::Screen);
        assert_eq!(layer.clip_depth(), 1);
        assert_eq!(layer.transform(), &Matrix::translation(Point::new(5.0, 5.0)));
        assert_eq!(layer.bounds_limit(), Some(Rect::from_xywh(0.0, 0.0, 10.0, 10.0)));
        assert_eq!(layer.collapse_opacity(), None);
    }

    #[test]
    fn blur_backdrop_raises_the_parent_mip_count() {
        let mut canvas = Canvas::new();
        canvas.save_layer(&Paint::default(), None, None);
        canvas.save_layer(&Paint::default(), None, Some(ImageFilter::blur(4.0, 4.0)));
        canvas.restore();
        canvas.restore();

        let picture = canvas.end_recording_as_picture();
        assert_eq!(picture.pass().required_mip_count(), 1);
        let Some(Element::Subpass(parent)) = picture.pass().elements().first() else {
            panic!("expected the outer layer");
        };
        assert_eq!(parent.required_mip_count(), 4);
        let Some(Element::Subpass(inner)) = parent.elements().first() else {
            panic!("expected the backdrop layer");
        };
        assert!(inner.has_backdrop_filter());
        assert_eq!(inner.required_mip_count(), 1);
    }

    #[test]
    fn blur_image_filter_raises_the_layer_mip_count() {
        let mut canvas = Canvas::new();
        let paint = Paint { image_filter: Some(ImageFilter::blur(2.0, 2.0)), ..Paint::default() };
        canvas.save_layer(&paint, None, None);
        canvas.draw_rect(Rect::from_xywh(0.0, 0.0, 10.0, 10.0), &Paint::with_color(Color::RED));
        canvas.restore();

        let picture = canvas.end_recording_as_picture();
        let Some(Element::Subpass(layer)) = picture.pass().elements().first() else {
            panic!("expected the layer");
        };
        assert_eq!(layer.required_mip_count(), 4);
    }

    #[test]
    fn redundant_clips_are_skipped() {
        let mut canvas = Canvas::with_cull_rect(Some(Rect::from_xywh(0.0, 0.0, 100.0, 100.0)));
        canvas.clip_rect(Rect::from_xywh(-10.0, -10.0, 200.0, 200.0), ClipOperation::Intersect);
        canvas.clip_rect(Rect::from_xywh(10.0, 10.0, 20.0, 20.0), ClipOperation::Intersect);
        assert_eq!(canvas.local_cull_rect(), Some(Rect::from_xywh(10.0, 10.0, 20.0, 20.0)));
        assert_eq!(canvas.end_recording_as_picture().pass().element_count(), 1);
    }

    #[test]
    fn difference_clips_shrink_the_cull_rect() {
        let mut canvas = Canvas::with_cull_rect(Some(Rect::from_xywh(0.0, 0.0, 100.0, 100.0)));
        canvas.clip_rect(Rect::from_ltrb(-10.0, -10.0, 110.0, 40.0), ClipOperation::Difference);
        assert_eq!(canvas.local_cull_rect(), Some(Rect::from_ltrb(0.0, 40.0, 100.0, 100.0)));
        canvas.clip_rect(Rect::from_ltrb(40.0, 40.0, 60.0, 60.0), ClipOperation::Difference);
        assert_eq!(canvas.local_cull_rect(), Some(Rect::from_ltrb(0.0, 40.0, 100.0, 100.0)));
    }

    #[test]
    fn recording_starts_over_after_a_picture() {
        let mut canvas = Canvas::new();
        canvas.save_layer(&Paint::default(), None, None);
        canvas.draw_paint(&Paint::with_color(Color::RED));
        let picture = canvas.end_recording_as_picture();
        assert_eq!(picture.pass().subpasses_depth(), 2);
        assert_eq!(canvas.save_count(), 1);
        assert_eq!(canvas.end_recording_as_picture().pass().element_count(), 0);
    }

    #[test]
    fn cutout_only_removes_full_bands() {
        let rect = Rect::from_ltrb(0.0, 0.0, 10.0, 10.0);
        assert_eq!(cutout(rect, Rect::from_ltrb(-1.0, -1.0, 11.0, 11.0)), Rect::default());
        assert_eq!(cutout(rect, Rect::from_ltrb(-1.0, 5.0, 11.0, 11.0)), Rect::from_ltrb(0.0, 0.0, 10.0, 5.0));
        assert_eq!(cutout(rect, Rect::from_ltrb(8.0, -1.0, 11.0, 11.0)), Rect::from_ltrb(0.0, 0.0, 8.0, 10.0));
        assert_eq!(cutout(rect, Rect::from_ltrb(2.0, 2.0, 4.0, 4.0)), rect);
    }
}
