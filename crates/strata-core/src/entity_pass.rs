//! Save/restore scopes and the compositor that flattens them.
//!
//! An [`EntityPass`] is an ordered list of entities and child passes. When
//! rendered, each child pass is either drawn straight into its parent's
//! target (collapsed) or rendered into an offscreen texture sized to its
//! coverage and drawn back as a textured entity.

use std::fmt;
use std::sync::Arc;

use crate::color::{BlendMode, Color};
use crate::content_context::ContentContext;
use crate::contents::{CheckerboardContents, ClipCoverageKind, ClipRestoreContents, Contents, FramebufferBlendContents, TextureContents};
use crate::entity::Entity;
use crate::entity_pass_delegate::{DefaultEntityPassDelegate, EntityPassDelegate};
use crate::error::{RenderError, Result};
use crate::filters::{FilterContents, FilterInput};
use crate::geometry::{ISize, Matrix, Point, Rect};
use crate::inline_pass_context::{EntityPassTarget, InlinePassContext};
use crate::renderer::{BlitPass, Capabilities, RenderPass, RenderTarget, RenderTargetCache, TextureRef, same_texture};

/// Builds the filter drawn under a pass from whatever is behind it. Called
/// with the parent's texture (or its coverage) and the pass transform basis.
pub type BackdropFilterProc =
    Arc<dyn Fn(FilterInput, Matrix) -> Option<Arc<FilterContents>> + Send + Sync>;

#[derive(Debug)]
pub enum Element {
    Entity(Entity),
    Subpass(Box<EntityPass>),
}

/// One level of the clip stack: what is still visible in pass space, and
/// the stencil depth that area carries.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClipCoverageLayer {
    pub coverage: Option<Rect>,
    pub clip_depth: u32,
}

pub type ClipCoverageStack = Vec<ClipCoverageLayer>;

enum EntityResult {
    Success(Entity),
    Skip,
}

/// Where a pass sits while it renders.
#[derive(Clone, Copy, Debug)]
struct RenderScope {
    root_pass_size: ISize,
    /// Origin of the current target in root pass space.
    global_pass_position: Point,
    /// Origin of the current target relative to the parent target.
    local_pass_position: Point,
    pass_depth: u32,
    clip_depth_floor: u32,
    /// Opacity folded into entities of collapsed passes.
    inherited_opacity: f32,
}

/// Marks the render target cache frame as finished when rendering returns.
struct FrameGuard<'a>(&'a RenderTargetCache);

impl<'a> FrameGuard<'a> {
    fn start(cache: &'a RenderTargetCache) -> Self {
        cache.start_frame();
        Self(cache)
    }
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        self.0.end_frame();
    }
}

pub struct EntityPass {
    elements: Vec<Element>,
    active_clips: Vec<usize>,
    transform: Matrix,
    blend_mode: BlendMode,
    flood_clip: bool,
    clip_depth: u32,
    new_clip_depth: u32,
    bounds_limit: Option<Rect>,
    backdrop_filter_proc: Option<BackdropFilterProc>,
    required_mip_count: u32,
    enable_offscreen_checkerboard: bool,
    delegate: Arc<dyn EntityPassDelegate>,
    advanced_blend_reads_from_pass_texture: u32,
    backdrop_filter_reads_from_pass_texture: u32,
    is_attached: bool,
}

impl Default for EntityPass {
    fn default() -> Self {
        Self {
            elements: Vec::new(),
            active_clips: Vec::new(),
            transform: Matrix::identity(),
            blend_mode: BlendMode::SourceOver,
            flood_clip: false,
            clip_depth: 0,
            new_clip_depth: 1,
            bounds_limit: None,
            backdrop_filter_proc: None,
            required_mip_count: 1,
            enable_offscreen_checkerboard: false,
            delegate: DefaultEntityPassDelegate::new(),
            advanced_blend_reads_from_pass_texture: 0,
            backdrop_filter_reads_from_pass_texture: 0,
            is_attached: false,
        }
    }
}

impl fmt::Debug for EntityPass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityPass")
            .field("elements", &self.elements)
            .field("transform", &self.transform)
            .field("blend_mode", &self.blend_mode)
            .field("clip_depth", &self.clip_depth)
            .field("new_clip_depth", &self.new_clip_depth)
            .field("bounds_limit", &self.bounds_limit)
            .field("has_backdrop_filter", &self.backdrop_filter_proc.is_some())
            .field("required_mip_count", &self.required_mip_count)
            .field("delegate", &self.delegate)
            .finish_non_exhaustive()
    }
}

impl EntityPass {
    pub fn new() -> Self {
        Self::default()
    }

    // ----------------------------------------------------------------------
    // Building

    pub fn set_delegate(&mut self, delegate: Arc<dyn EntityPassDelegate>) {
        self.delegate = delegate;
    }

    pub fn delegate(&self) -> &Arc<dyn EntityPassDelegate> {
        &self.delegate
    }

    /// Appends an entity. Opaque SourceOver draws are downgraded to Source.
    pub fn add_entity(&mut self, mut entity: Entity) {
        if entity.blend_mode() == BlendMode::SourceOver && entity.is_opaque() {
            entity.set_blend_mode(BlendMode::Source);
        }
        if entity.blend_mode().is_advanced() {
            self.advanced_blend_reads_from_pass_texture += 1;
        }
        self.elements.push(Element::Entity(entity));
    }

    /// Appends a clip entity whose `new_clip_depth` is fixed up once the clip
    /// is popped.
    pub fn push_clip(&mut self, entity: Entity) {
        self.elements.push(Element::Entity(entity));
        self.active_clips.push(self.elements.len() - 1);
    }

    /// Closes the `num_clips` most recent clips, giving each `depth` as the
    /// depth of the last draw they affect.
    pub fn pop_clips(&mut self, num_clips: usize, depth: u32) {
        if num_clips > self.active_clips.len() {
            tracing::error!(
                active = self.active_clips.len(),
                popped = num_clips,
                depth,
                "attempted to pop more clips than are active"
            );
        }
        let count = num_clips.min(self.active_clips.len());
        for _ in 0..count {
            let Some(index) = self.active_clips.pop() else {
                break;
            };
            match self.elements.get_mut(index) {
                Some(Element::Entity(entity)) => entity.set_new_clip_depth(depth),
                _ => tracing::error!(index, "active clip does not point at an entity"),
            }
        }
    }

    pub fn pop_all_clips(&mut self, depth: u32) {
        self.pop_clips(self.active_clips.len(), depth);
    }

    pub fn active_clip_count(&self) -> usize {
        self.active_clips.len()
    }

    pub fn set_elements(&mut self, elements: Vec<Element>) {
        self.elements = elements;
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    /// Depth of the subpass tree below this pass, counting this pass.
    pub fn subpasses_depth(&self) -> usize {
        self.elements
            .iter()
            .filter_map(|element| match element {
                Element::Subpass(subpass) => Some(subpass.subpasses_depth()),
                Element::Entity(_) => None,
            })
            .max()
            .unwrap_or(0)
            + 1
    }

    /// Appends a child pass and returns it for further recording.
    pub fn add_subpass(&mut self, mut pass: Box<EntityPass>) -> &mut EntityPass {
        if pass.is_attached {
            tracing::error!("subpass is already attached to another pass");
        }
        pass.is_attached = true;
        if pass.backdrop_filter_proc.is_some() {
            self.backdrop_filter_reads_from_pass_texture += 1;
        }
        if pass.blend_mode.is_advanced() {
            self.advanced_blend_reads_from_pass_texture += 1;
        }
        self.elements.push(Element::Subpass(pass));
        match self.elements.last_mut() {
            Some(Element::Subpass(pass)) => pass,
            _ => unreachable!("a subpass was just pushed"),
        }
    }

    /// Moves the child's elements into this pass without isolating them.
    pub fn add_subpass_inline(&mut self, pass: Box<EntityPass>) {
        let EntityPass {
            elements,
            advanced_blend_reads_from_pass_texture,
            backdrop_filter_reads_from_pass_texture,
            ..
        } = *pass;
        self.elements.extend(elements);
        self.backdrop_filter_reads_from_pass_texture += backdrop_filter_reads_from_pass_texture;
        self.advanced_blend_reads_from_pass_texture += advanced_blend_reads_from_pass_texture;
    }

    pub fn transform(&self) -> &Matrix {
        &self.transform
    }

    pub fn set_transform(&mut self, transform: Matrix) {
        self.transform = transform;
    }

    pub fn blend_mode(&self) -> BlendMode {
        self.blend_mode
    }

    /// Destructive modes touch the whole parent area, so the pass is sized
    /// to the clip instead of its content.
    pub fn set_blend_mode(&mut self, blend_mode: BlendMode) {
        self.blend_mode = blend_mode;
        self.flood_clip = blend_mode.is_destructive();
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

    pub fn bounds_limit(&self) -> Option<Rect> {
        self.bounds_limit
    }

    pub fn set_bounds_limit(&mut self, bounds_limit: Option<Rect>) {
        self.bounds_limit = bounds_limit;
    }

    pub fn required_mip_count(&self) -> u32 {
        self.required_mip_count
    }

    pub fn set_required_mip_count(&mut self, mip_count: u32) {
        self.required_mip_count = mip_count.max(1);
    }

    pub fn set_enable_offscreen_checkerboard(&mut self, enabled: bool) {
        self.enable_offscreen_checkerboard = enabled;
    }

    pub fn has_backdrop_filter(&self) -> bool {
        self.backdrop_filter_proc.is_some()
    }

    pub fn set_backdrop_filter(&mut self, proc: BackdropFilterProc) {
        if self.is_attached {
            tracing::error!("backdrop filters cannot be set on passes already added to a parent");
        }
        self.backdrop_filter_proc = Some(proc);
    }

    // ----------------------------------------------------------------------
    // Iteration

    /// Visits elements depth first; returning false stops the walk of the
    /// current list.
    pub fn iterate_all_elements(&self, iterator: &mut dyn FnMut(&Element) -> bool) {
        for element in &self.elements {
            if !iterator(element) {
                return;
            }
            if let Element::Subpass(subpass) = element {
                subpass.iterate_all_elements(iterator);
            }
        }
    }

    pub fn iterate_all_entities(&self, iterator: &mut dyn FnMut(&Entity) -> bool) {
        for element in &self.elements {
            match element {
                Element::Entity(entity) => {
                    if !iterator(entity) {
                        return;
                    }
                }
                Element::Subpass(subpass) => subpass.iterate_all_entities(iterator),
            }
        }
    }

    /// Visits leading entities. Returns true when a subpass was reached.
    pub fn iterate_until_subpass(&self, mut iterator: impl FnMut(&Entity) -> bool) -> bool {
        for element in &self.elements {
            match element {
                Element::Entity(entity) => {
                    if !iterator(entity) {
                        return false;
                    }
                }
                Element::Subpass(_) => return true,
            }
        }
        false
    }

    // ----------------------------------------------------------------------
    // Coverage

    /// Union of every element's coverage in this pass' space. `None` for the
    /// limit means unlimited.
    pub fn elements_coverage(&self, coverage_limit: Option<Rect>) -> Option<Rect> {
        let mut accumulated: Option<Rect> = None;
        for element in &self.elements {
            let element_coverage = match element {
                Element::Entity(entity) => {
                    let coverage = entity.coverage();
                    match (coverage, coverage_limit) {
                        (Some(coverage), Some(limit))
                            if entity.contents().is_none_or(|c| c.is_translation_only_filter()) =>
                        {
                            coverage.intersection(&limit)
                        }
                        _ => coverage,
                    }
                }
                Element::Subpass(subpass) => {
                    let mut unfiltered = self.subpass_coverage(subpass, None);

                    if let (Some(accumulated), Some(proc)) = (accumulated, &subpass.backdrop_filter_proc) {
                        match proc(FilterInput::Rect(accumulated), subpass.transform) {
                            Some(backdrop) => {
                                unfiltered = Rect::union_opt(unfiltered, backdrop.coverage(&Entity::new()));
                            }
                            None => tracing::error!("backdrop filter proc did not return a filter"),
                        }
                    }

                    let Some(unfiltered) = unfiltered else {
                        continue;
                    };

                    let filtered = match subpass
                        .delegate
                        .with_image_filter(FilterInput::Rect(unfiltered), subpass.transform)
                    {
                        Some(image_filter) => {
                            let mut subpass_entity = Entity::new();
                            subpass_entity.set_transform(subpass.transform);
                            image_filter.coverage(&subpass_entity)
                        }
                        None => Some(unfiltered),
                    };
                    Rect::intersection_opt(filtered, coverage_limit)
                }
            };
            accumulated = Rect::union_opt(accumulated, element_coverage);
        }
        accumulated
    }

    /// Area `subpass` will draw into, bounded by `coverage_limit`.
    ///
    /// Without an image filter the result never leaves the limit; unbounded
    /// content falls back to the limit itself. With an image filter the
    /// result is pre-filter and bounded by the area the filter reads to
    /// produce the limit. A zero-area limit covers nothing.
    pub fn subpass_coverage(&self, subpass: &EntityPass, coverage_limit: Option<Rect>) -> Option<Rect> {
        if coverage_limit.is_some_and(|limit| limit.is_empty()) {
            return None;
        }
        let image_filter = subpass
            .delegate
            .with_image_filter(FilterInput::Rect(Rect::default()), subpass.transform);

        let mut elements_limit = coverage_limit;
        if let (Some(filter), Some(limit)) = (&image_filter, coverage_limit) {
            elements_limit = filter.source_coverage(&subpass.transform, limit);
        }

        let mut coverage = subpass.elements_coverage(elements_limit)?;
        if let Some(bounds_limit) = subpass.bounds_limit {
            coverage = coverage.intersection(&bounds_limit.transform_bounds(&subpass.transform))?;
        }

        // Filter input area, which can extend past the limit by the filter's reach.
        if image_filter.is_some() {
            return Rect::intersection_opt(Some(coverage), elements_limit);
        }
        Rect::intersection_opt(Some(coverage), coverage_limit)
    }

    /// True when the bounds limit is smaller than what the elements draw.
    pub fn bounds_limit_might_clip_content(&self) -> bool {
        let Some(bounds_limit) = self.bounds_limit else {
            return false;
        };
        let Some(coverage) = self.elements_coverage(None) else {
            return false;
        };
        coverage.is_maximum() || !bounds_limit.transform_bounds(&self.transform).contains(&coverage)
    }

    /// Opacity to fold into this pass when drawing it into its parent, or
    /// `None` when it needs a target of its own.
    pub fn collapse_opacity(&self) -> Option<f32> {
        if self.backdrop_filter_proc.is_some()
            || self.blend_mode != BlendMode::SourceOver
            || self.delegate.can_elide()
            || self.bounds_limit_might_clip_content()
        {
            return None;
        }
        self.delegate.collapse_opacity(self)
    }

    /// Number of times rendering this pass has to stop and sample the pass
    /// texture, including reads made by passes that collapse into it.
    pub fn total_pass_reads(&self, capabilities: &Capabilities) -> u32 {
        let own = if capabilities.supports_framebuffer_fetch {
            self.backdrop_filter_reads_from_pass_texture
        } else {
            self.backdrop_filter_reads_from_pass_texture + self.advanced_blend_reads_from_pass_texture
        };
        own + self
            .elements
            .iter()
            .filter_map(|element| match element {
                Element::Subpass(subpass) if subpass.collapse_opacity().is_some() => {
                    Some(subpass.total_pass_reads(capabilities))
                }
                _ => None,
            })
            .sum::<u32>()
    }

    // ----------------------------------------------------------------------
    // Clear color

    /// The color leading full-target draws leave behind, premultiplied.
    /// Those draws are skipped and the target is cleared to this instead.
    pub fn clear_color(&self, target_size: ISize) -> Option<Color> {
        self.clear_color_at(Point::ZERO, target_size)
    }

    /// Clear color of a target whose top left corner sits at `origin` in
    /// root space.
    fn clear_color_at(&self, origin: Point, target_size: ISize) -> Option<Color> {
        if self.backdrop_filter_proc.is_some() {
            return None;
        }
        let mut result: Option<Color> = None;
        for element in &self.elements {
            let Some((color, blend_mode)) = element_as_background_color(element, origin, target_size) else {
                break;
            };
            result = Some(result.unwrap_or(Color::BLACK_TRANSPARENT).blend(color, blend_mode));
        }
        result.map(Color::premultiply)
    }

    pub fn clear_color_or_default(&self, target_size: ISize) -> Color {
        self.clear_color(target_size).unwrap_or(Color::BLACK_TRANSPARENT)
    }

    // ----------------------------------------------------------------------
    // Rendering

    /// Renders the pass tree into `render_target`.
    pub fn render(&self, renderer: &ContentContext, render_target: &RenderTarget) -> Result<()> {
        let _span = tracing::debug_span!("entity_pass_render").entered();
        let _frame = FrameGuard::start(renderer.render_target_cache());

        render_target.validate()?;
        let root_size = render_target.size();
        let clip_stack = vec![ClipCoverageLayer { coverage: Some(Rect::from_isize(root_size)), clip_depth: 0 }];
        let scope = RenderScope {
            root_pass_size: root_size,
            global_pass_position: Point::ZERO,
            local_pass_position: Point::ZERO,
            pass_depth: 0,
            clip_depth_floor: 0,
            inherited_opacity: 1.0,
        };

        let reads = self.total_pass_reads(renderer.capabilities());
        if reads > 0 {
            tracing::debug!(reads, "rendering root pass offscreen");
            let offscreen = RenderTarget::create_offscreen(
                &**renderer.context(),
                &**renderer.render_target_cache(),
                root_size,
                self.required_mip_count,
                "EntityPass",
                self.clear_color_or_default(root_size),
                true,
            )?;
            let offscreen = self.render_to_target(renderer, scope, offscreen, clip_stack, None)?;
            return copy_to_root(renderer, offscreen.render_target_texture(), render_target);
        }

        let mut root = render_target.clone();
        if root.stencil_attachment().is_none() {
            root.setup_stencil_attachment(
                &**renderer.context(),
                &**renderer.render_target_cache(),
                "StrataOnscreen",
            )?;
        }
        root.color_attachment_mut().clear_color = self.clear_color_or_default(root_size);

        let rendered = self.render_to_target(renderer, scope, root, clip_stack, None)?;
        let texture = rendered.render_target_texture();
        if !same_texture(&texture, &render_target.render_target_texture()) {
            return copy_to_root(renderer, texture, render_target);
        }
        Ok(())
    }

    /// Renders this pass as the owner of `target` and returns the target,
    /// whose color texture may have been flipped along the way.
    fn render_to_target(
        &self,
        renderer: &ContentContext,
        scope: RenderScope,
        target: RenderTarget,
        mut clip_stack: ClipCoverageStack,
        backdrop_filter_contents: Option<Arc<dyn Contents>>,
    ) -> Result<RenderTarget> {
        let mut pass_context = InlinePassContext::new(EntityPassTarget::new(target));
        self.on_render(renderer, scope, &mut pass_context, &mut clip_stack, backdrop_filter_contents, false)?;
        if pass_context.pass_count() == 0 {
            // Nothing was drawn; the target still has to be cleared.
            pass_context.get_render_pass(renderer, scope.pass_depth)?;
        }
        pass_context.end_pass(renderer)?;
        Ok(pass_context.into_render_target())
    }

    fn on_render(
        &self,
        renderer: &ContentContext,
        scope: RenderScope,
        pass_context: &mut InlinePassContext,
        clip_stack: &mut ClipCoverageStack,
        backdrop_filter_contents: Option<Arc<dyn Contents>>,
        collapsed: bool,
    ) -> Result<()> {
        let _span = tracing::trace_span!("on_render", depth = scope.pass_depth, collapsed).entered();

        if !self.active_clips.is_empty() {
            tracing::error!(
                depth = scope.pass_depth,
                "pass contains clips with an unresolved depth"
            );
        }

        let clear_color_size = pass_context.pass_target().render_target().size();
        let clear_color_origin = scope.global_pass_position;
        if !collapsed && self.clear_color_at(clear_color_origin, clear_color_size).is_some() {
            pass_context.get_render_pass(renderer, scope.pass_depth)?;
        }

        if self.backdrop_filter_proc.is_some() {
            let contents = backdrop_filter_contents.ok_or(RenderError::MissingBackdropContents)?;
            let mut backdrop_entity = Entity::from_contents(contents);
            backdrop_entity.set_transform(Matrix::translation(-scope.local_pass_position));
            backdrop_entity.set_clip_depth(scope.clip_depth_floor);
            render_element(renderer, backdrop_entity, scope, pass_context, clip_stack)?;
        }

        let mut collapsing_clear_colors = !collapsed && self.backdrop_filter_proc.is_none();
        for element in &self.elements {
            if collapsing_clear_colors {
                if element_as_background_color(element, clear_color_origin, clear_color_size).is_some() {
                    continue;
                }
                collapsing_clear_colors = false;
            }

            let mut entity = match self.entity_for_element(renderer, element, scope, pass_context, clip_stack)? {
                EntityResult::Success(entity) => entity,
                EntityResult::Skip => continue,
            };

            if entity.blend_mode().is_advanced() {
                let Some(contents) = entity.contents().cloned() else {
                    continue;
                };
                let blend_mode = entity.blend_mode();
                if renderer.capabilities().supports_framebuffer_fetch {
                    entity.set_contents(Arc::new(FramebufferBlendContents::new(contents, blend_mode)));
                } else {
                    // The blend reads the pass texture, which must be cleared
                    // even when nothing has been drawn into it yet.
                    pass_context.get_render_pass(renderer, scope.pass_depth)?;
                    pass_context.end_pass(renderer)?;
                    let texture = pass_context.texture();
                    let Some(inverse) = entity.transform().invert() else {
                        tracing::warn!(?blend_mode, "skipping advanced blend with a degenerate transform");
                        continue;
                    };
                    let mut blend = FilterContents::blend(
                        blend_mode,
                        vec![
                            FilterInput::Texture { texture, local_transform: inverse },
                            FilterInput::Contents(contents),
                        ],
                    );
                    blend.set_coverage_hint(entity.coverage());
                    entity.set_contents(Arc::new(blend));
                }
                entity.set_blend_mode(BlendMode::Source);
            }

            render_element(renderer, entity, scope, pass_context, clip_stack)?;
        }

        if cfg!(debug_assertions) && self.enable_offscreen_checkerboard && !collapsed && scope.pass_depth > 0 {
            let result = pass_context.get_render_pass(renderer, scope.pass_depth)?;
            let brightness = (0.6 - (scope.pass_depth / 5) as f32).max(0.0);
            let mut checkerboard = CheckerboardContents::new();
            checkerboard.set_color(Color::from_hsb(0.0, 1.0, brightness, 0.25));
            checkerboard.render(renderer, &Entity::new(), result.pass)?;
        }
        Ok(())
    }

    fn entity_for_element(
        &self,
        renderer: &ContentContext,
        element: &Element,
        scope: RenderScope,
        pass_context: &mut InlinePassContext,
        clip_stack: &mut ClipCoverageStack,
    ) -> Result<EntityResult> {
        let subpass = match element {
            Element::Entity(entity) => {
                let mut entity = entity.clone();
                if scope.global_pass_position != Point::ZERO {
                    entity.set_transform(Matrix::translation(-scope.global_pass_position) * *entity.transform());
                }
                if !entity.set_inherited_opacity(scope.inherited_opacity) {
                    tracing::warn!("entity in a collapsed pass cannot inherit its opacity");
                }
                return Ok(EntityResult::Success(entity));
            }
            Element::Subpass(subpass) => subpass,
        };

        if subpass.delegate.can_elide() {
            return Ok(EntityResult::Skip);
        }

        if let Some(opacity) = subpass.collapse_opacity() {
            let collapsed_scope = RenderScope {
                local_pass_position: Point::ZERO,
                inherited_opacity: scope.inherited_opacity * opacity,
                ..scope
            };
            subpass.on_render(renderer, collapsed_scope, pass_context, clip_stack, None, true)?;
            return Ok(EntityResult::Skip);
        }

        let mut backdrop_filter_contents: Option<Arc<dyn Contents>> = None;
        if let Some(proc) = &subpass.backdrop_filter_proc {
            let texture = pass_context.texture();
            backdrop_filter_contents = proc(FilterInput::texture(texture), subpass.transform.basis())
                .map(|filter| filter as Arc<dyn Contents>);
            // The backdrop must never sample a texture that has not been
            // cleared yet, and everything drawn so far has to land first.
            pass_context.get_render_pass(renderer, scope.pass_depth)?;
            pass_context.end_pass(renderer)?;
        }

        let Some(clip_coverage_back) = clip_stack.last().and_then(|layer| layer.coverage) else {
            return Ok(EntityResult::Skip);
        };

        let target_size = pass_context.pass_target().render_target().size();
        let Some(coverage_limit) = Rect::from_origin_size(scope.global_pass_position, target_size.to_size())
            .intersection(&clip_coverage_back)
            .and_then(|limit| limit.intersection(&Rect::from_isize(scope.root_pass_size)))
        else {
            return Ok(EntityResult::Skip);
        };

        let subpass_coverage = if subpass.flood_clip || backdrop_filter_contents.is_some() {
            Some(coverage_limit)
        } else {
            self.subpass_coverage(subpass, Some(coverage_limit))
        };
        let Some(subpass_coverage) = subpass_coverage.map(|coverage| coverage.round_out()) else {
            return Ok(EntityResult::Skip);
        };
        let subpass_size = ISize::new(subpass_coverage.width() as i64, subpass_coverage.height() as i64);
        if subpass_size.is_empty() {
            return Ok(EntityResult::Skip);
        }

        let subpass_origin = subpass_coverage.origin();
        let subpass_target = RenderTarget::create_offscreen(
            &**renderer.context(),
            &**renderer.render_target_cache(),
            subpass_size,
            subpass.required_mip_count,
            "EntityPass",
            subpass
                .clear_color_at(subpass_origin, subpass_size)
                .unwrap_or(Color::BLACK_TRANSPARENT),
            true,
        )?;

        // Filters may move the texture after it is drawn, so the parent clip
        // stack would not line up with it anyway.
        let subpass_clip_stack = vec![ClipCoverageLayer {
            coverage: Some(subpass_coverage),
            clip_depth: subpass.clip_depth,
        }];
        let subpass_scope = RenderScope {
            root_pass_size: scope.root_pass_size,
            global_pass_position: subpass_origin,
            local_pass_position: subpass_origin - scope.global_pass_position,
            pass_depth: scope.pass_depth + 1,
            clip_depth_floor: subpass.clip_depth,
            inherited_opacity: 1.0,
        };
        let subpass_target = subpass.render_to_target(
            renderer,
            subpass_scope,
            subpass_target,
            subpass_clip_stack,
            backdrop_filter_contents,
        )?;
        let subpass_texture = subpass_target.render_target_texture();

        let contents = subpass
            .delegate
            .create_contents_for_subpass_target(
                subpass_texture,
                Matrix::translation(-scope.global_pass_position) * subpass.transform,
            )
            .ok_or(RenderError::MissingSubpassContents)?;

        let mut entity = Entity::from_contents(contents);
        entity.set_new_clip_depth(subpass.new_clip_depth);
        entity.set_clip_depth(subpass.clip_depth);
        entity.set_blend_mode(subpass.blend_mode);
        entity.set_transform(Matrix::translation(subpass_origin - scope.global_pass_position));
        if !entity.set_inherited_opacity(scope.inherited_opacity) {
            tracing::warn!("subpass texture cannot inherit the opacity of a collapsed parent");
        }
        Ok(EntityResult::Success(entity))
    }
}

/// Background color of `element` for a target placed at `origin` in root space.
fn element_as_background_color(element: &Element, origin: Point, target_size: ISize) -> Option<(Color, BlendMode)> {
    match element {
        Element::Entity(entity) if origin == Point::ZERO => entity
            .as_background_color(target_size)
            .map(|color| (color, entity.blend_mode())),
        Element::Entity(entity) => {
            let mut local = entity.clone();
            local.set_transform(Matrix::translation(-origin) * *entity.transform());
            local.as_background_color(target_size).map(|color| (color, entity.blend_mode()))
        }
        Element::Subpass(_) => None,
    }
}

/// Culls `entity` against the clip stack, updates the stack for clips and
/// restores, then draws it into the active pass.
fn render_element(
    renderer: &ContentContext,
    mut entity: Entity,
    scope: RenderScope,
    pass_context: &mut InlinePassContext,
    clip_stack: &mut ClipCoverageStack,
) -> Result<()> {
    let result = pass_context.get_render_pass(renderer, scope.pass_depth)?;
    let global = scope.global_pass_position;

    let Some(top) = clip_stack.last().copied() else {
        return Ok(());
    };
    // Entity transforms are relative to the current target.
    let current_clip_coverage = top.coverage.map(|coverage| coverage.shift(-global));
    if !entity.should_render(current_clip_coverage) {
        return Ok(());
    }

    let mut clip_coverage = entity.clip_coverage(current_clip_coverage);
    clip_coverage.coverage = clip_coverage.coverage.map(|coverage| coverage.shift(global));

    match clip_coverage.kind {
        ClipCoverageKind::NoChange => {}
        ClipCoverageKind::Append => {
            clip_stack.push(ClipCoverageLayer {
                coverage: clip_coverage.coverage,
                clip_depth: entity.clip_depth() + 1,
            });
            if top.coverage.is_none() {
                // Everything is already clipped out.
                return Ok(());
            }
        }
        ClipCoverageKind::Restore => {
            if top.clip_depth <= entity.clip_depth() {
                return Ok(());
            }
            let front_depth = clip_stack.first().map_or(0, |layer| layer.clip_depth);
            let restoration_index = entity.clip_depth().saturating_sub(front_depth) as usize;
            if restoration_index >= clip_stack.len() {
                tracing::error!(restoration_index, "clip restore below the bottom of the clip stack");
                return Ok(());
            }
            let restore_coverage = clip_stack
                .get(restoration_index + 1)
                .and_then(|layer| layer.coverage)
                .map(|coverage| coverage.shift(-global));
            clip_stack.truncate(restoration_index + 1);

            if clip_stack.last().is_none_or(|layer| layer.coverage.is_none()) {
                return Ok(());
            }
            entity.set_contents(Arc::new(ClipRestoreContents::with_restore_coverage(restore_coverage)));
        }
    }

    entity.set_clip_depth(entity.clip_depth().saturating_sub(scope.clip_depth_floor));
    result.clip_recorder.record_entity(&entity, clip_coverage.kind);
    draw_entity(renderer, &entity, result.pass)
}

fn draw_entity(renderer: &ContentContext, entity: &Entity, pass: &mut RenderPass) -> Result<()> {
    entity.render(renderer, pass).inspect_err(|err| {
        tracing::error!(%err, "failed to render entity");
    })
}

/// Copies the final pass texture into the caller's target.
fn copy_to_root(renderer: &ContentContext, source: TextureRef, root: &RenderTarget) -> Result<()> {
    let mut command_buffer = renderer.context().create_command_buffer();
    command_buffer.set_label("EntityPass Root Command Buffer");

    if renderer.capabilities().supports_texture_to_texture_blits {
        let mut blit = BlitPass::new("EntityPass Root Blit");
        blit.add_copy(source, root.render_target_texture());
        command_buffer.encode_blit_pass(blit)?;
    } else {
        let mut pass = RenderPass::new(root.clone());
        pass.set_label("EntityPass Root Render Pass");
        let mut contents = TextureContents::from_texture(source);
        contents.set_stencil_enabled(false);
        let mut entity = Entity::from_contents(Arc::new(contents));
        entity.set_blend_mode(BlendMode::Source);
        draw_entity(renderer, &entity, &mut pass)?;
        command_buffer.encode_render_pass(pass)?;
    }
    command_buffer.submit()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contents::{ClipContents, ClipOperation, SolidColorContents};
    use crate::filters::ImageFilter;
    use crate::shape::Geometry;

    fn rect_entity(rect: Rect, color: Color) -> Entity {
        Entity::from_contents(Arc::new(SolidColorContents::new(Geometry::Rect(rect), color)))
    }

    fn paint_entity(color: Color, blend_mode: BlendMode) -> Entity {
        let mut entity = Entity::from_contents(Arc::new(SolidColorContents::new(Geometry::Cover, color)));
        entity.set_blend_mode(blend_mode);
        entity
    }

    #[test]
    fn opaque_source_over_entities_become_source() {
        let mut pass = EntityPass::new();
        pass.add_entity(rect_entity(Rect::from_xywh(0.0, 0.0, 10.0, 10.0), Color::RED));
        pass.add_entity(rect_entity(Rect::from_xywh(0.0, 0.0, 10.0, 10.0), Color::RED.with_alpha(0.5)));
        let modes: Vec<_> = pass
            .elements()
            .iter()
            .filter_map(|e| match e {
                Element::Entity(entity) => Some(entity.blend_mode()),
                Element::Subpass(_) => None,
            })
            .collect();
        assert_eq!(modes, vec![BlendMode::Source, BlendMode::SourceOver]);
    }

    #[test]
    fn pop_clips_assigns_depth_to_open_clips() {
        let mut pass = EntityPass::new();
        let clip = Entity::from_contents(Arc::new(ClipContents::new(
            Geometry::Rect(Rect::from_xywh(0.0, 0.0, 5.0, 5.0)),
            ClipOperation::Intersect,
        )));
        pass.push_clip(clip.clone());
        pass.push_clip(clip);
        pass.pop_clips(1, 7);
        pass.pop_all_clips(9);
        // Popping more than is open only logs.
        pass.pop_clips(3, 11);

        let depths: Vec<_> = pass
            .elements()
            .iter()
            .filter_map(|e| match e {
                Element::Entity(entity) => Some(entity.new_clip_depth()),
                Element::Subpass(_) => None,
            })
            .collect();
        assert_eq!(depths, vec![9, 7]);
        assert_eq!(pass.active_clip_count(), 0);
    }

    #[test]
    fn elements_coverage_unions_entities_and_respects_the_limit() {
        let mut pass = EntityPass::new();
        pass.add_entity(rect_entity(Rect::from_xywh(0.0, 0.0, 10.0, 10.0), Color::RED));
        pass.add_entity(rect_entity(Rect::from_xywh(20.0, 20.0, 10.0, 10.0), Color::RED));
        assert_eq!(pass.elements_coverage(None), Some(Rect::from_ltrb(0.0, 0.0, 30.0, 30.0)));
        assert_eq!(
            pass.elements_coverage(Some(Rect::from_ltrb(5.0, 5.0, 25.0, 25.0))),
            Some(Rect::from_ltrb(5.0, 5.0, 25.0, 25.0))
        );
    }

    #[test]
    fn subpass_coverage_stays_inside_the_limit() {
        let parent = EntityPass::new();
        let mut subpass = EntityPass::new();
        subpass.add_entity(paint_entity(Color::BLUE, BlendMode::SourceOver));
        subpass.add_entity(rect_entity(Rect::from_xywh(-50.0, -50.0, 500.0, 500.0), Color::RED));

        let limit = Rect::from_xywh(10.0, 10.0, 100.0, 100.0);
        let coverage = parent.subpass_coverage(&subpass, Some(limit));
        assert_eq!(coverage, Some(limit));
        assert_eq!(parent.subpass_coverage(&subpass, None), Some(Rect::maximum()));
    }

    #[test]
    fn zero_area_limit_covers_nothing() {
        let parent = EntityPass::new();
        let mut subpass = EntityPass::new();
        subpass.add_entity(rect_entity(Rect::from_xywh(0.0, 0.0, 10.0, 10.0), Color::RED));
        assert_eq!(parent.subpass_coverage(&subpass, Some(Rect::from_xywh(5.0, 5.0, 0.0, 10.0))), None);
    }

    #[test]
    fn bounds_limit_clamps_subpass_coverage() {
        let parent = EntityPass::new();
        let mut subpass = EntityPass::new();
        subpass.add_entity(rect_entity(Rect::from_xywh(0.0, 0.0, 100.0, 100.0), Color::RED));
        subpass.set_bounds_limit(Some(Rect::from_xywh(0.0, 0.0, 40.0, 40.0)));
        assert!(subpass.bounds_limit_might_clip_content());
        assert_eq!(parent.subpass_coverage(&subpass, None), Some(Rect::from_xywh(0.0, 0.0, 40.0, 40.0)));

        subpass.set_bounds_limit(Some(Rect::from_xywh(0.0, 0.0, 200.0, 200.0)));
        assert!(!subpass.bounds_limit_might_clip_content());
    }

    #[test]
    fn clear_color_folds_leading_background_draws() {
        let mut pass = EntityPass::new();
        pass.add_entity(paint_entity(Color::RED, BlendMode::Source));
        pass.add_entity(paint_entity(Color::CORNFLOWER_BLUE.with_alpha(0.75), BlendMode::SourceOver));
        pass.add_entity(rect_entity(Rect::from_xywh(0.0, 0.0, 10.0, 10.0), Color::GREEN));

        let expected = Color::RED
            .blend(Color::CORNFLOWER_BLUE.with_alpha(0.75), BlendMode::SourceOver)
            .premultiply();
        assert_eq!(pass.clear_color(ISize::new(100, 100)), Some(expected));
    }

    #[test]
    fn backdrop_filter_disables_the_clear_color() {
        let mut pass = EntityPass::new();
        pass.set_backdrop_filter(Arc::new(|input, transform| {
            Some(ImageFilter::blur(3.0, 3.0).wrap_input(input, transform))
        }));
        pass.add_entity(paint_entity(Color::RED, BlendMode::Source));
        assert_eq!(pass.clear_color(ISize::new(100, 100)), None);
        assert_eq!(pass.clear_color_or_default(ISize::new(100, 100)), Color::BLACK_TRANSPARENT);
    }

    #[test]
    fn subpass_reads_are_counted_on_the_parent() {
        let caps = Capabilities::default();
        let mut parent = EntityPass::new();

        let mut advanced = EntityPass::new();
        advanced.set_blend_mode(BlendMode::Multiply);
        parent.add_subpass(Box::new(advanced));
        assert_eq!(parent.total_pass_reads(&caps), 1);

        let fetch = Capabilities { supports_framebuffer_fetch: true, ..Capabilities::default() };
        assert_eq!(parent.total_pass_reads(&fetch), 0);

        // An advanced draw inside a pass that collapses reads the parent texture.
        let mut collapsible = EntityPass::new();
        collapsible.add_entity(paint_entity(Color::RED, BlendMode::Screen));
        parent.add_subpass(Box::new(collapsible));
        assert_eq!(parent.total_pass_reads(&caps), 2);
    }

    #[test]
    fn destructive_blend_floods_the_clip() {
        let mut pass = EntityPass::new();
        pass.set_blend_mode(BlendMode::Source);
        assert!(pass.flood_clip);
        assert_eq!(pass.collapse_opacity(), None);
        pass.set_blend_mode(BlendMode::SourceOver);
        assert!(!pass.flood_clip);
        assert_eq!(pass.collapse_opacity(), Some(1.0));
    }

    #[test]
    fn iteration_helpers_walk_the_tree() {
        let mut root = EntityPass::new();
        root.add_entity(rect_entity(Rect::from_xywh(0.0, 0.0, 1.0, 1.0), Color::RED));
        let sub = root.add_subpass(Box::new(EntityPass::new()));
        sub.add_entity(rect_entity(Rect::from_xywh(0.0, 0.0, 1.0, 1.0), Color::BLUE));
        root.add_entity(rect_entity(Rect::from_xywh(0.0, 0.0, 1.0, 1.0), Color::GREEN));

        let mut elements = 0;
        root.iterate_all_elements(&mut |_| {
            elements += 1;
            true
        });
        assert_eq!(elements, 4);

        let mut entities = 0;
        root.iterate_all_entities(&mut |_| {
            entities += 1;
            true
        });
        assert_eq!(entities, 3);

        let mut leading = 0;
        assert!(root.iterate_until_subpass(|_| {
            leading += 1;
            true
        }));
        assert_eq!(leading, 1);
        assert!(!root.iterate_until_subpass(|_| false));
        assert_eq!(root.subpasses_depth(), 2);
    }

    #[test]
    fn inline_subpass_moves_elements_and_reads() {
        let mut root = EntityPass::new();
        let mut child = EntityPass::new();
        child.add_entity(paint_entity(Color::RED, BlendMode::ColorDodge));
        child.add_entity(rect_entity(Rect::from_xywh(0.0, 0.0, 1.0, 1.0), Color::RED));
        root.add_subpass_inline(Box::new(child));
        assert_eq!(root.element_count(), 2);
        assert_eq!(root.total_pass_reads(&Capabilities::default()), 1);
    }
}
