use std::sync::Arc;

use anyhow::Result;
use strata_core::backend::SoftwareContext;
use strata_core::backend::software::software_texture;
use strata_core::contents::{ClipContents, ClipOperation, SolidColorContents, TextureContents};
use strata_core::renderer::{BlitCommand, PipelineKind};
use strata_core::{
    BlendMode, Color, ColorFilter, ContentContext, Contents, Entity, EntityPass, EntityPassDelegate,
    FilterContents, FilterInput, Geometry, ISize, Matrix, Rect, RenderError, RenderTarget, TextureRef,
};

/// Never collapses, so every subpass gets its own texture.
#[derive(Debug)]
struct OffscreenDelegate;

impl EntityPassDelegate for OffscreenDelegate {
    fn can_elide(&self) -> bool {
        false
    }

    fn collapse_opacity(&self, _pass: &EntityPass) -> Option<f32> {
        None
    }

    fn create_contents_for_subpass_target(
        &self,
        texture: TextureRef,
        _effect_transform: Matrix,
    ) -> Option<Arc<dyn Contents>> {
        Some(Arc::new(TextureContents::from_texture(texture)))
    }

    fn with_image_filter(&self, _input: FilterInput, _effect_transform: Matrix) -> Option<Arc<FilterContents>> {
        None
    }
}

fn setup() -> (Arc<SoftwareContext>, ContentContext) {
    let context = Arc::new(SoftwareContext::new());
    let renderer = ContentContext::new(context.clone());
    (context, renderer)
}

fn solid(geometry: Geometry, color: Color, blend_mode: BlendMode) -> Entity {
    let mut entity = Entity::from_contents(Arc::new(SolidColorContents::new(geometry, color)));
    entity.set_blend_mode(blend_mode);
    entity
}

fn pixel(target: &RenderTarget, x: u32, y: u32) -> Result<Color> {
    let texture = target.render_target_texture();
    let color = software_texture(&texture)?.pixel(x, y);
    color.ok_or_else(|| anyhow::anyhow!("pixel ({x}, {y}) out of bounds"))
}

fn assert_close(actual: Color, expected: Color) {
    let close = |a: f32, b: f32| (a - b).abs() <= 2.0 / 255.0;
    assert!(
        close(actual.red, expected.red)
            && close(actual.green, expected.green)
            && close(actual.blue, expected.blue)
            && close(actual.alpha, expected.alpha),
        "{actual:?} != {expected:?}"
    );
}

fn offscreen_subpass(rect: Rect, color: Color) -> Box<EntityPass> {
    let mut subpass = Box::new(EntityPass::new());
    subpass.set_delegate(Arc::new(OffscreenDelegate));
    subpass.add_entity(solid(Geometry::Rect(rect), color, BlendMode::SourceOver));
    subpass
}

#[test]
fn background_draws_become_the_clear_color() -> Result<()> {
    let (context, renderer) = setup();
    let target = context.create_onscreen_target(ISize::new(300, 300))?;

    let mut pass = EntityPass::new();
    pass.add_entity(solid(Geometry::Cover, Color::RED, BlendMode::Source));
    pass.add_entity(solid(Geometry::Cover, Color::CORNFLOWER_BLUE.with_alpha(0.75), BlendMode::SourceOver));
    pass.render(&renderer, &target)?;

    let passes = context.render_passes();
    assert_eq!(passes.len(), 1);
    assert!(passes[0].commands.is_empty());
    let expected = Color::RED.blend(Color::CORNFLOWER_BLUE.with_alpha(0.75), BlendMode::SourceOver);
    assert_eq!(passes[0].clear_color, expected.premultiply());
    assert_close(pixel(&target, 150, 150)?, expected);
    Ok(())
}

#[test]
fn empty_pass_still_clears_the_target() -> Result<()> {
    let (context, renderer) = setup();
    let target = context.create_onscreen_target(ISize::new(16, 16))?;
    EntityPass::new().render(&renderer, &target)?;

    let passes = context.render_passes();
    assert_eq!(passes.len(), 1);
    assert_eq!(passes[0].clear_color, Color::BLACK_TRANSPARENT);
    assert_eq!(pixel(&target, 3, 3)?, Color::BLACK_TRANSPARENT);
    Ok(())
}

#[test]
fn offscreen_subpass_is_sized_to_its_coverage() -> Result<()> {
    let (context, renderer) = setup();
    let target = context.create_onscreen_target(ISize::new(100, 100))?;

    let mut pass = EntityPass::new();
    pass.add_subpass(offscreen_subpass(Rect::from_xywh(10.0, 10.0, 20.0, 20.0), Color::GREEN));
    pass.render(&renderer, &target)?;

    let passes = context.render_passes();
    assert_eq!(passes.len(), 2);
    assert_eq!(passes[0].size, ISize::new(20, 20));
    assert_eq!(passes[1].size, ISize::new(100, 100));
    assert_eq!(pixel(&target, 15, 15)?, Color::GREEN);
    assert_eq!(pixel(&target, 50, 50)?, Color::BLACK_TRANSPARENT);
    assert_eq!(pixel(&target, 9, 9)?, Color::BLACK_TRANSPARENT);
    Ok(())
}

#[test]
fn subpass_coverage_is_clamped_to_the_clip() -> Result<()> {
    let (context, renderer) = setup();
    let target = context.create_onscreen_target(ISize::new(100, 100))?;

    let mut pass = EntityPass::new();
    pass.push_clip(Entity::from_contents(Arc::new(ClipContents::new(
        Geometry::Rect(Rect::from_xywh(0.0, 0.0, 50.0, 50.0)),
        ClipOperation::Intersect,
    ))));
    let mut subpass = offscreen_subpass(Rect::from_xywh(25.0, 25.0, 50.0, 50.0), Color::BLUE);
    subpass.set_clip_depth(1);
    pass.add_subpass(subpass);
    pass.pop_clips(1, 2);
    pass.render(&renderer, &target)?;

    let passes = context.render_passes();
    assert_eq!(passes[0].size, ISize::new(25, 25));
    assert_eq!(pixel(&target, 40, 40)?, Color::BLUE);
    assert_eq!(pixel(&target, 60, 60)?, Color::BLACK_TRANSPARENT);
    Ok(())
}

#[test]
fn zero_area_clip_culls_everything_under_it() -> Result<()> {
    let (context, renderer) = setup();
    let target = context.create_onscreen_target(ISize::new(64, 64))?;

    let mut pass = EntityPass::new();
    pass.push_clip(Entity::from_contents(Arc::new(ClipContents::new(
        Geometry::Rect(Rect::from_xywh(10.0, 10.0, 0.0, 30.0)),
        ClipOperation::Intersect,
    ))));
    let mut inside = solid(Geometry::Rect(Rect::from_xywh(0.0, 0.0, 64.0, 64.0)), Color::RED, BlendMode::SourceOver);
    inside.set_clip_depth(1);
    pass.add_entity(inside);
    let mut subpass = offscreen_subpass(Rect::from_xywh(0.0, 0.0, 32.0, 32.0), Color::GREEN);
    subpass.set_clip_depth(1);
    pass.add_subpass(subpass);
    pass.pop_clips(1, 3);
    pass.render(&renderer, &target)?;

    let passes = context.render_passes();
    assert_eq!(passes.len(), 1, "the subpass must not get a texture");
    assert!(passes[0].commands.iter().all(|c| c.pipeline.kind == strata_core::renderer::PipelineKind::Clip));
    assert_eq!(pixel(&target, 20, 20)?, Color::BLACK_TRANSPARENT);
    Ok(())
}

#[test]
fn collapsed_subpass_matches_drawing_inline() -> Result<()> {
    let draw = |pass: &mut EntityPass| {
        pass.add_entity(solid(Geometry::Rect(Rect::from_xywh(4.0, 4.0, 20.0, 20.0)), Color::RED.with_alpha(0.5), BlendMode::SourceOver));
        pass.add_entity(solid(Geometry::Rect(Rect::from_xywh(14.0, 14.0, 20.0, 20.0)), Color::BLUE.with_alpha(0.5), BlendMode::SourceOver));
    };

    let (context, renderer) = setup();
    let nested_target = context.create_onscreen_target(ISize::new(40, 40))?;
    let mut nested = EntityPass::new();
    let mut subpass = Box::new(EntityPass::new());
    draw(&mut subpass);
    nested.add_subpass(subpass);
    nested.render(&renderer, &nested_target)?;
    assert_eq!(context.render_passes().len(), 1, "a collapsed subpass needs no target of its own");

    let flat_target = context.create_onscreen_target(ISize::new(40, 40))?;
    let mut flat = EntityPass::new();
    draw(&mut flat);
    flat.render(&renderer, &flat_target)?;

    let nested_pixels = software_texture(&nested_target.render_target_texture())?.to_rgba8();
    let flat_pixels = software_texture(&flat_target.render_target_texture())?.to_rgba8();
    assert_eq!(nested_pixels, flat_pixels);
    Ok(())
}

#[test]
fn required_mip_count_reaches_the_allocator() -> Result<()> {
    let (context, renderer) = setup();
    let target = context.create_onscreen_target(ISize::new(64, 64))?;

    let mut pass = EntityPass::new();
    let mut subpass = offscreen_subpass(Rect::from_xywh(0.0, 0.0, 32.0, 32.0), Color::RED);
    subpass.set_required_mip_count(4);
    pass.add_subpass(subpass);
    pass.render(&renderer, &target)?;

    let allocations = context.allocator().allocations();
    assert!(allocations.iter().any(|desc| desc.mip_count == 4 && desc.size == ISize::new(32, 32)));
    let mip_blits = context
        .blit_passes()
        .into_iter()
        .flat_map(|blit| blit.commands)
        .filter(|command| matches!(command, BlitCommand::GenerateMipmap { .. }))
        .count();
    assert_eq!(mip_blits, 1);
    Ok(())
}

#[test]
fn backdrop_filter_reads_what_was_drawn_before() -> Result<()> {
    let (context, renderer) = setup();
    let target = context.create_onscreen_target(ISize::new(32, 32))?;

    let mut pass = EntityPass::new();
    pass.add_entity(solid(Geometry::Cover, Color::RED, BlendMode::Source));

    let mut subpass = Box::new(EntityPass::new());
    subpass.set_backdrop_filter(Arc::new(|input: FilterInput, _transform: Matrix| {
        Some(Arc::new(FilterContents::color_filter(
            input,
            ColorFilter::Blend { mode: BlendMode::SourceIn, color: Color::BLUE },
        )))
    }));
    subpass.add_entity(solid(Geometry::Rect(Rect::from_xywh(8.0, 8.0, 4.0, 4.0)), Color::GREEN, BlendMode::SourceOver));
    assert_eq!(subpass.clear_color(ISize::new(32, 32)), None);
    pass.add_subpass(subpass);
    pass.render(&renderer, &target)?;

    // Red backdrop tinted blue everywhere, with the subpass content on top.
    assert_close(pixel(&target, 0, 0)?, Color::BLUE);
    assert_close(pixel(&target, 20, 20)?, Color::BLUE);
    assert_eq!(pixel(&target, 9, 9)?, Color::GREEN);
    Ok(())
}

#[test]
fn advanced_blend_without_framebuffer_fetch_reads_the_pass() -> Result<()> {
    let (context, renderer) = setup();
    assert!(!renderer.capabilities().supports_framebuffer_fetch);
    let target = context.create_onscreen_target(ISize::new(50, 50))?;

    let mut pass = EntityPass::new();
    pass.add_entity(solid(Geometry::Cover, Color::new(1.0, 1.0, 0.0, 1.0), BlendMode::Source));
    pass.add_entity(solid(Geometry::Rect(Rect::from_xywh(10.0, 10.0, 30.0, 30.0)), Color::new(0.0, 1.0, 1.0, 1.0), BlendMode::Multiply));
    pass.render(&renderer, &target)?;

    assert_close(pixel(&target, 20, 20)?, Color::GREEN);
    assert_close(pixel(&target, 5, 5)?, Color::YELLOW);
    Ok(())
}

#[test]
fn framebuffer_fetch_draws_advanced_blends_in_place() -> Result<()> {
    let capabilities = strata_core::Capabilities {
        supports_framebuffer_fetch: true,
        ..strata_core::Capabilities::default()
    };
    let context = Arc::new(SoftwareContext::new().with_capabilities(capabilities));
    let renderer = ContentContext::new(context.clone());
    let target = context.create_onscreen_target(ISize::new(50, 50))?;

    let mut pass = EntityPass::new();
    pass.add_entity(solid(Geometry::Cover, Color::YELLOW, BlendMode::Source));
    pass.add_entity(solid(Geometry::Rect(Rect::from_xywh(10.0, 10.0, 30.0, 30.0)), Color::new(0.0, 1.0, 1.0, 1.0), BlendMode::Multiply));
    pass.render(&renderer, &target)?;

    assert_eq!(context.render_passes().iter().filter(|p| p.size == ISize::new(50, 50)).count(), 1);
    assert_close(pixel(&target, 20, 20)?, Color::GREEN);
    Ok(())
}

#[test]
fn offscreen_textures_are_reused_across_frames() -> Result<()> {
    let (context, renderer) = setup();
    let target = context.create_onscreen_target(ISize::new(64, 64))?;
    let mut pass = EntityPass::new();
    pass.add_subpass(offscreen_subpass(Rect::from_xywh(0.0, 0.0, 16.0, 16.0), Color::RED));

    pass.render(&renderer, &target)?;
    let after_first = context.allocator().allocations().len();
    let cached = renderer.render_target_cache().cached_texture_count();
    pass.render(&renderer, &target)?;

    assert_eq!(context.allocator().allocations().len(), after_first);
    assert_eq!(renderer.render_target_cache().cached_texture_count(), cached);
    Ok(())
}

#[test]
fn failed_allocation_aborts_the_render() -> Result<()> {
    let large = SoftwareContext::new();
    let target = large.create_onscreen_target(ISize::new(128, 128))?;

    let small = Arc::new(SoftwareContext::new().with_max_texture_size(ISize::new(64, 64)));
    let renderer = ContentContext::new(small.clone());
    let mut pass = EntityPass::new();
    pass.add_entity(solid(Geometry::Rect(Rect::from_xywh(0.0, 0.0, 8.0, 8.0)), Color::RED, BlendMode::SourceOver));

    let err = pass.render(&renderer, &target).unwrap_err();
    assert!(matches!(err, RenderError::Allocation { .. }), "{err}");
    Ok(())
}

fn rect_clip(rect: Rect) -> Entity {
    Entity::from_contents(Arc::new(ClipContents::new(Geometry::Rect(rect), ClipOperation::Intersect)))
}

#[test]
fn subpass_clear_color_is_judged_where_the_subpass_lands() -> Result<()> {
    let (context, renderer) = setup();
    let target = context.create_onscreen_target(ISize::new(100, 100))?;

    let mut pass = EntityPass::new();
    pass.push_clip(rect_clip(Rect::from_xywh(50.0, 50.0, 50.0, 50.0)));
    let mut subpass = Box::new(EntityPass::new());
    subpass.set_delegate(Arc::new(OffscreenDelegate));
    subpass.set_clip_depth(1);
    subpass.add_entity(solid(Geometry::Rect(Rect::from_xywh(0.0, 0.0, 50.0, 50.0)), Color::RED, BlendMode::Source));
    subpass.add_entity(solid(
        Geometry::Rect(Rect::from_xywh(50.0, 50.0, 50.0, 50.0)),
        Color::BLUE.with_alpha(0.5),
        BlendMode::SourceOver,
    ));
    pass.add_subpass(subpass);
    pass.pop_clips(1, 3);
    pass.render(&renderer, &target)?;

    let passes = context.render_passes();
    assert_eq!(passes[0].size, ISize::new(50, 50));
    assert_eq!(passes[0].clear_color, Color::BLACK_TRANSPARENT);
    assert_close(pixel(&target, 75, 75)?, Color::BLUE.with_alpha(0.5));
    assert_eq!(pixel(&target, 25, 25)?, Color::BLACK_TRANSPARENT);
    Ok(())
}

#[test]
fn leading_advanced_blend_reads_a_cleared_texture() -> Result<()> {
    let (context, renderer) = setup();
    let target = context.create_onscreen_target(ISize::new(64, 64))?;

    // Leaves blue behind in the cached offscreen root textures.
    let mut first = EntityPass::new();
    first.add_entity(solid(Geometry::Cover, Color::BLUE, BlendMode::Source));
    first.add_entity(solid(Geometry::Rect(Rect::from_xywh(0.0, 0.0, 8.0, 8.0)), Color::WHITE, BlendMode::Multiply));
    first.render(&renderer, &target)?;
    assert_close(pixel(&target, 40, 40)?, Color::BLUE);

    let mut second = EntityPass::new();
    second.add_entity(solid(Geometry::Rect(Rect::from_xywh(0.0, 0.0, 32.0, 32.0)), Color::RED, BlendMode::Multiply));
    second.render(&renderer, &target)?;

    assert_close(pixel(&target, 10, 10)?, Color::RED);
    Ok(())
}

#[test]
fn clips_are_replayed_after_the_pass_restarts() -> Result<()> {
    let (context, renderer) = setup();
    let target = context.create_onscreen_target(ISize::new(64, 32))?;

    let mut pass = EntityPass::new();
    pass.add_entity(solid(Geometry::Cover, Color::WHITE, BlendMode::Source));
    pass.push_clip(rect_clip(Rect::from_xywh(0.0, 0.0, 32.0, 32.0)));
    let mut multiply = solid(Geometry::Rect(Rect::from_xywh(0.0, 0.0, 64.0, 32.0)), Color::YELLOW, BlendMode::Multiply);
    multiply.set_clip_depth(1);
    pass.add_entity(multiply);
    let mut after = solid(Geometry::Rect(Rect::from_xywh(0.0, 0.0, 64.0, 32.0)), Color::RED, BlendMode::SourceOver);
    after.set_clip_depth(1);
    pass.add_entity(after);
    pass.pop_clips(1, 4);
    pass.render(&renderer, &target)?;

    let root_passes = context.render_passes().iter().filter(|p| p.size == ISize::new(64, 32)).count();
    assert!(root_passes >= 2, "the blend must split the root pass, got {root_passes}");
    assert_close(pixel(&target, 10, 10)?, Color::RED);
    assert_close(pixel(&target, 50, 10)?, Color::WHITE);
    Ok(())
}

#[test]
fn checkerboard_marks_offscreen_passes_only() -> Result<()> {
    let (context, renderer) = setup();
    let target = context.create_onscreen_target(ISize::new(64, 64))?;

    let mut pass = EntityPass::new();
    pass.set_enable_offscreen_checkerboard(true);
    let mut subpass = offscreen_subpass(Rect::from_xywh(10.0, 10.0, 20.0, 20.0), Color::GREEN);
    subpass.set_enable_offscreen_checkerboard(true);
    pass.add_subpass(subpass);
    pass.render(&renderer, &target)?;

    let has_checkerboard = |pass: &strata_core::backend::RecordedPass| {
        pass.commands.iter().any(|command| command.pipeline.kind == PipelineKind::Checkerboard)
    };
    let passes = context.render_passes();
    assert_eq!(passes.len(), 2);
    assert_eq!(passes[0].size, ISize::new(20, 20));
    assert_eq!(has_checkerboard(&passes[0]), cfg!(debug_assertions));
    assert!(!has_checkerboard(&passes[1]));
    Ok(())
}
