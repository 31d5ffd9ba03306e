use std::sync::Arc;

use anyhow::Result;
use strata_canvas::{Canvas, ColorSource, Paint};
use strata_core::backend::SoftwareContext;
use strata_core::backend::software::software_texture;
use strata_core::contents::ClipOperation;
use strata_core::{BlendMode, Color, ContentContext, ISize, ImageFilter, Point, Rect, RenderTarget, TileMode};

fn setup() -> (Arc<SoftwareContext>, ContentContext) {
    let context = Arc::new(SoftwareContext::new());
    let renderer = ContentContext::new(context.clone());
    (context, renderer)
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

fn render(canvas: &mut Canvas, size: ISize) -> Result<RenderTarget> {
    let (context, renderer) = setup();
    let target = context.create_onscreen_target(size)?;
    canvas.end_recording_as_picture().render(&renderer, &target)?;
    Ok(target)
}

#[test]
fn draw_paint_fills_the_target() -> Result<()> {
    let mut canvas = Canvas::new();
    canvas.draw_paint(&Paint::with_color(Color::RED));
    canvas.draw_rect(Rect::from_xywh(20.0, 20.0, 20.0, 20.0), &Paint::with_color(Color::BLUE));

    let target = render(&mut canvas, ISize::new(64, 64))?;
    assert_close(pixel(&target, 2, 2)?, Color::RED);
    assert_close(pixel(&target, 30, 30)?, Color::BLUE);
    Ok(())
}

#[test]
fn clips_end_at_restore() -> Result<()> {
    let mut canvas = Canvas::new();
    canvas.save();
    canvas.clip_rect(Rect::from_xywh(0.0, 0.0, 32.0, 64.0), ClipOperation::Intersect);
    canvas.draw_rect(Rect::from_xywh(0.0, 0.0, 64.0, 32.0), &Paint::with_color(Color::GREEN));
    canvas.restore();
    canvas.draw_rect(Rect::from_xywh(0.0, 32.0, 64.0, 32.0), &Paint::with_color(Color::BLUE));

    let target = render(&mut canvas, ISize::new(64, 64))?;
    assert_close(pixel(&target, 10, 10)?, Color::GREEN);
    assert_close(pixel(&target, 50, 10)?, Color::BLACK_TRANSPARENT);
    assert_close(pixel(&target, 50, 50)?, Color::BLUE);
    Ok(())
}

#[test]
fn difference_clip_cuts_a_hole() -> Result<()> {
    let mut canvas = Canvas::new();
    canvas.clip_rect(Rect::from_xywh(16.0, 16.0, 32.0, 32.0), ClipOperation::Difference);
    canvas.draw_rect(Rect::from_xywh(0.0, 0.0, 64.0, 64.0), &Paint::with_color(Color::RED));

    let target = render(&mut canvas, ISize::new(64, 64))?;
    assert_close(pixel(&target, 4, 4)?, Color::RED);
    assert_close(pixel(&target, 32, 32)?, Color::BLACK_TRANSPARENT);
    Ok(())
}

#[test]
fn collapsed_layer_matches_direct_translucent_draws() -> Result<()> {
    let left = Rect::from_xywh(0.0, 0.0, 20.0, 20.0);
    let right = Rect::from_xywh(40.0, 0.0, 20.0, 20.0);

    let mut layered = Canvas::new();
    layered.save_layer(&Paint::with_color(Color::WHITE.with_alpha(0.5)), None, None);
    layered.draw_rect(left, &Paint::with_color(Color::RED));
    layered.draw_rect(right, &Paint::with_color(Color::BLUE));
    layered.restore();

    let mut direct = Canvas::new();
    direct.draw_rect(left, &Paint::with_color(Color::RED.with_alpha(0.5)));
    direct.draw_rect(right, &Paint::with_color(Color::BLUE.with_alpha(0.5)));

    let layered = render(&mut layered, ISize::new(64, 32))?;
    let direct = render(&mut direct, ISize::new(64, 32))?;
    for (x, y) in [(10, 10), (50, 10), (30, 10)] {
        assert_close(pixel(&layered, x, y)?, pixel(&direct, x, y)?);
    }
    Ok(())
}

#[test]
fn overlapping_translucent_layer_is_flattened_first() -> Result<()> {
    let mut canvas = Canvas::new();
    canvas.save_layer(&Paint::with_color(Color::WHITE.with_alpha(0.5)), None, None);
    canvas.draw_rect(Rect::from_xywh(0.0, 0.0, 40.0, 32.0), &Paint::with_color(Color::RED));
    canvas.draw_rect(Rect::from_xywh(20.0, 0.0, 44.0, 32.0), &Paint::with_color(Color::BLUE));
    canvas.restore();

    let (context, renderer) = setup();
    let target = context.create_onscreen_target(ISize::new(64, 32))?;
    let picture = canvas.end_recording_as_picture();
    assert_eq!(picture.pass().subpasses_depth(), 2);
    picture.render(&renderer, &target)?;

    // Only the top draw shows through the overlap.
    let overlap = pixel(&target, 30, 16)?;
    assert_close(overlap, pixel(&target, 50, 16)?);
    assert!(overlap.red < 1.0 / 255.0);
    Ok(())
}

#[test]
fn layer_blend_mode_applies_to_the_flattened_layer() -> Result<()> {
    let mut canvas = Canvas::new();
    canvas.draw_paint(&Paint::with_color(Color::WHITE));
    let multiply = Paint { blend_mode: BlendMode::Multiply, ..Paint::default() };
    canvas.save_layer(&multiply, None, None);
    canvas.draw_rect(Rect::from_xywh(0.0, 0.0, 32.0, 32.0), &Paint::with_color(Color::RED));
    canvas.restore();

    let target = render(&mut canvas, ISize::new(64, 32))?;
    assert_close(pixel(&target, 10, 10)?, Color::RED);
    assert_close(pixel(&target, 50, 10)?, Color::WHITE);
    Ok(())
}

#[test]
fn gradient_paint_spans_its_endpoints() -> Result<()> {
    let paint = Paint {
        color_source: ColorSource::LinearGradient {
            start: Point::new(0.0, 0.0),
            end: Point::new(64.0, 0.0),
            colors: vec![Color::RED, Color::BLUE],
            stops: vec![0.0, 1.0],
            tile_mode: TileMode::Clamp,
        },
        ..Paint::default()
    };
    let mut canvas = Canvas::new();
    canvas.draw_rect(Rect::from_xywh(0.0, 0.0, 64.0, 8.0), &paint);

    let target = render(&mut canvas, ISize::new(64, 8))?;
    let start = pixel(&target, 0, 4)?;
    let end = pixel(&target, 63, 4)?;
    assert!(start.red > start.blue);
    assert!(end.blue > end.red);
    Ok(())
}

#[test]
fn backdrop_blur_renders_into_a_mipmapped_parent() -> Result<()> {
    let mut canvas = Canvas::new();
    canvas.draw_rect(Rect::from_xywh(0.0, 0.0, 32.0, 64.0), &Paint::with_color(Color::RED));
    canvas.save_layer(&Paint::default(), None, Some(ImageFilter::blur(3.0, 3.0)));
    canvas.restore();

    let picture = canvas.end_recording_as_picture();
    assert_eq!(picture.pass().required_mip_count(), 4);

    let (_context, renderer) = setup();
    let image = picture.to_image(&renderer, ISize::new(64, 64))?;
    assert_eq!(image.size(), ISize::new(64, 64));
    // Red bleeds across the edge once blurred.
    let edge = pixel(&image, 33, 32)?;
    assert!(edge.alpha > 0.0);
    assert!(edge.alpha < 1.0);
    Ok(())
}

#[test]
fn picture_bounds_cover_every_draw() {
    let mut canvas = Canvas::new();
    canvas.translate(10.0, 10.0);
    canvas.draw_rect(Rect::from_xywh(0.0, 0.0, 10.0, 10.0), &Paint::default());
    canvas.draw_circle(Point::new(40.0, 40.0), 5.0, &Paint::default());

    let picture = canvas.end_recording_as_picture();
    assert_eq!(picture.bounds(), Some(Rect::from_ltrb(10.0, 10.0, 55.0, 55.0)));
    assert_eq!(Canvas::new().end_recording_as_picture().bounds(), None);
}
