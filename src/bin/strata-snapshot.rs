//! Records a demonstration scene and writes it to a PNG.
//!
//! Settings come from `strata.toml` and `STRATA_*` variables; see
//! `strata-config`. Set `RUST_LOG=debug` to follow pass rendering.

use std::f32::consts::FRAC_PI_8;
use std::sync::Arc;

use anyhow::{Context as _, Result, bail};
use strata::backend::software::software_texture;
use strata::backend::{SoftwareContext, WgpuContext};
use strata::contents::ClipOperation;
use strata::{
    BackendKind, BlendMode, Canvas, Capabilities, Color, ColorSource, ContentContext, DebugOptions, ISize,
    ImageFilter, Paint, Picture, Point, Rect, RoundingRadii, StrataConfig, TileMode,
};

fn main() -> Result<()> {
    env_logger::init();

    let config = StrataConfig::load();
    log::debug!("configuration: {config:?}");

    let (width, height) = (config.snapshot.width, config.snapshot.height);
    if width == 0 || height == 0 {
        bail!("snapshot size must be positive, got {width}x{height}");
    }
    let size = ISize::new(width.into(), height.into());

    let picture = record_scene(&config, width as f32, height as f32);
    log::info!(
        "recorded {} element(s) in {} pass level(s)",
        picture.pass().element_count(),
        picture.pass().subpasses_depth()
    );

    let pixels = match config.rendering.backend {
        BackendKind::Software => render_software(&config, &picture, size)?,
        BackendKind::Wgpu => render_wgpu(&config, &picture, size)?,
    };

    let image = image::RgbaImage::from_raw(width, height, pixels)
        .context("rendered pixel buffer does not match the snapshot size")?;
    image
        .save(&config.snapshot.output)
        .with_context(|| format!("failed to write {}", config.snapshot.output.display()))?;
    log::info!("wrote {}", config.snapshot.output.display());
    Ok(())
}

fn render_software(config: &StrataConfig, picture: &Picture, size: ISize) -> Result<Vec<u8>> {
    let capabilities = Capabilities {
        supports_framebuffer_fetch: config.rendering.framebuffer_fetch,
        supports_texture_to_texture_blits: config.rendering.texture_blits,
        supports_mipmap_generation: config.rendering.mipmap_generation,
        ..Capabilities::default()
    };
    let mut context = SoftwareContext::new().with_capabilities(capabilities);
    if let Some(max) = config.rendering.max_texture_size {
        context = context.with_max_texture_size(ISize::new(max.into(), max.into()));
    }
    let context = Arc::new(context);
    let renderer = ContentContext::new(context.clone());

    let target = context.create_onscreen_target(size)?;
    picture.render(&renderer, &target)?;
    log::debug!("software backend encoded {} render pass(es)", context.render_passes().len());

    let texture = target.render_target_texture();
    Ok(software_texture(&texture)?.to_rgba8())
}

fn render_wgpu(config: &StrataConfig, picture: &Picture, size: ISize) -> Result<Vec<u8>> {
    if config.rendering.framebuffer_fetch || config.rendering.max_texture_size.is_some() {
        log::warn!("the wgpu backend reports its own capabilities; ignoring rendering overrides");
    }
    let context = Arc::new(WgpuContext::headless()?);
    let renderer = ContentContext::new(context.clone());

    let target = context.create_onscreen_target(size)?;
    picture.render(&renderer, &target)?;
    Ok(context.read_rgba8(&target.render_target_texture())?)
}

/// Clips, translucent layers, a blurred backdrop and an advanced blend.
fn record_scene(config: &StrataConfig, width: f32, height: f32) -> Picture {
    let mut canvas = Canvas::with_cull_rect(Some(Rect::from_xywh(0.0, 0.0, width, height)));
    canvas.set_debug_options(DebugOptions {
        offscreen_texture_checkerboard: config.debug.offscreen_checkerboard,
    });
    let unit = width.min(height) / 8.0;

    canvas.draw_paint(&Paint::with_color(Color::rgba8(0xf4, 0xf1, 0xea, 0xff)));
    let stripes = Paint {
        color_source: ColorSource::LinearGradient {
            start: Point::new(0.0, 0.0),
            end: Point::new(unit, unit),
            colors: vec![Color::CORNFLOWER_BLUE, Color::YELLOW],
            stops: vec![0.0, 1.0],
            tile_mode: TileMode::Mirror,
        },
        ..Paint::default()
    };
    canvas.draw_rect(Rect::from_xywh(0.0, 0.0, width, height / 2.0), &stripes);

    // Rounded window with two overlapping discs, faded as one layer.
    canvas.save();
    let window = Rect::from_xywh(unit, unit, unit * 4.0, unit * 4.0);
    canvas.clip_rrect(window, RoundingRadii::uniform(unit * 0.5), ClipOperation::Intersect);
    canvas.save_layer(&Paint::with_color(Color::WHITE.with_alpha(0.6)), None, None);
    canvas.draw_circle(Point::new(unit * 2.5, unit * 2.5), unit * 1.5, &Paint::with_color(Color::RED));
    canvas.draw_circle(Point::new(unit * 3.5, unit * 3.5), unit * 1.5, &Paint::with_color(Color::GREEN));
    canvas.restore();
    canvas.restore();

    // Frosted panel over the top right.
    canvas.save();
    let panel = Rect::from_xywh(unit * 4.5, unit * 0.5, unit * 3.0, unit * 3.0);
    canvas.clip_rrect(panel, RoundingRadii::uniform(unit * 0.25), ClipOperation::Intersect);
    canvas.save_layer(&Paint::default(), Some(panel), Some(ImageFilter::blur(unit * 0.3, unit * 0.3)));
    canvas.draw_paint(&Paint::with_color(Color::WHITE.with_alpha(0.3)));
    canvas.restore();
    canvas.restore();

    // Multiplied, rotated square with a hole through it.
    canvas.save();
    canvas.translate(unit * 5.5, unit * 5.5);
    canvas.rotate(FRAC_PI_8);
    let square = Rect::from_xywh(-unit * 1.5, -unit * 1.5, unit * 3.0, unit * 3.0);
    canvas.clip_oval(square.expand(-unit), ClipOperation::Difference);
    let multiply = Paint { blend_mode: BlendMode::Multiply, ..Paint::default() };
    canvas.save_layer(&multiply, None, None);
    canvas.draw_rect(square, &Paint::with_color(Color::from_hsb(0.78, 0.6, 0.9, 1.0)));
    canvas.restore();
    canvas.restore();

    canvas.end_recording_as_picture()
}
