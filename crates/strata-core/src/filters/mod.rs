//! Filters that post-process rendered contents.
//!
//! A [`FilterContents`] is itself a [`Contents`]: it snapshots its inputs into
//! textures, runs one filter program over them into a fresh texture and draws
//! the result like any other textured entity.

use std::sync::Arc;

use crate::color::BlendMode;
use crate::content_context::ContentContext;
use crate::contents::{Contents, Snapshot};
use crate::entity::Entity;
use crate::error::Result;
use crate::formats::{PrimitiveType, SamplerAddressMode, SamplerDescriptor, TileMode};
use crate::geometry::{ISize, Matrix, Point, Rect};
use crate::renderer::{
    BlitPass, FragmentInfo, FrameInfo, PipelineKind, RenderPass, StencilMode, TextureRef,
    VertexBuffer,
};

mod color_filter;
mod image_filter;

pub use color_filter::ColorFilter;
pub use image_filter::ImageFilter;

/// Mip levels a blur wants on its input texture.
pub const BLUR_REQUIRED_MIP_COUNT: u32 = 4;

const SIGMA_EPSILON: f32 = 1e-3;

/// Kernel radius covering a gaussian of `sigma`.
pub fn sigma_to_radius(sigma: f32) -> f32 {
    (sigma - 0.5).max(0.0) * 1.732_050_8
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BlurStyle {
    #[default]
    Normal,
    /// Blurred outside, source inside.
    Solid,
    /// Blurred outside only.
    Outer,
    /// Blurred inside only.
    Inner,
}

/// Something a filter reads from.
#[derive(Clone, Debug)]
pub enum FilterInput {
    Contents(Arc<dyn Contents>),
    /// A texture placed by the entity transform followed by `local_transform`.
    Texture {
        texture: TextureRef,
        local_transform: Matrix,
    },
    Filter(Arc<FilterContents>),
    /// Coverage-only input, already in pass space.
    Rect(Rect),
}

impl FilterInput {
    pub fn texture(texture: TextureRef) -> Self {
        FilterInput::Texture { texture, local_transform: Matrix::identity() }
    }

    pub fn coverage(&self, entity: &Entity) -> Option<Rect> {
        match self {
            FilterInput::Contents(contents) => contents.coverage(entity),
            FilterInput::Texture { texture, local_transform } => Some(
                Rect::from_isize(texture.size())
                    .transform_bounds(&(*entity.transform() * *local_transform)),
            ),
            FilterInput::Filter(filter) => filter.coverage(entity),
            FilterInput::Rect(rect) => Some(*rect),
        }
    }

    /// Area of this input needed to produce `output_limit`.
    pub fn source_coverage(&self, effect_transform: &Matrix, output_limit: Rect) -> Option<Rect> {
        match self {
            FilterInput::Filter(filter) => filter.source_coverage(effect_transform, output_limit),
            _ => Some(output_limit),
        }
    }

    pub fn is_translation_only(&self) -> bool {
        match self {
            FilterInput::Filter(filter) => filter.is_translation_only(),
            _ => true,
        }
    }

    pub fn snapshot(
        &self,
        label: &str,
        renderer: &ContentContext,
        entity: &Entity,
        coverage_limit: Option<Rect>,
        mip_count: u32,
    ) -> Result<Option<Snapshot>> {
        match self {
            FilterInput::Contents(contents) => contents.render_to_snapshot(
                renderer,
                entity,
                coverage_limit,
                mip_count,
                &format!("Contents to {label} Filter Snapshot"),
            ),
            FilterInput::Texture { texture, local_transform } => Ok(Some(Snapshot::new(
                texture.clone(),
                *entity.transform() * *local_transform,
            ))),
            FilterInput::Filter(filter) => filter.render_to_snapshot(
                renderer,
                entity,
                coverage_limit,
                mip_count,
                &format!("Filter to {label} Filter Snapshot"),
            ),
            FilterInput::Rect(_) => Ok(None),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum FilterKind {
    GaussianBlur {
        sigma_x: f32,
        sigma_y: f32,
        style: BlurStyle,
        tile_mode: TileMode,
    },
    Matrix {
        matrix: Matrix,
        sampler: SamplerDescriptor,
    },
    Morphology {
        radius_x: f32,
        radius_y: f32,
        dilate: bool,
    },
    ColorFilter(ColorFilter),
    /// Advanced blend of the second input (source) onto the first (destination).
    Blend(BlendMode),
}

#[derive(Clone, Debug)]
pub struct FilterContents {
    kind: FilterKind,
    inputs: Vec<FilterInput>,
    effect_transform: Matrix,
    coverage_hint: Option<Rect>,
}

impl FilterContents {
    fn new(kind: FilterKind, inputs: Vec<FilterInput>) -> Self {
        Self { kind, inputs, effect_transform: Matrix::identity(), coverage_hint: None }
    }

    pub fn blur(input: FilterInput, sigma_x: f32, sigma_y: f32, style: BlurStyle, tile_mode: TileMode) -> Self {
        Self::new(FilterKind::GaussianBlur { sigma_x, sigma_y, style, tile_mode }, vec![input])
    }

    pub fn matrix(input: FilterInput, matrix: Matrix, sampler: SamplerDescriptor) -> Self {
        Self::new(FilterKind::Matrix { matrix, sampler }, vec![input])
    }

    pub fn morphology(input: FilterInput, radius_x: f32, radius_y: f32, dilate: bool) -> Self {
        Self::new(FilterKind::Morphology { radius_x, radius_y, dilate }, vec![input])
    }

    pub fn color_filter(input: FilterInput, filter: ColorFilter) -> Self {
        Self::new(FilterKind::ColorFilter(filter), vec![input])
    }

    /// `inputs[0]` is the destination, the rest are blended onto it in order.
    pub fn blend(mode: BlendMode, inputs: Vec<FilterInput>) -> Self {
        Self::new(FilterKind::Blend(mode), inputs)
    }

    /// The transform the filter parameters (sigma, radii, matrix) are expressed in.
    pub fn with_effect_transform(mut self, effect_transform: Matrix) -> Self {
        self.effect_transform = effect_transform;
        self
    }

    pub fn set_effect_transform(&mut self, effect_transform: Matrix) {
        self.effect_transform = effect_transform;
    }

    /// Limits rendering to the part of the output that will actually be used.
    pub fn set_coverage_hint(&mut self, hint: Option<Rect>) {
        self.coverage_hint = hint;
    }

    pub fn kind(&self) -> &FilterKind {
        &self.kind
    }

    pub fn inputs(&self) -> &[FilterInput] {
        &self.inputs
    }

    pub fn is_translation_only(&self) -> bool {
        let own = match &self.kind {
            FilterKind::Matrix { .. } => self.device_matrix().is_translation_only(),
            _ => true,
        };
        own && self.inputs.iter().all(FilterInput::is_translation_only)
    }

    pub fn required_mip_count(&self) -> u32 {
        let own = match self.kind {
            FilterKind::GaussianBlur { .. } => BLUR_REQUIRED_MIP_COUNT,
            _ => 1,
        };
        self.inputs
            .iter()
            .filter_map(|input| match input {
                FilterInput::Filter(filter) => Some(filter.required_mip_count()),
                _ => None,
            })
            .fold(own, u32::max)
    }

    /// Color filters that paint transparent pixels cover everything.
    fn is_unbounded(&self) -> bool {
        matches!(&self.kind, FilterKind::ColorFilter(filter) if filter.affects_transparent_black())
    }

    /// The matrix filter expressed in the space its input is rendered in.
    fn device_matrix(&self) -> Matrix {
        let FilterKind::Matrix { matrix, .. } = &self.kind else {
            return Matrix::identity();
        };
        match self.effect_transform.invert() {
            Some(inverse) => self.effect_transform * *matrix * inverse,
            None => *matrix,
        }
    }

    /// Radius of the kernel in pass space, rounded up to whole pixels.
    fn local_padding(&self, entity: &Entity, radius_x: f32, radius_y: f32) -> Point {
        let scaled = basis_vector(&self.effect_transform, Point::new(radius_x, radius_y));
        let padding = Point::new(scaled.x.ceil(), scaled.y.ceil());
        basis_vector(entity.transform(), padding)
    }

    fn scaled_sigma(&self, sigma_x: f32, sigma_y: f32) -> Point {
        basis_vector(&self.effect_transform, Point::new(sigma_x, sigma_y))
    }

    fn filter_coverage(&self, entity: &Entity) -> Option<Rect> {
        match &self.kind {
            FilterKind::GaussianBlur { sigma_x, sigma_y, .. } => {
                let coverage = self.inputs.first()?.coverage(entity)?;
                let sigma = self.scaled_sigma(*sigma_x, *sigma_y);
                let padding =
                    self.local_padding(entity, sigma_to_radius(sigma.x), sigma_to_radius(sigma.y));
                Some(coverage.expand_xy(padding.x, padding.y))
            }
            FilterKind::Morphology { radius_x, radius_y, dilate } => {
                let coverage = self.inputs.first()?.coverage(entity)?;
                let padding = self.local_padding(entity, *radius_x, *radius_y);
                if *dilate {
                    Some(coverage.expand_xy(padding.x, padding.y))
                } else {
                    let eroded = coverage.expand_xy(-padding.x, -padding.y);
                    (!eroded.is_empty()).then_some(eroded)
                }
            }
            FilterKind::Matrix { .. } => {
                let coverage = self.inputs.first()?.coverage(entity)?;
                Some(coverage.transform_bounds(&self.device_matrix()))
            }
            FilterKind::ColorFilter(_) => {
                if self.is_unbounded() {
                    return Some(Rect::maximum());
                }
                self.inputs.first()?.coverage(entity)
            }
            FilterKind::Blend(_) => self
                .inputs
                .iter()
                .fold(None, |acc, input| Rect::union_opt(acc, input.coverage(entity))),
        }
    }

    /// Input area needed to produce `output_limit` after this filter and
    /// every nested one.
    pub fn source_coverage(&self, effect_transform: &Matrix, output_limit: Rect) -> Option<Rect> {
        let own = match &self.kind {
            FilterKind::GaussianBlur { sigma_x, sigma_y, .. } => {
                let sigma = Point::new(*sigma_x, *sigma_y);
                let radius = Point::new(sigma_to_radius(sigma.x), sigma_to_radius(sigma.y));
                let radius = basis_vector(effect_transform, radius);
                output_limit.expand_xy(radius.x, radius.y)
            }
            FilterKind::Morphology { radius_x, radius_y, .. } => {
                let radius = basis_vector(effect_transform, Point::new(*radius_x, *radius_y));
                output_limit.expand_xy(radius.x, radius.y)
            }
            FilterKind::Matrix { .. } => {
                let inverse = self.device_matrix().invert()?;
                output_limit.transform_bounds(&inverse)
            }
            FilterKind::ColorFilter(_) | FilterKind::Blend(_) => output_limit,
        };
        let mut inputs_coverage: Option<Rect> = None;
        for input in &self.inputs {
            let coverage = input.source_coverage(effect_transform, own)?;
            inputs_coverage = Rect::union_opt(inputs_coverage, Some(coverage));
        }
        inputs_coverage
    }

    fn render_filter(
        &self,
        renderer: &ContentContext,
        entity: &Entity,
        coverage_limit: Option<Rect>,
        mip_count: u32,
        label: &str,
    ) -> Result<Option<Snapshot>> {
        let coverage_limit = Rect::intersection_opt(coverage_limit, self.coverage_hint);
        match &self.kind {
            FilterKind::GaussianBlur { sigma_x, sigma_y, style, tile_mode } => self.render_blur(
                renderer,
                entity,
                coverage_limit,
                mip_count,
                (*sigma_x, *sigma_y),
                *style,
                *tile_mode,
            ),
            FilterKind::Morphology { radius_x, radius_y, dilate } => {
                let Some(input) = self.inputs.first() else {
                    return Ok(None);
                };
                let padding = self.local_padding(entity, *radius_x, *radius_y);
                let input_limit = coverage_limit.map(|limit| limit.expand_xy(padding.x, padding.y));
                let Some(snapshot) = input.snapshot("Morphology", renderer, entity, input_limit, 1)? else {
                    return Ok(None);
                };
                let Some(coverage) = self.coverage(entity) else {
                    return Ok(None);
                };
                let Some(coverage) = Rect::intersection_opt(Some(coverage), coverage_limit) else {
                    return Ok(None);
                };
                let Some(texture_transform) = snapshot.transform.invert() else {
                    return Ok(None);
                };
                let fragment_info = FragmentInfo::Morphology {
                    radius: padding,
                    dilate: *dilate,
                    texture_transform,
                };
                render_output(
                    renderer,
                    label,
                    coverage,
                    mip_count,
                    &snapshot,
                    PipelineKind::Morphology,
                    fragment_info,
                )
            }
            FilterKind::Matrix { sampler, .. } => {
                let Some(input) = self.inputs.first() else {
                    return Ok(None);
                };
                let device = self.device_matrix();
                let input_limit = match (coverage_limit, device.invert()) {
                    (Some(limit), Some(inverse)) => Some(limit.transform_bounds(&inverse)),
                    (limit, _) => limit,
                };
                let Some(mut snapshot) = input.snapshot("Matrix", renderer, entity, input_limit, mip_count)? else {
                    return Ok(None);
                };
                snapshot.transform = device * snapshot.transform;
                snapshot.sampler = *sampler;
                Ok(Some(snapshot))
            }
            FilterKind::ColorFilter(filter) => {
                let Some(input) = self.inputs.first() else {
                    return Ok(None);
                };
                let Some(snapshot) = input.snapshot("Color Filter", renderer, entity, coverage_limit, 1)? else {
                    return Ok(None);
                };
                let coverage = if self.is_unbounded() {
                    coverage_limit.unwrap_or_else(|| snapshot.coverage())
                } else {
                    match Rect::intersection_opt(Some(snapshot.coverage()), coverage_limit) {
                        Some(coverage) => coverage,
                        None => return Ok(None),
                    }
                };
                let Some(texture_transform) = snapshot.transform.invert() else {
                    return Ok(None);
                };
                let fragment_info = FragmentInfo::ColorFilter {
                    filter: filter.clone(),
                    alpha: snapshot.opacity,
                    texture_transform,
                };
                let mut output = render_output(
                    renderer,
                    label,
                    coverage,
                    mip_count,
                    &snapshot,
                    PipelineKind::ColorFilter,
                    fragment_info,
                )?;
                // Opacity was consumed by the filter program.
                if let Some(output) = &mut output {
                    output.opacity = 1.0;
                }
                Ok(output)
            }
            FilterKind::Blend(mode) => self.render_blend(renderer, entity, coverage_limit, mip_count, *mode, label),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn render_blur(
        &self,
        renderer: &ContentContext,
        entity: &Entity,
        coverage_limit: Option<Rect>,
        mip_count: u32,
        (sigma_x, sigma_y): (f32, f32),
        style: BlurStyle,
        tile_mode: TileMode,
    ) -> Result<Option<Snapshot>> {
        let Some(input) = self.inputs.first() else {
            return Ok(None);
        };
        let sigma = self.scaled_sigma(sigma_x, sigma_y);
        let padding = self.local_padding(entity, sigma_to_radius(sigma.x), sigma_to_radius(sigma.y));
        let input_limit = coverage_limit.map(|limit| limit.expand_xy(padding.x, padding.y));

        let required_mips = if renderer.capabilities().supports_mipmap_generation {
            BLUR_REQUIRED_MIP_COUNT
        } else {
            1
        };
        let Some(snapshot) = input.snapshot("Gaussian Blur", renderer, entity, input_limit, required_mips)? else {
            return Ok(None);
        };
        let input_mips = snapshot.texture.descriptor().mip_count;
        if input_mips < required_mips {
            tracing::error!(input_mips, required_mips, "applying gaussian blur without mipmaps");
        }
        if sigma.x < SIGMA_EPSILON && sigma.y < SIGMA_EPSILON {
            return Ok(Some(snapshot));
        }

        // Textures handed in directly have never had their mips filled in.
        if input_mips > 1
            && renderer.capabilities().supports_mipmap_generation
            && matches!(input, FilterInput::Texture { .. })
        {
            let mut blit = BlitPass::new("Gaussian Blur Input Mipmaps");
            blit.generate_mipmap(snapshot.texture.clone());
            let mut command_buffer = renderer.context().create_command_buffer();
            command_buffer.set_label("Gaussian Blur Input Mipmaps");
            command_buffer.encode_blit_pass(blit)?;
            command_buffer.submit()?;
        }

        let coverage = snapshot.coverage().expand_xy(padding.x, padding.y);
        let Some(coverage) = Rect::intersection_opt(Some(coverage), coverage_limit) else {
            return Ok(None);
        };
        let Some(texture_transform) = snapshot.transform.invert() else {
            return Ok(None);
        };
        let fragment_info = FragmentInfo::Blur {
            sigma: basis_vector(entity.transform(), sigma),
            style,
            tile_mode,
            texture_transform,
        };
        render_output(
            renderer,
            "Gaussian Blur Filter",
            coverage,
            mip_count,
            &snapshot,
            PipelineKind::GaussianBlur,
            fragment_info,
        )
    }

    fn render_blend(
        &self,
        renderer: &ContentContext,
        entity: &Entity,
        coverage_limit: Option<Rect>,
        mip_count: u32,
        mode: BlendMode,
        label: &str,
    ) -> Result<Option<Snapshot>> {
        let mut snapshots = Vec::with_capacity(self.inputs.len());
        for input in &self.inputs {
            if let Some(snapshot) = input.snapshot("Blend", renderer, entity, coverage_limit, 1)? {
                snapshots.push(snapshot);
            }
        }
        let coverage = snapshots
            .iter()
            .fold(None, |acc, snapshot| Rect::union_opt(acc, Some(snapshot.coverage())));
        let Some(coverage) = Rect::intersection_opt(coverage, coverage_limit) else {
            return Ok(None);
        };
        let coverage = coverage.round_out();
        let size = ISize::new(coverage.width() as i64, coverage.height() as i64);
        if size.is_empty() {
            return Ok(None);
        }
        let to_target = Matrix::translation(-coverage.origin());

        let texture = renderer.make_subpass(label, size, mip_count, |renderer, pass| {
            for (index, snapshot) in snapshots.iter().enumerate() {
                let mut options = renderer.options_from_pass(PipelineKind::Texture, pass);
                options.stencil_mode = StencilMode::Ignore;
                options.blend_mode = if index == 0 { BlendMode::Source } else { mode };
                let mut placed = snapshot.clone();
                placed.transform = to_target * snapshot.transform;
                placed.draw(
                    pass,
                    if index == 0 { "Blend Filter Destination" } else { "Blend Filter Source" },
                    options,
                    0,
                    0.0,
                    FragmentInfo::Texture {
                        alpha: snapshot.opacity,
                        texture_transform: Matrix::identity(),
                        sampler: snapshot.sampler,
                    },
                )?;
            }
            Ok(())
        })?;
        Ok(Some(Snapshot::new(texture, Matrix::translation(coverage.origin()))))
    }
}

/// Runs a single-input filter program over `coverage` (pass space) into a new texture.
fn render_output(
    renderer: &ContentContext,
    label: &str,
    coverage: Rect,
    mip_count: u32,
    input: &Snapshot,
    kind: PipelineKind,
    fragment_info: FragmentInfo,
) -> Result<Option<Snapshot>> {
    if coverage.is_maximum() {
        tracing::warn!(label, "filter output is unbounded and has no coverage limit");
        return Ok(None);
    }
    let coverage = coverage.round_out();
    let size = ISize::new(coverage.width() as i64, coverage.height() as i64);
    if size.is_empty() {
        return Ok(None);
    }
    let texture = renderer.make_subpass(label, size, mip_count, |renderer, pass| {
        let mut options = renderer.options_from_pass(kind, pass);
        options.blend_mode = BlendMode::Source;
        options.stencil_mode = StencilMode::Ignore;
        options.primitive_type = PrimitiveType::TriangleStrip;
        pass.set_command_label(label);
        pass.set_pipeline(options);
        pass.set_vertex_buffer(VertexBuffer::from_rect_strip(coverage.points()));
        pass.bind_frame_info(FrameInfo { mvp: Matrix::translation(-coverage.origin()), depth: 0.0 });
        pass.bind_fragment_info(fragment_info);
        pass.bind_texture(input.texture.clone());
        pass.draw()
    })?;
    let mut output = Snapshot::new(texture, Matrix::translation(coverage.origin()));
    output.sampler = SamplerDescriptor::linear().with_address_mode(SamplerAddressMode::ClampToEdge);
    output.opacity = input.opacity;
    Ok(Some(output))
}

/// `v` mapped through the basis of `m`, made non-negative.
fn basis_vector(m: &Matrix, v: Point) -> Point {
    let p = m.basis().transform_point(v);
    Point::new(p.x.abs(), p.y.abs())
}

impl Contents for FilterContents {
    fn coverage(&self, entity: &Entity) -> Option<Rect> {
        self.filter_coverage(entity)
    }

    fn render(&self, renderer: &ContentContext, entity: &Entity, pass: &mut RenderPass) -> Result<()> {
        let limit = Rect::from_isize(pass.render_target_size());
        let Some(snapshot) = self.render_to_snapshot(renderer, entity, Some(limit), 1, "Filter")? else {
            return Ok(());
        };
        let options = renderer.options_from_pass_and_entity(PipelineKind::Texture, pass, entity);
        snapshot.draw(
            pass,
            "Filter Output",
            options,
            entity.clip_depth(),
            entity.shader_clip_depth(),
            FragmentInfo::Texture {
                alpha: snapshot.opacity,
                texture_transform: Matrix::identity(),
                sampler: snapshot.sampler,
            },
        )
    }

    fn as_filter(&self) -> Option<&FilterContents> {
        Some(self)
    }

    fn render_to_snapshot(
        &self,
        renderer: &ContentContext,
        entity: &Entity,
        coverage_limit: Option<Rect>,
        mip_count: u32,
        label: &str,
    ) -> Result<Option<Snapshot>> {
        let _span = tracing::trace_span!("filter", label).entered();
        self.render_filter(renderer, entity, coverage_limit, mip_count, label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Color;
    use crate::contents::SolidColorContents;
    use crate::shape::Geometry;

    fn rect_input(rect: Rect) -> FilterInput {
        FilterInput::Contents(Arc::new(SolidColorContents::new(Geometry::Rect(rect), Color::RED)))
    }

    #[test]
    fn radius_grows_with_sigma() {
        assert_eq!(sigma_to_radius(0.5), 0.0);
        assert!((sigma_to_radius(10.5) - 17.320_508).abs() < 1e-3);
    }

    #[test]
    fn blur_expands_coverage() {
        let filter = FilterContents::blur(
            rect_input(Rect::from_xywh(10.0, 10.0, 10.0, 10.0)),
            5.0,
            5.0,
            BlurStyle::Normal,
            TileMode::Decal,
        );
        let padding = sigma_to_radius(5.0).ceil();
        assert_eq!(
            filter.coverage(&Entity::new()),
            Some(Rect::from_ltrb(10.0 - padding, 10.0 - padding, 20.0 + padding, 20.0 + padding))
        );
        assert_eq!(filter.required_mip_count(), BLUR_REQUIRED_MIP_COUNT);
        assert!(filter.is_translation_only());
    }

    #[test]
    fn unbounded_color_filter_covers_everything() {
        let filter = FilterContents::color_filter(
            rect_input(Rect::from_xywh(0.0, 0.0, 10.0, 10.0)),
            ColorFilter::Blend { mode: BlendMode::SourceOver, color: Color::BLUE },
        );
        assert_eq!(filter.coverage(&Entity::new()), Some(Rect::maximum()));
    }

    #[test]
    fn matrix_source_coverage_inverts_the_matrix() {
        let filter = FilterContents::matrix(
            FilterInput::Rect(Rect::from_xywh(0.0, 0.0, 10.0, 10.0)),
            Matrix::scale(2.0, 2.0),
            SamplerDescriptor::default(),
        );
        assert!(!filter.is_translation_only());
        assert_eq!(
            filter.source_coverage(&Matrix::identity(), Rect::from_xywh(0.0, 0.0, 100.0, 100.0)),
            Some(Rect::from_xywh(0.0, 0.0, 50.0, 50.0))
        );
    }

    #[test]
    fn rect_input_ignores_entity_transform() {
        let input = FilterInput::Rect(Rect::from_xywh(0.0, 0.0, 5.0, 5.0));
        let mut entity = Entity::new();
        entity.set_transform(Matrix::translation(Point::new(100.0, 100.0)));
        assert_eq!(input.coverage(&entity), Some(Rect::from_xywh(0.0, 0.0, 5.0, 5.0)));
    }

    #[test]
    fn erode_can_consume_the_whole_input() {
        let filter = FilterContents::morphology(
            FilterInput::Rect(Rect::from_xywh(0.0, 0.0, 4.0, 4.0)),
            3.0,
            3.0,
            false,
        );
        assert_eq!(filter.coverage(&Entity::new()), None);
    }
}
