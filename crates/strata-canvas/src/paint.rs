use std::sync::Arc;

use strata_core::contents::{LinearGradientContents, SolidColorContents};
use strata_core::{
    BlendMode, Color, ColorFilter, ColorMatrix, Contents, FilterInput, Geometry, ImageFilter,
    Matrix, Point, TileMode,
};

/// Where the colors of a draw come from.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum ColorSource {
    /// The paint color.
    #[default]
    Color,
    LinearGradient {
        start: Point,
        end: Point,
        colors: Vec<Color>,
        stops: Vec<f32>,
        tile_mode: TileMode,
    },
}

/// Describes how a draw or a layer is colored, filtered and blended.
#[derive(Clone, Debug, PartialEq)]
pub struct Paint {
    /// Solid color, and the opacity of gradients, images and layers.
    pub color: Color,
    pub color_source: ColorSource,
    pub blend_mode: BlendMode,
    pub color_filter: Option<ColorFilter>,
    pub image_filter: Option<ImageFilter>,
}

impl Default for Paint {
    fn default() -> Self {
        Self {
            color: Color::BLACK,
            color_source: ColorSource::Color,
            blend_mode: BlendMode::SourceOver,
            color_filter: None,
            image_filter: None,
        }
    }
}

impl Paint {
    pub fn with_color(color: Color) -> Self {
        Self { color, ..Self::default() }
    }

    pub fn has_color_filter(&self) -> bool {
        self.color_filter.is_some()
    }

    /// Contents filling `geometry` with this paint, filters included. Color
    /// filters are folded into the source colors when the contents allow it.
    pub fn create_contents_for_geometry(&self, geometry: Geometry) -> Arc<dyn Contents> {
        let mut needs_color_filter = self.color_filter.is_some();
        let contents: Arc<dyn Contents> = match &self.color_source {
            ColorSource::Color => {
                let mut contents = SolidColorContents::new(geometry, self.color);
                if let Some(filter) = &self.color_filter {
                    needs_color_filter = !contents.apply_color_filter(&filter.cpu_proc());
                }
                Arc::new(contents)
            }
            ColorSource::LinearGradient { start, end, colors, stops, tile_mode } => {
                let mut contents = LinearGradientContents::new(
                    geometry,
                    *start,
                    *end,
                    colors.clone(),
                    stops.clone(),
                    *tile_mode,
                );
                if let Some(filter) = &self.color_filter {
                    needs_color_filter = !contents.apply_color_filter(&filter.cpu_proc());
                }
                let contents: Arc<dyn Contents> = Arc::new(contents);
                if self.color.alpha < 1.0 {
                    contents.with_inherited_opacity(self.color.alpha).unwrap_or(contents)
                } else {
                    contents
                }
            }
        };

        let contents = if needs_color_filter { self.with_color_filter(contents) } else { contents };
        self.with_image_filter(contents, Matrix::identity())
    }

    /// Wraps already colored contents, such as images, with both filters.
    /// With a color filter present the contents must be drawn at full
    /// opacity; the paint alpha is applied after the filter.
    pub fn with_filters(&self, contents: Arc<dyn Contents>) -> Arc<dyn Contents> {
        let contents = self.with_color_filter(contents);
        self.with_image_filter(contents, Matrix::identity())
    }

    /// Filters for the flattened texture of a layer. The image filter runs in
    /// the layer's space, then the color filter.
    pub fn with_filters_for_subpass_target(
        &self,
        contents: Arc<dyn Contents>,
        effect_transform: Matrix,
    ) -> Arc<dyn Contents> {
        let contents = self.with_image_filter(contents, effect_transform);
        self.with_color_filter(contents)
    }

    fn with_image_filter(&self, contents: Arc<dyn Contents>, effect_transform: Matrix) -> Arc<dyn Contents> {
        let Some(filter) = &self.image_filter else {
            return contents;
        };
        filter.wrap_input(FilterInput::Contents(contents), effect_transform)
    }

    /// Runs the color filter on the GPU, then applies the paint opacity the
    /// wrapped contents were drawn without.
    fn with_color_filter(&self, contents: Arc<dyn Contents>) -> Arc<dyn Contents> {
        let Some(filter) = &self.color_filter else {
            return contents;
        };
        let filtered: Arc<dyn Contents> = filter.wrap_input(FilterInput::Contents(contents));
        if self.color.alpha >= 1.0 || !matches!(self.color_source, ColorSource::Color) {
            return filtered;
        }
        ColorFilter::Matrix(opacity_matrix(self.color.alpha)).wrap_input(FilterInput::Contents(filtered))
    }
}

/// Scales alpha and leaves the color channels alone.
fn opacity_matrix(alpha: f32) -> ColorMatrix {
    let mut matrix = ColorMatrix::IDENTITY;
    matrix.array[18] = alpha;
    matrix
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::{Entity, Rect};

    fn rect() -> Geometry {
        Geometry::Rect(Rect::from_xywh(0.0, 0.0, 10.0, 10.0))
    }

    #[test]
    fn solid_color_absorbs_the_color_filter() {
        let paint = Paint {
            color: Color::RED,
            color_filter: Some(ColorFilter::Blend { mode: BlendMode::Source, color: Color::BLUE }),
            ..Paint::default()
        };
        let contents = paint.create_contents_for_geometry(rect());
        assert!(contents.as_filter().is_none());
        assert!(contents.is_opaque());
    }

    #[test]
    fn image_filter_wraps_the_contents() {
        let paint = Paint { image_filter: Some(ImageFilter::blur(2.0, 2.0)), ..Paint::default() };
        let contents = paint.create_contents_for_geometry(rect());
        let filter = contents.as_filter().map(|filter| filter.inputs().len());
        assert_eq!(filter, Some(1));
        let coverage = contents.coverage(&Entity::new()).map(|rect| rect.width());
        assert!(coverage.is_some_and(|width| width > 10.0));
    }

    #[test]
    fn gradient_takes_the_paint_opacity() {
        let paint = Paint {
            color: Color::WHITE.with_alpha(0.5),
            color_source: ColorSource::LinearGradient {
                start: Point::ZERO,
                end: Point::new(10.0, 0.0),
                colors: vec![Color::RED, Color::BLUE],
                stops: vec![0.0, 1.0],
                tile_mode: TileMode::Clamp,
            },
            ..Paint::default()
        };
        assert!(!paint.create_contents_for_geometry(rect()).is_opaque());
        let opaque = Paint { color: Color::WHITE, ..paint };
        assert!(opaque.create_contents_for_geometry(rect()).is_opaque());
    }

    #[test]
    fn opacity_matrix_only_scales_alpha() {
        let faded = Color::RED.apply_color_matrix(&opacity_matrix(0.25));
        assert_eq!(faded, Color::RED.with_alpha(0.25));
    }
}
