use std::sync::Arc;

use crate::formats::{SamplerDescriptor, TileMode};
use crate::geometry::Matrix;

use super::{BLUR_REQUIRED_MIP_COUNT, BlurStyle, ColorFilter, FilterContents, FilterInput};

/// Image filter description attached to a layer or a backdrop. Turned into a
/// [`FilterContents`] once the input is known.
#[derive(Clone, Debug, PartialEq)]
pub enum ImageFilter {
    Blur {
        sigma_x: f32,
        sigma_y: f32,
        style: BlurStyle,
        tile_mode: TileMode,
    },
    Dilate {
        radius_x: f32,
        radius_y: f32,
    },
    Erode {
        radius_x: f32,
        radius_y: f32,
    },
    Matrix {
        matrix: Matrix,
        sampler: SamplerDescriptor,
    },
    /// Applies `inner` first, then `outer` to its result.
    Compose {
        outer: Box<ImageFilter>,
        inner: Box<ImageFilter>,
    },
    Color(ColorFilter),
    LocalMatrix {
        matrix: Matrix,
        filter: Box<ImageFilter>,
    },
}

impl ImageFilter {
    pub fn blur(sigma_x: f32, sigma_y: f32) -> Self {
        ImageFilter::Blur { sigma_x, sigma_y, style: BlurStyle::Normal, tile_mode: TileMode::Decal }
    }

    pub fn wrap_input(&self, input: FilterInput, effect_transform: Matrix) -> Arc<FilterContents> {
        let contents = match self {
            ImageFilter::Blur { sigma_x, sigma_y, style, tile_mode } => {
                FilterContents::blur(input, *sigma_x, *sigma_y, *style, *tile_mode)
            }
            ImageFilter::Dilate { radius_x, radius_y } => {
                FilterContents::morphology(input, *radius_x, *radius_y, true)
            }
            ImageFilter::Erode { radius_x, radius_y } => {
                FilterContents::morphology(input, *radius_x, *radius_y, false)
            }
            ImageFilter::Matrix { matrix, sampler } => FilterContents::matrix(input, *matrix, *sampler),
            ImageFilter::Compose { outer, inner } => {
                let inner = inner.wrap_input(input, effect_transform);
                return outer.wrap_input(FilterInput::Filter(inner), effect_transform);
            }
            ImageFilter::Color(filter) => FilterContents::color_filter(input, filter.clone()),
            ImageFilter::LocalMatrix { matrix, filter } => {
                return filter.wrap_input(input, effect_transform * *matrix);
            }
        };
        Arc::new(contents.with_effect_transform(effect_transform))
    }

    /// Mip levels the filter wants on its input so downsampled reads stay stable.
    pub fn required_mip_count(&self) -> u32 {
        match self {
            ImageFilter::Blur { .. } => BLUR_REQUIRED_MIP_COUNT,
            ImageFilter::Compose { outer, inner } => {
                outer.required_mip_count().max(inner.required_mip_count())
            }
            ImageFilter::LocalMatrix { filter, .. } => filter.required_mip_count(),
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;

    #[test]
    fn compose_takes_the_largest_mip_requirement() {
        let filter = ImageFilter::Compose {
            outer: Box::new(ImageFilter::Color(ColorFilter::SrgbToLinear)),
            inner: Box::new(ImageFilter::blur(4.0, 4.0)),
        };
        assert_eq!(filter.required_mip_count(), BLUR_REQUIRED_MIP_COUNT);
        assert_eq!(ImageFilter::Dilate { radius_x: 1.0, radius_y: 1.0 }.required_mip_count(), 1);
    }

    #[test]
    fn compose_nests_the_inner_filter() {
        let filter = ImageFilter::Compose {
            outer: Box::new(ImageFilter::Color(ColorFilter::SrgbToLinear)),
            inner: Box::new(ImageFilter::blur(4.0, 4.0)),
        };
        let contents = filter.wrap_input(
            FilterInput::Rect(Rect::from_xywh(0.0, 0.0, 10.0, 10.0)),
            Matrix::identity(),
        );
        assert!(matches!(contents.inputs()[0], FilterInput::Filter(_)));
        assert_eq!(contents.required_mip_count(), BLUR_REQUIRED_MIP_COUNT);
    }
}
