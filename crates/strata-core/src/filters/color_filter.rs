use std::sync::Arc;

use crate::color::{BlendMode, Color, ColorMatrix};

use super::{FilterContents, FilterInput};

/// Per-pixel color transforms. Colors go in and come out with straight alpha.
#[derive(Clone, Debug, PartialEq)]
pub enum ColorFilter {
    /// Blends `color` onto every pixel with `mode`; the pixel is the destination.
    Blend { mode: BlendMode, color: Color },
    Matrix(ColorMatrix),
    SrgbToLinear,
    LinearToSrgb,
}

impl ColorFilter {
    pub fn apply(&self, color: Color) -> Color {
        match self {
            ColorFilter::Blend { mode, color: filter_color } => color.blend(*filter_color, *mode),
            ColorFilter::Matrix(matrix) => color.apply_color_matrix(matrix),
            ColorFilter::SrgbToLinear => color.to_linear(),
            ColorFilter::LinearToSrgb => color.to_srgb(),
        }
    }

    /// A closure contents can use to fold the filter into their own colors.
    pub fn cpu_proc(&self) -> impl Fn(Color) -> Color + '_ {
        move |color| self.apply(color)
    }

    /// True when transparent pixels come out visible, which makes the filter
    /// paint outside of its input's coverage.
    pub fn affects_transparent_black(&self) -> bool {
        let out = self.apply(Color::BLACK_TRANSPARENT).premultiply();
        out != Color::BLACK_TRANSPARENT
    }

    pub fn wrap_input(&self, input: FilterInput) -> Arc<FilterContents> {
        Arc::new(FilterContents::color_filter(input, self.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_over_blend_tints_transparent_black() {
        let filter = ColorFilter::Blend { mode: BlendMode::SourceOver, color: Color::RED };
        assert!(filter.affects_transparent_black());
        assert_eq!(filter.apply(Color::BLUE), Color::RED);
    }

    #[test]
    fn destination_in_keeps_transparent_black() {
        let filter = ColorFilter::Blend { mode: BlendMode::DestinationIn, color: Color::RED };
        assert!(!filter.affects_transparent_black());
    }

    #[test]
    fn alpha_offset_matrix_is_unbounded() {
        let mut matrix = ColorMatrix::IDENTITY;
        assert!(!ColorFilter::Matrix(matrix).affects_transparent_black());
        matrix.array[19] = 0.5;
        assert!(ColorFilter::Matrix(matrix).affects_transparent_black());
    }

    #[test]
    fn transfer_functions_leave_transparent_alone() {
        assert!(!ColorFilter::SrgbToLinear.affects_transparent_black());
        assert!(!ColorFilter::LinearToSrgb.affects_transparent_black());
    }
}
