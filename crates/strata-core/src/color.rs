use std::ops::{Add, Mul};

use palette::{FromColor, Hsv, LinSrgba, Srgb, Srgba};

/// RGBA color with straight (non-premultiplied) alpha, components in 0..=1.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Color {
    pub red: f32,
    pub green: f32,
    pub blue: f32,
    pub alpha: f32,
}

/// Porter-Duff and advanced blend modes. Everything up to `Modulate` maps to
/// fixed-function blending; the rest read the destination.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BlendMode {
    Clear,
    Source,
    Destination,
    #[default]
    SourceOver,
    DestinationOver,
    SourceIn,
    DestinationIn,
    SourceOut,
    DestinationOut,
    SourceATop,
    DestinationATop,
    Xor,
    Plus,
    Modulate,
    Screen,
    Overlay,
    Darken,
    Lighten,
    ColorDodge,
    ColorBurn,
    HardLight,
    SoftLight,
    Difference,
    Exclusion,
    Multiply,
    Hue,
    Saturation,
    Color,
    Luminosity,
}

impl BlendMode {
    pub const LAST_PIPELINE_BLEND_MODE: BlendMode = BlendMode::Modulate;

    /// Modes that cannot be expressed with fixed-function blending.
    pub fn is_advanced(self) -> bool {
        self > Self::LAST_PIPELINE_BLEND_MODE
    }

    /// Modes that change destination pixels outside of the source coverage.
    pub fn is_destructive(self) -> bool {
        matches!(
            self,
            BlendMode::Clear
                | BlendMode::Source
                | BlendMode::SourceIn
                | BlendMode::DestinationIn
                | BlendMode::SourceOut
                | BlendMode::DestinationOut
                | BlendMode::DestinationATop
                | BlendMode::Xor
                | BlendMode::Modulate
        )
    }
}

/// 4x5 row-major color matrix applied to straight-alpha colors.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ColorMatrix {
    pub array: [f32; 20],
}

impl ColorMatrix {
    pub const IDENTITY: ColorMatrix = ColorMatrix {
        array: [
            1.0, 0.0, 0.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, 0.0, 0.0, //
            0.0, 0.0, 1.0, 0.0, 0.0, //
            0.0, 0.0, 0.0, 1.0, 0.0,
        ],
    };
}

impl Color {
    pub const BLACK_TRANSPARENT: Color = Color::new(0.0, 0.0, 0.0, 0.0);
    pub const BLACK: Color = Color::new(0.0, 0.0, 0.0, 1.0);
    pub const WHITE: Color = Color::new(1.0, 1.0, 1.0, 1.0);
    pub const RED: Color = Color::new(1.0, 0.0, 0.0, 1.0);
    pub const GREEN: Color = Color::new(0.0, 1.0, 0.0, 1.0);
    pub const BLUE: Color = Color::new(0.0, 0.0, 1.0, 1.0);
    pub const YELLOW: Color = Color::new(1.0, 1.0, 0.0, 1.0);
    pub const CORNFLOWER_BLUE: Color = Color::new(100.0 / 255.0, 149.0 / 255.0, 237.0 / 255.0, 1.0);
    pub const MEDIUM_TURQUOISE: Color = Color::new(72.0 / 255.0, 209.0 / 255.0, 204.0 / 255.0, 1.0);
    pub const GREEN_YELLOW: Color = Color::new(173.0 / 255.0, 255.0 / 255.0, 47.0 / 255.0, 1.0);

    pub const fn new(red: f32, green: f32, blue: f32, alpha: f32) -> Self {
        Self { red, green, blue, alpha }
    }

    /// Convenience for 8-bit channel values, mirroring CSS `rgba(...)`.
    pub fn rgba8(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self::new(
            r as f32 / 255.0,
            g as f32 / 255.0,
            b as f32 / 255.0,
            a as f32 / 255.0,
        )
    }

    /// Hue, saturation and brightness in 0..=1 (hue wraps).
    pub fn from_hsb(hue: f32, saturation: f32, brightness: f32, alpha: f32) -> Self {
        let hsv: Hsv = Hsv::new(hue.rem_euclid(1.0) * 360.0, saturation, brightness);
        let rgb = Srgb::from_color(hsv);
        Self::new(rgb.red, rgb.green, rgb.blue, alpha)
    }

    pub fn with_alpha(self, alpha: f32) -> Self {
        Self { alpha, ..self }
    }

    pub fn is_opaque(&self) -> bool {
        self.alpha >= 1.0
    }

    pub fn is_transparent(&self) -> bool {
        self.alpha <= 0.0
    }

    pub fn premultiply(self) -> Self {
        Self::new(
            self.red * self.alpha,
            self.green * self.alpha,
            self.blue * self.alpha,
            self.alpha,
        )
    }

    pub fn unpremultiply(self) -> Self {
        if self.alpha <= 0.0 {
            return Self::BLACK_TRANSPARENT;
        }
        Self::new(
            self.red / self.alpha,
            self.green / self.alpha,
            self.blue / self.alpha,
            self.alpha,
        )
    }

    pub fn clamp01(self) -> Self {
        Self::new(
            self.red.clamp(0.0, 1.0),
            self.green.clamp(0.0, 1.0),
            self.blue.clamp(0.0, 1.0),
            self.alpha.clamp(0.0, 1.0),
        )
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.red, self.green, self.blue, self.alpha]
    }

    pub fn to_rgba8(self) -> [u8; 4] {
        let c = self.clamp01();
        [c.red, c.green, c.blue, c.alpha].map(|v| (v * 255.0).round() as u8)
    }

    fn rgb(self) -> [f32; 3] {
        [self.red, self.green, self.blue]
    }

    /// Decode sRGB transfer to linear, keeping alpha.
    pub fn to_linear(self) -> Self {
        let lin: LinSrgba = Srgba::new(self.red, self.green, self.blue, self.alpha).into_linear();
        Self::new(lin.red, lin.green, lin.blue, lin.alpha)
    }

    /// Encode linear values with the sRGB transfer, keeping alpha.
    pub fn to_srgb(self) -> Self {
        let srgb = Srgba::from_linear(LinSrgba::new(self.red, self.green, self.blue, self.alpha));
        Self::new(srgb.red, srgb.green, srgb.blue, srgb.alpha)
    }

    pub fn apply_color_matrix(self, matrix: &ColorMatrix) -> Self {
        let m = &matrix.array;
        let c = self.to_array();
        let row = |r: usize| {
            m[r * 5] * c[0] + m[r * 5 + 1] * c[1] + m[r * 5 + 2] * c[2] + m[r * 5 + 3] * c[3] + m[r * 5 + 4]
        };
        Self::new(row(0), row(1), row(2), row(3)).clamp01()
    }

    /// Composite `src` onto `self` (the destination) with `mode`.
    pub fn blend(self, src: Color, mode: BlendMode) -> Color {
        let dst = self;
        let s = src.premultiply();
        let d = dst.premultiply();
        let (sa, da) = (src.alpha, dst.alpha);
        match mode {
            BlendMode::Clear => Color::BLACK_TRANSPARENT,
            BlendMode::Source => src,
            BlendMode::Destination => dst,
            BlendMode::SourceOver => (s + d * (1.0 - sa)).unpremultiply(),
            BlendMode::DestinationOver => (d + s * (1.0 - da)).unpremultiply(),
            BlendMode::SourceIn => (s * da).unpremultiply(),
            BlendMode::DestinationIn => (d * sa).unpremultiply(),
            BlendMode::SourceOut => (s * (1.0 - da)).unpremultiply(),
            BlendMode::DestinationOut => (d * (1.0 - sa)).unpremultiply(),
            BlendMode::SourceATop => (s * da + d * (1.0 - sa)).unpremultiply(),
            BlendMode::DestinationATop => (d * sa + s * (1.0 - da)).unpremultiply(),
            BlendMode::Xor => (s * (1.0 - da) + d * (1.0 - sa)).unpremultiply(),
            BlendMode::Plus => (s + d).clamp01().unpremultiply(),
            BlendMode::Modulate => (s * d).unpremultiply(),
            advanced => {
                let b = advanced_blend(advanced, dst.rgb(), src.rgb());
                let alpha = sa + da - sa * da;
                let channel = |i: usize, sp: f32, dp: f32| {
                    (1.0 - da) * sp + (1.0 - sa) * dp + sa * da * b[i]
                };
                Color::new(
                    channel(0, s.red, d.red),
                    channel(1, s.green, d.green),
                    channel(2, s.blue, d.blue),
                    alpha,
                )
                .unpremultiply()
            }
        }
    }
}

impl Add for Color {
    type Output = Color;
    fn add(self, rhs: Color) -> Color {
        Color::new(
            self.red + rhs.red,
            self.green + rhs.green,
            self.blue + rhs.blue,
            self.alpha + rhs.alpha,
        )
    }
}

impl Mul for Color {
    type Output = Color;
    fn mul(self, rhs: Color) -> Color {
        Color::new(
            self.red * rhs.red,
            self.green * rhs.green,
            self.blue * rhs.blue,
            self.alpha * rhs.alpha,
        )
    }
}

impl Mul<f32> for Color {
    type Output = Color;
    fn mul(self, rhs: f32) -> Color {
        Color::new(self.red * rhs, self.green * rhs, self.blue * rhs, self.alpha * rhs)
    }
}

// W3C Compositing and Blending functions on straight rgb. `b` is the backdrop, `s` the source.
fn advanced_blend(mode: BlendMode, b: [f32; 3], s: [f32; 3]) -> [f32; 3] {
    let per_channel = |f: fn(f32, f32) -> f32| [f(b[0], s[0]), f(b[1], s[1]), f(b[2], s[2])];
    match mode {
        BlendMode::Screen => per_channel(screen),
        BlendMode::Overlay => per_channel(|b, s| hard_light(s, b)),
        BlendMode::Darken => per_channel(f32::min),
        BlendMode::Lighten => per_channel(f32::max),
        BlendMode::ColorDodge => per_channel(|b, s| {
            if b <= 0.0 {
                0.0
            } else if s >= 1.0 {
                1.0
            } else {
                (b / (1.0 - s)).min(1.0)
            }
        }),
        BlendMode::ColorBurn => per_channel(|b, s| {
            if b >= 1.0 {
                1.0
            } else if s <= 0.0 {
                0.0
            } else {
                1.0 - ((1.0 - b) / s).min(1.0)
            }
        }),
        BlendMode::HardLight => per_channel(hard_light),
        BlendMode::SoftLight => per_channel(|b, s| {
            if s <= 0.5 {
                b - (1.0 - 2.0 * s) * b * (1.0 - b)
            } else {
                let d = if b <= 0.25 { ((16.0 * b - 12.0) * b + 4.0) * b } else { b.sqrt() };
                b + (2.0 * s - 1.0) * (d - b)
            }
        }),
        BlendMode::Difference => per_channel(|b, s| (b - s).abs()),
        BlendMode::Exclusion => per_channel(|b, s| b + s - 2.0 * b * s),
        BlendMode::Multiply => per_channel(|b, s| b * s),
        BlendMode::Hue => set_lum(set_sat(s, sat(b)), lum(b)),
        BlendMode::Saturation => set_lum(set_sat(b, sat(s)), lum(b)),
        BlendMode::Color => set_lum(s, lum(b)),
        BlendMode::Luminosity => set_lum(b, lum(s)),
        _ => s,
    }
}

fn screen(b: f32, s: f32) -> f32 {
    b + s - b * s
}

fn hard_light(b: f32, s: f32) -> f32 {
    if s <= 0.5 { b * 2.0 * s } else { screen(b, 2.0 * s - 1.0) }
}

fn lum(c: [f32; 3]) -> f32 {
    0.3 * c[0] + 0.59 * c[1] + 0.11 * c[2]
}

fn clip_color(c: [f32; 3]) -> [f32; 3] {
    let l = lum(c);
    let n = c[0].min(c[1]).min(c[2]);
    let x = c[0].max(c[1]).max(c[2]);
    let mut out = c;
    if n < 0.0 && l - n > 0.0 {
        out = out.map(|v| l + (v - l) * l / (l - n));
    }
    if x > 1.0 && x - l > 0.0 {
        out = out.map(|v| l + (v - l) * (1.0 - l) / (x - l));
    }
    out
}

fn set_lum(c: [f32; 3], l: f32) -> [f32; 3] {
    let d = l - lum(c);
    clip_color(c.map(|v| v + d))
}

fn sat(c: [f32; 3]) -> f32 {
    c[0].max(c[1]).max(c[2]) - c[0].min(c[1]).min(c[2])
}

fn set_sat(c: [f32; 3], s: f32) -> [f32; 3] {
    let max = c[0].max(c[1]).max(c[2]);
    let min = c[0].min(c[1]).min(c[2]);
    if max <= min {
        return [0.0; 3];
    }
    c.map(|v| (v - min) * s / (max - min))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Color, b: Color) -> bool {
        (a.red - b.red).abs() < 1e-4
            && (a.green - b.green).abs() < 1e-4
            && (a.blue - b.blue).abs() < 1e-4
            && (a.alpha - b.alpha).abs() < 1e-4
    }

    #[test]
    fn source_over_of_translucent_on_opaque() {
        let blended = Color::RED.blend(Color::CORNFLOWER_BLUE.with_alpha(0.75), BlendMode::SourceOver);
        let expected = Color::new(
            0.25 + 0.75 * Color::CORNFLOWER_BLUE.red,
            0.75 * Color::CORNFLOWER_BLUE.green,
            0.75 * Color::CORNFLOWER_BLUE.blue,
            1.0,
        );
        assert!(approx(blended, expected), "{blended:?}");
    }

    #[test]
    fn source_replaces_destination() {
        assert_eq!(Color::BLACK_TRANSPARENT.blend(Color::RED, BlendMode::Source), Color::RED);
        assert_eq!(Color::RED.blend(Color::BLUE, BlendMode::Destination), Color::RED);
    }

    #[test]
    fn advanced_modes_are_classified() {
        assert!(!BlendMode::Modulate.is_advanced());
        assert!(BlendMode::Screen.is_advanced());
        assert!(BlendMode::Luminosity.is_advanced());
        assert!(BlendMode::Source.is_destructive());
        assert!(!BlendMode::SourceOver.is_destructive());
    }

    #[test]
    fn multiply_and_screen_on_opaque_colors() {
        let dst = Color::new(0.5, 0.5, 0.5, 1.0);
        let src = Color::new(0.5, 1.0, 0.0, 1.0);
        assert!(approx(dst.blend(src, BlendMode::Multiply), Color::new(0.25, 0.5, 0.0, 1.0)));
        assert!(approx(dst.blend(src, BlendMode::Screen), Color::new(0.75, 1.0, 0.5, 1.0)));
    }

    #[test]
    fn hsb_primary_hues() {
        assert!(approx(Color::from_hsb(0.0, 1.0, 1.0, 1.0), Color::RED));
        assert!(approx(Color::from_hsb(2.0 / 3.0, 1.0, 1.0, 1.0), Color::BLUE));
    }

    #[test]
    fn srgb_linear_round_trip() {
        let c = Color::new(0.2, 0.5, 0.8, 0.5);
        assert!(approx(c.to_linear().to_srgb(), c));
    }
}
