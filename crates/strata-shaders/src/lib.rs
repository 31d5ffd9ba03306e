//! strata-shaders: WGSL sources and the uniform layouts they expect.

use bytemuck::{Pod, Zeroable};

/// Fragment programs selectable through `FragmentUniform::mode[0]`.
pub mod program {
    pub const NONE: u32 = 0;
    pub const SOLID: u32 = 1;
    pub const TEXTURE: u32 = 2;
    pub const LINEAR_GRADIENT: u32 = 3;
    pub const COLOR_FILTER: u32 = 4;
    pub const GAUSSIAN_BLUR: u32 = 5;
    pub const MORPHOLOGY: u32 = 6;
    pub const CHECKERBOARD: u32 = 7;
}

/// Color filter kinds selectable through `FragmentUniform::filter[0]`.
pub mod filter {
    pub const MATRIX: u32 = 0;
    pub const SRGB_TO_LINEAR: u32 = 1;
    pub const LINEAR_TO_SRGB: u32 = 2;
    pub const BLEND: u32 = 3;
}

/// Maximum number of gradient stops a single draw can carry.
pub const MAX_GRADIENT_STOPS: usize = 16;

/// Upper bound on the per-axis tap radius of the blur and morphology loops.
pub const MAX_KERNEL_RADIUS: u32 = 24;

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct FrameUniform {
    /// Local coordinates to clip space, column-major.
    pub mvp: [[f32; 4]; 4],
    /// x: draw depth.
    pub depth: [f32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct FragmentUniform {
    /// Premultiplied solid color, checkerboard color or blend filter color.
    pub color: [f32; 4],
    /// Local coordinates to normalized texture coordinates.
    pub uv_transform: [[f32; 4]; 4],
    pub color_matrix: [[f32; 4]; 4],
    pub color_offset: [f32; 4],
    /// x: alpha, y: checker square size, zw: blur sigma or morphology radius in texels.
    pub params: [f32; 4],
    /// xy: gradient start, zw: gradient end, in local coordinates.
    pub gradient: [f32; 4],
    /// xy: size of one texel in normalized coordinates.
    pub texel: [f32; 4],
    /// x: program, y: tile mode, z: blur style or dilate flag, w: stop count.
    pub mode: [u32; 4],
    /// x: filter kind, y: blend mode, z: decal flag.
    pub filter: [u32; 4],
    pub stops: [[f32; 4]; MAX_GRADIENT_STOPS / 4],
    pub colors: [[f32; 4]; MAX_GRADIENT_STOPS],
}

impl Default for FragmentUniform {
    fn default() -> Self {
        let identity = [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ];
        Self {
            uv_transform: identity,
            color_matrix: identity,
            params: [1.0, 1.0, 0.0, 0.0],
            ..Zeroable::zeroed()
        }
    }
}

/// Single module used by every compositor pipeline. Colors are premultiplied
/// on input and output.
pub const COMPOSITOR_WGSL: &str = r#"
struct FrameUniform {
    mvp: mat4x4<f32>,
    depth: vec4<f32>,
};

struct FragmentUniform {
    color: vec4<f32>,
    uv_transform: mat4x4<f32>,
    color_matrix: mat4x4<f32>,
    color_offset: vec4<f32>,
    params: vec4<f32>,
    gradient: vec4<f32>,
    texel: vec4<f32>,
    mode: vec4<u32>,
    filter_mode: vec4<u32>,
    stops: array<vec4<f32>, 4>,
    colors: array<vec4<f32>, 16>,
};

@group(0) @binding(0) var<uniform> frame: FrameUniform;
@group(0) @binding(1) var<uniform> frag: FragmentUniform;
@group(0) @binding(2) var src_tex: texture_2d<f32>;
@group(0) @binding(3) var src_smp: sampler;

struct VsOut {
    @builtin(position) pos: vec4<f32>,
    @location(0) local: vec2<f32>,
};

@vertex
fn vs_main(@location(0) position: vec2<f32>) -> VsOut {
    var out: VsOut;
    out.pos = frame.mvp * vec4<f32>(position, 0.0, 1.0);
    out.local = position;
    return out;
}

fn unpremultiply(c: vec4<f32>) -> vec4<f32> {
    if (c.a <= 0.0) {
        return vec4<f32>(0.0);
    }
    return vec4<f32>(c.rgb / c.a, c.a);
}

fn premultiply(c: vec4<f32>) -> vec4<f32> {
    return vec4<f32>(c.rgb * c.a, c.a);
}

fn sample_source(uv: vec2<f32>) -> vec4<f32> {
    if (frag.filter_mode.z == 1u && (any(uv < vec2<f32>(0.0)) || any(uv > vec2<f32>(1.0)))) {
        return vec4<f32>(0.0);
    }
    return textureSampleLevel(src_tex, src_smp, uv, 0.0);
}

fn local_to_uv(local: vec2<f32>) -> vec2<f32> {
    return (frag.uv_transform * vec4<f32>(local, 0.0, 1.0)).xy;
}

fn stop_at(i: u32) -> f32 {
    return frag.stops[i / 4u][i % 4u];
}

fn tile(t: f32, mode: u32) -> f32 {
    switch mode {
        case 1u: { return fract(t); }
        case 2u: {
            let m = t - 2.0 * floor(t / 2.0);
            return select(m, 2.0 - m, m > 1.0);
        }
        default: { return clamp(t, 0.0, 1.0); }
    }
}

fn linear_gradient(local: vec2<f32>) -> vec4<f32> {
    let start = frag.gradient.xy;
    let axis = frag.gradient.zw - start;
    let len2 = dot(axis, axis);
    var t = 0.0;
    if (len2 > 0.0) {
        t = dot(local - start, axis) / len2;
    }
    if (frag.mode.y == 3u && (t < 0.0 || t > 1.0)) {
        return vec4<f32>(0.0);
    }
    t = tile(t, frag.mode.y);
    let count = frag.mode.w;
    if (count == 0u) {
        return vec4<f32>(0.0);
    }
    if (t <= stop_at(0u)) {
        return frag.colors[0];
    }
    for (var i = 1u; i < count; i = i + 1u) {
        let s0 = stop_at(i - 1u);
        let s1 = stop_at(i);
        if (t <= s1) {
            let f = select(1.0, (t - s0) / (s1 - s0), s1 > s0);
            return mix(frag.colors[i - 1u], frag.colors[i], f);
        }
    }
    return frag.colors[count - 1u];
}

fn srgb_to_linear(c: vec3<f32>) -> vec3<f32> {
    let lo = c / 12.92;
    let hi = pow((c + 0.055) / 1.055, vec3<f32>(2.4));
    return select(hi, lo, c <= vec3<f32>(0.04045));
}

fn linear_to_srgb(c: vec3<f32>) -> vec3<f32> {
    let lo = c * 12.92;
    let hi = 1.055 * pow(c, vec3<f32>(1.0 / 2.4)) - 0.055;
    return select(hi, lo, c <= vec3<f32>(0.0031308));
}

// Porter-Duff blend of premultiplied colors, numbered like BlendMode.
fn porter_duff(s: vec4<f32>, d: vec4<f32>, mode: u32) -> vec4<f32> {
    switch mode {
        case 0u: { return vec4<f32>(0.0); }
        case 1u: { return s; }
        case 2u: { return d; }
        case 4u: { return d + s * (1.0 - d.a); }
        case 5u: { return s * d.a; }
        case 6u: { return d * s.a; }
        case 7u: { return s * (1.0 - d.a); }
        case 8u: { return d * (1.0 - s.a); }
        case 9u: { return s * d.a + d * (1.0 - s.a); }
        case 10u: { return d * s.a + s * (1.0 - d.a); }
        case 11u: { return s * (1.0 - d.a) + d * (1.0 - s.a); }
        case 12u: { return min(s + d, vec4<f32>(1.0)); }
        case 13u: { return s * d; }
        default: { return s + d * (1.0 - s.a); }
    }
}

fn color_filter(src_color: vec4<f32>) -> vec4<f32> {
    let c = unpremultiply(src_color);
    switch frag.filter_mode.x {
        case 1u: { return premultiply(vec4<f32>(srgb_to_linear(c.rgb), c.a)); }
        case 2u: { return premultiply(vec4<f32>(linear_to_srgb(c.rgb), c.a)); }
        case 3u: { return porter_duff(frag.color, src_color, frag.filter_mode.y); }
        default: {
            let m = clamp(frag.color_matrix * c + frag.color_offset, vec4<f32>(0.0), vec4<f32>(1.0));
            return premultiply(m);
        }
    }
}

fn gaussian_blur(uv: vec2<f32>) -> vec4<f32> {
    let sigma = max(frag.params.zw, vec2<f32>(1e-3));
    let radius = min(vec2<u32>(ceil(sigma * 3.0)), vec2<u32>(24u));
    let rx = i32(select(radius.x, 0u, frag.params.z < 1e-3));
    let ry = i32(select(radius.y, 0u, frag.params.w < 1e-3));
    var total = vec4<f32>(0.0);
    var weight_sum = 0.0;
    for (var y = -ry; y <= ry; y = y + 1) {
        for (var x = -rx; x <= rx; x = x + 1) {
            let offset = vec2<f32>(f32(x), f32(y));
            let w = exp(-0.5 * dot(offset / sigma, offset / sigma));
            total = total + sample_source(uv + offset * frag.texel.xy) * w;
            weight_sum = weight_sum + w;
        }
    }
    let blurred = total / max(weight_sum, 1e-6);
    let src = sample_source(uv);
    switch frag.mode.z {
        case 1u: { return src + blurred * (1.0 - src.a); }
        case 2u: { return blurred * (1.0 - src.a); }
        case 3u: { return blurred * src.a; }
        default: { return blurred; }
    }
}

fn morphology(uv: vec2<f32>) -> vec4<f32> {
    let radius = min(vec2<u32>(round(frag.params.zw)), vec2<u32>(24u));
    let rx = i32(radius.x);
    let ry = i32(radius.y);
    let dilate = frag.mode.z == 1u;
    var acc = sample_source(uv);
    for (var y = -ry; y <= ry; y = y + 1) {
        for (var x = -rx; x <= rx; x = x + 1) {
            let c = sample_source(uv + vec2<f32>(f32(x), f32(y)) * frag.texel.xy);
            acc = select(min(acc, c), max(acc, c), dilate);
        }
    }
    return acc;
}

@fragment
fn fs_main(v: VsOut) -> @location(0) vec4<f32> {
    let alpha = frag.params.x;
    switch frag.mode.x {
        case 1u: { return frag.color; }
        case 2u: { return sample_source(local_to_uv(v.local)) * alpha; }
        case 3u: { return linear_gradient(v.local) * alpha; }
        case 4u: { return color_filter(sample_source(local_to_uv(v.local))) * alpha; }
        case 5u: { return gaussian_blur(local_to_uv(v.local)); }
        case 6u: { return morphology(local_to_uv(v.local)); }
        case 7u: {
            let cell = floor(v.pos.xy / frag.params.y);
            let parity = i32(cell.x + cell.y) & 1;
            return select(vec4<f32>(0.0), frag.color, parity == 0);
        }
        default: { return vec4<f32>(0.0); }
    }
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_layouts_are_16_byte_aligned() {
        assert_eq!(std::mem::size_of::<FrameUniform>() % 16, 0);
        assert_eq!(std::mem::size_of::<FragmentUniform>() % 16, 0);
        assert_eq!(std::mem::size_of::<FragmentUniform>(), 16 * 4 + 64 * 2 + 16 * 7 + 16 * 16);
    }

    #[test]
    fn default_fragment_uniform_has_identity_transforms() {
        let uniform = FragmentUniform::default();
        assert_eq!(uniform.uv_transform[2][2], 1.0);
        assert_eq!(uniform.params[0], 1.0);
        assert_eq!(uniform.mode[0], program::NONE);
    }
}
