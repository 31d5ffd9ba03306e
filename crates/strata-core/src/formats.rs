use std::ops::BitOr;

use crate::geometry::ISize;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    #[default]
    R8G8B8A8UNormInt,
    B8G8R8A8UNormInt,
    R8G8B8A8UNormIntSrgb,
    R16G16B16A16Float,
    S8UInt,
    D24UnormS8Uint,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::S8UInt => 1,
            PixelFormat::R16G16B16A16Float => 8,
            _ => 4,
        }
    }

    pub fn is_stencil(self) -> bool {
        matches!(self, PixelFormat::S8UInt | PixelFormat::D24UnormS8Uint)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum StorageMode {
    HostVisible,
    #[default]
    DevicePrivate,
    DeviceTransient,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum LoadAction {
    #[default]
    DontCare,
    Load,
    Clear,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum StoreAction {
    DontCare,
    #[default]
    Store,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    #[default]
    Triangle,
    TriangleStrip,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct TextureUsage(u8);

impl TextureUsage {
    pub const SHADER_READ: TextureUsage = TextureUsage(1);
    pub const RENDER_TARGET: TextureUsage = TextureUsage(1 << 1);
    pub const COPY: TextureUsage = TextureUsage(1 << 2);

    pub fn contains(self, other: TextureUsage) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for TextureUsage {
    type Output = TextureUsage;
    fn bitor(self, rhs: TextureUsage) -> TextureUsage {
        TextureUsage(self.0 | rhs.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TextureDescriptor {
    pub storage_mode: StorageMode,
    pub format: PixelFormat,
    pub size: ISize,
    pub mip_count: u32,
    pub usage: TextureUsage,
}

impl Default for TextureDescriptor {
    fn default() -> Self {
        Self {
            storage_mode: StorageMode::DevicePrivate,
            format: PixelFormat::default(),
            size: ISize::default(),
            mip_count: 1,
            usage: TextureUsage::SHADER_READ,
        }
    }
}

impl TextureDescriptor {
    pub fn byte_size(&self) -> usize {
        (self.size.area().max(0) as usize) * self.format.bytes_per_pixel()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum MinMagFilter {
    #[default]
    Nearest,
    Linear,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SamplerAddressMode {
    #[default]
    ClampToEdge,
    Repeat,
    Mirror,
    Decal,
}

/// How content is extended past the edges of a gradient or filtered image.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TileMode {
    #[default]
    Clamp,
    Repeat,
    Mirror,
    Decal,
}

impl TileMode {
    pub fn address_mode(self) -> SamplerAddressMode {
        match self {
            TileMode::Clamp => SamplerAddressMode::ClampToEdge,
            TileMode::Repeat => SamplerAddressMode::Repeat,
            TileMode::Mirror => SamplerAddressMode::Mirror,
            TileMode::Decal => SamplerAddressMode::Decal,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct SamplerDescriptor {
    pub min_filter: MinMagFilter,
    pub mag_filter: MinMagFilter,
    pub width_address_mode: SamplerAddressMode,
    pub height_address_mode: SamplerAddressMode,
}

impl SamplerDescriptor {
    pub fn linear() -> Self {
        Self {
            min_filter: MinMagFilter::Linear,
            mag_filter: MinMagFilter::Linear,
            ..Default::default()
        }
    }

    pub fn with_address_mode(mut self, mode: SamplerAddressMode) -> Self {
        self.width_address_mode = mode;
        self.height_address_mode = mode;
        self
    }
}
