//! strata-core: entity passes, contents and filters, and the renderer
//! interfaces they record against.

/// Re-export wgpu for downstream crates while avoiding direct dependency leakage.
pub use wgpu;

pub mod backend;
pub mod color;
pub mod content_context;
pub mod contents;
pub mod entity;
pub mod entity_pass;
pub mod entity_pass_delegate;
pub mod error;
pub mod filters;
pub mod formats;
pub mod geometry;
pub mod inline_pass_context;
pub mod path;
pub mod renderer;
pub mod shape;

pub use color::{BlendMode, Color, ColorMatrix};
pub use content_context::ContentContext;
pub use contents::{ClipCoverage, ClipCoverageKind, Contents, Snapshot};
pub use entity::Entity;
pub use entity_pass::{BackdropFilterProc, ClipCoverageLayer, ClipCoverageStack, Element, EntityPass};
pub use entity_pass_delegate::{DefaultEntityPassDelegate, EntityPassDelegate};
pub use error::{RenderError, Result};
pub use filters::{BlurStyle, ColorFilter, FilterContents, FilterInput, ImageFilter};
pub use formats::{PixelFormat, TileMode};
pub use geometry::{ISize, Matrix, Point, Rect, Size};
pub use inline_pass_context::{ClipRecorder, EntityPassTarget, InlinePassContext};
pub use path::{FillRule, Path, RoundingRadii};
pub use renderer::{Capabilities, Context, RenderTarget, RenderTargetCache, Texture, TextureRef};
pub use shape::Geometry;
