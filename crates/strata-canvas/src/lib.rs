//! strata-canvas: a recording canvas on top of `strata-core` entity passes.

mod canvas;
mod paint;
mod paint_pass_delegate;
mod picture;

pub use canvas::{Canvas, DebugOptions, RenderingMode};
pub use paint::{ColorSource, Paint};
pub use paint_pass_delegate::{OpacityPeepholePassDelegate, PaintPassDelegate};
pub use picture::Picture;
