use thiserror::Error;

use crate::formats::PixelFormat;
use crate::geometry::ISize;

/// Failures that abort a render. Anything recoverable (degenerate geometry,
/// culled content, missing capabilities) is handled locally and never shows up here.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to allocate {label}: {size:?} {format:?} with {mip_count} mip level(s)")]
    Allocation {
        label: String,
        size: ISize,
        format: PixelFormat,
        mip_count: u32,
    },
    #[error("invalid render target: {0}")]
    InvalidRenderTarget(&'static str),
    #[error("draw `{label}` rejected: {reason}")]
    InvalidCommand { label: String, reason: &'static str },
    #[error("subpass delegate produced no contents for its offscreen texture")]
    MissingSubpassContents,
    #[error("backdrop filter contents were not provided to a pass with a backdrop filter")]
    MissingBackdropContents,
    #[error("no active render pass in the inline pass context")]
    NoActivePass,
    #[error("backend error: {0}")]
    Backend(String),
}

pub type Result<T, E = RenderError> = std::result::Result<T, E>;
