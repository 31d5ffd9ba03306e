//! Device backends. Both record against the same `Context` interface.

pub mod gpu;
pub mod software;

pub use gpu::{WgpuAllocator, WgpuContext, WgpuTexture};
pub use software::{RecordedBlit, RecordedPass, SoftwareAllocator, SoftwareContext, SoftwareTexture};
