use std::sync::{Arc, Mutex, MutexGuard};

use crate::formats::TextureDescriptor;
use crate::geometry::ISize;

use super::{Allocator, TextureRef};

#[derive(Debug)]
struct CacheEntry {
    used_this_frame: bool,
    texture: TextureRef,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: Vec<CacheEntry>,
    frame_depth: u32,
}

/// Texture pool for offscreen render targets.
///
/// Textures are only recycled across frames: inside a frame every request
/// gets a texture nobody else holds, so nested subpasses never alias. Entries
/// not requested during a frame are released when the frame ends.
pub struct RenderTargetCache {
    allocator: Arc<dyn Allocator>,
    state: Mutex<CacheState>,
}

impl RenderTargetCache {
    pub fn new(allocator: Arc<dyn Allocator>) -> Self {
        Self { allocator, state: Mutex::new(CacheState::default()) }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Frames nest; only the outermost start resets usage marks.
    pub fn start_frame(&self) {
        let mut state = self.lock();
        if state.frame_depth == 0 {
            for entry in &mut state.entries {
                entry.used_this_frame = false;
            }
        }
        state.frame_depth += 1;
    }

    pub fn end_frame(&self) {
        let mut state = self.lock();
        state.frame_depth = state.frame_depth.saturating_sub(1);
        if state.frame_depth == 0 {
            state.entries.retain(|entry| entry.used_this_frame);
        }
    }

    pub fn cached_texture_count(&self) -> usize {
        self.lock().entries.len()
    }

    /// Descriptors of every texture currently held by the cache.
    pub fn texture_descriptors(&self) -> Vec<TextureDescriptor> {
        self.lock().entries.iter().map(|e| e.texture.descriptor().clone()).collect()
    }
}

impl Allocator for RenderTargetCache {
    fn create_texture(&self, desc: &TextureDescriptor) -> Option<TextureRef> {
        let mut state = self.lock();
        if state.frame_depth == 0 {
            drop(state);
            return self.allocator.create_texture(desc);
        }
        if let Some(entry) = state
            .entries
            .iter_mut()
            .find(|e| !e.used_this_frame && e.texture.descriptor() == desc)
        {
            entry.used_this_frame = true;
            return Some(entry.texture.clone());
        }
        let texture = self.allocator.create_texture(desc)?;
        state.entries.push(CacheEntry { used_this_frame: true, texture: texture.clone() });
        Some(texture)
    }

    fn max_texture_size(&self) -> ISize {
        self.allocator.max_texture_size()
    }
}
