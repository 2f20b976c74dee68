//! Plane texture cache.
//!
//! Decoders recycle a small ring of buffers, so consecutive frames ask for
//! the same plane sizes over and over. The cache keeps textures keyed by
//! (width, height, format) and hands them back out instead of allocating
//! per frame. Textures released during a frame only become reusable after
//! [`TextureCache::flush`], which the presenter calls once per frame.

use crate::texture::GpuTexture;
use std::collections::HashMap;
use tracing::trace;

/// Key for cached textures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureKey {
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
}

/// A texture the cache can hold.
pub trait CachedTexture {
    fn key(&self) -> TextureKey;
    fn memory_size(&self) -> usize;
}

impl CachedTexture for GpuTexture {
    fn key(&self) -> TextureKey {
        TextureKey {
            width: self.width,
            height: self.height,
            format: self.format,
        }
    }

    fn memory_size(&self) -> usize {
        GpuTexture::memory_size(self)
    }
}

/// Cache of reusable plane textures.
pub struct TextureCache<T> {
    /// Textures ready for reuse, keyed by dimensions + format.
    free: HashMap<TextureKey, Vec<T>>,
    /// Released since the last flush; not yet reusable.
    released: Vec<T>,
    /// Memory held by free textures.
    total_memory: usize,
    /// Maximum memory kept by the free list.
    max_memory: usize,
}

impl<T: CachedTexture> TextureCache<T> {
    /// Create a new cache with the given memory budget.
    pub fn new(max_memory: usize) -> Self {
        Self {
            free: HashMap::new(),
            released: Vec::new(),
            total_memory: 0,
            max_memory,
        }
    }

    /// Take a cached texture matching `key`, or create one.
    pub fn acquire(&mut self, key: TextureKey, create: impl FnOnce() -> T) -> T {
        if let Some(textures) = self.free.get_mut(&key) {
            if let Some(tex) = textures.pop() {
                self.total_memory -= tex.memory_size();
                if textures.is_empty() {
                    self.free.remove(&key);
                }
                trace!("Reusing cached {}x{} texture", key.width, key.height);
                return tex;
            }
        }

        create()
    }

    /// Hand a texture back. It becomes reusable after the next flush.
    pub fn release(&mut self, texture: T) {
        self.released.push(texture);
    }

    /// Move released textures into the free list, dropping whatever does
    /// not fit the budget.
    pub fn flush(&mut self) {
        for texture in std::mem::take(&mut self.released) {
            let mem = texture.memory_size();

            // If keeping this texture would exceed budget, drop it instead
            if self.total_memory + mem > self.max_memory {
                continue;
            }

            self.total_memory += mem;
            self.free.entry(texture.key()).or_default().push(texture);
        }
    }

    /// Memory held by free textures.
    pub fn memory_usage(&self) -> usize {
        self.total_memory
    }

    /// Number of free textures.
    pub fn texture_count(&self) -> usize {
        self.free.values().map(|v| v.len()).sum()
    }

    /// Number of textures waiting for the next flush.
    pub fn pending_count(&self) -> usize {
        self.released.len()
    }
}
