//! In-memory LRU cache of decoded images.

use std::num::NonZeroUsize;

use lru::LruCache;
use tracing::{debug, trace};

use crate::domain::entities::{Image, ImageUrl};

/// Default maximum number of images to cache in memory.
pub const DEFAULT_CACHE_SIZE: usize = 256;

/// LRU cache of decoded images keyed by URL.
///
/// Carries no lock of its own: the loader's coordination loop is its only
/// owner, so every access is already serialized.
pub struct MemoryImageCache {
    cache: LruCache<ImageUrl, Image>,
    hits: u64,
    misses: u64,
}

impl MemoryImageCache {
    /// Creates a cache holding at most `capacity` images. Zero means unbounded.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let cache = NonZeroUsize::new(capacity).map_or_else(LruCache::unbounded, LruCache::new);
        Self {
            cache,
            hits: 0,
            misses: 0,
        }
    }

    /// Looks up an image and promotes it.
    pub fn get(&mut self, url: &ImageUrl) -> Option<Image> {
        if let Some(img) = self.cache.get(url) {
            self.hits += 1;
            trace!(url = %url, "Memory cache hit");
            Some(img.clone())
        } else {
            self.misses += 1;
            trace!(url = %url, "Memory cache miss");
            None
        }
    }

    /// Stores an image, evicting the least recently used one when full.
    pub fn put(&mut self, url: ImageUrl, image: Image) {
        debug!(url = %url, "Storing image in memory cache");
        if let Some((evicted, _)) = self.cache.push(url.clone(), image)
            && evicted != url
        {
            debug!(url = %evicted, "Evicted least recently used image");
        }
    }

    /// Removes an image. Returns whether it was present.
    pub fn evict(&mut self, url: &ImageUrl) -> bool {
        let removed = self.cache.pop(url).is_some();
        if removed {
            debug!(url = %url, "Evicted image from memory cache");
        }
        removed
    }

    /// Returns true if `url` is cached.
    #[must_use]
    pub fn contains(&self, url: &ImageUrl) -> bool {
        self.cache.contains(url)
    }

    /// Returns the number of cached images.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Removes every image. Counters are kept.
    pub fn clear(&mut self) {
        self.cache.clear();
        debug!("Cleared memory image cache");
    }

    /// Returns cache statistics.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn stats(&self) -> CacheStats {
        let total = self.hits + self.misses;
        let hit_rate = if total > 0 {
            (self.hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            hit_rate,
            size: self.len(),
        }
    }
}

impl std::fmt::Debug for MemoryImageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryImageCache")
            .field("len", &self.cache.len())
            .field("cap", &self.cache.cap())
            .finish_non_exhaustive()
    }
}

/// Statistics about cache performance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Hit rate as a percentage.
    pub hit_rate: f64,
    /// Current number of cached images.
    pub size: usize,
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Cache: {} images, {:.1}% hit rate ({} hits, {} misses)",
            self.size, self.hit_rate, self.hits, self.misses
        )
    }
}
