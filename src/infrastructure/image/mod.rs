//! Image handling infrastructure.
//!
//! This module provides:
//! - Request coordination with per-URL fetch deduplication
//! - Memory caching with LRU eviction
//! - Single-attempt HTTP and local file fetching

pub mod loader;
pub mod memory_cache;
pub mod remote_fetcher;

pub use loader::{ImageLoader, ImageLoaderConfig, LoaderStats, UrlState};
pub use memory_cache::{CacheStats, MemoryImageCache};
pub use remote_fetcher::RemoteImageFetcher;
