//! Infrastructure layer with the loader and its adapters.

/// Application configuration.
pub mod config;
/// Image loading (coordination, caching, fetching).
pub mod image;

pub use config::{AppConfig, CliArgs, ConfigError, LogLevel, StorageManager};
pub use image::{
    CacheStats, ImageLoader, ImageLoaderConfig, LoaderStats, MemoryImageCache, RemoteImageFetcher,
    UrlState,
};
