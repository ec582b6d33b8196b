//! Imageloader - concurrent, deduplicating image fetch-and-cache.
//!
//! Callers ask for an image by URL and get a [`RequestHandle`] back at once.
//! The loader answers from its memory cache, joins a fetch already running
//! for the same URL, or starts one; the outcome reaches every waiter on the
//! execution context it asked for.
//!
//! [`RequestHandle`]: domain::entities::RequestHandle

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Domain layer containing entities, errors, and port definitions.
pub mod domain;
/// Infrastructure layer containing the loader and its adapters.
pub mod infrastructure;

/// Current version of the library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name.
pub const NAME: &str = "imageloader";
