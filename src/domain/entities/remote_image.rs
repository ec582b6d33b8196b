//! Image entities shared between the loader and its callers.

use std::sync::Arc;

use crate::domain::errors::LoadError;

/// Identifier of a remote image, used as the cache and deduplication key.
///
/// The value is kept exactly as given; two spellings of the same resource,
/// or one padded with whitespace, are two different keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageUrl(String);

impl ImageUrl {
    /// Creates a new `ImageUrl` from any string-like input.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    /// Returns the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ImageUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ImageUrl {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ImageUrl {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl AsRef<str> for ImageUrl {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A decoded image. Cheap to clone; every waiter on a URL shares one bitmap.
pub type Image = Arc<image::DynamicImage>;

/// Outcome of a single load, delivered to every waiter of a fetch.
pub type LoadResult = Result<Image, LoadError>;
