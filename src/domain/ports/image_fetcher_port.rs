//! Port for retrieving and decoding a single remote image.

use async_trait::async_trait;

use crate::domain::entities::{ImageUrl, LoadResult};

/// One-shot fetch of a URL into a decoded image.
///
/// Implementations make a single attempt: no retries, no caching. Transport
/// failures map to [`LoadError::Fetch`](crate::domain::errors::LoadError::Fetch)
/// and undecodable bytes to
/// [`LoadError::Decode`](crate::domain::errors::LoadError::Decode).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageFetcherPort: Send + Sync {
    /// Fetches and decodes the image at `url`.
    async fn fetch(&self, url: &ImageUrl) -> LoadResult;
}
