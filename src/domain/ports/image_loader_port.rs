//! Port through which presentation code requests images.

use crate::domain::entities::{Completion, DeliveryContext, ImageUrl, RequestHandle};

/// Entry point for views that need an image for a URL.
///
/// Every method returns without waiting on the network.
pub trait ImageLoaderPort: Send + Sync {
    /// Requests `url`, running `completion` on the loader's default context.
    fn load(&self, url: ImageUrl, completion: Completion) -> RequestHandle;

    /// Requests `url`, running `completion` on `context`.
    fn load_on(
        &self,
        url: ImageUrl,
        context: DeliveryContext,
        completion: Completion,
    ) -> RequestHandle;

    /// Warms the cache for `url` without a callback.
    fn prefetch(&self, url: ImageUrl);
}
