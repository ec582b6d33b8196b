//! Domain layer with core entities and port definitions.

/// Entity definitions.
pub mod entities;
/// Error types.
pub mod errors;
/// Port definitions.
pub mod ports;

pub use entities::{DeliveryContext, DeliveryQueue, ImageUrl, LoadResult, RequestHandle};
pub use errors::{FetchError, LoadError};
pub use ports::{ImageFetcherPort, ImageLoaderPort};
