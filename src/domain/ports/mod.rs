mod image_fetcher_port;
mod image_loader_port;

pub use image_fetcher_port::ImageFetcherPort;
pub use image_loader_port::ImageLoaderPort;

#[cfg(test)]
pub use image_fetcher_port::MockImageFetcherPort;
