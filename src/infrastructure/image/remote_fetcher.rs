//! Single-attempt image retrieval and decoding.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Url;
use tracing::{debug, trace};

use crate::domain::entities::{ImageUrl, LoadResult};
use crate::domain::errors::{FetchError, LoadError};
use crate::domain::ports::ImageFetcherPort;

use super::loader::ImageLoaderConfig;

/// Fetches `http`, `https` and `file` URLs and decodes the bytes.
///
/// One attempt per call. Timeouts are a property of the HTTP client, not of
/// this type.
#[derive(Debug, Clone)]
pub struct RemoteImageFetcher {
    http_client: reqwest::Client,
}

impl RemoteImageFetcher {
    /// Creates a fetcher with a client built from `config`.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn new(config: &ImageLoaderConfig) -> Result<Self, FetchError> {
        let mut builder =
            reqwest::Client::builder().timeout(Duration::from_secs(config.timeout_secs));
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let http_client = builder
            .build()
            .map_err(|e| FetchError::request(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { http_client })
    }

    /// Wraps an existing client.
    #[must_use]
    pub const fn with_client(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }

    /// Downloads image bytes from an HTTP(S) URL.
    async fn download(&self, url: Url) -> Result<Bytes, FetchError> {
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }

        response
            .bytes()
            .await
            .map_err(|e| FetchError::body(e.to_string()))
    }

    /// Reads image bytes from a `file` URL.
    async fn read_file(url: &Url) -> Result<Bytes, FetchError> {
        let path = url.to_file_path().map_err(|()| FetchError::InvalidUrl {
            url: url.to_string(),
            reason: "not a local file path".to_string(),
        })?;

        tokio::fs::read(&path)
            .await
            .map(Bytes::from)
            .map_err(|e| FetchError::io(format!("{}: {e}", path.display())))
    }

    /// Decodes bytes off the async workers.
    async fn decode(bytes: Bytes) -> LoadResult {
        let decoded = tokio::task::spawn_blocking(move || image::load_from_memory(&bytes))
            .await
            .map_err(|e| LoadError::decode(format!("Decode task panicked: {e}")))?
            .map_err(|e| LoadError::decode(e.to_string()))?;

        Ok(Arc::new(decoded))
    }
}

#[async_trait]
impl ImageFetcherPort for RemoteImageFetcher {
    async fn fetch(&self, url: &ImageUrl) -> LoadResult {
        let parsed = Url::parse(url.as_str()).map_err(|e| FetchError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let bytes = match parsed.scheme() {
            "http" | "https" => {
                debug!(url = %url, "Downloading image from network");
                self.download(parsed).await?
            }
            "file" => {
                debug!(url = %url, "Reading image from local file");
                Self::read_file(&parsed).await?
            }
            other => {
                return Err(FetchError::UnsupportedScheme {
                    scheme: other.to_string(),
                }
                .into());
            }
        };

        trace!(url = %url, size = bytes.len(), "Decoding image");
        let image = Self::decode(bytes).await?;
        debug!(url = %url, width = image.width(), height = image.height(), "Image decoded");
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    use test_case::test_case;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        image::DynamicImage::new_rgb8(width, height)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    fn fetcher() -> RemoteImageFetcher {
        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        RemoteImageFetcher::with_client(client)
    }

    fn http_response(status_line: &str, body: &[u8]) -> Vec<u8> {
        let mut response = format!(
            "HTTP/1.1 {status_line}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        )
        .into_bytes();
        response.extend_from_slice(body);
        response
    }

    /// Serves one canned response on a local port and returns its URL.
    async fn serve_once(response: Vec<u8>) -> ImageUrl {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let _ = socket.write_all(&response).await;
                let _ = socket.shutdown().await;
            }
        });
        ImageUrl::new(format!("http://{addr}/img.png"))
    }

    #[tokio::test]
    async fn test_http_success_decodes() {
        let url = serve_once(http_response("200 OK", &png_bytes(3, 2))).await;

        let image = fetcher().fetch(&url).await.unwrap();

        assert_eq!((image.width(), image.height()), (3, 2));
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let url = serve_once(http_response("404 Not Found", b"")).await;

        let err = fetcher().fetch(&url).await.unwrap_err();

        assert_eq!(err, LoadError::Fetch(FetchError::Status { status: 404 }));
    }

    #[tokio::test]
    async fn test_http_garbage_is_decode_error() {
        let url = serve_once(http_response("200 OK", b"definitely not an image")).await;

        let err = fetcher().fetch(&url).await.unwrap_err();

        assert!(err.is_decode_error());
    }

    #[tokio::test]
    async fn test_connection_refused_is_request_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let url = ImageUrl::new(format!("http://{addr}/img.png"));
        let err = fetcher().fetch(&url).await.unwrap_err();

        assert!(matches!(err, LoadError::Fetch(FetchError::Request { .. })));
    }

    #[tokio::test]
    async fn test_file_url_success() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("local.png");
        std::fs::write(&path, png_bytes(5, 7)).unwrap();
        let url = ImageUrl::new(Url::from_file_path(&path).unwrap().to_string());

        let image = fetcher().fetch(&url).await.unwrap();

        assert_eq!((image.width(), image.height()), (5, 7));
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.png");
        let url = ImageUrl::new(Url::from_file_path(&path).unwrap().to_string());

        let err = fetcher().fetch(&url).await.unwrap_err();

        assert!(matches!(err, LoadError::Fetch(FetchError::Io { .. })));
    }

    #[test_case("ftp://example.com/a.png", "ftp" ; "ftp")]
    #[test_case("data:image/png;base64,AAAA", "data" ; "data_url")]
    #[tokio::test]
    async fn test_unsupported_scheme(url: &str, scheme: &str) {
        let err = fetcher().fetch(&ImageUrl::new(url)).await.unwrap_err();
        assert_eq!(
            err,
            LoadError::Fetch(FetchError::UnsupportedScheme {
                scheme: scheme.to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_invalid_url() {
        let err = fetcher().fetch(&ImageUrl::new("not a url")).await.unwrap_err();
        assert!(matches!(err, LoadError::Fetch(FetchError::InvalidUrl { .. })));
    }

    #[tokio::test]
    async fn test_new_from_config() {
        let config = ImageLoaderConfig {
            user_agent: Some("imageloader-test".to_string()),
            ..ImageLoaderConfig::default()
        };
        assert!(RemoteImageFetcher::new(&config).is_ok());
    }
}
