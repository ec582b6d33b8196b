//! Deduplicating image loader.
//!
//! One coordination task owns the decoded-image cache and the table of
//! in-flight fetches. Every lookup and mutation of either happens inside that
//! task, one command at a time, so "check cache, check in-flight, start fetch"
//! is atomic per request and a URL never has two fetches outstanding.
//! Fetches themselves run on spawned tasks and report back with a command.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Semaphore, mpsc, oneshot};
use tracing::{debug, error, info, trace, warn};

use crate::domain::entities::{
    Completion, DeliveryContext, ImageUrl, LoadResult, RequestHandle,
};
use crate::domain::errors::{FetchError, LoadError};
use crate::domain::ports::{ImageFetcherPort, ImageLoaderPort};

use super::memory_cache::{CacheStats, DEFAULT_CACHE_SIZE, MemoryImageCache};
use super::remote_fetcher::RemoteImageFetcher;

/// Configuration for the image loader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageLoaderConfig {
    /// Maximum images in memory cache. Zero means unbounded.
    pub memory_cache_size: usize,
    /// Maximum fetches running at once.
    pub max_concurrent_fetches: usize,
    /// HTTP request timeout in seconds.
    pub timeout_secs: u64,
    /// User agent sent with HTTP requests.
    pub user_agent: Option<String>,
}

impl Default for ImageLoaderConfig {
    fn default() -> Self {
        Self {
            memory_cache_size: DEFAULT_CACHE_SIZE,
            max_concurrent_fetches: 8,
            timeout_secs: 30,
            user_agent: Some(format!("{}/{}", crate::NAME, crate::VERSION)),
        }
    }
}

/// Snapshot of loader activity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoaderStats {
    /// Memory cache counters.
    pub cache: CacheStats,
    /// URLs with a fetch outstanding.
    pub in_flight: usize,
    /// Handles waiting on those fetches, cancelled ones included.
    pub waiters: usize,
    /// Requests that joined an existing fetch.
    pub joins: u64,
    /// Fetches dispatched.
    pub fetches_started: u64,
    /// Fetches that produced an image.
    pub fetches_succeeded: u64,
    /// Fetches that produced an error.
    pub fetches_failed: u64,
}

/// Where a URL currently stands in the loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlState {
    /// Decoded image is cached.
    Cached,
    /// A fetch is outstanding with this many waiters.
    InFlight {
        /// Handles on the fetch that are still pending.
        waiters: usize,
    },
    /// Neither cached nor being fetched.
    Absent,
}

/// Waiter count at which a join first sweeps cancelled handles.
const PRUNE_THRESHOLD: usize = 16;

#[derive(Debug)]
enum LoaderCommand {
    Load {
        url: ImageUrl,
        handle: Option<RequestHandle>,
        /// Route back for the fetch this request may start.
        reply_tx: mpsc::UnboundedSender<LoaderCommand>,
    },
    FetchCompleted {
        url: ImageUrl,
        result: LoadResult,
    },
    Evict {
        url: ImageUrl,
        reply: oneshot::Sender<bool>,
    },
    Clear,
    Query {
        url: ImageUrl,
        reply: oneshot::Sender<UrlState>,
    },
    Stats {
        reply: oneshot::Sender<LoaderStats>,
    },
}

/// Loads images by URL, fetching each at most once while it is in flight.
///
/// Cloning is cheap; clones share one cache and one in-flight table.
#[derive(Clone)]
pub struct ImageLoader {
    command_tx: mpsc::UnboundedSender<LoaderCommand>,
    default_context: DeliveryContext,
    config: ImageLoaderConfig,
}

impl std::fmt::Debug for ImageLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageLoader")
            .field("config", &self.config)
            .field("default_context", &self.default_context)
            .finish_non_exhaustive()
    }
}

impl ImageLoader {
    /// Creates a loader that fetches through `fetcher`.
    ///
    /// Completions run on the calling Tokio runtime unless a request says
    /// otherwise.
    ///
    /// # Panics
    /// Panics if called outside a Tokio runtime.
    pub fn new(config: ImageLoaderConfig, fetcher: Arc<dyn ImageFetcherPort>) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let coordinator = Coordinator {
            cache: MemoryImageCache::new(config.memory_cache_size),
            in_flight: HashMap::new(),
            fetcher,
            semaphore: Arc::new(Semaphore::new(config.max_concurrent_fetches.max(1))),
            joins: 0,
            fetches_started: 0,
            fetches_succeeded: 0,
            fetches_failed: 0,
        };

        tokio::spawn(coordinator.run(command_rx));

        info!(
            cache_size = config.memory_cache_size,
            max_concurrent_fetches = config.max_concurrent_fetches,
            "Image loader started"
        );

        Self {
            command_tx,
            default_context: DeliveryContext::current(),
            config,
        }
    }

    /// Creates a loader backed by [`RemoteImageFetcher`].
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn from_config(config: ImageLoaderConfig) -> Result<Self, FetchError> {
        let fetcher = Arc::new(RemoteImageFetcher::new(&config)?);
        Ok(Self::new(config, fetcher))
    }

    /// Creates a network loader with default configuration.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn with_defaults() -> Result<Self, FetchError> {
        Self::from_config(ImageLoaderConfig::default())
    }

    /// Replaces the context completions run on when a request names none.
    #[must_use]
    pub fn with_default_context(mut self, context: DeliveryContext) -> Self {
        self.default_context = context;
        self
    }

    /// Returns the loader configuration.
    #[must_use]
    pub const fn config(&self) -> &ImageLoaderConfig {
        &self.config
    }

    /// Requests `url`, running `completion` on the default context.
    pub fn load<F>(&self, url: impl Into<ImageUrl>, completion: F) -> RequestHandle
    where
        F: FnOnce(LoadResult) + Send + 'static,
    {
        self.load_on(url, self.default_context.clone(), completion)
    }

    /// Requests `url`, running `completion` on `context`.
    ///
    /// Returns at once. The handle may be cancelled at any point; doing so only
    /// silences this request.
    ///
    /// [`DeliveryContext::Inline`] completions run on the loader's
    /// coordination task and must not block.
    pub fn load_on<F>(
        &self,
        url: impl Into<ImageUrl>,
        context: DeliveryContext,
        completion: F,
    ) -> RequestHandle
    where
        F: FnOnce(LoadResult) + Send + 'static,
    {
        let url = url.into();
        let handle = RequestHandle::new(move |result| context.dispatch(move || completion(result)));

        trace!(url = %url, "Queueing image request");
        self.send(LoaderCommand::Load {
            url,
            handle: Some(handle.clone()),
            reply_tx: self.command_tx.clone(),
        });

        handle
    }

    /// Loads `url` and waits for the result.
    pub async fn load_image(&self, url: impl Into<ImageUrl>) -> LoadResult {
        let (tx, rx) = oneshot::channel();
        let _handle = self.load_on(url, DeliveryContext::Inline, move |result| {
            let _ = tx.send(result);
        });
        rx.await.unwrap_or_else(|_| Err(shutdown_error()))
    }

    /// Starts loading `url` into the cache without a callback.
    pub fn prefetch(&self, url: impl Into<ImageUrl>) {
        self.send(LoaderCommand::Load {
            url: url.into(),
            handle: None,
            reply_tx: self.command_tx.clone(),
        });
    }

    /// Prefetches multiple images into cache.
    pub fn prefetch_batch<I>(&self, urls: I)
    where
        I: IntoIterator,
        I::Item: Into<ImageUrl>,
    {
        for url in urls {
            self.prefetch(url);
        }
    }

    /// Drops the cached image for `url`. Returns whether one was cached.
    pub async fn evict(&self, url: impl Into<ImageUrl>) -> bool {
        let (reply, rx) = oneshot::channel();
        self.send(LoaderCommand::Evict {
            url: url.into(),
            reply,
        });
        rx.await.unwrap_or(false)
    }

    /// Drops every cached image. Fetches in flight are unaffected.
    pub fn clear(&self) {
        self.send(LoaderCommand::Clear);
    }

    /// Reports whether `url` is cached, in flight, or neither.
    pub async fn state_of(&self, url: impl Into<ImageUrl>) -> UrlState {
        let (reply, rx) = oneshot::channel();
        self.send(LoaderCommand::Query {
            url: url.into(),
            reply,
        });
        rx.await.unwrap_or(UrlState::Absent)
    }

    /// Returns loader statistics.
    ///
    /// The snapshot reflects every request made before this call.
    pub async fn stats(&self) -> LoaderStats {
        let (reply, rx) = oneshot::channel();
        self.send(LoaderCommand::Stats { reply });
        rx.await.unwrap_or_default()
    }

    fn send(&self, command: LoaderCommand) {
        if let Err(mpsc::error::SendError(command)) = self.command_tx.send(command) {
            error!("Image loader stopped, dropping command");
            if let LoaderCommand::Load {
                handle: Some(handle),
                ..
            } = command
            {
                handle.complete(Err(shutdown_error()));
            }
        }
    }
}

impl ImageLoaderPort for ImageLoader {
    fn load(&self, url: ImageUrl, completion: Completion) -> RequestHandle {
        Self::load(self, url, completion)
    }

    fn load_on(
        &self,
        url: ImageUrl,
        context: DeliveryContext,
        completion: Completion,
    ) -> RequestHandle {
        Self::load_on(self, url, context, completion)
    }

    fn prefetch(&self, url: ImageUrl) {
        Self::prefetch(self, url);
    }
}

fn shutdown_error() -> LoadError {
    FetchError::interrupted("image loader shut down").into()
}

/// Waiters registered on one outstanding fetch.
struct InFlight {
    waiters: Vec<RequestHandle>,
    prune_at: usize,
}

impl InFlight {
    fn new(handle: Option<RequestHandle>) -> Self {
        Self {
            waiters: handle.into_iter().collect(),
            prune_at: PRUNE_THRESHOLD,
        }
    }

    /// Adds a waiter, sweeping cancelled ones once the list has doubled.
    fn join(&mut self, handle: RequestHandle) {
        if self.waiters.len() >= self.prune_at {
            self.waiters.retain(RequestHandle::is_pending);
            self.prune_at = (self.waiters.len() * 2).max(PRUNE_THRESHOLD);
        }
        self.waiters.push(handle);
    }

    fn live_waiters(&self) -> usize {
        self.waiters.iter().filter(|w| w.is_pending()).count()
    }
}

/// State owned by the coordination task.
struct Coordinator {
    cache: MemoryImageCache,
    in_flight: HashMap<ImageUrl, InFlight>,
    fetcher: Arc<dyn ImageFetcherPort>,
    semaphore: Arc<Semaphore>,
    joins: u64,
    fetches_started: u64,
    fetches_succeeded: u64,
    fetches_failed: u64,
}

impl Coordinator {
    /// Processes commands until every loader handle and fetch task is gone.
    ///
    /// Load commands carry a sender of their own, so a request accepted
    /// before the last loader is dropped still gets its fetch.
    async fn run(mut self, mut command_rx: mpsc::UnboundedReceiver<LoaderCommand>) {
        while let Some(command) = command_rx.recv().await {
            self.handle(command);
        }
        debug!("Image loader coordination loop stopped");
    }

    fn handle(&mut self, command: LoaderCommand) {
        match command {
            LoaderCommand::Load {
                url,
                handle,
                reply_tx,
            } => self.on_load(url, handle, reply_tx),
            LoaderCommand::FetchCompleted { url, result } => self.on_fetch_completed(&url, result),
            LoaderCommand::Evict { url, reply } => {
                let _ = reply.send(self.cache.evict(&url));
            }
            LoaderCommand::Clear => self.cache.clear(),
            LoaderCommand::Query { url, reply } => {
                let _ = reply.send(self.state_of(&url));
            }
            LoaderCommand::Stats { reply } => {
                let _ = reply.send(self.stats());
            }
        }
    }

    fn on_load(
        &mut self,
        url: ImageUrl,
        handle: Option<RequestHandle>,
        reply_tx: mpsc::UnboundedSender<LoaderCommand>,
    ) {
        if let Some(image) = self.cache.get(&url) {
            debug!(url = %url, "Serving image from memory cache");
            if let Some(handle) = handle {
                handle.complete(Ok(image));
            }
            return;
        }

        if let Some(entry) = self.in_flight.get_mut(&url) {
            if let Some(handle) = handle {
                entry.join(handle);
                self.joins += 1;
            }
            debug!(url = %url, waiters = entry.waiters.len(), "Joined in-flight fetch");
            return;
        }

        self.in_flight.insert(url.clone(), InFlight::new(handle));
        self.start_fetch(url, reply_tx);
    }

    fn start_fetch(&mut self, url: ImageUrl, command_tx: mpsc::UnboundedSender<LoaderCommand>) {
        self.fetches_started += 1;
        debug!(url = %url, "Starting image fetch");

        let fetcher = self.fetcher.clone();
        let semaphore = self.semaphore.clone();

        tokio::spawn(async move {
            let result = {
                let _permit = semaphore.acquire_owned().await.ok();
                let fetch_url = url.clone();
                tokio::spawn(async move { fetcher.fetch(&fetch_url).await })
                    .await
                    .unwrap_or_else(|e| {
                        Err(FetchError::interrupted(format!("fetch task failed: {e}")).into())
                    })
            };

            if command_tx
                .send(LoaderCommand::FetchCompleted { url, result })
                .is_err()
            {
                error!("Image loader stopped before fetch completed");
            }
        });
    }

    fn on_fetch_completed(&mut self, url: &ImageUrl, result: LoadResult) {
        match &result {
            Ok(image) => {
                self.fetches_succeeded += 1;
                self.cache.put(url.clone(), image.clone());
            }
            Err(e) => {
                self.fetches_failed += 1;
                warn!(url = %url, error = %e, "Image fetch failed");
            }
        }

        let waiters = self
            .in_flight
            .remove(url)
            .map(|entry| entry.waiters)
            .unwrap_or_default();
        let total = waiters.len();
        let delivered = waiters
            .into_iter()
            .filter(|waiter| waiter.complete(result.clone()))
            .count();

        debug!(url = %url, waiters = total, delivered, ok = result.is_ok(), "Image fetch finished");
    }

    fn state_of(&self, url: &ImageUrl) -> UrlState {
        if self.cache.contains(url) {
            UrlState::Cached
        } else if let Some(entry) = self.in_flight.get(url) {
            UrlState::InFlight {
                waiters: entry.live_waiters(),
            }
        } else {
            UrlState::Absent
        }
    }

    fn stats(&self) -> LoaderStats {
        LoaderStats {
            cache: self.cache.stats(),
            in_flight: self.in_flight.len(),
            waiters: self.in_flight.values().map(|entry| entry.waiters.len()).sum(),
            joins: self.joins,
            fetches_started: self.fetches_started,
            fetches_succeeded: self.fetches_succeeded,
            fetches_failed: self.fetches_failed,
        }
    }
}
