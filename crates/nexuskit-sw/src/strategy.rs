//! Fetch interception.
//!
//! Only GET requests outside the bypass list are intercepted. Cross-origin
//! GETs are answered from the precache when a bucket holds them (third
//! party libraries in the manifest) and passed through untouched otherwise;
//! same-origin GETs run one of three strategies, cache-first being the
//! contract the offline experience depends on:
//!
//! 1. Cache lookup; a fresh hit is returned with no network round-trip.
//! 2. On miss, network fetch; a valid (200, basic, unredirected) response
//!    is cloned into the runtime bucket and the original returned.
//! 3. On network failure with nothing cached: navigations get the
//!    precached offline page, everything else a synthesized 503.

use std::sync::Arc;

use http::{header, HeaderValue, StatusCode};
use nexuskit_net::{Fetcher, NetError, Request, Response};
use tokio::sync::RwLock;
use tracing::{debug, trace, warn};
use url::Url;

use crate::cache::{normalize_key, now_ms, CacheEntry, CacheStorage};
use crate::config::WorkerConfig;
use crate::SwError;

/// Fetch-handling policy for intercepted requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheStrategy {
    /// Cache, then network, then offline fallback.
    #[default]
    CacheFirst,
    /// Network, then cache, then offline fallback.
    NetworkFirst,
    /// Serve the cached copy and refresh it in the background.
    StaleWhileRevalidate,
}

/// One intercepted request.
#[derive(Debug, Clone)]
pub struct FetchEvent {
    pub request: Request,
    /// The page that issued the request, when known.
    pub client_id: Option<String>,
}

impl FetchEvent {
    pub fn new(request: Request) -> Self {
        Self {
            request,
            client_id: None,
        }
    }

    /// A navigation request for the given URL.
    pub fn navigation(url: Url) -> Self {
        Self::new(Request::get(url).accept("text/html,application/xhtml+xml"))
    }

    /// A sub-resource GET for the given URL.
    pub fn asset(url: Url) -> Self {
        Self::new(Request::get(url))
    }

    pub fn with_client(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Navigations negotiate HTML; they get the offline page on failure.
    pub fn is_navigation(&self) -> bool {
        self.request.wants_html()
    }
}

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    /// Served from a cache bucket.
    Cache,
    /// Fetched live for an intercepted request.
    Network,
    /// The precached offline page.
    OfflineFallback,
    /// Synthesized by the engine (503).
    Synthesized,
    /// Not intercepted; live response returned unmodified.
    Passthrough,
}

/// A handled fetch.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub response: Response,
    pub source: ResponseSource,
}

/// Applies fetch strategies for one worker version.
///
/// Cheap to clone; concurrent handlers share only the cache storage, whose
/// individual operations are atomic. Two handlers racing to populate the
/// same key is last-write-wins.
#[derive(Clone)]
pub struct FetchInterceptor {
    config: Arc<WorkerConfig>,
    storage: Arc<RwLock<CacheStorage>>,
    fetcher: Arc<dyn Fetcher>,
}

impl FetchInterceptor {
    pub fn new(
        config: Arc<WorkerConfig>,
        storage: Arc<RwLock<CacheStorage>>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        Self {
            config,
            storage,
            fetcher,
        }
    }

    /// Handle a fetch with the configured default strategy.
    pub async fn handle(&self, event: &FetchEvent) -> Result<FetchResult, SwError> {
        self.handle_with(event, self.config.strategy).await
    }

    /// Handle a fetch with an explicit strategy.
    pub async fn handle_with(
        &self,
        event: &FetchEvent,
        strategy: CacheStrategy,
    ) -> Result<FetchResult, SwError> {
        let request = &event.request;
        if !request.is_get() || self.config.bypass.matches(&request.url) {
            trace!(url = %request.url, method = %request.method, "passing through unintercepted");
            let response = self.fetcher.fetch(request).await?;
            return Ok(FetchResult {
                response,
                source: ResponseSource::Passthrough,
            });
        }

        if !request.is_same_origin(&self.config.origin) {
            // Precached third-party assets are served; everything else
            // cross-origin goes to the network untouched and is never
            // written back.
            let key = normalize_key(&request.url);
            if let Some(response) = self.lookup(&key).await? {
                debug!(url = %request.url, "cross-origin precache hit");
                return Ok(FetchResult {
                    response,
                    source: ResponseSource::Cache,
                });
            }
            trace!(url = %request.url, "cross-origin pass-through");
            let response = self.fetcher.fetch(request).await?;
            return Ok(FetchResult {
                response,
                source: ResponseSource::Passthrough,
            });
        }

        match strategy {
            CacheStrategy::CacheFirst => self.cache_first(event).await,
            CacheStrategy::NetworkFirst => self.network_first(event).await,
            CacheStrategy::StaleWhileRevalidate => self.stale_while_revalidate(event).await,
        }
    }

    async fn cache_first(&self, event: &FetchEvent) -> Result<FetchResult, SwError> {
        let key = normalize_key(&event.request.url);
        if let Some(response) = self.lookup(&key).await? {
            debug!(url = %event.request.url, "cache hit");
            return Ok(FetchResult {
                response,
                source: ResponseSource::Cache,
            });
        }

        match self.fetcher.fetch(&event.request).await {
            Ok(response) => {
                self.store_if_cacheable(&event.request, &response).await;
                Ok(FetchResult {
                    response,
                    source: ResponseSource::Network,
                })
            }
            Err(e) => self.fallback(event, e).await,
        }
    }

    async fn network_first(&self, event: &FetchEvent) -> Result<FetchResult, SwError> {
        match self.fetcher.fetch(&event.request).await {
            Ok(response) => {
                self.store_if_cacheable(&event.request, &response).await;
                Ok(FetchResult {
                    response,
                    source: ResponseSource::Network,
                })
            }
            Err(e) => {
                let key = normalize_key(&event.request.url);
                if let Some(response) = self.lookup(&key).await? {
                    debug!(url = %event.request.url, "network failed; serving cached copy");
                    return Ok(FetchResult {
                        response,
                        source: ResponseSource::Cache,
                    });
                }
                self.fallback(event, e).await
            }
        }
    }

    async fn stale_while_revalidate(&self, event: &FetchEvent) -> Result<FetchResult, SwError> {
        let key = normalize_key(&event.request.url);
        if let Some(response) = self.lookup(&key).await? {
            let this = self.clone();
            let request = event.request.clone();
            tokio::spawn(async move { this.revalidate(request).await });
            return Ok(FetchResult {
                response,
                source: ResponseSource::Cache,
            });
        }
        // Nothing cached yet; behave like cache-first on a miss.
        self.cache_first(event).await
    }

    /// Background refresh of one cached URL.
    async fn revalidate(&self, request: Request) {
        match self.fetcher.fetch(&request).await {
            Ok(response) => {
                self.store_if_cacheable(&request, &response).await;
                debug!(url = %request.url, "revalidated cached copy");
            }
            Err(e) => debug!(url = %request.url, error = %e, "revalidation fetch failed"),
        }
    }

    /// Look a key up in the static then runtime bucket. Runtime entries
    /// past `max_age` are evicted and count as misses; precached entries
    /// never expire within a version.
    ///
    /// Hits only take the read lock, so concurrent handlers serve from the
    /// cache without serializing on each other.
    async fn lookup(&self, key: &str) -> Result<Option<Response>, SwError> {
        let now = now_ms();
        let runtime_bucket = self.config.runtime_bucket_name();

        let mut stale_in = None;
        {
            let storage = self.storage.read().await;
            for name in self.config.current_bucket_names() {
                if let Some(entry) = storage.get(&name).and_then(|cache| cache.match_key(key)) {
                    let enforce_age = name == runtime_bucket;
                    if !enforce_age || entry.is_fresh(self.config.max_age, now) {
                        return Ok(Some(entry.to_response()?));
                    }
                    stale_in = Some(name);
                    break;
                }
            }
        }

        if let Some(name) = stale_in {
            // Re-check under the write lock; another handler may have
            // refreshed the entry since the read.
            let mut storage = self.storage.write().await;
            let still_stale = storage
                .get(&name)
                .and_then(|cache| cache.match_key(key))
                .is_some_and(|entry| !entry.is_fresh(self.config.max_age, now_ms()));
            if still_stale {
                trace!(key, bucket = %name, "expired entry evicted");
                storage.open(&name).delete(key);
            }
        }
        Ok(None)
    }

    /// Write a valid response into the runtime bucket, keyed by the
    /// request URL it answered.
    ///
    /// Best-effort side effect: a response that fails the validity check is
    /// simply not stored, and storage trouble never blocks the caller from
    /// returning the live response.
    async fn store_if_cacheable(&self, request: &Request, response: &Response) {
        if !is_cacheable(request, response) {
            trace!(url = %response.url, status = %response.status, "response not cacheable");
            return;
        }
        let entry = CacheEntry::from_response(&request.url, response);
        let bucket = self.config.runtime_bucket_name();
        let mut storage = self.storage.write().await;
        let cache = storage.open(&bucket);
        cache.put(entry);
        if let Some(max) = self.config.max_runtime_entries {
            cache.trim_to(max);
        }
        debug!(url = %response.url, bucket = %bucket, "cached runtime response");
    }

    /// Network failed and nothing was cached.
    async fn fallback(&self, event: &FetchEvent, err: NetError) -> Result<FetchResult, SwError> {
        warn!(url = %event.request.url, error = %err, "network fetch failed with no cache entry");

        if event.is_navigation() {
            let offline_url = self.config.offline_fallback_url()?;
            let key = normalize_key(&offline_url);
            if let Some(response) = self.lookup(&key).await? {
                return Ok(FetchResult {
                    response,
                    source: ResponseSource::OfflineFallback,
                });
            }
            // Offline page was never precached: fail closed.
            return Err(SwError::Network(err));
        }

        Ok(FetchResult {
            response: service_unavailable(event.request.url.clone()),
            source: ResponseSource::Synthesized,
        })
    }
}

/// Only successful, readable, same-origin responses answering at their
/// request URL are ever cached at fetch time; redirects, errors, and
/// opaque responses would poison the bucket with entries the page cannot
/// use.
fn is_cacheable(request: &Request, response: &Response) -> bool {
    response.status == StatusCode::OK
        && response.response_type == nexuskit_net::ResponseType::Basic
        && normalize_key(&response.url) == normalize_key(&request.url)
}

fn service_unavailable(url: Url) -> Response {
    let mut response = Response::with_status(url, StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable");
    response.headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain"),
    );
    response
}
