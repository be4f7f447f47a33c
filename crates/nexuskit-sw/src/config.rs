//! Per-version worker configuration.
//!
//! The version tag, manifest, and bucket naming all live here so handlers
//! can be tested with injected version strings instead of reading globals.

use std::time::Duration;

use nexuskit_common::RetryPolicy;
use nexuskit_net::BypassList;
use url::Url;

use crate::strategy::CacheStrategy;
use crate::SwError;

/// Configuration of one worker version.
///
/// Immutable once installed; a deploy that changes the precache manifest
/// must bump `version` so the janitor evicts the old buckets.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// App name, the first half of every bucket name.
    pub app_name: String,
    /// Version tag (semver), the second half of every bucket name.
    pub version: String,
    /// Origin this worker controls; requests elsewhere are never intercepted.
    pub origin: Url,
    /// URLs fetched unconditionally at install time. Local paths are
    /// resolved against `origin`; absolute URLs may be cross-origin.
    pub precache_manifest: Vec<String>,
    /// Path of the page served to navigations when both network and cache
    /// fail. Must itself be in the manifest or the fallback fails closed.
    pub offline_fallback: String,
    /// Requests that are never intercepted (devtools, live reload, ...).
    pub bypass: BypassList,
    /// Default strategy for intercepted requests.
    pub strategy: CacheStrategy,
    /// Cap on runtime bucket entries; oldest entries are evicted past it.
    pub max_runtime_entries: Option<usize>,
    /// Age past which a runtime-cached response counts as a miss. Precached
    /// entries never expire; they live and die with the version.
    pub max_age: Option<Duration>,
    /// Backoff for individual precache fetches. Default: one attempt, per
    /// the install contract (no automatic retry).
    pub precache_retry: RetryPolicy,
}

impl WorkerConfig {
    /// Create a configuration with an empty manifest and defaults.
    pub fn new(app_name: impl Into<String>, version: impl Into<String>, origin: Url) -> Self {
        Self {
            app_name: app_name.into(),
            version: version.into(),
            origin,
            precache_manifest: Vec::new(),
            offline_fallback: "/offline.html".to_string(),
            bypass: BypassList::standard(),
            strategy: CacheStrategy::CacheFirst,
            max_runtime_entries: None,
            max_age: None,
            precache_retry: RetryPolicy::none(),
        }
    }

    /// Set the precache manifest.
    pub fn with_manifest<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.precache_manifest = urls.into_iter().map(Into::into).collect();
        self
    }

    /// Set the offline fallback path.
    pub fn with_offline_fallback(mut self, path: impl Into<String>) -> Self {
        self.offline_fallback = path.into();
        self
    }

    /// Set the default fetch strategy.
    pub fn with_strategy(mut self, strategy: CacheStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Cap the runtime bucket.
    pub fn with_max_runtime_entries(mut self, max: usize) -> Self {
        self.max_runtime_entries = Some(max);
        self
    }

    /// Expire cached responses after `max_age`.
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    /// Set the per-asset precache retry policy.
    pub fn with_precache_retry(mut self, policy: RetryPolicy) -> Self {
        self.precache_retry = policy;
        self
    }

    /// Name of the precache bucket: `<app-name>-cache-<version>`.
    pub fn static_bucket_name(&self) -> String {
        format!("{}-cache-{}", self.app_name, self.version)
    }

    /// Name of the bucket for responses cached at fetch time.
    pub fn runtime_bucket_name(&self) -> String {
        format!("{}-runtime-{}", self.app_name, self.version)
    }

    /// Every bucket this version owns; anything else is stale.
    pub fn current_bucket_names(&self) -> [String; 2] {
        [self.static_bucket_name(), self.runtime_bucket_name()]
    }

    /// Resolve a manifest entry or path against the worker origin.
    pub fn resolve(&self, path_or_url: &str) -> Result<Url, SwError> {
        if path_or_url.starts_with("http://") || path_or_url.starts_with("https://") {
            Url::parse(path_or_url)
                .map_err(|e| SwError::Config(format!("invalid manifest URL {path_or_url}: {e}")))
        } else {
            self.origin
                .join(path_or_url)
                .map_err(|e| SwError::Config(format!("cannot resolve {path_or_url}: {e}")))
        }
    }

    /// Absolute URL of the offline fallback page.
    pub fn offline_fallback_url(&self) -> Result<Url, SwError> {
        self.resolve(&self.offline_fallback)
    }

    /// Sanity-check the configuration.
    ///
    /// The offline fallback must be in the manifest; a fallback that was
    /// never precached returns nothing when the network is genuinely down.
    pub fn validate(&self) -> Result<(), SwError> {
        if self.app_name.is_empty() || self.version.is_empty() {
            return Err(SwError::Config(
                "app_name and version must be non-empty".to_string(),
            ));
        }
        let fallback = self.offline_fallback_url()?;
        for entry in &self.precache_manifest {
            if self.resolve(entry)? == fallback {
                return Ok(());
            }
        }
        Err(SwError::Config(format!(
            "offline fallback {} is not in the precache manifest",
            self.offline_fallback
        )))
    }
}
