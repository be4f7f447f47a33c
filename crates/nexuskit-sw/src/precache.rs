//! Install-time precaching.
//!
//! Fetches every manifest URL into the version's static bucket. The
//! operation is all-or-nothing from the caller's perspective: any fetch
//! failure aborts the install and the partially filled bucket is deleted,
//! leaving the previous version (if any) in control.

use std::sync::Arc;

use nexuskit_common::retry;
use nexuskit_net::{Fetcher, Request, ResponseType};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::cache::{CacheEntry, CacheStorage};
use crate::config::WorkerConfig;
use crate::SwError;

/// What a successful precache run stored.
#[derive(Debug, Default)]
pub struct PrecacheReport {
    /// Resolved URLs written to the static bucket.
    pub cached: Vec<String>,
    /// Cross-origin manifest URLs whose responses were opaque. Unreadable
    /// bodies are never stored; these assets rely on runtime caching.
    pub skipped_opaque: Vec<String>,
}

/// Runs the precache pass for one worker version.
pub struct PrecacheLoader {
    fetcher: Arc<dyn Fetcher>,
}

impl PrecacheLoader {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher }
    }

    /// Fetch and store the whole manifest into the static bucket.
    pub async fn run(
        &self,
        config: &WorkerConfig,
        storage: &Arc<RwLock<CacheStorage>>,
    ) -> Result<PrecacheReport, SwError> {
        let bucket = config.static_bucket_name();
        info!(
            bucket = %bucket,
            assets = config.precache_manifest.len(),
            "precaching static assets"
        );

        let mut report = PrecacheReport::default();

        for entry in &config.precache_manifest {
            let url = config.resolve(entry)?;
            let request = Request::get(url.clone());

            let response = match retry(&config.precache_retry, || async {
                self.fetcher.fetch(&request).await
            })
            .await
            {
                Ok(response) => response,
                Err(e) => {
                    self.abort(&bucket, storage).await;
                    return Err(SwError::Install(format!(
                        "precache fetch failed for {url}: {e}"
                    )));
                }
            };

            if response.response_type == ResponseType::Opaque {
                warn!(url = %url, "opaque precache response; skipping");
                report.skipped_opaque.push(url.into());
                continue;
            }

            if !response.ok() {
                self.abort(&bucket, storage).await;
                return Err(SwError::Install(format!(
                    "precache got HTTP {} for {url}",
                    response.status
                )));
            }

            let cached = CacheEntry::from_response(&url, &response);
            debug!(url = %url, bytes = cached.body.len(), "precached");
            report.cached.push(cached.url.clone());
            storage.write().await.open(&bucket).put(cached);
        }

        info!(
            bucket = %bucket,
            cached = report.cached.len(),
            skipped = report.skipped_opaque.len(),
            "precache complete"
        );
        Ok(report)
    }

    /// Drop the partially filled bucket after a failure.
    async fn abort(&self, bucket: &str, storage: &Arc<RwLock<CacheStorage>>) {
        if storage.write().await.delete(bucket) {
            warn!(bucket = %bucket, "install aborted; partial bucket deleted");
        }
    }
}
