//! Activation-time bucket eviction.
//!
//! Deletes every cache bucket the current version does not own. Runs to
//! completion before the new worker claims clients, so a stale bucket is
//! never read concurrently with the new version serving.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::cache::CacheStorage;
use crate::config::WorkerConfig;

/// Outcome of one sweep.
///
/// Deletion in this storage cannot fail halfway, so a stale-bucket leak
/// only shows up as a name missing from `deleted`; a fallible backend
/// behind [`CacheStorage`] would surface leaks the same way.
#[derive(Debug, Default)]
pub struct JanitorReport {
    /// Stale buckets that were removed.
    pub deleted: Vec<String>,
    /// Buckets owned by the current version and kept.
    pub retained: Vec<String>,
}

/// Delete every bucket not owned by `config`'s version.
pub async fn sweep(config: &WorkerConfig, storage: &Arc<RwLock<CacheStorage>>) -> JanitorReport {
    let current = config.current_bucket_names();
    let mut report = JanitorReport::default();

    let mut storage = storage.write().await;
    for name in storage.names() {
        if current.contains(&name) {
            report.retained.push(name);
            continue;
        }
        debug!(bucket = %name, "deleting stale cache bucket");
        if storage.delete(&name) {
            report.deleted.push(name);
        }
    }

    info!(
        version = %config.version,
        deleted = report.deleted.len(),
        retained = report.retained.len(),
        "janitor sweep complete"
    );
    report
}
