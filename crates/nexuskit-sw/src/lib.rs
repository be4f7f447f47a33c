//! # NexusKit Service Worker
//!
//! Offline cache engine for the Nexus AR Connect web app: versioned cache
//! buckets, install-time precaching, stale-bucket eviction, cache-first
//! fetch interception with an offline fallback, and the skip-waiting
//! control message.
//!
//! ## Features
//!
//! - **Precache**: install fetches a fixed asset manifest into a versioned bucket
//! - **Janitor**: activation deletes every bucket not owned by the current version
//! - **Fetch interception**: cache-first (plus network-first and
//!   stale-while-revalidate), offline fallback page, synthesized 503s
//! - **Message relay**: `{"type":"SKIP_WAITING"}` promotes a waiting version
//! - **Explicit configuration**: no module-level cache-name globals; every
//!   handler receives a [`WorkerConfig`]
//!
//! ## Architecture
//!
//! ```text
//! ServiceWorkerEngine
//!     ├── WorkerConfig (version tag, manifest, bucket naming)
//!     ├── Registration (installing / waiting / active versions)
//!     ├── CacheStorage
//!     │       └── Cache bucket ("nexus-ar-cache-v1.0.0")
//!     │               └── URL → CacheEntry
//!     ├── FetchInterceptor (cache-first / network-first / SWR)
//!     └── ClientRegistry (controlled pages)
//! ```

use thiserror::Error;

pub mod cache;
pub mod clients;
pub mod config;
pub mod engine;
pub mod janitor;
pub mod lifecycle;
pub mod message;
pub mod precache;
pub mod strategy;

pub use cache::{Cache, CacheEntry, CacheStorage};
pub use clients::{Client, ClientRegistry};
pub use config::WorkerConfig;
pub use engine::{ServiceWorkerEngine, WorkerEvent};
pub use janitor::JanitorReport;
pub use lifecycle::{Registration, WorkerState, WorkerVersion};
pub use message::ClientMessage;
pub use precache::PrecacheReport;
pub use strategy::{CacheStrategy, FetchEvent, FetchResult, ResponseSource};

use nexuskit_net::NetError;

/// Errors that can occur in the cache engine.
#[derive(Error, Debug)]
pub enum SwError {
    #[error("Install failed: {0}")]
    Install(String),

    #[error("Activation failed: {0}")]
    Activation(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid state transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: lifecycle::WorkerState,
        to: lifecycle::WorkerState,
    },

    #[error("No waiting worker version")]
    NoWaitingWorker,

    #[error("Network error: {0}")]
    Network(#[from] NetError),
}
