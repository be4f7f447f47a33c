//! # NexusKit Common
//!
//! Shared utilities for the NexusKit offline engine crates.
//!
//! ## Features
//!
//! - Logging configuration and setup on top of `tracing`
//! - Retry with exponential backoff and timeout helpers

use std::time::Duration;
use thiserror::Error;

pub mod logging;
pub mod retry;

pub use logging::{init_logging, LogConfig, LogFormat};
pub use retry::{retry, with_timeout, RetryPolicy};

/// Errors produced by the common utilities themselves.
#[derive(Error, Debug)]
pub enum CommonError {
    /// An operation exceeded its deadline.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),
}
