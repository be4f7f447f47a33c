//! A scripted [`Fetcher`] for deterministic tests and demos.
//!
//! Routes map exact URLs to canned responses or simulated failures, the
//! whole fetcher can be flipped offline at runtime, and every fetch is
//! counted so tests can assert on network round-trips.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use hashbrown::HashMap;
use tracing::trace;

use crate::{Fetcher, NetError, Request, Response};

#[derive(Debug, Clone)]
enum Route {
    Respond(Response),
    Unreachable,
}

/// In-memory fetcher with scripted routes.
#[derive(Default)]
pub struct StaticFetcher {
    routes: Mutex<HashMap<String, Route>>,
    offline: AtomicBool,
    calls: Mutex<HashMap<String, usize>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `response` for the given URL.
    pub fn route(&self, url: impl AsRef<str>, response: Response) {
        self.routes
            .lock()
            .expect("route table poisoned")
            .insert(url.as_ref().to_string(), Route::Respond(response));
    }

    /// Simulate an unreachable host for the given URL.
    pub fn fail(&self, url: impl AsRef<str>) {
        self.routes
            .lock()
            .expect("route table poisoned")
            .insert(url.as_ref().to_string(), Route::Unreachable);
    }

    /// Builder-style variant of [`route`](Self::route).
    pub fn with_route(self, url: impl AsRef<str>, response: Response) -> Self {
        self.route(url, response);
        self
    }

    /// Flip the whole network on or off. While offline every fetch fails.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// How many times the given URL was fetched.
    pub fn calls(&self, url: impl AsRef<str>) -> usize {
        self.calls
            .lock()
            .expect("call table poisoned")
            .get(url.as_ref())
            .copied()
            .unwrap_or(0)
    }

    /// Total fetches across all URLs.
    pub fn total_calls(&self) -> usize {
        self.calls
            .lock()
            .expect("call table poisoned")
            .values()
            .sum()
    }
}

#[async_trait]
impl Fetcher for StaticFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, NetError> {
        let key = request.url.as_str().to_string();
        *self
            .calls
            .lock()
            .expect("call table poisoned")
            .entry(key.clone())
            .or_insert(0) += 1;

        if self.offline.load(Ordering::SeqCst) {
            trace!(url = %request.url, "scripted fetch: offline");
            return Err(NetError::Unreachable("simulated offline".to_string()));
        }

        let route = self
            .routes
            .lock()
            .expect("route table poisoned")
            .get(&key)
            .cloned();

        match route {
            Some(Route::Respond(response)) => Ok(response),
            Some(Route::Unreachable) => {
                Err(NetError::Unreachable(format!("no route to {key}")))
            }
            None => Err(NetError::RequestFailed(format!("unrouted URL {key}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_routed_response_and_counts() {
        let fetcher = StaticFetcher::new();
        let target = url("https://nexus-ar.example/js/app.js");
        fetcher.route(target.as_str(), Response::basic(target.clone(), "console.log(1)"));

        let first = fetcher.fetch(&Request::get(target.clone())).await.unwrap();
        let second = fetcher.fetch(&Request::get(target.clone())).await.unwrap();
        assert_eq!(first.body_text(), "console.log(1)");
        assert_eq!(second.body_text(), "console.log(1)");
        assert_eq!(fetcher.calls(target.as_str()), 2);
        assert_eq!(fetcher.total_calls(), 2);
    }

    #[tokio::test]
    async fn test_unrouted_url_fails() {
        let fetcher = StaticFetcher::new();
        let result = fetcher
            .fetch(&Request::get(url("https://nexus-ar.example/nope")))
            .await;
        assert!(matches!(result, Err(NetError::RequestFailed(_))));
    }

    #[tokio::test]
    async fn test_offline_overrides_routes() {
        let fetcher = StaticFetcher::new();
        let target = url("https://nexus-ar.example/");
        fetcher.route(target.as_str(), Response::basic(target.clone(), "home"));

        fetcher.set_offline(true);
        let result = fetcher.fetch(&Request::get(target.clone())).await;
        assert!(matches!(result, Err(NetError::Unreachable(_))));

        fetcher.set_offline(false);
        assert!(fetcher.fetch(&Request::get(target)).await.is_ok());
    }

    #[tokio::test]
    async fn test_scripted_unreachable_route() {
        let fetcher = StaticFetcher::new();
        let target = url("https://fonts.example/font.woff2");
        fetcher.fail(target.as_str());
        let result = fetcher.fetch(&Request::get(target)).await;
        assert!(matches!(result, Err(NetError::Unreachable(_))));
    }
}
