//! Named, versioned cache buckets.
//!
//! A bucket maps normalized request URLs to stored responses. Buckets are
//! created at install time, read by the fetch interceptor, and deleted by
//! the janitor once their version is superseded. Individual operations are
//! atomic behind the engine's lock; nothing composes across operations, so
//! two concurrent fetch handlers racing to populate the same key is
//! last-write-wins by design of the calling code.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use hashbrown::HashMap;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use nexuskit_net::{Response, ResponseType};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::SwError;

/// Milliseconds since the Unix epoch.
pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Cache key for a request URL: the URL without its fragment.
pub fn normalize_key(url: &Url) -> String {
    let mut key = url.clone();
    key.set_fragment(None);
    key.into()
}

/// A stored response.
///
/// Only readable responses are ever stored, so the entry keeps real status,
/// headers, and body. `cors` records whether the response was cross-origin
/// CORS-approved rather than same-origin basic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub url: String,
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub cors: bool,
    /// Milliseconds since epoch at store time.
    pub cached_at: u64,
}

impl CacheEntry {
    /// Capture a response under the request URL it answered, so later
    /// lookups by request URL find it even when the network reported a
    /// different final URL. The caller decides cacheability first.
    pub fn from_response(request_url: &Url, response: &Response) -> Self {
        let headers = response
            .headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        Self {
            url: normalize_key(request_url),
            status: response.status.as_u16(),
            headers,
            body: response.body.to_vec(),
            cors: response.response_type == ResponseType::Cors,
            cached_at: now_ms(),
        }
    }

    /// Rehydrate the stored response.
    pub fn to_response(&self) -> Result<Response, SwError> {
        let url = Url::parse(&self.url)
            .map_err(|e| SwError::Cache(format!("corrupt entry URL {}: {e}", self.url)))?;
        let status = StatusCode::from_u16(self.status)
            .map_err(|e| SwError::Cache(format!("corrupt entry status {}: {e}", self.status)))?;
        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            if let (Ok(n), Ok(v)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                headers.insert(n, v);
            }
        }
        Ok(Response {
            url,
            status,
            headers,
            body: self.body.clone().into(),
            response_type: if self.cors {
                ResponseType::Cors
            } else {
                ResponseType::Basic
            },
        })
    }

    /// Whether the entry is still usable under the given age limit.
    pub fn is_fresh(&self, max_age: Option<Duration>, now_ms: u64) -> bool {
        match max_age {
            Some(limit) => {
                u128::from(now_ms.saturating_sub(self.cached_at)) <= limit.as_millis()
            }
            None => true,
        }
    }
}

/// One named cache bucket.
#[derive(Debug, Default)]
pub struct Cache {
    name: String,
    entries: HashMap<String, CacheEntry>,
}

impl Cache {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up by normalized URL key.
    pub fn match_key(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Insert an entry, keyed by its own URL. Replaces any existing entry.
    pub fn put(&mut self, entry: CacheEntry) {
        self.entries.insert(entry.url.clone(), entry);
    }

    /// Remove an entry. Returns whether it existed.
    pub fn delete(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// All stored keys.
    pub fn keys(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Evict oldest entries until at most `max` remain.
    pub fn trim_to(&mut self, max: usize) {
        while self.entries.len() > max {
            let oldest = self
                .entries
                .iter()
                .min_by(|(ka, a), (kb, b)| a.cached_at.cmp(&b.cached_at).then(ka.cmp(kb)))
                .map(|(k, _)| k.clone());
            match oldest {
                Some(key) => {
                    self.entries.remove(&key);
                }
                None => break,
            }
        }
    }

    /// Drop entries older than `max_age`. Returns how many were removed.
    pub fn purge_expired(&mut self, max_age: Duration, now_ms: u64) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.is_fresh(Some(max_age), now_ms));
        before - self.entries.len()
    }
}

/// All cache buckets, keyed by name.
#[derive(Debug, Default)]
pub struct CacheStorage {
    caches: HashMap<String, Cache>,
}

impl CacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a bucket, creating it if absent.
    pub fn open(&mut self, name: &str) -> &mut Cache {
        self.caches
            .entry(name.to_string())
            .or_insert_with(|| Cache::new(name))
    }

    /// Read-only access to an existing bucket.
    pub fn get(&self, name: &str) -> Option<&Cache> {
        self.caches.get(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.caches.contains_key(name)
    }

    /// Delete a bucket. Returns whether it existed.
    pub fn delete(&mut self, name: &str) -> bool {
        self.caches.remove(name).is_some()
    }

    /// All bucket names, sorted for stable iteration.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.caches.keys().cloned().collect();
        names.sort();
        names
    }

    /// Look a key up across the given buckets, in order.
    pub fn match_in(&self, buckets: &[String], key: &str) -> Option<&CacheEntry> {
        buckets
            .iter()
            .filter_map(|name| self.caches.get(name))
            .find_map(|cache| cache.match_key(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(url: &str, cached_at: u64) -> CacheEntry {
        CacheEntry {
            url: url.to_string(),
            status: 200,
            headers: HashMap::new(),
            body: b"body".to_vec(),
            cors: false,
            cached_at,
        }
    }

    #[test]
    fn test_normalize_key_strips_fragment() {
        let url = Url::parse("https://nexus-ar.example/index.html#section").unwrap();
        assert_eq!(normalize_key(&url), "https://nexus-ar.example/index.html");
    }

    #[test]
    fn test_put_match_delete() {
        let mut cache = Cache::new("nexus-ar-cache-v1.0.0");
        cache.put(entry("https://nexus-ar.example/js/app.js", 1));

        assert!(cache.match_key("https://nexus-ar.example/js/app.js").is_some());
        assert!(cache.match_key("https://nexus-ar.example/other.js").is_none());
        assert!(cache.delete("https://nexus-ar.example/js/app.js"));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_put_replaces_existing_key() {
        let mut cache = Cache::new("test");
        cache.put(entry("https://nexus-ar.example/a", 1));
        let mut newer = entry("https://nexus-ar.example/a", 2);
        newer.body = b"newer".to_vec();
        cache.put(newer);

        assert_eq!(cache.len(), 1);
        assert_eq!(
            cache.match_key("https://nexus-ar.example/a").unwrap().body,
            b"newer"
        );
    }

    #[test]
    fn test_trim_evicts_oldest_first() {
        let mut cache = Cache::new("runtime");
        cache.put(entry("https://nexus-ar.example/a", 10));
        cache.put(entry("https://nexus-ar.example/b", 20));
        cache.put(entry("https://nexus-ar.example/c", 30));

        cache.trim_to(2);
        assert_eq!(cache.len(), 2);
        assert!(cache.match_key("https://nexus-ar.example/a").is_none());
        assert!(cache.match_key("https://nexus-ar.example/c").is_some());
    }

    #[test]
    fn test_purge_expired() {
        let mut cache = Cache::new("runtime");
        cache.put(entry("https://nexus-ar.example/old", 0));
        cache.put(entry("https://nexus-ar.example/new", 9_500));

        let removed = cache.purge_expired(Duration::from_secs(1), 10_000);
        assert_eq!(removed, 1);
        assert!(cache.match_key("https://nexus-ar.example/new").is_some());
    }

    #[test]
    fn test_entry_freshness() {
        let e = entry("https://nexus-ar.example/a", 1_000);
        assert!(e.is_fresh(None, u64::MAX));
        assert!(e.is_fresh(Some(Duration::from_secs(1)), 1_900));
        assert!(!e.is_fresh(Some(Duration::from_secs(1)), 2_100));
    }

    #[test]
    fn test_entry_keyed_by_request_url() {
        let request = Url::parse("https://nexus-ar.example/app#section").unwrap();
        let landed = Url::parse("https://nexus-ar.example/app/index.html").unwrap();
        let entry = CacheEntry::from_response(&request, &Response::basic(landed, "moved"));
        assert_eq!(entry.url, "https://nexus-ar.example/app");
    }

    #[test]
    fn test_entry_roundtrip() {
        let url = Url::parse("https://nexus-ar.example/manifest.json").unwrap();
        let mut response = Response::basic(url.clone(), "{\"name\":\"nexus\"}");
        response.headers.insert(
            http::header::CONTENT_TYPE,
            http::HeaderValue::from_static("application/json"),
        );

        let entry = CacheEntry::from_response(&url, &response);
        let restored = entry.to_response().unwrap();

        assert_eq!(restored.status, StatusCode::OK);
        assert_eq!(restored.body_text(), "{\"name\":\"nexus\"}");
        assert_eq!(
            restored.headers.get(http::header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
        assert_eq!(restored.response_type, ResponseType::Basic);
    }

    #[test]
    fn test_storage_open_has_delete() {
        let mut storage = CacheStorage::new();
        assert!(!storage.has("v1"));
        storage.open("v1");
        assert!(storage.has("v1"));
        assert!(storage.delete("v1"));
        assert!(!storage.delete("v1"));
    }

    #[test]
    fn test_storage_match_in_respects_order() {
        let mut storage = CacheStorage::new();
        let mut static_entry = entry("https://nexus-ar.example/a", 1);
        static_entry.body = b"static".to_vec();
        storage.open("static").put(static_entry);
        let mut runtime_entry = entry("https://nexus-ar.example/a", 2);
        runtime_entry.body = b"runtime".to_vec();
        storage.open("runtime").put(runtime_entry);

        let buckets = vec!["static".to_string(), "runtime".to_string()];
        let hit = storage.match_in(&buckets, "https://nexus-ar.example/a").unwrap();
        assert_eq!(hit.body, b"static");

        let missing = storage.match_in(&buckets, "https://nexus-ar.example/b");
        assert!(missing.is_none());
    }
}
