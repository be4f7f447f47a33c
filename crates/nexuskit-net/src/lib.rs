//! # NexusKit Net
//!
//! HTTP model and fetch seam for the NexusKit offline engine.
//!
//! ## Design Goals
//!
//! 1. **Small request/response model**: just enough of HTTP for cache
//!    decisions (method, URL, headers, status, body, response type)
//! 2. **Injectable network**: the [`Fetcher`] trait lets the engine run
//!    against live HTTP or a scripted stand-in
//! 3. **Response classification**: basic / CORS / opaque, mirroring what
//!    the page is allowed to read

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use thiserror::Error;
use tracing::{debug, trace};
use url::Url;

pub mod bypass;
pub mod scripted;

pub use bypass::{BypassList, BypassPattern};
pub use scripted::StaticFetcher;

/// Errors that can occur while fetching.
#[derive(Error, Debug)]
pub enum NetError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Network unreachable: {0}")]
    Unreachable(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// An outgoing request as seen by the fetch interceptor.
#[derive(Debug, Clone)]
pub struct Request {
    pub url: Url,
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl Request {
    /// Create a GET request.
    pub fn get(url: Url) -> Self {
        Self {
            url,
            method: Method::GET,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Create a POST request.
    pub fn post(url: Url, body: Bytes) -> Self {
        Self {
            url,
            method: Method::POST,
            headers: HeaderMap::new(),
            body: Some(body),
        }
    }

    /// Add a header.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Set the Accept header.
    pub fn accept(self, value: &'static str) -> Self {
        self.header(header::ACCEPT, HeaderValue::from_static(value))
    }

    /// Whether this is a GET request.
    pub fn is_get(&self) -> bool {
        self.method == Method::GET
    }

    /// Whether the request negotiates an HTML document (a navigation).
    pub fn wants_html(&self) -> bool {
        self.headers
            .get(header::ACCEPT)
            .and_then(|v| v.to_str().ok())
            .map(|accept| accept.contains("text/html"))
            .unwrap_or(false)
    }

    /// Whether the request targets the given origin.
    pub fn is_same_origin(&self, origin: &Url) -> bool {
        self.url.origin() == origin.origin()
    }
}

/// How much of a response the requesting page may read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseType {
    /// Same-origin; fully readable.
    Basic,
    /// Cross-origin with CORS approval; readable.
    Cors,
    /// Cross-origin without CORS; status and body are hidden.
    Opaque,
}

impl ResponseType {
    /// Classify a response by comparing origins and CORS headers.
    pub fn classify(request_url: &Url, response_url: &Url, headers: &HeaderMap) -> Self {
        if request_url.origin() == response_url.origin() {
            return Self::Basic;
        }
        match headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN) {
            Some(_) => Self::Cors,
            None => Self::Opaque,
        }
    }
}

/// A fetched response.
#[derive(Debug, Clone)]
pub struct Response {
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub response_type: ResponseType,
}

impl Response {
    /// Build a same-origin 200 response. Intended for tests and fallbacks.
    pub fn basic(url: Url, body: impl Into<Bytes>) -> Self {
        Self {
            url,
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: body.into(),
            response_type: ResponseType::Basic,
        }
    }

    /// Build a same-origin response with an explicit status.
    pub fn with_status(url: Url, status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            url,
            status,
            headers: HeaderMap::new(),
            body: body.into(),
            response_type: ResponseType::Basic,
        }
    }

    /// Build an opaque cross-origin response (empty body, status hidden).
    pub fn opaque(url: Url) -> Self {
        Self {
            url,
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            response_type: ResponseType::Opaque,
        }
    }

    /// Whether the status is 2xx.
    pub fn ok(&self) -> bool {
        self.status.is_success()
    }

    /// Body as UTF-8 text, lossy.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Parsed Content-Type, when present and well-formed.
    pub fn content_type(&self) -> Option<mime::Mime> {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
    }

    /// Whether the response carries an HTML document.
    pub fn is_html(&self) -> bool {
        self.content_type()
            .map(|m| m.type_() == mime::TEXT && m.subtype() == mime::HTML)
            .unwrap_or(false)
    }
}

/// The network seam: everything the engine knows about the outside world.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Perform the request against the network.
    async fn fetch(&self, request: &Request) -> Result<Response, NetError>;
}

/// Configuration for the live HTTP fetcher.
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// User agent string.
    pub user_agent: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Maximum redirects to follow.
    pub max_redirects: usize,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            user_agent: "NexusKit/1.0".to_string(),
            timeout: Duration::from_secs(30),
            max_redirects: 10,
        }
    }
}

/// Live [`Fetcher`] backed by reqwest.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Create a fetcher with the given configuration.
    pub fn new(config: FetcherConfig) -> Result<Self, NetError> {
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()
            .map_err(|e| NetError::RequestFailed(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, NetError> {
        debug!(url = %request.url, method = %request.method, "fetching");

        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone());
        for (name, value) in request.headers.iter() {
            builder = builder.header(name, value);
        }
        if let Some(ref body) = request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let url = response.url().clone();
        let body = response.bytes().await?;

        let response_type = ResponseType::classify(&request.url, &url, &headers);
        trace!(
            url = %url,
            status = %status,
            response_type = ?response_type,
            body_len = body.len(),
            "response received"
        );

        Ok(Response {
            url,
            status,
            headers,
            body,
            response_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_request_wants_html() {
        let url = Url::parse("https://nexus-ar.example/portal").unwrap();
        let nav = Request::get(url.clone()).accept("text/html,application/xhtml+xml");
        assert!(nav.wants_html());

        let asset = Request::get(url).accept("application/json");
        assert!(!asset.wants_html());

        let bare = Request::get(Url::parse("https://nexus-ar.example/").unwrap());
        assert!(!bare.wants_html());
    }

    #[test]
    fn test_same_origin_check() {
        let origin = Url::parse("https://nexus-ar.example").unwrap();
        let same = Request::get(Url::parse("https://nexus-ar.example/js/app.js").unwrap());
        let cross = Request::get(Url::parse("https://aframe.io/releases/aframe.min.js").unwrap());
        assert!(same.is_same_origin(&origin));
        assert!(!cross.is_same_origin(&origin));
    }

    #[test]
    fn test_classify_basic() {
        let req = Url::parse("https://nexus-ar.example/css/style.css").unwrap();
        let resp = Url::parse("https://nexus-ar.example/css/style.css").unwrap();
        assert_eq!(
            ResponseType::classify(&req, &resp, &HeaderMap::new()),
            ResponseType::Basic
        );
    }

    #[test]
    fn test_classify_cors_and_opaque() {
        let req = Url::parse("https://nexus-ar.example/").unwrap();
        let resp = Url::parse("https://fonts.example/font.woff2").unwrap();

        assert_eq!(
            ResponseType::classify(&req, &resp, &HeaderMap::new()),
            ResponseType::Opaque
        );

        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        );
        assert_eq!(
            ResponseType::classify(&req, &resp, &headers),
            ResponseType::Cors
        );
    }

    #[test]
    fn test_content_type_parsing() {
        let url = Url::parse("https://nexus-ar.example/index.html").unwrap();
        let mut response = Response::basic(url, "<html></html>");
        assert!(response.content_type().is_none());
        assert!(!response.is_html());

        response.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/html; charset=utf-8"),
        );
        assert!(response.is_html());
        assert_eq!(response.content_type().unwrap().type_(), mime::TEXT);
    }

    #[test]
    fn test_synthesized_responses() {
        let url = Url::parse("https://nexus-ar.example/offline.html").unwrap();
        let ok = Response::basic(url.clone(), "<html>offline</html>");
        assert!(ok.ok());
        assert_eq!(ok.body_text(), "<html>offline</html>");

        let unavailable =
            Response::with_status(url.clone(), StatusCode::SERVICE_UNAVAILABLE, "");
        assert_eq!(unavailable.status, StatusCode::SERVICE_UNAVAILABLE);

        let opaque = Response::opaque(url);
        assert_eq!(opaque.response_type, ResponseType::Opaque);
        assert!(opaque.body.is_empty());
    }

    #[tokio::test]
    async fn test_http_fetcher_roundtrip() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/manifest.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"name\":\"nexus\"}"))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(FetcherConfig::default()).unwrap();
        let url = Url::parse(&format!("{}/manifest.json", server.uri())).unwrap();
        let response = fetcher.fetch(&Request::get(url)).await.unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.response_type, ResponseType::Basic);
        assert_eq!(response.body_text(), "{\"name\":\"nexus\"}");
    }

    #[tokio::test]
    async fn test_http_fetcher_propagates_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing.png"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(FetcherConfig::default()).unwrap();
        let url = Url::parse(&format!("{}/missing.png", server.uri())).unwrap();
        let response = fetcher.fetch(&Request::get(url)).await.unwrap();

        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert!(!response.ok());
    }
}
