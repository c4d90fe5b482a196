//! HTTP data types shared between request assembly, the task engine and
//! transports.
//!
//! # Design
//! These types describe HTTP requests and responses as plain data. Request
//! assembly produces a `PreparedRequest`; a `Transport` executes it and reports
//! a `ResponseHead` plus body bytes back to the runner. Nothing here performs
//! I/O, so every value can be cloned into each runner without sharing.

use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use url::Url;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Patch => "PATCH",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
            Method::Patch => reqwest::Method::PATCH,
            Method::Head => reqwest::Method::HEAD,
            Method::Options => reqwest::Method::OPTIONS,
        }
    }
}

/// How a transport may use its local response cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachePolicy {
    /// Whatever the transport does by default.
    #[default]
    UseProtocolDefault,
    /// Always go to the network, ignoring anything cached.
    ReloadIgnoringLocalCache,
    /// Answer only from the cache; never touch the network.
    ReturnCacheDataDontLoad,
}

/// Transport settings captured by a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    pub timeout: Duration,
    /// Policy used by `RequestSpec::prepare_default`. Runners dispatched by a
    /// `Client` ignore it and apply their role's policy instead.
    pub cache_policy: CachePolicy,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            cache_policy: CachePolicy::default(),
        }
    }
}

/// A fully materialized request, ready to hand to a transport.
///
/// Produced by `RequestSpec::prepare`. Each runner owns its own copy.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
    pub timeout: Duration,
    pub cache_policy: CachePolicy,
}

impl PreparedRequest {
    /// Key under which responses to this request are cached.
    pub fn cache_key(&self) -> String {
        format!("{} {}", self.method, self.url)
    }

    pub fn body_len(&self) -> u64 {
        self.body.as_ref().map_or(0, |b| b.len() as u64)
    }
}

/// Status line and headers of a response, as reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    /// Declared body length, when the server sent one.
    pub content_length: Option<u64>,
}

impl ResponseHead {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .rev()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}
