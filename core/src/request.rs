//! Request declaration and materialization.
//!
//! # Design
//! `Request<T>` is a value builder: every call consumes the declaration and
//! returns the next snapshot, so no two owners ever share a half-configured
//! request. The configuration part, `RequestSpec<T>`, is `Clone`; each runner
//! receives its own copy at dispatch and turns it into a `PreparedRequest`
//! via `prepare`.

use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use url::Url;

use crate::callbacks::{CallbackSet, DeliveryQueue};
use crate::decode::DecodeOptions;
use crate::error::{HttpError, Result};
use crate::http::{CachePolicy, Method, PreparedRequest, TransportConfig};
use crate::response::Response;
use crate::service::HttpService;

pub type JsonEncoder = Arc<dyn Fn(&DecodeOptions) -> serde_json::Result<Vec<u8>> + Send + Sync>;

/// Request body, encoded when the request is materialized.
#[derive(Clone)]
pub enum Body {
    Bytes(Bytes),
    Json(JsonEncoder),
}

impl Body {
    pub fn json<B>(value: B) -> Self
    where
        B: Serialize + Send + Sync + 'static,
    {
        Body::Json(Arc::new(move |options: &DecodeOptions| {
            if options.pretty_json {
                serde_json::to_vec_pretty(&value)
            } else {
                serde_json::to_vec(&value)
            }
        }))
    }

    fn encode(&self, options: &DecodeOptions) -> Result<Bytes> {
        match self {
            Body::Bytes(bytes) => Ok(bytes.clone()),
            Body::Json(encode) => Ok(Bytes::from(encode(options)?)),
        }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Body::Json(_) => f.write_str("Json(..)"),
        }
    }
}

/// Everything needed to execute one request, minus the callbacks.
pub struct RequestSpec<T> {
    pub(crate) method: Method,
    pub(crate) base_path: String,
    pub(crate) relative_path: String,
    pub(crate) params: BTreeMap<String, String>,
    pub(crate) headers: BTreeMap<String, String>,
    pub(crate) body: Option<Body>,
    pub(crate) config: TransportConfig,
    pub(crate) decode_options: DecodeOptions,
    pub(crate) logging: bool,
    _target: PhantomData<fn() -> T>,
}

impl<T> Clone for RequestSpec<T> {
    fn clone(&self) -> Self {
        Self {
            method: self.method,
            base_path: self.base_path.clone(),
            relative_path: self.relative_path.clone(),
            params: self.params.clone(),
            headers: self.headers.clone(),
            body: self.body.clone(),
            config: self.config.clone(),
            decode_options: self.decode_options.clone(),
            logging: self.logging,
            _target: PhantomData,
        }
    }
}

impl<T> fmt::Debug for RequestSpec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestSpec")
            .field("method", &self.method)
            .field("path", &format_args!("{}{}", self.base_path, self.relative_path))
            .field("params", &self.params)
            .field("headers", &self.headers)
            .field("body", &self.body)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<T> RequestSpec<T> {
    fn new(method: Method, base_path: String) -> Self {
        Self {
            method,
            base_path,
            relative_path: String::new(),
            params: BTreeMap::new(),
            headers: BTreeMap::new(),
            body: None,
            config: TransportConfig::default(),
            decode_options: DecodeOptions::default(),
            logging: false,
            _target: PhantomData,
        }
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn path(&self) -> String {
        format!("{}{}", self.base_path, self.relative_path)
    }

    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn decode_options(&self) -> &DecodeOptions {
        &self.decode_options
    }

    pub fn logging(&self) -> bool {
        self.logging
    }

    /// Materialize the request under the configured default cache policy.
    pub fn prepare_default(&self) -> Result<PreparedRequest> {
        self.prepare(self.config.cache_policy)
    }

    /// Materialize the request under `cache_policy`.
    ///
    /// Params are appended after any query already present in the path, in
    /// key order. Fails with `InvalidPath` when the joined path is not an
    /// absolute URL, and with `Serialization` when the body cannot be encoded.
    pub fn prepare(&self, cache_policy: CachePolicy) -> Result<PreparedRequest> {
        let path = self.path();
        let mut url = Url::parse(&path).map_err(|_| HttpError::InvalidPath(path.clone()))?;
        if url.cannot_be_a_base() {
            return Err(HttpError::InvalidPath(path));
        }
        if !self.params.is_empty() {
            url.query_pairs_mut().extend_pairs(self.params.iter());
        }

        let mut headers: Vec<(String, String)> = self
            .headers
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        let body = match &self.body {
            Some(body) => {
                if matches!(body, Body::Json(_))
                    && !headers.iter().any(|(name, _)| name.eq_ignore_ascii_case("content-type"))
                {
                    headers.push(("Content-Type".to_string(), "application/json".to_string()));
                }
                Some(body.encode(&self.decode_options)?)
            }
            None => None,
        };

        Ok(PreparedRequest {
            method: self.method,
            url,
            headers,
            body,
            timeout: self.config.timeout,
            cache_policy,
        })
    }
}

/// A request declaration: configuration plus result callbacks.
///
/// ```no_run
/// # use http_request_core::{Client, Json, Request};
/// # async fn demo(client: &Client) {
/// let dispatched = Request::<Json<serde_json::Value>>::get("https://api.example.com/v1")
///     .path("/contacts")
///     .param("simple", "true")
///     .header("Authorization", "Token X")
///     .on_success(|response| println!("{} contacts", response.body().0))
///     .on_failure(|error| eprintln!("{error}"))
///     .send(client);
/// dispatched.finished().await;
/// # }
/// ```
pub struct Request<T> {
    pub(crate) spec: RequestSpec<T>,
    pub(crate) callbacks: CallbackSet<T>,
    pub(crate) queue: Option<DeliveryQueue>,
}

impl<T> fmt::Debug for Request<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("spec", &self.spec)
            .field("callbacks", &self.callbacks)
            .finish_non_exhaustive()
    }
}

impl<T> Request<T> {
    pub fn new(method: Method, base_path: impl Into<String>) -> Self {
        Self {
            spec: RequestSpec::new(method, base_path.into()),
            callbacks: CallbackSet::default(),
            queue: None,
        }
    }

    pub fn get(base_path: impl Into<String>) -> Self {
        Self::new(Method::Get, base_path)
    }

    pub fn post(base_path: impl Into<String>) -> Self {
        Self::new(Method::Post, base_path)
    }

    pub fn put(base_path: impl Into<String>) -> Self {
        Self::new(Method::Put, base_path)
    }

    pub fn delete(base_path: impl Into<String>) -> Self {
        Self::new(Method::Delete, base_path)
    }

    pub fn patch(base_path: impl Into<String>) -> Self {
        Self::new(Method::Patch, base_path)
    }

    pub fn head(base_path: impl Into<String>) -> Self {
        Self::new(Method::Head, base_path)
    }

    pub fn options(base_path: impl Into<String>) -> Self {
        Self::new(Method::Options, base_path)
    }

    /// Start from a service's defaults.
    pub fn from_service(method: Method, service: &HttpService) -> Self {
        let mut request = Self::new(method, service.path.clone());
        service.apply(&mut request);
        request
    }

    pub fn spec(&self) -> &RequestSpec<T> {
        &self.spec
    }

    pub fn logging(mut self, enabled: bool) -> Self {
        self.spec.logging = enabled;
        self
    }

    /// Append a path component to the relative path.
    pub fn path(mut self, path: &str) -> Self {
        self.spec.relative_path.push_str(path);
        self
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.spec.params.insert(name.into(), value.into());
        self
    }

    /// Set or remove query params; a `None` value removes the param.
    pub fn params<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, Option<V>)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (name, value) in params {
            set_or_remove(&mut self.spec.params, name.into(), value.map(Into::into));
        }
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.spec.headers.insert(name.into(), value.into());
        self
    }

    /// Set or remove headers; a `None` value removes the header.
    pub fn headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, Option<V>)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (name, value) in headers {
            set_or_remove(&mut self.spec.headers, name.into(), value.map(Into::into));
        }
        self
    }

    pub fn body(mut self, body: Option<Body>) -> Self {
        self.spec.body = body;
        self
    }

    pub fn json<B>(self, value: B) -> Self
    where
        B: Serialize + Send + Sync + 'static,
    {
        self.body(Some(Body::json(value)))
    }

    pub fn bytes(self, bytes: impl Into<Bytes>) -> Self {
        self.body(Some(Body::Bytes(bytes.into())))
    }

    pub fn configure(mut self, configure: impl FnOnce(&mut TransportConfig)) -> Self {
        configure(&mut self.spec.config);
        self
    }

    pub fn timeout(self, timeout: Duration) -> Self {
        self.configure(|config| config.timeout = timeout)
    }

    pub fn decode_options(mut self, options: DecodeOptions) -> Self {
        self.spec.decode_options = options;
        self
    }

    /// Queue every callback of this request is delivered on.
    pub fn deliver_on(mut self, queue: DeliveryQueue) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Called with the network response; runs before `on_completion`.
    pub fn on_success(mut self, f: impl FnOnce(&Response<T>) + Send + 'static) -> Self {
        self.callbacks.set_success(Box::new(f));
        self
    }

    /// Called with the error of a failed run; runs before `on_completion`.
    pub fn on_failure(mut self, f: impl FnOnce(&HttpError) + Send + 'static) -> Self {
        self.callbacks.set_failure(Box::new(f));
        self
    }

    /// Called exactly once with the outcome of the network run.
    pub fn on_completion(
        mut self,
        f: impl FnOnce(std::result::Result<Response<T>, HttpError>) + Send + 'static,
    ) -> Self {
        self.callbacks.set_completion(Box::new(f));
        self
    }

    /// Called with the cached response, if one exists.
    pub fn on_cache(mut self, f: impl FnOnce(Response<T>) + Send + 'static) -> Self {
        self.callbacks.set_cache(Box::new(f));
        self
    }

    /// Called with `(sent, received)` fractions while the network run moves bytes.
    pub fn on_progress(mut self, f: impl FnMut(f64, f64) + Send + 'static) -> Self {
        self.callbacks.set_progress(Box::new(f));
        self
    }

    pub(crate) fn into_parts(self) -> (RequestSpec<T>, CallbackSet<T>, Option<DeliveryQueue>) {
        (self.spec, self.callbacks, self.queue)
    }
}

fn set_or_remove(map: &mut BTreeMap<String, String>, key: String, value: Option<String>) {
    match value {
        Some(value) => {
            map.insert(key, value);
        }
        None => {
            map.remove(&key);
        }
    }
}
