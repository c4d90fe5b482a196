use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::decode::DecodeOptions;
use crate::error::HttpError;
use crate::http::{Method, TransportConfig};
use crate::request::Request;

pub type ServiceFailureFn = Arc<dyn Fn(&HttpError) + Send + Sync>;

/// Defaults shared by every request made against one API.
///
/// ```
/// # use http_request_core::{HttpService, Json, Method};
/// let contacts = HttpService::new("https://api.example.com")
///     .path("/v1")
///     .header("Authorization", "Token X")
///     .param("simple", "true");
/// let request = contacts.request::<Json<serde_json::Value>>(Method::Get).path("/contacts");
/// assert_eq!(request.spec().path(), "https://api.example.com/v1/contacts");
/// ```
#[derive(Clone, Default)]
pub struct HttpService {
    pub path: String,
    pub headers: BTreeMap<String, String>,
    pub params: BTreeMap<String, String>,
    pub config: TransportConfig,
    pub decode_options: DecodeOptions,
    pub failure: Option<ServiceFailureFn>,
    pub logging: bool,
}

impl fmt::Debug for HttpService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpService")
            .field("path", &self.path)
            .field("headers", &self.headers)
            .field("params", &self.params)
            .field("config", &self.config)
            .field("decode_options", &self.decode_options)
            .field("failure", &self.failure.is_some())
            .field("logging", &self.logging)
            .finish()
    }
}

impl HttpService {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Append to the base path.
    pub fn path(mut self, path: &str) -> Self {
        self.path.push_str(path);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn logging(mut self, enabled: bool) -> Self {
        self.logging = enabled;
        self
    }

    pub fn configure(mut self, configure: impl FnOnce(&mut TransportConfig)) -> Self {
        configure(&mut self.config);
        self
    }

    pub fn decode_options(mut self, options: DecodeOptions) -> Self {
        self.decode_options = options;
        self
    }

    /// Failure handler installed on every request built from this service,
    /// unless the request sets its own.
    pub fn on_failure(mut self, f: impl Fn(&HttpError) + Send + Sync + 'static) -> Self {
        self.failure = Some(Arc::new(f));
        self
    }

    pub fn request<T>(&self, method: Method) -> Request<T> {
        Request::from_service(method, self)
    }

    pub(crate) fn apply<T>(&self, request: &mut Request<T>) {
        let spec = &mut request.spec;
        spec.base_path = self.path.clone();
        spec.headers = self.headers.clone();
        spec.params = self.params.clone();
        spec.config = self.config.clone();
        spec.decode_options = self.decode_options.clone();
        spec.logging = self.logging;
        if let Some(failure) = &self.failure {
            let failure = Arc::clone(failure);
            request
                .callbacks
                .set_failure(Box::new(move |error: &HttpError| failure(error)));
        }
    }
}
