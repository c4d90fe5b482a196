use std::collections::HashMap;
use std::time::Duration;

use crate::http::{PreparedRequest, ResponseHead};

/// A decoded response, delivered by every successful runner.
#[derive(Debug, Clone)]
pub struct Response<T> {
    body: T,
    headers: HashMap<String, String>,
    status: u16,
    elapsed: Duration,
    request: PreparedRequest,
    head: ResponseHead,
}

impl<T> Response<T> {
    pub(crate) fn new(
        body: T,
        elapsed: Duration,
        request: PreparedRequest,
        head: ResponseHead,
    ) -> Self {
        // Later duplicates overwrite earlier ones.
        let headers = head
            .headers
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        Self {
            body,
            headers,
            status: head.status,
            elapsed,
            request,
            head,
        }
    }

    pub fn body(&self) -> &T {
        &self.body
    }

    pub fn into_body(self) -> T {
        self.body
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    /// Time from dispatch until the body was decoded.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// The request this response answers.
    pub fn request(&self) -> &PreparedRequest {
        &self.request
    }

    /// Raw response metadata as reported by the transport.
    pub fn head(&self) -> &ResponseHead {
        &self.head
    }
}
