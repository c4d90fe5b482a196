//! Transport abstraction.
//!
//! # Design
//! A transport executes one `PreparedRequest` on its own task and reports
//! what happens as a stream of `TransportEvent`s over a channel. The runner
//! only consumes events, so it never depends on a concrete HTTP client.
//! Every well-behaved transport ends the stream with exactly one `Complete`;
//! a stream that closes without it is treated as an aborted exchange.

mod cache;
mod network;

#[cfg(test)]
pub(crate) mod scripted;

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::http::{PreparedRequest, ResponseHead};

pub use cache::{CachedResponse, ResponseCache};
pub use network::{ReqwestTransport, ReqwestTransportBuilder};

/// Progress and results of one exchange, in the order they happen.
#[derive(Debug)]
pub enum TransportEvent {
    /// Upload progress; `sent` is the running total.
    BytesSent { sent: u64, expected: u64 },
    /// Status line and headers arrived.
    ResponseHead(ResponseHead),
    /// A body chunk arrived. The first one, even if empty, marks the body as present.
    BytesReceived(Bytes),
    /// The exchange is over.
    Complete(Result<(), TransportError>),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("no cached response for {0}")]
    CacheMiss(String),

    #[error("transport closed before the exchange completed")]
    Aborted,

    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    #[error("{0}")]
    Other(String),
}

impl TransportError {
    pub fn is_timeout(&self) -> bool {
        match self {
            TransportError::Timeout => true,
            TransportError::Reqwest(e) => e.is_timeout(),
            _ => false,
        }
    }
}

/// Something that can carry a request to a server (or a cache) and back.
pub trait Transport: Send + Sync + 'static {
    /// Start the exchange and return its event stream.
    fn open(&self, request: PreparedRequest) -> mpsc::Receiver<TransportEvent>;
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    fn open(&self, request: PreparedRequest) -> mpsc::Receiver<TransportEvent> {
        (**self).open(request)
    }
}
