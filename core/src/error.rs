//! Error types for request execution.
//!
//! # Design
//! Every documented failure path has its own variant. Transport and decoder
//! errors are carried through unchanged (`#[error(transparent)]`) so callers
//! see the original cause. Non-2xx responses land in `Status` with the raw
//! status code, headers and body so the failure payload stays inspectable.

use bytes::Bytes;
use thiserror::Error;

use crate::transport::TransportError;

/// Boxed error produced by a `Decodable` implementation.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type Result<T> = std::result::Result<T, HttpError>;

#[derive(Debug, Error)]
pub enum HttpError {
    /// Base path, relative path and params did not form an absolute URL.
    #[error("{0} is an invalid path")]
    InvalidPath(String),

    /// The request body could not be encoded.
    #[error("request body serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Network or transport failure, as reported by the transport.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The transport finished without producing a response.
    #[error("no response")]
    NoResponse,

    /// The transport produced a response but no body buffer at all.
    #[error("no data")]
    NoData,

    /// The server answered with a status outside 200..300.
    #[error("{status} - {}", reason_phrase(.status))]
    Status {
        status: u16,
        headers: Vec<(String, String)>,
        body: Bytes,
    },

    /// The response body could not be decoded into the requested type.
    #[error(transparent)]
    Decode(BoxError),

    /// `TaskRunner::run` was called on a runner that already started.
    #[error("task has already been dispatched")]
    AlreadyDispatched,

    #[error("unknown error")]
    Unknown,
}

impl HttpError {
    /// Status code of an HTTP error response.
    pub fn status(&self) -> Option<u16> {
        match self {
            HttpError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Body of an HTTP error response, decoded as UTF-8 when possible.
    pub fn body_text(&self) -> Option<String> {
        match self {
            HttpError::Status { body, .. } => Some(String::from_utf8_lossy(body).into_owned()),
            _ => None,
        }
    }

    pub fn is_cache_miss(&self) -> bool {
        matches!(self, HttpError::Transport(TransportError::CacheMiss(_)))
    }
}

fn reason_phrase(status: &u16) -> &'static str {
    reqwest::StatusCode::from_u16(*status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("unknown status")
}
