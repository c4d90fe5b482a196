//! Typed HTTP request pipeline.
//!
//! # Overview
//! A `Request<T>` declares what to fetch (method, path, params, headers,
//! body, transport config) and which callbacks want the result. `Client::send`
//! turns the declaration into one or two `TaskRunner`s: a network runner that
//! always goes to the server, and a cache-only runner when an `on_cache`
//! handler is set. Each runner drives a `Transport` exchange, decodes the body
//! into `T` and posts its result to a `DeliveryQueue`.
//!
//! # Design
//! - Declarations are values. Every builder call consumes and returns the
//!   request, and each runner receives its own copy of the `RequestSpec`.
//! - Transports report an exchange as a stream of `TransportEvent`s, so the
//!   runner does not depend on a concrete HTTP client. `ReqwestTransport` is
//!   the production implementation.
//! - Callbacks never run on runner tasks. Progress and terminal groups are
//!   posted in order to a serial queue; each terminal slot fires at most once.
//! - Failures are `HttpError`s; transport and decoder errors pass through
//!   unchanged.

pub mod callbacks;
pub mod client;
pub mod decode;
pub mod error;
pub mod http;
pub mod logging;
pub mod request;
pub mod response;
pub mod service;
pub mod task;
pub mod transport;

pub use callbacks::{CallbackSet, DeliveryQueue};
pub use client::{Client, Dispatched};
pub use decode::{Decodable, DecodeOptions, Json};
pub use error::{BoxError, HttpError};
pub use http::{CachePolicy, Method, PreparedRequest, ResponseHead, TransportConfig};
pub use request::{Body, Request, RequestSpec};
pub use response::Response;
pub use service::HttpService;
pub use task::{ProgressTracker, RunnerRole, TaskRunner, TaskState};
pub use transport::{
    ReqwestTransport, ReqwestTransportBuilder, ResponseCache, Transport, TransportError,
    TransportEvent,
};
