//! `reqwest`-backed transport with an in-memory response cache.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use tokio::sync::mpsc;

use super::{CachedResponse, ResponseCache, Transport, TransportError, TransportEvent};
use crate::http::{CachePolicy, Method, PreparedRequest, ResponseHead};

const EVENT_BUFFER: usize = 32;

/// Production transport using `reqwest`.
///
/// Successful GET responses fetched from the network are stored in the
/// response cache, where `CachePolicy::ReturnCacheDataDontLoad` requests find
/// them later.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    cache: Option<ResponseCache>,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            cache: Some(ResponseCache::new()),
        }
    }

    pub fn builder() -> ReqwestTransportBuilder {
        ReqwestTransportBuilder::default()
    }

    pub fn cache(&self) -> Option<&ResponseCache> {
        self.cache.as_ref()
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct ReqwestTransportBuilder {
    user_agent: Option<String>,
    connect_timeout: Option<Duration>,
    cache: Option<ResponseCache>,
}

impl Default for ReqwestTransportBuilder {
    fn default() -> Self {
        Self {
            user_agent: None,
            connect_timeout: None,
            cache: Some(ResponseCache::new()),
        }
    }
}

impl ReqwestTransportBuilder {
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Share `cache` with other transports.
    pub fn cache(mut self, cache: ResponseCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Never store or serve cached responses.
    pub fn without_cache(mut self) -> Self {
        self.cache = None;
        self
    }

    pub fn build(self) -> Result<ReqwestTransport, TransportError> {
        let mut builder = reqwest::Client::builder();
        if let Some(user_agent) = self.user_agent {
            builder = builder.user_agent(user_agent);
        }
        if let Some(timeout) = self.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        Ok(ReqwestTransport {
            client: builder.build()?,
            cache: self.cache,
        })
    }
}

impl Transport for ReqwestTransport {
    fn open(&self, request: PreparedRequest) -> mpsc::Receiver<TransportEvent> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let client = self.client.clone();
        let cache = self.cache.clone();
        tokio::spawn(async move {
            let result = match request.cache_policy {
                CachePolicy::ReturnCacheDataDontLoad => {
                    replay_cached(cache.as_ref(), &request, &tx).await
                }
                _ => fetch(&client, cache.as_ref(), &request, &tx).await,
            };
            if let Err(e) = &result {
                tracing::debug!(url = %request.url, error = %e, "exchange failed");
            }
            // The runner may already be gone; nothing left to tell it.
            let _ = tx.send(TransportEvent::Complete(result)).await;
        });
        rx
    }
}

async fn emit(
    tx: &mpsc::Sender<TransportEvent>,
    event: TransportEvent,
) -> Result<(), TransportError> {
    tx.send(event).await.map_err(|_| TransportError::Aborted)
}

async fn replay_cached(
    cache: Option<&ResponseCache>,
    request: &PreparedRequest,
    tx: &mpsc::Sender<TransportEvent>,
) -> Result<(), TransportError> {
    let key = request.cache_key();
    let cached = match cache {
        Some(cache) => cache.get(&key).await,
        None => None,
    };
    let Some(cached) = cached else {
        return Err(TransportError::CacheMiss(key));
    };
    emit(tx, TransportEvent::ResponseHead(cached.head)).await?;
    emit(tx, TransportEvent::BytesReceived(cached.body)).await
}

async fn fetch(
    client: &reqwest::Client,
    cache: Option<&ResponseCache>,
    request: &PreparedRequest,
    tx: &mpsc::Sender<TransportEvent>,
) -> Result<(), TransportError> {
    let mut builder = client
        .request(request.method.into(), request.url.clone())
        .timeout(request.timeout);
    for (name, value) in &request.headers {
        builder = builder.header(name, value);
    }
    if let Some(body) = &request.body {
        builder = builder.body(body.clone());
    }

    let response = builder.send().await?;
    let sent = request.body_len();
    emit(tx, TransportEvent::BytesSent { sent, expected: sent }).await?;

    let head = ResponseHead {
        status: response.status().as_u16(),
        headers: header_pairs(response.headers()),
        content_length: response.content_length(),
    };
    emit(tx, TransportEvent::ResponseHead(head.clone())).await?;

    let store = cache.filter(|_| request.method == Method::Get && head.is_success());
    let storable = CachedResponse::storable(&head);
    let mut collected = BytesMut::new();
    let mut received_any = false;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        received_any = true;
        if store.is_some() && storable {
            collected.extend_from_slice(&chunk);
        }
        emit(tx, TransportEvent::BytesReceived(chunk)).await?;
    }
    if !received_any {
        emit(tx, TransportEvent::BytesReceived(Bytes::new())).await?;
    }

    match store {
        Some(cache) if storable => {
            let body = collected.freeze();
            cache.insert(request.cache_key(), CachedResponse { head, body }).await;
        }
        // A no-store answer also invalidates whatever was kept before.
        Some(cache) => {
            cache.remove(&request.cache_key()).await;
        }
        None => {}
    }
    Ok(())
}

fn header_pairs(headers: &reqwest::header::HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
            (name.as_str().to_string(), value)
        })
        .collect()
}
