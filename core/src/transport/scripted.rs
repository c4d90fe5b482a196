//! Replays canned event sequences instead of talking to a server.

use std::sync::Mutex;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;

use super::{Transport, TransportError, TransportEvent};
use crate::http::{CachePolicy, PreparedRequest, ResponseHead};

#[derive(Debug, Clone)]
pub(crate) enum Step {
    Sent(u64, u64),
    Head(u16, Option<u64>),
    Chunk(&'static [u8]),
    Pause(Duration),
    Finish,
    Fail(Failure),
    /// Drop the channel without completing.
    Hangup,
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Failure {
    Timeout,
    CacheMiss,
}

#[derive(Default)]
pub(crate) struct ScriptedTransport {
    network: Vec<Step>,
    cache: Vec<Step>,
    opened: Mutex<Vec<PreparedRequest>>,
}

impl ScriptedTransport {
    pub(crate) fn new(network: Vec<Step>) -> Self {
        Self {
            network,
            cache: vec![Step::Fail(Failure::CacheMiss)],
            opened: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn with_cache(mut self, cache: Vec<Step>) -> Self {
        self.cache = cache;
        self
    }

    pub(crate) fn opened(&self) -> Vec<PreparedRequest> {
        self.opened.lock().unwrap().clone()
    }

    /// A 200 response carrying `body` with a known length.
    pub(crate) fn ok(body: &'static [u8]) -> Vec<Step> {
        vec![
            Step::Sent(0, 0),
            Step::Head(200, Some(body.len() as u64)),
            Step::Chunk(body),
            Step::Finish,
        ]
    }
}

impl Transport for ScriptedTransport {
    fn open(&self, request: PreparedRequest) -> mpsc::Receiver<TransportEvent> {
        let steps = match request.cache_policy {
            CachePolicy::ReturnCacheDataDontLoad => self.cache.clone(),
            _ => self.network.clone(),
        };
        let url = request.url.to_string();
        self.opened.lock().unwrap().push(request);
        let (tx, rx) = mpsc::channel(8);
        tokio::spawn(async move {
            for step in steps {
                let event = match step {
                    Step::Sent(sent, expected) => TransportEvent::BytesSent { sent, expected },
                    Step::Head(status, content_length) => {
                        TransportEvent::ResponseHead(ResponseHead {
                            status,
                            headers: vec![(
                                "content-type".to_string(),
                                "application/json".to_string(),
                            )],
                            content_length,
                        })
                    }
                    Step::Chunk(bytes) => TransportEvent::BytesReceived(Bytes::from_static(bytes)),
                    Step::Pause(delay) => {
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    Step::Finish => TransportEvent::Complete(Ok(())),
                    Step::Fail(Failure::Timeout) => {
                        TransportEvent::Complete(Err(TransportError::Timeout))
                    }
                    Step::Fail(Failure::CacheMiss) => {
                        TransportEvent::Complete(Err(TransportError::CacheMiss(url.clone())))
                    }
                    Step::Hangup => return,
                };
                if tx.send(event).await.is_err() {
                    return;
                }
            }
        });
        rx
    }
}
