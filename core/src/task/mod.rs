//! The task engine: one runner per execution of a request.
//!
//! # Design
//! A `TaskRunner` owns its copy of the `RequestSpec`, opens one exchange on
//! the transport, folds the event stream into a `Response<T>` or an
//! `HttpError`, and posts exactly one terminal callback group to the delivery
//! queue. Its `TaskState` only moves forward; a second `run` is rejected with
//! `AlreadyDispatched` instead of executing again.
//!
//! The two roles share this machinery and differ only in configuration:
//!
//! | Role | Cache policy | Wire log | Errors | Progress | Success goes to |
//! |---|---|---|---|---|---|
//! | `Network` | reload, ignore cache | if requested | always | yes | success + completion |
//! | `CacheOnly` | cache only, never load | never | if no network runner | no | cache |

mod progress;
mod state;

use std::sync::Arc;
use std::time::Instant;

use bytes::BytesMut;
use tracing::Instrument;
use uuid::Uuid;

use crate::callbacks::{CallbackSet, DeliveryQueue};
use crate::decode::Decodable;
use crate::error::{HttpError, Result};
use crate::http::{CachePolicy, ResponseHead};
use crate::logging;
use crate::request::RequestSpec;
use crate::response::Response;
use crate::transport::{Transport, TransportError, TransportEvent};

pub use progress::ProgressTracker;
pub use state::TaskState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerRole {
    Network,
    CacheOnly {
        /// Whether failures reach the callbacks. Off while a network runner
        /// for the same request exists.
        report_errors: bool,
    },
}

impl RunnerRole {
    pub fn cache_policy(&self) -> CachePolicy {
        match self {
            RunnerRole::Network => CachePolicy::ReloadIgnoringLocalCache,
            RunnerRole::CacheOnly { .. } => CachePolicy::ReturnCacheDataDontLoad,
        }
    }

    pub fn reports_errors(&self) -> bool {
        match self {
            RunnerRole::Network => true,
            RunnerRole::CacheOnly { report_errors } => *report_errors,
        }
    }

    pub fn reports_progress(&self) -> bool {
        matches!(self, RunnerRole::Network)
    }

    fn logs(&self, requested: bool) -> bool {
        requested && matches!(self, RunnerRole::Network)
    }

    pub fn name(&self) -> &'static str {
        match self {
            RunnerRole::Network => "network",
            RunnerRole::CacheOnly { .. } => "cache",
        }
    }
}

pub struct TaskRunner<T> {
    request_id: Uuid,
    role: RunnerRole,
    spec: RequestSpec<T>,
    callbacks: Arc<CallbackSet<T>>,
    queue: DeliveryQueue,
    transport: Arc<dyn Transport>,
    state: TaskState,
    progress: ProgressTracker,
}

impl<T: Decodable> TaskRunner<T> {
    pub fn new(
        role: RunnerRole,
        request_id: Uuid,
        spec: RequestSpec<T>,
        callbacks: Arc<CallbackSet<T>>,
        queue: DeliveryQueue,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            request_id,
            role,
            spec,
            callbacks,
            queue,
            transport,
            state: TaskState::NotStarted,
            progress: ProgressTracker::new(),
        }
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn role(&self) -> RunnerRole {
        self.role
    }

    /// Execute the request and post the outcome to the delivery queue.
    ///
    /// Returns the final state. Fails only with `AlreadyDispatched`, when the
    /// runner has been run before; every other failure goes to the callbacks.
    pub async fn run(&mut self) -> Result<TaskState> {
        if self.state != TaskState::NotStarted {
            return Err(HttpError::AlreadyDispatched);
        }
        let span = tracing::debug_span!(
            "task",
            request_id = %self.request_id,
            role = self.role.name(),
        );
        async {
            let outcome = match self.execute().await {
                Ok(response) => self.transition(TaskState::Completed).map(|()| response),
                Err(e) => Err(e),
            };
            if outcome.is_err() && !self.state.is_terminal() {
                tracing::debug!(from = %self.state, "-> Failed");
                self.state = TaskState::Failed;
            }
            self.deliver(outcome);
        }
        .instrument(span)
        .await;
        Ok(self.state)
    }

    async fn execute(&mut self) -> Result<Response<T>> {
        let request = self.spec.prepare(self.role.cache_policy())?;
        let started = Instant::now();
        let wire_log = self.role.logs(self.spec.logging);
        if wire_log {
            logging::log_request(&request);
        }

        self.transition(TaskState::Sending)?;
        let mut events = self.transport.open(request.clone());
        let mut head: Option<ResponseHead> = None;
        let mut body: Option<BytesMut> = None;

        let completion = loop {
            let Some(event) = events.recv().await else {
                break Err(TransportError::Aborted);
            };
            match event {
                TransportEvent::BytesSent { sent, expected } => {
                    self.progress.bytes_sent(sent, expected);
                    self.report_progress();
                }
                TransportEvent::ResponseHead(received) => {
                    self.enter_receiving()?;
                    self.progress.response_started(received.content_length);
                    head = Some(received);
                }
                TransportEvent::BytesReceived(chunk) => {
                    self.enter_receiving()?;
                    self.progress.bytes_received(chunk.len() as u64);
                    body.get_or_insert_with(BytesMut::new).extend_from_slice(&chunk);
                    self.report_progress();
                }
                TransportEvent::Complete(result) => {
                    self.progress.finish();
                    self.report_progress();
                    break result;
                }
            }
        };
        completion?;

        let head = head.ok_or(HttpError::NoResponse)?;
        let body = body.ok_or(HttpError::NoData)?.freeze();
        if wire_log {
            logging::log_response(&request, &head, started.elapsed(), &body);
        }
        if !head.is_success() {
            return Err(HttpError::Status {
                status: head.status,
                headers: head.headers.clone(),
                body,
            });
        }

        let value = T::decode(&body, &self.spec.decode_options).map_err(HttpError::Decode)?;
        Ok(Response::new(value, started.elapsed(), request, head))
    }

    fn transition(&mut self, next: TaskState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            tracing::error!(from = %self.state, to = %next, "invalid task transition");
            return Err(HttpError::Unknown);
        }
        tracing::trace!(from = %self.state, to = %next, "transition");
        self.state = next;
        Ok(())
    }

    fn enter_receiving(&mut self) -> Result<()> {
        if self.state == TaskState::Sending {
            self.transition(TaskState::Receiving)?;
        }
        Ok(())
    }

    fn report_progress(&mut self) {
        if !self.role.reports_progress() || !self.callbacks.has_progress() {
            return;
        }
        let (sent, received) = self.progress.snapshot();
        let callbacks = Arc::clone(&self.callbacks);
        self.queue.post(move || callbacks.deliver_progress(sent, received));
    }

    fn deliver(&self, outcome: Result<Response<T>>) {
        let callbacks = Arc::clone(&self.callbacks);
        match (self.role, outcome) {
            (RunnerRole::Network, Ok(response)) => {
                tracing::debug!(status = response.status(), "delivering response");
                self.queue.post(move || callbacks.deliver_success(response));
            }
            (RunnerRole::CacheOnly { .. }, Ok(response)) => {
                tracing::debug!(status = response.status(), "delivering cached response");
                self.queue.post(move || callbacks.deliver_cache(response));
            }
            (role, Err(error)) if role.reports_errors() => {
                tracing::debug!(%error, "delivering failure");
                self.queue.post(move || callbacks.deliver_failure(error));
            }
            (_, Err(error)) => {
                tracing::debug!(%error, "cache run failed, leaving the result to the network run");
            }
        }
    }
}
