//! Callback slots and the queue they are delivered on.
//!
//! # Design
//! `CallbackSet` is shared (behind an `Arc`) by the cache and network runners
//! of one declared request. Each single-shot slot hands its closure out at
//! most once via `take`, so a slot cannot fire twice no matter which runner
//! reaches it. Runners never call a closure directly: they post a job to a
//! `DeliveryQueue`, a serial executor that runs jobs one at a time in posting
//! order on its own thread.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Mutex, MutexGuard, OnceLock};
use std::thread;

use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::error::HttpError;
use crate::response::Response;

pub type SuccessFn<T> = Box<dyn FnOnce(&Response<T>) + Send>;
pub type FailureFn = Box<dyn FnOnce(&HttpError) + Send>;
pub type CompletionFn<T> = Box<dyn FnOnce(Result<Response<T>, HttpError>) + Send>;
pub type CacheFn<T> = Box<dyn FnOnce(Response<T>) + Send>;
pub type ProgressFn = Box<dyn FnMut(f64, f64) + Send>;

/// A handler slot that can be emptied exactly once.
pub struct Slot<F>(Mutex<Option<F>>);

impl<F> Slot<F> {
    fn empty() -> Self {
        Slot(Mutex::new(None))
    }

    fn lock(&self) -> MutexGuard<'_, Option<F>> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set(&mut self, f: F) {
        *self.0.get_mut().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(f);
    }

    pub fn is_set(&self) -> bool {
        self.lock().is_some()
    }

    /// Remove the handler; later calls return `None`.
    pub fn take(&self) -> Option<F> {
        self.lock().take()
    }
}

/// The five delivery slots of one declared request.
pub struct CallbackSet<T> {
    success: Slot<SuccessFn<T>>,
    failure: Slot<FailureFn>,
    completion: Slot<CompletionFn<T>>,
    cache: Slot<CacheFn<T>>,
    progress: Slot<ProgressFn>,
}

impl<T> Default for CallbackSet<T> {
    fn default() -> Self {
        Self {
            success: Slot::empty(),
            failure: Slot::empty(),
            completion: Slot::empty(),
            cache: Slot::empty(),
            progress: Slot::empty(),
        }
    }
}

impl<T> fmt::Debug for CallbackSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackSet")
            .field("success", &self.success.is_set())
            .field("failure", &self.failure.is_set())
            .field("completion", &self.completion.is_set())
            .field("cache", &self.cache.is_set())
            .field("progress", &self.progress.is_set())
            .finish()
    }
}

impl<T> CallbackSet<T> {
    pub(crate) fn set_success(&mut self, f: SuccessFn<T>) {
        self.success.set(f);
    }

    pub(crate) fn set_failure(&mut self, f: FailureFn) {
        self.failure.set(f);
    }

    pub(crate) fn set_completion(&mut self, f: CompletionFn<T>) {
        self.completion.set(f);
    }

    pub(crate) fn set_cache(&mut self, f: CacheFn<T>) {
        self.cache.set(f);
    }

    pub(crate) fn set_progress(&mut self, f: ProgressFn) {
        self.progress.set(f);
    }

    pub fn has_failure(&self) -> bool {
        self.failure.is_set()
    }

    pub fn has_cache(&self) -> bool {
        self.cache.is_set()
    }

    pub fn has_progress(&self) -> bool {
        self.progress.is_set()
    }

    /// Whether anyone is waiting for the network result.
    pub fn wants_network_result(&self) -> bool {
        self.success.is_set() || self.completion.is_set()
    }

    /// Success group: `on_success` then `on_completion`.
    ///
    /// Each handler is isolated, so a panicking `on_success` does not cost
    /// the caller its `on_completion`.
    pub(crate) fn deliver_success(&self, response: Response<T>) {
        if let Some(success) = self.success.take() {
            isolated("on_success", || success(&response));
        }
        if let Some(completion) = self.completion.take() {
            isolated("on_completion", || completion(Ok(response)));
        }
    }

    /// Failure group: `on_failure` then `on_completion`.
    pub(crate) fn deliver_failure(&self, error: HttpError) {
        if let Some(failure) = self.failure.take() {
            isolated("on_failure", || failure(&error));
        }
        if let Some(completion) = self.completion.take() {
            isolated("on_completion", || completion(Err(error)));
        }
    }

    pub(crate) fn deliver_cache(&self, response: Response<T>) {
        if let Some(cache) = self.cache.take() {
            cache(response);
        }
    }

    pub(crate) fn deliver_progress(&self, sent: f64, received: f64) {
        if let Some(progress) = self.progress.lock().as_mut() {
            progress(sent, received);
        }
    }
}

fn isolated(handler: &'static str, f: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        tracing::error!(handler, "callback panicked");
    }
}

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Serial executor that callbacks are posted to.
///
/// Jobs run one at a time, in the order they were posted, on a thread owned
/// by the queue. A panicking job is logged and does not stop later jobs.
/// Cloning yields another handle to the same queue; the thread exits once
/// every handle is dropped.
#[derive(Clone)]
pub struct DeliveryQueue {
    id: Uuid,
    tx: mpsc::UnboundedSender<Job>,
}

impl fmt::Debug for DeliveryQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryQueue").field("id", &self.id).finish()
    }
}

static MAIN: OnceLock<DeliveryQueue> = OnceLock::new();

impl DeliveryQueue {
    pub fn new() -> Self {
        let id = Uuid::new_v4();
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let spawned = thread::Builder::new()
            .name(format!("delivery-{}", &id.simple().to_string()[..8]))
            .spawn(move || {
                while let Some(job) = rx.blocking_recv() {
                    if catch_unwind(AssertUnwindSafe(job)).is_err() {
                        tracing::error!(queue = %id, "callback panicked");
                    }
                }
                tracing::trace!(queue = %id, "delivery queue closed");
            });
        if let Err(e) = spawned {
            tracing::error!(queue = %id, error = %e, "failed to start delivery thread");
        }
        Self { id, tx }
    }

    /// The process-wide queue used when neither the request nor the client
    /// names one.
    pub fn main() -> DeliveryQueue {
        MAIN.get_or_init(DeliveryQueue::new).clone()
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn post(&self, job: impl FnOnce() + Send + 'static) {
        if self.tx.send(Box::new(job)).is_err() {
            tracing::warn!(queue = %self.id, "delivery queue is gone, dropping callback");
        }
    }

    /// Wait until every job posted before this call has run.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        self.post(move || {
            let _ = done_tx.send(());
        });
        let _ = done_rx.await;
    }
}

impl Default for DeliveryQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::http::{CachePolicy, Method, PreparedRequest, ResponseHead};

    fn response(body: &'static str) -> Response<&'static str> {
        let request = PreparedRequest {
            method: Method::Get,
            url: "https://h/".parse().unwrap(),
            headers: Vec::new(),
            body: None,
            timeout: std::time::Duration::from_secs(1),
            cache_policy: CachePolicy::default(),
        };
        let head = ResponseHead {
            status: 200,
            headers: Vec::new(),
            content_length: None,
        };
        Response::new(body, std::time::Duration::ZERO, request, head)
    }

    #[test]
    fn slots_fire_at_most_once() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut set = CallbackSet::<&'static str>::default();
        let l = log.clone();
        set.set_success(Box::new(move |r| l.lock().unwrap().push(format!("success {}", r.body()))));
        let l = log.clone();
        set.set_completion(Box::new(move |r| {
            l.lock().unwrap().push(format!("completion {}", r.is_ok()))
        }));

        set.deliver_success(response("a"));
        set.deliver_success(response("b"));
        set.deliver_failure(HttpError::NoData);

        assert_eq!(*log.lock().unwrap(), vec!["success a", "completion true"]);
        assert!(!set.wants_network_result());
    }

    #[test]
    fn failure_group_runs_failure_before_completion() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut set = CallbackSet::<&'static str>::default();
        let l = log.clone();
        set.set_completion(Box::new(move |r| {
            l.lock().unwrap().push(format!("completion {}", r.unwrap_err()))
        }));
        let l = log.clone();
        set.set_failure(Box::new(move |e| l.lock().unwrap().push(format!("failure {e}"))));

        set.deliver_failure(HttpError::NoResponse);

        assert_eq!(
            *log.lock().unwrap(),
            vec!["failure no response", "completion no response"]
        );
    }

    #[test]
    fn panicking_handler_does_not_skip_completion() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut set = CallbackSet::<&'static str>::default();
        set.set_success(Box::new(|_| panic!("handler bug")));
        let l = log.clone();
        set.set_completion(Box::new(move |r| {
            l.lock().unwrap().push(format!("completion {}", r.is_ok()))
        }));

        set.deliver_success(response("a"));

        assert_eq!(*log.lock().unwrap(), vec!["completion true"]);
    }

    #[test]
    fn panicking_failure_handler_does_not_skip_completion() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut set = CallbackSet::<&'static str>::default();
        set.set_failure(Box::new(|_| panic!("handler bug")));
        let l = log.clone();
        set.set_completion(Box::new(move |r| {
            l.lock().unwrap().push(format!("completion {}", r.unwrap_err()))
        }));

        set.deliver_failure(HttpError::NoData);

        assert_eq!(*log.lock().unwrap(), vec!["completion no data"]);
    }

    #[test]
    fn progress_slot_fires_repeatedly() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut set = CallbackSet::<()>::default();
        let c = calls.clone();
        set.set_progress(Box::new(move |s, r| c.lock().unwrap().push((s, r))));
        set.deliver_progress(0.5, 0.0);
        set.deliver_progress(1.0, 0.25);
        assert_eq!(*calls.lock().unwrap(), vec![(0.5, 0.0), (1.0, 0.25)]);
        assert!(set.has_progress());
    }

    #[tokio::test]
    async fn queue_runs_jobs_in_order_and_survives_panics() {
        let queue = DeliveryQueue::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let s = seen.clone();
            queue.post(move || s.lock().unwrap().push(i));
        }
        queue.post(|| panic!("boom"));
        let s = seen.clone();
        queue.post(move || s.lock().unwrap().push(3));
        queue.flush().await;
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn main_queue_is_shared() {
        assert_eq!(DeliveryQueue::main().id(), DeliveryQueue::main().id());
        assert_ne!(DeliveryQueue::new().id(), DeliveryQueue::main().id());
    }
}
