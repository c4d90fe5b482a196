//! Dispatching declared requests onto runners.
//!
//! # Design
//! `Client` holds the transport and an optional default delivery queue and no
//! per-request state. `send` splits a `Request` into its spec and callbacks,
//! decides which runners the callbacks call for, and spawns each runner on the
//! Tokio runtime with its own `RequestSpec` clone. The runners share the
//! `CallbackSet`, whose single-shot slots keep the terminal groups exactly
//! once even when both runners finish.

use std::sync::Arc;

use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::callbacks::DeliveryQueue;
use crate::decode::Decodable;
use crate::request::Request;
use crate::task::{RunnerRole, TaskRunner, TaskState};
use crate::transport::{ReqwestTransport, Transport};

#[derive(Clone)]
pub struct Client {
    transport: Arc<dyn Transport>,
    queue: Option<DeliveryQueue>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client").field("queue", &self.queue).finish_non_exhaustive()
    }
}

impl Client {
    /// Client on a default `ReqwestTransport` with an in-memory cache.
    pub fn new() -> Self {
        Self::with_transport(ReqwestTransport::new())
    }

    pub fn with_transport(transport: impl Transport) -> Self {
        Self {
            transport: Arc::new(transport),
            queue: None,
        }
    }

    /// Queue used for requests that do not name their own. Without one,
    /// callbacks go to `DeliveryQueue::main()`.
    pub fn deliver_on(mut self, queue: DeliveryQueue) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Start executing `request`.
    ///
    /// A cache-only runner is started when an `on_cache` handler is set. A
    /// network runner is started unless the request only listens to the cache
    /// (an `on_cache` handler and neither `on_success` nor `on_completion`).
    ///
    /// # Panics
    /// Must be called from within a Tokio runtime.
    pub fn send<T: Decodable>(&self, request: Request<T>) -> Dispatched {
        let request_id = Uuid::new_v4();
        let (spec, callbacks, queue) = request.into_parts();
        let queue = queue
            .or_else(|| self.queue.clone())
            .unwrap_or_else(DeliveryQueue::main);
        let callbacks = Arc::new(callbacks);

        let cache = callbacks.has_cache();
        let network = !cache || callbacks.wants_network_result();
        tracing::debug!(
            %request_id,
            method = %spec.method(),
            path = %spec.path(),
            network,
            cache,
            "dispatching request"
        );

        let mut roles = Vec::with_capacity(2);
        if cache {
            roles.push(RunnerRole::CacheOnly {
                report_errors: !network,
            });
        }
        if network {
            roles.push(RunnerRole::Network);
        }

        let runners = roles
            .into_iter()
            .map(|role| {
                let mut runner = TaskRunner::new(
                    role,
                    request_id,
                    spec.clone(),
                    Arc::clone(&callbacks),
                    queue.clone(),
                    Arc::clone(&self.transport),
                );
                let handle = tokio::spawn(async move {
                    match runner.run().await {
                        Ok(state) => state,
                        Err(e) => {
                            tracing::warn!(%request_id, error = %e, "runner refused to start");
                            runner.state()
                        }
                    }
                });
                (role, handle)
            })
            .collect();

        Dispatched {
            request_id,
            queue,
            runners,
        }
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Decodable> Request<T> {
    /// Shorthand for `client.send(self)`.
    pub fn send(self, client: &Client) -> Dispatched {
        client.send(self)
    }
}

/// Handle to the runners of one sent request.
///
/// Dropping it does not cancel anything; callbacks are delivered either way.
#[derive(Debug)]
pub struct Dispatched {
    request_id: Uuid,
    queue: DeliveryQueue,
    runners: Vec<(RunnerRole, JoinHandle<TaskState>)>,
}

impl Dispatched {
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn has_network(&self) -> bool {
        self.runners.iter().any(|(role, _)| *role == RunnerRole::Network)
    }

    pub fn has_cache(&self) -> bool {
        self.runners
            .iter()
            .any(|(role, _)| matches!(role, RunnerRole::CacheOnly { .. }))
    }

    /// Wait for every runner and for the callbacks they posted.
    ///
    /// Returns the final state of each runner, cache runner first.
    pub async fn finished(self) -> Vec<TaskState> {
        let mut states = Vec::with_capacity(self.runners.len());
        for (role, handle) in self.runners {
            let state = match handle.await {
                Ok(state) => state,
                Err(e) => {
                    tracing::error!(
                        request_id = %self.request_id,
                        role = role.name(),
                        error = %e,
                        "runner task died"
                    );
                    TaskState::Failed
                }
            };
            states.push(state);
        }
        self.queue.flush().await;
        states
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::decode::Json;
    use crate::error::HttpError;
    use crate::http::CachePolicy;
    use crate::transport::scripted::{ScriptedTransport, Step};

    type Log = Arc<Mutex<Vec<String>>>;
    type Value = Json<serde_json::Value>;

    const BODY: &[u8] = br#"{"source":"network"}"#;
    const CACHED: &[u8] = br#"{"source":"cache"}"#;

    fn recorded(log: &Log) -> Request<Value> {
        let (s, f, c, k) = (log.clone(), log.clone(), log.clone(), log.clone());
        Request::<Value>::get("https://api.example.com/v1/contacts")
            .on_success(move |r| s.lock().unwrap().push(format!("success {}", r.body()["source"])))
            .on_failure(move |e| f.lock().unwrap().push(format!("failure {e}")))
            .on_completion(move |r| {
                c.lock().unwrap().push(format!("completion {}", r.is_ok()));
            })
            .on_cache(move |r| k.lock().unwrap().push(format!("cache {}", r.body()["source"])))
    }

    fn client(transport: &Arc<ScriptedTransport>) -> Client {
        Client::with_transport(Arc::clone(transport))
    }

    fn sorted(log: &Log) -> Vec<String> {
        let mut lines = log.lock().unwrap().clone();
        lines.sort();
        lines
    }

    #[tokio::test]
    async fn cache_and_network_each_deliver_once() {
        let log = Log::default();
        let transport = Arc::new(
            ScriptedTransport::new(ScriptedTransport::ok(BODY))
                .with_cache(ScriptedTransport::ok(CACHED)),
        );

        let dispatched = recorded(&log).send(&client(&transport));
        assert!(dispatched.has_cache() && dispatched.has_network());
        let states = dispatched.finished().await;

        assert_eq!(states, vec![TaskState::Completed, TaskState::Completed]);
        assert_eq!(
            sorted(&log),
            vec![r#"cache "cache""#, "completion true", r#"success "network""#]
        );
        let mut policies: Vec<_> = transport.opened().iter().map(|r| r.cache_policy).collect();
        policies.sort_by_key(|p| *p == CachePolicy::ReloadIgnoringLocalCache);
        assert_eq!(
            policies,
            vec![
                CachePolicy::ReturnCacheDataDontLoad,
                CachePolicy::ReloadIgnoringLocalCache
            ]
        );
    }

    #[tokio::test]
    async fn success_precedes_completion_on_the_queue() {
        let log = Log::default();
        let transport = Arc::new(ScriptedTransport::new(ScriptedTransport::ok(BODY)));

        recorded(&log).send(&client(&transport)).finished().await;

        let log = log.lock().unwrap();
        let success = log.iter().position(|l| l.starts_with("success")).unwrap();
        let completion = log.iter().position(|l| l.starts_with("completion")).unwrap();
        assert!(success < completion);
        assert_eq!(log.len(), 2);
    }

    #[tokio::test]
    async fn panicking_success_handler_still_completes() {
        let log = Log::default();
        let c = log.clone();
        let transport = Arc::new(ScriptedTransport::new(ScriptedTransport::ok(BODY)));

        let states = Request::<Value>::get("https://api.example.com/v1/contacts")
            .on_success(|_| panic!("handler bug"))
            .on_completion(move |r| c.lock().unwrap().push(format!("completion {}", r.is_ok())))
            .send(&client(&transport))
            .finished()
            .await;

        assert_eq!(states, vec![TaskState::Completed]);
        assert_eq!(*log.lock().unwrap(), vec!["completion true"]);
    }

    #[tokio::test]
    async fn cache_miss_is_silent_when_network_runs() {
        let log = Log::default();
        let transport = Arc::new(ScriptedTransport::new(ScriptedTransport::ok(BODY)));

        let states = recorded(&log).send(&client(&transport)).finished().await;

        assert_eq!(states, vec![TaskState::Failed, TaskState::Completed]);
        assert_eq!(sorted(&log), vec!["completion true", r#"success "network""#]);
    }

    #[tokio::test]
    async fn cache_only_request_skips_the_network_and_reports_misses() {
        let log = Log::default();
        let (f, k) = (log.clone(), log.clone());
        let transport = Arc::new(ScriptedTransport::new(ScriptedTransport::ok(BODY)));
        let request = Request::<Value>::get("https://api.example.com/v1/contacts")
            .on_cache(move |_| k.lock().unwrap().push("cache".to_string()))
            .on_failure(move |e| f.lock().unwrap().push(format!("miss {}", e.is_cache_miss())));

        let dispatched = request.send(&client(&transport));
        assert!(!dispatched.has_network());
        let states = dispatched.finished().await;

        assert_eq!(states, vec![TaskState::Failed]);
        assert_eq!(*log.lock().unwrap(), vec!["miss true"]);
        assert_eq!(transport.opened().len(), 1);
    }

    #[tokio::test]
    async fn network_failure_still_lets_the_cache_answer() {
        let log = Log::default();
        let transport = Arc::new(
            ScriptedTransport::new(vec![Step::Head(500, None), Step::Chunk(b"oops"), Step::Finish])
                .with_cache(ScriptedTransport::ok(CACHED)),
        );

        recorded(&log).send(&client(&transport)).finished().await;

        assert_eq!(
            sorted(&log),
            vec![
                r#"cache "cache""#,
                "completion false",
                "failure 500 - Internal Server Error"
            ]
        );
    }

    #[tokio::test]
    async fn invalid_path_fails_once_without_touching_the_transport() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        let transport = Arc::new(ScriptedTransport::new(ScriptedTransport::ok(BODY)));
        let request = Request::<Value>::get("::nope::")
            .on_cache(|_| {})
            .on_completion(move |r| s.lock().unwrap().push(r.err().map(|e| e.to_string())));

        let states = request.send(&client(&transport)).finished().await;

        assert_eq!(states, vec![TaskState::Failed, TaskState::Failed]);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![Some("::nope:: is an invalid path".to_string())]
        );
        assert!(transport.opened().is_empty());
    }

    #[tokio::test]
    async fn callbacks_run_on_the_requested_queue() {
        let queue = DeliveryQueue::new();
        let expected = format!("delivery-{}", &queue.id().simple().to_string()[..8]);
        let thread = Arc::new(Mutex::new(None));
        let t = thread.clone();
        let transport = Arc::new(ScriptedTransport::new(ScriptedTransport::ok(BODY)));

        Request::<Value>::get("https://api.example.com/v1/contacts")
            .deliver_on(queue)
            .on_success(move |_| {
                *t.lock().unwrap() = std::thread::current().name().map(str::to_string);
            })
            .send(&client(&transport))
            .finished()
            .await;

        assert_eq!(thread.lock().unwrap().as_deref(), Some(expected.as_str()));
    }

    #[tokio::test]
    async fn client_queue_is_the_fallback() {
        let queue = DeliveryQueue::new();
        let expected = queue.id();
        let transport = Arc::new(ScriptedTransport::new(ScriptedTransport::ok(BODY)));
        let client = client(&transport).deliver_on(queue);

        let dispatched = Request::<Value>::get("https://api.example.com/").send(&client);

        assert_eq!(dispatched.queue.id(), expected);
        dispatched.finished().await;
    }

    #[tokio::test]
    async fn every_send_gets_its_own_request_id() {
        let transport = Arc::new(ScriptedTransport::new(ScriptedTransport::ok(BODY)));
        let client = client(&transport);
        let a = Request::<()>::get("https://h/a").send(&client);
        let b = Request::<()>::get("https://h/b").send(&client);
        assert_ne!(a.request_id(), b.request_id());
        assert_eq!(a.finished().await, vec![TaskState::Completed]);
        assert_eq!(b.finished().await, vec![TaskState::Completed]);
        assert_eq!(transport.opened().len(), 2);
    }

    #[tokio::test]
    async fn status_error_keeps_the_body() {
        let body = Arc::new(Mutex::new(None));
        let b = body.clone();
        let transport = Arc::new(ScriptedTransport::new(vec![
            Step::Head(401, None),
            Step::Chunk(br#"{"error":"unauthorized"}"#),
            Step::Finish,
        ]));

        Request::<Value>::get("https://api.example.com/v1/contacts")
            .on_failure(move |e: &HttpError| *b.lock().unwrap() = e.body_text())
            .send(&client(&transport))
            .finished()
            .await;

        assert_eq!(
            body.lock().unwrap().as_deref(),
            Some(r#"{"error":"unauthorized"}"#)
        );
    }
}
