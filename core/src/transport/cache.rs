use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::RwLock;

use crate::http::ResponseHead;

pub const DEFAULT_MAX_ENTRIES: usize = 256;
pub const DEFAULT_MAX_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub head: ResponseHead,
    pub body: Bytes,
}

impl CachedResponse {
    /// Whether the server allows keeping this response at all.
    ///
    /// Any `Cache-Control` header carrying a `no-store` directive forbids it.
    pub fn storable(head: &ResponseHead) -> bool {
        !head
            .headers
            .iter()
            .filter(|(name, _)| name.eq_ignore_ascii_case("cache-control"))
            .flat_map(|(_, value)| value.split(','))
            .any(|directive| {
                let name = directive.split('=').next().unwrap_or_default();
                name.trim().eq_ignore_ascii_case("no-store")
            })
    }
}

#[derive(Debug)]
struct Store {
    entries: HashMap<String, CachedResponse>,
    // Least recently used first.
    order: VecDeque<String>,
    bytes: usize,
    max_entries: usize,
    max_bytes: usize,
}

impl Store {
    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            if let Some(k) = self.order.remove(pos) {
                self.order.push_back(k);
            }
        }
    }

    fn remove(&mut self, key: &str) -> Option<CachedResponse> {
        let entry = self.entries.remove(key)?;
        self.order.retain(|k| k != key);
        self.bytes -= entry.body.len();
        Some(entry)
    }

    fn insert(&mut self, key: String, response: CachedResponse) -> bool {
        self.remove(&key);
        let len = response.body.len();
        if self.max_entries == 0 || len > self.max_bytes {
            return false;
        }
        while !self.order.is_empty()
            && (self.entries.len() + 1 > self.max_entries || self.bytes + len > self.max_bytes)
        {
            if let Some(oldest) = self.order.pop_front() {
                if let Some(evicted) = self.entries.remove(&oldest) {
                    self.bytes -= evicted.body.len();
                    tracing::trace!(key = %oldest, "evicted cached response");
                }
            }
        }
        self.bytes += len;
        self.order.push_back(key.clone());
        self.entries.insert(key, response);
        true
    }
}

/// In-memory response store shared by clones of a transport.
///
/// Keyed by `PreparedRequest::cache_key` (method and full URL). Bounded by an
/// entry count and a total body size; the least recently used entries are
/// evicted first.
#[derive(Debug, Clone)]
pub struct ResponseCache {
    store: Arc<RwLock<Store>>,
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::with_limits(DEFAULT_MAX_ENTRIES, DEFAULT_MAX_BYTES)
    }
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(max_entries: usize, max_bytes: usize) -> Self {
        Self {
            store: Arc::new(RwLock::new(Store {
                entries: HashMap::new(),
                order: VecDeque::new(),
                bytes: 0,
                max_entries,
                max_bytes,
            })),
        }
    }

    pub async fn get(&self, key: &str) -> Option<CachedResponse> {
        let mut store = self.store.write().await;
        let found = store.entries.get(key).cloned();
        if found.is_some() {
            store.touch(key);
        }
        found
    }

    /// Store `response` under `key`, replacing any previous entry.
    ///
    /// Returns `false` when the response is not kept: the server sent
    /// `no-store`, or the body alone exceeds the size limit.
    pub async fn insert(&self, key: String, response: CachedResponse) -> bool {
        if !CachedResponse::storable(&response.head) {
            self.store.write().await.remove(&key);
            return false;
        }
        self.store.write().await.insert(key, response)
    }

    pub async fn remove(&self, key: &str) -> Option<CachedResponse> {
        self.store.write().await.remove(key)
    }

    pub async fn clear(&self) {
        let mut store = self.store.write().await;
        store.entries.clear();
        store.order.clear();
        store.bytes = 0;
    }

    pub async fn len(&self) -> usize {
        self.store.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.store.read().await.entries.is_empty()
    }

    /// Total size of the cached bodies.
    pub async fn bytes(&self) -> usize {
        self.store.read().await.bytes
    }
}
