//! Deduplicated, batched resource prefetching
//!
//! Every request key moves through `absent → queued → pending → cached`.
//! The first preload after an idle period arms a flush timer; when it fires
//! the queue is drained in batches, one loader call per batch, and a batch
//! must resolve before the next one is taken. Failed batches are dropped
//! back to `absent` and only a new preload retries them.

use crate::loader::ResourceLoader;
use crate::request::{get_resource_key, ResourceRequest};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use trellis_expression::Value;

/// Upper bound of keys being loaded at once
pub const MAX_PENDING_RESOURCES: usize = 5;

/// Delay between the first preload and the flush it schedules
pub const FLUSH_DELAY: Duration = Duration::from_secs(1);

/// Immutable view of the cache; replaced wholesale on every update
pub type CacheSnapshot = Arc<HashMap<String, Value>>;

#[derive(Debug, Clone)]
pub struct ResourceEngineConfig {
    pub flush_delay: Duration,
    pub batch_size: usize,
}

impl Default for ResourceEngineConfig {
    fn default() -> Self {
        Self {
            flush_delay: FLUSH_DELAY,
            batch_size: MAX_PENDING_RESOURCES,
        }
    }
}

#[derive(Default)]
struct EngineState {
    queue: VecDeque<(String, ResourceRequest)>,
    queued: HashSet<String>,
    pending: HashSet<String>,
    /// Id of the armed flush timer
    armed: Option<u64>,
    timers: u64,
}

struct Inner {
    loader: Arc<dyn ResourceLoader>,
    config: ResourceEngineConfig,
    state: Mutex<EngineState>,
    cache: watch::Sender<CacheSnapshot>,
    /// Held for the duration of a drain so batches never overlap
    flushing: tokio::sync::Mutex<()>,
}

/// Resource prefetch engine
///
/// Cheap to clone; clones share the queue and cache. Preloading spawns the
/// flush on the current tokio runtime.
#[derive(Clone)]
pub struct ResourceEngine {
    inner: Arc<Inner>,
}

impl ResourceEngine {
    pub fn new(loader: Arc<dyn ResourceLoader>) -> Self {
        Self::with_config(loader, ResourceEngineConfig::default())
    }

    pub fn with_config(loader: Arc<dyn ResourceLoader>, config: ResourceEngineConfig) -> Self {
        let (cache, _) = watch::channel(Arc::new(HashMap::new()));
        Self {
            inner: Arc::new(Inner {
                loader,
                config: ResourceEngineConfig {
                    batch_size: config.batch_size.max(1),
                    ..config
                },
                state: Mutex::new(EngineState::default()),
                cache,
                flushing: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn config(&self) -> &ResourceEngineConfig {
        &self.inner.config
    }

    fn state(&self) -> MutexGuard<'_, EngineState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a request unless its key is already queued, pending or cached
    ///
    /// Returns the request key.
    pub fn preload_resource(&self, request: ResourceRequest) -> String {
        let key = get_resource_key(&request);
        let cached = self.inner.cache.borrow().contains_key(&key);

        let mut state = self.state();
        if cached || state.queued.contains(&key) || state.pending.contains(&key) {
            return key;
        }

        debug!(key = %key, resource = %request.name, "Queued resource");
        state.queued.insert(key.clone());
        state.queue.push_back((key.clone(), request));

        if state.armed.is_none() {
            state.timers += 1;
            let timer = state.timers;
            state.armed = Some(timer);
            let engine = self.clone();
            tokio::spawn(async move {
                tokio::time::sleep(engine.inner.config.flush_delay).await;
                engine.fire(timer).await;
            });
        }
        key
    }

    /// Drop the cached value and load the request again
    pub fn invalidate_resource(&self, request: ResourceRequest) -> String {
        let key = get_resource_key(&request);
        self.update_cache(|cache| {
            cache.remove(&key);
        });
        debug!(key = %key, "Invalidated resource");
        self.preload_resource(request)
    }

    /// Drain the queue now instead of waiting for the timer
    pub async fn flush_now(&self) {
        self.state().armed = None;
        self.drain().await;
    }

    async fn fire(&self, timer: u64) {
        if self.state().armed != Some(timer) {
            return;
        }
        self.drain().await;
    }

    async fn drain(&self) {
        let _flushing = self.inner.flushing.lock().await;

        loop {
            let batch: Vec<(String, ResourceRequest)> = {
                let mut state = self.state();
                if state.queue.is_empty() {
                    state.armed = None;
                    return;
                }
                let size = self.inner.config.batch_size.min(state.queue.len());
                let batch: Vec<_> = state.queue.drain(..size).collect();
                for (key, _) in &batch {
                    state.queued.remove(key);
                    state.pending.insert(key.clone());
                }
                batch
            };

            let requests: Vec<ResourceRequest> =
                batch.iter().map(|(_, request)| request.clone()).collect();
            let result = self.inner.loader.load(&requests).await;

            match result {
                Ok(values) => {
                    info!(count = values.len(), "Loaded resources");
                    self.update_cache(|cache| {
                        for ((key, _), value) in batch.iter().zip(values) {
                            cache.insert(key.clone(), value);
                        }
                    });
                }
                Err(error) => {
                    warn!(%error, count = batch.len(), "Failed to load resources");
                }
            }

            let mut state = self.state();
            for (key, _) in &batch {
                state.pending.remove(key);
            }
        }
    }

    fn update_cache(&self, update: impl FnOnce(&mut HashMap<String, Value>)) {
        self.inner.cache.send_modify(|snapshot| {
            let mut next = HashMap::clone(snapshot);
            update(&mut next);
            *snapshot = Arc::new(next);
        });
    }

    /// Receiver of cache snapshots, updated after every loaded batch
    pub fn subscribe(&self) -> watch::Receiver<CacheSnapshot> {
        self.inner.cache.subscribe()
    }

    pub fn cache_snapshot(&self) -> CacheSnapshot {
        self.inner.cache.borrow().clone()
    }

    pub fn get_cached(&self, key: &str) -> Option<Value> {
        self.inner.cache.borrow().get(key).cloned()
    }

    pub fn pending_count(&self) -> usize {
        self.state().pending.len()
    }

    pub fn queued_count(&self) -> usize {
        self.state().queue.len()
    }

    pub fn is_idle(&self) -> bool {
        let state = self.state();
        state.queue.is_empty() && state.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ResourceError, ResourceResult};
    use crate::request::RequestParam;
    use async_trait::async_trait;
    use tokio::sync::Semaphore;
    use trellis_data::ResourceMethod;

    /// Records batches; each batch waits for one semaphore permit
    struct GatedLoader {
        gate: Semaphore,
        batches: Mutex<Vec<Vec<String>>>,
        fail: bool,
    }

    impl GatedLoader {
        fn new(permits: usize) -> Arc<Self> {
            Arc::new(Self {
                gate: Semaphore::new(permits),
                batches: Mutex::new(Vec::new()),
                fail: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                gate: Semaphore::new(100),
                batches: Mutex::new(Vec::new()),
                fail: true,
            })
        }

        fn batch_sizes(&self) -> Vec<usize> {
            self.batches.lock().unwrap().iter().map(Vec::len).collect()
        }
    }

    #[async_trait]
    impl ResourceLoader for GatedLoader {
        async fn load(&self, requests: &[ResourceRequest]) -> ResourceResult<Vec<Value>> {
            self.batches
                .lock()
                .unwrap()
                .push(requests.iter().map(|r| r.name.clone()).collect());
            let permit = self.gate.acquire().await.unwrap();
            permit.forget();
            if self.fail {
                return Err(ResourceError::InvalidRequest("offline".into()));
            }
            Ok(requests
                .iter()
                .map(|r| Value::String(format!("data:{}", r.name)))
                .collect())
        }
    }

    fn request(name: &str) -> ResourceRequest {
        ResourceRequest {
            id: name.into(),
            name: name.into(),
            method: ResourceMethod::Get,
            url: format!("https://api.test/{name}"),
            search_params: vec![RequestParam {
                name: "v".into(),
                value: "1".into(),
            }],
            headers: vec![],
            body: None,
        }
    }

    /// Let spawned tasks run until they block
    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_never_exceeds_bound() {
        let loader = GatedLoader::new(0);
        let engine = ResourceEngine::new(loader.clone());

        for i in 0..12 {
            engine.preload_resource(request(&format!("r{i}")));
        }
        assert_eq!(engine.queued_count(), 12);
        assert_eq!(engine.pending_count(), 0);

        tokio::time::sleep(FLUSH_DELAY).await;
        settle().await;
        assert_eq!(engine.pending_count(), MAX_PENDING_RESOURCES);
        assert_eq!(engine.queued_count(), 7);

        for _ in 0..3 {
            assert!(engine.pending_count() <= MAX_PENDING_RESOURCES);
            loader.gate.add_permits(1);
            settle().await;
        }
        assert_eq!(loader.batch_sizes(), vec![5, 5, 2]);
        assert!(engine.is_idle());
        assert_eq!(engine.cache_snapshot().len(), 12);
    }

    #[tokio::test(start_paused = true)]
    async fn test_preload_is_idempotent() {
        let loader = GatedLoader::new(100);
        let engine = ResourceEngine::new(loader.clone());

        let key = engine.preload_resource(request("posts"));
        assert_eq!(engine.preload_resource(request("posts")), key);
        assert_eq!(engine.queued_count(), 1);

        engine.flush_now().await;
        assert_eq!(
            engine.get_cached(&key),
            Some(Value::String("data:posts".into()))
        );

        // Cached: no new network call, value untouched
        engine.preload_resource(request("posts"));
        assert_eq!(engine.queued_count(), 0);
        engine.flush_now().await;
        assert_eq!(loader.batch_sizes(), vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_batch_is_not_requeued() {
        let loader = GatedLoader::failing();
        let engine = ResourceEngine::new(loader.clone());

        let key = engine.preload_resource(request("posts"));
        engine.flush_now().await;
        assert!(engine.is_idle());
        assert_eq!(engine.get_cached(&key), None);

        tokio::time::sleep(FLUSH_DELAY * 2).await;
        settle().await;
        assert_eq!(loader.batch_sizes(), vec![1]);

        // An explicit preload retries
        engine.preload_resource(request("posts"));
        engine.flush_now().await;
        assert_eq!(loader.batch_sizes(), vec![1, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_is_debounced_from_first_preload() {
        let loader = GatedLoader::new(100);
        let engine = ResourceEngine::new(loader.clone());

        engine.preload_resource(request("a"));
        tokio::time::sleep(Duration::from_millis(600)).await;
        engine.preload_resource(request("b"));
        settle().await;
        assert!(loader.batch_sizes().is_empty());

        tokio::time::sleep(Duration::from_millis(400)).await;
        settle().await;
        assert_eq!(loader.batch_sizes(), vec![2]);
        assert_eq!(engine.cache_snapshot().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_reloads() {
        let loader = GatedLoader::new(100);
        let engine = ResourceEngine::new(loader.clone());
        let mut updates = engine.subscribe();

        let key = engine.preload_resource(request("posts"));
        engine.flush_now().await;
        assert!(updates.has_changed().unwrap());
        let before = updates.borrow_and_update().clone();
        assert!(before.contains_key(&key));

        engine.invalidate_resource(request("posts"));
        // Old snapshots are never touched
        assert!(before.contains_key(&key));
        assert_eq!(engine.get_cached(&key), None);
        assert_eq!(engine.queued_count(), 1);

        engine.flush_now().await;
        assert_eq!(loader.batch_sizes(), vec![1, 1]);
        assert!(engine.get_cached(&key).is_some());
    }
}
