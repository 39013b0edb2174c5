//! Request de-duplication with bounded retry.
//!
//! Results are shared through a process-wide cache keyed by a
//! de-duplication key. Two calls with the same key inside the TTL window
//! share one underlying invocation. Failed and cancelled attempts are evicted
//! so the next caller starts fresh.

use std::any::Any;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, Weak};
use std::time::Duration;

use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_retry::strategy::FixedInterval;
use tokio_retry::RetryIf;
use tracing::{debug, trace, warn};

use crate::common::metrics::PerformanceTracker;
use crate::error::{ClientError, ClientResult};

/// Age after which a cached result is no longer shared
pub const CACHE_TTL: Duration = Duration::from_secs(5);
/// How often the background sweep runs
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(10);

type CachedValue = Arc<dyn Any + Send + Sync>;
type SharedResult = Shared<BoxFuture<'static, ClientResult<CachedValue>>>;

struct CacheEntry {
    id: u64,
    result: SharedResult,
    created_at: Instant,
}

/// Key to in-flight (or recently settled) result map
pub struct RequestCache {
    entries: DashMap<String, CacheEntry>,
    next_id: AtomicU64,
    sweeper_started: AtomicBool,
}

static GLOBAL_CACHE: OnceLock<Arc<RequestCache>> = OnceLock::new();

impl Default for RequestCache {
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
            next_id: AtomicU64::new(1),
            sweeper_started: AtomicBool::new(false),
        }
    }
}

impl RequestCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cache shared by every request in the process
    pub fn global() -> Arc<RequestCache> {
        GLOBAL_CACHE
            .get_or_init(|| Arc::new(RequestCache::new()))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    fn live_entry(&self, key: &str) -> Option<(u64, SharedResult)> {
        let entry = self.entries.get(key)?;
        if entry.created_at.elapsed() > CACHE_TTL {
            return None;
        }
        Some((entry.id, entry.result.clone()))
    }

    fn insert(&self, key: &str, result: SharedResult) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                id,
                result,
                created_at: Instant::now(),
            },
        );
        id
    }

    /// Remove the entry only if it is still the one identified by `id`
    fn evict(&self, key: &str, id: u64) -> bool {
        self.entries.remove_if(key, |_, entry| entry.id == id).is_some()
    }

    /// Drop every entry older than the TTL, returning how many were removed
    pub fn sweep(&self) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.created_at.elapsed() <= CACHE_TTL);
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            trace!(removed, "Swept expired request cache entries");
        }
        removed
    }

    /// Spawn the periodic sweep. The task ends once the cache is dropped.
    pub fn start_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        self.sweeper_started.store(true, Ordering::Release);
        let cache: Weak<RequestCache> = Arc::downgrade(self);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            // The first tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                match cache.upgrade() {
                    Some(cache) => {
                        cache.sweep();
                    }
                    None => break,
                }
            }
        })
    }

    /// Start the sweep once, if running inside a tokio runtime
    fn ensure_sweeper(self: &Arc<Self>) {
        if self.sweeper_started.load(Ordering::Acquire)
            || tokio::runtime::Handle::try_current().is_err()
        {
            return;
        }
        if self
            .sweeper_started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            debug!("Starting request cache sweeper");
            self.start_sweeper();
        }
    }
}

/// Settings for one de-duplicated request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupOptions {
    /// Cache key. Derived from the operation's type when absent.
    pub key: Option<String>,
    /// Retries after the first failure
    pub max_retries: usize,
    /// Pause between attempts
    pub retry_delay: Duration,
}

impl Default for DedupOptions {
    fn default() -> Self {
        Self {
            key: None,
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
        }
    }
}

impl DedupOptions {
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }
}

type Operation<T> = Arc<dyn Fn() -> BoxFuture<'static, ClientResult<T>> + Send + Sync>;

/// The attempt currently owned by a [`DedupRequest`]
struct Attempt {
    abort: Arc<AtomicBool>,
    entry_id: Option<u64>,
}

/// A repeatable request whose results are shared through a [`RequestCache`].
///
/// Starting a new execution aborts the previous one made by the same
/// instance.
pub struct DedupRequest<T> {
    key: String,
    options: DedupOptions,
    operation: Operation<T>,
    cache: Arc<RequestCache>,
    tracker: Arc<PerformanceTracker>,
    current: Mutex<Option<Attempt>>,
    retry_count: Arc<AtomicU32>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> DedupRequest<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// De-duplicate through the process-wide cache
    pub fn new<F, Fut>(operation: F, options: DedupOptions) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ClientResult<T>> + Send + 'static,
    {
        Self::with_cache(RequestCache::global(), operation, options)
    }

    pub fn with_cache<F, Fut>(cache: Arc<RequestCache>, operation: F, options: DedupOptions) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ClientResult<T>> + Send + 'static,
    {
        let key = options
            .key
            .clone()
            .unwrap_or_else(|| std::any::type_name::<F>().to_string());

        Self {
            key,
            options,
            operation: Arc::new(move || operation().boxed()),
            cache,
            tracker: PerformanceTracker::global(),
            current: Mutex::new(None),
            retry_count: Arc::new(AtomicU32::new(0)),
            _marker: PhantomData,
        }
    }

    /// Record attempts in `tracker` instead of the process-wide one
    pub fn with_tracker(mut self, tracker: Arc<PerformanceTracker>) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn tracker(&self) -> &Arc<PerformanceTracker> {
        &self.tracker
    }

    /// Retry number of the attempt in progress, 0 when none
    pub fn retry_count(&self) -> u32 {
        self.retry_count.load(Ordering::Acquire)
    }

    fn attempt(&self) -> MutexGuard<'_, Option<Attempt>> {
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Abort the in-flight attempt, if any, and forget its cache entry
    pub fn reset(&self) {
        if let Some(previous) = self.attempt().take() {
            self.cancel(previous);
        }
        self.retry_count.store(0, Ordering::Release);
    }

    fn cancel(&self, attempt: Attempt) {
        attempt.abort.store(true, Ordering::Release);
        if let Some(id) = attempt.entry_id {
            if self.cache.evict(&self.key, id) {
                debug!(key = %self.key, "Evicted cancelled request from cache");
            }
        }
    }

    /// Run the request, sharing a live cached result unless `force_refresh`
    pub async fn execute(&self, force_refresh: bool) -> ClientResult<T> {
        self.cache.ensure_sweeper();

        let abort = Arc::new(AtomicBool::new(false));
        let previous = self.attempt().replace(Attempt {
            abort: abort.clone(),
            entry_id: None,
        });
        if let Some(previous) = previous {
            self.cancel(previous);
        }

        if !force_refresh {
            if let Some((id, shared)) = self.cache.live_entry(&self.key) {
                trace!(key = %self.key, "Joining cached request");
                match shared.await {
                    Ok(value) => {
                        self.finish(&abort);
                        return self.downcast(value);
                    }
                    Err(e) => {
                        debug!(key = %self.key, error = %e, "Cached request failed, retrying fresh");
                        self.cache.evict(&self.key, id);
                    }
                }
            }
        }

        // Another execute may have superseded this one while it waited
        if abort.load(Ordering::Acquire) {
            return Err(ClientError::Cancelled);
        }

        let shared = self.spawn_attempt(abort.clone());
        let id = self.cache.insert(&self.key, shared.clone());
        {
            let mut current = self.attempt();
            match current.as_mut() {
                Some(attempt) if Arc::ptr_eq(&attempt.abort, &abort) => {
                    attempt.entry_id = Some(id)
                }
                _ => {
                    self.cache.evict(&self.key, id);
                }
            }
        }

        let result = shared.await;
        self.finish(&abort);
        match result {
            Ok(value) => self.downcast(value),
            Err(e) => {
                self.cache.evict(&self.key, id);
                Err(e)
            }
        }
    }

    /// Forget the attempt once settled so a later cancel cannot evict its result
    fn finish(&self, abort: &Arc<AtomicBool>) {
        let mut current = self.attempt();
        if matches!(current.as_ref(), Some(attempt) if Arc::ptr_eq(&attempt.abort, abort)) {
            current.take();
        }
    }

    fn spawn_attempt(&self, abort: Arc<AtomicBool>) -> SharedResult {
        let operation = self.operation.clone();
        let retry_count = self.retry_count.clone();
        let key = self.key.clone();
        let tracker = self.tracker.clone();
        let strategy = FixedInterval::new(self.options.retry_delay).take(self.options.max_retries);

        async move {
            let tries = AtomicU32::new(0);
            let result = RetryIf::spawn(
                strategy,
                || {
                    let attempt = tries.fetch_add(1, Ordering::AcqRel);
                    retry_count.store(attempt, Ordering::Release);
                    let aborted = abort.load(Ordering::Acquire);
                    let call = operation.clone();
                    let tracker = tracker.clone();
                    let key = key.clone();
                    async move {
                        if aborted {
                            return Err(ClientError::Cancelled);
                        }
                        let started = Instant::now();
                        let result = call().await;
                        tracker.record(&key, started.elapsed(), result.is_err());
                        result
                    }
                },
                |e: &ClientError| {
                    // Auth, validation and 4xx failures come back the same every time
                    let retry = !abort.load(Ordering::Acquire) && e.category().is_retryable();
                    if retry {
                        warn!(key = %key, error = %e, "Request failed, retrying");
                    } else {
                        debug!(key = %key, error = %e, "Request failed, not retrying");
                    }
                    retry
                },
            )
            .await;

            retry_count.store(0, Ordering::Release);
            if abort.load(Ordering::Acquire) {
                return Err(ClientError::Cancelled);
            }
            result.map(|value| Arc::new(value) as CachedValue)
        }
        .boxed()
        .shared()
    }

    fn downcast(&self, value: CachedValue) -> ClientResult<T> {
        value
            .downcast::<T>()
            .map(|value| (*value).clone())
            .map_err(|_| {
                ClientError::Decode(format!(
                    "cached result for key '{}' has a different type",
                    self.key
                ))
            })
    }
}

impl<T> Drop for DedupRequest<T> {
    fn drop(&mut self) {
        let current = self
            .current
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(attempt) = current {
            attempt.abort.store(true, Ordering::Release);
            if let Some(id) = attempt.entry_id {
                self.cache.evict(&self.key, id);
            }
        }
    }
}
