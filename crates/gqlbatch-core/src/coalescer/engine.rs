//! Coalescer implementation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{debug, debug_span, trace, warn, Instrument};

use super::cache::{CacheSlot, EvictionGuard, ResultCache};
use super::types::{
    BatchLoader, CoalescerConfig, FlushDuty, FlushMode, PendingResult, Settlement, WindowFlush,
};
use crate::error::{ClientError, FailureKind};

/// One submission waiting in the open batch.
struct PendingEntry<K, V> {
    key: K,
    settlement: Settlement<V>,
}

/// The batch currently accepting submissions.
struct OpenBatch<K, V> {
    entries: Vec<PendingEntry<K, V>>,
    /// Identifies the current window; bumped every time the batch is sealed.
    window: u64,
}

impl<K, V> OpenBatch<K, V> {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
            window: 0,
        }
    }

    fn take(&mut self) -> Vec<PendingEntry<K, V>> {
        self.window += 1;
        std::mem::take(&mut self.entries)
    }
}

struct Shared<L: BatchLoader> {
    loader: L,
    config: CoalescerConfig,
    open: Mutex<OpenBatch<L::Key, L::Value>>,
    cache: ResultCache<L::Key, L::Value>,
    next_batch_id: AtomicU64,
}

/// Groups concurrent submissions into batches for a [`BatchLoader`].
///
/// Cloning is cheap; clones share the open batch and the result cache.
///
/// # Panics
///
/// Dispatching spawns tokio tasks, so [`submit`](Self::submit),
/// [`flush`](Self::flush) and waiting on a [`PendingResult`] must happen
/// within a tokio runtime.
pub struct Coalescer<L: BatchLoader> {
    shared: Arc<Shared<L>>,
}

impl<L: BatchLoader> Clone for Coalescer<L> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<L: BatchLoader> Coalescer<L> {
    /// Creates a new coalescer in front of `loader`.
    pub fn new(loader: L, config: CoalescerConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                loader,
                config,
                open: Mutex::new(OpenBatch::new()),
                cache: ResultCache::new(),
                next_batch_id: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &CoalescerConfig {
        &self.shared.config
    }

    pub fn loader(&self) -> &L {
        &self.shared.loader
    }

    /// Registers `key` in the open batch and returns its pending result.
    ///
    /// Never calls the loader synchronously. The batch is dispatched as soon
    /// as it reaches the configured maximum size, on an explicit flush, or
    /// in [`FlushMode::Auto`] once a caller of the window waits on its
    /// result.
    pub fn submit(&self, key: L::Key) -> PendingResult<L::Value> {
        let (settlement, pending) = if self.shared.config.cache_results {
            match self.shared.cache.acquire(key.clone()) {
                CacheSlot::Hit(pending) => {
                    metrics::counter!("gqlbatch_cache_hits_total").increment(1);
                    trace!("sharing cached slot for identical request");
                    let window = self.shared.lock_open().window;
                    return self.attach_duty(pending, window);
                }
                CacheSlot::Miss(settlement, pending) => (settlement, pending),
            }
        } else {
            PendingResult::channel()
        };

        let mut open = self.shared.lock_open();
        let window = open.window;
        open.entries.push(PendingEntry { key, settlement });

        if let Some(limit) = self.shared.config.batch_limit() {
            if open.entries.len() >= limit {
                let entries = open.take();
                drop(open);
                self.shared.dispatch(entries);
                return pending;
            }
        }
        drop(open);

        self.attach_duty(pending, window)
    }

    /// Seals the open batch and dispatches it. No-op when it is empty.
    pub fn flush(&self) {
        self.shared.seal(None);
    }

    /// Number of submissions waiting in the open batch.
    pub fn open_len(&self) -> usize {
        self.shared.lock_open().entries.len()
    }

    /// Forgets the cached result for `key`. Returns whether it was cached.
    pub fn clear(&self, key: &L::Key) -> bool {
        self.shared.cache.remove(key)
    }

    /// Forgets every cached result.
    pub fn clear_all(&self) {
        self.shared.cache.clear();
    }

    /// In auto mode, makes the caller responsible for closing `window`.
    fn attach_duty(
        &self,
        pending: PendingResult<L::Value>,
        window: u64,
    ) -> PendingResult<L::Value> {
        if self.shared.config.flush_mode != FlushMode::Auto || pending.is_settled() {
            return pending;
        }
        let target: Weak<dyn WindowFlush> = Arc::downgrade(&self.shared) as Weak<Shared<L>>;
        pending.with_duty(FlushDuty::new(target, window))
    }
}

impl<L: BatchLoader> WindowFlush for Shared<L> {
    fn flush_window(self: Arc<Self>, window: u64) {
        self.seal(Some(window));
    }
}

impl<L: BatchLoader> Shared<L> {
    fn lock_open(&self) -> MutexGuard<'_, OpenBatch<L::Key, L::Value>> {
        // Critical sections only push or swap vectors, so a poisoned lock
        // still holds a consistent batch.
        self.open.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seals and dispatches the open batch. With `Some(window)`, does
    /// nothing unless that window is still the open one.
    fn seal(self: &Arc<Self>, window: Option<u64>) {
        let entries = {
            let mut open = self.lock_open();
            if window.is_some_and(|window| window != open.window) {
                return;
            }
            open.take()
        };

        if !entries.is_empty() {
            self.dispatch(entries);
        }
    }

    fn dispatch(self: &Arc<Self>, entries: Vec<PendingEntry<L::Key, L::Value>>) {
        let batch_id = self.next_batch_id.fetch_add(1, Ordering::Relaxed);
        let span = debug_span!("batch", batch_id, size = entries.len());
        let shared = Arc::clone(self);
        tokio::spawn(async move { shared.run_batch(entries).await }.instrument(span));
    }

    /// Loads one sealed batch and settles every submission in it.
    async fn run_batch(&self, entries: Vec<PendingEntry<L::Key, L::Value>>) {
        let size = entries.len();
        let (keys, settlements): (Vec<_>, Vec<_>) = entries
            .into_iter()
            .map(|entry| (entry.key, entry.settlement))
            .unzip();

        let slots = if self.config.cache_results {
            keys.iter()
                .cloned()
                .zip(settlements.iter().map(PendingResult::subscribe))
                .collect()
        } else {
            Vec::new()
        };
        let guard = EvictionGuard::new(&self.cache, slots);

        metrics::counter!("gqlbatch_batches_total").increment(1);
        metrics::histogram!("gqlbatch_batch_size").record(size as f64);
        debug!("dispatching batch");

        let result = match self.loader.load(&keys).await {
            Ok(outcomes) if outcomes.len() == size => Ok(outcomes),
            Ok(outcomes) => Err(ClientError::new(
                FailureKind::Shape,
                format!(
                    "batch loader returned {} results for {} keys",
                    outcomes.len(),
                    size
                ),
            )),
            Err(err) => Err(err),
        };

        match result {
            Ok(outcomes) => {
                let failed = outcomes.iter().filter(|outcome| outcome.is_err()).count();
                guard.complete(|index| outcomes[index].is_err());
                debug!(failed, "batch settled");

                for (settlement, outcome) in settlements.into_iter().zip(outcomes) {
                    settlement.send_replace(Some(outcome));
                }
            }
            Err(err) => {
                warn!(
                    kind = err.kind().as_str(),
                    status = ?err.status(),
                    error = %err,
                    "batch failed"
                );
                metrics::counter!("gqlbatch_batch_failures_total", "kind" => err.kind().as_str())
                    .increment(1);
                guard.complete(|_| true);

                for settlement in settlements {
                    settlement.send_replace(Some(Err(err.clone())));
                }
            }
        }
    }
}
