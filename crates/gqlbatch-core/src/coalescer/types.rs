//! Data types for the coalescer.

use std::fmt;
use std::future::IntoFuture;
use std::hash::Hash;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::{ClientError, Outcome};

/// When an open batch is dispatched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushMode {
    /// Flush a window once one of its callers awaits and the scheduler
    /// has had one turn to collect the rest.
    #[default]
    Auto,
    /// Flush only on an explicit [`Coalescer::flush`](super::Coalescer::flush).
    Manual,
}

/// Configuration for a [`Coalescer`](super::Coalescer).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoalescerConfig {
    /// Share pending results between identical keys.
    ///
    /// Defaults to `false`: every submission takes its own slot.
    pub cache_results: bool,
    /// Upper bound on keys per batch. `None` means unbounded.
    pub max_batch_size: Option<usize>,
    pub flush_mode: FlushMode,
}

impl CoalescerConfig {
    pub fn with_cache_results(mut self, cache_results: bool) -> Self {
        self.cache_results = cache_results;
        self
    }

    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = Some(max_batch_size);
        self
    }

    pub fn with_flush_mode(mut self, flush_mode: FlushMode) -> Self {
        self.flush_mode = flush_mode;
        self
    }

    /// Effective batch limit; zero is treated as unbounded.
    pub(crate) fn batch_limit(&self) -> Option<usize> {
        self.max_batch_size.filter(|limit| *limit > 0)
    }
}

/// Loads a whole batch of keys in one call.
///
/// Implementations return either one outcome per key, in key order, or a
/// single error that fails every key of the batch.
#[async_trait]
pub trait BatchLoader: Send + Sync + 'static {
    type Key: Clone + Eq + Hash + Send + Sync + 'static;
    type Value: Clone + Send + Sync + 'static;

    async fn load(&self, keys: &[Self::Key]) -> Result<Vec<Outcome<Self::Value>>, ClientError>;
}

/// Sending half of a pending result. Settles it exactly once.
pub(crate) type Settlement<V> = watch::Sender<Option<Outcome<V>>>;

/// Something that can seal one submission window.
pub(crate) trait WindowFlush: Send + Sync {
    /// Seals the open batch if it is still `window`.
    fn flush_window(self: Arc<Self>, window: u64);
}

/// Obligation of an auto-mode caller to close its window when it waits.
#[derive(Clone)]
pub(crate) struct FlushDuty {
    target: Weak<dyn WindowFlush>,
    window: u64,
}

impl FlushDuty {
    pub(crate) fn new(target: Weak<dyn WindowFlush>, window: u64) -> Self {
        Self { target, window }
    }

    fn discharge(self) {
        if let Some(target) = self.target.upgrade() {
            target.flush_window(self.window);
        }
    }
}

/// Handle to the eventual outcome of one submission.
///
/// Await it directly or through [`PendingResult::wait`]. Clones observe the
/// same settlement.
///
/// In [`FlushMode::Auto`], waiting on a handle whose window is still open
/// yields to the scheduler once and then dispatches that window, so every
/// submission made before the first caller waits lands in one batch.
pub struct PendingResult<V> {
    receiver: watch::Receiver<Option<Outcome<V>>>,
    duty: Option<FlushDuty>,
}

impl<V> PendingResult<V> {
    pub(crate) fn channel() -> (Settlement<V>, Self) {
        let (settlement, receiver) = watch::channel(None);
        (
            settlement,
            Self {
                receiver,
                duty: None,
            },
        )
    }

    pub(crate) fn subscribe(settlement: &Settlement<V>) -> Self {
        Self {
            receiver: settlement.subscribe(),
            duty: None,
        }
    }

    pub(crate) fn with_duty(mut self, duty: FlushDuty) -> Self {
        self.duty = Some(duty);
        self
    }

    /// Whether both handles observe the same slot.
    pub(crate) fn same_slot(&self, other: &Self) -> bool {
        self.receiver.same_channel(&other.receiver)
    }

    /// Returns `true` once the batch holding this submission has settled.
    pub fn is_settled(&self) -> bool {
        self.receiver.borrow().is_some()
    }
}

impl<V: Clone> PendingResult<V> {
    /// Waits for the batch to settle and returns this submission's outcome.
    ///
    /// Resolves to a [`FailureKind::Dropped`](crate::FailureKind::Dropped)
    /// error if the batch was abandoned without settling.
    pub async fn wait(mut self) -> Outcome<V> {
        if let Some(duty) = self.duty.take() {
            if !self.is_settled() {
                tokio::task::yield_now().await;
                duty.discharge();
            }
        }

        let settled = self
            .receiver
            .wait_for(Option::is_some)
            .await
            .map(|value| Option::clone(&value));

        match settled {
            Ok(Some(outcome)) => outcome,
            _ => Err(ClientError::dropped()),
        }
    }
}

impl<V> Clone for PendingResult<V> {
    fn clone(&self) -> Self {
        Self {
            receiver: self.receiver.clone(),
            duty: self.duty.clone(),
        }
    }
}

impl<V> fmt::Debug for PendingResult<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingResult")
            .field("settled", &self.is_settled())
            .finish()
    }
}

impl<V> IntoFuture for PendingResult<V>
where
    V: Clone + Send + Sync + 'static,
{
    type Output = Outcome<V>;
    type IntoFuture = BoxFuture<'static, Outcome<V>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.wait())
    }
}
