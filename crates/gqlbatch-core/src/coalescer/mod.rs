//! Coalescer that turns independent submissions into batch loads.
//!
//! Callers submit keys one at a time and immediately receive a
//! [`PendingResult`]. Keys submitted in the same scheduling window are
//! grouped into one batch and handed to a [`BatchLoader`] exactly once;
//! each caller's pending result then settles with the outcome at its own
//! index, or with the shared error if the whole batch failed.
//!
//! # Flushing
//!
//! - [`FlushMode::Auto`]: the first caller that waits on a result of the
//!   open window yields once to the scheduler and then dispatches everything
//!   submitted in the meantime. The flush runs inside the waiting caller's
//!   own task, so a window is never cut short by another worker thread.
//! - [`FlushMode::Manual`]: nothing is dispatched until
//!   [`Coalescer::flush`] is called.
//!
//! In both modes a batch that reaches `max_batch_size` entries is sealed
//! and dispatched right away, and later submissions start a new batch.
//!
//! # Result caching
//!
//! With `cache_results` enabled, a submission whose key is byte-identical
//! to an earlier one shares the earlier [`PendingResult`] instead of taking
//! a new slot in a batch. Entries whose batch failed are evicted so a
//! later submission goes upstream again.

mod cache;
mod engine;
mod types;

pub use engine::Coalescer;
pub use types::{BatchLoader, CoalescerConfig, FlushMode, PendingResult};
