//! Pulse orchestration: completion gateway, response cache and batch runner.
//!
//! This crate sequences the pure stages in [`pipeline`] around the I/O that
//! providers perform. It owns the retry loop, the in-process cache and the
//! bounded worker pool, and contains no domain rules of its own.
//!
//! ## Architectural Layer
//!
//! **Orchestration layer.** Depends on [`pipeline`] port traits only; the
//! concrete providers are supplied by the `llm` crate at the composition root.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`backoff`] | Exponential backoff with jitter and timeout shrink |
//! | [`gateway`] | [`CompletionClient`]: provider dispatch with retries |
//! | [`cache`] | Partitioned LRU + TTL [`ResponseCache`] |
//! | [`batch`] | [`run_batch`]: chunked, bounded-concurrency execution |
//! | [`analyzer`] | [`TicketAnalyzer`]: the per-ticket pipeline |
//! | `testing` | Scripted provider and recording sleeper for tests (`testing` feature) |

pub mod analyzer;
pub mod backoff;
pub mod batch;
pub mod cache;
pub mod gateway;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use analyzer::{PendingReport, TicketAnalyzer};
pub use backoff::BackoffConfig;
pub use batch::{run_batch, BatchLimits, BatchProgress, BatchReport, ChunkProgress, LogProgress};
pub use cache::{CacheEntry, CachePartitions, CachePolicy, CacheStats, PartitionPolicies, ResponseCache};
pub use gateway::{CompletionClient, Sleeper, TokioSleeper};
