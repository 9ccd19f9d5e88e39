//! Bounded-concurrency batch execution.
//!
//! [`run_batch`] splits its input into chunks of `batch_chunk` requests and
//! drives each chunk through `futures::stream::buffer_unordered(max_workers)`,
//! so at most `max_workers` analyses are in flight at any instant. Chunks run
//! one after another.
//!
//! A per-item failure (an `Err` from the analysis function or a panic inside
//! it) becomes an [`AnalysisResult`] carrying an error and never affects
//! sibling items. Every attempted item yields exactly one result. Items that
//! were never started because the run was cancelled are counted in
//! [`BatchReport::skipped`] and produce no result.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::stream::{self, StreamExt};
use futures::FutureExt;
use pipeline::{AnalysisFailure, AnalysisRequest, AnalysisResult, BatchRunId, ErrorKind};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

/// Concurrency limits for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    /// Ceiling on concurrently running analyses (at least 1).
    pub max_workers: usize,
    /// Requests per chunk (at least 1).
    pub batch_chunk: usize,
}

impl BatchLimits {
    pub fn new(max_workers: usize, batch_chunk: usize) -> Self {
        Self {
            max_workers: max_workers.max(1),
            batch_chunk: batch_chunk.max(1),
        }
    }
}

/// Snapshot reported after each chunk completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkProgress {
    pub run_id: BatchRunId,
    /// Zero-based index of the chunk that just completed.
    pub chunk_index: usize,
    pub chunks_total: usize,
    /// Results collected so far across all chunks.
    pub completed: usize,
    pub total: usize,
    /// Results carrying an error so far.
    pub failed: usize,
}

/// Observer for chunk completion.
pub trait BatchProgress: Send + Sync {
    fn chunk_completed(&self, progress: &ChunkProgress);
}

/// [`BatchProgress`] that logs each chunk at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgress;

impl BatchProgress for LogProgress {
    fn chunk_completed(&self, progress: &ChunkProgress) {
        tracing::info!(
            run_id = %progress.run_id,
            chunk = progress.chunk_index + 1,
            chunks_total = progress.chunks_total,
            completed = progress.completed,
            total = progress.total,
            failed = progress.failed,
            "Batch chunk completed"
        );
    }
}

/// Outcome of a [`run_batch`] call.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub run_id: BatchRunId,
    /// One result per attempted item, in completion order.
    pub results: Vec<AnalysisResult>,
    /// How many of `results` carry an error.
    pub failed: usize,
    /// Items never started because the run was cancelled.
    pub skipped: usize,
}

impl BatchReport {
    /// Returns `true` if every input item produced a result.
    pub fn is_complete(&self) -> bool {
        self.skipped == 0
    }

    /// Results that succeeded.
    pub fn succeeded(&self) -> impl Iterator<Item = &AnalysisResult> {
        self.results.iter().filter(|r| !r.is_error())
    }
}

enum ItemOutcome {
    Done(AnalysisResult),
    Skipped,
}

/// Runs `analyze` over `items` within `limits`.
///
/// Cancelling `cancel` stops new items from starting; items already running
/// finish normally and their results are kept.
#[tracing::instrument(skip_all, fields(run_id = tracing::field::Empty, items = items.len(), max_workers = limits.max_workers, batch_chunk = limits.batch_chunk))]
pub async fn run_batch<F, Fut>(
    items: Vec<AnalysisRequest>,
    analyze: F,
    limits: BatchLimits,
    cancel: &CancellationToken,
    progress: &dyn BatchProgress,
) -> BatchReport
where
    F: Fn(AnalysisRequest) -> Fut,
    Fut: Future<Output = Result<AnalysisResult, AnalysisFailure>>,
{
    let limits = BatchLimits::new(limits.max_workers, limits.batch_chunk);
    let run_id = BatchRunId::new_random();
    tracing::Span::current().record("run_id", tracing::field::display(run_id));

    let total = items.len();
    let chunks_total = total.div_ceil(limits.batch_chunk);
    let mut report = BatchReport {
        run_id,
        results: Vec::with_capacity(total),
        failed: 0,
        skipped: 0,
    };

    tracing::info!(total, chunks_total, "Batch started");

    let analyze = &analyze;
    let mut remaining = items.into_iter().peekable();
    let mut chunk_index = 0;

    while remaining.peek().is_some() {
        let chunk: Vec<AnalysisRequest> = remaining.by_ref().take(limits.batch_chunk).collect();

        if cancel.is_cancelled() {
            report.skipped += chunk.len();
            report.skipped += remaining.by_ref().count();
            break;
        }

        let outcomes: Vec<ItemOutcome> = stream::iter(chunk)
            .map(|request| async move {
                if cancel.is_cancelled() {
                    return ItemOutcome::Skipped;
                }
                ItemOutcome::Done(run_item(analyze, request).await)
            })
            .buffer_unordered(limits.max_workers)
            .collect()
            .await;

        for outcome in outcomes {
            match outcome {
                ItemOutcome::Done(result) => {
                    if result.is_error() {
                        report.failed += 1;
                    }
                    report.results.push(result);
                }
                ItemOutcome::Skipped => report.skipped += 1,
            }
        }

        progress.chunk_completed(&ChunkProgress {
            run_id,
            chunk_index,
            chunks_total,
            completed: report.results.len(),
            total,
            failed: report.failed,
        });
        chunk_index += 1;
    }

    if report.skipped > 0 {
        tracing::warn!(
            completed = report.results.len(),
            skipped = report.skipped,
            "Batch cancelled before all items started"
        );
    } else {
        tracing::info!(
            completed = report.results.len(),
            failed = report.failed,
            "Batch finished"
        );
    }
    report
}

async fn run_item<F, Fut>(analyze: &F, request: AnalysisRequest) -> AnalysisResult
where
    F: Fn(AnalysisRequest) -> Fut,
    Fut: Future<Output = Result<AnalysisResult, AnalysisFailure>>,
{
    let request_id = request.id.clone();
    let attempt = AssertUnwindSafe(async move { analyze(request).await }).catch_unwind();

    match attempt.await {
        Ok(Ok(result)) => result,
        Ok(Err(failure)) => {
            tracing::warn!(request_id = %request_id, kind = %failure.kind, error = %failure.message, "Item analysis failed");
            AnalysisResult::failed(request_id, failure)
        }
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            tracing::error!(request_id = %request_id, panic = %message, "Item analysis panicked");
            AnalysisResult::failed(
                request_id,
                AnalysisFailure::new(ErrorKind::Unexpected, format!("analysis panicked: {message}")),
            )
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
