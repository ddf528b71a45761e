//! # dispatch: paced job submission
//!
//! The [`Dispatcher`] drains the [`TargetQueue`] one target at a time. Before
//! every submission it applies the run-level downloader override and waits
//! until at least `interval` has passed since the previous submission. The
//! first submission never waits. Submission failures are logged, recorded
//! and skipped.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::RunConfig;
use crate::contract::{JobCreator, JobRequest, RunMetadata};
use crate::error::{Failure, Failures};
use crate::pagination::sleep_unless_cancelled;
use crate::queue::TargetQueue;

/// Minimum-gap pacing between consecutive dispatches.
#[derive(Debug, Clone)]
pub struct Pacer {
    interval: Duration,
    last_dispatch_at: Option<Instant>,
}

impl Pacer {
    /// Starts with no previous dispatch, so the first one goes out immediately
    /// instead of waiting out an interval measured from run start.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_dispatch_at: None,
        }
    }

    /// Time still to wait at `now` before the next dispatch may start.
    pub fn remaining(&self, now: Instant) -> Duration {
        match self.last_dispatch_at {
            Some(last) => self.interval.saturating_sub(now.saturating_duration_since(last)),
            None => Duration::ZERO,
        }
    }

    pub fn mark(&mut self, at: Instant) {
        self.last_dispatch_at = Some(at);
    }

    /// Waits out the interval and stamps the dispatch time.
    /// Returns `false` if cancelled while waiting.
    pub async fn wait(&mut self, cancel: &CancellationToken) -> bool {
        let remaining = self.remaining(Instant::now());
        if !remaining.is_zero() && !sleep_unless_cancelled(remaining, cancel).await {
            return false;
        }
        self.mark(Instant::now());
        true
    }
}

/// Outcome of one dispatch loop.
#[derive(Debug, Default)]
pub struct DispatchReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failures: Failures,
    pub cancelled: bool,
}

pub struct Dispatcher<'a, J: JobCreator + ?Sized> {
    jobs: &'a J,
    pacer: Pacer,
    downloader_override: Option<String>,
    metadata: RunMetadata,
    cancel: CancellationToken,
}

impl<'a, J: JobCreator + ?Sized> Dispatcher<'a, J> {
    pub fn new(
        jobs: &'a J,
        config: &RunConfig,
        metadata: RunMetadata,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            jobs,
            pacer: Pacer::new(config.interval),
            downloader_override: config.downloader_override.clone(),
            metadata,
            cancel,
        }
    }

    /// Runs until the queue is closed and drained, or the run is cancelled.
    pub async fn run_dispatch_loop(&mut self, queue: &mut TargetQueue) -> DispatchReport {
        let mut report = DispatchReport::default();

        while let Some(mut target) = queue.recv().await {
            target.apply_downloader_override(self.downloader_override.as_deref());

            if !self.pacer.wait(&self.cancel).await {
                report.cancelled = true;
                break;
            }

            let request = JobRequest {
                identifier: target.identifier,
                version: target.version,
                downloader: target.default_downloader,
                run: self.metadata.clone(),
            };
            let identifier = request.identifier.clone();
            let version = request.version.clone();
            let downloader = request.downloader.clone();
            report.attempted += 1;

            let cancel = self.cancel.clone();
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    report.cancelled = true;
                    break;
                }
                result = self.jobs.create_job(request) => result,
            };

            match result {
                Ok(handle) => {
                    report.succeeded += 1;
                    info!(
                        identifier = %identifier,
                        version = ?version,
                        downloader = ?downloader,
                        job = %handle.name,
                        "dispatched target"
                    );
                }
                Err(e) => {
                    error!(
                        identifier = %identifier,
                        version = ?version,
                        error = %e,
                        "failed to dispatch target"
                    );
                    report.failures.push(Failure::dispatch(identifier, e));
                }
            }
        }

        if self.cancel.is_cancelled() {
            report.cancelled = true;
        }
        if report.cancelled {
            warn!(attempted = report.attempted, "dispatch loop cancelled");
            queue.close();
        }
        report
    }
}
