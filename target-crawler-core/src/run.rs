use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Instrument};
use uuid::Uuid;

use crate::config::{PaginationSettings, RunConfig};
use crate::contract::{JobCreator, ProduceContext, Producer, RunMetadata};
use crate::dispatch::Dispatcher;
use crate::error::{Failures, ProduceError, RunError};
use crate::queue;

/// Terminal state of a run that was not aborted.
#[derive(Debug)]
pub struct RunReport {
    pub crawler: String,
    pub run_id: Uuid,
    /// Dispatch attempts, successful or not.
    pub dispatched: usize,
    pub succeeded: usize,
    /// Group, item and dispatch failures, in the order they happened.
    pub failures: Failures,
}

impl RunReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Runs one crawl: spawns `producer` as its own task feeding a bounded queue
/// and drains that queue through the dispatcher on the calling task.
///
/// Configuration errors (from `config` or raised by the producer when it
/// starts) and cancellation are returned as [`RunError`]. Everything else
/// that went wrong is collected in [`RunReport::failures`].
pub async fn run<J>(
    producer: Arc<dyn Producer>,
    jobs: &J,
    config: &RunConfig,
    pagination: &PaginationSettings,
    cancel: CancellationToken,
) -> Result<RunReport, RunError>
where
    J: JobCreator + ?Sized,
{
    config.validate(pagination)?;
    let crawler = producer.name();
    if producer.requires_downloader_override() && config.downloader_override.is_none() {
        return Err(RunError::Config(format!(
            "the {crawler} crawler requires a downloader override"
        )));
    }

    let metadata = RunMetadata {
        run_id: Uuid::new_v4(),
        name: config.name.clone(),
        crawler: crawler.to_string(),
        profile: config.profile.clone(),
        ttl: config.pipeline_ttl,
        scan_service_account: config.scan_service_account.clone(),
        upload_service_account: config.upload_service_account.clone(),
    };
    let run_id = metadata.run_id;
    info!(crawler, run = %config.name, %run_id, "starting run");
    let started = Instant::now();

    let (sink, mut queue) = queue::bounded(config.queue_capacity, cancel.clone());
    let ctx = ProduceContext {
        pagination: pagination.clone(),
        cancel: cancel.clone(),
    };
    let span = tracing::info_span!("producer", crawler);
    let producer_task = tokio::spawn(
        async move {
            let outcome = producer.produce(&ctx, &sink).await;
            sink.close();
            outcome
        }
        .instrument(span),
    );

    let mut dispatcher = Dispatcher::new(jobs, config, metadata, cancel.clone());
    let dispatch = dispatcher.run_dispatch_loop(&mut queue).await;
    drop(queue);

    let produced = match producer_task.await {
        Ok(outcome) => outcome,
        Err(join_err) => {
            error!(error = %join_err, "producer task failed");
            return Err(RunError::ProducerTask(join_err.to_string()));
        }
    };

    let mut failures = match produced {
        Ok(failures) => failures,
        Err(ProduceError::Config(msg)) => {
            error!(error = %msg, "producer rejected its configuration");
            return Err(RunError::Config(msg));
        }
        Err(e @ (ProduceError::Cancelled | ProduceError::QueueClosed)) => {
            warn!(error = %e, "producer stopped early");
            return Err(RunError::Cancelled {
                dispatched: dispatch.attempted,
            });
        }
    };
    if dispatch.cancelled {
        return Err(RunError::Cancelled {
            dispatched: dispatch.attempted,
        });
    }
    failures.merge(dispatch.failures);

    let report = RunReport {
        crawler: crawler.to_string(),
        run_id,
        dispatched: dispatch.attempted,
        succeeded: dispatch.succeeded,
        failures,
    };
    info!(
        crawler,
        %run_id,
        dispatched = report.dispatched,
        succeeded = report.succeeded,
        group_failures = report.failures.group_failures(),
        item_failures = report.failures.item_failures(),
        dispatch_failures = report.failures.dispatch_failures(),
        elapsed = ?started.elapsed(),
        "run finished"
    );
    Ok(report)
}
