//! # contract: seams between the crawl pipeline and the outside world
//!
//! The pipeline talks to three kinds of collaborator, each behind a trait:
//!
//! - [`Producer`]: enumerates one provider and pushes [`Target`](crate::target::Target)s
//!   into the queue. One implementation per provider, chosen by name from
//!   [`Registry`](crate::producers::registry::Registry).
//! - [`JobCreator`]: submits one job per dispatched target. The HTTP client for
//!   the orchestration API lives in the binary crate.
//! - [`InstallationTokenExchange`]: turns a GitHub App credential into an
//!   installation token.
//!
//! ## Mocking & Testing
//! `JobCreator` and `InstallationTokenExchange` are annotated for `mockall`; the
//! generated mocks are exported under the `test-export-mocks` feature so the
//! binary crate's tests can use them too.

use std::time::Duration;

use async_trait::async_trait;
#[allow(unused_imports)]
use mockall::automock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::auth::AppCredential;
use crate::config::PaginationSettings;
use crate::error::{Failures, JobError, ProduceError, SourceError};
use crate::queue::TargetSink;

/// Per-run metadata attached to every submitted job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunMetadata {
    pub run_id: Uuid,
    pub name: String,
    /// Name of the producer that discovered the targets.
    pub crawler: String,
    pub profile: String,
    pub ttl: Duration,
    pub scan_service_account: Option<String>,
    pub upload_service_account: Option<String>,
}

/// Everything needed to create one job for one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    pub identifier: String,
    pub version: Option<String>,
    /// Downloader after the run-level override has been applied.
    pub downloader: Option<String>,
    pub run: RunMetadata,
}

/// Handle of a job accepted by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    pub name: String,
}

/// Submits jobs to the downstream orchestration API.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait JobCreator: Send + Sync {
    async fn create_job(&self, request: JobRequest) -> Result<JobHandle, JobError>;
}

/// Exchanges a GitHub App installation credential for a short-lived token.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait InstallationTokenExchange: Send + Sync {
    async fn installation_token(&self, app: &AppCredential) -> Result<String, SourceError>;
}

/// Shared inputs handed to a producer when it starts.
#[derive(Debug, Clone)]
pub struct ProduceContext {
    pub pagination: PaginationSettings,
    pub cancel: CancellationToken,
}

/// Enumerates one external provider.
///
/// `produce` walks every configured group in order and pushes each target into
/// `sink`, which may block until the dispatcher is ready. Per-group and
/// per-item problems are returned as [`Failures`]; only configuration errors,
/// cancellation or a closed queue end the call with `Err`.
#[async_trait]
pub trait Producer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Producers that attach no downloader of their own need a run-level override.
    fn requires_downloader_override(&self) -> bool {
        false
    }

    async fn produce(
        &self,
        ctx: &ProduceContext,
        sink: &TargetSink,
    ) -> Result<Failures, ProduceError>;
}
