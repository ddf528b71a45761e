use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::RunError;

pub const DEFAULT_PAGE_SIZE: u32 = 100;
pub const DEFAULT_RATE_LIMIT_FALLBACK: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_PIPELINE_TTL: Duration = Duration::from_secs(168 * 60 * 60);
pub const DEFAULT_QUEUE_CAPACITY: usize = 1;

/// Listing behaviour shared by every provider in a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationSettings {
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Wait applied when a provider reports an exhausted quota without a usable reset time.
    #[serde(default = "default_rate_limit_fallback", with = "humantime_serde")]
    pub rate_limit_fallback: Duration,
}

impl Default for PaginationSettings {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            rate_limit_fallback: DEFAULT_RATE_LIMIT_FALLBACK,
        }
    }
}

/// Run-level settings consumed by the dispatcher and attached to every job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    pub name: String,
    pub profile: String,
    /// Minimum gap between two job submissions.
    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,
    #[serde(default = "default_pipeline_ttl", with = "humantime_serde")]
    pub pipeline_ttl: Duration,
    #[serde(default)]
    pub downloader_override: Option<String>,
    #[serde(default)]
    pub scan_service_account: Option<String>,
    #[serde(default)]
    pub upload_service_account: Option<String>,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl RunConfig {
    pub fn new(name: impl Into<String>, profile: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            profile: profile.into(),
            interval: DEFAULT_INTERVAL,
            pipeline_ttl: DEFAULT_PIPELINE_TTL,
            downloader_override: None,
            scan_service_account: None,
            upload_service_account: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    pub fn validate(&self, pagination: &PaginationSettings) -> Result<(), RunError> {
        if self.name.trim().is_empty() {
            return Err(RunError::Config("run name must not be empty".into()));
        }
        if self.profile.trim().is_empty() {
            return Err(RunError::Config("profile must not be empty".into()));
        }
        if pagination.page_size == 0 {
            return Err(RunError::Config("page size must be greater than zero".into()));
        }
        if matches!(self.downloader_override.as_deref(), Some(d) if d.trim().is_empty()) {
            return Err(RunError::Config("downloader override must not be blank".into()));
        }
        Ok(())
    }

    pub fn trace_loaded(&self) {
        info!(
            run = %self.name,
            profile = %self.profile,
            interval = ?self.interval,
            downloader_override = ?self.downloader_override,
            "Loaded RunConfig"
        );
        debug!(?self, "RunConfig loaded (full debug)");
    }
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

fn default_rate_limit_fallback() -> Duration {
    DEFAULT_RATE_LIMIT_FALLBACK
}

fn default_interval() -> Duration {
    DEFAULT_INTERVAL
}

fn default_pipeline_ttl() -> Duration {
    DEFAULT_PIPELINE_TTL
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}
