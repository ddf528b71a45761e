//! Error taxonomy for a crawl run.
//!
//! Only configuration problems abort a run. Everything that goes wrong for a
//! single group, item or dispatch is collected as a [`Failure`] into the
//! [`Failures`] aggregate and reported once the run has finished.

use std::fmt;

use thiserror::Error;

/// Failure talking to a source provider API.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("failed to decode response from {url}: {reason}")]
    Decode { url: String, reason: String },
    #[error("invalid url {0}")]
    InvalidUrl(String),
    #[error("credential exchange failed: {0}")]
    Credential(String),
    #[error("operation cancelled")]
    Cancelled,
    #[error("{0}")]
    Other(String),
}

/// Reasons a producer stops before it has walked every group.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProduceError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("target queue closed before enumeration finished")]
    QueueClosed,
    #[error("enumeration cancelled")]
    Cancelled,
}

/// Failure submitting a single job to the orchestration API.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("job request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("orchestrator rejected job with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("{0}")]
    Other(String),
}

/// Terminal failure of a whole run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("producer task failed: {0}")]
    ProducerTask(String),
    #[error("run cancelled after {dispatched} dispatch attempts")]
    Cancelled { dispatched: usize },
}

impl From<ProduceError> for RunError {
    fn from(e: ProduceError) -> Self {
        match e {
            ProduceError::Config(msg) => RunError::Config(msg),
            other => RunError::ProducerTask(other.to_string()),
        }
    }
}

/// One recorded, non-fatal failure.
#[derive(Debug, Error)]
pub enum Failure {
    /// Listing a group (or a nested listing inside it) failed.
    #[error("group {group}: {source}")]
    Group {
        group: String,
        #[source]
        source: SourceError,
    },
    /// A single listed item could not be turned into a target.
    #[error("item {item} in group {group}: {reason}")]
    Item {
        group: String,
        item: String,
        reason: String,
    },
    /// The orchestration API refused or failed a job submission.
    #[error("dispatch of {identifier}: {source}")]
    Dispatch {
        identifier: String,
        #[source]
        source: JobError,
    },
}

impl Failure {
    pub fn group(group: impl Into<String>, source: SourceError) -> Self {
        Failure::Group {
            group: group.into(),
            source,
        }
    }

    pub fn item(group: impl Into<String>, item: impl Into<String>, reason: impl Into<String>) -> Self {
        Failure::Item {
            group: group.into(),
            item: item.into(),
            reason: reason.into(),
        }
    }

    pub fn dispatch(identifier: impl Into<String>, source: JobError) -> Self {
        Failure::Dispatch {
            identifier: identifier.into(),
            source,
        }
    }
}

/// Multi-error aggregate of everything that failed during a run.
#[derive(Debug, Default)]
pub struct Failures(Vec<Failure>);

impl Failures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, failure: Failure) {
        self.0.push(failure);
    }

    pub fn merge(&mut self, other: Failures) {
        self.0.extend(other.0);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Failure> {
        self.0.iter()
    }

    pub fn group_failures(&self) -> usize {
        self.count(|f| matches!(f, Failure::Group { .. }))
    }

    pub fn item_failures(&self) -> usize {
        self.count(|f| matches!(f, Failure::Item { .. }))
    }

    pub fn dispatch_failures(&self) -> usize {
        self.count(|f| matches!(f, Failure::Dispatch { .. }))
    }

    pub fn into_vec(self) -> Vec<Failure> {
        self.0
    }

    fn count(&self, pred: impl Fn(&Failure) -> bool) -> usize {
        self.0.iter().filter(|f| pred(f)).count()
    }
}

impl fmt::Display for Failures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failure(s)", self.0.len())?;
        for (i, failure) in self.0.iter().enumerate() {
            write!(f, "\n  {}. {}", i + 1, failure)?;
        }
        Ok(())
    }
}

impl std::error::Error for Failures {}

impl IntoIterator for Failures {
    type Item = Failure;
    type IntoIter = std::vec::IntoIter<Failure>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
