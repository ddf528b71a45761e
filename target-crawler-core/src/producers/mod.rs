//! # producers: one [`Producer`](crate::contract::Producer) per provider
//!
//! The provider and its parameters are chosen by [`SourceConfig`], a tagged
//! enum keyed by `type`, and turned into a producer by
//! [`registry::Registry`]. All producers share the same failure rules:
//!
//! - No groups configured is a configuration error (GitLab excepted, where it
//!   means "every group on the instance").
//! - A group whose listing fails is recorded and the next group proceeds.
//! - An item that cannot be turned into a target is recorded and skipped.
//! - Cancellation or a closed queue stops the producer immediately.

pub mod dockerhub;
pub mod ghcr;
pub mod github;
pub mod gitlab;
pub mod registry;
pub mod static_list;

use std::future::Future;
use std::pin::pin;

use futures::{Stream, TryStreamExt};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::error::{Failure, Failures, ProduceError, SourceError};

pub const GIT_DOWNLOADER: &str = "git";
pub const DOCKER_DOWNLOADER: &str = "docker";

/// Selects the provider to crawl and its parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SourceConfig {
    Github(GitHubSource),
    Gitlab(GitLabSource),
    Ghcr(GhcrSource),
    Dockerhub(DockerHubSource),
    StaticList(StaticListSource),
}

impl SourceConfig {
    /// Registry name of the selected provider.
    pub fn name(&self) -> &'static str {
        match self {
            SourceConfig::Github(_) => github::NAME,
            SourceConfig::Gitlab(_) => gitlab::NAME,
            SourceConfig::Ghcr(_) => ghcr::NAME,
            SourceConfig::Dockerhub(_) => dockerhub::NAME,
            SourceConfig::StaticList(_) => static_list::NAME,
        }
    }
}

/// GitHub organizations or users whose repositories are crawled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHubSource {
    #[serde(default)]
    pub orgs: Vec<String>,
    #[serde(default)]
    pub skip_forks: bool,
    #[serde(default)]
    pub api_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitLabSource {
    /// Empty crawls every group on the instance.
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub instance_url: Option<String>,
    #[serde(default)]
    pub include_subgroups: bool,
}

/// Container packages on the GitHub Container Registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GhcrSource {
    #[serde(default)]
    pub orgs: Vec<String>,
    /// Most recent versions per package; 0 means all.
    #[serde(default = "default_recent_tag_limit")]
    pub recent_tag_limit: usize,
    #[serde(default)]
    pub api_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DockerHubSource {
    #[serde(default)]
    pub orgs: Vec<String>,
    #[serde(default = "default_recent_tag_limit")]
    pub recent_tag_limit: usize,
    #[serde(default)]
    pub api_url: Option<String>,
}

/// A fixed list of identifiers, one per line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticListSource {
    pub targets: String,
}

fn default_recent_tag_limit() -> usize {
    1
}

/// Splits comma-separated entries, trims them and drops empties.
pub fn normalize_groups(groups: &[String]) -> Vec<String> {
    groups
        .iter()
        .flat_map(|g| g.split(','))
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .map(str::to_string)
        .collect()
}

/// Collects the first `limit` items in provider order; 0 collects everything.
///
/// Stops pulling from `items` as soon as the cap is reached, so no further
/// pages are requested.
pub async fn collect_capped<T, S>(items: S, limit: usize) -> Result<Vec<T>, SourceError>
where
    S: Stream<Item = Result<T, SourceError>>,
{
    let mut items = pin!(items);
    let mut collected = Vec::new();
    while let Some(item) = items.try_next().await? {
        collected.push(item);
        if limit > 0 && collected.len() >= limit {
            break;
        }
    }
    Ok(collected)
}

/// Awaits a single provider call unless the run is cancelled first.
pub(crate) async fn cancellable<T>(
    cancel: &CancellationToken,
    call: impl Future<Output = Result<T, SourceError>>,
) -> Result<T, SourceError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SourceError::Cancelled),
        result = call => result,
    }
}

/// Why enumeration of one group stopped.
#[derive(Debug)]
pub(crate) enum CrawlError {
    /// The provider failed; recorded, the next group proceeds.
    Source(SourceError),
    /// The run is over for this producer.
    Halted(ProduceError),
}

impl From<SourceError> for CrawlError {
    fn from(e: SourceError) -> Self {
        match e {
            SourceError::Cancelled => CrawlError::Halted(ProduceError::Cancelled),
            other => CrawlError::Source(other),
        }
    }
}

impl From<ProduceError> for CrawlError {
    fn from(e: ProduceError) -> Self {
        CrawlError::Halted(e)
    }
}

/// Records a failed group and lets the caller continue, or propagates a halt.
pub(crate) fn settle_group(
    failures: &mut Failures,
    group: &str,
    result: Result<(), CrawlError>,
) -> Result<(), ProduceError> {
    match result {
        Ok(()) => Ok(()),
        Err(CrawlError::Source(e)) => {
            error!(group, error = %e, "error crawling group");
            failures.push(Failure::group(group, e));
            Ok(())
        }
        Err(CrawlError::Halted(e)) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_split_on_commas_and_drop_blanks() {
        let groups = vec!["acme, widgets".to_string(), "".to_string(), " tools ".to_string()];
        assert_eq!(normalize_groups(&groups), vec!["acme", "widgets", "tools"]);
    }

    #[tokio::test]
    async fn zero_cap_keeps_everything() {
        let items = || futures::stream::iter(vec![Ok(1), Ok(2), Ok(3)]);
        assert_eq!(collect_capped(items(), 0).await.unwrap(), vec![1, 2, 3]);
        assert_eq!(collect_capped(items(), 2).await.unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn cap_stops_before_a_later_error() {
        let items = futures::stream::iter(vec![
            Ok(1),
            Err(SourceError::Other("page 2 failed".into())),
        ]);
        assert_eq!(collect_capped(items, 1).await.unwrap(), vec![1]);
    }

    #[test]
    fn source_config_is_tagged_by_type() {
        let json = r#"{"type":"static-list","targets":"a\nb"}"#;
        let parsed: SourceConfig = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.name(), "static-list");

        let json = r#"{"type":"ghcr","orgs":["acme"]}"#;
        match serde_json::from_str::<SourceConfig>(json).unwrap() {
            SourceConfig::Ghcr(src) => assert_eq!(src.recent_tag_limit, 1),
            other => panic!("unexpected {other:?}"),
        }
    }
}
