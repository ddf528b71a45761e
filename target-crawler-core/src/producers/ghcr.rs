use std::pin::pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::{future, TryStreamExt};
use tracing::{debug, error, info};

use crate::clients::github::{AccountKind, GitHubApi, GitHubConnector};
use crate::contract::{ProduceContext, Producer};
use crate::error::{Failure, Failures, ProduceError, SourceError};
use crate::pagination::Paginator;
use crate::producers::{
    cancellable, collect_capped, normalize_groups, settle_group, CrawlError, GhcrSource,
    DOCKER_DOWNLOADER,
};
use crate::queue::TargetSink;
use crate::target::Target;

pub const NAME: &str = "ghcr";

/// Crawls container images published to the GitHub Container Registry.
pub struct GhcrProducer {
    connector: Arc<dyn GitHubConnector>,
    orgs: Vec<String>,
    recent_tag_limit: usize,
}

impl GhcrProducer {
    pub fn new(connector: Arc<dyn GitHubConnector>, source: &GhcrSource) -> Self {
        Self {
            connector,
            orgs: normalize_groups(&source.orgs),
            recent_tag_limit: source.recent_tag_limit,
        }
    }

    async fn crawl_account(
        &self,
        api: &dyn GitHubApi,
        org: &str,
        ctx: &ProduceContext,
        sink: &TargetSink,
        failures: &mut Failures,
    ) -> Result<(), CrawlError> {
        let kind = cancellable(&ctx.cancel, api.account_kind(org)).await?;
        info!(group = org, ?kind, "crawling ghcr packages");

        let packages = Paginator::new(&ctx.pagination, ctx.cancel.clone(), move |cursor| {
            api.list_container_packages(org, kind, cursor)
        })
        .into_items();
        let mut packages = pin!(packages);

        while let Some(package) = packages.try_next().await? {
            let image = format!("ghcr.io/{org}/{}", package.name);
            let tags = match self.recent_tags(api, org, kind, &package.name, ctx).await {
                Ok(tags) => tags,
                Err(SourceError::Cancelled) => return Err(CrawlError::Halted(ProduceError::Cancelled)),
                Err(e) => {
                    error!(group = org, image = %image, error = %e, "error listing package versions");
                    failures.push(Failure::group(format!("{org}/{}", package.name), e));
                    continue;
                }
            };
            debug!(image = %image, versions = tags.len(), "listed package versions");
            for tag in tags {
                info!(identifier = %image, version = %tag, "discovered container image");
                sink.push(
                    Target::new(image.clone())
                        .with_version(tag)
                        .with_downloader(DOCKER_DOWNLOADER),
                )
                .await?;
            }
        }
        Ok(())
    }

    /// First tag of each of the most recent versions; untagged versions are skipped.
    async fn recent_tags(
        &self,
        api: &dyn GitHubApi,
        org: &str,
        kind: AccountKind,
        package: &str,
        ctx: &ProduceContext,
    ) -> Result<Vec<String>, SourceError> {
        let tags = Paginator::new(&ctx.pagination, ctx.cancel.clone(), move |cursor| {
            api.list_package_versions(org, kind, package, cursor)
        })
        .into_items()
        .try_filter_map(|version| future::ready(Ok(version.first_tag().map(str::to_string))));
        collect_capped(tags, self.recent_tag_limit).await
    }
}

#[async_trait]
impl Producer for GhcrProducer {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn produce(
        &self,
        ctx: &ProduceContext,
        sink: &TargetSink,
    ) -> Result<Failures, ProduceError> {
        if self.orgs.is_empty() {
            return Err(ProduceError::Config("no github org specified".into()));
        }
        let api = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return Err(ProduceError::Cancelled),
            api = self.connector.connect() => api,
        };

        let mut failures = Failures::new();
        for org in &self.orgs {
            let result = self
                .crawl_account(api.as_ref(), org, ctx, sink, &mut failures)
                .await;
            settle_group(&mut failures, org, result)?;
        }
        Ok(failures)
    }
}
