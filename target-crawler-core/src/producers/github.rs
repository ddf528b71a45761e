use std::pin::pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::TryStreamExt;
use tracing::{debug, info, warn};

use crate::clients::github::{GitHubApi, GitHubConnector};
use crate::contract::{ProduceContext, Producer};
use crate::error::{Failure, Failures, ProduceError};
use crate::pagination::Paginator;
use crate::producers::{cancellable, normalize_groups, settle_group, CrawlError, GitHubSource, GIT_DOWNLOADER};
use crate::queue::TargetSink;
use crate::target::Target;

pub const NAME: &str = "github";

/// Crawls every repository of the configured GitHub organizations or users.
pub struct GitHubProducer {
    connector: Arc<dyn GitHubConnector>,
    orgs: Vec<String>,
    skip_forks: bool,
}

impl GitHubProducer {
    pub fn new(connector: Arc<dyn GitHubConnector>, source: &GitHubSource) -> Self {
        Self {
            connector,
            orgs: normalize_groups(&source.orgs),
            skip_forks: source.skip_forks,
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
        info!(group = org, ?kind, "crawling github account");

        let repos = Paginator::new(&ctx.pagination, ctx.cancel.clone(), move |cursor| {
            api.list_repositories(org, kind, cursor)
        })
        .into_items();
        let mut repos = pin!(repos);

        while let Some(repo) = repos.try_next().await? {
            if self.skip_forks && repo.fork {
                debug!(group = org, repository = %repo.full_name, "skipping fork");
                continue;
            }
            match repo.clone_url.filter(|url| !url.is_empty()) {
                Some(url) => {
                    info!(group = org, identifier = %url, "discovered repository");
                    sink.push(Target::new(url).with_downloader(GIT_DOWNLOADER))
                        .await?;
                }
                None => {
                    warn!(group = org, repository = %repo.full_name, "repository has no clone URL");
                    failures.push(Failure::item(org, repo.full_name, "repository has no clone URL"));
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Producer for GitHubProducer {
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
