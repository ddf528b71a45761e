use std::pin::pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::TryStreamExt;
use tracing::{info, warn};

use crate::clients::gitlab::GitLabApi;
use crate::contract::{ProduceContext, Producer};
use crate::error::{Failure, Failures, ProduceError};
use crate::pagination::Paginator;
use crate::producers::{normalize_groups, settle_group, CrawlError, GitLabSource, GIT_DOWNLOADER};
use crate::queue::TargetSink;
use crate::target::Target;

pub const NAME: &str = "gitlab";

/// Group label used when listing the instance's groups fails.
const ALL_GROUPS: &str = "*";

/// Crawls projects of GitLab groups, or of every group on the instance when
/// none are configured.
pub struct GitLabProducer {
    api: Arc<dyn GitLabApi>,
    groups: Vec<String>,
    include_subgroups: bool,
}

impl GitLabProducer {
    pub fn new(api: Arc<dyn GitLabApi>, source: &GitLabSource) -> Self {
        Self {
            api,
            groups: normalize_groups(&source.groups),
            include_subgroups: source.include_subgroups,
        }
    }

    async fn crawl_group(
        &self,
        group: &str,
        include_subgroups: bool,
        ctx: &ProduceContext,
        sink: &TargetSink,
        failures: &mut Failures,
    ) -> Result<(), CrawlError> {
        info!(group, include_subgroups, "crawling gitlab group");
        let api = self.api.as_ref();
        let projects = Paginator::new(&ctx.pagination, ctx.cancel.clone(), move |cursor| {
            api.list_group_projects(group, include_subgroups, cursor)
        })
        .into_items();
        let mut projects = pin!(projects);

        while let Some(project) = projects.try_next().await? {
            match project.http_url_to_repo.filter(|url| !url.is_empty()) {
                Some(url) => {
                    info!(group, identifier = %url, "discovered project");
                    sink.push(Target::new(url).with_downloader(GIT_DOWNLOADER))
                        .await?;
                }
                None => {
                    warn!(group, project = %project.path_with_namespace, "project has no clone URL");
                    failures.push(Failure::item(
                        group,
                        project.path_with_namespace,
                        "project has no clone URL",
                    ));
                }
            }
        }
        Ok(())
    }

    async fn crawl_instance(
        &self,
        ctx: &ProduceContext,
        sink: &TargetSink,
        failures: &mut Failures,
    ) -> Result<(), CrawlError> {
        info!("no gitlab groups configured, crawling every group on the instance");
        let api = self.api.as_ref();
        let groups = Paginator::new(&ctx.pagination, ctx.cancel.clone(), move |cursor| {
            api.list_groups(cursor)
        })
        .into_items();
        let mut groups = pin!(groups);

        while let Some(group) = groups.try_next().await? {
            let result = self
                .crawl_group(&group.full_path, true, ctx, sink, failures)
                .await;
            settle_group(failures, &group.full_path, result)?;
        }
        Ok(())
    }
}

#[async_trait]
impl Producer for GitLabProducer {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn produce(
        &self,
        ctx: &ProduceContext,
        sink: &TargetSink,
    ) -> Result<Failures, ProduceError> {
        let mut failures = Failures::new();
        if self.groups.is_empty() {
            let result = self.crawl_instance(ctx, sink, &mut failures).await;
            settle_group(&mut failures, ALL_GROUPS, result)?;
            return Ok(failures);
        }

        for group in &self.groups {
            let result = self
                .crawl_group(group, self.include_subgroups, ctx, sink, &mut failures)
                .await;
            settle_group(&mut failures, group, result)?;
        }
        Ok(failures)
    }
}
