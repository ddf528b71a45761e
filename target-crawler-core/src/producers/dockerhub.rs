use std::pin::pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::TryStreamExt;
use tracing::{error, info};

use crate::clients::dockerhub::DockerHubApi;
use crate::contract::{ProduceContext, Producer};
use crate::error::{Failure, Failures, ProduceError, SourceError};
use crate::pagination::Paginator;
use crate::producers::{
    collect_capped, normalize_groups, settle_group, CrawlError, DockerHubSource, DOCKER_DOWNLOADER,
};
use crate::queue::TargetSink;
use crate::target::Target;

pub const NAME: &str = "dockerhub";

/// Crawls image tags of Docker Hub namespaces.
pub struct DockerHubProducer {
    api: Arc<dyn DockerHubApi>,
    namespaces: Vec<String>,
    recent_tag_limit: usize,
}

impl DockerHubProducer {
    pub fn new(api: Arc<dyn DockerHubApi>, source: &DockerHubSource) -> Self {
        Self {
            api,
            namespaces: normalize_groups(&source.orgs),
            recent_tag_limit: source.recent_tag_limit,
        }
    }

    async fn crawl_namespace(
        &self,
        namespace: &str,
        ctx: &ProduceContext,
        sink: &TargetSink,
        failures: &mut Failures,
    ) -> Result<(), CrawlError> {
        info!(group = namespace, "crawling docker hub namespace");
        let api = self.api.as_ref();
        let repositories = Paginator::new(&ctx.pagination, ctx.cancel.clone(), move |cursor| {
            api.list_repositories(namespace, cursor)
        })
        .into_items();
        let mut repositories = pin!(repositories);

        while let Some(repository) = repositories.try_next().await? {
            let image = format!("docker.io/{namespace}/{}", repository.name);
            let name = repository.name.as_str();
            let tags = Paginator::new(&ctx.pagination, ctx.cancel.clone(), move |cursor| {
                api.list_tags(namespace, name, cursor)
            })
            .into_items()
            .map_ok(|tag| tag.name);

            let tags = match collect_capped(tags, self.recent_tag_limit).await {
                Ok(tags) => tags,
                Err(SourceError::Cancelled) => return Err(CrawlError::Halted(ProduceError::Cancelled)),
                Err(e) => {
                    error!(group = namespace, image = %image, error = %e, "error listing tags");
                    failures.push(Failure::group(format!("{namespace}/{name}"), e));
                    continue;
                }
            };
            for tag in tags {
                info!(identifier = %image, version = %tag, "discovered image tag");
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
}

#[async_trait]
impl Producer for DockerHubProducer {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn produce(
        &self,
        ctx: &ProduceContext,
        sink: &TargetSink,
    ) -> Result<Failures, ProduceError> {
        if self.namespaces.is_empty() {
            return Err(ProduceError::Config("no dockerhub org specified".into()));
        }

        let mut failures = Failures::new();
        for namespace in &self.namespaces {
            let result = self.crawl_namespace(namespace, ctx, sink, &mut failures).await;
            settle_group(&mut failures, namespace, result)?;
        }
        Ok(failures)
    }
}
