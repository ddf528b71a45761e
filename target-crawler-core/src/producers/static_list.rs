use async_trait::async_trait;
use tracing::info;

use crate::contract::{ProduceContext, Producer};
use crate::error::{Failures, ProduceError};
use crate::producers::StaticListSource;
use crate::queue::TargetSink;
use crate::target::Target;

pub const NAME: &str = "static-list";

/// Emits one target per non-blank line of a fixed list.
///
/// Targets carry no downloader, so runs using this producer must configure a
/// downloader override.
pub struct StaticListProducer {
    identifiers: Vec<String>,
}

impl StaticListProducer {
    pub fn new(source: &StaticListSource) -> Self {
        Self {
            identifiers: source
                .targets
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }
}

#[async_trait]
impl Producer for StaticListProducer {
    fn name(&self) -> &'static str {
        NAME
    }

    fn requires_downloader_override(&self) -> bool {
        true
    }

    async fn produce(
        &self,
        _ctx: &ProduceContext,
        sink: &TargetSink,
    ) -> Result<Failures, ProduceError> {
        info!(targets = self.identifiers.len(), "queueing static targets");
        for identifier in &self.identifiers {
            sink.push(Target::new(identifier.as_str())).await?;
        }
        Ok(Failures::new())
    }
}
