use std::sync::Arc;

use tracing::debug;

use crate::auth::{Auth, GitHubAppTokenExchange, GitHubCredentials};
use crate::clients::dockerhub::{self, DockerHubClient};
use crate::clients::github::{self as github_client, GitHubConnector, RestGitHubConnector};
use crate::clients::gitlab::{self as gitlab_client, GitLabClient};
use crate::contract::Producer;
use crate::error::{ProduceError, SourceError};
use crate::producers::dockerhub::DockerHubProducer;
use crate::producers::ghcr::GhcrProducer;
use crate::producers::github::GitHubProducer;
use crate::producers::gitlab::GitLabProducer;
use crate::producers::static_list::StaticListProducer;
use crate::producers::{self, SourceConfig};

/// Provider secrets, read from the environment by the caller.
#[derive(Clone, Default)]
pub struct ProviderCredentials {
    pub github: GitHubCredentials,
    pub gitlab_token: Option<String>,
    pub dockerhub_token: Option<String>,
}

/// Builds producers by provider name. Constructed once at startup.
pub struct Registry {
    http: reqwest::Client,
    credentials: ProviderCredentials,
}

impl Registry {
    pub const NAMES: [&'static str; 5] = [
        producers::github::NAME,
        producers::gitlab::NAME,
        producers::ghcr::NAME,
        producers::dockerhub::NAME,
        producers::static_list::NAME,
    ];

    pub fn new(http: reqwest::Client, credentials: ProviderCredentials) -> Self {
        Self { http, credentials }
    }

    pub fn names(&self) -> &'static [&'static str] {
        &Self::NAMES
    }

    pub fn build(&self, source: &SourceConfig) -> Result<Arc<dyn Producer>, ProduceError> {
        debug!(crawler = source.name(), "building producer");
        let producer: Arc<dyn Producer> = match source {
            SourceConfig::Github(src) => {
                let connector = self.github_connector(src.api_url.as_deref())?;
                Arc::new(GitHubProducer::new(connector, src))
            }
            SourceConfig::Ghcr(src) => {
                let connector = self.github_connector(src.api_url.as_deref())?;
                Arc::new(GhcrProducer::new(connector, src))
            }
            SourceConfig::Gitlab(src) => {
                let instance = src
                    .instance_url
                    .as_deref()
                    .unwrap_or(gitlab_client::DEFAULT_INSTANCE_URL);
                let auth = Auth::private_token_from(self.credentials.gitlab_token.clone());
                let client = GitLabClient::new(self.http.clone(), instance, auth).map_err(config_error)?;
                Arc::new(GitLabProducer::new(Arc::new(client), src))
            }
            SourceConfig::Dockerhub(src) => {
                let api_url = src.api_url.as_deref().unwrap_or(dockerhub::DEFAULT_API_URL);
                let auth = Auth::bearer_from(self.credentials.dockerhub_token.clone());
                let client = DockerHubClient::new(self.http.clone(), api_url, auth).map_err(config_error)?;
                Arc::new(DockerHubProducer::new(Arc::new(client), src))
            }
            SourceConfig::StaticList(src) => Arc::new(StaticListProducer::new(src)),
        };
        Ok(producer)
    }

    fn github_connector(&self, api_url: Option<&str>) -> Result<Arc<dyn GitHubConnector>, ProduceError> {
        let api_url = api_url.unwrap_or(github_client::DEFAULT_API_URL);
        let exchange = GitHubAppTokenExchange::new(self.http.clone(), api_url);
        let connector = RestGitHubConnector::new(
            self.http.clone(),
            api_url,
            self.credentials.github.clone(),
            Arc::new(exchange),
        )
        .map_err(config_error)?;
        Ok(Arc::new(connector))
    }
}

fn config_error(e: SourceError) -> ProduceError {
    ProduceError::Config(e.to_string())
}
