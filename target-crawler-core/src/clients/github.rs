use std::sync::Arc;

use async_trait::async_trait;
#[allow(unused_imports)]
use mockall::automock;
use serde::Deserialize;
use url::Url;

use crate::auth::{resolve_github_auth, Auth, GitHubCredentials};
use crate::clients::{decode_json, get, header_str, next_page_from_link, parse_url, rate_limit_from};
use crate::contract::InstallationTokenExchange;
use crate::error::SourceError;
use crate::pagination::{NextPage, Page, PageCursor};

pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Whether a GitHub account is an organization or a user; selects the listing endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountKind {
    Organization,
    User,
}

impl AccountKind {
    fn segment(self) -> &'static str {
        match self {
            AccountKind::Organization => "orgs",
            AccountKind::User => "users",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Repository {
    pub full_name: String,
    #[serde(default)]
    pub clone_url: Option<String>,
    #[serde(default)]
    pub fork: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Package {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct PackageVersion {
    #[serde(default)]
    pub metadata: Option<VersionMetadata>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct VersionMetadata {
    #[serde(default)]
    pub container: Option<ContainerMetadata>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct ContainerMetadata {
    #[serde(default)]
    pub tags: Vec<String>,
}

impl PackageVersion {
    pub fn tagged(tags: &[&str]) -> Self {
        Self {
            metadata: Some(VersionMetadata {
                container: Some(ContainerMetadata {
                    tags: tags.iter().map(|t| t.to_string()).collect(),
                }),
            }),
        }
    }

    /// The tag used as this version's identifier.
    pub fn first_tag(&self) -> Option<&str> {
        self.metadata
            .as_ref()?
            .container
            .as_ref()?
            .tags
            .first()
            .map(String::as_str)
    }
}

#[derive(Debug, Deserialize)]
struct Account {
    #[serde(rename = "type")]
    kind: String,
}

/// The subset of the GitHub REST API the crawlers need.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait GitHubApi: Send + Sync {
    async fn account_kind(&self, account: &str) -> Result<AccountKind, SourceError>;

    async fn list_repositories(
        &self,
        account: &str,
        kind: AccountKind,
        cursor: PageCursor,
    ) -> Result<Page<Repository>, SourceError>;

    async fn list_container_packages(
        &self,
        account: &str,
        kind: AccountKind,
        cursor: PageCursor,
    ) -> Result<Page<Package>, SourceError>;

    async fn list_package_versions(
        &self,
        account: &str,
        kind: AccountKind,
        package: &str,
        cursor: PageCursor,
    ) -> Result<Page<PackageVersion>, SourceError>;
}

/// Builds an authenticated [`GitHubApi`] once per producer invocation.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait GitHubConnector: Send + Sync {
    async fn connect(&self) -> Arc<dyn GitHubApi>;
}

pub struct GitHubClient {
    http: reqwest::Client,
    base: Url,
    auth: Auth,
}

impl GitHubClient {
    pub fn new(http: reqwest::Client, api_url: &str, auth: Auth) -> Result<Self, SourceError> {
        Ok(Self {
            http,
            base: parse_url(api_url)?,
            auth,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, SourceError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| SourceError::InvalidUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn list<T: serde::de::DeserializeOwned>(
        &self,
        mut url: Url,
        cursor: &PageCursor,
        extra: &[(&str, &str)],
    ) -> Result<Page<T>, SourceError> {
        {
            let mut query = url.query_pairs_mut();
            for (k, v) in extra {
                query.append_pair(k, v);
            }
            query
                .append_pair("per_page", &cursor.per_page.to_string())
                .append_pair("page", &cursor.page.to_string());
        }
        let resp = get(&self.http, &self.auth, &url).await?;
        let headers = resp.headers().clone();
        let items: Vec<T> = decode_json(url.as_str(), resp).await?;

        let next = match next_page_from_link(header_str(&headers, "link")) {
            Some(page) => NextPage::Number(page),
            None => NextPage::Done,
        };
        let mut page = Page::last(items).with_next(next);
        if let Some(signal) = rate_limit_from(&headers, "x-ratelimit-remaining", "x-ratelimit-reset") {
            page = page.with_rate_limit(signal);
        }
        Ok(page)
    }
}

#[async_trait]
impl GitHubApi for GitHubClient {
    async fn account_kind(&self, account: &str) -> Result<AccountKind, SourceError> {
        let url = self.endpoint(&["users", account])?;
        let resp = get(&self.http, &self.auth, &url).await?;
        let body: Account = decode_json(url.as_str(), resp).await?;
        Ok(if body.kind == "Organization" {
            AccountKind::Organization
        } else {
            AccountKind::User
        })
    }

    async fn list_repositories(
        &self,
        account: &str,
        kind: AccountKind,
        cursor: PageCursor,
    ) -> Result<Page<Repository>, SourceError> {
        let url = self.endpoint(&[kind.segment(), account, "repos"])?;
        self.list(url, &cursor, &[]).await
    }

    async fn list_container_packages(
        &self,
        account: &str,
        kind: AccountKind,
        cursor: PageCursor,
    ) -> Result<Page<Package>, SourceError> {
        let url = self.endpoint(&[kind.segment(), account, "packages"])?;
        self.list(url, &cursor, &[("package_type", "container")]).await
    }

    async fn list_package_versions(
        &self,
        account: &str,
        kind: AccountKind,
        package: &str,
        cursor: PageCursor,
    ) -> Result<Page<PackageVersion>, SourceError> {
        let url = self.endpoint(&[
            kind.segment(),
            account,
            "packages",
            "container",
            package,
            "versions",
        ])?;
        self.list(url, &cursor, &[]).await
    }
}

/// Resolves credentials on every `connect` and hands out a [`GitHubClient`].
pub struct RestGitHubConnector {
    http: reqwest::Client,
    base: Url,
    credentials: GitHubCredentials,
    exchange: Arc<dyn InstallationTokenExchange>,
}

impl RestGitHubConnector {
    pub fn new(
        http: reqwest::Client,
        api_url: &str,
        credentials: GitHubCredentials,
        exchange: Arc<dyn InstallationTokenExchange>,
    ) -> Result<Self, SourceError> {
        Ok(Self {
            http,
            base: parse_url(api_url)?,
            credentials,
            exchange,
        })
    }
}

#[async_trait]
impl GitHubConnector for RestGitHubConnector {
    async fn connect(&self) -> Arc<dyn GitHubApi> {
        let auth = resolve_github_auth(&self.credentials, self.exchange.as_ref()).await;
        Arc::new(GitHubClient {
            http: self.http.clone(),
            base: self.base.clone(),
            auth,
        })
    }
}
