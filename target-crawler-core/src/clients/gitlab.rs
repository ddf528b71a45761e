use async_trait::async_trait;
#[allow(unused_imports)]
use mockall::automock;
use serde::Deserialize;
use url::Url;

use crate::auth::Auth;
use crate::clients::{decode_json, get, header_str, parse_url, rate_limit_from};
use crate::error::SourceError;
use crate::pagination::{NextPage, Page, PageCursor};

pub const DEFAULT_INSTANCE_URL: &str = "https://gitlab.com";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Project {
    pub path_with_namespace: String,
    #[serde(default)]
    pub http_url_to_repo: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Group {
    pub full_path: String,
}

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait GitLabApi: Send + Sync {
    async fn list_group_projects(
        &self,
        group: &str,
        include_subgroups: bool,
        cursor: PageCursor,
    ) -> Result<Page<Project>, SourceError>;

    /// Every group visible to the caller.
    async fn list_groups(&self, cursor: PageCursor) -> Result<Page<Group>, SourceError>;
}

pub struct GitLabClient {
    http: reqwest::Client,
    api: Url,
    auth: Auth,
}

impl GitLabClient {
    /// `instance_url` is the web root, e.g. `https://gitlab.com`; `/api/v4` is appended.
    pub fn new(http: reqwest::Client, instance_url: &str, auth: Auth) -> Result<Self, SourceError> {
        let mut api = parse_url(instance_url)?;
        api.path_segments_mut()
            .map_err(|_| SourceError::InvalidUrl(instance_url.to_string()))?
            .pop_if_empty()
            .extend(["api", "v4"]);
        Ok(Self { http, api, auth })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, SourceError> {
        let mut url = self.api.clone();
        url.path_segments_mut()
            .map_err(|_| SourceError::InvalidUrl(self.api.to_string()))?
            .extend(segments);
        Ok(url)
    }

    async fn list<T: serde::de::DeserializeOwned>(
        &self,
        mut url: Url,
        cursor: &PageCursor,
    ) -> Result<Page<T>, SourceError> {
        url.query_pairs_mut()
            .append_pair("per_page", &cursor.per_page.to_string())
            .append_pair("page", &cursor.page.to_string());
        let resp = get(&self.http, &self.auth, &url).await?;
        let headers = resp.headers().clone();
        let items: Vec<T> = decode_json(url.as_str(), resp).await?;

        // X-Total-Pages is left out of the page: the cursor stops on
        // `next >= total`, which would skip GitLab's final page.
        let next = header_str(&headers, "x-next-page")
            .and_then(|v| v.trim().parse::<u32>().ok())
            .map(NextPage::Number)
            .unwrap_or(NextPage::Done);
        let mut page = Page::last(items).with_next(next);
        if let Some(signal) = rate_limit_from(&headers, "ratelimit-remaining", "ratelimit-reset") {
            page = page.with_rate_limit(signal);
        }
        Ok(page)
    }
}

#[async_trait]
impl GitLabApi for GitLabClient {
    async fn list_group_projects(
        &self,
        group: &str,
        include_subgroups: bool,
        cursor: PageCursor,
    ) -> Result<Page<Project>, SourceError> {
        // A single segment, so "parent/child" is sent as "parent%2Fchild".
        let mut url = self.endpoint(&["groups", group, "projects"])?;
        url.query_pairs_mut()
            .append_pair("include_subgroups", if include_subgroups { "true" } else { "false" });
        self.list(url, &cursor).await
    }

    async fn list_groups(&self, cursor: PageCursor) -> Result<Page<Group>, SourceError> {
        let url = self.endpoint(&["groups"])?;
        self.list(url, &cursor).await
    }
}
