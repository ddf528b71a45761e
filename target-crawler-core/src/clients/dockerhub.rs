use async_trait::async_trait;
#[allow(unused_imports)]
use mockall::automock;
use serde::Deserialize;
use url::Url;

use crate::auth::Auth;
use crate::clients::{decode_json, get, parse_url};
use crate::error::SourceError;
use crate::pagination::{NextPage, Page, PageCursor};

pub const DEFAULT_API_URL: &str = "https://hub.docker.com";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Repository {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Tag {
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct Listing<T> {
    #[serde(default)]
    next: Option<String>,
    #[serde(default = "Vec::new")]
    results: Vec<T>,
}

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait DockerHubApi: Send + Sync {
    async fn list_repositories(
        &self,
        namespace: &str,
        cursor: PageCursor,
    ) -> Result<Page<Repository>, SourceError>;

    async fn list_tags(
        &self,
        namespace: &str,
        repository: &str,
        cursor: PageCursor,
    ) -> Result<Page<Tag>, SourceError>;
}

pub struct DockerHubClient {
    http: reqwest::Client,
    base: Url,
    auth: Auth,
}

impl DockerHubClient {
    pub fn new(http: reqwest::Client, api_url: &str, auth: Auth) -> Result<Self, SourceError> {
        Ok(Self {
            http,
            base: parse_url(api_url)?,
            auth,
        })
    }

    /// First page is built from `segments`; later pages follow the `next` link verbatim.
    async fn list<T: serde::de::DeserializeOwned>(
        &self,
        segments: &[&str],
        cursor: &PageCursor,
    ) -> Result<Page<T>, SourceError> {
        let url = match &cursor.link {
            Some(link) => parse_url(link)?,
            None => {
                let mut url = self.base.clone();
                url.path_segments_mut()
                    .map_err(|_| SourceError::InvalidUrl(self.base.to_string()))?
                    .pop_if_empty()
                    .extend(segments);
                url.query_pairs_mut()
                    .append_pair("page_size", &cursor.per_page.to_string());
                url
            }
        };
        let resp = get(&self.http, &self.auth, &url).await?;
        let listing: Listing<T> = decode_json(url.as_str(), resp).await?;
        let next = match listing.next {
            Some(link) if !link.is_empty() => NextPage::Link(link),
            _ => NextPage::Done,
        };
        Ok(Page::last(listing.results).with_next(next))
    }
}

#[async_trait]
impl DockerHubApi for DockerHubClient {
    async fn list_repositories(
        &self,
        namespace: &str,
        cursor: PageCursor,
    ) -> Result<Page<Repository>, SourceError> {
        self.list(&["v2", "namespaces", namespace, "repositories"], &cursor)
            .await
    }

    async fn list_tags(
        &self,
        namespace: &str,
        repository: &str,
        cursor: PageCursor,
    ) -> Result<Page<Tag>, SourceError> {
        self.list(
            &["v2", "namespaces", namespace, "repositories", repository, "tags"],
            &cursor,
        )
        .await
    }
}
