//! REST clients for the source providers.
//!
//! Each provider exposes a small trait (mocked in tests) and a `reqwest`
//! implementation translating HTTP responses into [`Page`](crate::pagination::Page)s.

pub mod dockerhub;
pub mod github;
pub mod gitlab;

use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::Response;
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::SourceError;
use crate::pagination::RateLimitSignal;

pub const USER_AGENT: &str = concat!("target-crawler/", env!("CARGO_PKG_VERSION"));

/// Shared HTTP client for every provider.
pub fn build_http_client() -> Result<reqwest::Client, SourceError> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(30))
        .timeout(Duration::from_secs(120))
        .build()
        .map_err(|e| SourceError::Other(format!("building http client: {e}")))
}

pub(crate) fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

pub(crate) fn rate_limit_from(
    headers: &HeaderMap,
    remaining: &str,
    reset: &str,
) -> Option<RateLimitSignal> {
    let signal = RateLimitSignal::parse(header_str(headers, remaining), header_str(headers, reset));
    (signal.remaining.is_some() || signal.reset_at.is_some()).then_some(signal)
}

pub(crate) fn check_status(url: &str, resp: Response) -> Result<Response, SourceError> {
    let status = resp.status();
    if status.is_success() {
        Ok(resp)
    } else {
        Err(SourceError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        })
    }
}

pub(crate) async fn decode_json<T: DeserializeOwned>(
    url: &str,
    resp: Response,
) -> Result<T, SourceError> {
    let bytes = resp.bytes().await.map_err(|source| SourceError::Transport {
        url: url.to_string(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|e| SourceError::Decode {
        url: url.to_string(),
        reason: e.to_string(),
    })
}

pub(crate) async fn get(
    http: &reqwest::Client,
    auth: &crate::auth::Auth,
    url: &Url,
) -> Result<Response, SourceError> {
    let request = auth.apply(http.get(url.clone()));
    let resp = request
        .send()
        .await
        .map_err(|source| SourceError::Transport {
            url: url.to_string(),
            source,
        })?;
    check_status(url.as_str(), resp)
}

pub(crate) fn parse_url(raw: &str) -> Result<Url, SourceError> {
    Url::parse(raw).map_err(|e| SourceError::InvalidUrl(format!("{raw}: {e}")))
}

/// Page number of the `rel="next"` entry of an RFC 8288 `Link` header.
pub(crate) fn next_page_from_link(link: Option<&str>) -> Option<u32> {
    let link = link?;
    link.split(',').find_map(|entry| {
        let mut parts = entry.split(';');
        let target = parts.next()?.trim();
        let is_next = parts.any(|p| {
            let p = p.trim();
            p == "rel=\"next\"" || p == "rel=next"
        });
        if !is_next {
            return None;
        }
        let target = target.strip_prefix('<')?.strip_suffix('>')?;
        let url = Url::parse(target).ok()?;
        url.query_pairs()
            .find(|(k, _)| k == "page")
            .and_then(|(_, v)| v.parse().ok())
    })
}
