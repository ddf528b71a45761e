//! # pagination: page-by-page listing with rate-limit backoff
//!
//! Every provider listing goes through [`Paginator`]. It owns the cursor,
//! calls the supplied fetch function once per page and decides from the
//! returned [`Page`] whether another page exists. When the provider reports
//! an exhausted quota and another page is still due, the next request waits
//! until the advertised reset (or the configured fallback). Errors are
//! returned as-is; nothing is retried.
//!
//! Cursor termination rules:
//! - [`NextPage::Done`] ends the listing.
//! - A numbered next page of `0`, one that does not exceed the current page,
//!   or one that is `>= total_pages` when the page carries a total, ends it.
//! - A link cursor that is empty or repeats the current link ends it.

use std::collections::VecDeque;
use std::future::Future;
use std::marker::PhantomData;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures::Stream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::PaginationSettings;
use crate::error::SourceError;

/// Position of the next request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor {
    /// 1-based.
    pub page: u32,
    pub per_page: u32,
    /// Absolute URL for providers that paginate by link rather than number.
    pub link: Option<String>,
}

impl PageCursor {
    pub fn first(per_page: u32) -> Self {
        Self {
            page: 1,
            per_page,
            link: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextPage {
    Done,
    Number(u32),
    Link(String),
}

/// Quota information carried by one response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RateLimitSignal {
    pub remaining: Option<u64>,
    pub reset_at: Option<SystemTime>,
}

impl RateLimitSignal {
    /// Parses raw header values. `reset` is in epoch seconds.
    pub fn parse(remaining: Option<&str>, reset: Option<&str>) -> Self {
        let remaining = remaining.and_then(|v| v.trim().parse::<u64>().ok());
        let reset_at = reset
            .and_then(|v| v.trim().parse::<u64>().ok())
            .and_then(|secs| UNIX_EPOCH.checked_add(Duration::from_secs(secs)));
        Self {
            remaining,
            reset_at,
        }
    }

    pub fn exhausted(&self) -> bool {
        self.remaining == Some(0)
    }

    /// How long to wait before the next request, if at all.
    ///
    /// Reset headers have second granularity, so the wait is rounded up to
    /// the next whole second.
    pub fn backoff(&self, now: SystemTime, fallback: Duration) -> Option<Duration> {
        if !self.exhausted() {
            return None;
        }
        match self.reset_at {
            Some(reset_at) => {
                let wait = reset_at.duration_since(now).unwrap_or(Duration::ZERO);
                Some(ceil_secs(wait))
            }
            None => Some(fallback),
        }
    }
}

fn ceil_secs(d: Duration) -> Duration {
    if d.subsec_nanos() == 0 {
        d
    } else {
        Duration::from_secs(d.as_secs() + 1)
    }
}

/// One fetched page.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next: NextPage,
    pub total_pages: Option<u32>,
    pub rate_limit: Option<RateLimitSignal>,
}

impl<T> Page<T> {
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next: NextPage::Done,
            total_pages: None,
            rate_limit: None,
        }
    }

    pub fn with_next(mut self, next: NextPage) -> Self {
        self.next = next;
        self
    }

    pub fn with_total_pages(mut self, total: u32) -> Self {
        self.total_pages = Some(total);
        self
    }

    pub fn with_rate_limit(mut self, signal: RateLimitSignal) -> Self {
        self.rate_limit = Some(signal);
        self
    }
}

/// Drives a fetch function across every page of a listing.
///
/// Not restartable: once the cursor terminates, `next_page` keeps
/// returning `Ok(None)`.
pub struct Paginator<T, F> {
    fetch: F,
    cursor: Option<PageCursor>,
    pending_backoff: Option<Duration>,
    fallback: Duration,
    cancel: CancellationToken,
    _items: PhantomData<fn() -> T>,
}

impl<T, F, Fut> Paginator<T, F>
where
    F: FnMut(PageCursor) -> Fut,
    Fut: Future<Output = Result<Page<T>, SourceError>>,
{
    pub fn new(settings: &PaginationSettings, cancel: CancellationToken, fetch: F) -> Self {
        Self {
            fetch,
            cursor: Some(PageCursor::first(settings.page_size)),
            pending_backoff: None,
            fallback: settings.rate_limit_fallback,
            cancel,
            _items: PhantomData,
        }
    }

    /// Fetches the next page, waiting out any pending rate-limit backoff first.
    pub async fn next_page(&mut self) -> Result<Option<Vec<T>>, SourceError> {
        let Some(cursor) = self.cursor.take() else {
            return Ok(None);
        };

        if let Some(wait) = self.pending_backoff.take() {
            info!(page = cursor.page, sleep = ?wait, "rate limit exhausted, pausing before next page");
            if !sleep_unless_cancelled(wait, &self.cancel).await {
                return Err(SourceError::Cancelled);
            }
        }

        let cancel = self.cancel.clone();
        let request = (self.fetch)(cursor.clone());
        let page = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SourceError::Cancelled),
            result = request => result?,
        };

        debug!(page = cursor.page, items = page.items.len(), "fetched page");

        self.cursor = advance(&cursor, &page);
        if self.cursor.is_some() {
            if let Some(signal) = page.rate_limit {
                self.pending_backoff = signal.backoff(SystemTime::now(), self.fallback);
                if let Some(wait) = self.pending_backoff {
                    debug!(remaining = ?signal.remaining, sleep = ?wait, "rate limit backoff scheduled");
                }
            }
        }

        Ok(Some(page.items))
    }

    /// Flattens the listing into a lazy stream of items.
    pub fn into_items(self) -> impl Stream<Item = Result<T, SourceError>> {
        futures::stream::try_unfold((self, VecDeque::new()), next_item::<T, F, Fut>)
    }
}

async fn next_item<T, F, Fut>(
    (mut pages, mut buffer): (Paginator<T, F>, VecDeque<T>),
) -> Result<Option<(T, (Paginator<T, F>, VecDeque<T>))>, SourceError>
where
    F: FnMut(PageCursor) -> Fut,
    Fut: Future<Output = Result<Page<T>, SourceError>>,
{
    loop {
        if let Some(item) = buffer.pop_front() {
            return Ok(Some((item, (pages, buffer))));
        }
        match pages.next_page().await? {
            Some(items) => buffer.extend(items),
            None => return Ok(None),
        }
    }
}

fn advance<T>(current: &PageCursor, page: &Page<T>) -> Option<PageCursor> {
    match &page.next {
        NextPage::Done => None,
        NextPage::Number(next) => {
            let next = *next;
            if next == 0 || next <= current.page {
                return None;
            }
            if matches!(page.total_pages, Some(total) if next >= total) {
                return None;
            }
            Some(PageCursor {
                page: next,
                per_page: current.per_page,
                link: None,
            })
        }
        NextPage::Link(link) => {
            if link.is_empty() || current.link.as_deref() == Some(link.as_str()) {
                return None;
            }
            Some(PageCursor {
                page: current.page + 1,
                per_page: current.per_page,
                link: Some(link.clone()),
            })
        }
    }
}

/// Sleeps for `duration`; returns `false` if `cancel` fired first.
pub(crate) async fn sleep_unless_cancelled(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
