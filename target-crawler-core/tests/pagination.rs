use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use futures::future::{self, Ready};
use futures::TryStreamExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use target_crawler_core::config::PaginationSettings;
use target_crawler_core::error::SourceError;
use target_crawler_core::pagination::{NextPage, Page, PageCursor, Paginator, RateLimitSignal};

type FetchLog = Arc<Mutex<Vec<(u32, Instant)>>>;

/// Fetch function answering each page number from `script` and logging when it was asked.
fn scripted<S>(
    log: FetchLog,
    script: S,
) -> impl FnMut(PageCursor) -> Ready<Result<Page<u32>, SourceError>>
where
    S: Fn(u32) -> Result<Page<u32>, SourceError>,
{
    move |cursor| {
        log.lock().unwrap().push((cursor.page, Instant::now()));
        future::ready(script(cursor.page))
    }
}

fn pages_requested(log: &FetchLog) -> Vec<u32> {
    log.lock().unwrap().iter().map(|(page, _)| *page).collect()
}

fn exhausted_until(reset_at: SystemTime) -> RateLimitSignal {
    RateLimitSignal {
        remaining: Some(0),
        reset_at: Some(reset_at),
    }
}

#[tokio::test]
async fn test_yields_concatenation_of_all_pages_without_refetching() {
    let log = FetchLog::default();
    let fetch = scripted(log.clone(), |page| match page {
        1 => Ok(Page::last(vec![1, 2, 3]).with_next(NextPage::Number(2))),
        2 => Ok(Page::last(vec![4, 5]).with_next(NextPage::Number(3))),
        3 => Ok(Page::last(vec![6]).with_next(NextPage::Number(0))),
        other => panic!("unexpected page {other}"),
    });

    let items: Vec<u32> = Paginator::new(&PaginationSettings::default(), CancellationToken::new(), fetch)
        .into_items()
        .try_collect()
        .await
        .unwrap();

    assert_eq!(items, vec![1, 2, 3, 4, 5, 6]);
    assert_eq!(pages_requested(&log), vec![1, 2, 3]);
}

#[tokio::test]
async fn test_requests_pages_with_configured_size() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = seen.clone();
    let settings = PaginationSettings {
        page_size: 25,
        ..PaginationSettings::default()
    };
    let fetch = move |cursor: PageCursor| {
        recorder.lock().unwrap().push(cursor);
        future::ready(Ok::<_, SourceError>(Page::last(vec![1u32])))
    };

    let mut pages = Paginator::new(&settings, CancellationToken::new(), fetch);
    assert_eq!(pages.next_page().await.unwrap(), Some(vec![1]));
    assert_eq!(pages.next_page().await.unwrap(), None);
    assert_eq!(pages.next_page().await.unwrap(), None);

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0], PageCursor::first(25));
}

#[tokio::test]
async fn test_non_advancing_next_page_terminates() {
    let log = FetchLog::default();
    let fetch = scripted(log.clone(), |page| match page {
        1 => Ok(Page::last(vec![1]).with_next(NextPage::Number(2))),
        2 => Ok(Page::last(vec![2]).with_next(NextPage::Number(2))),
        other => panic!("unexpected page {other}"),
    });

    let items: Vec<u32> = Paginator::new(&PaginationSettings::default(), CancellationToken::new(), fetch)
        .into_items()
        .try_collect()
        .await
        .unwrap();

    assert_eq!(items, vec![1, 2]);
    assert_eq!(pages_requested(&log), vec![1, 2]);
}

#[tokio::test]
async fn test_next_page_at_total_pages_terminates() {
    let log = FetchLog::default();
    let fetch = scripted(log.clone(), |page| match page {
        1 => Ok(Page::last(vec![1])
            .with_next(NextPage::Number(2))
            .with_total_pages(2)),
        other => panic!("unexpected page {other}"),
    });

    let items: Vec<u32> = Paginator::new(&PaginationSettings::default(), CancellationToken::new(), fetch)
        .into_items()
        .try_collect()
        .await
        .unwrap();

    assert_eq!(items, vec![1]);
    assert_eq!(pages_requested(&log), vec![1]);
}

#[tokio::test]
async fn test_error_propagates_after_earlier_items() {
    let log = FetchLog::default();
    let fetch = scripted(log.clone(), |page| match page {
        1 => Ok(Page::last(vec![1, 2]).with_next(NextPage::Number(2))),
        2 => Err(SourceError::Status {
            url: "https://api.example.test/items?page=2".into(),
            status: 502,
        }),
        other => panic!("unexpected page {other}"),
    });

    let mut pages = Paginator::new(&PaginationSettings::default(), CancellationToken::new(), fetch);
    assert_eq!(pages.next_page().await.unwrap(), Some(vec![1, 2]));
    let err = pages.next_page().await.unwrap_err();
    assert!(matches!(err, SourceError::Status { status: 502, .. }));
    assert_eq!(pages.next_page().await.unwrap(), None);
    assert_eq!(pages_requested(&log), vec![1, 2]);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_quota_delays_next_request_until_reset() {
    let log = FetchLog::default();
    let reset_at = SystemTime::now() + Duration::from_secs(5);
    let fetch = scripted(log.clone(), move |page| match page {
        1 => Ok(Page::last(vec![1])
            .with_next(NextPage::Number(2))
            .with_rate_limit(exhausted_until(reset_at))),
        2 => Ok(Page::last(vec![2])),
        other => panic!("unexpected page {other}"),
    });

    let items: Vec<u32> = Paginator::new(&PaginationSettings::default(), CancellationToken::new(), fetch)
        .into_items()
        .try_collect()
        .await
        .unwrap();

    assert_eq!(items, vec![1, 2]);
    let log = log.lock().unwrap();
    let gap = log[1].1 - log[0].1;
    assert!(gap >= Duration::from_secs(5), "second request after {gap:?}");
    assert!(gap < Duration::from_secs(7), "second request after {gap:?}");
}

#[tokio::test(start_paused = true)]
async fn test_missing_reset_waits_for_fallback() {
    let log = FetchLog::default();
    let settings = PaginationSettings {
        page_size: 100,
        rate_limit_fallback: Duration::from_secs(90),
    };
    let fetch = scripted(log.clone(), |page| match page {
        1 => Ok(Page::last(vec![1])
            .with_next(NextPage::Number(2))
            .with_rate_limit(RateLimitSignal::parse(Some("0"), Some("soon")))),
        2 => Ok(Page::last(vec![2])),
        other => panic!("unexpected page {other}"),
    });

    let items: Vec<u32> = Paginator::new(&settings, CancellationToken::new(), fetch)
        .into_items()
        .try_collect()
        .await
        .unwrap();

    assert_eq!(items, vec![1, 2]);
    let log = log.lock().unwrap();
    assert!(log[1].1 - log[0].1 >= Duration::from_secs(90));
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_quota_on_last_page_does_not_wait() {
    let log = FetchLog::default();
    let started = Instant::now();
    let reset_at = SystemTime::now() + Duration::from_secs(600);
    let fetch = scripted(log.clone(), move |page| match page {
        1 => Ok(Page::last(vec![1]).with_rate_limit(exhausted_until(reset_at))),
        other => panic!("unexpected page {other}"),
    });

    let items: Vec<u32> = Paginator::new(&PaginationSettings::default(), CancellationToken::new(), fetch)
        .into_items()
        .try_collect()
        .await
        .unwrap();

    assert_eq!(items, vec![1]);
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_interrupts_backoff() {
    let log = FetchLog::default();
    let reset_at = SystemTime::now() + Duration::from_secs(3600);
    let fetch = scripted(log.clone(), move |page| match page {
        1 => Ok(Page::last(vec![1])
            .with_next(NextPage::Number(2))
            .with_rate_limit(exhausted_until(reset_at))),
        other => panic!("unexpected page {other}"),
    });
    let cancel = CancellationToken::new();
    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(10)).await;
        canceller.cancel();
    });

    let started = Instant::now();
    let mut pages = Paginator::new(&PaginationSettings::default(), cancel, fetch);
    assert_eq!(pages.next_page().await.unwrap(), Some(vec![1]));
    assert!(matches!(pages.next_page().await, Err(SourceError::Cancelled)));
    assert!(started.elapsed() < Duration::from_secs(60));
    assert_eq!(pages_requested(&log), vec![1]);
}
