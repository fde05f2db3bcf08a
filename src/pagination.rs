//! Accumulated ("load more") lists on top of the query cache.
//!
//! A list lives under a single cache key whose payload is a `PageSet`: the
//! pages fetched so far plus the state of the next-page request. Appending a
//! page swaps in a new `PageSet` that shares the earlier pages, so readers
//! holding an old snapshot are never disturbed.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, TryFutureExt};
use serde::{Deserialize, Serialize};

use crate::error::FetchError;
use crate::net::{self, RetryPolicy};
use crate::query_cache::{
    erase, QueryCache, QueryEntry, QueryOptions, QueryStatus, QuerySubscription,
};
use crate::query_key::QueryKey;

/// Opaque continuation handed back to the server to get the next page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PageToken(pub i64);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub has_more: bool,
    pub next_token: Option<PageToken>,
}

impl<T> Page<T> {
    /// A page that claims more data but has no token cannot be continued,
    /// so it is treated as the last page.
    pub fn new(items: Vec<T>, has_more: bool, next_token: Option<PageToken>) -> Self {
        let has_more = has_more && next_token.is_some();
        Self {
            items,
            has_more,
            next_token: next_token.filter(|_| has_more),
        }
    }

    pub fn last(items: Vec<T>) -> Self {
        Self::new(items, false, None)
    }

    pub fn from_meta(items: Vec<T>, meta: Option<&PaginationMeta>) -> Self {
        match meta {
            Some(meta) => {
                let (has_more, next_token) = meta.continuation();
                Self::new(items, has_more, next_token)
            }
            None => Self::last(items),
        }
    }
}

/// `meta.pagination` as sent by the server. Both shapes are in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum PaginationMeta {
    Cursor {
        #[serde(rename = "hasMore")]
        has_more: bool,
        #[serde(rename = "nextPage", default)]
        next_page: Option<i64>,
    },
    Numbered {
        page: i64,
        pages: i64,
    },
}

impl PaginationMeta {
    pub fn continuation(&self) -> (bool, Option<PageToken>) {
        match *self {
            PaginationMeta::Cursor {
                has_more,
                next_page,
            } => (has_more, next_page.map(PageToken)),
            PaginationMeta::Numbered { page, pages } => {
                let more = page < pages;
                (more, more.then_some(PageToken(page + 1)))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum NextPageStatus {
    #[default]
    Idle,
    Loading,
    Error(FetchError),
}

static NEXT_EPOCH: AtomicU64 = AtomicU64::new(1);

/// Pages accumulated for one list key.
#[derive(Debug)]
pub struct PageSet<T> {
    pages: Vec<Arc<Page<T>>>,
    next_status: NextPageStatus,
    // Bumped whenever the list restarts from page one; a next page fetched
    // against an older epoch is discarded.
    epoch: u64,
}

impl<T> Clone for PageSet<T> {
    fn clone(&self) -> Self {
        Self {
            pages: self.pages.clone(),
            next_status: self.next_status.clone(),
            epoch: self.epoch,
        }
    }
}

impl<T> PageSet<T> {
    pub fn first(page: Page<T>) -> Self {
        Self {
            pages: vec![Arc::new(page)],
            next_status: NextPageStatus::Idle,
            epoch: NEXT_EPOCH.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn pages(&self) -> impl Iterator<Item = &Page<T>> {
        self.pages.iter().map(|p| p.as_ref())
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Items across all pages, in page order.
    pub fn items(&self) -> impl Iterator<Item = &T> {
        self.pages.iter().flat_map(|p| p.items.iter())
    }

    pub fn len(&self) -> usize {
        self.pages.iter().map(|p| p.items.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn has_more(&self) -> bool {
        self.pages.last().is_some_and(|p| p.has_more)
    }

    pub fn next_token(&self) -> Option<PageToken> {
        self.pages.last().and_then(|p| p.next_token)
    }

    pub fn next_page_status(&self) -> &NextPageStatus {
        &self.next_status
    }

    pub fn is_fetching_next_page(&self) -> bool {
        self.next_status == NextPageStatus::Loading
    }

    pub fn next_page_error(&self) -> Option<&FetchError> {
        match &self.next_status {
            NextPageStatus::Error(err) => Some(err),
            _ => None,
        }
    }

    fn with_status(&self, next_status: NextPageStatus) -> Self {
        Self {
            pages: self.pages.clone(),
            next_status,
            epoch: self.epoch,
        }
    }

    fn with_page(&self, page: Page<T>) -> Self {
        let mut pages = self.pages.clone();
        pages.push(Arc::new(page));
        Self {
            pages,
            next_status: NextPageStatus::Idle,
            epoch: self.epoch,
        }
    }
}

impl<T: Clone> PageSet<T> {
    pub fn to_vec(&self) -> Vec<T> {
        self.items().cloned().collect()
    }
}

/// What a `fetch_next_page` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextPageOutcome {
    Appended,
    /// The last page said there is nothing more.
    Exhausted,
    /// Another next-page request for this key is already running.
    AlreadyLoading,
    /// Page one has not loaded yet.
    NotLoaded,
    /// The list restarted while the page was in flight; the page was dropped.
    Superseded,
    Failed,
}

type PageFetcher<T> =
    Arc<dyn Fn(Option<PageToken>) -> BoxFuture<'static, Result<Page<T>, FetchError>> + Send + Sync>;

/// Handle to one accumulated list.
pub struct InfiniteQuery<T> {
    cache: QueryCache,
    key: QueryKey,
    fetch_page: PageFetcher<T>,
    retry: RetryPolicy,
}

impl<T> Clone for InfiniteQuery<T> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            key: self.key.clone(),
            fetch_page: self.fetch_page.clone(),
            retry: self.retry,
        }
    }
}

impl QueryCache {
    /// Open the list under `key`, loading page one unless the key already
    /// holds pages. Re-opening an accumulated list never refetches it.
    pub async fn infinite_query<T, F, Fut>(
        &self,
        key: QueryKey,
        fetch_page: F,
        options: QueryOptions,
    ) -> InfiniteQuery<T>
    where
        T: Send + Sync + 'static,
        F: Fn(Option<PageToken>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Page<T>, FetchError>> + Send + 'static,
    {
        let fetch_page: PageFetcher<T> =
            Arc::new(move |token: Option<PageToken>| fetch_page(token).boxed());
        let first = fetch_page.clone();
        let fetcher = erase(move || first(None).map_ok(PageSet::first));
        self.load_list(&key, fetcher, options).await;

        InfiniteQuery {
            cache: self.clone(),
            key,
            fetch_page,
            retry: options.retry,
        }
    }
}

impl<T: Send + Sync + 'static> InfiniteQuery<T> {
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    pub fn entry(&self) -> QueryEntry<PageSet<T>> {
        self.cache.entry(&self.key)
    }

    pub fn pages(&self) -> Option<Arc<PageSet<T>>> {
        self.cache.get_query_data(&self.key)
    }

    pub fn has_next_page(&self) -> bool {
        self.pages().is_some_and(|set| set.has_more())
    }

    pub fn subscribe(&self) -> QuerySubscription<PageSet<T>> {
        self.cache.subscribe(self.key.clone())
    }

    /// Restart from page one. Pages already shown stay visible until the
    /// new first page arrives.
    pub async fn refresh(&self) -> QueryStatus {
        self.cache.refetch(&self.key).await
    }

    /// Fetch and append the page after the last one.
    ///
    /// No-op while a next page is already in flight or when the last page
    /// has no successor. A failure leaves the loaded pages untouched and is
    /// exposed through `PageSet::next_page_error`.
    pub async fn fetch_next_page(&self) -> NextPageOutcome {
        let Some(mut claim) = NextPageClaim::acquire(self) else {
            return NextPageOutcome::AlreadyLoading;
        };
        self.fetch_next_claimed(&mut claim).await
    }

    async fn fetch_next_claimed(&self, claim: &mut NextPageClaim<'_, T>) -> NextPageOutcome {
        let Some(current) = self.pages() else {
            return NextPageOutcome::NotLoaded;
        };
        let Some(token) = current.next_token() else {
            return NextPageOutcome::Exhausted;
        };
        let epoch = current.epoch;

        self.cache.update_data::<PageSet<T>>(&self.key, |set| {
            (set.epoch == epoch).then(|| set.with_status(NextPageStatus::Loading))
        });
        claim.loading_epoch = Some(epoch);

        let fetch = self.fetch_page.clone();
        let label = format!("{} page={}", self.key, token.0);
        let result =
            net::run_with_retry(self.retry, &label, || fetch(Some(token)), |_, _| {}).await;
        claim.loading_epoch = None;

        match result {
            Ok(page) => {
                let merged = self.cache.update_data::<PageSet<T>>(&self.key, |set| {
                    (set.epoch == epoch).then(|| set.with_page(page))
                });
                if merged.is_some() {
                    log::debug!("[pagination] {} appended page {}", self.key, token.0);
                    NextPageOutcome::Appended
                } else {
                    log::debug!(
                        "[pagination] {} restarted, dropping page {}",
                        self.key,
                        token.0
                    );
                    NextPageOutcome::Superseded
                }
            }
            Err(err) => {
                log::warn!("[pagination] {} page {} failed: {err}", self.key, token.0);
                self.cache.update_data::<PageSet<T>>(&self.key, |set| {
                    (set.epoch == epoch).then(|| set.with_status(NextPageStatus::Error(err)))
                });
                NextPageOutcome::Failed
            }
        }
    }
}

/// Exclusive right to fetch the next page of one list.
///
/// Released on drop. A caller dropped mid-fetch also resets the list's
/// `Loading` status.
struct NextPageClaim<'a, T: Send + Sync + 'static> {
    list: &'a InfiniteQuery<T>,
    // Set while the list shows `Loading` for this epoch.
    loading_epoch: Option<u64>,
}

impl<'a, T: Send + Sync + 'static> NextPageClaim<'a, T> {
    fn acquire(list: &'a InfiniteQuery<T>) -> Option<Self> {
        list.cache.begin_next_page(&list.key).then_some(Self {
            list,
            loading_epoch: None,
        })
    }
}

impl<T: Send + Sync + 'static> Drop for NextPageClaim<'_, T> {
    fn drop(&mut self) {
        let InfiniteQuery { cache, key, .. } = self.list;
        if let Some(epoch) = self.loading_epoch {
            log::debug!("[pagination] {key} next page abandoned");
            cache.update_data::<PageSet<T>>(key, |set| {
                (set.epoch == epoch && set.is_fetching_next_page())
                    .then(|| set.with_status(NextPageStatus::Idle))
            });
        }
        cache.end_next_page(key);
    }
}

impl<T: Clone + Send + Sync + 'static> InfiniteQuery<T> {
    /// Every item loaded so far.
    pub fn items(&self) -> Vec<T> {
        self.pages().map(|set| set.to_vec()).unwrap_or_default()
    }
}
