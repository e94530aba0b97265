use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt as _, TryStreamExt as _};
use itertools::Itertools as _;
use newsdeck_core::{DEFAULT_PAGE_SIZE, Item, ItemId, PageCursor, StoryList, append_page};
use newsdeck_util_error::FmtCompact as _;
use snafu::{ResultExt as _, Snafu};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::source::{ItemSource, SourceError, SourceResult, TimeoutSnafu};

const LOG_TARGET: &str = "newsdeck::feed";

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// What to do with a page when some of its item lookups fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinPolicy {
    /// Any failed lookup fails the whole page
    #[default]
    AllOrNothing,
    /// Keep the items that loaded, report the ids that didn't
    Partial,
}

#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub page_size: usize,
    /// Max item lookups in flight at once
    pub concurrency: usize,
    /// Applied to every upstream request separately
    pub request_timeout: Duration,
    pub join_policy: JoinPolicy,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            concurrency: DEFAULT_PAGE_SIZE,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            join_policy: JoinPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedState {
    Idle,
    LoadingIds,
    IdsReady,
    LoadingPage(PageCursor),
    PageReady(PageCursor),
    /// Accumulated items are intact, the page can be retried
    PageFailed(PageCursor),
    /// The id list could not be loaded; nothing can be shown until a retry
    Error,
}

#[derive(Debug, Snafu)]
#[snafu(display("Failed to fetch the {list} id list"))]
pub struct IdListFetchError {
    pub list: StoryList,
    pub source: SourceError,
}

#[derive(Debug, Snafu)]
#[snafu(display("Failed to fetch item {item_id}"))]
pub struct ItemFetchError {
    pub item_id: ItemId,
    pub source: SourceError,
}

#[derive(Debug, Snafu)]
pub enum PageLoadError {
    #[snafu(transparent)]
    IdList { source: IdListFetchError },
    #[snafu(transparent)]
    Item { source: ItemFetchError },
}

pub type PageLoadResult<T> = std::result::Result<T, PageLoadError>;

/// Items of one page, in id-list order
#[derive(Debug)]
pub struct FetchedPage {
    pub cursor: PageCursor,
    pub items: Vec<Item>,
    /// Lookups that failed; always empty under [`JoinPolicy::AllOrNothing`]
    pub failed: Vec<ItemFetchError>,
}

/// Outcome of merging a page into the feed
#[derive(Debug)]
pub struct PageLoad {
    pub cursor: PageCursor,
    /// Items actually appended, after de-duplication
    pub added: usize,
    pub failed: Vec<ItemFetchError>,
}

/// Run an upstream request, failing it with [`SourceError::Timeout`] after
/// `timeout`
pub async fn with_timeout<T>(
    timeout: Duration,
    fut: impl Future<Output = SourceResult<T>>,
) -> SourceResult<T> {
    tokio::time::timeout(timeout, fut)
        .await
        .unwrap_or_else(|_elapsed| TimeoutSnafu { timeout }.fail())
}

/// Resolve the ids of page `cursor` to items
///
/// Lookups run concurrently, at most `config.concurrency` at a time, and the
/// result keeps the order of `ids`. Deleted and dead items are dropped from
/// the page; they are not failures.
pub async fn fetch_page(
    source: &dyn ItemSource,
    ids: &[ItemId],
    cursor: PageCursor,
    config: &FeedConfig,
) -> Result<FetchedPage, ItemFetchError> {
    let page_ids = &ids[cursor.window(config.page_size, ids.len())];

    debug!(
        target: LOG_TARGET,
        page = cursor.number(),
        len = page_ids.len(),
        "Fetching page"
    );

    let fetches = stream::iter(page_ids.iter().copied())
        .map(|item_id| async move {
            with_timeout(config.request_timeout, source.fetch_item(item_id))
                .await
                .context(ItemFetchSnafu { item_id })
        })
        .buffered(config.concurrency.max(1));

    let (items, failed): (Vec<Item>, Vec<ItemFetchError>) = match config.join_policy {
        JoinPolicy::AllOrNothing => (fetches.try_collect().await?, vec![]),
        JoinPolicy::Partial => fetches
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .partition_result(),
    };

    let (removed, items): (Vec<Item>, Vec<Item>) = items.into_iter().partition(Item::is_removed);
    for item in &removed {
        debug!(target: LOG_TARGET, item_id = %item.id, "Skipping removed item");
    }

    Ok(FetchedPage {
        cursor,
        items,
        failed,
    })
}

/// Accumulates pages of one story list into a growing, duplicate-free
/// sequence of items
pub struct FeedAccumulator {
    source: Arc<dyn ItemSource>,
    config: FeedConfig,
    list: StoryList,
    /// Fetched once per list and then kept
    ids: Option<Vec<ItemId>>,
    items: Vec<Item>,
    cursor: PageCursor,
    state_tx: watch::Sender<FeedState>,
}

#[bon::bon]
impl FeedAccumulator {
    #[builder]
    pub fn new(
        #[builder(start_fn)] source: Arc<dyn ItemSource>,
        #[builder(default)] list: StoryList,
        #[builder(default)] config: FeedConfig,
    ) -> Self {
        let (state_tx, _) = watch::channel(FeedState::Idle);
        let config = FeedConfig {
            page_size: config.page_size.max(1),
            ..config
        };
        Self {
            source,
            config,
            list,
            ids: None,
            items: vec![],
            cursor: PageCursor::FIRST,
            state_tx,
        }
    }
}

impl FeedAccumulator {
    pub fn list(&self) -> StoryList {
        self.list
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    pub fn state(&self) -> FeedState {
        *self.state_tx.borrow()
    }

    pub fn state_subscribe(&self) -> watch::Receiver<FeedState> {
        self.state_tx.subscribe()
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn cursor(&self) -> PageCursor {
        self.cursor
    }

    pub fn ids(&self) -> Option<&[ItemId]> {
        self.ids.as_deref()
    }

    /// Whether the id list extends past the current page
    ///
    /// `false` until the id list is loaded.
    pub fn has_more(&self) -> bool {
        self.ids.as_ref().is_some_and(|ids| {
            self.cursor.window(self.config.page_size, ids.len()).end < ids.len()
        })
    }

    fn set_state(&self, state: FeedState) {
        self.state_tx.send_replace(state);
    }

    /// Fetch the id list, unless already loaded
    ///
    /// Returns the number of ids.
    pub async fn load_ids(&mut self) -> Result<usize, IdListFetchError> {
        if let Some(ids) = self.ids.as_ref() {
            return Ok(ids.len());
        }

        self.set_state(FeedState::LoadingIds);

        let list = self.list;
        let res = with_timeout(
            self.config.request_timeout,
            self.source.fetch_id_list(list),
        )
        .await
        .context(IdListFetchSnafu { list });

        match res {
            Ok(ids) => {
                info!(target: LOG_TARGET, %list, len = ids.len(), "Id list loaded");
                let len = ids.len();
                self.ids = Some(ids);
                self.set_state(FeedState::IdsReady);
                Ok(len)
            }
            Err(err) => {
                warn!(target: LOG_TARGET, %list, err = %err.fmt_compact(), "Failed to load id list");
                self.set_state(FeedState::Error);
                Err(err)
            }
        }
    }

    /// Load the page at the current cursor and append its new items
    ///
    /// Loads the id list first if needed. A failed page leaves accumulated
    /// items and the cursor as they were.
    pub async fn load_page(&mut self) -> PageLoadResult<PageLoad> {
        self.load_ids().await?;

        let cursor = self.cursor;
        self.set_state(FeedState::LoadingPage(cursor));

        let ids = self.ids.as_deref().unwrap_or_default();
        let res = fetch_page(self.source.as_ref(), ids, cursor, &self.config).await;

        match res {
            Ok(page) => {
                for err in &page.failed {
                    warn!(
                        target: LOG_TARGET,
                        item_id = %err.item_id,
                        err = %err.fmt_compact(),
                        "Skipping item"
                    );
                }
                let added = append_page(&mut self.items, page.items);
                debug!(
                    target: LOG_TARGET,
                    page = cursor.number(),
                    added,
                    total = self.items.len(),
                    "Page appended"
                );
                self.set_state(FeedState::PageReady(cursor));
                Ok(PageLoad {
                    cursor,
                    added,
                    failed: page.failed,
                })
            }
            Err(err) => {
                warn!(
                    target: LOG_TARGET,
                    page = cursor.number(),
                    err = %err.fmt_compact(),
                    "Failed to load page"
                );
                self.set_state(FeedState::PageFailed(cursor));
                Err(err.into())
            }
        }
    }

    pub fn advance_page(&mut self) -> PageCursor {
        self.cursor = self.cursor.advance();
        self.cursor
    }

    /// Move to the next page and load it
    ///
    /// The cursor moves even if the load fails; [`Self::retry`] reloads it.
    pub async fn load_more(&mut self) -> PageLoadResult<PageLoad> {
        self.advance_page();
        self.load_page().await
    }

    /// Re-attempt whatever failed last: the id list, the current page, or both
    pub async fn retry(&mut self) -> PageLoadResult<PageLoad> {
        debug!(target: LOG_TARGET, state = ?self.state(), "Retrying");
        self.load_page().await
    }

    /// Switch to another story list, starting over from page one
    pub fn reset(&mut self, list: StoryList) {
        self.list = list;
        self.ids = None;
        self.items.clear();
        self.cursor = PageCursor::FIRST;
        self.set_state(FeedState::Idle);
    }
}
