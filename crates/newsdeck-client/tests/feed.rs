use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use newsdeck_client::source::{MissingSnafu, SourceResult, StatusSnafu, decode_item};
use newsdeck_client::{
    FeedAccumulator, FeedConfig, FeedState, ItemSource, JoinPolicy, PageLoadError, SourceError,
    fetch_page,
};
use newsdeck_core::{Item, ItemId, PageCursor, StoryList, Timestamp};
use tokio::sync::Mutex;

/// In-memory upstream with switchable failures
#[derive(Default)]
struct MockSource {
    ids: Mutex<Option<Vec<ItemId>>>,
    items: Mutex<HashMap<ItemId, Item>>,
    /// Items that never answer in time
    slow: Mutex<HashSet<ItemId>>,
    id_list_calls: Mutex<usize>,
}

impl MockSource {
    fn with_items(ids: impl IntoIterator<Item = u64>) -> Self {
        let ids: Vec<_> = ids.into_iter().map(ItemId).collect();
        let items = ids.iter().map(|id| (*id, make_item(id.0))).collect();
        Self {
            ids: Mutex::new(Some(ids)),
            items: Mutex::new(items),
            ..Default::default()
        }
    }

    async fn set_ids(&self, ids: Option<Vec<u64>>) {
        *self.ids.lock().await = ids.map(|ids| ids.into_iter().map(ItemId).collect());
    }

    async fn remove_item(&self, id: u64) -> Option<Item> {
        self.items.lock().await.remove(&ItemId(id))
    }

    async fn restore_item(&self, item: Item) {
        self.items.lock().await.insert(item.id, item);
    }

    async fn kill_item(&self, id: u64) {
        if let Some(item) = self.items.lock().await.get_mut(&ItemId(id)) {
            item.dead = true;
        }
    }
}

/// Upstream answering with raw JSON bodies, decoded like the HTTP source does
struct JsonBodySource {
    ids: Vec<ItemId>,
    bodies: HashMap<ItemId, String>,
}

#[async_trait]
impl ItemSource for JsonBodySource {
    async fn fetch_id_list(&self, _list: StoryList) -> SourceResult<Vec<ItemId>> {
        Ok(self.ids.clone())
    }

    async fn fetch_item(&self, item_id: ItemId) -> SourceResult<Item> {
        let body = self.bodies.get(&item_id).map_or("null", String::as_str);
        decode_item(body.as_bytes())
    }
}

#[async_trait]
impl ItemSource for MockSource {
    async fn fetch_id_list(&self, _list: StoryList) -> SourceResult<Vec<ItemId>> {
        *self.id_list_calls.lock().await += 1;
        match self.ids.lock().await.clone() {
            Some(ids) => Ok(ids),
            None => StatusSnafu {
                status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
            }
            .fail(),
        }
    }

    async fn fetch_item(&self, item_id: ItemId) -> SourceResult<Item> {
        if self.slow.lock().await.contains(&item_id) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        match self.items.lock().await.get(&item_id) {
            Some(item) => Ok(item.clone()),
            None => MissingSnafu.fail(),
        }
    }
}

fn make_item(id: u64) -> Item {
    Item {
        id: ItemId(id),
        title: format!("Story {id}"),
        url: Some(format!("https://example.com/{id}")),
        score: 100,
        author: "test-author".to_string(),
        created_at: Timestamp(1_700_000_000),
        comment_count: 3,
        kind: Some("story".to_string()),
        text: None,
        deleted: false,
        dead: false,
    }
}

fn ids_of(items: &[Item]) -> Vec<u64> {
    items.iter().map(|i| i.id.0).collect()
}

fn accumulator(source: Arc<MockSource>, config: FeedConfig) -> FeedAccumulator {
    FeedAccumulator::builder(source).config(config).build()
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn pages_follow_id_list_windows() {
    let source = Arc::new(MockSource::with_items(1..=25));
    let ids: Vec<_> = (1..=25).map(ItemId).collect();
    let config = FeedConfig::default();

    let first = fetch_page(source.as_ref(), &ids, PageCursor::FIRST, &config)
        .await
        .expect("page 1");
    let third = fetch_page(
        source.as_ref(),
        &ids,
        PageCursor::FIRST.advance().advance(),
        &config,
    )
    .await
    .expect("page 3");
    let fourth = fetch_page(
        source.as_ref(),
        &ids,
        PageCursor::FIRST.advance().advance().advance(),
        &config,
    )
    .await
    .expect("page 4");

    assert_eq!(ids_of(&first.items), (1..=10).collect::<Vec<_>>());
    assert_eq!(ids_of(&third.items), (21..=25).collect::<Vec<_>>());
    assert!(fourth.items.is_empty());
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn concurrency_of_one_keeps_order() {
    let source = Arc::new(MockSource::with_items([5, 3, 9, 1]));
    let ids = [ItemId(5), ItemId(3), ItemId(9), ItemId(1)];
    let config = FeedConfig {
        concurrency: 1,
        ..FeedConfig::default()
    };

    let page = fetch_page(source.as_ref(), &ids, PageCursor::FIRST, &config)
        .await
        .expect("page");

    assert_eq!(ids_of(&page.items), vec![5, 3, 9, 1]);
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn accumulates_pages_without_duplicates() {
    let source = Arc::new(MockSource::with_items(1..=30));
    let mut feed = accumulator(source.clone(), FeedConfig::default());

    let load = feed.load_page().await.expect("page 1");
    assert_eq!(load.added, 10);
    assert_eq!(feed.state(), FeedState::PageReady(PageCursor::FIRST));

    feed.load_more().await.expect("page 2");

    assert_eq!(ids_of(feed.items()), (1..=20).collect::<Vec<_>>());
    assert!(feed.has_more());

    feed.load_more().await.expect("page 3");
    assert_eq!(feed.items().len(), 30);
    assert!(!feed.has_more());
    assert_eq!(*source.id_list_calls.lock().await, 1);
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn overlapping_id_list_is_deduplicated() {
    let source = Arc::new(MockSource::with_items(1..=15));
    source
        .set_ids(Some(vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 9, 10, 11, 1, 12]))
        .await;
    let mut feed = accumulator(source, FeedConfig::default());

    feed.load_page().await.expect("page 1");
    let load = feed.load_more().await.expect("page 2");

    assert_eq!(load.added, 2);
    let ids = ids_of(feed.items());
    let unique: HashSet<_> = ids.iter().collect();
    assert_eq!(unique.len(), ids.len());
    assert_eq!(ids, (1..=12).collect::<Vec<_>>());
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn id_list_failure_enters_error_and_retry_recovers() {
    let source = Arc::new(MockSource::with_items(1..=12));
    source.set_ids(None).await;
    let mut feed = accumulator(source.clone(), FeedConfig::default());
    let state_rx = feed.state_subscribe();

    let err = feed.load_page().await.expect_err("id list is down");
    assert!(matches!(err, PageLoadError::IdList { .. }));
    assert_eq!(feed.state(), FeedState::Error);
    assert_eq!(*state_rx.borrow(), FeedState::Error);
    assert!(feed.items().is_empty());
    assert!(!feed.has_more());

    source.set_ids(Some((1..=12).collect())).await;
    feed.retry().await.expect("retry succeeds");

    assert_eq!(feed.state(), FeedState::PageReady(PageCursor::FIRST));
    assert_eq!(feed.items().len(), 10);
    assert_eq!(*source.id_list_calls.lock().await, 2);
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn failed_page_keeps_items_and_can_be_retried() {
    let source = Arc::new(MockSource::with_items(1..=20));
    let mut feed = accumulator(source.clone(), FeedConfig::default());
    feed.load_page().await.expect("page 1");

    let missing = source.remove_item(15).await.expect("item exists");
    let err = feed.load_more().await.expect_err("item 15 is missing");

    match err {
        PageLoadError::Item { source: err } => {
            assert_eq!(err.item_id, ItemId(15));
            assert!(matches!(err.source, SourceError::Missing));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(feed.state(), FeedState::PageFailed(PageCursor::FIRST.advance()));
    assert_eq!(feed.cursor().number(), 2);
    assert_eq!(feed.items().len(), 10);

    source.restore_item(missing).await;
    let load = feed.retry().await.expect("retry succeeds");

    assert_eq!(load.cursor.number(), 2);
    assert_eq!(ids_of(feed.items()), (1..=20).collect::<Vec<_>>());
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn cursor_advances_regardless_of_outcome() {
    let source = Arc::new(MockSource::with_items(1..=10));
    let mut feed = accumulator(source.clone(), FeedConfig::default());
    source.set_ids(None).await;

    for _ in 0..3 {
        let _ = feed.load_more().await;
    }
    for _ in 0..2 {
        feed.advance_page();
    }

    assert_eq!(feed.cursor().number(), 6);
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn partial_policy_keeps_successful_items() {
    let source = Arc::new(MockSource::with_items(1..=10));
    source.remove_item(4).await;
    source.remove_item(7).await;
    let mut feed = accumulator(
        source,
        FeedConfig {
            join_policy: JoinPolicy::Partial,
            ..FeedConfig::default()
        },
    );

    let load = feed.load_page().await.expect("partial page");

    assert_eq!(ids_of(feed.items()), vec![1, 2, 3, 5, 6, 8, 9, 10]);
    let failed: Vec<_> = load.failed.iter().map(|err| err.item_id).collect();
    assert_eq!(failed, vec![ItemId(4), ItemId(7)]);
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn slow_item_times_out() {
    let source = Arc::new(MockSource::with_items(1..=3));
    source.slow.lock().await.insert(ItemId(2));
    let mut feed = accumulator(
        source,
        FeedConfig {
            request_timeout: Duration::from_millis(50),
            ..FeedConfig::default()
        },
    );

    let err = feed.load_page().await.expect_err("item 2 hangs");

    match err {
        PageLoadError::Item { source: err } => {
            assert_eq!(err.item_id, ItemId(2));
            assert!(matches!(err.source, SourceError::Timeout { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn reset_switches_list_and_starts_over() {
    let source = Arc::new(MockSource::with_items(1..=20));
    let mut feed = accumulator(source.clone(), FeedConfig::default());
    feed.load_page().await.expect("page 1");
    feed.load_more().await.expect("page 2");

    feed.reset(StoryList::Best);

    assert_eq!(feed.list(), StoryList::Best);
    assert_eq!(feed.state(), FeedState::Idle);
    assert_eq!(feed.cursor(), PageCursor::FIRST);
    assert!(feed.items().is_empty());
    assert!(feed.ids().is_none());

    feed.load_page().await.expect("page 1 again");
    assert_eq!(feed.items().len(), 10);
    assert_eq!(*source.id_list_calls.lock().await, 2);
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn removed_items_are_skipped_without_failing_the_page() {
    let source = Arc::new(MockSource::with_items(1..=12));
    source.kill_item(4).await;
    let mut feed = accumulator(source.clone(), FeedConfig::default());

    let load = feed.load_page().await.expect("dead item does not fail the page");

    assert!(load.failed.is_empty());
    assert_eq!(load.added, 9);
    assert_eq!(ids_of(feed.items()), vec![1, 2, 3, 5, 6, 7, 8, 9, 10]);
    assert_eq!(feed.state(), FeedState::PageReady(PageCursor::FIRST));

    for _ in 0..2 {
        let load = feed.retry().await.expect("retry succeeds");
        assert_eq!(load.added, 0);
    }
    feed.load_more().await.expect("page 2");
    assert_eq!(feed.items().len(), 11);
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn dead_and_deleted_bodies_are_skipped() {
    let ids: Vec<_> = (1..=5).map(ItemId).collect();
    let mut bodies: HashMap<_, _> = ids
        .iter()
        .map(|id| (*id, format!(r#"{{"id":{id},"title":"Story {id}","score":1}}"#)))
        .collect();
    bodies.insert(ItemId(2), r#"{"id":2,"title":"Gone","dead":true}"#.to_string());
    bodies.insert(ItemId(4), r#"{"id":4,"deleted":true}"#.to_string());
    let mut feed = FeedAccumulator::builder(Arc::new(JsonBodySource { ids, bodies })).build();

    feed.load_page().await.expect("page loads");
    feed.retry().await.expect("retry loads");

    assert_eq!(ids_of(feed.items()), vec![1, 3, 5]);
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn null_body_still_fails_the_page() {
    let ids: Vec<_> = (1..=2).map(ItemId).collect();
    let bodies = HashMap::from([(ItemId(1), r#"{"id":1,"title":"Here"}"#.to_string())]);
    let mut feed = FeedAccumulator::builder(Arc::new(JsonBodySource { ids, bodies })).build();

    let err = feed.load_page().await.expect_err("item 2 is null");

    match err {
        PageLoadError::Item { source: err } => {
            assert_eq!(err.item_id, ItemId(2));
            assert!(matches!(err.source, SourceError::Missing));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn zero_page_size_is_treated_as_one() {
    let source = Arc::new(MockSource::with_items(1..=3));
    let mut feed = accumulator(
        source,
        FeedConfig {
            page_size: 0,
            ..FeedConfig::default()
        },
    );

    assert_eq!(feed.config().page_size, 1);

    feed.load_page().await.expect("page 1");
    assert_eq!(feed.items().len(), 1);
    assert!(feed.has_more());

    feed.load_more().await.expect("page 2");
    feed.load_more().await.expect("page 3");

    assert_eq!(ids_of(feed.items()), vec![1, 2, 3]);
    assert!(!feed.has_more());
}
