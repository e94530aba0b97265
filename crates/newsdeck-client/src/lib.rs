//! Hacker News reading client: upstream source, paginated feed and local
//! votes

pub mod feed;
pub mod kv;
pub mod source;
pub mod votes;

pub use self::feed::{
    FeedAccumulator, FeedConfig, FeedState, FetchedPage, IdListFetchError, ItemFetchError,
    JoinPolicy, PageLoad, PageLoadError, PageLoadResult, fetch_page, with_timeout,
};
pub use self::kv::{KvStore, MemKvStore, PersistenceError, PersistenceResult};
pub use self::source::{HnApiSource, ItemSource, SourceError, SourceResult};
pub use self::votes::{VoteNotification, VoteOutcome, VoteStore};
