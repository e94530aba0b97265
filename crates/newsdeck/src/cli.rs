use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use newsdeck_client::{FeedConfig, JoinPolicy};
use newsdeck_core::{DEFAULT_PAGE_SIZE, ItemId, StoryList};
use url::Url;

/// Command line options for the newsdeck reader
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Opts {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub cmd: OptsCmd,
}

/// Options shared by all commands
#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Directory holding the vote database
    #[arg(env = "NEWSDECK_DATA_DIR", long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Root of the Hacker News API
    #[arg(env = "NEWSDECK_API_URL", long, global = true)]
    pub api_url: Option<Url>,

    /// Timeout of a single upstream request, in seconds
    #[arg(env = "NEWSDECK_TIMEOUT_SECS", long, default_value_t = 10, global = true)]
    pub timeout_secs: u64,

    /// Items per page
    #[arg(env = "NEWSDECK_PAGE_SIZE", long, default_value_t = DEFAULT_PAGE_SIZE, global = true)]
    pub page_size: usize,

    /// Max item requests in flight; defaults to the page size
    #[arg(env = "NEWSDECK_CONCURRENCY", long, global = true)]
    pub concurrency: Option<usize>,

    /// Show the items that loaded even if some of a page failed
    #[arg(env = "NEWSDECK_PARTIAL", long, global = true)]
    pub partial: bool,
}

static PROJECTS_DIR: LazyLock<directories::ProjectDirs> = LazyLock::new(|| {
    directories::ProjectDirs::from("org", "Newsdeck", "newsdeck")
        .expect("Unable to determine project's dir")
});

impl GlobalOpts {
    pub fn data_dir(&self) -> &Path {
        self.data_dir.as_deref().unwrap_or_else(|| {
            PROJECTS_DIR
                .state_dir()
                .unwrap_or_else(|| PROJECTS_DIR.data_local_dir())
        })
    }

    pub fn feed_config(&self) -> FeedConfig {
        let page_size = self.page_size.max(1);
        FeedConfig {
            page_size,
            concurrency: self.concurrency.unwrap_or(page_size).max(1),
            request_timeout: Duration::from_secs(self.timeout_secs),
            join_policy: if self.partial {
                JoinPolicy::Partial
            } else {
                JoinPolicy::AllOrNothing
            },
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum OptsCmd {
    /// Show the first pages of a story list
    Feed {
        /// top, new, best, ask, show or job
        #[arg(long, default_value_t = StoryList::Top)]
        list: StoryList,

        /// Number of pages to load
        #[arg(long, default_value_t = 1)]
        pages: u32,

        /// Print items as JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Toggle the up-vote of an item
    Vote {
        item_id: ItemId,

        /// Upstream score of the item; fetched when not given
        #[arg(long)]
        score: Option<u32>,
    },

    /// List up-voted items
    Votes,

    /// Development and debugging commands
    #[command(subcommand)]
    Dev(DevCmd),
}

#[derive(Debug, Subcommand)]
pub enum DevCmd {
    /// Fetch a single item and dump it
    Item { item_id: ItemId },
}
