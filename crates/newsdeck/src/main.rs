mod cli;

use std::io;
use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use cli::{GlobalOpts, Opts};
use newsdeck_client::{
    FeedAccumulator, HnApiSource, ItemSource, PageLoadError, SourceError, VoteStore, with_timeout,
};
use newsdeck_core::{Item, ItemId, Timestamp};
use newsdeck_db::{Database, DbError};
use newsdeck_util_error::{FmtCompact as _, WhateverResult};
use newsdeck_util_fmt::{AsFmtOption as _, format_age};
use snafu::{FromString as _, ResultExt as _, Snafu, Whatever};
use tracing::level_filters::LevelFilter;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

pub const LOG_TARGET: &str = "newsdeck::cli";

#[derive(Debug, Snafu)]
pub enum CliError {
    #[snafu(display("Upstream error: {source}"))]
    Source { source: SourceError },
    #[snafu(display("Feed error: {source}"))]
    Feed { source: PageLoadError },
    #[snafu(display("Miscellaneous error: {source}"))]
    Whatever { source: Whatever },
    #[snafu(display("Data dir error: {source:?}"))]
    DataDir { source: io::Error },
    #[snafu(display("Database error: {source}"))]
    Database { source: DbError },
}

pub type CliResult<T> = std::result::Result<T, CliError>;

#[snafu::report]
#[tokio::main]
async fn main() -> CliResult<()> {
    init_logging().context(WhateverSnafu)?;

    let opts = Opts::parse();
    let v = handle_cmd(opts).await?;
    if !v.is_null() {
        println!("{}", serde_json::to_string_pretty(&v).expect("Can't fail"));
    }
    Ok(())
}

async fn handle_cmd(opts: Opts) -> CliResult<serde_json::Value> {
    let global = opts.global;

    Ok(match opts.cmd {
        cli::OptsCmd::Feed { list, pages, json } => {
            let source = make_source(&global)?;
            let votes = open_vote_store(&global).await;

            let mut feed = FeedAccumulator::builder(source)
                .list(list)
                .config(global.feed_config())
                .build();

            feed.load_page().await.context(FeedSnafu)?;
            for _ in 1..pages {
                if !feed.has_more() {
                    break;
                }
                feed.load_more().await.context(FeedSnafu)?;
            }

            let now = Timestamp::now();
            let mut cards = vec![];
            for (rank, item) in feed.items().iter().enumerate() {
                let vote = votes.get_vote(item.id, None).await;
                let card = ItemCard {
                    rank: rank + 1,
                    item,
                    score: vote.display_score(item.score),
                    voted: vote.is_up(),
                    now,
                };
                if json {
                    cards.push(card.to_json());
                } else {
                    card.print();
                }
            }

            if json {
                serde_json::Value::Array(cards)
            } else {
                serde_json::Value::Null
            }
        }
        cli::OptsCmd::Vote { item_id, score } => {
            let initial_score = match score {
                Some(score) => score,
                None => fetch_item(&global, item_id).await?.score,
            };

            let votes = open_vote_store(&global).await;
            let mut notifications = votes.notifications_subscribe();

            let outcome = votes.toggle_vote(item_id, initial_score).await;

            if let Ok(notification) = notifications.try_recv() {
                info!(target: LOG_TARGET, %item_id, %notification, "Vote toggled");
            }
            if votes.is_degraded() {
                warn!(target: LOG_TARGET, %item_id, "Vote was not saved");
            }

            serde_json::to_value(outcome).expect("Can't fail")
        }
        cli::OptsCmd::Votes => {
            let votes = open_vote_store(&global).await;

            serde_json::to_value(votes.votes().await).expect("Can't fail")
        }
        cli::OptsCmd::Dev(cmd) => match cmd {
            cli::DevCmd::Item { item_id } => {
                let item = fetch_item(&global, item_id).await?;

                serde_json::to_value(item).expect("Can't fail")
            }
        },
    })
}

fn make_source(global: &GlobalOpts) -> CliResult<Arc<dyn ItemSource>> {
    let source = HnApiSource::builder()
        .maybe_base_url(global.api_url.clone())
        .build()
        .context(SourceSnafu)?;
    Ok(Arc::new(source))
}

async fn fetch_item(global: &GlobalOpts, item_id: ItemId) -> CliResult<Item> {
    let source = make_source(global)?;
    with_timeout(
        global.feed_config().request_timeout,
        source.fetch_item(item_id),
    )
    .await
    .context(SourceSnafu)
}

async fn open_db(data_dir: &Path) -> CliResult<Database> {
    let path = Database::mk_db_path(data_dir)
        .await
        .context(DataDirSnafu)?;
    Database::open(path).await.context(DatabaseSnafu)
}

/// Votes backed by the database in the data dir, or kept in memory if it
/// can't be opened
async fn open_vote_store(global: &GlobalOpts) -> VoteStore {
    let data_dir = global.data_dir();
    match open_db(data_dir).await {
        Ok(db) => VoteStore::new(Arc::new(db)),
        Err(err) => {
            warn!(
                target: LOG_TARGET,
                data_dir = %data_dir.display(),
                err = %err.fmt_compact(),
                "Could not open vote database, votes will not be saved"
            );
            VoteStore::in_memory()
        }
    }
}

struct ItemCard<'i> {
    rank: usize,
    item: &'i Item,
    score: u32,
    voted: bool,
    now: Timestamp,
}

impl ItemCard<'_> {
    fn age(&self) -> String {
        format_age(self.item.created_at.into(), self.now.into())
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "rank": self.rank,
            "id": self.item.id,
            "title": self.item.title,
            "link": self.item.link(),
            "domain": self.item.domain(),
            "score": self.score,
            "voted": self.voted,
            "author": self.item.author,
            "age": self.age(),
            "comments": self.item.comment_count,
            "discussion": self.item.discussion_url(),
        })
    }

    fn print(&self) {
        let marker = if self.voted { "▲" } else { " " };
        let domain = self.item.domain();
        println!(
            "{:>3}. {marker} {} ({})",
            self.rank,
            self.item.title,
            domain.fmt_option()
        );
        println!(
            "       {} points by {} {} | {} comments | {}",
            self.score,
            self.item.author,
            self.age(),
            self.item.comment_count,
            self.item.link()
        );
    }
}

pub fn init_logging() -> WhateverResult<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .try_init()
        .map_err(|_| Whatever::without_source("Failed to initialize logging".to_string()))?;

    Ok(())
}
