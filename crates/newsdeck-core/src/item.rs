use std::{fmt, str};

use serde::{Deserialize, Serialize};
use snafu::Snafu;

use crate::{ItemId, Timestamp};

pub const HN_ITEM_URL_BASE: &str = "https://news.ycombinator.com/item?id=";

/// A single news entry, as returned by the upstream item endpoint
///
/// Field names on the wire follow the upstream JSON (`by`, `time`,
/// `descendants`, `type`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub score: u32,
    #[serde(rename = "by", default)]
    pub author: String,
    #[serde(rename = "time", default)]
    pub created_at: Timestamp,
    #[serde(rename = "descendants", default)]
    pub comment_count: u32,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub deleted: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub dead: bool,
}

fn is_false(v: &bool) -> bool {
    !*v
}

impl Item {
    /// Upstream marks removed items instead of omitting them
    pub fn is_removed(&self) -> bool {
        self.deleted || self.dead
    }

    pub fn discussion_url(&self) -> String {
        format!("{HN_ITEM_URL_BASE}{}", self.id)
    }

    /// Where the item points to: its external `url`, or the discussion page
    /// for self posts
    pub fn link(&self) -> String {
        self.url.clone().unwrap_or_else(|| self.discussion_url())
    }

    /// Host of the external link, without a leading `www.`
    pub fn domain(&self) -> Option<String> {
        let parsed = url::Url::parse(self.url.as_deref()?).ok()?;
        let host = parsed.host_str()?;
        Some(host.strip_prefix("www.").unwrap_or(host).to_owned())
    }
}

/// Which upstream ranking to read item ids from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoryList {
    #[default]
    Top,
    New,
    Best,
    Ask,
    Show,
    Job,
}

impl StoryList {
    pub const ALL: [StoryList; 6] = [
        StoryList::Top,
        StoryList::New,
        StoryList::Best,
        StoryList::Ask,
        StoryList::Show,
        StoryList::Job,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StoryList::Top => "top",
            StoryList::New => "new",
            StoryList::Best => "best",
            StoryList::Ask => "ask",
            StoryList::Show => "show",
            StoryList::Job => "job",
        }
    }

    /// Path of the id list endpoint, relative to the API root
    pub fn endpoint(self) -> String {
        format!("{}stories.json", self.as_str())
    }
}

impl fmt::Display for StoryList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Snafu)]
#[snafu(display("Unknown story list: {name}"))]
pub struct UnknownStoryListError {
    name: String,
}

impl str::FromStr for StoryList {
    type Err = UnknownStoryListError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StoryList::ALL
            .into_iter()
            .find(|list| list.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownStoryListError { name: s.to_owned() })
    }
}
