use std::{fmt, str};

use serde::{Deserialize, Serialize};
use snafu::Snafu;

use crate::ItemId;

pub const VOTE_KEY_PREFIX: &str = "vote-";

/// Storage key under which the vote for `item_id` is persisted
pub fn vote_key(item_id: ItemId) -> String {
    format!("{VOTE_KEY_PREFIX}{item_id}")
}

/// Local vote state of an item
///
/// There is no down-vote. `None` is never persisted: absence of a stored
/// record means `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteDirection {
    #[default]
    None,
    Up,
}

impl VoteDirection {
    /// Tag stored for this direction, if any
    pub fn tag(self) -> Option<&'static str> {
        match self {
            VoteDirection::None => None,
            VoteDirection::Up => Some("up"),
        }
    }

    pub fn from_tag(tag: &str) -> Result<Self, UnknownVoteTagError> {
        match tag {
            "up" => Ok(VoteDirection::Up),
            _ => UnknownVoteTagSnafu { tag }.fail(),
        }
    }

    pub fn is_up(self) -> bool {
        self == VoteDirection::Up
    }

    /// Score to display for an item whose upstream score is `initial_score`
    pub fn display_score(self, initial_score: u32) -> u32 {
        match self {
            VoteDirection::None => initial_score,
            VoteDirection::Up => initial_score.saturating_add(1),
        }
    }
}

impl fmt::Display for VoteDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag().unwrap_or("none"))
    }
}

impl str::FromStr for VoteDirection {
    type Err = UnknownVoteTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(VoteDirection::None),
            other => Self::from_tag(other),
        }
    }
}

#[derive(Debug, Snafu)]
#[snafu(display("Unknown vote tag: {tag}"))]
pub struct UnknownVoteTagError {
    tag: String,
}
