use std::collections::HashSet;
use std::hash::Hash;
use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::Item;

pub const DEFAULT_PAGE_SIZE: usize = 10;

/// 1-based number of the last page requested by the reader
///
/// Only moves forward. Callers decide when to stop offering more pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageCursor(u32);

impl Default for PageCursor {
    fn default() -> Self {
        Self::FIRST
    }
}

impl PageCursor {
    pub const FIRST: Self = Self(1);

    pub fn number(self) -> u32 {
        self.0
    }

    #[must_use]
    pub fn advance(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Index range of this page in an id list of `len` elements
    pub fn window(self, page_size: usize, len: usize) -> Range<usize> {
        page_window(self.0, page_size, len)
    }
}

/// Index range `[(page-1)*page_size, page*page_size)` clamped to `len`
///
/// Pages are 1-based; page `0` and pages past the end are empty.
pub fn page_window(page: u32, page_size: usize, len: usize) -> Range<usize> {
    let Some(index) = usize::try_from(page).ok().and_then(|p| p.checked_sub(1)) else {
        return len..len;
    };

    let start = index.saturating_mul(page_size).min(len);
    let end = start.saturating_add(page_size).min(len);

    start..end
}

/// Append to `existing` every element of `incoming` whose key is not already
/// present, keeping the order of both
///
/// Duplicates within `incoming` keep their first occurrence. Returns the
/// number of elements appended.
pub fn append_unique_by_key<T, K>(
    existing: &mut Vec<T>,
    incoming: impl IntoIterator<Item = T>,
    key: impl Fn(&T) -> K,
) -> usize
where
    K: Eq + Hash,
{
    let mut seen: HashSet<K> = existing.iter().map(&key).collect();
    let len_before = existing.len();

    existing.extend(incoming.into_iter().filter(|v| seen.insert(key(v))));

    existing.len() - len_before
}

/// Merge a freshly fetched page into the accumulated feed, skipping items
/// already shown
pub fn append_page(existing: &mut Vec<Item>, incoming: impl IntoIterator<Item = Item>) -> usize {
    append_unique_by_key(existing, incoming, |item| item.id)
}
