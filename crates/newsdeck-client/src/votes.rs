use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use newsdeck_core::{ItemId, VOTE_KEY_PREFIX, VoteDirection, vote_key};
use newsdeck_util_error::FmtCompact as _;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::kv::{KvStore, MemKvStore, PersistenceError};

const LOG_TARGET: &str = "newsdeck::votes";

const NOTIFICATIONS_CAPACITY: usize = 16;

/// Transient message for the user after a vote changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteNotification {
    Upvoted { item_id: ItemId },
    Removed { item_id: ItemId },
}

impl VoteNotification {
    pub fn item_id(self) -> ItemId {
        match self {
            VoteNotification::Upvoted { item_id } | VoteNotification::Removed { item_id } => {
                item_id
            }
        }
    }
}

impl fmt::Display for VoteNotification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            VoteNotification::Upvoted { .. } => "Upvoted!",
            VoteNotification::Removed { .. } => "Vote removed",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VoteOutcome {
    pub item_id: ItemId,
    pub direction: VoteDirection,
    pub display_score: u32,
}

/// Direction of a stored vote record
///
/// Only `"up"` is ever written, but any non-empty value counts as a vote. An
/// empty value is treated as no record.
fn stored_direction(tag: &str) -> Option<VoteDirection> {
    (!tag.is_empty()).then_some(VoteDirection::Up)
}

/// Local up-vote toggles, persisted in a [`KvStore`]
///
/// Storage errors never reach the caller. The first one switches the store
/// to session-only mode: votes keep working, but are no longer read from or
/// written to storage.
///
/// Meant for a single caller. A toggle reads and then writes the vote
/// without holding a lock in between, so concurrent toggles of the same item
/// can race.
pub struct VoteStore {
    kv: Arc<dyn KvStore>,
    /// Every vote changed during this session, including removals
    overlay: Mutex<HashMap<ItemId, VoteDirection>>,
    degraded: AtomicBool,
    notifications_tx: broadcast::Sender<VoteNotification>,
}

impl VoteStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        let (notifications_tx, _) = broadcast::channel(NOTIFICATIONS_CAPACITY);
        Self {
            kv,
            overlay: Mutex::new(HashMap::new()),
            degraded: AtomicBool::new(false),
            notifications_tx,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemKvStore::new()))
    }

    /// Whether a storage failure made this store session-only
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    pub fn notifications_subscribe(&self) -> broadcast::Receiver<VoteNotification> {
        self.notifications_tx.subscribe()
    }

    fn mark_degraded(&self, op: &'static str, err: &PersistenceError) {
        if !self.degraded.swap(true, Ordering::SeqCst) {
            warn!(
                target: LOG_TARGET,
                op,
                err = %err.fmt_compact(),
                "Vote storage failed, keeping votes in memory for this session"
            );
        }
    }

    fn overlay_get(&self, item_id: ItemId) -> Option<VoteDirection> {
        self.overlay
            .lock()
            .expect("Locking failed")
            .get(&item_id)
            .copied()
    }

    /// Current vote of `item_id`
    ///
    /// `initial_vote` is used only when nothing was ever stored for the item.
    pub async fn get_vote(
        &self,
        item_id: ItemId,
        initial_vote: Option<VoteDirection>,
    ) -> VoteDirection {
        if let Some(direction) = self.overlay_get(item_id) {
            return direction;
        }

        let fallback = initial_vote.unwrap_or_default();
        if self.is_degraded() {
            return fallback;
        }

        match self.kv.get(&vote_key(item_id)).await {
            Ok(Some(tag)) => stored_direction(&tag).unwrap_or(fallback),
            Ok(None) => fallback,
            Err(err) => {
                self.mark_degraded("get", &err);
                fallback
            }
        }
    }

    pub async fn display_score(
        &self,
        item_id: ItemId,
        initial_score: u32,
        initial_vote: Option<VoteDirection>,
    ) -> u32 {
        self.get_vote(item_id, initial_vote)
            .await
            .display_score(initial_score)
    }

    /// Flip the vote of `item_id` between none and up
    pub async fn toggle_vote(&self, item_id: ItemId, initial_score: u32) -> VoteOutcome {
        self.toggle_vote_with_initial(item_id, initial_score, None)
            .await
    }

    /// Like [`Self::toggle_vote`], for items that came with a vote of their
    /// own
    pub async fn toggle_vote_with_initial(
        &self,
        item_id: ItemId,
        initial_score: u32,
        initial_vote: Option<VoteDirection>,
    ) -> VoteOutcome {
        let direction = match self.get_vote(item_id, initial_vote).await {
            VoteDirection::Up => VoteDirection::None,
            VoteDirection::None => VoteDirection::Up,
        };

        self.overlay
            .lock()
            .expect("Locking failed")
            .insert(item_id, direction);
        self.persist(item_id, direction).await;

        debug!(target: LOG_TARGET, %item_id, %direction, "Vote toggled");

        let notification = match direction {
            VoteDirection::Up => VoteNotification::Upvoted { item_id },
            VoteDirection::None => VoteNotification::Removed { item_id },
        };
        // No subscribers is fine
        let _ = self.notifications_tx.send(notification);

        VoteOutcome {
            item_id,
            direction,
            display_score: direction.display_score(initial_score),
        }
    }

    async fn persist(&self, item_id: ItemId, direction: VoteDirection) {
        if self.is_degraded() {
            return;
        }

        let key = vote_key(item_id);
        let res = match direction.tag() {
            Some(tag) => self.kv.set(&key, tag).await,
            None => self.kv.delete(&key).await,
        };

        if let Err(err) = res {
            self.mark_degraded("persist", &err);
        }
    }

    /// Items currently up-voted, in id order
    pub async fn votes(&self) -> Vec<ItemId> {
        let mut up: BTreeSet<ItemId> = BTreeSet::new();

        if !self.is_degraded() {
            match self.kv.entries_with_prefix(VOTE_KEY_PREFIX).await {
                Ok(entries) => {
                    up.extend(entries.into_iter().filter_map(|(key, tag)| {
                        let item_id = key.strip_prefix(VOTE_KEY_PREFIX)?.parse::<ItemId>().ok()?;
                        stored_direction(&tag).map(|_| item_id)
                    }));
                }
                Err(err) => self.mark_degraded("list", &err),
            }
        }

        for (item_id, direction) in self.overlay.lock().expect("Locking failed").iter() {
            if direction.is_up() {
                up.insert(*item_id);
            } else {
                up.remove(item_id);
            }
        }

        up.into_iter().collect()
    }
}
