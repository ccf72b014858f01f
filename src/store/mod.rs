pub mod http;
pub mod memory;
pub mod retry;
pub mod sqlite;
pub mod types;

pub use http::HttpStore;
pub use memory::MemoryStore;
pub use retry::{with_retry, RetryPolicy};
pub use sqlite::SqliteStore;
pub use types::{LeaderboardEntry, PresenceEntry, UpsertOutcome};

use crate::error::SyncError;
use async_trait::async_trait;
use tokio::sync::watch;

/// Backing store for scores and presence records.
///
/// Leaderboard and presence clients only ever see this trait. Stores that can
/// push changes return a revision channel from `subscribe`; the others are
/// polled.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    fn name(&self) -> &'static str;

    /// Highest scores first, ties by earlier timestamp. At most `limit` rows.
    async fn get_top(&self, limit: usize) -> Result<Vec<LeaderboardEntry>, SyncError>;

    /// Stores `entry` when no record exists for its player id or when its
    /// score is strictly higher than the stored one.
    async fn upsert_if_better(&self, entry: LeaderboardEntry) -> Result<UpsertOutcome, SyncError>;

    async fn list_presence(&self) -> Result<Vec<PresenceEntry>, SyncError>;

    async fn set_presence(&self, entry: PresenceEntry) -> Result<(), SyncError>;

    async fn remove_presence(&self, player_id: &str) -> Result<(), SyncError>;

    /// Asks the store to drop the presence record when the connection goes
    /// away. Returns `false` when the backend has no such hook, in which case
    /// the staleness sweep is the only cleanup.
    async fn on_disconnect_cleanup(&self, _player_id: &str) -> Result<bool, SyncError> {
        Ok(false)
    }

    /// Deletes presence records last active before `older_than` (millis).
    async fn sweep_presence(&self, older_than: i64) -> Result<usize, SyncError>;

    fn subscribe(&self) -> Option<watch::Receiver<u64>> {
        None
    }
}

/// Resolves when a push-capable store reports a change. Returns `false` once
/// the store's channel is gone; pull-only stores (`None`) never resolve.
pub async fn wait_for_change(changes: &mut Option<watch::Receiver<u64>>) -> bool {
    match changes {
        Some(receiver) => receiver.changed().await.is_ok(),
        None => std::future::pending().await,
    }
}

pub(crate) fn compare_by_rank(a: &LeaderboardEntry, b: &LeaderboardEntry) -> std::cmp::Ordering {
    b.score
        .cmp(&a.score)
        .then(a.timestamp.cmp(&b.timestamp))
        .then_with(|| a.player_id.cmp(&b.player_id))
}
