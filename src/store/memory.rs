use super::types::{LeaderboardEntry, PresenceEntry, UpsertOutcome};
use super::{compare_by_rank, RemoteStore};
use crate::error::SyncError;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;

/// In-process store with push notifications. Backs the tests and the
/// single-process server mode when no database is configured.
///
/// Presence records registered through `on_disconnect_cleanup` are dropped by
/// `disconnect`, which stands in for the backend noticing a lost connection.
/// `set_offline` makes every call fail as transient.
#[derive(Debug)]
pub struct MemoryStore {
    scores: DashMap<String, LeaderboardEntry>,
    presence: DashMap<String, PresenceEntry>,
    ephemeral: DashSet<String>,
    revision: watch::Sender<u64>,
    offline: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            scores: DashMap::new(),
            presence: DashMap::new(),
            ephemeral: DashSet::new(),
            revision,
            offline: AtomicBool::new(false),
        }
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Drops every presence record that asked for disconnect cleanup.
    pub fn disconnect(&self) -> usize {
        let ids: Vec<String> = self.ephemeral.iter().map(|id| id.key().clone()).collect();
        self.ephemeral.clear();
        let removed = ids
            .iter()
            .filter(|id| self.presence.remove(id.as_str()).is_some())
            .count();
        if removed > 0 {
            self.bump();
        }
        removed
    }

    fn bump(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }

    fn check_online(&self) -> Result<(), SyncError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(SyncError::Transient("memory store offline".to_string()));
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get_top(&self, limit: usize) -> Result<Vec<LeaderboardEntry>, SyncError> {
        self.check_online()?;
        let mut entries: Vec<LeaderboardEntry> = self.scores.iter().map(|entry| entry.value().clone()).collect();
        entries.sort_by(compare_by_rank);
        entries.truncate(limit);
        Ok(entries)
    }

    async fn upsert_if_better(&self, entry: LeaderboardEntry) -> Result<UpsertOutcome, SyncError> {
        self.check_online()?;
        let outcome = match self.scores.entry(entry.player_id.clone()) {
            Entry::Occupied(mut occupied) => {
                if entry.score > occupied.get().score {
                    occupied.insert(entry);
                    UpsertOutcome {
                        entry: occupied.get().clone(),
                        improved: true,
                    }
                } else {
                    UpsertOutcome {
                        entry: occupied.get().clone(),
                        improved: false,
                    }
                }
            }
            Entry::Vacant(vacant) => UpsertOutcome {
                entry: vacant.insert(entry).value().clone(),
                improved: true,
            },
        };
        if outcome.improved {
            self.bump();
        }
        Ok(outcome)
    }

    async fn list_presence(&self) -> Result<Vec<PresenceEntry>, SyncError> {
        self.check_online()?;
        Ok(self.presence.iter().map(|entry| entry.value().clone()).collect())
    }

    async fn set_presence(&self, entry: PresenceEntry) -> Result<(), SyncError> {
        self.check_online()?;
        self.presence.insert(entry.player_id.clone(), entry);
        self.bump();
        Ok(())
    }

    async fn remove_presence(&self, player_id: &str) -> Result<(), SyncError> {
        self.check_online()?;
        self.ephemeral.remove(player_id);
        if self.presence.remove(player_id).is_some() {
            self.bump();
        }
        Ok(())
    }

    async fn on_disconnect_cleanup(&self, player_id: &str) -> Result<bool, SyncError> {
        self.check_online()?;
        self.ephemeral.insert(player_id.to_string());
        Ok(true)
    }

    async fn sweep_presence(&self, older_than: i64) -> Result<usize, SyncError> {
        self.check_online()?;
        let before = self.presence.len();
        self.presence.retain(|player_id, entry| {
            let fresh = entry.last_active_at >= older_than;
            if !fresh {
                self.ephemeral.remove(player_id);
            }
            fresh
        });
        let removed = before.saturating_sub(self.presence.len());
        if removed > 0 {
            self.bump();
        }
        Ok(removed)
    }

    fn subscribe(&self) -> Option<watch::Receiver<u64>> {
        Some(self.revision.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(player_id: &str, score: i64, timestamp: i64) -> LeaderboardEntry {
        LeaderboardEntry {
            player_id: player_id.to_string(),
            username: player_id.to_uppercase(),
            score,
            timestamp,
        }
    }

    fn presence(player_id: &str, last_active_at: i64) -> PresenceEntry {
        PresenceEntry {
            player_id: player_id.to_string(),
            username: player_id.to_string(),
            last_active_at,
            is_playing: true,
        }
    }

    #[tokio::test]
    async fn lower_score_never_overwrites() {
        let store = MemoryStore::new();
        assert!(store.upsert_if_better(entry("a", 10, 1)).await.unwrap().improved);
        let outcome = store.upsert_if_better(entry("a", 7, 2)).await.unwrap();
        assert!(!outcome.improved);
        assert_eq!(outcome.entry.score, 10);
        let outcome = store.upsert_if_better(entry("a", 10, 3)).await.unwrap();
        assert!(!outcome.improved);
        assert_eq!(outcome.entry.timestamp, 1);
    }

    #[tokio::test]
    async fn top_is_sorted_by_score_then_time() {
        let store = MemoryStore::new();
        store.upsert_if_better(entry("a", 5, 30)).await.unwrap();
        store.upsert_if_better(entry("b", 9, 20)).await.unwrap();
        store.upsert_if_better(entry("c", 5, 10)).await.unwrap();
        let top = store.get_top(2).await.unwrap();
        let ids: Vec<_> = top.iter().map(|entry| entry.player_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn sweep_removes_only_stale_presence() {
        let store = MemoryStore::new();
        store.set_presence(presence("old", 100)).await.unwrap();
        store.set_presence(presence("new", 900)).await.unwrap();
        assert_eq!(store.sweep_presence(500).await.unwrap(), 1);
        let left = store.list_presence().await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].player_id, "new");
    }

    #[tokio::test]
    async fn disconnect_drops_registered_presence() {
        let store = MemoryStore::new();
        let mut changes = store.subscribe().expect("push store");
        store.set_presence(presence("p1", 1)).await.unwrap();
        store.set_presence(presence("p2", 1)).await.unwrap();
        assert!(store.on_disconnect_cleanup("p1").await.unwrap());
        changes.borrow_and_update();

        assert_eq!(store.disconnect(), 1);
        assert!(changes.has_changed().unwrap());
        let left = store.list_presence().await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].player_id, "p2");
    }

    #[tokio::test]
    async fn sweep_forgets_cleanup_registrations() {
        let store = MemoryStore::new();
        store.set_presence(presence("p1", 100)).await.unwrap();
        assert!(store.on_disconnect_cleanup("p1").await.unwrap());
        assert_eq!(store.sweep_presence(500).await.unwrap(), 1);

        store.set_presence(presence("p1", 900)).await.unwrap();
        assert_eq!(store.disconnect(), 0);
        assert_eq!(store.list_presence().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn offline_store_fails_transiently() {
        let store = MemoryStore::new();
        store.set_offline(true);
        assert!(store.get_top(5).await.unwrap_err().is_transient());
        store.set_offline(false);
        assert!(store.get_top(5).await.unwrap().is_empty());
    }
}
