pub mod ranking;
pub mod snapshot;

#[cfg(test)]
mod tests;

use crate::app::config::AppConfig;
use crate::app::time::Clock;
use crate::error::SyncError;
use crate::shared::names::sanitize_player_name;
use crate::store::{wait_for_change, with_retry, LeaderboardEntry, RemoteStore, RetryPolicy};
use ranking::{best_of, qualifies, rank_entries, rank_of};
use snapshot::LeaderboardSnapshot;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError};
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

/// Records fetched per refresh, as a multiple of the board size, so that
/// duplicate names collapsing still leaves a full board.
const FETCH_OVERSCAN: usize = 2;

#[derive(Debug, Clone)]
pub struct LeaderboardOptions {
    pub max_entries: usize,
    pub refresh_interval: Duration,
    pub active_window: Duration,
    pub snapshot_path: Option<PathBuf>,
    pub retry: RetryPolicy,
}

impl LeaderboardOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_entries: config.leaderboard.max_entries,
            refresh_interval: config.leaderboard.refresh_interval,
            active_window: config.presence.active_window,
            snapshot_path: config.leaderboard.snapshot_path.clone(),
            retry: RetryPolicy::from(&config.network),
        }
    }
}

impl Default for LeaderboardOptions {
    fn default() -> Self {
        Self {
            max_entries: 10,
            refresh_interval: Duration::from_secs(10),
            active_window: Duration::from_secs(30),
            snapshot_path: None,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitOutcome {
    /// 1-based position in the retained board, `None` outside it.
    pub rank: Option<usize>,
    /// Whether the stored best changed. `false` is the no-op case.
    pub improved: bool,
    /// `false` when the store was unreachable and the score only went to the
    /// local cache and the resync queue.
    pub synced: bool,
}

#[derive(Debug, Default)]
struct CacheState {
    pending: Vec<LeaderboardEntry>,
    active_players: usize,
}

/// Client-side view of the shared leaderboard.
///
/// The ranked board lives in a `watch` channel, so readers never wait on a
/// network call. Writes go to the store first; when it is unreachable the
/// entry is merged into the local board and queued until the next refresh.
pub struct LeaderboardClient {
    store: Arc<dyn RemoteStore>,
    clock: Arc<dyn Clock>,
    options: LeaderboardOptions,
    cache: Mutex<CacheState>,
    board: watch::Sender<Vec<LeaderboardEntry>>,
    refresh_task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl LeaderboardClient {
    pub fn new(store: Arc<dyn RemoteStore>, clock: Arc<dyn Clock>, options: LeaderboardOptions) -> Self {
        let (board, _) = watch::channel(Vec::new());
        Self {
            store,
            clock,
            options,
            cache: Mutex::new(CacheState::default()),
            board,
            refresh_task: std::sync::Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<LeaderboardEntry>> {
        self.board.subscribe()
    }

    /// Top `limit` rows of the last synchronized board.
    pub fn get_top_scores(&self, limit: usize) -> Vec<LeaderboardEntry> {
        self.board.borrow().iter().take(limit).cloned().collect()
    }

    pub fn is_high_score(&self, username: &str, score: i64) -> bool {
        qualifies(&self.board.borrow(), self.options.max_entries, username, score)
    }

    pub fn player_best(&self, username: &str) -> Option<i64> {
        best_of(&self.board.borrow(), username)
    }

    pub fn player_rank(&self, username: &str) -> Option<usize> {
        rank_of(&self.board.borrow(), username)
    }

    pub async fn active_players(&self) -> usize {
        self.cache.lock().await.active_players
    }

    pub async fn pending_count(&self) -> usize {
        self.cache.lock().await.pending.len()
    }

    /// Loads the local snapshot, if one is configured and exists.
    pub async fn restore_snapshot(&self) -> Result<bool, SyncError> {
        let Some(path) = self.options.snapshot_path.as_deref() else {
            return Ok(false);
        };
        let Some(saved) = snapshot::load(path).await? else {
            return Ok(false);
        };
        let mut cache = self.cache.lock().await;
        cache.pending = saved.pending;
        self.publish(saved.entries, &cache.pending);
        tracing::info!(path = %path.display(), "restored leaderboard snapshot");
        Ok(true)
    }

    pub async fn submit_score(&self, player_id: &str, username: &str, score: i64) -> Result<SubmitOutcome, SyncError> {
        let player_id = player_id.trim();
        if player_id.is_empty() {
            return Err(SyncError::Validation("player id is required".to_string()));
        }
        let username = sanitize_player_name(username, "");
        if username.is_empty() {
            return Err(SyncError::Validation("username is required".to_string()));
        }
        if score <= 0 {
            return Err(SyncError::Validation(format!("score must be a positive integer, got {score}")));
        }

        let entry = LeaderboardEntry {
            player_id: player_id.to_string(),
            username: username.clone(),
            score,
            timestamp: self.clock.now_millis(),
        };

        let store = self.store.as_ref();
        let attempt = entry.clone();
        let written = with_retry(self.options.retry, "score submission", move || {
            store.upsert_if_better(attempt.clone())
        })
        .await;

        match written {
            Ok(outcome) => {
                if let Err(error) = self.fetch_board().await {
                    tracing::warn!(?error, "leaderboard refresh after submission failed");
                    let mut cache = self.cache.lock().await;
                    let merged = self.merged_with(outcome.entry.clone());
                    self.publish(merged, &cache.pending);
                    cache.pending.retain(|pending| pending.player_id != outcome.entry.player_id);
                }
                let rank = self.player_rank(&username);
                tracing::info!(player_id, score, improved = outcome.improved, ?rank, "score submitted");
                Ok(SubmitOutcome {
                    rank,
                    improved: outcome.improved,
                    synced: true,
                })
            }
            Err(error) if error.is_transient() => {
                tracing::warn!(?error, player_id, score, "score submission failed, keeping it locally");
                let improved = self.player_best(&username).map_or(true, |best| score > best);
                {
                    let mut cache = self.cache.lock().await;
                    queue_pending(&mut cache.pending, entry.clone());
                    let merged = self.merged_with(entry);
                    self.publish(merged, &cache.pending);
                }
                self.persist().await;
                Ok(SubmitOutcome {
                    rank: self.player_rank(&username),
                    improved,
                    synced: false,
                })
            }
            Err(error) => {
                tracing::warn!(?error, player_id, score, "score submission rejected");
                Err(error)
            }
        }
    }

    /// Pushes queued offline submissions to the store. Stops at the first
    /// transient failure and keeps the rest queued. Returns how many were
    /// delivered.
    pub async fn resync_pending(&self) -> Result<usize, SyncError> {
        let queued = std::mem::take(&mut self.cache.lock().await.pending);
        if queued.is_empty() {
            return Ok(0);
        }

        let store = self.store.as_ref();
        let mut delivered = 0;
        let mut remaining = queued.into_iter();
        let mut failure = None;
        for entry in remaining.by_ref() {
            let attempt = entry.clone();
            let result = with_retry(self.options.retry, "score resync", move || {
                store.upsert_if_better(attempt.clone())
            })
            .await;
            match result {
                Ok(_) => delivered += 1,
                Err(error) if error.is_transient() => {
                    failure = Some((entry, error));
                    break;
                }
                Err(error) => {
                    tracing::warn!(?error, player_id = %entry.player_id, "dropping queued score the store rejected");
                }
            }
        }

        let outcome = {
            let mut cache = self.cache.lock().await;
            match failure {
                Some((entry, error)) => {
                    let mut requeue = vec![entry];
                    requeue.extend(remaining);
                    for pending in std::mem::take(&mut cache.pending) {
                        queue_pending(&mut requeue, pending);
                    }
                    cache.pending = requeue;
                    Err(error)
                }
                None => Ok(delivered),
            }
        };
        if delivered > 0 {
            tracing::info!(delivered, "resynced queued scores");
        }
        self.persist().await;
        outcome
    }

    /// Resyncs the queue, then replaces the cached board with the store's.
    /// On failure the previous board stays in place.
    pub async fn refresh(&self) -> Result<(), SyncError> {
        if let Err(error) = self.resync_pending().await {
            tracing::debug!(?error, "queued scores still offline");
        }
        self.fetch_board().await?;
        self.refresh_active_players().await;
        self.persist().await;
        Ok(())
    }

    pub fn start_refresh_loop(self: &Arc<Self>) {
        let client = Arc::clone(self);
        let task = tokio::spawn(async move {
            let mut changes = client.store.subscribe();
            let mut interval = tokio::time::interval(client.options.refresh_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                let store_alive = tokio::select! {
                    _ = interval.tick() => true,
                    alive = wait_for_change(&mut changes) => alive,
                };
                if !store_alive {
                    changes = None;
                }
                if let Err(error) = client.refresh().await {
                    tracing::warn!(?error, store = client.store.name(), "leaderboard refresh failed");
                }
            }
        });
        let previous = self
            .refresh_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Safe to call any number of times.
    pub fn stop_refresh_loop(&self) {
        let task = self.refresh_task.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(task) = task {
            task.abort();
        }
    }

    async fn fetch_board(&self) -> Result<(), SyncError> {
        let store = self.store.as_ref();
        let window = self.options.max_entries.saturating_mul(FETCH_OVERSCAN).max(1);
        let entries = with_retry(self.options.retry, "leaderboard fetch", move || store.get_top(window)).await?;
        let cache = self.cache.lock().await;
        self.publish(entries, &cache.pending);
        Ok(())
    }

    async fn refresh_active_players(&self) {
        let store = self.store.as_ref();
        match with_retry(self.options.retry, "presence count", move || store.list_presence()).await {
            Ok(players) => {
                let cutoff = self.clock.now_millis() - self.options.active_window.as_millis() as i64;
                let active = players.iter().filter(|player| player.last_active_at >= cutoff).count();
                self.cache.lock().await.active_players = active;
            }
            Err(error) => tracing::debug!(?error, "active player count unavailable"),
        }
    }

    fn merged_with(&self, entry: LeaderboardEntry) -> Vec<LeaderboardEntry> {
        let mut entries = self.board.borrow().clone();
        entries.push(entry);
        entries
    }

    /// Ranks `entries` together with the unsynced queue and publishes the
    /// result when it differs from the current board.
    fn publish(&self, entries: Vec<LeaderboardEntry>, pending: &[LeaderboardEntry]) {
        let ranked = rank_entries(entries.into_iter().chain(pending.iter().cloned()), self.options.max_entries);
        self.board.send_if_modified(|board| {
            if *board == ranked {
                return false;
            }
            *board = ranked;
            true
        });
    }

    async fn persist(&self) {
        let Some(path) = self.options.snapshot_path.as_deref() else {
            return;
        };
        let entries = self.board.borrow().clone();
        let pending = self.cache.lock().await.pending.clone();
        let saved = LeaderboardSnapshot {
            entries,
            pending,
            saved_at: self.clock.now_millis(),
        };
        if let Err(error) = snapshot::save(path, &saved).await {
            tracing::warn!(?error, "failed to write leaderboard snapshot");
        }
    }
}

/// Keeps one queued entry per player id, the higher score winning.
fn queue_pending(pending: &mut Vec<LeaderboardEntry>, entry: LeaderboardEntry) {
    match pending.iter_mut().find(|queued| queued.player_id == entry.player_id) {
        Some(queued) if queued.score >= entry.score => {}
        Some(queued) => *queued = entry,
        None => pending.push(entry),
    }
}
