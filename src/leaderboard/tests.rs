use super::*;
use crate::app::time::ManualClock;
use crate::store::{MemoryStore, PresenceEntry, UpsertOutcome};
use async_trait::async_trait;

fn options() -> LeaderboardOptions {
    LeaderboardOptions {
        max_entries: 10,
        refresh_interval: Duration::from_millis(50),
        active_window: Duration::from_secs(30),
        snapshot_path: None,
        retry: RetryPolicy {
            timeout: Duration::from_millis(200),
            attempts: 1,
            delay: Duration::from_millis(1),
        },
    }
}

fn client_with(store: Arc<MemoryStore>, options: LeaderboardOptions) -> (LeaderboardClient, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(1_000));
    let client = LeaderboardClient::new(store, clock.clone(), options);
    (client, clock)
}

fn entry(player_id: &str, username: &str, score: i64, timestamp: i64) -> LeaderboardEntry {
    LeaderboardEntry {
        player_id: player_id.to_string(),
        username: username.to_string(),
        score,
        timestamp,
    }
}

/// Store whose writes always fail inside the backend.
struct BrokenStore;

#[async_trait]
impl RemoteStore for BrokenStore {
    fn name(&self) -> &'static str {
        "broken"
    }

    async fn get_top(&self, _limit: usize) -> Result<Vec<LeaderboardEntry>, SyncError> {
        Ok(Vec::new())
    }

    async fn upsert_if_better(&self, _entry: LeaderboardEntry) -> Result<UpsertOutcome, SyncError> {
        Err(SyncError::Backend("disk full".to_string()))
    }

    async fn list_presence(&self) -> Result<Vec<PresenceEntry>, SyncError> {
        Ok(Vec::new())
    }

    async fn set_presence(&self, _entry: PresenceEntry) -> Result<(), SyncError> {
        Ok(())
    }

    async fn remove_presence(&self, _player_id: &str) -> Result<(), SyncError> {
        Ok(())
    }

    async fn sweep_presence(&self, _older_than: i64) -> Result<usize, SyncError> {
        Ok(0)
    }
}

#[tokio::test]
async fn lower_score_is_a_noop_ranked_against_the_best() {
    let store = Arc::new(MemoryStore::new());
    store.upsert_if_better(entry("rival", "Rival", 12, 1)).await.unwrap();
    let (client, clock) = client_with(store.clone(), options());

    let first = client.submit_score("p", "alice", 10).await.unwrap();
    assert_eq!(first.rank, Some(2));
    assert!(first.improved);

    clock.advance(100);
    let second = client.submit_score("p", "alice", 7).await.unwrap();
    assert!(!second.improved);
    assert_eq!(second.rank, Some(2));
    assert_eq!(client.player_best("alice"), Some(10));

    clock.advance(100);
    let third = client.submit_score("p", "alice", 15).await.unwrap();
    assert!(third.improved);
    assert_eq!(third.rank, Some(1));
    assert!(third.rank <= second.rank);
    assert_eq!(store.get_top(10).await.unwrap()[0].score, 15);
}

#[tokio::test]
async fn reading_twice_without_writes_is_identical() {
    let store = Arc::new(MemoryStore::new());
    for (index, score) in [5, 9, 3].into_iter().enumerate() {
        let id = format!("p{index}");
        store.upsert_if_better(entry(&id, &id, score, index as i64)).await.unwrap();
    }
    let (client, _) = client_with(store, options());
    client.refresh().await.unwrap();

    let first = client.get_top_scores(10);
    let second = client.get_top_scores(10);
    assert_eq!(first, second);
    let scores: Vec<_> = first.iter().map(|entry| entry.score).collect();
    assert_eq!(scores, vec![9, 5, 3]);
    assert_eq!(client.get_top_scores(2).len(), 2);
}

#[tokio::test]
async fn names_differing_in_case_and_spacing_share_one_row() {
    let store = Arc::new(MemoryStore::new());
    store.upsert_if_better(entry("device-1", "Bob", 4, 1)).await.unwrap();
    store.upsert_if_better(entry("device-2", " bob ", 11, 2)).await.unwrap();
    let (client, _) = client_with(store, options());
    client.refresh().await.unwrap();

    let board = client.get_top_scores(10);
    assert_eq!(board.len(), 1);
    assert_eq!(board[0].score, 11);
    assert_eq!(client.player_rank("BOB"), Some(1));
}

#[tokio::test]
async fn board_keeps_only_the_retained_window() {
    let store = Arc::new(MemoryStore::new());
    for score in 1..=14 {
        let id = format!("p{score}");
        store.upsert_if_better(entry(&id, &id, score, score)).await.unwrap();
    }
    let (client, _) = client_with(store, options());

    let outcome = client.submit_score("late", "late", 2).await.unwrap();
    assert_eq!(outcome.rank, None);
    assert!(outcome.improved);
    assert_eq!(client.get_top_scores(100).len(), 10);
    assert!(!client.is_high_score("newcomer", 5));
    assert!(client.is_high_score("newcomer", 6));
}

#[tokio::test]
async fn invalid_submissions_have_no_side_effects() {
    let store = Arc::new(MemoryStore::new());
    let (client, _) = client_with(store.clone(), options());

    for score in [0, -4] {
        let error = client.submit_score("p", "alice", score).await.unwrap_err();
        assert!(matches!(error, SyncError::Validation(_)));
    }
    let error = client.submit_score("p", "   ", 5).await.unwrap_err();
    assert!(matches!(error, SyncError::Validation(_)));

    assert!(store.get_top(10).await.unwrap().is_empty());
    assert_eq!(client.pending_count().await, 0);
}

#[tokio::test]
async fn offline_submission_falls_back_and_resyncs() {
    let store = Arc::new(MemoryStore::new());
    let (client, _) = client_with(store.clone(), options());
    store.set_offline(true);

    let outcome = client.submit_score("p", "alice", 8).await.unwrap();
    assert!(!outcome.synced);
    assert_eq!(outcome.rank, Some(1));
    assert_eq!(client.pending_count().await, 1);
    assert!(client.refresh().await.unwrap_err().is_transient());
    assert_eq!(client.get_top_scores(10)[0].score, 8);

    store.set_offline(false);
    client.refresh().await.unwrap();
    assert_eq!(client.pending_count().await, 0);
    let stored = store.get_top(10).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].score, 8);
}

#[tokio::test]
async fn backend_failures_surface_to_the_caller() {
    let clock = Arc::new(ManualClock::new(0));
    let client = LeaderboardClient::new(Arc::new(BrokenStore), clock, options());
    let error = client.submit_score("p", "alice", 3).await.unwrap_err();
    assert_eq!(error, SyncError::Backend("disk full".to_string()));
    assert_eq!(client.pending_count().await, 0);
    assert!(client.get_top_scores(10).is_empty());
}

#[tokio::test]
async fn snapshot_survives_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let mut opts = options();
    opts.snapshot_path = Some(dir.path().join("snakeLeaderboard.json"));

    let store = Arc::new(MemoryStore::new());
    store.set_offline(true);
    let (client, _) = client_with(store.clone(), opts.clone());
    client.submit_score("p", "alice", 21).await.unwrap();

    let (restored, _) = client_with(store, opts);
    assert!(restored.restore_snapshot().await.unwrap());
    assert_eq!(restored.player_best("alice"), Some(21));
    assert_eq!(restored.pending_count().await, 1);
}

#[tokio::test]
async fn active_players_counts_recent_presence_only() {
    let store = Arc::new(MemoryStore::new());
    let (client, clock) = client_with(store.clone(), options());
    clock.set(100_000);
    for (id, last_active_at) in [("fresh", 95_000), ("stale", 10_000)] {
        store
            .set_presence(PresenceEntry {
                player_id: id.to_string(),
                username: id.to_string(),
                last_active_at,
                is_playing: true,
            })
            .await
            .unwrap();
    }
    client.refresh().await.unwrap();
    assert_eq!(client.active_players().await, 1);
}

#[tokio::test]
async fn refresh_loop_follows_store_pushes_and_stops() {
    let store = Arc::new(MemoryStore::new());
    let mut opts = options();
    opts.refresh_interval = Duration::from_secs(3_600);
    let (client, _) = client_with(store.clone(), opts);
    let client = Arc::new(client);
    let mut board = client.subscribe();

    client.start_refresh_loop();
    client.start_refresh_loop();
    tokio::time::sleep(Duration::from_millis(20)).await;
    store.upsert_if_better(entry("p", "Pushy", 30, 1)).await.unwrap();

    tokio::time::timeout(Duration::from_secs(2), board.wait_for(|entries| !entries.is_empty()))
        .await
        .expect("board update")
        .expect("sender alive");
    assert_eq!(client.player_best("pushy"), Some(30));

    client.stop_refresh_loop();
    client.stop_refresh_loop();
}
