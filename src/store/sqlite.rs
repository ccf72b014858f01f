use super::types::{LeaderboardEntry, PresenceEntry, UpsertOutcome};
use super::RemoteStore;
use crate::error::SyncError;
use crate::shared::names::player_key;
use async_trait::async_trait;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;

/// Durable store for the leaderboard server. Writes bump a revision so live
/// subscribers in the same process are notified.
#[derive(Debug)]
pub struct SqliteStore {
    db: SqlitePool,
    revision: watch::Sender<u64>,
}

impl SqliteStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        ensure_db_dir(database_url)?;
        let db = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Self::from_pool(db).await
    }

    /// Private in-memory database. A single connection that never expires,
    /// since every new sqlite memory connection starts empty.
    pub async fn in_memory() -> anyhow::Result<Self> {
        let db = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
            .connect("sqlite::memory:")
            .await?;
        Self::from_pool(db).await
    }

    async fn from_pool(db: SqlitePool) -> anyhow::Result<Self> {
        sqlx::migrate!("./migrations").run(&db).await?;
        let (revision, _) = watch::channel(0);
        Ok(Self { db, revision })
    }

    fn bump(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }
}

fn ensure_db_dir(database_url: &str) -> anyhow::Result<()> {
    if database_url.starts_with("sqlite::memory:") {
        return Ok(());
    }
    let path = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"));
    let Some(path) = path else { return Ok(()) };
    let path = path.split('?').next().unwrap_or_default();
    if path.is_empty() || path == ":memory:" {
        return Ok(());
    }
    let db_path = PathBuf::from(path);
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if !db_path.exists() {
        std::fs::File::create(&db_path)?;
    }
    Ok(())
}

fn score_from_row(row: &SqliteRow) -> Result<LeaderboardEntry, SyncError> {
    Ok(LeaderboardEntry {
        player_id: row.try_get("player_id")?,
        username: row.try_get("username")?,
        score: row.try_get("score")?,
        timestamp: row.try_get("updated_at")?,
    })
}

fn presence_from_row(row: &SqliteRow) -> Result<PresenceEntry, SyncError> {
    Ok(PresenceEntry {
        player_id: row.try_get("player_id")?,
        username: row.try_get("username")?,
        last_active_at: row.try_get("last_active_at")?,
        is_playing: row.try_get("is_playing")?,
    })
}

#[async_trait]
impl RemoteStore for SqliteStore {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn get_top(&self, limit: usize) -> Result<Vec<LeaderboardEntry>, SyncError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query(
            "SELECT player_id, username, score, updated_at FROM scores \
             ORDER BY score DESC, updated_at ASC, player_id ASC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.db)
        .await?;
        rows.iter().map(score_from_row).collect()
    }

    async fn upsert_if_better(&self, entry: LeaderboardEntry) -> Result<UpsertOutcome, SyncError> {
        let mut tx = self.db.begin().await?;
        let result = sqlx::query(
            "INSERT INTO scores (player_id, username, username_key, score, updated_at) \
             VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT(player_id) DO UPDATE SET \
               username = excluded.username, \
               username_key = excluded.username_key, \
               score = excluded.score, \
               updated_at = excluded.updated_at \
             WHERE excluded.score > scores.score",
        )
        .bind(&entry.player_id)
        .bind(&entry.username)
        .bind(player_key(&entry.username))
        .bind(entry.score)
        .bind(entry.timestamp)
        .execute(&mut *tx)
        .await?;
        let row = sqlx::query(
            "SELECT player_id, username, score, updated_at FROM scores WHERE player_id = ?",
        )
        .bind(&entry.player_id)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        let improved = result.rows_affected() > 0;
        if improved {
            self.bump();
        }
        Ok(UpsertOutcome {
            entry: score_from_row(&row)?,
            improved,
        })
    }

    async fn list_presence(&self) -> Result<Vec<PresenceEntry>, SyncError> {
        let rows = sqlx::query("SELECT player_id, username, last_active_at, is_playing FROM presence")
            .fetch_all(&self.db)
            .await?;
        rows.iter().map(presence_from_row).collect()
    }

    async fn set_presence(&self, entry: PresenceEntry) -> Result<(), SyncError> {
        sqlx::query(
            "INSERT INTO presence (player_id, username, last_active_at, is_playing) \
             VALUES (?, ?, ?, ?) \
             ON CONFLICT(player_id) DO UPDATE SET \
               username = excluded.username, \
               last_active_at = excluded.last_active_at, \
               is_playing = excluded.is_playing",
        )
        .bind(&entry.player_id)
        .bind(&entry.username)
        .bind(entry.last_active_at)
        .bind(entry.is_playing)
        .execute(&self.db)
        .await?;
        self.bump();
        Ok(())
    }

    async fn remove_presence(&self, player_id: &str) -> Result<(), SyncError> {
        let result = sqlx::query("DELETE FROM presence WHERE player_id = ?")
            .bind(player_id)
            .execute(&self.db)
            .await?;
        if result.rows_affected() > 0 {
            self.bump();
        }
        Ok(())
    }

    async fn sweep_presence(&self, older_than: i64) -> Result<usize, SyncError> {
        let result = sqlx::query("DELETE FROM presence WHERE last_active_at < ?")
            .bind(older_than)
            .execute(&self.db)
            .await?;
        let removed = result.rows_affected() as usize;
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

    fn entry(player_id: &str, username: &str, score: i64, timestamp: i64) -> LeaderboardEntry {
        LeaderboardEntry {
            player_id: player_id.to_string(),
            username: username.to_string(),
            score,
            timestamp,
        }
    }

    #[tokio::test]
    async fn upsert_keeps_the_higher_score() {
        let store = SqliteStore::in_memory().await.unwrap();
        let first = store.upsert_if_better(entry("p1", "Ana", 10, 100)).await.unwrap();
        assert!(first.improved);

        let lower = store.upsert_if_better(entry("p1", "Ana", 4, 200)).await.unwrap();
        assert!(!lower.improved);
        assert_eq!(lower.entry.score, 10);
        assert_eq!(lower.entry.timestamp, 100);

        let higher = store.upsert_if_better(entry("p1", "Ana", 12, 300)).await.unwrap();
        assert!(higher.improved);
        assert_eq!(higher.entry.score, 12);
    }

    #[tokio::test]
    async fn top_orders_by_score_then_earliest() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.upsert_if_better(entry("late", "Late", 8, 500)).await.unwrap();
        store.upsert_if_better(entry("early", "Early", 8, 100)).await.unwrap();
        store.upsert_if_better(entry("best", "Best", 20, 900)).await.unwrap();
        let top = store.get_top(10).await.unwrap();
        let ids: Vec<_> = top.iter().map(|entry| entry.player_id.as_str()).collect();
        assert_eq!(ids, vec!["best", "early", "late"]);
    }

    #[tokio::test]
    async fn presence_roundtrips_and_sweeps() {
        let store = SqliteStore::in_memory().await.unwrap();
        let mut changes = store.subscribe().expect("revision channel");
        store
            .set_presence(PresenceEntry {
                player_id: "p1".to_string(),
                username: "Ana".to_string(),
                last_active_at: 1_000,
                is_playing: true,
            })
            .await
            .unwrap();
        assert!(changes.has_changed().unwrap());

        let listed = store.list_presence().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].is_playing);

        assert_eq!(store.sweep_presence(500).await.unwrap(), 0);
        assert_eq!(store.sweep_presence(2_000).await.unwrap(), 1);
        assert!(store.list_presence().await.unwrap().is_empty());
    }

    #[test]
    fn ensure_db_dir_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("scores.db");
        ensure_db_dir(&format!("sqlite://{}", path.display())).unwrap();
        assert!(path.exists());
        ensure_db_dir("sqlite::memory:").unwrap();
    }
}
