use crate::error::SyncError;
use crate::store::LeaderboardEntry;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::Path;

pub const SNAPSHOT_KEY: &str = "snakeLeaderboard";

/// Locally persisted leaderboard: the last known board plus submissions that
/// never reached the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardSnapshot {
    #[serde(default)]
    pub entries: Vec<LeaderboardEntry>,
    #[serde(default)]
    pub pending: Vec<LeaderboardEntry>,
    #[serde(rename = "savedAt", default)]
    pub saved_at: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotFile {
    #[serde(rename = "snakeLeaderboard")]
    leaderboard: LeaderboardSnapshot,
}

/// `Ok(None)` when no snapshot has been written yet.
pub async fn load(path: &Path) -> Result<Option<LeaderboardSnapshot>, SyncError> {
    let raw = match tokio::fs::read(path).await {
        Ok(raw) => raw,
        Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
        Err(error) => return Err(io_error(path, error)),
    };
    let file: SnapshotFile = serde_json::from_slice(&raw)?;
    Ok(Some(file.leaderboard))
}

pub async fn save(path: &Path, snapshot: &LeaderboardSnapshot) -> Result<(), SyncError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|error| io_error(parent, error))?;
        }
    }
    let file = SnapshotFile {
        leaderboard: snapshot.clone(),
    };
    let payload = serde_json::to_vec_pretty(&file)?;
    let staging = path.with_extension("tmp");
    tokio::fs::write(&staging, payload)
        .await
        .map_err(|error| io_error(&staging, error))?;
    tokio::fs::rename(&staging, path)
        .await
        .map_err(|error| io_error(path, error))
}

fn io_error(path: &Path, error: std::io::Error) -> SyncError {
    SyncError::Backend(format!("{SNAPSHOT_KEY} snapshot at {}: {error}", path.display()))
}
