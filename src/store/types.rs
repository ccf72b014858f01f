use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    #[serde(rename = "playerId")]
    pub player_id: String,
    pub username: String,
    pub score: i64,
    /// Millis since epoch of the write that set the current score.
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceEntry {
    #[serde(rename = "playerId")]
    pub player_id: String,
    pub username: String,
    #[serde(rename = "lastActiveAt")]
    pub last_active_at: i64,
    #[serde(rename = "isPlaying")]
    pub is_playing: bool,
}

/// Result of `upsert_if_better`: the record the store holds afterwards and
/// whether this call replaced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub entry: LeaderboardEntry,
    pub improved: bool,
}
