use crate::store::{LeaderboardEntry, PresenceEntry};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardResponse {
  pub scores: Vec<LeaderboardEntry>,
  #[serde(rename = "activePlayers", default)]
  pub active_players: usize,
}

/// Score submission. Fields stay optional so the server can answer a missing
/// or malformed field with a 400 of its own instead of a JSON rejection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoreSubmission {
  #[serde(rename = "playerId", default, skip_serializing_if = "Option::is_none")]
  pub player_id: Option<String>,
  #[serde(default)]
  pub username: Option<String>,
  #[serde(default)]
  pub score: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreSubmissionResponse {
  /// 1-based position in the returned window, 0 when outside it.
  pub rank: usize,
  pub leaderboard: Vec<LeaderboardEntry>,
  pub improved: bool,
  /// The record the server holds for this player after the write.
  pub entry: LeaderboardEntry,
  #[serde(rename = "activePlayers", default)]
  pub active_players: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeartbeatRequest {
  #[serde(rename = "playerId", default)]
  pub player_id: Option<String>,
  #[serde(default)]
  pub username: Option<String>,
  #[serde(rename = "isPlaying", default)]
  pub is_playing: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeaveRequest {
  #[serde(rename = "playerId", default)]
  pub player_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivePlayersResponse {
  #[serde(rename = "activePlayers")]
  pub active_players: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceResponse {
  pub players: Vec<PresenceEntry>,
  #[serde(rename = "activePlayers")]
  pub active_players: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OkResponse {
  pub ok: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
  #[serde(default)]
  pub ok: bool,
  pub error: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub message: Option<String>,
}

impl ErrorResponse {
  pub fn new(error: impl Into<String>) -> Self {
    Self {
      ok: false,
      error: error.into(),
      message: None,
    }
  }

  pub fn with_message(mut self, message: impl Into<String>) -> Self {
    self.message = Some(message.into());
    self
  }
}

/// Messages a live client may send over `/api/live`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "type")]
pub enum LiveClientMessage {
  #[serde(rename = "join")]
  Join {
    #[serde(rename = "playerId")]
    player_id: Option<String>,
    username: Option<String>,
  },
  #[serde(rename = "status")]
  Status {
    #[serde(rename = "isPlaying")]
    is_playing: bool,
  },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LiveServerMessage {
  #[serde(rename = "snapshot")]
  Snapshot {
    scores: Vec<LeaderboardEntry>,
    players: Vec<PresenceEntry>,
    #[serde(rename = "activePlayers")]
    active_players: usize,
  },
  #[serde(rename = "error")]
  Error { error: String },
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn live_messages_use_type_tags() {
    let join: LiveClientMessage =
      serde_json::from_str(r#"{"type":"join","playerId":"p1","username":"Ana"}"#).unwrap();
    assert_eq!(
      join,
      LiveClientMessage::Join {
        player_id: Some("p1".to_string()),
        username: Some("Ana".to_string()),
      }
    );
    let status: LiveClientMessage = serde_json::from_str(r#"{"type":"status","isPlaying":false}"#).unwrap();
    assert_eq!(status, LiveClientMessage::Status { is_playing: false });
  }

  #[test]
  fn submission_tolerates_missing_fields() {
    let submission: ScoreSubmission = serde_json::from_str(r#"{"username":"Ana"}"#).unwrap();
    assert_eq!(submission.score, None);
    assert_eq!(submission.player_id, None);
  }

  #[test]
  fn error_response_omits_empty_message() {
    let body = serde_json::to_value(ErrorResponse::new("Invalid JSON")).unwrap();
    assert_eq!(body, serde_json::json!({ "ok": false, "error": "Invalid JSON" }));
  }
}
