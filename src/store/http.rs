use super::types::{LeaderboardEntry, PresenceEntry, UpsertOutcome};
use super::RemoteStore;
use crate::error::SyncError;
use crate::protocol::{
    ActivePlayersResponse, ErrorResponse, HeartbeatRequest, LeaderboardResponse, LeaveRequest, PresenceResponse,
    ScoreSubmission, ScoreSubmissionResponse,
};
use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

/// Client for the leaderboard server's JSON API. Pull-only: `subscribe`
/// returns `None`, and stale presence is swept on the server side.
#[derive(Debug, Clone)]
pub struct HttpStore {
    http: reqwest::Client,
    base_url: String,
}

impl HttpStore {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SyncError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| SyncError::Backend(format!("failed to build http client: {error}")))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn request_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        query: Option<&[(&str, String)]>,
    ) -> Result<T, SyncError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.http.request(method, &url);
        if let Some(query) = query {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;
        decode_response(response).await
    }
}

async fn decode_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, SyncError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<ErrorResponse>(&body)
            .map(|error| match error.message {
                Some(message) => format!("{}: {}", error.error, message),
                None => error.error,
            })
            .unwrap_or(body);
        return Err(error_for_status(status, detail));
    }
    let body = response.bytes().await?;
    Ok(serde_json::from_slice(&body)?)
}

fn error_for_status(status: StatusCode, detail: String) -> SyncError {
    let message = format!("{} {}", status.as_u16(), detail);
    match status {
        StatusCode::REQUEST_TIMEOUT
        | StatusCode::TOO_MANY_REQUESTS
        | StatusCode::BAD_GATEWAY
        | StatusCode::SERVICE_UNAVAILABLE
        | StatusCode::GATEWAY_TIMEOUT => SyncError::Transient(message),
        status if status.is_client_error() => SyncError::Validation(message),
        _ => SyncError::Backend(message),
    }
}

#[async_trait]
impl RemoteStore for HttpStore {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn get_top(&self, limit: usize) -> Result<Vec<LeaderboardEntry>, SyncError> {
        let query = [("limit", limit.to_string())];
        let response: LeaderboardResponse = self
            .request_json::<_, ()>(Method::GET, "/leaderboard", None, Some(&query))
            .await?;
        Ok(response.scores)
    }

    async fn upsert_if_better(&self, entry: LeaderboardEntry) -> Result<UpsertOutcome, SyncError> {
        let body = ScoreSubmission {
            player_id: Some(entry.player_id),
            username: Some(entry.username),
            score: Some(entry.score as f64),
        };
        let response: ScoreSubmissionResponse = self
            .request_json(Method::POST, "/leaderboard", Some(&body), None)
            .await?;
        Ok(UpsertOutcome {
            entry: response.entry,
            improved: response.improved,
        })
    }

    async fn list_presence(&self) -> Result<Vec<PresenceEntry>, SyncError> {
        let response: PresenceResponse = self
            .request_json::<_, ()>(Method::GET, "/presence", None, None)
            .await?;
        Ok(response.players)
    }

    async fn set_presence(&self, entry: PresenceEntry) -> Result<(), SyncError> {
        let body = HeartbeatRequest {
            player_id: Some(entry.player_id),
            username: Some(entry.username),
            is_playing: Some(entry.is_playing),
        };
        let _: ActivePlayersResponse = self
            .request_json(Method::POST, "/heartbeat", Some(&body), None)
            .await?;
        Ok(())
    }

    async fn remove_presence(&self, player_id: &str) -> Result<(), SyncError> {
        let body = LeaveRequest {
            player_id: Some(player_id.to_string()),
            username: None,
        };
        let _: ActivePlayersResponse = self
            .request_json(Method::POST, "/leave", Some(&body), None)
            .await?;
        Ok(())
    }

    async fn sweep_presence(&self, _older_than: i64) -> Result<usize, SyncError> {
        Ok(0)
    }
}
