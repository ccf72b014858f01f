pub mod cors;
pub mod live;


use crate::app::config::AppConfig;
use crate::app::time::{Clock, SystemClock};
use crate::error::SyncError;
use crate::leaderboard::ranking::{rank_entries, rank_of};
use crate::presence::view::{build_view, PresenceView};
use crate::protocol::{
    ActivePlayersResponse, ErrorResponse, HeartbeatRequest, LeaderboardResponse, LeaveRequest, OkResponse,
    PresenceResponse, ScoreSubmission, ScoreSubmissionResponse,
};
use crate::shared::names::{player_id_for_name, sanitize_player_name};
use crate::store::{LeaderboardEntry, MemoryStore, PresenceEntry, RemoteStore, SqliteStore};
use anyhow::Context;
use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

const MAX_SCORE: i64 = 1_000_000;
const MAX_LIMIT: usize = 100;

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub max_entries: usize,
    pub active_window: Duration,
    pub sweep_after: Duration,
    pub sweep_interval: Duration,
    /// How often live sockets re-read the store when it cannot push.
    pub live_poll_interval: Duration,
    pub production: bool,
    pub allowed_origins: Vec<String>,
}

impl ServerSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_entries: config.leaderboard.max_entries,
            active_window: config.presence.active_window,
            sweep_after: config.presence.sweep_after,
            sweep_interval: config.presence.sweep_interval,
            live_poll_interval: config.leaderboard.refresh_interval,
            production: config.production,
            allowed_origins: config.allowed_origins.clone(),
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            max_entries: 10,
            active_window: Duration::from_secs(30),
            sweep_after: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(60),
            live_poll_interval: Duration::from_secs(10),
            production: false,
            allowed_origins: Vec::new(),
        }
    }
}

pub struct AppState {
    pub store: Arc<dyn RemoteStore>,
    pub clock: Arc<dyn Clock>,
    pub settings: ServerSettings,
}

impl AppState {
    /// Ranked, deduplicated board of at most `limit` rows.
    async fn board(&self, limit: usize) -> Result<Vec<LeaderboardEntry>, SyncError> {
        let entries = self.store.get_top(limit.saturating_mul(2)).await?;
        Ok(rank_entries(entries, limit))
    }

    async fn presence_view(&self, window: Duration) -> Result<PresenceView, SyncError> {
        let entries = self.store.list_presence().await?;
        let cutoff = self.clock.now_millis() - window.as_millis() as i64;
        Ok(build_view(entries, cutoff))
    }

    /// Marks a submitting player active, keeping their playing flag if they
    /// already have a presence record.
    async fn touch_presence(&self, player_id: &str, username: &str) -> Result<(), SyncError> {
        let is_playing = self
            .store
            .list_presence()
            .await?
            .into_iter()
            .find(|entry| entry.player_id == player_id)
            .is_some_and(|entry| entry.is_playing);
        let entry = PresenceEntry {
            player_id: player_id.to_string(),
            username: username.to_string(),
            last_active_at: self.clock.now_millis(),
            is_playing,
        };
        self.store.set_presence(entry).await
    }

    async fn active_players(&self) -> Result<usize, SyncError> {
        Ok(self.presence_view(self.settings.active_window).await?.count)
    }
}

pub async fn run_server(config: &AppConfig) -> anyhow::Result<()> {
    let store: Arc<dyn RemoteStore> = if config.database_url == "memory" {
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(
            SqliteStore::connect(&config.database_url)
                .await
                .with_context(|| format!("failed to open {}", config.database_url))?,
        )
    };
    let state = Arc::new(AppState {
        store,
        clock: Arc::new(SystemClock),
        settings: ServerSettings::from_config(config),
    });
    let _sweeper = spawn_presence_sweeper(Arc::clone(&state));
    let app = router(state)?;

    let address = format!("0.0.0.0:{}", config.port);
    tracing::info!(production = config.production, "listening on {address}");
    let listener = tokio::net::TcpListener::bind(&address).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn router(state: Arc<AppState>) -> anyhow::Result<Router> {
    let cors = cors::cors_layer(state.settings.production, &state.settings.allowed_origins)?;
    let app: Router<Arc<AppState>> = Router::new()
        .route("/api/health", get(health))
        .route("/api", get(leaderboard_get).post(leaderboard_post))
        .route("/api/leaderboard", get(leaderboard_get).post(leaderboard_post))
        .route("/api/heartbeat", post(heartbeat))
        .route("/api/leave", post(leave))
        .route("/api/presence", get(presence_get))
        .route("/api/live", get(live::ws_handler))
        .layer(cors);
    Ok(app.with_state(state))
}

/// Deletes presence rows nobody has touched for `sweep_after`.
pub fn spawn_presence_sweeper(state: Arc<AppState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(state.settings.sweep_interval);
        loop {
            interval.tick().await;
            let cutoff = state.clock.now_millis() - state.settings.sweep_after.as_millis() as i64;
            match state.store.sweep_presence(cutoff).await {
                Ok(0) => {}
                Ok(removed) => tracing::info!(removed, "swept stale presence"),
                Err(error) => tracing::warn!(?error, "presence sweep failed"),
            }
        }
    })
}

async fn health() -> impl IntoResponse {
    Json(OkResponse { ok: true })
}

async fn leaderboard_get(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let limit = params
        .get("limit")
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(state.settings.max_entries)
        .clamp(1, MAX_LIMIT);

    let scores = match state.board(limit).await {
        Ok(scores) => scores,
        Err(error) => return store_failure("Failed to load leaderboard", error),
    };
    let active_players = match state.active_players().await {
        Ok(count) => count,
        Err(error) => return store_failure("Failed to load leaderboard", error),
    };
    (StatusCode::OK, Json(LeaderboardResponse { scores, active_players })).into_response()
}

async fn leaderboard_post(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ScoreSubmission>, JsonRejection>,
) -> Response {
    let Ok(Json(payload)) = payload else {
        return bad_request("Invalid JSON");
    };

    let Some(username) = required_name(payload.username.as_deref()) else {
        return bad_request("Username is required");
    };
    let score_value = payload.score.unwrap_or(f64::NAN);
    if !score_value.is_finite() {
        return bad_request("Score must be a number");
    }
    let score = score_value.floor() as i64;
    if score < 1 || score > MAX_SCORE {
        return bad_request("Score out of range");
    }
    let player_id = payload
        .player_id
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| player_id_for_name(&username));

    let entry = LeaderboardEntry {
        player_id,
        username: username.clone(),
        score,
        timestamp: state.clock.now_millis(),
    };
    let outcome = match state.store.upsert_if_better(entry).await {
        Ok(outcome) => outcome,
        Err(error) => return store_failure("Submission failed", error),
    };
    let leaderboard = match state.board(state.settings.max_entries).await {
        Ok(board) => board,
        Err(error) => return store_failure("Submission failed", error),
    };
    if let Err(error) = state.touch_presence(&outcome.entry.player_id, &username).await {
        tracing::warn!(?error, "presence touch after submission failed");
    }
    let active_players = state.active_players().await.unwrap_or_else(|error| {
        tracing::warn!(?error, "active player count unavailable");
        0
    });
    tracing::info!(player_id = %outcome.entry.player_id, score, improved = outcome.improved, "score submitted");

    let response = ScoreSubmissionResponse {
        rank: rank_of(&leaderboard, &username).unwrap_or(0),
        leaderboard,
        improved: outcome.improved,
        entry: outcome.entry,
        active_players,
    };
    (StatusCode::OK, Json(response)).into_response()
}

async fn heartbeat(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<HeartbeatRequest>, JsonRejection>,
) -> Response {
    let Ok(Json(payload)) = payload else {
        return bad_request("Invalid JSON");
    };
    let Some(username) = required_name(payload.username.as_deref()) else {
        return bad_request("Username is required");
    };
    let player_id = payload
        .player_id
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| player_id_for_name(&username));

    let entry = PresenceEntry {
        player_id,
        username,
        last_active_at: state.clock.now_millis(),
        is_playing: payload.is_playing.unwrap_or(true),
    };
    if let Err(error) = state.store.set_presence(entry).await {
        return store_failure("Heartbeat failed", error);
    }
    active_players_response(&state).await
}

async fn leave(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LeaveRequest>, JsonRejection>,
) -> Response {
    let Ok(Json(payload)) = payload else {
        return bad_request("Invalid JSON");
    };
    let player_id = payload
        .player_id
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .or_else(|| required_name(payload.username.as_deref()).map(|name| player_id_for_name(&name)));
    let Some(player_id) = player_id else {
        return bad_request("Username is required");
    };
    if let Err(error) = state.store.remove_presence(&player_id).await {
        return store_failure("Leave failed", error);
    }
    active_players_response(&state).await
}

async fn presence_get(State(state): State<Arc<AppState>>) -> Response {
    match state.presence_view(state.settings.active_window).await {
        Ok(view) => (
            StatusCode::OK,
            Json(PresenceResponse {
                active_players: view.count,
                players: view.entries,
            }),
        )
            .into_response(),
        Err(error) => store_failure("Failed to load presence", error),
    }
}

async fn active_players_response(state: &AppState) -> Response {
    match state.active_players().await {
        Ok(active_players) => (StatusCode::OK, Json(ActivePlayersResponse { active_players })).into_response(),
        Err(error) => store_failure("Failed to count players", error),
    }
}

fn required_name(raw: Option<&str>) -> Option<String> {
    let name = sanitize_player_name(raw?, "");
    (!name.is_empty()).then_some(name)
}

fn bad_request(error: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(error))).into_response()
}

fn store_failure(error: &str, cause: SyncError) -> Response {
    tracing::warn!(?cause, "{error}");
    let status = match cause {
        SyncError::Validation(_) => StatusCode::BAD_REQUEST,
        SyncError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
        SyncError::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ErrorResponse::new(error).with_message(cause.to_string()))).into_response()
}
