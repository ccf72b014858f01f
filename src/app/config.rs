use anyhow::{bail, Context};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:3000/api";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    Server,
    Autoplay,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub mode: AppMode,
    pub port: u16,
    pub database_url: String,
    pub production: bool,
    pub allowed_origins: Vec<String>,
    pub leaderboard: LeaderboardSettings,
    pub presence: PresenceSettings,
    pub network: NetworkSettings,
    pub autoplay: AutoplaySettings,
}

#[derive(Debug, Clone)]
pub struct LeaderboardSettings {
    pub max_entries: usize,
    pub refresh_interval: Duration,
    pub snapshot_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct PresenceSettings {
    /// Records touched within this window count as active players.
    pub active_window: Duration,
    /// Records untouched for this long are deleted by the sweep.
    pub sweep_after: Duration,
    pub sweep_interval: Duration,
    pub heartbeat_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct NetworkSettings {
    pub request_timeout: Duration,
    pub retry_attempts: u32,
    pub retry_delay: Duration,
}

#[derive(Debug, Clone)]
pub struct AutoplaySettings {
    pub api_base_url: String,
    pub player_name: String,
    pub player_id: Option<String>,
    pub games: u32,
    pub seed: Option<u64>,
}

impl Default for LeaderboardSettings {
    fn default() -> Self {
        Self {
            max_entries: 10,
            refresh_interval: Duration::from_secs(10),
            snapshot_path: None,
        }
    }
}

impl Default for PresenceSettings {
    fn default() -> Self {
        Self {
            active_window: Duration::from_secs(30),
            sweep_after: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(60),
            heartbeat_interval: Duration::from_secs(30),
        }
    }
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_millis(2500),
            retry_attempts: 2,
            retry_delay: Duration::from_millis(500),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let mode = match env::var("APP_MODE").ok().as_deref().map(str::trim) {
            None | Some("") | Some("server") => AppMode::Server,
            Some("autoplay") => AppMode::Autoplay,
            Some(other) => bail!("APP_MODE must be 'server' or 'autoplay', got '{other}'"),
        };

        let production = env::var("APP_ENV")
            .or_else(|_| env::var("NODE_ENV"))
            .map(|value| value.trim().eq_ignore_ascii_case("production"))
            .unwrap_or(false);

        let allowed_origins = match env::var("ALLOWED_ORIGINS") {
            Ok(raw) if !raw.trim().is_empty() => parse_origin_list("ALLOWED_ORIGINS", &raw)?,
            _ => default_allowed_origins(),
        };

        let database_url = env::var("DATABASE_URL").unwrap_or_else(|_| {
            let base = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            let default_path = base.join("data").join("leaderboard.db");
            format!("sqlite://{}", default_path.display())
        });

        let leaderboard = LeaderboardSettings {
            max_entries: env_parse("LEADERBOARD_MAX_ENTRIES", 10usize).clamp(1, 100),
            refresh_interval: Duration::from_secs(env_parse("LEADERBOARD_REFRESH_SECS", 10u64)),
            snapshot_path: Some(
                env::var("SNAPSHOT_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("data").join("snakeLeaderboard.json")),
            ),
        };

        let presence = PresenceSettings {
            active_window: Duration::from_secs(env_parse("PRESENCE_ACTIVE_WINDOW_SECS", 30u64)),
            sweep_after: Duration::from_secs(env_parse("PRESENCE_SWEEP_AFTER_SECS", 300u64)),
            sweep_interval: Duration::from_secs(env_parse("PRESENCE_SWEEP_INTERVAL_SECS", 60u64)),
            heartbeat_interval: Duration::from_secs(env_parse("HEARTBEAT_INTERVAL_SECS", 30u64)),
        };

        let network = NetworkSettings {
            request_timeout: Duration::from_millis(env_parse("REQUEST_TIMEOUT_MS", 2500u64)),
            retry_attempts: env_parse("RETRY_ATTEMPTS", 2u32),
            retry_delay: Duration::from_millis(env_parse("RETRY_DELAY_MS", 500u64)),
        };

        let autoplay = AutoplaySettings {
            api_base_url: env::var("API_BASE_URL")
                .map(|value| value.trim().trim_end_matches('/').to_string())
                .ok()
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
            player_name: env::var("PLAYER_NAME").unwrap_or_else(|_| "Autopilot".to_string()),
            player_id: env::var("PLAYER_ID")
                .ok()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
            games: env_parse("AUTOPLAY_GAMES", 3u32),
            seed: env::var("GAME_SEED")
                .ok()
                .map(|value| {
                    value
                        .trim()
                        .parse::<u64>()
                        .with_context(|| format!("GAME_SEED has invalid value '{value}'"))
                })
                .transpose()?,
        };

        Ok(Self {
            mode,
            port: env_parse("PORT", DEFAULT_PORT),
            database_url,
            production,
            allowed_origins,
            leaderboard,
            presence,
            network,
            autoplay,
        })
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn default_allowed_origins() -> Vec<String> {
    [
        "http://localhost:3000",
        "http://localhost:9000",
        "http://127.0.0.1:3000",
        "http://127.0.0.1:9000",
    ]
    .iter()
    .map(|origin| origin.to_string())
    .collect()
}

pub fn parse_origin_list(var_name: &str, raw: &str) -> anyhow::Result<Vec<String>> {
    let mut origins = Vec::new();
    for token in raw.split(',') {
        let trimmed = token.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            bail!("{var_name} contains an empty origin segment");
        }
        if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
            bail!("{var_name} has invalid origin '{trimmed}'");
        }
        let origin = trimmed.to_string();
        if !origins.contains(&origin) {
            origins.push(origin);
        }
    }
    Ok(origins)
}
