use anyhow::Context;
use snake_arcade::app::config::{AppConfig, AppMode};
use snake_arcade::app::time::{Clock, SystemClock};
use snake_arcade::game::constants::{GRID_COLS, GRID_ROWS};
use snake_arcade::game::runner::{command_channel, GameRunner, RunnerCommand, RunnerOptions};
use snake_arcade::game::session::{GameSession, PlayerIdentity};
use snake_arcade::game::types::GridSize;
use snake_arcade::leaderboard::{LeaderboardClient, LeaderboardOptions};
use snake_arcade::presence::{PresenceClient, PresenceOptions};
use snake_arcade::server;
use snake_arcade::shared::names::sanitize_player_name;
use snake_arcade::store::{HttpStore, RemoteStore};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .init();

  let config = AppConfig::from_env()?;
  match config.mode {
    AppMode::Server => server::run_server(&config).await,
    AppMode::Autoplay => autoplay(&config).await,
  }
}

/// Headless client: plays with the autopilot against a running server and
/// submits qualifying scores.
async fn autoplay(config: &AppConfig) -> anyhow::Result<()> {
  let settings = &config.autoplay;
  let store: Arc<dyn RemoteStore> = Arc::new(
    HttpStore::new(&settings.api_base_url, config.network.request_timeout)
      .with_context(|| format!("failed to build client for {}", settings.api_base_url))?,
  );
  let clock: Arc<dyn Clock> = Arc::new(SystemClock);

  let leaderboard = Arc::new(LeaderboardClient::new(
    Arc::clone(&store),
    Arc::clone(&clock),
    LeaderboardOptions::from_config(config),
  ));
  match leaderboard.restore_snapshot().await {
    Ok(true) => tracing::info!(pending = leaderboard.pending_count().await, "restored leaderboard snapshot"),
    Ok(false) => {}
    Err(error) => tracing::warn!(?error, "ignoring unreadable leaderboard snapshot"),
  }
  let presence = Arc::new(PresenceClient::new(
    Arc::clone(&store),
    Arc::clone(&clock),
    PresenceOptions::from_config(config),
  ));

  let identity = PlayerIdentity {
    player_id: settings
      .player_id
      .clone()
      .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
    username: sanitize_player_name(&settings.player_name, "Autopilot"),
  };
  let seed = settings.seed.unwrap_or_else(rand::random);
  tracing::info!(base_url = %settings.api_base_url, seed, games = settings.games, "starting autoplay");

  let session = GameSession::new(GridSize::new(GRID_COLS, GRID_ROWS), seed, Arc::clone(&clock));
  let runner = GameRunner::new(
    session,
    leaderboard,
    presence,
    RunnerOptions {
      games: settings.games,
      autopilot: true,
      ..RunnerOptions::default()
    },
  );

  let (commands, receiver) = command_channel();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      tracing::info!("interrupt received, stopping");
      let _ = commands.send(RunnerCommand::Stop).await;
    }
  });

  let summary = runner.run(identity, receiver).await;
  tracing::info!(
    games = summary.games_played,
    best = summary.best_score,
    submitted = summary.submitted,
    rank = ?summary.last_rank,
    ticks = summary.ticks,
    "autoplay finished"
  );
  Ok(())
}
