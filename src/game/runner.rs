use super::autopilot::choose_direction;
use super::constants::{FRAME_INTERVAL_MS, GAME_OVER_DELAY_MS};
use super::session::{FrameDirective, GameSession, Phase, PlayerIdentity, SessionEvent};
use crate::leaderboard::LeaderboardClient;
use crate::presence::PresenceClient;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};

#[derive(Debug, Clone, PartialEq)]
pub enum RunnerCommand {
    Key(String),
    Swipe { dx: f64, dy: f64 },
    Pause,
    Resume,
    Stop,
}

#[derive(Debug, Clone)]
pub struct RunnerOptions {
    /// Games to play before stopping. 0 plays until a `Stop` command.
    pub games: u32,
    pub autopilot: bool,
    pub frame_interval: Duration,
    pub game_over_delay: Duration,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            games: 0,
            autopilot: false,
            frame_interval: Duration::from_millis(FRAME_INTERVAL_MS),
            game_over_delay: Duration::from_millis(GAME_OVER_DELAY_MS),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub games_played: u32,
    pub best_score: u32,
    pub submitted: u32,
    pub last_rank: Option<usize>,
    pub ticks: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

pub fn command_channel() -> (mpsc::Sender<RunnerCommand>, mpsc::Receiver<RunnerCommand>) {
    mpsc::channel(32)
}

/// Drives a `GameSession` with tokio timers and wires its lifecycle to the
/// leaderboard and presence clients.
///
/// Frames fire on a fixed interval while the game runs. While paused no frames
/// are requested at all; the runner only waits for the next command. Network
/// failures are logged and never interrupt play.
pub struct GameRunner {
    session: GameSession,
    leaderboard: Arc<LeaderboardClient>,
    presence: Arc<PresenceClient>,
    options: RunnerOptions,
    started: Instant,
    summary: RunSummary,
}

impl GameRunner {
    pub fn new(
        session: GameSession,
        leaderboard: Arc<LeaderboardClient>,
        presence: Arc<PresenceClient>,
        options: RunnerOptions,
    ) -> Self {
        Self {
            session,
            leaderboard,
            presence,
            options,
            started: Instant::now(),
            summary: RunSummary::default(),
        }
    }

    pub async fn run(mut self, identity: PlayerIdentity, mut commands: mpsc::Receiver<RunnerCommand>) -> RunSummary {
        if !self.session.login(identity.clone()) {
            tracing::warn!(player_id = %identity.player_id, "session already has a player");
            return self.summary;
        }
        self.session.drain_events();

        if let Err(error) = self.leaderboard.refresh().await {
            tracing::warn!(?error, "initial leaderboard load failed, using cached board");
        }
        match self.presence.announce(&identity.player_id, &identity.username).await {
            Ok(_) => {}
            Err(error) => tracing::warn!(?error, "presence announce failed"),
        }
        self.presence.start();
        self.leaderboard.start_refresh_loop();
        tracing::info!(player_id = %identity.player_id, username = %identity.username, "game started");

        let mut frames = tokio::time::interval(self.options.frame_interval);
        frames.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut commands_open = true;

        loop {
            let command = if self.session.phase() == Phase::Paused {
                match commands.recv().await {
                    Some(command) => Some(command),
                    None => break,
                }
            } else {
                tokio::select! {
                    command = commands.recv(), if commands_open => {
                        if command.is_none() {
                            commands_open = false;
                        }
                        command
                    }
                    _ = frames.tick() => {
                        self.on_frame();
                        None
                    }
                }
            };

            if let Some(command) = command {
                if self.apply(command) == Flow::Stop {
                    break;
                }
            }
            if self.dispatch_events(&identity).await == Flow::Stop {
                break;
            }
        }

        self.shutdown(&identity).await;
        self.summary
    }

    fn on_frame(&mut self) {
        if self.options.autopilot {
            if let Some(direction) = choose_direction(self.session.world()) {
                self.session.queue_direction(direction);
            }
        }
        let timestamp = self.started.elapsed().as_secs_f64() * 1000.0;
        if self.session.frame(timestamp) == FrameDirective::Stop {
            tracing::debug!(phase = ?self.session.phase(), "frames halted");
        }
        self.summary.ticks = self.session.ticks();
    }

    fn apply(&mut self, command: RunnerCommand) -> Flow {
        match command {
            RunnerCommand::Key(key) => {
                self.session.handle_key(&key);
            }
            RunnerCommand::Swipe { dx, dy } => {
                self.session.handle_swipe(dx, dy);
            }
            RunnerCommand::Pause => {
                self.session.pause();
            }
            RunnerCommand::Resume => {
                self.session.resume();
            }
            RunnerCommand::Stop => return Flow::Stop,
        }
        Flow::Continue
    }

    async fn dispatch_events(&mut self, identity: &PlayerIdentity) -> Flow {
        for event in self.session.drain_events() {
            match event {
                SessionEvent::AteFood { score } => tracing::debug!(score, "food eaten"),
                SessionEvent::AteBonus { score } => tracing::debug!(score, "bonus eaten"),
                SessionEvent::BonusSpawned(position) => tracing::debug!(?position, "bonus spawned"),
                SessionEvent::BonusExpired => tracing::debug!("bonus expired"),
                SessionEvent::Paused => {
                    self.presence.stop_heartbeat();
                    tracing::info!("game paused");
                }
                SessionEvent::Resumed => {
                    if let Err(error) = self.presence.heartbeat().await {
                        tracing::warn!(?error, "presence heartbeat failed");
                    }
                    self.presence.start_heartbeat();
                    tracing::info!("game resumed");
                }
                SessionEvent::GameOver { score, cause } => {
                    tracing::info!(score, ?cause, ticks = self.session.ticks(), "game over");
                    self.summary.games_played += 1;
                    self.summary.best_score = self.summary.best_score.max(score);
                    self.summary.ticks = self.session.ticks();
                    self.finish_game(identity, score).await;

                    let games = self.options.games;
                    if games > 0 && self.summary.games_played >= games {
                        return Flow::Stop;
                    }
                    tokio::time::sleep(self.options.game_over_delay).await;
                    self.session.restart();
                    if let Err(error) = self.presence.set_playing(true).await {
                        tracing::warn!(?error, "presence status update failed");
                    }
                }
                SessionEvent::Started | SessionEvent::Restarted | SessionEvent::Stopped => {}
            }
        }
        Flow::Continue
    }

    async fn finish_game(&mut self, identity: &PlayerIdentity, score: u32) {
        if let Err(error) = self.presence.set_playing(false).await {
            tracing::warn!(?error, "presence status update failed");
        }
        let score = i64::from(score);
        if !self.leaderboard.is_high_score(&identity.username, score) {
            return;
        }
        match self
            .leaderboard
            .submit_score(&identity.player_id, &identity.username, score)
            .await
        {
            Ok(outcome) => {
                self.summary.submitted += 1;
                self.summary.last_rank = outcome.rank;
                tracing::info!(score, rank = ?outcome.rank, synced = outcome.synced, "score saved");
            }
            Err(error) => tracing::warn!(?error, score, "score was not saved"),
        }
    }

    async fn shutdown(&mut self, identity: &PlayerIdentity) {
        self.summary.ticks = self.session.ticks();
        self.leaderboard.stop_refresh_loop();
        self.presence.stop();
        if let Err(error) = self.presence.leave(&identity.player_id).await {
            tracing::warn!(?error, "presence leave failed");
        }
        self.session.cleanup();
        tracing::info!(
            games = self.summary.games_played,
            best = self.summary.best_score,
            "session finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::time::ManualClock;
    use crate::game::types::GridSize;
    use crate::leaderboard::LeaderboardOptions;
    use crate::presence::PresenceOptions;
    use crate::store::{MemoryStore, RemoteStore};

    struct Harness {
        store: Arc<MemoryStore>,
        leaderboard: Arc<LeaderboardClient>,
        presence: Arc<PresenceClient>,
        clock: Arc<ManualClock>,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(1_000_000));
        let leaderboard = Arc::new(LeaderboardClient::new(
            store.clone(),
            clock.clone(),
            LeaderboardOptions::default(),
        ));
        let presence = Arc::new(PresenceClient::new(store.clone(), clock.clone(), PresenceOptions::default()));
        Harness {
            store,
            leaderboard,
            presence,
            clock,
        }
    }

    fn identity() -> PlayerIdentity {
        PlayerIdentity {
            player_id: "p1".to_string(),
            username: "Eve".to_string(),
        }
    }

    fn runner(harness: &Harness, grid: GridSize, options: RunnerOptions) -> GameRunner {
        let session = GameSession::new(grid, 3, harness.clock.clone());
        GameRunner::new(session, harness.leaderboard.clone(), harness.presence.clone(), options)
    }

    #[tokio::test(start_paused = true)]
    async fn plays_the_requested_games_and_leaves() {
        let harness = harness();
        let options = RunnerOptions {
            games: 2,
            ..RunnerOptions::default()
        };
        let (_commands, receiver) = command_channel();
        let summary = runner(&harness, GridSize::new(12, 12), options)
            .run(identity(), receiver)
            .await;

        assert_eq!(summary.games_played, 2);
        assert_eq!(summary.best_score, 0);
        assert_eq!(summary.submitted, 0);
        assert_eq!(summary.ticks, 4);
        assert!(harness.store.list_presence().await.unwrap().is_empty());
        assert!(harness.store.get_top(10).await.unwrap().is_empty());
        assert!(!harness.presence.is_heartbeat_running());
    }

    #[tokio::test(start_paused = true)]
    async fn pause_stops_frames_and_heartbeat() {
        let harness = harness();
        let (commands, receiver) = command_channel();
        let task = tokio::spawn(runner(&harness, GridSize::new(30, 20), RunnerOptions::default()).run(identity(), receiver));

        commands.send(RunnerCommand::Pause).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!harness.presence.is_heartbeat_running());
        let listed = harness.store.list_presence().await.unwrap();
        assert_eq!(listed.len(), 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        commands.send(RunnerCommand::Key(" ".to_string())).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(harness.presence.is_heartbeat_running());

        commands.send(RunnerCommand::Stop).await.unwrap();
        let summary = task.await.unwrap();
        assert_eq!(summary.games_played, 0);
        assert!(summary.ticks >= 3 && summary.ticks < 10, "ticks: {}", summary.ticks);
        assert!(harness.store.list_presence().await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn autopilot_scores_reach_the_leaderboard() {
        let harness = harness();
        let options = RunnerOptions {
            games: 1,
            autopilot: true,
            ..RunnerOptions::default()
        };
        let (commands, receiver) = command_channel();
        let stopper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3_600)).await;
            let _ = commands.send(RunnerCommand::Stop).await;
        });
        let summary = runner(&harness, GridSize::new(10, 10), options)
            .run(identity(), receiver)
            .await;
        stopper.abort();

        assert!(summary.games_played <= 1);
        assert!(summary.best_score > 0);
        assert_eq!(summary.submitted, 1);
        assert_eq!(summary.last_rank, Some(1));
        assert_eq!(harness.leaderboard.player_best("eve"), Some(i64::from(summary.best_score)));
        assert_eq!(harness.store.get_top(10).await.unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn offline_store_keeps_scores_locally_and_play_continues() {
        let harness = harness();
        harness.store.set_offline(true);
        let options = RunnerOptions {
            games: 2,
            autopilot: true,
            ..RunnerOptions::default()
        };
        let (commands, receiver) = command_channel();
        let stopper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3_600)).await;
            let _ = commands.send(RunnerCommand::Stop).await;
        });
        let summary = runner(&harness, GridSize::new(10, 10), options)
            .run(identity(), receiver)
            .await;
        stopper.abort();

        assert_eq!(summary.games_played, 2);
        assert!(summary.best_score > 0);
        assert!(summary.submitted >= 1);
        assert_eq!(harness.leaderboard.pending_count().await, 1);
        assert_eq!(harness.leaderboard.player_best("Eve"), Some(i64::from(summary.best_score)));

        harness.store.set_offline(false);
        assert!(harness.store.get_top(10).await.unwrap().is_empty());
    }
}
