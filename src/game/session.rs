use super::constants::{BONUS_SLOWDOWN_EXTRA_MS, BONUS_SLOWDOWN_MS};
use super::input::{parse_key, swipe_direction, KeyCommand};
use super::score::tick_interval_for_score;
use super::types::{CollisionKind, Direction, GridSize, Position};
use super::world::{TickOutcome, TimerEvent, World};
use crate::app::time::Clock;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    Running,
    Paused,
    GameOver,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerIdentity {
    pub player_id: String,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Started,
    AteFood { score: u32 },
    AteBonus { score: u32 },
    BonusSpawned(Position),
    BonusExpired,
    GameOver { score: u32, cause: CollisionKind },
    Paused,
    Resumed,
    Restarted,
    Stopped,
}

/// Tells the host whether to schedule another render frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDirective {
    Continue,
    Stop,
}

/// Game loop controller for one player.
///
/// Render frames arrive at whatever rate the host produces them; their elapsed
/// time feeds an accumulator and at most one simulation tick runs per frame,
/// once the accumulator reaches the current tick interval. The accumulator is
/// zeroed after every tick, so a long frame never produces a burst of ticks.
#[derive(Debug)]
pub struct GameSession {
    world: World,
    phase: Phase,
    player: Option<PlayerIdentity>,
    clock: Arc<dyn Clock>,
    accumulator_ms: f64,
    last_frame_at: Option<f64>,
    slowdown_until: Option<i64>,
    ticks: u64,
    events: Vec<SessionEvent>,
}

impl GameSession {
    pub fn new(grid: GridSize, seed: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            world: World::new(grid, seed),
            phase: Phase::Idle,
            player: None,
            clock,
            accumulator_ms: 0.0,
            last_frame_at: None,
            slowdown_until: None,
            ticks: 0,
            events: Vec::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn player(&self) -> Option<&PlayerIdentity> {
        self.player.as_ref()
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn score(&self) -> u32 {
        self.world.score()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    /// Idle -> Running. Ignored once a player is logged in.
    pub fn login(&mut self, identity: PlayerIdentity) -> bool {
        if self.phase != Phase::Idle {
            return false;
        }
        self.player = Some(identity);
        self.reset_run();
        self.phase = Phase::Running;
        self.events.push(SessionEvent::Started);
        true
    }

    /// Score-derived interval, lengthened while a bonus slowdown is running.
    pub fn tick_interval_ms(&self) -> u64 {
        let base = tick_interval_for_score(self.world.score());
        match self.slowdown_until {
            Some(until) if self.clock.now_millis() < until => base + BONUS_SLOWDOWN_EXTRA_MS,
            _ => base,
        }
    }

    /// Render callback. `timestamp_ms` is the host's monotonic frame time.
    pub fn frame(&mut self, timestamp_ms: f64) -> FrameDirective {
        if self.phase != Phase::Running {
            return FrameDirective::Stop;
        }

        let last = self.last_frame_at.unwrap_or(timestamp_ms);
        let delta = (timestamp_ms - last).max(0.0);
        self.last_frame_at = Some(timestamp_ms);

        let now = self.clock.now_millis();
        match self.world.update_timers(now) {
            Some(TimerEvent::BonusSpawned(position)) => self.events.push(SessionEvent::BonusSpawned(position)),
            Some(TimerEvent::BonusExpired) => self.events.push(SessionEvent::BonusExpired),
            None => {}
        }
        self.world.update_particles(delta);

        self.accumulator_ms += delta;
        if self.accumulator_ms >= self.tick_interval_ms() as f64 {
            self.accumulator_ms = 0.0;
            self.step(now);
        }

        if self.phase == Phase::Running {
            FrameDirective::Continue
        } else {
            FrameDirective::Stop
        }
    }

    fn step(&mut self, now: i64) {
        self.ticks += 1;
        match self.world.tick() {
            TickOutcome::Moved => {}
            TickOutcome::AteFood { score } => self.events.push(SessionEvent::AteFood { score }),
            TickOutcome::AteBonus { score } => {
                // A newer pickup replaces the running slowdown window.
                self.slowdown_until = Some(now + BONUS_SLOWDOWN_MS);
                self.events.push(SessionEvent::AteBonus { score });
            }
            TickOutcome::Collided(cause) => {
                self.phase = Phase::GameOver;
                self.events.push(SessionEvent::GameOver {
                    score: self.world.score(),
                    cause,
                });
            }
        }
    }

    pub fn queue_direction(&mut self, direction: Direction) -> bool {
        if self.phase != Phase::Running {
            return false;
        }
        self.world.snake_mut().queue_turn(direction)
    }

    pub fn handle_key(&mut self, key: &str) -> bool {
        match parse_key(key) {
            Some(KeyCommand::TogglePause) => self.toggle_pause(),
            Some(KeyCommand::Turn(direction)) => self.queue_direction(direction),
            None => false,
        }
    }

    pub fn handle_swipe(&mut self, dx: f64, dy: f64) -> bool {
        match swipe_direction(dx, dy) {
            Some(direction) => self.queue_direction(direction),
            None => false,
        }
    }

    pub fn pause(&mut self) -> bool {
        if self.phase != Phase::Running {
            return false;
        }
        self.phase = Phase::Paused;
        self.events.push(SessionEvent::Paused);
        true
    }

    /// Paused -> Running. The accumulator keeps its progress but time spent
    /// paused is not added to it.
    pub fn resume(&mut self) -> bool {
        if self.phase != Phase::Paused {
            return false;
        }
        self.phase = Phase::Running;
        self.last_frame_at = None;
        self.events.push(SessionEvent::Resumed);
        true
    }

    pub fn toggle_pause(&mut self) -> bool {
        match self.phase {
            Phase::Running => self.pause(),
            Phase::Paused => self.resume(),
            _ => false,
        }
    }

    /// New game for the same player. Not available before login.
    pub fn restart(&mut self) -> bool {
        if self.phase == Phase::Idle {
            return false;
        }
        self.reset_run();
        self.phase = Phase::Running;
        self.events.push(SessionEvent::Restarted);
        true
    }

    /// Back to Idle, e.g. on logout or navigation away.
    pub fn cleanup(&mut self) {
        if self.phase == Phase::Idle {
            return;
        }
        self.phase = Phase::Idle;
        self.player = None;
        self.accumulator_ms = 0.0;
        self.last_frame_at = None;
        self.slowdown_until = None;
        self.events.push(SessionEvent::Stopped);
    }

    fn reset_run(&mut self) {
        self.world.reset();
        self.accumulator_ms = 0.0;
        self.last_frame_at = None;
        self.slowdown_until = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::time::ManualClock;
    use crate::game::constants::{GRID_COLS, GRID_ROWS};

    fn make_session() -> (GameSession, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(0));
        let session = GameSession::new(GridSize::new(GRID_COLS, GRID_ROWS), 21, clock.clone());
        (session, clock)
    }

    fn identity() -> PlayerIdentity {
        PlayerIdentity {
            player_id: "p1".to_string(),
            username: "Eve".to_string(),
        }
    }

    #[test]
    fn frames_do_nothing_before_login() {
        let (mut session, _) = make_session();
        assert_eq!(session.frame(0.0), FrameDirective::Stop);
        assert_eq!(session.phase(), Phase::Idle);
        assert!(!session.restart());
    }

    #[test]
    fn accumulator_gates_ticks_to_interval() {
        let (mut session, _) = make_session();
        session.login(identity());
        session.world_mut().place_food(Position::new(0, 0));

        session.frame(0.0);
        for step in 1..12 {
            session.frame(step as f64 * 16.0);
        }
        assert_eq!(session.ticks(), 0);

        session.frame(208.0);
        assert_eq!(session.ticks(), 1);
        assert_eq!(session.world().snake().head(), Position::new(11, 10));

        session.frame(224.0);
        assert_eq!(session.ticks(), 1);
    }

    #[test]
    fn long_frame_runs_a_single_tick() {
        let (mut session, _) = make_session();
        session.login(identity());
        session.world_mut().place_food(Position::new(0, 0));
        session.frame(0.0);
        session.frame(5_000.0);
        assert_eq!(session.ticks(), 1);
    }

    #[test]
    fn eating_food_shrinks_tick_interval() {
        let (mut session, _) = make_session();
        session.login(identity());
        session.world_mut().place_food(Position::new(11, 10));
        session.frame(0.0);
        session.frame(200.0);
        assert_eq!(session.score(), 1);
        assert_eq!(session.tick_interval_ms(), 195);
        assert!(session.drain_events().contains(&SessionEvent::AteFood { score: 1 }));
    }

    #[test]
    fn bonus_slowdown_lasts_two_seconds_and_is_replaced_not_stacked() {
        let (mut session, clock) = make_session();
        session.login(identity());
        session.world_mut().place_food(Position::new(0, 0));
        session.world_mut().place_bonus(Position::new(11, 10), 0);

        session.frame(0.0);
        session.frame(200.0);
        assert_eq!(session.score(), 5);
        assert_eq!(session.tick_interval_ms(), 175 + BONUS_SLOWDOWN_EXTRA_MS);

        clock.set(1_500);
        session.world_mut().place_bonus(Position::new(12, 10), 1_500);
        session.frame(200.0 + 235.0);
        assert_eq!(session.score(), 10);
        assert_eq!(session.tick_interval_ms(), 150 + BONUS_SLOWDOWN_EXTRA_MS);

        clock.set(3_000);
        assert_eq!(session.tick_interval_ms(), 150 + BONUS_SLOWDOWN_EXTRA_MS);
        clock.set(3_500);
        assert_eq!(session.tick_interval_ms(), 150);
    }

    #[test]
    fn pause_stops_frames_and_resume_discards_paused_time() {
        let (mut session, _) = make_session();
        session.login(identity());
        session.world_mut().place_food(Position::new(0, 0));
        session.frame(0.0);
        session.frame(150.0);

        assert!(session.handle_key(" "));
        assert_eq!(session.phase(), Phase::Paused);
        assert_eq!(session.frame(10_000.0), FrameDirective::Stop);
        assert!(!session.queue_direction(Direction::Up));
        assert_eq!(session.ticks(), 0);

        assert!(session.resume());
        session.frame(20_000.0);
        session.frame(20_040.0);
        assert_eq!(session.ticks(), 0);
        session.frame(20_060.0);
        assert_eq!(session.ticks(), 1);
    }

    #[test]
    fn collision_ends_game_and_restart_resets() {
        let (mut session, _) = make_session();
        session.login(identity());
        session.world_mut().place_food(Position::new(0, 0));
        assert!(session.handle_key("ArrowUp"));

        let mut timestamp = 0.0;
        session.frame(timestamp);
        while session.phase() == Phase::Running {
            timestamp += 200.0;
            session.frame(timestamp);
        }

        assert_eq!(session.phase(), Phase::GameOver);
        assert_eq!(session.world().snake().head(), Position::new(10, -1));
        let events = session.drain_events();
        assert!(events.contains(&SessionEvent::GameOver {
            score: 0,
            cause: CollisionKind::Wall,
        }));
        assert_eq!(session.frame(timestamp + 200.0), FrameDirective::Stop);

        assert!(session.restart());
        assert_eq!(session.phase(), Phase::Running);
        assert_eq!(session.world().snake().head(), Position::new(10, 10));
        assert_eq!(session.tick_interval_ms(), 200);
    }

    #[test]
    fn cleanup_returns_to_idle() {
        let (mut session, _) = make_session();
        session.login(identity());
        session.cleanup();
        assert_eq!(session.phase(), Phase::Idle);
        assert!(session.player().is_none());
        assert!(session.login(identity()));
    }
}
