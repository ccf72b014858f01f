use super::constants::{BONUS_LIFETIME_MS, BONUS_RESPAWN_MAX_MS, BONUS_RESPAWN_MIN_MS, MAX_SPAWN_ATTEMPTS};
use super::types::{GridSize, Position};
use rand::Rng;

/// Uniformly random cell for which `blocked` is false. Falls back to a scan
/// from a random offset once random probing gives up, and returns `None` only
/// when every cell is blocked.
pub fn random_free_cell<R: Rng, F: Fn(Position) -> bool>(
    rng: &mut R,
    grid: GridSize,
    blocked: F,
) -> Option<Position> {
    for _ in 0..MAX_SPAWN_ATTEMPTS {
        let candidate = Position::new(rng.gen_range(0..grid.cols), rng.gen_range(0..grid.rows));
        if !blocked(candidate) {
            return Some(candidate);
        }
    }

    let total = grid.cell_count();
    let offset = rng.gen_range(0..total);
    (0..total)
        .map(|index| (index + offset) % total)
        .map(|index| Position::new((index as i32) % grid.cols, (index as i32) / grid.cols))
        .find(|candidate| !blocked(*candidate))
}

#[derive(Debug, Clone)]
pub struct Food {
    pub position: Position,
}

impl Food {
    pub fn new(position: Position) -> Self {
        Self { position }
    }

    /// Moves the food to a free cell. A full grid leaves it where it is.
    pub fn respawn<R: Rng, F: Fn(Position) -> bool>(&mut self, rng: &mut R, grid: GridSize, blocked: F) -> bool {
        match random_free_cell(rng, grid, blocked) {
            Some(position) => {
                self.position = position;
                true
            }
            None => false,
        }
    }
}

/// Time-limited food. Runs on the wall clock, not on the tick clock.
#[derive(Debug, Clone)]
pub struct BonusFood {
    pub position: Position,
    pub active: bool,
    pub expires_at: i64,
    pub next_spawn_at: Option<i64>,
}

impl BonusFood {
    pub fn new() -> Self {
        Self {
            position: Position::new(0, 0),
            active: false,
            expires_at: 0,
            next_spawn_at: None,
        }
    }

    pub fn schedule_next<R: Rng>(&mut self, rng: &mut R, now: i64) {
        let delay = rng.gen_range(BONUS_RESPAWN_MIN_MS..BONUS_RESPAWN_MAX_MS);
        self.next_spawn_at = Some(now + delay);
    }

    pub fn spawn_due(&self, now: i64) -> bool {
        !self.active && self.next_spawn_at.is_some_and(|at| now >= at)
    }

    pub fn spawn_at(&mut self, position: Position, now: i64) {
        self.position = position;
        self.active = true;
        self.expires_at = now + BONUS_LIFETIME_MS;
        self.next_spawn_at = None;
    }

    /// Deactivates an uneaten bonus once its lifetime is over.
    pub fn maybe_expire(&mut self, now: i64) -> bool {
        if self.active && now >= self.expires_at {
            self.active = false;
            return true;
        }
        false
    }

    pub fn is_at(&self, position: Position) -> bool {
        self.active && self.position == position
    }

    pub fn consume(&mut self) {
        self.active = false;
    }

    pub fn clear(&mut self) {
        *self = BonusFood::new();
    }
}

impl Default for BonusFood {
    fn default() -> Self {
        Self::new()
    }
}
