use super::constants::{
  BONUS_COLOR, BONUS_GROWTH, BONUS_POINTS, CELL_SIZE, EXPLOSION_PARTICLES, FOOD_COLOR, START_X, START_Y,
};
use super::food::{random_free_cell, BonusFood, Food};
use super::particles::ParticleSystem;
use super::score::ScoreTracker;
use super::snake::Snake;
use super::types::{CollisionKind, Direction, GridSize, Position};
use rand::rngs::StdRng;
use rand::SeedableRng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
  Moved,
  AteFood { score: u32 },
  AteBonus { score: u32 },
  Collided(CollisionKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
  BonusSpawned(Position),
  BonusExpired,
}

/// Snake, food, bonus food, score and particles on one integer grid.
///
/// `tick` is the only thing that moves the snake and it never reads a clock.
/// Bonus spawning and expiry go through `update_timers`, which takes the wall
/// clock as an argument, so both clocks can be driven independently in tests.
#[derive(Debug)]
pub struct World {
  grid: GridSize,
  origin: Position,
  snake: Snake,
  food: Food,
  bonus: BonusFood,
  score: ScoreTracker,
  particles: ParticleSystem,
  rng: StdRng,
}

impl World {
  pub fn new(grid: GridSize, seed: u64) -> Self {
    let origin = Position::new(START_X.min(grid.cols - 1), START_Y.min(grid.rows - 1));
    let mut world = Self {
      grid,
      origin,
      snake: Snake::new(origin, Direction::Right),
      food: Food::new(origin),
      bonus: BonusFood::new(),
      score: ScoreTracker::default(),
      particles: ParticleSystem::new(),
      rng: StdRng::seed_from_u64(seed),
    };
    world.respawn_food();
    world
  }

  pub fn grid(&self) -> GridSize {
    self.grid
  }

  pub fn snake(&self) -> &Snake {
    &self.snake
  }

  pub fn snake_mut(&mut self) -> &mut Snake {
    &mut self.snake
  }

  pub fn food(&self) -> &Food {
    &self.food
  }

  pub fn bonus(&self) -> &BonusFood {
    &self.bonus
  }

  pub fn score(&self) -> u32 {
    self.score.value()
  }

  pub fn best_score(&self) -> u32 {
    self.score.best()
  }

  pub fn particles(&self) -> &ParticleSystem {
    &self.particles
  }

  pub fn place_food(&mut self, position: Position) {
    self.food.position = position;
  }

  pub fn place_bonus(&mut self, position: Position, now: i64) {
    self.bonus.spawn_at(position, now);
  }

  pub fn replace_snake(&mut self, snake: Snake) {
    self.snake = snake;
  }

  /// One simulation step.
  pub fn tick(&mut self) -> TickOutcome {
    self.snake.advance();

    if self.snake.out_of_bounds(self.grid) {
      return TickOutcome::Collided(CollisionKind::Wall);
    }
    if self.snake.hits_self() {
      return TickOutcome::Collided(CollisionKind::SelfHit);
    }

    let head = self.snake.head();
    if self.bonus.is_at(head) {
      self.bonus.consume();
      self.snake.grow_by(BONUS_GROWTH);
      self.score.add(BONUS_POINTS);
      self.burst(head, BONUS_COLOR);
      return TickOutcome::AteBonus {
        score: self.score.value(),
      };
    }

    if self.food.position == head {
      self.snake.grow();
      self.score.increment();
      self.respawn_food();
      self.burst(head, FOOD_COLOR);
      return TickOutcome::AteFood {
        score: self.score.value(),
      };
    }

    TickOutcome::Moved
  }

  /// Wall-clock driven bonus lifecycle: expiry, scheduling and spawning.
  pub fn update_timers(&mut self, now: i64) -> Option<TimerEvent> {
    let expired = self.bonus.maybe_expire(now);
    if expired {
      self.bonus.next_spawn_at = None;
    }
    if !self.bonus.active && self.bonus.next_spawn_at.is_none() {
      self.bonus.schedule_next(&mut self.rng, now);
    }
    if expired {
      return Some(TimerEvent::BonusExpired);
    }

    if self.bonus.spawn_due(now) {
      let snake = &self.snake;
      let food = self.food.position;
      let spot = random_free_cell(&mut self.rng, self.grid, |cell| cell == food || snake.occupies(cell));
      match spot {
        Some(position) => {
          self.bonus.spawn_at(position, now);
          return Some(TimerEvent::BonusSpawned(position));
        }
        None => self.bonus.schedule_next(&mut self.rng, now),
      }
    }
    None
  }

  pub fn update_particles(&mut self, dt_ms: f64) {
    self.particles.update(dt_ms);
  }

  pub fn reset(&mut self) {
    self.snake.reset(self.origin, Direction::Right);
    self.score.reset();
    self.bonus.clear();
    self.particles.clear();
    self.respawn_food();
  }

  fn respawn_food(&mut self) {
    let snake = &self.snake;
    let bonus = &self.bonus;
    self
      .food
      .respawn(&mut self.rng, self.grid, |cell| snake.occupies(cell) || bonus.is_at(cell));
  }

  fn burst(&mut self, cell: Position, color: &'static str) {
    let x = (cell.x as f64 + 0.5) * CELL_SIZE;
    let y = (cell.y as f64 + 0.5) * CELL_SIZE;
    self
      .particles
      .spawn_explosion(&mut self.rng, x, y, EXPLOSION_PARTICLES, color);
  }
}
