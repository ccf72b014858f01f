pub const GRID_COLS: i32 = 30;
pub const GRID_ROWS: i32 = 20;
pub const CELL_SIZE: f64 = 20.0;
pub const START_X: i32 = 10;
pub const START_Y: i32 = 10;

pub const BASE_TICK_MS: u64 = 200;
pub const MIN_TICK_MS: u64 = 80;
pub const TICK_STEP_PER_POINT_MS: u64 = 5;

pub const FOOD_POINTS: u32 = 1;
pub const BONUS_POINTS: u32 = 5;
pub const BONUS_GROWTH: u32 = 5;
pub const BONUS_LIFETIME_MS: i64 = 8000;
pub const BONUS_RESPAWN_MIN_MS: i64 = 8000;
pub const BONUS_RESPAWN_MAX_MS: i64 = 16000;
pub const BONUS_SLOWDOWN_MS: i64 = 2000;
pub const BONUS_SLOWDOWN_EXTRA_MS: u64 = 60;

pub const GAME_OVER_DELAY_MS: u64 = 500;
pub const FRAME_INTERVAL_MS: u64 = 16;
pub const MAX_SPAWN_ATTEMPTS: usize = 64;

pub const EXPLOSION_PARTICLES: usize = 20;
pub const PARTICLE_GRAVITY: f64 = 0.0015;
pub const PARTICLE_FRICTION: f64 = 0.98;
pub const PARTICLE_MIN_ALPHA: f64 = 0.01;
pub const SWIPE_MIN_DISTANCE: f64 = 30.0;

pub const FOOD_COLOR: &str = "rgba(255,100,100,1)";
pub const BONUS_COLOR: &str = "rgba(255,215,0,1)";
