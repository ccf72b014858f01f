use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
  pub x: i32,
  pub y: i32,
}

impl Position {
  pub fn new(x: i32, y: i32) -> Self {
    Self { x, y }
  }

  pub fn step(self, direction: Direction) -> Self {
    let (dx, dy) = direction.delta();
    Self {
      x: self.x + dx,
      y: self.y + dy,
    }
  }

  pub fn manhattan(self, other: Position) -> i32 {
    (self.x - other.x).abs() + (self.y - other.y).abs()
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
  Up,
  Down,
  Left,
  Right,
}

impl Direction {
  pub const ALL: [Direction; 4] = [Direction::Up, Direction::Down, Direction::Left, Direction::Right];

  /// Screen coordinates: y grows downward.
  pub fn delta(self) -> (i32, i32) {
    match self {
      Direction::Up => (0, -1),
      Direction::Down => (0, 1),
      Direction::Left => (-1, 0),
      Direction::Right => (1, 0),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridSize {
  pub cols: i32,
  pub rows: i32,
}

impl GridSize {
  pub fn new(cols: i32, rows: i32) -> Self {
    Self {
      cols: cols.max(1),
      rows: rows.max(1),
    }
  }

  /// Grid derived from a canvas size and a cell size in pixels.
  pub fn from_canvas(width: u32, height: u32, cell_size: u32) -> Self {
    let cell = cell_size.max(1);
    Self::new((width / cell) as i32, (height / cell) as i32)
  }

  pub fn contains(&self, position: Position) -> bool {
    position.x >= 0 && position.y >= 0 && position.x < self.cols && position.y < self.rows
  }

  pub fn cell_count(&self) -> usize {
    (self.cols as usize) * (self.rows as usize)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CollisionKind {
  Wall,
  SelfHit,
}
