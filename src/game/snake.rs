use super::input::is_valid_turn;
use super::types::{Direction, GridSize, Position};
use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct Snake {
    body: VecDeque<Position>,
    direction: Direction,
    new_direction: Direction,
    pending_growth: u32,
}

impl Snake {
    pub fn new(origin: Position, direction: Direction) -> Self {
        let mut body = VecDeque::with_capacity(16);
        body.push_back(origin);
        Self {
            body,
            direction,
            new_direction: direction,
            pending_growth: 0,
        }
    }

    /// Body given head-first. An empty list yields a snake at the origin cell.
    pub fn from_segments(segments: Vec<Position>, direction: Direction) -> Self {
        let mut body = VecDeque::from(segments);
        if body.is_empty() {
            body.push_back(Position::new(0, 0));
        }
        Self {
            body,
            direction,
            new_direction: direction,
            pending_growth: 0,
        }
    }

    pub fn head(&self) -> Position {
        self.body[0]
    }

    pub fn body(&self) -> impl Iterator<Item = &Position> {
        self.body.iter()
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn queued_direction(&self) -> Direction {
        self.new_direction
    }

    pub fn pending_growth(&self) -> u32 {
        self.pending_growth
    }

    /// Queues a turn for the next tick. The check runs against the heading the
    /// snake is actually moving in, so two quick presses cannot fold it back
    /// onto its neck. Returns whether the turn was accepted.
    pub fn queue_turn(&mut self, requested: Direction) -> bool {
        if !is_valid_turn(self.direction, requested) {
            return false;
        }
        self.new_direction = requested;
        true
    }

    pub fn grow(&mut self) {
        self.pending_growth = self.pending_growth.saturating_add(1);
    }

    pub fn grow_by(&mut self, segments: u32) {
        for _ in 0..segments {
            self.grow();
        }
    }

    /// Moves one cell in the queued direction and returns the new head.
    pub fn advance(&mut self) -> Position {
        self.direction = self.new_direction;
        let new_head = self.head().step(self.direction);
        self.body.push_front(new_head);
        if self.pending_growth > 0 {
            self.pending_growth -= 1;
        } else {
            self.body.pop_back();
        }
        new_head
    }

    pub fn hits_self(&self) -> bool {
        let head = self.head();
        self.body.iter().skip(1).any(|segment| *segment == head)
    }

    pub fn out_of_bounds(&self, grid: GridSize) -> bool {
        !grid.contains(self.head())
    }

    pub fn occupies(&self, position: Position) -> bool {
        self.body.iter().any(|segment| *segment == position)
    }

    pub fn reset(&mut self, origin: Position, direction: Direction) {
        *self = Snake::new(origin, direction);
    }
}
