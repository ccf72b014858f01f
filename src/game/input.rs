use super::constants::SWIPE_MIN_DISTANCE;
use super::types::Direction;

/// Turns accepted from each heading. Anything not listed (going straight or
/// reversing into the neck) is ignored.
const VALID_TURNS: [(Direction, [Direction; 2]); 4] = [
    (Direction::Right, [Direction::Up, Direction::Down]),
    (Direction::Left, [Direction::Up, Direction::Down]),
    (Direction::Up, [Direction::Left, Direction::Right]),
    (Direction::Down, [Direction::Left, Direction::Right]),
];

pub fn valid_turns(current: Direction) -> [Direction; 2] {
    VALID_TURNS
        .iter()
        .find(|(heading, _)| *heading == current)
        .map(|(_, turns)| *turns)
        .unwrap_or([current, current])
}

pub fn is_valid_turn(current: Direction, requested: Direction) -> bool {
    valid_turns(current).contains(&requested)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCommand {
    Turn(Direction),
    TogglePause,
}

/// Maps host key names (`"ArrowUp"`, `"up"`, `"w"`, `" "`) to commands.
pub fn parse_key(key: &str) -> Option<KeyCommand> {
    if key == " " || key.eq_ignore_ascii_case("space") {
        return Some(KeyCommand::TogglePause);
    }
    let name = key.strip_prefix("Arrow").unwrap_or(key).to_ascii_lowercase();
    let direction = match name.as_str() {
        "up" | "w" => Direction::Up,
        "down" | "s" => Direction::Down,
        "left" | "a" => Direction::Left,
        "right" | "d" => Direction::Right,
        _ => return None,
    };
    Some(KeyCommand::Turn(direction))
}

/// Direction of a touch swipe, by dominant axis. Short swipes are ignored.
pub fn swipe_direction(dx: f64, dy: f64) -> Option<Direction> {
    if !dx.is_finite() || !dy.is_finite() {
        return None;
    }
    if dx.abs() < SWIPE_MIN_DISTANCE && dy.abs() < SWIPE_MIN_DISTANCE {
        return None;
    }
    if dx.abs() > dy.abs() {
        Some(if dx > 0.0 { Direction::Right } else { Direction::Left })
    } else {
        Some(if dy > 0.0 { Direction::Down } else { Direction::Up })
    }
}
