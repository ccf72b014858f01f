use super::input::valid_turns;
use super::types::{Direction, Position};
use super::world::World;

/// Greedy steering for headless play: head for the active bonus, otherwise
/// the food, and never step into a wall or the body if a safe move exists.
pub fn choose_direction(world: &World) -> Option<Direction> {
    let snake = world.snake();
    let head = snake.head();
    let current = snake.direction();
    let target = if world.bonus().active {
        world.bonus().position
    } else {
        world.food().position
    };

    let mut candidates = vec![current];
    candidates.extend(valid_turns(current));

    candidates
        .into_iter()
        .filter(|direction| is_safe(world, head.step(*direction)))
        .min_by_key(|direction| {
            let next = head.step(*direction);
            let crowding = 4 - free_neighbours(world, next);
            let straight_bonus = if *direction == current { 0 } else { 1 };
            (next.manhattan(target), crowding, straight_bonus)
        })
}

fn is_safe(world: &World, cell: Position) -> bool {
    if !world.grid().contains(cell) {
        return false;
    }
    let snake = world.snake();
    let tail_moves_away = snake.pending_growth() == 0;
    let occupied_len = if tail_moves_away {
        snake.len().saturating_sub(1)
    } else {
        snake.len()
    };
    !snake.body().take(occupied_len).any(|segment| *segment == cell)
}

fn free_neighbours(world: &World, cell: Position) -> i32 {
    Direction::ALL
        .iter()
        .filter(|direction| is_safe(world, cell.step(**direction)))
        .count() as i32
}
