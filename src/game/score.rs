use super::constants::{BASE_TICK_MS, MIN_TICK_MS, TICK_STEP_PER_POINT_MS};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScoreTracker {
    score: u32,
    best: u32,
}

impl ScoreTracker {
    pub fn value(&self) -> u32 {
        self.score
    }

    /// Highest score seen since the tracker was created. Survives `reset`.
    pub fn best(&self) -> u32 {
        self.best
    }

    pub fn increment(&mut self) {
        self.add(1);
    }

    pub fn add(&mut self, points: u32) {
        self.score = self.score.saturating_add(points);
        self.best = self.best.max(self.score);
    }

    pub fn reset(&mut self) {
        self.score = 0;
    }
}

/// `max(80, 200 - score * 5)` milliseconds between ticks.
pub fn tick_interval_for_score(score: u32) -> u64 {
    let reduction = u64::from(score).saturating_mul(TICK_STEP_PER_POINT_MS);
    BASE_TICK_MS.saturating_sub(reduction).max(MIN_TICK_MS)
}
