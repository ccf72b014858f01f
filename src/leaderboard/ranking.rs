use crate::shared::names::player_key;
use crate::store::LeaderboardEntry;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Display order: score descending, earlier timestamp first on ties.
pub fn compare_entries(a: &LeaderboardEntry, b: &LeaderboardEntry) -> Ordering {
    b.score
        .cmp(&a.score)
        .then(a.timestamp.cmp(&b.timestamp))
        .then_with(|| player_key(&a.username).cmp(&player_key(&b.username)))
}

/// One entry per normalized username, keeping the highest score (the earlier
/// one when scores tie), sorted and cut to `max_entries`.
pub fn rank_entries<I>(entries: I, max_entries: usize) -> Vec<LeaderboardEntry>
where
    I: IntoIterator<Item = LeaderboardEntry>,
{
    let mut best: HashMap<String, LeaderboardEntry> = HashMap::new();
    for entry in entries {
        let key = player_key(&entry.username);
        if key.is_empty() {
            continue;
        }
        match best.get(&key) {
            Some(current) if compare_entries(current, &entry) != Ordering::Greater => {}
            _ => {
                best.insert(key, entry);
            }
        }
    }

    let mut ranked: Vec<LeaderboardEntry> = best.into_values().collect();
    ranked.sort_by(compare_entries);
    ranked.truncate(max_entries);
    ranked
}

/// 1-based position of `username` in an already ranked board.
pub fn rank_of(board: &[LeaderboardEntry], username: &str) -> Option<usize> {
    let key = player_key(username);
    board
        .iter()
        .position(|entry| player_key(&entry.username) == key)
        .map(|index| index + 1)
}

pub fn best_of(board: &[LeaderboardEntry], username: &str) -> Option<i64> {
    let key = player_key(username);
    board
        .iter()
        .find(|entry| player_key(&entry.username) == key)
        .map(|entry| entry.score)
}

/// Whether `score` is worth submitting: the board still has room, the score
/// beats the lowest retained entry, or it beats the player's own listed best.
pub fn qualifies(board: &[LeaderboardEntry], max_entries: usize, username: &str, score: i64) -> bool {
    if score <= 0 {
        return false;
    }
    if board.len() < max_entries {
        return true;
    }
    let beats_lowest = board.last().map_or(true, |lowest| score > lowest.score);
    let beats_own_best = best_of(board, username).is_some_and(|best| score > best);
    beats_lowest || beats_own_best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(username: &str, score: i64, timestamp: i64) -> LeaderboardEntry {
        LeaderboardEntry {
            player_id: format!("id-{username}"),
            username: username.to_string(),
            score,
            timestamp,
        }
    }

    #[test]
    fn collapses_case_variants_to_best_score() {
        let ranked = rank_entries(
            vec![entry("Ana", 4, 1), entry("ana ", 9, 2), entry("ANA", 6, 3), entry("Bo", 5, 4)],
            10,
        );
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].score, 9);
        assert_eq!(ranked[1].username, "Bo");
    }

    #[test]
    fn ties_go_to_the_earlier_entry() {
        let ranked = rank_entries(vec![entry("Late", 7, 50), entry("Early", 7, 10)], 10);
        assert_eq!(ranked[0].username, "Early");
        let ranked = rank_entries(vec![entry("Ana", 7, 50), entry("ana", 7, 10)], 10);
        assert_eq!(ranked[0].timestamp, 10);
    }

    #[test]
    fn board_is_capped_and_ranked() {
        let entries = (1..=15).map(|score| entry(&format!("p{score}"), score, score));
        let ranked = rank_entries(entries, 10);
        assert_eq!(ranked.len(), 10);
        assert_eq!(ranked[0].score, 15);
        assert_eq!(ranked[9].score, 6);
        assert_eq!(rank_of(&ranked, "P15"), Some(1));
        assert_eq!(rank_of(&ranked, "p1"), None);
    }

    #[test]
    fn high_score_gate() {
        let board = rank_entries((1..=3).map(|score| entry(&format!("p{score}"), score * 10, score)), 3);
        assert!(!qualifies(&board, 3, "new", 0));
        assert!(!qualifies(&board, 3, "new", 10));
        assert!(qualifies(&board, 3, "new", 11));
        assert!(qualifies(&board, 3, "p2", 21));
        assert!(qualifies(&[], 3, "anyone", 1));
    }

    #[test]
    fn listed_player_still_qualifies_through_the_board() {
        let full = rank_entries(vec![entry("Ana", 30, 1), entry("Eve", 20, 2), entry("Bo", 10, 3)], 3);
        assert!(qualifies(&full, 3, "Eve", 15));
        assert!(!qualifies(&full, 3, "Eve", 10));
        assert!(qualifies(&full, 3, "Bo", 11));

        let roomy = rank_entries(vec![entry("Eve", 20, 1)], 10);
        assert!(qualifies(&roomy, 10, "eve", 5));
        assert!(!qualifies(&roomy, 10, "eve", 0));
    }
}
