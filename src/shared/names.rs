pub const MAX_PLAYER_NAME_LENGTH: usize = 20;

pub fn sanitize_player_name(name: &str, fallback: &str) -> String {
    let cleaned = name.split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.is_empty() {
        return fallback.to_string();
    }
    cleaned.chars().take(MAX_PLAYER_NAME_LENGTH).collect()
}

/// Identity used to collapse leaderboard rows: `"Bob"` and `" bob "` are the
/// same human.
pub fn player_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Player id used by stores that are keyed by name rather than by device.
pub fn player_id_for_name(name: &str) -> String {
    format!("name:{}", player_key(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_collapses_whitespace_and_bounds_length() {
        assert_eq!(sanitize_player_name("  Ada   Lovelace ", "Player"), "Ada Lovelace");
        assert_eq!(sanitize_player_name("   ", "Player"), "Player");
        let long = "x".repeat(64);
        assert_eq!(sanitize_player_name(&long, "Player").len(), MAX_PLAYER_NAME_LENGTH);
    }

    #[test]
    fn player_key_ignores_case_and_padding() {
        assert_eq!(player_key("Bob"), player_key(" bob "));
        assert_eq!(player_id_for_name(" BOB"), "name:bob");
    }
}
