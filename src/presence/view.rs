use crate::shared::names::player_key;
use crate::store::PresenceEntry;
use serde::Serialize;
use std::cmp::Ordering;

/// What presence subscribers see: the live players in display order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PresenceView {
    pub count: usize,
    pub entries: Vec<PresenceEntry>,
}

/// Playing before idle, then most recently active, then by name.
pub fn display_order(a: &PresenceEntry, b: &PresenceEntry) -> Ordering {
    b.is_playing
        .cmp(&a.is_playing)
        .then(b.last_active_at.cmp(&a.last_active_at))
        .then_with(|| player_key(&a.username).cmp(&player_key(&b.username)))
        .then_with(|| a.player_id.cmp(&b.player_id))
}

/// Drops records last active before `cutoff` and sorts the rest.
pub fn build_view(entries: Vec<PresenceEntry>, cutoff: i64) -> PresenceView {
    let mut entries: Vec<PresenceEntry> = entries
        .into_iter()
        .filter(|entry| entry.last_active_at >= cutoff)
        .collect();
    entries.sort_by(display_order);
    PresenceView {
        count: entries.len(),
        entries,
    }
}
