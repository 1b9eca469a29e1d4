use std::collections::BTreeMap;

use crate::schema::{ConversationTurn, HistoryView};

/// Combines remote and local turns into one view.
///
/// Turns are keyed by timestamp; a remote turn replaces a local one with the
/// same timestamp, and within one side the first occurrence wins. The result
/// is newest first and holds at most `capacity` turns.
pub fn merge(
    remote: impl IntoIterator<Item = ConversationTurn>,
    local: impl IntoIterator<Item = ConversationTurn>,
    capacity: usize,
) -> HistoryView {
    let mut by_timestamp: BTreeMap<String, ConversationTurn> = BTreeMap::new();

    for turn in remote {
        by_timestamp.entry(turn.timestamp.clone()).or_insert(turn);
    }
    for turn in local {
        by_timestamp.entry(turn.timestamp.clone()).or_insert(turn);
    }

    HistoryView::from_sorted(by_timestamp.into_values().rev().take(capacity).collect())
}
