use gen_contract::{EntryKind, RemoteEntry};

use crate::schema::{canonical_timestamp, ConversationTurn};

/// Pairs each question with the answer that immediately follows it.
///
/// Entries are ordered by creation time first. Unanswered questions, stray
/// answers, entries of other kinds and entries whose timestamp does not
/// parse are dropped. The turn takes the question's timestamp.
pub fn pair_entries(session_id: &str, entries: &[RemoteEntry]) -> Vec<ConversationTurn> {
    let mut ordered: Vec<(String, &RemoteEntry)> = entries
        .iter()
        .filter_map(|entry| match canonical_timestamp(&entry.created_at) {
            Ok(timestamp) => Some((timestamp, entry)),
            Err(error) => {
                tracing::debug!(session_id, %error, "skipping entry with unusable timestamp");
                None
            }
        })
        .collect();
    ordered.sort_by(|left, right| left.0.cmp(&right.0));

    let mut turns = Vec::new();
    let mut pending: Option<(String, &RemoteEntry)> = None;
    for (timestamp, entry) in ordered {
        match entry.kind {
            EntryKind::Question => pending = Some((timestamp, entry)),
            EntryKind::Answer => {
                if let Some((asked_at, question)) = pending.take() {
                    turns.push(
                        ConversationTurn::new(&question.content, &entry.content, asked_at)
                            .with_session_id(session_id),
                    );
                }
            }
            EntryKind::Other => pending = None,
        }
    }
    turns
}
