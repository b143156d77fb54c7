use std::collections::HashSet;

use crate::entity::{Note, NoteId};

/// Merge a remote collection with the local one.
///
/// Every remote note is kept, in remote order. A local note survives only
/// when its id is unknown remotely; local copies of remote notes are dropped
/// as stale. A note deleted remotely but still present locally looks exactly
/// like an offline creation and is kept.
pub fn merge_remote_first(remote: Vec<Note>, local: Vec<Note>) -> Vec<Note> {
    let mut seen: HashSet<NoteId> = HashSet::with_capacity(remote.len() + local.len());
    let mut merged = Vec::with_capacity(remote.len() + local.len());

    for note in remote.into_iter().chain(local) {
        if seen.insert(note.id) {
            merged.push(note);
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::NoteDraft;

    fn note(id: NoteId, content: &str) -> Note {
        let mut draft = NoteDraft::at(0.0, 0.0, &[]);
        draft.content = content.to_string();
        Note::from_draft(id, draft)
    }

    fn contents(notes: &[Note]) -> Vec<(NoteId, &str)> {
        notes.iter().map(|n| (n.id, n.content.as_str())).collect()
    }

    #[test]
    fn test_remote_wins_and_local_only_survives() {
        let remote = vec![note(1, "A remote"), note(2, "B")];
        let local = vec![note(1, "A stale"), note(3, "C")];

        let merged = merge_remote_first(remote, local);
        assert_eq!(
            contents(&merged),
            vec![(1, "A remote"), (2, "B"), (3, "C")]
        );
    }

    #[test]
    fn test_empty_remote_keeps_all_local() {
        let local = vec![note(1, "a"), note(2, "b")];
        let merged = merge_remote_first(Vec::new(), local.clone());
        assert_eq!(merged, local);
    }

    #[test]
    fn test_duplicate_local_ids_collapse() {
        let local = vec![note(4, "first"), note(4, "second")];
        let merged = merge_remote_first(Vec::new(), local);
        assert_eq!(contents(&merged), vec![(4, "first")]);
    }
}
