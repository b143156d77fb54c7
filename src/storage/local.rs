use serde::Serialize;
use tracing::{debug, error};

use super::kv::SqliteKv;
use crate::entity::{Note, NoteId};

/// Key the client keeps its note collection under.
pub const NOTES_KEY: &str = "tempo-notes";

/// Count and human-readable size of the stored collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageInfo {
    pub count: usize,
    pub size: String,
}

impl StorageInfo {
    pub fn empty() -> Self {
        Self {
            count: 0,
            size: "0 KB".to_string(),
        }
    }
}

/// Synchronous durable storage for the full note collection.
///
/// Implementations never fail towards the caller: a missing or unreadable
/// collection loads as empty, and a failed write is logged and dropped.
pub trait LocalStore: Send {
    fn load(&self) -> Vec<Note>;

    fn save(&self, notes: &[Note]);

    /// Erase the stored collection entirely.
    fn clear(&self);

    fn size_info(&self) -> StorageInfo;

    fn add(&self, note: Note) {
        let mut notes = self.load();
        notes.push(note);
        self.save(&notes);
    }

    /// Replace the note with the same id, or append it.
    fn upsert(&self, note: Note) {
        let mut notes = self.load();
        match notes.iter_mut().find(|n| n.id == note.id) {
            Some(existing) => *existing = note,
            None => notes.push(note),
        }
        self.save(&notes);
    }

    fn remove(&self, id: NoteId) {
        let mut notes = self.load();
        notes.retain(|n| n.id != id);
        self.save(&notes);
    }
}

/// `LocalStore` keeping the collection as one JSON document in a [`SqliteKv`].
pub struct KvNoteStore {
    kv: SqliteKv,
    key: String,
}

impl KvNoteStore {
    pub fn new(kv: SqliteKv) -> Self {
        Self::with_key(kv, NOTES_KEY)
    }

    pub fn with_key(kv: SqliteKv, key: impl Into<String>) -> Self {
        Self {
            kv,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl LocalStore for KvNoteStore {
    fn load(&self) -> Vec<Note> {
        match self.kv.get_json::<Vec<Note>>(&self.key) {
            Ok(Some(notes)) => {
                debug!(count = notes.len(), "loaded notes from local storage");
                notes
            }
            Ok(None) => Vec::new(),
            Err(e) => {
                error!(key = %self.key, error = %e, "failed to load from local storage");
                Vec::new()
            }
        }
    }

    fn save(&self, notes: &[Note]) {
        match self.kv.set_json(&self.key, notes) {
            Ok(()) => debug!(count = notes.len(), "saved notes to local storage"),
            Err(e) => error!(key = %self.key, error = %e, "failed to save to local storage"),
        }
    }

    fn clear(&self) {
        if let Err(e) = self.kv.remove(&self.key) {
            error!(key = %self.key, error = %e, "failed to clear local storage");
        }
    }

    fn size_info(&self) -> StorageInfo {
        let raw = match self.kv.get(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return StorageInfo::empty(),
            Err(e) => {
                error!(key = %self.key, error = %e, "failed to read local storage info");
                return StorageInfo::empty();
            }
        };

        match serde_json::from_str::<Vec<serde_json::Value>>(&raw) {
            Ok(notes) => StorageInfo {
                count: notes.len(),
                size: format!("{:.2} KB", raw.len() as f64 / 1024.0),
            },
            Err(e) => {
                error!(key = %self.key, error = %e, "failed to read local storage info");
                StorageInfo::empty()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> KvNoteStore {
        KvNoteStore::new(SqliteKv::open_in_memory().unwrap())
    }

    fn note(id: NoteId, content: &str) -> Note {
        Note {
            id,
            x: 0.0,
            y: 0.0,
            width: 200.0,
            height: 150.0,
            content: content.to_string(),
            color: "#FF6B6B".to_string(),
            z_index: Some(1),
        }
    }

    #[test]
    fn test_load_missing_key_is_empty() {
        assert!(store().load().is_empty());
    }

    #[test]
    fn test_load_corrupt_value_is_empty() {
        let kv = SqliteKv::open_in_memory().unwrap();
        kv.set(NOTES_KEY, "[{\"id\": oops").unwrap();
        let store = KvNoteStore::new(kv);
        assert!(store.load().is_empty());
        assert_eq!(store.size_info(), StorageInfo::empty());
    }

    #[test]
    fn test_save_and_load() {
        let store = store();
        store.save(&[note(1, "a"), note(2, "b")]);
        let loaded = store.load();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[1].content, "b");
    }

    #[test]
    fn test_upsert_replaces_or_appends() {
        let store = store();
        store.add(note(1, "a"));
        store.upsert(note(1, "a2"));
        store.upsert(note(2, "b"));

        let loaded = store.load();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].content, "a2");
        assert_eq!(loaded[1].id, 2);
    }

    #[test]
    fn test_remove() {
        let store = store();
        store.save(&[note(1, "a"), note(2, "b")]);
        store.remove(1);
        store.remove(42);
        let ids: Vec<NoteId> = store.load().iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![2]);
    }

    #[test]
    fn test_clear_is_idempotent() {
        let store = store();
        store.save(&[note(1, "a")]);
        store.clear();
        store.clear();
        assert!(store.load().is_empty());
        assert_eq!(store.size_info(), StorageInfo::empty());
    }

    #[test]
    fn test_size_info() {
        let store = store();
        store.save(&[note(1, "a"), note(2, "b")]);
        let info = store.size_info();
        assert_eq!(info.count, 2);
        assert!(info.size.ends_with(" KB"));
        assert_ne!(info.size, "0 KB");
    }

    #[test]
    fn test_custom_key_is_isolated() {
        let kv = SqliteKv::open_in_memory().unwrap();
        kv.set_json(NOTES_KEY, &vec![note(1, "a")]).unwrap();
        let store = KvNoteStore::with_key(kv, "other-board");
        assert_eq!(store.key(), "other-board");
        assert!(store.load().is_empty());
    }
}
