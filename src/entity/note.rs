// src/entity/note.rs
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Identifier shared by the local and remote collections.
pub type NoteId = i64;

pub const DEFAULT_CONTENT: &str = "New Note";
pub const DEFAULT_WIDTH: f64 = 200.0;
pub const DEFAULT_HEIGHT: f64 = 150.0;
pub const MIN_SIZE: f64 = 100.0;

/// Colors a new note can be tagged with.
pub const PALETTE: [&str; 8] = [
    "#FF6B6B", "#4ECDC4", "#45B7D1", "#96CEB4", "#FFEAA7", "#DDA0DD", "#98D8C8", "#F7DC6F",
];

/// A note as kept in the local collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: NoteId,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub content: String,
    pub color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z_index: Option<i64>,
}

impl Note {
    /// Attach an id to a draft.
    pub fn from_draft(id: NoteId, draft: NoteDraft) -> Self {
        Self {
            id,
            x: draft.x,
            y: draft.y,
            width: draft.width,
            height: draft.height,
            content: draft.content,
            color: draft.color,
            z_index: draft.z_index,
        }
    }

    /// Stacking order, with an absent value counting as 1.
    pub fn stacking(&self) -> i64 {
        self.z_index.unwrap_or(1)
    }

    /// Move the note, keeping it inside the canvas.
    pub fn move_to(&mut self, x: f64, y: f64) {
        self.x = x.max(0.0);
        self.y = y.max(0.0);
    }

    /// Resize the note, never below the minimum size.
    pub fn resize(&mut self, width: f64, height: f64) {
        self.width = width.max(MIN_SIZE);
        self.height = height.max(MIN_SIZE);
    }

    /// Full field set as a patch for the remote `update` call.
    pub fn to_patch(&self) -> NotePatch {
        NotePatch {
            x: Some(self.x),
            y: Some(self.y),
            width: Some(self.width),
            height: Some(self.height),
            content: Some(self.content.clone()),
            color: Some(self.color.clone()),
            z_index: self.z_index,
        }
    }
}

/// A note that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteDraft {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub content: String,
    pub color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z_index: Option<i64>,
}

impl NoteDraft {
    /// A default-sized note at `(x, y)` stacked above everything in `existing`.
    pub fn at(x: f64, y: f64, existing: &[Note]) -> Self {
        Self::with_size(x, y, DEFAULT_WIDTH, DEFAULT_HEIGHT, existing)
    }

    pub fn with_size(x: f64, y: f64, width: f64, height: f64, existing: &[Note]) -> Self {
        Self {
            x: x.max(0.0),
            y: y.max(0.0),
            width: width.max(MIN_SIZE),
            height: height.max(MIN_SIZE),
            content: DEFAULT_CONTENT.to_string(),
            color: random_color().to_string(),
            z_index: Some(max_z_index(existing) + 1),
        }
    }
}

/// The remote representation, carrying server-assigned timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteNote {
    pub id: NoteId,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub content: String,
    pub color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z_index: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RemoteNote {
    /// Stamp a local note with the given creation/update time.
    pub fn stamped(note: Note, now: DateTime<Utc>) -> Self {
        Self {
            id: note.id,
            x: note.x,
            y: note.y,
            width: note.width,
            height: note.height,
            content: note.content,
            color: note.color,
            z_index: note.z_index,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a partial update, bumping `updated_at`.
    pub fn apply(&mut self, patch: NotePatch, now: DateTime<Utc>) {
        if let Some(x) = patch.x {
            self.x = x;
        }
        if let Some(y) = patch.y {
            self.y = y;
        }
        if let Some(width) = patch.width {
            self.width = width;
        }
        if let Some(height) = patch.height {
            self.height = height;
        }
        if let Some(content) = patch.content {
            self.content = content;
        }
        if let Some(color) = patch.color {
            self.color = color;
        }
        if patch.z_index.is_some() {
            self.z_index = patch.z_index;
        }
        self.updated_at = now;
    }
}

impl From<RemoteNote> for Note {
    fn from(remote: RemoteNote) -> Self {
        Self {
            id: remote.id,
            x: remote.x,
            y: remote.y,
            width: remote.width,
            height: remote.height,
            content: remote.content,
            color: remote.color,
            z_index: remote.z_index,
        }
    }
}

/// Partial field set for a remote update. Absent fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z_index: Option<i64>,
}

/// Highest stacking order in the collection, 0 when empty.
pub fn max_z_index(notes: &[Note]) -> i64 {
    notes.iter().map(Note::stacking).max().unwrap_or(0)
}

/// Raise one note above all others. Returns false if the id is unknown.
pub fn bring_to_front(notes: &mut [Note], id: NoteId) -> bool {
    let top = max_z_index(notes);
    match notes.iter_mut().find(|note| note.id == id) {
        Some(note) => {
            note.z_index = Some(top + 1);
            true
        }
        None => false,
    }
}

/// Millisecond timestamp plus a little jitter so two ids minted in the same
/// millisecond rarely collide.
pub fn timestamp_id() -> NoteId {
    Utc::now().timestamp_millis() + rand::rng().random_range(0..1000)
}

pub fn random_color() -> &'static str {
    PALETTE[rand::rng().random_range(0..PALETTE.len())]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(id: NoteId, z_index: Option<i64>) -> Note {
        Note {
            id,
            x: 10.0,
            y: 20.0,
            width: 200.0,
            height: 150.0,
            content: format!("note {}", id),
            color: PALETTE[0].to_string(),
            z_index,
        }
    }

    #[test]
    fn test_draft_defaults() {
        let draft = NoteDraft::at(5.0, 7.0, &[]);
        assert_eq!(draft.content, "New Note");
        assert_eq!(draft.width, 200.0);
        assert_eq!(draft.height, 150.0);
        assert_eq!(draft.z_index, Some(1));
        assert!(PALETTE.contains(&draft.color.as_str()));
    }

    #[test]
    fn test_draft_stacks_above_existing() {
        let existing = vec![note(1, Some(4)), note(2, None), note(3, Some(2))];
        let draft = NoteDraft::at(0.0, 0.0, &existing);
        assert_eq!(draft.z_index, Some(5));
    }

    #[test]
    fn test_absent_z_index_counts_as_one() {
        let existing = vec![note(1, None), note(2, None)];
        assert_eq!(max_z_index(&existing), 1);
        assert_eq!(max_z_index(&[]), 0);
    }

    #[test]
    fn test_move_clamps_to_canvas() {
        let mut n = note(1, None);
        n.move_to(-30.0, 12.5);
        assert_eq!((n.x, n.y), (0.0, 12.5));
    }

    #[test]
    fn test_resize_enforces_minimum() {
        let mut n = note(1, None);
        n.resize(40.0, 320.0);
        assert_eq!((n.width, n.height), (100.0, 320.0));
    }

    #[test]
    fn test_bring_to_front() {
        let mut notes = vec![note(1, Some(3)), note(2, Some(1))];
        assert!(bring_to_front(&mut notes, 2));
        assert_eq!(notes[1].z_index, Some(4));
        assert!(!bring_to_front(&mut notes, 99));
    }

    #[test]
    fn test_json_uses_camel_case_and_omits_missing_z_index() {
        let json = serde_json::to_value(note(7, None)).unwrap();
        assert!(json.get("zIndex").is_none());

        let json = serde_json::to_value(note(7, Some(2))).unwrap();
        assert_eq!(json["zIndex"], 2);
    }

    #[test]
    fn test_patch_only_touches_present_fields() {
        let now = Utc::now();
        let mut remote = RemoteNote::stamped(note(1, Some(2)), now);
        let later = now + chrono::Duration::seconds(5);
        remote.apply(
            NotePatch {
                content: Some("edited".to_string()),
                ..Default::default()
            },
            later,
        );
        assert_eq!(remote.content, "edited");
        assert_eq!(remote.x, 10.0);
        assert_eq!(remote.z_index, Some(2));
        assert_eq!(remote.created_at, now);
        assert_eq!(remote.updated_at, later);
    }

    #[test]
    fn test_remote_to_local_drops_timestamps() {
        let local = note(3, Some(1));
        let remote = RemoteNote::stamped(local.clone(), Utc::now());
        assert_eq!(Note::from(remote), local);
    }
}
