mod note;

pub use note::{
    bring_to_front, max_z_index, random_color, timestamp_id, Note, NoteDraft, NoteId, NotePatch,
    RemoteNote, DEFAULT_CONTENT, DEFAULT_HEIGHT, DEFAULT_WIDTH, MIN_SIZE, PALETTE,
};
