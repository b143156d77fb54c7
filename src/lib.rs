pub mod cli;
pub mod config;
pub mod entity;
pub mod error;
pub mod logging;
pub mod remote;
pub mod storage;
pub mod sync;

pub use config::Config;
pub use entity::{Note, NoteDraft, NoteId};
pub use error::{NotesError, Result};
pub use remote::{MockRemote, RemoteStore};
pub use storage::{KvNoteStore, LocalStore, SqliteKv};
pub use sync::{SyncEngine, SyncStatus};
