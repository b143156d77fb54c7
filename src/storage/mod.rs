mod kv;
mod local;

pub use kv::{SqliteKv, STORE_DB};
pub use local::{KvNoteStore, LocalStore, StorageInfo, NOTES_KEY};
