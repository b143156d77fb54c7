//! Offline-first reconciliation between the local note cache and the remote
//! store.

mod engine;
mod merge;

pub use engine::{SyncEngine, SyncStatus};
pub use merge::merge_remote_first;
