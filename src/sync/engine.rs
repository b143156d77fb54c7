use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::merge::merge_remote_first;
use crate::config::SyncConfig;
use crate::entity::{timestamp_id, Note, NoteDraft, NoteId};
use crate::remote::RemoteStore;
use crate::storage::{LocalStore, StorageInfo};

/// Snapshot of the engine's connectivity bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    pub is_online: bool,
    pub last_sync: Option<DateTime<Utc>>,
    pub pending_changes: usize,
    pub is_syncing: bool,
}

/// A debounced update waiting for its quiet period to end.
struct StagedUpdate {
    note: Note,
    token: CancellationToken,
}

struct EngineState {
    online: bool,
    last_sync: Option<DateTime<Utc>>,
    pending_ids: HashSet<NoteId>,
    pending_count: usize,
    syncing: bool,
    staged: HashMap<NoteId, StagedUpdate>,
    batch: Vec<Note>,
    batch_token: Option<CancellationToken>,
    /// Ids deleted during this session. Ids are never reused.
    deleted: HashSet<NoteId>,
    /// Bumped by every clear-all.
    epoch: u64,
}

impl EngineState {
    fn new() -> Self {
        Self {
            online: true,
            last_sync: None,
            pending_ids: HashSet::new(),
            pending_count: 0,
            syncing: false,
            staged: HashMap::new(),
            batch: Vec::new(),
            batch_token: None,
            deleted: HashSet::new(),
            epoch: 0,
        }
    }

    fn record_success(&mut self) {
        self.online = true;
        self.last_sync = Some(Utc::now());
    }

    /// False once `id` was deleted or the board cleared after `epoch`.
    fn is_live(&self, id: NoteId, epoch: u64) -> bool {
        self.epoch == epoch && !self.deleted.contains(&id)
    }

    fn record_pending(&mut self, ids: &[NoteId]) {
        self.online = false;
        self.pending_count += ids.len();
        self.pending_ids.extend(ids.iter().copied());
    }
}

struct Shared {
    remote: Arc<dyn RemoteStore>,
    local: Mutex<Box<dyn LocalStore>>,
    state: Mutex<EngineState>,
    config: SyncConfig,
}

/// Offline-first reconciliation between a [`LocalStore`] and a [`RemoteStore`].
///
/// Every mutation lands in the local store no matter what the remote does.
/// Remote writes are best-effort: single-note updates are debounced per id,
/// bulk saves are coalesced into one deferred call, and failures are queued
/// as pending changes for [`SyncEngine::sync_pending_changes`].
///
/// The engine is a cheap handle; clones share state. Deferred writes run on
/// spawned Tokio tasks, so [`SyncEngine::update_note`] and
/// [`SyncEngine::save_notes`] must be called from within a Tokio runtime.
#[derive(Clone)]
pub struct SyncEngine {
    shared: Arc<Shared>,
}

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Wait out `delay` unless `token` fires first. True when the delay elapsed.
async fn sleep_unless_cancelled(token: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        biased;
        _ = token.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

/// Clears the syncing flag however `sync_pending_changes` exits.
struct SyncingGuard<'a> {
    engine: &'a SyncEngine,
}

impl Drop for SyncingGuard<'_> {
    fn drop(&mut self) {
        self.engine.state().syncing = false;
    }
}

impl SyncEngine {
    pub fn new<L>(remote: Arc<dyn RemoteStore>, local: L, config: SyncConfig) -> Self
    where
        L: LocalStore + 'static,
    {
        Self {
            shared: Arc::new(Shared {
                remote,
                local: Mutex::new(Box::new(local)),
                state: Mutex::new(EngineState::new()),
                config,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, EngineState> {
        lock(&self.shared.state)
    }

    fn local(&self) -> MutexGuard<'_, Box<dyn LocalStore>> {
        lock(&self.shared.local)
    }

    fn record_success(&self) {
        self.state().record_success();
    }

    fn record_failure(&self) {
        self.state().online = false;
    }

    /// Load the board: the remote collection merged with local-only notes.
    ///
    /// Falls back to the local collection untouched when the remote is
    /// unreachable.
    pub async fn load_notes(&self) -> Vec<Note> {
        let local_notes = self.local().load();
        debug!(count = local_notes.len(), "loaded notes from local storage");

        match self.shared.remote.get_all().await {
            Ok(remote_notes) => {
                let remote_notes: Vec<Note> = remote_notes.into_iter().map(Note::from).collect();
                let remote_count = remote_notes.len();
                let merged = merge_remote_first(remote_notes, local_notes);
                info!(
                    remote = remote_count,
                    local_only = merged.len().saturating_sub(remote_count),
                    "merged remote and local notes"
                );

                self.local().save(&merged);
                self.record_success();
                merged
            }
            Err(e) => {
                warn!(error = %e, "remote unavailable, loading from local storage");
                self.record_failure();
                local_notes
            }
        }
    }

    /// Create a note. The returned note carries the authoritative id: the
    /// remote one on success, a locally minted one otherwise.
    pub async fn create_note(&self, draft: NoteDraft) -> Note {
        let fallback_id = timestamp_id();

        let note = match self.shared.remote.create(draft.clone()).await {
            Ok(created) => {
                self.record_success();
                Note::from(created)
            }
            Err(e) => {
                warn!(note_id = fallback_id, error = %e, "remote unavailable, creating note locally");
                self.record_failure();
                Note::from_draft(fallback_id, draft)
            }
        };

        self.local().upsert(note.clone());
        note
    }

    /// Stage an update for `note`. Repeated calls for the same id within the
    /// debounce window replace the staged value and restart the window, so
    /// only the last value reaches the remote.
    pub fn update_note(&self, note: Note) {
        let id = note.id;
        let token = CancellationToken::new();
        {
            let mut state = self.state();
            let staged = StagedUpdate {
                note,
                token: token.clone(),
            };
            if let Some(previous) = state.staged.insert(id, staged) {
                previous.token.cancel();
            }
        }

        let engine = self.clone();
        let delay = self.shared.config.update_debounce();
        tokio::spawn(async move {
            if sleep_unless_cancelled(&token, delay).await {
                engine.fire_update(id, &token).await;
            }
        });
    }

    async fn fire_update(&self, id: NoteId, token: &CancellationToken) {
        let (note, epoch) = {
            let mut state = self.state();
            if token.is_cancelled() {
                return;
            }
            match state.staged.remove(&id) {
                Some(staged) => (staged.note, state.epoch),
                None => return,
            }
        };
        self.perform_update(note, epoch).await;
    }

    async fn perform_update(&self, note: Note, epoch: u64) {
        let id = note.id;
        match self.shared.remote.update(id, note.to_patch()).await {
            Ok(_) => {
                debug!(note_id = id, "remote update succeeded");
                self.record_success();
            }
            Err(e) => {
                let mut state = self.state();
                if state.is_live(id, epoch) {
                    warn!(note_id = id, error = %e, "remote update failed, keeping change locally");
                    state.record_pending(&[id]);
                } else {
                    debug!(note_id = id, error = %e, "update for a removed note failed, dropping it");
                }
            }
        }

        // A delete or clear-all issued while the call was in flight wins.
        let state = self.state();
        if state.is_live(id, epoch) {
            self.local().upsert(note);
        } else {
            debug!(note_id = id, "note removed while its update was in flight");
        }
    }

    /// Persist the full collection now and queue it for one deferred bulk
    /// update. Calls inside the batch window accumulate into that one call.
    pub fn save_notes(&self, notes: &[Note]) {
        self.local().save(notes);

        let token = CancellationToken::new();
        {
            let mut state = self.state();
            for note in notes {
                match state.batch.iter().position(|n| n.id == note.id) {
                    Some(index) => state.batch[index] = note.clone(),
                    None => state.batch.push(note.clone()),
                }
            }
            if let Some(previous) = state.batch_token.replace(token.clone()) {
                previous.cancel();
            }
        }

        let engine = self.clone();
        let delay = self.shared.config.batch_delay();
        tokio::spawn(async move {
            if sleep_unless_cancelled(&token, delay).await {
                engine.fire_batch(&token).await;
            }
        });
    }

    async fn fire_batch(&self, token: &CancellationToken) {
        let notes = {
            let mut state = self.state();
            if token.is_cancelled() {
                return;
            }
            state.batch_token = None;
            std::mem::take(&mut state.batch)
        };
        self.perform_batch(notes).await;
    }

    async fn perform_batch(&self, notes: Vec<Note>) {
        if notes.is_empty() {
            return;
        }

        match self.shared.remote.update_many(&notes).await {
            Ok(updated) => {
                debug!(sent = notes.len(), applied = updated.len(), "remote bulk update succeeded");
                self.record_success();
            }
            Err(e) => {
                warn!(count = notes.len(), error = %e, "remote bulk update failed, keeping changes locally");
                let ids: Vec<NoteId> = notes.iter().map(|n| n.id).collect();
                self.state().record_pending(&ids);
            }
        }
    }

    /// Delete a note locally and, best-effort, remotely. Any staged update
    /// for the note is dropped first.
    pub async fn delete_note(&self, id: NoteId) {
        {
            let mut state = self.state();
            if let Some(staged) = state.staged.remove(&id) {
                staged.token.cancel();
            }
            state.batch.retain(|n| n.id != id);
            state.deleted.insert(id);
        }
        self.local().remove(id);

        match self.shared.remote.delete(id).await {
            Ok(()) => {
                debug!(note_id = id, "remote delete succeeded");
                self.record_success();
            }
            Err(e) => {
                warn!(note_id = id, error = %e, "remote delete failed, deleted locally");
                self.state().record_pending(&[id]);
            }
        }
    }

    /// Drop every staged write, clear the remote, and erase the local key.
    pub async fn clear_all_notes(&self) {
        {
            let mut state = self.state();
            for (_, staged) in state.staged.drain() {
                staged.token.cancel();
            }
            if let Some(token) = state.batch_token.take() {
                token.cancel();
            }
            state.batch.clear();
            state.deleted.clear();
            state.epoch += 1;
        }

        match self.shared.remote.clear().await {
            Ok(()) => {
                let mut state = self.state();
                state.record_success();
                state.pending_ids.clear();
                state.pending_count = 0;
            }
            Err(e) => {
                warn!(error = %e, "remote clear failed, clearing notes locally");
                self.record_failure();
            }
        }

        self.local().clear();
        info!("cleared all notes from local storage");
    }

    /// Erase the local collection only.
    pub fn clear_local_storage(&self) {
        self.local().clear();
        info!("cleared local storage");
    }

    /// Retry the pending changes found in `current_notes` as one bulk update.
    ///
    /// Does nothing while another sync runs or when nothing is pending. Safe
    /// to call periodically as a reconnection probe.
    pub async fn sync_pending_changes(&self, current_notes: &[Note]) {
        let (to_send, attempted_ids, attempted_count) = {
            let mut state = self.state();
            if state.syncing || state.pending_ids.is_empty() {
                return;
            }
            state.syncing = true;

            let to_send: Vec<Note> = current_notes
                .iter()
                .filter(|n| state.pending_ids.contains(&n.id))
                .cloned()
                .collect();
            let attempted_ids: Vec<NoteId> = state.pending_ids.iter().copied().collect();
            (to_send, attempted_ids, state.pending_count)
        };
        let _syncing = SyncingGuard { engine: self };

        let result = self.shared.remote.update_many(&to_send).await;

        let mut state = self.state();
        match result {
            Ok(_) => {
                for id in &attempted_ids {
                    state.pending_ids.remove(id);
                }
                state.pending_count = state.pending_count.saturating_sub(attempted_count);
                state.record_success();
                info!(count = to_send.len(), "synced pending changes");
            }
            Err(e) => {
                state.online = false;
                warn!(pending = attempted_ids.len(), error = %e, "failed to sync pending changes");
            }
        }
    }

    /// Upload notes the remote has never seen (e.g. created while offline).
    ///
    /// Returns the remote collection merged with any notes it still lacks,
    /// persisted locally; on failure returns `current_notes` unchanged.
    pub async fn push_offline_notes(&self, current_notes: &[Note]) -> Vec<Note> {
        match self.shared.remote.sync(current_notes).await {
            Ok(remote_notes) => {
                let remote_notes: Vec<Note> = remote_notes.into_iter().map(Note::from).collect();
                let merged = merge_remote_first(remote_notes, current_notes.to_vec());
                self.local().save(&merged);
                self.record_success();
                info!(count = merged.len(), "pushed local notes to remote");
                merged
            }
            Err(e) => {
                warn!(error = %e, "failed to push local notes");
                self.record_failure();
                current_notes.to_vec()
            }
        }
    }

    /// Send every staged update and the pending batch right away.
    ///
    /// Writes whose timers already fired are not waited for.
    pub async fn flush(&self) {
        let (updates, batch, epoch) = {
            let mut state = self.state();
            let epoch = state.epoch;
            let updates: Vec<Note> = state
                .staged
                .drain()
                .map(|(_, staged)| {
                    staged.token.cancel();
                    staged.note
                })
                .collect();
            if let Some(token) = state.batch_token.take() {
                token.cancel();
            }
            (updates, std::mem::take(&mut state.batch), epoch)
        };

        for note in updates {
            self.perform_update(note, epoch).await;
        }
        self.perform_batch(batch).await;
    }

    pub fn sync_status(&self) -> SyncStatus {
        let state = self.state();
        SyncStatus {
            is_online: state.online,
            last_sync: state.last_sync,
            pending_changes: state.pending_count,
            is_syncing: state.syncing,
        }
    }

    pub fn is_online(&self) -> bool {
        self.state().online
    }

    /// Ids with a change the remote has not confirmed.
    pub fn pending_change_ids(&self) -> Vec<NoteId> {
        let mut ids: Vec<NoteId> = self.state().pending_ids.iter().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Writes staged for the remote but not yet sent.
    pub fn pending_updates_count(&self) -> usize {
        let state = self.state();
        state.staged.len() + state.batch.len()
    }

    pub fn local_storage_info(&self) -> StorageInfo {
        self.local().size_info()
    }

    /// The collection as currently persisted locally.
    pub fn local_notes(&self) -> Vec<Note> {
        self.local().load()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{FaultPlan, MockRemote};
    use crate::storage::{KvNoteStore, SqliteKv};

    fn setup() -> (Arc<MockRemote>, SyncEngine) {
        let remote = Arc::new(MockRemote::reliable());
        let local = KvNoteStore::new(SqliteKv::open_in_memory().unwrap());
        let engine = SyncEngine::new(remote.clone(), local, SyncConfig::default());
        (remote, engine)
    }

    #[tokio::test]
    async fn test_starts_online_with_nothing_pending() {
        let (_remote, engine) = setup();
        let status = engine.sync_status();
        assert!(status.is_online);
        assert!(status.last_sync.is_none());
        assert_eq!(status.pending_changes, 0);
        assert!(!status.is_syncing);
    }

    #[tokio::test]
    async fn test_failed_delete_counts_as_pending() {
        let (remote, engine) = setup();
        remote.set_faults(FaultPlan::Always);

        engine.delete_note(11).await;
        engine.delete_note(11).await;

        let status = engine.sync_status();
        assert!(!status.is_online);
        // The count tracks attempts, the id set tracks notes.
        assert_eq!(status.pending_changes, 2);
        assert_eq!(engine.pending_change_ids(), vec![11]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_updates_count_tracks_staged_writes() {
        let (_remote, engine) = setup();
        let note = engine.create_note(NoteDraft::at(0.0, 0.0, &[])).await;

        engine.update_note(note.clone());
        engine.save_notes(&[note.clone()]);
        assert_eq!(engine.pending_updates_count(), 2);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(engine.pending_updates_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_syncing_flag_is_cleared_after_failure() {
        let (remote, engine) = setup();
        let note = engine.create_note(NoteDraft::at(0.0, 0.0, &[])).await;

        remote.set_faults(FaultPlan::Always);
        engine.update_note(note.clone());
        engine.flush().await;

        engine.sync_pending_changes(&[note]).await;
        let status = engine.sync_status();
        assert!(!status.is_syncing);
        assert!(!status.is_online);
        assert_eq!(status.pending_changes, 1);
    }

    #[tokio::test]
    async fn test_clear_all_forgets_deleted_ids() {
        let (_remote, engine) = setup();
        let note = engine.create_note(NoteDraft::at(0.0, 0.0, &[])).await;

        engine.delete_note(note.id).await;
        assert!(engine.state().deleted.contains(&note.id));

        engine.clear_all_notes().await;
        let state = engine.state();
        assert!(state.deleted.is_empty());
        assert_eq!(state.epoch, 1);
    }

    #[tokio::test]
    async fn test_clear_local_storage_leaves_remote_alone() {
        let (remote, engine) = setup();
        engine.create_note(NoteDraft::at(0.0, 0.0, &[])).await;

        engine.clear_local_storage();
        assert!(engine.local_notes().is_empty());
        assert_eq!(remote.snapshot().len(), 1);
        assert_eq!(engine.local_storage_info(), StorageInfo::empty());
    }
}
