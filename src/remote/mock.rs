use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use tracing::{debug, warn};

use super::{RemoteError, RemoteResult, RemoteStore};
use crate::config::{RemoteConfig, REMOTE_KEY};
use crate::entity::{timestamp_id, Note, NoteDraft, NoteId, NotePatch, RemoteNote};
use crate::storage::SqliteKv;

/// When the simulated backend fails a call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FaultPlan {
    Never,
    Always,
    /// Each call fails independently with this probability
    Random(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOp {
    GetAll,
    Create,
    Update,
    UpdateMany,
    Delete,
    Clear,
    Sync,
}

/// One recorded call, made before the fault decision.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteCall {
    pub op: RemoteOp,
    pub ids: Vec<NoteId>,
}

struct Persistence {
    kv: Mutex<SqliteKv>,
    key: String,
}

/// In-process stand-in for the notes backend.
///
/// Every call waits a random latency and may fail according to the current
/// [`FaultPlan`]. The collection lives as long as the instance, and
/// optionally mirrors itself into a [`SqliteKv`] so it survives restarts.
pub struct MockRemote {
    notes: Mutex<Vec<RemoteNote>>,
    faults: Mutex<FaultPlan>,
    latency: (Duration, Duration),
    calls: Mutex<Vec<RemoteCall>>,
    persistence: Option<Persistence>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockRemote {
    /// A purely in-memory store.
    pub fn new(config: &RemoteConfig) -> Self {
        Self {
            notes: Mutex::new(Vec::new()),
            faults: Mutex::new(FaultPlan::Random(config.failure_probability)),
            latency: config.latency_range(),
            calls: Mutex::new(Vec::new()),
            persistence: None,
        }
    }

    /// No latency, no failures.
    pub fn reliable() -> Self {
        Self::new(&RemoteConfig::reliable())
    }

    /// A store backed by `kv`, starting from whatever it persisted last time.
    pub fn persistent(config: &RemoteConfig, kv: SqliteKv) -> Self {
        let key = config
            .persist_key
            .clone()
            .unwrap_or_else(|| REMOTE_KEY.to_string());

        let notes = match kv.get_json::<Vec<RemoteNote>>(&key) {
            Ok(Some(notes)) => {
                debug!(count = notes.len(), "mock remote restored persisted notes");
                notes
            }
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(error = %e, "mock remote could not restore its notes, starting empty");
                Vec::new()
            }
        };

        let mut remote = Self::new(config);
        remote.notes = Mutex::new(notes);
        remote.persistence = Some(Persistence {
            kv: Mutex::new(kv),
            key,
        });
        remote
    }

    pub fn set_faults(&self, plan: FaultPlan) {
        *lock(&self.faults) = plan;
    }

    pub fn faults(&self) -> FaultPlan {
        *lock(&self.faults)
    }

    /// Current contents, bypassing latency and faults.
    pub fn snapshot(&self) -> Vec<RemoteNote> {
        lock(&self.notes).clone()
    }

    /// Replace the contents, bypassing latency and faults.
    pub fn seed(&self, notes: Vec<RemoteNote>) {
        let mut guard = lock(&self.notes);
        *guard = notes;
        self.persist(&guard);
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self, op: RemoteOp) -> usize {
        lock(&self.calls).iter().filter(|call| call.op == op).count()
    }

    pub fn reset_calls(&self) {
        lock(&self.calls).clear();
    }

    /// Record the call, wait out the latency, then roll for a fault.
    async fn begin(&self, op: RemoteOp, ids: Vec<NoteId>) -> RemoteResult<()> {
        lock(&self.calls).push(RemoteCall { op, ids });

        let delay = self.pick_latency();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.should_fail() {
            debug!(?op, "mock remote simulating a failure");
            return Err(RemoteError::Network("Simulated API failure".to_string()));
        }
        Ok(())
    }

    fn pick_latency(&self) -> Duration {
        let (min, max) = self.latency;
        if min >= max {
            return min;
        }
        rand::rng().random_range(min..=max)
    }

    fn should_fail(&self) -> bool {
        match self.faults() {
            FaultPlan::Never => false,
            FaultPlan::Always => true,
            FaultPlan::Random(p) => rand::rng().random_bool(p.clamp(0.0, 1.0)),
        }
    }

    fn persist(&self, notes: &[RemoteNote]) {
        if let Some(persistence) = &self.persistence {
            if let Err(e) = lock(&persistence.kv).set_json(&persistence.key, notes) {
                warn!(error = %e, "mock remote could not persist its notes");
            }
        }
    }
}

#[async_trait]
impl RemoteStore for MockRemote {
    async fn get_all(&self) -> RemoteResult<Vec<RemoteNote>> {
        self.begin(RemoteOp::GetAll, Vec::new()).await?;
        let notes = lock(&self.notes).clone();
        debug!(count = notes.len(), "mock remote returning all notes");
        Ok(notes)
    }

    async fn create(&self, draft: NoteDraft) -> RemoteResult<RemoteNote> {
        self.begin(RemoteOp::Create, Vec::new()).await?;

        let mut notes = lock(&self.notes);
        let mut id = timestamp_id();
        while notes.iter().any(|n| n.id == id) {
            id += 1;
        }
        let created = RemoteNote::stamped(Note::from_draft(id, draft), Utc::now());
        notes.push(created.clone());
        self.persist(&notes);
        Ok(created)
    }

    async fn update(&self, id: NoteId, patch: NotePatch) -> RemoteResult<RemoteNote> {
        self.begin(RemoteOp::Update, vec![id]).await?;

        let mut notes = lock(&self.notes);
        let note = notes
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or(RemoteError::NotFound(id))?;
        note.apply(patch, Utc::now());
        let updated = note.clone();
        self.persist(&notes);
        Ok(updated)
    }

    async fn update_many(&self, batch: &[Note]) -> RemoteResult<Vec<RemoteNote>> {
        self.begin(RemoteOp::UpdateMany, batch.iter().map(|n| n.id).collect())
            .await?;

        let now = Utc::now();
        let mut notes = lock(&self.notes);
        let mut updated = Vec::new();
        for incoming in batch {
            if let Some(existing) = notes.iter_mut().find(|n| n.id == incoming.id) {
                let created_at = existing.created_at;
                *existing = RemoteNote {
                    created_at,
                    ..RemoteNote::stamped(incoming.clone(), now)
                };
                updated.push(existing.clone());
            }
        }
        self.persist(&notes);
        Ok(updated)
    }

    async fn delete(&self, id: NoteId) -> RemoteResult<()> {
        self.begin(RemoteOp::Delete, vec![id]).await?;

        let mut notes = lock(&self.notes);
        let index = notes
            .iter()
            .position(|n| n.id == id)
            .ok_or(RemoteError::NotFound(id))?;
        notes.remove(index);
        self.persist(&notes);
        debug!(note_id = id, remaining = notes.len(), "mock remote deleted note");
        Ok(())
    }

    async fn clear(&self) -> RemoteResult<()> {
        self.begin(RemoteOp::Clear, Vec::new()).await?;

        let mut notes = lock(&self.notes);
        notes.clear();
        self.persist(&notes);
        Ok(())
    }

    async fn sync(&self, incoming: &[Note]) -> RemoteResult<Vec<RemoteNote>> {
        self.begin(RemoteOp::Sync, incoming.iter().map(|n| n.id).collect())
            .await?;

        let now = Utc::now();
        let mut notes = lock(&self.notes);
        for note in incoming {
            if !notes.iter().any(|n| n.id == note.id) {
                notes.push(RemoteNote::stamped(note.clone(), now));
            }
        }
        self.persist(&notes);
        Ok(notes.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(content: &str) -> NoteDraft {
        let mut draft = NoteDraft::at(10.0, 10.0, &[]);
        draft.content = content.to_string();
        draft
    }

    fn local(id: NoteId, content: &str) -> Note {
        Note::from_draft(id, draft(content))
    }

    #[tokio::test]
    async fn test_create_assigns_unique_ids_and_timestamps() {
        let remote = MockRemote::reliable();
        let a = remote.create(draft("a")).await.unwrap();
        let b = remote.create(draft("b")).await.unwrap();

        assert_ne!(a.id, b.id);
        assert_eq!(a.created_at, a.updated_at);
        assert_eq!(remote.get_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_update_applies_patch() {
        let remote = MockRemote::reliable();
        let created = remote.create(draft("a")).await.unwrap();

        let patch = NotePatch {
            content: Some("edited".to_string()),
            ..Default::default()
        };
        let updated = remote.update(created.id, patch).await.unwrap();
        assert_eq!(updated.content, "edited");
        assert_eq!(updated.x, created.x);
        assert!(updated.updated_at >= created.updated_at);
    }

    #[tokio::test]
    async fn test_update_and_delete_unknown_id_are_not_found() {
        let remote = MockRemote::reliable();
        assert_eq!(
            remote.update(5, NotePatch::default()).await,
            Err(RemoteError::NotFound(5))
        );
        assert_eq!(remote.delete(5).await, Err(RemoteError::NotFound(5)));
    }

    #[tokio::test]
    async fn test_update_many_skips_unknown_ids() {
        let remote = MockRemote::reliable();
        let created = remote.create(draft("a")).await.unwrap();

        let mut changed: Note = created.clone().into();
        changed.content = "moved".to_string();
        let updated = remote
            .update_many(&[changed, local(123, "ghost")])
            .await
            .unwrap();

        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0].created_at, created.created_at);
        let all = remote.snapshot();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].content, "moved");
    }

    #[tokio::test]
    async fn test_sync_appends_only_unknown_ids() {
        let remote = MockRemote::reliable();
        let created = remote.create(draft("server")).await.unwrap();

        let mut stale: Note = created.clone().into();
        stale.content = "stale".to_string();
        let merged = remote
            .sync(&[stale, local(42, "offline")])
            .await
            .unwrap();

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].content, "server");
        assert_eq!(merged[1].id, 42);
    }

    #[tokio::test]
    async fn test_clear() {
        let remote = MockRemote::reliable();
        remote.create(draft("a")).await.unwrap();
        remote.clear().await.unwrap();
        remote.clear().await.unwrap();
        assert!(remote.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_forced_failure_leaves_store_untouched() {
        let remote = MockRemote::reliable();
        remote.set_faults(FaultPlan::Always);

        let result = remote.create(draft("a")).await;
        assert!(matches!(result, Err(RemoteError::Network(_))));
        assert!(remote.snapshot().is_empty());

        remote.set_faults(FaultPlan::Never);
        assert!(remote.create(draft("a")).await.is_ok());
    }

    #[tokio::test]
    async fn test_calls_are_recorded_even_when_failing() {
        let remote = MockRemote::reliable();
        remote.set_faults(FaultPlan::Always);
        let _ = remote.delete(7).await;
        let _ = remote.update_many(&[local(1, "a"), local(2, "b")]).await;

        assert_eq!(remote.call_count(RemoteOp::Delete), 1);
        let calls = remote.calls();
        assert_eq!(calls[1].op, RemoteOp::UpdateMany);
        assert_eq!(calls[1].ids, vec![1, 2]);

        remote.reset_calls();
        assert!(remote.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_is_simulated() {
        let mut config = RemoteConfig::reliable();
        config.set_fixed_latency(250);
        let remote = MockRemote::new(&config);

        let started = tokio::time::Instant::now();
        remote.get_all().await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_persistent_store_survives_reopen() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = RemoteConfig::reliable();

        let id = {
            let remote = MockRemote::persistent(&config, SqliteKv::open(tmp.path()).unwrap());
            remote.create(draft("kept")).await.unwrap().id
        };

        let remote = MockRemote::persistent(&config, SqliteKv::open(tmp.path()).unwrap());
        let notes = remote.get_all().await.unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].id, id);
    }
}
