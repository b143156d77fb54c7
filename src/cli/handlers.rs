use std::net::SocketAddr;
use std::sync::Arc;

use crate::config::Config;
use crate::entity::{bring_to_front, Note, NoteDraft, NoteId};
use crate::error::{NotesError, Result};
use crate::remote::{api, MockRemote};
use crate::storage::{KvNoteStore, SqliteKv};
use crate::sync::SyncEngine;

use super::commands::GlobalArgs;

/// The engine wired to the on-disk stores under the data directory.
struct Board {
    engine: SyncEngine,
}

fn load_config(global: &GlobalArgs) -> Result<Config> {
    let mut config = Config::load(&global.data_dir)?;
    if let Some(rate) = global.failure_rate {
        config.remote.failure_probability = rate;
    }
    if let Some(ms) = global.latency_ms {
        config.remote.set_fixed_latency(ms);
    }
    config.validate()?;
    Ok(config)
}

fn open_remote(global: &GlobalArgs, config: &Config) -> Result<Arc<MockRemote>> {
    let remote = match config.remote.persist_key {
        Some(_) => MockRemote::persistent(&config.remote, SqliteKv::open(&global.data_dir)?),
        None => MockRemote::new(&config.remote),
    };
    Ok(Arc::new(remote))
}

impl Board {
    fn open(global: &GlobalArgs) -> Result<Self> {
        let config = load_config(global)?;
        let remote = open_remote(global, &config)?;
        let local = KvNoteStore::with_key(
            SqliteKv::open(&global.data_dir)?,
            config.sync.storage_key.clone(),
        );

        Ok(Self {
            engine: SyncEngine::new(remote, local, config.sync),
        })
    }

    /// Send whatever is still staged, then report if the remote was missed.
    async fn finish(&self) {
        self.engine.flush().await;
        if !self.engine.is_online() {
            eprintln!("Warning: remote unavailable, changes were kept locally");
        }
    }
}

fn find_index(notes: &[Note], id: NoteId) -> Result<usize> {
    notes
        .iter()
        .position(|n| n.id == id)
        .ok_or(NotesError::NoteNotFound(id))
}

fn format_note(note: &Note) -> String {
    format!(
        "{}  ({:.0}, {:.0})  {:.0}x{:.0}  z{}  {}  {}",
        note.id,
        note.x,
        note.y,
        note.width,
        note.height,
        note.stacking(),
        note.color,
        note.content.replace('\n', " ")
    )
}

pub async fn handle_list(global: &GlobalArgs, json: bool) -> Result<()> {
    let board = Board::open(global)?;
    let mut notes = board.engine.load_notes().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&notes)?);
        return Ok(());
    }

    if notes.is_empty() {
        println!("No notes yet. Create one with `tempo-notes add`.");
        return Ok(());
    }

    notes.sort_by_key(Note::stacking);
    for note in &notes {
        println!("{}", format_note(note));
    }
    Ok(())
}

pub async fn handle_add(
    global: &GlobalArgs,
    x: f64,
    y: f64,
    width: f64,
    height: f64,
    content: Option<String>,
    json: bool,
) -> Result<()> {
    let board = Board::open(global)?;
    let notes = board.engine.load_notes().await;

    let mut draft = NoteDraft::with_size(x, y, width, height, &notes);
    if let Some(content) = content {
        draft.content = content;
    }

    let note = board.engine.create_note(draft).await;
    board.finish().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&note)?);
    } else {
        println!("Created note {}", format_note(&note));
    }
    Ok(())
}

pub async fn handle_edit(global: &GlobalArgs, id: NoteId, content: String) -> Result<()> {
    let board = Board::open(global)?;
    let mut notes = board.engine.load_notes().await;
    let index = find_index(&notes, id)?;

    notes[index].content = content;
    board.engine.update_note(notes[index].clone());
    board.finish().await;

    println!("Updated note {}", format_note(&notes[index]));
    Ok(())
}

/// Apply `change` to one note and save the whole board, the way a drag or
/// resize gesture does.
async fn change_note<F>(global: &GlobalArgs, id: NoteId, change: F) -> Result<()>
where
    F: FnOnce(&mut Note),
{
    let board = Board::open(global)?;
    let mut notes = board.engine.load_notes().await;
    let index = find_index(&notes, id)?;

    change(&mut notes[index]);
    board.engine.save_notes(&notes);
    board.finish().await;

    println!("Updated note {}", format_note(&notes[index]));
    Ok(())
}

pub async fn handle_move(global: &GlobalArgs, id: NoteId, x: f64, y: f64) -> Result<()> {
    change_note(global, id, |note| note.move_to(x, y)).await
}

pub async fn handle_resize(global: &GlobalArgs, id: NoteId, width: f64, height: f64) -> Result<()> {
    change_note(global, id, |note| note.resize(width, height)).await
}

pub async fn handle_front(global: &GlobalArgs, id: NoteId) -> Result<()> {
    let board = Board::open(global)?;
    let mut notes = board.engine.load_notes().await;
    if !bring_to_front(&mut notes, id) {
        return Err(NotesError::NoteNotFound(id));
    }

    board.engine.save_notes(&notes);
    board.finish().await;

    let index = find_index(&notes, id)?;
    println!("Updated note {}", format_note(&notes[index]));
    Ok(())
}

pub async fn handle_delete(global: &GlobalArgs, id: NoteId) -> Result<()> {
    let board = Board::open(global)?;
    let notes = board.engine.load_notes().await;
    find_index(&notes, id)?;

    board.engine.delete_note(id).await;
    board.finish().await;

    println!("Deleted note {}", id);
    Ok(())
}

pub async fn handle_clear(global: &GlobalArgs, local_only: bool) -> Result<()> {
    let board = Board::open(global)?;

    if local_only {
        board.engine.clear_local_storage();
        println!("Cleared local storage");
    } else {
        board.engine.clear_all_notes().await;
        board.finish().await;
        println!("Cleared all notes");
    }
    Ok(())
}

pub async fn handle_sync(global: &GlobalArgs) -> Result<()> {
    let board = Board::open(global)?;
    let notes = board.engine.load_notes().await;

    let merged = board.engine.push_offline_notes(&notes).await;
    board.engine.sync_pending_changes(&merged).await;

    let status = board.engine.sync_status();
    if status.is_online {
        println!("Synced {} notes", merged.len());
    } else {
        println!("Remote unavailable, {} notes kept locally", merged.len());
    }
    Ok(())
}

pub async fn handle_status(global: &GlobalArgs, json: bool) -> Result<()> {
    let board = Board::open(global)?;
    board.engine.load_notes().await;

    let status = board.engine.sync_status();
    let storage = board.engine.local_storage_info();

    if json {
        let report = serde_json::json!({
            "sync": status,
            "storage": storage,
            "pending_updates": board.engine.pending_updates_count(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "Remote:   {}",
        if status.is_online { "online" } else { "offline" }
    );
    match status.last_sync {
        Some(at) => println!("Synced:   {}", at.to_rfc3339()),
        None => println!("Synced:   never"),
    }
    println!("Pending:  {}", status.pending_changes);
    println!("Local:    {} notes ({})", storage.count, storage.size);
    Ok(())
}

pub async fn handle_serve(global: &GlobalArgs, addr: SocketAddr) -> Result<()> {
    let config = load_config(global)?;
    let remote = open_remote(global, &config)?;

    println!("Serving mock notes API on http://{}/api/notes", addr);
    api::serve(remote, addr).await
}
