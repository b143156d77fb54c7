use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::entity::NoteId;

#[derive(Parser, Debug)]
#[command(name = "tempo-notes")]
#[command(version, about = "An offline-first sticky-notes board")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Directory holding the board's storage and config.yaml
    #[arg(long, global = true, default_value = ".tempo")]
    pub data_dir: PathBuf,

    /// Chance (0..=1) that a simulated remote call fails
    #[arg(long, global = true)]
    pub failure_rate: Option<f64>,

    /// Fixed simulated latency of remote calls, in milliseconds
    #[arg(long, global = true)]
    pub latency_ms: Option<u64>,

    /// Log sync activity to stderr
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List all notes (remote merged with local-only notes)
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Create a note
    Add {
        #[arg(long, default_value_t = 0.0)]
        x: f64,

        #[arg(long, default_value_t = 0.0)]
        y: f64,

        #[arg(long, default_value_t = crate::entity::DEFAULT_WIDTH)]
        width: f64,

        #[arg(long, default_value_t = crate::entity::DEFAULT_HEIGHT)]
        height: f64,

        /// Note text (defaults to "New Note")
        #[arg(long, short = 'c')]
        content: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Replace the text of a note
    Edit {
        id: NoteId,

        content: String,
    },

    /// Move a note (coordinates are clamped to the canvas)
    Move {
        id: NoteId,

        #[arg(allow_negative_numbers = true)]
        x: f64,

        #[arg(allow_negative_numbers = true)]
        y: f64,
    },

    /// Resize a note (never below 100x100)
    Resize {
        id: NoteId,

        width: f64,

        height: f64,
    },

    /// Bring a note above all others
    Front { id: NoteId },

    /// Delete a note
    Delete { id: NoteId },

    /// Delete every note
    Clear {
        /// Only erase the local copy, leave the remote alone
        #[arg(long)]
        local_only: bool,
    },

    /// Push notes the remote has not seen and retry pending changes
    Sync,

    /// Show connectivity and local storage information
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Serve the mock notes API over HTTP
    Serve {
        /// Address to listen on
        #[arg(long, default_value = "127.0.0.1:3030")]
        addr: SocketAddr,
    },
}
