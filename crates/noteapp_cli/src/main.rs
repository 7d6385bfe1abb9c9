//! Command-line front end for the note repository.
//!
//! # Responsibility
//! - Translate user intents into `NoteRepository` calls.
//! - Keep output stable: one tab-separated line per note, or JSON.
//!
//! Every run starts with an empty cache, so commands that depend on
//! existing notes fetch from the store first.

use clap::{Parser, Subcommand};
use log::{error, info};
use noteapp_core::{
    default_log_level, init_logging, sample_notes, Importance, Note, NoteId, NoteRepository,
    SqliteDocumentStore, StoreError, SyncState, UnknownImportance,
};
use std::error::Error;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;

type CliResult<T> = Result<T, Box<dyn Error>>;

#[derive(Debug, Parser)]
#[command(name = "noteapp", version, about = "Notes backed by a local document store")]
struct Cli {
    /// Document store file; an in-memory store is used when omitted.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Absolute directory for rolling log files; logging is off when omitted.
    #[arg(long, global = true)]
    log_dir: Option<String>,

    /// trace|debug|info|warn|error
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Print notes as JSON instead of tab-separated lines.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Check core wiring.
    Ping,
    /// Create a note.
    Add {
        title: String,
        #[arg(long, default_value = "")]
        content: String,
        #[arg(long, value_parser = parse_importance, default_value = "MEDIUM")]
        importance: Importance,
    },
    /// Print the cache after a one-shot fetch.
    List,
    /// Replace a note in full.
    Update {
        id: NoteId,
        title: String,
        #[arg(long, default_value = "")]
        content: String,
        #[arg(long, value_parser = parse_importance, default_value = "MEDIUM")]
        importance: Importance,
    },
    /// Delete a note.
    Delete { id: NoteId },
    /// Print the current live snapshot of urgent notes, newest first.
    Urgent,
    /// Write the demonstration notes to the store.
    Seed,
}

fn main() -> CliResult<()> {
    let cli = Cli::parse();

    if let Some(log_dir) = cli.log_dir.as_deref() {
        let level = cli.log_level.as_deref().unwrap_or(default_log_level());
        init_logging(level, log_dir)?;
    }

    let store = match cli.db.as_ref() {
        Some(path) => SqliteDocumentStore::open(path)?,
        None => SqliteDocumentStore::open_in_memory()?,
    };
    let repo = NoteRepository::new(Arc::new(store));

    match cli.command {
        Command::Ping => {
            println!("noteapp_core ping={}", noteapp_core::ping());
            println!("noteapp_core version={}", noteapp_core::core_version());
        }
        Command::Add {
            title,
            content,
            importance,
        } => println!("{}", add(&repo, title, content, importance)?),
        Command::List => print_notes(&fetch(&repo)?, cli.json)?,
        Command::Update {
            id,
            title,
            content,
            importance,
        } => {
            fetch(&repo)?;
            let (tx, rx) = mpsc::channel();
            let failure_tx = tx.clone();
            repo.update_note(
                id,
                title,
                content,
                importance,
                move || {
                    let _ = tx.send(Ok(()));
                },
                move |err| {
                    let _ = failure_tx.send(Err(err));
                },
            );
            wait(rx)?;
        }
        Command::Delete { id } => {
            let (tx, rx) = mpsc::channel();
            let failure_tx = tx.clone();
            repo.delete_note(
                id,
                move || {
                    let _ = tx.send(Ok(()));
                },
                move |err| {
                    let _ = failure_tx.send(Err(err));
                },
            );
            wait(rx)?;
        }
        Command::Urgent => {
            let (tx, rx) = mpsc::channel();
            let failure_tx = tx.clone();
            let subscription = repo.fetch_notes_realtime(
                move |notes| {
                    let _ = tx.send(Ok(notes));
                },
                move |err| {
                    let _ = failure_tx.send(Err(err));
                },
            );
            let notes = wait(rx)?;
            subscription.cancel();
            print_notes(&notes, cli.json)?;
        }
        Command::Seed => print_notes(&seed(&repo)?, cli.json)?,
    }

    Ok(())
}

/// Adds a note and reports the store's verdict on the write.
///
/// `add_note` only logs write failures; a note that is no longer cached
/// once the store answered was rolled back.
fn add(
    repo: &NoteRepository,
    title: String,
    content: String,
    importance: Importance,
) -> CliResult<NoteId> {
    fetch(repo)?;
    let note_id = repo.add_note(title, content, importance);
    match repo.sync_state(note_id) {
        Some(SyncState::Confirmed) => {
            info!("event=cli_add module=cli status=ok note_id={note_id}");
            Ok(note_id)
        }
        state => {
            error!("event=cli_add module=cli status=error note_id={note_id} state={state:?}");
            Err(format!("note {note_id} was not saved to the store").into())
        }
    }
}

/// Writes the demonstration notes unchanged and returns the cache.
fn seed(repo: &NoteRepository) -> CliResult<Vec<Note>> {
    for note in sample_notes() {
        let (tx, rx) = mpsc::channel();
        let failure_tx = tx.clone();
        repo.put_note(
            note,
            move || {
                let _ = tx.send(Ok(()));
            },
            move |err| {
                let _ = failure_tx.send(Err(err));
            },
        );
        wait(rx)?;
    }
    Ok(repo.get_all_notes())
}

fn parse_importance(value: &str) -> Result<Importance, UnknownImportance> {
    value.trim().to_ascii_uppercase().parse()
}

fn fetch(repo: &NoteRepository) -> CliResult<Vec<Note>> {
    let (tx, rx) = mpsc::channel();
    let failure_tx = tx.clone();
    repo.fetch_notes(
        move |notes| {
            let _ = tx.send(Ok(notes));
        },
        move |err| {
            let _ = failure_tx.send(Err(err));
        },
    );
    wait(rx)
}

fn wait<T>(rx: Receiver<Result<T, StoreError>>) -> CliResult<T> {
    let outcome = rx
        .recv()
        .map_err(|_| "store dropped the operation without completing it")?;
    Ok(outcome?)
}

fn print_notes(notes: &[Note], as_json: bool) -> CliResult<()> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(notes)?);
        return Ok(());
    }
    for note in notes {
        println!(
            "{}\t{}\t{}\t{}\t{}",
            note.id, note.importance, note.timestamp, note.title, note.content
        );
    }
    Ok(())
}
