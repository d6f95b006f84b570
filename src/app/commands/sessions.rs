//! Session command handlers.

use std::path::Path;

use anyhow::{Context, Result, bail};

use crate::session::{format_transcript, write_export};
use crate::store::SessionStore;

pub fn list() -> Result<()> {
    let store = SessionStore::open();
    for session in store.sorted_sessions() {
        let marker = if session.id == store.current_id() {
            '*'
        } else {
            ' '
        };
        println!(
            "{} {}  {}  {} ({} messages)",
            marker,
            session.id,
            session.created_at,
            session.title,
            session.messages.len()
        );
    }
    Ok(())
}

pub fn show(id: &str) -> Result<()> {
    let store = SessionStore::open();
    match store.get(id) {
        Some(session) => println!("{}", format_transcript(session)),
        None => println!("Session '{}' not found.", id),
    }
    Ok(())
}

pub fn rename(id: &str, title: &str) -> Result<()> {
    let mut store = SessionStore::open();
    if store.get(id).is_none() {
        bail!("Session '{}' not found", id);
    }

    if store.rename_session(id, title) {
        println!("Renamed to {}", store.get(id).map_or("", |s| s.title.as_str()));
    } else {
        println!("Title unchanged.");
    }
    Ok(())
}

pub fn delete(id: &str) -> Result<()> {
    let mut store = SessionStore::open();
    if !store.delete_session(id) {
        bail!("Session '{}' not found", id);
    }
    println!("Deleted session {}", id);
    Ok(())
}

pub fn export(id: &str, out: Option<&str>) -> Result<()> {
    let store = SessionStore::open();
    let Some(export) = store.export_session(id) else {
        bail!("Session '{}' not found", id);
    };

    let dir = match out {
        Some(out) => Path::new(out).to_path_buf(),
        None => std::env::current_dir().context("resolve current directory")?,
    };
    let path = write_export(&export, &dir).with_context(|| format!("export session '{id}'"))?;
    println!("Exported to {}", path.display());
    Ok(())
}
