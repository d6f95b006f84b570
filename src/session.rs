//! Session data model and snapshot persistence.
//!
//! The full session map is stored as a single JSON document at
//! `${GRACE_HOME}/chat-sessions.json`:
//!
//! ```json
//! {
//!   "sessions": {
//!     "<id>": { "id": "...", "title": "...", "messages": [...], "createdAt": "...", "isTyping": false, "error": null }
//!   },
//!   "currentSessionId": "<id>"
//! }
//! ```
//!
//! Loading is best-effort: a missing, unreadable, or malformed snapshot is
//! treated as "no saved state" and never surfaces an error to the caller.
//! Saving overwrites the snapshot wholesale via a temp-file-then-rename.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// A single chat message. Immutable once appended to a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    /// "user" or "model".
    pub role: String,
    pub text: String,
    pub timestamp: String,
}

impl Message {
    /// Creates a new user message with a generated id and current timestamp.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            id: generate_id(),
            role: "user".to_string(),
            text: text.into(),
            timestamp: chrono_timestamp(),
        }
    }

    /// Creates a new model message with a generated id and current timestamp.
    pub fn model(text: impl Into<String>) -> Self {
        Self {
            id: generate_id(),
            role: "model".to_string(),
            text: text.into(),
            timestamp: chrono_timestamp(),
        }
    }
}

/// One conversation thread with its own message history and request state.
///
/// `is_typing` and `error` are transient request flags; they round-trip
/// through the snapshot but carry no meaning across process restarts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    pub created_at: String,
    /// True while a completion request is in flight for this session.
    #[serde(default)]
    pub is_typing: bool,
    /// Id of the user message whose request failed, enabling retry.
    #[serde(default)]
    pub error: Option<String>,
}

impl Session {
    /// Creates a new empty session with a generated id.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: generate_id(),
            title: title.into(),
            messages: Vec::new(),
            created_at: chrono_timestamp(),
            is_typing: false,
            error: None,
        }
    }
}

/// The persisted snapshot: all sessions plus the active session id.
///
/// A `BTreeMap` keeps serialization deterministic, so an unchanged state
/// always round-trips to identical bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct State {
    #[serde(default)]
    pub sessions: BTreeMap<String, Session>,
    #[serde(default)]
    pub current_session_id: String,
}

/// Loads the snapshot from `path`.
///
/// Returns `None` when the file is missing, unreadable, or malformed; the
/// latter two log a warning. Never errors to the caller.
pub fn load_state(path: &Path) -> Option<State> {
    if !path.exists() {
        return None;
    }

    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            eprintln!("Warning: Failed to read {}: {}", path.display(), e);
            return None;
        }
    };

    match serde_json::from_str(&contents) {
        Ok(state) => Some(state),
        Err(e) => {
            eprintln!("Warning: Ignoring malformed snapshot {}: {}", path.display(), e);
            None
        }
    }
}

/// Saves the snapshot to `path`, overwriting any prior snapshot.
///
/// Best-effort: failures are logged and swallowed.
pub fn save_state(path: &Path, state: &State) {
    if let Err(e) = try_save_state(path, state) {
        eprintln!("Warning: Failed to save sessions: {:#}", e);
    }
}

/// Writes the snapshot atomically (temp file + rename).
fn try_save_state(path: &Path, state: &State) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    let json = serde_json::to_string(state).context("Failed to serialize sessions")?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, json)
        .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| {
        format!(
            "Failed to rename {} to {}",
            tmp_path.display(),
            path.display()
        )
    })?;

    Ok(())
}

/// Downloadable view of a single session: `{id, title, createdAt, messages}`.
///
/// Transient request flags are deliberately excluded.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionExport {
    pub id: String,
    pub title: String,
    pub created_at: String,
    pub messages: Vec<Message>,
}

impl From<&Session> for SessionExport {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id.clone(),
            title: session.title.clone(),
            created_at: session.created_at.clone(),
            messages: session.messages.clone(),
        }
    }
}

/// Writes an export to `<dir>/<sessionId>.json` and returns the path.
pub fn write_export(export: &SessionExport, dir: &Path) -> Result<PathBuf> {
    let path = dir.join(format!("{}.json", export.id));
    let json = serde_json::to_string_pretty(export).context("Failed to serialize session")?;
    fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

/// Formats a session transcript in a human-readable format.
pub fn format_transcript(session: &Session) -> String {
    let mut output = String::new();

    output.push_str(&format!("### {}\n\n", session.title));
    for message in &session.messages {
        let role_label = match message.role.as_str() {
            "user" => "You",
            "model" => "Grace",
            other => other,
        };
        let failed = session.error.as_deref() == Some(message.id.as_str());
        if failed {
            output.push_str(&format!("### {} (failed)\n", role_label));
        } else {
            output.push_str(&format!("### {}\n", role_label));
        }
        output.push_str(&message.text);
        output.push_str("\n\n");
    }

    output.trim_end().to_string()
}

/// Returns an RFC3339 UTC timestamp string.
fn chrono_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

/// Generates a unique id using UUID v4.
fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
