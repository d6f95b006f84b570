//! In-memory session store.
//!
//! `SessionStore` exclusively owns the session map; every user intent is a
//! method here, and each mutation is mirrored to the snapshot on disk
//! before returning. The completion client never mutates sessions directly:
//! the chat loop drives `begin_send`/`begin_retry`, awaits the request, and
//! resolves it with `complete_reply`/`fail_reply`.

use std::path::PathBuf;

use crate::paths;
use crate::session::{self, Message, Session, SessionExport, State};

pub struct SessionStore {
    state: State,
    path: PathBuf,
}

impl SessionStore {
    /// Opens the store at the default snapshot path.
    pub fn open() -> Self {
        Self::open_from(paths::state_path())
    }

    /// Opens the store backed by a specific snapshot file.
    ///
    /// Missing or malformed snapshots start fresh. After loading, the state
    /// is normalized so that at least one session exists and the current
    /// session id always references one of them.
    pub fn open_from(path: PathBuf) -> Self {
        let state = session::load_state(&path).unwrap_or_default();
        let mut store = Self { state, path };
        store.normalize();
        store.save();
        store
    }

    /// Restores the store invariants: non-empty session map, valid current
    /// id, and no request marked in flight (nothing survives a restart).
    fn normalize(&mut self) {
        if self.state.sessions.is_empty() {
            let session = Session::new("New Chat 1");
            self.state.current_session_id = session.id.clone();
            self.state.sessions.insert(session.id.clone(), session);
        } else if !self
            .state
            .sessions
            .contains_key(&self.state.current_session_id)
        {
            // Arbitrary but deterministic: first key in the map.
            self.state.current_session_id = self
                .state
                .sessions
                .keys()
                .next()
                .cloned()
                .unwrap_or_default();
        }

        for session in self.state.sessions.values_mut() {
            session.is_typing = false;
        }
    }

    /// Mirrors the current state to disk (best-effort).
    fn save(&self) {
        session::save_state(&self.path, &self.state);
    }

    pub fn current_id(&self) -> &str {
        &self.state.current_session_id
    }

    /// Returns the active session.
    ///
    /// The normalization invariant guarantees it exists.
    pub fn current(&self) -> &Session {
        &self.state.sessions[&self.state.current_session_id]
    }

    fn current_mut(&mut self) -> &mut Session {
        self.state
            .sessions
            .get_mut(&self.state.current_session_id)
            .expect("current session must exist")
    }

    pub fn get(&self, id: &str) -> Option<&Session> {
        self.state.sessions.get(id)
    }

    /// Sessions ordered for display: newest first by creation time.
    pub fn sorted_sessions(&self) -> Vec<&Session> {
        let mut sessions: Vec<&Session> = self.state.sessions.values().collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        sessions
    }

    /// Creates a new session with an incrementing default title and makes
    /// it active. Returns the new id.
    pub fn new_session(&mut self) -> String {
        let title = format!("New Chat {}", self.state.sessions.len() + 1);
        let session = Session::new(title);
        let id = session.id.clone();
        self.state.sessions.insert(id.clone(), session);
        self.state.current_session_id = id.clone();
        self.save();
        id
    }

    /// Makes `id` the active session. Unknown ids are ignored.
    pub fn switch_session(&mut self, id: &str) -> bool {
        if !self.state.sessions.contains_key(id) {
            return false;
        }
        self.state.current_session_id = id.to_string();
        self.save();
        true
    }

    /// Overwrites the title of `id` with the trimmed new title.
    ///
    /// No-op (returns false) when the session is unknown or the title is
    /// blank after trimming.
    pub fn rename_session(&mut self, id: &str, title: &str) -> bool {
        let trimmed = title.trim();
        if trimmed.is_empty() {
            return false;
        }
        let Some(session) = self.state.sessions.get_mut(id) else {
            return false;
        };
        session.title = trimmed.to_string();
        self.save();
        true
    }

    /// Removes the session. When the active session is deleted, switches to
    /// the first remaining session, or synthesizes a fresh one if none
    /// remain.
    pub fn delete_session(&mut self, id: &str) -> bool {
        if self.state.sessions.remove(id).is_none() {
            return false;
        }

        if id == self.state.current_session_id {
            match self.state.sessions.keys().next().cloned() {
                Some(next) => self.state.current_session_id = next,
                None => {
                    let session = Session::new("New Chat 1");
                    self.state.current_session_id = session.id.clone();
                    self.state.sessions.insert(session.id.clone(), session);
                }
            }
        }
        self.save();
        true
    }

    /// Pure read: the downloadable view of a session.
    pub fn export_session(&self, id: &str) -> Option<SessionExport> {
        self.state.sessions.get(id).map(SessionExport::from)
    }

    /// Starts a send on the active session.
    ///
    /// Returns `None` when the text is blank or a request is already in
    /// flight. Otherwise appends the user message, clears any error flag,
    /// marks the session typing, and returns the full history to post.
    pub fn begin_send(&mut self, text: &str) -> Option<Vec<Message>> {
        let text = text.trim();
        if text.is_empty() || self.current().is_typing {
            return None;
        }

        let session = self.current_mut();
        session.messages.push(Message::user(text));
        session.error = None;
        session.is_typing = true;
        let history = session.messages.clone();
        self.save();
        Some(history)
    }

    /// Starts a retry of the last failed request on the active session.
    ///
    /// Returns `None` when no error flag is set or a request is in flight.
    /// Otherwise clears the error flag, marks the session typing, and
    /// returns the full history to re-send.
    pub fn begin_retry(&mut self) -> Option<Vec<Message>> {
        let session = self.current();
        if session.is_typing || session.error.is_none() {
            return None;
        }

        let session = self.current_mut();
        session.error = None;
        session.is_typing = true;
        let history = session.messages.clone();
        self.save();
        Some(history)
    }

    /// Resolves an in-flight request with the generated reply.
    pub fn complete_reply(&mut self, text: &str) {
        let session = self.current_mut();
        session.messages.push(Message::model(text));
        session.is_typing = false;
        session.error = None;
        self.save();
    }

    /// Resolves an in-flight request as failed: clears the typing flag and
    /// points the error flag at the user message whose request failed.
    pub fn fail_reply(&mut self) {
        let session = self.current_mut();
        session.is_typing = false;
        session.error = session
            .messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.id.clone());
        self.save();
    }
}
