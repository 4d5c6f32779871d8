//! Application state shared across all client commands.
//!
//! The [`AppState`] struct is wrapped in `Arc<Mutex<>>` so every command
//! handler can access it from the UI thread.

use aura_media::{CallCommand, Dictation};
use aura_shared::types::{Peer, UserId};
use aura_store::Database;
use tokio::sync::mpsc;

/// Central application state.
pub struct AppState {
    /// The signed-in user. `None` until login.
    pub current_user: Option<Peer>,

    /// Handle to the local SQLite database.
    /// `None` until the session is opened.
    pub database: Option<Database>,

    /// Sender half of the channel used to dispatch commands to the call
    /// session task (start, accept, hangup, toggles).
    pub call_cmd_tx: Option<mpsc::Sender<CallCommand>>,

    /// The dictation capture session. Taken out of the state for the
    /// duration of an async toggle, then put back.
    pub dictation: Option<Dictation>,

    /// Whether dictation is currently capturing.
    pub is_dictating: bool,

    /// The compose-input text buffer; dictation transcripts append here.
    pub compose_text: String,

    /// The conversation currently open in the UI.
    pub selected_peer: Option<UserId>,
}

impl AppState {
    /// Create a new, uninitialised application state.
    pub fn new() -> Self {
        Self {
            current_user: None,
            database: None,
            call_cmd_tx: None,
            dictation: None,
            is_dictating: false,
            compose_text: String::new(),
            selected_peer: None,
        }
    }

    /// Append a transcript fragment to the compose buffer, inserting a
    /// separating space unless the buffer is empty or already ends with
    /// one.
    pub fn append_transcript(&mut self, fragment: &str) {
        if !(self.compose_text.is_empty() || self.compose_text.ends_with(' ')) {
            self.compose_text.push(' ');
        }
        self.compose_text.push_str(fragment);
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
