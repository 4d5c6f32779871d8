use std::sync::{Arc, Mutex};

use tracing::info;

use aura_relay::PresenceDirectory;
use aura_shared::types::Peer;
use aura_store::Database;

use crate::commands::CommandError;
use crate::state::AppState;

fn lock(state: &Arc<Mutex<AppState>>) -> std::sync::MutexGuard<'_, AppState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

/// Sign in: persist the profile and session, announce presence.
pub fn log_in(
    state: &Arc<Mutex<AppState>>,
    presence: &PresenceDirectory,
    database: Database,
    user: Peer,
) -> Result<Peer, CommandError> {
    database.save_session(&user)?;
    presence.announce(user.clone());

    let mut guard = lock(state);
    guard.database = Some(database);
    guard.current_user = Some(user.clone());

    info!(user = %user.id.short(), name = %user.username, "Signed in");
    Ok(user)
}

/// Restore the previously signed-in user without a fresh login.
pub fn restore_session(
    state: &Arc<Mutex<AppState>>,
    presence: &PresenceDirectory,
    database: Database,
) -> Result<Option<Peer>, CommandError> {
    let restored = database.load_session()?;

    let mut guard = lock(state);
    guard.database = Some(database);
    if let Some(user) = &restored {
        presence.announce(user.clone());
        guard.current_user = Some(user.clone());
        info!(user = %user.id.short(), "Session restored");
    }
    Ok(restored)
}

/// Sign out: soft-offline in the directory, clear the stored session.
pub fn log_out(
    state: &Arc<Mutex<AppState>>,
    presence: &PresenceDirectory,
) -> Result<(), CommandError> {
    let mut guard = lock(state);

    let user = guard.current_user.take().ok_or(CommandError::NotSignedIn)?;
    presence.set_offline(&user.id);

    if let Some(db) = &guard.database {
        db.clear_session()?;
    }
    guard.selected_peer = None;
    guard.compose_text.clear();

    info!(user = %user.id.short(), "Signed out");
    Ok(())
}
