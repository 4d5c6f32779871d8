//! Push-to-toggle dictation command.

use std::sync::{Arc, Mutex};

use crate::commands::CommandError;
use crate::state::AppState;

/// Toggle dictation capture. Returns whether dictation is active after
/// the call. The [`aura_media::Dictation`] is taken out of the state for
/// the await and restored afterwards.
pub async fn toggle_dictation(state: &Arc<Mutex<AppState>>) -> Result<bool, CommandError> {
    let mut dictation = {
        let mut guard = state.lock().unwrap_or_else(|e| e.into_inner());
        guard
            .dictation
            .take()
            .ok_or(CommandError::NotReady("dictation"))?
    };

    let result = dictation.toggle().await;

    let mut guard = state.lock().unwrap_or_else(|e| e.into_inner());
    guard.is_dictating = matches!(result, Ok(true)) && dictation.is_active();
    guard.dictation = Some(dictation);

    result.map_err(CommandError::from)
}
