use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::info;

use aura_shared::types::UserId;
use aura_store::{DeliveryStatus, Message, MessageKind};

use crate::assistant::{AssistantResponder, AssistantRole, AssistantTurn, FALLBACK_REPLY};
use crate::commands::CommandError;
use crate::state::AppState;

/// Result of a send: the stored message, plus the assistant's reply when
/// the receiver was the assistant contact.
#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub message: Message,
    pub assistant_reply: Option<Message>,
}

fn lock(state: &Arc<Mutex<AppState>>) -> std::sync::MutexGuard<'_, AppState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

/// Send a text or image message. Messages to the assistant contact are
/// answered inline and the reply persisted as an incoming message.
pub async fn send_message(
    state: &Arc<Mutex<AppState>>,
    assistant: &Arc<dyn AssistantResponder>,
    receiver: &UserId,
    content: &str,
    media_url: Option<String>,
) -> Result<SendOutcome, CommandError> {
    if content.trim().is_empty() && media_url.is_none() {
        return Err(CommandError::EmptyMessage);
    }

    let (sender, message) = {
        let guard = lock(state);
        let user = guard.current_user.as_ref().ok_or(CommandError::NotSignedIn)?;
        let db = guard.database.as_ref().ok_or(CommandError::NoDatabase)?;

        let message = match media_url {
            Some(url) => Message::image(user.id.clone(), receiver.clone(), content, url),
            None => Message::text(user.id.clone(), receiver.clone(), content),
        };
        db.insert_message(&message)?;
        (user.id.clone(), message)
    };

    info!(msg_id = %message.id, to = %receiver.short(), "Message sent");

    let assistant_reply = if receiver.is_assistant() && message.kind == MessageKind::Text {
        let history = conversation_history(state, &sender, receiver)?;
        let reply_text = match assistant.respond(content, &history).await {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, "Assistant responder failed");
                FALLBACK_REPLY.to_string()
            }
        };

        let mut reply = Message::text(receiver.clone(), sender, reply_text);
        // The reply lands straight in the local store
        reply.status = DeliveryStatus::Delivered;

        let guard = lock(state);
        let db = guard.database.as_ref().ok_or(CommandError::NoDatabase)?;
        db.insert_message(&reply)?;
        Some(reply)
    } else {
        None
    };

    Ok(SendOutcome {
        message,
        assistant_reply,
    })
}

fn conversation_history(
    state: &Arc<Mutex<AppState>>,
    user: &UserId,
    assistant_id: &UserId,
) -> Result<Vec<AssistantTurn>, CommandError> {
    let guard = lock(state);
    let db = guard.database.as_ref().ok_or(CommandError::NoDatabase)?;

    let turns = db
        .conversation(user, assistant_id, 50, 0)?
        .into_iter()
        .map(|m| AssistantTurn {
            role: if &m.sender == user {
                AssistantRole::User
            } else {
                AssistantRole::Model
            },
            text: m.content,
        })
        .collect();
    Ok(turns)
}

/// The open conversation with one peer, oldest first.
pub fn get_conversation(
    state: &Arc<Mutex<AppState>>,
    peer: &UserId,
    limit: u32,
    offset: u32,
) -> Result<Vec<Message>, CommandError> {
    let guard = lock(state);
    let user = guard.current_user.as_ref().ok_or(CommandError::NotSignedIn)?;
    let db = guard.database.as_ref().ok_or(CommandError::NoDatabase)?;
    Ok(db.conversation(&user.id, peer, limit, offset)?)
}

/// Mark everything from `peer` as read (the conversation was opened).
pub fn mark_conversation_read(
    state: &Arc<Mutex<AppState>>,
    peer: &UserId,
) -> Result<usize, CommandError> {
    let guard = lock(state);
    let user = guard.current_user.as_ref().ok_or(CommandError::NotSignedIn)?;
    let db = guard.database.as_ref().ok_or(CommandError::NoDatabase)?;
    Ok(db.mark_read(&user.id, peer)?)
}

/// Acknowledge receipt of everything addressed to the signed-in user.
pub fn mark_incoming_delivered(state: &Arc<Mutex<AppState>>) -> Result<usize, CommandError> {
    let guard = lock(state);
    let user = guard.current_user.as_ref().ok_or(CommandError::NotSignedIn)?;
    let db = guard.database.as_ref().ok_or(CommandError::NoDatabase)?;
    Ok(db.mark_delivered(&user.id)?)
}

/// Per-sender unread badge counts.
pub fn unread_counts(state: &Arc<Mutex<AppState>>) -> Result<HashMap<UserId, u32>, CommandError> {
    let guard = lock(state);
    let user = guard.current_user.as_ref().ok_or(CommandError::NotSignedIn)?;
    let db = guard.database.as_ref().ok_or(CommandError::NoDatabase)?;
    Ok(db.unread_counts(&user.id)?)
}

/// Irreversibly purge one conversation.
pub fn clear_conversation(
    state: &Arc<Mutex<AppState>>,
    peer: &UserId,
) -> Result<usize, CommandError> {
    let guard = lock(state);
    let user = guard.current_user.as_ref().ok_or(CommandError::NotSignedIn)?;
    let db = guard.database.as_ref().ok_or(CommandError::NoDatabase)?;
    Ok(db.clear_conversation(&user.id, peer)?)
}

/// Case-insensitive search within the open conversation.
pub fn search_messages(
    state: &Arc<Mutex<AppState>>,
    peer: &UserId,
    query: &str,
) -> Result<Vec<Message>, CommandError> {
    let guard = lock(state);
    let user = guard.current_user.as_ref().ok_or(CommandError::NotSignedIn)?;
    let db = guard.database.as_ref().ok_or(CommandError::NoDatabase)?;
    Ok(db.search_conversation(&user.id, peer, query)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aura_shared::constants::ASSISTANT_USER_ID;
    use aura_shared::types::Peer;
    use aura_store::Database;

    use crate::assistant::CannedResponder;

    fn signed_in_state() -> (tempfile::TempDir, Arc<Mutex<AppState>>) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();

        let mut app = AppState::new();
        app.database = Some(db);
        app.current_user = Some(Peer::new(UserId::new("u1"), "alice", "avatar://u1"));
        (dir, Arc::new(Mutex::new(app)))
    }

    fn responder() -> Arc<dyn AssistantResponder> {
        Arc::new(CannedResponder)
    }

    #[tokio::test]
    async fn test_send_message_persists() {
        let (_dir, state) = signed_in_state();

        let outcome = send_message(&state, &responder(), &UserId::new("u2"), "hello", None)
            .await
            .unwrap();

        assert!(outcome.assistant_reply.is_none());
        assert_eq!(outcome.message.status, DeliveryStatus::Sent);

        let convo = get_conversation(&state, &UserId::new("u2"), 50, 0).unwrap();
        assert_eq!(convo.len(), 1);
        assert_eq!(convo[0].content, "hello");
    }

    #[tokio::test]
    async fn test_assistant_reply_is_persisted() {
        let (_dir, state) = signed_in_state();
        let assistant_id = UserId::new(ASSISTANT_USER_ID);

        let outcome = send_message(&state, &responder(), &assistant_id, "hello aura", None)
            .await
            .unwrap();

        let reply = outcome.assistant_reply.expect("assistant must reply");
        assert_eq!(reply.sender, assistant_id);
        assert_eq!(reply.receiver, UserId::new("u1"));

        let convo = get_conversation(&state, &assistant_id, 50, 0).unwrap();
        assert_eq!(convo.len(), 2);
        assert_eq!(convo[1].id, reply.id);
    }

    #[tokio::test]
    async fn test_empty_message_rejected() {
        let (_dir, state) = signed_in_state();
        let result = send_message(&state, &responder(), &UserId::new("u2"), "   ", None).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_read_flow_and_unread_counts() {
        let (_dir, state) = signed_in_state();

        // Incoming messages from u2
        {
            let guard = state.lock().unwrap();
            let db = guard.database.as_ref().unwrap();
            db.insert_message(&Message::text(UserId::new("u2"), UserId::new("u1"), "one"))
                .unwrap();
            db.insert_message(&Message::text(UserId::new("u2"), UserId::new("u1"), "two"))
                .unwrap();
        }

        mark_incoming_delivered(&state).unwrap();
        let counts = unread_counts(&state).unwrap();
        assert_eq!(counts.get(&UserId::new("u2")), Some(&2));

        mark_conversation_read(&state, &UserId::new("u2")).unwrap();
        let counts = unread_counts(&state).unwrap();
        assert!(counts.is_empty());
    }

    #[tokio::test]
    async fn test_requires_sign_in() {
        let state = Arc::new(Mutex::new(AppState::new()));
        let result = send_message(&state, &responder(), &UserId::new("u2"), "hi", None).await;
        assert!(matches!(result, Err(CommandError::NotSignedIn)));
    }
}
