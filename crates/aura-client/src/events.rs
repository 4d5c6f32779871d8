//! Events pushed from the client core to the UI layer.

use serde::Serialize;
use tokio::sync::mpsc;

pub const EVENT_NEW_MESSAGE: &str = "new-message";
pub const EVENT_INCOMING_CALL: &str = "incoming-call";
pub const EVENT_CALL_STATE_CHANGED: &str = "call-state-changed";
pub const EVENT_CALL_FAILED: &str = "call-failed";
pub const EVENT_REMOTE_STREAM_CHANGED: &str = "remote-stream-changed";
pub const EVENT_PRESENCE_CHANGED: &str = "presence-changed";
pub const EVENT_DICTATION_TRANSCRIPT: &str = "dictation-transcript";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessagePayload {
    pub message_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingCallPayload {
    pub from_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptPayload {
    pub fragment: String,
}

/// A named event with a JSON payload, delivered over a channel the UI
/// shell drains.
#[derive(Debug, Clone)]
pub struct ClientEvent {
    pub name: &'static str,
    pub payload: serde_json::Value,
}

pub fn emit_event<S: Serialize>(tx: &mpsc::Sender<ClientEvent>, event: &'static str, payload: S) {
    let payload = match serde_json::to_value(payload) {
        Ok(value) => value,
        Err(e) => {
            tracing::error!(event, error = %e, "Failed to serialize event payload");
            return;
        }
    };
    if tx.try_send(ClientEvent { name: event, payload }).is_err() {
        tracing::error!(event, "Failed to emit event, channel full or closed");
    }
}
