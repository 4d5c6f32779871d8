//! Client shell for the Aura messaging app: application state, the
//! command surface invoked by the UI, and the bridge translating core
//! events into UI notifications.

pub mod assistant;
pub mod commands;
pub mod events;
pub mod state;

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing_subscriber::{fmt, EnvFilter};

use aura_media::{
    spawn_call_session, CallEvent, CallSessionConfig, Dictation, DictationEvent, EngineFactory,
    MediaDevices, TranscriptionService,
};
use aura_relay::{PresenceDirectory, SignalChannel, SignalTransport};
use aura_shared::constants::CHANNEL_CAPACITY;
use aura_shared::types::UserId;

use crate::assistant::AssistantResponder;
use crate::events::{
    emit_event, ClientEvent, IncomingCallPayload, TranscriptPayload, EVENT_CALL_FAILED,
    EVENT_CALL_STATE_CHANGED, EVENT_DICTATION_TRANSCRIPT, EVENT_INCOMING_CALL,
    EVENT_REMOTE_STREAM_CHANGED,
};
use crate::state::AppState;

/// Initialise the tracing subscriber with per-crate defaults, honouring
/// `RUST_LOG` when set.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("aura_client=debug,aura_relay=debug,aura_media=debug,aura_store=info,warn")
    });

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    tracing::info!("Starting Aura client");
}

/// External collaborators the client core is wired to.
pub struct ClientDeps {
    pub transport: Arc<dyn SignalTransport>,
    pub devices: Arc<dyn MediaDevices>,
    pub engines: Arc<dyn EngineFactory>,
    pub transcriber: Arc<dyn TranscriptionService>,
    pub assistant: Arc<dyn AssistantResponder>,
}

/// A running client core for one local user.
pub struct ClientRuntime {
    pub state: Arc<Mutex<AppState>>,
    pub presence: PresenceDirectory,
    pub assistant: Arc<dyn AssistantResponder>,
    /// UI-facing event stream produced by the bridge task.
    pub events: mpsc::Receiver<ClientEvent>,
}

/// Assemble the client core: signal channel, call session task, dictation
/// session and the event bridge. Must be called within a tokio runtime.
pub fn start_client(
    local: UserId,
    deps: ClientDeps,
    presence: PresenceDirectory,
    call_config: CallSessionConfig,
) -> ClientRuntime {
    let channel = SignalChannel::new(local, deps.transport);
    let (call_cmd_tx, call_events) =
        spawn_call_session(channel, deps.devices.clone(), deps.engines, call_config);
    let (dictation, dictation_events) = Dictation::new(deps.devices, deps.transcriber);

    let mut app = AppState::new();
    app.call_cmd_tx = Some(call_cmd_tx);
    app.dictation = Some(dictation);
    let state = Arc::new(Mutex::new(app));

    let events = spawn_event_bridge(state.clone(), call_events, dictation_events);

    ClientRuntime {
        state,
        presence,
        assistant: deps.assistant,
        events,
    }
}

/// Translate core events into UI notifications. Dictation transcripts are
/// also appended to the compose buffer here, so the UI only has to render
/// the state it is told about.
pub fn spawn_event_bridge(
    state: Arc<Mutex<AppState>>,
    mut call_events: mpsc::Receiver<CallEvent>,
    mut dictation_events: mpsc::Receiver<DictationEvent>,
) -> mpsc::Receiver<ClientEvent> {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

    tokio::spawn(async move {
        loop {
            tokio::select! {
                event = call_events.recv() => {
                    let Some(event) = event else { break };
                    match event {
                        CallEvent::StateChanged(snapshot) => {
                            emit_event(&tx, EVENT_CALL_STATE_CHANGED, snapshot);
                        }
                        CallEvent::IncomingCall { from } => {
                            emit_event(&tx, EVENT_INCOMING_CALL, IncomingCallPayload {
                                from_id: from.to_string(),
                            });
                        }
                        CallEvent::RemoteStreamChanged(stream) => {
                            emit_event(&tx, EVENT_REMOTE_STREAM_CHANGED, stream);
                        }
                        CallEvent::CallFailed { reason } => {
                            emit_event(&tx, EVENT_CALL_FAILED, serde_json::json!({ "reason": reason }));
                        }
                    }
                }
                event = dictation_events.recv() => {
                    let Some(event) = event else { break };
                    match event {
                        DictationEvent::Started => {
                            state.lock().unwrap_or_else(|e| e.into_inner()).is_dictating = true;
                        }
                        DictationEvent::Stopped => {
                            state.lock().unwrap_or_else(|e| e.into_inner()).is_dictating = false;
                        }
                        DictationEvent::Transcript(fragment) => {
                            state
                                .lock()
                                .unwrap_or_else(|e| e.into_inner())
                                .append_transcript(&fragment);
                            emit_event(&tx, EVENT_DICTATION_TRANSCRIPT, TranscriptPayload {
                                fragment,
                            });
                        }
                    }
                }
            }
        }
        tracing::debug!("Event bridge terminated");
    });

    rx
}
