//! Thin dispatchers forwarding UI actions to the call session task.

use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot};

use aura_media::{CallCommand, CallStateSnapshot};
use aura_shared::types::Peer;

use crate::commands::CommandError;
use crate::state::AppState;

fn command_sender(state: &Arc<Mutex<AppState>>) -> Result<mpsc::Sender<CallCommand>, CommandError> {
    state
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .call_cmd_tx
        .clone()
        .ok_or(CommandError::NotReady("call session"))
}

async fn dispatch(
    state: &Arc<Mutex<AppState>>,
    command: CallCommand,
) -> Result<(), CommandError> {
    command_sender(state)?
        .send(command)
        .await
        .map_err(|_| CommandError::CallSessionGone)
}

pub async fn start_call(state: &Arc<Mutex<AppState>>, peer: Peer) -> Result<(), CommandError> {
    dispatch(state, CallCommand::Start(peer)).await
}

pub async fn accept_call(state: &Arc<Mutex<AppState>>) -> Result<(), CommandError> {
    dispatch(state, CallCommand::Accept).await
}

pub async fn hang_up(state: &Arc<Mutex<AppState>>) -> Result<(), CommandError> {
    dispatch(state, CallCommand::HangUp).await
}

pub async fn toggle_mute(state: &Arc<Mutex<AppState>>) -> Result<(), CommandError> {
    dispatch(state, CallCommand::ToggleMicrophone).await
}

pub async fn toggle_camera(state: &Arc<Mutex<AppState>>) -> Result<(), CommandError> {
    dispatch(state, CallCommand::ToggleCamera).await
}

/// Current call state, for UI initialisation.
pub async fn call_snapshot(
    state: &Arc<Mutex<AppState>>,
) -> Result<CallStateSnapshot, CommandError> {
    let (reply_tx, reply_rx) = oneshot::channel();
    dispatch(state, CallCommand::Snapshot(reply_tx)).await?;
    reply_rx.await.map_err(|_| CommandError::CallSessionGone)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use aura_media::{
        spawn_call_session, CallSessionConfig, CallStatus, EngineError, EngineEvent, EngineFactory,
        LocalStream, MediaConstraints, MediaDevices, MediaError, NegotiationEngine,
    };
    use aura_relay::{RelayHub, SignalChannel};
    use aura_shared::protocol::{SdpKind, SessionDescription};
    use aura_shared::types::UserId;

    struct NoopDevices;

    impl MediaDevices for NoopDevices {
        fn acquire(&self, _constraints: MediaConstraints) -> Result<LocalStream, MediaError> {
            Ok(LocalStream::default())
        }
    }

    struct NoopEngine;

    #[async_trait::async_trait]
    impl NegotiationEngine for NoopEngine {
        async fn create_offer(&mut self) -> Result<SessionDescription, EngineError> {
            Ok(SessionDescription {
                kind: SdpKind::Offer,
                sdp: "noop".into(),
            })
        }

        async fn accept_offer(
            &mut self,
            _offer: &SessionDescription,
        ) -> Result<SessionDescription, EngineError> {
            Ok(SessionDescription {
                kind: SdpKind::Answer,
                sdp: "noop".into(),
            })
        }

        async fn apply_answer(
            &mut self,
            _answer: &SessionDescription,
        ) -> Result<(), EngineError> {
            Ok(())
        }

        async fn add_remote_candidate(
            &mut self,
            _candidate: &aura_shared::protocol::IceCandidate,
        ) -> Result<(), EngineError> {
            Ok(())
        }

        async fn close(&mut self) {}

        fn is_open(&self) -> bool {
            true
        }
    }

    struct NoopFactory;

    #[async_trait::async_trait]
    impl EngineFactory for NoopFactory {
        async fn create(
            &self,
            _local: &mut LocalStream,
            _events: tokio::sync::mpsc::Sender<EngineEvent>,
        ) -> Result<Box<dyn NegotiationEngine>, EngineError> {
            Ok(Box::new(NoopEngine))
        }
    }

    #[tokio::test]
    async fn test_snapshot_round_trip() {
        let hub = Arc::new(RelayHub::new());
        let channel = SignalChannel::new(UserId::new("u1"), hub);
        let (cmd_tx, _events) = spawn_call_session(
            channel,
            Arc::new(NoopDevices),
            Arc::new(NoopFactory),
            CallSessionConfig::default(),
        );

        let state = Arc::new(Mutex::new(AppState::new()));
        state.lock().unwrap().call_cmd_tx = Some(cmd_tx);

        let snapshot = call_snapshot(&state).await.unwrap();
        assert_eq!(snapshot.status, CallStatus::Idle);
        assert!(snapshot.remote.is_none());
    }

    #[tokio::test]
    async fn test_commands_require_session() {
        let state = Arc::new(Mutex::new(AppState::new()));
        assert!(matches!(
            hang_up(&state).await,
            Err(CommandError::NotReady(_))
        ));
    }
}
