//! The call session state machine.
//!
//! One [`CallSession`] exists per signed-in user. It exclusively owns the
//! local media stream and the negotiation engine for the active call, and
//! is driven by three inputs: UI commands, signals observed on the relay,
//! and negotiation engine events. Every call-ending path converges on one
//! idempotent teardown routine.
//!
//! Status transitions:
//!
//! | status    | entered on                              | left on                              |
//! |-----------|-----------------------------------------|--------------------------------------|
//! | idle      | startup / teardown                      | start command, incoming offer        |
//! | calling   | offer sent                              | answer, hangup, cancel, ring timeout |
//! | receiving | offer observed while idle               | accept, decline, hangup, timeout     |
//! | connected | answer applied/sent + remote track live | hangup, connection failure           |

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use aura_relay::SignalChannel;
use aura_shared::constants::{CHANNEL_CAPACITY, RING_TIMEOUT_SECS};
use aura_shared::protocol::{IceCandidate, SessionDescription, Signal, SignalKind};
use aura_shared::types::{Peer, UserId};

use crate::capture::{
    LocalStream, MediaConstraints, MediaDevices, MediaError, RemoteStream, TrackKind,
};
use crate::engine::{EngineError, EngineEvent, EngineFactory, NegotiationEngine};

#[derive(Error, Debug)]
pub enum CallError {
    #[error("The assistant only takes audio input via dictation, not video calls")]
    AssistantAudioOnly,

    #[error("Already in a call")]
    Busy,

    #[error("No incoming call to accept")]
    NothingToAccept,

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    Idle,
    Calling,
    Receiving,
    Connected,
}

/// Immutable view of the session handed to the UI layer.
#[derive(Debug, Clone, Serialize)]
pub struct CallStateSnapshot {
    pub status: CallStatus,
    pub remote: Option<UserId>,
    pub microphone_enabled: bool,
    pub camera_enabled: bool,
    pub has_remote_stream: bool,
}

/// Commands sent *into* the call session task.
#[derive(Debug)]
pub enum CallCommand {
    Start(Peer),
    Accept,
    HangUp,
    ToggleMicrophone,
    ToggleCamera,
    Snapshot(oneshot::Sender<CallStateSnapshot>),
}

/// Notifications sent *from* the call session to the UI layer.
#[derive(Debug, Clone)]
pub enum CallEvent {
    StateChanged(CallStateSnapshot),
    IncomingCall { from: UserId },
    RemoteStreamChanged(Option<RemoteStream>),
    CallFailed { reason: String },
}

#[derive(Debug, Clone)]
pub struct CallSessionConfig {
    /// How long an unanswered outgoing or incoming call rings before it is
    /// terminated through the hangup path.
    pub ring_timeout: Duration,
}

impl Default for CallSessionConfig {
    fn default() -> Self {
        Self {
            ring_timeout: Duration::from_secs(RING_TIMEOUT_SECS),
        }
    }
}

pub struct CallSession {
    channel: SignalChannel,
    devices: Arc<dyn MediaDevices>,
    factory: Arc<dyn EngineFactory>,
    config: CallSessionConfig,
    events: mpsc::Sender<CallEvent>,
    engine_tx: mpsc::Sender<EngineEvent>,

    status: CallStatus,
    remote: Option<UserId>,
    /// Latest unconsumed incoming offer; a newer offer replaces it.
    pending_offer: Option<(UserId, SessionDescription)>,
    engine: Option<Box<dyn NegotiationEngine>>,
    local: Option<LocalStream>,
    remote_stream: Option<RemoteStream>,
    answer_applied: bool,
    answer_sent: bool,
    ring_deadline: Option<Instant>,
}

impl CallSession {
    /// Build a session plus its event and engine-event receivers. The
    /// engine receiver feeds [`CallSession::handle_engine_event`]; the
    /// spawned driver in [`spawn_call_session`] wires both.
    pub fn new(
        channel: SignalChannel,
        devices: Arc<dyn MediaDevices>,
        factory: Arc<dyn EngineFactory>,
        config: CallSessionConfig,
    ) -> (Self, mpsc::Receiver<CallEvent>, mpsc::Receiver<EngineEvent>) {
        let (event_tx, event_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (engine_tx, engine_rx) = mpsc::channel(CHANNEL_CAPACITY);

        let session = Self {
            channel,
            devices,
            factory,
            config,
            events: event_tx,
            engine_tx,
            status: CallStatus::Idle,
            remote: None,
            pending_offer: None,
            engine: None,
            local: None,
            remote_stream: None,
            answer_applied: false,
            answer_sent: false,
            ring_deadline: None,
        };

        (session, event_rx, engine_rx)
    }

    pub fn status(&self) -> CallStatus {
        self.status
    }

    pub fn remote(&self) -> Option<&UserId> {
        self.remote.as_ref()
    }

    pub fn has_engine(&self) -> bool {
        self.engine.is_some()
    }

    pub fn has_local_media(&self) -> bool {
        self.local.is_some()
    }

    pub fn ring_deadline(&self) -> Option<Instant> {
        self.ring_deadline
    }

    pub fn snapshot(&self) -> CallStateSnapshot {
        CallStateSnapshot {
            status: self.status,
            remote: self.remote.clone(),
            microphone_enabled: self
                .local
                .as_ref()
                .map(|l| l.is_enabled(TrackKind::Audio))
                .unwrap_or(false),
            camera_enabled: self
                .local
                .as_ref()
                .map(|l| l.is_enabled(TrackKind::Video))
                .unwrap_or(false),
            has_remote_stream: self.remote_stream.is_some(),
        }
    }

    /// Place an outgoing call. Rejects the assistant contact before any
    /// media or engine acquisition; at most one attempt is in flight.
    pub async fn start_call(&mut self, peer: &Peer) -> Result<(), CallError> {
        if peer.id.is_assistant() {
            info!("Rejected video call to the assistant contact");
            return Err(CallError::AssistantAudioOnly);
        }
        if self.status != CallStatus::Idle {
            return Err(CallError::Busy);
        }

        let mut local = self.devices.acquire(MediaConstraints::audio_video())?;

        let mut engine = match self.factory.create(&mut local, self.engine_tx.clone()).await {
            Ok(engine) => engine,
            Err(e) => {
                local.stop_all();
                return Err(e.into());
            }
        };

        let offer = match engine.create_offer().await {
            Ok(offer) => offer,
            Err(e) => {
                engine.close().await;
                local.stop_all();
                return Err(e.into());
            }
        };

        info!(to = %peer.id.short(), "Placing call");

        self.local = Some(local);
        self.engine = Some(engine);
        self.remote = Some(peer.id.clone());
        self.ring_deadline = Some(Instant::now() + self.config.ring_timeout);
        self.set_status(CallStatus::Calling).await;
        self.channel
            .send(peer.id.clone(), SignalKind::Offer(offer))
            .await;

        Ok(())
    }

    /// Answer the pending incoming offer.
    pub async fn accept_call(&mut self) -> Result<(), CallError> {
        if self.status != CallStatus::Receiving {
            return Err(CallError::NothingToAccept);
        }
        let Some((caller, offer)) = self.pending_offer.take() else {
            return Err(CallError::NothingToAccept);
        };

        let mut local = match self.devices.acquire(MediaConstraints::audio_video()) {
            Ok(local) => local,
            Err(e) => {
                // Permission refused while answering: decline so the
                // caller stops ringing
                self.teardown(true).await;
                return Err(e.into());
            }
        };

        let negotiated = match self.factory.create(&mut local, self.engine_tx.clone()).await {
            Ok(mut engine) => match engine.accept_offer(&offer).await {
                Ok(answer) => {
                    self.engine = Some(engine);
                    Ok(answer)
                }
                Err(e) => {
                    engine.close().await;
                    Err(e)
                }
            },
            Err(e) => Err(e),
        };

        match negotiated {
            Ok(answer) => {
                info!(from = %caller.short(), "Call accepted");
                self.local = Some(local);
                self.answer_sent = true;
                self.ring_deadline = None;
                self.emit_state().await;
                self.channel.send(caller, SignalKind::Answer(answer)).await;
                Ok(())
            }
            Err(e) => {
                local.stop_all();
                self.teardown(true).await;
                Err(e.into())
            }
        }
    }

    /// Hang up. Idempotent: a no-op while idle, full teardown otherwise.
    pub async fn hang_up(&mut self) {
        self.teardown(true).await;
    }

    /// Flip the microphone track's enabled flag. Never touches the engine
    /// or the call status.
    pub async fn toggle_microphone(&mut self) -> bool {
        let enabled = self
            .local
            .as_ref()
            .map(|l| l.toggle(TrackKind::Audio))
            .unwrap_or(false);
        self.emit_state().await;
        enabled
    }

    /// Flip the camera track's enabled flag. Never touches the engine or
    /// the call status.
    pub async fn toggle_camera(&mut self) -> bool {
        let enabled = self
            .local
            .as_ref()
            .map(|l| l.toggle(TrackKind::Video))
            .unwrap_or(false);
        self.emit_state().await;
        enabled
    }

    /// Feed one observed signal into the state machine. Signals addressed
    /// to another destination are ignored entirely.
    pub async fn handle_signal(&mut self, signal: Signal) {
        if &signal.to != self.channel.local() {
            debug!(to = %signal.to.short(), "Dropping signal for another destination");
            return;
        }

        match signal.kind {
            SignalKind::Offer(offer) => self.on_offer(signal.from, offer).await,
            SignalKind::Answer(answer) => self.on_answer(signal.from, answer).await,
            SignalKind::Candidate(candidate) => {
                self.on_candidate(signal.from, candidate).await;
            }
            SignalKind::Hangup => self.on_remote_hangup(signal.from).await,
        }
    }

    /// Feed one negotiation engine event into the state machine.
    pub async fn handle_engine_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::LocalCandidate(candidate) => {
                // Forward as soon as produced, in any status, while the
                // engine is still open.
                if self.engine.as_ref().is_some_and(|e| e.is_open()) {
                    if let Some(remote) = self.remote.clone() {
                        self.channel
                            .send(remote, SignalKind::Candidate(candidate))
                            .await;
                    }
                } else {
                    debug!("Dropping local candidate, engine closed");
                }
            }
            EngineEvent::RemoteTrack(track) => {
                debug!(kind = ?track.kind, "Remote track added");
                match &mut self.remote_stream {
                    Some(stream) => stream.push(track),
                    None => self.remote_stream = Some(RemoteStream::from(track)),
                }
                let _ = self
                    .events
                    .send(CallEvent::RemoteStreamChanged(self.remote_stream.clone()))
                    .await;
                self.maybe_connect().await;
            }
            EngineEvent::ConnectionFailed => {
                if self.status != CallStatus::Idle {
                    warn!("Negotiation engine failed, tearing down");
                    self.teardown(true).await;
                }
            }
        }
    }

    /// Invoked by the driver when the ring deadline passes.
    pub async fn ring_expired(&mut self) {
        match self.status {
            CallStatus::Calling | CallStatus::Receiving => {
                info!(
                    timeout_secs = self.config.ring_timeout.as_secs(),
                    "Call unanswered, hanging up"
                );
                self.teardown(true).await;
            }
            _ => self.ring_deadline = None,
        }
    }

    pub async fn handle_command(&mut self, command: CallCommand) {
        match command {
            CallCommand::Start(peer) => {
                if let Err(e) = self.start_call(&peer).await {
                    warn!(error = %e, "Call start rejected");
                    self.emit_failure(&e).await;
                }
            }
            CallCommand::Accept => {
                if let Err(e) = self.accept_call().await {
                    warn!(error = %e, "Call accept failed");
                    self.emit_failure(&e).await;
                }
            }
            CallCommand::HangUp => self.hang_up().await,
            CallCommand::ToggleMicrophone => {
                self.toggle_microphone().await;
            }
            CallCommand::ToggleCamera => {
                self.toggle_camera().await;
            }
            CallCommand::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    async fn on_offer(&mut self, from: UserId, offer: SessionDescription) {
        match self.status {
            CallStatus::Idle => {
                info!(from = %from.short(), "Incoming call");
                self.pending_offer = Some((from.clone(), offer));
                self.remote = Some(from.clone());
                self.ring_deadline = Some(Instant::now() + self.config.ring_timeout);
                self.set_status(CallStatus::Receiving).await;
                let _ = self.events.send(CallEvent::IncomingCall { from }).await;
            }
            CallStatus::Receiving => {
                // Last-writer-wins: the newest offer supersedes the one
                // still ringing.
                info!(from = %from.short(), "Pending offer replaced");
                self.pending_offer = Some((from.clone(), offer));
                self.remote = Some(from.clone());
                self.ring_deadline = Some(Instant::now() + self.config.ring_timeout);
                let _ = self.events.send(CallEvent::IncomingCall { from }).await;
            }
            CallStatus::Calling | CallStatus::Connected => {
                // No call-waiting
                debug!(from = %from.short(), "Ignoring offer while busy");
            }
        }
    }

    async fn on_answer(&mut self, from: UserId, answer: SessionDescription) {
        if self.status != CallStatus::Calling || Some(&from) != self.remote.as_ref() {
            debug!(from = %from.short(), "Ignoring unexpected answer");
            return;
        }

        let applied = match self.engine.as_mut() {
            Some(engine) => engine.apply_answer(&answer).await,
            None => return,
        };

        match applied {
            Ok(()) => {
                debug!(from = %from.short(), "Answer applied");
                self.answer_applied = true;
                self.ring_deadline = None;
                self.maybe_connect().await;
            }
            Err(e) => {
                warn!(error = %e, "Applying answer failed, tearing down");
                self.teardown(true).await;
            }
        }
    }

    async fn on_candidate(&mut self, from: UserId, candidate: IceCandidate) {
        if Some(&from) != self.remote.as_ref() {
            debug!(from = %from.short(), "Dropping candidate from unrelated peer");
            return;
        }
        match self.engine.as_mut().filter(|e| e.is_open()) {
            Some(engine) => {
                if let Err(e) = engine.add_remote_candidate(&candidate).await {
                    warn!(error = %e, "Failed to add remote candidate");
                }
            }
            None => {
                debug!("Discarding candidate, no active negotiation engine");
            }
        }
    }

    async fn on_remote_hangup(&mut self, from: UserId) {
        if self.status == CallStatus::Idle {
            return;
        }
        if Some(&from) != self.remote.as_ref() {
            debug!(from = %from.short(), "Ignoring hangup from unrelated peer");
            return;
        }
        info!(from = %from.short(), "Remote hangup");
        // Suppress the outbound echo: the peer already ended the call.
        self.teardown(false).await;
    }

    async fn maybe_connect(&mut self) {
        let negotiated = self.answer_applied || self.answer_sent;
        let ringing = matches!(self.status, CallStatus::Calling | CallStatus::Receiving);
        if ringing && negotiated && self.remote_stream.is_some() {
            self.ring_deadline = None;
            self.set_status(CallStatus::Connected).await;
        }
    }

    /// The single teardown routine every call-ending path converges on.
    /// Safe to invoke any number of times from any state.
    async fn teardown(&mut self, locally_initiated: bool) {
        if self.status == CallStatus::Idle && self.engine.is_none() && self.local.is_none() {
            return;
        }

        if locally_initiated {
            if let Some(remote) = self.remote.clone() {
                self.channel.send(remote, SignalKind::Hangup).await;
            }
        }

        if let Some(local) = self.local.take() {
            local.stop_all();
        }
        if let Some(mut engine) = self.engine.take() {
            engine.close().await;
        }

        self.remote_stream = None;
        self.pending_offer = None;
        self.remote = None;
        self.answer_applied = false;
        self.answer_sent = false;
        self.ring_deadline = None;

        info!(locally_initiated, "Call torn down");
        let _ = self
            .events
            .send(CallEvent::RemoteStreamChanged(None))
            .await;
        self.set_status(CallStatus::Idle).await;
    }

    async fn set_status(&mut self, status: CallStatus) {
        self.status = status;
        self.emit_state().await;
    }

    async fn emit_state(&self) {
        let _ = self
            .events
            .send(CallEvent::StateChanged(self.snapshot()))
            .await;
    }

    async fn emit_failure(&self, error: &CallError) {
        let _ = self
            .events
            .send(CallEvent::CallFailed {
                reason: error.to_string(),
            })
            .await;
    }
}

async fn ring_wait(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => futures::future::pending().await,
    }
}

/// Run a call session in a background task, driven by commands, observed
/// signals, engine events and the ring deadline.
pub fn spawn_call_session(
    channel: SignalChannel,
    devices: Arc<dyn MediaDevices>,
    factory: Arc<dyn EngineFactory>,
    config: CallSessionConfig,
) -> (mpsc::Sender<CallCommand>, mpsc::Receiver<CallEvent>) {
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<CallCommand>(CHANNEL_CAPACITY);
    let mut signals = channel.observe();
    let (mut session, event_rx, mut engine_rx) =
        CallSession::new(channel, devices, factory, config);

    tokio::spawn(async move {
        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    let Some(cmd) = cmd else { break };
                    session.handle_command(cmd).await;
                }
                signal = signals.recv() => {
                    let Some(signal) = signal else { break };
                    session.handle_signal(signal).await;
                }
                event = engine_rx.recv() => {
                    if let Some(event) = event {
                        session.handle_engine_event(event).await;
                    }
                }
                _ = ring_wait(session.ring_deadline()) => {
                    session.ring_expired().await;
                }
            }
        }
        info!("Call session loop terminated");
    });

    (cmd_tx, event_rx)
}
