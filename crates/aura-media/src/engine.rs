//! The negotiation engine seam.
//!
//! One engine instance exists per call attempt and is exclusively owned by
//! the [`crate::call::CallSession`], so teardown can guarantee closure
//! regardless of asynchronous callbacks still in flight. Events flow back
//! to the session over a channel rather than ad-hoc callbacks.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use aura_shared::protocol::{IceCandidate, SessionDescription};

use crate::capture::{LocalStream, RemoteTrack};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Negotiation error: {0}")]
    Negotiation(String),

    #[error("Negotiation engine closed")]
    Closed,
}

/// Asynchronous notifications from the negotiation engine.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A locally gathered ICE candidate, to be forwarded to the peer.
    LocalCandidate(IceCandidate),
    /// A remote media track went live.
    RemoteTrack(RemoteTrack),
    /// The connection failed and cannot recover.
    ConnectionFailed,
}

/// The peer-to-peer media connection performing offer/answer exchange and
/// ICE negotiation.
#[async_trait]
pub trait NegotiationEngine: Send + Sync {
    /// Create the local offer and install it as the local description.
    async fn create_offer(&mut self) -> Result<SessionDescription, EngineError>;

    /// Apply a remote offer and produce the local answer.
    async fn accept_offer(
        &mut self,
        offer: &SessionDescription,
    ) -> Result<SessionDescription, EngineError>;

    /// Apply the remote answer to a previously created offer.
    async fn apply_answer(&mut self, answer: &SessionDescription) -> Result<(), EngineError>;

    /// Feed a remote ICE candidate into negotiation.
    async fn add_remote_candidate(&mut self, candidate: &IceCandidate) -> Result<(), EngineError>;

    /// Release all network resources. Safe to call more than once.
    async fn close(&mut self);

    fn is_open(&self) -> bool;
}

/// Creates one engine per call attempt with the local media attached.
/// The stream is borrowed mutably so the engine can claim its frame
/// sources.
#[async_trait]
pub trait EngineFactory: Send + Sync {
    async fn create(
        &self,
        local: &mut LocalStream,
        events: mpsc::Sender<EngineEvent>,
    ) -> Result<Box<dyn NegotiationEngine>, EngineError>;
}
