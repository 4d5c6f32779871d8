//! Relay transport abstraction and the in-process hub implementation.
//!
//! The relay carries signals between peers. The transport contract is
//! deliberately minimal so a hosted realtime store or a WebSocket relay can
//! back it: `publish` writes a signal addressed to its destination, and
//! `updates` blocks until the destination's state changes, then returns the
//! signals currently visible there.
//!
//! Delivery model: offer, answer and hangup live in last-value slots (a new
//! offer supersedes any pending offer, last-writer-wins). Candidates go
//! through an append-only queue and are drained exactly once, never
//! coalesced. Slot values may be re-delivered unchanged on later updates;
//! the observer side de-duplicates them.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Notify;
use tracing::debug;

use aura_shared::protocol::{Signal, SignalKind};
use aura_shared::types::UserId;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Relay backend error: {0}")]
    Backend(String),

    #[error("Relay closed")]
    Closed,
}

/// Delivery of signaling payloads between two identified peers.
#[async_trait]
pub trait SignalTransport: Send + Sync {
    /// Publish a signal addressed to `signal.to`. Best-effort.
    async fn publish(&self, signal: Signal) -> Result<(), RelayError>;

    /// Wait until the mailbox of `dest` changes, then return the signals
    /// currently visible for it. Slot kinds may repeat across calls;
    /// queued candidates are returned exactly once.
    async fn updates(&self, dest: &UserId) -> Result<Vec<Signal>, RelayError>;
}

#[derive(Debug, Default)]
struct Mailbox {
    offer: Option<Signal>,
    answer: Option<Signal>,
    hangup: Option<Signal>,
    candidates: VecDeque<Signal>,
    version: u64,
    delivered_version: u64,
}

impl Mailbox {
    fn apply(&mut self, signal: Signal) {
        match signal.kind {
            // Last-writer-wins: a new offer replaces any pending offer,
            // regardless of sender.
            SignalKind::Offer(_) => self.offer = Some(signal),
            SignalKind::Answer(_) => self.answer = Some(signal),
            SignalKind::Hangup => self.hangup = Some(signal),
            // Each candidate must be observable individually.
            SignalKind::Candidate(_) => self.candidates.push_back(signal),
        }
        self.version += 1;
    }

    fn visible(&mut self) -> Vec<Signal> {
        let mut out = Vec::new();
        out.extend(self.offer.clone());
        out.extend(self.answer.clone());
        out.extend(self.hangup.clone());
        out.extend(self.candidates.drain(..));
        out
    }
}

#[derive(Default)]
struct HubState {
    mailboxes: HashMap<UserId, Mailbox>,
    wakers: HashMap<UserId, Arc<Notify>>,
}

/// In-process stand-in for the hosted realtime relay. Cheap to clone;
/// both endpoints of a test or a same-process pair share one hub.
#[derive(Clone, Default)]
pub struct RelayHub {
    state: Arc<Mutex<HubState>>,
}

impl RelayHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Non-draining diagnostic view of a destination's mailbox: current
    /// slot values plus queued candidates.
    pub fn pending(&self, dest: &UserId) -> Vec<Signal> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let Some(mailbox) = state.mailboxes.get(dest) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        out.extend(mailbox.offer.clone());
        out.extend(mailbox.answer.clone());
        out.extend(mailbox.hangup.clone());
        out.extend(mailbox.candidates.iter().cloned());
        out
    }

    fn waker(&self, dest: &UserId) -> Arc<Notify> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state
            .wakers
            .entry(dest.clone())
            .or_insert_with(|| Arc::new(Notify::new()))
            .clone()
    }
}

#[async_trait]
impl SignalTransport for RelayHub {
    async fn publish(&self, signal: Signal) -> Result<(), RelayError> {
        let waker = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            let dest = signal.to.clone();
            debug!(
                from = %signal.from.short(),
                to = %dest.short(),
                kind = signal.kind.label(),
                "Relay publish"
            );
            state.mailboxes.entry(dest.clone()).or_default().apply(signal);
            state
                .wakers
                .entry(dest)
                .or_insert_with(|| Arc::new(Notify::new()))
                .clone()
        };
        waker.notify_one();
        Ok(())
    }

    async fn updates(&self, dest: &UserId) -> Result<Vec<Signal>, RelayError> {
        let waker = self.waker(dest);
        loop {
            {
                let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
                let mailbox = state.mailboxes.entry(dest.clone()).or_default();
                if mailbox.version != mailbox.delivered_version {
                    mailbox.delivered_version = mailbox.version;
                    return Ok(mailbox.visible());
                }
            }
            waker.notified().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aura_shared::protocol::{IceCandidate, SdpKind, SessionDescription};

    fn offer(from: &str, to: &str, sdp: &str) -> Signal {
        Signal::new(
            UserId::new(from),
            UserId::new(to),
            SignalKind::Offer(SessionDescription {
                kind: SdpKind::Offer,
                sdp: sdp.to_string(),
            }),
        )
    }

    fn candidate(from: &str, to: &str, cand: &str) -> Signal {
        Signal::new(
            UserId::new(from),
            UserId::new(to),
            SignalKind::Candidate(IceCandidate {
                candidate: cand.to_string(),
                ..Default::default()
            }),
        )
    }

    #[tokio::test]
    async fn test_publish_then_observe() {
        let hub = RelayHub::new();
        let dest = UserId::new("u2");

        hub.publish(offer("u1", "u2", "sdp-a")).await.unwrap();

        let visible = hub.updates(&dest).await.unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].from, UserId::new("u1"));
    }

    #[tokio::test]
    async fn test_offer_last_writer_wins() {
        let hub = RelayHub::new();
        let dest = UserId::new("u2");

        hub.publish(offer("u1", "u2", "first")).await.unwrap();
        hub.publish(offer("u3", "u2", "second")).await.unwrap();

        let visible = hub.updates(&dest).await.unwrap();
        let offers: Vec<_> = visible
            .iter()
            .filter(|s| matches!(s.kind, SignalKind::Offer(_)))
            .collect();
        assert_eq!(offers.len(), 1);
        assert_eq!(offers[0].from, UserId::new("u3"));
    }

    #[tokio::test]
    async fn test_candidates_never_coalesced() {
        let hub = RelayHub::new();
        let dest = UserId::new("u2");

        for i in 0..5 {
            hub.publish(candidate("u1", "u2", &format!("cand-{i}")))
                .await
                .unwrap();
        }

        let visible = hub.updates(&dest).await.unwrap();
        let cands: Vec<_> = visible
            .iter()
            .filter_map(|s| match &s.kind {
                SignalKind::Candidate(c) => Some(c.candidate.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(cands, vec!["cand-0", "cand-1", "cand-2", "cand-3", "cand-4"]);

        // Drained exactly once
        hub.publish(candidate("u1", "u2", "cand-5")).await.unwrap();
        let next = hub.updates(&dest).await.unwrap();
        let cands: Vec<_> = next
            .iter()
            .filter_map(|s| match &s.kind {
                SignalKind::Candidate(c) => Some(c.candidate.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(cands, vec!["cand-5"]);
    }

    #[tokio::test]
    async fn test_slot_values_redelivered() {
        let hub = RelayHub::new();
        let dest = UserId::new("u2");

        hub.publish(offer("u1", "u2", "sdp")).await.unwrap();
        let first = hub.updates(&dest).await.unwrap();
        assert_eq!(first.len(), 1);

        // A later candidate re-exposes the unchanged offer slot.
        hub.publish(candidate("u1", "u2", "cand")).await.unwrap();
        let second = hub.updates(&dest).await.unwrap();
        assert!(second
            .iter()
            .any(|s| matches!(s.kind, SignalKind::Offer(_))));
        assert!(second
            .iter()
            .any(|s| matches!(s.kind, SignalKind::Candidate(_))));
    }

    #[tokio::test]
    async fn test_updates_blocks_until_publish() {
        let hub = RelayHub::new();
        let dest = UserId::new("u2");

        let waiter = {
            let hub = hub.clone();
            let dest = dest.clone();
            tokio::spawn(async move { hub.updates(&dest).await.unwrap() })
        };

        tokio::task::yield_now().await;
        hub.publish(offer("u1", "u2", "late")).await.unwrap();

        let visible = waiter.await.unwrap();
        assert_eq!(visible.len(), 1);
    }
}
