//! The signal channel owned by one endpoint.
//!
//! Wraps a [`SignalTransport`] with the per-session concerns: stamping
//! outgoing signals with the local identity, filtering observed signals to
//! the local destination, and suppressing re-delivered slot values when the
//! relay resends unchanged state.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use aura_shared::constants::CHANNEL_CAPACITY;
use aura_shared::protocol::{Signal, SignalKind};
use aura_shared::types::UserId;

use crate::hub::SignalTransport;

#[derive(Clone)]
pub struct SignalChannel {
    local: UserId,
    transport: Arc<dyn SignalTransport>,
}

impl SignalChannel {
    pub fn new(local: UserId, transport: Arc<dyn SignalTransport>) -> Self {
        Self { local, transport }
    }

    pub fn local(&self) -> &UserId {
        &self.local
    }

    /// Fire-and-forget publish. Delivery failures are logged and swallowed;
    /// there is no acknowledgment and no retry.
    pub async fn send(&self, to: UserId, kind: SignalKind) {
        let label = kind.label();
        let signal = Signal::new(self.local.clone(), to, kind);
        if let Err(e) = self.transport.publish(signal).await {
            warn!(kind = label, error = %e, "Signal publish failed, dropping");
        }
    }

    /// Subscribe to signals addressed to the local peer.
    ///
    /// The observer task filters out signals for other destinations and
    /// de-duplicates slot kinds (offer/answer/hangup) the relay re-delivers
    /// unchanged. Candidates pass through untouched: every queued candidate
    /// is forwarded in relay order.
    pub fn observe(&self) -> mpsc::Receiver<Signal> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let local = self.local.clone();
        let transport = self.transport.clone();

        tokio::spawn(async move {
            // Last processed timestamp per (kind, sender) slot.
            let mut seen: HashMap<(&'static str, UserId), DateTime<Utc>> = HashMap::new();

            loop {
                let batch = match transport.updates(&local).await {
                    Ok(batch) => batch,
                    Err(e) => {
                        warn!(error = %e, "Relay observation ended");
                        break;
                    }
                };

                for signal in batch {
                    if signal.to != local {
                        debug!(
                            to = %signal.to.short(),
                            "Ignoring signal for another destination"
                        );
                        continue;
                    }

                    if !matches!(signal.kind, SignalKind::Candidate(_)) {
                        let key = (signal.kind.label(), signal.from.clone());
                        if seen.get(&key).is_some_and(|ts| *ts >= signal.sent_at) {
                            continue;
                        }
                        seen.insert(key, signal.sent_at);
                    }

                    if tx.send(signal).await.is_err() {
                        return;
                    }
                }
            }
        });

        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::RelayHub;
    use aura_shared::protocol::{IceCandidate, SdpKind, SessionDescription};

    fn channel_pair() -> (SignalChannel, SignalChannel) {
        let hub = Arc::new(RelayHub::new());
        (
            SignalChannel::new(UserId::new("u1"), hub.clone()),
            SignalChannel::new(UserId::new("u2"), hub),
        )
    }

    fn offer_kind(sdp: &str) -> SignalKind {
        SignalKind::Offer(SessionDescription {
            kind: SdpKind::Offer,
            sdp: sdp.to_string(),
        })
    }

    fn candidate_kind(c: &str) -> SignalKind {
        SignalKind::Candidate(IceCandidate {
            candidate: c.to_string(),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_send_and_observe() {
        let (a, b) = channel_pair();
        let mut observed = b.observe();

        a.send(UserId::new("u2"), offer_kind("sdp")).await;

        let signal = observed.recv().await.unwrap();
        assert_eq!(signal.from, UserId::new("u1"));
        assert!(matches!(signal.kind, SignalKind::Offer(_)));
    }

    #[tokio::test]
    async fn test_redelivered_offer_suppressed() {
        let (a, b) = channel_pair();
        let mut observed = b.observe();

        a.send(UserId::new("u2"), offer_kind("sdp")).await;
        let first = observed.recv().await.unwrap();
        assert!(matches!(first.kind, SignalKind::Offer(_)));

        // Candidate publication re-exposes the unchanged offer slot; only
        // the candidate must come through.
        a.send(UserId::new("u2"), candidate_kind("cand-0")).await;
        let second = observed.recv().await.unwrap();
        assert!(matches!(second.kind, SignalKind::Candidate(_)));

        a.send(UserId::new("u2"), candidate_kind("cand-1")).await;
        let third = observed.recv().await.unwrap();
        match third.kind {
            SignalKind::Candidate(c) => assert_eq!(c.candidate, "cand-1"),
            other => panic!("expected candidate, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_all_candidates_delivered_in_order() {
        let (a, b) = channel_pair();
        let mut observed = b.observe();

        for i in 0..4 {
            a.send(UserId::new("u2"), candidate_kind(&format!("c{i}")))
                .await;
        }

        let mut received = Vec::new();
        for _ in 0..4 {
            match observed.recv().await.unwrap().kind {
                SignalKind::Candidate(c) => received.push(c.candidate),
                other => panic!("expected candidate, got {other:?}"),
            }
        }
        assert_eq!(received, vec!["c0", "c1", "c2", "c3"]);
    }

    #[tokio::test]
    async fn test_newer_offer_passes_dedup() {
        let (a, b) = channel_pair();
        let mut observed = b.observe();

        a.send(UserId::new("u2"), offer_kind("first")).await;
        observed.recv().await.unwrap();

        // Force a strictly newer timestamp.
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;

        a.send(UserId::new("u2"), offer_kind("second")).await;
        let next = observed.recv().await.unwrap();
        match next.kind {
            SignalKind::Offer(desc) => assert_eq!(desc.sdp, "second"),
            other => panic!("expected offer, got {other:?}"),
        }
    }
}
