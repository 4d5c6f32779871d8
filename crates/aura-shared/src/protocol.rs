//! Signaling wire protocol.
//!
//! A [`Signal`] is a single negotiation message carried by the relay:
//! `{from, to, type, payload, timestamp}` on the wire. The payload is a
//! tagged union over the four signal kinds, each with its own typed body,
//! decoded at the channel boundary. Offer/answer and candidate payloads
//! round-trip the negotiation engine's structures opaquely.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::UserId;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

/// The negotiation engine's session description, passed through opaquely.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
}

/// The negotiation engine's ICE candidate, passed through opaquely.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mline_index: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
pub enum SignalKind {
    Offer(SessionDescription),
    Answer(SessionDescription),
    Candidate(IceCandidate),
    Hangup,
}

impl SignalKind {
    /// Wire name of the kind, for log output.
    pub fn label(&self) -> &'static str {
        match self {
            SignalKind::Offer(_) => "offer",
            SignalKind::Answer(_) => "answer",
            SignalKind::Candidate(_) => "candidate",
            SignalKind::Hangup => "hangup",
        }
    }
}

/// A single negotiation message between two identified peers.
/// Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Signal {
    pub from: UserId,
    pub to: UserId,
    #[serde(flatten)]
    pub kind: SignalKind,
    #[serde(rename = "timestamp", with = "chrono::serde::ts_milliseconds")]
    pub sent_at: DateTime<Utc>,
}

impl Signal {
    pub fn new(from: UserId, to: UserId, kind: SignalKind) -> Self {
        Self {
            from,
            to,
            kind,
            sent_at: Utc::now(),
        }
    }

    /// Serialize to the relay's JSON document format.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from the relay's JSON document format.
    pub fn from_json(data: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(data)
    }
}
