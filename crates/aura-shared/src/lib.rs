// Shared types and wire protocol for the Aura messaging client.

pub mod constants;
pub mod error;
pub mod protocol;
pub mod types;

pub use error::AuraError;
pub use protocol::{IceCandidate, SdpKind, SessionDescription, Signal, SignalKind};
pub use types::{MessageId, Peer, PeerStatus, UserId};
