// Signal delivery and presence layer built on an external realtime relay.

pub mod channel;
pub mod hub;
pub mod presence;

pub use channel::SignalChannel;
pub use hub::{RelayError, RelayHub, SignalTransport};
pub use presence::PresenceDirectory;
