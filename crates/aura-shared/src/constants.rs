/// Application name
pub const APP_NAME: &str = "Aura";

/// Well-known identifier of the built-in assistant contact.
/// Outgoing video calls to this peer are rejected: the assistant only
/// takes audio input through dictation.
pub const ASSISTANT_USER_ID: &str = "aura-ai-intelligence";

/// Display name of the assistant contact
pub const ASSISTANT_USERNAME: &str = "Aura AI";

/// Avatar reference of the assistant contact
pub const ASSISTANT_AVATAR: &str = "https://images.unsplash.com/photo-1675271591211-126ad94e495d?q=80&w=200&h=200&auto=format&fit=crop";

/// STUN server used by the negotiation engine
pub const DEFAULT_STUN_URL: &str = "stun:stun.l.google.com:19302";

/// How long an unanswered outgoing or incoming call rings before it is
/// terminated through the normal hangup path.
pub const RING_TIMEOUT_SECS: u64 = 60;

/// Microphone capture sample rate in Hz
pub const CAPTURE_SAMPLE_RATE: u32 = 48_000;

/// Sample rate expected by the transcription service (mono PCM)
pub const TRANSCRIPTION_SAMPLE_RATE: u32 = 16_000;

/// Capture frame duration in milliseconds
pub const CAPTURE_FRAME_MS: u32 = 20;

/// Bounded channel capacity for signal, command and event channels
pub const CHANNEL_CAPACITY: usize = 256;
