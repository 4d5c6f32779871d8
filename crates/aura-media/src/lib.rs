// Call lifecycle, media capture and dictation for the Aura client.

pub mod call;
pub mod capture;
pub mod dictation;
pub mod engine;
pub mod webrtc_peer;

pub use call::{
    spawn_call_session, CallCommand, CallError, CallEvent, CallSession, CallSessionConfig,
    CallStateSnapshot, CallStatus,
};
pub use capture::{
    CaptureConfig, LocalStream, LocalTrack, MediaConstraints, MediaDevices, MediaError,
    RemoteStream, RemoteTrack, SystemDevices, TrackKind,
};
pub use dictation::{
    Dictation, DictationError, DictationEvent, TranscriptionConfig, TranscriptionService,
    TranscriptionSession,
};
pub use engine::{EngineError, EngineEvent, EngineFactory, NegotiationEngine};
pub use webrtc_peer::{WebRtcEngine, WebRtcEngineFactory};
