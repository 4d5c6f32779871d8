//! Local media capture and track management.
//!
//! A [`LocalStream`] is exclusively owned by the session that acquired it.
//! Toggling camera or microphone disables the corresponding track in place
//! (the capture callback substitutes silence / stops emitting frames), so
//! no renegotiation is needed. Teardown stops every track to release the
//! hardware and is safe to repeat.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use aura_shared::constants::{CAPTURE_FRAME_MS, CAPTURE_SAMPLE_RATE, CHANNEL_CAPACITY};

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Media device access denied")]
    PermissionDenied,

    #[error("No capture device available")]
    NoDevice,

    #[error("Capture stream error: {0}")]
    Stream(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: bool,
}

impl MediaConstraints {
    /// Camera plus microphone, for calls.
    pub fn audio_video() -> Self {
        Self {
            audio: true,
            video: true,
        }
    }

    /// Microphone only, for dictation.
    pub fn audio_only() -> Self {
        Self {
            audio: true,
            video: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub frame_size_ms: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: CAPTURE_SAMPLE_RATE,
            channels: 1,
            frame_size_ms: CAPTURE_FRAME_MS,
        }
    }
}

impl CaptureConfig {
    pub fn frame_size_samples(&self) -> usize {
        (self.sample_rate as usize * self.frame_size_ms as usize) / 1000
    }
}

/// One local capture track. Disabling does not release the device; it
/// merely stops real samples from flowing.
pub struct LocalTrack {
    kind: TrackKind,
    enabled: Arc<AtomicBool>,
    active: Arc<AtomicBool>,
    frames: Option<mpsc::Receiver<Vec<f32>>>,
}

impl LocalTrack {
    pub fn new(kind: TrackKind) -> Self {
        Self {
            kind,
            enabled: Arc::new(AtomicBool::new(true)),
            active: Arc::new(AtomicBool::new(true)),
            frames: None,
        }
    }

    /// Track fed by an external frame source (capture callback or test).
    pub fn with_frames(kind: TrackKind, frames: mpsc::Receiver<Vec<f32>>) -> Self {
        Self {
            frames: Some(frames),
            ..Self::new(kind)
        }
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    /// Shared handle checked by the capture callback.
    pub fn enabled_flag(&self) -> Arc<AtomicBool> {
        self.enabled.clone()
    }

    /// Shared handle releasing the capture callback on stop.
    pub fn active_flag(&self) -> Arc<AtomicBool> {
        self.active.clone()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
        debug!(kind = ?self.kind, enabled, "Local track toggled");
    }

    /// Flip the enabled flag, returning the new state.
    pub fn toggle(&self) -> bool {
        let enabled = !self.is_enabled();
        self.set_enabled(enabled);
        enabled
    }

    pub fn take_frames(&mut self) -> Option<mpsc::Receiver<Vec<f32>>> {
        self.frames.take()
    }

    /// Release the underlying device. Idempotent.
    pub fn stop(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        !self.active.load(Ordering::Relaxed)
    }
}

/// The locally captured media, owned by exactly one session.
#[derive(Default)]
pub struct LocalStream {
    pub audio: Option<LocalTrack>,
    pub video: Option<LocalTrack>,
}

impl LocalStream {
    fn track(&self, kind: TrackKind) -> Option<&LocalTrack> {
        match kind {
            TrackKind::Audio => self.audio.as_ref(),
            TrackKind::Video => self.video.as_ref(),
        }
    }

    pub fn is_enabled(&self, kind: TrackKind) -> bool {
        self.track(kind).map(LocalTrack::is_enabled).unwrap_or(false)
    }

    /// Flip the enabled flag of one track. Returns the new state, or
    /// `false` when the track does not exist.
    pub fn toggle(&self, kind: TrackKind) -> bool {
        self.track(kind).map(LocalTrack::toggle).unwrap_or(false)
    }

    /// Stop every track, releasing capture hardware. Idempotent.
    pub fn stop_all(&self) {
        if let Some(track) = &self.audio {
            track.stop();
        }
        if let Some(track) = &self.video {
            track.stop();
        }
    }
}

/// A remote media track reported live by the negotiation engine.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RemoteTrack {
    pub stream_id: String,
    pub track_id: String,
    pub kind: TrackKind,
}

/// Handle to the remote peer's media, accumulated from track events.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RemoteStream {
    pub id: String,
    pub tracks: Vec<RemoteTrack>,
}

impl From<RemoteTrack> for RemoteStream {
    fn from(track: RemoteTrack) -> Self {
        Self {
            id: track.stream_id.clone(),
            tracks: vec![track],
        }
    }
}

impl RemoteStream {
    pub fn push(&mut self, track: RemoteTrack) {
        if !self.tracks.contains(&track) {
            self.tracks.push(track);
        }
    }
}

/// Platform capture request. Fails with a permission-denied condition the
/// UI must surface, not retry.
pub trait MediaDevices: Send + Sync {
    fn acquire(&self, constraints: MediaConstraints) -> Result<LocalStream, MediaError>;
}

/// Capture through the host's default devices: microphone via cpal, camera
/// as the encode-pipeline shell.
pub struct SystemDevices {
    config: CaptureConfig,
}

impl SystemDevices {
    pub fn new(config: CaptureConfig) -> Self {
        Self { config }
    }

    fn acquire_audio(&self) -> Result<LocalTrack, MediaError> {
        use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

        let host = cpal::default_host();
        let device = host.default_input_device().ok_or(MediaError::NoDevice)?;

        info!(device = ?device.name(), "Using input device");

        let config = cpal::StreamConfig {
            channels: self.config.channels,
            sample_rate: cpal::SampleRate(self.config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let (frame_tx, frame_rx) = mpsc::channel::<Vec<f32>>(CHANNEL_CAPACITY);
        let track = LocalTrack::with_frames(TrackKind::Audio, frame_rx);

        let frame_size = self.config.frame_size_samples();
        let mut buffer = Vec::with_capacity(frame_size);
        let enabled = track.enabled_flag();
        let active = track.active_flag();

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                    if !active.load(Ordering::Relaxed) {
                        return;
                    }
                    if enabled.load(Ordering::Relaxed) {
                        buffer.extend_from_slice(data);
                    } else {
                        // Disabled track keeps emitting silence so the
                        // downstream pacing stays intact
                        buffer.extend(std::iter::repeat(0.0f32).take(data.len()));
                    }
                    while buffer.len() >= frame_size {
                        let frame: Vec<f32> = buffer.drain(..frame_size).collect();
                        if frame_tx.try_send(frame).is_err() {
                            warn!("Audio frame channel full, dropping frame");
                        }
                    }
                },
                move |err| {
                    error!("Audio input error: {err}");
                },
                None,
            )
            .map_err(|e| match e {
                cpal::BuildStreamError::DeviceNotAvailable => MediaError::PermissionDenied,
                other => MediaError::Stream(other.to_string()),
            })?;

        stream
            .play()
            .map_err(|e| MediaError::Stream(e.to_string()))?;

        // Stream lives until the active flag drops; the callback then
        // becomes a no-op and the device is released with the process.
        std::mem::forget(stream);

        debug!("Audio capture started");
        Ok(track)
    }

    fn acquire_video(&self) -> Result<LocalTrack, MediaError> {
        // Camera frames enter through the platform capture pipeline; the
        // track here carries the enabled/stopped control surface.
        debug!("Video capture started");
        Ok(LocalTrack::new(TrackKind::Video))
    }
}

impl Default for SystemDevices {
    fn default() -> Self {
        Self::new(CaptureConfig::default())
    }
}

impl MediaDevices for SystemDevices {
    fn acquire(&self, constraints: MediaConstraints) -> Result<LocalStream, MediaError> {
        let mut stream = LocalStream::default();

        if constraints.audio {
            stream.audio = Some(self.acquire_audio()?);
        }
        if constraints.video {
            match self.acquire_video() {
                Ok(track) => stream.video = Some(track),
                Err(e) => {
                    // Release the microphone before surfacing the failure
                    stream.stop_all();
                    return Err(e);
                }
            }
        }

        Ok(stream)
    }
}
