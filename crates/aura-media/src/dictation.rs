//! Push-to-toggle dictation capture.
//!
//! While active, microphone frames are downmixed to mono, resampled to the
//! transcription service's 16 kHz rate and pushed over a persistent
//! streaming session. Transcript fragments come back as events for the
//! compose input. Stop (explicit, on error, or on remote close) releases
//! the microphone, the audio pipeline and the streaming session, and is
//! safe to invoke repeatedly.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use aura_shared::constants::{CAPTURE_SAMPLE_RATE, CHANNEL_CAPACITY, TRANSCRIPTION_SAMPLE_RATE};

use crate::capture::{MediaConstraints, MediaDevices, MediaError};

#[derive(Error, Debug)]
pub enum DictationError {
    #[error(transparent)]
    Media(#[from] MediaError),

    #[error("Transcription service error: {0}")]
    Service(String),
}

/// Expected input format, agreed when the streaming session opens.
#[derive(Debug, Clone, Copy)]
pub struct TranscriptionConfig {
    pub sample_rate_hz: u32,
    pub channels: u16,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: TRANSCRIPTION_SAMPLE_RATE,
            channels: 1,
        }
    }
}

/// An open streaming session with the transcription service.
#[async_trait]
pub trait TranscriptionSession: Send {
    /// Push one frame of PCM audio in the agreed format.
    async fn push_audio(&mut self, frame: &[i16]) -> Result<(), DictationError>;

    /// Close the session. Safe to call more than once.
    async fn close(&mut self);
}

/// The external transcription service.
#[async_trait]
pub trait TranscriptionService: Send + Sync {
    /// Open a streaming session. Returns the session handle plus the
    /// stream of transcript fragments; the stream closing means the
    /// service ended the session.
    async fn open(
        &self,
        config: TranscriptionConfig,
    ) -> Result<(Box<dyn TranscriptionSession>, mpsc::Receiver<String>), DictationError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DictationEvent {
    Started,
    /// A transcript fragment to append to the compose input.
    Transcript(String),
    Stopped,
}

// ---------------------------------------------------------------------------
// Sample-rate conversion helpers
// ---------------------------------------------------------------------------

/// Average interleaved channels down to mono.
pub fn downmix_to_mono(frame: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return frame.to_vec();
    }
    frame
        .chunks(channels)
        .map(|chunk| chunk.iter().sum::<f32>() / chunk.len() as f32)
        .collect()
}

/// Linear-interpolation resampler. Good enough for speech input; the
/// transcription service applies its own filtering.
pub fn resample_linear(samples: &[f32], from_hz: u32, to_hz: u32) -> Vec<f32> {
    if from_hz == to_hz || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = from_hz as f64 / to_hz as f64;
    let out_len = ((samples.len() as f64) / ratio).floor() as usize;
    let mut out = Vec::with_capacity(out_len);

    for i in 0..out_len {
        let pos = i as f64 * ratio;
        let idx = pos.floor() as usize;
        let frac = (pos - idx as f64) as f32;
        let a = samples[idx];
        let b = if idx + 1 < samples.len() {
            samples[idx + 1]
        } else {
            a
        };
        out.push(a + (b - a) * frac);
    }

    out
}

/// Convert normalized f32 samples to 16-bit PCM.
pub fn to_pcm16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
        .collect()
}

// ---------------------------------------------------------------------------
// Dictation session
// ---------------------------------------------------------------------------

struct ActiveDictation {
    stop_tx: mpsc::Sender<()>,
    done: JoinHandle<()>,
}

/// Push-to-toggle dictation owned by the client shell.
pub struct Dictation {
    devices: Arc<dyn MediaDevices>,
    service: Arc<dyn TranscriptionService>,
    events: mpsc::Sender<DictationEvent>,
    capture_rate: u32,
    active: Option<ActiveDictation>,
}

impl Dictation {
    pub fn new(
        devices: Arc<dyn MediaDevices>,
        service: Arc<dyn TranscriptionService>,
    ) -> (Self, mpsc::Receiver<DictationEvent>) {
        let (event_tx, event_rx) = mpsc::channel(CHANNEL_CAPACITY);
        (
            Self {
                devices,
                service,
                events: event_tx,
                capture_rate: CAPTURE_SAMPLE_RATE,
                active: None,
            },
            event_rx,
        )
    }

    pub fn is_active(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| !active.done.is_finished())
    }

    /// Start when stopped, stop when started. Returns whether dictation is
    /// active after the call.
    pub async fn toggle(&mut self) -> Result<bool, DictationError> {
        if self.is_active() {
            self.stop().await;
            return Ok(false);
        }
        self.active = None;
        self.start().await?;
        Ok(true)
    }

    /// Stop dictation. Idempotent; resource release happens in the pump
    /// task, exactly once.
    pub async fn stop(&mut self) {
        if let Some(active) = self.active.take() {
            let _ = active.stop_tx.send(()).await;
        }
    }

    async fn start(&mut self) -> Result<(), DictationError> {
        let mut stream = self.devices.acquire(MediaConstraints::audio_only())?;

        let config = TranscriptionConfig::default();
        let (session, fragments) = match self.service.open(config).await {
            Ok(opened) => opened,
            Err(e) => {
                stream.stop_all();
                return Err(e);
            }
        };

        let Some(frames) = stream.audio.as_mut().and_then(|t| t.take_frames()) else {
            stream.stop_all();
            let mut session = session;
            session.close().await;
            return Err(DictationError::Media(MediaError::NoDevice));
        };

        info!(
            capture_hz = self.capture_rate,
            target_hz = config.sample_rate_hz,
            "Dictation started"
        );

        let (stop_tx, stop_rx) = mpsc::channel(1);
        let done = tokio::spawn(pump(
            stream,
            frames,
            session,
            fragments,
            stop_rx,
            self.events.clone(),
            self.capture_rate,
            config.sample_rate_hz,
        ));

        self.active = Some(ActiveDictation { stop_tx, done });
        let _ = self.events.send(DictationEvent::Started).await;
        Ok(())
    }
}

/// Owns every dictation resource; tears all of them down exactly once on
/// whichever end condition comes first.
#[allow(clippy::too_many_arguments)]
async fn pump(
    stream: crate::capture::LocalStream,
    mut frames: mpsc::Receiver<Vec<f32>>,
    session: Box<dyn TranscriptionSession>,
    mut fragments: mpsc::Receiver<String>,
    mut stop_rx: mpsc::Receiver<()>,
    events: mpsc::Sender<DictationEvent>,
    capture_rate: u32,
    target_rate: u32,
) {
    let session = Arc::new(Mutex::new(session));

    loop {
        tokio::select! {
            _ = stop_rx.recv() => {
                debug!("Dictation stop requested");
                break;
            }
            frame = frames.recv() => {
                let Some(frame) = frame else { break };
                let mono = downmix_to_mono(&frame, 1);
                let pcm = to_pcm16(&resample_linear(&mono, capture_rate, target_rate));
                if let Err(e) = session.lock().await.push_audio(&pcm).await {
                    warn!(error = %e, "Audio push failed, stopping dictation");
                    break;
                }
            }
            fragment = fragments.recv() => {
                match fragment {
                    Some(text) => {
                        let _ = events.send(DictationEvent::Transcript(text)).await;
                    }
                    None => {
                        debug!("Transcription session closed by service");
                        break;
                    }
                }
            }
        }
    }

    stream.stop_all();
    session.lock().await.close().await;
    let _ = events.send(DictationEvent::Stopped).await;
    info!("Dictation stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    use crate::capture::{LocalStream, LocalTrack, TrackKind};

    #[test]
    fn test_downmix_stereo() {
        let frame = vec![0.2, 0.4, -0.6, -0.2];
        let mono = downmix_to_mono(&frame, 2);
        assert_eq!(mono.len(), 2);
        assert!((mono[0] - 0.3).abs() < 1e-6);
        assert!((mono[1] + 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_downmix_mono_passthrough() {
        let frame = vec![0.1, 0.2, 0.3];
        assert_eq!(downmix_to_mono(&frame, 1), frame);
    }

    #[test]
    fn test_resample_ratio() {
        let samples = vec![0.0f32; 960];
        let out = resample_linear(&samples, 48_000, 16_000);
        assert_eq!(out.len(), 320);
    }

    #[test]
    fn test_resample_same_rate_passthrough() {
        let samples = vec![0.5f32, -0.5];
        assert_eq!(resample_linear(&samples, 16_000, 16_000), samples);
    }

    #[test]
    fn test_resample_interpolates() {
        // Halving rate over a ramp keeps every other value
        let samples = vec![0.0, 0.1, 0.2, 0.3];
        let out = resample_linear(&samples, 2, 1);
        assert_eq!(out.len(), 2);
        assert!((out[0] - 0.0).abs() < 1e-6);
        assert!((out[1] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_pcm16_clamps() {
        let pcm = to_pcm16(&[0.0, 1.0, -1.0, 2.0, -2.0]);
        assert_eq!(pcm[0], 0);
        assert_eq!(pcm[1], i16::MAX);
        assert_eq!(pcm[3], i16::MAX);
        assert_eq!(pcm[4], -i16::MAX);
    }

    // -- mocks --------------------------------------------------------------

    struct MockMic {
        frame_tx: StdMutex<Option<mpsc::Sender<Vec<f32>>>>,
        handed_out: StdMutex<Vec<std::sync::Arc<AtomicBool>>>,
        deny: AtomicBool,
    }

    impl MockMic {
        fn new() -> Self {
            Self {
                frame_tx: StdMutex::new(None),
                handed_out: StdMutex::new(Vec::new()),
                deny: AtomicBool::new(false),
            }
        }

        fn all_stopped(&self) -> bool {
            self.handed_out
                .lock()
                .unwrap()
                .iter()
                .all(|a| !a.load(Ordering::SeqCst))
        }
    }

    impl MediaDevices for MockMic {
        fn acquire(&self, constraints: MediaConstraints) -> Result<LocalStream, MediaError> {
            if self.deny.load(Ordering::SeqCst) {
                return Err(MediaError::PermissionDenied);
            }
            assert!(constraints.audio && !constraints.video);

            let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
            *self.frame_tx.lock().unwrap() = Some(tx);

            let track = LocalTrack::with_frames(TrackKind::Audio, rx);
            self.handed_out.lock().unwrap().push(track.active_flag());
            Ok(LocalStream {
                audio: Some(track),
                video: None,
            })
        }
    }

    struct MockSession {
        pushed: Arc<AtomicUsize>,
        closes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl TranscriptionSession for MockSession {
        async fn push_audio(&mut self, frame: &[i16]) -> Result<(), DictationError> {
            assert!(!frame.is_empty());
            self.pushed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct MockTranscriber {
        pushed: Arc<AtomicUsize>,
        closes: Arc<AtomicUsize>,
        fragment_tx: StdMutex<Option<mpsc::Sender<String>>>,
    }

    impl MockTranscriber {
        fn new() -> Self {
            Self {
                pushed: Arc::new(AtomicUsize::new(0)),
                closes: Arc::new(AtomicUsize::new(0)),
                fragment_tx: StdMutex::new(None),
            }
        }
    }

    #[async_trait]
    impl TranscriptionService for MockTranscriber {
        async fn open(
            &self,
            config: TranscriptionConfig,
        ) -> Result<(Box<dyn TranscriptionSession>, mpsc::Receiver<String>), DictationError>
        {
            assert_eq!(config.sample_rate_hz, TRANSCRIPTION_SAMPLE_RATE);
            assert_eq!(config.channels, 1);

            let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
            *self.fragment_tx.lock().unwrap() = Some(tx);
            Ok((
                Box::new(MockSession {
                    pushed: self.pushed.clone(),
                    closes: self.closes.clone(),
                }),
                rx,
            ))
        }
    }

    fn setup() -> (
        Dictation,
        mpsc::Receiver<DictationEvent>,
        Arc<MockMic>,
        Arc<MockTranscriber>,
    ) {
        let mic = Arc::new(MockMic::new());
        let service = Arc::new(MockTranscriber::new());
        let (dictation, events) = Dictation::new(mic.clone(), service.clone());
        (dictation, events, mic, service)
    }

    #[tokio::test]
    async fn test_transcripts_flow_while_active() {
        let (mut dictation, mut events, mic, service) = setup();

        assert!(dictation.toggle().await.unwrap());
        assert_eq!(events.recv().await.unwrap(), DictationEvent::Started);

        // Push an audio frame through the pipeline
        let frame_tx = mic.frame_tx.lock().unwrap().clone().unwrap();
        frame_tx.send(vec![0.1f32; 960]).await.unwrap();
        for _ in 0..200 {
            if service.pushed.load(Ordering::SeqCst) >= 1 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }
        assert!(service.pushed.load(Ordering::SeqCst) >= 1);

        // And a transcript fragment back
        let fragment_tx = service.fragment_tx.lock().unwrap().clone().unwrap();
        fragment_tx.send("hello world".to_string()).await.unwrap();

        assert_eq!(
            events.recv().await.unwrap(),
            DictationEvent::Transcript("hello world".into())
        );

        dictation.stop().await;
        assert_eq!(events.recv().await.unwrap(), DictationEvent::Stopped);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let (mut dictation, mut events, mic, service) = setup();

        dictation.toggle().await.unwrap();
        assert_eq!(events.recv().await.unwrap(), DictationEvent::Started);

        dictation.stop().await;
        dictation.stop().await;
        dictation.stop().await;

        assert_eq!(events.recv().await.unwrap(), DictationEvent::Stopped);
        // Resources released exactly once
        assert!(mic.all_stopped());
        assert_eq!(service.closes.load(Ordering::SeqCst), 1);
        assert!(!dictation.is_active());
    }

    #[tokio::test]
    async fn test_remote_close_releases_resources() {
        let (mut dictation, mut events, mic, service) = setup();

        dictation.toggle().await.unwrap();
        assert_eq!(events.recv().await.unwrap(), DictationEvent::Started);

        // Service closes the fragment stream
        drop(service.fragment_tx.lock().unwrap().take());

        assert_eq!(events.recv().await.unwrap(), DictationEvent::Stopped);
        assert!(mic.all_stopped());
        assert_eq!(service.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_permission_denied_surfaces() {
        let (mut dictation, _events, mic, _service) = setup();
        mic.deny.store(true, Ordering::SeqCst);

        let result = dictation.toggle().await;
        assert!(matches!(
            result,
            Err(DictationError::Media(MediaError::PermissionDenied))
        ));
        assert!(!dictation.is_active());
    }

    #[tokio::test]
    async fn test_toggle_cycles() {
        let (mut dictation, mut events, _mic, _service) = setup();

        assert!(dictation.toggle().await.unwrap());
        assert_eq!(events.recv().await.unwrap(), DictationEvent::Started);

        assert!(!dictation.toggle().await.unwrap());
        assert_eq!(events.recv().await.unwrap(), DictationEvent::Stopped);

        assert!(dictation.toggle().await.unwrap());
        assert_eq!(events.recv().await.unwrap(), DictationEvent::Started);
    }
}
