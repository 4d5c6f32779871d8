//! webrtc-rs backed negotiation engine.
//!
//! Trickle ICE: locally gathered candidates are pushed through the event
//! channel as soon as they are produced instead of waiting for gathering
//! to complete. Remote tracks and fatal connection-state changes surface
//! the same way.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

use aura_shared::constants::DEFAULT_STUN_URL;
use aura_shared::protocol::{IceCandidate, SdpKind, SessionDescription};

use crate::capture::{LocalStream, RemoteTrack, TrackKind};
use crate::engine::{EngineError, EngineEvent, EngineFactory, NegotiationEngine};

const LOCAL_STREAM_ID: &str = "aura-local";

fn negotiation_err(e: impl std::fmt::Display) -> EngineError {
    EngineError::Negotiation(e.to_string())
}

pub struct WebRtcEngine {
    pc: Arc<RTCPeerConnection>,
    open: Arc<AtomicBool>,
}

impl WebRtcEngine {
    fn ensure_open(&self) -> Result<(), EngineError> {
        if self.open.load(Ordering::Relaxed) {
            Ok(())
        } else {
            Err(EngineError::Closed)
        }
    }
}

#[async_trait]
impl NegotiationEngine for WebRtcEngine {
    async fn create_offer(&mut self) -> Result<SessionDescription, EngineError> {
        self.ensure_open()?;

        let offer = self.pc.create_offer(None).await.map_err(negotiation_err)?;
        self.pc
            .set_local_description(offer.clone())
            .await
            .map_err(negotiation_err)?;

        debug!("Local offer installed");
        Ok(SessionDescription {
            kind: SdpKind::Offer,
            sdp: offer.sdp,
        })
    }

    async fn accept_offer(
        &mut self,
        offer: &SessionDescription,
    ) -> Result<SessionDescription, EngineError> {
        self.ensure_open()?;

        let remote =
            RTCSessionDescription::offer(offer.sdp.clone()).map_err(negotiation_err)?;
        self.pc
            .set_remote_description(remote)
            .await
            .map_err(negotiation_err)?;

        let answer = self.pc.create_answer(None).await.map_err(negotiation_err)?;
        self.pc
            .set_local_description(answer.clone())
            .await
            .map_err(negotiation_err)?;

        debug!("Remote offer applied, local answer installed");
        Ok(SessionDescription {
            kind: SdpKind::Answer,
            sdp: answer.sdp,
        })
    }

    async fn apply_answer(&mut self, answer: &SessionDescription) -> Result<(), EngineError> {
        self.ensure_open()?;

        let remote =
            RTCSessionDescription::answer(answer.sdp.clone()).map_err(negotiation_err)?;
        self.pc
            .set_remote_description(remote)
            .await
            .map_err(negotiation_err)?;

        debug!("Remote answer applied");
        Ok(())
    }

    async fn add_remote_candidate(&mut self, candidate: &IceCandidate) -> Result<(), EngineError> {
        self.ensure_open()?;

        let init = RTCIceCandidateInit {
            candidate: candidate.candidate.clone(),
            sdp_mid: candidate.sdp_mid.clone(),
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment: candidate.username_fragment.clone(),
        };

        self.pc
            .add_ice_candidate(init)
            .await
            .map_err(negotiation_err)
    }

    async fn close(&mut self) {
        if self.open.swap(false, Ordering::SeqCst) {
            if let Err(e) = self.pc.close().await {
                warn!(error = %e, "Peer connection close failed");
            } else {
                info!("Peer connection closed");
            }
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Relaxed)
    }
}

pub struct WebRtcEngineFactory {
    stun_urls: Vec<String>,
}

impl WebRtcEngineFactory {
    pub fn new(stun_urls: Vec<String>) -> Self {
        Self { stun_urls }
    }
}

impl Default for WebRtcEngineFactory {
    fn default() -> Self {
        Self::new(vec![DEFAULT_STUN_URL.to_string()])
    }
}

#[async_trait]
impl EngineFactory for WebRtcEngineFactory {
    async fn create(
        &self,
        local: &mut LocalStream,
        events: mpsc::Sender<EngineEvent>,
    ) -> Result<Box<dyn NegotiationEngine>, EngineError> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(negotiation_err)?;

        let mut registry = Registry::new();
        registry =
            register_default_interceptors(registry, &mut media_engine).map_err(negotiation_err)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let config = RTCConfiguration {
            ice_servers: vec![RTCIceServer {
                urls: self.stun_urls.clone(),
                ..Default::default()
            }],
            ..Default::default()
        };

        let pc = Arc::new(
            api.new_peer_connection(config)
                .await
                .map_err(negotiation_err)?,
        );
        let open = Arc::new(AtomicBool::new(true));

        let candidate_tx = events.clone();
        pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let candidate_tx = candidate_tx.clone();
            Box::pin(async move {
                let Some(candidate) = candidate else { return };
                match candidate.to_json() {
                    Ok(init) => {
                        let _ = candidate_tx
                            .send(EngineEvent::LocalCandidate(IceCandidate {
                                candidate: init.candidate,
                                sdp_mid: init.sdp_mid,
                                sdp_mline_index: init.sdp_mline_index,
                                username_fragment: init.username_fragment,
                            }))
                            .await;
                    }
                    Err(e) => warn!(error = %e, "Dropping unserializable ICE candidate"),
                }
            })
        }));

        let track_tx = events.clone();
        pc.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                let track_tx = track_tx.clone();
                Box::pin(async move {
                    let kind = if track.kind() == webrtc::rtp_transceiver::rtp_codec::RTPCodecType::Video
                    {
                        TrackKind::Video
                    } else {
                        TrackKind::Audio
                    };
                    info!(kind = ?kind, id = %track.id(), "Remote track live");
                    let _ = track_tx
                        .send(EngineEvent::RemoteTrack(RemoteTrack {
                            stream_id: track.stream_id(),
                            track_id: track.id(),
                            kind,
                        }))
                        .await;
                })
            },
        ));

        let state_tx = events;
        let state_open = open.clone();
        pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            debug!(state = %state, "Peer connection state changed");
            let state_tx = state_tx.clone();
            let state_open = state_open.clone();
            Box::pin(async move {
                if state == RTCPeerConnectionState::Failed && state_open.load(Ordering::Relaxed) {
                    let _ = state_tx.send(EngineEvent::ConnectionFailed).await;
                }
            })
        }));

        attach_local_tracks(&pc, local, open.clone()).await?;

        Ok(Box::new(WebRtcEngine { pc, open }))
    }
}

/// Mirror the acquired local tracks onto the peer connection so they are
/// announced in the offer/answer exchange.
async fn attach_local_tracks(
    pc: &Arc<RTCPeerConnection>,
    local: &mut LocalStream,
    open: Arc<AtomicBool>,
) -> Result<(), EngineError> {
    if let Some(audio) = &mut local.audio {
        let track = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                clock_rate: 48_000,
                channels: 1,
                sdp_fmtp_line: "minptime=10;useinbandfec=1".to_owned(),
                rtcp_feedback: vec![],
            },
            "audio".to_owned(),
            LOCAL_STREAM_ID.to_owned(),
        ));
        pc.add_track(track as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(negotiation_err)?;

        if let Some(mut frames) = audio.take_frames() {
            let open = open.clone();
            tokio::spawn(async move {
                // TODO: encode captured frames to Opus and write_sample()
                // them once the encoder lands; until then drain so capture
                // never backs up.
                while let Some(_frame) = frames.recv().await {
                    if !open.load(Ordering::Relaxed) {
                        break;
                    }
                }
            });
        }
    }

    if let Some(_video) = &local.video {
        let track = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_VP8.to_owned(),
                clock_rate: 90_000,
                channels: 0,
                sdp_fmtp_line: String::new(),
                rtcp_feedback: vec![],
            },
            "video".to_owned(),
            LOCAL_STREAM_ID.to_owned(),
        ));
        pc.add_track(track as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(negotiation_err)?;
    }

    Ok(())
}
