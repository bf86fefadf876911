//! WebRTC peer connection binding
//!
//! Accepts a browser SDP offer, answers it, and adapts the peer connection to
//! the pipeline's transport seam: inbound RTP is Opus-decoded and downsampled
//! to the capture format, outbound frames are Opus-encoded and written to a
//! local track paced at frame duration.

use std::sync::Arc;

use audiopus::coder::{Decoder as OpusDecoder, Encoder as OpusEncoder};
use audiopus::{Application, Channels, SampleRate};
use bytes::Bytes;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_OPUS};
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::media::Sample;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

use super::{OutboundTrack, SessionTransport, TransportConnection, TransportEvent};
use crate::audio::AudioFrame;
use crate::error::TransportError;

/// Maximum decoded Opus frame: 120ms at 48kHz
const MAX_OPUS_FRAME: usize = 5760;

#[derive(Debug, Clone)]
pub struct WebRtcConfig {
    pub stun_server: String,
    /// Rate the pipeline consumes inbound audio at
    pub capture_sample_rate: u32,
    /// Rate the outbound track plays at (Opus native)
    pub playback_sample_rate: u32,
    pub channels: u16,
    pub frame_ms: u64,
}

impl Default for WebRtcConfig {
    fn default() -> Self {
        Self {
            stun_server: "stun:stun.l.google.com:19302".to_string(),
            capture_sample_rate: 16_000,
            playback_sample_rate: 48_000,
            channels: 1,
            frame_ms: 20,
        }
    }
}

/// Shared WebRTC API instance; one per process, sessions share it.
pub struct WebRtcEngine {
    api: API,
    config: WebRtcConfig,
}

impl WebRtcEngine {
    pub fn new(config: WebRtcConfig) -> Result<Self, TransportError> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        Ok(Self { api, config })
    }

    /// Accept a browser offer: build the peer connection, wire the track
    /// plumbing into a [`SessionTransport`], and produce the answer SDP.
    pub async fn accept_offer(
        &self,
        offer_sdp: String,
    ) -> Result<(SessionTransport, RTCSessionDescription), TransportError> {
        let offer = RTCSessionDescription::offer(offer_sdp)
            .map_err(|e| TransportError::Signaling(e.to_string()))?;

        let rtc_config = RTCConfiguration {
            ice_servers: vec![RTCIceServer {
                urls: vec![self.config.stun_server.clone()],
                ..Default::default()
            }],
            ..Default::default()
        };

        let pc = Arc::new(
            self.api
                .new_peer_connection(rtc_config)
                .await
                .map_err(|e| TransportError::Connection(e.to_string()))?,
        );

        let (event_tx, event_rx) = mpsc::channel(8);
        let (frame_tx, frame_rx) = mpsc::channel(256);

        // Outbound track, added before the answer so it lands in the SDP.
        let track = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                clock_rate: self.config.playback_sample_rate,
                channels: self.config.channels,
                ..Default::default()
            },
            "audio".to_owned(),
            "voicebridge".to_owned(),
        ));

        let rtp_sender = pc
            .add_track(Arc::clone(&track) as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        // Drain RTCP so the interceptors keep working.
        tokio::spawn(async move {
            let mut buf = vec![0u8; 1500];
            while rtp_sender.read(&mut buf).await.is_ok() {}
        });

        let capture_rate = self.config.capture_sample_rate;
        let playback_rate = self.config.playback_sample_rate;
        let inbound_events = event_tx.clone();
        pc.on_track(Box::new(move |remote, _receiver, _transceiver| {
            let events = inbound_events.clone();
            let frames = frame_tx.clone();
            Box::pin(async move {
                if remote.kind() != webrtc::rtp_transceiver::rtp_codec::RTPCodecType::Audio {
                    return;
                }
                info!("Inbound audio track bound");
                let _ = events.send(TransportEvent::TrackBound).await;
                tokio::spawn(read_inbound_track(remote, frames, playback_rate, capture_rate));
            })
        }));

        let state_events = event_tx.clone();
        pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            let events = state_events.clone();
            Box::pin(async move {
                debug!(?state, "Peer connection state changed");
                match state {
                    RTCPeerConnectionState::Connected => {
                        let _ = events.send(TransportEvent::Established).await;
                    }
                    RTCPeerConnectionState::Disconnected
                    | RTCPeerConnectionState::Failed
                    | RTCPeerConnectionState::Closed => {
                        let _ = events.send(TransportEvent::Closed).await;
                    }
                    _ => {}
                }
            })
        }));

        pc.set_remote_description(offer)
            .await
            .map_err(|e| TransportError::Signaling(e.to_string()))?;

        let answer = pc
            .create_answer(None)
            .await
            .map_err(|e| TransportError::Signaling(e.to_string()))?;

        // Wait for ICE gathering so the answer carries usable candidates.
        let mut gather_complete = pc.gathering_complete_promise().await;
        pc.set_local_description(answer)
            .await
            .map_err(|e| TransportError::Signaling(e.to_string()))?;
        let _ = gather_complete.recv().await;

        let local = pc
            .local_description()
            .await
            .ok_or_else(|| TransportError::Signaling("no local description".to_string()))?;

        let outbound = Arc::new(WebRtcOutbound::new(
            track,
            playback_rate,
            self.config.channels,
            self.config.frame_ms,
        )?);

        let transport = SessionTransport {
            events: event_rx,
            frames: frame_rx,
            outbound,
            connection: Arc::new(WebRtcConnection { pc }),
        };

        Ok((transport, local))
    }
}

/// Read RTP from the remote track, decode Opus, downsample, forward frames.
async fn read_inbound_track(
    remote: Arc<webrtc::track::track_remote::TrackRemote>,
    frames: mpsc::Sender<AudioFrame>,
    playback_rate: u32,
    capture_rate: u32,
) {
    let mut decoder = match OpusDecoder::new(SampleRate::Hz48000, Channels::Mono) {
        Ok(d) => d,
        Err(e) => {
            warn!("Failed to create Opus decoder: {e}");
            return;
        }
    };

    let mut pcm = vec![0i16; MAX_OPUS_FRAME];
    let mut emitted_samples: u64 = 0;
    let mut dropped: u64 = 0;

    while let Ok((packet, _)) = remote.read_rtp().await {
        if packet.payload.is_empty() {
            continue;
        }
        let decoded = match decoder.decode(Some(packet.payload.as_ref()), &mut pcm, false) {
            Ok(n) => n,
            Err(e) => {
                debug!("Opus decode error: {e}");
                continue;
            }
        };

        let samples = downsample(&pcm[..decoded], playback_rate, capture_rate);
        if samples.is_empty() {
            continue;
        }

        let timestamp_ms = emitted_samples * 1000 / capture_rate as u64;
        emitted_samples += samples.len() as u64;

        let frame = AudioFrame {
            samples,
            sample_rate: capture_rate,
            channels: 1,
            timestamp_ms,
        };

        // Never block RTP reading on a busy pipeline; shed instead.
        if frames.try_send(frame).is_err() {
            dropped += 1;
            if dropped % 100 == 1 {
                warn!(dropped, "Inbound frame channel full, shedding audio");
            }
        }
    }

    debug!("Inbound track reader finished");
}

/// Decimate to the capture rate when it divides the source rate evenly.
fn downsample(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if from_rate == to_rate || to_rate == 0 {
        return samples.to_vec();
    }
    let ratio = from_rate / to_rate;
    if ratio <= 1 || from_rate % to_rate != 0 {
        return samples.to_vec();
    }
    samples.iter().step_by(ratio as usize).copied().collect()
}

struct OpusWriteState {
    encoder: OpusEncoder,
    pending: Vec<i16>,
    packet: Vec<u8>,
    ticker: tokio::time::Interval,
}

/// Outbound side: buffers samples, encodes Opus packets, paces writes so the
/// browser receives audio in real time rather than a burst.
struct WebRtcOutbound {
    track: Arc<TrackLocalStaticSample>,
    state: Mutex<OpusWriteState>,
    playback_rate: u32,
    channels: u16,
    frame_ms: u64,
    samples_per_packet: usize,
}

impl WebRtcOutbound {
    fn new(
        track: Arc<TrackLocalStaticSample>,
        playback_rate: u32,
        channels: u16,
        frame_ms: u64,
    ) -> Result<Self, TransportError> {
        let encoder = OpusEncoder::new(SampleRate::Hz48000, Channels::Mono, Application::Voip)
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        let samples_per_packet =
            (playback_rate as u64 * frame_ms / 1000) as usize * channels as usize;

        Ok(Self {
            track,
            state: Mutex::new(OpusWriteState {
                encoder,
                pending: Vec::with_capacity(samples_per_packet * 2),
                packet: vec![0u8; 1500],
                ticker: tokio::time::interval(std::time::Duration::from_millis(frame_ms)),
            }),
            playback_rate,
            channels,
            frame_ms,
            samples_per_packet,
        })
    }
}

#[async_trait::async_trait]
impl OutboundTrack for WebRtcOutbound {
    async fn write_frame(&self, frame: &AudioFrame) -> Result<(), TransportError> {
        if frame.channels != self.channels {
            return Err(TransportError::Format(format!(
                "expected {} channel(s), got {}",
                self.channels, frame.channels
            )));
        }

        let mut state = self.state.lock().await;

        if frame.sample_rate == self.playback_rate {
            state.pending.extend_from_slice(&frame.samples);
        } else if frame.sample_rate != 0 && self.playback_rate % frame.sample_rate == 0 {
            // Repeat each sample to reach the playback rate.
            let factor = (self.playback_rate / frame.sample_rate) as usize;
            for &s in &frame.samples {
                for _ in 0..factor {
                    state.pending.push(s);
                }
            }
        } else {
            return Err(TransportError::Format(format!(
                "cannot resample {}Hz to {}Hz",
                frame.sample_rate, self.playback_rate
            )));
        }

        while state.pending.len() >= self.samples_per_packet {
            state.ticker.tick().await;

            let chunk: Vec<i16> = state.pending.drain(..self.samples_per_packet).collect();
            let OpusWriteState {
                encoder, packet, ..
            } = &mut *state;
            let len = encoder
                .encode(&chunk, packet)
                .map_err(|e| TransportError::TrackWrite(e.to_string()))?;

            let sample = Sample {
                data: Bytes::copy_from_slice(&packet[..len]),
                duration: std::time::Duration::from_millis(self.frame_ms),
                ..Default::default()
            };

            self.track
                .write_sample(&sample)
                .await
                .map_err(|e| TransportError::TrackWrite(e.to_string()))?;
        }

        Ok(())
    }
}

struct WebRtcConnection {
    pc: Arc<RTCPeerConnection>,
}

#[async_trait::async_trait]
impl TransportConnection for WebRtcConnection {
    async fn close(&self) {
        if let Err(e) = self.pc.close().await {
            debug!("Peer connection close error: {e}");
        }
    }
}
