//! Media transport seam
//!
//! A session pipeline never touches the peer connection directly; it consumes
//! lifecycle events and decoded audio frames, and writes frames back through
//! [`OutboundTrack`]. The WebRTC binding lives in [`webrtc`]; tests wire up
//! channel-backed stand-ins.

pub mod webrtc;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::audio::AudioFrame;
use crate::error::TransportError;

pub use self::webrtc::{WebRtcConfig, WebRtcEngine};

/// Lifecycle notifications from the media transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportEvent {
    /// Peer connection handshake completed
    Established,
    /// An inbound audio track is bound and producing frames
    TrackBound,
    /// Connection closed or failed
    Closed,
}

/// Write side of the session's outbound audio track.
///
/// Exclusively owned by one session pipeline; never shared across sessions.
#[async_trait]
pub trait OutboundTrack: Send + Sync {
    async fn write_frame(&self, frame: &AudioFrame) -> Result<(), TransportError>;
}

/// Handle for tearing the underlying connection down.
#[async_trait]
pub trait TransportConnection: Send + Sync {
    async fn close(&self);
}

/// Everything a session pipeline needs from its media transport.
pub struct SessionTransport {
    pub events: mpsc::Receiver<TransportEvent>,
    pub frames: mpsc::Receiver<AudioFrame>,
    pub outbound: Arc<dyn OutboundTrack>,
    pub connection: Arc<dyn TransportConnection>,
}
