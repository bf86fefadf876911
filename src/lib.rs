pub mod adapters;
pub mod audio;
pub mod config;
pub mod error;
pub mod http;
pub mod session;
pub mod transport;

pub use adapters::{
    AdapterSet, AgentBridge, AudioStream, HttpAgentBridge, HttpSynthesizer, HttpTranscriber,
    SessionContext, Synthesizer, Transcriber,
};
pub use audio::{AudioFrame, AudioSegmenter, SegmenterConfig, SegmenterMetrics, Utterance};
pub use self::config::Config;
pub use error::{
    AgentError, RegistryError, SynthesisError, TranscriptionError, TransportError,
};
pub use http::{create_router, AppState};
pub use session::{
    PipelineConfig, PipelineState, SessionId, SessionRegistry, SessionStats,
};
pub use transport::{
    OutboundTrack, SessionTransport, TransportConnection, TransportEvent, WebRtcConfig,
    WebRtcEngine,
};
