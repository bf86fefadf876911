//! Model adapter contracts
//!
//! The pipeline only ever touches speech-to-text, the conversational agent,
//! and text-to-speech through these traits, so any backend can be swapped in
//! without touching the session state machine. The HTTP implementations here
//! are the reference backends; tests substitute in-process mocks.

pub mod agent;
pub mod synthesizer;
pub mod transcriber;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::audio::{AudioFrame, Utterance};
use crate::error::{AgentError, SynthesisError, TranscriptionError};

pub use agent::HttpAgentBridge;
pub use synthesizer::HttpSynthesizer;
pub use transcriber::HttpTranscriber;

/// Lazy, finite, non-restartable sequence of synthesized audio frames.
pub type AudioStream = mpsc::Receiver<AudioFrame>;

/// Minimal per-session context forwarded to the agent runtime so it can keep
/// multi-turn state. Conversation history lives with the agent, not here.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session_id: String,
    pub conversation_id: String,
}

/// Speech-to-text: one utterance in, recognized text out.
///
/// Implementations must be safe to invoke concurrently for distinct sessions.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, utterance: &Utterance) -> Result<String, TranscriptionError>;
}

/// Conversational agent: recognized text in, response text out.
#[async_trait]
pub trait AgentBridge: Send + Sync {
    async fn respond(&self, ctx: &SessionContext, text: &str) -> Result<String, AgentError>;
}

/// Text-to-speech: response text in, audio frame stream out.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<AudioStream, SynthesisError>;
}

/// The three adapters a pipeline needs, bundled for cheap cloning.
#[derive(Clone)]
pub struct AdapterSet {
    pub transcriber: Arc<dyn Transcriber>,
    pub agent: Arc<dyn AgentBridge>,
    pub synthesizer: Arc<dyn Synthesizer>,
}
