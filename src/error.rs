//! Error taxonomy for the voice pipeline
//!
//! Each external seam gets its own error type so callers can tell
//! retryable conditions from terminal ones without string matching.

use thiserror::Error;

/// Media transport failures. Always fatal to the owning session.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("peer connection failed: {0}")]
    Connection(String),

    #[error("signaling exchange failed: {0}")]
    Signaling(String),

    #[error("outbound track write failed: {0}")]
    TrackWrite(String),

    #[error("unsupported audio format: {0}")]
    Format(String),
}

/// Speech-to-text adapter failures.
#[derive(Debug, Error)]
pub enum TranscriptionError {
    /// Model endpoint unreachable or overloaded. Worth retrying.
    #[error("transcription service unavailable: {0}")]
    Unavailable(String),

    /// The audio itself was rejected. Retrying the same segment is pointless.
    #[error("malformed audio segment: {0}")]
    MalformedAudio(String),

    #[error("transcription call timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl TranscriptionError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout(_))
    }
}

/// Conversational agent adapter failures.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Agent runtime unreachable. Worth retrying with backoff.
    #[error("agent unreachable: {0}")]
    Unreachable(String),

    /// The agent declined to answer. Carried back to the user as a spoken
    /// message, not an error.
    #[error("agent escalated: {0}")]
    Escalated(String),

    #[error("agent call timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl AgentError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unreachable(_) | Self::Timeout(_))
    }
}

/// Text-to-speech adapter failures. Never retried within an exchange.
#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("synthesis failed: {0}")]
    Failed(String),

    #[error("synthesis call timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Session table contract violations. These indicate a defect in the caller,
/// not an environmental condition, and are logged loudly when they surface.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("session {0} already registered")]
    DuplicateSession(String),

    #[error("session {0} not found")]
    SessionNotFound(String),
}
