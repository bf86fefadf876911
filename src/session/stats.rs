use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Pipeline lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineState {
    /// Transport handshake in progress
    Connecting,
    /// Steady state, exchanges running
    Active,
    /// Finishing or cancelling in-flight work before closing
    Draining,
    /// Terminal; all resources released
    Closed,
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineState::Connecting => write!(f, "connecting"),
            PipelineState::Active => write!(f, "active"),
            PipelineState::Draining => write!(f, "draining"),
            PipelineState::Closed => write!(f, "closed"),
        }
    }
}

/// Shared counters a running pipeline updates in place
#[derive(Debug, Default)]
pub struct PipelineCounters {
    pub utterances: AtomicU64,
    pub exchanges_completed: AtomicU64,
    pub exchanges_failed: AtomicU64,
    pub frames_dropped: AtomicU64,
    pub frames_skipped_silent: AtomicU64,
}

/// Snapshot of a session served by the status endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub session_id: String,
    pub state: PipelineState,
    pub created_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub utterances: u64,
    pub exchanges_completed: u64,
    pub exchanges_failed: u64,
    /// Frames dropped for arriving behind the reorder window
    pub frames_dropped: u64,
    /// Silent frames that never entered an utterance
    pub frames_skipped_silent: u64,
}

impl SessionStats {
    pub fn snapshot(
        session_id: &str,
        state: PipelineState,
        created_at: DateTime<Utc>,
        counters: &PipelineCounters,
    ) -> Self {
        let duration = Utc::now().signed_duration_since(created_at);
        Self {
            session_id: session_id.to_string(),
            state,
            created_at,
            duration_secs: duration.num_milliseconds() as f64 / 1000.0,
            utterances: counters.utterances.load(Ordering::Relaxed),
            exchanges_completed: counters.exchanges_completed.load(Ordering::Relaxed),
            exchanges_failed: counters.exchanges_failed.load(Ordering::Relaxed),
            frames_dropped: counters.frames_dropped.load(Ordering::Relaxed),
            frames_skipped_silent: counters.frames_skipped_silent.load(Ordering::Relaxed),
        }
    }
}
