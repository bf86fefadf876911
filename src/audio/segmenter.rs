//! Silence/duration-bounded utterance segmentation
//!
//! Frames are released through a small reorder window, accumulated while the
//! speaker is active, and emitted as a single utterance when either a silence
//! gap exceeds the configured threshold or the accumulated speech reaches the
//! duration cap. Frames arriving behind the reorder window are dropped and
//! counted, never fatal.

use tracing::debug;

use super::frame::{AudioFrame, Utterance};

/// Segmentation thresholds
#[derive(Debug, Clone)]
pub struct SegmenterConfig {
    /// Silence gap that closes an utterance (default: 800ms)
    pub silence_gap_ms: u64,
    /// Hard cap on accumulated speech per utterance (inclusive)
    pub max_utterance_ms: u64,
    /// RMS energy below which a frame counts as silence
    pub silence_energy: f32,
    /// How many frames to hold back for timestamp reordering
    pub reorder_window: usize,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            silence_gap_ms: 800,
            max_utterance_ms: 15_000,
            silence_energy: 0.015,
            reorder_window: 4,
        }
    }
}

/// Counters for frames that never made it into an utterance
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SegmenterMetrics {
    /// Frames dropped for arriving behind the reorder window
    pub reorder_dropped: u64,
    /// Silent frames skipped before speech or trimmed after it
    pub silent_skipped: u64,
}

/// Accumulates one session's inbound frames into bounded utterances.
///
/// `push` is a pure transform over the frame stream: zero or one utterance
/// out per frame in, no side effects beyond internal state.
pub struct AudioSegmenter {
    config: SegmenterConfig,
    /// Frames held back for reordering, sorted by timestamp
    pending: Vec<AudioFrame>,
    /// Newest timestamp already released from the reorder window
    released_ms: Option<u64>,
    /// Current utterance under accumulation (starts with a speech frame)
    buffer: Vec<AudioFrame>,
    buffer_ms: u64,
    /// Length of the silent run at the tail of `buffer`
    trailing_silence_ms: u64,
    trailing_silent_frames: usize,
    metrics: SegmenterMetrics,
}

impl AudioSegmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        Self {
            config,
            pending: Vec::new(),
            released_ms: None,
            buffer: Vec::new(),
            buffer_ms: 0,
            trailing_silence_ms: 0,
            trailing_silent_frames: 0,
            metrics: SegmenterMetrics::default(),
        }
    }

    pub fn metrics(&self) -> SegmenterMetrics {
        self.metrics
    }

    /// Duration currently buffered toward the next utterance, excluding the
    /// trailing silent run.
    pub fn buffered_speech_ms(&self) -> u64 {
        self.buffer_ms - self.trailing_silence_ms
    }

    /// Feed one frame; returns a completed utterance when a boundary is hit.
    pub fn push(&mut self, frame: AudioFrame) -> Option<Utterance> {
        if frame.samples.is_empty() {
            return None;
        }

        // Frames behind the newest released timestamp missed the window.
        if let Some(released) = self.released_ms {
            if frame.timestamp_ms < released {
                self.metrics.reorder_dropped += 1;
                debug!(
                    timestamp_ms = frame.timestamp_ms,
                    released_ms = released,
                    "Dropping frame behind reorder window"
                );
                return None;
            }
        }

        // Insert in timestamp order; equal timestamps keep arrival order.
        let at = self
            .pending
            .iter()
            .position(|f| f.timestamp_ms > frame.timestamp_ms)
            .unwrap_or(self.pending.len());
        self.pending.insert(at, frame);

        if self.pending.len() <= self.config.reorder_window {
            return None;
        }

        let next = self.pending.remove(0);
        self.released_ms = Some(next.timestamp_ms);
        self.accumulate(next)
    }

    fn accumulate(&mut self, frame: AudioFrame) -> Option<Utterance> {
        let silent = frame.rms() < self.config.silence_energy;
        let duration = frame.duration_ms();

        if self.buffer.is_empty() {
            if silent {
                self.metrics.silent_skipped += 1;
                return None;
            }
            self.buffer.push(frame);
            self.buffer_ms = duration;
            self.trailing_silence_ms = 0;
            self.trailing_silent_frames = 0;
        } else if silent {
            self.buffer.push(frame);
            self.buffer_ms += duration;
            self.trailing_silence_ms += duration;
            self.trailing_silent_frames += 1;

            if self.trailing_silence_ms >= self.config.silence_gap_ms {
                return self.emit();
            }
        } else {
            self.buffer.push(frame);
            self.buffer_ms += duration;
            self.trailing_silence_ms = 0;
            self.trailing_silent_frames = 0;
        }

        // Inclusive cap: emitting at exactly the maximum is valid.
        if self.buffered_speech_ms() >= self.config.max_utterance_ms {
            return self.emit();
        }

        None
    }

    /// Close out the current buffer, trimming the trailing silent run.
    fn emit(&mut self) -> Option<Utterance> {
        let keep = self.buffer.len() - self.trailing_silent_frames;
        self.metrics.silent_skipped += self.trailing_silent_frames as u64;
        self.buffer.truncate(keep);

        let frames = std::mem::take(&mut self.buffer);
        self.buffer_ms = 0;
        self.trailing_silence_ms = 0;
        self.trailing_silent_frames = 0;

        // The buffer always opens with a speech frame, so this is never None
        // in practice; the constructor guard backs the never-empty invariant.
        Utterance::from_frames(frames)
    }
}
