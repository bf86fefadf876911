use std::time::Duration;

use crate::audio::SegmenterConfig;

/// Runtime knobs for one session pipeline
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Utterance segmentation thresholds
    pub segmenter: SegmenterConfig,

    /// Per-call timeout applied to every adapter invocation
    pub call_timeout: Duration,

    /// Retry budget for retryable transcription/agent failures
    pub max_retries: u32,

    /// Initial backoff between retries (doubles per attempt)
    pub retry_backoff: Duration,

    /// How long an in-flight exchange may keep running once draining starts
    pub grace_period: Duration,

    /// How long a session may sit in Connecting before it is closed
    pub connect_timeout: Duration,

    /// Spoken when an exchange fails after transcription; None means silence
    pub apology_text: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            segmenter: SegmenterConfig::default(),
            call_timeout: Duration::from_secs(10),
            max_retries: 2,
            retry_backoff: Duration::from_millis(200),
            grace_period: Duration::from_secs(2),
            connect_timeout: Duration::from_secs(10),
            apology_text: Some(
                "Sorry, I ran into a problem answering that. Could you try again?".to_string(),
            ),
        }
    }
}
