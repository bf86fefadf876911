// Shared fixtures for the integration tests: channel-backed transports and
// instrumented in-process adapters, so no test touches the network.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::mpsc;

use voicebridge::adapters::{
    AdapterSet, AgentBridge, AudioStream, SessionContext, Synthesizer, Transcriber,
};
use voicebridge::audio::{AudioFrame, SegmenterConfig, Utterance};
use voicebridge::error::{AgentError, SynthesisError, TranscriptionError, TransportError};
use voicebridge::session::PipelineConfig;
use voicebridge::transport::{
    OutboundTrack, SessionTransport, TransportConnection, TransportEvent,
};

pub const SAMPLE_RATE: u32 = 16_000;
pub const FRAME_MS: u64 = 100;
pub const SAMPLES_PER_FRAME: usize = (SAMPLE_RATE as u64 * FRAME_MS / 1000) as usize;

// ============================================================================
// Audio fixtures
// ============================================================================

pub fn speech_frame(timestamp_ms: u64) -> AudioFrame {
    AudioFrame {
        samples: vec![6000i16; SAMPLES_PER_FRAME],
        sample_rate: SAMPLE_RATE,
        channels: 1,
        timestamp_ms,
    }
}

pub fn silence_frame(timestamp_ms: u64) -> AudioFrame {
    AudioFrame {
        samples: vec![0i16; SAMPLES_PER_FRAME],
        sample_rate: SAMPLE_RATE,
        channels: 1,
        timestamp_ms,
    }
}

/// Pipeline config tuned for fast tests
pub fn test_config(grace: Duration, call_timeout: Duration) -> PipelineConfig {
    PipelineConfig {
        segmenter: SegmenterConfig {
            silence_gap_ms: 800,
            max_utterance_ms: 15_000,
            silence_energy: 0.015,
            reorder_window: 0,
        },
        call_timeout,
        max_retries: 2,
        retry_backoff: Duration::from_millis(20),
        grace_period: grace,
        connect_timeout: Duration::from_secs(2),
        apology_text: Some("Sorry about that.".to_string()),
    }
}

// ============================================================================
// Adapter call instrumentation
// ============================================================================

/// Entry/exit timestamps for every adapter call, across all adapters, so
/// tests can assert that exchange stages never overlap.
#[derive(Default)]
pub struct CallLog {
    spans: StdMutex<Vec<(&'static str, Instant, Instant)>>,
}

impl CallLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn record(&self, label: &'static str, start: Instant) {
        self.spans
            .lock()
            .unwrap()
            .push((label, start, Instant::now()));
    }

    pub fn spans(&self) -> Vec<(&'static str, Instant, Instant)> {
        self.spans.lock().unwrap().clone()
    }

    pub fn calls(&self, label: &str) -> usize {
        self.spans
            .lock()
            .unwrap()
            .iter()
            .filter(|(l, _, _)| *l == label)
            .count()
    }
}

// ============================================================================
// Mock adapters
// ============================================================================

pub struct MockTranscriber {
    /// Scripted results, popped per call; empty queue returns a default text
    pub responses: StdMutex<VecDeque<Result<String, TranscriptionError>>>,
    log: Arc<CallLog>,
    delay: Duration,
}

impl MockTranscriber {
    pub fn new(log: Arc<CallLog>) -> Arc<Self> {
        Arc::new(Self {
            responses: StdMutex::new(VecDeque::new()),
            log,
            delay: Duration::from_millis(10),
        })
    }

    pub fn script(&self, results: Vec<Result<String, TranscriptionError>>) {
        *self.responses.lock().unwrap() = results.into();
    }
}

#[async_trait]
impl Transcriber for MockTranscriber {
    async fn transcribe(&self, _utterance: &Utterance) -> Result<String, TranscriptionError> {
        let start = Instant::now();
        tokio::time::sleep(self.delay).await;
        let result = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("hello there".to_string()));
        self.log.record("transcribe", start);
        result
    }
}

pub struct MockAgent {
    pub responses: StdMutex<VecDeque<Result<String, AgentError>>>,
    /// When set, every call parks forever (after logging entry)
    pub stuck: AtomicBool,
    log: Arc<CallLog>,
    delay: Duration,
}

impl MockAgent {
    pub fn new(log: Arc<CallLog>) -> Arc<Self> {
        Arc::new(Self {
            responses: StdMutex::new(VecDeque::new()),
            stuck: AtomicBool::new(false),
            log,
            delay: Duration::from_millis(10),
        })
    }

    pub fn script(&self, results: Vec<Result<String, AgentError>>) {
        *self.responses.lock().unwrap() = results.into();
    }
}

#[async_trait]
impl AgentBridge for MockAgent {
    async fn respond(&self, _ctx: &SessionContext, text: &str) -> Result<String, AgentError> {
        let start = Instant::now();
        if self.stuck.load(Ordering::SeqCst) {
            self.log.record("respond", start);
            std::future::pending::<()>().await;
        }
        tokio::time::sleep(self.delay).await;
        let result = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(format!("you said: {text}")));
        self.log.record("respond", start);
        result
    }
}

pub struct MockSynthesizer {
    /// Every text this synthesizer was asked to speak
    pub texts: StdMutex<Vec<String>>,
    pub fail: AtomicBool,
    log: Arc<CallLog>,
    frames_per_call: usize,
}

impl MockSynthesizer {
    pub fn new(log: Arc<CallLog>) -> Arc<Self> {
        Arc::new(Self {
            texts: StdMutex::new(Vec::new()),
            fail: AtomicBool::new(false),
            log,
            frames_per_call: 3,
        })
    }

    pub fn spoken(&self) -> Vec<String> {
        self.texts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Synthesizer for MockSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<AudioStream, SynthesisError> {
        let start = Instant::now();
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.texts.lock().unwrap().push(text.to_string());
        self.log.record("synthesize", start);

        if self.fail.load(Ordering::SeqCst) {
            return Err(SynthesisError::Failed("scripted failure".to_string()));
        }

        let (tx, rx) = mpsc::channel(8);
        let count = self.frames_per_call;
        tokio::spawn(async move {
            for i in 0..count {
                let frame = AudioFrame {
                    samples: vec![1000i16; 960],
                    sample_rate: 48_000,
                    channels: 1,
                    timestamp_ms: i as u64 * 20,
                };
                if tx.send(frame).await.is_err() {
                    break;
                }
            }
        });
        Ok(rx)
    }
}

/// Bundle the three mocks plus handles for inspection.
pub struct MockAdapters {
    pub set: AdapterSet,
    pub transcriber: Arc<MockTranscriber>,
    pub agent: Arc<MockAgent>,
    pub synthesizer: Arc<MockSynthesizer>,
    pub log: Arc<CallLog>,
}

pub fn mock_adapters() -> MockAdapters {
    let log = CallLog::new();
    let transcriber = MockTranscriber::new(Arc::clone(&log));
    let agent = MockAgent::new(Arc::clone(&log));
    let synthesizer = MockSynthesizer::new(Arc::clone(&log));
    let set = AdapterSet {
        transcriber: transcriber.clone(),
        agent: agent.clone(),
        synthesizer: synthesizer.clone(),
    };
    MockAdapters {
        set,
        transcriber,
        agent,
        synthesizer,
        log,
    }
}

// ============================================================================
// Mock transport
// ============================================================================

#[derive(Default)]
pub struct MockOutbound {
    pub frames: StdMutex<Vec<AudioFrame>>,
}

impl MockOutbound {
    pub fn frame_count(&self) -> usize {
        self.frames.lock().unwrap().len()
    }
}

#[async_trait]
impl OutboundTrack for MockOutbound {
    async fn write_frame(&self, frame: &AudioFrame) -> Result<(), TransportError> {
        self.frames.lock().unwrap().push(frame.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct MockConnection {
    pub closed: AtomicBool,
}

#[async_trait]
impl TransportConnection for MockConnection {
    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Sender half of a channel-backed transport
pub struct TransportDriver {
    pub events: mpsc::Sender<TransportEvent>,
    pub frames: mpsc::Sender<AudioFrame>,
    pub outbound: Arc<MockOutbound>,
    pub connection: Arc<MockConnection>,
}

impl TransportDriver {
    /// Complete the handshake: connection established, audio track bound
    pub async fn establish(&self) {
        self.events.send(TransportEvent::Established).await.unwrap();
        self.events.send(TransportEvent::TrackBound).await.unwrap();
    }

    pub async fn report_closed(&self) {
        self.events.send(TransportEvent::Closed).await.unwrap();
    }

    /// Feed `count` frames of speech starting at `start_ms`; returns the
    /// timestamp just past the last frame.
    pub async fn send_speech(&self, start_ms: u64, count: usize) -> u64 {
        let mut ts = start_ms;
        for _ in 0..count {
            self.frames.send(speech_frame(ts)).await.unwrap();
            ts += FRAME_MS;
        }
        ts
    }

    pub async fn send_silence(&self, start_ms: u64, count: usize) -> u64 {
        let mut ts = start_ms;
        for _ in 0..count {
            self.frames.send(silence_frame(ts)).await.unwrap();
            ts += FRAME_MS;
        }
        ts
    }
}

pub fn mock_transport() -> (SessionTransport, TransportDriver) {
    let (event_tx, event_rx) = mpsc::channel(16);
    let (frame_tx, frame_rx) = mpsc::channel(1024);
    let outbound = Arc::new(MockOutbound::default());
    let connection = Arc::new(MockConnection::default());

    let transport = SessionTransport {
        events: event_rx,
        frames: frame_rx,
        outbound: outbound.clone(),
        connection: connection.clone(),
    };
    let driver = TransportDriver {
        events: event_tx,
        frames: frame_tx,
        outbound,
        connection,
    };
    (transport, driver)
}

// ============================================================================
// Polling helpers
// ============================================================================

use voicebridge::session::{SessionRegistry, SessionStats};

/// Poll a session's stats until `cond` holds or `limit` elapses.
pub async fn wait_for_stats<F>(
    registry: &SessionRegistry,
    id: &str,
    limit: Duration,
    cond: F,
) -> bool
where
    F: Fn(&SessionStats) -> bool,
{
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if let Ok(entry) = registry.get(id).await {
            if cond(&entry.stats()) {
                return true;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// Poll until the session is gone from the registry.
pub async fn wait_removed(registry: &SessionRegistry, id: &str, limit: Duration) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if registry.get(id).await.is_err() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// Poll until `label` has been called at least `count` times.
pub async fn wait_calls(log: &CallLog, label: &str, count: usize, limit: Duration) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if log.calls(label) >= count {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
