use anyhow::Result;
use serde::Deserialize;
use std::time::Duration;

use crate::audio::SegmenterConfig;
use crate::session::PipelineConfig;
use crate::transport::WebRtcConfig;

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub segmenter: SegmenterSettings,
    #[serde(default)]
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub adapters: AdaptersConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_service_name")]
    pub name: String,
    #[serde(default)]
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AudioConfig {
    /// Rate the pipeline and transcriber consume audio at
    #[serde(default = "default_capture_rate")]
    pub capture_sample_rate: u32,
    /// Rate the outbound track plays at (Opus native)
    #[serde(default = "default_playback_rate")]
    pub playback_sample_rate: u32,
    #[serde(default = "default_channels")]
    pub channels: u16,
    #[serde(default = "default_frame_ms")]
    pub frame_ms: u64,
    #[serde(default = "default_stun_server")]
    pub stun_server: String,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            capture_sample_rate: default_capture_rate(),
            playback_sample_rate: default_playback_rate(),
            channels: default_channels(),
            frame_ms: default_frame_ms(),
            stun_server: default_stun_server(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SegmenterSettings {
    #[serde(default = "default_silence_gap_ms")]
    pub silence_gap_ms: u64,
    #[serde(default = "default_max_utterance_ms")]
    pub max_utterance_ms: u64,
    #[serde(default = "default_silence_energy")]
    pub silence_energy: f32,
    #[serde(default = "default_reorder_window")]
    pub reorder_window: usize,
}

impl Default for SegmenterSettings {
    fn default() -> Self {
        Self {
            silence_gap_ms: default_silence_gap_ms(),
            max_utterance_ms: default_max_utterance_ms(),
            silence_energy: default_silence_energy(),
            reorder_window: default_reorder_window(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ExchangeConfig {
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_grace_period_secs")]
    pub grace_period_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Spoken on exchange failure; empty string disables the apology
    #[serde(default = "default_apology_text")]
    pub apology_text: String,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            call_timeout_secs: default_call_timeout_secs(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            grace_period_secs: default_grace_period_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            apology_text: default_apology_text(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct AdaptersConfig {
    #[serde(default)]
    pub transcriber: TranscriberConfig,
    #[serde(default)]
    pub agent: EndpointConfig,
    #[serde(default)]
    pub synthesizer: EndpointConfig,
}

#[derive(Debug, Deserialize)]
pub struct TranscriberConfig {
    #[serde(default = "default_transcriber_url")]
    pub url: String,
    #[serde(default = "default_transcriber_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for TranscriberConfig {
    fn default() -> Self {
        Self {
            url: default_transcriber_url(),
            model: default_transcriber_model(),
            api_key: None,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct EndpointConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Config {
    /// Load from a config file (if present) layered under
    /// `VOICEBRIDGE_`-prefixed environment variables.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("VOICEBRIDGE").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn segmenter_config(&self) -> SegmenterConfig {
        SegmenterConfig {
            silence_gap_ms: self.segmenter.silence_gap_ms,
            max_utterance_ms: self.segmenter.max_utterance_ms,
            silence_energy: self.segmenter.silence_energy,
            reorder_window: self.segmenter.reorder_window,
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        let apology = self.exchange.apology_text.trim();
        PipelineConfig {
            segmenter: self.segmenter_config(),
            call_timeout: Duration::from_secs(self.exchange.call_timeout_secs),
            max_retries: self.exchange.max_retries,
            retry_backoff: Duration::from_millis(self.exchange.retry_backoff_ms),
            grace_period: Duration::from_secs(self.exchange.grace_period_secs),
            connect_timeout: Duration::from_secs(self.exchange.connect_timeout_secs),
            apology_text: if apology.is_empty() {
                None
            } else {
                Some(apology.to_string())
            },
        }
    }

    pub fn webrtc_config(&self) -> WebRtcConfig {
        WebRtcConfig {
            stun_server: self.audio.stun_server.clone(),
            capture_sample_rate: self.audio.capture_sample_rate,
            playback_sample_rate: self.audio.playback_sample_rate,
            channels: self.audio.channels,
            frame_ms: self.audio.frame_ms,
        }
    }
}

fn default_service_name() -> String {
    "voicebridge".to_string()
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_capture_rate() -> u32 {
    16_000
}

fn default_playback_rate() -> u32 {
    48_000
}

fn default_channels() -> u16 {
    1
}

fn default_frame_ms() -> u64 {
    20
}

fn default_stun_server() -> String {
    "stun:stun.l.google.com:19302".to_string()
}

fn default_silence_gap_ms() -> u64 {
    800
}

fn default_max_utterance_ms() -> u64 {
    15_000
}

fn default_silence_energy() -> f32 {
    0.015
}

fn default_reorder_window() -> usize {
    4
}

fn default_call_timeout_secs() -> u64 {
    10
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_backoff_ms() -> u64 {
    200
}

fn default_grace_period_secs() -> u64 {
    2
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_apology_text() -> String {
    "Sorry, I ran into a problem answering that. Could you try again?".to_string()
}

fn default_transcriber_url() -> String {
    "http://localhost:9000/v1/audio/transcriptions".to_string()
}

fn default_transcriber_model() -> String {
    "whisper-1".to_string()
}
