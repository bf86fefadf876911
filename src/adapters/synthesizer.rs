//! HTTP text-to-speech adapter
//!
//! Posts the response text and the outbound track's audio format to a TTS
//! endpoint that answers with base64-encoded 16-bit PCM. The decoded audio is
//! re-chunked into fixed-duration frames and handed back as a lazy stream.

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use super::{AudioStream, Synthesizer};
use crate::audio::AudioFrame;
use crate::error::SynthesisError;

#[derive(Debug, Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
    sample_rate: u32,
    channels: u16,
}

#[derive(Debug, Deserialize)]
struct SynthesisResponse {
    /// Base64-encoded PCM bytes (16-bit signed little-endian, interleaved)
    audio: String,
}

pub struct HttpSynthesizer {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    /// Format the outbound track expects
    sample_rate: u32,
    channels: u16,
    frame_ms: u64,
}

impl HttpSynthesizer {
    pub fn new(
        client: reqwest::Client,
        url: impl Into<String>,
        api_key: Option<String>,
        sample_rate: u32,
        channels: u16,
        frame_ms: u64,
    ) -> Self {
        Self {
            client,
            url: url.into(),
            api_key,
            sample_rate,
            channels,
            frame_ms,
        }
    }
}

#[async_trait]
impl Synthesizer for HttpSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<AudioStream, SynthesisError> {
        let body = SynthesisRequest {
            text,
            sample_rate: self.sample_rate,
            channels: self.channels,
        };

        let mut request = self.client.post(&self.url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SynthesisError::Failed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SynthesisError::Failed(format!(
                "synthesis endpoint returned {status}"
            )));
        }

        let parsed: SynthesisResponse = response
            .json()
            .await
            .map_err(|e| SynthesisError::Failed(e.to_string()))?;

        let pcm = base64::engine::general_purpose::STANDARD
            .decode(parsed.audio)
            .map_err(|e| SynthesisError::Failed(format!("bad audio payload: {e}")))?;

        let samples: Vec<i16> = pcm
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();

        if samples.is_empty() {
            return Err(SynthesisError::Failed("empty audio payload".to_string()));
        }

        debug!(
            samples = samples.len(),
            sample_rate = self.sample_rate,
            "Synthesized audio received"
        );

        let samples_per_frame =
            (self.sample_rate as u64 * self.frame_ms / 1000) as usize * self.channels as usize;
        let sample_rate = self.sample_rate;
        let channels = self.channels;
        let frame_ms = self.frame_ms;

        // Small channel keeps the stream lazy; the producer task ends when
        // the last chunk is sent or the receiver is dropped.
        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            for (i, chunk) in samples.chunks(samples_per_frame.max(1)).enumerate() {
                let frame = AudioFrame {
                    samples: chunk.to_vec(),
                    sample_rate,
                    channels,
                    timestamp_ms: i as u64 * frame_ms,
                };
                if tx.send(frame).await.is_err() {
                    break;
                }
            }
        });

        Ok(rx)
    }
}
