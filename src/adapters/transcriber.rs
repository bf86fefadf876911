//! HTTP speech-to-text adapter
//!
//! Posts the utterance as an in-memory WAV file to a Whisper-style
//! `audio/transcriptions` endpoint and returns the recognized text.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::Transcriber;
use crate::audio::Utterance;
use crate::error::TranscriptionError;

/// JSON body returned by the transcription endpoint.
#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

pub struct HttpTranscriber {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: Option<String>,
}

impl HttpTranscriber {
    pub fn new(
        client: reqwest::Client,
        url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            client,
            url: url.into(),
            model: model.into(),
            api_key,
        }
    }
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(&self, utterance: &Utterance) -> Result<String, TranscriptionError> {
        let wav = utterance
            .to_wav_bytes()
            .map_err(|e| TranscriptionError::MalformedAudio(e.to_string()))?;

        debug!(
            duration_ms = utterance.duration_ms(),
            bytes = wav.len(),
            "Uploading utterance for transcription"
        );

        let file = reqwest::multipart::Part::bytes(wav)
            .file_name("utterance.wav")
            .mime_str("audio/wav")
            .map_err(|e| TranscriptionError::MalformedAudio(e.to_string()))?;

        let form = reqwest::multipart::Form::new()
            .part("file", file)
            .text("model", self.model.clone())
            .text("response_format", "json");

        let mut request = self.client.post(&self.url).multipart(form);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TranscriptionError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(TranscriptionError::Unavailable(format!(
                "transcription endpoint returned {status}"
            )));
        }
        if !status.is_success() {
            // The endpoint rejected this audio; retrying the same segment
            // cannot succeed.
            let body = response.text().await.unwrap_or_default();
            return Err(TranscriptionError::MalformedAudio(format!(
                "{status}: {body}"
            )));
        }

        let parsed: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| TranscriptionError::Unavailable(e.to_string()))?;

        Ok(parsed.text)
    }
}
