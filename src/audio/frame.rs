use std::io::Cursor;

use anyhow::{Context, Result};

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since the session started
    pub timestamp_ms: u64,
}

impl AudioFrame {
    /// Frame duration in milliseconds, derived from the sample count.
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0;
        }
        let frames = self.samples.len() as u64 / self.channels as u64;
        frames * 1000 / self.sample_rate as u64
    }

    /// Root-mean-square energy of the frame, normalized to [0.0, 1.0].
    pub fn rms(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum: f64 = self
            .samples
            .iter()
            .map(|&s| {
                let v = s as f64 / i16::MAX as f64;
                v * v
            })
            .sum();
        (sum / self.samples.len() as f64).sqrt() as f32
    }
}

/// A bounded run of frames presumed to contain one spoken turn.
///
/// Produced by the segmenter, consumed exactly once by transcription.
/// Never empty.
#[derive(Debug, Clone)]
pub struct Utterance {
    frames: Vec<AudioFrame>,
}

impl Utterance {
    /// Build an utterance from accumulated frames.
    ///
    /// Returns `None` for an empty frame list; the segmenter relies on this
    /// to uphold its never-empty guarantee.
    pub fn from_frames(frames: Vec<AudioFrame>) -> Option<Self> {
        if frames.is_empty() || frames.iter().all(|f| f.samples.is_empty()) {
            return None;
        }
        Some(Self { frames })
    }

    pub fn frames(&self) -> &[AudioFrame] {
        &self.frames
    }

    /// Total duration in milliseconds.
    pub fn duration_ms(&self) -> u64 {
        self.frames.iter().map(|f| f.duration_ms()).sum()
    }

    /// Sample rate of the underlying audio (taken from the first frame).
    pub fn sample_rate(&self) -> u32 {
        self.frames[0].sample_rate
    }

    /// Channel count of the underlying audio (taken from the first frame).
    pub fn channels(&self) -> u16 {
        self.frames[0].channels
    }

    /// All samples concatenated in frame order.
    pub fn samples(&self) -> Vec<i16> {
        self.frames.iter().flat_map(|f| f.samples.iter().copied()).collect()
    }

    /// Encode the utterance as an in-memory WAV file for upload.
    pub fn to_wav_bytes(&self) -> Result<Vec<u8>> {
        let spec = hound::WavSpec {
            channels: self.channels(),
            sample_rate: self.sample_rate(),
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec)
                .context("Failed to create WAV writer")?;
            for frame in &self.frames {
                for &sample in &frame.samples {
                    writer
                        .write_sample(sample)
                        .context("Failed to write sample to WAV")?;
                }
            }
            writer.finalize().context("Failed to finalize WAV")?;
        }

        Ok(cursor.into_inner())
    }
}
