// Integration tests for utterance segmentation
//
// These tests verify the segmenter's boundary behavior: silence-gap and
// duration-cap emission, the never-empty guarantee, frame conservation,
// and reorder-window drop accounting.

mod common;

use common::{silence_frame, speech_frame, FRAME_MS};
use voicebridge::audio::{AudioSegmenter, SegmenterConfig};

fn config(silence_gap_ms: u64, max_utterance_ms: u64, reorder_window: usize) -> SegmenterConfig {
    SegmenterConfig {
        silence_gap_ms,
        max_utterance_ms,
        silence_energy: 0.015,
        reorder_window,
    }
}

#[test]
fn test_silence_only_input_never_emits() {
    let mut segmenter = AudioSegmenter::new(config(800, 15_000, 0));

    for i in 0..100 {
        let emitted = segmenter.push(silence_frame(i * FRAME_MS));
        assert!(emitted.is_none(), "Silence must never produce an utterance");
    }

    assert_eq!(segmenter.metrics().silent_skipped, 100);
    assert_eq!(segmenter.metrics().reorder_dropped, 0);
}

#[test]
fn test_silence_gap_closes_utterance() {
    // 2.5s of speech followed by 1s of silence with a 0.8s gap threshold
    // must yield exactly one ~2.5s utterance.
    let mut segmenter = AudioSegmenter::new(config(800, 15_000, 0));

    let mut utterances = Vec::new();
    let mut ts = 0;
    for _ in 0..25 {
        if let Some(u) = segmenter.push(speech_frame(ts)) {
            utterances.push(u);
        }
        ts += FRAME_MS;
    }
    for _ in 0..10 {
        if let Some(u) = segmenter.push(silence_frame(ts)) {
            utterances.push(u);
        }
        ts += FRAME_MS;
    }

    assert_eq!(utterances.len(), 1, "Expected exactly one utterance");
    assert_eq!(
        utterances[0].duration_ms(),
        2500,
        "Trailing silence should be trimmed from the utterance"
    );
    assert_eq!(utterances[0].frames().len(), 25);
}

#[test]
fn test_duration_cap_is_inclusive() {
    // Cap at 1000ms with 100ms frames: the 10th frame lands exactly on the
    // cap and must trigger emission by itself.
    let mut segmenter = AudioSegmenter::new(config(800, 1000, 0));

    for i in 0..9 {
        assert!(
            segmenter.push(speech_frame(i * FRAME_MS)).is_none(),
            "No emission expected before the cap"
        );
    }

    let utterance = segmenter
        .push(speech_frame(9 * FRAME_MS))
        .expect("Utterance at exactly the cap must be emitted");
    assert_eq!(utterance.duration_ms(), 1000);
    assert_eq!(utterance.frames().len(), 10);
}

#[test]
fn test_continuous_speech_conserves_frames() {
    // With no silence in the input, every pushed frame must reappear in an
    // emitted utterance, in order.
    let mut segmenter = AudioSegmenter::new(config(800, 1000, 0));

    let mut input_samples = Vec::new();
    let mut output_frames = Vec::new();

    for i in 0..30u64 {
        let frame = speech_frame(i * FRAME_MS);
        input_samples.extend_from_slice(&frame.samples);
        if let Some(u) = segmenter.push(frame) {
            output_frames.extend(u.frames().to_vec());
        }
    }

    // 30 frames at a 10-frame cap → three full utterances, nothing buffered.
    assert_eq!(output_frames.len(), 30, "All frames must be emitted");
    let output_samples: Vec<i16> = output_frames
        .iter()
        .flat_map(|f| f.samples.iter().copied())
        .collect();
    assert_eq!(
        output_samples, input_samples,
        "Concatenated utterances must equal the input stream"
    );

    let timestamps: Vec<u64> = output_frames.iter().map(|f| f.timestamp_ms).collect();
    let mut sorted = timestamps.clone();
    sorted.sort_unstable();
    assert_eq!(timestamps, sorted, "Frames must stay in timestamp order");

    assert_eq!(segmenter.metrics().reorder_dropped, 0);
    assert_eq!(segmenter.metrics().silent_skipped, 0);
}

#[test]
fn test_reorder_window_restores_order() {
    // Frames swapped within the window come out in timestamp order.
    let mut segmenter = AudioSegmenter::new(config(800, 1000, 2));

    let order = [0u64, 2, 1, 3, 4, 5, 6, 7, 8, 9, 10, 11];
    let mut frames = Vec::new();
    for &i in &order {
        if let Some(u) = segmenter.push(speech_frame(i * FRAME_MS)) {
            frames.extend(u.frames().to_vec());
        }
    }

    assert!(!frames.is_empty(), "Cap should have produced an utterance");
    let timestamps: Vec<u64> = frames.iter().map(|f| f.timestamp_ms).collect();
    let mut sorted = timestamps.clone();
    sorted.sort_unstable();
    assert_eq!(timestamps, sorted, "Reordered frames must be released sorted");
    assert_eq!(segmenter.metrics().reorder_dropped, 0);
}

#[test]
fn test_frames_behind_window_are_dropped_and_counted() {
    let mut segmenter = AudioSegmenter::new(config(800, 15_000, 2));

    // Fill past the window so ts=0 and ts=100 have been released.
    for i in [0u64, 1, 2, 3] {
        segmenter.push(speech_frame(i * FRAME_MS));
    }

    // A frame older than the newest released timestamp missed its slot.
    assert!(segmenter.push(speech_frame(50)).is_none());
    assert_eq!(segmenter.metrics().reorder_dropped, 1);

    // Late arrival is not fatal; segmentation continues.
    for i in 4..20u64 {
        segmenter.push(speech_frame(i * FRAME_MS));
    }
    assert_eq!(segmenter.metrics().reorder_dropped, 1);
}

#[test]
fn test_empty_frames_are_ignored() {
    let mut segmenter = AudioSegmenter::new(config(800, 1000, 0));

    let empty = voicebridge::audio::AudioFrame {
        samples: Vec::new(),
        sample_rate: 16_000,
        channels: 1,
        timestamp_ms: 0,
    };
    assert!(segmenter.push(empty).is_none());
    assert_eq!(segmenter.buffered_speech_ms(), 0);
}

#[test]
fn test_short_pause_stays_inside_utterance() {
    // A pause shorter than the gap threshold must not split the utterance,
    // and the embedded silence is kept in the emitted audio.
    let mut segmenter = AudioSegmenter::new(config(800, 15_000, 0));

    let mut utterances = Vec::new();
    let mut ts = 0;
    for _ in 0..10 {
        if let Some(u) = segmenter.push(speech_frame(ts)) {
            utterances.push(u);
        }
        ts += FRAME_MS;
    }
    // 500ms pause, below the 800ms threshold
    for _ in 0..5 {
        if let Some(u) = segmenter.push(silence_frame(ts)) {
            utterances.push(u);
        }
        ts += FRAME_MS;
    }
    for _ in 0..10 {
        if let Some(u) = segmenter.push(speech_frame(ts)) {
            utterances.push(u);
        }
        ts += FRAME_MS;
    }
    // Now a real gap
    for _ in 0..9 {
        if let Some(u) = segmenter.push(silence_frame(ts)) {
            utterances.push(u);
        }
        ts += FRAME_MS;
    }

    assert_eq!(utterances.len(), 1, "Short pause must not split the turn");
    assert_eq!(
        utterances[0].duration_ms(),
        2500,
        "Speech plus embedded pause, trailing silence trimmed"
    );
}
