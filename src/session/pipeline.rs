//! Per-session pipeline task
//!
//! One task per session drives the `Connecting → Active → Draining → Closed`
//! lifecycle. In Active it runs the segment → transcribe → respond →
//! synthesize → emit cycle one exchange at a time so conversational turn
//! order is preserved: a new utterance's exchange never starts until the
//! previous one has emitted its audio or failed.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use super::config::PipelineConfig;
use super::stats::{PipelineCounters, PipelineState};
use crate::adapters::{AdapterSet, AgentBridge, SessionContext, Transcriber};
use crate::audio::{AudioSegmenter, Utterance};
use crate::error::{AgentError, TranscriptionError, TransportError};
use crate::transport::{OutboundTrack, SessionTransport, TransportEvent};

/// How one exchange ended.
enum ExchangeOutcome {
    Completed,
    /// Segment discarded before reaching the agent; not an error
    Dropped,
    /// Exchange lost, session keeps going
    Failed,
    /// Transport lost, session must drain
    Fatal,
}

pub struct SessionPipeline {
    id: String,
    config: Arc<PipelineConfig>,
    adapters: AdapterSet,
    transport: SessionTransport,
    state_tx: watch::Sender<PipelineState>,
    counters: Arc<PipelineCounters>,
    closing: watch::Receiver<bool>,
}

impl SessionPipeline {
    pub fn new(
        id: String,
        config: Arc<PipelineConfig>,
        adapters: AdapterSet,
        transport: SessionTransport,
        state_tx: watch::Sender<PipelineState>,
        counters: Arc<PipelineCounters>,
        closing: watch::Receiver<bool>,
    ) -> Self {
        Self {
            id,
            config,
            adapters,
            transport,
            state_tx,
            counters,
            closing,
        }
    }

    /// Drive the session to completion. Returns once the state is Closed and
    /// the transport connection has been torn down.
    pub async fn run(self) {
        let SessionPipeline {
            id,
            config,
            adapters,
            transport,
            state_tx,
            counters,
            mut closing,
        } = self;
        let SessionTransport {
            mut events,
            mut frames,
            outbound,
            connection,
        } = transport;

        let ctx = SessionContext {
            session_id: id.clone(),
            conversation_id: id.clone(),
        };

        let connected = match timeout(
            config.connect_timeout,
            wait_connected(&mut events, &mut closing),
        )
        .await
        {
            Ok(ready) => ready,
            Err(_) => {
                warn!(session_id = %id, "Transport handshake timed out");
                false
            }
        };

        if connected {
            let _ = state_tx.send(PipelineState::Active);
            info!(session_id = %id, "Session active");

            let mut segmenter = AudioSegmenter::new(config.segmenter.clone());

            'active: loop {
                tokio::select! {
                    _ = wait_close(&mut closing) => {
                        debug!(session_id = %id, "Shutdown requested");
                        break 'active;
                    }
                    ev = events.recv() => match ev {
                        Some(TransportEvent::Closed) | None => {
                            info!(session_id = %id, "Transport closed");
                            break 'active;
                        }
                        _ => {}
                    },
                    maybe_frame = frames.recv() => {
                        let Some(frame) = maybe_frame else {
                            info!(session_id = %id, "Inbound frame stream ended");
                            break 'active;
                        };

                        let emitted = segmenter.push(frame);
                        sync_segmenter_metrics(&counters, &segmenter);
                        let Some(utterance) = emitted else { continue };

                        counters.utterances.fetch_add(1, Ordering::Relaxed);
                        debug!(
                            session_id = %id,
                            duration_ms = utterance.duration_ms(),
                            "Utterance segmented"
                        );

                        let exchange =
                            run_exchange(&config, &adapters, &ctx, outbound.as_ref(), &utterance);
                        tokio::pin!(exchange);

                        let raced = tokio::select! {
                            outcome = &mut exchange => Some(outcome),
                            _ = wait_close(&mut closing) => None,
                            _ = closed_event(&mut events) => None,
                        };

                        let mut drain_after = false;
                        let outcome = match raced {
                            Some(outcome) => outcome,
                            None => {
                                // Draining with an exchange in flight: let it
                                // finish within the grace period, then drop it.
                                drain_after = true;
                                let _ = state_tx.send(PipelineState::Draining);
                                info!(session_id = %id, "Draining with exchange in flight");
                                match timeout(config.grace_period, &mut exchange).await {
                                    Ok(outcome) => outcome,
                                    Err(_) => {
                                        warn!(
                                            session_id = %id,
                                            "Grace period elapsed, cancelling exchange"
                                        );
                                        ExchangeOutcome::Failed
                                    }
                                }
                            }
                        };

                        match outcome {
                            ExchangeOutcome::Completed => {
                                counters.exchanges_completed.fetch_add(1, Ordering::Relaxed);
                            }
                            ExchangeOutcome::Dropped => {}
                            ExchangeOutcome::Failed => {
                                counters.exchanges_failed.fetch_add(1, Ordering::Relaxed);
                            }
                            ExchangeOutcome::Fatal => {
                                counters.exchanges_failed.fetch_add(1, Ordering::Relaxed);
                                break 'active;
                            }
                        }

                        if drain_after {
                            break 'active;
                        }
                    }
                }
            }
        }

        let _ = state_tx.send(PipelineState::Draining);
        connection.close().await;
        let _ = state_tx.send(PipelineState::Closed);
        info!(session_id = %id, "Session closed");
    }
}

/// Resolve the Connecting phase: true once the connection is established and
/// an inbound audio track is bound, false if the transport dies first.
async fn wait_connected(
    events: &mut mpsc::Receiver<TransportEvent>,
    closing: &mut watch::Receiver<bool>,
) -> bool {
    let mut established = false;
    let mut track_bound = false;

    loop {
        if established && track_bound {
            return true;
        }
        tokio::select! {
            _ = wait_close(closing) => return false,
            ev = events.recv() => match ev {
                Some(TransportEvent::Established) => established = true,
                Some(TransportEvent::TrackBound) => track_bound = true,
                Some(TransportEvent::Closed) | None => return false,
            },
        }
    }
}

/// Resolves when a close has been requested (or the requester is gone).
async fn wait_close(closing: &mut watch::Receiver<bool>) {
    while !*closing.borrow() {
        if closing.changed().await.is_err() {
            return;
        }
    }
}

/// Resolves when the transport reports Closed. Other events are irrelevant
/// once the session is Active and are discarded.
async fn closed_event(events: &mut mpsc::Receiver<TransportEvent>) {
    loop {
        match events.recv().await {
            Some(TransportEvent::Closed) | None => return,
            _ => {}
        }
    }
}

fn sync_segmenter_metrics(counters: &PipelineCounters, segmenter: &AudioSegmenter) {
    let metrics = segmenter.metrics();
    counters
        .frames_dropped
        .store(metrics.reorder_dropped, Ordering::Relaxed);
    counters
        .frames_skipped_silent
        .store(metrics.silent_skipped, Ordering::Relaxed);
}

/// One utterance → transcription → agent → synthesis → outbound round trip.
async fn run_exchange(
    config: &PipelineConfig,
    adapters: &AdapterSet,
    ctx: &SessionContext,
    outbound: &dyn OutboundTrack,
    utterance: &Utterance,
) -> ExchangeOutcome {
    let recognized =
        match transcribe_with_retry(config, adapters.transcriber.as_ref(), utterance).await {
            Ok(text) => text,
            Err(e) if e.is_retryable() => {
                warn!("Transcription failed after retries: {e}");
                return ExchangeOutcome::Failed;
            }
            Err(e) => {
                warn!(
                    duration_ms = utterance.duration_ms(),
                    "Utterance dropped: {e}"
                );
                return ExchangeOutcome::Dropped;
            }
        };

    if recognized.trim().is_empty() {
        debug!("Empty transcription, skipping exchange");
        return ExchangeOutcome::Dropped;
    }

    let response = match respond_with_retry(config, adapters.agent.as_ref(), ctx, &recognized).await
    {
        Ok(text) => text,
        // An escalation is an answer, not a failure: the user hears it.
        Err(AgentError::Escalated(message)) => {
            info!(session_id = %ctx.session_id, "Agent escalated");
            message
        }
        Err(e) => {
            warn!("Agent call failed: {e}");
            speak_apology(config, adapters, outbound).await;
            return ExchangeOutcome::Failed;
        }
    };

    let stream = match timeout(
        config.call_timeout,
        adapters.synthesizer.synthesize(&response),
    )
    .await
    {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            warn!("Synthesis failed: {e}");
            return ExchangeOutcome::Failed;
        }
        Err(_) => {
            warn!("Synthesis timed out");
            return ExchangeOutcome::Failed;
        }
    };

    match emit_audio(outbound, stream).await {
        Ok(synthesized_ms) => {
            info!(
                recognized = %recognized,
                response = %response,
                synthesized_ms,
                "Exchange complete"
            );
            ExchangeOutcome::Completed
        }
        Err(e) => {
            error!("Outbound write failed: {e}");
            ExchangeOutcome::Fatal
        }
    }
}

async fn transcribe_with_retry(
    config: &PipelineConfig,
    transcriber: &dyn Transcriber,
    utterance: &Utterance,
) -> Result<String, TranscriptionError> {
    let mut attempt = 0u32;
    loop {
        let result = match timeout(config.call_timeout, transcriber.transcribe(utterance)).await {
            Ok(result) => result,
            Err(_) => Err(TranscriptionError::Timeout(config.call_timeout)),
        };
        match result {
            Ok(text) => return Ok(text),
            Err(e) if e.is_retryable() && attempt < config.max_retries => {
                attempt += 1;
                warn!(attempt, "Retrying transcription: {e}");
                tokio::time::sleep(config.retry_backoff * (1 << (attempt - 1))).await;
            }
            Err(e) => return Err(e),
        }
    }
}

async fn respond_with_retry(
    config: &PipelineConfig,
    agent: &dyn AgentBridge,
    ctx: &SessionContext,
    text: &str,
) -> Result<String, AgentError> {
    let mut attempt = 0u32;
    loop {
        let result = match timeout(config.call_timeout, agent.respond(ctx, text)).await {
            Ok(result) => result,
            Err(_) => Err(AgentError::Timeout(config.call_timeout)),
        };
        match result {
            Ok(response) => return Ok(response),
            Err(e) if e.is_retryable() && attempt < config.max_retries => {
                attempt += 1;
                warn!(attempt, "Retrying agent call: {e}");
                tokio::time::sleep(config.retry_backoff * (1 << (attempt - 1))).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Best-effort spoken failure notice so the user never gets a hung silence
/// without explanation. Failures here end the exchange silently.
async fn speak_apology(config: &PipelineConfig, adapters: &AdapterSet, outbound: &dyn OutboundTrack) {
    let Some(text) = &config.apology_text else {
        return;
    };
    let stream = match timeout(config.call_timeout, adapters.synthesizer.synthesize(text)).await {
        Ok(Ok(stream)) => stream,
        _ => {
            debug!("Apology synthesis failed");
            return;
        }
    };
    if let Err(e) = emit_audio(outbound, stream).await {
        debug!("Apology playback failed: {e}");
    }
}

/// Pump a synthesized stream onto the outbound track.
async fn emit_audio(
    outbound: &dyn OutboundTrack,
    mut stream: mpsc::Receiver<crate::audio::AudioFrame>,
) -> Result<u64, TransportError> {
    let mut total_ms = 0;
    while let Some(frame) = stream.recv().await {
        total_ms += frame.duration_ms();
        outbound.write_frame(&frame).await?;
    }
    Ok(total_ms)
}
