//! Session lifecycle management
//!
//! This module provides the per-session pipeline and the process-wide
//! registry:
//! - `SessionPipeline` wires one transport connection through the
//!   segment → transcribe → respond → synthesize → emit cycle
//! - `SessionRegistry` creates, tracks, and drains sessions
//! - `SessionStats` exposes per-session counters for the HTTP API

mod config;
mod pipeline;
mod registry;
mod stats;

pub use config::PipelineConfig;
pub use pipeline::SessionPipeline;
pub use registry::{SessionEntry, SessionId, SessionRegistry};
pub use stats::{PipelineCounters, PipelineState, SessionStats};
