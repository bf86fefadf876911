//! Process-wide session table
//!
//! Create/remove are serialized through the write half of a single `RwLock`;
//! lookups share the read half. Every entry owns exactly one pipeline task,
//! and the entry is removed as soon as that task finishes, so nothing keeps
//! running for a session that is no longer in the table.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{error, info, warn};

use super::config::PipelineConfig;
use super::pipeline::SessionPipeline;
use super::stats::{PipelineCounters, PipelineState, SessionStats};
use crate::adapters::AdapterSet;
use crate::error::RegistryError;
use crate::transport::SessionTransport;

pub type SessionId = String;

/// Extra time `close_all` allows beyond the grace period for task teardown
const CLOSE_ALL_OVERHEAD: Duration = Duration::from_secs(1);

/// One live session as seen from outside its pipeline task.
pub struct SessionEntry {
    pub id: SessionId,
    created_at: DateTime<Utc>,
    state_rx: watch::Receiver<PipelineState>,
    close_tx: watch::Sender<bool>,
    counters: Arc<PipelineCounters>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SessionEntry {
    pub fn state(&self) -> PipelineState {
        *self.state_rx.borrow()
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats::snapshot(&self.id, self.state(), self.created_at, &self.counters)
    }

    /// Ask the pipeline to drain and close.
    pub fn request_close(&self) {
        let _ = self.close_tx.send(true);
    }

    /// Resolve once the pipeline reports Closed (or its task is gone).
    pub async fn wait_closed(&self) {
        let mut rx = self.state_rx.clone();
        while *rx.borrow() != PipelineState::Closed {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<SessionId, Arc<SessionEntry>>>>,
    config: Arc<PipelineConfig>,
    adapters: AdapterSet,
}

impl SessionRegistry {
    pub fn new(config: Arc<PipelineConfig>, adapters: AdapterSet) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            config,
            adapters,
        }
    }

    /// Register a new session around the given transport and start its
    /// pipeline task. The entry removes itself when the pipeline closes.
    pub async fn create(&self, transport: SessionTransport) -> Result<SessionId, RegistryError> {
        let id = uuid::Uuid::new_v4().to_string();

        let (close_tx, close_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(PipelineState::Connecting);
        let counters = Arc::new(PipelineCounters::default());

        let pipeline = SessionPipeline::new(
            id.clone(),
            Arc::clone(&self.config),
            self.adapters.clone(),
            transport,
            state_tx,
            Arc::clone(&counters),
            close_rx,
        );

        let entry = Arc::new(SessionEntry {
            id: id.clone(),
            created_at: Utc::now(),
            state_rx,
            close_tx,
            counters,
            task: Mutex::new(None),
        });

        {
            let mut table = self.sessions.write().await;
            if table.contains_key(&id) {
                // Should be impossible with v4 ids; if it fires, something is
                // reusing identifiers and the caller has a defect.
                error!(session_id = %id, "Duplicate session id on create");
                return Err(RegistryError::DuplicateSession(id));
            }
            table.insert(id.clone(), Arc::clone(&entry));
        }

        let table = Arc::clone(&self.sessions);
        let task_id = id.clone();
        let handle = tokio::spawn(async move {
            pipeline.run().await;
            table.write().await.remove(&task_id);
            info!(session_id = %task_id, "Session removed from registry");
        });
        *entry.task.lock().await = Some(handle);

        info!(session_id = %id, "Session registered");
        Ok(id)
    }

    pub async fn get(&self, id: &str) -> Result<Arc<SessionEntry>, RegistryError> {
        let table = self.sessions.read().await;
        table
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::SessionNotFound(id.to_string()))
    }

    pub async fn list(&self) -> Vec<SessionId> {
        let table = self.sessions.read().await;
        table.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Drain every live session and wait for all of them to reach Closed,
    /// bounded by the grace period plus a small teardown overhead. Safe to
    /// call repeatedly; subsequent calls find an empty table and return.
    pub async fn close_all(&self) {
        let entries: Vec<Arc<SessionEntry>> = {
            let table = self.sessions.read().await;
            table.values().cloned().collect()
        };

        if entries.is_empty() {
            return;
        }

        info!(sessions = entries.len(), "Closing all sessions");

        for entry in &entries {
            entry.request_close();
        }

        let deadline = self.config.grace_period + CLOSE_ALL_OVERHEAD;
        let waits = entries.iter().map(|entry| entry.wait_closed());

        if timeout(deadline, join_all(waits)).await.is_err() {
            warn!("Shutdown deadline elapsed, aborting remaining session tasks");
            for entry in &entries {
                if let Some(task) = entry.task.lock().await.take() {
                    task.abort();
                }
            }
        }

        self.sessions.write().await.clear();
        info!("All sessions closed");
    }
}
