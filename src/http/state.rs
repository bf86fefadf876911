use std::sync::Arc;

use crate::session::SessionRegistry;
use crate::transport::WebRtcEngine;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Active session table
    pub registry: Arc<SessionRegistry>,
    /// Shared WebRTC API for answering offers
    pub engine: Arc<WebRtcEngine>,
}

impl AppState {
    pub fn new(registry: Arc<SessionRegistry>, engine: Arc<WebRtcEngine>) -> Self {
        Self { registry, engine }
    }
}
