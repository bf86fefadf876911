//! HTTP API server: signaling plus session queries
//!
//! - POST /offer - SDP offer/answer exchange, creates a session
//! - GET /sessions - List live session ids
//! - GET /sessions/:id/status - Query session stats
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
