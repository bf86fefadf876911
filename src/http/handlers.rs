use super::state::AppState;
use crate::error::TransportError;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Browser SDP offer: `{"sdp": "...", "type": "offer"}`
#[derive(Debug, Deserialize)]
pub struct OfferRequest {
    pub sdp: String,
    #[serde(rename = "type")]
    pub sdp_type: String,
}

/// Answer description returned to the browser in the same shape
#[derive(Debug, Serialize)]
pub struct AnswerResponse {
    pub sdp: String,
    #[serde(rename = "type")]
    pub sdp_type: String,
}

#[derive(Debug, Serialize)]
pub struct SessionListResponse {
    pub sessions: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /offer
/// Accept a browser offer, register a session, return the answer
pub async fn offer(
    State(state): State<AppState>,
    Json(req): Json<OfferRequest>,
) -> impl IntoResponse {
    if req.sdp_type != "offer" {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: format!("Expected type \"offer\", got {:?}", req.sdp_type),
            }),
        )
            .into_response();
    }

    let (transport, answer) = match state.engine.accept_offer(req.sdp).await {
        Ok(pair) => pair,
        Err(e @ TransportError::Signaling(_)) => {
            error!("Rejected offer: {e}");
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response();
        }
        Err(e) => {
            error!("Failed to build peer connection: {e}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response();
        }
    };

    match state.registry.create(transport).await {
        Ok(session_id) => {
            info!(session_id = %session_id, "Session created from offer");
            (
                StatusCode::OK,
                Json(AnswerResponse {
                    sdp: answer.sdp,
                    sdp_type: answer.sdp_type.to_string(),
                }),
            )
                .into_response()
        }
        Err(e) => {
            error!("Failed to register session: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// GET /sessions
/// List live session ids
pub async fn list_sessions(State(state): State<AppState>) -> impl IntoResponse {
    let sessions = state.registry.list().await;
    (StatusCode::OK, Json(SessionListResponse { sessions }))
}

/// GET /sessions/:session_id/status
/// Stats snapshot for one session
pub async fn session_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    match state.registry.get(&session_id).await {
        Ok(entry) => (StatusCode::OK, Json(entry.stats())).into_response(),
        Err(e) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        )
            .into_response(),
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
