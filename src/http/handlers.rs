use super::state::AppState;
use crate::audio::SourceTag;
use crate::error::CoachError;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct StartSessionResponse {
    pub session_id: Uuid,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub status: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct MuteRequest {
    pub source: SourceTag,
    pub muted: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_status(err: &CoachError) -> StatusCode {
    match err {
        CoachError::Configuration(_) => StatusCode::CONFLICT,
        CoachError::Connection { .. } => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /coach/start
/// Start the dual-stream coaching session
pub async fn start_session(State(state): State<AppState>) -> impl IntoResponse {
    info!("starting coaching session");

    let microphone = match state.capture.open(SourceTag::Microphone) {
        Ok(stream) => stream,
        Err(e) => {
            error!("failed to open microphone stream: {}", e);
            return (
                error_status(&e),
                Json(ErrorResponse {
                    error: format!("failed to open microphone stream: {e}"),
                }),
            )
                .into_response();
        }
    };

    let system_audio = match state.capture.open(SourceTag::SystemAudio) {
        Ok(stream) => stream,
        Err(e) => {
            error!("failed to open system audio stream: {}", e);
            return (
                error_status(&e),
                Json(ErrorResponse {
                    error: format!("failed to open system audio stream: {e}"),
                }),
            )
                .into_response();
        }
    };

    match state.pipeline.start(microphone, system_audio).await {
        Ok(session_id) => {
            info!("coaching session started: {}", session_id);
            (
                StatusCode::OK,
                Json(StartSessionResponse {
                    session_id,
                    status: "listening".to_string(),
                }),
            )
                .into_response()
        }
        Err(e) => {
            error!("failed to start coaching session: {}", e);
            (
                error_status(&e),
                Json(ErrorResponse {
                    error: format!("failed to start session: {e}"),
                }),
            )
                .into_response()
        }
    }
}

/// POST /coach/stop
/// Stop the coaching session (idempotent)
pub async fn stop_session(State(state): State<AppState>) -> impl IntoResponse {
    state.pipeline.stop().await;
    (
        StatusCode::OK,
        Json(MessageResponse {
            status: "stopped".to_string(),
            message: "Coaching session stopped".to_string(),
        }),
    )
}

/// POST /coach/analyze
/// Trigger a manual analysis, bypassing the interval check
pub async fn trigger_analysis(State(state): State<AppState>) -> impl IntoResponse {
    match state.pipeline.trigger_manual_analysis().await {
        Some(Ok(suggestions)) => (
            StatusCode::OK,
            Json(MessageResponse {
                status: "analyzed".to_string(),
                message: format!("{} suggestions generated", suggestions.len()),
            }),
        )
            .into_response(),
        Some(Err(e)) => (
            StatusCode::BAD_GATEWAY,
            Json(ErrorResponse {
                error: format!("analysis failed: {e}"),
            }),
        )
            .into_response(),
        None => (
            StatusCode::OK,
            Json(MessageResponse {
                status: "skipped".to_string(),
                message: "Analysis skipped (busy or not enough conversation)".to_string(),
            }),
        )
            .into_response(),
    }
}

/// POST /coach/mute
/// Mute/unmute one source without dropping the connection
pub async fn mute_source(
    State(state): State<AppState>,
    Json(req): Json<MuteRequest>,
) -> impl IntoResponse {
    if state.pipeline.mute(req.source, req.muted).await {
        (
            StatusCode::OK,
            Json(MessageResponse {
                status: "ok".to_string(),
                message: format!("{} muted={}", req.source, req.muted),
            }),
        )
            .into_response()
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "no active session".to_string(),
            }),
        )
            .into_response()
    }
}

/// GET /coach/status
pub async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.pipeline.status().await))
}

/// GET /coach/transcript
pub async fn get_transcript(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.pipeline.transcript().await))
}

/// GET /coach/export
/// Plain-text transcript export
pub async fn export_transcript(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, state.pipeline.export_transcript().await)
}

/// GET /coach/suggestions
/// Current unexpired suggestion batch, highest priority first
pub async fn get_suggestions(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.pipeline.suggestions().await))
}

/// POST /coach/suggestions/:suggestion_id/dismiss
pub async fn dismiss_suggestion(
    State(state): State<AppState>,
    Path(suggestion_id): Path<String>,
) -> impl IntoResponse {
    let Ok(id) = Uuid::parse_str(&suggestion_id) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: format!("invalid suggestion id: {suggestion_id}"),
            }),
        )
            .into_response();
    };

    if state.pipeline.dismiss_suggestion(id).await {
        (
            StatusCode::OK,
            Json(MessageResponse {
                status: "dismissed".to_string(),
                message: format!("Suggestion {id} dismissed"),
            }),
        )
            .into_response()
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("Suggestion {id} not found"),
            }),
        )
            .into_response()
    }
}

/// POST /coach/clear
/// Clear the conversation buffer
pub async fn clear_conversation(State(state): State<AppState>) -> impl IntoResponse {
    state.pipeline.clear_conversation().await;
    (
        StatusCode::OK,
        Json(MessageResponse {
            status: "cleared".to_string(),
            message: "Conversation cleared".to_string(),
        }),
    )
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
