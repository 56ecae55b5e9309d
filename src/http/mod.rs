//! HTTP API server for external control (desktop shell, scripts)
//!
//! This module provides a REST API for driving a coaching session:
//! - POST /coach/start - Start the dual-stream session
//! - POST /coach/stop - Stop it
//! - POST /coach/analyze - Trigger a manual analysis
//! - POST /coach/mute - Mute/unmute one source
//! - GET /coach/status - Pipeline state
//! - GET /coach/transcript - Accumulated conversation
//! - GET /coach/export - Plain-text transcript export
//! - GET /coach/suggestions - Current suggestion batch
//! - POST /coach/suggestions/:id/dismiss - Dismiss one suggestion
//! - POST /coach/clear - Clear the conversation buffer
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
