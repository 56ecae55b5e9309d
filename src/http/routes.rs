use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Session control
        .route("/coach/start", post(handlers::start_session))
        .route("/coach/stop", post(handlers::stop_session))
        .route("/coach/analyze", post(handlers::trigger_analysis))
        .route("/coach/mute", post(handlers::mute_source))
        // Session queries
        .route("/coach/status", get(handlers::get_status))
        .route("/coach/transcript", get(handlers::get_transcript))
        .route("/coach/export", get(handlers::export_transcript))
        .route("/coach/suggestions", get(handlers::get_suggestions))
        .route(
            "/coach/suggestions/:suggestion_id/dismiss",
            post(handlers::dismiss_suggestion),
        )
        .route("/coach/clear", post(handlers::clear_conversation))
        // Middleware for request logging and the desktop shell
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
