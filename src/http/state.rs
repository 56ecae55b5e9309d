use std::sync::Arc;

use crate::audio::CaptureBackend;
use crate::pipeline::CoachPipeline;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// The coaching pipeline (one active session at a time)
    pub pipeline: Arc<CoachPipeline>,
    /// Where media streams for a new session come from
    pub capture: Arc<dyn CaptureBackend>,
}

impl AppState {
    pub fn new(pipeline: Arc<CoachPipeline>, capture: Arc<dyn CaptureBackend>) -> Self {
        Self { pipeline, capture }
    }
}
