//! Error taxonomy for meet-coach.
//!
//! Four classes, matching the spec: transport/connection failures,
//! protocol (wire-format) failures, analysis (model) failures, and
//! configuration failures.

use thiserror::Error;

/// The crate-wide error type.
#[derive(Debug, Error)]
pub enum CoachError {
    /// A transport/connection failure during signaling or the peer
    /// connection. `stage` names where it happened; `detail` carries the
    /// underlying cause.
    #[error("connection error at {stage}: {detail}")]
    Connection { stage: String, detail: String },

    /// A wire-format/protocol failure (e.g. malformed event payload).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A failure analyzing the conversation or calling the model.
    #[error("analysis error: {0}")]
    Analysis(String),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl CoachError {
    /// Construct a [`CoachError::Connection`] from a stage label and a
    /// detail message.
    pub fn connection(stage: impl Into<String>, detail: impl Into<String>) -> Self {
        CoachError::Connection {
            stage: stage.into(),
            detail: detail.into(),
        }
    }
}
