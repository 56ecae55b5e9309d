//! Wire types for the realtime transcription protocol.
//!
//! Outbound: the session configuration posted during credential issuance.
//! Inbound: control-channel events, one JSON object per message.

use serde::{Deserialize, Serialize};

use crate::error::CoachError;

/// Session configuration sent to the provider when requesting a
/// credential. Mirrors the provider's transcription-session shape.
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptionConfig {
    pub input_audio_transcription: TranscriptionModel,
    pub turn_detection: TurnDetectionConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct TranscriptionModel {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TurnDetectionConfig {
    #[serde(rename = "type")]
    pub kind: String,
    pub silence_duration_ms: u64,
}

impl TranscriptionConfig {
    /// Server-side voice activity detection with the given silence
    /// threshold, the only turn-detection mode the pipeline uses.
    pub fn server_vad(model: &str, prompt: Option<String>, silence_duration_ms: u64) -> Self {
        Self {
            input_audio_transcription: TranscriptionModel {
                model: model.to_owned(),
                prompt,
            },
            turn_detection: TurnDetectionConfig {
                kind: "server_vad".to_owned(),
                silence_duration_ms,
            },
        }
    }
}

/// Server-side session descriptor, carried by the session-created event.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionDescriptor {
    pub id: String,
    #[serde(default)]
    pub turn_detection: Option<TurnDetection>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TurnDetection {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub silence_duration_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorPayload {
    #[serde(default)]
    pub message: String,
}

/// Inbound control-channel events the pipeline reacts to.
///
/// Unrecognized event types map to [`ServerEvent::Unknown`] so new
/// provider events never abort a session.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(
        rename = "transcription_session.created",
        alias = "session.created"
    )]
    SessionCreated { session: SessionDescriptor },

    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted,

    #[serde(rename = "input_audio_buffer.speech_stopped")]
    SpeechStopped,

    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    TranscriptionCompleted {
        #[serde(default)]
        transcript: String,
    },

    #[serde(rename = "error")]
    ProtocolError { error: ErrorPayload },

    #[serde(other)]
    Unknown,
}

/// Parse one raw control-channel message.
///
/// Malformed payloads are a [`CoachError::Protocol`]; callers log and
/// drop them without touching session state.
pub fn parse_event(raw: &str) -> Result<ServerEvent, CoachError> {
    serde_json::from_str(raw).map_err(|e| {
        let snippet: String = raw.chars().take(120).collect();
        CoachError::Protocol(format!("{e} in {snippet:?}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_session_created_with_turn_detection() {
        let raw = r#"{
            "type": "transcription_session.created",
            "session": {
                "id": "sess_123",
                "turn_detection": {"type": "server_vad", "silence_duration_ms": 10}
            }
        }"#;

        match parse_event(raw).unwrap() {
            ServerEvent::SessionCreated { session } => {
                assert_eq!(session.id, "sess_123");
                let td = session.turn_detection.unwrap();
                assert_eq!(td.silence_duration_ms, Some(10));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn parses_interactive_session_created_alias() {
        let raw = r#"{"type": "session.created", "session": {"id": "sess_9"}}"#;
        assert!(matches!(
            parse_event(raw).unwrap(),
            ServerEvent::SessionCreated { .. }
        ));
    }

    #[test]
    fn parses_speech_markers_and_completion() {
        assert!(matches!(
            parse_event(r#"{"type": "input_audio_buffer.speech_started"}"#).unwrap(),
            ServerEvent::SpeechStarted
        ));
        assert!(matches!(
            parse_event(r#"{"type": "input_audio_buffer.speech_stopped"}"#).unwrap(),
            ServerEvent::SpeechStopped
        ));

        let raw = r#"{
            "type": "conversation.item.input_audio_transcription.completed",
            "transcript": "Precisamos de ROI"
        }"#;
        match parse_event(raw).unwrap() {
            ServerEvent::TranscriptionCompleted { transcript } => {
                assert_eq!(transcript, "Precisamos de ROI");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn unknown_event_types_do_not_error() {
        let raw = r#"{"type": "rate_limits.updated", "rate_limits": []}"#;
        assert!(matches!(parse_event(raw).unwrap(), ServerEvent::Unknown));
    }

    #[test]
    fn malformed_payload_is_a_protocol_error() {
        let err = parse_event("{not json").unwrap_err();
        assert!(matches!(err, CoachError::Protocol(_)));
    }

    #[test]
    fn server_vad_config_serializes_to_wire_shape() {
        let config = TranscriptionConfig::server_vad("gpt-4o-transcribe", None, 10);
        let value = serde_json::to_value(&config).unwrap();

        assert_eq!(value["input_audio_transcription"]["model"], "gpt-4o-transcribe");
        assert_eq!(value["turn_detection"]["type"], "server_vad");
        assert_eq!(value["turn_detection"]["silence_duration_ms"], 10);
        assert!(value["input_audio_transcription"]
            .as_object()
            .is_some_and(|m| !m.contains_key("prompt")));
    }
}
