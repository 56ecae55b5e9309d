use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::audio::SourceTag;
use crate::realtime::events::ServerEvent;

/// One finalized speech turn. Never mutated after creation; partials
/// never become entries.
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptEntry {
    pub source: SourceTag,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    /// Time between speech stop and completed transcription for this
    /// turn. `None` when no stop baseline was observed; never negative.
    pub latency_ms: Option<u64>,
}

/// Output of one reconciliation step.
#[derive(Debug, Clone)]
pub enum TranscriptUpdate {
    /// Speech in progress. Display hint only, never persisted.
    Partial { source: SourceTag },
    /// Completed turn, ready for the conversation buffer.
    Final(TranscriptEntry),
}

/// Per-session state machine turning protocol events into transcript
/// entries.
///
/// Latency initialization is two-phase: the silence threshold arrives
/// with the session-created event, and until then a speech stop cannot
/// establish a baseline, so the turn's latency is reported as unknown.
pub struct Reconciler {
    source: SourceTag,
    session_id: Option<String>,
    silence_threshold: Option<Duration>,
    turn_stop: Option<Instant>,
}

impl Reconciler {
    pub fn new(source: SourceTag) -> Self {
        Self {
            source,
            session_id: None,
            silence_threshold: None,
            turn_stop: None,
        }
    }

    pub fn source(&self) -> SourceTag {
        self.source
    }

    /// Server-side session id, once the descriptor has arrived.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Whether latency can be computed for upcoming turns.
    pub fn is_configured(&self) -> bool {
        self.silence_threshold.is_some()
    }

    /// Process one inbound event.
    ///
    /// Events are consumed in arrival order; a completion without a
    /// preceding stop (or with the baseline already spent) yields an
    /// entry with unknown latency rather than a negative one.
    pub fn observe(&mut self, event: &ServerEvent) -> Option<TranscriptUpdate> {
        match event {
            ServerEvent::SessionCreated { session } => {
                self.session_id = Some(session.id.clone());
                self.silence_threshold = session
                    .turn_detection
                    .as_ref()
                    .and_then(|td| td.silence_duration_ms)
                    .map(Duration::from_millis);
                debug!(
                    source = %self.source,
                    session_id = %session.id,
                    threshold_ms = ?self.silence_threshold.map(|d| d.as_millis()),
                    "session descriptor received"
                );
                None
            }

            ServerEvent::SpeechStarted => Some(TranscriptUpdate::Partial {
                source: self.source,
            }),

            ServerEvent::SpeechStopped => {
                // The server waited `silence_threshold` of silence before
                // firing, so the turn actually stopped that long ago.
                match self.silence_threshold {
                    Some(threshold) => {
                        self.turn_stop = Instant::now().checked_sub(threshold);
                    }
                    None => {
                        debug!(
                            source = %self.source,
                            "speech stop before session descriptor, latency unavailable"
                        );
                        self.turn_stop = None;
                    }
                }
                Some(TranscriptUpdate::Partial {
                    source: self.source,
                })
            }

            ServerEvent::TranscriptionCompleted { transcript } => {
                let latency_ms = self
                    .turn_stop
                    .take()
                    .map(|stop| stop.elapsed().as_millis() as u64);

                if transcript.trim().is_empty() {
                    return None;
                }

                Some(TranscriptUpdate::Final(TranscriptEntry {
                    source: self.source,
                    text: transcript.clone(),
                    timestamp: Utc::now(),
                    latency_ms,
                }))
            }

            ServerEvent::ProtocolError { .. } | ServerEvent::Unknown => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::events::parse_event;

    fn session_created(silence_ms: u64) -> ServerEvent {
        parse_event(&format!(
            r#"{{"type": "transcription_session.created",
                "session": {{"id": "sess_1",
                             "turn_detection": {{"type": "server_vad", "silence_duration_ms": {silence_ms}}}}}}}"#
        ))
        .unwrap()
    }

    fn completed(text: &str) -> ServerEvent {
        ServerEvent::TranscriptionCompleted {
            transcript: text.to_owned(),
        }
    }

    #[test]
    fn full_turn_produces_one_entry_with_nonnegative_latency() {
        let mut reconciler = Reconciler::new(SourceTag::Microphone);

        assert!(reconciler.observe(&session_created(10)).is_none());
        assert!(matches!(
            reconciler.observe(&ServerEvent::SpeechStarted),
            Some(TranscriptUpdate::Partial { .. })
        ));
        assert!(matches!(
            reconciler.observe(&ServerEvent::SpeechStopped),
            Some(TranscriptUpdate::Partial { .. })
        ));

        match reconciler.observe(&completed("Precisamos de ROI")) {
            Some(TranscriptUpdate::Final(entry)) => {
                assert_eq!(entry.text, "Precisamos de ROI");
                assert_eq!(entry.source, SourceTag::Microphone);
                // Baseline sits at least the 10ms threshold in the past
                assert!(entry.latency_ms.unwrap() >= 10);
            }
            other => panic!("unexpected update: {other:?}"),
        }
    }

    #[test]
    fn completion_without_stop_reports_unknown_latency() {
        let mut reconciler = Reconciler::new(SourceTag::SystemAudio);
        reconciler.observe(&session_created(10));

        match reconciler.observe(&completed("out of order")) {
            Some(TranscriptUpdate::Final(entry)) => assert_eq!(entry.latency_ms, None),
            other => panic!("unexpected update: {other:?}"),
        }
    }

    #[test]
    fn stop_baseline_is_spent_after_one_completion() {
        let mut reconciler = Reconciler::new(SourceTag::Microphone);
        reconciler.observe(&session_created(10));
        reconciler.observe(&ServerEvent::SpeechStopped);

        match reconciler.observe(&completed("first")) {
            Some(TranscriptUpdate::Final(entry)) => assert!(entry.latency_ms.is_some()),
            other => panic!("unexpected update: {other:?}"),
        }
        // Second completion without a new stop: no stale baseline reuse
        match reconciler.observe(&completed("second")) {
            Some(TranscriptUpdate::Final(entry)) => assert_eq!(entry.latency_ms, None),
            other => panic!("unexpected update: {other:?}"),
        }
    }

    #[test]
    fn stop_before_session_descriptor_yields_unknown_latency() {
        let mut reconciler = Reconciler::new(SourceTag::Microphone);
        assert!(!reconciler.is_configured());

        reconciler.observe(&ServerEvent::SpeechStopped);
        match reconciler.observe(&completed("early turn")) {
            Some(TranscriptUpdate::Final(entry)) => assert_eq!(entry.latency_ms, None),
            other => panic!("unexpected update: {other:?}"),
        }
    }

    #[test]
    fn empty_completions_are_dropped_silently() {
        let mut reconciler = Reconciler::new(SourceTag::Microphone);
        reconciler.observe(&session_created(10));
        reconciler.observe(&ServerEvent::SpeechStopped);

        assert!(reconciler.observe(&completed("")).is_none());
        assert!(reconciler.observe(&completed("   ")).is_none());
    }

    #[test]
    fn descriptor_without_turn_detection_leaves_latency_unconfigured() {
        let mut reconciler = Reconciler::new(SourceTag::Microphone);
        let event = parse_event(
            r#"{"type": "transcription_session.created", "session": {"id": "sess_2"}}"#,
        )
        .unwrap();

        reconciler.observe(&event);
        assert_eq!(reconciler.session_id(), Some("sess_2"));
        assert!(!reconciler.is_configured());
    }
}
