//! Pipeline controller.
//!
//! Owns the session context for one coaching run: two realtime sessions
//! (microphone + system audio), their reconcilers, the shared
//! conversation buffer and the coaching engine. Created at session
//! start, destroyed at session stop; observers subscribe to a typed
//! broadcast bus instead of wiring callback properties.

use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::audio::{MediaStream, SourceTag};
use crate::coach::{CoachingEngine, EngineConfig, LanguageModel, Suggestion};
use crate::context::ContextProvider;
use crate::error::CoachError;
use crate::realtime::events::{parse_event, ServerEvent, TranscriptionConfig};
use crate::realtime::peer::{LinkEvent, LinkFactory, LinkState};
use crate::realtime::session::{ConnectionState, RealtimeSession};
use crate::realtime::signaling::{SessionMode, Signaling};
use crate::transcript::{
    ConversationBuffer, ConversationStats, Reconciler, TranscriptEntry, TranscriptUpdate,
};

/// Everything observers can learn from the pipeline.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// One finalized transcript entry, source-tagged
    Transcript(TranscriptEntry),
    /// Speech in progress on a source; display hint only
    Partial { source: SourceTag },
    /// A completed analysis replaced the suggestion batch
    SuggestionsUpdated(Vec<Suggestion>),
    /// Human-readable state for display
    Status(String),
}

/// Realtime-side settings for one coaching run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub transcription_model: String,
    pub vocabulary_prompt: Option<String>,
    pub silence_duration_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            transcription_model: "gpt-4o-transcribe".to_owned(),
            vocabulary_prompt: None,
            silence_duration_ms: 10,
        }
    }
}

/// Snapshot of the pipeline for status displays.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatus {
    pub running: bool,
    pub microphone: ConnectionState,
    pub system_audio: ConnectionState,
    pub conversation: ConversationStats,
    pub active_suggestions: usize,
}

struct ActiveSessions {
    id: Uuid,
    microphone: Arc<RealtimeSession>,
    system_audio: Arc<RealtimeSession>,
    loops: Vec<JoinHandle<()>>,
}

/// The dual-stream coaching pipeline.
pub struct CoachPipeline {
    config: PipelineConfig,
    signaling: Arc<dyn Signaling>,
    links: Arc<dyn LinkFactory>,
    buffer: Arc<Mutex<ConversationBuffer>>,
    engine: Arc<CoachingEngine>,
    events: broadcast::Sender<PipelineEvent>,
    active: Mutex<Option<ActiveSessions>>,
}

impl CoachPipeline {
    pub fn new(
        config: PipelineConfig,
        engine_config: EngineConfig,
        signaling: Arc<dyn Signaling>,
        links: Arc<dyn LinkFactory>,
        model: Arc<dyn LanguageModel>,
        context: Arc<dyn ContextProvider>,
    ) -> Self {
        let (events, _) = broadcast::channel(256);
        let buffer = Arc::new(Mutex::new(ConversationBuffer::new()));
        let engine = Arc::new(CoachingEngine::new(
            engine_config,
            model,
            context,
            Arc::clone(&buffer),
            events.clone(),
        ));

        Self {
            config,
            signaling,
            links,
            buffer,
            engine,
            events,
            active: Mutex::new(None),
        }
    }

    /// Subscribe to pipeline events. Each subscriber sees events in
    /// publication order.
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    pub async fn is_running(&self) -> bool {
        self.active.lock().await.is_some()
    }

    /// Start a coaching run over the two given media streams.
    ///
    /// A session that fails to connect is surfaced and left failed
    /// without affecting the other; only both failing aborts the run.
    pub async fn start(
        &self,
        microphone: MediaStream,
        system_audio: MediaStream,
    ) -> Result<Uuid, CoachError> {
        let mut active = self.active.lock().await;
        if active.is_some() {
            return Err(CoachError::Configuration(
                "a coaching session is already running".into(),
            ));
        }

        let id = Uuid::new_v4();
        info!(session = %id, "starting coaching session");

        let transcription = TranscriptionConfig::server_vad(
            &self.config.transcription_model,
            self.config.vocabulary_prompt.clone(),
            self.config.silence_duration_ms,
        );

        let mic_session = Arc::new(RealtimeSession::new(
            SourceTag::Microphone,
            SessionMode::TranscriptionOnly,
        ));
        let sys_session = Arc::new(RealtimeSession::new(
            SourceTag::SystemAudio,
            SessionMode::TranscriptionOnly,
        ));

        let (mic_result, sys_result) = tokio::join!(
            mic_session.start(
                microphone,
                &transcription,
                self.signaling.as_ref(),
                self.links.as_ref(),
            ),
            sys_session.start(
                system_audio,
                &transcription,
                self.signaling.as_ref(),
                self.links.as_ref(),
            ),
        );

        let mut loops = Vec::new();
        let mut connected = 0;
        for (session, result) in [(&mic_session, mic_result), (&sys_session, sys_result)] {
            let source = session.source();
            match result {
                Ok(events) => {
                    connected += 1;
                    loops.push(self.spawn_session_loop(Arc::clone(session), events));
                }
                Err(e) => {
                    error!(source = %source, error = %e, "realtime session failed to start");
                    let _ = self
                        .events
                        .send(PipelineEvent::Status(format!("{source}: connection failed")));
                }
            }
        }

        if connected == 0 {
            mic_session.stop().await;
            sys_session.stop().await;
            return Err(CoachError::connection(
                "start",
                "both realtime sessions failed",
            ));
        }

        let _ = self.events.send(PipelineEvent::Status("listening".into()));
        *active = Some(ActiveSessions {
            id,
            microphone: mic_session,
            system_audio: sys_session,
            loops,
        });
        Ok(id)
    }

    /// Stop the run: tear down both sessions and their event loops.
    /// Idempotent.
    pub async fn stop(&self) {
        let Some(active) = self.active.lock().await.take() else {
            debug!("stop requested with no active session");
            return;
        };

        info!(session = %active.id, "stopping coaching session");
        active.microphone.stop().await;
        active.system_audio.stop().await;

        for handle in &active.loops {
            handle.abort();
        }
        let _ = join_all(active.loops).await;

        let _ = self.events.send(PipelineEvent::Status("stopped".into()));
    }

    /// Run an analysis now, bypassing the interval (but not the
    /// in-flight or entry-count guards).
    pub async fn trigger_manual_analysis(&self) -> Option<Result<Vec<Suggestion>, CoachError>> {
        self.engine.trigger_manual().await
    }

    /// Mute/unmute one source without tearing down its connection.
    pub async fn mute(&self, source: SourceTag, muted: bool) -> bool {
        let active = self.active.lock().await;
        let Some(active) = active.as_ref() else {
            return false;
        };
        let session = match source {
            SourceTag::Microphone => &active.microphone,
            SourceTag::SystemAudio => &active.system_audio,
        };
        session.mute(muted).await;
        true
    }

    pub async fn status(&self) -> PipelineStatus {
        let (running, microphone, system_audio) = {
            let active = self.active.lock().await;
            match active.as_ref() {
                Some(active) => (
                    true,
                    active.microphone.state().await,
                    active.system_audio.state().await,
                ),
                None => (false, ConnectionState::Idle, ConnectionState::Idle),
            }
        };

        PipelineStatus {
            running,
            microphone,
            system_audio,
            conversation: self.buffer.lock().await.stats(),
            active_suggestions: self.engine.suggestions().await.len(),
        }
    }

    pub async fn transcript(&self) -> Vec<TranscriptEntry> {
        self.buffer.lock().await.entries()
    }

    pub async fn export_transcript(&self) -> String {
        self.buffer.lock().await.export_text()
    }

    pub async fn clear_conversation(&self) {
        self.buffer.lock().await.clear();
    }

    pub async fn suggestions(&self) -> Vec<Suggestion> {
        self.engine.suggestions().await
    }

    pub async fn dismiss_suggestion(&self, id: Uuid) -> bool {
        self.engine.dismiss(id).await
    }

    fn spawn_session_loop(
        &self,
        session: Arc<RealtimeSession>,
        mut events: tokio::sync::mpsc::UnboundedReceiver<LinkEvent>,
    ) -> JoinHandle<()> {
        let engine = Arc::clone(&self.engine);
        let buffer = Arc::clone(&self.buffer);
        let bus = self.events.clone();

        tokio::spawn(async move {
            let source = session.source();
            let mut reconciler = Reconciler::new(source);

            while let Some(event) = events.recv().await {
                match event {
                    LinkEvent::State(state) => {
                        if matches!(state, LinkState::Disconnected | LinkState::Failed) {
                            session.mark_disconnected().await;
                        }
                        let _ = bus.send(PipelineEvent::Status(format!("{source}: {state}")));
                    }
                    LinkEvent::Message(raw) => {
                        let event = match parse_event(&raw) {
                            Ok(event) => event,
                            Err(e) => {
                                // Malformed payloads never abort the session
                                warn!(source = %source, error = %e, "dropping malformed event");
                                continue;
                            }
                        };

                        if let ServerEvent::ProtocolError { error } = &event {
                            warn!(source = %source, message = %error.message, "provider error event");
                            let _ = bus.send(PipelineEvent::Status(format!(
                                "{source}: provider error"
                            )));
                            continue;
                        }

                        match reconciler.observe(&event) {
                            Some(TranscriptUpdate::Partial { source }) => {
                                let _ = bus.send(PipelineEvent::Partial { source });
                            }
                            Some(TranscriptUpdate::Final(entry)) => {
                                {
                                    let mut buffer = buffer.lock().await;
                                    buffer.append(entry.clone());
                                }
                                let _ = bus.send(PipelineEvent::Transcript(entry));
                                // Outcome (suggestions or error status) is
                                // published by the engine itself
                                let _ = engine.on_entry().await;
                            }
                            None => {}
                        }
                    }
                }
            }
            debug!(source = %source, "session event loop finished");
        })
    }
}
