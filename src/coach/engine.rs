use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::model::LanguageModel;
use super::prompt::{build_user_prompt, SYSTEM_INSTRUCTION};
use super::suggestion::{parse_batch, Suggestion, SuggestionBatch};
use crate::context::{search_knowledge, CoachingContext, ContextProvider};
use crate::error::CoachError;
use crate::pipeline::PipelineEvent;
use crate::transcript::{ConversationBuffer, TranscriptEntry};

/// Trigger policy and prompt sizing for the coaching engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Minimum spacing between analyses
    pub analysis_interval: Duration,
    /// Don't analyze until the buffer holds this many entries
    pub min_entries: usize,
    /// How many recent entries go into the prompt
    pub snapshot_entries: usize,
    /// Conversation retention window, applied before every read
    pub retention_window: Duration,
    /// Per-suggestion display lifetime
    pub suggestion_ttl: Duration,
    /// Knowledge snippets folded into the prompt
    pub knowledge_limit: usize,
    /// Bound on one model call so a hung request cannot pin the
    /// in-flight flag
    pub model_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            analysis_interval: Duration::from_secs(10),
            min_entries: 3,
            snapshot_entries: 10,
            retention_window: Duration::from_secs(120),
            suggestion_ttl: Duration::from_secs(12),
            knowledge_limit: 3,
            model_timeout: Duration::from_secs(30),
        }
    }
}

/// Releases the in-flight flag on every exit path.
struct AnalyzingGuard<'a>(&'a AtomicBool);

impl<'a> AnalyzingGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        // The guard must only exist on a successful exchange; its Drop
        // releases the flag.
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
            .then(|| Self(flag))
    }
}

impl Drop for AnalyzingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Decides when to analyze, builds the request, calls the model and
/// manages the suggestion batch.
///
/// At most one analysis is ever in flight; a trigger arriving while one
/// is running is dropped, not queued. A failed analysis leaves the
/// previous batch untouched and the next trigger retries naturally.
pub struct CoachingEngine {
    config: EngineConfig,
    model: Arc<dyn LanguageModel>,
    context: Arc<dyn ContextProvider>,
    buffer: Arc<Mutex<ConversationBuffer>>,
    events: broadcast::Sender<PipelineEvent>,
    last_analysis: Mutex<Instant>,
    analyzing: AtomicBool,
    batch: Mutex<SuggestionBatch>,
}

impl CoachingEngine {
    pub fn new(
        config: EngineConfig,
        model: Arc<dyn LanguageModel>,
        context: Arc<dyn ContextProvider>,
        buffer: Arc<Mutex<ConversationBuffer>>,
        events: broadcast::Sender<PipelineEvent>,
    ) -> Self {
        let suggestion_ttl = config.suggestion_ttl;
        Self {
            config,
            model,
            context,
            buffer,
            events,
            last_analysis: Mutex::new(Instant::now()),
            analyzing: AtomicBool::new(false),
            batch: Mutex::new(SuggestionBatch::new(suggestion_ttl)),
        }
    }

    /// Called for every finalized transcript entry: analyze when the
    /// interval has elapsed and the buffer is deep enough.
    pub async fn on_entry(&self) -> Option<Result<Vec<Suggestion>, CoachError>> {
        let due = {
            let last = self.last_analysis.lock().await;
            last.elapsed() >= self.config.analysis_interval
        };
        if !due {
            return None;
        }
        self.try_analyze().await
    }

    /// Manual trigger: bypasses the interval but still respects the
    /// in-flight flag and the minimum entry count.
    pub async fn trigger_manual(&self) -> Option<Result<Vec<Suggestion>, CoachError>> {
        self.try_analyze().await
    }

    /// Current unexpired suggestions, highest priority first.
    pub async fn suggestions(&self) -> Vec<Suggestion> {
        self.batch.lock().await.active()
    }

    pub async fn dismiss(&self, id: Uuid) -> bool {
        self.batch.lock().await.dismiss(id)
    }

    async fn try_analyze(&self) -> Option<Result<Vec<Suggestion>, CoachError>> {
        let Some(_guard) = AnalyzingGuard::acquire(&self.analyzing) else {
            debug!("analysis already in flight, trigger dropped");
            return None;
        };

        let entries = {
            let mut buffer = self.buffer.lock().await;
            buffer.prune_older_than(self.config.retention_window);
            if buffer.len() < self.config.min_entries {
                debug!(entries = buffer.len(), "not enough conversation to analyze");
                return None;
            }
            buffer.snapshot(self.config.snapshot_entries)
        };

        {
            let mut last = self.last_analysis.lock().await;
            *last = Instant::now();
        }

        let _ = self.events.send(PipelineEvent::Status("analyzing".into()));
        let result = self.run_analysis(&entries).await;

        match result {
            Ok(items) => {
                info!(suggestions = items.len(), "analysis completed");
                {
                    let mut batch = self.batch.lock().await;
                    batch.replace(items.clone());
                }
                let _ = self
                    .events
                    .send(PipelineEvent::SuggestionsUpdated(items.clone()));
                let _ = self.events.send(PipelineEvent::Status("listening".into()));
                Some(Ok(items))
            }
            Err(e) => {
                warn!(error = %e, "analysis failed, keeping previous suggestions");
                let _ = self
                    .events
                    .send(PipelineEvent::Status("error - retrying".into()));
                Some(Err(e))
            }
        }
    }

    async fn run_analysis(&self, entries: &[TranscriptEntry]) -> Result<Vec<Suggestion>, CoachError> {
        let context = self.load_context(entries);
        let prompt = build_user_prompt(entries, &context);

        let raw = tokio::time::timeout(
            self.config.model_timeout,
            self.model.complete(SYSTEM_INSTRUCTION, &prompt),
        )
        .await
        .map_err(|_| CoachError::Analysis("model call exceeded timeout".into()))??;

        parse_batch(&raw)
    }

    fn load_context(&self, entries: &[TranscriptEntry]) -> CoachingContext {
        let persona = self.context.active_persona();
        let playbook = self.context.active_playbook();

        let documents = self.context.knowledge_documents();
        let knowledge = if documents.is_empty() {
            Vec::new()
        } else {
            // The recent conversation itself is the relevance query
            let query: String = entries
                .iter()
                .map(|entry| entry.text.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            search_knowledge(&documents, &query, self.config.knowledge_limit)
        };

        CoachingContext {
            persona,
            playbook,
            knowledge,
        }
    }
}
