//! Coaching context: the active persona/playbook and the keyword
//! relevance search over uploaded knowledge documents.
//!
//! Read-only from the engine's perspective; mutation happens in the
//! external CRUD store behind the [`ContextProvider`] seam.

mod knowledge;

pub use knowledge::{search_knowledge, KnowledgeSnippet};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::RwLock;
use tracing::info;

/// Structured profile of the counterpart in the meeting.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Persona {
    pub name: String,
    pub company: String,
    pub role: String,
    pub classification: String,
    pub revenue_potential: f64,
    #[serde(default)]
    pub business_context: String,
    #[serde(default)]
    pub primary_needs: Vec<String>,
    /// Objection topic → how the counterpart usually phrases it
    #[serde(default)]
    pub common_objections: BTreeMap<String, String>,
    #[serde(default)]
    pub communication_preferences: String,
}

/// Structured sales strategy matched to a meeting type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Playbook {
    pub name: String,
    pub meeting_type: String,
    pub primary_objective: String,
    #[serde(default)]
    pub opening_rapport: Vec<String>,
    #[serde(default)]
    pub qualification_questions: Vec<String>,
    /// Objection topic → suggested responses
    #[serde(default)]
    pub objection_responses: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub positive_trigger_words: Vec<String>,
    #[serde(default)]
    pub negative_trigger_words: Vec<String>,
    #[serde(default)]
    pub sales_techniques: Vec<String>,
    #[serde(default)]
    pub tone_guidance: String,
}

/// One uploaded knowledge document as the CRUD store exposes it:
/// content plus its precomputed frequency-ranked keywords.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeDoc {
    pub content: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub category: String,
}

/// Everything the engine folds into one analysis prompt. Immutable for
/// the duration of a coaching session.
#[derive(Debug, Clone, Default)]
pub struct CoachingContext {
    pub persona: Option<Persona>,
    pub playbook: Option<Playbook>,
    /// Relevance-ranked snippets, already capped by the provider
    pub knowledge: Vec<KnowledgeSnippet>,
}

/// Read-only view of the CRUD collaborator.
pub trait ContextProvider: Send + Sync {
    fn active_persona(&self) -> Option<Persona>;
    fn active_playbook(&self) -> Option<Playbook>;
    fn knowledge_documents(&self) -> Vec<KnowledgeDoc>;
}

/// In-memory provider, set once at session start.
///
/// Stands in for the CRUD store in the binary (loaded from JSON files)
/// and in tests.
pub struct StaticContext {
    inner: RwLock<StaticContextInner>,
}

#[derive(Default)]
struct StaticContextInner {
    persona: Option<Persona>,
    playbook: Option<Playbook>,
    documents: Vec<KnowledgeDoc>,
}

impl StaticContext {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(StaticContextInner::default()),
        }
    }

    pub fn with_persona(self, persona: Persona) -> Self {
        if let Ok(mut inner) = self.inner.write() {
            inner.persona = Some(persona);
        }
        self
    }

    pub fn with_playbook(self, playbook: Playbook) -> Self {
        if let Ok(mut inner) = self.inner.write() {
            inner.playbook = Some(playbook);
        }
        self
    }

    pub fn with_documents(self, documents: Vec<KnowledgeDoc>) -> Self {
        if let Ok(mut inner) = self.inner.write() {
            inner.documents = documents;
        }
        self
    }

    /// Load persona/playbook/knowledge from optional JSON files.
    pub fn from_files(
        persona: Option<&Path>,
        playbook: Option<&Path>,
        knowledge: Option<&Path>,
    ) -> Result<Self> {
        let mut inner = StaticContextInner::default();

        if let Some(path) = persona {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading persona file {}", path.display()))?;
            inner.persona = Some(serde_json::from_str(&raw).context("parsing persona file")?);
            info!("loaded persona from {}", path.display());
        }
        if let Some(path) = playbook {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading playbook file {}", path.display()))?;
            inner.playbook = Some(serde_json::from_str(&raw).context("parsing playbook file")?);
            info!("loaded playbook from {}", path.display());
        }
        if let Some(path) = knowledge {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading knowledge file {}", path.display()))?;
            inner.documents = serde_json::from_str(&raw).context("parsing knowledge file")?;
            info!(
                "loaded {} knowledge documents from {}",
                inner.documents.len(),
                path.display()
            );
        }

        Ok(Self {
            inner: RwLock::new(inner),
        })
    }
}

impl Default for StaticContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextProvider for StaticContext {
    fn active_persona(&self) -> Option<Persona> {
        self.inner.read().ok().and_then(|inner| inner.persona.clone())
    }

    fn active_playbook(&self) -> Option<Playbook> {
        self.inner.read().ok().and_then(|inner| inner.playbook.clone())
    }

    fn knowledge_documents(&self) -> Vec<KnowledgeDoc> {
        self.inner
            .read()
            .map(|inner| inner.documents.clone())
            .unwrap_or_default()
    }
}
