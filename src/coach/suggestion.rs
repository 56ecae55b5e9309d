use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::error::CoachError;

/// Display contract: suggestion text stays short enough for a card.
pub const MAX_SUGGESTION_TEXT: usize = 60;
/// At most this many suggestions per analysis batch.
pub const MAX_SUGGESTIONS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionKind {
    Objection,
    Opportunity,
    Engagement,
    NextStep,
}

/// Declaration order doubles as display order: high first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

/// One coaching suggestion. Expiry is a pure data concern: the batch
/// filters on `created_at` + TTL at read time, no timers involved.
#[derive(Debug, Clone, Serialize)]
pub struct Suggestion {
    pub id: Uuid,
    pub kind: SuggestionKind,
    pub text: String,
    pub priority: Priority,
    pub rationale: String,
    pub created_at: DateTime<Utc>,
}

impl Suggestion {
    pub fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::zero());
        now - self.created_at > ttl
    }
}

/// The current suggestion set. A successful analysis replaces it
/// wholesale; individual suggestions can be dismissed or expire on their
/// own clock.
pub struct SuggestionBatch {
    ttl: Duration,
    items: Vec<Suggestion>,
}

impl SuggestionBatch {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            items: Vec::new(),
        }
    }

    /// Replace the whole batch atomically.
    pub fn replace(&mut self, items: Vec<Suggestion>) {
        self.items = items;
    }

    /// Remove one suggestion by id. Returns whether it was present.
    pub fn dismiss(&mut self, id: Uuid) -> bool {
        let before = self.items.len();
        self.items.retain(|item| item.id != id);
        self.items.len() != before
    }

    /// Unexpired suggestions, highest priority first.
    pub fn active(&self) -> Vec<Suggestion> {
        self.active_at(Utc::now())
    }

    pub fn active_at(&self, now: DateTime<Utc>) -> Vec<Suggestion> {
        let mut live: Vec<Suggestion> = self
            .items
            .iter()
            .filter(|item| !item.is_expired(self.ttl, now))
            .cloned()
            .collect();
        live.sort_by_key(|item| item.priority);
        live
    }
}

#[derive(Debug, Deserialize)]
struct WireBatch {
    suggestions: Vec<WireSuggestion>,
}

#[derive(Debug, Deserialize)]
struct WireSuggestion {
    #[serde(rename = "type")]
    kind: SuggestionKind,
    text: String,
    priority: Priority,
    #[serde(default)]
    context: String,
}

/// Parse a model response into a fresh suggestion batch.
///
/// Structural problems (missing key, empty list, unknown enum values)
/// are a hard [`CoachError::Analysis`]; an overlong batch or overlong
/// text is tolerated and trimmed to the contract.
pub fn parse_batch(raw: &str) -> Result<Vec<Suggestion>, CoachError> {
    let body = strip_code_fences(raw);

    let wire: WireBatch = serde_json::from_str(body)
        .map_err(|e| CoachError::Analysis(format!("response does not match schema: {e}")))?;

    if wire.suggestions.is_empty() {
        return Err(CoachError::Analysis("response contains no suggestions".into()));
    }

    let created_at = Utc::now();
    Ok(wire
        .suggestions
        .into_iter()
        .take(MAX_SUGGESTIONS)
        .map(|item| Suggestion {
            id: Uuid::new_v4(),
            kind: item.kind,
            text: truncate_chars(&item.text, MAX_SUGGESTION_TEXT),
            priority: item.priority,
            rationale: item.context,
            created_at,
        })
        .collect())
}

/// Models occasionally wrap JSON in markdown fences despite the system
/// instruction.
fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open
        .strip_suffix("```")
        .unwrap_or(without_open)
        .trim()
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_owned();
    }
    text.chars().take(max_chars).collect()
}
