//! Coaching engine: decides when to analyze the conversation, assembles
//! the context-rich prompt, calls the language model and manages the
//! resulting suggestion batch.

mod engine;
mod model;
mod prompt;
mod suggestion;

pub use engine::{CoachingEngine, EngineConfig};
pub use model::{ChatModelConfig, LanguageModel, OpenAiChatModel};
pub use prompt::{build_user_prompt, SYSTEM_INSTRUCTION};
pub use suggestion::{parse_batch, Priority, Suggestion, SuggestionBatch, SuggestionKind};
