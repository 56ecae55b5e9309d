pub mod audio;
pub mod coach;
pub mod config;
pub mod context;
pub mod error;
pub mod http;
pub mod pipeline;
pub mod realtime;
pub mod transcript;

pub use audio::{
    AudioPacket, CaptureBackend, ChannelCapture, MediaStream, MediaTrack, SourceTag,
};
pub use coach::{
    ChatModelConfig, CoachingEngine, EngineConfig, LanguageModel, OpenAiChatModel, Priority,
    Suggestion, SuggestionKind,
};
pub use config::Config;
pub use context::{
    CoachingContext, ContextProvider, KnowledgeDoc, KnowledgeSnippet, Persona, Playbook,
    StaticContext,
};
pub use error::CoachError;
pub use http::{create_router, AppState};
pub use pipeline::{CoachPipeline, PipelineConfig, PipelineEvent, PipelineStatus};
pub use realtime::{
    ConnectionState, RealtimeSession, SessionMode, Signaling, SignalingClient,
};
pub use transcript::{ConversationBuffer, Reconciler, TranscriptEntry, TranscriptUpdate};
