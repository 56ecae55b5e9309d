//! Realtime transcription sessions.
//!
//! One [`RealtimeSession`] per audio source manages a live bidirectional
//! media+control connection to the speech provider:
//! - Credential issuance with the long-lived API key
//! - SDP offer/answer handshake authorized only by the short-lived
//!   credential
//! - Control-channel events delivered in arrival order
//! - Idempotent teardown and mute without reconnection

pub mod events;
pub mod memory;
pub mod peer;
pub mod session;
pub mod signaling;

pub use events::{
    parse_event, ServerEvent, SessionDescriptor, TranscriptionConfig, TurnDetection,
};
pub use memory::{MemoryLink, MemoryLinkFactory, MemorySignaling};
pub use peer::{LinkEvent, LinkFactory, LinkState, PeerLink, RtcLinkFactory};
pub use session::{ConnectionState, RealtimeSession};
pub use signaling::{ClientCredential, SessionMode, Signaling, SignalingClient};
