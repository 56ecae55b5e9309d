//! In-process doubles for the realtime transport.
//!
//! Used by the test suites and by offline development: the link hands
//! back a canned SDP exchange and lets the caller script inbound
//! control-channel traffic; the signaling double never touches the
//! network.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use super::events::TranscriptionConfig;
use super::peer::{LinkEvent, LinkFactory, LinkState, PeerLink};
use super::signaling::{ClientCredential, SessionMode, Signaling};
use crate::audio::{MediaStream, SourceTag};
use crate::error::CoachError;

const MEMORY_OFFER: &str = "v=0\r\no=- 0 0 IN IP4 127.0.0.1\r\ns=memory-link\r\n";

/// Scripting handle for one [`MemoryLink`].
#[derive(Clone)]
pub struct MemoryLinkHandle {
    tx: mpsc::UnboundedSender<LinkEvent>,
    closed: Arc<AtomicBool>,
    outbound_enabled: Arc<AtomicBool>,
}

impl MemoryLinkHandle {
    /// Inject one raw control-channel message.
    pub fn inject_message(&self, raw: impl Into<String>) {
        let _ = self.tx.send(LinkEvent::Message(raw.into()));
    }

    /// Inject a transport state transition.
    pub fn inject_state(&self, state: LinkState) {
        let _ = self.tx.send(LinkEvent::State(state));
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn outbound_enabled(&self) -> bool {
        self.outbound_enabled.load(Ordering::SeqCst)
    }
}

/// Peer link that never leaves the process.
pub struct MemoryLink {
    events: Option<mpsc::UnboundedReceiver<LinkEvent>>,
    closed: Arc<AtomicBool>,
    outbound_enabled: Arc<AtomicBool>,
    reject_answer: bool,
}

impl MemoryLink {
    pub fn new() -> (Self, MemoryLinkHandle) {
        Self::with_behavior(false)
    }

    /// A link whose `accept_answer` fails, for handshake-failure tests.
    pub fn rejecting_answer() -> (Self, MemoryLinkHandle) {
        Self::with_behavior(true)
    }

    fn with_behavior(reject_answer: bool) -> (Self, MemoryLinkHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        let outbound_enabled = Arc::new(AtomicBool::new(true));

        let handle = MemoryLinkHandle {
            tx,
            closed: Arc::clone(&closed),
            outbound_enabled: Arc::clone(&outbound_enabled),
        };
        let link = Self {
            events: Some(rx),
            closed,
            outbound_enabled,
            reject_answer,
        };
        (link, handle)
    }
}

#[async_trait]
impl PeerLink for MemoryLink {
    async fn create_offer(&mut self) -> Result<String, CoachError> {
        Ok(MEMORY_OFFER.to_owned())
    }

    async fn accept_answer(&mut self, _sdp: &str) -> Result<(), CoachError> {
        if self.reject_answer {
            return Err(CoachError::connection("handshake", "answer rejected"));
        }
        Ok(())
    }

    fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<LinkEvent>> {
        self.events.take()
    }

    fn set_outbound_enabled(&self, enabled: bool) {
        self.outbound_enabled.store(enabled, Ordering::SeqCst);
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Factory that records a scripting handle per source.
pub struct MemoryLinkFactory {
    handles: Mutex<HashMap<SourceTag, MemoryLinkHandle>>,
    reject_answer_for: Option<SourceTag>,
}

impl MemoryLinkFactory {
    pub fn new() -> Self {
        Self {
            handles: Mutex::new(HashMap::new()),
            reject_answer_for: None,
        }
    }

    /// Fail the handshake for one source, leaving the other connectable.
    pub fn rejecting_answer_for(source: SourceTag) -> Self {
        Self {
            handles: Mutex::new(HashMap::new()),
            reject_answer_for: Some(source),
        }
    }

    pub fn handle(&self, source: SourceTag) -> Option<MemoryLinkHandle> {
        self.handles
            .lock()
            .ok()
            .and_then(|map| map.get(&source).cloned())
    }
}

impl Default for MemoryLinkFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LinkFactory for MemoryLinkFactory {
    async fn connect(&self, stream: &mut MediaStream) -> Result<Box<dyn PeerLink>, CoachError> {
        let reject = self.reject_answer_for == Some(stream.source());
        let (link, handle) = if reject {
            MemoryLink::rejecting_answer()
        } else {
            MemoryLink::new()
        };

        if let Ok(mut map) = self.handles.lock() {
            map.insert(stream.source(), handle);
        }
        Ok(Box::new(link))
    }
}

/// Signaling double that answers immediately without network access.
pub struct MemorySignaling {
    fail_credential: bool,
}

impl MemorySignaling {
    pub fn new() -> Self {
        Self {
            fail_credential: false,
        }
    }

    /// Fail credential issuance, for connection-error tests.
    pub fn failing_credential() -> Self {
        Self {
            fail_credential: true,
        }
    }
}

impl Default for MemorySignaling {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Signaling for MemorySignaling {
    async fn request_credential(
        &self,
        _mode: SessionMode,
        _config: &TranscriptionConfig,
    ) -> Result<ClientCredential, CoachError> {
        if self.fail_credential {
            return Err(CoachError::connection("credential", "issuance refused"));
        }
        Ok(ClientCredential {
            secret: "ek_memory".to_owned(),
            session_id: Some("sess_memory".to_owned()),
        })
    }

    async fn exchange_offer(
        &self,
        _credential: &ClientCredential,
        offer_sdp: &str,
    ) -> Result<String, CoachError> {
        Ok(offer_sdp.replace("memory-link", "memory-answer"))
    }
}
