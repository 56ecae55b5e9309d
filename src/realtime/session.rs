use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use super::events::TranscriptionConfig;
use super::peer::{LinkEvent, LinkFactory, PeerLink};
use super::signaling::{SessionMode, Signaling};
use crate::audio::{MediaStream, MediaTrack, SourceTag};
use crate::error::CoachError;

/// Connection lifecycle of one realtime session.
///
/// `idle → connecting → connected → disconnected`, `connecting → failed`
/// on handshake error, any state back to `idle` on explicit `stop()`.
/// Reconnection is never automatic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    Disconnected,
    Failed,
}

/// One live bidirectional connection to the transcription provider for a
/// single audio source.
///
/// Owned by the pipeline that created it; `stop()` closes the control
/// channel, closes the connection and stops the media track it was
/// given, and is safe to call at any time. A handshake still pending
/// when `stop()` arrives is abandoned and its eventual outcome ignored.
pub struct RealtimeSession {
    source: SourceTag,
    mode: SessionMode,
    state: Mutex<ConnectionState>,
    link: Mutex<Option<Box<dyn PeerLink>>>,
    track: Mutex<Option<MediaTrack>>,
    stop_requested: AtomicBool,
}

impl RealtimeSession {
    pub fn new(source: SourceTag, mode: SessionMode) -> Self {
        Self {
            source,
            mode,
            state: Mutex::new(ConnectionState::Idle),
            link: Mutex::new(None),
            track: Mutex::new(None),
            stop_requested: AtomicBool::new(false),
        }
    }

    pub fn source(&self) -> SourceTag {
        self.source
    }

    pub async fn state(&self) -> ConnectionState {
        *self.state.lock().await
    }

    /// Whether `stop()` has been requested since the last `start()`.
    /// Start failures observed after a stop are abandonment, not errors.
    pub fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    /// Negotiate the connection for the given media stream and return the
    /// inbound event receiver.
    ///
    /// The long-lived key only ever reaches the credential endpoint; the
    /// SDP exchange is authorized by the short-lived credential alone.
    pub async fn start(
        &self,
        mut stream: MediaStream,
        config: &TranscriptionConfig,
        signaling: &dyn Signaling,
        links: &dyn LinkFactory,
    ) -> Result<mpsc::UnboundedReceiver<LinkEvent>, CoachError> {
        self.stop_requested.store(false, Ordering::SeqCst);
        self.set_state(ConnectionState::Connecting).await;
        info!(source = %self.source, "starting realtime session");

        // Keep the track handle reachable for stop() while the handshake
        // is still in flight.
        {
            let mut track = self.track.lock().await;
            *track = Some(stream.track());
        }

        let mut link = match links.connect(&mut stream).await {
            Ok(link) => link,
            Err(e) => return Err(self.fail(None, e).await),
        };

        let credential = match signaling.request_credential(self.mode, config).await {
            Ok(credential) => credential,
            Err(e) => return Err(self.fail(Some(link), e).await),
        };
        if let Some(id) = &credential.session_id {
            debug!(source = %self.source, session_id = %id, "credential issued");
        }
        if self.stop_requested() {
            return Err(self.abandon(link).await);
        }

        let offer = match link.create_offer().await {
            Ok(offer) => offer,
            Err(e) => return Err(self.fail(Some(link), e).await),
        };

        let answer = match signaling.exchange_offer(&credential, &offer).await {
            Ok(answer) => answer,
            Err(e) => return Err(self.fail(Some(link), e).await),
        };
        if self.stop_requested() {
            return Err(self.abandon(link).await);
        }

        if let Err(e) = link.accept_answer(&answer).await {
            return Err(self.fail(Some(link), e).await);
        }

        let events = match link.take_events() {
            Some(events) => events,
            None => {
                let e = CoachError::connection("peer", "event channel already consumed");
                return Err(self.fail(Some(link), e).await);
            }
        };

        {
            let mut slot = self.link.lock().await;
            *slot = Some(link);
        }
        self.set_state(ConnectionState::Connected).await;
        info!(source = %self.source, "realtime session connected");

        Ok(events)
    }

    /// Tear the session down. Idempotent; also safe while a handshake is
    /// pending, in which case the handshake outcome is ignored.
    pub async fn stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);

        if let Some(mut link) = self.link.lock().await.take() {
            link.close().await;
        }
        if let Some(track) = self.track.lock().await.take() {
            track.stop();
        }

        self.set_state(ConnectionState::Idle).await;
        info!(source = %self.source, "realtime session stopped");
    }

    /// Enable/disable the outbound track without tearing down the
    /// connection.
    pub async fn mute(&self, muted: bool) {
        if let Some(link) = self.link.lock().await.as_ref() {
            link.set_outbound_enabled(!muted);
        }
        if let Some(track) = self.track.lock().await.as_ref() {
            track.set_enabled(!muted);
        }
        debug!(source = %self.source, muted, "outbound track toggled");
    }

    /// Transport reported a terminal state after connecting.
    pub async fn mark_disconnected(&self) {
        self.set_state(ConnectionState::Disconnected).await;
    }

    async fn set_state(&self, next: ConnectionState) {
        let mut state = self.state.lock().await;
        *state = next;
    }

    async fn fail(&self, link: Option<Box<dyn PeerLink>>, err: CoachError) -> CoachError {
        warn!(source = %self.source, error = %err, "realtime session failed");
        if let Some(mut link) = link {
            link.close().await;
        }
        if let Some(track) = self.track.lock().await.take() {
            track.stop();
        }
        self.set_state(ConnectionState::Failed).await;
        err
    }

    async fn abandon(&self, mut link: Box<dyn PeerLink>) -> CoachError {
        debug!(source = %self.source, "handshake abandoned after stop");
        link.close().await;
        if let Some(track) = self.track.lock().await.take() {
            track.stop();
        }
        self.set_state(ConnectionState::Idle).await;
        CoachError::connection("handshake", "session stopped during negotiation")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::memory::{MemoryLinkFactory, MemorySignaling};

    fn config() -> TranscriptionConfig {
        TranscriptionConfig::server_vad("gpt-4o-transcribe", None, 10)
    }

    fn stream() -> MediaStream {
        let (_tx, stream) = MediaStream::channel(SourceTag::Microphone, 4);
        stream
    }

    #[tokio::test]
    async fn start_reaches_connected_and_delivers_events_in_order() {
        let session = RealtimeSession::new(SourceTag::Microphone, SessionMode::TranscriptionOnly);
        let signaling = MemorySignaling::new();
        let links = MemoryLinkFactory::new();

        let mut events = session
            .start(stream(), &config(), &signaling, &links)
            .await
            .unwrap();
        assert_eq!(session.state().await, ConnectionState::Connected);

        let handle = links.handle(SourceTag::Microphone).unwrap();
        handle.inject_message("first");
        handle.inject_message("second");

        match events.recv().await.unwrap() {
            LinkEvent::Message(raw) => assert_eq!(raw, "first"),
            other => panic!("unexpected event: {other:?}"),
        }
        match events.recv().await.unwrap() {
            LinkEvent::Message(raw) => assert_eq!(raw, "second"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn credential_failure_moves_to_failed() {
        let session = RealtimeSession::new(SourceTag::Microphone, SessionMode::TranscriptionOnly);
        let signaling = MemorySignaling::failing_credential();
        let links = MemoryLinkFactory::new();

        let err = session
            .start(stream(), &config(), &signaling, &links)
            .await
            .unwrap_err();
        assert!(matches!(err, CoachError::Connection { .. }));
        assert_eq!(session.state().await, ConnectionState::Failed);
    }

    #[tokio::test]
    async fn rejected_handshake_moves_to_failed_and_closes_link() {
        let session = RealtimeSession::new(SourceTag::Microphone, SessionMode::TranscriptionOnly);
        let signaling = MemorySignaling::new();
        let links = MemoryLinkFactory::rejecting_answer_for(SourceTag::Microphone);

        let err = session
            .start(stream(), &config(), &signaling, &links)
            .await
            .unwrap_err();
        assert!(matches!(err, CoachError::Connection { .. }));
        assert_eq!(session.state().await, ConnectionState::Failed);
        assert!(links.handle(SourceTag::Microphone).unwrap().is_closed());
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_returns_to_idle() {
        let session = RealtimeSession::new(SourceTag::Microphone, SessionMode::TranscriptionOnly);
        let signaling = MemorySignaling::new();
        let links = MemoryLinkFactory::new();

        let _events = session
            .start(stream(), &config(), &signaling, &links)
            .await
            .unwrap();

        session.stop().await;
        assert_eq!(session.state().await, ConnectionState::Idle);
        assert!(links.handle(SourceTag::Microphone).unwrap().is_closed());

        // A second stop is a no-op
        session.stop().await;
        assert_eq!(session.state().await, ConnectionState::Idle);
    }

    #[tokio::test]
    async fn mute_toggles_outbound_without_closing() {
        let session = RealtimeSession::new(SourceTag::Microphone, SessionMode::TranscriptionOnly);
        let signaling = MemorySignaling::new();
        let links = MemoryLinkFactory::new();

        let _events = session
            .start(stream(), &config(), &signaling, &links)
            .await
            .unwrap();
        let handle = links.handle(SourceTag::Microphone).unwrap();

        session.mute(true).await;
        assert!(!handle.outbound_enabled());
        assert!(!handle.is_closed());
        assert_eq!(session.state().await, ConnectionState::Connected);

        session.mute(false).await;
        assert!(handle.outbound_enabled());
    }
}
