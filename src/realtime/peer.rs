//! Peer transport behind the realtime session.
//!
//! [`PeerLink`] is the seam between the session state machine and the
//! concrete transport: the production [`RtcPeerLink`] drives a WebRTC
//! peer connection with an Opus track and an SDP-negotiated data
//! channel; tests use the in-memory link from [`crate::realtime::memory`].

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_OPUS};
use webrtc::api::APIBuilder;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::interceptor::registry::Registry;
use webrtc::media::Sample;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

use crate::audio::MediaStream;
use crate::error::CoachError;

/// Coarse transport state surfaced alongside protocol messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Connected,
    Disconnected,
    Failed,
}

impl std::fmt::Display for LinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkState::Connected => write!(f, "connected"),
            LinkState::Disconnected => write!(f, "disconnected"),
            LinkState::Failed => write!(f, "failed"),
        }
    }
}

/// One inbound occurrence on the link, delivered in arrival order with
/// no buffering or coalescing.
#[derive(Debug, Clone)]
pub enum LinkEvent {
    /// Raw control-channel payload (one JSON object per message)
    Message(String),
    /// Transport state transition
    State(LinkState),
}

/// A negotiated media+control link to the realtime provider.
///
/// `create_offer` and `accept_answer` bracket the SDP exchange performed
/// by the signaling client; inbound events arrive on the receiver taken
/// via `take_events`.
#[async_trait]
pub trait PeerLink: Send {
    async fn create_offer(&mut self) -> Result<String, CoachError>;

    async fn accept_answer(&mut self, sdp: &str) -> Result<(), CoachError>;

    /// Take the inbound event receiver. Yields `None` after the first
    /// call.
    fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<LinkEvent>>;

    /// Enable/disable the outbound track without tearing the link down.
    fn set_outbound_enabled(&self, enabled: bool);

    async fn close(&mut self);
}

/// Builds a link attached to one media stream.
#[async_trait]
pub trait LinkFactory: Send + Sync {
    async fn connect(&self, stream: &mut MediaStream) -> Result<Box<dyn PeerLink>, CoachError>;
}

fn peer_error(err: impl std::fmt::Display) -> CoachError {
    CoachError::connection("peer", err.to_string())
}

/// WebRTC-backed peer link: one Opus audio track fed from the media
/// stream plus an unlabeled data channel carrying protocol events.
pub struct RtcPeerLink {
    pc: Arc<RTCPeerConnection>,
    events: Option<mpsc::UnboundedReceiver<LinkEvent>>,
    outbound_enabled: Arc<AtomicBool>,
    pump: Option<JoinHandle<()>>,
}

impl RtcPeerLink {
    pub async fn new(stream: &mut MediaStream) -> Result<Self, CoachError> {
        let mut media = MediaEngine::default();
        media.register_default_codecs().map_err(peer_error)?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media).map_err(peer_error)?;

        let api = APIBuilder::new()
            .with_media_engine(media)
            .with_interceptor_registry(registry)
            .build();

        let pc = Arc::new(
            api.new_peer_connection(RTCConfiguration::default())
                .await
                .map_err(peer_error)?,
        );

        let (tx, rx) = mpsc::unbounded_channel();

        let track = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                ..Default::default()
            },
            "audio".to_owned(),
            stream.source().to_string(),
        ));
        pc.add_track(Arc::clone(&track) as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(peer_error)?;

        let channel = pc.create_data_channel("", None).await.map_err(peer_error)?;
        let message_tx = tx.clone();
        channel.on_message(Box::new(move |msg: DataChannelMessage| {
            let message_tx = message_tx.clone();
            Box::pin(async move {
                let payload = String::from_utf8_lossy(&msg.data).into_owned();
                let _ = message_tx.send(LinkEvent::Message(payload));
            })
        }));

        let state_tx = tx.clone();
        pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            let mapped = match state {
                RTCPeerConnectionState::Connected => Some(LinkState::Connected),
                RTCPeerConnectionState::Disconnected => Some(LinkState::Disconnected),
                RTCPeerConnectionState::Failed => Some(LinkState::Failed),
                _ => None,
            };
            if let Some(mapped) = mapped {
                let _ = state_tx.send(LinkEvent::State(mapped));
            }
            Box::pin(async {})
        }));

        let outbound_enabled = Arc::new(AtomicBool::new(true));
        let handle = stream.track();
        let mut packets = stream
            .take_packets()
            .ok_or_else(|| CoachError::connection("peer", "media stream already consumed"))?;

        let pump_enabled = Arc::clone(&outbound_enabled);
        let pump = tokio::spawn(async move {
            while let Some(packet) = packets.recv().await {
                if handle.is_stopped() {
                    break;
                }
                // Muted: consume and drop to keep the capture side flowing
                if !pump_enabled.load(Ordering::SeqCst) || !handle.is_enabled() {
                    continue;
                }
                let sample = Sample {
                    data: packet.data,
                    duration: packet.duration,
                    ..Default::default()
                };
                if let Err(e) = track.write_sample(&sample).await {
                    debug!("dropping outbound sample: {e}");
                }
            }
            debug!("outbound sample pump finished");
        });

        Ok(Self {
            pc,
            events: Some(rx),
            outbound_enabled,
            pump: Some(pump),
        })
    }
}

#[async_trait]
impl PeerLink for RtcPeerLink {
    async fn create_offer(&mut self) -> Result<String, CoachError> {
        let offer = self.pc.create_offer(None).await.map_err(peer_error)?;

        // Wait for ICE gathering so the offer carries its candidates
        let mut gathered = self.pc.gathering_complete_promise().await;
        self.pc.set_local_description(offer).await.map_err(peer_error)?;
        let _ = gathered.recv().await;

        let local = self
            .pc
            .local_description()
            .await
            .ok_or_else(|| CoachError::connection("peer", "no local description after gathering"))?;
        Ok(local.sdp)
    }

    async fn accept_answer(&mut self, sdp: &str) -> Result<(), CoachError> {
        let answer = RTCSessionDescription::answer(sdp.to_owned()).map_err(peer_error)?;
        self.pc
            .set_remote_description(answer)
            .await
            .map_err(peer_error)
    }

    fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<LinkEvent>> {
        self.events.take()
    }

    fn set_outbound_enabled(&self, enabled: bool) {
        self.outbound_enabled.store(enabled, Ordering::SeqCst);
    }

    async fn close(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        if let Err(e) = self.pc.close().await {
            debug!("peer connection close: {e}");
        }
    }
}

/// Factory for production WebRTC links.
pub struct RtcLinkFactory;

#[async_trait]
impl LinkFactory for RtcLinkFactory {
    async fn connect(&self, stream: &mut MediaStream) -> Result<Box<dyn PeerLink>, CoachError> {
        Ok(Box::new(RtcPeerLink::new(stream).await?))
    }
}
