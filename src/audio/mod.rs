//! Audio plumbing shared by both realtime sessions.
//!
//! Hardware capture is owned by the embedding application: it encodes
//! audio into packets, pushes them into a [`MediaStream`] and hands the
//! stream to the pipeline. The pipeline only ever stops tracks it was
//! given, on session stop.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::error::CoachError;

/// Audio stream source type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTag {
    /// Local speaker's microphone
    Microphone,
    /// Remote/meeting audio (system loopback)
    SystemAudio,
}

impl SourceTag {
    /// Uppercase label used for transcript lines and prompt assembly
    pub fn label(&self) -> &'static str {
        match self {
            SourceTag::Microphone => "MICROPHONE",
            SourceTag::SystemAudio => "SYSTEM_AUDIO",
        }
    }
}

impl std::fmt::Display for SourceTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceTag::Microphone => write!(f, "microphone"),
            SourceTag::SystemAudio => write!(f, "system_audio"),
        }
    }
}

/// One encoded audio packet (Opus), produced by the capture layer
#[derive(Debug, Clone)]
pub struct AudioPacket {
    /// Encoded payload
    pub data: Bytes,
    /// Wall-clock duration covered by this packet
    pub duration: Duration,
}

/// Shared handle to the liveness/mute state of one capture track.
///
/// Cloned freely; the capture side checks `is_stopped` to tear down its
/// device, the transport checks `is_enabled` before sending.
#[derive(Debug, Clone)]
pub struct MediaTrack {
    enabled: Arc<AtomicBool>,
    stopped: Arc<AtomicBool>,
}

impl MediaTrack {
    fn new() -> Self {
        Self {
            enabled: Arc::new(AtomicBool::new(true)),
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// A live audio stream handed to a realtime session.
///
/// The capture side keeps the sender and pushes packets; the session
/// consumes the receiver and stops the track when it is stopped.
pub struct MediaStream {
    source: SourceTag,
    track: MediaTrack,
    packets: Option<mpsc::Receiver<AudioPacket>>,
}

impl MediaStream {
    /// Create a stream backed by an in-process channel, returning the
    /// producer side for the capture layer.
    pub fn channel(source: SourceTag, capacity: usize) -> (mpsc::Sender<AudioPacket>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        let stream = Self {
            source,
            track: MediaTrack::new(),
            packets: Some(rx),
        };
        (tx, stream)
    }

    pub fn source(&self) -> SourceTag {
        self.source
    }

    pub fn track(&self) -> MediaTrack {
        self.track.clone()
    }

    /// Take the packet receiver. Returns `None` if a transport already
    /// consumed it.
    pub fn take_packets(&mut self) -> Option<mpsc::Receiver<AudioPacket>> {
        self.packets.take()
    }
}

/// Source of media streams for the pipeline.
///
/// Platform capture backends (cpal microphone, loopback devices) live in
/// the embedding application; this crate ships only the in-process
/// channel-backed implementation.
pub trait CaptureBackend: Send + Sync {
    fn open(&self, source: SourceTag) -> Result<MediaStream, CoachError>;
}

/// Capture backend fed by in-process producers.
///
/// `open` hands out the stream and retains the matching sender so the
/// embedding application (or a test) can push packets later via
/// [`ChannelCapture::sender`].
pub struct ChannelCapture {
    senders: Mutex<HashMap<SourceTag, mpsc::Sender<AudioPacket>>>,
}

impl ChannelCapture {
    pub fn new() -> Self {
        Self {
            senders: Mutex::new(HashMap::new()),
        }
    }

    /// Producer side for a previously opened stream.
    pub fn sender(&self, source: SourceTag) -> Option<mpsc::Sender<AudioPacket>> {
        self.senders
            .lock()
            .ok()
            .and_then(|map| map.get(&source).cloned())
    }
}

impl Default for ChannelCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureBackend for ChannelCapture {
    fn open(&self, source: SourceTag) -> Result<MediaStream, CoachError> {
        let (tx, stream) = MediaStream::channel(source, 64);
        let mut senders = self
            .senders
            .lock()
            .map_err(|_| CoachError::Configuration("capture backend poisoned".into()))?;
        senders.insert(source, tx);
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn track_starts_enabled_and_running() {
        let track = MediaTrack::new();
        assert!(track.is_enabled());
        assert!(!track.is_stopped());
    }

    #[test]
    fn track_state_is_shared_between_clones() {
        let track = MediaTrack::new();
        let clone = track.clone();

        clone.set_enabled(false);
        track.stop();

        assert!(!track.is_enabled());
        assert!(clone.is_stopped());
    }

    #[test]
    fn stream_packets_can_only_be_taken_once() {
        let (_tx, mut stream) = MediaStream::channel(SourceTag::Microphone, 4);
        assert!(stream.take_packets().is_some());
        assert!(stream.take_packets().is_none());
    }

    #[tokio::test]
    async fn channel_capture_retains_producer_side() {
        let capture = ChannelCapture::new();
        let mut stream = capture.open(SourceTag::SystemAudio).unwrap();
        let tx = capture.sender(SourceTag::SystemAudio).expect("sender");

        tx.send(AudioPacket {
            data: Bytes::from_static(&[1, 2, 3]),
            duration: Duration::from_millis(20),
        })
        .await
        .unwrap();

        let mut packets = stream.take_packets().unwrap();
        let packet = packets.recv().await.unwrap();
        assert_eq!(packet.data.as_ref(), &[1, 2, 3]);
    }
}
