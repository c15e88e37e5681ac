//! Session abstraction
//!
//! The hub never talks to the media transport directly. Everything it needs
//! from one participant's connection goes through [`Session`], and tracks are
//! reached through [`InboundTrack`] / [`OutboundTrack`]. The production
//! implementation lives in `sfu::rtc`.

use async_trait::async_trait;
use hub_protocol::SessionDescription;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::rtp::packet::Packet;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};

use crate::error::{AppError, Result};

/// Client supplied participant identifier. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Err(AppError::malformed("Participant id must not be empty"));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Video,
    Unknown,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
            MediaKind::Unknown => "unknown",
        }
    }
}

impl From<RTPCodecType> for MediaKind {
    fn from(kind: RTPCodecType) -> Self {
        match kind {
            RTPCodecType::Audio => MediaKind::Audio,
            RTPCodecType::Video => MediaKind::Video,
            _ => MediaKind::Unknown,
        }
    }
}

/// Description of a track, enough to create a matching outbound track
#[derive(Debug, Clone)]
pub struct TrackInfo {
    pub id: String,
    pub stream_id: String,
    pub kind: MediaKind,
    pub codec: RTCRtpCodecCapability,
}

/// Connection state reported by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl SessionState {
    /// `Disconnected` may still recover; `Failed` and `Closed` never do.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Failed | SessionState::Closed)
    }
}

impl From<RTCPeerConnectionState> for SessionState {
    fn from(state: RTCPeerConnectionState) -> Self {
        match state {
            RTCPeerConnectionState::Connecting => SessionState::Connecting,
            RTCPeerConnectionState::Connected => SessionState::Connected,
            RTCPeerConnectionState::Disconnected => SessionState::Disconnected,
            RTCPeerConnectionState::Failed => SessionState::Failed,
            RTCPeerConnectionState::Closed => SessionState::Closed,
            _ => SessionState::New,
        }
    }
}

pub type InboundTrackHandler = Arc<dyn Fn(Arc<dyn InboundTrack>) + Send + Sync>;
pub type StateChangeHandler = Arc<dyn Fn(SessionState) + Send + Sync>;

/// A media stream received from a participant
#[async_trait]
pub trait InboundTrack: Send + Sync {
    fn info(&self) -> &TrackInfo;

    /// Next packet, or an error once the track is gone.
    async fn read_packet(&self) -> Result<Packet>;
}

/// A media stream sent to a participant
#[async_trait]
pub trait OutboundTrack: Send + Sync {
    fn id(&self) -> &str;

    async fn write_packet(&self, packet: &Packet) -> Result<()>;

    /// Detach the track from its session. Nothing is written afterwards.
    async fn close(&self) -> Result<()>;
}

/// One participant's negotiated media session
#[async_trait]
pub trait Session: Send + Sync {
    async fn set_remote_description(&self, offer: SessionDescription) -> Result<()>;

    async fn create_answer(&self) -> Result<SessionDescription>;

    /// Must be obtained before `set_local_description`, resolves once
    /// candidate gathering has finished.
    async fn gathering_complete(&self) -> mpsc::Receiver<()>;

    async fn set_local_description(&self, answer: SessionDescription) -> Result<()>;

    async fn local_description(&self) -> Option<SessionDescription>;

    fn on_inbound_track(&self, handler: InboundTrackHandler);

    fn on_state_change(&self, handler: StateChangeHandler);

    /// Create an outbound track shaped like `info` and attach it to this session.
    async fn add_outbound_track(&self, info: &TrackInfo) -> Result<Arc<dyn OutboundTrack>>;

    async fn close(&self) -> Result<()>;
}

#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn create_session(&self) -> Result<Arc<dyn Session>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_participant_id_rejects_blank() {
        assert!(ParticipantId::parse("").is_err());
        assert!(ParticipantId::parse("   ").is_err());
        assert_eq!(ParticipantId::parse("alice").unwrap().as_str(), "alice");
    }

    #[test]
    fn test_terminal_states() {
        assert!(SessionState::Failed.is_terminal());
        assert!(SessionState::Closed.is_terminal());
        assert!(!SessionState::Disconnected.is_terminal());
        assert_eq!(
            SessionState::from(RTCPeerConnectionState::Failed),
            SessionState::Failed
        );
    }
}
