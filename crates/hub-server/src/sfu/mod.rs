//! SFU (Selective Forwarding Unit)
//!
//! Each participant keeps one session with the hub. Every track a participant
//! sends is forwarded packet-for-packet, without any processing or
//! transcoding, to all other participants registered when the track appeared.
//!
//! - [`Registry`]: who is connected
//! - [`SignalingHandshake`]: offer/answer for joining participants
//! - [`ForwardingEngine`]: per-track fan-out

mod forwarder;
mod handshake;
mod registry;
mod rtc;
mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use forwarder::{ForwardingEngine, ForwardingOptions, Publication};
pub use handshake::{HandshakeState, SignalingHandshake};
pub use registry::{Participant, Registry};
pub use rtc::{WebRtcSession, WebRtcSessionFactory};
pub use session::{
    InboundTrack, InboundTrackHandler, MediaKind, OutboundTrack, ParticipantId, Session,
    SessionFactory, SessionState, StateChangeHandler, TrackInfo,
};
