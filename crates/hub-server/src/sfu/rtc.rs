//! `webrtc` backed sessions
//!
//! Wraps `RTCPeerConnection`, `TrackRemote` and `TrackLocalStaticRTP` behind
//! the hub's session traits.

use async_trait::async_trait;
use hub_protocol::{IceServer, SdpType, SessionDescription};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::setting_engine::SettingEngine;
use webrtc::api::APIBuilder;
use webrtc::api::API;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry as InterceptorRegistry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp::packet::Packet;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;
use webrtc::track::track_local::{TrackLocal, TrackLocalWriter};
use webrtc::track::track_remote::TrackRemote;

use super::session::{
    InboundTrack, InboundTrackHandler, OutboundTrack, Session, SessionFactory, SessionState,
    StateChangeHandler, TrackInfo,
};
use crate::error::{AppError, Result};

/// Creates one peer connection per joining participant
pub struct WebRtcSessionFactory {
    /// WebRTC API (shared for all connections)
    api: Arc<API>,
    ice_servers: Vec<RTCIceServer>,
}

impl WebRtcSessionFactory {
    pub fn new(ice_servers: &[IceServer]) -> anyhow::Result<Self> {
        // Forwarding never touches payloads, so accept whatever the default
        // codec set lets browsers offer.
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;

        let mut registry = InterceptorRegistry::new();
        registry = register_default_interceptors(registry, &mut media_engine)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .with_setting_engine(SettingEngine::default())
            .build();

        let ice_servers = ice_servers
            .iter()
            .map(|server| RTCIceServer {
                urls: server.urls.clone(),
                username: server.username.clone().unwrap_or_default(),
                credential: server.credential.clone().unwrap_or_default(),
                ..Default::default()
            })
            .collect();

        Ok(Self {
            api: Arc::new(api),
            ice_servers,
        })
    }
}

#[async_trait]
impl SessionFactory for WebRtcSessionFactory {
    async fn create_session(&self) -> Result<Arc<dyn Session>> {
        let config = RTCConfiguration {
            ice_servers: self.ice_servers.clone(),
            ..Default::default()
        };

        let peer_connection = Arc::new(self.api.new_peer_connection(config).await?);
        Ok(Arc::new(WebRtcSession { peer_connection }))
    }
}

pub struct WebRtcSession {
    peer_connection: Arc<RTCPeerConnection>,
}

fn to_rtc(desc: SessionDescription) -> Result<RTCSessionDescription> {
    let parsed = match desc.sdp_type {
        SdpType::Offer => RTCSessionDescription::offer(desc.sdp),
        SdpType::Answer => RTCSessionDescription::answer(desc.sdp),
        SdpType::Pranswer => RTCSessionDescription::pranswer(desc.sdp),
        SdpType::Rollback => {
            return Err(AppError::negotiation("rollback descriptions are not supported"))
        }
    };
    parsed.map_err(|e| AppError::negotiation(format!("invalid SDP: {e}")))
}

fn from_rtc(desc: RTCSessionDescription) -> Option<SessionDescription> {
    let sdp_type = match desc.sdp_type {
        RTCSdpType::Offer => SdpType::Offer,
        RTCSdpType::Answer => SdpType::Answer,
        RTCSdpType::Pranswer => SdpType::Pranswer,
        RTCSdpType::Rollback => SdpType::Rollback,
        _ => return None,
    };
    Some(SessionDescription {
        sdp_type,
        sdp: desc.sdp,
    })
}

#[async_trait]
impl Session for WebRtcSession {
    async fn set_remote_description(&self, offer: SessionDescription) -> Result<()> {
        let offer = to_rtc(offer)?;
        self.peer_connection.set_remote_description(offer).await?;
        Ok(())
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        let answer = self.peer_connection.create_answer(None).await?;
        from_rtc(answer).ok_or_else(|| AppError::negotiation("answer has no SDP type"))
    }

    async fn gathering_complete(&self) -> mpsc::Receiver<()> {
        self.peer_connection.gathering_complete_promise().await
    }

    async fn set_local_description(&self, answer: SessionDescription) -> Result<()> {
        let answer = to_rtc(answer)?;
        self.peer_connection.set_local_description(answer).await?;
        Ok(())
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        self.peer_connection
            .local_description()
            .await
            .and_then(from_rtc)
    }

    fn on_inbound_track(&self, handler: InboundTrackHandler) {
        self.peer_connection
            .on_track(Box::new(move |track, _receiver, _transceiver| {
                let handler = Arc::clone(&handler);
                Box::pin(async move {
                    handler(Arc::new(RemoteTrack::new(track)));
                })
            }));
    }

    fn on_state_change(&self, handler: StateChangeHandler) {
        self.peer_connection
            .on_peer_connection_state_change(Box::new(move |state| {
                handler(SessionState::from(state));
                Box::pin(async {})
            }));
    }

    async fn add_outbound_track(&self, info: &TrackInfo) -> Result<Arc<dyn OutboundTrack>> {
        let track = Arc::new(TrackLocalStaticRTP::new(
            info.codec.clone(),
            info.id.clone(),
            info.stream_id.clone(),
        ));

        let sender = self
            .peer_connection
            .add_track(Arc::clone(&track) as Arc<dyn TrackLocal + Send + Sync>)
            .await?;

        // Interceptors only see RTCP that somebody reads
        let released = CancellationToken::new();
        let rtcp_sender = Arc::clone(&sender);
        let rtcp_released = released.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = rtcp_released.cancelled() => {}
                _ = async { while rtcp_sender.read_rtcp().await.is_ok() {} } => {}
            }
        });

        Ok(Arc::new(LocalTrack {
            id: info.id.clone(),
            track,
            sender,
            peer_connection: Arc::downgrade(&self.peer_connection),
            released,
        }))
    }

    async fn close(&self) -> Result<()> {
        self.peer_connection.close().await?;
        Ok(())
    }
}

struct RemoteTrack {
    track: Arc<TrackRemote>,
    info: TrackInfo,
}

impl RemoteTrack {
    fn new(track: Arc<TrackRemote>) -> Self {
        let info = TrackInfo {
            id: track.id().to_string(),
            stream_id: track.stream_id().to_string(),
            kind: track.kind().into(),
            codec: track.codec().capability,
        };
        Self { track, info }
    }
}

#[async_trait]
impl InboundTrack for RemoteTrack {
    fn info(&self) -> &TrackInfo {
        &self.info
    }

    async fn read_packet(&self) -> Result<Packet> {
        let (packet, _attributes) = self.track.read_rtp().await?;
        Ok(packet)
    }
}

struct LocalTrack {
    id: String,
    track: Arc<TrackLocalStaticRTP>,
    sender: Arc<RTCRtpSender>,
    peer_connection: Weak<RTCPeerConnection>,
    /// Stops the RTCP drain for `sender`
    released: CancellationToken,
}

#[async_trait]
impl OutboundTrack for LocalTrack {
    fn id(&self) -> &str {
        &self.id
    }

    async fn write_packet(&self, packet: &Packet) -> Result<()> {
        self.track.write_rtp(packet).await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.released.cancel();

        let Some(peer_connection) = self.peer_connection.upgrade() else {
            return Ok(());
        };
        if peer_connection.connection_state() == RTCPeerConnectionState::Closed {
            return Ok(());
        }

        peer_connection.remove_track(&self.sender).await?;
        Ok(())
    }
}
