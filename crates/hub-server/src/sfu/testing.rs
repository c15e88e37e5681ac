//! In-memory sessions and tracks for unit tests

use async_trait::async_trait;
use hub_protocol::SessionDescription;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use webrtc::rtp::packet::Packet;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;

use super::session::{
    InboundTrack, InboundTrackHandler, MediaKind, OutboundTrack, Session, SessionFactory,
    SessionState, StateChangeHandler, TrackInfo,
};
use crate::error::{AppError, Result};

pub const FAKE_ANSWER_SDP: &str = "v=0\r\no=- 1 1 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n";

pub fn packet(seq: u16) -> Packet {
    let mut packet = Packet::default();
    packet.header.sequence_number = seq;
    packet
}

/// Poll `condition` until it holds, panicking after two seconds
pub async fn eventually<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition().await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not met within 2s");
}

pub struct FakeInboundTrack {
    info: TrackInfo,
    packets: tokio::sync::Mutex<mpsc::UnboundedReceiver<Packet>>,
}

impl FakeInboundTrack {
    /// Returns the track and the sender feeding it. Dropping the sender ends
    /// the track.
    pub fn new(id: &str) -> (Arc<Self>, mpsc::UnboundedSender<Packet>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let track = Arc::new(Self {
            info: TrackInfo {
                id: id.to_string(),
                stream_id: format!("{id}-stream"),
                kind: MediaKind::Video,
                codec: RTCRtpCodecCapability {
                    mime_type: "video/VP8".to_string(),
                    clock_rate: 90000,
                    ..Default::default()
                },
            },
            packets: tokio::sync::Mutex::new(rx),
        });
        (track, tx)
    }
}

#[async_trait]
impl InboundTrack for FakeInboundTrack {
    fn info(&self) -> &TrackInfo {
        &self.info
    }

    async fn read_packet(&self) -> Result<Packet> {
        self.packets
            .lock()
            .await
            .recv()
            .await
            .ok_or_else(|| AppError::PublisherEnded("EOF".to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteBehavior {
    Deliver,
    Fail,
    Hang,
}

pub struct FakeOutboundTrack {
    id: String,
    behavior: WriteBehavior,
    received: Mutex<Vec<u16>>,
    closed: AtomicBool,
}

impl FakeOutboundTrack {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Sequence numbers written so far, in write order
    pub fn received(&self) -> Vec<u16> {
        self.received.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OutboundTrack for FakeOutboundTrack {
    fn id(&self) -> &str {
        &self.id
    }

    async fn write_packet(&self, packet: &Packet) -> Result<()> {
        match self.behavior {
            WriteBehavior::Deliver => {
                self.received
                    .lock()
                    .unwrap()
                    .push(packet.header.sequence_number);
                Ok(())
            }
            WriteBehavior::Fail => Err(AppError::Internal(anyhow::anyhow!("simulated write error"))),
            WriteBehavior::Hang => std::future::pending().await,
        }
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

pub struct FakeSession {
    inbound_handler: Mutex<Option<InboundTrackHandler>>,
    state_handler: Mutex<Option<StateChangeHandler>>,
    outbound: Mutex<Vec<Arc<FakeOutboundTrack>>>,
    write_behavior: Mutex<WriteBehavior>,
    fail_outbound: AtomicBool,
    fail_remote_description: AtomicBool,
    hold_gathering: AtomicBool,
    fail_transport_after_gathering: AtomicBool,
    /// Keeps held gathering promises pending
    gathering: Mutex<Vec<mpsc::Sender<()>>>,
    local_description: Mutex<Option<SessionDescription>>,
    closed: AtomicBool,
}

impl Default for FakeSession {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeSession {
    pub fn new() -> Self {
        Self {
            inbound_handler: Mutex::new(None),
            state_handler: Mutex::new(None),
            outbound: Mutex::new(Vec::new()),
            write_behavior: Mutex::new(WriteBehavior::Deliver),
            fail_outbound: AtomicBool::new(false),
            fail_remote_description: AtomicBool::new(false),
            hold_gathering: AtomicBool::new(false),
            fail_transport_after_gathering: AtomicBool::new(false),
            gathering: Mutex::new(Vec::new()),
            local_description: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    /// Behavior of outbound tracks created from now on
    pub fn set_write_behavior(&self, behavior: WriteBehavior) {
        *self.write_behavior.lock().unwrap() = behavior;
    }

    pub fn fail_outbound_tracks(&self) {
        self.fail_outbound.store(true, Ordering::SeqCst);
    }

    pub fn fail_remote_description(&self) {
        self.fail_remote_description.store(true, Ordering::SeqCst);
    }

    /// Candidate gathering never completes
    pub fn hold_gathering(&self) {
        self.hold_gathering.store(true, Ordering::SeqCst);
    }

    /// The transport reports `Failed` once the final local description has
    /// been read, just before the join would register.
    pub fn fail_transport_after_gathering(&self) {
        self.fail_transport_after_gathering.store(true, Ordering::SeqCst);
    }

    pub fn outbound_tracks(&self) -> Vec<Arc<FakeOutboundTrack>> {
        self.outbound.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn has_inbound_handler(&self) -> bool {
        self.inbound_handler.lock().unwrap().is_some()
    }

    /// Simulate the remote side starting to send a track
    pub fn announce_track(&self, track: Arc<dyn InboundTrack>) {
        let handler = self.inbound_handler.lock().unwrap().clone();
        if let Some(handler) = handler {
            handler(track);
        }
    }

    /// Simulate a transport state change
    pub fn change_state(&self, state: SessionState) {
        let handler = self.state_handler.lock().unwrap().clone();
        if let Some(handler) = handler {
            handler(state);
        }
    }
}

#[async_trait]
impl Session for FakeSession {
    async fn set_remote_description(&self, _offer: SessionDescription) -> Result<()> {
        if self.fail_remote_description.load(Ordering::SeqCst) {
            return Err(AppError::negotiation("simulated bad offer"));
        }
        Ok(())
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        Ok(SessionDescription::answer(FAKE_ANSWER_SDP))
    }

    async fn gathering_complete(&self) -> mpsc::Receiver<()> {
        let (tx, rx) = mpsc::channel(1);
        if self.hold_gathering.load(Ordering::SeqCst) {
            self.gathering.lock().unwrap().push(tx);
        }
        rx
    }

    async fn set_local_description(&self, answer: SessionDescription) -> Result<()> {
        *self.local_description.lock().unwrap() = Some(answer);
        Ok(())
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        let description = self.local_description.lock().unwrap().clone();
        if self.fail_transport_after_gathering.load(Ordering::SeqCst) {
            self.change_state(SessionState::Failed);
            // Let the transport's own removal run first
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        description
    }

    fn on_inbound_track(&self, handler: InboundTrackHandler) {
        *self.inbound_handler.lock().unwrap() = Some(handler);
    }

    fn on_state_change(&self, handler: StateChangeHandler) {
        *self.state_handler.lock().unwrap() = Some(handler);
    }

    async fn add_outbound_track(&self, info: &TrackInfo) -> Result<Arc<dyn OutboundTrack>> {
        if self.fail_outbound.load(Ordering::SeqCst) {
            return Err(AppError::Internal(anyhow::anyhow!("simulated add_track failure")));
        }
        let track = Arc::new(FakeOutboundTrack {
            id: info.id.clone(),
            behavior: *self.write_behavior.lock().unwrap(),
            received: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        });
        self.outbound.lock().unwrap().push(track.clone());
        Ok(track)
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out [`FakeSession`]s and remembers them in creation order
#[derive(Default)]
pub struct FakeSessionFactory {
    sessions: Mutex<Vec<Arc<FakeSession>>>,
    prepare: Mutex<Option<Box<dyn Fn(&FakeSession) + Send + Sync>>>,
}

impl FakeSessionFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `f` to every session created from now on
    pub fn prepare(&self, f: impl Fn(&FakeSession) + Send + Sync + 'static) {
        *self.prepare.lock().unwrap() = Some(Box::new(f));
    }

    pub fn session(&self, index: usize) -> Arc<FakeSession> {
        self.sessions.lock().unwrap()[index].clone()
    }

    pub fn created(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }
}

#[async_trait]
impl SessionFactory for FakeSessionFactory {
    async fn create_session(&self) -> Result<Arc<dyn Session>> {
        let session = Arc::new(FakeSession::new());
        if let Some(prepare) = self.prepare.lock().unwrap().as_ref() {
            prepare(&session);
        }
        self.sessions.lock().unwrap().push(session.clone());
        Ok(session)
    }
}
