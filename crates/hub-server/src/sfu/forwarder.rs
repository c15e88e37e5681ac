//! Forwarding engine
//!
//! Every inbound track becomes a [`Publication`]: one task reading packets
//! from the publisher, and one link per subscriber that was registered when the
//! track appeared. Each link owns a bounded queue drained by its own writer
//! task, so a slow subscriber only ever delays itself.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use webrtc::rtp::packet::Packet;

use super::registry::{Participant, Registry};
use super::session::{InboundTrack, OutboundTrack, ParticipantId, TrackInfo};
use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct ForwardingOptions {
    /// A write taking longer than this fails the link
    pub write_timeout: Duration,
    /// Packets queued per link before new ones are dropped for that link
    pub queue_capacity: usize,
}

impl Default for ForwardingOptions {
    fn default() -> Self {
        Self {
            write_timeout: Duration::from_millis(500),
            queue_capacity: 256,
        }
    }
}

/// Live relation from one inbound track to one subscriber's outbound track
struct ForwardingLink {
    subscriber_id: ParticipantId,
    outbound_track_id: String,
    queue: mpsc::Sender<Packet>,
    /// Child of the subscriber's token; cancelled when the link dies for any reason
    cancel: CancellationToken,
    dropped: AtomicU64,
}

impl ForwardingLink {
    fn is_live(&self) -> bool {
        !self.cancel.is_cancelled() && !self.queue.is_closed()
    }
}

async fn run_link_writer(
    subscriber_id: ParticipantId,
    track: Arc<dyn OutboundTrack>,
    mut queue: mpsc::Receiver<Packet>,
    cancel: CancellationToken,
    write_timeout: Duration,
) {
    loop {
        let packet = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            packet = queue.recv() => match packet {
                Some(packet) => packet,
                None => break,
            },
        };

        let failure = match tokio::time::timeout(write_timeout, track.write_packet(&packet)).await {
            Ok(Ok(())) => continue,
            Ok(Err(e)) => AppError::link(subscriber_id.as_str(), e),
            Err(_) => AppError::link(
                subscriber_id.as_str(),
                format!("write timed out after {:?}", write_timeout),
            ),
        };

        tracing::warn!(track_id = %track.id(), "{}", failure);
        break;
    }

    cancel.cancel();

    if let Err(e) = track.close().await {
        tracing::debug!(
            subscriber_id = %subscriber_id,
            track_id = %track.id(),
            "Error releasing outbound track: {}",
            e
        );
    }
}

/// Fan-out of one inbound track
pub struct Publication {
    key: Uuid,
    publisher_id: ParticipantId,
    source: Arc<dyn InboundTrack>,
    links: RwLock<Vec<ForwardingLink>>,
    /// Child of the publisher's token
    cancel: CancellationToken,
    finished: CancellationToken,
    packets_read: AtomicU64,
}

impl Publication {
    fn new(
        publisher_id: ParticipantId,
        source: Arc<dyn InboundTrack>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            key: Uuid::new_v4(),
            publisher_id,
            source,
            links: RwLock::new(Vec::new()),
            cancel,
            finished: CancellationToken::new(),
            packets_read: AtomicU64::new(0),
        }
    }

    pub fn publisher_id(&self) -> &ParticipantId {
        &self.publisher_id
    }

    pub fn track(&self) -> &TrackInfo {
        self.source.info()
    }

    pub fn packets_read(&self) -> u64 {
        self.packets_read.load(Ordering::Relaxed)
    }

    /// Subscribers whose link is still alive
    pub async fn subscribers(&self) -> Vec<ParticipantId> {
        self.links
            .read()
            .await
            .iter()
            .filter(|link| link.is_live())
            .map(|link| link.subscriber_id.clone())
            .collect()
    }

    pub async fn link_count(&self) -> usize {
        self.links.read().await.iter().filter(|l| l.is_live()).count()
    }

    pub fn is_active(&self) -> bool {
        !self.finished.is_cancelled()
    }

    /// Resolves once the forwarding loop has exited and all links are released
    pub async fn finished(&self) {
        self.finished.cancelled().await
    }

    async fn add_link(
        &self,
        subscriber: &Participant,
        track: Arc<dyn OutboundTrack>,
        options: &ForwardingOptions,
    ) {
        let (tx, rx) = mpsc::channel(options.queue_capacity.max(1));
        let cancel = subscriber.cancellation().child_token();

        tokio::spawn(run_link_writer(
            subscriber.id.clone(),
            Arc::clone(&track),
            rx,
            cancel.clone(),
            options.write_timeout,
        ));

        tracing::info!(
            track_id = %self.track().id,
            publisher_id = %self.publisher_id,
            subscriber_id = %subscriber.id,
            "Track forwarded to peer"
        );

        self.links.write().await.push(ForwardingLink {
            subscriber_id: subscriber.id.clone(),
            outbound_track_id: track.id().to_string(),
            queue: tx,
            cancel,
            dropped: AtomicU64::new(0),
        });
    }

    async fn start_forwarding(&self) {
        tracing::info!(
            track_id = %self.track().id,
            stream_id = %self.track().stream_id,
            kind = self.track().kind.as_str(),
            publisher_id = %self.publisher_id,
            "Track has started"
        );

        let ended = loop {
            let packet = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break None,
                read = self.source.read_packet() => match read {
                    Ok(packet) => packet,
                    Err(e) => break Some(e),
                },
            };

            self.packets_read.fetch_add(1, Ordering::Relaxed);
            self.forward_packet(packet).await;
        };

        let cancelled = ended.is_none();
        match ended {
            Some(e) => tracing::info!(
                track_id = %self.track().id,
                publisher_id = %self.publisher_id,
                "{}",
                AppError::PublisherEnded(e.to_string())
            ),
            None => tracing::info!(
                track_id = %self.track().id,
                publisher_id = %self.publisher_id,
                "Publication stopped"
            ),
        }

        self.teardown(cancelled).await;
    }

    /// Queue `packet` on every live link. Links whose writer has died are
    /// dropped here.
    async fn forward_packet(&self, packet: Packet) {
        let mut links = self.links.write().await;

        links.retain(|link| {
            if !link.is_live() {
                tracing::info!(
                    track_id = %self.track().id,
                    subscriber_id = %link.subscriber_id,
                    "Removed forwarding link"
                );
                return false;
            }

            match link.queue.try_send(packet.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    let dropped = link.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    if dropped == 1 || dropped % 100 == 0 {
                        tracing::warn!(
                            subscriber_id = %link.subscriber_id,
                            outbound_track_id = %link.outbound_track_id,
                            dropped,
                            "Subscriber is falling behind, dropping packets"
                        );
                    }
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    tracing::info!(
                        track_id = %self.track().id,
                        subscriber_id = %link.subscriber_id,
                        "Removed forwarding link"
                    );
                    false
                }
            }
        });
    }

    /// Release every link. When the source simply ended, writers still flush
    /// what is already queued; a cancelled publication stops them at once.
    async fn teardown(&self, cancelled: bool) {
        let links = std::mem::take(&mut *self.links.write().await);
        if cancelled {
            for link in &links {
                link.cancel.cancel();
            }
        }
        tracing::debug!(
            track_id = %self.track().id,
            released = links.len(),
            "Released forwarding links"
        );
        self.finished.cancel();
    }
}

/// Fans each inbound track out to the participants registered at the moment
/// it appears.
///
/// Participants joining later are not added to publications that are already
/// running.
pub struct ForwardingEngine {
    registry: Arc<Registry>,
    options: ForwardingOptions,
    publications: RwLock<HashMap<Uuid, Arc<Publication>>>,
}

impl ForwardingEngine {
    pub fn new(registry: Arc<Registry>, options: ForwardingOptions) -> Self {
        Self {
            registry,
            options,
            publications: RwLock::new(HashMap::new()),
        }
    }

    /// Start forwarding `track` from `publisher` to everyone else currently
    /// registered. `publisher_cancel` stops the publication when the
    /// publisher leaves.
    pub async fn publish(
        self: &Arc<Self>,
        publisher: ParticipantId,
        publisher_cancel: &CancellationToken,
        track: Arc<dyn InboundTrack>,
    ) -> Arc<Publication> {
        let publication = Arc::new(Publication::new(
            publisher,
            track,
            publisher_cancel.child_token(),
        ));

        for subscriber in self.registry.snapshot().await {
            if subscriber.id == publication.publisher_id || subscriber.is_gone() {
                continue;
            }

            match subscriber.session.add_outbound_track(publication.track()).await {
                Ok(outbound) => publication.add_link(&subscriber, outbound, &self.options).await,
                Err(e) => tracing::warn!(
                    track_id = %publication.track().id,
                    "{}",
                    AppError::link(subscriber.id.as_str(), e)
                ),
            }
        }

        self.publications
            .write()
            .await
            .insert(publication.key, Arc::clone(&publication));

        let engine = Arc::clone(self);
        let running = Arc::clone(&publication);
        tokio::spawn(async move {
            running.start_forwarding().await;
            engine.publications.write().await.remove(&running.key);
        });

        publication
    }

    /// Publications whose forwarding loop is still running
    pub async fn publications(&self) -> Vec<Arc<Publication>> {
        self.publications
            .read()
            .await
            .values()
            .filter(|p| p.is_active())
            .cloned()
            .collect()
    }
}
