//! Offer/answer exchange for joining participants

use hub_protocol::SessionDescription;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::forwarder::ForwardingEngine;
use super::registry::{Participant, Registry};
use super::session::{ParticipantId, Session, SessionFactory};
use crate::error::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Received,
    SessionCreated,
    RemoteDescriptionSet,
    AnswerCreated,
    LocalDescriptionSet,
    GatheringComplete,
    Registered,
    Failed,
}

/// Progress of one join. Dropping it before `Registered` (error, timeout or
/// the caller going away) closes the half-built session.
struct JoinAttempt {
    participant_id: ParticipantId,
    state: HandshakeState,
    session: Option<Arc<dyn Session>>,
    cancel: CancellationToken,
}

impl JoinAttempt {
    fn new(participant_id: ParticipantId, cancel: CancellationToken) -> Self {
        tracing::debug!(participant_id = %participant_id, "Offer received");
        Self {
            participant_id,
            state: HandshakeState::Received,
            session: None,
            cancel,
        }
    }

    fn advance(&mut self, state: HandshakeState) {
        tracing::debug!(
            participant_id = %self.participant_id,
            from = ?self.state,
            to = ?state,
            "Handshake advanced"
        );
        self.state = state;
    }
}

impl Drop for JoinAttempt {
    fn drop(&mut self) {
        if self.state == HandshakeState::Registered {
            return;
        }

        tracing::warn!(
            participant_id = %self.participant_id,
            at = ?self.state,
            "Handshake failed"
        );
        self.state = HandshakeState::Failed;
        self.cancel.cancel();

        if let Some(session) = self.session.take() {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    if let Err(e) = session.close().await {
                        tracing::warn!("Error closing abandoned session: {}", e);
                    }
                });
            }
        }
    }
}

pub struct SignalingHandshake {
    factory: Arc<dyn SessionFactory>,
    registry: Arc<Registry>,
    engine: Arc<ForwardingEngine>,
    gather_timeout: Duration,
}

impl SignalingHandshake {
    pub fn new(
        factory: Arc<dyn SessionFactory>,
        registry: Arc<Registry>,
        engine: Arc<ForwardingEngine>,
        gather_timeout: Duration,
    ) -> Self {
        Self {
            factory,
            registry,
            engine,
            gather_timeout,
        }
    }

    /// Negotiate a session for `participant_id` and register it.
    ///
    /// Returns the final local description once candidate gathering is done.
    /// Nothing is registered unless the whole exchange succeeds.
    pub async fn join(
        &self,
        participant_id: &str,
        offer: SessionDescription,
    ) -> Result<SessionDescription> {
        let id = ParticipantId::parse(participant_id)?;

        let session = self
            .factory
            .create_session()
            .await
            .map_err(AppError::negotiation)?;
        let participant = Participant::new(id.clone(), Arc::clone(&session));

        let mut attempt = JoinAttempt::new(id.clone(), participant.cancellation().clone());
        attempt.session = Some(Arc::clone(&session));
        attempt.advance(HandshakeState::SessionCreated);

        // Observers go in before any media can flow
        self.wire(&participant);

        let answer = self
            .negotiate(&mut attempt, session.as_ref(), offer)
            .await?;

        // A transport that died during the exchange found nothing to remove
        if participant.is_gone() {
            return Err(AppError::negotiation("session closed before registration"));
        }
        let session_key = participant.session_key();
        let registered = self.registry.add(participant).await;
        if registered.is_gone() {
            self.registry.remove_session(&id, session_key).await;
            return Err(AppError::negotiation("session closed before registration"));
        }
        attempt.advance(HandshakeState::Registered);

        tracing::info!(participant_id = %id, "Participant joined");
        Ok(answer)
    }

    async fn negotiate(
        &self,
        attempt: &mut JoinAttempt,
        session: &dyn Session,
        offer: SessionDescription,
    ) -> Result<SessionDescription> {
        session
            .set_remote_description(offer)
            .await
            .map_err(AppError::negotiation)?;
        attempt.advance(HandshakeState::RemoteDescriptionSet);

        let answer = session
            .create_answer()
            .await
            .map_err(AppError::negotiation)?;
        attempt.advance(HandshakeState::AnswerCreated);

        let mut gathered = session.gathering_complete().await;

        session
            .set_local_description(answer)
            .await
            .map_err(AppError::negotiation)?;
        attempt.advance(HandshakeState::LocalDescriptionSet);

        tokio::select! {
            _ = gathered.recv() => {}
            _ = attempt.cancel.cancelled() => {
                return Err(AppError::negotiation("session closed during ICE gathering"));
            }
            _ = tokio::time::sleep(self.gather_timeout) => {
                return Err(AppError::negotiation(format!(
                    "ICE gathering timed out after {:?}",
                    self.gather_timeout
                )));
            }
        }
        attempt.advance(HandshakeState::GatheringComplete);

        session.local_description().await.ok_or_else(|| {
            AppError::negotiation("local description unavailable after ICE gathering")
        })
    }

    /// Hook the session's track and state callbacks up to the engine and
    /// registry. Both hold weak references so a lingering session cannot keep
    /// them alive.
    fn wire(&self, participant: &Participant) {
        let engine: Weak<ForwardingEngine> = Arc::downgrade(&self.engine);
        let publisher_id = participant.id.clone();
        let publisher_cancel = participant.cancellation().clone();

        participant.session.on_inbound_track(Arc::new(move |track| {
            let Some(engine) = engine.upgrade() else {
                return;
            };
            if publisher_cancel.is_cancelled() {
                return;
            }
            let publisher_id = publisher_id.clone();
            let publisher_cancel = publisher_cancel.clone();
            tokio::spawn(async move {
                engine.publish(publisher_id, &publisher_cancel, track).await;
            });
        }));

        let registry: Weak<Registry> = Arc::downgrade(&self.registry);
        let id = participant.id.clone();
        let session_key = participant.session_key();
        let cancel = participant.cancellation().clone();

        participant.session.on_state_change(Arc::new(move |state| {
            tracing::info!(participant_id = %id, ?state, "Connection state has changed");
            if !state.is_terminal() {
                return;
            }

            cancel.cancel();
            let Some(registry) = registry.upgrade() else {
                return;
            };
            let id = id.clone();
            tokio::spawn(async move {
                registry.remove_session(&id, session_key).await;
            });
        }));
    }
}
