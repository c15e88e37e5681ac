//! Participant registry
//!
//! Maps participant ids to their sessions. The lock is only held while the map
//! itself changes or is copied; session I/O always happens outside it.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::session::{ParticipantId, Session};

/// A registered participant and the session it owns
pub struct Participant {
    pub id: ParticipantId,
    pub session: Arc<dyn Session>,
    pub joined_at: DateTime<Utc>,
    /// Distinguishes successive sessions registered under the same id
    session_key: Uuid,
    /// Cancelled when the participant leaves; parent of every task and link
    /// working on its behalf.
    cancel: CancellationToken,
}

impl Participant {
    pub fn new(id: ParticipantId, session: Arc<dyn Session>) -> Self {
        Self {
            id,
            session,
            joined_at: Utc::now(),
            session_key: Uuid::new_v4(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn session_key(&self) -> Uuid {
        self.session_key
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_gone(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Cancel everything running for `participant` and close its session in the
/// background.
fn retire(participant: Arc<Participant>) {
    participant.cancel.cancel();
    tokio::spawn(async move {
        if let Err(e) = participant.session.close().await {
            tracing::warn!(
                participant_id = %participant.id,
                "Error closing session: {}",
                e
            );
        }
    });
}

#[derive(Default)]
pub struct Registry {
    participants: RwLock<BTreeMap<ParticipantId, Arc<Participant>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `participant`, replacing any entry with the same id.
    ///
    /// A replaced session is closed right away and its publishes stop.
    pub async fn add(&self, participant: Participant) -> Arc<Participant> {
        let participant = Arc::new(participant);
        let replaced = self
            .participants
            .write()
            .await
            .insert(participant.id.clone(), Arc::clone(&participant));

        if let Some(old) = replaced {
            tracing::info!(
                participant_id = %participant.id,
                "Participant re-registered, closing previous session"
            );
            retire(old);
        }

        tracing::info!(participant_id = %participant.id, "Peer added");
        participant
    }

    /// Remove `id` if present. Absent ids are not an error.
    pub async fn remove(&self, id: &ParticipantId) -> Option<Arc<Participant>> {
        let removed = self.participants.write().await.remove(id);

        if let Some(participant) = &removed {
            tracing::info!(participant_id = %id, "Peer removed");
            retire(Arc::clone(participant));
        }

        removed
    }

    /// Remove `id` only while it still refers to the session identified by
    /// `session_key`. Used by transport callbacks, which must not evict a
    /// newer session registered under the same id.
    pub async fn remove_session(&self, id: &ParticipantId, session_key: Uuid) -> bool {
        let removed = {
            let mut participants = self.participants.write().await;
            match participants.get(id) {
                Some(current) if current.session_key == session_key => participants.remove(id),
                _ => None,
            }
        };

        match removed {
            Some(participant) => {
                tracing::info!(participant_id = %id, "Peer removed after transport shutdown");
                retire(participant);
                true
            }
            None => false,
        }
    }

    /// Point-in-time copy of all entries, ordered by id
    pub async fn snapshot(&self) -> Vec<Arc<Participant>> {
        self.participants.read().await.values().cloned().collect()
    }

    pub async fn ids(&self) -> Vec<ParticipantId> {
        self.participants.read().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.participants.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.participants.read().await.is_empty()
    }

    /// Remove every participant and wait for their sessions to close
    pub async fn close_all(&self) {
        let drained: Vec<_> = std::mem::take(&mut *self.participants.write().await)
            .into_values()
            .collect();

        for participant in &drained {
            participant.cancel.cancel();
        }

        let results = futures_util::future::join_all(
            drained.iter().map(|participant| participant.session.close()),
        )
        .await;

        for (participant, result) in drained.iter().zip(results) {
            if let Err(e) = result {
                tracing::warn!(participant_id = %participant.id, "Error closing session: {}", e);
            }
        }
    }
}
