use crate::state::AppState;
use axum::{extract::State, Json};
use hub_protocol::{ParticipantData, ParticipantsResponse, PublicationData};

/// Who is connected and which tracks are being fanned out to whom
pub async fn list_participants(State(state): State<AppState>) -> Json<ParticipantsResponse> {
    let participants = state
        .registry
        .snapshot()
        .await
        .iter()
        .map(|p| ParticipantData {
            id: p.id.to_string(),
            joined_at: p.joined_at,
        })
        .collect();

    let mut publications = vec![];
    for publication in state.engine.publications().await {
        let track = publication.track();
        publications.push(PublicationData {
            publisher_id: publication.publisher_id().to_string(),
            track_id: track.id.clone(),
            stream_id: track.stream_id.clone(),
            kind: track.kind.as_str().to_string(),
            subscribers: publication
                .subscribers()
                .await
                .iter()
                .map(|id| id.to_string())
                .collect(),
        });
    }
    publications.sort_by(|a, b| {
        (&a.publisher_id, &a.track_id).cmp(&(&b.publisher_id, &b.track_id))
    });

    Json(ParticipantsResponse {
        participants,
        publications,
    })
}
