use crate::error::{AppError, Result};
use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{Query, State},
    Json,
};
use hub_protocol::{signal, OfferParams, OfferRequest, OfferResponse};

/// `POST /offer?peerId=<id>`
///
/// The body is decoded leniently (no content type required) so that plain
/// `fetch` clients keep working.
pub async fn offer(
    State(state): State<AppState>,
    Query(params): Query<OfferParams>,
    body: Bytes,
) -> Result<Json<OfferResponse>> {
    let peer_id = params
        .peer_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| AppError::malformed("Missing peerId query parameter"))?;

    let request: OfferRequest = serde_json::from_slice(&body)
        .map_err(|e| AppError::malformed(format!("Failed to decode request body: {}", e)))?;

    let offer = signal::decode_offer(&request.offer)
        .map_err(|e| AppError::malformed(format!("Invalid offer: {}", e)))?;

    tracing::info!(participant_id = %peer_id, "Received offer");

    let answer = state.handshake.join(&peer_id, offer).await?;
    let encoded = signal::encode(&answer).map_err(|e| AppError::Internal(e.into()))?;

    Ok(Json(OfferResponse { offer: encoded }))
}
