use serde::{Deserialize, Serialize};

use crate::types::{IceServer, ParticipantData, PublicationData};

/// Query string of `POST /offer`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OfferParams {
    #[serde(rename = "peerId")]
    pub peer_id: Option<String>,
}

/// Body of `POST /offer`
///
/// `offer` is either a raw SDP string or a base64 encoded JSON session
/// description (see [`crate::signal::decode_offer`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferRequest {
    pub offer: String,
}

/// Response of `POST /offer`
///
/// The field is named `offer` for compatibility with existing clients even
/// though it carries the hub's answer, base64 encoded JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferResponse {
    pub offer: String,
}

/// Error body returned by every failing endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantsResponse {
    pub participants: Vec<ParticipantData>,
    pub publications: Vec<PublicationData>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IceServersResponse {
    pub ice_servers: Vec<IceServer>,
}
