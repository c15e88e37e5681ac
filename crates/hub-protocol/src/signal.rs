//! Session description encoding used on the signaling endpoint
//!
//! Clients may send their offer either as raw SDP text or as a base64 encoded
//! JSON session description (`{"type":"offer","sdp":"..."}`). Answers always go
//! back in the base64 JSON form.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SignalError {
    #[error("session description is empty")]
    Empty,

    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("invalid session description JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("expected an {expected:?}, got {actual:?}")]
    UnexpectedType { expected: SdpType, actual: SdpType },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Pranswer,
    Answer,
    Rollback,
}

/// JSON shape of a session description as browsers serialize it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// Encode a session description as base64 JSON
pub fn encode(desc: &SessionDescription) -> Result<String, SignalError> {
    let json = serde_json::to_vec(desc)?;
    Ok(STANDARD.encode(json))
}

/// Decode a base64 JSON session description
pub fn decode(encoded: &str) -> Result<SessionDescription, SignalError> {
    let bytes = STANDARD.decode(encoded.trim())?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Decode the `offer` field of an offer request.
///
/// SDP always starts with its version line, so anything beginning with `v=` is
/// taken as raw SDP; everything else must be base64 JSON of type `offer`.
pub fn decode_offer(input: &str) -> Result<SessionDescription, SignalError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(SignalError::Empty);
    }

    if trimmed.starts_with("v=") {
        return Ok(SessionDescription::offer(input));
    }

    let desc = decode(trimmed)?;
    if desc.sdp_type != SdpType::Offer {
        return Err(SignalError::UnexpectedType {
            expected: SdpType::Offer,
            actual: desc.sdp_type,
        });
    }
    if desc.sdp.trim().is_empty() {
        return Err(SignalError::Empty);
    }
    Ok(desc)
}
