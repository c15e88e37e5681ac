use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use hub_protocol::ErrorResponse;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    /// Bad or missing request input. Nothing was mutated.
    #[error("Malformed request: {0}")]
    RequestMalformed(String),

    /// Offer/answer exchange failed. The participant was not registered.
    #[error("Negotiation failed: {0}")]
    NegotiationFailed(String),

    /// Creating or writing one subscriber's outbound track failed.
    #[error("Forwarding to {subscriber_id} failed: {reason}")]
    ForwardLinkFailed {
        subscriber_id: String,
        reason: String,
    },

    /// The inbound track stopped producing packets.
    #[error("Publisher track ended: {0}")]
    PublisherEnded(String),

    /// Unexpected failure from the media transport.
    #[error("Transport error: {0}")]
    TransportFatal(#[from] webrtc::Error),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        AppError::RequestMalformed(msg.into())
    }

    pub fn negotiation(msg: impl std::fmt::Display) -> Self {
        AppError::NegotiationFailed(msg.to_string())
    }

    pub fn link(subscriber_id: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        AppError::ForwardLinkFailed {
            subscriber_id: subscriber_id.into(),
            reason: reason.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::RequestMalformed(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NegotiationFailed(_) => {
                tracing::warn!("{}", self);
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
            AppError::ForwardLinkFailed { .. } | AppError::PublisherEnded(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
            AppError::TransportFatal(e) => {
                tracing::error!("Transport error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Transport error".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
