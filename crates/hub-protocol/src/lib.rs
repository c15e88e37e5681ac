//! Wire types shared between the fan-out hub and its clients.

pub mod messages;
pub mod signal;
pub mod types;

pub use messages::{ErrorResponse, IceServersResponse, OfferParams, OfferRequest, OfferResponse, ParticipantsResponse};
pub use signal::{SdpType, SessionDescription, SignalError};
pub use types::{IceServer, ParticipantData, PublicationData};
