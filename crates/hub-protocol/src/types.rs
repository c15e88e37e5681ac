use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A participant currently registered with the hub
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParticipantData {
    pub id: String,
    pub joined_at: DateTime<Utc>,
}

/// One inbound track being fanned out, with the subscribers it still reaches
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublicationData {
    pub publisher_id: String,
    pub track_id: String,
    pub stream_id: String,
    /// "audio" or "video"
    pub kind: String,
    pub subscribers: Vec<String>,
}

/// ICE server entry handed to clients
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IceServer {
    pub urls: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}
