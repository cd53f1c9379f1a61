//! Messages exchanged between host and client

use serde::{Deserialize, Serialize};

use crate::replicated::StateSync;
use crate::types::{Outcome, PeerId};

/// Why the host refused a joining peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefusalReason {
    /// No grace period was granted for the last disconnect
    ReconnectionExhausted,
    /// The client seat belongs to another peer
    SessionFull,
}

/// Peer-to-peer message
///
/// Host mutations always emit `State` before the notification they cause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PeerMessage {
    // host -> client
    State(StateSync),
    PeersConnected,
    GameStarted,
    GameFinished(Outcome),
    Restarted,
    Resumed { game_started: bool },
    Refused { peer: PeerId, reason: RefusalReason },
    HostLeaving,

    // client -> host
    Ready,
    Move { row: usize, col: usize },
    FinishRequest(Outcome),
    RestartRequest,
}

impl PeerMessage {
    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            PeerMessage::State(_) => "State",
            PeerMessage::PeersConnected => "PeersConnected",
            PeerMessage::GameStarted => "GameStarted",
            PeerMessage::GameFinished(_) => "GameFinished",
            PeerMessage::Restarted => "Restarted",
            PeerMessage::Resumed { .. } => "Resumed",
            PeerMessage::Refused { .. } => "Refused",
            PeerMessage::HostLeaving => "HostLeaving",
            PeerMessage::Ready => "Ready",
            PeerMessage::Move { .. } => "Move",
            PeerMessage::FinishRequest(_) => "FinishRequest",
            PeerMessage::RestartRequest => "RestartRequest",
        }
    }
}

// JSON body inside a zenoh-ext string
impl zenoh_ext::Serialize for PeerMessage {
    fn serialize(&self, serializer: &mut zenoh_ext::ZSerializer) {
        let json = serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::error!("Failed to encode {} message: {}", self.kind(), e);
            String::new()
        });
        zenoh_ext::Serialize::serialize(&json, serializer);
    }
}

impl zenoh_ext::Deserialize for PeerMessage {
    fn deserialize(
        deserializer: &mut zenoh_ext::ZDeserializer,
    ) -> Result<Self, zenoh_ext::ZDeserializeError> {
        let json = <String as zenoh_ext::Deserialize>::deserialize(deserializer)?;
        serde_json::from_str(&json).map_err(|_| zenoh_ext::ZDeserializeError)
    }
}
