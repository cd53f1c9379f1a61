/// Error types for the zenoh-duel library
use thiserror::Error;

use crate::transport::ProviderError;
use crate::types::Role;

/// Result type alias for duel operations
pub type Result<T> = std::result::Result<T, DuelError>;

/// Errors that can occur in zenoh-duel operations
#[derive(Debug, Error)]
pub enum DuelError {
    /// Zenoh-related errors
    #[error("Zenoh error: {0}")]
    Zenoh(#[from] zenoh::Error),

    /// The session provider could not allocate or join a session
    #[error("Session provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Join targeted a session that does not exist
    #[error("Invalid session code: {0}")]
    InvalidSessionCode(String),

    /// The remote peer is disconnected
    #[error("Peer lost: {0}")]
    PeerLost(String),

    /// The reconnection attempt bound has been reached
    #[error("Reconnection attempts exhausted")]
    ReconnectionExhausted,

    /// The host ended the session
    #[error("Host terminated the session")]
    HostTerminated,

    /// Transport-layer failure, distinct from an orderly disconnect
    #[error("Transport fault: {0}")]
    TransportFault(String),

    /// Invalid peer identifier provided
    #[error("Invalid peer id: {0}. Must be a valid single-chunk keyexpr (no /, *, $, ?, #, @)")]
    InvalidPeerId(String),

    /// Invalid keyexpr pattern
    #[error("Invalid keyexpr: {0}")]
    InvalidKeyexpr(String),

    /// Invalid state transition attempted
    #[error("Invalid state transition: from {from} to {to}")]
    InvalidStateTransition {
        /// Current phase
        from: String,
        /// Attempted target phase
        to: String,
    },

    /// Move submitted out of turn
    #[error("Not {0:?}'s turn")]
    NotYourTurn(Role),

    /// Move or finish submitted after the game ended
    #[error("Game already finished")]
    GameFinished,

    /// Cell already taken
    #[error("Cell ({row}, {col}) is already occupied")]
    CellOccupied {
        /// Row index
        row: usize,
        /// Column index
        col: usize,
    },

    /// Cell outside the 3x3 grid
    #[error("Cell ({row}, {col}) is outside the board")]
    OutOfBounds {
        /// Row index
        row: usize,
        /// Column index
        col: usize,
    },

    /// Finishing a game requires a decided outcome
    #[error("Cannot finish a game with an unresolved outcome")]
    UnresolvedOutcome,

    /// Operation requires host role
    #[error("Not the host")]
    NotHost,

    /// Operation requires client role
    #[error("Not a client")]
    NotClient,

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ProviderError> for DuelError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Unavailable(reason) => DuelError::ProviderUnavailable(reason),
            ProviderError::SessionFull(id) => {
                DuelError::ProviderUnavailable(format!("session '{}' is full", id))
            }
            ProviderError::SessionNotFound(id) => DuelError::InvalidSessionCode(id.to_string()),
            ProviderError::Closed => DuelError::PeerLost("relay link closed".to_string()),
            ProviderError::Fault(reason) => DuelError::TransportFault(reason),
        }
    }
}
