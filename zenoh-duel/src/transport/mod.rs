//! Relay transport abstraction
//!
//! A [`SessionProvider`] allocates relay sessions identified by a join code
//! and lets peers join them. Each participant talks through its own
//! [`PeerLink`], which delivers connectivity changes and messages as
//! [`LinkEvent`]s.

use async_trait::async_trait;
use thiserror::Error;

use crate::protocol::PeerMessage;
use crate::types::{PeerId, SessionId};

pub mod loopback;

pub use loopback::LoopbackRelay;

/// Provider failure codes
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// The relay service could not be reached
    #[error("relay unavailable: {0}")]
    Unavailable(String),

    /// The session has no free client seat
    #[error("session '{0}' is full")]
    SessionFull(SessionId),

    /// No session with this code exists
    #[error("session '{0}' not found")]
    SessionNotFound(SessionId),

    /// The link was shut down
    #[error("link closed")]
    Closed,

    /// Transport-level failure
    #[error("transport fault: {0}")]
    Fault(String),
}

/// Event delivered on a peer link
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// A client joined the hosted session (host side)
    PeerJoined(PeerId),
    /// A client left or dropped (host side)
    PeerLeft(PeerId),
    /// The host closed the session (client side)
    ///
    /// Only for links that can tell a closed session apart from a local
    /// outage; others report `ConnectionLost` and let the probe decide.
    HostLeft,
    /// Message from the remote peer
    Message { from: PeerId, message: PeerMessage },
    /// The local link dropped
    ConnectionLost,
    /// Transport-level failure
    Fault(String),
}

/// Result of a successful allocation
pub struct HostedSession {
    pub id: SessionId,
    pub link: Box<dyn PeerLink>,
}

impl std::fmt::Debug for HostedSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostedSession")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// Relay service able to host and join sessions
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Allocate a session hosted by `host` with room for `max_clients`
    async fn allocate(
        &self,
        host: &PeerId,
        max_clients: usize,
    ) -> Result<HostedSession, ProviderError>;

    /// Join an existing session
    async fn join(&self, id: &SessionId, peer: &PeerId)
        -> Result<Box<dyn PeerLink>, ProviderError>;

    /// Whether `id` still names a live session
    async fn probe_valid(&self, id: &SessionId) -> Result<bool, ProviderError>;
}

/// One participant's connection to a relay session
#[async_trait]
pub trait PeerLink: Send {
    /// Send to the remote side (host: every connected client)
    async fn send(&mut self, message: &PeerMessage) -> Result<(), ProviderError>;

    /// Next event, `None` once the link is gone for good
    ///
    /// Must be cancel-safe: dropping the future loses no event.
    async fn next_event(&mut self) -> Option<LinkEvent>;

    /// Whether the link is currently connected
    fn is_connected(&self) -> bool;

    /// Leave the session; the remote side observes a disconnect
    async fn shutdown(&mut self);
}
