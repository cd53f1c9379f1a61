//! Notifications raised to the presentation layer

/// Fire-once lifecycle notification
///
/// Signals carry no payload; details live in the replicated state
/// available through `Session::info()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleSignal {
    /// Both peers connected, ready handshake open
    PeersConnected,
    /// Handshake countdown expired before both peers were ready
    ReadyTimeout,
    GameStarted,
    GameFinished,
    GameRestarted,
    /// The remote peer dropped (either side)
    PlayerDisconnected,
    /// The host ended the session (client side)
    HostDisconnected,
    /// Host started the grace window for its client
    ClientDisconnectedHostView,
    /// Client lost its link and the session is still valid
    ClientDisconnectedClientView,
    /// Attempt bound reached, no grace period granted
    ReconnectionExhausted,
    /// Host grace window expired
    FailedToReconnectHostView,
    /// Client grace window expired
    FailedToReconnectClientView,
    ClientReconnected,
    GameResumed,
    /// A client reconnect attempt did not restore the link
    ReconnectAttemptFailed,
    /// Transport fault tore the session down
    TransportFailure,
}

impl std::fmt::Display for LifecycleSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            LifecycleSignal::PeersConnected => "Both players connected",
            LifecycleSignal::ReadyTimeout => "Ready timeout",
            LifecycleSignal::GameStarted => "Game started",
            LifecycleSignal::GameFinished => "Game finished",
            LifecycleSignal::GameRestarted => "Game restarted",
            LifecycleSignal::PlayerDisconnected => "Player disconnected",
            LifecycleSignal::HostDisconnected => "Host disconnected",
            LifecycleSignal::ClientDisconnectedHostView => "Opponent disconnected, waiting for reconnection",
            LifecycleSignal::ClientDisconnectedClientView => "Connection lost, reconnect before the timer runs out",
            LifecycleSignal::ReconnectionExhausted => "Reconnection attempts exhausted",
            LifecycleSignal::FailedToReconnectHostView => "Opponent failed to reconnect",
            LifecycleSignal::FailedToReconnectClientView => "Failed to reconnect",
            LifecycleSignal::ClientReconnected => "Opponent reconnected",
            LifecycleSignal::GameResumed => "Game resumed",
            LifecycleSignal::ReconnectAttemptFailed => "Reconnection attempt failed",
            LifecycleSignal::TransportFailure => "Transport failure",
        };
        write!(f, "{}", text)
    }
}
