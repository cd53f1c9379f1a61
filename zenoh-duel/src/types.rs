/// Core types for the zenoh-duel library
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::board::Board;
use crate::error::{DuelError, Result};
use crate::name_generator;
use crate::replicated::ReplicatedState;

/// Length of generated join codes
const SESSION_CODE_LEN: usize = 8;

/// Check that a string is usable as a single keyexpr chunk
fn validate_chunk(s: &str) -> std::result::Result<(), String> {
    if s.is_empty() {
        return Err("cannot be empty".to_string());
    }

    // Check for invalid characters: / * $ ? # @
    for ch in s.chars() {
        if matches!(ch, '/' | '*' | '$' | '?' | '#' | '@') || ch.is_whitespace() {
            return Err(format!("'{}' contains invalid character '{}'", s, ch));
        }
    }

    Ok(())
}

/// Unique peer identifier
///
/// PeerId must be a valid single-chunk keyexpr:
/// - Non-empty UTF-8 string
/// - Cannot contain: / * $ ? # @ or whitespace
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PeerId(String);

impl PeerId {
    /// Generate a new peer ID with a human-readable name
    /// Uses Markov chain-based name generation with a numeric suffix for uniqueness
    pub fn generate() -> Self {
        PeerId(name_generator::generate_unique_name())
    }

    /// Create from a specific name (must be unique and keyexpr-compatible)
    pub fn from_name(name: String) -> Result<Self> {
        validate_chunk(&name).map_err(DuelError::InvalidPeerId)?;
        Ok(PeerId(name))
    }

    /// Get the string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PeerId {
    type Error = DuelError;

    fn try_from(value: String) -> Result<Self> {
        PeerId::from_name(value)
    }
}

impl From<PeerId> for String {
    fn from(id: PeerId) -> Self {
        id.0
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Session identifier (join code) handed out by the session provider
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a short join code
    ///
    /// Base58 keeps codes free of look-alike characters (0, O, I, l).
    pub fn generate() -> Self {
        let raw = uuid::Uuid::new_v4();
        let code: String = bs58::encode(raw.as_bytes())
            .into_string()
            .chars()
            .take(SESSION_CODE_LEN)
            .collect();
        SessionId(code)
    }

    /// Parse a code typed by a user
    ///
    /// Surrounding whitespace is ignored. Returns `InvalidSessionCode` for
    /// empty codes or codes that cannot address a relay session.
    pub fn from_code(code: &str) -> Result<Self> {
        let code = code.trim();
        validate_chunk(code)
            .map_err(|reason| DuelError::InvalidSessionCode(format!("{} ({})", code, reason)))?;
        Ok(SessionId(code.to_string()))
    }

    /// Get the string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Peer role in a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Authoritative peer, sole writer of replicated state. Plays X.
    Host,
    /// Non-authoritative peer, requests mutations via the host. Plays O.
    Client,
}

impl Role {
    /// The opposite role
    pub fn other(self) -> Role {
        match self {
            Role::Host => Role::Client,
            Role::Client => Role::Host,
        }
    }

    /// Board mark of this role
    pub fn mark(self) -> char {
        match self {
            Role::Host => 'X',
            Role::Client => 'O',
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Role::Host => 0,
            Role::Client => 1,
        }
    }
}

/// Session lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// No session
    #[default]
    Idle,
    /// Session allocated, waiting for the client
    ///
    /// Host side counterpart of `WaitingForPeer`: the host moves from here
    /// straight to `ReadyHandshake` once the client joins.
    Hosted,
    /// Join in flight
    Joining,
    /// Joined, waiting for the host to confirm both peers (client only)
    WaitingForPeer,
    /// Both peers connected, collecting ready signals
    ReadyHandshake,
    /// Game in progress
    Active,
    /// Game over, outcome decided
    Finished,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Idle => "Idle",
            Phase::Hosted => "Hosted",
            Phase::Joining => "Joining",
            Phase::WaitingForPeer => "WaitingForPeer",
            Phase::ReadyHandshake => "ReadyHandshake",
            Phase::Active => "Active",
            Phase::Finished => "Finished",
        };
        write!(f, "{}", name)
    }
}

/// Result of a game
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Outcome {
    /// Host (X) completed a line
    Player1Won,
    /// Client (O) completed a line
    Player2Won,
    /// Board full, no line
    Draw,
    /// Game still open
    #[default]
    Unresolved,
}

impl Outcome {
    /// Outcome when `role` completes a line
    pub fn won_by(role: Role) -> Outcome {
        match role {
            Role::Host => Outcome::Player1Won,
            Role::Client => Outcome::Player2Won,
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Player1Won => write!(f, "Player 1 (X) wins"),
            Outcome::Player2Won => write!(f, "Player 2 (O) wins"),
            Outcome::Draw => write!(f, "Draw"),
            Outcome::Unresolved => write!(f, "In progress"),
        }
    }
}

/// Public snapshot of a session returned by `Session::info()`
#[derive(Debug, Clone)]
pub struct SessionInfo {
    /// Lifecycle phase
    pub phase: Phase,
    /// Local role (None while idle or joining)
    pub role: Option<Role>,
    /// Join code of the current session
    pub session_id: Option<SessionId>,
    /// Local view of the replicated state
    pub state: ReplicatedState,
    /// Client move sent to the host and not yet confirmed
    pub pending_move: Option<(usize, usize)>,
    /// Client-side reconnection window
    pub client_grace_remaining: Option<Duration>,
    /// Whether the local relay link is down
    pub link_lost: bool,
}

impl SessionInfo {
    /// Board as the local player should see it, including a pending move
    pub fn board(&self) -> Board {
        let mut board = self.state.board.clone();
        if let (Some((row, col)), Some(role)) = (self.pending_move, self.role) {
            // Overlay only; the host's next snapshot is authoritative
            let _ = board.place(row, col, role);
        }
        board
    }

    /// Whether the local player may move now
    pub fn is_my_turn(&self) -> bool {
        self.phase == Phase::Active
            && !self.state.game_finished
            && self.pending_move.is_none()
            && self.role == Some(self.state.current_turn)
    }
}

impl std::fmt::Display for SessionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code = self
            .session_id
            .as_ref()
            .map(|id| id.as_str())
            .unwrap_or("-");
        match (self.phase, self.role) {
            (Phase::Idle, _) => write!(f, "No session"),
            (Phase::Joining, _) => write!(f, "Joining session {}...", code),
            (Phase::Hosted, _) => write!(f, "Hosting session {} (waiting for opponent)", code),
            (Phase::WaitingForPeer, _) => write!(f, "Joined session {} (waiting for host)", code),
            (Phase::ReadyHandshake, _) => write!(
                f,
                "Session {}: waiting for ready ({}/2)",
                code, self.state.ready_count
            ),
            (Phase::Active, role) => {
                let whose = if role == Some(self.state.current_turn) {
                    "your turn"
                } else {
                    "opponent's turn"
                };
                write!(f, "Session {}: playing, {}", code, whose)
            }
            (Phase::Finished, _) => write!(f, "Session {}: {}", code, self.state.outcome),
        }
    }
}
