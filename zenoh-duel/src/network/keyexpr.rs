//! Key expressions of a relay session
//!
//! Every session lives under `<prefix>/<session_id>`:
//!
//! - `<prefix>/<session_id>/host` - host liveliness token
//! - `<prefix>/<session_id>/peer/<peer_id>` - client liveliness token
//! - `<prefix>/<session_id>/join/<peer_id>` - join queries answered by the host
//! - `<prefix>/<session_id>/to_host/<peer_id>` - client to host messages
//! - `<prefix>/<session_id>/to_clients/<host_id>` - host to client messages
//!
//! A `None` peer renders as `*`, which is how subscribers and queryables
//! match every sender.

use crate::error::{DuelError, Result};
use crate::types::{PeerId, SessionId};
use zenoh::key_expr::KeyExpr;

/// Channel of a session keyexpr
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Host presence, no peer segment
    Host,
    /// Client presence
    Peer,
    /// Join handshake
    Join,
    /// Messages addressed to the host
    ToHost,
    /// Messages addressed to the clients
    ToClients,
}

impl Channel {
    fn as_str(self) -> &'static str {
        match self {
            Channel::Host => "host",
            Channel::Peer => "peer",
            Channel::Join => "join",
            Channel::ToHost => "to_host",
            Channel::ToClients => "to_clients",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "host" => Some(Channel::Host),
            "peer" => Some(Channel::Peer),
            "join" => Some(Channel::Join),
            "to_host" => Some(Channel::ToHost),
            "to_clients" => Some(Channel::ToClients),
            _ => None,
        }
    }
}

/// Parsed or constructed session keyexpr
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionKeyexpr {
    prefix: String,
    session: SessionId,
    channel: Channel,
    peer: Option<PeerId>,
}

impl SessionKeyexpr {
    pub fn new(
        prefix: impl Into<String>,
        session: SessionId,
        channel: Channel,
        peer: Option<PeerId>,
    ) -> Self {
        let peer = if channel == Channel::Host { None } else { peer };
        Self {
            prefix: prefix.into(),
            session,
            channel,
            peer,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn session(&self) -> &SessionId {
        &self.session
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// Peer segment, `None` when it is a wildcard or the channel has none
    pub fn peer(&self) -> Option<&PeerId> {
        self.peer.as_ref()
    }

    /// Build the zenoh keyexpr
    ///
    /// Fails if the prefix is not a valid keyexpr.
    pub fn to_keyexpr(&self) -> Result<KeyExpr<'static>> {
        let s = self.to_string();
        KeyExpr::try_from(s.clone())
            .map_err(|e| DuelError::InvalidKeyexpr(format!("{}: {}", s, e)))
    }
}

impl std::fmt::Display for SessionKeyexpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.prefix, self.session, self.channel.as_str())?;
        match (self.channel, &self.peer) {
            (Channel::Host, _) => Ok(()),
            (_, Some(peer)) => write!(f, "/{}", peer),
            (_, None) => write!(f, "/*"),
        }
    }
}

impl TryFrom<KeyExpr<'_>> for SessionKeyexpr {
    type Error = DuelError;

    fn try_from(keyexpr: KeyExpr<'_>) -> Result<Self> {
        let invalid = || DuelError::InvalidKeyexpr(keyexpr.as_str().to_string());
        let parts: Vec<&str> = keyexpr.as_str().split('/').collect();

        // [...prefix]/<session>/host
        if parts.len() >= 3 && parts[parts.len() - 1] == "host" {
            let session = SessionId::from_code(parts[parts.len() - 2]).map_err(|_| invalid())?;
            let prefix = parts[..parts.len() - 2].join("/");
            return Ok(Self::new(prefix, session, Channel::Host, None));
        }

        // [...prefix]/<session>/<channel>/<peer>
        if parts.len() < 4 {
            return Err(invalid());
        }
        let channel = Channel::parse(parts[parts.len() - 2])
            .filter(|c| *c != Channel::Host)
            .ok_or_else(invalid)?;
        let peer = match parts[parts.len() - 1] {
            "*" => None,
            name => Some(PeerId::from_name(name.to_string())?),
        };
        let session = SessionId::from_code(parts[parts.len() - 3]).map_err(|_| invalid())?;
        let prefix = parts[..parts.len() - 3].join("/");
        Ok(Self::new(prefix, session, channel, peer))
    }
}
