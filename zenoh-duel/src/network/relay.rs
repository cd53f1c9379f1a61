//! Zenoh-backed session provider
//!
//! A hosted session is a host liveliness token plus a join queryable under
//! `<prefix>/<session_id>`. Clients are admitted through the join handshake
//! and then announce themselves with their own liveliness token, which is
//! what the host treats as the client being connected.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::config::RelayConfig;
use crate::error::DuelError;
use crate::network::join_queryable::{request_join, JoinQueryable, JoinReply};
use crate::network::keyexpr::{Channel, SessionKeyexpr};
use crate::network::liveliness::{is_alive, Presence, PresenceToken, PresenceWatch};
use crate::network::publisher::SessionPublisher;
use crate::network::subscriber::SessionSubscriber;
use crate::protocol::PeerMessage;
use crate::transport::{HostedSession, LinkEvent, PeerLink, ProviderError, SessionProvider};
use crate::types::{PeerId, SessionId};

/// Attempts at drawing a session code nobody hosts yet
const ALLOCATE_ATTEMPTS: usize = 4;

fn unavailable(e: DuelError) -> ProviderError {
    ProviderError::Unavailable(e.to_string())
}

/// Session provider running over a zenoh session
#[derive(Debug, Clone)]
pub struct ZenohRelay {
    session: zenoh::Session,
    config: RelayConfig,
}

impl ZenohRelay {
    pub fn new(session: zenoh::Session, config: RelayConfig) -> Self {
        Self { session, config }
    }

    fn keyexpr(&self, id: &SessionId, channel: Channel, peer: Option<&PeerId>) -> SessionKeyexpr {
        SessionKeyexpr::new(
            self.config.keyexpr_prefix.clone(),
            id.clone(),
            channel,
            peer.cloned(),
        )
    }

    async fn is_hosted(&self, id: &SessionId) -> Result<bool, ProviderError> {
        is_alive(
            &self.session,
            &self.keyexpr(id, Channel::Host, None),
            self.config.query_timeout(),
        )
        .await
        .map_err(unavailable)
    }
}

#[async_trait]
impl SessionProvider for ZenohRelay {
    async fn allocate(
        &self,
        host: &PeerId,
        max_clients: usize,
    ) -> Result<HostedSession, ProviderError> {
        let mut id = SessionId::generate();
        let mut attempts = 1;
        while self.is_hosted(&id).await? {
            if attempts >= ALLOCATE_ATTEMPTS {
                return Err(ProviderError::Unavailable(
                    "could not draw a free session code".to_string(),
                ));
            }
            attempts += 1;
            id = SessionId::generate();
        }

        let session = &self.session;
        let joins = JoinQueryable::declare(session, &self.keyexpr(&id, Channel::Join, None))
            .await
            .map_err(unavailable)?;
        let members = Arc::new(Mutex::new(HashSet::new()));
        let admission = Admission(tokio::spawn(admit_clients(
            joins,
            members.clone(),
            max_clients,
            id.clone(),
        )));
        let channels = HostChannels {
            admission,
            peers: PresenceWatch::new(session, &self.keyexpr(&id, Channel::Peer, None))
                .await
                .map_err(unavailable)?,
            inbox: SessionSubscriber::new(session, &self.keyexpr(&id, Channel::ToHost, None))
                .await
                .map_err(unavailable)?,
            outbox: SessionPublisher::new(
                session,
                &self.keyexpr(&id, Channel::ToClients, Some(host)),
            )
            .await
            .map_err(unavailable)?,
            token: PresenceToken::declare(session, self.keyexpr(&id, Channel::Host, None))
                .await
                .map_err(unavailable)?,
        };
        tracing::info!("Relay: '{}' hosts session {}", host, id);

        Ok(HostedSession {
            id: id.clone(),
            link: Box::new(ZenohHostLink {
                session_id: id,
                peer: host.clone(),
                members,
                channels: Some(channels),
            }),
        })
    }

    async fn join(
        &self,
        id: &SessionId,
        peer: &PeerId,
    ) -> Result<Box<dyn PeerLink>, ProviderError> {
        let session = &self.session;
        let reply = request_join(
            session,
            &self.keyexpr(id, Channel::Join, Some(peer)),
            self.config.query_timeout(),
        )
        .await
        .map_err(unavailable)?;
        match reply {
            JoinReply::Accepted => {}
            JoinReply::Rejected(reason) => {
                tracing::debug!("Relay: join to {} rejected: {}", id, reason);
                return Err(ProviderError::SessionFull(id.clone()));
            }
            JoinReply::NoAnswer => return Err(ProviderError::SessionNotFound(id.clone())),
        }

        // Subscribe before announcing presence so the host's first messages land
        let inbox = SessionSubscriber::new(session, &self.keyexpr(id, Channel::ToClients, None))
            .await
            .map_err(unavailable)?;
        let host = PresenceWatch::new(session, &self.keyexpr(id, Channel::Host, None))
            .await
            .map_err(unavailable)?;
        let outbox = SessionPublisher::new(session, &self.keyexpr(id, Channel::ToHost, Some(peer)))
            .await
            .map_err(unavailable)?;
        let token = PresenceToken::declare(session, self.keyexpr(id, Channel::Peer, Some(peer)))
            .await
            .map_err(unavailable)?;
        tracing::info!("Relay: '{}' joined session {}", peer, id);

        Ok(Box::new(ZenohClientLink {
            session_id: id.clone(),
            peer: peer.clone(),
            connected: true,
            channels: Some(ClientChannels {
                host,
                inbox,
                outbox,
                token,
            }),
        }))
    }

    async fn probe_valid(&self, id: &SessionId) -> Result<bool, ProviderError> {
        self.is_hosted(id).await
    }
}

/// Answers join queries for a hosted session
///
/// A peer already seated may always rejoin; others are admitted while seats
/// are free.
async fn admit_clients(
    joins: JoinQueryable,
    members: Arc<Mutex<HashSet<PeerId>>>,
    max_clients: usize,
    session_id: SessionId,
) {
    loop {
        let request = match joins.expect_join().await {
            Ok(request) => request,
            Err(e) => {
                tracing::debug!("Relay: admission for {} stopped: {}", session_id, e);
                return;
            }
        };
        let peer = request.peer().clone();
        let admit = {
            let members = members.lock().unwrap_or_else(|e| e.into_inner());
            members.contains(&peer) || members.len() < max_clients
        };
        let result = if admit {
            request.accept().await.map(|_| ())
        } else {
            request.reject("session full").await
        };
        match result {
            Ok(()) if admit => tracing::debug!("Relay: admitted '{}' to {}", peer, session_id),
            Ok(()) => tracing::debug!("Relay: {} is full, refused '{}'", session_id, peer),
            Err(e) => tracing::warn!("Relay: failed to answer join of '{}': {}", peer, e),
        }
    }
}

/// Admission task, aborted with the link
struct Admission(tokio::task::JoinHandle<()>);

impl Drop for Admission {
    fn drop(&mut self) {
        self.0.abort();
    }
}

struct HostChannels {
    #[allow(dead_code)]
    admission: Admission,
    peers: PresenceWatch,
    inbox: SessionSubscriber<PeerMessage>,
    outbox: SessionPublisher<PeerMessage>,
    token: PresenceToken,
}

/// Input of a link's event loop
enum LinkInput {
    Presence(crate::error::Result<Presence>),
    Message(crate::error::Result<(PeerId, PeerMessage)>),
}

/// Host end of a zenoh relay session
pub struct ZenohHostLink {
    session_id: SessionId,
    peer: PeerId,
    members: Arc<Mutex<HashSet<PeerId>>>,
    channels: Option<HostChannels>,
}

impl ZenohHostLink {
    fn members(&self) -> std::sync::MutexGuard<'_, HashSet<PeerId>> {
        self.members.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl PeerLink for ZenohHostLink {
    async fn send(&mut self, message: &PeerMessage) -> Result<(), ProviderError> {
        let channels = self.channels.as_ref().ok_or(ProviderError::Closed)?;
        channels
            .outbox
            .put(message)
            .await
            .map_err(|e| ProviderError::Fault(e.to_string()))
    }

    async fn next_event(&mut self) -> Option<LinkEvent> {
        loop {
            let channels = self.channels.as_ref()?;
            let input = tokio::select! {
                presence = channels.peers.recv() => LinkInput::Presence(presence),
                message = channels.inbox.recv() => LinkInput::Message(message),
            };

            match input {
                LinkInput::Presence(Ok(Presence::Appeared(Some(peer)))) => {
                    if self.members().insert(peer.clone()) {
                        return Some(LinkEvent::PeerJoined(peer));
                    }
                }
                LinkInput::Presence(Ok(Presence::Vanished(Some(peer)))) => {
                    if self.members().remove(&peer) {
                        return Some(LinkEvent::PeerLeft(peer));
                    }
                }
                LinkInput::Presence(Ok(_)) => {}
                LinkInput::Message(Ok((from, message))) => {
                    return Some(LinkEvent::Message { from, message });
                }
                LinkInput::Message(Err(
                    e @ (DuelError::Serialization(_) | DuelError::InvalidKeyexpr(_)),
                )) => {
                    tracing::debug!("Relay: dropping malformed message: {}", e);
                }
                LinkInput::Presence(Err(e)) | LinkInput::Message(Err(e)) => {
                    tracing::warn!("Relay: host link of {} closed: {}", self.session_id, e);
                    self.channels = None;
                    return None;
                }
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.channels.is_some()
    }

    async fn shutdown(&mut self) {
        let Some(channels) = self.channels.take() else {
            return;
        };
        if let Err(e) = channels.token.undeclare().await {
            tracing::debug!("Relay: failed to undeclare host token: {}", e);
        }
        tracing::info!("Relay: '{}' closed session {}", self.peer, self.session_id);
    }
}

struct ClientChannels {
    host: PresenceWatch,
    inbox: SessionSubscriber<PeerMessage>,
    outbox: SessionPublisher<PeerMessage>,
    token: PresenceToken,
}

/// Client end of a zenoh relay session
pub struct ZenohClientLink {
    session_id: SessionId,
    peer: PeerId,
    connected: bool,
    channels: Option<ClientChannels>,
}

#[async_trait]
impl PeerLink for ZenohClientLink {
    async fn send(&mut self, message: &PeerMessage) -> Result<(), ProviderError> {
        if !self.connected {
            return Err(ProviderError::Closed);
        }
        let channels = self.channels.as_ref().ok_or(ProviderError::Closed)?;
        channels
            .outbox
            .put(message)
            .await
            .map_err(|e| ProviderError::Fault(e.to_string()))
    }

    async fn next_event(&mut self) -> Option<LinkEvent> {
        loop {
            let channels = self.channels.as_ref()?;
            let input = tokio::select! {
                presence = channels.host.recv() => LinkInput::Presence(presence),
                message = channels.inbox.recv() => LinkInput::Message(message),
            };

            match input {
                // A partition of our own looks the same as a host crash from here
                LinkInput::Presence(Ok(Presence::Vanished(_))) if self.connected => {
                    self.connected = false;
                    return Some(LinkEvent::ConnectionLost);
                }
                LinkInput::Presence(Ok(_)) => {}
                LinkInput::Message(Ok((from, message))) => {
                    return Some(LinkEvent::Message { from, message });
                }
                LinkInput::Message(Err(
                    e @ (DuelError::Serialization(_) | DuelError::InvalidKeyexpr(_)),
                )) => {
                    tracing::debug!("Relay: dropping malformed message: {}", e);
                }
                LinkInput::Presence(Err(e)) | LinkInput::Message(Err(e)) => {
                    tracing::warn!("Relay: client link of {} closed: {}", self.session_id, e);
                    self.connected = false;
                    self.channels = None;
                    return None;
                }
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connected && self.channels.is_some()
    }

    async fn shutdown(&mut self) {
        self.connected = false;
        let Some(channels) = self.channels.take() else {
            return;
        };
        if let Err(e) = channels.token.undeclare().await {
            tracing::debug!("Relay: failed to undeclare peer token: {}", e);
        }
        tracing::info!("Relay: '{}' left session {}", self.peer, self.session_id);
    }
}
