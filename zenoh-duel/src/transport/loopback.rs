//! In-process relay for tests and local play

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use super::{HostedSession, LinkEvent, PeerLink, ProviderError, SessionProvider};
use crate::protocol::PeerMessage;
use crate::types::{PeerId, SessionId};

struct Endpoint {
    tx: flume::Sender<LinkEvent>,
    connected: Arc<AtomicBool>,
}

impl Endpoint {
    fn notify(&self, event: LinkEvent) {
        let _ = self.tx.send(event);
    }
}

struct LoopSession {
    host_id: PeerId,
    host: Endpoint,
    max_clients: usize,
    clients: HashMap<PeerId, Endpoint>,
}

struct RelayInner {
    available: bool,
    sessions: HashMap<SessionId, LoopSession>,
}

/// Relay that keeps every session in memory
///
/// Cloning yields another handle to the same relay, so a host and a client
/// built from clones share sessions.
#[derive(Clone)]
pub struct LoopbackRelay {
    inner: Arc<Mutex<RelayInner>>,
}

impl Default for LoopbackRelay {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackRelay {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(RelayInner {
                available: true,
                sessions: HashMap::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RelayInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make allocate/join/probe fail with `Unavailable`
    pub fn set_available(&self, available: bool) {
        self.lock().available = available;
    }

    /// Number of live sessions
    pub fn session_count(&self) -> usize {
        self.lock().sessions.len()
    }

    /// Abruptly drop a peer's link, as a network loss would
    ///
    /// Returns false if the peer is not in any session.
    pub fn sever(&self, peer: &PeerId) -> bool {
        let mut inner = self.lock();

        let hosted = inner
            .sessions
            .iter()
            .find(|(_, s)| &s.host_id == peer)
            .map(|(id, _)| id.clone());
        if let Some(id) = hosted {
            if let Some(session) = inner.sessions.remove(&id) {
                tracing::debug!("Loopback: severing host '{}' of session {}", peer, id);
                close_session(session, LinkEvent::ConnectionLost);
            }
            return true;
        }

        for session in inner.sessions.values_mut() {
            if let Some(endpoint) = session.clients.remove(peer) {
                tracing::debug!("Loopback: severing client '{}'", peer);
                endpoint.connected.store(false, Ordering::SeqCst);
                endpoint.notify(LinkEvent::ConnectionLost);
                session.host.notify(LinkEvent::PeerLeft(peer.clone()));
                return true;
            }
        }
        false
    }

    /// Make a host vanish without closing its session properly
    ///
    /// Clients only see their link drop, as they would when a host crashes
    /// behind a relay that cannot tell them why. Returns false if `peer`
    /// hosts no session.
    pub fn vanish_host(&self, peer: &PeerId) -> bool {
        let mut inner = self.lock();
        let hosted = inner
            .sessions
            .iter()
            .find(|(_, s)| &s.host_id == peer)
            .map(|(id, _)| id.clone());
        let Some(session) = hosted.and_then(|id| inner.sessions.remove(&id)) else {
            return false;
        };
        tracing::debug!("Loopback: host '{}' vanished", peer);
        session.host.connected.store(false, Ordering::SeqCst);
        for endpoint in session.clients.values() {
            endpoint.connected.store(false, Ordering::SeqCst);
            endpoint.notify(LinkEvent::ConnectionLost);
        }
        true
    }

    /// Deliver a transport fault to a peer
    pub fn inject_fault(&self, peer: &PeerId, reason: &str) -> bool {
        let inner = self.lock();
        for session in inner.sessions.values() {
            let endpoint = if &session.host_id == peer {
                Some(&session.host)
            } else {
                session.clients.get(peer)
            };
            if let Some(endpoint) = endpoint {
                endpoint.notify(LinkEvent::Fault(reason.to_string()));
                return true;
            }
        }
        false
    }
}

/// Tear down a removed session: the host gets `host_event`, clients see the host leave
fn close_session(session: LoopSession, host_event: LinkEvent) {
    session.host.connected.store(false, Ordering::SeqCst);
    session.host.notify(host_event);
    for endpoint in session.clients.values() {
        endpoint.connected.store(false, Ordering::SeqCst);
        endpoint.notify(LinkEvent::HostLeft);
    }
}

#[async_trait]
impl SessionProvider for LoopbackRelay {
    async fn allocate(
        &self,
        host: &PeerId,
        max_clients: usize,
    ) -> Result<HostedSession, ProviderError> {
        let mut inner = self.lock();
        if !inner.available {
            return Err(ProviderError::Unavailable("loopback relay offline".to_string()));
        }

        let mut id = SessionId::generate();
        while inner.sessions.contains_key(&id) {
            id = SessionId::generate();
        }

        let (tx, rx) = flume::unbounded();
        let connected = Arc::new(AtomicBool::new(true));
        inner.sessions.insert(
            id.clone(),
            LoopSession {
                host_id: host.clone(),
                host: Endpoint {
                    tx,
                    connected: connected.clone(),
                },
                max_clients,
                clients: HashMap::new(),
            },
        );

        let link = LoopbackLink {
            relay: self.clone(),
            session: id.clone(),
            peer: host.clone(),
            is_host: true,
            rx,
            connected,
        };
        Ok(HostedSession {
            id,
            link: Box::new(link),
        })
    }

    async fn join(
        &self,
        id: &SessionId,
        peer: &PeerId,
    ) -> Result<Box<dyn PeerLink>, ProviderError> {
        let mut inner = self.lock();
        if !inner.available {
            return Err(ProviderError::Unavailable("loopback relay offline".to_string()));
        }
        let session = inner
            .sessions
            .get_mut(id)
            .ok_or_else(|| ProviderError::SessionNotFound(id.clone()))?;

        if !session.clients.contains_key(peer) && session.clients.len() >= session.max_clients {
            return Err(ProviderError::SessionFull(id.clone()));
        }

        let (tx, rx) = flume::unbounded();
        let connected = Arc::new(AtomicBool::new(true));
        session.clients.insert(
            peer.clone(),
            Endpoint {
                tx,
                connected: connected.clone(),
            },
        );
        session.host.notify(LinkEvent::PeerJoined(peer.clone()));

        Ok(Box::new(LoopbackLink {
            relay: self.clone(),
            session: id.clone(),
            peer: peer.clone(),
            is_host: false,
            rx,
            connected,
        }))
    }

    async fn probe_valid(&self, id: &SessionId) -> Result<bool, ProviderError> {
        let inner = self.lock();
        if !inner.available {
            return Err(ProviderError::Unavailable("loopback relay offline".to_string()));
        }
        Ok(inner.sessions.contains_key(id))
    }
}

/// Link handed out by [`LoopbackRelay`]
pub struct LoopbackLink {
    relay: LoopbackRelay,
    session: SessionId,
    peer: PeerId,
    is_host: bool,
    rx: flume::Receiver<LinkEvent>,
    connected: Arc<AtomicBool>,
}

#[async_trait]
impl PeerLink for LoopbackLink {
    async fn send(&mut self, message: &PeerMessage) -> Result<(), ProviderError> {
        if !self.is_connected() {
            return Err(ProviderError::Closed);
        }
        let inner = self.relay.lock();
        let session = inner.sessions.get(&self.session).ok_or(ProviderError::Closed)?;
        let event = LinkEvent::Message {
            from: self.peer.clone(),
            message: message.clone(),
        };
        if self.is_host {
            for endpoint in session.clients.values() {
                endpoint.notify(event.clone());
            }
        } else {
            session.host.notify(event);
        }
        Ok(())
    }

    async fn next_event(&mut self) -> Option<LinkEvent> {
        self.rx.recv_async().await.ok()
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn shutdown(&mut self) {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return;
        }
        let mut inner = self.relay.lock();
        if self.is_host {
            if let Some(session) = inner.sessions.remove(&self.session) {
                tracing::debug!("Loopback: host '{}' closed session {}", self.peer, self.session);
                for endpoint in session.clients.values() {
                    endpoint.connected.store(false, Ordering::SeqCst);
                    endpoint.notify(LinkEvent::HostLeft);
                }
            }
        } else if let Some(session) = inner.sessions.get_mut(&self.session) {
            if session.clients.remove(&self.peer).is_some() {
                session.host.notify(LinkEvent::PeerLeft(self.peer.clone()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(name: &str) -> PeerId {
        PeerId::from_name(name.to_string()).unwrap()
    }

    #[tokio::test]
    async fn test_join_notifies_host() {
        let relay = LoopbackRelay::new();
        let mut hosted = relay.allocate(&peer("host"), 1).await.unwrap();
        let _client = relay.join(&hosted.id, &peer("guest")).await.unwrap();

        assert_eq!(
            hosted.link.next_event().await,
            Some(LinkEvent::PeerJoined(peer("guest")))
        );
    }

    #[tokio::test]
    async fn test_messages_flow_both_ways() {
        let relay = LoopbackRelay::new();
        let mut hosted = relay.allocate(&peer("host"), 1).await.unwrap();
        let mut client = relay.join(&hosted.id, &peer("guest")).await.unwrap();
        hosted.link.next_event().await;

        client.send(&PeerMessage::Ready).await.unwrap();
        assert_eq!(
            hosted.link.next_event().await,
            Some(LinkEvent::Message {
                from: peer("guest"),
                message: PeerMessage::Ready
            })
        );

        hosted.link.send(&PeerMessage::GameStarted).await.unwrap();
        assert_eq!(
            client.next_event().await,
            Some(LinkEvent::Message {
                from: peer("host"),
                message: PeerMessage::GameStarted
            })
        );
    }

    #[tokio::test]
    async fn test_unknown_code_and_capacity() {
        let relay = LoopbackRelay::new();
        let hosted = relay.allocate(&peer("host"), 1).await.unwrap();
        let missing = SessionId::from_code("nope").unwrap();

        assert_eq!(
            relay.join(&missing, &peer("guest")).await.err(),
            Some(ProviderError::SessionNotFound(missing))
        );
        let _first = relay.join(&hosted.id, &peer("guest")).await.unwrap();
        assert_eq!(
            relay.join(&hosted.id, &peer("other")).await.err(),
            Some(ProviderError::SessionFull(hosted.id.clone()))
        );
    }

    #[tokio::test]
    async fn test_sever_client() {
        let relay = LoopbackRelay::new();
        let mut hosted = relay.allocate(&peer("host"), 1).await.unwrap();
        let mut client = relay.join(&hosted.id, &peer("guest")).await.unwrap();
        hosted.link.next_event().await;

        assert!(relay.sever(&peer("guest")));
        assert!(!client.is_connected());
        assert_eq!(client.next_event().await, Some(LinkEvent::ConnectionLost));
        assert_eq!(
            hosted.link.next_event().await,
            Some(LinkEvent::PeerLeft(peer("guest")))
        );
        assert!(relay.probe_valid(&hosted.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_host_shutdown_removes_session() {
        let relay = LoopbackRelay::new();
        let mut hosted = relay.allocate(&peer("host"), 1).await.unwrap();
        let mut client = relay.join(&hosted.id, &peer("guest")).await.unwrap();

        hosted.link.shutdown().await;
        assert_eq!(relay.session_count(), 0);
        assert_eq!(client.next_event().await, Some(LinkEvent::HostLeft));
        assert!(!relay.probe_valid(&hosted.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_vanished_host_looks_like_local_loss() {
        let relay = LoopbackRelay::new();
        let hosted = relay.allocate(&peer("host"), 1).await.unwrap();
        let mut client = relay.join(&hosted.id, &peer("guest")).await.unwrap();

        assert!(relay.vanish_host(&peer("host")));
        assert!(!relay.vanish_host(&peer("host")));
        assert_eq!(client.next_event().await, Some(LinkEvent::ConnectionLost));
        assert!(!client.is_connected());
        assert!(!relay.probe_valid(&hosted.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_unavailable() {
        let relay = LoopbackRelay::new();
        relay.set_available(false);
        assert!(matches!(
            relay.allocate(&peer("host"), 1).await,
            Err(ProviderError::Unavailable(_))
        ));
    }
}
