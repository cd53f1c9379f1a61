//! Liveliness token management

use std::time::Duration;

use crate::error::{DuelError, Result};
use crate::network::keyexpr::SessionKeyexpr;
use crate::types::PeerId;
use zenoh::handlers::FifoChannelHandler;
use zenoh::liveliness::LivelinessToken;
use zenoh::pubsub::Subscriber;
use zenoh::sample::{Sample, SampleKind};

/// Presence of a host or client in a relay session
///
/// The token is automatically undeclared when dropped.
#[derive(Debug)]
pub struct PresenceToken {
    token: LivelinessToken,
    keyexpr: SessionKeyexpr,
}

impl PresenceToken {
    /// Declare a liveliness token on `keyexpr`
    pub async fn declare(session: &zenoh::Session, keyexpr: SessionKeyexpr) -> Result<Self> {
        let token = session
            .liveliness()
            .declare_token(keyexpr.to_keyexpr()?)
            .await
            .map_err(DuelError::Zenoh)?;
        tracing::debug!("Declared presence token '{}'", keyexpr);
        Ok(Self { token, keyexpr })
    }

    pub fn keyexpr(&self) -> &SessionKeyexpr {
        &self.keyexpr
    }

    /// Withdraw the token and wait for the undeclaration to complete
    pub async fn undeclare(self) -> Result<()> {
        tracing::debug!("Undeclaring presence token '{}'", self.keyexpr);
        self.token.undeclare().await.map_err(DuelError::Zenoh)
    }
}

/// Change of presence observed by a [`PresenceWatch`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Presence {
    /// Token appeared; carries the peer segment if the channel has one
    Appeared(Option<PeerId>),
    /// Token disappeared
    Vanished(Option<PeerId>),
}

/// Liveliness subscriber reporting tokens appearing and vanishing
///
/// Already declared tokens are reported as `Appeared` right after the watch
/// is created.
#[derive(Debug)]
pub struct PresenceWatch {
    subscriber: Subscriber<FifoChannelHandler<Sample>>,
}

impl PresenceWatch {
    pub async fn new(session: &zenoh::Session, keyexpr: &SessionKeyexpr) -> Result<Self> {
        let subscriber = session
            .liveliness()
            .declare_subscriber(keyexpr.to_keyexpr()?)
            .history(true)
            .await
            .map_err(DuelError::Zenoh)?;
        Ok(Self { subscriber })
    }

    /// Wait for the next presence change
    ///
    /// Samples whose keyexpr does not parse are skipped.
    pub async fn recv(&self) -> Result<Presence> {
        loop {
            let sample = self
                .subscriber
                .recv_async()
                .await
                .map_err(|e| DuelError::Internal(format!("Liveliness channel closed: {}", e)))?;

            let parsed = match SessionKeyexpr::try_from(sample.key_expr().clone()) {
                Ok(parsed) => parsed,
                Err(e) => {
                    tracing::debug!("Ignoring liveliness sample: {}", e);
                    continue;
                }
            };
            let peer = parsed.peer().cloned();
            return Ok(match sample.kind() {
                SampleKind::Put => Presence::Appeared(peer),
                SampleKind::Delete => Presence::Vanished(peer),
            });
        }
    }
}

/// Check whether any token matches `keyexpr` within `timeout`
pub async fn is_alive(
    session: &zenoh::Session,
    keyexpr: &SessionKeyexpr,
    timeout: Duration,
) -> Result<bool> {
    let replies = session
        .liveliness()
        .get(keyexpr.to_keyexpr()?)
        .timeout(timeout)
        .await
        .map_err(DuelError::Zenoh)?;

    while let Ok(reply) = replies.recv_async().await {
        if reply.result().is_ok() {
            return Ok(true);
        }
    }
    Ok(false)
}
