//! Join handshake between a client and the host of a session
//!
//! The host declares a queryable on `<prefix>/<session>/join/*`. A client
//! sends a query to `<prefix>/<session>/join/<client_id>`:
//!
//! - an ok reply admits the client
//! - an error reply carries the refusal reason (the session is full)
//! - no reply within the timeout means nobody hosts that session

use std::time::Duration;

use crate::error::{DuelError, Result};
use crate::network::keyexpr::{Channel, SessionKeyexpr};
use crate::types::PeerId;
use zenoh::query::{Query, Queryable};

/// Join request received by the host
#[derive(Debug)]
pub struct JoinRequest {
    query: Query,
    peer: PeerId,
}

impl JoinRequest {
    /// Admit the client
    pub async fn accept(self) -> Result<PeerId> {
        // The query names a specific peer, so replying on its keyexpr is safe
        let keyexpr = self.query.key_expr().clone();
        self.query
            .reply(keyexpr, "")
            .await
            .map_err(DuelError::Zenoh)?;
        Ok(self.peer)
    }

    /// Refuse the client with a reason
    pub async fn reject(self, reason: &str) -> Result<()> {
        self.query
            .reply_err(reason)
            .await
            .map_err(DuelError::Zenoh)?;
        Ok(())
    }

    pub fn peer(&self) -> &PeerId {
        &self.peer
    }
}

/// Host side of the join handshake
#[derive(Debug)]
pub struct JoinQueryable {
    queryable: Queryable<zenoh::handlers::FifoChannelHandler<Query>>,
}

impl JoinQueryable {
    /// Declare the queryable for the session named by `keyexpr`
    pub async fn declare(session: &zenoh::Session, keyexpr: &SessionKeyexpr) -> Result<Self> {
        let pattern = SessionKeyexpr::new(
            keyexpr.prefix(),
            keyexpr.session().clone(),
            Channel::Join,
            None,
        );
        let queryable = session
            .declare_queryable(pattern.to_keyexpr()?)
            .await
            .map_err(DuelError::Zenoh)?;
        Ok(Self { queryable })
    }

    /// Wait for the next well-formed join request
    ///
    /// Queries on a wildcard or unparsable keyexpr are answered with an error
    /// and skipped.
    pub async fn expect_join(&self) -> Result<JoinRequest> {
        loop {
            let query = self
                .queryable
                .recv_async()
                .await
                .map_err(|_| DuelError::Internal("Queryable channel closed".to_string()))?;

            let peer = SessionKeyexpr::try_from(query.key_expr().clone())
                .ok()
                .filter(|ke| ke.channel() == Channel::Join)
                .and_then(|ke| ke.peer().cloned());
            match peer {
                Some(peer) => return Ok(JoinRequest { query, peer }),
                None => {
                    tracing::debug!("Invalid join query: {}", query.key_expr().as_str());
                    if let Err(e) = query.reply_err("invalid join request").await {
                        tracing::debug!("Failed to reply to join query: {}", e);
                    }
                }
            }
        }
    }
}

/// Answer to a join query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinReply {
    Accepted,
    Rejected(String),
    NoAnswer,
}

/// Client side of the join handshake
///
/// `keyexpr` must be the join keyexpr carrying the requesting peer.
pub async fn request_join(
    session: &zenoh::Session,
    keyexpr: &SessionKeyexpr,
    timeout: Duration,
) -> Result<JoinReply> {
    if keyexpr.channel() != Channel::Join || keyexpr.peer().is_none() {
        return Err(DuelError::InvalidKeyexpr(format!("not a join request: {}", keyexpr)));
    }
    let replies = session
        .get(keyexpr.to_keyexpr()?)
        .timeout(timeout)
        .await
        .map_err(DuelError::Zenoh)?;

    let mut answer = JoinReply::NoAnswer;
    while let Ok(reply) = replies.recv_async().await {
        match reply.result() {
            Ok(_) => return Ok(JoinReply::Accepted),
            Err(e) => {
                let reason = e
                    .payload()
                    .try_to_string()
                    .map(|s| s.into_owned())
                    .unwrap_or_else(|_| "refused".to_string());
                tracing::debug!("Join to '{}' refused: {}", keyexpr, reason);
                answer = JoinReply::Rejected(reason);
            }
        }
    }
    Ok(answer)
}
