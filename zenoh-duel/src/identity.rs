//! Local player identity

use std::sync::OnceLock;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::types::PeerId;

/// Signed-in identity of the local player
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Name used on the relay
    pub peer_id: PeerId,
    /// Opaque account identifier
    pub account: Uuid,
}

/// Source of the local player's identity
///
/// `ensure_signed_in` is idempotent: repeated calls return the same identity.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Sign in if needed and return the identity
    async fn ensure_signed_in(&self) -> Result<Identity>;
}

/// Anonymous sign-in with a generated name and account id
#[derive(Debug, Default)]
pub struct AnonymousIdentity {
    name: Option<String>,
    identity: OnceLock<Identity>,
}

impl AnonymousIdentity {
    /// Create a provider that generates a random name on first sign-in
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a provider with a fixed display name
    pub fn with_name(name: String) -> Self {
        Self {
            name: Some(name),
            identity: OnceLock::new(),
        }
    }
}

#[async_trait]
impl IdentityProvider for AnonymousIdentity {
    async fn ensure_signed_in(&self) -> Result<Identity> {
        if let Some(identity) = self.identity.get() {
            return Ok(identity.clone());
        }

        let peer_id = match &self.name {
            Some(name) => PeerId::from_name(name.clone())?,
            None => PeerId::generate(),
        };
        let identity = Identity {
            peer_id,
            account: Uuid::new_v4(),
        };
        tracing::info!(
            "Signed in anonymously as '{}' ({})",
            identity.peer_id,
            identity.account
        );
        Ok(self.identity.get_or_init(|| identity).clone())
    }
}
