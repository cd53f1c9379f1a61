//! Subscriber for session messages with deserialization

use crate::error::{DuelError, Result};
use crate::network::keyexpr::SessionKeyexpr;
use crate::types::PeerId;

/// Subscribes to a session channel and deserializes received data
///
/// Subscribes with a wildcard sender, e.g. `<prefix>/<session>/to_host/*`.
/// [`recv`](Self::recv) returns the sender parsed from the sample keyexpr
/// together with the value.
pub struct SessionSubscriber<T> {
    subscriber:
        zenoh::pubsub::Subscriber<zenoh::handlers::FifoChannelHandler<zenoh::sample::Sample>>,
    _phantom: std::marker::PhantomData<T>,
}

impl<T> std::fmt::Debug for SessionSubscriber<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSubscriber")
            .field("type", &std::any::type_name::<T>())
            .field("key_expr", &self.subscriber.key_expr())
            .finish()
    }
}

impl<T> SessionSubscriber<T>
where
    T: zenoh_ext::Deserialize,
{
    pub async fn new(session: &zenoh::Session, keyexpr: &SessionKeyexpr) -> Result<Self> {
        let subscriber = session
            .declare_subscriber(keyexpr.to_keyexpr()?)
            .await
            .map_err(DuelError::Zenoh)?;

        Ok(Self {
            subscriber,
            _phantom: std::marker::PhantomData,
        })
    }

    /// Receive the next value and its sender
    pub async fn recv(&self) -> Result<(PeerId, T)> {
        let sample = self
            .subscriber
            .recv_async()
            .await
            .map_err(|e| DuelError::Internal(format!("Failed to receive sample: {}", e)))?;

        let keyexpr = SessionKeyexpr::try_from(sample.key_expr().clone())?;
        let sender = keyexpr.peer().cloned().ok_or_else(|| {
            DuelError::Internal(format!(
                "Received sample with wildcard sender in keyexpr '{}'",
                sample.key_expr()
            ))
        })?;

        let value: T = zenoh_ext::z_deserialize(sample.payload())
            .map_err(|e| DuelError::Serialization(format!("Failed to deserialize: {}", e)))?;

        Ok((sender, value))
    }
}
