//! Publisher for messages on a session channel

use crate::error::{DuelError, Result};
use crate::network::keyexpr::SessionKeyexpr;

/// Publishes to a session keyexpr with automatic serialization
///
/// The keyexpr carries the sender in its peer segment, so receivers learn
/// who sent a message without it being part of the payload.
pub struct SessionPublisher<T> {
    publisher: zenoh::pubsub::Publisher<'static>,
    _phantom: std::marker::PhantomData<T>,
}

impl<T> std::fmt::Debug for SessionPublisher<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionPublisher")
            .field("type", &std::any::type_name::<T>())
            .field("key_expr", &self.publisher.key_expr())
            .finish()
    }
}

impl<T> SessionPublisher<T>
where
    T: zenoh_ext::Serialize,
{
    /// Declare a publisher on `keyexpr`, which must name a specific sender
    pub async fn new(session: &zenoh::Session, keyexpr: &SessionKeyexpr) -> Result<Self> {
        if keyexpr.peer().is_none() {
            return Err(DuelError::InvalidKeyexpr(format!(
                "publisher needs a sender segment: {}",
                keyexpr
            )));
        }
        let publisher = session
            .declare_publisher(keyexpr.to_keyexpr()?)
            .await
            .map_err(DuelError::Zenoh)?;

        Ok(Self {
            publisher,
            _phantom: std::marker::PhantomData,
        })
    }

    /// Serialize and publish a value
    pub async fn put(&self, value: &T) -> Result<()> {
        let payload = zenoh_ext::z_serialize(value);

        self.publisher
            .put(payload)
            .await
            .map_err(DuelError::Zenoh)?;

        Ok(())
    }
}
