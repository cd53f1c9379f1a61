use std::sync::Arc;

use zenoh::Resolvable;

use crate::config::{RelayConfig, SessionConfig};
use crate::error::Result;
use crate::identity::AnonymousIdentity;
use crate::network::ZenohRelay;
use crate::session::driver::Session;
use crate::types::PeerId;

/// Extension trait for zenoh::Session to declare duel sessions
pub trait SessionExt {
    /// Declare a duel session relayed over this zenoh session
    ///
    /// # Example
    /// ```no_run
    /// use zenoh_duel::SessionExt;
    ///
    /// # async fn example() {
    /// let zenoh = zenoh::open(zenoh::Config::default()).await.unwrap();
    /// let mut session = zenoh
    ///     .declare_duel_session()
    ///     .ready_timeout_ms(20_000)
    ///     .await
    ///     .unwrap();
    /// session.handle().host_game().unwrap();
    /// # }
    /// ```
    fn declare_duel_session(&self) -> SessionBuilder<'_>;
}

impl SessionExt for zenoh::Session {
    fn declare_duel_session(&self) -> SessionBuilder<'_> {
        SessionBuilder::new(self)
    }
}

/// Builder for duel sessions
///
/// Allows configuring the session before creating it, similar to zenoh's builder pattern.
#[must_use = "Resolvables do nothing unless you resolve them using `.await` or `zenoh::Wait::wait`"]
pub struct SessionBuilder<'a> {
    session: &'a zenoh::Session,
    config: SessionConfig,
    relay: RelayConfig,
}

impl<'a> SessionBuilder<'a> {
    fn new(session: &'a zenoh::Session) -> Self {
        Self {
            session,
            config: SessionConfig::default(),
            relay: RelayConfig::default(),
        }
    }

    /// Set the peer name
    pub fn name(mut self, name: String) -> Result<Self> {
        PeerId::from_name(name.clone())?;
        self.config.peer_name = Some(name);
        Ok(self)
    }

    /// Replace the whole lifecycle configuration
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn ready_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.config.ready_timeout_ms = timeout_ms;
        self
    }

    pub fn grace_period_ms(mut self, grace_ms: u64) -> Self {
        self.config.grace_period_ms = grace_ms;
        self
    }

    pub fn max_reconnection_attempts(mut self, attempts: u32) -> Self {
        self.config.max_reconnection_attempts = attempts;
        self
    }

    /// Set the step timeout in milliseconds
    pub fn step_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.config.step_timeout_ms = timeout_ms;
        self
    }

    /// Set the key expression prefix of relay traffic
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.relay.keyexpr_prefix = prefix.into();
        self
    }

    /// Set the timeout of join queries and session probes
    pub fn query_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.relay.query_timeout_ms = timeout_ms;
        self
    }
}

impl<'a> Resolvable for SessionBuilder<'a> {
    type To = Result<Session>;
}

impl<'a> std::future::IntoFuture for SessionBuilder<'a> {
    type Output = <Self as Resolvable>::To;
    type IntoFuture =
        std::pin::Pin<Box<dyn std::future::Future<Output = Self::Output> + Send + 'a>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move {
            let relay = Arc::new(ZenohRelay::new(self.session.clone(), self.relay));
            let identity = match &self.config.peer_name {
                Some(name) => AnonymousIdentity::with_name(name.clone()),
                None => AnonymousIdentity::new(),
            };
            Session::new(self.config, relay, &identity).await
        })
    }
}
