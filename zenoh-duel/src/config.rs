//! Configuration for a duel session and its relay

use std::time::Duration;

/// Timing and bound parameters of the session lifecycle
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Optional peer name (auto-generated if None)
    pub peer_name: Option<String>,

    /// Ready handshake timeout (in milliseconds)
    pub ready_timeout_ms: u64,

    /// Reconnection grace window ceiling (in milliseconds)
    pub grace_period_ms: u64,

    /// Maximum number of reconnection cycles per session
    pub max_reconnection_attempts: u32,

    /// Delay before a client probes whether the session still exists (in milliseconds)
    pub session_probe_delay_ms: u64,

    /// Delay between a client rejoin and its connection check (in milliseconds)
    pub reconnect_settle_delay_ms: u64,

    /// Countdown tick granularity (in milliseconds)
    pub tick_interval_ms: u64,

    /// Upper bound for a single `step()` call (in milliseconds)
    pub step_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            peer_name: None,
            ready_timeout_ms: 30_000,
            grace_period_ms: 30_000,
            max_reconnection_attempts: 3,
            session_probe_delay_ms: 12_000,
            reconnect_settle_delay_ms: 5_000,
            tick_interval_ms: 100,
            step_timeout_ms: 1_000,
        }
    }
}

impl SessionConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the peer name
    pub fn with_peer_name(mut self, name: String) -> Self {
        self.peer_name = Some(name);
        self
    }

    /// Set the ready handshake timeout in milliseconds
    pub fn with_ready_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.ready_timeout_ms = timeout_ms;
        self
    }

    /// Set the reconnection grace period in milliseconds
    pub fn with_grace_period_ms(mut self, grace_ms: u64) -> Self {
        self.grace_period_ms = grace_ms;
        self
    }

    /// Set the maximum number of reconnection cycles
    pub fn with_max_reconnection_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnection_attempts = attempts;
        self
    }

    /// Set the session probe delay in milliseconds
    pub fn with_session_probe_delay_ms(mut self, delay_ms: u64) -> Self {
        self.session_probe_delay_ms = delay_ms;
        self
    }

    /// Set the reconnect settle delay in milliseconds
    pub fn with_reconnect_settle_delay_ms(mut self, delay_ms: u64) -> Self {
        self.reconnect_settle_delay_ms = delay_ms;
        self
    }

    /// Set the countdown tick interval in milliseconds (minimum 1)
    pub fn with_tick_interval_ms(mut self, interval_ms: u64) -> Self {
        self.tick_interval_ms = interval_ms.max(1);
        self
    }

    /// Set the step timeout in milliseconds
    pub fn with_step_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.step_timeout_ms = timeout_ms;
        self
    }

    pub(crate) fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    pub(crate) fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub(crate) fn session_probe_delay(&self) -> Duration {
        Duration::from_millis(self.session_probe_delay_ms)
    }

    pub(crate) fn reconnect_settle_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_settle_delay_ms)
    }

    pub(crate) fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub(crate) fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms)
    }
}

/// Configuration of the zenoh relay provider
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Key expression prefix for relay traffic
    pub keyexpr_prefix: String,

    /// Timeout for join queries and session probes (in milliseconds)
    pub query_timeout_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            keyexpr_prefix: "zenoh/duel".to_string(),
            query_timeout_ms: 3_000,
        }
    }
}

impl RelayConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the key expression prefix
    pub fn with_keyexpr_prefix(mut self, prefix: String) -> Self {
        self.keyexpr_prefix = prefix;
        self
    }

    /// Set the query timeout in milliseconds
    pub fn with_query_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.query_timeout_ms = timeout_ms;
        self
    }

    pub(crate) fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}
