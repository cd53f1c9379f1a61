//! Disconnection and reconnection handling
//!
//! Host side: a client that drops gets a grace window unless the attempt
//! bound is reached. Client side: a lost link is followed by a delayed
//! session probe, then a self-driven grace window during which the player
//! may request reconnects.

use std::time::Duration;

use super::machine::{Effect, SessionMachine, Termination, TimerKind};
use crate::error::{DuelError, Result};
use crate::protocol::{PeerMessage, RefusalReason};
use crate::signal::LifecycleSignal;
use crate::types::{Phase, PeerId, Role};

impl SessionMachine {
    fn cancel_grace_timer(&mut self) {
        if let Some(id) = self.grace_timer.take() {
            self.countdowns.cancel(id);
        }
    }

    fn attempts_exhausted(&self) -> bool {
        let attempts = self.store.get().reconnection_attempts + self.client_attempts;
        attempts >= self.config.max_reconnection_attempts
    }

    // ---- host side ----

    /// Host: a client left the relay session
    pub fn on_peer_left(&mut self, peer: PeerId) {
        if !self.is_host() || self.remote.as_ref() != Some(&peer) {
            return;
        }
        self.remote = None;

        if self.store.get().game_finished {
            tracing::info!(
                "Session '{}' client '{}' left after the game finished",
                self.local_id,
                peer
            );
            return;
        }

        tracing::warn!("Session '{}' client '{}' disconnected", self.local_id, peer);
        self.cancel_ready_timer();
        self.cancel_grace_timer();
        self.cycle_counted = false;
        self.signal(LifecycleSignal::PlayerDisconnected);

        if self.attempts_exhausted() {
            self.grace_granted = false;
            self.commit(|s| {
                s.disconnected = true;
                s.grace_period_remaining = Duration::ZERO;
            });
            tracing::warn!(
                "Session '{}' reconnection attempts exhausted for '{}'",
                self.local_id,
                peer
            );
            self.signal(LifecycleSignal::ReconnectionExhausted);
            return;
        }

        let ceiling = self.config.grace_period();
        self.grace_granted = true;
        self.commit(|s| {
            s.disconnected = true;
            s.grace_period_remaining = ceiling;
        });
        self.grace_timer = Some(self.countdowns.start(TimerKind::HostGrace, ceiling));
        self.signal(LifecycleSignal::ClientDisconnectedHostView);
    }

    pub(super) fn on_host_grace_tick(&mut self, remaining: Duration) {
        if !self.store.get().disconnected {
            return;
        }
        self.commit(|s| {
            s.grace_period_remaining = s.grace_period_remaining.min(remaining);
        });
    }

    pub(super) fn on_host_grace_expired(&mut self) {
        self.grace_timer = None;
        if !self.store.get().disconnected {
            return;
        }
        let count_cycle = !self.cycle_counted;
        self.cycle_counted = true;
        self.commit(|s| {
            s.grace_period_remaining = Duration::ZERO;
            if count_cycle {
                s.reconnection_attempts += 1;
            }
        });
        tracing::warn!("Session '{}' client failed to reconnect in time", self.local_id);
        self.signal(LifecycleSignal::FailedToReconnectHostView);
    }

    /// Host: the seat owner rejoined while marked disconnected
    pub(super) fn accept_reconnection(&mut self, peer: PeerId) {
        if !self.grace_granted {
            self.refuse(peer, RefusalReason::ReconnectionExhausted);
            return;
        }

        tracing::info!("Session '{}' client '{}' reconnected", self.local_id, peer);
        self.cancel_grace_timer();
        self.remote = Some(peer);
        let count_cycle = !self.cycle_counted;
        self.cycle_counted = true;
        self.commit(|s| {
            s.disconnected = false;
            if count_cycle {
                s.reconnection_attempts += 1;
            }
        });

        let game_started = self.store.get().game_started;
        self.send(PeerMessage::Resumed { game_started });
        self.signal(LifecycleSignal::ClientReconnected);
        if game_started {
            self.signal(LifecycleSignal::GameResumed);
        } else {
            self.phase = Phase::ReadyHandshake;
            self.start_ready_timer();
        }
    }

    // ---- client side ----

    /// Client: the host left the session
    pub fn on_host_left(&mut self) {
        if self.role != Some(Role::Client) || self.phase == Phase::Idle {
            return;
        }
        tracing::warn!("Session '{}' host left the session", self.local_id);
        self.signal(LifecycleSignal::HostDisconnected);
        self.terminate(Termination::HostTerminated);
    }

    /// Client: the local link dropped
    pub fn on_link_lost(&mut self) {
        if self.role != Some(Role::Client)
            || self.link_lost
            || matches!(self.phase, Phase::Idle | Phase::Joining)
        {
            return;
        }
        let Some(session_id) = self.session_id.clone() else {
            return;
        };

        tracing::warn!("Session '{}' lost its connection", self.local_id);
        self.link_lost = true;
        self.remote = None;
        self.pending_move = None;
        self.cancel_ready_timer();
        self.cancel_grace_timer();
        self.client_grace_remaining = None;
        self.client_attempts = 0;
        self.push(Effect::ReleaseLink);
        self.signal(LifecycleSignal::PlayerDisconnected);

        // A new routine supersedes any probe still in flight
        if self.probe_token.is_some() {
            self.push(Effect::CancelProbe);
        }
        let token = self.next_probe_token;
        self.next_probe_token += 1;
        self.probe_token = Some(token);
        self.push(Effect::ProbeSession {
            token,
            session_id,
            delay: self.config.session_probe_delay(),
        });
    }

    /// Client: result of a session probe; stale tokens are ignored
    pub fn on_probe_result(&mut self, token: u64, valid: bool) {
        if self.probe_token != Some(token) {
            return;
        }
        self.probe_token = None;

        if !valid {
            tracing::warn!("Session '{}' session no longer exists", self.local_id);
            self.signal(LifecycleSignal::HostDisconnected);
            self.terminate(Termination::HostTerminated);
            return;
        }

        self.signal(LifecycleSignal::ClientDisconnectedClientView);
        if self.attempts_exhausted() {
            self.signal(LifecycleSignal::ReconnectionExhausted);
            return;
        }
        let ceiling = self.config.grace_period();
        self.client_grace_remaining = Some(ceiling);
        self.grace_timer = Some(self.countdowns.start(TimerKind::ClientGrace, ceiling));
    }

    /// Client: try to rejoin the session within the grace window
    pub fn request_reconnect(&mut self) -> Result<()> {
        if let (Some(termination), Phase::Idle) = (&self.terminated, self.phase) {
            return Err(termination.to_error());
        }
        if self.role != Some(Role::Client) {
            return Err(DuelError::NotClient);
        }
        if !self.link_lost {
            return Err(DuelError::InvalidStateTransition {
                from: self.phase.to_string(),
                to: "Reconnecting".to_string(),
            });
        }
        if self.probe_token.is_some() {
            return Err(DuelError::PeerLost(
                "still checking whether the session is open".to_string(),
            ));
        }
        if self.attempts_exhausted() {
            return Err(DuelError::ReconnectionExhausted);
        }
        if self.grace_timer.is_none() {
            return Err(DuelError::PeerLost("reconnection window closed".to_string()));
        }
        if self.reconnecting {
            return Ok(());
        }
        let Some(session_id) = self.session_id.clone() else {
            return Err(DuelError::Internal("reconnect without a session".to_string()));
        };

        tracing::info!("Session '{}' reconnecting to {}", self.local_id, session_id);
        self.reconnecting = true;
        self.push(Effect::ReleaseLink);
        self.push(Effect::Reconnect { session_id });
        Ok(())
    }

    /// Client: connection status after rejoin and settle delay
    pub fn on_reconnect_result(&mut self, connected: bool) {
        if !self.reconnecting {
            return;
        }
        self.reconnecting = false;

        if connected {
            self.clear_link_lost();
            return;
        }

        self.client_attempts += 1;
        tracing::warn!(
            "Session '{}' reconnection attempt {} failed",
            self.local_id,
            self.client_attempts
        );
        self.push(Effect::ReleaseLink);
        self.signal(LifecycleSignal::ReconnectAttemptFailed);
        if self.attempts_exhausted() && self.grace_timer.is_some() {
            self.cancel_grace_timer();
            self.client_grace_remaining = None;
            self.signal(LifecycleSignal::ReconnectionExhausted);
        }
    }

    fn clear_link_lost(&mut self) {
        if !self.link_lost {
            return;
        }
        if self.probe_token.take().is_some() {
            self.push(Effect::CancelProbe);
        }
        self.cancel_grace_timer();
        self.link_lost = false;
        self.client_grace_remaining = None;
        self.client_attempts = 0;
    }

    /// Client: host confirmed the (re)connection
    pub(super) fn on_resumed(&mut self, game_started: bool) {
        self.clear_link_lost();
        if game_started {
            self.phase = if self.store.get().game_finished {
                Phase::Finished
            } else {
                Phase::Active
            };
            self.signal(LifecycleSignal::GameResumed);
        } else {
            // A ready sent before the drop may never have arrived; the host dedupes
            self.ready_submitted = false;
            self.phase = Phase::ReadyHandshake;
            self.start_ready_timer();
            self.signal(LifecycleSignal::PeersConnected);
        }
    }

    /// Client: host refused this peer
    pub(super) fn on_refused(&mut self, reason: RefusalReason) {
        tracing::warn!("Session '{}' refused by host: {:?}", self.local_id, reason);
        match reason {
            RefusalReason::ReconnectionExhausted => {
                self.signal(LifecycleSignal::ReconnectionExhausted);
            }
            RefusalReason::SessionFull => {
                self.push(Effect::Reject(DuelError::ProviderUnavailable(
                    "session is full".to_string(),
                )));
            }
        }
        self.push(Effect::ReleaseLink);
        self.reset_session();
    }

    pub(super) fn on_client_grace_expired(&mut self) {
        self.grace_timer = None;
        self.client_grace_remaining = Some(Duration::ZERO);
        tracing::warn!("Session '{}' reconnection window expired", self.local_id);
        self.signal(LifecycleSignal::FailedToReconnectClientView);
    }

    // ---- both sides ----

    /// The local link reported loss of connectivity
    pub fn on_connection_lost(&mut self) {
        match self.role {
            Some(Role::Host) => self.on_transport_fault("relay link lost".to_string()),
            Some(Role::Client) => self.on_link_lost(),
            None => {}
        }
    }

    /// Transport-level failure; bypasses the grace period entirely
    pub fn on_transport_fault(&mut self, reason: String) {
        if self.phase == Phase::Idle {
            return;
        }
        if self.store.get().game_finished {
            tracing::info!(
                "Session '{}' ignoring transport fault after game end: {}",
                self.local_id,
                reason
            );
            return;
        }
        tracing::error!("Session '{}' transport fault: {}", self.local_id, reason);
        self.signal(LifecycleSignal::TransportFailure);
        self.terminate(Termination::TransportFault(reason));
    }

    /// Simulate an abrupt loss of the local transport
    pub fn drop_connection(&mut self) -> Result<()> {
        match self.role {
            _ if matches!(self.phase, Phase::Idle | Phase::Joining) => {
                Err(DuelError::InvalidStateTransition {
                    from: self.phase.to_string(),
                    to: "Disconnected".to_string(),
                })
            }
            Some(Role::Host) => {
                self.signal(LifecycleSignal::TransportFailure);
                self.terminate(Termination::TransportFault("connection dropped".to_string()));
                Ok(())
            }
            Some(Role::Client) => {
                self.on_link_lost();
                Ok(())
            }
            None => Err(DuelError::Internal("drop without a role".to_string())),
        }
    }
}
