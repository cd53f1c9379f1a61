//! Synchronous session lifecycle machine
//!
//! The machine owns every piece of session state and never performs I/O.
//! Inputs (commands, link events, countdown ticks, provider results) are
//! fed in by the driver; outputs are queued as [`Effect`]s that the driver
//! executes in order.

use std::time::Duration;

use crate::config::SessionConfig;
use crate::countdown::{CountdownEvent, CountdownId, Countdowns};
use crate::error::{DuelError, Result};
use crate::protocol::{PeerMessage, RefusalReason};
use crate::replicated::{ReplicatedState, StateStore};
use crate::signal::LifecycleSignal;
use crate::types::{Outcome, Phase, PeerId, Role, SessionId, SessionInfo};

/// Purpose of a countdown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerKind {
    ReadyTimeout,
    HostGrace,
    ClientGrace,
}

/// Instruction for the driver
#[derive(Debug)]
pub(crate) enum Effect {
    /// Send to the remote peer over the current link
    Send(PeerMessage),
    /// Raise to the presentation layer
    Signal(LifecycleSignal),
    /// Surface an operation failure
    Reject(DuelError),
    /// Check session validity after `delay`, answer with `on_probe_result(token, ..)`
    ProbeSession {
        token: u64,
        session_id: SessionId,
        delay: Duration,
    },
    /// Drop any in-flight probe
    CancelProbe,
    /// Rejoin `session_id`, settle, answer with `on_reconnect_result`
    Reconnect { session_id: SessionId },
    /// Drop any in-flight reconnect
    CancelReconnect,
    /// Shut down and drop the current link
    ReleaseLink,
    /// Stop the driver loop
    Shutdown,
}

/// Why a session was torn down by the remote side or the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Termination {
    HostTerminated,
    TransportFault(String),
}

impl Termination {
    pub(crate) fn to_error(&self) -> DuelError {
        match self {
            Termination::HostTerminated => DuelError::HostTerminated,
            Termination::TransportFault(reason) => DuelError::TransportFault(reason.clone()),
        }
    }
}

/// Session state for one local peer
pub struct SessionMachine {
    pub(super) config: SessionConfig,
    pub(super) local_id: PeerId,
    pub(super) phase: Phase,
    pub(super) role: Option<Role>,
    pub(super) session_id: Option<SessionId>,
    pub(super) store: StateStore,
    pub(super) countdowns: Countdowns<TimerKind>,
    pub(super) ready_timer: Option<CountdownId>,
    pub(super) grace_timer: Option<CountdownId>,

    /// Host: connected client. Client: host, once it spoke.
    pub(super) remote: Option<PeerId>,
    /// Host: owner of the client seat
    pub(super) known_client: Option<PeerId>,
    /// Host: ready submissions, indexed by role
    pub(super) ready_from: [bool; 2],
    pub(super) ready_submitted: bool,
    pub(super) pending_move: Option<(usize, usize)>,

    /// Host: a grace window was granted for the current disconnect
    pub(super) grace_granted: bool,
    /// Host: the current disconnect cycle is already in `reconnection_attempts`
    pub(super) cycle_counted: bool,

    /// Client: local link is down
    pub(super) link_lost: bool,
    pub(super) client_grace_remaining: Option<Duration>,
    /// Client: failed reconnect attempts in the current window
    pub(super) client_attempts: u32,
    pub(super) probe_token: Option<u64>,
    pub(super) next_probe_token: u64,
    pub(super) reconnecting: bool,

    pub(super) terminated: Option<Termination>,
    effects: Vec<Effect>,
}

impl SessionMachine {
    pub fn new(config: SessionConfig, local_id: PeerId) -> Self {
        let store = StateStore::new(Role::Host, config.grace_period());
        Self {
            config,
            local_id,
            phase: Phase::Idle,
            role: None,
            session_id: None,
            store,
            countdowns: Countdowns::new(),
            ready_timer: None,
            grace_timer: None,
            remote: None,
            known_client: None,
            ready_from: [false; 2],
            ready_submitted: false,
            pending_move: None,
            grace_granted: false,
            cycle_counted: false,
            link_lost: false,
            client_grace_remaining: None,
            client_attempts: 0,
            probe_token: None,
            next_probe_token: 0,
            reconnecting: false,
            terminated: None,
            effects: Vec::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn role(&self) -> Option<Role> {
        self.role
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    pub fn state(&self) -> &ReplicatedState {
        self.store.get()
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            phase: self.phase,
            role: self.role,
            session_id: self.session_id.clone(),
            state: self.store.get().clone(),
            pending_move: self.pending_move,
            client_grace_remaining: self.client_grace_remaining,
            link_lost: self.link_lost,
        }
    }

    pub(crate) fn drain_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    pub(super) fn push(&mut self, effect: Effect) {
        self.effects.push(effect);
    }

    pub(super) fn signal(&mut self, signal: LifecycleSignal) {
        tracing::debug!("Session '{}' signal: {:?}", self.local_id, signal);
        self.effects.push(Effect::Signal(signal));
    }

    pub(super) fn is_host(&self) -> bool {
        self.role == Some(Role::Host)
    }

    /// Whether messages can currently reach the remote peer
    pub(super) fn remote_reachable(&self) -> bool {
        match self.role {
            Some(Role::Host) => self.remote.is_some(),
            Some(Role::Client) => {
                !self.link_lost && !matches!(self.phase, Phase::Idle | Phase::Joining)
            }
            None => false,
        }
    }

    pub(super) fn send(&mut self, message: PeerMessage) {
        if self.remote_reachable() {
            self.effects.push(Effect::Send(message));
        } else {
            tracing::trace!(
                "Session '{}' dropping {} message, remote unreachable",
                self.local_id,
                message.kind()
            );
        }
    }

    /// Mutate the replicated state (host only) and replicate the snapshot
    pub(super) fn commit<F>(&mut self, f: F)
    where
        F: FnOnce(&mut ReplicatedState),
    {
        match self.store.mutate(f) {
            Ok(sync) => self.send(PeerMessage::State(sync)),
            Err(e) => tracing::error!("Session '{}' commit refused: {}", self.local_id, e),
        }
    }

    /// Fail operations that need a live session after a termination
    fn check_terminated(&self) -> Result<()> {
        match (&self.terminated, self.phase) {
            (Some(termination), Phase::Idle) => Err(termination.to_error()),
            _ => Ok(()),
        }
    }

    fn invalid_transition(&self, to: &str) -> DuelError {
        DuelError::InvalidStateTransition {
            from: self.phase.to_string(),
            to: to.to_string(),
        }
    }

    /// Forget the current session; effects already queued are kept
    pub(super) fn reset_session(&mut self) {
        if self.probe_token.take().is_some() {
            self.push(Effect::CancelProbe);
        }
        if self.reconnecting {
            self.push(Effect::CancelReconnect);
        }
        self.countdowns.clear();
        self.ready_timer = None;
        self.grace_timer = None;
        self.phase = Phase::Idle;
        self.role = None;
        self.session_id = None;
        self.store = StateStore::new(Role::Host, self.config.grace_period());
        self.remote = None;
        self.known_client = None;
        self.ready_from = [false; 2];
        self.ready_submitted = false;
        self.pending_move = None;
        self.grace_granted = false;
        self.cycle_counted = false;
        self.link_lost = false;
        self.client_grace_remaining = None;
        self.client_attempts = 0;
        self.reconnecting = false;
    }

    /// Tear the session down after the remote side or transport ended it
    pub(super) fn terminate(&mut self, termination: Termination) {
        tracing::warn!("Session '{}' terminated: {:?}", self.local_id, termination);
        self.push(Effect::ReleaseLink);
        self.reset_session();
        self.terminated = Some(termination);
    }

    // ---- lifecycle: allocation and join ----

    /// Prepare for hosting; an existing session is ended first
    pub fn begin_hosting(&mut self) -> Result<()> {
        match self.phase {
            Phase::Joining => return Err(self.invalid_transition("Hosted")),
            Phase::Idle => {}
            _ => {
                tracing::info!("Session '{}' ending current session before hosting", self.local_id);
                self.leave();
            }
        }
        self.terminated = None;
        Ok(())
    }

    /// Allocation succeeded
    pub fn hosted(&mut self, session_id: SessionId) {
        tracing::info!("Session '{}' hosting session {}", self.local_id, session_id);
        self.reset_session();
        self.terminated = None;
        self.phase = Phase::Hosted;
        self.role = Some(Role::Host);
        self.session_id = Some(session_id);
        self.store = StateStore::new(Role::Host, self.config.grace_period());
    }

    /// Allocation failed; stays idle
    pub fn host_failed(&mut self, error: DuelError) {
        tracing::warn!("Session '{}' failed to host: {}", self.local_id, error);
        self.reset_session();
        self.push(Effect::Reject(error));
    }

    /// Validate a join code and enter `Joining`
    pub fn begin_joining(&mut self, code: &str) -> Result<SessionId> {
        if self.phase != Phase::Idle {
            return Err(self.invalid_transition("Joining"));
        }
        let session_id = SessionId::from_code(code)?;
        self.terminated = None;
        self.phase = Phase::Joining;
        self.role = Some(Role::Client);
        self.session_id = Some(session_id.clone());
        self.store = StateStore::new(Role::Client, self.config.grace_period());
        tracing::info!("Session '{}' joining session {}", self.local_id, session_id);
        Ok(session_id)
    }

    /// Join succeeded
    pub fn joined(&mut self) {
        if self.phase == Phase::Joining {
            self.phase = Phase::WaitingForPeer;
        }
    }

    /// Join failed; back to idle
    pub fn join_failed(&mut self, error: DuelError) {
        tracing::warn!("Session '{}' failed to join: {}", self.local_id, error);
        self.reset_session();
        self.push(Effect::Reject(error));
    }

    /// Host: a peer joined the relay session
    pub fn on_peer_joined(&mut self, peer: PeerId) {
        if !self.is_host() || self.phase == Phase::Idle {
            return;
        }
        tracing::info!("Session '{}' peer '{}' joined", self.local_id, peer);

        match self.known_client.clone() {
            None => {
                self.known_client = Some(peer.clone());
                self.remote = Some(peer);
                self.open_handshake();
            }
            Some(known) if known == peer => {
                if self.store.get().disconnected {
                    self.accept_reconnection(peer);
                } else {
                    // Rejoin before the leave was observed
                    self.remote = Some(peer);
                    let sync = self.store.snapshot();
                    let game_started = sync.state.game_started;
                    self.send(PeerMessage::State(sync));
                    self.send(PeerMessage::Resumed { game_started });
                }
            }
            Some(_) => self.refuse(peer, RefusalReason::SessionFull),
        }
    }

    pub(super) fn refuse(&mut self, peer: PeerId, reason: RefusalReason) {
        tracing::warn!("Session '{}' refusing '{}': {:?}", self.local_id, peer, reason);
        // Refusals are addressed by peer id, the seat owner ignores them
        self.effects.push(Effect::Send(PeerMessage::Refused { peer, reason }));
    }

    /// Host: both peers connected, start the ready handshake
    pub(super) fn open_handshake(&mut self) {
        self.phase = Phase::ReadyHandshake;
        let sync = self.store.snapshot();
        self.send(PeerMessage::State(sync));
        self.send(PeerMessage::PeersConnected);
        self.signal(LifecycleSignal::PeersConnected);
        self.start_ready_timer();
    }

    pub(super) fn start_ready_timer(&mut self) {
        if let Some(id) = self.ready_timer.take() {
            self.countdowns.cancel(id);
        }
        let timeout = self.config.ready_timeout();
        self.ready_timer = Some(self.countdowns.start(TimerKind::ReadyTimeout, timeout));
    }

    pub(super) fn cancel_ready_timer(&mut self) {
        if let Some(id) = self.ready_timer.take() {
            self.countdowns.cancel(id);
        }
    }

    // ---- ready handshake ----

    /// Submit the local ready signal; a repeated submission is a no-op
    pub fn submit_ready(&mut self) -> Result<()> {
        self.check_terminated()?;
        if self.phase != Phase::ReadyHandshake {
            return Err(self.invalid_transition("Active"));
        }
        if self.role == Some(Role::Client) && self.link_lost {
            return Err(DuelError::PeerLost("not connected to the host".to_string()));
        }
        if self.ready_submitted {
            return Ok(());
        }
        self.ready_submitted = true;

        match self.role {
            Some(Role::Host) => self.register_ready(Role::Host),
            Some(Role::Client) => self.send(PeerMessage::Ready),
            None => return Err(DuelError::Internal("ready without a role".to_string())),
        }
        Ok(())
    }

    /// Host: count a ready signal once per role
    pub(super) fn register_ready(&mut self, role: Role) {
        if self.store.get().game_started || self.ready_from[role.index()] {
            return;
        }
        self.ready_from[role.index()] = true;

        self.commit(|s| {
            s.ready_count = s.ready_count.saturating_add(1);
            if s.ready_count >= 2 && !s.game_started {
                s.game_started = true;
                s.reset_game();
            }
        });
        tracing::info!(
            "Session '{}' {:?} ready ({}/2)",
            self.local_id,
            role,
            self.store.get().ready_count
        );

        if self.store.get().game_started {
            self.cancel_ready_timer();
            self.phase = Phase::Active;
            self.send(PeerMessage::GameStarted);
            self.signal(LifecycleSignal::GameStarted);
        }
    }

    fn on_ready_timeout(&mut self) {
        self.ready_timer = None;
        if self.phase == Phase::ReadyHandshake && self.store.get().ready_count < 2 {
            tracing::info!("Session '{}' ready handshake timed out", self.local_id);
            self.signal(LifecycleSignal::ReadyTimeout);
        }
    }

    // ---- turns ----

    /// Submit a move for the local role
    pub fn submit_move(&mut self, row: usize, col: usize) -> Result<()> {
        self.check_terminated()?;
        let role = self.role.ok_or_else(|| self.invalid_transition("Active"))?;
        match role {
            Role::Host => self.apply_move(Role::Host, row, col),
            Role::Client => {
                self.validate_move(Role::Client, row, col)?;
                if self.pending_move.is_some() {
                    return Err(DuelError::NotYourTurn(role));
                }
                if self.link_lost {
                    return Err(DuelError::PeerLost("not connected to the host".to_string()));
                }
                self.pending_move = Some((row, col));
                self.send(PeerMessage::Move { row, col });
                Ok(())
            }
        }
    }

    fn validate_move(&self, role: Role, row: usize, col: usize) -> Result<()> {
        let state = self.store.get();
        if state.game_finished || self.phase == Phase::Finished {
            return Err(DuelError::GameFinished);
        }
        if self.phase != Phase::Active {
            return Err(self.invalid_transition("Active"));
        }
        if state.current_turn != role {
            return Err(DuelError::NotYourTurn(role));
        }
        let mut board = state.board.clone();
        board.place(row, col, role)
    }

    /// Host: apply a validated move, then detect the outcome or flip the turn
    pub(super) fn apply_move(&mut self, role: Role, row: usize, col: usize) -> Result<()> {
        self.validate_move(role, row, col)?;

        let mut outcome = Outcome::Unresolved;
        self.commit(|s| {
            // Validated above
            let _ = s.board.place(row, col, role);
            outcome = s.board.outcome_at(row, col);
            if outcome == Outcome::Unresolved {
                s.current_turn = role.other();
            } else {
                s.outcome = outcome;
                s.game_finished = true;
            }
        });
        tracing::debug!(
            "Session '{}' {:?} played ({}, {})",
            self.local_id,
            role,
            row,
            col
        );

        if outcome != Outcome::Unresolved {
            self.announce_finished(outcome);
        }
        Ok(())
    }

    /// Host: move requested by the client
    pub(super) fn on_client_move(&mut self, row: usize, col: usize) {
        if let Err(e) = self.apply_move(Role::Client, row, col) {
            tracing::warn!(
                "Session '{}' rejected client move ({}, {}): {}",
                self.local_id,
                row,
                col,
                e
            );
            self.resync();
        }
    }

    /// Host: push the authoritative snapshot again
    pub(super) fn resync(&mut self) {
        // A bumped revision so the client does not discard it as stale
        self.commit(|_| {});
    }

    // ---- outcome ----

    /// Declare the outcome of the current game
    pub fn finish_game(&mut self, outcome: Outcome) -> Result<()> {
        self.check_terminated()?;
        if outcome == Outcome::Unresolved {
            return Err(DuelError::UnresolvedOutcome);
        }
        if self.store.get().game_finished || self.phase == Phase::Finished {
            return Err(DuelError::GameFinished);
        }
        if self.phase != Phase::Active {
            return Err(self.invalid_transition("Finished"));
        }
        match self.role {
            Some(Role::Host) => {
                self.commit(|s| {
                    s.outcome = outcome;
                    s.game_finished = true;
                });
                self.announce_finished(outcome);
            }
            Some(Role::Client) => self.send(PeerMessage::FinishRequest(outcome)),
            None => return Err(DuelError::Internal("finish without a role".to_string())),
        }
        Ok(())
    }

    /// Host: client proposed an outcome; honored only if the board agrees
    pub(super) fn on_finish_request(&mut self, outcome: Outcome) {
        let state = self.store.get();
        if self.phase != Phase::Active || state.game_finished {
            return;
        }
        if outcome != Outcome::Unresolved && state.board.evaluate() == outcome {
            self.commit(|s| {
                s.outcome = outcome;
                s.game_finished = true;
            });
            self.announce_finished(outcome);
        } else {
            tracing::warn!(
                "Session '{}' ignoring finish request {:?}, board disagrees",
                self.local_id,
                outcome
            );
            self.resync();
        }
    }

    fn announce_finished(&mut self, outcome: Outcome) {
        tracing::info!("Session '{}' game finished: {}", self.local_id, outcome);
        self.phase = Phase::Finished;
        self.send(PeerMessage::GameFinished(outcome));
        self.signal(LifecycleSignal::GameFinished);
    }

    // ---- restart ----

    /// Restart the game; clients forward the request to the host
    pub fn restart(&mut self) -> Result<()> {
        self.check_terminated()?;
        if !matches!(self.phase, Phase::Active | Phase::Finished) {
            return Err(self.invalid_transition("Active"));
        }
        match self.role {
            Some(Role::Host) => {
                self.restart_game();
                Ok(())
            }
            Some(Role::Client) => {
                self.send(PeerMessage::RestartRequest);
                Ok(())
            }
            None => Err(DuelError::Internal("restart without a role".to_string())),
        }
    }

    /// Host: respawn the board; a fresh game is left untouched
    pub(super) fn restart_game(&mut self) {
        if !matches!(self.phase, Phase::Active | Phase::Finished) {
            return;
        }
        if self.phase == Phase::Active && self.store.get().is_fresh_game() {
            tracing::debug!("Session '{}' restart ignored, game is fresh", self.local_id);
            return;
        }
        self.commit(|s| s.reset_game());
        self.phase = Phase::Active;
        self.send(PeerMessage::Restarted);
        self.signal(LifecycleSignal::GameRestarted);
        tracing::info!("Session '{}' game restarted", self.local_id);
    }

    // ---- teardown ----

    /// Leave the session and return to idle
    pub fn leave(&mut self) {
        if self.phase == Phase::Idle {
            return;
        }
        tracing::info!("Session '{}' leaving session", self.local_id);
        if self.is_host() && self.remote.is_some() {
            self.send(PeerMessage::HostLeaving);
        }
        self.push(Effect::ReleaseLink);
        self.reset_session();
    }

    /// Leave and stop the driver
    pub fn quit(&mut self) {
        self.leave();
        self.push(Effect::Shutdown);
    }

    // ---- inbound ----

    /// Message received from the remote peer
    pub fn on_message(&mut self, from: PeerId, message: PeerMessage) {
        tracing::trace!(
            "Session '{}' received {} from '{}'",
            self.local_id,
            message.kind(),
            from
        );
        match self.role {
            Some(Role::Host) => self.on_host_message(from, message),
            Some(Role::Client) => self.on_client_message(from, message),
            None => {}
        }
    }

    fn on_host_message(&mut self, from: PeerId, message: PeerMessage) {
        if self.remote.as_ref() != Some(&from) {
            tracing::debug!("Session '{}' ignoring message from '{}'", self.local_id, from);
            return;
        }
        match message {
            PeerMessage::Ready => {
                if self.phase == Phase::ReadyHandshake {
                    self.register_ready(Role::Client);
                }
            }
            PeerMessage::Move { row, col } => self.on_client_move(row, col),
            PeerMessage::FinishRequest(outcome) => self.on_finish_request(outcome),
            PeerMessage::RestartRequest => self.restart_game(),
            other => tracing::warn!(
                "Session '{}' unexpected {} from client",
                self.local_id,
                other.kind()
            ),
        }
    }

    fn on_client_message(&mut self, from: PeerId, message: PeerMessage) {
        match message {
            PeerMessage::State(sync) => match self.store.apply(sync) {
                Ok(true) => self.pending_move = None,
                Ok(false) => {}
                Err(e) => tracing::error!("Session '{}' snapshot refused: {}", self.local_id, e),
            },
            PeerMessage::PeersConnected => {
                self.remote = Some(from);
                if matches!(self.phase, Phase::WaitingForPeer | Phase::ReadyHandshake) {
                    self.phase = Phase::ReadyHandshake;
                    self.signal(LifecycleSignal::PeersConnected);
                    self.start_ready_timer();
                }
            }
            PeerMessage::GameStarted => {
                self.cancel_ready_timer();
                self.phase = Phase::Active;
                self.signal(LifecycleSignal::GameStarted);
            }
            PeerMessage::GameFinished(outcome) => {
                tracing::info!("Session '{}' game finished: {}", self.local_id, outcome);
                self.pending_move = None;
                self.phase = Phase::Finished;
                self.signal(LifecycleSignal::GameFinished);
            }
            PeerMessage::Restarted => {
                self.pending_move = None;
                self.phase = Phase::Active;
                self.signal(LifecycleSignal::GameRestarted);
            }
            PeerMessage::Resumed { game_started } => {
                self.remote = Some(from);
                self.on_resumed(game_started);
            }
            PeerMessage::Refused { peer, reason } => {
                if peer == self.local_id {
                    self.on_refused(reason);
                }
            }
            PeerMessage::HostLeaving => {
                tracing::info!("Session '{}' host is leaving", self.local_id);
                self.signal(LifecycleSignal::HostDisconnected);
                self.terminate(Termination::HostTerminated);
            }
            other => tracing::warn!(
                "Session '{}' unexpected {} from host",
                self.local_id,
                other.kind()
            ),
        }
    }

    // ---- time ----

    /// Advance countdowns by `elapsed`
    pub fn tick(&mut self, elapsed: Duration) {
        for event in self.countdowns.tick(elapsed) {
            match event {
                CountdownEvent::Tick { id, kind, remaining } => {
                    if !self.is_current_timer(id, kind) {
                        continue;
                    }
                    match kind {
                        TimerKind::ReadyTimeout => {}
                        TimerKind::HostGrace => self.on_host_grace_tick(remaining),
                        TimerKind::ClientGrace => self.client_grace_remaining = Some(remaining),
                    }
                }
                CountdownEvent::Complete { id, kind } => {
                    if !self.is_current_timer(id, kind) {
                        continue;
                    }
                    match kind {
                        TimerKind::ReadyTimeout => self.on_ready_timeout(),
                        TimerKind::HostGrace => self.on_host_grace_expired(),
                        TimerKind::ClientGrace => self.on_client_grace_expired(),
                    }
                }
            }
        }
    }

    /// Handles replaced or cancelled earlier in the same batch are stale
    fn is_current_timer(&self, id: CountdownId, kind: TimerKind) -> bool {
        match kind {
            TimerKind::ReadyTimeout => self.ready_timer == Some(id),
            TimerKind::HostGrace | TimerKind::ClientGrace => self.grace_timer == Some(id),
        }
    }
}
