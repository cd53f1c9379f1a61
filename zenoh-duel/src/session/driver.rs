//! Async driver around the session machine

use std::collections::VecDeque;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::time::Instant;

use super::machine::{Effect, SessionMachine};
use crate::config::SessionConfig;
use crate::error::{DuelError, Result};
use crate::identity::{Identity, IdentityProvider};
use crate::replicated::ReplicatedState;
use crate::signal::LifecycleSignal;
use crate::transport::{HostedSession, LinkEvent, PeerLink, ProviderError, SessionProvider};
use crate::types::{Outcome, Phase, PeerId, Role, SessionId, SessionInfo};

/// Clients admitted to a hosted session
const MAX_CLIENTS: usize = 1;

/// Commands that can be sent to the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    /// Allocate a new session and become its host
    Host,
    /// Join a session by code
    Join(String),
    /// Submit the local ready signal
    Ready,
    /// Play a move
    Move { row: usize, col: usize },
    /// Rejoin after losing the connection (client)
    Reconnect,
    /// Declare an outcome
    Finish(Outcome),
    /// Restart the game (client requests are forwarded)
    Restart,
    /// Leave the session, keep the driver running
    Leave,
    /// Simulate an abrupt loss of the local transport
    Disconnect,
    /// Leave the session and stop the driver
    Quit,
}

/// Result of a single `Session::step()`
#[derive(Debug)]
pub enum StepResult {
    /// Input processed; signals raised by it, possibly none
    Signals(Vec<LifecycleSignal>),
    /// An operation failed
    Rejected(DuelError),
    /// Nothing happened within the step timeout
    Timeout,
    /// The session was quit
    Stop,
}

enum Setup {
    Hosted(std::result::Result<HostedSession, ProviderError>),
    Joined(std::result::Result<Box<dyn PeerLink>, ProviderError>),
}

enum Input {
    Timeout,
    Tick,
    Link(Option<LinkEvent>),
    Command(SessionCommand),
    Setup(Setup),
    Probe(u64, bool),
    Reconnected(Option<Box<dyn PeerLink>>),
}

/// Cloneable handle exposing the public session operations
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: flume::Sender<SessionCommand>,
}

impl SessionHandle {
    fn send(&self, command: SessionCommand) -> Result<()> {
        self.tx
            .send(command)
            .map_err(|_| DuelError::Internal("session driver stopped".to_string()))
    }

    pub fn host_game(&self) -> Result<()> {
        self.send(SessionCommand::Host)
    }

    pub fn join_game(&self, code: impl Into<String>) -> Result<()> {
        self.send(SessionCommand::Join(code.into()))
    }

    pub fn submit_ready(&self) -> Result<()> {
        self.send(SessionCommand::Ready)
    }

    pub fn submit_move(&self, row: usize, col: usize) -> Result<()> {
        self.send(SessionCommand::Move { row, col })
    }

    pub fn request_reconnect(&self) -> Result<()> {
        self.send(SessionCommand::Reconnect)
    }

    pub fn finish_game(&self, outcome: Outcome) -> Result<()> {
        self.send(SessionCommand::Finish(outcome))
    }

    pub fn restart(&self) -> Result<()> {
        self.send(SessionCommand::Restart)
    }

    pub fn leave(&self) -> Result<()> {
        self.send(SessionCommand::Leave)
    }

    pub fn drop_connection(&self) -> Result<()> {
        self.send(SessionCommand::Disconnect)
    }

    pub fn quit(&self) -> Result<()> {
        self.send(SessionCommand::Quit)
    }
}

/// A peer's view of a two-player relay session
///
/// Call [`Session::step`] in a loop. Each step waits for one input (a
/// countdown tick, a link event, a command or a finished provider call),
/// feeds it to the lifecycle machine and executes the resulting effects.
pub struct Session {
    machine: SessionMachine,
    provider: Arc<dyn SessionProvider>,
    identity: Identity,
    link: Option<Box<dyn PeerLink>>,
    command_tx: flume::Sender<SessionCommand>,
    command_rx: flume::Receiver<SessionCommand>,
    setup: Option<BoxFuture<'static, Setup>>,
    probe: Option<BoxFuture<'static, (u64, bool)>>,
    reconnect: Option<BoxFuture<'static, Option<Box<dyn PeerLink>>>>,
    last_tick: Instant,
    next_tick: Instant,
    deferred: VecDeque<StepResult>,
    stopped: bool,
}

impl Session {
    /// Sign in and create an idle session
    pub async fn new(
        config: SessionConfig,
        provider: Arc<dyn SessionProvider>,
        identity_provider: &dyn IdentityProvider,
    ) -> Result<Self> {
        let identity = identity_provider.ensure_signed_in().await?;
        tracing::info!("Session '{}' initialized", identity.peer_id);

        let (command_tx, command_rx) = flume::unbounded();
        let now = Instant::now();
        let next_tick = now + config.tick_interval();
        Ok(Self {
            machine: SessionMachine::new(config, identity.peer_id.clone()),
            provider,
            identity,
            link: None,
            command_tx,
            command_rx,
            setup: None,
            probe: None,
            reconnect: None,
            last_tick: now,
            next_tick,
            deferred: VecDeque::new(),
            stopped: false,
        })
    }

    /// Local peer id
    pub fn id(&self) -> &PeerId {
        &self.identity.peer_id
    }

    /// Signed-in identity
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn phase(&self) -> Phase {
        self.machine.phase()
    }

    pub fn role(&self) -> Option<Role> {
        self.machine.role()
    }

    /// Join code of the current session
    pub fn session_id(&self) -> Option<&SessionId> {
        self.machine.session_id()
    }

    /// Local view of the replicated state
    pub fn state(&self) -> &ReplicatedState {
        self.machine.state()
    }

    /// Snapshot for rendering
    pub fn info(&self) -> SessionInfo {
        self.machine.info()
    }

    /// Handle for issuing operations from other tasks
    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            tx: self.command_tx.clone(),
        }
    }

    /// Process one input
    pub async fn step(&mut self) -> Result<StepResult> {
        if let Some(result) = self.deferred.pop_front() {
            return Ok(result);
        }
        if self.stopped {
            return Ok(StepResult::Stop);
        }

        let step_timeout = self.machine.config.step_timeout();
        // Pending work goes first; a due tick must not starve it
        let input = tokio::select! {
            biased;
            command = self.command_rx.recv_async() => match command {
                Ok(command) => Input::Command(command),
                Err(_) => Input::Command(SessionCommand::Quit),
            },
            setup = poll_slot(&mut self.setup) => Input::Setup(setup),
            event = next_link_event(&mut self.link) => Input::Link(event),
            (token, valid) = poll_slot(&mut self.probe) => Input::Probe(token, valid),
            link = poll_slot(&mut self.reconnect) => Input::Reconnected(link),
            _ = tokio::time::sleep_until(self.next_tick) => Input::Tick,
            _ = tokio::time::sleep(step_timeout) => Input::Timeout,
        };

        match input {
            Input::Timeout => return Ok(StepResult::Timeout),
            Input::Tick => self.tick(),
            Input::Link(Some(event)) => self.on_link_event(event),
            Input::Link(None) => {
                tracing::debug!("Session '{}' link closed", self.id());
                self.link = None;
                if self.machine.phase() != Phase::Idle {
                    self.machine.on_connection_lost();
                }
            }
            Input::Command(command) => {
                if let Err(e) = self.on_command(command) {
                    tracing::debug!("Session '{}' command rejected: {}", self.id(), e);
                    self.deferred.push_back(StepResult::Rejected(e));
                }
            }
            Input::Setup(setup) => self.on_setup(setup),
            Input::Probe(token, valid) => self.machine.on_probe_result(token, valid),
            Input::Reconnected(link) => self.on_reconnected(link).await,
        }

        let signals = self.apply_effects().await;
        if !signals.is_empty() {
            return Ok(StepResult::Signals(signals));
        }
        if let Some(result) = self.deferred.pop_front() {
            return Ok(result);
        }
        if self.stopped {
            return Ok(StepResult::Stop);
        }
        Ok(StepResult::Signals(signals))
    }

    fn tick(&mut self) {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(self.last_tick);
        self.last_tick = now;
        self.next_tick = now + self.machine.config.tick_interval();
        self.machine.tick(elapsed);
    }

    fn on_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::PeerJoined(peer) => self.machine.on_peer_joined(peer),
            LinkEvent::PeerLeft(peer) => self.machine.on_peer_left(peer),
            LinkEvent::HostLeft => self.machine.on_host_left(),
            LinkEvent::Message { from, message } => self.machine.on_message(from, message),
            LinkEvent::ConnectionLost => self.machine.on_connection_lost(),
            LinkEvent::Fault(reason) => self.machine.on_transport_fault(reason),
        }
    }

    fn on_command(&mut self, command: SessionCommand) -> Result<()> {
        match command {
            SessionCommand::Host => {
                self.ensure_no_setup()?;
                self.machine.begin_hosting()?;
                let provider = self.provider.clone();
                let host = self.identity.peer_id.clone();
                tracing::info!("Session '{}' allocating a session", host);
                self.setup = Some(
                    async move { Setup::Hosted(provider.allocate(&host, MAX_CLIENTS).await) }
                        .boxed(),
                );
            }
            SessionCommand::Join(code) => {
                self.ensure_no_setup()?;
                let session_id = self.machine.begin_joining(&code)?;
                let provider = self.provider.clone();
                let peer = self.identity.peer_id.clone();
                self.setup = Some(
                    async move { Setup::Joined(provider.join(&session_id, &peer).await) }.boxed(),
                );
            }
            SessionCommand::Ready => self.machine.submit_ready()?,
            SessionCommand::Move { row, col } => self.machine.submit_move(row, col)?,
            SessionCommand::Reconnect => self.machine.request_reconnect()?,
            SessionCommand::Finish(outcome) => self.machine.finish_game(outcome)?,
            SessionCommand::Restart => self.machine.restart()?,
            SessionCommand::Leave => {
                self.setup = None;
                self.machine.leave();
            }
            SessionCommand::Disconnect => self.machine.drop_connection()?,
            SessionCommand::Quit => {
                self.setup = None;
                self.machine.quit();
            }
        }
        Ok(())
    }

    fn ensure_no_setup(&self) -> Result<()> {
        if self.setup.is_some() {
            return Err(DuelError::InvalidStateTransition {
                from: "allocating".to_string(),
                to: "new session".to_string(),
            });
        }
        Ok(())
    }

    fn on_setup(&mut self, setup: Setup) {
        match setup {
            Setup::Hosted(Ok(hosted)) => {
                self.link = Some(hosted.link);
                self.machine.hosted(hosted.id);
            }
            Setup::Hosted(Err(e)) => self.machine.host_failed(e.into()),
            Setup::Joined(Ok(link)) => {
                self.link = Some(link);
                self.machine.joined();
            }
            Setup::Joined(Err(e)) => self.machine.join_failed(e.into()),
        }
    }

    async fn on_reconnected(&mut self, link: Option<Box<dyn PeerLink>>) {
        match link {
            Some(link) if link.is_connected() => {
                self.link = Some(link);
                self.machine.on_reconnect_result(true);
            }
            Some(mut link) => {
                link.shutdown().await;
                self.machine.on_reconnect_result(false);
            }
            None => self.machine.on_reconnect_result(false),
        }
    }

    async fn apply_effects(&mut self) -> Vec<LifecycleSignal> {
        let mut signals = Vec::new();
        for effect in self.machine.drain_effects() {
            match effect {
                Effect::Send(message) => {
                    if let Some(link) = self.link.as_mut() {
                        if let Err(e) = link.send(&message).await {
                            tracing::warn!(
                                "Session '{}' failed to send {}: {}",
                                self.identity.peer_id,
                                message.kind(),
                                e
                            );
                        }
                    }
                }
                Effect::Signal(signal) => signals.push(signal),
                Effect::Reject(error) => self.deferred.push_back(StepResult::Rejected(error)),
                Effect::ProbeSession {
                    token,
                    session_id,
                    delay,
                } => {
                    let provider = self.provider.clone();
                    self.probe = Some(
                        async move {
                            tokio::time::sleep(delay).await;
                            let valid = match provider.probe_valid(&session_id).await {
                                Ok(valid) => valid,
                                Err(e) => {
                                    tracing::warn!("Session probe for {} failed: {}", session_id, e);
                                    false
                                }
                            };
                            (token, valid)
                        }
                        .boxed(),
                    );
                }
                Effect::CancelProbe => self.probe = None,
                Effect::Reconnect { session_id } => {
                    let provider = self.provider.clone();
                    let peer = self.identity.peer_id.clone();
                    let settle = self.machine.config.reconnect_settle_delay();
                    self.reconnect = Some(
                        async move {
                            match provider.join(&session_id, &peer).await {
                                Ok(link) => {
                                    tokio::time::sleep(settle).await;
                                    Some(link)
                                }
                                Err(e) => {
                                    tracing::warn!("Rejoin of {} failed: {}", session_id, e);
                                    None
                                }
                            }
                        }
                        .boxed(),
                    );
                }
                Effect::CancelReconnect => self.reconnect = None,
                Effect::ReleaseLink => {
                    if let Some(mut link) = self.link.take() {
                        link.shutdown().await;
                    }
                }
                Effect::Shutdown => self.stopped = true,
            }
        }
        signals
    }
}

async fn next_link_event(link: &mut Option<Box<dyn PeerLink>>) -> Option<LinkEvent> {
    match link.as_mut() {
        Some(link) => link.next_event().await,
        None => std::future::pending().await,
    }
}

/// Await an optional in-flight future, clearing the slot once it completes
///
/// Dropping the returned future leaves the slot untouched, so progress made
/// by the inner future is kept across `select!` iterations.
async fn poll_slot<T>(slot: &mut Option<BoxFuture<'static, T>>) -> T {
    match slot.as_mut() {
        Some(fut) => {
            let output = fut.await;
            *slot = None;
            output
        }
        None => std::future::pending().await,
    }
}
