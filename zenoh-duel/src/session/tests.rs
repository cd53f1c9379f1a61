//! Machine-level tests: a host and a client machine wired back to back

use std::time::Duration;

use super::machine::{Effect, SessionMachine};
use crate::config::SessionConfig;
use crate::error::DuelError;
use crate::protocol::PeerMessage;
use crate::signal::LifecycleSignal;
use crate::types::{Outcome, Phase, PeerId, Role, SessionId};

const TICK: Duration = Duration::from_millis(100);

fn config() -> SessionConfig {
    SessionConfig::new()
        .with_ready_timeout_ms(1_000)
        .with_grace_period_ms(1_000)
        .with_max_reconnection_attempts(3)
}

fn peer(name: &str) -> PeerId {
    PeerId::from_name(name.to_string()).unwrap()
}

struct Pair {
    host: SessionMachine,
    client: SessionMachine,
    host_signals: Vec<LifecycleSignal>,
    client_signals: Vec<LifecycleSignal>,
    host_effects: Vec<Effect>,
    client_effects: Vec<Effect>,
    connected: bool,
}

impl Pair {
    fn new() -> Self {
        Self {
            host: SessionMachine::new(config(), peer("host")),
            client: SessionMachine::new(config(), peer("guest")),
            host_signals: Vec::new(),
            client_signals: Vec::new(),
            host_effects: Vec::new(),
            client_effects: Vec::new(),
            connected: false,
        }
    }

    /// Hosted and joined, handshake open
    fn connected() -> Self {
        let mut pair = Self::new();
        let id = SessionId::from_code("abc123").unwrap();
        pair.host.begin_hosting().unwrap();
        pair.host.hosted(id.clone());
        pair.client.begin_joining(id.as_str()).unwrap();
        pair.client.joined();
        pair.connected = true;
        pair.host.on_peer_joined(peer("guest"));
        pair.flush();
        pair
    }

    /// Both ready, game running
    fn started() -> Self {
        let mut pair = Self::connected();
        pair.host.submit_ready().unwrap();
        pair.client.submit_ready().unwrap();
        pair.flush();
        pair
    }

    /// Deliver queued messages until both machines are quiet
    fn flush(&mut self) {
        loop {
            let host_effects = self.host.drain_effects();
            let client_effects = self.client.drain_effects();
            if host_effects.is_empty() && client_effects.is_empty() {
                break;
            }
            for effect in host_effects {
                match effect {
                    Effect::Send(message) if self.connected => {
                        self.client.on_message(peer("host"), message)
                    }
                    Effect::Signal(signal) => self.host_signals.push(signal),
                    other => self.host_effects.push(other),
                }
            }
            for effect in client_effects {
                match effect {
                    Effect::Send(message) if self.connected => {
                        self.host.on_message(peer("guest"), message)
                    }
                    Effect::Signal(signal) => self.client_signals.push(signal),
                    other => self.client_effects.push(other),
                }
            }
        }
    }

    fn tick(&mut self, total: Duration) {
        let mut elapsed = Duration::ZERO;
        while elapsed < total {
            self.host.tick(TICK);
            self.client.tick(TICK);
            self.flush();
            elapsed += TICK;
        }
    }

    /// Client link drops: host sees the leave, client sees its own loss
    fn sever_client(&mut self) {
        self.connected = false;
        self.host.on_peer_left(peer("guest"));
        self.client.on_link_lost();
        self.flush();
    }

    /// Client rejoins at the relay level
    fn rejoin_client(&mut self) {
        self.connected = true;
        self.host.on_peer_joined(peer("guest"));
        self.flush();
    }

    fn host_count(&self, signal: LifecycleSignal) -> usize {
        self.host_signals.iter().filter(|s| **s == signal).count()
    }

    fn client_count(&self, signal: LifecycleSignal) -> usize {
        self.client_signals.iter().filter(|s| **s == signal).count()
    }

    fn probe_token(&self) -> Option<u64> {
        self.client_effects.iter().rev().find_map(|e| match e {
            Effect::ProbeSession { token, .. } => Some(*token),
            _ => None,
        })
    }
}

// ---- ready handshake ----

#[test]
fn test_handshake_opens_when_both_connected() {
    let pair = Pair::connected();
    assert_eq!(pair.host.phase(), Phase::ReadyHandshake);
    assert_eq!(pair.client.phase(), Phase::ReadyHandshake);
    assert_eq!(pair.host_count(LifecycleSignal::PeersConnected), 1);
    assert_eq!(pair.client_count(LifecycleSignal::PeersConnected), 1);
}

#[test]
fn test_host_waits_in_hosted_until_client_joins() {
    let mut pair = Pair::new();
    let id = SessionId::from_code("abc123").unwrap();
    pair.host.begin_hosting().unwrap();
    pair.host.hosted(id.clone());
    assert_eq!(pair.host.phase(), Phase::Hosted);

    pair.client.begin_joining(id.as_str()).unwrap();
    pair.client.joined();
    pair.flush();
    assert_eq!(pair.host.phase(), Phase::Hosted);
    assert_eq!(pair.client.phase(), Phase::WaitingForPeer);

    pair.connected = true;
    pair.host.on_peer_joined(peer("guest"));
    pair.flush();
    assert_eq!(pair.host.phase(), Phase::ReadyHandshake);
    assert_eq!(pair.client.phase(), Phase::ReadyHandshake);
}

#[test]
fn test_game_starts_once_after_two_distinct_ready() {
    let mut pair = Pair::connected();

    pair.host.submit_ready().unwrap();
    pair.host.submit_ready().unwrap();
    pair.flush();
    assert!(!pair.host.state().game_started);
    assert_eq!(pair.host.state().ready_count, 1);

    // A duplicated client request must not double count
    pair.client.submit_ready().unwrap();
    pair.host.on_message(peer("guest"), PeerMessage::Ready);
    pair.flush();

    assert!(pair.host.state().game_started);
    assert_eq!(pair.host.state().ready_count, 2);
    assert_eq!(pair.host_count(LifecycleSignal::GameStarted), 1);
    assert_eq!(pair.client_count(LifecycleSignal::GameStarted), 1);
    assert_eq!(pair.client.phase(), Phase::Active);
    assert_eq!(pair.client.state().current_turn, Role::Host);
}

#[test]
fn test_ready_timeout_keeps_handshake() {
    let mut pair = Pair::connected();
    pair.host.submit_ready().unwrap();
    pair.flush();
    pair.tick(Duration::from_millis(1_500));

    assert_eq!(pair.host_count(LifecycleSignal::ReadyTimeout), 1);
    assert_eq!(pair.host.phase(), Phase::ReadyHandshake);

    pair.client.submit_ready().unwrap();
    pair.flush();
    assert_eq!(pair.host.phase(), Phase::Active);
}

#[test]
fn test_ready_timer_cancelled_on_start() {
    let mut pair = Pair::started();
    pair.tick(Duration::from_millis(2_000));
    assert_eq!(pair.host_count(LifecycleSignal::ReadyTimeout), 0);
    assert_eq!(pair.client_count(LifecycleSignal::ReadyTimeout), 0);
}

#[test]
fn test_ready_outside_handshake_is_rejected() {
    let mut machine = SessionMachine::new(config(), peer("solo"));
    assert!(matches!(
        machine.submit_ready(),
        Err(DuelError::InvalidStateTransition { .. })
    ));
}

// ---- turns ----

#[test]
fn test_turns_alternate() {
    let mut pair = Pair::started();

    assert!(matches!(
        pair.client.submit_move(1, 1),
        Err(DuelError::NotYourTurn(Role::Client))
    ));

    pair.host.submit_move(0, 0).unwrap();
    pair.flush();
    assert_eq!(pair.client.state().current_turn, Role::Client);
    assert!(matches!(
        pair.host.submit_move(0, 1),
        Err(DuelError::NotYourTurn(Role::Host))
    ));

    pair.client.submit_move(1, 1).unwrap();
    pair.flush();
    assert_eq!(pair.host.state().current_turn, Role::Host);
    assert_eq!(pair.host.state().board.get(1, 1), Some(Role::Client));
}

#[test]
fn test_client_move_is_pending_until_confirmed() {
    let mut pair = Pair::started();
    pair.host.submit_move(0, 0).unwrap();
    pair.flush();

    pair.connected = false;
    pair.client.submit_move(2, 2).unwrap();
    let _ = pair.client.drain_effects();

    // Mirror untouched, overlay visible
    assert_eq!(pair.client.state().board.get(2, 2), None);
    assert_eq!(pair.client.info().board().get(2, 2), Some(Role::Client));
    assert!(matches!(
        pair.client.submit_move(2, 1),
        Err(DuelError::NotYourTurn(Role::Client))
    ));
}

#[test]
fn test_host_rejects_out_of_turn_client_move() {
    let mut pair = Pair::started();
    let state_before = pair.host.info().state.clone();

    // A client bypassing its own checks
    pair.host.on_message(peer("guest"), PeerMessage::Move { row: 1, col: 1 });
    pair.flush();

    assert_eq!(pair.host.state().board.get(1, 1), None);
    assert_eq!(pair.host.state().current_turn, Role::Host);
    assert_eq!(pair.host.state(), &state_before);
    assert_eq!(pair.client.state(), pair.host.state());
}

#[test]
fn test_row_completion_wins() {
    let mut pair = Pair::started();
    for (role, row, col) in [
        (Role::Host, 0, 0),
        (Role::Client, 1, 0),
        (Role::Host, 0, 1),
        (Role::Client, 1, 1),
    ] {
        match role {
            Role::Host => pair.host.submit_move(row, col).unwrap(),
            Role::Client => pair.client.submit_move(row, col).unwrap(),
        }
        pair.flush();
    }
    assert_eq!(pair.host.state().outcome, Outcome::Unresolved);

    pair.host.submit_move(0, 2).unwrap();
    pair.flush();

    assert_eq!(pair.host.state().outcome, Outcome::Player1Won);
    assert_eq!(pair.client.state().outcome, Outcome::Player1Won);
    assert_eq!(pair.client.phase(), Phase::Finished);
    assert_eq!(pair.client_count(LifecycleSignal::GameFinished), 1);
    assert!(matches!(
        pair.client.submit_move(2, 2),
        Err(DuelError::GameFinished)
    ));
}

#[test]
fn test_draw_on_full_board() {
    let mut pair = Pair::started();
    let moves = [
        (0, 0), (0, 1), (0, 2),
        (1, 1), (1, 0), (1, 2),
        (2, 1), (2, 0), (2, 2),
    ];
    for (i, (row, col)) in moves.into_iter().enumerate() {
        if i % 2 == 0 {
            pair.host.submit_move(row, col).unwrap();
        } else {
            pair.client.submit_move(row, col).unwrap();
        }
        pair.flush();
    }
    assert_eq!(pair.host.state().outcome, Outcome::Draw);
    assert_eq!(pair.host_count(LifecycleSignal::GameFinished), 1);
}

// ---- outcome and restart ----

#[test]
fn test_finish_requires_decided_outcome() {
    let mut pair = Pair::started();
    assert!(matches!(
        pair.host.finish_game(Outcome::Unresolved),
        Err(DuelError::UnresolvedOutcome)
    ));
    pair.host.finish_game(Outcome::Draw).unwrap();
    assert!(matches!(
        pair.host.finish_game(Outcome::Player1Won),
        Err(DuelError::GameFinished)
    ));
    pair.flush();
    assert_eq!(pair.client.state().outcome, Outcome::Draw);
}

#[test]
fn test_client_finish_request_needs_matching_board() {
    let mut pair = Pair::started();
    pair.client.finish_game(Outcome::Player2Won).unwrap();
    pair.flush();
    assert!(!pair.host.state().game_finished);
    assert_eq!(pair.host_count(LifecycleSignal::GameFinished), 0);
}

#[test]
fn test_restart_twice_is_idempotent() {
    let mut pair = Pair::started();
    pair.host.finish_game(Outcome::Player2Won).unwrap();
    pair.flush();

    pair.host.restart().unwrap();
    pair.flush();
    let after_first = pair.host.state().clone();
    pair.host.restart().unwrap();
    pair.flush();

    assert_eq!(pair.host.state(), &after_first);
    assert_eq!(pair.host_count(LifecycleSignal::GameRestarted), 1);
    assert_eq!(pair.client_count(LifecycleSignal::GameRestarted), 1);
    assert_eq!(pair.client.phase(), Phase::Active);
    assert_eq!(pair.client.state().outcome, Outcome::Unresolved);
    assert_eq!(pair.client.state().current_turn, Role::Host);
}

#[test]
fn test_client_restart_is_forwarded() {
    let mut pair = Pair::started();
    pair.host.submit_move(1, 1).unwrap();
    pair.flush();

    pair.client.restart().unwrap();
    // Nothing changes locally before the host acts
    assert_eq!(pair.client.state().board.get(1, 1), Some(Role::Host));
    pair.flush();

    assert!(pair.host.state().board.is_empty());
    assert!(pair.client.state().board.is_empty());
    assert_eq!(pair.client_count(LifecycleSignal::GameRestarted), 1);
}

// ---- host-side disconnection ----

#[test]
fn test_grace_period_counts_down_and_expires() {
    let mut pair = Pair::started();
    pair.sever_client();

    assert!(pair.host.state().disconnected);
    assert_eq!(pair.host.state().grace_period_remaining, Duration::from_secs(1));
    assert_eq!(pair.host_count(LifecycleSignal::PlayerDisconnected), 1);
    assert_eq!(pair.host_count(LifecycleSignal::ClientDisconnectedHostView), 1);

    let mut last = pair.host.state().grace_period_remaining;
    for _ in 0..12 {
        pair.host.tick(TICK);
        pair.flush();
        let now = pair.host.state().grace_period_remaining;
        assert!(now <= last);
        last = now;
    }

    assert_eq!(last, Duration::ZERO);
    assert_eq!(pair.host_count(LifecycleSignal::FailedToReconnectHostView), 1);
    assert_eq!(pair.host.state().reconnection_attempts, 1);
    assert_eq!(pair.host.phase(), Phase::Active);
}

#[test]
fn test_reconnect_within_grace_resumes() {
    let mut pair = Pair::started();
    pair.host.submit_move(0, 0).unwrap();
    pair.flush();
    pair.sever_client();
    pair.tick(Duration::from_millis(300));

    pair.rejoin_client();
    assert!(!pair.host.state().disconnected);
    assert_eq!(pair.host.state().reconnection_attempts, 1);
    assert_eq!(pair.host_count(LifecycleSignal::ClientReconnected), 1);
    assert_eq!(pair.host_count(LifecycleSignal::GameResumed), 1);

    // Grace timer cancelled: no expiry later
    pair.tick(Duration::from_millis(1_500));
    assert_eq!(pair.host_count(LifecycleSignal::FailedToReconnectHostView), 0);
    assert_eq!(pair.host.state().reconnection_attempts, 1);
}

#[test]
fn test_reconnect_before_start_reopens_handshake() {
    let mut pair = Pair::connected();
    pair.sever_client();
    pair.rejoin_client();
    assert_eq!(pair.host.phase(), Phase::ReadyHandshake);
    assert_eq!(pair.host_count(LifecycleSignal::GameResumed), 0);

    pair.tick(Duration::from_millis(1_200));
    assert_eq!(pair.host_count(LifecycleSignal::ReadyTimeout), 1);
}

#[test]
fn test_new_disconnect_resets_grace_ceiling() {
    let mut pair = Pair::started();
    pair.sever_client();
    pair.tick(Duration::from_millis(400));
    assert!(pair.host.state().grace_period_remaining < Duration::from_secs(1));

    pair.rejoin_client();
    pair.sever_client();
    assert_eq!(pair.host.state().grace_period_remaining, Duration::from_secs(1));
}

#[test]
fn test_attempt_bound_skips_grace() {
    let mut pair = Pair::started();

    for _ in 0..3 {
        pair.sever_client();
        pair.tick(Duration::from_millis(1_200));
        pair.rejoin_client();
    }
    assert_eq!(pair.host.state().reconnection_attempts, 3);
    assert_eq!(pair.host_count(LifecycleSignal::ClientDisconnectedHostView), 3);

    pair.sever_client();
    assert_eq!(pair.host_count(LifecycleSignal::ClientDisconnectedHostView), 3);
    assert_eq!(pair.host_count(LifecycleSignal::ReconnectionExhausted), 1);
    assert_eq!(pair.host.state().grace_period_remaining, Duration::ZERO);

    // Rejoining without a granted grace window is refused
    pair.rejoin_client();
    assert!(pair.host.state().disconnected);
    assert_eq!(pair.client_count(LifecycleSignal::ReconnectionExhausted), 1);
    assert_eq!(pair.client.phase(), Phase::Idle);
}

#[test]
fn test_disconnect_after_finish_is_ignored() {
    let mut pair = Pair::started();
    pair.host.finish_game(Outcome::Player1Won).unwrap();
    pair.flush();

    pair.connected = false;
    pair.host.on_peer_left(peer("guest"));
    pair.flush();
    assert!(!pair.host.state().disconnected);
    assert_eq!(pair.host_count(LifecycleSignal::ClientDisconnectedHostView), 0);
}

#[test]
fn test_stranger_is_refused() {
    let mut pair = Pair::started();
    pair.host.on_peer_joined(peer("stranger"));
    let refused = pair.host.drain_effects().into_iter().any(|e| {
        matches!(
            e,
            Effect::Send(PeerMessage::Refused { ref peer, .. }) if peer.as_str() == "stranger"
        )
    });
    assert!(refused);
}

#[test]
fn test_transport_fault_tears_down() {
    let mut pair = Pair::started();
    pair.host.on_transport_fault("socket reset".to_string());
    pair.flush();

    assert_eq!(pair.host_count(LifecycleSignal::TransportFailure), 1);
    assert_eq!(pair.host_count(LifecycleSignal::ClientDisconnectedHostView), 0);
    assert_eq!(pair.host.phase(), Phase::Idle);
    assert!(pair
        .host_effects
        .iter()
        .any(|e| matches!(e, Effect::ReleaseLink)));
    assert!(matches!(
        pair.host.submit_move(0, 0),
        Err(DuelError::TransportFault(_))
    ));
}

#[test]
fn test_transport_fault_after_finish_is_ignored() {
    let mut pair = Pair::started();
    pair.host.finish_game(Outcome::Draw).unwrap();
    pair.flush();
    pair.host.on_transport_fault("late fault".to_string());
    pair.flush();
    assert_eq!(pair.host_count(LifecycleSignal::TransportFailure), 0);
    assert_eq!(pair.host.phase(), Phase::Finished);
}

// ---- client-side disconnection ----

#[test]
fn test_ready_while_disconnected_is_refused() {
    let mut pair = Pair::connected();
    pair.sever_client();
    assert!(matches!(
        pair.client.submit_ready(),
        Err(DuelError::PeerLost(_))
    ));

    let token = pair.probe_token().unwrap();
    pair.client.on_probe_result(token, true);
    pair.client.request_reconnect().unwrap();
    pair.rejoin_client();
    pair.client.on_reconnect_result(true);
    pair.flush();
    assert_eq!(pair.client.phase(), Phase::ReadyHandshake);

    pair.host.submit_ready().unwrap();
    pair.client.submit_ready().unwrap();
    pair.flush();
    assert_eq!(pair.host.state().ready_count, 2);
    assert!(pair.host.state().game_started);
    assert_eq!(pair.client.phase(), Phase::Active);
}

#[test]
fn test_ready_lost_in_flight_can_be_resent() {
    let mut pair = Pair::connected();
    // The ready never reaches the host
    pair.connected = false;
    pair.client.submit_ready().unwrap();
    pair.sever_client();
    assert_eq!(pair.host.state().ready_count, 0);

    let token = pair.probe_token().unwrap();
    pair.client.on_probe_result(token, true);
    pair.client.request_reconnect().unwrap();
    pair.rejoin_client();
    pair.client.on_reconnect_result(true);
    pair.flush();

    pair.client.submit_ready().unwrap();
    pair.host.submit_ready().unwrap();
    pair.flush();
    assert_eq!(pair.host.state().ready_count, 2);
    assert_eq!(pair.host.phase(), Phase::Active);
    assert_eq!(pair.client_count(LifecycleSignal::GameStarted), 1);
}

#[test]
fn test_connection_loss_checks_session_before_blaming_host() {
    let mut pair = Pair::started();
    pair.connected = false;
    pair.client.on_connection_lost();
    pair.flush();

    assert_eq!(pair.client_count(LifecycleSignal::PlayerDisconnected), 1);
    assert_eq!(pair.client_count(LifecycleSignal::HostDisconnected), 0);
    assert_eq!(pair.client.phase(), Phase::Active);

    // Host still there: the client gets its own grace window
    let token = pair.probe_token().unwrap();
    pair.client.on_probe_result(token, true);
    pair.flush();
    assert_eq!(pair.client_count(LifecycleSignal::ClientDisconnectedClientView), 1);
    assert_eq!(pair.client.info().client_grace_remaining, Some(Duration::from_secs(1)));
    assert_eq!(pair.client_count(LifecycleSignal::HostDisconnected), 0);
}

#[test]
fn test_client_probe_valid_starts_grace() {
    let mut pair = Pair::started();
    pair.sever_client();
    assert_eq!(pair.client_count(LifecycleSignal::PlayerDisconnected), 1);
    assert!(matches!(
        pair.client.request_reconnect(),
        Err(DuelError::PeerLost(_))
    ));

    let token = pair.probe_token().unwrap();
    pair.client.on_probe_result(token, true);
    pair.flush();
    assert_eq!(pair.client_count(LifecycleSignal::ClientDisconnectedClientView), 1);
    assert_eq!(pair.client.info().client_grace_remaining, Some(Duration::from_secs(1)));

    pair.client.tick(TICK * 3);
    assert_eq!(
        pair.client.info().client_grace_remaining,
        Some(Duration::from_millis(700))
    );
}

#[test]
fn test_client_probe_invalid_means_host_gone() {
    let mut pair = Pair::started();
    pair.sever_client();
    let token = pair.probe_token().unwrap();

    // Stale tokens are ignored
    pair.client.on_probe_result(token + 1, false);
    pair.flush();
    assert_eq!(pair.client_count(LifecycleSignal::HostDisconnected), 0);

    pair.client.on_probe_result(token, false);
    pair.flush();
    assert_eq!(pair.client_count(LifecycleSignal::HostDisconnected), 1);
    assert_eq!(pair.client.phase(), Phase::Idle);
    assert!(matches!(
        pair.client.request_reconnect(),
        Err(DuelError::HostTerminated)
    ));
}

#[test]
fn test_failed_reconnect_keeps_countdown() {
    let mut pair = Pair::started();
    pair.sever_client();
    let token = pair.probe_token().unwrap();
    pair.client.on_probe_result(token, true);
    pair.client.tick(TICK * 2);

    pair.client.request_reconnect().unwrap();
    pair.client.on_reconnect_result(false);
    pair.flush();

    assert_eq!(pair.client_count(LifecycleSignal::ReconnectAttemptFailed), 1);
    // Not reset to the ceiling by a failed attempt
    assert_eq!(
        pair.client.info().client_grace_remaining,
        Some(Duration::from_millis(800))
    );
    assert!(pair.client.info().link_lost);
}

#[test]
fn test_client_attempts_exhaust() {
    let mut pair = Pair::started();
    pair.sever_client();
    let token = pair.probe_token().unwrap();
    pair.client.on_probe_result(token, true);

    for _ in 0..3 {
        pair.client.request_reconnect().unwrap();
        pair.client.on_reconnect_result(false);
    }
    pair.flush();

    assert_eq!(pair.client_count(LifecycleSignal::ReconnectAttemptFailed), 3);
    assert_eq!(pair.client_count(LifecycleSignal::ReconnectionExhausted), 1);
    assert!(matches!(
        pair.client.request_reconnect(),
        Err(DuelError::ReconnectionExhausted)
    ));
}

#[test]
fn test_client_grace_expiry() {
    let mut pair = Pair::started();
    pair.sever_client();
    let token = pair.probe_token().unwrap();
    pair.client.on_probe_result(token, true);
    pair.flush();

    for _ in 0..11 {
        pair.client.tick(TICK);
    }
    pair.flush();
    assert_eq!(pair.client_count(LifecycleSignal::FailedToReconnectClientView), 1);
    assert_eq!(pair.client.info().client_grace_remaining, Some(Duration::ZERO));
    assert!(matches!(
        pair.client.request_reconnect(),
        Err(DuelError::PeerLost(_))
    ));
}

#[test]
fn test_client_reconnect_round_trip() {
    let mut pair = Pair::started();
    pair.host.submit_move(0, 0).unwrap();
    pair.flush();
    pair.sever_client();
    let token = pair.probe_token().unwrap();
    pair.client.on_probe_result(token, true);

    pair.client.request_reconnect().unwrap();
    pair.flush();
    assert!(pair
        .client_effects
        .iter()
        .any(|e| matches!(e, Effect::Reconnect { .. })));

    pair.rejoin_client();
    pair.client.on_reconnect_result(true);
    pair.flush();

    assert!(!pair.client.info().link_lost);
    assert_eq!(pair.client.phase(), Phase::Active);
    assert_eq!(pair.client_count(LifecycleSignal::GameResumed), 1);
    assert_eq!(pair.client.state().current_turn, Role::Client);
    pair.client.submit_move(1, 1).unwrap();
    pair.flush();
    assert_eq!(pair.host.state().board.get(1, 1), Some(Role::Client));
}

#[test]
fn test_host_leaving_terminates_client() {
    let mut pair = Pair::started();
    pair.host.quit();
    pair.flush();

    assert_eq!(pair.client_count(LifecycleSignal::HostDisconnected), 1);
    assert_eq!(pair.client.phase(), Phase::Idle);
    assert!(pair
        .host_effects
        .iter()
        .any(|e| matches!(e, Effect::Shutdown)));
}

#[test]
fn test_hosting_again_ends_current_session() {
    let mut pair = Pair::started();
    pair.host.begin_hosting().unwrap();
    pair.flush();
    assert_eq!(pair.host.phase(), Phase::Idle);
    assert_eq!(pair.client_count(LifecycleSignal::HostDisconnected), 1);
}

#[test]
fn test_join_rejects_bad_code() {
    let mut machine = SessionMachine::new(config(), peer("guest"));
    assert!(matches!(
        machine.begin_joining("  "),
        Err(DuelError::InvalidSessionCode(_))
    ));
    assert_eq!(machine.phase(), Phase::Idle);
}
