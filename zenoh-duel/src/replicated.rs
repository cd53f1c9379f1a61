//! Host-authoritative replicated state
//!
//! The host owns the only writable copy. Every mutation produces a
//! [`StateSync`] snapshot with a bumped revision that is shipped to the
//! client, whose store only accepts newer snapshots.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::board::Board;
use crate::error::{DuelError, Result};
use crate::types::{Outcome, Role};

/// Authoritative fields shared by both peers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicatedState {
    /// Role allowed to move next
    pub current_turn: Role,
    /// Set once an outcome was decided
    pub game_finished: bool,
    /// Set once both peers submitted ready
    pub game_started: bool,
    /// Number of distinct peers that submitted ready
    pub ready_count: u8,
    /// Remaining reconnection window, meaningful while `disconnected`
    pub grace_period_remaining: Duration,
    /// Whether the client is currently disconnected
    pub disconnected: bool,
    /// Counted disconnection cycles
    pub reconnection_attempts: u32,
    /// Decided result of the current game
    pub outcome: Outcome,
    /// Play surface
    pub board: Board,
}

impl ReplicatedState {
    pub fn new(grace_period: Duration) -> Self {
        Self {
            current_turn: Role::Host,
            game_finished: false,
            game_started: false,
            ready_count: 0,
            grace_period_remaining: grace_period,
            disconnected: false,
            reconnection_attempts: 0,
            outcome: Outcome::Unresolved,
            board: Board::new(),
        }
    }

    /// Fresh board, host to move, outcome unresolved
    pub(crate) fn reset_game(&mut self) {
        self.board = Board::new();
        self.current_turn = Role::Host;
        self.game_finished = false;
        self.outcome = Outcome::Unresolved;
    }

    /// Whether the game is in its initial position
    pub(crate) fn is_fresh_game(&self) -> bool {
        self.board.is_empty()
            && self.current_turn == Role::Host
            && !self.game_finished
            && self.outcome == Outcome::Unresolved
    }
}

/// Snapshot shipped from host to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSync {
    pub revision: u64,
    pub state: ReplicatedState,
}

/// Local copy of the replicated state, writable only on the host
#[derive(Debug, Clone)]
pub struct StateStore {
    role: Role,
    revision: u64,
    state: ReplicatedState,
}

impl StateStore {
    pub fn new(role: Role, grace_period: Duration) -> Self {
        Self {
            role,
            revision: 0,
            state: ReplicatedState::new(grace_period),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn get(&self) -> &ReplicatedState {
        &self.state
    }

    pub fn snapshot(&self) -> StateSync {
        StateSync {
            revision: self.revision,
            state: self.state.clone(),
        }
    }

    /// Apply a host-side mutation and return the snapshot to replicate
    ///
    /// Clients get `NotHost` and their mirror is left untouched.
    pub fn mutate<F>(&mut self, f: F) -> Result<StateSync>
    where
        F: FnOnce(&mut ReplicatedState),
    {
        if self.role != Role::Host {
            return Err(DuelError::NotHost);
        }
        f(&mut self.state);
        self.revision += 1;
        Ok(self.snapshot())
    }

    /// Apply a snapshot received from the host
    ///
    /// Returns `Ok(false)` for snapshots that are not newer than the mirror.
    pub fn apply(&mut self, sync: StateSync) -> Result<bool> {
        if self.role != Role::Client {
            return Err(DuelError::NotClient);
        }
        if sync.revision <= self.revision {
            return Ok(false);
        }
        self.revision = sync.revision;
        self.state = sync.state;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRACE: Duration = Duration::from_secs(30);

    #[test]
    fn test_host_mutation_bumps_revision() {
        let mut store = StateStore::new(Role::Host, GRACE);
        let sync = store.mutate(|s| s.ready_count = 1).unwrap();
        assert_eq!(sync.revision, 1);
        assert_eq!(store.get().ready_count, 1);
    }

    #[test]
    fn test_client_cannot_mutate_mirror() {
        let mut store = StateStore::new(Role::Client, GRACE);
        let result = store.mutate(|s| {
            s.current_turn = Role::Client;
            s.game_finished = true;
            s.ready_count = 2;
        });
        assert!(matches!(result, Err(DuelError::NotHost)));
        assert_eq!(store.get(), &ReplicatedState::new(GRACE));
        assert_eq!(store.revision(), 0);
    }

    #[test]
    fn test_client_ignores_stale_snapshots() {
        let mut host = StateStore::new(Role::Host, GRACE);
        let mut client = StateStore::new(Role::Client, GRACE);

        let first = host.mutate(|s| s.ready_count = 1).unwrap();
        let second = host.mutate(|s| s.ready_count = 2).unwrap();

        assert!(client.apply(second).unwrap());
        assert!(!client.apply(first).unwrap());
        assert_eq!(client.get().ready_count, 2);
    }

    #[test]
    fn test_host_rejects_snapshots() {
        let mut host = StateStore::new(Role::Host, GRACE);
        let sync = host.snapshot();
        assert!(matches!(host.apply(sync), Err(DuelError::NotClient)));
    }

    #[test]
    fn test_reset_game_keeps_connection_fields() {
        let mut state = ReplicatedState::new(GRACE);
        state.reconnection_attempts = 2;
        state.game_started = true;
        state.game_finished = true;
        state.outcome = Outcome::Draw;
        state.current_turn = Role::Client;
        state.reset_game();
        assert!(state.is_fresh_game());
        assert_eq!(state.reconnection_attempts, 2);
        assert!(state.game_started);
    }
}
