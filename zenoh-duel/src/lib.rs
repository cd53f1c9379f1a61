//! # zenoh-duel
//!
//! Host-authoritative session lifecycle for two-player turn-based games,
//! shipped with a tic-tac-toe board and a Zenoh-backed relay.
//!
//! ## Overview
//!
//! One peer hosts a session and receives a short join code; the other peer
//! joins with that code. The host owns the replicated game state and is the
//! only writer; the client requests mutations and applies the snapshots the
//! host ships back.
//!
//! A session goes through a ready handshake, the game, the result and
//! optional restarts. Disconnections open a bounded grace window for the
//! client to rejoin, and every lifecycle change is raised as a
//! [`LifecycleSignal`].
//!
//! ## Key Features
//!
//! - Ready handshake with a timeout
//! - Replicated turn, board and result state with revision ordering
//! - Reconnection grace window with a per-session attempt bound
//! - Host termination and transport faults told apart from client drops
//! - Pluggable relay through [`SessionProvider`], with an in-memory
//!   [`LoopbackRelay`] and the Zenoh [`ZenohRelay`]
//!
//! ## Example
//!
//! ```rust,no_run
//! use zenoh_duel::{SessionExt, StepResult};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let zenoh = zenoh::open(zenoh::Config::default()).await?;
//!     let mut session = zenoh.declare_duel_session().await?;
//!     session.handle().host_game()?;
//!
//!     loop {
//!         match session.step().await? {
//!             StepResult::Signals(signals) => {
//!                 for signal in signals {
//!                     println!("{}", signal);
//!                 }
//!             }
//!             StepResult::Rejected(e) => println!("rejected: {}", e),
//!             StepResult::Timeout => {}
//!             StepResult::Stop => break,
//!         }
//!     }
//!     Ok(())
//! }
//! ```

// Module declarations
pub mod board;
pub mod config;
pub mod countdown;
pub mod error;
pub mod identity;
pub mod name_generator;
pub mod network;
pub mod protocol;
pub mod replicated;
pub mod session;
pub mod signal;
pub mod transport;
pub mod types;

// Re-exports for convenience
pub use board::Board;
pub use config::{RelayConfig, SessionConfig};
pub use error::{DuelError, Result};
pub use identity::{AnonymousIdentity, Identity, IdentityProvider};
pub use network::ZenohRelay;
pub use replicated::ReplicatedState;
pub use session::{Session, SessionCommand, SessionExt, SessionHandle, StepResult};
pub use signal::LifecycleSignal;
pub use transport::{LoopbackRelay, SessionProvider};
pub use types::{Outcome, PeerId, Phase, Role, SessionId, SessionInfo};
