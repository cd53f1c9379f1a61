//! Zenoh network layer for relay sessions

pub mod join_queryable;
pub mod keyexpr;
pub mod liveliness;
pub mod publisher;
pub mod relay;
pub mod subscriber;

pub use join_queryable::{JoinQueryable, JoinReply, JoinRequest};
pub use keyexpr::{Channel, SessionKeyexpr};
pub use liveliness::{Presence, PresenceToken, PresenceWatch};
pub use publisher::SessionPublisher;
pub use relay::{ZenohClientLink, ZenohHostLink, ZenohRelay};
pub use subscriber::SessionSubscriber;
