//! Session lifecycle: the pure state machine and its async driver

mod driver;
mod machine;
mod reconnect;
mod session_ext;

#[cfg(test)]
mod tests;

pub use driver::{Session, SessionCommand, SessionHandle, StepResult};
pub use session_ext::{SessionBuilder, SessionExt};
