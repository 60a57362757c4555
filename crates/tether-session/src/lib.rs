//! Session correlation, conversation state, and permission handling.
//!
//! Each session is an actor owning its own state machine and narrative
//! buffer; the registry is the only shared structure. Events reach a session
//! through its bounded inbox in intake-arrival order.

pub mod dedup;
pub mod machine;
pub mod narrative;
pub mod permission;
pub mod registry;
pub mod sink;

#[cfg(test)]
pub(crate) mod testing;

pub use machine::{SessionCommand, SessionConfig, SessionState};
pub use permission::PermissionConfig;
pub use registry::{RegistryConfig, SessionRegistry};
pub use sink::{LogSink, PresentationSink};
