//! Session lifecycle state model.

/// Lifecycle states, stop reasons, and gated operations.
pub mod session_state;

pub use session_state::{Operation, SessionState, StopReason};
