//! Session controller for an embedded full-system emulator.
//!
//! A [`SessionController`] owns exactly one engine instance. It loads the
//! engine from a configuration reference, runs it on a dedicated background
//! thread, forwards host console input to it in order, and delivers guest
//! output to a weakly-held [`OutputSink`] delegate.

/// Engine adapter boundary and session-level configuration types.
pub mod api;
pub use api::{
    ConfigRef, Engine, EngineIo, EngineLoader, SessionOptions, StopSignal,
    DEFAULT_ENGINE_THREAD_NAME, DEFAULT_INPUT_POLL_INTERVAL, DEFAULT_NOTIFIER_THREAD_NAME,
};

/// Lock-free session counters.
pub mod diag;
pub use diag::{DiagnosticsSnapshot, SessionDiagnostics};

/// Error taxonomy for configuration, state-machine, and launch failures.
pub mod error;
pub use error::{ConfigError, InvalidStateError, SessionError};

/// Unrecoverable engine run-loop faults.
pub mod fault;
pub use fault::EngineFault;

/// Terminal key sequences and modifier encoding.
pub mod keys;
pub use keys::{
    control_byte, encode_key, encode_sequence, Modifiers, TerminalKey, TERMINAL_KEYS,
};

/// Built-in console loopback engine.
pub mod loopback;
pub use loopback::{LoopbackEngine, LoopbackLoader};

/// Machine descriptions and rendered engine configuration files.
pub mod machine;

mod notify;

/// Guest-to-host output path.
pub mod output;
pub use output::{DelegateSlot, OutputSender, OutputSink};

/// Host-to-guest input queue.
pub mod queue;
pub use queue::{input_queue, InputEvent, InputPoll, InputReceiver, InputSender};

/// Session lifecycle and host/engine bridge.
pub mod session;
pub use session::SessionController;

/// Session lifecycle state model.
pub mod state;
pub use state::{Operation, SessionState, StopReason};

#[cfg(test)]
use proptest as _;
#[cfg(test)]
use rstest as _;
