//! Engine adapter boundary and session-level configuration types.
//!
//! The controller treats an engine as opaque: an [`EngineLoader`] builds one
//! from a [`ConfigRef`], and [`Engine::run`] drives it on a dedicated thread
//! with an [`EngineIo`] bundle for input, output, and stop signalling.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::{ConfigError, EngineFault, InputReceiver, OutputSender};

/// Default engine thread name.
pub const DEFAULT_ENGINE_THREAD_NAME: &str = "emu-session-engine";

/// Default notifier thread name.
pub const DEFAULT_NOTIFIER_THREAD_NAME: &str = "emu-session-notify";

/// Default upper bound an idle engine waits on the input queue before
/// re-checking its stop signal.
pub const DEFAULT_INPUT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Immutable, non-empty reference to a machine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConfigRef {
    path: PathBuf,
}

impl ConfigRef {
    /// Validates that `path` is present.
    ///
    /// Only syntactic presence is checked here; the engine loader validates
    /// the contents at start time.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyPath`] for an empty path.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        if path.as_os_str().is_empty() {
            return Err(ConfigError::EmptyPath);
        }
        Ok(Self { path })
    }

    /// Returns the referenced path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Display for ConfigRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// Tunables for a session controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Name given to the engine thread.
    pub engine_thread_name: String,
    /// Name given to the notifier thread.
    pub notifier_thread_name: String,
    /// Poll interval handed to engines through [`EngineIo::poll_interval`].
    pub input_poll_interval: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            engine_thread_name: DEFAULT_ENGINE_THREAD_NAME.to_string(),
            notifier_thread_name: DEFAULT_NOTIFIER_THREAD_NAME.to_string(),
            input_poll_interval: DEFAULT_INPUT_POLL_INTERVAL,
        }
    }
}

/// Idempotent request for the engine run loop to exit at its next safe point.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    requested: Arc<AtomicBool>,
}

impl StopSignal {
    /// Requests the run loop to stop. Repeated calls have no further effect.
    pub fn request(&self) {
        self.requested.store(true, Ordering::Release);
    }

    /// Returns `true` once a stop was requested.
    #[must_use]
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }
}

/// Everything a run loop needs to talk to the host.
#[derive(Debug)]
pub struct EngineIo {
    /// Host input, FIFO. Reports [`crate::InputPoll::Closed`] once the session stops.
    pub input: InputReceiver,
    /// Guest output channel towards the delegate.
    pub output: OutputSender,
    /// Stop request observed at safe points.
    pub stop: StopSignal,
    /// Suggested wait when blocking on input.
    pub poll_interval: Duration,
}

impl EngineIo {
    /// Returns `true` when the run loop should exit.
    #[must_use]
    pub fn should_stop(&self) -> bool {
        self.stop.is_requested()
    }
}

/// A constructed emulator instance.
///
/// The handle is moved onto the engine thread at start and dropped there
/// once [`Engine::run`] returns.
pub trait Engine: Send + 'static {
    /// Executes the emulated machine.
    ///
    /// Implementations poll [`EngineIo::input`], emit through
    /// [`EngineIo::output`], and return `Ok(())` once [`EngineIo::should_stop`]
    /// is set or the input queue is closed. Clones of the output sender must
    /// not outlive this call.
    ///
    /// # Errors
    ///
    /// Returns [`EngineFault`] on an unrecoverable internal failure.
    fn run(&mut self, io: &EngineIo) -> Result<(), EngineFault>;
}

/// Builds engines from configuration references.
pub trait EngineLoader: Send + Sync + 'static {
    /// Engine type produced by this loader.
    type Engine: Engine;

    /// Constructs an engine. No partial handle is returned on failure.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration is malformed or the
    /// described machine cannot be instantiated.
    fn load(&self, config: &ConfigRef) -> Result<Self::Engine, ConfigError>;
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{ConfigRef, SessionOptions, StopSignal, DEFAULT_INPUT_POLL_INTERVAL};
    use crate::ConfigError;

    #[test]
    fn empty_config_path_is_rejected() {
        assert!(matches!(ConfigRef::new(""), Err(ConfigError::EmptyPath)));
    }

    #[test]
    fn config_ref_keeps_path_verbatim() {
        let config = ConfigRef::new("machines/temu.cfg").expect("non-empty path");
        assert_eq!(config.path().to_str(), Some("machines/temu.cfg"));
        assert_eq!(config.to_string(), "machines/temu.cfg");
    }

    #[test]
    fn default_options_use_named_threads_and_short_poll() {
        let options = SessionOptions::default();
        assert_eq!(options.engine_thread_name, "emu-session-engine");
        assert_eq!(options.notifier_thread_name, "emu-session-notify");
        assert_eq!(options.input_poll_interval, DEFAULT_INPUT_POLL_INTERVAL);
        assert_eq!(options.input_poll_interval, Duration::from_millis(10));
    }

    #[test]
    fn stop_signal_is_idempotent_and_shared_by_clones() {
        let signal = StopSignal::default();
        let observer = signal.clone();
        assert!(!observer.is_requested());

        signal.request();
        signal.request();
        assert!(observer.is_requested());
    }
}
