//! Session controller: lifecycle state machine and host/engine data bridge.
//!
//! Threading model:
//!
//! * one engine thread per started session runs [`Engine::run`] and is the
//!   only context that touches the engine handle;
//! * one notifier thread delivers output to the delegate, in production
//!   order and one call at a time;
//! * every public method may be called from any other thread.
//!
//! Policies:
//!
//! * `write_data`/`resize` outside `Running` fail with
//!   [`InvalidStateError`]; nothing is queued for later.
//! * `stop` discards queued input and undelivered output; a delivery that
//!   already started completes before `stop` returns.
//! * When the engine faults or exits on its own, all output it produced is
//!   delivered, followed by [`OutputSink::on_terminated`].

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::keys::{encode_key, encode_sequence, Modifiers, TerminalKey};
use crate::notify::Notifier;
use crate::output::notification_channel;
use crate::{
    input_queue, ConfigRef, DelegateSlot, DiagnosticsSnapshot, Engine, EngineFault, EngineIo,
    EngineLoader, InputEvent, InputSender, InvalidStateError, LoopbackLoader, Operation,
    OutputSender, OutputSink, SessionDiagnostics, SessionError, SessionOptions, SessionState,
    StopReason, StopSignal,
};

struct Workers {
    engine: JoinHandle<()>,
    stop: StopSignal,
    notifier: Notifier,
}

#[derive(Default)]
struct Lifecycle {
    state: SessionState,
    input: Option<InputSender>,
    workers: Option<Workers>,
}

impl Lifecycle {
    fn transition(&mut self, next: SessionState) {
        debug_assert!(
            self.state.can_transition_to(&next),
            "illegal session transition {} -> {next}",
            self.state
        );
        debug!(from = %self.state, to = %next, "session state transition");
        self.state = next;
    }
}

#[derive(Default)]
struct Shared {
    lifecycle: Mutex<Lifecycle>,
    delegate: Arc<DelegateSlot>,
    diagnostics: Arc<SessionDiagnostics>,
}

/// Owns one engine for its whole lifetime and bridges it to the host.
///
/// Construct with a configuration path, register a delegate, call
/// [`SessionController::start`], then feed input with
/// [`SessionController::write_data`]. Dropping the controller stops the
/// session and waits for both background threads to exit.
pub struct SessionController<L: EngineLoader = LoopbackLoader> {
    config: ConfigRef,
    loader: L,
    options: SessionOptions,
    start_claimed: AtomicBool,
    shared: Arc<Shared>,
}

impl SessionController<LoopbackLoader> {
    /// Creates a session backed by the built-in loopback engine.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Config`] when `config_path` is empty.
    pub fn new(config_path: impl Into<PathBuf>) -> Result<Self, SessionError> {
        Self::with_loader(config_path, LoopbackLoader)
    }
}

impl<L: EngineLoader> SessionController<L> {
    /// Creates a session that will build its engine with `loader`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Config`] when `config_path` is empty.
    pub fn with_loader(config_path: impl Into<PathBuf>, loader: L) -> Result<Self, SessionError> {
        Self::with_options(config_path, loader, SessionOptions::default())
    }

    /// Creates a session with explicit options.
    ///
    /// The engine is not loaded here; see [`SessionController::start`].
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Config`] when `config_path` is empty.
    pub fn with_options(
        config_path: impl Into<PathBuf>,
        loader: L,
        options: SessionOptions,
    ) -> Result<Self, SessionError> {
        let config = ConfigRef::new(config_path)?;
        debug!(config = %config, "session created");
        Ok(Self {
            config,
            loader,
            options,
            start_claimed: AtomicBool::new(false),
            shared: Arc::new(Shared::default()),
        })
    }

    /// Configuration this session was created with.
    #[must_use]
    pub const fn config(&self) -> &ConfigRef {
        &self.config
    }

    /// Options this session was created with.
    #[must_use]
    pub const fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.shared.lifecycle.lock().state.clone()
    }

    /// Returns `true` while the engine thread has been launched and not yet exited.
    #[must_use]
    pub fn is_engine_thread_alive(&self) -> bool {
        self.shared
            .lifecycle
            .lock()
            .workers
            .as_ref()
            .is_some_and(|workers| !workers.engine.is_finished())
    }

    /// Input events accepted but not yet taken by the engine.
    #[must_use]
    pub fn pending_input(&self) -> usize {
        self.shared
            .lifecycle
            .lock()
            .input
            .as_ref()
            .map_or(0, InputSender::pending)
    }

    /// Counters for this session.
    #[must_use]
    pub fn diagnostics(&self) -> DiagnosticsSnapshot {
        self.shared.diagnostics.snapshot()
    }

    /// Registers the output delegate, replacing any previous one.
    ///
    /// The controller only keeps a weak reference; output arriving after the
    /// delegate is dropped is discarded.
    pub fn set_delegate<S>(&self, delegate: &Arc<S>)
    where
        S: OutputSink + 'static,
    {
        self.shared.delegate.set(delegate);
    }

    /// Registers an already type-erased output delegate.
    pub fn set_delegate_dyn(&self, delegate: &Arc<dyn OutputSink>) {
        self.shared.delegate.set_dyn(delegate);
    }

    /// Unregisters the output delegate.
    pub fn clear_delegate(&self) {
        self.shared.delegate.clear();
    }

    /// Loads the engine and launches its run loop.
    ///
    /// Blocks only while the engine is constructed; returns as soon as the
    /// background threads are running.
    ///
    /// # Errors
    ///
    /// * [`SessionError::InvalidState`] if called a second time, concurrently
    ///   with another `start`, or after the session stopped. The state is
    ///   left unchanged.
    /// * [`SessionError::Config`] if the engine cannot be loaded; the session
    ///   moves to `Stopped(ConfigRejected)`.
    /// * [`SessionError::Launch`] if a thread cannot be spawned; the session
    ///   moves to `Stopped(LaunchFailed)`.
    pub fn start(&self) -> Result<(), SessionError> {
        {
            let lifecycle = self.shared.lifecycle.lock();
            if lifecycle.state != SessionState::Created
                || self.start_claimed.swap(true, Ordering::AcqRel)
            {
                return Err(invalid(Operation::Start, &lifecycle.state));
            }
        }

        info!(config = %self.config, "loading engine");
        let engine = match self.loader.load(&self.config) {
            Ok(engine) => engine,
            Err(err) => {
                warn!(config = %self.config, error = %err, "engine configuration rejected");
                self.abort_start(StopReason::ConfigRejected);
                return Err(err.into());
            }
        };

        let (input_tx, input_rx) = input_queue();
        let (note_tx, note_rx) = notification_channel();
        let notifier = match Notifier::spawn(
            &self.options.notifier_thread_name,
            note_rx,
            Arc::clone(&self.shared.delegate),
            Arc::clone(&self.shared.diagnostics),
        ) {
            Ok(notifier) => notifier,
            Err(source) => {
                error!(error = %source, "failed to spawn notifier thread");
                self.abort_start(StopReason::LaunchFailed);
                return Err(SessionError::Launch {
                    role: "notifier",
                    source,
                });
            }
        };

        let stop = StopSignal::default();
        let io = EngineIo {
            input: input_rx,
            output: OutputSender::new(note_tx, Arc::clone(&self.shared.diagnostics)),
            stop: stop.clone(),
            poll_interval: self.options.input_poll_interval,
        };

        // Held across the spawn so a run loop that ends immediately still
        // observes `Running` when it reports its exit.
        let mut lifecycle = self.shared.lifecycle.lock();
        if lifecycle.state != SessionState::Created {
            let state = lifecycle.state.clone();
            drop(lifecycle);
            drop(io);
            drop(engine);
            notifier.join();
            debug!(state = %state, "session stopped while engine was loading");
            return Err(invalid(Operation::Start, &state));
        }

        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name(self.options.engine_thread_name.clone())
            .spawn(move || run_engine(engine, io, &shared));
        match spawned {
            Ok(handle) => {
                lifecycle.input = Some(input_tx);
                lifecycle.workers = Some(Workers {
                    engine: handle,
                    stop,
                    notifier,
                });
                lifecycle.transition(SessionState::Running);
                drop(lifecycle);
                info!(config = %self.config, "session running");
                Ok(())
            }
            Err(source) => {
                lifecycle.transition(SessionState::Stopped(StopReason::LaunchFailed));
                drop(lifecycle);
                error!(error = %source, "failed to spawn engine thread");
                notifier.join();
                Err(SessionError::Launch {
                    role: "engine",
                    source,
                })
            }
        }
    }

    /// Submits bytes for the guest console.
    ///
    /// Never waits on engine progress. Empty buffers are accepted and
    /// ignored.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidState`] unless the session is `Running`.
    pub fn write_data(&self, bytes: impl Into<Vec<u8>>) -> Result<(), SessionError> {
        self.enqueue(Operation::WriteData, InputEvent::Data(bytes.into()))
    }

    /// Reports a new host console geometry to the engine, ordered with data.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidState`] unless the session is `Running`.
    pub fn resize(&self, columns: u16, rows: u16) -> Result<(), SessionError> {
        self.enqueue(Operation::Resize, InputEvent::Resize { columns, rows })
    }

    /// Encodes a special key with modifiers and submits it.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidState`] unless the session is `Running`.
    pub fn send_key(&self, key: TerminalKey, modifiers: Modifiers) -> Result<(), SessionError> {
        self.write_data(encode_key(key, modifiers))
    }

    /// Encodes text with modifiers and submits it.
    ///
    /// With [`Modifiers::control`] only the first character is sent, as a
    /// control code.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidState`] unless the session is `Running`.
    pub fn send_text(&self, text: &str, modifiers: Modifiers) -> Result<(), SessionError> {
        self.write_data(encode_sequence(text.as_bytes(), modifiers))
    }

    fn enqueue(&self, operation: Operation, event: InputEvent) -> Result<(), SessionError> {
        let lifecycle = self.shared.lifecycle.lock();
        let input = match (&lifecycle.state, lifecycle.input.as_ref()) {
            (SessionState::Running, Some(input)) => input,
            (state, _) => return Err(invalid(operation, state)),
        };
        let payload = match &event {
            InputEvent::Data(bytes) if bytes.is_empty() => return Ok(()),
            InputEvent::Data(bytes) => bytes.len(),
            InputEvent::Resize { .. } => 0,
        };
        if !input.send(event) {
            warn!(%operation, "engine input queue closed while running");
            return Err(invalid(operation, &lifecycle.state));
        }
        self.shared.diagnostics.note_input(payload);
        Ok(())
    }

    /// Stops the session and waits for its background threads to exit.
    ///
    /// Idempotent. From `Created` the session moves to
    /// `Stopped(NeverStarted)`; from `Running` to `Stopped(Requested)`. A
    /// session that already stopped on its own keeps its stop reason, but
    /// its threads are still joined here.
    ///
    /// May be called from inside a delegate callback; the notifier thread
    /// then finishes on its own once the callback returns.
    pub fn stop(&self) {
        let workers = {
            let mut lifecycle = self.shared.lifecycle.lock();
            match lifecycle.state {
                SessionState::Created => {
                    lifecycle.transition(SessionState::Stopped(StopReason::NeverStarted));
                }
                SessionState::Running => {
                    lifecycle.transition(SessionState::Stopped(StopReason::Requested));
                }
                SessionState::Stopped(_) => {}
            }
            if let Some(workers) = lifecycle.workers.as_ref() {
                workers.stop.request();
                workers.notifier.close();
            }
            lifecycle.input = None;
            lifecycle.workers.take()
        };

        let Some(workers) = workers else {
            return;
        };
        let current = thread::current().id();
        if workers.engine.thread().id() == current {
            warn!("stop called on the engine thread; not joining it");
        } else if workers.engine.join().is_err() {
            warn!("engine thread panicked outside the run loop");
        }
        if workers.notifier.thread_id() == current {
            debug!("stop called from a delegate callback; notifier exits after it returns");
        } else {
            workers.notifier.join();
        }
        info!(config = %self.config, state = %self.state(), "session stopped");
    }

    fn abort_start(&self, reason: StopReason) {
        let mut lifecycle = self.shared.lifecycle.lock();
        if lifecycle.state == SessionState::Created {
            lifecycle.transition(SessionState::Stopped(reason));
        }
    }
}

impl<L: EngineLoader> Drop for SessionController<L> {
    fn drop(&mut self) {
        self.stop();
    }
}

impl<L: EngineLoader> fmt::Debug for SessionController<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionController")
            .field("config", &self.config)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

fn invalid(operation: Operation, state: &SessionState) -> SessionError {
    InvalidStateError {
        operation,
        state: state.clone(),
    }
    .into()
}

fn run_engine<E: Engine>(engine: E, io: EngineIo, shared: &Shared) {
    debug!("engine run loop entered");
    // Released inside the guard: a panicking `Drop` is an engine fault.
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        let mut engine = engine;
        let result = engine.run(&io);
        drop(engine);
        result
    }));

    let reason = match outcome {
        Ok(Ok(())) if io.should_stop() => StopReason::Requested,
        Ok(Ok(())) => StopReason::EngineExited,
        Ok(Err(fault)) => StopReason::EngineFault(fault),
        Err(payload) => StopReason::EngineFault(EngineFault::from_panic(payload.as_ref())),
    };

    let mut lifecycle = shared.lifecycle.lock();
    if !lifecycle.state.is_running() {
        debug!(reason = %reason, "engine run loop exited after stop");
        return;
    }
    match &reason {
        StopReason::EngineFault(fault) => error!(fault = %fault, "engine run loop faulted"),
        _ => info!(reason = %reason, "engine run loop exited on its own"),
    }
    lifecycle.input = None;
    lifecycle.transition(SessionState::Stopped(reason.clone()));
    drop(lifecycle);

    let EngineIo { output, .. } = io;
    output.terminate(reason);
}
