//! Guest-to-host output path: delegate capability, delegate slot, and the
//! engine-side output handle.

use std::sync::{Arc, Weak};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::RwLock;
use tracing::trace;

use crate::{SessionDiagnostics, StopReason};

/// Receiver of guest output.
///
/// Callbacks run on the session's notifier thread, one at a time and in the
/// order the engine produced them. They never run on the engine thread, so a
/// sink may call back into the controller (including `write_data` and
/// `stop`).
pub trait OutputSink: Send + Sync {
    /// Receives one discrete chunk of guest-produced output.
    fn on_output(&self, bytes: &[u8]);

    /// Receives the terminal notification when the engine faults or exits on
    /// its own. Not invoked for host-requested stops.
    fn on_terminated(&self, reason: &StopReason) {
        let _ = reason;
    }
}

/// Single-slot, replaceable, non-owning reference to an [`OutputSink`].
#[derive(Debug, Default)]
pub struct DelegateSlot {
    sink: RwLock<Option<Weak<dyn OutputSink>>>,
}

impl DelegateSlot {
    /// Registers `sink`, replacing any previous delegate. The slot never keeps it alive.
    pub fn set<S>(&self, sink: &Arc<S>)
    where
        S: OutputSink + 'static,
    {
        let weak: Weak<S> = Arc::downgrade(sink);
        let weak: Weak<dyn OutputSink> = weak;
        *self.sink.write() = Some(weak);
    }

    /// Registers an already type-erased sink.
    pub fn set_dyn(&self, sink: &Arc<dyn OutputSink>) {
        *self.sink.write() = Some(Arc::downgrade(sink));
    }

    /// Empties the slot.
    pub fn clear(&self) {
        *self.sink.write() = None;
    }

    /// Returns a strong reference to the delegate if one is registered and alive.
    ///
    /// The slot lock is released before the caller uses the result, so a
    /// callback may replace the delegate without deadlocking.
    #[must_use]
    pub fn current(&self) -> Option<Arc<dyn OutputSink>> {
        self.sink.read().as_ref().and_then(Weak::upgrade)
    }
}

/// Message carried from the engine thread to the notifier thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Notification {
    Output(Vec<u8>),
    Terminated(StopReason),
}

pub(crate) fn notification_channel() -> (Sender<Notification>, Receiver<Notification>) {
    crossbeam_channel::unbounded()
}

/// Engine-side handle for emitting guest output.
#[derive(Debug, Clone)]
pub struct OutputSender {
    tx: Sender<Notification>,
    diagnostics: Arc<SessionDiagnostics>,
}

impl OutputSender {
    pub(crate) const fn new(tx: Sender<Notification>, diagnostics: Arc<SessionDiagnostics>) -> Self {
        Self { tx, diagnostics }
    }

    /// Emits one output chunk. Empty chunks are ignored.
    ///
    /// Never blocks. Returns `false` once the notifier side is gone, which
    /// only happens while the session is shutting down.
    pub fn emit(&self, bytes: impl Into<Vec<u8>>) -> bool {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return true;
        }
        let len = bytes.len();
        if self.tx.send(Notification::Output(bytes)).is_err() {
            trace!(len, "output emitted after notifier shutdown");
            return false;
        }
        self.diagnostics.note_output();
        true
    }

    pub(crate) fn terminate(&self, reason: StopReason) -> bool {
        self.tx.send(Notification::Terminated(reason)).is_ok()
    }
}
