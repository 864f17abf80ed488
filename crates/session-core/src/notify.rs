//! Notifier thread delivering engine output to the registered delegate.
//!
//! Exactly one notifier exists per running session. It consumes the
//! notification channel in order and invokes the delegate synchronously, so
//! at most one delivery is in flight and deliveries never overlap. A delegate
//! callback that panics is logged and counted; delivery continues with the
//! next notification.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{JoinHandle, ThreadId};

use crossbeam_channel::Receiver;
use tracing::{debug, trace, warn};

use crate::output::Notification;
use crate::fault::panic_message;
use crate::{DelegateSlot, SessionDiagnostics};

pub(crate) struct Notifier {
    closed: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl Notifier {
    pub(crate) fn spawn(
        name: &str,
        rx: Receiver<Notification>,
        delegate: Arc<DelegateSlot>,
        diagnostics: Arc<SessionDiagnostics>,
    ) -> io::Result<Self> {
        let closed = Arc::new(AtomicBool::new(false));
        let closed_for_thread = Arc::clone(&closed);
        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run_notifier(&rx, &closed_for_thread, &delegate, &diagnostics))?;
        Ok(Self { closed, handle })
    }

    /// Suppresses every delivery that has not started yet.
    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub(crate) fn thread_id(&self) -> ThreadId {
        self.handle.thread().id()
    }

    /// Waits for the thread to exit. Requires every output sender to be dropped.
    pub(crate) fn join(self) {
        if self.handle.join().is_err() {
            warn!("notifier thread panicked");
        }
    }
}

fn run_notifier(
    rx: &Receiver<Notification>,
    closed: &AtomicBool,
    delegate: &DelegateSlot,
    diagnostics: &SessionDiagnostics,
) {
    debug!("notifier started");
    while let Ok(notification) = rx.recv() {
        if closed.load(Ordering::Acquire) {
            if matches!(notification, Notification::Output(_)) {
                diagnostics.note_discarded();
            }
            continue;
        }
        match notification {
            Notification::Output(bytes) => match delegate.current() {
                Some(sink) => {
                    if guarded("on_output", diagnostics, || sink.on_output(&bytes)) {
                        diagnostics.note_delivered();
                    }
                }
                None => {
                    trace!(len = bytes.len(), "no delegate registered, output dropped");
                    diagnostics.note_dropped();
                }
            },
            Notification::Terminated(reason) => {
                if let Some(sink) = delegate.current() {
                    if guarded("on_terminated", diagnostics, || sink.on_terminated(&reason)) {
                        diagnostics.note_terminal();
                    }
                }
            }
        }
    }
    debug!("notifier exited");
}

/// Runs one delegate callback, returning `false` if it panicked.
fn guarded(callback: &'static str, diagnostics: &SessionDiagnostics, call: impl FnOnce()) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(()) => true,
        Err(payload) => {
            let detail = panic_message(payload.as_ref());
            warn!(callback, panic = %detail, "delegate callback panicked");
            diagnostics.note_delegate_panic();
            false
        }
    }
}
