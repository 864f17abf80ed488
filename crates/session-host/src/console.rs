use std::io::Write;

use parking_lot::Mutex;
use session_core::{OutputSink, StopReason};
use tracing::warn;

/// Output delegate that copies guest output to a writer, usually stdout.
#[derive(Debug)]
pub struct Console<W> {
    out: Mutex<W>,
    terminated: Mutex<Option<StopReason>>,
}

impl<W: Write> Console<W> {
    /// Wraps `out`.
    pub const fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
            terminated: Mutex::new(None),
        }
    }

    /// Stop reason reported through the terminal notification, if any.
    pub fn terminated(&self) -> Option<StopReason> {
        self.terminated.lock().clone()
    }

    /// Unwraps the writer.
    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

impl<W: Write + Send> OutputSink for Console<W> {
    fn on_output(&self, bytes: &[u8]) {
        let mut out = self.out.lock();
        if let Err(err) = out.write_all(bytes).and_then(|()| out.flush()) {
            warn!(error = %err, len = bytes.len(), "console write failed");
        }
    }

    fn on_terminated(&self, reason: &StopReason) {
        *self.terminated.lock() = Some(reason.clone());
    }
}
