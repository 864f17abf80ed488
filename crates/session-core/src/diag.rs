//! Session diagnostics counters.
//!
//! Counters are updated lock-free from caller, engine, and notifier threads
//! and read as a point-in-time [`DiagnosticsSnapshot`]. Individual fields are
//! read with relaxed ordering, so a snapshot taken while the session runs may
//! mix values from slightly different instants.

use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of the session counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DiagnosticsSnapshot {
    /// Input events accepted by `write_data`/`resize`.
    pub input_events: u64,
    /// Payload bytes accepted by `write_data`.
    pub input_bytes: u64,
    /// Output chunks emitted by the engine.
    pub output_chunks: u64,
    /// Output chunks handed to a live delegate.
    pub delivered_chunks: u64,
    /// Output chunks dropped because no delegate was registered or alive.
    pub dropped_chunks: u64,
    /// Output chunks discarded because the session stopped before delivery.
    pub discarded_chunks: u64,
    /// Terminal notifications delivered to a delegate.
    pub terminal_notifications: u64,
    /// Delegate callbacks that panicked. The notifier keeps delivering.
    pub delegate_panics: u64,
}

/// Shared atomic counters backing [`DiagnosticsSnapshot`].
#[derive(Debug, Default)]
pub struct SessionDiagnostics {
    input_events: AtomicU64,
    input_bytes: AtomicU64,
    output_chunks: AtomicU64,
    delivered_chunks: AtomicU64,
    dropped_chunks: AtomicU64,
    discarded_chunks: AtomicU64,
    terminal_notifications: AtomicU64,
    delegate_panics: AtomicU64,
}

impl SessionDiagnostics {
    pub(crate) fn note_input(&self, bytes: usize) {
        self.input_events.fetch_add(1, Ordering::Relaxed);
        self.input_bytes
            .fetch_add(u64::try_from(bytes).unwrap_or(u64::MAX), Ordering::Relaxed);
    }

    pub(crate) fn note_output(&self) {
        self.output_chunks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn note_delivered(&self) {
        self.delivered_chunks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn note_dropped(&self) {
        self.dropped_chunks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn note_discarded(&self) {
        self.discarded_chunks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn note_terminal(&self) {
        self.terminal_notifications.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn note_delegate_panic(&self) {
        self.delegate_panics.fetch_add(1, Ordering::Relaxed);
    }

    /// Copies the current counter values.
    #[must_use]
    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            input_events: self.input_events.load(Ordering::Relaxed),
            input_bytes: self.input_bytes.load(Ordering::Relaxed),
            output_chunks: self.output_chunks.load(Ordering::Relaxed),
            delivered_chunks: self.delivered_chunks.load(Ordering::Relaxed),
            dropped_chunks: self.dropped_chunks.load(Ordering::Relaxed),
            discarded_chunks: self.discarded_chunks.load(Ordering::Relaxed),
            terminal_notifications: self.terminal_notifications.load(Ordering::Relaxed),
            delegate_panics: self.delegate_panics.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{DiagnosticsSnapshot, SessionDiagnostics};

    #[test]
    fn fresh_counters_are_zero() {
        assert_eq!(
            SessionDiagnostics::default().snapshot(),
            DiagnosticsSnapshot::default()
        );
    }

    #[test]
    fn counters_accumulate_independently() {
        let diag = SessionDiagnostics::default();
        diag.note_input(3);
        diag.note_input(0);
        diag.note_output();
        diag.note_output();
        diag.note_delivered();
        diag.note_dropped();
        diag.note_discarded();
        diag.note_terminal();
        diag.note_delegate_panic();

        let snap = diag.snapshot();
        assert_eq!(snap.input_events, 2);
        assert_eq!(snap.input_bytes, 3);
        assert_eq!(snap.output_chunks, 2);
        assert_eq!(snap.delivered_chunks, 1);
        assert_eq!(snap.dropped_chunks, 1);
        assert_eq!(snap.discarded_chunks, 1);
        assert_eq!(snap.terminal_notifications, 1);
        assert_eq!(snap.delegate_panics, 1);
    }
}
