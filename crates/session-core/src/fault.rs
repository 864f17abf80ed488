use std::any::Any;

use thiserror::Error;

/// Unrecoverable failure raised by an engine run loop.
///
/// Faults are never retried. The session that observes one moves to
/// [`crate::SessionState::Stopped`] with [`crate::StopReason::EngineFault`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
#[error("engine fault: {message}")]
pub struct EngineFault {
    message: String,
}

impl EngineFault {
    /// Creates a fault carrying a human-readable description.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Builds a fault from a panic payload caught on the engine thread.
    #[must_use]
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        Self::new(format!("engine panicked: {}", panic_message(payload)))
    }

    /// Returns the fault description.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Extracts the message of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|text| (*text).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

#[cfg(test)]
mod tests {
    use super::EngineFault;

    #[test]
    fn fault_display_includes_message() {
        let fault = EngineFault::new("mmu walk failed");
        assert_eq!(fault.message(), "mmu walk failed");
        assert_eq!(fault.to_string(), "engine fault: mmu walk failed");
    }

    #[test]
    fn panic_payloads_are_rendered_for_str_and_string() {
        let from_str = std::panic::catch_unwind(|| panic!("boom")).expect_err("must panic");
        assert_eq!(
            EngineFault::from_panic(from_str.as_ref()).message(),
            "engine panicked: boom"
        );

        let code = 7;
        let from_string =
            std::panic::catch_unwind(move || panic!("code {code}")).expect_err("must panic");
        assert_eq!(
            EngineFault::from_panic(from_string.as_ref()).message(),
            "engine panicked: code 7"
        );

        let opaque = std::panic::catch_unwind(|| std::panic::panic_any(42_u32))
            .expect_err("must panic");
        assert_eq!(
            EngineFault::from_panic(opaque.as_ref()).message(),
            "engine panicked: non-string panic payload"
        );
    }
}
