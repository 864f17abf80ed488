use std::fmt;

use crate::EngineFault;

/// Why a session reached [`SessionState::Stopped`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StopReason {
    /// Stopped or dropped before `start` was ever called.
    NeverStarted,
    /// `start` failed while loading the engine configuration.
    ConfigRejected,
    /// `start` loaded the engine but a background thread could not be spawned.
    LaunchFailed,
    /// The host requested shutdown of a running session.
    Requested,
    /// The engine run loop returned on its own without a stop request.
    EngineExited,
    /// The engine run loop failed with an unrecoverable fault.
    EngineFault(EngineFault),
}

impl StopReason {
    /// Returns `true` when the engine run loop had been launched before stopping.
    #[must_use]
    pub const fn was_started(&self) -> bool {
        matches!(
            self,
            Self::Requested | Self::EngineExited | Self::EngineFault(_)
        )
    }

    /// Returns the engine fault, when this stop was caused by one.
    #[must_use]
    pub const fn fault(&self) -> Option<&EngineFault> {
        match self {
            Self::EngineFault(fault) => Some(fault),
            Self::NeverStarted
            | Self::ConfigRejected
            | Self::LaunchFailed
            | Self::Requested
            | Self::EngineExited => None,
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NeverStarted => f.write_str("never started"),
            Self::ConfigRejected => f.write_str("configuration rejected"),
            Self::LaunchFailed => f.write_str("launch failed"),
            Self::Requested => f.write_str("stop requested"),
            Self::EngineExited => f.write_str("engine exited"),
            Self::EngineFault(fault) => write!(f, "{fault}"),
        }
    }
}

/// Monotonic lifecycle of a session controller.
///
/// `Created -> Running -> Stopped`, or `Created -> Stopped`. No state is
/// ever re-entered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    /// Constructed; the engine has not been loaded.
    #[default]
    Created,
    /// The engine run loop is executing on its background thread.
    Running,
    /// Terminal state.
    Stopped(StopReason),
}

impl SessionState {
    /// Returns `true` while the engine run loop is live.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Returns `true` once the session reached its terminal state.
    #[must_use]
    pub const fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped(_))
    }

    /// Returns `true` if the run loop was ever launched, whether or not it is still live.
    #[must_use]
    pub const fn was_started(&self) -> bool {
        match self {
            Self::Created => false,
            Self::Running => true,
            Self::Stopped(reason) => reason.was_started(),
        }
    }

    /// Returns the stop reason for a terminal state.
    #[must_use]
    pub const fn stop_reason(&self) -> Option<&StopReason> {
        match self {
            Self::Stopped(reason) => Some(reason),
            Self::Created | Self::Running => None,
        }
    }

    /// Returns `true` when `next` is a legal successor of this state.
    #[must_use]
    pub const fn can_transition_to(&self, next: &Self) -> bool {
        matches!(
            (self, next),
            (Self::Created, Self::Running | Self::Stopped(_))
                | (Self::Running, Self::Stopped(_))
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => f.write_str("created"),
            Self::Running => f.write_str("running"),
            Self::Stopped(reason) => write!(f, "stopped ({reason})"),
        }
    }
}

/// Controller operations that are gated by the session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `start`
    Start,
    /// `write_data`
    WriteData,
    /// `resize`
    Resize,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Start => "start",
            Self::WriteData => "write data",
            Self::Resize => "resize",
        })
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{SessionState, StopReason};
    use crate::EngineFault;

    #[test]
    fn default_state_is_created() {
        assert_eq!(SessionState::default(), SessionState::Created);
    }

    #[rstest]
    #[case(SessionState::Created, false, false, false)]
    #[case(SessionState::Running, true, false, true)]
    #[case(SessionState::Stopped(StopReason::NeverStarted), false, true, false)]
    #[case(SessionState::Stopped(StopReason::ConfigRejected), false, true, false)]
    #[case(SessionState::Stopped(StopReason::LaunchFailed), false, true, false)]
    #[case(SessionState::Stopped(StopReason::Requested), false, true, true)]
    #[case(SessionState::Stopped(StopReason::EngineExited), false, true, true)]
    #[case(
        SessionState::Stopped(StopReason::EngineFault(EngineFault::new("x"))),
        false,
        true,
        true
    )]
    fn state_queries_distinguish_lifecycle_phases(
        #[case] state: SessionState,
        #[case] running: bool,
        #[case] stopped: bool,
        #[case] started: bool,
    ) {
        assert_eq!(state.is_running(), running);
        assert_eq!(state.is_stopped(), stopped);
        assert_eq!(state.was_started(), started);
    }

    #[test]
    fn transitions_are_monotonic() {
        let created = SessionState::Created;
        let running = SessionState::Running;
        let stopped = SessionState::Stopped(StopReason::Requested);

        assert!(created.can_transition_to(&running));
        assert!(created.can_transition_to(&stopped));
        assert!(running.can_transition_to(&stopped));

        assert!(!running.can_transition_to(&created));
        assert!(!running.can_transition_to(&running));
        assert!(!stopped.can_transition_to(&created));
        assert!(!stopped.can_transition_to(&running));
        assert!(!stopped.can_transition_to(&SessionState::Stopped(StopReason::EngineExited)));
    }

    #[test]
    fn fault_accessor_reports_only_engine_fault_variant() {
        let fault = EngineFault::new("bad opcode stream");
        assert_eq!(
            StopReason::EngineFault(fault.clone()).fault(),
            Some(&fault)
        );
        assert_eq!(StopReason::Requested.fault(), None);
        assert_eq!(StopReason::ConfigRejected.fault(), None);
    }

    #[test]
    fn display_is_human_readable() {
        assert_eq!(SessionState::Running.to_string(), "running");
        assert_eq!(
            SessionState::Stopped(StopReason::EngineFault(EngineFault::new("oops"))).to_string(),
            "stopped (engine fault: oops)"
        );
    }
}
