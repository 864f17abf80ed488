//! Error taxonomy for configuration, state-machine, and launch failures.
//!
//! Construction-time and state-machine errors are returned synchronously
//! from the calling operation. Run-loop faults happen on the engine thread
//! and are reported out of band through [`crate::StopReason::EngineFault`]
//! and [`crate::OutputSink::on_terminated`].

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::{Operation, SessionState};

/// Configuration path invalid or engine construction failed.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration path was empty.
    #[error("configuration path is empty")]
    EmptyPath,
    /// The configuration file could not be read.
    #[error("cannot read configuration {}", path.display())]
    Unreadable {
        /// Path that failed to read.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },
    /// The configuration text is syntactically invalid.
    #[error("malformed configuration at line {line}: {reason}")]
    Malformed {
        /// 1-indexed line number of the offending entry.
        line: usize,
        /// What was wrong with it.
        reason: String,
    },
    /// A mandatory entry is absent.
    #[error("configuration is missing `{0}`")]
    MissingField(&'static str),
    /// The configuration declares a version this engine does not understand.
    #[error("unsupported configuration version {0}")]
    UnsupportedVersion(u64),
    /// The declared memory size cannot be instantiated.
    #[error("invalid memory size {0} MiB")]
    InvalidMemorySize(u64),
    /// A referenced image file does not exist.
    #[error("image `{key}` not found at {}", path.display())]
    MissingImage {
        /// Configuration key naming the image.
        key: String,
        /// Resolved image path.
        path: PathBuf,
    },
    /// A machine description document could not be decoded.
    #[error("invalid machine description")]
    InvalidDescription(#[source] serde_json::Error),
    /// A rendered configuration could not be written out.
    #[error("cannot write configuration {}", path.display())]
    Write {
        /// Destination path.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },
}

/// An operation was attempted in a state that forbids it.
///
/// Returning this error never changes the session state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot {operation} while session is {state}")]
pub struct InvalidStateError {
    /// Operation that was rejected.
    pub operation: Operation,
    /// State observed when the operation was rejected.
    pub state: SessionState,
}

/// Errors returned synchronously by [`crate::SessionController`] operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Configuration path invalid or engine construction failed.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Operation not allowed in the current session state.
    #[error(transparent)]
    InvalidState(#[from] InvalidStateError),
    /// A background thread could not be spawned.
    #[error("failed to launch {role} thread")]
    Launch {
        /// Which thread failed to start.
        role: &'static str,
        /// Underlying spawn failure.
        #[source]
        source: io::Error,
    },
}

impl SessionError {
    /// Returns the configuration error, if this is one.
    #[must_use]
    pub const fn as_config(&self) -> Option<&ConfigError> {
        match self {
            Self::Config(err) => Some(err),
            Self::InvalidState(_) | Self::Launch { .. } => None,
        }
    }

    /// Returns the invalid-state error, if this is one.
    #[must_use]
    pub const fn as_invalid_state(&self) -> Option<&InvalidStateError> {
        match self {
            Self::InvalidState(err) => Some(err),
            Self::Config(_) | Self::Launch { .. } => None,
        }
    }
}
