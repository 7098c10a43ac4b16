//! Error types for the lifecycle engine
//!
//! Failures are grouped the way a smoke run reports them:
//! - Provisioning failures from the platform client
//! - Assertion timeouts and violations from the poller
//! - Generator exhaustion
//!
//! [`ConfigError`] is separate: it ends a run before anything is provisioned.

use std::path::PathBuf;
use std::time::Duration;

/// Main lifecycle error type
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    /// A platform command exited non-zero
    #[error("provisioning failed: `cf {command}` exited with status {exit_code}")]
    ProvisioningFailure {
        /// Redacted command line, without the executable
        command: String,
        /// Exit code reported by the platform client
        exit_code: i32,
    },

    /// A platform command could not be run at all
    #[error("provisioning failed: could not run `cf {command}`: {source}")]
    PlatformUnavailable {
        /// Redacted command line
        command: String,
        /// Underlying client error
        #[source]
        source: PlatformError,
    },

    /// A platform command did not finish before its deadline
    #[error("provisioning failed: `cf {command}` did not finish within {timeout:?}")]
    PlatformTimeout {
        /// Redacted command line
        command: String,
        /// Scaled deadline that elapsed
        timeout: Duration,
    },

    /// An eventually-matches assertion never observed its pattern
    #[error("timed out after {timeout:?} waiting for {expected}; last observed: {last_observed}")]
    AssertionTimeout {
        /// Description of the expected pattern
        expected: String,
        /// Scaled timeout that elapsed
        timeout: Duration,
        /// Last probe text (or transport error) seen before the deadline
        last_observed: String,
    },

    /// A consistently-not-matches assertion observed a forbidden pattern
    #[error("observed forbidden {forbidden} after {elapsed:?}: {offending:?}")]
    AssertionViolation {
        /// Description of the forbidden pattern
        forbidden: String,
        /// Time into the window at which the violation was seen
        elapsed: Duration,
        /// Probe text that satisfied the forbidden pattern
        offending: String,
    },

    /// An earlier step left the run in a state this step cannot start from
    #[error("precondition not met: {0}")]
    Precondition(String),

    /// Identifier generation failed
    #[error("identifier generation failed: {0}")]
    Identifier(#[from] IdentifierError),
}

impl LifecycleError {
    /// Check if error came from the platform client
    #[inline]
    #[must_use]
    pub fn is_provisioning(&self) -> bool {
        matches!(
            self,
            Self::ProvisioningFailure { .. }
                | Self::PlatformUnavailable { .. }
                | Self::PlatformTimeout { .. }
        )
    }

    /// Check if error came from a polling assertion
    #[inline]
    #[must_use]
    pub fn is_assertion(&self) -> bool {
        matches!(
            self,
            Self::AssertionTimeout { .. } | Self::AssertionViolation { .. }
        )
    }
}

/// Configuration errors, fatal before any provisioning happens
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// No config path was given on the command line or in `CONFIG_PATH`
    #[error("no config path was set (use --config or CONFIG_PATH)")]
    MissingPath,

    /// Config file could not be read
    #[error("cannot read {path}: {source}")]
    Io {
        /// Path that failed
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid JSON for the expected shape
    #[error("cannot parse {path}: {source}")]
    Parse {
        /// Path that failed
        path: PathBuf,
        /// Underlying JSON error
        #[source]
        source: serde_json::Error,
    },

    /// An override could not be parsed
    #[error("unable to parse {key}={value:?} as {expected}")]
    InvalidOverride {
        /// Setting name
        key: &'static str,
        /// Raw value
        value: String,
        /// Expected type
        expected: &'static str,
    },

    /// A setting has an unusable value
    #[error("invalid {key}: {reason}")]
    Invalid {
        /// Setting name
        key: &'static str,
        /// Why it was rejected
        reason: String,
    },
}

/// Probe transport errors
///
/// The poller records these as non-matching observations.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// Request could not be sent or the response body could not be read
    #[error("transport error: {0}")]
    Transport(String),

    /// Probe client could not be constructed
    #[error("client setup failed: {0}")]
    Setup(String),
}

impl From<reqwest::Error> for ProbeError {
    fn from(value: reqwest::Error) -> Self {
        ProbeError::Transport(value.to_string())
    }
}

/// Platform client errors (as opposed to non-zero exits)
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    /// The CLI process could not be spawned or awaited
    #[error("process error: {0}")]
    Process(#[from] std::io::Error),

    /// The CLI process ended without an exit code (killed by a signal)
    #[error("process terminated without an exit code")]
    Terminated,
}

/// Identifier generator errors
#[derive(Debug, thiserror::Error)]
pub enum IdentifierError {
    /// More distinct identifiers were requested than the alphabet can produce
    #[error("requested {requested} distinct identifiers, but only {capacity} exist")]
    SpaceExhausted {
        /// Batch size requested
        requested: usize,
        /// Number of distinct identifiers available
        capacity: u128,
    },
}
