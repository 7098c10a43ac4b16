//! Bounded polling assertions
//!
//! Two complementary modes over a [`Probe`]:
//! - `eventually_matches`: poll until the text matches or the deadline passes
//! - `consistently_not_matches`: poll across the whole window, failing on the
//!   first match
//!
//! Transport errors count as non-matching observations in both modes. Every
//! poll is bounded by the assertion's absolute deadline.

use crate::error::LifecycleError;
use crate::pattern::Matcher;
use crate::probe::{Probe, ProbeRequest};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Instant};

/// Longest timeout a policy can hold after scaling
pub const MAX_TIMEOUT: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// `timeout * scale`, or `None` if it is not a representable duration up to
/// [`MAX_TIMEOUT`]
#[must_use]
pub fn scale_timeout(timeout: Duration, scale: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(timeout.as_secs_f64() * scale)
        .ok()
        .filter(|scaled| *scaled <= MAX_TIMEOUT)
}

/// Timeout and cadence of one assertion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Total time allowed (eventually) or observed (consistently)
    pub timeout: Duration,
    /// Pause between polls
    pub interval: Duration,
}

impl PollPolicy {
    /// Create a policy
    #[inline]
    #[must_use]
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }

    /// Multiply the timeout by `scale`, keeping the interval
    ///
    /// Saturates at [`MAX_TIMEOUT`].
    #[must_use]
    pub fn scaled(self, scale: f64) -> Self {
        Self {
            timeout: scale_timeout(self.timeout, scale).unwrap_or(MAX_TIMEOUT),
            interval: self.interval,
        }
    }
}

/// What the poller last saw
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// Response body
    Text(String),
    /// Transport error message
    Error(String),
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Observation::Text(text) => write!(f, "{text:?}"),
            Observation::Error(err) => write!(f, "<{err}>"),
        }
    }
}

/// Result of one polling assertion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The assertion held
    Satisfied {
        /// Probe calls made
        polls: u32,
        /// Time spent polling
        elapsed: Duration,
    },
    /// `eventually` never matched before the deadline
    TimedOut {
        /// Timeout that elapsed
        timeout: Duration,
        /// Probe calls made
        polls: u32,
        /// Last complete observation, if any poll finished
        last_observed: Option<Observation>,
    },
    /// `consistently_not` matched inside the window
    Violated {
        /// Time into the window
        elapsed: Duration,
        /// Matching response body
        offending: String,
    },
}

impl PollOutcome {
    /// Whether the assertion held
    #[inline]
    #[must_use]
    pub fn is_satisfied(&self) -> bool {
        matches!(self, Self::Satisfied { .. })
    }

    /// Convert to a step result, describing failures with `matcher`
    ///
    /// # Errors
    /// `AssertionTimeout` or `AssertionViolation` for the failing outcomes.
    pub fn into_result(self, matcher: &Matcher) -> Result<(), LifecycleError> {
        match self {
            Self::Satisfied { .. } => Ok(()),
            Self::TimedOut {
                timeout,
                last_observed,
                ..
            } => Err(LifecycleError::AssertionTimeout {
                expected: matcher.to_string(),
                timeout,
                last_observed: last_observed
                    .map_or_else(|| "<no response>".to_string(), |o| o.to_string()),
            }),
            Self::Violated { elapsed, offending } => Err(LifecycleError::AssertionViolation {
                forbidden: matcher.to_string(),
                elapsed,
                offending,
            }),
        }
    }
}

/// Poll until the probe text matches, or the timeout elapses
pub async fn eventually_matches(
    probe: &dyn Probe,
    request: &ProbeRequest,
    matcher: &Matcher,
    policy: PollPolicy,
) -> PollOutcome {
    let started = Instant::now();
    let deadline = started + policy.timeout;
    let mut polls = 0u32;
    let mut last_observed = None;

    loop {
        polls += 1;
        match time::timeout_at(deadline, probe.send(request)).await {
            Ok(Ok(text)) => {
                if matcher.is_match(&text) {
                    return PollOutcome::Satisfied {
                        polls,
                        elapsed: started.elapsed(),
                    };
                }
                last_observed = Some(Observation::Text(text));
            }
            Ok(Err(err)) => {
                tracing::debug!(url = %request.url, error = %err, "probe failed, retrying");
                last_observed = Some(Observation::Error(err.to_string()));
            }
            Err(_) => {}
        }

        let now = Instant::now();
        if now >= deadline {
            return PollOutcome::TimedOut {
                timeout: policy.timeout,
                polls,
                last_observed,
            };
        }
        time::sleep(policy.interval.min(deadline - now)).await;
    }
}

/// Poll across the whole window, failing on the first match
pub async fn consistently_not_matches(
    probe: &dyn Probe,
    request: &ProbeRequest,
    matcher: &Matcher,
    policy: PollPolicy,
) -> PollOutcome {
    let started = Instant::now();
    let deadline = started + policy.timeout;
    let mut polls = 0u32;

    loop {
        polls += 1;
        match time::timeout_at(deadline, probe.send(request)).await {
            Ok(Ok(text)) => {
                if matcher.is_match(&text) {
                    return PollOutcome::Violated {
                        elapsed: started.elapsed(),
                        offending: text,
                    };
                }
            }
            Ok(Err(err)) => {
                tracing::debug!(url = %request.url, error = %err, "probe failed during window");
            }
            Err(_) => break,
        }

        let now = Instant::now();
        if now >= deadline {
            break;
        }
        time::sleep(policy.interval.min(deadline - now)).await;
    }

    PollOutcome::Satisfied {
        polls,
        elapsed: started.elapsed(),
    }
}

/// A probe bound to the run's scaled policies
#[derive(Clone)]
pub struct Poller {
    probe: Arc<dyn Probe>,
    eventually: PollPolicy,
    consistently: PollPolicy,
}

impl Poller {
    /// Create a poller
    ///
    /// `consistently` is usually the same window as `eventually`; it is
    /// separate so long negative checks can be shortened.
    #[must_use]
    pub fn new(probe: Arc<dyn Probe>, eventually: PollPolicy, consistently: PollPolicy) -> Self {
        Self {
            probe,
            eventually,
            consistently,
        }
    }

    /// Policy used by [`Poller::eventually`]
    #[must_use]
    pub fn eventually_policy(&self) -> PollPolicy {
        self.eventually
    }

    /// Policy used by [`Poller::consistently_not`]
    #[must_use]
    pub fn consistently_policy(&self) -> PollPolicy {
        self.consistently
    }

    /// Assert the probe text eventually matches
    ///
    /// # Errors
    /// `LifecycleError::AssertionTimeout` with the last observed text.
    pub async fn eventually(
        &self,
        request: &ProbeRequest,
        matcher: &Matcher,
    ) -> Result<(), LifecycleError> {
        eventually_matches(self.probe.as_ref(), request, matcher, self.eventually)
            .await
            .into_result(matcher)
    }

    /// Assert the probe text never matches during the window
    ///
    /// # Errors
    /// `LifecycleError::AssertionViolation` with the offending text.
    pub async fn consistently_not(
        &self,
        request: &ProbeRequest,
        matcher: &Matcher,
    ) -> Result<(), LifecycleError> {
        consistently_not_matches(self.probe.as_ref(), request, matcher, self.consistently)
            .await
            .into_result(matcher)
    }
}
