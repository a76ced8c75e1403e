//! Retry policy: how many attempts, how long to wait, and what to retry.
//!
//! ## Model
//!
//! Every failed attempt is described by an [`AttemptFailure`]. A
//! [`FailureClassifier`] maps it to one of three classes:
//!
//! | Class | Meaning |
//! |-------|---------|
//! | [`FailureClass::Retryable`] | try again after the fixed delay |
//! | [`FailureClass::Fatal`] | give up on this diagram now |
//! | [`FailureClass::BatchAborting`] | retry like `Retryable`; if attempts run out, stop the whole batch |
//!
//! The [`DefaultClassifier`] treats everything as retryable except a failure
//! to connect, which is batch-aborting: if the service cannot be reached at
//! all, no later diagram can succeed either.
//!
//! The delay is fixed, not exponential. Requests are issued one at a time,
//! so there is no herd to spread out.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Default maximum attempts per diagram.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default delay between attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// What went wrong on a single attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The request did not complete within the timeout.
    Timeout,
    /// No connection could be established.
    Connect,
    /// The service answered with a status other than 200.
    HttpStatus(u16),
    /// Status 200 but the body is not the expected artifact.
    InvalidBody,
    /// Any other transport or unexpected error.
    Transport,
}

/// A failed attempt with a human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptFailure {
    pub kind: FailureKind,
    pub reason: String,
}

impl AttemptFailure {
    pub fn new(kind: FailureKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)
    }
}

/// How an attempt failure affects the retry loop and the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Retryable,
    Fatal,
    BatchAborting,
}

/// Maps attempt failures to a [`FailureClass`].
pub trait FailureClassifier: Send + Sync {
    fn classify(&self, failure: &AttemptFailure) -> FailureClass;
}

/// Retry everything; escalate connection failures to the batch.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultClassifier;

impl FailureClassifier for DefaultClassifier {
    fn classify(&self, failure: &AttemptFailure) -> FailureClass {
        match failure.kind {
            FailureKind::Connect => FailureClass::BatchAborting,
            FailureKind::Timeout
            | FailureKind::HttpStatus(_)
            | FailureKind::InvalidBody
            | FailureKind::Transport => FailureClass::Retryable,
        }
    }
}

/// Outcome of [`RetryPolicy::decide`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for the given duration, then attempt again.
    RetryAfter(Duration),
    /// Stop attempting this diagram.
    GiveUp,
}

/// Attempt bound, fixed delay, and failure classification.
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
    classifier: Arc<dyn FailureClassifier>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY)
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("delay", &self.delay)
            .field("classifier", &"<dyn FailureClassifier>")
            .finish()
    }
}

impl RetryPolicy {
    /// `max_attempts` is clamped to at least 1.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            classifier: Arc::new(DefaultClassifier),
        }
    }

    /// Zero-delay policy, mainly for tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO)
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn FailureClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn classify(&self, failure: &AttemptFailure) -> FailureClass {
        self.classifier.classify(failure)
    }

    /// Decide what follows failed attempt number `attempt` (1-based).
    pub fn decide(&self, attempt: u32, class: FailureClass) -> RetryDecision {
        match class {
            FailureClass::Fatal => RetryDecision::GiveUp,
            FailureClass::Retryable | FailureClass::BatchAborting => {
                if attempt < self.max_attempts {
                    RetryDecision::RetryAfter(self.delay)
                } else {
                    RetryDecision::GiveUp
                }
            }
        }
    }

    /// Upper bound on time spent sleeping for one diagram.
    pub fn max_total_delay(&self) -> Duration {
        self.delay * (self.max_attempts - 1)
    }
}
