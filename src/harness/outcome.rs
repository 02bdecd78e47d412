//! Outcomes and stage signals
//!
//! A stage (setUp, body, tearDown) finishes with `Ok(())` or with a
//! [`Signal`] describing how it stopped. The lifecycle turns those signals
//! into exactly one [`Outcome`] per invocation.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::common::Error;

/// Whether an invocation is expected to pass or to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Expectation {
    #[default]
    Pass,
    Fail,
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => f.write_str("pass"),
            Self::Fail => f.write_str("fail"),
        }
    }
}

/// Reportable description of what went wrong
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cause {
    pub code: String,
    pub message: String,
}

impl Cause {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Cause for a failed assertion
    pub fn assertion(message: impl Into<String>) -> Self {
        Self::new("ASSERTION_FAILED", message)
    }
}

impl From<&Error> for Cause {
    fn from(e: &Error) -> Self {
        Self::new(e.code(), e.to_string())
    }
}

impl fmt::Display for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            f.write_str(&self.code)
        } else {
            write!(f, "{}: {}", self.code, self.message)
        }
    }
}

/// How a stage stopped short of completing normally
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// Deliberate skip request
    Skip(String),
    /// An assertion did not hold
    Failure(Cause),
    /// Anything else went wrong
    Error(Cause),
    /// The stage failed in a way the test declared it would
    ExpectedFailure(Cause),
    /// The stage was declared to fail but passed
    UnexpectedSuccess,
    /// The run is being cancelled; never absorbed
    Interrupted,
}

impl Signal {
    /// Cause carried by this signal, used when it is reinterpreted
    pub fn into_cause(self) -> Cause {
        match self {
            Self::Skip(reason) => Cause::new("SKIP", reason),
            Self::Failure(cause) | Self::Error(cause) | Self::ExpectedFailure(cause) => cause,
            Self::UnexpectedSuccess => Cause::new("UNEXPECTED_SUCCESS", ""),
            Self::Interrupted => Cause::new("INTERRUPTED", ""),
        }
    }
}

impl From<Error> for Signal {
    fn from(e: Error) -> Self {
        match e {
            Error::Interrupted => Self::Interrupted,
            Error::TestAssertion(message) => Self::Failure(Cause::assertion(message)),
            other => Self::Error(Cause::from(&other)),
        }
    }
}

/// Result of running one stage of a test
pub type StageResult = std::result::Result<(), Signal>;

/// Terminal classification of one invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure(Cause),
    Error(Cause),
    Skipped(String),
    ExpectedFailure(Cause),
    UnexpectedSuccess,
}

impl Outcome {
    /// Status reported to the structured logger
    pub fn status(&self) -> Status {
        match self {
            Self::Success => Status::Pass,
            Self::Failure(_) | Self::ExpectedFailure(_) => Status::Fail,
            Self::Error(_) => Status::Error,
            Self::Skipped(_) => Status::Skip,
            Self::UnexpectedSuccess => Status::Pass,
        }
    }

    /// Status the logger should have expected for this outcome
    pub fn expected_status(&self) -> Status {
        match self {
            Self::ExpectedFailure(_) | Self::UnexpectedSuccess => Status::Fail,
            Self::Skipped(_) => Status::Skip,
            _ => Status::Pass,
        }
    }

    /// Whether this outcome counts against the run
    pub fn is_problem(&self) -> bool {
        matches!(
            self,
            Self::Failure(_) | Self::Error(_) | Self::UnexpectedSuccess
        )
    }

    pub fn message(&self) -> Option<String> {
        match self {
            Self::Success => None,
            Self::Failure(cause) | Self::Error(cause) | Self::ExpectedFailure(cause) => {
                Some(cause.to_string())
            }
            Self::Skipped(reason) => Some(reason.clone()),
            Self::UnexpectedSuccess => Some("expected failure did not occur".to_string()),
        }
    }
}

/// Test status values of the structured log format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Pass,
    Fail,
    Error,
    Skip,
    Timeout,
    Crash,
    Ok,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::Error => "ERROR",
            Self::Skip => "SKIP",
            Self::Timeout => "TIMEOUT",
            Self::Crash => "CRASH",
            Self::Ok => "OK",
        };
        f.write_str(s)
    }
}

/// Fail the current stage unless `condition` holds
pub fn check(condition: bool, message: impl Into<String>) -> StageResult {
    if condition {
        Ok(())
    } else {
        Err(Signal::Failure(Cause::assertion(message)))
    }
}

/// Fail the current stage unless `expected == actual`
pub fn check_eq<T: PartialEq + fmt::Debug>(expected: T, actual: T, message: &str) -> StageResult {
    if expected == actual {
        Ok(())
    } else {
        Err(Signal::Failure(Cause::assertion(format!(
            "{:?} != {:?} : {}",
            expected, actual, message
        ))))
    }
}

/// Skip the current test
pub fn skip(reason: impl Into<String>) -> StageResult {
    Err(Signal::Skip(reason.into()))
}

/// Invert a body result for a test declared to fail
///
/// Any failure becomes [`Signal::ExpectedFailure`] and a clean run becomes
/// [`Signal::UnexpectedSuccess`]. Skips and interrupts pass through.
pub fn expect_failure(result: StageResult) -> StageResult {
    match result {
        Ok(()) => Err(Signal::UnexpectedSuccess),
        Err(signal @ (Signal::Skip(_) | Signal::Interrupted)) => Err(signal),
        Err(signal) => Err(Signal::ExpectedFailure(signal.into_cause())),
    }
}
