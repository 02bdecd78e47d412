//! Result collectors and outcome dispatch
//!
//! Every collector understands success, failure and error. Skips, expected
//! failures and unexpected successes are optional; a collector without them
//! gets the nearest category it does understand.

use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;

use super::invocation::TestInvocation;
use super::outcome::{Cause, Outcome};
use super::structured::StructuredLogger;

/// Whether a collector handled an optional report natively
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Recorded,
    Unsupported,
}

/// Receiver of per-invocation results
pub trait ResultCollector: Send {
    fn start_test(&mut self, _test: &TestInvocation) {}

    fn stop_test(&mut self, _test: &TestInvocation) {}

    fn add_success(&mut self, test: &TestInvocation);

    fn add_failure(&mut self, test: &TestInvocation, cause: &Cause);

    fn add_error(&mut self, test: &TestInvocation, cause: &Cause);

    fn add_skip(&mut self, _test: &TestInvocation, _reason: &str) -> Dispatch {
        Dispatch::Unsupported
    }

    fn add_expected_failure(&mut self, _test: &TestInvocation, _cause: &Cause) -> Dispatch {
        Dispatch::Unsupported
    }

    fn add_unexpected_success(&mut self, _test: &TestInvocation) -> Dispatch {
        Dispatch::Unsupported
    }
}

/// The collector method an outcome ended up in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reported {
    Success,
    Failure,
    Error,
    Skip,
    ExpectedFailure,
    UnexpectedSuccess,
}

/// Deliver exactly one report for `outcome`
///
/// Skips and expected failures fold into success and unexpected successes
/// into failure when the collector lacks the matching method.
pub fn report(result: &mut dyn ResultCollector, test: &TestInvocation, outcome: &Outcome) -> Reported {
    match outcome {
        Outcome::Success => {
            result.add_success(test);
            Reported::Success
        }
        Outcome::Failure(cause) => {
            result.add_failure(test, cause);
            Reported::Failure
        }
        Outcome::Error(cause) => {
            result.add_error(test, cause);
            Reported::Error
        }
        Outcome::Skipped(reason) => match result.add_skip(test, reason) {
            Dispatch::Recorded => Reported::Skip,
            Dispatch::Unsupported => {
                tracing::warn!("Result collector has no add_skip, skips not reported");
                result.add_success(test);
                Reported::Success
            }
        },
        Outcome::ExpectedFailure(cause) => match result.add_expected_failure(test, cause) {
            Dispatch::Recorded => Reported::ExpectedFailure,
            Dispatch::Unsupported => {
                tracing::warn!("Result collector has no add_expected_failure, reporting as passes");
                result.add_success(test);
                Reported::Success
            }
        },
        Outcome::UnexpectedSuccess => match result.add_unexpected_success(test) {
            Dispatch::Recorded => Reported::UnexpectedSuccess,
            Dispatch::Unsupported => {
                tracing::warn!(
                    "Result collector has no add_unexpected_success, reporting as failures"
                );
                result.add_failure(
                    test,
                    &Cause::new("UNEXPECTED_SUCCESS", "test was expected to fail but passed"),
                );
                Reported::Failure
            }
        },
    }
}

/// A finished invocation as recorded by [`HarnessResult`]
#[derive(Debug, Clone)]
pub struct RecordedTest {
    pub id: String,
    pub outcome: Outcome,
    pub duration: Duration,
}

/// Collector with native support for every outcome
///
/// Records each invocation, prints a status line per test and mirrors
/// results to a structured logger.
pub struct HarnessResult {
    logger: Arc<dyn StructuredLogger>,
    quiet: bool,
    tests: Vec<RecordedTest>,
    current: Option<Outcome>,
}

impl HarnessResult {
    pub fn new(logger: Arc<dyn StructuredLogger>) -> Self {
        Self {
            logger,
            quiet: false,
            tests: Vec::new(),
            current: None,
        }
    }

    /// Suppress per-test console lines
    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }

    pub fn tests(&self) -> &[RecordedTest] {
        &self.tests
    }

    pub fn tests_run(&self) -> usize {
        self.tests.len()
    }

    fn count(&self, pred: impl Fn(&Outcome) -> bool) -> usize {
        self.tests.iter().filter(|t| pred(&t.outcome)).count()
    }

    pub fn passed(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Success))
    }

    pub fn failures(&self) -> Vec<&RecordedTest> {
        self.tests
            .iter()
            .filter(|t| matches!(t.outcome, Outcome::Failure(_) | Outcome::UnexpectedSuccess))
            .collect()
    }

    pub fn errors(&self) -> Vec<&RecordedTest> {
        self.tests
            .iter()
            .filter(|t| matches!(t.outcome, Outcome::Error(_)))
            .collect()
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Skipped(_)))
    }

    pub fn expected_failures(&self) -> usize {
        self.count(|o| matches!(o, Outcome::ExpectedFailure(_)))
    }

    pub fn unexpected_successes(&self) -> usize {
        self.count(|o| matches!(o, Outcome::UnexpectedSuccess))
    }

    /// True when nothing failed, errored or passed unexpectedly
    pub fn was_successful(&self) -> bool {
        !self.tests.iter().any(|t| t.outcome.is_problem())
    }

    pub fn summary(&self) -> String {
        format!(
            "{} passed / {} failed / {} errors / {} skipped / {} expected failures / {} unexpected successes",
            self.passed(),
            self.count(|o| matches!(o, Outcome::Failure(_))),
            self.errors().len(),
            self.skipped(),
            self.expected_failures(),
            self.unexpected_successes(),
        )
    }

    fn record(&mut self, outcome: Outcome) {
        self.current = Some(outcome);
    }

    fn print_line(&self, test: &TestInvocation, outcome: &Outcome) {
        if self.quiet {
            return;
        }
        let marker = match outcome {
            Outcome::Success => "✓".green(),
            Outcome::Failure(_) | Outcome::UnexpectedSuccess => "✗".red(),
            Outcome::Error(_) => "!".red().bold(),
            Outcome::Skipped(_) => "-".yellow(),
            Outcome::ExpectedFailure(_) => "x".cyan(),
        };
        match outcome.message() {
            Some(message) => println!(
                "{} {} {}",
                marker,
                test.id(),
                format!("({})", message).dimmed()
            ),
            None => println!("{} {}", marker, test.id()),
        }
    }
}

impl ResultCollector for HarnessResult {
    fn start_test(&mut self, test: &TestInvocation) {
        self.current = None;
        self.logger.test_start(test.id());
    }

    fn stop_test(&mut self, test: &TestInvocation) {
        let Some(outcome) = self.current.take() else {
            tracing::warn!("No result recorded for {}", test.id());
            return;
        };
        let status = outcome.status();
        let expected = outcome.expected_status();
        self.logger.test_end(
            test.id(),
            status,
            (status != expected).then_some(expected),
            outcome.message(),
        );
        self.print_line(test, &outcome);
        self.tests.push(RecordedTest {
            id: test.id().to_string(),
            outcome,
            duration: test.duration(),
        });
    }

    fn add_success(&mut self, _test: &TestInvocation) {
        self.record(Outcome::Success);
    }

    fn add_failure(&mut self, _test: &TestInvocation, cause: &Cause) {
        self.record(Outcome::Failure(cause.clone()));
    }

    fn add_error(&mut self, _test: &TestInvocation, cause: &Cause) {
        self.record(Outcome::Error(cause.clone()));
    }

    fn add_skip(&mut self, _test: &TestInvocation, reason: &str) -> Dispatch {
        self.record(Outcome::Skipped(reason.to_string()));
        Dispatch::Recorded
    }

    fn add_expected_failure(&mut self, _test: &TestInvocation, cause: &Cause) -> Dispatch {
        self.record(Outcome::ExpectedFailure(cause.clone()));
        Dispatch::Recorded
    }

    fn add_unexpected_success(&mut self, _test: &TestInvocation) -> Dispatch {
        self.record(Outcome::UnexpectedSuccess);
        Dispatch::Recorded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::structured::{Action, BufferLogger};
    use crate::harness::testing::RecordingCollector;
    use crate::harness::{Expectation, SessionRegistry};
    use crate::harness::testing::FakeSession;

    fn invocation(id: &str) -> TestInvocation {
        let mut registry = SessionRegistry::new();
        let handle = registry.insert(Box::new(FakeSession::default()));
        TestInvocation::new(id, Expectation::Pass, handle)
    }

    #[test]
    fn test_narrow_collector_degrades() {
        let test = invocation("t");
        let mut narrow = RecordingCollector::narrow();

        assert_eq!(
            report(&mut narrow, &test, &Outcome::Skipped("flaky".into())),
            Reported::Success
        );
        assert_eq!(
            report(&mut narrow, &test, &Outcome::ExpectedFailure(Cause::assertion("x"))),
            Reported::Success
        );
        assert_eq!(
            report(&mut narrow, &test, &Outcome::UnexpectedSuccess),
            Reported::Failure
        );
        assert_eq!(narrow.calls, vec!["add_success", "add_success", "add_failure"]);
    }

    #[test]
    fn test_full_collector_records_natively() {
        let test = invocation("t");
        let mut full = RecordingCollector::full();

        assert_eq!(
            report(&mut full, &test, &Outcome::Skipped("flaky".into())),
            Reported::Skip
        );
        assert_eq!(
            report(&mut full, &test, &Outcome::UnexpectedSuccess),
            Reported::UnexpectedSuccess
        );
        assert_eq!(full.calls, vec!["add_skip", "add_unexpected_success"]);
    }

    #[test]
    fn test_harness_result_counts_and_logs() {
        let logger = Arc::new(BufferLogger::new());
        let mut result = HarnessResult::new(logger.clone()).quiet();

        for (id, outcome) in [
            ("a", Outcome::Success),
            ("b", Outcome::ExpectedFailure(Cause::assertion("known"))),
            ("c", Outcome::UnexpectedSuccess),
        ] {
            let test = invocation(id);
            result.start_test(&test);
            report(&mut result, &test, &outcome);
            result.stop_test(&test);
        }

        assert_eq!(result.tests_run(), 3);
        assert_eq!(result.passed(), 1);
        assert_eq!(result.expected_failures(), 1);
        assert_eq!(result.unexpected_successes(), 1);
        assert!(!result.was_successful());

        let ends: Vec<_> = logger
            .actions()
            .into_iter()
            .filter(|a| matches!(a, Action::TestEnd { .. }))
            .collect();
        assert_eq!(ends.len(), 3);
        assert!(matches!(
            &ends[2],
            Action::TestEnd { status: crate::harness::Status::Pass, expected: Some(crate::harness::Status::Fail), .. }
        ));
    }
}
