//! Test lifecycle state machine
//!
//! ```text
//! Init -> SetUp -> Body -> TearDown -> Cleanup -> Reported
//!   \                                               ^
//!    `-> Skipped --------------------------------- '
//! ```
//!
//! Each stage returns a [`StageResult`]. The invocation's expectation mode
//! decides how a signal is classified; the first terminal outcome wins and
//! is the only one handed to the result collector.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use serde_json::Value;

use crate::common::config::Config;
use crate::common::{Error, Result};

use super::common;
use super::invocation::TestInvocation;
use super::outcome::{Cause, Expectation, Outcome, Signal, StageResult};
use super::result::{report, ResultCollector};
use super::session::{Session, SessionRegistry};
use super::structured::{StructuredLogger, TracingLogger};
use super::wait::Wait;

/// Settings and shared services for a whole run
pub struct RunEnv {
    pub logger: Arc<dyn StructuredLogger>,
    /// Uniform search/script/page timeout in milliseconds
    pub timeout: Option<u64>,
    /// Page load timeout used when `timeout` is unset
    pub page_timeout: u64,
    pub wait_timeout: Duration,
    pub wait_interval: Duration,
    /// Free-form variables exposed to tests
    pub testvars: Value,
    interrupted: Arc<AtomicBool>,
}

impl RunEnv {
    pub fn new(logger: Arc<dyn StructuredLogger>) -> Self {
        Self {
            logger,
            timeout: None,
            page_timeout: 30_000,
            wait_timeout: Duration::from_secs(30),
            wait_interval: Duration::from_millis(500),
            testvars: Value::Null,
            interrupted: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn from_config(config: &Config, logger: Arc<dyn StructuredLogger>) -> Result<Self> {
        let mut env = Self::new(logger);
        env.timeout = config.timeouts.default_ms;
        env.page_timeout = config.timeouts.page_ms;
        env.wait_timeout = Duration::try_from_secs_f64(config.timeouts.wait_secs)
            .map_err(|e| Error::Config(format!("Invalid wait_secs: {}", e)))?;
        env.wait_interval = Duration::from_millis(config.timeouts.wait_interval_ms);
        env.testvars = config.load_testvars()?;
        Ok(env)
    }

    /// Flag that aborts the run at the next stage boundary once set
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupted)
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }
}

impl Default for RunEnv {
    fn default() -> Self {
        Self::new(Arc::new(TracingLogger))
    }
}

/// What a stage can reach while the invocation runs
pub struct TestContext<'a> {
    session: &'a mut dyn Session,
    env: &'a RunEnv,
}

impl<'a> TestContext<'a> {
    pub fn new(session: &'a mut dyn Session, env: &'a RunEnv) -> Self {
        Self { session, env }
    }

    pub fn session(&mut self) -> &mut dyn Session {
        &mut *self.session
    }

    pub fn env(&self) -> &RunEnv {
        self.env
    }

    pub fn testvars(&self) -> &Value {
        &self.env.testvars
    }

    /// Poll `method` against the session until it yields a value
    ///
    /// Uses the run's default deadline when `timeout` is `None` and the
    /// run's polling interval.
    pub async fn wait_for_condition<T, F>(&mut self, timeout: Option<Duration>, method: F) -> Result<T>
    where
        T: Send,
        F: for<'s> FnMut(&'s mut dyn Session) -> BoxFuture<'s, Result<Option<T>>> + Send,
    {
        let timeout = timeout.unwrap_or(self.env.wait_timeout);
        Wait::new(timeout, self.env.wait_interval)
            .with_message("wait_for_condition timed out")
            .until(&mut *self.session, method)
            .await
    }
}

/// A runnable test
///
/// Implementors provide the stages; [`run`] sequences them.
#[async_trait]
pub trait TestCase: Send {
    fn invocation(&self) -> &TestInvocation;

    fn invocation_mut(&mut self) -> &mut TestInvocation;

    /// Reason the test or its class is statically skipped
    fn skip_reason(&self) -> Option<String> {
        None
    }

    async fn set_up(&mut self, ctx: &mut TestContext<'_>) -> StageResult;

    async fn run_test(&mut self, ctx: &mut TestContext<'_>) -> StageResult;

    async fn tear_down(&mut self, _ctx: &mut TestContext<'_>) -> StageResult {
        Ok(())
    }

    /// Release the session; must not fail
    async fn clean_test(&mut self, ctx: &mut TestContext<'_>) {
        common::delete_session(ctx.session(), self.invocation_mut()).await;
    }
}

/// Where a stage left the state machine
#[derive(Debug)]
enum Step {
    Continue,
    Stop(Outcome),
    Interrupt,
}

/// How the stages finished
enum Drive {
    Finished(Option<Outcome>),
    Interrupted,
}

fn classify_set_up(result: StageResult, mode: Expectation) -> Step {
    match (result, mode) {
        (Ok(()), _) => Step::Continue,
        (Err(Signal::Interrupted), _) => Step::Interrupt,
        (Err(Signal::Skip(reason)), _) => Step::Stop(Outcome::Skipped(reason)),
        (Err(signal), Expectation::Fail) => Step::Stop(Outcome::ExpectedFailure(signal.into_cause())),
        (Err(Signal::ExpectedFailure(cause)), Expectation::Pass) => {
            Step::Stop(Outcome::ExpectedFailure(cause))
        }
        (Err(signal), Expectation::Pass) => Step::Stop(Outcome::Error(signal.into_cause())),
    }
}

fn classify_body(result: StageResult, mode: Expectation) -> Step {
    match (result, mode) {
        (Err(Signal::Interrupted), _) => Step::Interrupt,
        (Err(Signal::Skip(reason)), _) => Step::Stop(Outcome::Skipped(reason)),
        (Ok(()), Expectation::Pass) => Step::Continue,
        (Ok(()), Expectation::Fail) => Step::Stop(Outcome::UnexpectedSuccess),
        (Err(signal), Expectation::Fail) => Step::Stop(Outcome::ExpectedFailure(signal.into_cause())),
        (Err(Signal::Failure(cause)), Expectation::Pass) => Step::Stop(Outcome::Failure(cause)),
        (Err(Signal::Error(cause)), Expectation::Pass) => Step::Stop(Outcome::Error(cause)),
        (Err(Signal::ExpectedFailure(cause)), Expectation::Pass) => {
            Step::Stop(Outcome::ExpectedFailure(cause))
        }
        (Err(Signal::UnexpectedSuccess), Expectation::Pass) => Step::Stop(Outcome::UnexpectedSuccess),
    }
}

/// Fold a tearDown signal into the outcome produced so far
fn merge_tear_down(current: Option<Outcome>, signal: Signal, mode: Expectation) -> Option<Outcome> {
    let candidate = match (signal, mode) {
        (signal, Expectation::Fail) => Outcome::ExpectedFailure(signal.into_cause()),
        (Signal::ExpectedFailure(cause), Expectation::Pass) => Outcome::ExpectedFailure(cause),
        (signal, Expectation::Pass) => Outcome::Error(signal.into_cause()),
    };

    match current {
        None => Some(candidate),
        // A test expected to fail did fail, just later than the body
        Some(Outcome::UnexpectedSuccess) if mode == Expectation::Fail => Some(candidate),
        Some(existing) => {
            tracing::warn!(
                "tearDown also failed after {:?}: {}",
                existing,
                candidate.message().unwrap_or_default()
            );
            Some(existing)
        }
    }
}

async fn run_stages(test: &mut dyn TestCase, ctx: &mut TestContext<'_>, mode: Expectation) -> Drive {
    let id = test.invocation().id().to_string();

    if ctx.env().is_interrupted() {
        return Drive::Interrupted;
    }
    tracing::debug!("{}: setUp", id);
    match classify_set_up(test.set_up(ctx).await, mode) {
        Step::Continue => {}
        Step::Stop(outcome) => return Drive::Finished(Some(outcome)),
        Step::Interrupt => return Drive::Interrupted,
    }

    if ctx.env().is_interrupted() {
        return Drive::Interrupted;
    }
    tracing::debug!("{}: body", id);
    let mut outcome = match classify_body(test.run_test(ctx).await, mode) {
        Step::Continue => None,
        Step::Stop(outcome @ (Outcome::Skipped(_) | Outcome::ExpectedFailure(_))) => {
            return Drive::Finished(Some(outcome));
        }
        Step::Stop(outcome) => Some(outcome),
        Step::Interrupt => return Drive::Interrupted,
    };

    if ctx.env().is_interrupted() {
        return Drive::Interrupted;
    }
    tracing::debug!("{}: tearDown", id);
    match test.tear_down(ctx).await {
        Ok(()) => {}
        Err(Signal::Interrupted) => return Drive::Interrupted,
        Err(signal) => outcome = merge_tear_down(outcome, signal, mode),
    }

    Drive::Finished(outcome)
}

/// Run one invocation and report exactly one outcome for it
///
/// Returns `Err(Error::Interrupted)` when the run is being cancelled; the
/// caller must stop running further tests. Every other failure is an
/// outcome, not an error.
pub async fn run(
    test: &mut dyn TestCase,
    sessions: &mut SessionRegistry,
    env: &RunEnv,
    result: &mut dyn ResultCollector,
) -> Result<Outcome> {
    test.invocation_mut().mark_started();
    result.start_test(test.invocation());

    if let Some(reason) = test.skip_reason() {
        tracing::info!("{}: skipped ({})", test.invocation().id(), reason);
        return Ok(finish(test, result, Outcome::Skipped(reason)));
    }

    let handle = test.invocation().session();
    let Some(session) = sessions.get_mut(handle) else {
        let cause = Cause::from(&Error::SessionGone(handle.index()));
        return Ok(finish(test, result, Outcome::Error(cause)));
    };

    let mut ctx = TestContext::new(session, env);
    let mode = test.invocation().expected();
    let drive = run_stages(test, &mut ctx, mode).await;

    tracing::debug!("{}: cleanup", test.invocation().id());
    test.clean_test(&mut ctx).await;

    match drive {
        Drive::Finished(outcome) => Ok(finish(test, result, outcome.unwrap_or(Outcome::Success))),
        Drive::Interrupted => {
            test.invocation_mut().mark_finished();
            result.stop_test(test.invocation());
            Err(Error::Interrupted)
        }
    }
}

fn finish(test: &mut dyn TestCase, result: &mut dyn ResultCollector, outcome: Outcome) -> Outcome {
    test.invocation_mut().mark_finished();
    report(result, test.invocation(), &outcome);
    result.stop_test(test.invocation());
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_up_classification() {
        let err = || Err(Signal::Error(Cause::new("CONNECTION_ERROR", "refused")));
        assert!(matches!(
            classify_set_up(err(), Expectation::Pass),
            Step::Stop(Outcome::Error(_))
        ));
        assert!(matches!(
            classify_set_up(err(), Expectation::Fail),
            Step::Stop(Outcome::ExpectedFailure(cause)) if cause.message == "refused"
        ));
        assert!(matches!(
            classify_set_up(Err(Signal::Skip("later".into())), Expectation::Fail),
            Step::Stop(Outcome::Skipped(_))
        ));
        assert!(matches!(
            classify_set_up(Err(Signal::Interrupted), Expectation::Fail),
            Step::Interrupt
        ));
    }

    #[test]
    fn test_body_classification() {
        let failure = || Err(Signal::Failure(Cause::assertion("1 != 2")));
        assert!(matches!(
            classify_body(failure(), Expectation::Pass),
            Step::Stop(Outcome::Failure(_))
        ));
        assert!(matches!(
            classify_body(failure(), Expectation::Fail),
            Step::Stop(Outcome::ExpectedFailure(_))
        ));
        assert!(matches!(
            classify_body(Ok(()), Expectation::Fail),
            Step::Stop(Outcome::UnexpectedSuccess)
        ));
        assert!(matches!(classify_body(Ok(()), Expectation::Pass), Step::Continue));
    }

    #[tokio::test(start_paused = true)]
    async fn test_context_wait_uses_run_defaults() {
        let mut session = crate::harness::testing::FakeSession::default();
        let mut env = RunEnv::default();
        env.wait_timeout = Duration::from_secs(1);
        let mut ctx = TestContext::new(&mut session, &env);

        let start = tokio::time::Instant::now();
        let err = ctx
            .wait_for_condition(
                None,
                crate::harness::wait::condition(|_session| Box::pin(async { Ok(None::<()>) })),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Timeout(ref m) if m == "wait_for_condition timed out"));
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[test]
    fn test_tear_down_merge() {
        let err = || Signal::Error(Cause::new("PROCESS_CRASHED", "gone"));

        assert!(matches!(
            merge_tear_down(None, err(), Expectation::Pass),
            Some(Outcome::Error(_))
        ));
        assert!(matches!(
            merge_tear_down(Some(Outcome::Failure(Cause::assertion("x"))), err(), Expectation::Pass),
            Some(Outcome::Failure(_))
        ));
        assert!(matches!(
            merge_tear_down(Some(Outcome::UnexpectedSuccess), err(), Expectation::Fail),
            Some(Outcome::ExpectedFailure(_))
        ));
        assert!(matches!(
            merge_tear_down(Some(Outcome::UnexpectedSuccess), err(), Expectation::Pass),
            Some(Outcome::UnexpectedSuccess)
        ));
    }
}
