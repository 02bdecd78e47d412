//! Data-defined tests: JavaScript files executed remotely
//!
//! The file's directives pick the context and timeouts. The script reports
//! its assertions back as a [`ResultBundle`]. File names carry policy: a
//! path containing `timeout` expects the script to time out, one containing
//! `fail` expects at least one failing assertion.

use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::common::{Error, Result};
use crate::marionette::{Context, JsScriptRequest};

use super::common;
use super::directives::Directives;
use super::invocation::TestInvocation;
use super::lifecycle::{TestCase, TestContext};
use super::outcome::{check, check_eq, Cause, Signal, StageResult, Status};
use super::script::SuiteOptions;
use super::session::SessionHandle;
use super::structured::StructuredLogger;

static MATCH_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^test_(.*)\.js$").expect("valid regex"));

/// Page loaded before content-context scripts run
const BLANK_PAGE: &str = "data:text/html,<html>test page</html>";

/// One reported assertion
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct AssertionEntry {
    pub name: Option<String>,
    pub diag: Option<String>,
}

/// Assertion results returned by a data-defined script
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ResultBundle {
    pub passed: u64,
    pub failures: Vec<AssertionEntry>,
    pub expected_failures: Vec<AssertionEntry>,
    pub unexpected_successes: Vec<AssertionEntry>,
}

impl ResultBundle {
    pub fn total(&self) -> u64 {
        self.passed
            + (self.failures.len() + self.expected_failures.len() + self.unexpected_successes.len()) as u64
    }

    /// Report every non-passing entry as a subtest status
    pub fn report(&self, test: &str, logger: &dyn StructuredLogger) {
        for entry in &self.failures {
            logger.test_status(
                test,
                entry.name.as_deref().unwrap_or("got false, expected true"),
                Status::Fail,
                None,
                entry.diag.as_deref().unwrap_or_default(),
            );
        }
        for entry in &self.expected_failures {
            logger.test_status(
                test,
                entry.name.as_deref().unwrap_or("got false, expected false"),
                Status::Fail,
                Some(Status::Fail),
                entry.diag.as_deref().unwrap_or_default(),
            );
        }
        for entry in &self.unexpected_successes {
            logger.test_status(
                test,
                entry.name.as_deref().unwrap_or("got true, expected false"),
                Status::Pass,
                Some(Status::Fail),
                entry.diag.as_deref().unwrap_or_default(),
            );
        }
    }
}

/// A script file with its directives applied, ready to submit
#[derive(Debug, Clone)]
pub struct LoadedScript {
    pub source: String,
    pub directives: Directives,
}

/// Read a test script, prepending its head file when it names one
///
/// Only files whose base name starts with `test_` may pull in a head file.
/// Directives are read from the combined text.
pub fn load_script(path: &Path) -> Result<LoadedScript> {
    let mut source = std::fs::read_to_string(path).map_err(|e| Error::file_read(path, &e))?;

    let is_test_file = file_name(path).starts_with("test_");
    if is_test_file {
        if let Some(head) = Directives::parse(&source).head_js {
            let head_path = path.parent().unwrap_or_else(|| Path::new("")).join(head);
            let head_source =
                std::fs::read_to_string(&head_path).map_err(|e| Error::file_read(&head_path, &e))?;
            source = head_source + &source;
        }
    }

    let directives = Directives::parse(&source);
    Ok(LoadedScript { source, directives })
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// A single JavaScript test file
pub struct JsTestCase {
    path: PathBuf,
    test_container: bool,
    invocation: TestInvocation,
}

impl JsTestCase {
    pub fn new(path: impl Into<PathBuf>, session: SessionHandle, options: SuiteOptions) -> Self {
        let path = path.into();
        let id = file_name(&path);
        Self {
            path,
            test_container: options.test_container,
            invocation: TestInvocation::new(id, options.expected, session),
        }
    }

    /// Whether the file name of `path` names a data-defined test
    pub fn matches(path: &Path) -> bool {
        path.file_name()
            .is_some_and(|name| MATCH_RE.is_match(&name.to_string_lossy()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn display_path(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }

    fn expects_timeout(&self) -> bool {
        self.display_path().contains("timeout")
    }

    fn expects_failures(&self) -> bool {
        self.display_path().contains("fail")
    }

    /// Judge the bundle a script returned
    fn check_results(&self, value: Value, logger: &dyn StructuredLogger) -> StageResult {
        check(!self.expects_timeout(), "expected timeout not triggered")?;

        let results: ResultBundle = serde_json::from_value(value).map_err(Error::from)?;

        if self.expects_failures() {
            check(!results.failures.is_empty(), "expected test failures didn't occur")?;
        } else {
            results.report(self.invocation.id(), logger);
            check_eq(
                0,
                results.failures.len(),
                &format!("{} tests failed", results.failures.len()),
            )?;
            if !results.unexpected_successes.is_empty() {
                return Err(Signal::UnexpectedSuccess);
            }
            if !results.expected_failures.is_empty() {
                return Err(Signal::ExpectedFailure(Cause::assertion("")));
            }
        }

        check(results.total() > 0, "no tests run")
    }
}

#[async_trait]
impl TestCase for JsTestCase {
    fn invocation(&self) -> &TestInvocation {
        &self.invocation
    }

    fn invocation_mut(&mut self) -> &mut TestInvocation {
        &mut self.invocation
    }

    async fn set_up(&mut self, ctx: &mut TestContext<'_>) -> StageResult {
        common::set_up_session(ctx, self.test_container).await?;
        Ok(())
    }

    async fn run_test(&mut self, ctx: &mut TestContext<'_>) -> StageResult {
        let logger = Arc::clone(&ctx.env().logger);
        let display = self.display_path();
        let session = ctx.session();

        session.set_test_name(Some(self.invocation.id().to_string()));
        common::remote_log(session, &format!("TEST-START: {}", display)).await?;

        let script = load_script(&self.path)?;
        if let Some(context) = &script.directives.context {
            session.set_context(context.parse::<Context>()?).await?;
        }
        if !script.directives.is_chrome() {
            session.navigate(BLANK_PAGE).await?;
        }
        if let Some(timeout) = script.directives.timeout {
            session.set_script_timeout(timeout).await?;
        }

        let request = JsScriptRequest {
            script: script.source,
            args: Vec::new(),
            special_powers: true,
            inactivity_timeout: script.directives.inactivity_timeout,
            filename: Some(file_name(&self.path)),
        };

        match session.execute_js_script(request).await {
            Ok(value) => self.check_results(value, logger.as_ref())?,
            Err(e) if e.is_script_timeout() && self.expects_timeout() => {
                tracing::debug!("{}: expected script timeout", self.invocation.id());
            }
            Err(e) => {
                if e.is_script_timeout() {
                    match session.get_logs().await {
                        Ok(lines) => self.invocation.loglines = lines,
                        Err(log_err) => tracing::warn!("Failed to fetch logs after timeout: {}", log_err),
                    }
                }
                return Err(e.into());
            }
        }

        common::remote_log(session, &format!("TEST-END: {}", display)).await?;
        session.set_test_name(None);
        Ok(())
    }
}
