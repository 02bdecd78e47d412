//! In-memory stand-ins for exercising test classes without a browser
//!
//! [`FakeSession`] records every call and can be told to fail specific
//! operations. [`RecordingCollector`] records which result methods were
//! called, optionally pretending to be a collector without the optional ones.

use async_trait::async_trait;
use serde_json::Value;

use crate::common::{Error, ErrorStatus, Result};
use crate::marionette::{Capabilities, Context, ElementRef, JsScriptRequest, LogEntry, TimeoutKind};

use super::invocation::TestInvocation;
use super::outcome::Cause;
use super::result::{Dispatch, ResultCollector};
use super::session::Session;

/// Session that answers from memory
#[derive(Debug, Default)]
pub struct FakeSession {
    pub session: Option<String>,
    pub capabilities: Capabilities,
    pub test_name: Option<String>,
    pub started: usize,
    pub deleted: usize,
    pub closed: bool,
    pub timeouts: Vec<(TimeoutKind, u64)>,
    pub script_timeouts: Vec<u64>,
    pub contexts: Vec<Context>,
    pub navigations: Vec<String>,
    /// Every synchronous script executed, in order
    pub scripts: Vec<String>,
    /// Arguments passed alongside each entry of `scripts`
    pub script_args: Vec<Vec<Value>>,
    pub js_requests: Vec<JsScriptRequest>,
    /// Reply for the next `execute_js_script`; `Ok(Null)` when unset
    pub js_reply: Option<Result<Value>>,
    pub logs: Vec<LogEntry>,
    /// Selectors `find_element` can resolve
    pub elements: Vec<String>,
    pub frames: Vec<Option<String>>,
    pub crashed: bool,
    pub fail_start: bool,
    pub fail_get_logs: bool,
    pub fail_delete: bool,
}

impl FakeSession {
    /// A fake with a session already open
    pub fn with_session() -> Self {
        Self {
            session: Some("fake-session".to_string()),
            ..Self::default()
        }
    }

    /// Queue a script timeout as the next data-defined script reply
    pub fn reply_script_timeout(&mut self) {
        self.js_reply = Some(Err(Error::marionette(
            ErrorStatus::ScriptTimeout,
            "timed out waiting for script",
        )));
    }
}

#[async_trait]
impl Session for FakeSession {
    fn session_id(&self) -> Option<&str> {
        self.session.as_deref()
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    fn set_test_name(&mut self, name: Option<String>) {
        self.test_name = name;
    }

    async fn start_session(&mut self) -> Result<()> {
        if self.fail_start {
            return Err(Error::ConnectionClosed);
        }
        self.started += 1;
        self.session = Some(format!("fake-session-{}", self.started));
        Ok(())
    }

    async fn delete_session(&mut self) -> Result<()> {
        if self.fail_delete {
            return Err(Error::ConnectionClosed);
        }
        self.deleted += 1;
        self.session = None;
        Ok(())
    }

    fn clear_session(&mut self) {
        self.session = None;
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }

    async fn set_timeout(&mut self, kind: TimeoutKind, ms: u64) -> Result<()> {
        self.timeouts.push((kind, ms));
        Ok(())
    }

    async fn set_script_timeout(&mut self, ms: u64) -> Result<()> {
        self.script_timeouts.push(ms);
        Ok(())
    }

    async fn set_context(&mut self, context: Context) -> Result<()> {
        self.contexts.push(context);
        Ok(())
    }

    async fn navigate(&mut self, url: &str) -> Result<()> {
        self.navigations.push(url.to_string());
        Ok(())
    }

    async fn execute_script(&mut self, script: &str, args: Vec<Value>) -> Result<Value> {
        self.scripts.push(script.to_string());
        self.script_args.push(args);
        Ok(Value::Null)
    }

    async fn execute_async_script(
        &mut self,
        script: &str,
        args: Vec<Value>,
        _script_timeout: Option<u64>,
    ) -> Result<Value> {
        self.scripts.push(script.to_string());
        self.script_args.push(args);
        Ok(Value::Bool(true))
    }

    async fn execute_js_script(&mut self, request: JsScriptRequest) -> Result<Value> {
        self.js_requests.push(request);
        self.js_reply.take().unwrap_or(Ok(Value::Null))
    }

    async fn get_logs(&mut self) -> Result<Vec<LogEntry>> {
        if self.fail_get_logs {
            return Err(Error::ConnectionClosed);
        }
        Ok(std::mem::take(&mut self.logs))
    }

    async fn check_for_crash(&mut self) -> Result<bool> {
        Ok(self.crashed)
    }

    async fn find_element(&mut self, _using: &str, value: &str) -> Result<ElementRef> {
        if self.elements.iter().any(|e| e == value) {
            Ok(ElementRef {
                id: value.to_string(),
            })
        } else {
            Err(Error::marionette(
                ErrorStatus::NoSuchElement,
                format!("Unable to locate element: {}", value),
            ))
        }
    }

    async fn switch_to_frame(&mut self, frame: Option<&ElementRef>) -> Result<()> {
        self.frames.push(frame.map(|f| f.id.clone()));
        Ok(())
    }
}

/// Collector that records the name of every method called on it
#[derive(Debug, Default)]
pub struct RecordingCollector {
    /// Whether the optional report methods are implemented
    full: bool,
    pub calls: Vec<&'static str>,
    /// `(test id, detail)` for every report, in order
    pub reports: Vec<(String, String)>,
}

impl RecordingCollector {
    /// Collector with native skip/expected-failure/unexpected-success support
    pub fn full() -> Self {
        Self {
            full: true,
            ..Self::default()
        }
    }

    /// Collector that only understands success, failure and error
    pub fn narrow() -> Self {
        Self::default()
    }

    /// Calls other than start/stop
    pub fn outcome_calls(&self) -> Vec<&'static str> {
        self.calls
            .iter()
            .copied()
            .filter(|c| *c != "start_test" && *c != "stop_test")
            .collect()
    }

    fn push(&mut self, call: &'static str, test: &TestInvocation, detail: String) {
        self.calls.push(call);
        self.reports.push((test.id().to_string(), detail));
    }

    fn optional(&mut self, call: &'static str, test: &TestInvocation, detail: String) -> Dispatch {
        if !self.full {
            return Dispatch::Unsupported;
        }
        self.push(call, test, detail);
        Dispatch::Recorded
    }
}

impl ResultCollector for RecordingCollector {
    fn start_test(&mut self, _test: &TestInvocation) {
        self.calls.push("start_test");
    }

    fn stop_test(&mut self, _test: &TestInvocation) {
        self.calls.push("stop_test");
    }

    fn add_success(&mut self, test: &TestInvocation) {
        self.push("add_success", test, String::new());
    }

    fn add_failure(&mut self, test: &TestInvocation, cause: &Cause) {
        self.push("add_failure", test, cause.to_string());
    }

    fn add_error(&mut self, test: &TestInvocation, cause: &Cause) {
        self.push("add_error", test, cause.to_string());
    }

    fn add_skip(&mut self, test: &TestInvocation, reason: &str) -> Dispatch {
        self.optional("add_skip", test, reason.to_string())
    }

    fn add_expected_failure(&mut self, test: &TestInvocation, cause: &Cause) -> Dispatch {
        self.optional("add_expected_failure", test, cause.to_string())
    }

    fn add_unexpected_success(&mut self, test: &TestInvocation) -> Dispatch {
        self.optional("add_unexpected_success", test, String::new())
    }
}
