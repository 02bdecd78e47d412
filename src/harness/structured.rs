//! Structured test log
//!
//! Machine readable test events, one JSON object per line. This is the
//! record consumers parse; `tracing` output is for humans.

use std::io::Write;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use super::outcome::Status;

/// One structured log event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructuredEvent {
    /// Milliseconds since the Unix epoch
    pub time: u64,
    pub source: String,
    #[serde(flatten)]
    pub action: Action,
}

/// What happened
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    SuiteStart {
        tests: Vec<String>,
    },
    TestStart {
        test: String,
    },
    TestStatus {
        test: String,
        subtest: String,
        status: Status,
        #[serde(skip_serializing_if = "Option::is_none")]
        expected: Option<Status>,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    TestEnd {
        test: String,
        status: Status,
        #[serde(skip_serializing_if = "Option::is_none")]
        expected: Option<Status>,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    SuiteEnd,
}

/// Sink for structured test events
pub trait StructuredLogger: Send + Sync {
    fn emit(&self, event: StructuredEvent);

    /// Name recorded as the event source
    fn source(&self) -> &str {
        "marionette-harness"
    }

    fn log(&self, action: Action) {
        self.emit(StructuredEvent {
            time: now_millis(),
            source: self.source().to_string(),
            action,
        });
    }

    fn suite_start(&self, tests: Vec<String>) {
        self.log(Action::SuiteStart { tests });
    }

    fn suite_end(&self) {
        self.log(Action::SuiteEnd);
    }

    fn test_start(&self, test: &str) {
        self.log(Action::TestStart {
            test: test.to_string(),
        });
    }

    /// Report one assertion within a test
    fn test_status(
        &self,
        test: &str,
        subtest: &str,
        status: Status,
        expected: Option<Status>,
        message: &str,
    ) {
        self.log(Action::TestStatus {
            test: test.to_string(),
            subtest: subtest.to_string(),
            status,
            expected,
            message: Some(message.to_string()),
        });
    }

    fn test_end(&self, test: &str, status: Status, expected: Option<Status>, message: Option<String>) {
        self.log(Action::TestEnd {
            test: test.to_string(),
            status,
            expected,
            message,
        });
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Writes one JSON object per line
pub struct JsonLogger<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLogger<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }
}

impl<W: Write + Send> StructuredLogger for JsonLogger<W> {
    fn emit(&self, event: StructuredEvent) {
        let line = match serde_json::to_string(&event) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!("Failed to serialize structured event: {}", e);
                return;
            }
        };
        let Ok(mut writer) = self.writer.lock() else {
            return;
        };
        if let Err(e) = writeln!(writer, "{}", line).and_then(|_| writer.flush()) {
            tracing::warn!("Failed to write structured event: {}", e);
        }
    }
}

/// Forwards structured events to `tracing`
#[derive(Debug, Default)]
pub struct TracingLogger;

impl StructuredLogger for TracingLogger {
    fn emit(&self, event: StructuredEvent) {
        match &event.action {
            Action::TestStatus {
                test,
                subtest,
                status,
                expected,
                message,
            } => {
                if expected.map_or(false, |e| e != *status) || *status == Status::Fail {
                    tracing::warn!(
                        "{} | {} | {} {}",
                        status,
                        test,
                        subtest,
                        message.as_deref().unwrap_or("")
                    );
                } else {
                    tracing::info!("{} | {} | {}", status, test, subtest);
                }
            }
            Action::TestEnd { test, status, .. } => tracing::info!("TEST-END | {} | {}", test, status),
            Action::TestStart { test } => tracing::info!("TEST-START | {}", test),
            Action::SuiteStart { tests } => tracing::info!("Running {} tests", tests.len()),
            Action::SuiteEnd => tracing::info!("Suite finished"),
        }
    }
}

/// Keeps every event in memory
#[derive(Debug, Default)]
pub struct BufferLogger {
    events: Mutex<Vec<StructuredEvent>>,
}

impl BufferLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events logged so far
    pub fn events(&self) -> Vec<StructuredEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Just the actions, without timestamps
    pub fn actions(&self) -> Vec<Action> {
        self.events().into_iter().map(|e| e.action).collect()
    }
}

impl StructuredLogger for BufferLogger {
    fn emit(&self, event: StructuredEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_lines() {
        let logger = JsonLogger::new(Vec::new());
        logger.test_start("test_a.js");
        logger.test_status("test_a.js", "check x", Status::Fail, None, "x was 2");
        logger.test_end("test_a.js", Status::Pass, Some(Status::Fail), None);

        let output = String::from_utf8(logger.writer.into_inner().unwrap()).unwrap();
        let lines: Vec<serde_json::Value> = output
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["action"], "test_start");
        assert_eq!(lines[1]["action"], "test_status");
        assert_eq!(lines[1]["status"], "FAIL");
        assert_eq!(lines[1]["message"], "x was 2");
        assert!(lines[1].get("expected").is_none());
        assert_eq!(lines[2]["expected"], "FAIL");
        assert_eq!(lines[2]["source"], "marionette-harness");
    }

    #[test]
    fn test_buffer_logger() {
        let logger = BufferLogger::new();
        logger.suite_start(vec!["a".to_string()]);
        logger.suite_end();
        assert_eq!(
            logger.actions(),
            vec![
                Action::SuiteStart {
                    tests: vec!["a".to_string()]
                },
                Action::SuiteEnd
            ]
        );
    }
}
