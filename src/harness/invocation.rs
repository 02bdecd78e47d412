//! Per-invocation bookkeeping

use std::time::{Duration, Instant};

use crate::marionette::LogEntry;

use super::outcome::Expectation;
use super::session::SessionHandle;

/// One execution of one test identifier
#[derive(Debug, Clone)]
pub struct TestInvocation {
    id: String,
    expected: Expectation,
    session: SessionHandle,
    started: Option<Instant>,
    duration: Duration,
    /// Remote log output captured during cleanup
    pub loglines: Vec<LogEntry>,
}

impl TestInvocation {
    pub fn new(id: impl Into<String>, expected: Expectation, session: SessionHandle) -> Self {
        Self {
            id: id.into(),
            expected,
            session,
            started: None,
            duration: Duration::ZERO,
            loglines: Vec::new(),
        }
    }

    /// Identifier used for reporting; stable across runs
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn expected(&self) -> Expectation {
        self.expected
    }

    pub fn session(&self) -> SessionHandle {
        self.session
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub(crate) fn mark_started(&mut self) {
        self.started = Some(Instant::now());
        self.duration = Duration::ZERO;
    }

    pub(crate) fn mark_finished(&mut self) {
        if let Some(started) = self.started {
            self.duration = started.elapsed();
        }
    }
}
