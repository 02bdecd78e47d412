//! Test suites and discovery

use std::path::{Path, PathBuf};

use crate::common::{Error, Result};

use super::js::JsTestCase;
use super::lifecycle::{self, RunEnv, TestCase};
use super::result::ResultCollector;
use super::script::SuiteOptions;
use super::session::{SessionHandle, SessionRegistry};

/// Ordered collection of tests, run one after another
#[derive(Default)]
pub struct TestSuite {
    tests: Vec<Box<dyn TestCase>>,
}

impl TestSuite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, test: Box<dyn TestCase>) {
        self.tests.push(test);
    }

    pub fn len(&self) -> usize {
        self.tests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    pub fn ids(&self) -> Vec<String> {
        self.tests
            .iter()
            .map(|t| t.invocation().id().to_string())
            .collect()
    }

    /// Run every test in order
    ///
    /// Stops after the current test's cleanup and returns
    /// `Err(Error::Interrupted)` when the run is interrupted.
    pub async fn run(
        &mut self,
        sessions: &mut SessionRegistry,
        env: &RunEnv,
        result: &mut dyn ResultCollector,
    ) -> Result<()> {
        env.logger.suite_start(self.ids());
        tracing::info!("Running {} tests", self.tests.len());

        for test in &mut self.tests {
            if let Err(e) = lifecycle::run(test.as_mut(), sessions, env, result).await {
                tracing::warn!("Run aborted during {}: {}", test.invocation().id(), e);
                env.logger.suite_end();
                return Err(e);
            }
        }

        env.logger.suite_end();
        Ok(())
    }
}

/// Find data-defined tests under `paths`, walking directories recursively
///
/// Explicit file paths are kept even if their names do not match. Results
/// are sorted within each directory.
pub fn discover(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for path in paths {
        if path.is_dir() {
            walk(path, &mut found)?;
        } else if path.is_file() {
            found.push(path.clone());
        } else {
            return Err(Error::Config(format!("Test path not found: {}", path.display())));
        }
    }
    Ok(found)
}

fn walk(dir: &Path, found: &mut Vec<PathBuf>) -> Result<()> {
    let mut entries = std::fs::read_dir(dir)
        .map_err(|e| Error::file_read(dir, &e))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort();

    for entry in entries {
        if entry.is_dir() {
            walk(&entry, found)?;
        } else if JsTestCase::matches(&entry) {
            found.push(entry);
        }
    }
    Ok(())
}

/// Add a data-defined test for each path
pub fn add_js_tests(paths: &[PathBuf], suite: &mut TestSuite, session: SessionHandle, options: SuiteOptions) {
    for path in paths {
        suite.add(Box::new(JsTestCase::new(path.clone(), session, options)));
    }
}
