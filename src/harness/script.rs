//! Script-defined tests: methods on test classes written in Rust

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::common::Error;
use crate::marionette::Context;

use super::common;
use super::invocation::TestInvocation;
use super::lifecycle::{TestCase, TestContext};
use super::outcome::{expect_failure, Expectation, StageResult};
use super::params::{ClassDef, Params};
use super::session::SessionHandle;
use super::suite::TestSuite;

/// Per-invocation state and behavior of a test class
///
/// A fresh fixture is created for every invocation. `call` dispatches a
/// method name from the class's table; generated methods arrive with their
/// fixed parameters.
#[async_trait]
pub trait TestFixture: Send {
    async fn set_up(&mut self, _ctx: &mut TestContext<'_>) -> StageResult {
        Ok(())
    }

    async fn tear_down(&mut self, _ctx: &mut TestContext<'_>) -> StageResult {
        Ok(())
    }

    async fn call(&mut self, method: &str, params: &Params, ctx: &mut TestContext<'_>) -> StageResult;
}

/// Fixture without methods
#[derive(Debug, Default)]
pub struct NoopFixture;

#[async_trait]
impl TestFixture for NoopFixture {
    async fn call(&mut self, method: &str, _params: &Params, _ctx: &mut TestContext<'_>) -> StageResult {
        Err(Error::UnknownMethod {
            class: "NoopFixture".to_string(),
            method: method.to_string(),
        }
        .into())
    }
}

/// A test module: a file path plus the classes it defines
pub struct TestModule {
    pub name: String,
    pub path: PathBuf,
    pub classes: Vec<Arc<ClassDef>>,
}

impl TestModule {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            classes: Vec::new(),
        }
    }

    pub fn class(mut self, class: ClassDef) -> Self {
        self.classes.push(Arc::new(class));
        self
    }
}

/// Options applied to every test added from a module
#[derive(Debug, Clone, Copy)]
pub struct SuiteOptions {
    pub expected: Expectation,
    pub test_container: bool,
}

impl Default for SuiteOptions {
    fn default() -> Self {
        Self {
            expected: Expectation::Pass,
            test_container: false,
        }
    }
}

/// One method of one class, ready to run
pub struct ScriptTestCase {
    class: Arc<ClassDef>,
    method: String,
    path: PathBuf,
    test_container: bool,
    fixture: Box<dyn TestFixture>,
    invocation: TestInvocation,
}

impl ScriptTestCase {
    pub fn new(
        module: &str,
        path: &Path,
        class: Arc<ClassDef>,
        method: &str,
        session: SessionHandle,
        options: SuiteOptions,
    ) -> Self {
        let id = format!("{} {}.{}", module, class.name(), method);
        Self {
            fixture: class.new_fixture(),
            test_container: options.test_container || class.wants_test_container(),
            class,
            method: method.to_string(),
            path: path.to_path_buf(),
            invocation: TestInvocation::new(id, options.expected, session),
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    fn marker(&self, kind: &str) -> String {
        format!(
            "{}: {}:{}",
            kind,
            self.path.display(),
            self.method
        )
    }

    async fn common_tear_down(&mut self, ctx: &mut TestContext<'_>) -> StageResult {
        common::check_for_crash(ctx.session()).await?;
        let session = ctx.session();
        session.set_context(Context::Content).await?;
        common::remote_log(session, &self.marker("TEST-END")).await?;
        session.set_test_name(None);
        Ok(())
    }
}

#[async_trait]
impl TestCase for ScriptTestCase {
    fn invocation(&self) -> &TestInvocation {
        &self.invocation
    }

    fn invocation_mut(&mut self) -> &mut TestInvocation {
        &mut self.invocation
    }

    fn skip_reason(&self) -> Option<String> {
        if let Some(reason) = self.class.skip_reason() {
            return Some(reason.to_string());
        }
        self.class.method(&self.method).and_then(|m| m.skip.clone())
    }

    async fn set_up(&mut self, ctx: &mut TestContext<'_>) -> StageResult {
        common::set_up_session(ctx, self.test_container).await?;
        let session = ctx.session();
        session.set_test_name(Some(self.invocation.id().to_string()));
        common::remote_log(session, &self.marker("TEST-START")).await?;
        self.fixture.set_up(ctx).await
    }

    async fn run_test(&mut self, ctx: &mut TestContext<'_>) -> StageResult {
        let Some(entry) = self.class.method(&self.method) else {
            return Err(Error::UnknownMethod {
                class: self.class.name().to_string(),
                method: self.method.clone(),
            }
            .into());
        };

        let result = self.fixture.call(&entry.target, &entry.params, ctx).await;
        if entry.expected_failure {
            expect_failure(result)
        } else {
            result
        }
    }

    async fn tear_down(&mut self, ctx: &mut TestContext<'_>) -> StageResult {
        let fixture = self.fixture.tear_down(ctx).await;
        let common = self.common_tear_down(ctx).await;
        fixture.and(common)
    }
}

/// Add one test per runnable method of every class in `module`
pub fn add_tests_to_suite(module: &TestModule, suite: &mut TestSuite, session: SessionHandle, options: SuiteOptions) {
    for class in &module.classes {
        for name in class.test_names() {
            suite.add(Box::new(ScriptTestCase::new(
                &module.name,
                &module.path,
                Arc::clone(class),
                name,
                session,
                options,
            )));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::lifecycle::{run, RunEnv};
    use crate::harness::outcome::{check_eq, Outcome};
    use crate::harness::params::{Method, TestClass};
    use crate::harness::session::SessionRegistry;
    use crate::harness::testing::{FakeSession, RecordingCollector};
    use serde_json::{json, Map};

    struct Adder;

    #[async_trait]
    impl TestFixture for Adder {
        async fn call(&mut self, method: &str, params: &Params, _ctx: &mut TestContext<'_>) -> StageResult {
            match method {
                "test_sum" => {
                    let n = params.arg(0).and_then(|v| v.as_i64()).unwrap_or_default();
                    check_eq(n + n, 2 * n, "doubling")
                }
                "test_wrong" => check_eq(1, 2, "wrong"),
                other => Err(Error::UnknownMethod {
                    class: "Adder".into(),
                    method: other.into(),
                }
                .into()),
            }
        }
    }

    fn module() -> TestModule {
        let class = TestClass::new("TestAdder", || Box::new(Adder))
            .method(Method::new("test_sum").parameterized("three", vec![json!(3)], Map::new()))
            .method(Method::new("test_wrong").expected_failure())
            .build()
            .unwrap();
        TestModule::new("test_adder.rs", "tests/test_adder.rs").class(class)
    }

    #[test]
    fn test_add_tests_to_suite_enumerates_methods() {
        let mut registry = SessionRegistry::new();
        let handle = registry.insert(Box::new(FakeSession::default()));
        let mut suite = TestSuite::new();

        add_tests_to_suite(&module(), &mut suite, handle, SuiteOptions::default());

        assert_eq!(
            suite.ids(),
            vec![
                "test_adder.rs TestAdder.test_sum_three",
                "test_adder.rs TestAdder.test_wrong"
            ]
        );
    }

    #[tokio::test]
    async fn test_markers_and_expected_failure() {
        let mut registry = SessionRegistry::new();
        let handle = registry.insert(Box::new(FakeSession::default()));
        let env = RunEnv::default();
        let module = module();
        let class = Arc::clone(&module.classes[0]);

        let mut test = ScriptTestCase::new(
            &module.name,
            &module.path,
            class,
            "test_wrong",
            handle,
            SuiteOptions::default(),
        );
        let mut result = RecordingCollector::full();
        let outcome = run(&mut test, &mut registry, &env, &mut result).await.unwrap();

        assert!(matches!(outcome, Outcome::ExpectedFailure(_)));
        assert_eq!(result.outcome_calls(), vec!["add_expected_failure"]);
    }

    #[tokio::test]
    async fn test_tear_down_logs_end_marker() {
        let mut session = FakeSession::default();
        let env = RunEnv::default();
        let module = module();
        let mut registry = SessionRegistry::new();
        let handle = registry.insert(Box::new(FakeSession::default()));
        let mut test = ScriptTestCase::new(
            &module.name,
            &module.path,
            Arc::clone(&module.classes[0]),
            "test_sum_three",
            handle,
            SuiteOptions::default(),
        );

        let mut ctx = TestContext::new(&mut session, &env);
        test.set_up(&mut ctx).await.unwrap();
        test.run_test(&mut ctx).await.unwrap();
        test.tear_down(&mut ctx).await.unwrap();

        assert_eq!(
            session.script_args,
            vec![
                vec![json!("TEST-START: tests/test_adder.rs:test_sum_three")],
                vec![json!("TEST-END: tests/test_adder.rs:test_sum_three")]
            ]
        );
        assert_eq!(session.contexts, vec![Context::Content]);
        assert!(session.test_name.is_none());
    }

    #[tokio::test]
    async fn test_crash_in_tear_down_is_error() {
        let mut session = FakeSession::with_session();
        session.crashed = true;
        let env = RunEnv::default();
        let module = module();
        let mut registry = SessionRegistry::new();
        let handle = registry.insert(Box::new(FakeSession::default()));
        let mut test = ScriptTestCase::new(
            &module.name,
            &module.path,
            Arc::clone(&module.classes[0]),
            "test_sum_three",
            handle,
            SuiteOptions::default(),
        );

        let mut ctx = TestContext::new(&mut session, &env);
        let err = test.tear_down(&mut ctx).await.unwrap_err();
        assert!(matches!(err, crate::harness::Signal::Error(ref cause) if cause.code == "PROCESS_CRASHED"));
    }
}
