//! Test execution engine
//!
//! Test classes and script files become [`TestCase`]s collected in a
//! [`TestSuite`]. Each case runs through the lifecycle in [`lifecycle::run`]
//! against a session borrowed from the [`SessionRegistry`], and exactly one
//! outcome per invocation reaches the [`ResultCollector`].

pub mod common;
pub mod directives;
pub mod invocation;
pub mod js;
pub mod lifecycle;
pub mod outcome;
pub mod params;
pub mod result;
pub mod script;
pub mod session;
pub mod structured;
pub mod suite;
pub mod testing;
pub mod wait;

pub use invocation::TestInvocation;
pub use js::{JsTestCase, ResultBundle};
pub use lifecycle::{run, RunEnv, TestCase, TestContext};
pub use outcome::{check, check_eq, expect_failure, skip, Cause, Expectation, Outcome, Signal, StageResult, Status};
pub use params::{ClassDef, Method, ParamEntry, Params, TestClass};
pub use result::{HarnessResult, ResultCollector};
pub use script::{add_tests_to_suite, ScriptTestCase, SuiteOptions, TestFixture, TestModule};
pub use session::{Session, SessionHandle, SessionRegistry};
pub use structured::{JsonLogger, StructuredLogger, TracingLogger};
pub use suite::{add_js_tests, discover, TestSuite};
pub use wait::{wait_for_condition, Wait};
