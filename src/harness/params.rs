//! Test class definitions and parameter expansion
//!
//! A class is declared as a list of [`Method`]s. Methods carrying parameter
//! entries are expanded into one concrete method per entry when the class is
//! built; the base method is dropped from the finished table so only the
//! derived names are discoverable.

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde_json::{Map, Value};

use crate::common::{Error, Result};

use super::script::TestFixture;

/// Characters that may not appear in a derived method name
static BAD_CHARS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[.() \-/]").expect("valid regex"));

/// Fixed arguments handed to a method
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    pub args: Vec<Value>,
    pub kwargs: Map<String, Value>,
}

impl Params {
    pub fn new(args: Vec<Value>, kwargs: Map<String, Value>) -> Self {
        Self { args, kwargs }
    }

    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }

    pub fn kwarg(&self, name: &str) -> Option<&Value> {
        self.kwargs.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty() && self.kwargs.is_empty()
    }
}

/// One `(suffix, args, kwargs)` entry attached to a base method
#[derive(Debug, Clone, PartialEq)]
pub struct ParamEntry {
    pub suffix: String,
    pub params: Params,
}

impl ParamEntry {
    pub fn new(suffix: impl Into<String>, args: Vec<Value>, kwargs: Map<String, Value>) -> Self {
        Self {
            suffix: suffix.into(),
            params: Params::new(args, kwargs),
        }
    }
}

/// Replace characters that are not valid in a method name with `_`
pub fn sanitize_suffix(suffix: &str) -> String {
    BAD_CHARS.replace_all(suffix, "_").into_owned()
}

/// A method as declared on a class, before expansion
#[derive(Debug, Clone)]
pub struct Method {
    name: String,
    doc: Option<String>,
    skip: Option<String>,
    expected_failure: bool,
    parameters: Vec<ParamEntry>,
}

impl Method {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            doc: None,
            skip: None,
            expected_failure: false,
            parameters: Vec::new(),
        }
    }

    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    /// Never run this method; report it skipped with `reason`
    pub fn skip(mut self, reason: impl Into<String>) -> Self {
        self.skip = Some(reason.into());
        self
    }

    /// The body is expected to fail regardless of the run's expectation
    pub fn expected_failure(mut self) -> Self {
        self.expected_failure = true;
        self
    }

    /// Generate `<name>_<suffix>` calling this method with fixed arguments
    ///
    /// May be repeated; each call adds one generated method.
    pub fn parameterized(mut self, suffix: impl Into<String>, args: Vec<Value>, kwargs: Map<String, Value>) -> Self {
        self.parameters.push(ParamEntry::new(suffix, args, kwargs));
        self
    }

    /// Add several parameter entries at once
    pub fn with_parameters(mut self, entries: impl IntoIterator<Item = ParamEntry>) -> Self {
        self.parameters.extend(entries);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A finished, callable method
#[derive(Debug, Clone, PartialEq)]
pub struct MethodEntry {
    /// Method the fixture dispatches on
    pub target: String,
    pub params: Params,
    pub doc: Option<String>,
    pub skip: Option<String>,
    pub expected_failure: bool,
}

/// Creates a fresh fixture for each invocation
pub type FixtureFactory = Arc<dyn Fn() -> Box<dyn TestFixture> + Send + Sync>;

/// Builder for a test class
pub struct TestClass {
    name: String,
    factory: FixtureFactory,
    skip: Option<String>,
    test_container: bool,
    methods: Vec<Method>,
}

impl TestClass {
    pub fn new<F>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Box<dyn TestFixture> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            factory: Arc::new(factory),
            skip: None,
            test_container: false,
            methods: Vec::new(),
        }
    }

    /// Skip every test in the class
    pub fn skip(mut self, reason: impl Into<String>) -> Self {
        self.skip = Some(reason.into());
        self
    }

    /// Run the class's tests inside the test container app
    pub fn test_container(mut self) -> Self {
        self.test_container = true;
        self
    }

    pub fn method(mut self, method: Method) -> Self {
        self.methods.push(method);
        self
    }

    /// Expand parameterized methods and freeze the method table
    pub fn build(self) -> Result<ClassDef> {
        let mut methods = BTreeMap::new();

        for method in self.methods.iter().filter(|m| m.parameters.is_empty()) {
            let entry = MethodEntry {
                target: method.name.clone(),
                params: Params::default(),
                doc: method.doc.clone(),
                skip: method.skip.clone(),
                expected_failure: method.expected_failure,
            };
            if methods.insert(method.name.clone(), entry).is_some() {
                return Err(Error::definition_conflict(&self.name, &method.name));
            }
        }

        for method in self.methods.iter().filter(|m| !m.parameters.is_empty()) {
            for param in &method.parameters {
                let suffix = sanitize_suffix(&param.suffix);
                let name = format!("{}_{}", method.name, suffix);
                if methods.contains_key(&name) {
                    return Err(Error::definition_conflict(&self.name, &name));
                }
                let doc = method.doc.as_ref().map(|doc| format!("[{}] {}", suffix, doc));
                tracing::debug!("{}: generated {} from {}", self.name, name, method.name);
                methods.insert(
                    name,
                    MethodEntry {
                        target: method.name.clone(),
                        params: param.params.clone(),
                        doc,
                        skip: method.skip.clone(),
                        expected_failure: method.expected_failure,
                    },
                );
            }
        }

        Ok(ClassDef {
            name: self.name,
            factory: self.factory,
            skip: self.skip,
            test_container: self.test_container,
            methods,
        })
    }
}

/// A built test class
pub struct ClassDef {
    name: String,
    factory: FixtureFactory,
    skip: Option<String>,
    test_container: bool,
    methods: BTreeMap<String, MethodEntry>,
}

impl ClassDef {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn skip_reason(&self) -> Option<&str> {
        self.skip.as_deref()
    }

    pub fn wants_test_container(&self) -> bool {
        self.test_container
    }

    pub fn method(&self, name: &str) -> Option<&MethodEntry> {
        self.methods.get(name)
    }

    /// Every method name in the finished table, sorted
    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    /// Runnable test names: those starting with `test`, sorted
    pub fn test_names(&self) -> Vec<&str> {
        self.method_names().filter(|name| name.starts_with("test")).collect()
    }

    pub fn new_fixture(&self) -> Box<dyn TestFixture> {
        (self.factory)()
    }
}

impl std::fmt::Debug for ClassDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassDef")
            .field("name", &self.name)
            .field("skip", &self.skip)
            .field("test_container", &self.test_container)
            .field("methods", &self.methods)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::script::NoopFixture;
    use serde_json::json;

    fn class(name: &str) -> TestClass {
        TestClass::new(name, || Box::new(NoopFixture))
    }

    #[test]
    fn test_sanitize_suffix() {
        assert_eq!(sanitize_suffix("a.b(c) d-e/f"), "a_b_c__d_e_f");
        assert_eq!(sanitize_suffix("plain"), "plain");
    }

    #[test]
    fn test_expansion_replaces_base_method() {
        let def = class("TestMath")
            .method(
                Method::new("test_add")
                    .doc("adds numbers")
                    .parameterized("one", vec![json!(1)], Map::new())
                    .parameterized("two", vec![json!(2)], Map::new()),
            )
            .method(Method::new("test_plain"))
            .method(Method::new("helper"))
            .build()
            .unwrap();

        assert_eq!(def.test_names(), vec!["test_add_one", "test_add_two", "test_plain"]);
        assert!(def.method("test_add").is_none());

        let two = def.method("test_add_two").unwrap();
        assert_eq!(two.target, "test_add");
        assert_eq!(two.params.arg(0), Some(&json!(2)));
        assert_eq!(two.doc.as_deref(), Some("[two] adds numbers"));
    }

    #[test]
    fn test_with_parameters_keeps_kwargs() {
        let mut kwargs = Map::new();
        kwargs.insert("value".to_string(), json!("x"));
        let def = class("TestKw")
            .method(Method::new("test_it").with_parameters([
                ParamEntry::new("a b", Vec::new(), kwargs.clone()),
                ParamEntry::new("c", Vec::new(), Map::new()),
            ]))
            .build()
            .unwrap();

        assert_eq!(def.test_names(), vec!["test_it_a_b", "test_it_c"]);
        assert_eq!(def.method("test_it_a_b").unwrap().params.kwarg("value"), Some(&json!("x")));
    }

    #[test]
    fn test_sanitized_collision_is_conflict() {
        let err = class("TestDup")
            .method(
                Method::new("test_x")
                    .parameterized("a.b", Vec::new(), Map::new())
                    .parameterized("a-b", Vec::new(), Map::new()),
            )
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            Error::DefinitionConflict { ref class, ref name } if class == "TestDup" && name == "test_x_a_b"
        ));
        assert_eq!(err.to_string(), "test_x_a_b is already a defined method on TestDup");
    }

    #[test]
    fn test_collision_with_existing_method() {
        let err = class("TestClash")
            .method(Method::new("test_x_one"))
            .method(Method::new("test_x").parameterized("one", Vec::new(), Map::new()))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::DefinitionConflict { .. }));
    }

    #[test]
    fn test_markers_carry_over_to_generated_methods() {
        let def = class("TestMarks")
            .method(
                Method::new("test_m")
                    .skip("flaky")
                    .expected_failure()
                    .parameterized("p", Vec::new(), Map::new()),
            )
            .build()
            .unwrap();
        let entry = def.method("test_m_p").unwrap();
        assert_eq!(entry.skip.as_deref(), Some("flaky"));
        assert!(entry.expected_failure);
    }
}
