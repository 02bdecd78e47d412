//! The remote session seam
//!
//! Test invocations never own a session. The runner owns every session in a
//! [`SessionRegistry`] and hands each invocation a copyable
//! [`SessionHandle`], which is resolved only while that invocation runs.

use async_trait::async_trait;
use serde_json::Value;

use crate::common::Result;
use crate::marionette::{Capabilities, Context, ElementRef, JsScriptRequest, LogEntry, TimeoutKind};

/// Operations the lifecycle needs from a remote automation session
#[async_trait]
pub trait Session: Send {
    /// Identifier of the active session, `None` when no session is open
    fn session_id(&self) -> Option<&str>;

    /// Capabilities reported when the session started
    fn capabilities(&self) -> &Capabilities;

    /// Name of the test currently driving the session, reported remotely
    fn set_test_name(&mut self, name: Option<String>);

    async fn start_session(&mut self) -> Result<()>;

    async fn delete_session(&mut self) -> Result<()>;

    /// Forget the session without talking to the remote end
    fn clear_session(&mut self);

    /// Close the underlying transport
    async fn close(&mut self) -> Result<()>;

    async fn set_timeout(&mut self, kind: TimeoutKind, ms: u64) -> Result<()>;

    async fn set_script_timeout(&mut self, ms: u64) -> Result<()>;

    async fn set_context(&mut self, context: Context) -> Result<()>;

    async fn navigate(&mut self, url: &str) -> Result<()>;

    async fn execute_script(&mut self, script: &str, args: Vec<Value>) -> Result<Value>;

    async fn execute_async_script(
        &mut self,
        script: &str,
        args: Vec<Value>,
        script_timeout: Option<u64>,
    ) -> Result<Value>;

    /// Run a data-defined test script and return its result bundle
    async fn execute_js_script(&mut self, request: JsScriptRequest) -> Result<Value>;

    /// Drain the remote log buffer
    async fn get_logs(&mut self) -> Result<Vec<LogEntry>>;

    /// Whether the browser process has crashed
    async fn check_for_crash(&mut self) -> Result<bool>;

    async fn find_element(&mut self, using: &str, value: &str) -> Result<ElementRef>;

    /// Switch to a frame element, or back to the top-level document with `None`
    async fn switch_to_frame(&mut self, frame: Option<&ElementRef>) -> Result<()>;

    /// Build an absolute URL for a page served by the test server
    fn absolute_url(&self, path: &str) -> String {
        path.to_string()
    }
}

/// Non-owning reference to a session held by the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle(usize);

impl SessionHandle {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Owner of every session used by a run
#[derive(Default)]
pub struct SessionRegistry {
    slots: Vec<Option<Box<dyn Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, session: Box<dyn Session>) -> SessionHandle {
        self.slots.push(Some(session));
        SessionHandle(self.slots.len() - 1)
    }

    /// Resolve a handle, `None` once the session has been removed
    pub fn get_mut(&mut self, handle: SessionHandle) -> Option<&mut (dyn Session + 'static)> {
        self.slots.get_mut(handle.0)?.as_deref_mut()
    }

    /// Take a session out of the registry; outstanding handles stop resolving
    pub fn remove(&mut self, handle: SessionHandle) -> Option<Box<dyn Session>> {
        self.slots.get_mut(handle.0)?.take()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::testing::FakeSession;

    #[test]
    fn test_handles_stop_resolving_after_remove() {
        let mut registry = SessionRegistry::new();
        let handle = registry.insert(Box::new(FakeSession::default()));
        assert!(registry.get_mut(handle).is_some());
        assert_eq!(registry.len(), 1);

        assert!(registry.remove(handle).is_some());
        assert!(registry.get_mut(handle).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_handles_are_distinct() {
        let mut registry = SessionRegistry::new();
        let a = registry.insert(Box::new(FakeSession::default()));
        let b = registry.insert(Box::new(FakeSession::default()));
        assert_ne!(a, b);
        registry.remove(a);
        assert!(registry.get_mut(b).is_some());
    }
}
