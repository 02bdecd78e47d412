//! Marionette message types

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::common::{Error, Result};

/// Execution context commands run in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Context {
    /// Privileged browser chrome
    Chrome,
    /// Web content
    Content,
}

impl Context {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chrome => "chrome",
            Self::Content => "content",
        }
    }
}

impl std::str::FromStr for Context {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "chrome" => Ok(Self::Chrome),
            "content" => Ok(Self::Content),
            other => Err(Error::Config(format!(
                "Unknown context '{}'. Supported contexts: 'chrome', 'content'",
                other
            ))),
        }
    }
}

impl std::fmt::Display for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-operation timeouts understood by the `timeouts` command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutKind {
    Search,
    Script,
    Page,
}

impl TimeoutKind {
    /// Wire name of the timeout type
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Search => "implicit",
            Self::Script => "script",
            Self::Page => "page load",
        }
    }
}

/// Capabilities reported for the current session
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Capabilities(pub Map<String, Value>);

impl Capabilities {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Whether the session runs on a Boot2Gecko device or emulator
    pub fn is_b2g(&self) -> bool {
        self.get("b2g").and_then(Value::as_bool).unwrap_or(false)
    }

    /// Device name, e.g. `qemu` for the emulator
    pub fn device(&self) -> Option<&str> {
        self.get("device").and_then(Value::as_str)
    }
}

/// Reference to a remote DOM element
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementRef {
    pub id: String,
}

/// One entry of the remote log buffer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub level: String,
    pub message: String,
    pub timestamp: Option<String>,
}

impl LogEntry {
    /// Entry recorded locally when the remote log could not be fetched
    pub fn synthetic(message: impl Into<String>) -> Self {
        Self {
            level: "ERROR".to_string(),
            message: message.into(),
            timestamp: None,
        }
    }

    /// Parse a `[level, message, timestamp]` triple
    pub fn from_value(value: &Value) -> Option<Self> {
        let parts = value.as_array()?;
        let text = |i: usize| {
            parts.get(i).map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
        };
        Some(Self {
            level: text(0)?,
            message: text(1).unwrap_or_default(),
            timestamp: text(2),
        })
    }
}

/// Parameters for executing a data-defined test script
#[derive(Debug, Clone, Default)]
pub struct JsScriptRequest {
    pub script: String,
    pub args: Vec<Value>,
    pub special_powers: bool,
    /// Milliseconds without a heartbeat before the remote end gives up
    pub inactivity_timeout: Option<u64>,
    /// File name reported in remote stack traces
    pub filename: Option<String>,
}
