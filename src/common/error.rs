//! Error types for the Marionette harness
//!
//! Remote failures keep the numeric Marionette status so callers can tell a
//! script timeout from a missing element without string matching.

use std::fmt;
use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the harness
#[derive(Error, Debug)]
pub enum Error {
    // === Connection Errors ===
    #[error("Failed to connect to Marionette at {address}: {source}")]
    ConnectionFailed {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("Marionette server did not accept connections within {0} seconds")]
    StartupTimeout(u64),

    #[error("Connection to Marionette closed unexpectedly")]
    ConnectionClosed,

    #[error("Failed to launch browser instance: {0}")]
    InstanceStartFailed(String),

    // === Session Errors ===
    #[error("No Marionette session active. Call start_session first")]
    SessionNotActive,

    #[error("Session handle {0} no longer refers to a live session")]
    SessionGone(usize),

    #[error("Browser process crashed: {0}")]
    ProcessCrashed(String),

    // === Protocol Errors ===
    #[error("Marionette protocol error: {0}")]
    Protocol(String),

    #[error("{status}: {message}")]
    Marionette {
        status: ErrorStatus,
        message: String,
        stacktrace: Option<String>,
    },

    // === Timeout Errors ===
    #[error("{0}")]
    Timeout(String),

    // === Test Definition Errors ===
    #[error("{name} is already a defined method on {class}")]
    DefinitionConflict { class: String, name: String },

    #[error("Test class {class} has no method named {method}")]
    UnknownMethod { class: String, method: String },

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Test Errors ===
    #[error("{0}")]
    TestAssertion(String),

    #[error("Interrupted")]
    Interrupted,

    // === Internal Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a definition conflict error
    pub fn definition_conflict(class: &str, name: &str) -> Self {
        Self::DefinitionConflict {
            class: class.to_string(),
            name: name.to_string(),
        }
    }

    /// Create a file read error
    pub fn file_read(path: &std::path::Path, error: &io::Error) -> Self {
        Self::FileRead {
            path: path.display().to_string(),
            error: error.to_string(),
        }
    }

    /// Create a remote error with just a status and message
    pub fn marionette(status: ErrorStatus, message: impl Into<String>) -> Self {
        Self::Marionette {
            status,
            message: message.into(),
            stacktrace: None,
        }
    }

    /// Status of a remote error, if this is one
    pub fn status(&self) -> Option<ErrorStatus> {
        match self {
            Self::Marionette { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_script_timeout(&self) -> bool {
        self.status() == Some(ErrorStatus::ScriptTimeout)
    }

    pub fn is_no_such_element(&self) -> bool {
        self.status() == Some(ErrorStatus::NoSuchElement)
    }

    /// Errors that mean the remote end (or the transport to it) is unusable.
    ///
    /// Session teardown force-clears the session when it sees one of these.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed { .. }
                | Self::ConnectionClosed
                | Self::Protocol(_)
                | Self::Marionette { .. }
                | Self::Io(_)
        )
    }

    /// Stable code used when an error is reported as a test outcome cause
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConnectionFailed { .. } | Self::ConnectionClosed => "CONNECTION_ERROR",
            Self::StartupTimeout(_) => "STARTUP_TIMEOUT",
            Self::InstanceStartFailed(_) => "INSTANCE_START_FAILED",
            Self::SessionNotActive => "SESSION_NOT_ACTIVE",
            Self::SessionGone(_) => "SESSION_GONE",
            Self::ProcessCrashed(_) => "PROCESS_CRASHED",
            Self::Protocol(_) => "PROTOCOL_ERROR",
            Self::Marionette { status, .. } => status.code(),
            Self::Timeout(_) => "TIMEOUT",
            Self::DefinitionConflict { .. } => "DEFINITION_CONFLICT",
            Self::UnknownMethod { .. } => "UNKNOWN_METHOD",
            Self::Config(_) | Self::ConfigParse(_) => "CONFIG_ERROR",
            Self::Io(_) | Self::FileRead { .. } => "IO_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::TestAssertion(_) => "ASSERTION_FAILED",
            Self::Interrupted => "INTERRUPTED",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// Numeric error statuses returned by the Marionette server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorStatus {
    NoSuchElement,
    NoSuchFrame,
    UnknownCommand,
    StaleElementReference,
    ElementNotVisible,
    InvalidElementState,
    UnknownError,
    ElementNotSelectable,
    JavascriptError,
    XPathLookupError,
    Timeout,
    NoSuchWindow,
    InvalidCookieDomain,
    UnableToSetCookie,
    UnexpectedAlertOpen,
    NoAlertOpen,
    ScriptTimeout,
    InvalidElementCoordinates,
    InvalidSelector,
    MoveTargetOutOfBounds,
    FrameSendNotInitialized,
    FrameSendFailure,
    FrameNotResponding,
    Other(i64),
}

impl ErrorStatus {
    pub fn from_code(code: i64) -> Self {
        match code {
            7 => Self::NoSuchElement,
            8 => Self::NoSuchFrame,
            9 => Self::UnknownCommand,
            10 => Self::StaleElementReference,
            11 => Self::ElementNotVisible,
            12 => Self::InvalidElementState,
            13 => Self::UnknownError,
            15 => Self::ElementNotSelectable,
            17 => Self::JavascriptError,
            19 => Self::XPathLookupError,
            21 => Self::Timeout,
            23 => Self::NoSuchWindow,
            24 => Self::InvalidCookieDomain,
            25 => Self::UnableToSetCookie,
            26 => Self::UnexpectedAlertOpen,
            27 => Self::NoAlertOpen,
            28 => Self::ScriptTimeout,
            29 => Self::InvalidElementCoordinates,
            32 => Self::InvalidSelector,
            34 => Self::MoveTargetOutOfBounds,
            54 => Self::FrameSendNotInitialized,
            55 => Self::FrameSendFailure,
            56 => Self::FrameNotResponding,
            other => Self::Other(other),
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::NoSuchElement => "NO_SUCH_ELEMENT",
            Self::NoSuchFrame => "NO_SUCH_FRAME",
            Self::UnknownCommand => "UNKNOWN_COMMAND",
            Self::StaleElementReference => "STALE_ELEMENT_REFERENCE",
            Self::ElementNotVisible => "ELEMENT_NOT_VISIBLE",
            Self::InvalidElementState => "INVALID_ELEMENT_STATE",
            Self::UnknownError | Self::Other(_) => "UNKNOWN_ERROR",
            Self::ElementNotSelectable => "ELEMENT_NOT_SELECTABLE",
            Self::JavascriptError => "JAVASCRIPT_ERROR",
            Self::XPathLookupError => "XPATH_LOOKUP_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::NoSuchWindow => "NO_SUCH_WINDOW",
            Self::InvalidCookieDomain => "INVALID_COOKIE_DOMAIN",
            Self::UnableToSetCookie => "UNABLE_TO_SET_COOKIE",
            Self::UnexpectedAlertOpen => "UNEXPECTED_ALERT_OPEN",
            Self::NoAlertOpen => "NO_ALERT_OPEN",
            Self::ScriptTimeout => "SCRIPT_TIMEOUT",
            Self::InvalidElementCoordinates => "INVALID_ELEMENT_COORDINATES",
            Self::InvalidSelector => "INVALID_SELECTOR",
            Self::MoveTargetOutOfBounds => "MOVE_TARGET_OUT_OF_BOUNDS",
            Self::FrameSendNotInitialized => "FRAME_SEND_NOT_INITIALIZED",
            Self::FrameSendFailure => "FRAME_SEND_FAILURE",
            Self::FrameNotResponding => "FRAME_NOT_RESPONDING",
        }
    }
}

impl fmt::Display for ErrorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Other(code) => write!(f, "Marionette error {}", code),
            status => f.write_str(status.code()),
        }
    }
}
