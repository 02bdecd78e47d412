//! Marionette test harness
//!
//! This library runs test cases against a browser driven over the
//! Marionette remote protocol: test classes with parameter expansion,
//! data-defined JavaScript tests, and a lifecycle that reports exactly one
//! outcome per test.

pub mod cli;
pub mod commands;
pub mod common;
pub mod harness;
pub mod marionette;

// Re-export commonly used types for tests
pub use common::{Error, Result};
pub use harness::{Outcome, Session, SessionRegistry, TestCase, TestSuite};
