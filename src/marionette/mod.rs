//! Marionette remote protocol client
//!
//! Talks to the Marionette server embedded in Gecko over TCP.

pub mod client;
pub mod codec;
pub mod types;

pub use client::MarionetteClient;
pub use types::*;
