//! Polling helpers
//!
//! These re-evaluate a condition against the session on a fixed interval
//! until it yields a value or the deadline passes.

use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::time::Instant;

use crate::common::{Error, Result};
use crate::marionette::ElementRef;

use super::session::Session;

/// Interval used by [`wait_for_condition`]
pub const CONDITION_INTERVAL: Duration = Duration::from_millis(500);

/// Poll `method` every half second until it returns `Some`
///
/// Errors from `method` propagate immediately. Fails with
/// [`Error::Timeout`] once `timeout` has elapsed without a value.
pub async fn wait_for_condition<T, F>(session: &mut dyn Session, timeout: Duration, method: F) -> Result<T>
where
    F: for<'s> FnMut(&'s mut dyn Session) -> BoxFuture<'s, Result<Option<T>>> + Send,
{
    Wait::new(timeout, CONDITION_INTERVAL)
        .with_message("wait_for_condition timed out")
        .until(session, method)
        .await
}

/// Configurable poller
#[derive(Debug, Clone)]
pub struct Wait {
    timeout: Duration,
    interval: Duration,
    message: Option<String>,
}

impl Wait {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self {
            timeout,
            interval,
            message: None,
        }
    }

    /// Message for the timeout error
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub async fn until<T, F>(&self, session: &mut dyn Session, mut condition: F) -> Result<T>
    where
        F: for<'s> FnMut(&'s mut dyn Session) -> BoxFuture<'s, Result<Option<T>>> + Send,
    {
        let deadline = Instant::now() + self.timeout;

        while Instant::now() < deadline {
            if let Some(value) = condition(&mut *session).await? {
                return Ok(value);
            }
            tokio::time::sleep(self.interval).await;
        }

        Err(Error::Timeout(self.message.clone().unwrap_or_else(|| {
            format!("Timed out after {:.1} seconds", self.timeout.as_secs_f64())
        })))
    }
}

/// Pin down the signature of a condition closure
///
/// Closures passed straight to [`Wait::until`] infer it on their own; use
/// this when building a condition ahead of time.
pub fn condition<T, F>(f: F) -> F
where
    F: for<'s> FnMut(&'s mut dyn Session) -> BoxFuture<'s, Result<Option<T>>> + Send,
{
    f
}

/// Condition that yields the element once it can be found
pub fn element_present(
    using: &'static str,
    value: &'static str,
) -> impl for<'s> FnMut(&'s mut dyn Session) -> BoxFuture<'s, Result<Option<ElementRef>>> + Send {
    condition(move |session| {
        Box::pin(async move {
            match session.find_element(using, value).await {
                Ok(element) => Ok(Some(element)),
                Err(e) if e.is_no_such_element() => Ok(None),
                Err(e) => Err(e),
            }
        })
    })
}

/// Condition that holds once the element can no longer be found
pub fn element_not_present(
    using: &'static str,
    value: &'static str,
) -> impl for<'s> FnMut(&'s mut dyn Session) -> BoxFuture<'s, Result<Option<()>>> + Send {
    condition(move |session| {
        Box::pin(async move {
            match session.find_element(using, value).await {
                Ok(_) => Ok(None),
                Err(e) if e.is_no_such_element() => Ok(Some(())),
                Err(e) => Err(e),
            }
        })
    })
}
