//! Session handling shared by every kind of test case

use std::time::Duration;

use serde_json::{json, Value};

use crate::common::{Error, Result};
use crate::marionette::{Context, LogEntry, TimeoutKind};

use super::invocation::TestInvocation;
use super::lifecycle::TestContext;
use super::outcome::{Signal, StageResult};
use super::session::Session;
use super::wait::{element_not_present, element_present, Wait};

const TEST_CONTAINER_FRAME: &str = r#"iframe[src*="app://test-container.gaiamobile.org/index.html"]"#;

/// Script timeout for launching or killing the test container app
const CONTAINER_SCRIPT_TIMEOUT_MS: u64 = 60_000;

const LAUNCH_TEST_CONTAINER_JS: &str = r#"
if (!navigator.mozSettings || !navigator.mozApps) {
  marionetteScriptFinished(false);
  return;
}
let setReq = navigator.mozSettings.createLock().set({'lockscreen.enabled': false});
setReq.onsuccess = function() {
  let appsReq = navigator.mozApps.mgmt.getAll();
  appsReq.onsuccess = function() {
    for (let app of appsReq.result) {
      if (app.manifest.name === 'Test Container') {
        app.launch();
        window.addEventListener('apploadtime', function loaded() {
          window.removeEventListener('apploadtime', loaded);
          marionetteScriptFinished(true);
        });
        return;
      }
    }
    marionetteScriptFinished(false);
  };
  appsReq.onerror = function() { marionetteScriptFinished(false); };
};
setReq.onerror = function() { marionetteScriptFinished(false); };
"#;

const KILL_TEST_CONTAINER_JS: &str = r#"
if (!navigator.mozSettings || !navigator.mozApps) {
  marionetteScriptFinished(false);
  return;
}
let setReq = navigator.mozSettings.createLock().set({'lockscreen.enabled': false});
setReq.onsuccess = function() {
  let appsReq = navigator.mozApps.mgmt.getAll();
  appsReq.onsuccess = function() {
    for (let app of appsReq.result) {
      if (app.manifest.name === 'Test Container') {
        let manager = window.wrappedJSObject.AppWindowManager ||
                      window.wrappedJSObject.WindowManager;
        if (!manager) {
          marionetteScriptFinished(false);
          return;
        }
        manager.kill(app.origin);
        marionetteScriptFinished(true);
        return;
      }
    }
    marionetteScriptFinished(false);
  };
  appsReq.onerror = function() { marionetteScriptFinished(false); };
};
setReq.onerror = function() { marionetteScriptFinished(false); };
"#;

const GRANT_PERMISSIONS_JS: &str = r#"
Components.utils.import("resource://gre/modules/Services.jsm");
let [url, permissions] = arguments;
let uri = Services.io.newURI(url, null, null);
permissions.forEach(function (perm) {
  Services.perms.add(uri, perm, Components.interfaces.nsIPermissionManager.ALLOW_ACTION);
});
"#;

/// Common setUp for every test case
///
/// Starts a session if none is open, applies the run's timeouts and either
/// enters or closes the test container.
pub async fn set_up_session(ctx: &mut TestContext<'_>, test_container: bool) -> Result<()> {
    let timeout = ctx.env().timeout;
    let page_timeout = ctx.env().page_timeout;
    let session = ctx.session();

    if session.session_id().is_none() {
        session.start_session().await?;
    }

    match timeout {
        Some(ms) => {
            session.set_timeout(TimeoutKind::Search, ms).await?;
            session.set_timeout(TimeoutKind::Script, ms).await?;
            session.set_timeout(TimeoutKind::Page, ms).await?;
        }
        None => session.set_timeout(TimeoutKind::Page, page_timeout).await?,
    }

    if test_container {
        switch_into_test_container(session).await?;
    } else if session.capabilities().is_b2g() {
        close_test_container(session).await?;
    }
    Ok(())
}

/// Release the session at the end of an invocation; never fails
///
/// Trailing remote logs are captured first. If ending the session hits a
/// connection-level error the session is forgotten and the transport closed.
pub async fn delete_session(session: &mut dyn Session, invocation: &mut TestInvocation) {
    if session.session_id().is_none() {
        return;
    }

    match session.get_logs().await {
        Ok(lines) => invocation.loglines.extend(lines),
        Err(e) => {
            invocation.loglines = vec![LogEntry::synthetic(format!("Error getting log: {}", e))];
        }
    }

    if let Err(e) = session.delete_session().await {
        if e.is_connection_error() {
            // Gecko has probably crashed
            tracing::warn!("Failed to delete session, dropping it: {}", e);
            session.clear_session();
            if let Err(e) = session.close().await {
                tracing::debug!("Failed to close transport: {}", e);
            }
        } else {
            tracing::warn!("Failed to delete session: {}", e);
        }
    }
}

/// Switch into the test container iframe, launching the app when needed
pub async fn switch_into_test_container(session: &mut dyn Session) -> Result<()> {
    session.set_context(Context::Content).await?;

    let frame = match session.find_element("css selector", TEST_CONTAINER_FRAME).await {
        Ok(frame) => frame,
        Err(e) if e.is_no_such_element() => {
            let launched = session
                .execute_async_script(
                    LAUNCH_TEST_CONTAINER_JS,
                    Vec::new(),
                    Some(CONTAINER_SCRIPT_TIMEOUT_MS),
                )
                .await?;
            if launched != Value::Bool(true) {
                return Err(Error::TestAssertion(
                    "Could not launch the test container".to_string(),
                ));
            }
            Wait::new(Duration::from_secs(10), Duration::from_millis(200))
                .until(session, element_present("css selector", TEST_CONTAINER_FRAME))
                .await?
        }
        Err(e) => return Err(e),
    };

    session.switch_to_frame(Some(&frame)).await
}

/// Kill the test container app and wait for its iframe to go away
pub async fn close_test_container(session: &mut dyn Session) -> Result<()> {
    session.set_context(Context::Content).await?;
    session.switch_to_frame(None).await?;
    let killed = session
        .execute_async_script(
            KILL_TEST_CONTAINER_JS,
            Vec::new(),
            Some(CONTAINER_SCRIPT_TIMEOUT_MS),
        )
        .await?;
    tracing::debug!("Test container kill returned {}", killed);

    Wait::new(Duration::from_secs(10), Duration::from_millis(200))
        .until(session, element_not_present("css selector", TEST_CONTAINER_FRAME))
        .await
}

/// Load a page in content and optionally grant it permissions from chrome
pub async fn set_up_test_page(session: &mut dyn Session, url: &str, permissions: &[&str]) -> Result<()> {
    session.set_context(Context::Content).await?;
    let url = session.absolute_url(url);
    session.navigate(&url).await?;

    if permissions.is_empty() {
        return Ok(());
    }

    session.set_context(Context::Chrome).await?;
    session
        .execute_script(GRANT_PERMISSIONS_JS, vec![json!(url), json!(permissions)])
        .await?;
    session.set_context(Context::Content).await
}

/// Skip when running on the B2G emulator
pub fn skip_if_b2g(session: &dyn Session) -> StageResult {
    if session.capabilities().device() == Some("qemu") {
        return Err(Signal::Skip("skipping due to b2g".to_string()));
    }
    Ok(())
}

/// Emit a marker line into the remote log
pub async fn remote_log(session: &mut dyn Session, message: &str) -> Result<()> {
    session
        .execute_script("log(arguments[0]);", vec![json!(message)])
        .await
        .map(|_| ())
}

/// Fail the stage when the browser process has crashed
pub async fn check_for_crash(session: &mut dyn Session) -> StageResult {
    let crashed = session.check_for_crash().await?;
    if crashed {
        return Err(Error::ProcessCrashed("detected during tearDown".to_string()).into());
    }
    Ok(())
}
