//! Marionette client for driving a remote browser
//!
//! This module handles the TCP connection to the Marionette server,
//! including the hello packet, actor lookup and command/response handling.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio::io::{BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::process::{Child, Command};

use crate::common::{Error, ErrorStatus, Result};
use crate::harness::Session;

use super::codec;
use super::types::*;

/// Delay between connection attempts while the server starts up
const CONNECT_RETRY_MS: u64 = 100;

/// Marionette client for a single browser instance
pub struct MarionetteClient {
    /// Address of the Marionette server
    address: String,
    /// Buffered reader for the socket, `None` once closed
    reader: Option<BufReader<OwnedReadHalf>>,
    /// Buffered writer for the socket
    writer: Option<BufWriter<OwnedWriteHalf>>,
    /// Actor commands are addressed to
    actor: String,
    /// Active session id
    session: Option<String>,
    /// Capabilities of the active session
    capabilities: Capabilities,
    /// Name of the running test
    test_name: Option<String>,
    /// Base URL of the test page server
    base_url: Option<String>,
    /// Browser process we launched, if any
    instance: Option<Child>,
}

impl MarionetteClient {
    /// Connect to an already running Marionette server
    pub async fn connect(address: &str, startup_timeout: Duration) -> Result<Self> {
        let stream = connect_with_retry(address, startup_timeout).await?;
        Self::handshake(address, stream, None).await
    }

    /// Launch a browser binary with Marionette enabled and connect to it
    pub async fn launch(
        binary: &Path,
        args: &[String],
        address: &str,
        startup_timeout: Duration,
    ) -> Result<Self> {
        let mut cmd = Command::new(binary);
        cmd.arg("-marionette")
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let instance = cmd.spawn().map_err(|e| {
            Error::InstanceStartFailed(format!("Failed to start {}: {}", binary.display(), e))
        })?;
        tracing::info!("Launched {} (pid {:?})", binary.display(), instance.id());

        let stream = connect_with_retry(address, startup_timeout).await?;
        Self::handshake(address, stream, Some(instance)).await
    }

    async fn handshake(address: &str, stream: TcpStream, instance: Option<Child>) -> Result<Self> {
        let (read_half, write_half) = stream.into_split();
        let mut client = Self {
            address: address.to_string(),
            reader: Some(BufReader::new(read_half)),
            writer: Some(BufWriter::new(write_half)),
            actor: "root".to_string(),
            session: None,
            capabilities: Capabilities::default(),
            test_name: None,
            base_url: None,
            instance,
        };

        let hello = client.read_message().await?;
        let application = hello
            .get("applicationType")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        tracing::debug!("Connected to {} ({})", client.address, application);

        let response = client.send("getMarionetteID", Map::new()).await?;
        client.actor = response
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Protocol("getMarionetteID returned no actor id".to_string()))?
            .to_string();

        Ok(client)
    }

    /// Set the base URL used by [`Session::absolute_url`]
    pub fn set_base_url(&mut self, url: impl Into<String>) {
        self.base_url = Some(url.into());
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Name of the test currently driving this client
    pub fn test_name(&self) -> Option<&str> {
        self.test_name.as_deref()
    }

    async fn read_message(&mut self) -> Result<Value> {
        let reader = self.reader.as_mut().ok_or(Error::ConnectionClosed)?;
        let json = codec::read_message(reader).await?;
        tracing::debug!("Marionette <<< {}", json);
        serde_json::from_str(&json).map_err(|e| Error::Protocol(format!("Invalid JSON: {}", e)))
    }

    /// Send a named command and wait for its reply
    async fn send(&mut self, name: &str, parameters: Map<String, Value>) -> Result<Value> {
        let mut packet = parameters;
        packet.insert("to".to_string(), json!(self.actor));
        packet.insert("name".to_string(), json!(name));
        if let Some(session) = &self.session {
            packet.insert("sessionId".to_string(), json!(session));
        }

        let json = serde_json::to_string(&packet)?;
        tracing::debug!("Marionette >>> {}", json);
        let writer = self.writer.as_mut().ok_or(Error::ConnectionClosed)?;
        codec::write_message(writer, &json).await?;

        let response = self.read_message().await?;
        if let Some(error) = response.get("error") {
            return Err(remote_error(error));
        }
        Ok(response)
    }

    /// Send a command and return its `value` field
    async fn send_value(&mut self, name: &str, parameters: Map<String, Value>) -> Result<Value> {
        let mut response = self.send(name, parameters).await?;
        Ok(response
            .get_mut("value")
            .map(Value::take)
            .unwrap_or(Value::Null))
    }

    fn require_session(&self) -> Result<()> {
        if self.session.is_none() {
            return Err(Error::SessionNotActive);
        }
        Ok(())
    }
}

#[async_trait]
impl Session for MarionetteClient {
    fn session_id(&self) -> Option<&str> {
        self.session.as_deref()
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    fn set_test_name(&mut self, name: Option<String>) {
        self.test_name = name;
    }

    async fn start_session(&mut self) -> Result<()> {
        let session = self.send_value("newSession", Map::new()).await?;
        let session = session
            .as_str()
            .ok_or_else(|| Error::Protocol("newSession returned no session id".to_string()))?;
        self.session = Some(session.to_string());

        let caps = self.send_value("getSessionCapabilities", Map::new()).await?;
        self.capabilities = parse_capabilities(caps);
        tracing::info!("Started session {}", session);
        Ok(())
    }

    async fn delete_session(&mut self) -> Result<()> {
        self.require_session()?;
        self.send("deleteSession", Map::new()).await?;
        self.session = None;
        Ok(())
    }

    fn clear_session(&mut self) {
        self.session = None;
    }

    async fn close(&mut self) -> Result<()> {
        self.reader = None;
        if let Some(writer) = self.writer.take() {
            let mut stream = writer.into_inner();
            tokio::io::AsyncWriteExt::shutdown(&mut stream).await?;
        }
        Ok(())
    }

    async fn set_timeout(&mut self, kind: TimeoutKind, ms: u64) -> Result<()> {
        let params = object(json!({"type": kind.as_str(), "ms": ms}));
        self.send("timeouts", params).await.map(|_| ())
    }

    async fn set_script_timeout(&mut self, ms: u64) -> Result<()> {
        self.send("setScriptTimeout", object(json!({"ms": ms})))
            .await
            .map(|_| ())
    }

    async fn set_context(&mut self, context: Context) -> Result<()> {
        self.send("setContext", object(json!({"value": context.as_str()})))
            .await
            .map(|_| ())
    }

    async fn navigate(&mut self, url: &str) -> Result<()> {
        self.send("get", object(json!({"url": url}))).await.map(|_| ())
    }

    async fn execute_script(&mut self, script: &str, args: Vec<Value>) -> Result<Value> {
        let params = object(json!({
            "script": script,
            "args": args,
            "newSandbox": true,
            "specialPowers": false,
        }));
        self.send_value("executeScript", params).await
    }

    async fn execute_async_script(
        &mut self,
        script: &str,
        args: Vec<Value>,
        script_timeout: Option<u64>,
    ) -> Result<Value> {
        let params = object(json!({
            "script": script,
            "args": args,
            "newSandbox": true,
            "specialPowers": false,
            "scriptTimeout": script_timeout,
        }));
        self.send_value("executeAsyncScript", params).await
    }

    async fn execute_js_script(&mut self, request: JsScriptRequest) -> Result<Value> {
        let params = object(json!({
            "script": request.script,
            "args": request.args,
            "async": true,
            "newSandbox": true,
            "specialPowers": request.special_powers,
            "inactivityTimeout": request.inactivity_timeout,
            "filename": request.filename,
            "line": 0,
        }));
        self.send_value("executeJSScript", params).await
    }

    async fn get_logs(&mut self) -> Result<Vec<LogEntry>> {
        let logs = self.send_value("getLogs", Map::new()).await?;
        Ok(logs
            .as_array()
            .map(|entries| entries.iter().filter_map(LogEntry::from_value).collect())
            .unwrap_or_default())
    }

    async fn check_for_crash(&mut self) -> Result<bool> {
        let Some(instance) = self.instance.as_mut() else {
            return Ok(false);
        };
        match instance.try_wait()? {
            Some(status) if !status.success() => {
                tracing::warn!("Browser process exited with {}", status);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_element(&mut self, using: &str, value: &str) -> Result<ElementRef> {
        let element = self
            .send_value("findElement", object(json!({"using": using, "value": value})))
            .await?;
        let id = match element {
            Value::String(id) => id,
            Value::Object(map) => map
                .get("ELEMENT")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| Error::Protocol("findElement returned no element id".to_string()))?,
            other => {
                return Err(Error::Protocol(format!(
                    "Unexpected findElement reply: {}",
                    other
                )))
            }
        };
        Ok(ElementRef { id })
    }

    async fn switch_to_frame(&mut self, frame: Option<&ElementRef>) -> Result<()> {
        let params = match frame {
            Some(element) => object(json!({"element": element.id, "focus": true})),
            None => object(json!({"focus": true})),
        };
        self.send("switchToFrame", params).await.map(|_| ())
    }

    fn absolute_url(&self, path: &str) -> String {
        match &self.base_url {
            Some(base) => format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/')),
            None => path.to_string(),
        }
    }
}

/// Keep retrying until the server accepts a connection or the deadline passes
async fn connect_with_retry(address: &str, startup_timeout: Duration) -> Result<TcpStream> {
    let deadline = tokio::time::Instant::now() + startup_timeout;

    loop {
        match TcpStream::connect(address).await {
            Ok(stream) => return Ok(stream),
            Err(e) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
                if tokio::time::Instant::now() >= deadline {
                    return Err(Error::StartupTimeout(startup_timeout.as_secs()));
                }
                tokio::time::sleep(Duration::from_millis(CONNECT_RETRY_MS)).await;
            }
            Err(source) => {
                return Err(Error::ConnectionFailed {
                    address: address.to_string(),
                    source,
                })
            }
        }
    }
}

/// Convert an `{"error": {...}}` reply into an error
fn remote_error(error: &Value) -> Error {
    let status = error
        .get("status")
        .and_then(|s| match s {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        })
        .map(ErrorStatus::from_code)
        .unwrap_or(ErrorStatus::UnknownError);

    Error::Marionette {
        status,
        message: error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("Unknown error")
            .to_string(),
        stacktrace: error
            .get("stacktrace")
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}

/// Capabilities from a `getSessionCapabilities` reply, defaults when malformed
fn parse_capabilities(caps: Value) -> Capabilities {
    match serde_json::from_value(caps) {
        Ok(capabilities) => capabilities,
        Err(e) => {
            tracing::warn!("Ignoring malformed session capabilities: {}", e);
            Capabilities::default()
        }
    }
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
