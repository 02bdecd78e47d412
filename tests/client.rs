//! Marionette client tests against a loopback server
//!
//! The server speaks just enough of the protocol to answer the commands
//! each test sends and records the command names it saw.

use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{BufReader, BufWriter};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use marionette_harness::harness::testing::RecordingCollector;
use marionette_harness::harness::{
    run, JsTestCase, Outcome, RunEnv, Session, SessionRegistry, SuiteOptions, TestCase,
};
use marionette_harness::marionette::codec::{read_message, write_message};
use marionette_harness::marionette::{Context, JsScriptRequest, MarionetteClient, TimeoutKind};
use marionette_harness::Error;

/// Reply the fake server sends for a command
fn reply(name: &str, packet: &Value) -> Value {
    match name {
        "getMarionetteID" => json!({"from": "root", "id": "conn0.marionette"}),
        "newSession" => json!({"from": "conn0.marionette", "value": "session-1"}),
        "getSessionCapabilities" => json!({
            "from": "conn0.marionette",
            "value": {"b2g": false, "device": "desktop", "browserName": "firefox"}
        }),
        "executeScript" => json!({"from": "conn0.marionette", "value": packet["args"].clone()}),
        "executeJSScript" => json!({"from": "conn0.marionette", "value": {"passed": 3}}),
        "findElement" => json!({
            "from": "conn0.marionette",
            "error": {"status": 7, "message": "Unable to locate element", "stacktrace": null}
        }),
        "getLogs" => json!({"from": "conn0.marionette", "value": [["INFO", "hello", "12:00"]]}),
        _ => json!({"from": "conn0.marionette", "ok": true}),
    }
}

/// Serve one connection; returns every packet received
async fn serve(listener: TcpListener) -> Vec<Value> {
    let (stream, _) = listener.accept().await.unwrap();
    let (read_half, write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut writer = BufWriter::new(write_half);

    let hello = json!({"from": "root", "applicationType": "gecko", "traits": []});
    write_message(&mut writer, &hello.to_string()).await.unwrap();

    let mut packets = Vec::new();
    loop {
        let json = match read_message(&mut reader).await {
            Ok(json) => json,
            Err(Error::ConnectionClosed) => break,
            Err(e) => panic!("server read failed: {e}"),
        };
        let packet: Value = serde_json::from_str(&json).unwrap();
        let name = packet["name"].as_str().unwrap_or_default().to_string();
        let response = reply(&name, &packet);
        packets.push(packet);
        write_message(&mut writer, &response.to_string()).await.unwrap();
    }
    packets
}

async fn start_server() -> (String, JoinHandle<Vec<Value>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    (address, tokio::spawn(serve(listener)))
}

fn names(packets: &[Value]) -> Vec<&str> {
    packets.iter().filter_map(|p| p["name"].as_str()).collect()
}

#[tokio::test]
async fn test_session_round_trip() {
    let (address, server) = start_server().await;
    let mut client = MarionetteClient::connect(&address, Duration::from_secs(5)).await.unwrap();

    client.start_session().await.unwrap();
    assert_eq!(client.session_id(), Some("session-1"));
    assert_eq!(client.capabilities().device(), Some("desktop"));
    assert!(!client.capabilities().is_b2g());

    client.set_timeout(TimeoutKind::Page, 30_000).await.unwrap();
    client.set_context(Context::Chrome).await.unwrap();
    let echoed = client.execute_script("return arguments;", vec![json!(1), json!("two")]).await.unwrap();
    assert_eq!(echoed, json!([1, "two"]));

    let err = client.find_element("css selector", "#missing").await.unwrap_err();
    assert!(err.is_no_such_element());

    let logs = client.get_logs().await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].message, "hello");

    client.delete_session().await.unwrap();
    assert!(client.session_id().is_none());
    client.close().await.unwrap();

    let packets = server.await.unwrap();
    assert_eq!(
        names(&packets),
        vec![
            "getMarionetteID",
            "newSession",
            "getSessionCapabilities",
            "timeouts",
            "setContext",
            "executeScript",
            "findElement",
            "getLogs",
            "deleteSession"
        ]
    );
    assert_eq!(packets[0]["to"], "root");
    assert_eq!(packets[1]["to"], "conn0.marionette");
    assert_eq!(packets[3]["type"], "page load");
    assert_eq!(packets[3]["sessionId"], "session-1");
    assert_eq!(packets[4]["value"], "chrome");
}

#[tokio::test]
async fn test_js_script_parameters() {
    let (address, server) = start_server().await;
    let mut client = MarionetteClient::connect(&address, Duration::from_secs(5)).await.unwrap();
    client.start_session().await.unwrap();

    let value = client
        .execute_js_script(JsScriptRequest {
            script: "ok(true); finish();".to_string(),
            special_powers: true,
            inactivity_timeout: Some(2000),
            filename: Some("test_x.js".to_string()),
            ..JsScriptRequest::default()
        })
        .await
        .unwrap();
    assert_eq!(value, json!({"passed": 3}));
    client.close().await.unwrap();

    let packets = server.await.unwrap();
    let request = packets.iter().find(|p| p["name"] == "executeJSScript").unwrap();
    assert_eq!(request["specialPowers"], true);
    assert_eq!(request["inactivityTimeout"], 2000);
    assert_eq!(request["filename"], "test_x.js");
    assert_eq!(request["async"], true);
}

#[tokio::test]
async fn test_js_test_against_server() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("test_remote.js");
    std::fs::write(&path, "MARIONETTE_TIMEOUT = 1000;\nok(true);\nfinish();\n").unwrap();

    let (address, server) = start_server().await;
    let client = MarionetteClient::connect(&address, Duration::from_secs(5)).await.unwrap();
    let mut registry = SessionRegistry::new();
    let handle = registry.insert(Box::new(client));
    let mut test = JsTestCase::new(&path, handle, SuiteOptions::default());
    let mut result = RecordingCollector::full();

    let outcome = run(&mut test, &mut registry, &RunEnv::default(), &mut result).await.unwrap();
    assert_eq!(outcome, Outcome::Success);
    assert_eq!(test.invocation().loglines.len(), 1);

    let mut session = registry.remove(handle).unwrap();
    session.close().await.unwrap();

    let packets = server.await.unwrap();
    assert_eq!(
        names(&packets),
        vec![
            "getMarionetteID",
            "newSession",
            "getSessionCapabilities",
            "timeouts",
            "executeScript",
            "get",
            "setScriptTimeout",
            "executeJSScript",
            "executeScript",
            "getLogs",
            "deleteSession"
        ]
    );
}

#[tokio::test]
async fn test_connect_refused_times_out() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap().to_string();
    drop(listener);

    let err = MarionetteClient::connect(&address, Duration::from_millis(300))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, Error::StartupTimeout(_)));
}
