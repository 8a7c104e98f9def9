//! Integration tests for JSON-RPC handling.
//!
//! The first half checks message parsing; the second drives a full
//! conversation with the server over an in-memory duplex stream.

use std::collections::HashSet;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{
    AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines, ReadHalf, WriteHalf,
};
use tokio::task::JoinHandle;

use adventure_mcp::config::{Config, DefeatEffect};
use adventure_mcp::mcp::protocol::{parse_message, IncomingMessage, RequestId};
use adventure_mcp::mcp::{LineReader, LineWriter, McpServer};

// =============================================================================
// Protocol Parsing Tests
// =============================================================================

#[test]
fn test_parse_initialize_request() {
    let json = r#"{
        "jsonrpc": "2.0",
        "id": 1,
        "method": "initialize",
        "params": {
            "protocolVersion": "2024-11-05",
            "capabilities": { "sampling": {} },
            "clientInfo": {
                "name": "test-client",
                "version": "1.0.0"
            }
        }
    }"#;

    let IncomingMessage::Request(req) = parse_message(json).unwrap() else {
        panic!("Expected Request");
    };
    assert_eq!(req.method, "initialize");
    assert_eq!(req.id, RequestId::Number(1));
}

#[test]
fn test_parse_actions_call_request() {
    let json = r#"{
        "jsonrpc": "2.0",
        "id": "call-1",
        "method": "actions/call",
        "params": { "name": "move", "arguments": { "direction": "north" } }
    }"#;

    let IncomingMessage::Request(req) = parse_message(json).unwrap() else {
        panic!("Expected Request");
    };
    assert_eq!(req.method, "actions/call");
    assert_eq!(req.params.unwrap()["arguments"]["direction"], "north");
}

#[test]
fn test_parse_notification() {
    let json = r#"{
        "jsonrpc": "2.0",
        "method": "notifications/initialized"
    }"#;

    let IncomingMessage::Notification(notif) = parse_message(json).unwrap() else {
        panic!("Expected Notification");
    };
    assert_eq!(notif.method, "notifications/initialized");
}

#[test]
fn test_parse_client_response() {
    let json = r#"{"jsonrpc": "2.0", "id": "srv-0", "result": {"role": "assistant"}}"#;
    assert!(matches!(
        parse_message(json).unwrap(),
        IncomingMessage::Response(_)
    ));
}

#[test]
fn test_parse_invalid_json() {
    let err = parse_message("not valid json").unwrap_err();
    assert_eq!(err.error.code, -32700);
}

#[test]
fn test_parse_missing_jsonrpc_version() {
    let err = parse_message(r#"{"id": 1, "method": "ping"}"#).unwrap_err();
    assert_eq!(err.error.code, -32600);
}

// =============================================================================
// End-to-end Conversation Tests
// =============================================================================

const WAIT: Duration = Duration::from_secs(5);

struct Client {
    writer: WriteHalf<DuplexStream>,
    lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
    stash: Vec<Value>,
    server: JoinHandle<std::io::Result<()>>,
}

impl Client {
    fn start(config: Config) -> Self {
        let server = McpServer::new(config);
        let (client, server_side) = tokio::io::duplex(1 << 16);
        let (server_read, server_write) = tokio::io::split(server_side);
        let (client_read, writer) = tokio::io::split(client);

        let server = tokio::spawn(async move {
            server
                .serve(
                    LineReader::new(BufReader::new(server_read)),
                    LineWriter::new(server_write),
                )
                .await
        });

        Self {
            writer,
            lines: BufReader::new(client_read).lines(),
            stash: Vec::new(),
            server,
        }
    }

    async fn send(&mut self, message: Value) {
        let mut line = message.to_string();
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await.unwrap();
    }

    async fn read(&mut self) -> Value {
        let line = tokio::time::timeout(WAIT, self.lines.next_line())
            .await
            .expect("server answered in time")
            .unwrap()
            .expect("stream still open");
        serde_json::from_str(&line).unwrap()
    }

    /// Sends a request and returns its response, stashing anything else.
    async fn call(&mut self, id: i64, method: &str, params: Value) -> Value {
        self.send(json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params }))
            .await;
        loop {
            let message = self.read().await;
            if message.get("method").is_none() && message["id"] == id {
                return message;
            }
            self.stash.push(message);
        }
    }

    /// Waits for a server-sent message with `method`.
    async fn expect(&mut self, method: &str) -> Value {
        if let Some(pos) = self.stash.iter().position(|m| m["method"] == method) {
            return self.stash.remove(pos);
        }
        loop {
            let message = self.read().await;
            if message["method"] == method {
                return message;
            }
            self.stash.push(message);
        }
    }

    async fn finish(self) {
        let Self {
            mut writer, server, ..
        } = self;
        // Both split halves share the stream; only shutdown signals EOF.
        writer.shutdown().await.unwrap();
        tokio::time::timeout(WAIT, server)
            .await
            .expect("server stopped at EOF")
            .unwrap()
            .unwrap();
    }
}

fn action_names(response: &Value) -> Vec<String> {
    response["result"]["actions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["name"].as_str().unwrap().to_string())
        .collect()
}

async fn initialize(client: &mut Client, capabilities: Value) -> String {
    let response = client
        .call(
            0,
            "initialize",
            json!({
                "protocolVersion": "2024-11-05",
                "capabilities": capabilities,
                "clientInfo": { "name": "test-client", "version": "1.0.0" },
            }),
        )
        .await;
    response["result"]["session"]["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn attack_appears_after_entering_monster_room() {
    let mut client = Client::start(Config::default());
    initialize(&mut client, json!({})).await;

    let list = client.call(1, "actions/list", json!({})).await;
    assert!(!action_names(&list).contains(&"attack".to_string()));

    let moved = client
        .call(2, "actions/call", json!({ "name": "move", "arguments": { "direction": "north" } }))
        .await;
    assert!(moved["result"].get("isError").is_none());
    client
        .call(3, "actions/call", json!({ "name": "move", "arguments": { "direction": "east" } }))
        .await;

    let note = client.expect("notifications/actions/list_changed").await;
    assert!(note.get("id").is_none());
    assert!(note.get("params").is_none());

    let list = client.call(4, "actions/list", json!({})).await;
    assert!(action_names(&list).contains(&"attack".to_string()));

    client.finish().await;
}

#[tokio::test]
async fn blocked_move_is_an_in_world_error() {
    let mut client = Client::start(Config::default());
    initialize(&mut client, json!({})).await;

    let response = client
        .call(1, "actions/call", json!({ "name": "move", "arguments": { "direction": "west" } }))
        .await;
    assert_eq!(response["result"]["isError"], true);
    assert_eq!(
        response["result"]["content"][0]["text"],
        "You can't go west from here."
    );

    let status = client
        .call(2, "resources/read", json!({ "uri": "game://player/status" }))
        .await;
    let text = status["result"]["contents"][0]["text"].as_str().unwrap();
    assert!(text.contains("Location: Cave Entrance"));

    client.finish().await;
}

#[tokio::test]
async fn reading_unlisted_resource_is_not_found() {
    let mut client = Client::start(Config::default());
    initialize(&mut client, json!({})).await;

    let response = client
        .call(1, "resources/read", json!({ "uri": "game://monster" }))
        .await;
    assert_eq!(response["error"]["code"], -32002);
    assert_eq!(response["id"], 1);

    client.finish().await;
}

#[tokio::test]
async fn validation_errors_carry_structured_data() {
    let mut client = Client::start(Config::default());
    initialize(&mut client, json!({})).await;

    let response = client
        .call(1, "actions/call", json!({ "name": "move", "arguments": { "direction": 12 } }))
        .await;
    assert_eq!(response["error"]["code"], -32602);
    assert_eq!(response["error"]["data"]["parameter"], "direction");
    assert_eq!(response["error"]["data"]["problem"], "wrong_type");

    client.finish().await;
}

#[tokio::test]
async fn unknown_session_is_reported() {
    let mut client = Client::start(Config::default());

    let response = client
        .call(1, "actions/list", json!({ "sessionId": "no-such-session" }))
        .await;
    assert_eq!(response["error"]["code"], -32001);
    assert_eq!(response["error"]["data"]["sessionId"], "no-such-session");

    client.finish().await;
}

#[tokio::test]
async fn initialize_twice_with_same_session() {
    let mut client = Client::start(Config::default());
    let session = initialize(&mut client, json!({})).await;

    client
        .call(1, "actions/call", json!({ "name": "pickup", "arguments": { "item": "torch" } }))
        .await;

    for id in 2..=3 {
        let response = client
            .call(id, "initialize", json!({ "sessionId": session }))
            .await;
        assert_eq!(response["result"]["session"]["id"], session.as_str());
    }

    let inventory = client
        .call(4, "actions/call", json!({ "name": "inventory" }))
        .await;
    let text = inventory["result"]["content"][0]["text"].as_str().unwrap();
    assert!(text.contains("Torch"));

    client.finish().await;
}

#[tokio::test]
async fn every_request_gets_exactly_one_response() {
    let mut client = Client::start(Config::default());
    initialize(&mut client, json!({})).await;

    let methods = ["ping", "actions/list", "templates/list", "resources/list", "bogus"];
    for (id, method) in (10..).zip(methods) {
        client
            .send(json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": {} }))
            .await;
    }
    client
        .send(json!({ "jsonrpc": "2.0", "id": 20, "method": "actions/call",
                      "params": { "name": "pickup", "arguments": { "item": "torch" } } }))
        .await;

    let mut seen = HashSet::new();
    while seen.len() < methods.len() + 1 {
        let message = client.read().await;
        if message.get("method").is_some() {
            assert!(message.get("id").is_none(), "notification with id: {message}");
            continue;
        }
        let id = message["id"].as_i64().unwrap();
        assert!(seen.insert(id), "duplicate response for {id}");
    }
    assert_eq!(seen, [10, 11, 12, 13, 14, 20].into_iter().collect());

    client.finish().await;
}

#[tokio::test]
async fn subscribed_resource_gets_updates() {
    let mut client = Client::start(Config::default());
    initialize(&mut client, json!({})).await;

    let ok = client
        .call(1, "resources/subscribe", json!({ "uri": "game://location" }))
        .await;
    assert_eq!(ok["result"], json!({}));

    client
        .call(2, "actions/call", json!({ "name": "pickup", "arguments": { "item": "torch" } }))
        .await;
    let update = client.expect("notifications/resources/updated").await;
    assert_eq!(update["params"]["uri"], "game://location");

    client.finish().await;
}

#[tokio::test]
async fn look_is_embellished_through_sampling() {
    let mut client = Client::start(Config::default());
    initialize(&mut client, json!({ "sampling": {} })).await;

    client
        .send(json!({ "jsonrpc": "2.0", "id": 1, "method": "actions/call",
                      "params": { "name": "look" } }))
        .await;

    let request = client.expect("sampling/createMessage").await;
    assert!(request["params"]["messages"][0]["content"]["text"]
        .as_str()
        .unwrap()
        .contains("Cave Entrance"));
    client
        .send(json!({
            "jsonrpc": "2.0",
            "id": request["id"],
            "result": {
                "role": "assistant",
                "content": { "type": "text", "text": "Wind moans through the stones." },
                "model": "test",
            },
        }))
        .await;

    let response = loop {
        let message = client.read().await;
        if message["id"] == 1 {
            break message;
        }
    };
    let content = response["result"]["content"].as_array().unwrap();
    assert_eq!(content.len(), 2);
    assert_eq!(content[1]["text"], "Wind moans through the stones.");

    client.finish().await;
}

#[tokio::test]
async fn lost_fight_retreats_and_notifies() {
    let mut config = Config::default();
    config.combat.win_probability = 0.0;
    config.combat.on_defeat = DefeatEffect::Retreat;
    let mut client = Client::start(config);
    initialize(&mut client, json!({})).await;

    for (id, direction) in [(1, "north"), (2, "north")] {
        client
            .call(id, "actions/call", json!({ "name": "move", "arguments": { "direction": direction } }))
            .await;
    }
    let response = client
        .call(3, "actions/call", json!({ "name": "attack", "arguments": { "target": "dragon" } }))
        .await;
    let text = response["result"]["content"][0]["text"].as_str().unwrap();
    assert!(text.contains("Cave Entrance"), "unexpected outcome: {text}");

    let list = client.call(4, "actions/list", json!({})).await;
    assert!(!action_names(&list).contains(&"attack".to_string()));

    client.finish().await;
}
