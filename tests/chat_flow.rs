//! End-to-end tests: the relay runs in-process on an ephemeral port and is
//! driven by real WebSocket and HTTP clients.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use chat_relay::{server::build_app, Config};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start_server(config: Config) -> SocketAddr {
    let (app, _room) = build_app(&config).expect("valid config");
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    addr
}

async fn connect(addr: SocketAddr, query: &str) -> Ws {
    let url = format!("ws://{addr}/ws{query}");
    let (ws, _response) = tokio_tungstenite::connect_async(url)
        .await
        .expect("Failed to connect");
    ws
}

/// Next chat frame as JSON, skipping control frames
async fn next_message(ws: &mut Ws) -> Value {
    loop {
        let frame = timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("connection ended")
            .expect("websocket error");

        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).expect("frame is JSON");
        }
    }
}

fn shipped_static_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("web/static")
}

async fn get_json(addr: SocketAddr, path: &str) -> Value {
    reqwest::get(format!("http://{addr}{path}"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_single_client_join_send_and_stats() {
    let addr = start_server(Config::default()).await;
    let mut alice = connect(addr, "?username=Alice").await;

    let joined = next_message(&mut alice).await;
    assert_eq!(joined["type"], "join");
    assert_eq!(joined["content"], "Alice joined");
    assert_eq!(joined["username"], "System");

    alice.send(Message::Text("hi".into())).await.unwrap();

    // The sender sees its own message through the room
    let echoed = next_message(&mut alice).await;
    assert_eq!(echoed["type"], "message");
    assert_eq!(echoed["content"], "hi");
    assert_eq!(echoed["username"], "Alice");

    let stats = get_json(addr, "/api/stats").await;
    assert_eq!(stats["online_users"], 1);
    assert!(stats["total_messages"].as_u64().unwrap() >= 1);
    assert!(stats["uptime"].is_string());
}

#[tokio::test]
async fn test_messages_reach_every_client() {
    let addr = start_server(Config::default()).await;
    let mut alice = connect(addr, "?username=Alice").await;
    next_message(&mut alice).await;
    let mut bob = connect(addr, "?username=Bob").await;

    assert_eq!(next_message(&mut alice).await["content"], "Bob joined");
    assert_eq!(next_message(&mut bob).await["content"], "Bob joined");

    bob.send(Message::Text(r#"{"content":"hello all"}"#.into()))
        .await
        .unwrap();

    for ws in [&mut alice, &mut bob] {
        let msg = next_message(ws).await;
        assert_eq!(msg["content"], "hello all");
        assert_eq!(msg["username"], "Bob");
    }
}

#[tokio::test]
async fn test_late_joiner_receives_history() {
    let addr = start_server(Config::default()).await;
    let mut alice = connect(addr, "?username=Alice").await;
    next_message(&mut alice).await;

    for text in ["one", "two"] {
        alice.send(Message::Text(text.into())).await.unwrap();
        next_message(&mut alice).await;
    }

    let mut carol = connect(addr, "?username=Carol").await;
    assert_eq!(next_message(&mut carol).await["content"], "Carol joined");
    assert_eq!(next_message(&mut carol).await["content"], "one");
    assert_eq!(next_message(&mut carol).await["content"], "two");

    let history = get_json(addr, "/api/messages").await;
    assert_eq!(history["count"], 2);
    assert_eq!(history["messages"][0]["content"], "one");
}

#[tokio::test]
async fn test_disconnect_announces_leave() {
    let addr = start_server(Config::default()).await;
    let mut alice = connect(addr, "?username=Alice").await;
    next_message(&mut alice).await;
    let mut bob = connect(addr, "?username=Bob").await;
    next_message(&mut bob).await;

    alice.close(None).await.unwrap();

    let left = next_message(&mut bob).await;
    assert_eq!(left["type"], "leave");
    assert_eq!(left["content"], "Alice left");

    let stats = get_json(addr, "/api/stats").await;
    assert_eq!(stats["online_users"], 1);
}

#[tokio::test]
async fn test_missing_username_is_anonymous() {
    let addr = start_server(Config::default()).await;
    let mut ws = connect(addr, "").await;

    assert_eq!(next_message(&mut ws).await["content"], "Anonymous joined");
}

#[tokio::test]
async fn test_structured_payload_keeps_its_id() {
    let addr = start_server(Config::default()).await;
    let mut alice = connect(addr, "?username=Alice").await;
    next_message(&mut alice).await;

    let payload = r#"{"id":"client-42","username":"Alice","content":"tagged","timestamp":"2024-01-01T00:00:00Z","type":"message"}"#;
    alice.send(Message::Text(payload.into())).await.unwrap();

    let msg = next_message(&mut alice).await;
    assert_eq!(msg["id"], "client-42");
    assert_eq!(msg["content"], "tagged");
    assert_eq!(msg["type"], "message");
}

#[tokio::test]
async fn test_history_capacity_from_config() {
    let config = Config {
        max_messages: 2,
        ..Config::default()
    };
    let addr = start_server(config).await;
    let mut alice = connect(addr, "?username=Alice").await;
    next_message(&mut alice).await;

    for text in ["a", "b", "c"] {
        alice.send(Message::Text(text.into())).await.unwrap();
        next_message(&mut alice).await;
    }

    let history = get_json(addr, "/api/messages").await;
    assert_eq!(history["count"], 2);
    assert_eq!(history["messages"][0]["content"], "b");
    assert_eq!(history["messages"][1]["content"], "c");
}

#[tokio::test]
async fn test_health_check() {
    let addr = start_server(Config::default()).await;

    let body = get_json(addr, "/api/health").await;

    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_home_page_is_served() {
    let config = Config {
        static_dir: shipped_static_dir(),
        ..Config::default()
    };
    let addr = start_server(config).await;

    let response = reqwest::get(format!("http://{addr}/")).await.unwrap();
    assert!(response.status().is_success());
    let content_type = response.headers()["content-type"].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/html"), "got {content_type}");
    let body = response.text().await.unwrap();
    assert!(body.contains("/static/script.js"));

    let script = reqwest::get(format!("http://{addr}/static/script.js"))
        .await
        .unwrap();
    assert!(script.status().is_success());
    assert!(script.text().await.unwrap().contains("/ws?username="));
}

/// State of the server's end of the TCP connection to `client_port`, as
/// listed in /proc/net/tcp ("01" is ESTABLISHED); `None` once it is gone
#[cfg(target_os = "linux")]
fn server_socket_state(server_port: u16, client_port: u16) -> Option<String> {
    fn port(addr: &str) -> Option<u16> {
        u16::from_str_radix(addr.rsplit(':').next()?, 16).ok()
    }

    let table = std::fs::read_to_string("/proc/net/tcp").ok()?;
    table.lines().skip(1).find_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let local = port(fields.get(1)?)?;
        let remote = port(fields.get(2)?)?;
        if local == server_port && remote == client_port {
            fields.get(3).map(|state| state.to_string())
        } else {
            None
        }
    })
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_stalled_reader_is_evicted_and_disconnected() {
    let config = Config {
        client_queue_capacity: 4,
        ..Config::default()
    };
    let addr = start_server(config).await;

    let mut alice = connect(addr, "?username=Alice").await;
    next_message(&mut alice).await;

    // Completes the handshake, then never reads another frame
    let stalled = connect(addr, "?username=Stalled").await;
    let MaybeTlsStream::Plain(tcp) = stalled.get_ref() else {
        panic!("expected a plain TCP stream");
    };
    let stalled_port = tcp.local_addr().unwrap().port();
    assert_eq!(next_message(&mut alice).await["content"], "Stalled joined");

    // Large frames fill the socket buffers, then the stalled client's queue
    let big = "x".repeat(128 * 1024);
    let mut evicted = false;
    for round in 0..1000 {
        alice.send(Message::Text(big.clone())).await.unwrap();
        next_message(&mut alice).await;

        if round % 8 == 7 && get_json(addr, "/api/stats").await["online_users"] == 1 {
            evicted = true;
            break;
        }
    }
    assert!(evicted, "stalled client was never evicted");

    // The server drops its end even though the peer is not reading
    let mut state = server_socket_state(addr.port(), stalled_port);
    for _ in 0..50 {
        if state.as_deref() != Some("01") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        state = server_socket_state(addr.port(), stalled_port);
    }
    assert_ne!(
        state.as_deref(),
        Some("01"),
        "evicted connection still established"
    );

    // Eviction sends no leave notice, and the later unregister is a no-op
    alice.send(Message::Text("after".into())).await.unwrap();
    let next = next_message(&mut alice).await;
    assert_eq!(next["type"], "message");
    assert_eq!(next["content"], "after");

    let stats = get_json(addr, "/api/stats").await;
    assert_eq!(stats["online_users"], 1);

    drop(stalled);
}
