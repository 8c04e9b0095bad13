//! End-to-end: real HTTP server, real WebSocket clients.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::StreamExt;
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use uuid::Uuid;

use parley_server::app::{build_app, build_state};
use parley_server::config::Config;
use parley_types::api::AuthResponse;
use parley_types::events::GatewayEvent;
use parley_types::models::Message;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Serve the full app on an ephemeral port. Keep the `TempDir` alive for the
/// duration of the test; dropping it removes the upload directory.
async fn spawn_server() -> (SocketAddr, TempDir) {
    let upload_dir = tempfile::tempdir().unwrap();
    let config = Config::from_lookup(|name| match name {
        "PARLEY_DB_PATH" => Some(":memory:".into()),
        "PARLEY_JWT_SECRET" => Some("e2e-secret".into()),
        "PARLEY_ENABLE_SOCKETS" => Some("true".into()),
        "PARLEY_UPLOAD_DIR" => Some(upload_dir.path().display().to_string()),
        _ => None,
    })
    .unwrap();

    let app = build_app(build_state(&config).unwrap(), &config);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, upload_dir)
}

async fn register(client: &reqwest::Client, addr: SocketAddr, name: &str) -> AuthResponse {
    let resp = client
        .post(format!("http://{addr}/api/auth/register"))
        .json(&json!({
            "fullName": name,
            "email": format!("{}@example.com", name.to_lowercase()),
            "password": "hunter22",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    resp.json().await.unwrap()
}

async fn connect(addr: SocketAddr, user_id: Option<Uuid>) -> Socket {
    let url = match user_id {
        Some(id) => format!("ws://{addr}/gateway?userId={id}"),
        None => format!("ws://{addr}/gateway"),
    };
    let (socket, _) = connect_async(url).await.unwrap();
    socket
}

/// Next gateway event, skipping control frames.
async fn next_event(socket: &mut Socket) -> GatewayEvent {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("timed out waiting for gateway event")
            .expect("socket closed")
            .unwrap();
        if let WsMessage::Text(text) = frame {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

/// Skip presence updates until the online list matches `expected`.
async fn wait_for_online(socket: &mut Socket, expected: &[Uuid]) {
    let mut expected = expected.to_vec();
    expected.sort();
    loop {
        if let GatewayEvent::GetOnlineUsers(ids) = next_event(socket).await {
            if ids == expected {
                return;
            }
        }
    }
}

#[tokio::test]
async fn online_receiver_gets_plaintext_push() {
    let (addr, _uploads) = spawn_server().await;
    let client = reqwest::Client::new();

    let alice = register(&client, addr, "Alice").await;
    let bob = register(&client, addr, "Bob").await;

    let mut bob_socket = connect(addr, Some(bob.user.id)).await;
    wait_for_online(&mut bob_socket, &[bob.user.id]).await;

    let resp = client
        .post(format!("http://{addr}/api/messages/send/{}", bob.user.id))
        .bearer_auth(&alice.token)
        .json(&json!({ "text": "hello over the wire" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let sent: Message = resp.json().await.unwrap();

    match next_event(&mut bob_socket).await {
        GatewayEvent::NewMessage(pushed) => {
            assert_eq!(pushed, sent);
            assert_eq!(pushed.text.as_deref(), Some("hello over the wire"));
        }
        other => panic!("expected newMessage, got {other:?}"),
    }
}

#[tokio::test]
async fn presence_is_broadcast_on_connect_and_disconnect() {
    let (addr, _uploads) = spawn_server().await;
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();

    let mut watcher = connect(addr, None).await;
    wait_for_online(&mut watcher, &[]).await;

    let mut alice_socket = connect(addr, Some(alice)).await;
    wait_for_online(&mut watcher, &[alice]).await;

    let bob_socket = connect(addr, Some(bob)).await;
    wait_for_online(&mut watcher, &[alice, bob]).await;
    wait_for_online(&mut alice_socket, &[alice, bob]).await;

    drop(bob_socket);
    wait_for_online(&mut watcher, &[alice]).await;
}

#[tokio::test]
async fn offline_message_is_returned_by_history() {
    let (addr, _uploads) = spawn_server().await;
    let client = reqwest::Client::new();

    let alice = register(&client, addr, "Alice").await;
    let bob = register(&client, addr, "Bob").await;

    let resp = client
        .post(format!("http://{addr}/api/messages/send/{}", bob.user.id))
        .bearer_auth(&alice.token)
        .json(&json!({ "text": "see you later" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);

    let history: Vec<Value> = client
        .get(format!("http://{addr}/api/messages/{}", alice.user.id))
        .bearer_auth(&bob.token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["text"], "see you later");
    assert_eq!(history[0]["senderId"], alice.user.id.to_string());
}
