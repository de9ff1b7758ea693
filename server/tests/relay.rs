use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use inkroom_server::auth::TokenVerifier;
use inkroom_server::state::AppState;
use inkroom_server::storage::{MemoryStore, Store};
use inkroom_shared::{Point, RoomId, Shape};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

const SECRET: &str = "relay-test-secret";

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn spawn_server() -> (SocketAddr, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let state = AppState::new(store.clone(), TokenVerifier::new(SECRET));
    let app = inkroom_server::app(state, None);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, store)
}

async fn connect(addr: SocketAddr, user: &str) -> Socket {
    let token = TokenVerifier::new(SECRET).issue(user).unwrap();
    let (socket, _) = connect_async(format!("ws://{addr}/ws?token={token}"))
        .await
        .unwrap();
    socket
}

async fn send(socket: &mut Socket, value: Value) {
    socket.send(Message::text(value.to_string())).await.unwrap();
}

/// Next text envelope of the given type, skipping others.
async fn next_of_type(socket: &mut Socket, kind: &str) -> Value {
    loop {
        let message = timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("timed out waiting for envelope")
            .expect("socket closed")
            .expect("socket error");
        if let Message::Text(text) = message {
            let value: Value = serde_json::from_str(text.as_str()).unwrap();
            if value["type"] == kind {
                return value;
            }
        }
    }
}

/// Joins `room` and waits for the echo of a marker chat, so the join is
/// known to be applied before the caller continues.
async fn join(socket: &mut Socket, room: &str) {
    send(socket, json!({"type": "join_room", "roomId": room})).await;
    let marker = format!("joined {room}");
    send(
        socket,
        json!({"type": "chat", "roomId": room, "message": marker}),
    )
    .await;
    loop {
        let chat = next_of_type(socket, "chat").await;
        if chat["message"] == marker.as_str() {
            return;
        }
    }
}

#[tokio::test]
async fn rectangle_reaches_other_room_member() {
    let (addr, store) = spawn_server().await;
    let mut alice = connect(addr, "alice").await;
    let mut bob = connect(addr, "bob").await;
    join(&mut alice, "42").await;
    join(&mut bob, "42").await;

    let shape = Shape::rectangle_from_drag(Point::new(10.0, 10.0), Point::new(110.0, 60.0));
    send(
        &mut alice,
        json!({"type": "chat_shape", "roomId": "42", "shape": shape}),
    )
    .await;

    let received = next_of_type(&mut bob, "chat_shape").await;
    assert_eq!(received["roomId"], "42");
    assert_eq!(received["userId"], "alice");
    let decoded: Shape = serde_json::from_value(received["shape"].clone()).unwrap();
    assert_eq!(
        decoded,
        Shape::Rectangle {
            x: 10.0,
            y: 10.0,
            width: 100.0,
            height: 50.0
        }
    );

    let echo = next_of_type(&mut alice, "chat_shape").await;
    assert_eq!(echo["shape"], received["shape"]);

    let stored = store.list_shapes(&RoomId::new("42"), 10).await.unwrap();
    assert_eq!(stored.len(), 1);
}

#[tokio::test]
async fn shapes_stay_inside_their_room() {
    let (addr, _store) = spawn_server().await;
    let mut members = Vec::new();
    for user in ["a", "b", "c"] {
        let mut socket = connect(addr, user).await;
        join(&mut socket, "R").await;
        members.push(socket);
    }
    let mut outsider = connect(addr, "d").await;
    join(&mut outsider, "S").await;

    let shape = json!({"type": "pencil", "points": [{"x": 0, "y": 0}, {"x": 5, "y": 5}]});
    send(
        &mut members[0],
        json!({"type": "chat_shape", "roomId": "R", "shape": shape}),
    )
    .await;
    for socket in &mut members {
        let received = next_of_type(socket, "chat_shape").await;
        assert_eq!(received["shape"], shape);
    }
    let nothing = timeout(Duration::from_millis(300), outsider.next()).await;
    assert!(nothing.is_err(), "outsider received {nothing:?}");
}

#[tokio::test]
async fn invalid_token_is_refused() {
    let (addr, _store) = spawn_server().await;
    let forged = TokenVerifier::new("wrong-secret").issue("mallory").unwrap();
    assert!(connect_async(format!("ws://{addr}/ws?token={forged}"))
        .await
        .is_err());
    assert!(connect_async(format!("ws://{addr}/ws")).await.is_err());
}

#[tokio::test]
async fn second_login_closes_first_socket() {
    let (addr, _store) = spawn_server().await;
    let mut first = connect(addr, "alice").await;
    let mut second = connect(addr, "alice").await;

    let next = timeout(Duration::from_secs(5), first.next())
        .await
        .expect("first socket stayed open");
    assert!(matches!(next, None | Some(Ok(Message::Close(_))) | Some(Err(_))));

    join(&mut second, "42").await;
}

#[tokio::test]
async fn malformed_event_keeps_connection_open() {
    let (addr, store) = spawn_server().await;
    let mut alice = connect(addr, "alice").await;
    alice.send(Message::text("{not json")).await.unwrap();
    send(&mut alice, json!({"type": "chat_shape", "roomId": "42"})).await;
    join(&mut alice, "42").await;
    assert!(store
        .list_shapes(&RoomId::new("42"), 10)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn persisted_shapes_are_listed_over_http() {
    let (addr, _store) = spawn_server().await;
    let mut alice = connect(addr, "alice").await;
    join(&mut alice, "42").await;
    let shape = json!({"type": "text", "x": 1, "y": 2, "text": "hi"});
    send(
        &mut alice,
        json!({"type": "chat_shape", "roomId": "42", "shape": shape}),
    )
    .await;
    next_of_type(&mut alice, "chat_shape").await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(
            b"GET /api/rooms/42/shapes?limit=5 HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
        )
        .await
        .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    assert!(response.starts_with("HTTP/1.1 200"));
    let body = &response[response.find("\r\n\r\n").unwrap() + 4..];
    let listed: Value = serde_json::from_str(body).unwrap();
    assert_eq!(listed["shapes"][0]["shape"], shape);
    assert_eq!(listed["shapes"][0]["userId"], "alice");
}
