use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use futures_util::{SinkExt, StreamExt};
use inkroom_shared::{ClientMessage, RoomId};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::{AuthError, RelayError, StoreError};
use crate::logic::{apply_client_message, parse_client_message, Peer};
use crate::registry::Outbound;
use crate::state::{AppState, DEFAULT_CHAT_PAGE, DEFAULT_SHAPE_PAGE, MAX_PAGE};
use crate::storage::{validate_room_id, ShapeRecord};

pub async fn ping_handler() -> impl IntoResponse {
    StatusCode::NO_CONTENT
}

pub async fn canvas_handler(
    Path(room_id): Path<String>,
    axum::Extension(index_file): axum::Extension<std::path::PathBuf>,
) -> Response {
    if validate_room_id(&RoomId::new(room_id)).is_err() {
        return StatusCode::NOT_FOUND.into_response();
    }
    match tokio::fs::read_to_string(index_file).await {
        Ok(contents) => Html(contents).into_response(),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

#[derive(Deserialize)]
pub struct ConnectParams {
    token: Option<String>,
}

pub async fn ws_handler(
    Query(params): Query<ConnectParams>,
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Response {
    let token = params.token.unwrap_or_default();
    let user_id = match state.verifier.verify(&token) {
        Ok(user_id) => user_id,
        Err(error) => {
            tracing::info!(%error, "rejected socket");
            return error_response(StatusCode::UNAUTHORIZED, &error.to_string());
        }
    };
    ws.on_upgrade(move |socket| handle_socket(socket, state, user_id))
}

async fn handle_socket(socket: WebSocket, state: AppState, user_id: String) {
    let (mut socket_sender, mut socket_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();
    let peer = Peer {
        user_id,
        connection_id: Uuid::new_v4(),
    };

    if let Err(error) = state
        .router
        .register(&peer.user_id, peer.connection_id, tx)
        .await
    {
        tracing::error!(user = %peer.user_id, %error, "could not register connection");
        let _ = socket_sender.send(Message::Close(None)).await;
        return;
    }

    let conn = peer.connection_id;
    let mut send_task = tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            match outbound {
                Outbound::Message(message) => {
                    let Ok(payload) = serde_json::to_string(&message) else {
                        continue;
                    };
                    if let Err(error) = socket_sender.send(Message::Text(payload)).await {
                        tracing::warn!(%conn, %error, "socket write failed");
                        break;
                    }
                }
                Outbound::Evicted => {
                    let _ = socket_sender.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    loop {
        tokio::select! {
            message = socket_receiver.next() => {
                let text = match message {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                        Ok(text) => text,
                        Err(_) => {
                            tracing::debug!(user = %peer.user_id, "dropped non-utf8 frame");
                            continue;
                        }
                    },
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(error)) => {
                        tracing::info!(user = %peer.user_id, %error, "socket error");
                        break;
                    }
                };
                match dispatch(&state, &peer, &text).await {
                    Ok(()) => {}
                    Err(error @ RelayError::Evicted { .. }) => {
                        tracing::info!(user = %peer.user_id, %error, "stopping evicted connection");
                        break;
                    }
                    Err(error @ RelayError::Persistence { .. }) => {
                        tracing::warn!(user = %peer.user_id, %error, "event dropped");
                    }
                    Err(error) => {
                        tracing::debug!(user = %peer.user_id, %error, "event not relayed");
                    }
                }
            }
            _ = &mut send_task => break,
        }
    }

    state.router.unregister(&peer.user_id, peer.connection_id);
    send_task.abort();
    tracing::info!(user = %peer.user_id, conn = %peer.connection_id, "disconnected");
}

async fn dispatch(state: &AppState, peer: &Peer, text: &str) -> Result<(), RelayError> {
    let message: ClientMessage = parse_client_message(text)?;
    apply_client_message(state, peer, message).await
}

#[derive(Deserialize)]
pub struct PageParams {
    limit: Option<usize>,
}

pub async fn list_shapes_handler(
    Path(room_id): Path<String>,
    Query(params): Query<PageParams>,
    State(state): State<AppState>,
) -> Response {
    let room_id = RoomId::new(room_id);
    let limit = page_limit(params.limit, DEFAULT_SHAPE_PAGE);
    match state.store.list_shapes(&room_id, limit).await {
        Ok(shapes) => Json(json!({ "shapes": shapes })).into_response(),
        Err(error) => store_error_response(error),
    }
}

pub async fn list_chats_handler(
    Path(room_id): Path<String>,
    Query(params): Query<PageParams>,
    State(state): State<AppState>,
) -> Response {
    let room_id = RoomId::new(room_id);
    let limit = page_limit(params.limit, DEFAULT_CHAT_PAGE);
    match state.store.list_chats(&room_id, limit).await {
        Ok(chats) => Json(json!({ "chats": chats })).into_response(),
        Err(error) => store_error_response(error),
    }
}

#[derive(Deserialize)]
pub struct AppendShapeBody {
    #[serde(default)]
    shape: Value,
}

pub async fn append_shape_handler(
    Path(room_id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<AppendShapeBody>,
) -> Response {
    let token = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    let user_id = match state.verifier.verify(token) {
        Ok(user_id) => user_id,
        Err(error @ AuthError::MissingToken) => {
            return error_response(StatusCode::UNAUTHORIZED, &format!("unauthorized: {error}"))
        }
        Err(_) => return error_response(StatusCode::UNAUTHORIZED, "unauthorized: invalid token"),
    };
    let room_id = RoomId::new(room_id);
    if let Err(error) = validate_room_id(&room_id) {
        return store_error_response(error);
    }
    if body.shape.is_null() {
        return error_response(StatusCode::BAD_REQUEST, "Invalid input");
    }
    let record = ShapeRecord::new(room_id, user_id, body.shape);
    match state.store.append_shape(record.clone()).await {
        Ok(()) => Json(json!({ "shape": record })).into_response(),
        Err(error) => store_error_response(error),
    }
}

fn page_limit(requested: Option<usize>, default: usize) -> usize {
    requested.unwrap_or(default).clamp(1, MAX_PAGE)
}

fn store_error_response(error: StoreError) -> Response {
    match error {
        StoreError::InvalidRoom(_) => error_response(StatusCode::BAD_REQUEST, &error.to_string()),
        error => {
            tracing::warn!(%error, "storage request failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "message": message }))).into_response()
}
