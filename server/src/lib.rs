use std::path::PathBuf;

use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

pub mod auth;
pub mod error;
pub mod handlers;
pub mod logic;
pub mod registry;
pub mod router;
pub mod state;
pub mod storage;

use crate::handlers::{
    append_shape_handler, canvas_handler, list_chats_handler, list_shapes_handler, ping_handler,
    ws_handler,
};
use crate::state::AppState;

pub fn app(state: AppState, public_dir: Option<PathBuf>) -> Router {
    let router = Router::new()
        .route("/ping", get(ping_handler))
        .route("/ws", get(ws_handler))
        .route(
            "/api/rooms/:room_id/shapes",
            get(list_shapes_handler).post(append_shape_handler),
        )
        .route("/api/rooms/:room_id/chats", get(list_chats_handler));
    let router = match public_dir {
        Some(public_dir) => {
            let index_file = public_dir.join("index.html");
            router
                .route("/canvas/:room_id", get(canvas_handler))
                .fallback_service(ServeDir::new(public_dir).append_index_html_on_directories(true))
                .layer(axum::Extension(index_file))
        }
        None => router,
    };
    router
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
