use inkroom_shared::{RoomId, Shape};
use serde::Deserialize;
use serde_json::Value;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{Request, RequestInit, Response, Window};

use crate::session::decode_remote_shape;

pub const TOKEN_KEY: &str = "token";
pub const HISTORY_LIMIT: usize = 1000;

pub fn websocket_url(window: &Window, token: &str) -> Result<String, JsValue> {
    let location = window.location();
    let protocol = location.protocol()?;
    let host = location.host()?;
    let token = String::from(js_sys::encode_uri_component(token));
    Ok(socket_url(&protocol, &host, &token))
}

fn socket_url(protocol: &str, host: &str, token: &str) -> String {
    let scheme = if protocol == "https:" { "wss" } else { "ws" };
    format!("{scheme}://{host}/ws?token={token}")
}

pub fn room_from_location(window: &Window) -> Option<RoomId> {
    let path = window.location().pathname().ok()?;
    room_from_path(&path)
}

fn room_from_path(path: &str) -> Option<RoomId> {
    let mut parts = path.trim_matches('/').split('/');
    if parts.next()? != "canvas" {
        return None;
    }
    let room = RoomId::new(parts.next()?);
    (!room.is_empty()).then_some(room)
}

pub fn stored_token(window: &Window) -> Option<String> {
    let storage = window.local_storage().ok()??;
    let token = storage.get_item(TOKEN_KEY).ok()??;
    (!token.trim().is_empty()).then_some(token)
}

#[derive(Deserialize)]
struct ShapePage {
    #[serde(default)]
    shapes: Vec<StoredShape>,
}

#[derive(Deserialize)]
struct StoredShape {
    #[serde(default)]
    shape: Value,
}

/// Decodes a shape listing (newest first) into drawing order. Entries whose
/// payload is not a known shape are skipped.
pub fn parse_history(body: &str) -> Result<Vec<Shape>, serde_json::Error> {
    let page: ShapePage = serde_json::from_str(body)?;
    let mut shapes: Vec<Shape> = page
        .shapes
        .iter()
        .filter_map(|stored| decode_remote_shape(&stored.shape))
        .collect();
    if shapes.len() < page.shapes.len() {
        log::warn!(
            "skipped {} undecodable stored shapes",
            page.shapes.len() - shapes.len()
        );
    }
    shapes.reverse();
    Ok(shapes)
}

pub async fn fetch_history(
    window: &Window,
    room_id: &RoomId,
    token: &str,
) -> Result<Vec<Shape>, JsValue> {
    let url = format!("/api/rooms/{room_id}/shapes?limit={HISTORY_LIMIT}");
    let init = RequestInit::new();
    init.set_method("GET");
    let request = Request::new_with_str_and_init(&url, &init)?;
    request
        .headers()
        .set("Authorization", &format!("Bearer {token}"))?;

    let response: Response = JsFuture::from(window.fetch_with_request(&request))
        .await?
        .dyn_into()?;
    if !response.ok() {
        return Err(JsValue::from_str(&format!(
            "history request failed with {}",
            response.status()
        )));
    }
    let body = JsFuture::from(response.text()?)
        .await?
        .as_string()
        .unwrap_or_default();
    parse_history(&body).map_err(|error| JsValue::from_str(&error.to_string()))
}
