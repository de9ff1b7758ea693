use inkroom_shared::Point;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{
    Document, Element, HtmlButtonElement, HtmlCanvasElement, HtmlElement, HtmlInputElement,
    MouseEvent,
};

use crate::state::Tool;

pub fn get_element<T: JsCast>(document: &Document, id: &str) -> Result<T, JsValue> {
    let element = document
        .get_element_by_id(id)
        .ok_or_else(|| JsValue::from_str(&format!("Missing element: {id}")))?;
    element
        .dyn_into::<T>()
        .map_err(|_| JsValue::from_str(&format!("Invalid element type: {id}")))
}

pub fn set_tool_button(button: &HtmlButtonElement, active: bool) {
    let pressed = if active { "true" } else { "false" };
    let _ = button.set_attribute("aria-pressed", pressed);
}

pub fn set_canvas_cursor(
    canvas: &HtmlCanvasElement,
    tool: Tool,
    pan_modifier: bool,
    panning: bool,
) {
    let cursor = match (panning, pan_modifier) {
        (true, _) => "grabbing",
        (false, true) => "grab",
        (false, false) => tool.cursor(),
    };
    let _ = canvas.style().set_property("cursor", cursor);
}

pub fn set_status(status_el: &Element, state: &str, text: &str) {
    let _ = status_el.set_attribute("data-state", state);
    status_el.set_text_content(Some(text));
}

/// Pointer position relative to the canvas origin.
pub fn event_to_screen(canvas: &HtmlCanvasElement, event: &MouseEvent) -> Point {
    let rect = canvas.get_bounding_client_rect();
    Point::new(
        event.client_x() as f64 - rect.left(),
        event.client_y() as f64 - rect.top(),
    )
}

/// Matches the backing store to the displayed size and returns it.
pub fn fit_canvas(canvas: &HtmlCanvasElement) -> (f64, f64) {
    let rect = canvas.get_bounding_client_rect();
    let width = rect.width().max(1.0);
    let height = rect.height().max(1.0);
    canvas.set_width(width as u32);
    canvas.set_height(height as u32);
    (width, height)
}

/// Places the text input over the canvas at `at` and focuses it.
pub fn show_text_input(input: &HtmlInputElement, canvas: &HtmlCanvasElement, at: Point) {
    let rect = canvas.get_bounding_client_rect();
    let style = input.style();
    let _ = style.set_property("left", &format!("{}px", rect.left() + at.x));
    let _ = style.set_property("top", &format!("{}px", rect.top() + at.y));
    let _ = style.set_property("display", "block");
    input.set_value("");
    let _ = input.focus();
}

pub fn hide_text_input(input: &HtmlInputElement) {
    let _ = input.style().set_property("display", "none");
    input.set_value("");
}

pub fn append_chat_line(log: &HtmlElement, document: &Document, user: &str, message: &str) {
    let Ok(line) = document.create_element("div") else {
        return;
    };
    line.set_text_content(Some(&format!("{user}: {message}")));
    let _ = log.append_child(&line);
    log.set_scroll_top(log.scroll_height());
}
