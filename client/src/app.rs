use std::cell::{Cell, RefCell};
use std::rc::Rc;

use inkroom_shared::{ClientMessage, RoomId, ServerMessage};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{
    CanvasRenderingContext2d, Document, Event, HtmlButtonElement, HtmlCanvasElement, HtmlElement,
    HtmlInputElement, KeyboardEvent, PointerEvent, WheelEvent, Window,
};

use crate::dom::{
    append_chat_line, event_to_screen, fit_canvas, get_element, hide_text_input,
    set_canvas_cursor, set_status, set_tool_button, show_text_input,
};
use crate::net::{fetch_history, room_from_location, stored_token, websocket_url};
use crate::render::CanvasSurface;
use crate::session::DrawingSession;
use crate::state::{PointerDown, Tool};
use crate::ws::{connect_ws, listen, SocketSink, WsEvent, WsSender};

type Session = Rc<RefCell<DrawingSession<CanvasSurface, SocketSink>>>;

#[wasm_bindgen(start)]
pub fn run() -> Result<(), JsValue> {
    console_error_panic_hook::set_once();
    let _ = console_log::init_with_level(log::Level::Info);

    let window = web_sys::window().ok_or_else(|| JsValue::from_str("Missing window"))?;
    let document = window
        .document()
        .ok_or_else(|| JsValue::from_str("Missing document"))?;
    if document.ready_state() != "loading" {
        return start_app();
    }

    let started = Rc::new(Cell::new(false));
    let onload = Closure::<dyn FnMut(Event)>::new(move |_| {
        if started.replace(true) {
            return;
        }
        if let Err(err) = start_app() {
            web_sys::console::error_1(&err);
        }
    });
    document
        .add_event_listener_with_callback("DOMContentLoaded", onload.as_ref().unchecked_ref())?;
    onload.forget();
    Ok(())
}

fn start_app() -> Result<(), JsValue> {
    let window = web_sys::window().ok_or_else(|| JsValue::from_str("Missing window"))?;
    let document = window
        .document()
        .ok_or_else(|| JsValue::from_str("Missing document"))?;

    let status_el = document
        .get_element_by_id("status")
        .ok_or_else(|| JsValue::from_str("Missing element: status"))?;
    let Some(room_id) = room_from_location(&window) else {
        set_status(&status_el, "error", "No room in the address");
        return Ok(());
    };
    let Some(token) = stored_token(&window) else {
        set_status(&status_el, "error", "Sign in to draw");
        return Ok(());
    };

    let canvas: HtmlCanvasElement = get_element(&document, "board")?;
    let ctx = canvas
        .get_context("2d")?
        .ok_or_else(|| JsValue::from_str("Missing canvas context"))?
        .dyn_into::<CanvasRenderingContext2d>()?;
    let text_input: HtmlInputElement = get_element(&document, "text-input")?;
    let chat_log: HtmlElement = get_element(&document, "chat-log")?;
    let chat_input: HtmlInputElement = get_element(&document, "chat-input")?;

    let sender = connect_ws(&websocket_url(&window, &token)?)?;
    let session: Session = Rc::new(RefCell::new(DrawingSession::new(
        room_id.clone(),
        Tool::Pencil,
        CanvasSurface::new(canvas.clone(), ctx),
        SocketSink(sender.clone()),
    )));
    set_status(&status_el, "connecting", "Connecting...");

    {
        let session = session.clone();
        let sender_cb = sender.clone();
        let room_id = room_id.clone();
        let document = document.clone();
        let chat_log = chat_log.clone();
        let status_el = status_el.clone();
        listen(&sender, move |event| match event {
            WsEvent::Open => {
                set_status(&status_el, "open", &format!("Room {room_id}"));
                let join = ClientMessage::JoinRoom {
                    room_id: room_id.clone(),
                };
                if let Err(error) = sender_cb.send(&join) {
                    log::error!("could not join room {room_id}: {error}");
                }
            }
            WsEvent::Close { code } => {
                log::info!("socket closed with code {code}");
                set_status(&status_el, "closed", "Disconnected");
            }
            WsEvent::Error => set_status(&status_el, "closed", "Connection error"),
            WsEvent::Message(ServerMessage::Chat {
                room_id: chat_room,
                user_id,
                message,
            }) => {
                if chat_room == room_id {
                    append_chat_line(&chat_log, &document, &user_id, &message);
                }
            }
            WsEvent::Message(message) => {
                session.borrow_mut().apply_remote(&message);
            }
        });
    }

    {
        let (width, height) = fit_canvas(&canvas);
        session.borrow_mut().resize(width, height);
    }

    load_history(&window, &session, room_id.clone(), token);
    bind_pointer(&canvas, &session, &text_input)?;
    bind_text_input(&text_input, &session)?;
    bind_toolbar(&document, &canvas, &session)?;
    bind_keyboard(&window, &canvas, &session)?;
    bind_chat(&chat_input, &sender, room_id)?;

    {
        let session = session.clone();
        let canvas = canvas.clone();
        let onresize = Closure::<dyn FnMut()>::new(move || {
            let (width, height) = fit_canvas(&canvas);
            session.borrow_mut().resize(width, height);
        });
        window.add_event_listener_with_callback("resize", onresize.as_ref().unchecked_ref())?;
        onresize.forget();
    }

    Ok(())
}

fn load_history(window: &Window, session: &Session, room_id: RoomId, token: String) {
    let window = window.clone();
    let session = session.clone();
    wasm_bindgen_futures::spawn_local(async move {
        match fetch_history(&window, &room_id, &token).await {
            Ok(shapes) => {
                log::info!("loaded {} stored shapes for room {room_id}", shapes.len());
                session.borrow_mut().load_history(shapes);
            }
            Err(error) => log::warn!("history unavailable for room {room_id}: {error:?}"),
        }
    });
}

fn bind_pointer(
    canvas: &HtmlCanvasElement,
    session: &Session,
    text_input: &HtmlInputElement,
) -> Result<(), JsValue> {
    {
        let session = session.clone();
        let canvas_cb = canvas.clone();
        let text_input = text_input.clone();
        let onpointerdown = Closure::<dyn FnMut(PointerEvent)>::new(move |event: PointerEvent| {
            if event.button() != 0 {
                return;
            }
            // Keeps focus on an open text input instead of letting mousedown steal it.
            event.prevent_default();
            let _ = canvas_cb.set_pointer_capture(event.pointer_id());
            let screen = event_to_screen(&canvas_cb, &event);
            let mut session = session.borrow_mut();
            match session.pointer_down(screen) {
                PointerDown::NeedsText { screen } => {
                    show_text_input(&text_input, &canvas_cb, screen)
                }
                PointerDown::Panning => set_canvas_cursor(&canvas_cb, session.tool(), true, true),
                PointerDown::Drafting => hide_text_input(&text_input),
            }
        });
        canvas.add_event_listener_with_callback(
            "pointerdown",
            onpointerdown.as_ref().unchecked_ref(),
        )?;
        onpointerdown.forget();
    }

    {
        let session = session.clone();
        let canvas_cb = canvas.clone();
        let onpointermove = Closure::<dyn FnMut(PointerEvent)>::new(move |event: PointerEvent| {
            let screen = event_to_screen(&canvas_cb, &event);
            session.borrow_mut().pointer_move(screen);
        });
        canvas.add_event_listener_with_callback(
            "pointermove",
            onpointermove.as_ref().unchecked_ref(),
        )?;
        onpointermove.forget();
    }

    let onpointerup = {
        let session = session.clone();
        let canvas_cb = canvas.clone();
        Closure::<dyn FnMut(PointerEvent)>::new(move |event: PointerEvent| {
            let _ = canvas_cb.release_pointer_capture(event.pointer_id());
            let screen = event_to_screen(&canvas_cb, &event);
            let mut session = session.borrow_mut();
            // Submit failures are already logged and the shape stays on screen.
            let _ = session.pointer_up(screen);
            set_canvas_cursor(&canvas_cb, session.tool(), session.pan_modifier(), false);
        })
    };
    canvas.add_event_listener_with_callback("pointerup", onpointerup.as_ref().unchecked_ref())?;
    canvas.add_event_listener_with_callback("pointercancel", onpointerup.as_ref().unchecked_ref())?;
    onpointerup.forget();

    {
        let session = session.clone();
        let canvas_cb = canvas.clone();
        let onwheel = Closure::<dyn FnMut(WheelEvent)>::new(move |event: WheelEvent| {
            event.prevent_default();
            let cursor = event_to_screen(&canvas_cb, &event);
            session.borrow_mut().wheel(cursor, event.delta_y());
        });
        canvas.add_event_listener_with_callback("wheel", onwheel.as_ref().unchecked_ref())?;
        onwheel.forget();
    }

    Ok(())
}

fn bind_text_input(text_input: &HtmlInputElement, session: &Session) -> Result<(), JsValue> {
    {
        let session = session.clone();
        let input = text_input.clone();
        let onkeydown = Closure::<dyn FnMut(KeyboardEvent)>::new(move |event: KeyboardEvent| {
            match event.key().as_str() {
                "Enter" => {
                    event.prevent_default();
                    let content = input.value();
                    let _ = session.borrow_mut().submit_text(&content);
                }
                "Escape" => session.borrow_mut().cancel_text(),
                _ => return,
            }
            hide_text_input(&input);
        });
        text_input.add_event_listener_with_callback("keydown", onkeydown.as_ref().unchecked_ref())?;
        onkeydown.forget();
    }

    {
        let session = session.clone();
        let input = text_input.clone();
        let onblur = Closure::<dyn FnMut(Event)>::new(move |_| {
            if let Ok(mut session) = session.try_borrow_mut() {
                session.cancel_text();
            }
            hide_text_input(&input);
        });
        text_input.add_event_listener_with_callback("blur", onblur.as_ref().unchecked_ref())?;
        onblur.forget();
    }

    Ok(())
}

fn bind_toolbar(
    document: &Document,
    canvas: &HtmlCanvasElement,
    session: &Session,
) -> Result<(), JsValue> {
    let mut tool_buttons = Vec::new();
    for tool in Tool::ALL {
        let button: HtmlButtonElement = get_element(document, &format!("tool-{}", tool.name()))?;
        set_tool_button(&button, tool == session.borrow().tool());
        tool_buttons.push((tool, button));
    }
    let tool_buttons = Rc::new(tool_buttons);
    set_canvas_cursor(canvas, session.borrow().tool(), false, false);

    for (tool, button) in tool_buttons.iter() {
        let tool = *tool;
        let session = session.clone();
        let canvas = canvas.clone();
        let tool_buttons = tool_buttons.clone();
        let onclick = Closure::<dyn FnMut(Event)>::new(move |_| {
            session.borrow_mut().set_tool(tool);
            for (other, button) in tool_buttons.iter() {
                set_tool_button(button, *other == tool);
            }
            set_canvas_cursor(&canvas, tool, false, false);
        });
        button.add_event_listener_with_callback("click", onclick.as_ref().unchecked_ref())?;
        onclick.forget();
    }

    let actions: [(&str, fn(&mut DrawingSession<CanvasSurface, SocketSink>)); 4] = [
        ("zoom-in", |session| session.zoom_in()),
        ("zoom-out", |session| session.zoom_out()),
        ("zoom-reset", |session| session.reset_view()),
        ("undo", |session| {
            session.undo();
        }),
    ];
    for (id, action) in actions {
        let button: HtmlButtonElement = get_element(document, id)?;
        let session = session.clone();
        let onclick = Closure::<dyn FnMut(Event)>::new(move |_| {
            action(&mut session.borrow_mut());
        });
        button.add_event_listener_with_callback("click", onclick.as_ref().unchecked_ref())?;
        onclick.forget();
    }

    Ok(())
}

fn typing_in_input(event: &KeyboardEvent) -> bool {
    event
        .target()
        .map(|target| target.dyn_into::<HtmlInputElement>().is_ok())
        .unwrap_or(false)
}

fn bind_keyboard(
    window: &Window,
    canvas: &HtmlCanvasElement,
    session: &Session,
) -> Result<(), JsValue> {
    {
        let session = session.clone();
        let canvas = canvas.clone();
        let onkeydown = Closure::<dyn FnMut(KeyboardEvent)>::new(move |event: KeyboardEvent| {
            if typing_in_input(&event) {
                return;
            }
            let key = event.key();
            let mut session = session.borrow_mut();
            if event.meta_key() || event.ctrl_key() {
                if key.eq_ignore_ascii_case("z") {
                    event.prevent_default();
                    session.undo();
                }
                return;
            }
            match key.as_str() {
                " " => {
                    event.prevent_default();
                    session.set_pan_modifier(true);
                    let panning = session.gesture().is_panning();
                    set_canvas_cursor(&canvas, session.tool(), true, panning);
                }
                "+" | "=" => session.zoom_in(),
                "-" | "_" => session.zoom_out(),
                "0" => session.reset_view(),
                _ => {}
            }
        });
        window.add_event_listener_with_callback("keydown", onkeydown.as_ref().unchecked_ref())?;
        onkeydown.forget();
    }

    {
        let session = session.clone();
        let canvas = canvas.clone();
        let onkeyup = Closure::<dyn FnMut(KeyboardEvent)>::new(move |event: KeyboardEvent| {
            if event.key() != " " {
                return;
            }
            let mut session = session.borrow_mut();
            session.set_pan_modifier(false);
            let panning = session.gesture().is_panning();
            set_canvas_cursor(&canvas, session.tool(), false, panning);
        });
        window.add_event_listener_with_callback("keyup", onkeyup.as_ref().unchecked_ref())?;
        onkeyup.forget();
    }

    Ok(())
}

fn bind_chat(
    chat_input: &HtmlInputElement,
    sender: &Rc<WsSender>,
    room_id: RoomId,
) -> Result<(), JsValue> {
    let input = chat_input.clone();
    let sender = sender.clone();
    let onkeydown = Closure::<dyn FnMut(KeyboardEvent)>::new(move |event: KeyboardEvent| {
        if event.key() != "Enter" {
            return;
        }
        let message = input.value();
        if message.trim().is_empty() {
            return;
        }
        let chat = ClientMessage::Chat {
            room_id: room_id.clone(),
            user_id: None,
            message,
        };
        match sender.send(&chat) {
            Ok(()) => input.set_value(""),
            Err(error) => log::warn!("chat not sent: {error}"),
        }
    });
    chat_input.add_event_listener_with_callback("keydown", onkeydown.as_ref().unchecked_ref())?;
    onkeydown.forget();
    Ok(())
}
