use std::cell::RefCell;
use std::rc::Rc;

use inkroom_shared::{ClientMessage, RoomId, ServerMessage, Shape};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{CloseEvent, Event, MessageEvent, WebSocket};

use crate::session::{ShapeSink, SubmitError};

#[derive(Debug)]
pub enum WsEvent {
    Open,
    Close { code: u16 },
    Error,
    Message(ServerMessage),
}

pub struct WsSender {
    socket: WebSocket,
}

impl WsSender {
    pub fn is_open(&self) -> bool {
        self.socket.ready_state() == WebSocket::OPEN
    }

    pub fn send(&self, message: &ClientMessage) -> Result<(), SubmitError> {
        if !self.is_open() {
            return Err(SubmitError::Disconnected);
        }
        let payload = serde_json::to_string(message)?;
        self.socket
            .send_with_str(&payload)
            .map_err(|error| SubmitError::Send(format!("{error:?}")))
    }
}

/// Commits travel as one `chat_shape` envelope; the relay stores it and
/// fans it out to the room.
#[derive(Clone)]
pub struct SocketSink(pub Rc<WsSender>);

impl ShapeSink for SocketSink {
    fn submit(&mut self, room_id: &RoomId, shape: &Shape) -> Result<(), SubmitError> {
        let message = ClientMessage::ChatShape {
            room_id: room_id.clone(),
            user_id: None,
            shape: serde_json::to_value(shape)?,
        };
        self.0.send(&message)
    }
}

pub fn connect_ws(url: &str) -> Result<Rc<WsSender>, JsValue> {
    let socket = WebSocket::new(url)?;
    Ok(Rc::new(WsSender { socket }))
}

/// Routes socket callbacks to `on_event`. Must be called before control
/// returns to the browser, or early events are lost.
pub fn listen(sender: &WsSender, on_event: impl 'static + FnMut(WsEvent)) {
    let socket = &sender.socket;
    let on_event = Rc::new(RefCell::new(on_event));

    {
        let on_event = on_event.clone();
        let onopen = Closure::<dyn FnMut(Event)>::new(move |_| {
            on_event.borrow_mut()(WsEvent::Open);
        });
        socket.set_onopen(Some(onopen.as_ref().unchecked_ref()));
        onopen.forget();
    }

    {
        let on_event = on_event.clone();
        let onclose = Closure::<dyn FnMut(CloseEvent)>::new(move |event: CloseEvent| {
            on_event.borrow_mut()(WsEvent::Close { code: event.code() });
        });
        socket.set_onclose(Some(onclose.as_ref().unchecked_ref()));
        onclose.forget();
    }

    {
        let on_event = on_event.clone();
        let onerror = Closure::<dyn FnMut(Event)>::new(move |_| {
            on_event.borrow_mut()(WsEvent::Error);
        });
        socket.set_onerror(Some(onerror.as_ref().unchecked_ref()));
        onerror.forget();
    }

    {
        let onmessage = Closure::<dyn FnMut(MessageEvent)>::new(move |event: MessageEvent| {
            let Some(text) = event.data().as_string() else {
                log::warn!("ignoring non-text socket frame");
                return;
            };
            match serde_json::from_str::<ServerMessage>(&text) {
                Ok(message) => on_event.borrow_mut()(WsEvent::Message(message)),
                Err(error) => {
                    let snippet: String = text.chars().take(200).collect();
                    log::error!("socket message parse error: {error} payload={snippet:?}");
                }
            }
        });
        socket.set_onmessage(Some(onmessage.as_ref().unchecked_ref()));
        onmessage.forget();
    }
}
