use inkroom_shared::{
    Point, RoomId, ServerMessage, Shape, Surface, ViewTransform, BACKGROUND_COLOR,
};
use serde_json::Value;
use thiserror::Error;

use crate::state::{Gesture, PointerDown, Tool};

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("socket is not open")]
    Disconnected,
    #[error("could not encode shape: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("send failed: {0}")]
    Send(String),
}

/// Outbound side of a commit: the shape has to be written durably and
/// relayed to the rest of the room.
pub trait ShapeSink {
    fn submit(&mut self, room_id: &RoomId, shape: &Shape) -> Result<(), SubmitError>;
}

/// Client-side drawing state for one room. Owns the local shape list, the
/// viewer's transform and the pointer gesture; every mutation redraws the
/// full scene onto the surface.
pub struct DrawingSession<S, K> {
    room_id: RoomId,
    shapes: Vec<Shape>,
    view: ViewTransform,
    viewport: (f64, f64),
    tool: Tool,
    gesture: Gesture,
    pan_modifier: bool,
    surface: S,
    sink: K,
}

impl<S: Surface, K: ShapeSink> DrawingSession<S, K> {
    pub fn new(room_id: RoomId, tool: Tool, surface: S, sink: K) -> Self {
        Self {
            room_id,
            shapes: Vec::new(),
            view: ViewTransform::default(),
            viewport: (0.0, 0.0),
            tool,
            gesture: Gesture::Idle,
            pan_modifier: false,
            surface,
            sink,
        }
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    pub fn shapes(&self) -> &[Shape] {
        &self.shapes
    }

    pub fn shape_count(&self) -> usize {
        self.shapes.len()
    }

    pub fn view(&self) -> &ViewTransform {
        &self.view
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn pan_modifier(&self) -> bool {
        self.pan_modifier
    }

    pub fn gesture(&self) -> &Gesture {
        &self.gesture
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// Puts persisted shapes (oldest first) underneath anything that already
    /// arrived live.
    pub fn load_history(&mut self, history: Vec<Shape>) {
        let live = std::mem::replace(&mut self.shapes, history);
        self.shapes.extend(live);
        self.redraw();
    }

    pub fn set_tool(&mut self, tool: Tool) {
        self.tool = tool;
        if !matches!(self.gesture, Gesture::Idle) {
            self.gesture = Gesture::Idle;
            self.redraw();
        }
    }

    pub fn set_pan_modifier(&mut self, held: bool) {
        self.pan_modifier = held;
    }

    pub fn resize(&mut self, width: f64, height: f64) {
        self.viewport = (width, height);
        self.redraw();
    }

    pub fn pointer_down(&mut self, screen: Point) -> PointerDown {
        if matches!(self.gesture, Gesture::AwaitingText { .. }) {
            self.cancel_text();
        }
        if self.pan_modifier {
            self.gesture = Gesture::Panning {
                start_screen: screen,
                origin_x: self.view.offset_x,
                origin_y: self.view.offset_y,
            };
            return PointerDown::Panning;
        }

        let at = self.view.screen_to_canvas(screen);
        let draft = match self.tool {
            Tool::Text => {
                self.gesture = Gesture::AwaitingText { at, screen };
                return PointerDown::NeedsText { screen };
            }
            Tool::Pencil => Shape::freehand(vec![at]),
            Tool::Rectangle => Shape::rectangle_from_drag(at, at),
            Tool::Circle => Shape::circle_from_drag(at, at),
        };
        self.gesture = Gesture::Drafting { start: at, draft };
        PointerDown::Drafting
    }

    pub fn pointer_move(&mut self, screen: Point) {
        match &mut self.gesture {
            Gesture::Panning {
                start_screen,
                origin_x,
                origin_y,
            } => {
                let offset_x = *origin_x + (screen.x - start_screen.x);
                let offset_y = *origin_y + (screen.y - start_screen.y);
                self.view.set_offset(offset_x, offset_y);
            }
            Gesture::Drafting { start, draft } => {
                let at = self.view.screen_to_canvas(screen);
                match draft {
                    Shape::Freehand { points } => points.push(at),
                    Shape::Rectangle { .. } => *draft = Shape::rectangle_from_drag(*start, at),
                    Shape::Circle { .. } => *draft = Shape::circle_from_drag(*start, at),
                    Shape::Text { .. } => {}
                }
            }
            Gesture::Idle | Gesture::AwaitingText { .. } => return,
        }
        self.redraw();
    }

    /// Ends the gesture. `None` when nothing was committed, otherwise the
    /// outcome of handing the new shape to the sink.
    pub fn pointer_up(&mut self, screen: Point) -> Option<Result<(), SubmitError>> {
        match std::mem::replace(&mut self.gesture, Gesture::Idle) {
            Gesture::Drafting { start, draft } => {
                let end = self.view.screen_to_canvas(screen);
                let shape = match draft {
                    Shape::Freehand { mut points } => {
                        if points.last() != Some(&end) {
                            points.push(end);
                        }
                        if points.len() < 2 {
                            self.redraw();
                            return None;
                        }
                        Shape::freehand(points)
                    }
                    Shape::Rectangle { .. } => Shape::rectangle_from_drag(start, end),
                    Shape::Circle { .. } => Shape::circle_from_drag(start, end),
                    text @ Shape::Text { .. } => text,
                };
                Some(self.commit(shape))
            }
            Gesture::Panning { .. } => None,
            other => {
                self.gesture = other;
                None
            }
        }
    }

    /// Completes a text gesture. Blank content is dropped without any
    /// outbound traffic.
    pub fn submit_text(&mut self, content: &str) -> Option<Result<(), SubmitError>> {
        let Gesture::AwaitingText { at, .. } = self.gesture else {
            return None;
        };
        self.gesture = Gesture::Idle;
        let shape = Shape::text(at, content)?;
        Some(self.commit(shape))
    }

    pub fn cancel_text(&mut self) {
        if matches!(self.gesture, Gesture::AwaitingText { .. }) {
            self.gesture = Gesture::Idle;
        }
    }

    pub fn wheel(&mut self, cursor: Point, delta_y: f64) {
        self.view.zoom_wheel(cursor, delta_y);
        self.redraw();
    }

    pub fn zoom_in(&mut self) {
        self.view.zoom_in(self.viewport.0, self.viewport.1);
        self.redraw();
    }

    pub fn zoom_out(&mut self) {
        self.view.zoom_out(self.viewport.0, self.viewport.1);
        self.redraw();
    }

    pub fn reset_view(&mut self) {
        self.view.reset();
        self.redraw();
    }

    /// Local only: peers and later reloads still see the shape.
    pub fn undo(&mut self) -> Option<Shape> {
        let shape = self.shapes.pop()?;
        self.redraw();
        Some(shape)
    }

    /// Appends a relayed shape for this room. Returns whether the scene
    /// changed. Echoes of our own shapes are appended again.
    pub fn apply_remote(&mut self, message: &ServerMessage) -> bool {
        let ServerMessage::ChatShape {
            room_id, shape, ..
        } = message
        else {
            return false;
        };
        if room_id != &self.room_id {
            return false;
        }
        let Some(shape) = decode_remote_shape(shape) else {
            log::warn!("ignoring undecodable shape in room {room_id}");
            return false;
        };
        self.shapes.push(shape);
        self.redraw();
        true
    }

    pub fn redraw(&mut self) {
        self.surface.clear(BACKGROUND_COLOR);
        for shape in &self.shapes {
            shape.render(&mut self.surface, &self.view);
        }
        if let Some(draft) = self.gesture.draft() {
            draft.render(&mut self.surface, &self.view);
        }
    }

    fn commit(&mut self, shape: Shape) -> Result<(), SubmitError> {
        log::debug!("committing {} in room {}", shape.kind(), self.room_id);
        let result = self.sink.submit(&self.room_id, &shape);
        self.shapes.push(shape);
        self.redraw();
        if let Err(error) = &result {
            log::warn!("shape kept locally but not submitted: {error}");
        }
        result
    }
}

/// Accepts a shape object, `{"shape": ...}`, or either form encoded as a
/// JSON string.
pub fn decode_remote_shape(value: &Value) -> Option<Shape> {
    match value {
        Value::String(text) => {
            let inner: Value = serde_json::from_str(text).ok()?;
            match inner {
                Value::String(_) => None,
                inner => decode_remote_shape(&inner),
            }
        }
        Value::Object(object) => match object.get("shape") {
            Some(inner) if !object.contains_key("type") => decode_remote_shape(inner),
            _ => serde_json::from_value(value.clone()).ok(),
        },
        _ => None,
    }
}
