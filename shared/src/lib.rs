use serde::{Deserialize, Serialize};

mod protocol;
mod shape;
mod view;

pub use protocol::{ClientMessage, RoomId, ServerMessage};
pub use shape::{Shape, Surface, BACKGROUND_COLOR, INK_COLOR, LINE_WIDTH, TEXT_FONT};
pub use view::{ViewTransform, MAX_SCALE, MIN_SCALE, ZOOM_STEP};

/// A position in either canvas or screen space; which one is up to the caller.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}
