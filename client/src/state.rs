use inkroom_shared::{Point, Shape};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tool {
    Pencil,
    Rectangle,
    Circle,
    Text,
}

impl Tool {
    pub const ALL: [Tool; 4] = [Tool::Pencil, Tool::Rectangle, Tool::Circle, Tool::Text];

    pub fn name(self) -> &'static str {
        match self {
            Tool::Pencil => "pencil",
            Tool::Rectangle => "rect",
            Tool::Circle => "circle",
            Tool::Text => "text",
        }
    }

    pub fn cursor(self) -> &'static str {
        match self {
            Tool::Pencil => "pointer",
            Tool::Rectangle | Tool::Circle => "crosshair",
            Tool::Text => "text",
        }
    }
}

/// Where the pointer state machine currently is. Canvas-space points unless
/// named otherwise.
#[derive(Clone, Debug, PartialEq)]
pub enum Gesture {
    Idle,
    Drafting {
        start: Point,
        draft: Shape,
    },
    /// Text tool pressed; waiting for the UI to hand back the content.
    AwaitingText {
        at: Point,
        screen: Point,
    },
    Panning {
        start_screen: Point,
        origin_x: f64,
        origin_y: f64,
    },
}

impl Gesture {
    pub fn draft(&self) -> Option<&Shape> {
        match self {
            Gesture::Drafting { draft, .. } => Some(draft),
            _ => None,
        }
    }

    pub fn is_panning(&self) -> bool {
        matches!(self, Gesture::Panning { .. })
    }
}

/// Result of pressing the pointer, for the UI to react to.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PointerDown {
    Panning,
    Drafting,
    /// Show a text input at this screen position.
    NeedsText { screen: Point },
}
