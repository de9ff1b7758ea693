use serde::{Deserialize, Serialize};

use crate::Point;

pub const MIN_SCALE: f64 = 0.2;
pub const MAX_SCALE: f64 = 5.0;
pub const ZOOM_STEP: f64 = 0.1;

/// Per-viewer mapping from canvas space to screen pixels:
/// `screen = canvas * scale + offset`.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct ViewTransform {
    pub scale: f64,
    pub offset_x: f64,
    pub offset_y: f64,
}

impl Default for ViewTransform {
    fn default() -> Self {
        Self {
            scale: 1.0,
            offset_x: 0.0,
            offset_y: 0.0,
        }
    }
}

impl ViewTransform {
    pub fn screen_to_canvas(&self, point: Point) -> Point {
        Point {
            x: (point.x - self.offset_x) / self.scale,
            y: (point.y - self.offset_y) / self.scale,
        }
    }

    pub fn canvas_to_screen(&self, point: Point) -> Point {
        Point {
            x: point.x * self.scale + self.offset_x,
            y: point.y * self.scale + self.offset_y,
        }
    }

    /// Zooms one step, keeping the viewport center fixed.
    pub fn zoom_in(&mut self, viewport_width: f64, viewport_height: f64) {
        let center = Point::new(viewport_width / 2.0, viewport_height / 2.0);
        self.zoom_at(center, ZOOM_STEP);
    }

    pub fn zoom_out(&mut self, viewport_width: f64, viewport_height: f64) {
        let center = Point::new(viewport_width / 2.0, viewport_height / 2.0);
        self.zoom_at(center, -ZOOM_STEP);
    }

    /// Wheel zoom: a positive `delta_y` scrolls away and zooms out.
    pub fn zoom_wheel(&mut self, cursor: Point, delta_y: f64) {
        let step = if delta_y > 0.0 { -ZOOM_STEP } else { ZOOM_STEP };
        self.zoom_at(cursor, step);
    }

    /// Rescales by `step`, keeping the canvas point under `anchor` on the
    /// same screen pixel. Returns whether the scale changed.
    pub fn zoom_at(&mut self, anchor: Point, step: f64) -> bool {
        let scale = clamp_scale(self.scale + step);
        if (scale - self.scale).abs() < f64::EPSILON {
            return false;
        }
        let pinned = self.screen_to_canvas(anchor);
        self.scale = scale;
        self.offset_x = anchor.x - pinned.x * scale;
        self.offset_y = anchor.y - pinned.y * scale;
        true
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        self.offset_x += dx;
        self.offset_y += dy;
    }

    pub fn set_offset(&mut self, offset_x: f64, offset_y: f64) {
        self.offset_x = offset_x;
        self.offset_y = offset_y;
    }
}

pub fn clamp_scale(scale: f64) -> f64 {
    scale.max(MIN_SCALE).min(MAX_SCALE)
}
