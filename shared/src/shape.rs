use std::f64::consts::TAU;

use serde::{Deserialize, Serialize};

use crate::{Point, ViewTransform};

pub const BACKGROUND_COLOR: &str = "rgb(0,0,0)";
pub const INK_COLOR: &str = "rgb(255,255,255)";
pub const LINE_WIDTH: f64 = 3.0;
pub const TEXT_FONT: &str = "24px Arial";

/// One immutable drawing primitive. Coordinates are in canvas space.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type")]
pub enum Shape {
    #[serde(rename = "rect")]
    Rectangle {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    },
    #[serde(rename = "pencil")]
    Freehand { points: Vec<Point> },
    #[serde(rename = "circle", rename_all = "camelCase")]
    Circle {
        center_x: f64,
        center_y: f64,
        radius: f64,
        start_angle: f64,
        #[serde(alias = "endingAngle")]
        end_angle: f64,
    },
    #[serde(rename = "text")]
    Text {
        x: f64,
        y: f64,
        #[serde(rename = "text")]
        content: String,
    },
}

/// Immediate-mode 2D target that shapes are rendered onto.
///
/// Calls between `save` and `restore` run under the transform given to
/// `set_transform`, mirroring the canvas 2D context state stack.
pub trait Surface {
    fn clear(&mut self, background: &str);
    fn save(&mut self);
    fn restore(&mut self);
    fn set_transform(&mut self, scale: f64, offset_x: f64, offset_y: f64);
    fn set_ink(&mut self, color: &str, line_width: f64);
    fn stroke_rect(&mut self, x: f64, y: f64, width: f64, height: f64);
    fn stroke_polyline(&mut self, points: &[Point]);
    fn stroke_arc(&mut self, center: Point, radius: f64, start_angle: f64, end_angle: f64);
    fn fill_text(&mut self, text: &str, at: Point, font: &str);
}

impl Shape {
    /// Anchor at the gesture start; extents may come out negative.
    pub fn rectangle_from_drag(start: Point, end: Point) -> Self {
        Shape::Rectangle {
            x: start.x,
            y: start.y,
            width: end.x - start.x,
            height: end.y - start.y,
        }
    }

    /// Full circle centered in the drag box, sized by its longer side.
    pub fn circle_from_drag(start: Point, end: Point) -> Self {
        let width = end.x - start.x;
        let height = end.y - start.y;
        Shape::Circle {
            center_x: start.x + width / 2.0,
            center_y: start.y + height / 2.0,
            radius: width.abs().max(height.abs()) / 2.0,
            start_angle: 0.0,
            end_angle: TAU,
        }
    }

    pub fn freehand(points: Vec<Point>) -> Self {
        Shape::Freehand { points }
    }

    /// Returns `None` for empty or whitespace-only content.
    pub fn text(at: Point, content: impl Into<String>) -> Option<Self> {
        let content = content.into();
        if content.trim().is_empty() {
            return None;
        }
        Some(Shape::Text {
            x: at.x,
            y: at.y,
            content,
        })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Shape::Rectangle { .. } => "rect",
            Shape::Freehand { .. } => "pencil",
            Shape::Circle { .. } => "circle",
            Shape::Text { .. } => "text",
        }
    }

    pub fn render(&self, surface: &mut dyn Surface, view: &ViewTransform) {
        surface.save();
        surface.set_transform(view.scale, view.offset_x, view.offset_y);
        surface.set_ink(INK_COLOR, LINE_WIDTH);
        match self {
            Shape::Rectangle {
                x,
                y,
                width,
                height,
            } => {
                let left = x.min(x + width);
                let top = y.min(y + height);
                surface.stroke_rect(left, top, width.abs(), height.abs());
            }
            Shape::Freehand { points } => {
                if points.len() >= 2 {
                    surface.stroke_polyline(points);
                }
            }
            Shape::Circle {
                center_x,
                center_y,
                radius,
                start_angle,
                end_angle,
            } => {
                surface.stroke_arc(
                    Point::new(*center_x, *center_y),
                    radius.abs(),
                    *start_angle,
                    *end_angle,
                );
            }
            Shape::Text { x, y, content } => {
                surface.fill_text(content, Point::new(*x, *y), TEXT_FONT);
            }
        }
        surface.restore();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    pub enum Op {
        Clear,
        Transform(f64, f64, f64),
        Rect(f64, f64, f64, f64),
        Polyline(usize),
        Arc(Point, f64, f64, f64),
        Text(String, Point),
    }

    #[derive(Default)]
    pub struct Recorder {
        pub ops: Vec<Op>,
    }

    impl Surface for Recorder {
        fn clear(&mut self, _background: &str) {
            self.ops.push(Op::Clear);
        }
        fn save(&mut self) {}
        fn restore(&mut self) {}
        fn set_transform(&mut self, scale: f64, offset_x: f64, offset_y: f64) {
            self.ops.push(Op::Transform(scale, offset_x, offset_y));
        }
        fn set_ink(&mut self, _color: &str, _line_width: f64) {}
        fn stroke_rect(&mut self, x: f64, y: f64, width: f64, height: f64) {
            self.ops.push(Op::Rect(x, y, width, height));
        }
        fn stroke_polyline(&mut self, points: &[Point]) {
            self.ops.push(Op::Polyline(points.len()));
        }
        fn stroke_arc(&mut self, center: Point, radius: f64, start_angle: f64, end_angle: f64) {
            self.ops.push(Op::Arc(center, radius, start_angle, end_angle));
        }
        fn fill_text(&mut self, text: &str, at: Point, _font: &str) {
            self.ops.push(Op::Text(text.to_string(), at));
        }
    }

    #[test]
    fn rectangle_keeps_gesture_start_as_anchor() {
        let shape = Shape::rectangle_from_drag(Point::new(10.0, 10.0), Point::new(110.0, 60.0));
        assert_eq!(
            shape,
            Shape::Rectangle {
                x: 10.0,
                y: 10.0,
                width: 100.0,
                height: 50.0
            }
        );
    }

    #[test]
    fn negative_rectangle_renders_from_top_left() {
        let shape = Shape::rectangle_from_drag(Point::new(50.0, 40.0), Point::new(20.0, 10.0));
        let mut recorder = Recorder::default();
        shape.render(&mut recorder, &ViewTransform::default());
        assert!(recorder.ops.contains(&Op::Rect(20.0, 10.0, 30.0, 30.0)));
    }

    #[test]
    fn circle_uses_longer_side_and_full_sweep() {
        let shape = Shape::circle_from_drag(Point::new(0.0, 0.0), Point::new(-40.0, 10.0));
        match shape {
            Shape::Circle {
                center_x,
                center_y,
                radius,
                start_angle,
                end_angle,
            } => {
                assert_eq!((center_x, center_y), (-20.0, 5.0));
                assert_eq!(radius, 20.0);
                assert_eq!(start_angle, 0.0);
                assert_eq!(end_angle, TAU);
            }
            other => panic!("unexpected shape {other:?}"),
        }
    }

    #[test]
    fn single_point_freehand_draws_nothing() {
        let shape = Shape::freehand(vec![Point::new(1.0, 1.0)]);
        let mut recorder = Recorder::default();
        shape.render(&mut recorder, &ViewTransform::default());
        assert!(!recorder
            .ops
            .iter()
            .any(|op| matches!(op, Op::Polyline(_))));
    }

    #[test]
    fn blank_text_is_discarded() {
        assert!(Shape::text(Point::new(0.0, 0.0), "").is_none());
        assert!(Shape::text(Point::new(0.0, 0.0), "  \t\n").is_none());
        assert!(Shape::text(Point::new(0.0, 0.0), " hi ").is_some());
    }

    #[test]
    fn render_applies_view_transform() {
        let view = ViewTransform {
            scale: 2.0,
            offset_x: 5.0,
            offset_y: -3.0,
        };
        let mut recorder = Recorder::default();
        Shape::text(Point::new(4.0, 4.0), "a")
            .unwrap()
            .render(&mut recorder, &view);
        assert_eq!(recorder.ops[0], Op::Transform(2.0, 5.0, -3.0));
    }

    #[test]
    fn wire_format_uses_type_tags() {
        let circle = Shape::circle_from_drag(Point::new(0.0, 0.0), Point::new(10.0, 10.0));
        let value = serde_json::to_value(&circle).unwrap();
        assert_eq!(value["type"], "circle");
        assert_eq!(value["centerX"], 5.0);
        assert!(value.get("endAngle").is_some());

        let text: Shape =
            serde_json::from_str(r#"{"type":"text","x":1,"y":2,"text":"hello"}"#).unwrap();
        assert_eq!(
            text,
            Shape::Text {
                x: 1.0,
                y: 2.0,
                content: "hello".into()
            }
        );
    }

    #[test]
    fn legacy_ending_angle_is_accepted() {
        let json = r#"{"type":"circle","centerX":1,"centerY":2,"radius":3,
            "startAngle":0,"endingAngle":6.28}"#;
        let shape: Shape = serde_json::from_str(json).unwrap();
        assert!(matches!(shape, Shape::Circle { end_angle, .. } if end_angle == 6.28));
    }
}
